//! Scenarios 2 and 3 from the component design's testable-properties
//! list: thread join/exit, and join-after-detach.

use tinyos_core::{Config, Kernel, Task};

#[test]
fn join_returns_the_exit_value_and_a_second_join_then_fails() {
    let kernel = Kernel::new(Config::default());
    let done: Task = Box::new(|_k, _args| 42);
    let tid = kernel.sys_create_thread(done, b"");

    let result = kernel.sys_thread_join(tid);
    assert_eq!(result, Ok(42));

    // The PTCB is freed once its last joiner has collected the exit
    // value, so a second join on the same tid no longer finds it.
    let second = kernel.sys_thread_join(tid);
    assert!(second.is_err());
}

#[test]
fn detach_then_join_fails_without_blocking() {
    let kernel = Kernel::new(Config::default());
    let (tx, rx) = std::sync::mpsc::channel();
    let blocked: Task = Box::new(move |_k, _args| {
        rx.recv().ok();
        7
    });
    let tid = kernel.sys_create_thread(blocked, b"");

    kernel.sys_thread_detach(tid).unwrap();
    let result = kernel.sys_thread_join(tid);
    assert!(matches!(result, Err(_)));

    // Let the still-running detached thread finish so it doesn't outlive the test.
    tx.send(()).ok();
}

#[test]
fn joining_self_is_rejected() {
    let kernel = Kernel::new(Config::default());
    let probe: Task = Box::new(|k, _args| {
        let self_tid = k.sys_thread_self();
        k.sys_thread_join(self_tid).is_err() as i32
    });
    let tid = kernel.sys_create_thread(probe, b"");
    assert_eq!(kernel.sys_thread_join(tid), Ok(1));
}

#[test]
fn process_teardown_runs_once_the_last_thread_exits() {
    let kernel = Kernel::new(Config::default());
    kernel.sys_exec(None, b"").unwrap(); // consume the parentless pid 1 slot

    let counter: Task = Box::new(|k, _args| {
        // A second thread in the same process; the process should only
        // tear down once both have exited.
        let t2: Task = Box::new(|_k, _args| 1);
        let inner_tid = k.sys_create_thread(t2, b"");
        k.sys_thread_join(inner_tid).unwrap();
        99
    });
    let pid = kernel.sys_exec(Some(counter), b"").unwrap();
    let (_, status) = kernel.sys_wait_child(Some(pid)).unwrap();
    assert_eq!(status, Some(99));
}
