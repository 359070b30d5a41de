//! Scenario 1 from the component design's testable-properties list: a
//! child process echoes a byte count back to its parent through a
//! second pipe.

use tinyos_core::{Config, Kernel, Task};

/// The first process any caller execs lands on pid 1 and is parentless
/// (same pid<=1 rule that makes pid 0 parentless) — consume it with a
/// throwaway process so the scenario's real child gets a waitable parent.
fn consume_init_slot(kernel: &Kernel) {
    kernel.sys_exec(None, b"").unwrap();
}

#[test]
fn pipe_echo_reports_byte_count_through_a_second_pipe() {
    let kernel = Kernel::new(Config::default());
    consume_init_slot(&kernel);

    let (in_r, in_w) = kernel.sys_pipe().unwrap();
    let (out_r, out_w) = kernel.sys_pipe().unwrap();

    let task: Task = Box::new(move |k, _args| {
        let mut total = 0i64;
        let mut buf = [0u8; 16];
        loop {
            let n = k.sys_read(in_r, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        k.sys_write(out_w, &total.to_le_bytes()).unwrap();
        k.sys_close(out_w);
        total as i32
    });

    let child = kernel.sys_exec(Some(task), b"").unwrap();
    kernel.sys_write(in_w, b"hello").unwrap();
    kernel.sys_close(in_w);

    let (reaped, status) = kernel.sys_wait_child(Some(child)).unwrap();
    assert_eq!(reaped, child);
    assert_eq!(status, Some(5));

    let mut out_buf = [0u8; 8];
    let n = kernel.sys_read(out_r, &mut out_buf).unwrap();
    assert_eq!(n, 8);
    assert_eq!(i64::from_le_bytes(out_buf), 5);
}

#[test]
fn reading_a_fully_drained_closed_pipe_returns_eof_not_error() {
    let kernel = Kernel::new(Config::default());
    let (rfid, wfid) = kernel.sys_pipe().unwrap();
    kernel.sys_write(wfid, b"abc").unwrap();
    kernel.sys_close(wfid);

    let mut buf = [0u8; 3];
    assert_eq!(kernel.sys_read(rfid, &mut buf).unwrap(), 3);
    assert_eq!(&buf, b"abc");
    // Buffer now drained and writer gone: next read is EOF, not -1.
    assert_eq!(kernel.sys_read(rfid, &mut buf).unwrap(), 0);
}

#[test]
fn writer_blocks_on_a_full_buffer_until_the_reader_drains_it() {
    let kernel = Kernel::new(Config {
        pipe_buffer_size: 4,
        ..Config::default()
    });
    consume_init_slot(&kernel);

    let (rfid, wfid) = kernel.sys_pipe().unwrap();
    let payload = vec![7u8; 64]; // far larger than the 4-byte pipe buffer

    let writer: Task = Box::new(move |k, _| {
        let n = k.sys_write(wfid, &payload).unwrap();
        k.sys_close(wfid);
        n as i32
    });
    let child = kernel.sys_exec(Some(writer), b"").unwrap();

    let mut total = 0usize;
    let mut buf = [0u8; 8];
    loop {
        let n = kernel.sys_read(rfid, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        total += n as usize;
    }
    assert_eq!(total, 64);

    let (_, status) = kernel.sys_wait_child(Some(child)).unwrap();
    assert_eq!(status, Some(64));
}
