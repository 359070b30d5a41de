//! Minimal stand-in for the low-level scheduler the core consumes but
//! does not define: `spawn_thread`, `wakeup`, `kernel_wait`,
//! `kernel_timedwait`, `kernel_signal`, `kernel_broadcast`.
//!
//! This module deliberately does nothing clever: one real OS thread per
//! simulated user thread, condition variables for blocking, a
//! thread-local for "who am I". There is no run queue, no priority, no
//! preemption — those concerns belong to a real scheduler, not to this
//! crate.

use std::cell::Cell;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::types::{Pid, Tid};

thread_local! {
    static CURRENT_PID: Cell<Pid> = Cell::new(crate::types::NOPROC);
    static CURRENT_TID: Cell<Tid> = Cell::new(crate::types::NOTHREAD);
}

/// Record which (pid, tid) the calling OS thread represents. Called once
/// by the trampoline before running the user task.
pub fn set_current(pid: Pid, tid: Tid) {
    CURRENT_PID.with(|c| c.set(pid));
    CURRENT_TID.with(|c| c.set(tid));
}

pub fn current_pid() -> Pid {
    CURRENT_PID.with(|c| c.get())
}

pub fn current_tid() -> Tid {
    CURRENT_TID.with(|c| c.get())
}

/// Spawn a trampoline OS thread. `body` runs with the kernel mutex
/// *not* held; it is expected to take the lock itself as needed.
pub fn spawn_thread<F>(body: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name("tinyos-task".into())
        .spawn(body)
        .expect("failed to spawn OS thread for simulated task")
}

/// Wait on `cv` against `guard`, looping is the caller's job: this just
/// wraps `Condvar::wait` so call sites read like the single-mutex model
/// in the design notes.
pub fn kernel_wait<'a, T>(cv: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    cv.wait(guard).expect("kernel mutex poisoned")
}

/// Timed wait; returns the guard and whether the timeout elapsed before
/// being notified.
pub fn kernel_timedwait<'a, T>(
    cv: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
) -> (MutexGuard<'a, T>, bool) {
    let (guard, result) = cv
        .wait_timeout(guard, timeout)
        .expect("kernel mutex poisoned");
    (guard, result.timed_out())
}

pub fn kernel_signal(cv: &Condvar) {
    cv.notify_one();
}

pub fn kernel_broadcast(cv: &Condvar) {
    cv.notify_all();
}

/// A freshly allocated, independently waitable condvar, always paired
/// with the single kernel mutex it is cloned alongside.
pub fn new_condvar() -> Arc<Condvar> {
    Arc::new(Condvar::new())
}

/// The one kernel-wide mutex type every condvar above must be paired
/// with. Exposed here only so `kernel.rs` can name the type without
/// depending on a specific `std` path.
pub type KernelMutex<T> = Mutex<T>;
