//! Scalar handle types and sentinels shared across the syscall surface.
//!
//! These mirror the external interface table: every handle is a plain
//! integer with a reserved "absent" value, so a failed call can return a
//! sentinel instead of an `Option`/`Result` crossing the syscall boundary.

use std::time::Duration;

/// Process id. Negative values never occur; `NOPROC` is the absent sentinel.
pub type Pid = i64;

/// Thread id: an opaque generated handle, not a pointer. See the design
/// note on thread identity in `DESIGN.md`.
pub type Tid = u64;

/// Index into a process's file id table.
pub type Fid = i64;

/// Socket port number.
pub type Port = i32;

pub const NOPROC: Pid = -1;
pub const NOFILE: Fid = -1;
pub const NOTHREAD: Tid = 0;
pub const NOPORT: Port = -1;

/// A user task: an owned closure given a handle back into the kernel
/// (to make further syscalls) and its argument bytes, returning an exit
/// code. Executed on its own OS thread by the `sched` shim.
pub type Task = Box<dyn FnOnce(crate::kernel::Kernel, &[u8]) -> i32 + Send + 'static>;

/// Which half (or both) of a connected socket to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    Read,
    Write,
    Both,
}

/// A snapshot record of one process table slot, as produced by the
/// ProcInfo stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcInfo {
    pub pid: Pid,
    pub ppid: Pid,
    pub alive: bool,
    pub thread_count: u32,
    /// Whether the process has a main task (the original's `main_task`
    /// field, a nullable function pointer — see `Pcb::has_main_task`).
    pub has_main_task: bool,
    pub argl: usize,
    pub args: Vec<u8>,
}

/// Default timeout helper: `Duration::MAX` reads as "block forever" at
/// call sites that accept an optional timeout.
pub const NO_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);
