//! Internal error types.
//!
//! The original external interface reports failure as a scalar sentinel
//! (-1, `NOFILE`, `NOPROC`, ...) on every call. Most `sys_*` methods here
//! return `Result<T, KernelError>` instead, the idiomatic Rust rendering
//! of that same contract — callers who want the old sentinel can still
//! get one with `.unwrap_or(NOFILE)` and friends. A handful of calls
//! whose original signature was already a bare scalar with no room for
//! an error case (`sys_close`, `sys_thread_exit`, `sys_exit`) keep
//! returning that scalar directly; see `DESIGN.md`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("process table exhausted")]
    ProcessTableFull,

    #[error("no such process")]
    NoSuchProcess,

    #[error("file table exhausted")]
    FileTableFull,

    #[error("invalid file id")]
    InvalidFid,

    #[error("no such thread")]
    NoSuchThread,

    #[error("thread is detached")]
    ThreadDetached,

    #[error("port {0} out of range")]
    InvalidPort(i32),

    #[error("port {0} already bound")]
    PortInUse(i32),

    #[error("port {0} has no listener")]
    PortNotListening(i32),

    #[error("socket is not in the required state")]
    WrongSocketState,

    #[error("connection attempt timed out")]
    ConnectTimeout,

    #[error("pipe end already closed")]
    PipeClosed,

    #[error("stream does not support this operation")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, KernelError>;
