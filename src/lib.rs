//! A small educational kernel's core concurrency and I/O subsystems:
//! process/thread lifecycle management, anonymous pipes, and stream
//! sockets built on top of those pipes.
//!
//! Everything hangs off a single [`Kernel`] value, itself a thin,
//! cloneable handle around one global mutex. Call [`logging::init`]
//! once at process startup if you want `RUST_LOG`-filtered tracing
//! output; the library itself never installs a subscriber.

pub mod config;
pub mod error;
pub mod fcb;
pub mod ipc;
pub mod kernel;
pub mod logging;
pub mod procinfo;
pub mod sched;
pub mod socket;
pub mod task;
pub mod types;

pub use config::Config;
pub use error::{KernelError, Result};
pub use kernel::Kernel;
pub use types::{Fid, Pid, ShutdownMode, Task, Tid, NOFILE, NOPORT, NOPROC, NOTHREAD};
