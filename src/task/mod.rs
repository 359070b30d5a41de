//! Process and thread lifecycle management.

pub mod pcb;
pub mod process;
pub mod thread;
