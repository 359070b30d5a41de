//! Uniform read/write/close dispatch over the stream backends an FCB
//! can point at: a pipe end, a socket, or a ProcInfo cursor.
//!
//! There is no `Open` variant: every backend in this crate is created
//! directly by its owning syscall (`sys_pipe`, `sys_socket`,
//! `sys_open_info`), never lazily opened by the stream layer itself.
//!
//! Dispatch works from the FCB's slab index rather than holding a
//! borrow of the `StreamObj` across a call: pipe/socket operations can
//! block (releasing the kernel mutex mid-call), so nothing here may
//! keep a reference into the FCB table alive across that release —
//! only plain `usize` slab indices are carried across the wait.

use std::sync::MutexGuard;

use crate::ipc::pipe;
use crate::kernel::KernelState;
use crate::socket;

pub enum StreamObj {
    PipeReader(usize),
    PipeWriter(usize),
    Socket(usize),
    ProcInfo(crate::procinfo::ProcInfoCursor),
}

enum Kind {
    PipeReader(usize),
    PipeWriter(usize),
    Socket(usize),
    ProcInfo,
    Invalid,
}

fn kind_of(state: &KernelState, fcb_idx: usize) -> Kind {
    match state.fcbs.get(fcb_idx).map(|f| &f.obj) {
        Some(StreamObj::PipeReader(idx)) => Kind::PipeReader(*idx),
        Some(StreamObj::PipeWriter(idx)) => Kind::PipeWriter(*idx),
        Some(StreamObj::Socket(idx)) => Kind::Socket(*idx),
        Some(StreamObj::ProcInfo(_)) => Kind::ProcInfo,
        None => Kind::Invalid,
    }
}

/// Dispatch a read. Returns bytes read, 0 on EOF, -1 on error.
pub fn read(state: MutexGuard<'_, KernelState>, fcb_idx: usize, buf: &mut [u8]) -> (MutexGuard<'_, KernelState>, i64) {
    match kind_of(&state, fcb_idx) {
        Kind::PipeReader(idx) => pipe::pipe_read(state, idx, buf),
        Kind::PipeWriter(_) | Kind::Invalid => (state, -1),
        Kind::Socket(idx) => socket::socket_read(state, idx, buf),
        Kind::ProcInfo => {
            let mut state = state;
            let max_args = state.config.procinfo_max_args_size;
            let n = {
                let fcb = state.fcbs.get_mut(fcb_idx).unwrap();
                let cursor = match &mut fcb.obj {
                    StreamObj::ProcInfo(c) => c,
                    _ => unreachable!(),
                };
                cursor.read(&state.procs, max_args, buf)
            };
            (state, n)
        }
    }
}

/// Dispatch a write. Returns bytes written, or -1 on error.
pub fn write(state: MutexGuard<'_, KernelState>, fcb_idx: usize, buf: &[u8]) -> (MutexGuard<'_, KernelState>, i64) {
    match kind_of(&state, fcb_idx) {
        Kind::PipeWriter(idx) => pipe::pipe_write(state, idx, buf),
        Kind::PipeReader(_) | Kind::Invalid | Kind::ProcInfo => (state, -1),
        Kind::Socket(idx) => socket::socket_write(state, idx, buf),
    }
}

/// Dispatch a close. Always succeeds (returns 0); teardown paths never
/// fail per the error-handling design.
pub fn close(state: &mut KernelState, obj: StreamObj) -> i32 {
    match obj {
        StreamObj::PipeReader(idx) => pipe::pipe_reader_close(state, idx),
        StreamObj::PipeWriter(idx) => pipe::pipe_writer_close(state, idx),
        StreamObj::Socket(idx) => socket::socket_close(state, idx),
        StreamObj::ProcInfo(_) => 0,
    }
}
