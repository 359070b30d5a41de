//! Bounded byte pipe with independently closable ends.
//!
//! A [`Pipe`] is owned jointly by a reader FCB and a writer FCB; the
//! last one to close frees it. Blocking is implemented with two
//! condition variables paired with the single kernel mutex: `has_space`
//! wakes blocked writers, `has_data` wakes blocked readers.

use std::sync::{Arc, Condvar, MutexGuard};

#[cfg(feature = "debug_verbose")]
use tracing::trace;

use crate::kernel::KernelState;
use crate::sched;

pub struct Pipe {
    pub reader: Option<usize>,
    pub writer: Option<usize>,
    buffer: Vec<u8>,
    w_pos: usize,
    r_pos: usize,
    num_elem: usize,
    pub has_space: Arc<Condvar>,
    pub has_data: Arc<Condvar>,
}

impl Pipe {
    pub fn new(capacity: usize) -> Self {
        Pipe {
            reader: None,
            writer: None,
            buffer: vec![0u8; capacity.max(1)],
            w_pos: 0,
            r_pos: 0,
            num_elem: 0,
            has_space: sched::new_condvar(),
            has_data: sched::new_condvar(),
        }
    }

    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn free_space(&self) -> usize {
        self.capacity() - self.num_elem
    }

    fn push_bytes(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.free_space());
        for &b in &src[..n] {
            self.buffer[self.w_pos] = b;
            self.w_pos = (self.w_pos + 1) % self.capacity();
        }
        self.num_elem += n;
        n
    }

    fn pop_bytes(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.num_elem);
        for slot in dst.iter_mut().take(n) {
            *slot = self.buffer[self.r_pos];
            self.r_pos = (self.r_pos + 1) % self.capacity();
        }
        self.num_elem -= n;
        n
    }
}

/// Read up to `buf.len()` bytes. Returns bytes read, 0 on end-of-stream
/// (writer closed, buffer drained), or -1 if the reader end is already
/// gone.
pub fn pipe_read(mut state: MutexGuard<'_, KernelState>, pipe_idx: usize, buf: &mut [u8]) -> (MutexGuard<'_, KernelState>, i64) {
    loop {
        let pipe = match state.pipes.get(pipe_idx) {
            Some(p) => p,
            None => return (state, -1),
        };
        if pipe.reader.is_none() {
            return (state, -1);
        }
        if pipe.num_elem > 0 {
            let n = state.pipes[pipe_idx].as_mut().unwrap().pop_bytes(buf);
            let has_space = state.pipes[pipe_idx].as_ref().unwrap().has_space.clone();
            sched::kernel_signal(&has_space);
            return (state, n as i64);
        }
        if pipe.writer.is_none() {
            return (state, 0);
        }
        let has_data = pipe.has_data.clone();
        let has_space = pipe.has_space.clone();
        sched::kernel_signal(&has_space);
        #[cfg(feature = "debug_verbose")]
        trace!(pipe_idx, "pipe_read blocking: buffer empty, writer still open");
        state = sched::kernel_wait(&has_data, state);
    }
}

/// Write up to `buf.len()` bytes. Returns bytes written, or -1 if
/// either end is already closed.
pub fn pipe_write(mut state: MutexGuard<'_, KernelState>, pipe_idx: usize, buf: &[u8]) -> (MutexGuard<'_, KernelState>, i64) {
    loop {
        let pipe = match state.pipes.get(pipe_idx) {
            Some(p) => p,
            None => return (state, -1),
        };
        if pipe.writer.is_none() || pipe.reader.is_none() {
            return (state, -1);
        }
        if pipe.free_space() > 0 {
            let n = state.pipes[pipe_idx].as_mut().unwrap().push_bytes(buf);
            let has_data = state.pipes[pipe_idx].as_ref().unwrap().has_data.clone();
            sched::kernel_signal(&has_data);
            return (state, n as i64);
        }
        let has_space = pipe.has_space.clone();
        let has_data = pipe.has_data.clone();
        sched::kernel_signal(&has_data);
        #[cfg(feature = "debug_verbose")]
        trace!(pipe_idx, "pipe_write blocking: buffer full");
        state = sched::kernel_wait(&has_space, state);
    }
}

/// Close the reader end. Frees the pipe if the writer end is already
/// gone, otherwise wakes blocked writers so they observe the closure.
pub fn pipe_reader_close(state: &mut KernelState, pipe_idx: usize) -> i32 {
    let (writer_gone, has_space) = {
        let pipe = match state.pipes.get_mut(pipe_idx).and_then(|p| p.as_mut()) {
            Some(p) => p,
            None => return -1,
        };
        pipe.reader = None;
        (pipe.writer.is_none(), pipe.has_space.clone())
    };
    if writer_gone {
        state.free_pipe(pipe_idx);
    } else {
        sched::kernel_broadcast(&has_space);
    }
    0
}

/// Close the writer end. Frees the pipe if the reader end is already
/// gone, otherwise wakes blocked readers so they observe end-of-stream.
pub fn pipe_writer_close(state: &mut KernelState, pipe_idx: usize) -> i32 {
    let (reader_gone, has_data) = {
        let pipe = match state.pipes.get_mut(pipe_idx).and_then(|p| p.as_mut()) {
            Some(p) => p,
            None => return -1,
        };
        pipe.writer = None;
        (pipe.reader.is_none(), pipe.has_data.clone())
    };
    if reader_gone {
        state.free_pipe(pipe_idx);
    } else {
        sched::kernel_broadcast(&has_data);
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;
    use crate::types::Task;

    #[test]
    fn byte_order_preserved_across_partial_reads() {
        let kernel = Kernel::new(crate::config::Config::default());
        let (rfid, wfid) = kernel.sys_pipe().expect("pipe creation should succeed");
        kernel.sys_write(wfid, b"hello world").unwrap();
        kernel.sys_close(wfid);

        let mut collected = Vec::new();
        loop {
            let mut buf = [0u8; 3];
            let n = kernel.sys_read(rfid, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n as usize]);
        }
        assert_eq!(collected, b"hello world");
    }

    #[test]
    fn reading_after_close_with_empty_buffer_returns_eof() {
        let kernel = Kernel::new(crate::config::Config::default());
        let (rfid, wfid) = kernel.sys_pipe().unwrap();
        kernel.sys_close(wfid);
        let mut buf = [0u8; 4];
        assert_eq!(kernel.sys_read(rfid, &mut buf).unwrap(), 0);
    }

    #[test]
    fn exec_reads_a_pipe_and_writes_the_byte_count_to_another() {
        let kernel = Kernel::new(crate::config::Config::default());
        // The first process any caller execs lands on pid 1 and is
        // parentless by the same pid<=1 rule as pid 0 (see kernel_proc.c's
        // `sys_Exec`). Consume that slot with a throwaway init process so
        // the real child below gets pid 2 and a proper parent link.
        kernel.sys_exec(None, b"").unwrap();

        let (in_r, in_w) = kernel.sys_pipe().unwrap();
        let (out_r, out_w) = kernel.sys_pipe().unwrap();

        let task: Task = Box::new(move |k, _args| {
            let mut total = 0i64;
            let mut buf = [0u8; 64];
            loop {
                let n = k.sys_read(in_r, &mut buf).unwrap();
                if n == 0 {
                    break;
                }
                total += n;
            }
            k.sys_write(out_w, &total.to_le_bytes()).ok();
            k.sys_close(out_w);
            total as i32
        });

        let child = kernel.sys_exec(Some(task), b"").unwrap();
        kernel.sys_write(in_w, b"hello").unwrap();
        kernel.sys_close(in_w);
        let (_, status) = kernel.sys_wait_child(Some(child)).unwrap();
        assert_eq!(status, Some(5));

        let mut out_buf = [0u8; 8];
        let n = kernel.sys_read(out_r, &mut out_buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(i64::from_le_bytes(out_buf), 5);
    }
}
