//! The kernel: one global mutex guarding every shared table, wrapped in
//! a cheaply cloneable handle so spawned task threads can call back
//! into it.
//!
//! Every mutation of the process table, port map, or any slab happens
//! while the single [`KernelState`] mutex is held; every blocking wait
//! is a `Condvar` paired with that same mutex, cloned out of the locked
//! state before the call so the borrow checker never has to reconcile
//! a condvar reference that outlives its guard.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::Config;
use crate::error::{KernelError, Result};
use crate::fcb::FcbTable;
use crate::ipc::pipe::Pipe;
use crate::ipc::stream::StreamObj;
use crate::sched;
use crate::socket::Socket;
use crate::task::pcb::{Pcb, ProcState};
use crate::types::{Fid, Pid, NOFILE};

pub struct KernelState {
    pub config: Config,
    pub procs: Vec<Option<Pcb>>,
    pub proc_free: Vec<usize>,
    pub process_count: usize,
    pub pipes: Vec<Option<Pipe>>,
    pub pipe_free: Vec<usize>,
    pub sockets: Vec<Option<Socket>>,
    pub socket_free: Vec<usize>,
    pub port_map: Vec<Option<usize>>,
    pub fcbs: FcbTable,
    pub next_tid: u64,
}

impl KernelState {
    fn new(config: Config) -> Self {
        let mut procs = Vec::with_capacity(config.max_proc);
        let mut proc_free = Vec::with_capacity(config.max_proc);
        for i in 0..config.max_proc {
            procs.push(Some(Pcb::new_free(config.max_fileid)));
            proc_free.push(config.max_proc - 1 - i);
        }
        KernelState {
            config,
            procs,
            proc_free,
            process_count: 0,
            pipes: Vec::new(),
            pipe_free: Vec::new(),
            sockets: Vec::new(),
            socket_free: Vec::new(),
            port_map: vec![None; (config.max_port + 1).max(1) as usize],
            fcbs: FcbTable::new(),
            next_tid: 1,
        }
    }

    /// Must be called with the kernel mutex already held (it is — this
    /// takes `&mut self`).
    pub fn acquire_pcb(&mut self) -> Option<Pid> {
        let idx = self.proc_free.pop()?;
        self.procs[idx] = Some(Pcb::new_free(self.config.max_fileid));
        self.procs[idx].as_mut().unwrap().state = ProcState::Alive;
        self.process_count += 1;
        Some(idx as Pid)
    }

    pub fn release_pcb(&mut self, pid: Pid) {
        if let Some(slot) = self.procs.get_mut(pid as usize) {
            *slot = Some(Pcb::new_free(self.config.max_fileid));
            self.proc_free.push(pid as usize);
            self.process_count -= 1;
        }
    }

    pub fn get_pcb(&self, pid: Pid) -> Option<&Pcb> {
        if pid < 0 {
            return None;
        }
        self.procs
            .get(pid as usize)
            .and_then(|p| p.as_ref())
            .filter(|pcb| pcb.state != ProcState::Free)
    }

    pub fn get_pcb_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        if pid < 0 {
            return None;
        }
        self.procs
            .get_mut(pid as usize)
            .and_then(|p| p.as_mut())
            .filter(|pcb| pcb.state != ProcState::Free)
    }

    pub fn alloc_pipe(&mut self) -> usize {
        let pipe = Pipe::new(self.config.pipe_buffer_size);
        if let Some(idx) = self.pipe_free.pop() {
            self.pipes[idx] = Some(pipe);
            idx
        } else {
            self.pipes.push(Some(pipe));
            self.pipes.len() - 1
        }
    }

    pub fn free_pipe(&mut self, idx: usize) {
        if idx < self.pipes.len() {
            self.pipes[idx] = None;
            self.pipe_free.push(idx);
        }
    }

    pub fn alloc_socket(&mut self, socket: Socket) -> usize {
        if let Some(idx) = self.socket_free.pop() {
            self.sockets[idx] = Some(socket);
            idx
        } else {
            self.sockets.push(Some(socket));
            self.sockets.len() - 1
        }
    }

    pub fn free_socket(&mut self, idx: usize) {
        if idx < self.sockets.len() {
            self.sockets[idx] = None;
            self.socket_free.push(idx);
        }
    }

    pub fn next_tid(&mut self) -> u64 {
        let t = self.next_tid;
        self.next_tid += 1;
        t
    }

    /// Install `fcb_idx` at the lowest free Fid slot in `pid`'s FIDT.
    pub fn install_fid(&mut self, pid: Pid, fcb_idx: usize) -> Fid {
        let pcb = self.get_pcb_mut(pid).expect("installing fid on live pcb");
        if let Some(slot) = pcb.fidt.iter().position(|f| f.is_none()) {
            pcb.fidt[slot] = Some(fcb_idx);
            slot as Fid
        } else {
            NOFILE
        }
    }

    pub fn resolve_fid(&self, pid: Pid, fid: Fid) -> Option<usize> {
        if fid < 0 {
            return None;
        }
        self.get_pcb(pid)?.fidt.get(fid as usize).copied().flatten()
    }
}

#[derive(Clone)]
pub struct Kernel {
    state: Arc<Mutex<KernelState>>,
}

impl Kernel {
    /// Build a fresh kernel and claim pid 0 for the calling thread,
    /// matching `initialize_processes`'s contract that pid 0 is the
    /// parentless scheduler process and that boot code runs as it
    /// without being separately spawned. The first real `sys_exec`
    /// call any caller makes afterward lands on pid 1 (also parentless
    /// by the pid <= 1 rule) and becomes the init process.
    pub fn new(config: Config) -> Self {
        let mut inner = KernelState::new(config);
        let pid0 = inner.acquire_pcb().expect("fresh process table has room for pid 0");
        debug_assert_eq!(pid0, 0, "the first acquired pcb must be pid 0");
        let kernel = Kernel {
            state: Arc::new(Mutex::new(inner)),
        };
        sched::set_current(0, 0);
        kernel
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, KernelState> {
        self.state.lock().expect("kernel mutex poisoned")
    }

    pub fn config(&self) -> Config {
        self.lock().config
    }

    pub fn process_count(&self) -> usize {
        self.lock().process_count
    }

    // ---- Pipe ----

    pub fn sys_pipe(&self) -> Result<(Fid, Fid)> {
        let mut state = self.lock();
        let pipe_idx = state.alloc_pipe();
        let pid = sched::current_pid();

        let reader_fcb = state.fcbs.reserve(StreamObj::PipeReader(pipe_idx));
        let writer_fcb = state.fcbs.reserve(StreamObj::PipeWriter(pipe_idx));
        let rfid = state.install_fid(pid, reader_fcb);
        let wfid = state.install_fid(pid, writer_fcb);
        if rfid == NOFILE || wfid == NOFILE {
            state.fcbs.decref(reader_fcb);
            state.fcbs.decref(writer_fcb);
            state.free_pipe(pipe_idx);
            return Err(KernelError::FileTableFull);
        }
        state.pipes[pipe_idx].as_mut().unwrap().reader = Some(reader_fcb);
        state.pipes[pipe_idx].as_mut().unwrap().writer = Some(writer_fcb);
        debug!(pid, rfid, wfid, "sys_pipe");
        Ok((rfid, wfid))
    }

    pub fn sys_read(&self, fid: Fid, buf: &mut [u8]) -> Result<i64> {
        let pid = sched::current_pid();
        let state = self.lock();
        let fcb_idx = state.resolve_fid(pid, fid).ok_or(KernelError::InvalidFid)?;
        let (_, n) = crate::ipc::stream::read(state, fcb_idx, buf);
        debug!(pid, fid, n, "sys_read");
        Ok(n)
    }

    pub fn sys_write(&self, fid: Fid, buf: &[u8]) -> Result<i64> {
        let pid = sched::current_pid();
        let state = self.lock();
        let fcb_idx = state.resolve_fid(pid, fid).ok_or(KernelError::InvalidFid)?;
        let (_, n) = crate::ipc::stream::write(state, fcb_idx, buf);
        debug!(pid, fid, n, "sys_write");
        Ok(n)
    }

    /// Close `fid` in the calling process's FIDT: decref the FCB and,
    /// if this was the last reference, dispatch the stream's close.
    pub fn sys_close(&self, fid: Fid) -> i32 {
        let pid = sched::current_pid();
        let mut state = self.lock();
        let fcb_idx = match state.resolve_fid(pid, fid) {
            Some(i) => i,
            None => return -1,
        };
        if let Some(pcb) = state.get_pcb_mut(pid) {
            pcb.fidt[fid as usize] = None;
        }
        if let Some(obj) = state.fcbs.decref(fcb_idx) {
            return crate::ipc::stream::close(&mut state, obj);
        }
        0
    }

    // ---- ProcInfo ----

    pub fn sys_open_info(&self) -> Fid {
        let pid = sched::current_pid();
        let mut state = self.lock();
        let fcb_idx = state
            .fcbs
            .reserve(StreamObj::ProcInfo(crate::procinfo::ProcInfoCursor::new()));
        let fid = state.install_fid(pid, fcb_idx);
        if fid == NOFILE {
            state.fcbs.decref(fcb_idx);
        }
        fid
    }
}
