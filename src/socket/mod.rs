//! Stream sockets: a three-state (unbound / listener / peer) object
//! built entirely out of two [`Pipe`](crate::ipc::pipe::Pipe)s per
//! connection. No networking happens here — "connect" means "find the
//! listener in this process table and splice two in-process pipes
//! together".

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::error::{KernelError, Result};
use crate::ipc::pipe;
use crate::ipc::stream::StreamObj;
use crate::kernel::{Kernel, KernelState};
use crate::sched;
use crate::types::{Fid, Port, ShutdownMode, NOFILE, NOPORT};

pub enum SocketState {
    Unbound,
    Listener {
        queue: VecDeque<ConnRequest>,
        req_available: Arc<Condvar>,
    },
    Peer {
        peer: usize,
        read_pipe: Option<usize>,
        write_pipe: Option<usize>,
    },
}

pub struct ConnRequest {
    pub admitted: bool,
    pub peer: usize,
    pub connected_cv: Arc<Condvar>,
}

pub struct Socket {
    pub port: Port,
    pub refcount: u32,
    pub fcb: usize,
    pub state: SocketState,
}

impl Socket {
    fn unbound(port: Port, fcb: usize) -> Self {
        Socket {
            port,
            refcount: 1,
            fcb,
            state: SocketState::Unbound,
        }
    }
}

impl Kernel {
    pub fn sys_socket(&self, port: Port) -> Result<Fid> {
        if port != NOPORT && (port < 0 || port > self.config().max_port) {
            return Err(KernelError::InvalidPort(port));
        }
        let pid = sched::current_pid();
        let mut state = self.lock();

        // Reserve the FCB first so installing the fid can't fail after
        // the socket has already been allocated.
        let fcb_idx = state.fcbs.reserve(StreamObj::Socket(usize::MAX));
        let sock_idx = state.alloc_socket(Socket::unbound(port, fcb_idx));
        state.fcbs.get_mut(fcb_idx).unwrap().obj = StreamObj::Socket(sock_idx);

        let fid = state.install_fid(pid, fcb_idx);
        if fid == NOFILE {
            state.fcbs.decref(fcb_idx);
            state.free_socket(sock_idx);
            return Err(KernelError::FileTableFull);
        }
        debug!(pid, fid, port, "sys_socket");
        Ok(fid)
    }

    pub fn sys_listen(&self, sock_fid: Fid) -> Result<()> {
        let pid = sched::current_pid();
        let mut state = self.lock();
        let sock_idx = resolve_socket(&state, pid, sock_fid)?;

        let port = {
            let sock = state.sockets[sock_idx].as_ref().unwrap();
            if !matches!(sock.state, SocketState::Unbound) {
                return Err(KernelError::WrongSocketState);
            }
            sock.port
        };
        if port == NOPORT || port < 0 || port > state.config.max_port {
            return Err(KernelError::InvalidPort(port));
        }
        if state.port_map[port as usize].is_some() {
            return Err(KernelError::PortInUse(port));
        }

        state.port_map[port as usize] = Some(sock_idx);
        state.sockets[sock_idx].as_mut().unwrap().state = SocketState::Listener {
            queue: VecDeque::new(),
            req_available: sched::new_condvar(),
        };
        debug!(pid, port, "sys_listen");
        Ok(())
    }

    pub fn sys_accept(&self, lsock_fid: Fid) -> Result<Fid> {
        let pid = sched::current_pid();
        let mut state = self.lock();
        let lsock_idx = resolve_socket(&state, pid, lsock_fid)?;

        let lport = {
            let sock = state.sockets[lsock_idx].as_ref().ok_or(KernelError::WrongSocketState)?;
            match &sock.state {
                SocketState::Listener { .. } => sock.port,
                _ => return Err(KernelError::WrongSocketState),
            }
        };
        state.sockets[lsock_idx].as_mut().unwrap().refcount += 1;

        let mut request = loop {
            let still_listening = state.port_map[lport as usize] == Some(lsock_idx);
            if !still_listening {
                drop_socket_ref(&mut state, lsock_idx);
                return Err(KernelError::PortNotListening(lport));
            }
            let popped = match &mut state.sockets[lsock_idx].as_mut().unwrap().state {
                SocketState::Listener { queue, .. } => queue.pop_front(),
                _ => None,
            };
            if let Some(req) = popped {
                break req;
            }
            let req_available = match &state.sockets[lsock_idx].as_ref().unwrap().state {
                SocketState::Listener { req_available, .. } => req_available.clone(),
                _ => unreachable!(),
            };
            state = sched::kernel_wait(&req_available, state);
        };

        // Pre-reserve the server FCB/socket before admitting the
        // request, so a full file table never leaves a request
        // admitted with nothing on the other end to signal it into.
        let server_fid = match self.sys_socket_locked(&mut state, lport) {
            Ok(fid) => fid,
            Err(e) => {
                drop_socket_ref(&mut state, lsock_idx);
                return Err(e);
            }
        };
        let server_fcb = state.resolve_fid(pid, server_fid).unwrap();
        let server_sock_idx = match state.fcbs.get(server_fcb).unwrap().obj {
            StreamObj::Socket(idx) => idx,
            _ => unreachable!(),
        };

        let client_sock_idx = request.peer;
        let client_to_server = state.alloc_pipe();
        let server_to_client = state.alloc_pipe();

        wire_peer_pipe(&mut state, client_to_server, client_sock_idx, server_sock_idx);
        wire_peer_pipe(&mut state, server_to_client, server_sock_idx, client_sock_idx);

        state.sockets[client_sock_idx].as_mut().unwrap().state = SocketState::Peer {
            peer: server_sock_idx,
            read_pipe: Some(server_to_client),
            write_pipe: Some(client_to_server),
        };
        state.sockets[server_sock_idx].as_mut().unwrap().state = SocketState::Peer {
            peer: client_sock_idx,
            read_pipe: Some(client_to_server),
            write_pipe: Some(server_to_client),
        };

        request.admitted = true;
        sched::kernel_signal(&request.connected_cv);
        drop_socket_ref(&mut state, lsock_idx);
        debug!(pid, server_fid, "sys_accept");
        Ok(server_fid)
    }

    pub fn sys_connect(&self, sock_fid: Fid, port: Port, timeout: Duration) -> Result<()> {
        let pid = sched::current_pid();
        let mut state = self.lock();
        let sock_idx = resolve_socket(&state, pid, sock_fid)?;

        if port <= NOPORT || port > state.config.max_port {
            return Err(KernelError::InvalidPort(port));
        }
        {
            let sock = state.sockets[sock_idx].as_ref().unwrap();
            if !matches!(sock.state, SocketState::Unbound) {
                return Err(KernelError::WrongSocketState);
            }
        }
        let lsock_idx = state.port_map[port as usize].ok_or(KernelError::PortNotListening(port))?;
        let is_listener = matches!(
            state.sockets[lsock_idx].as_ref().map(|s| &s.state),
            Some(SocketState::Listener { .. })
        );
        if !is_listener {
            return Err(KernelError::PortNotListening(port));
        }

        state.sockets[sock_idx].as_mut().unwrap().refcount += 1;
        state.sockets[sock_idx].as_mut().unwrap().port = port;

        let connected_cv = sched::new_condvar();
        let request = ConnRequest {
            admitted: false,
            peer: sock_idx,
            connected_cv: connected_cv.clone(),
        };
        let req_available = match &mut state.sockets[lsock_idx].as_mut().unwrap().state {
            SocketState::Listener { queue, req_available } => {
                queue.push_back(request);
                req_available.clone()
            }
            _ => unreachable!(),
        };
        sched::kernel_signal(&req_available);

        loop {
            let admitted = matches!(
                state.sockets[sock_idx].as_ref().map(|s| &s.state),
                Some(SocketState::Peer { .. })
            );
            if admitted {
                drop_socket_ref(&mut state, sock_idx);
                debug!(pid, port, "sys_connect accepted");
                return Ok(());
            }
            let listener_gone = state.port_map[port as usize] != Some(lsock_idx);
            if listener_gone {
                drop_socket_ref(&mut state, sock_idx);
                return Err(KernelError::ConnectTimeout);
            }
            let (new_state, timed_out) = sched::kernel_timedwait(&connected_cv, state, timeout);
            state = new_state;
            if timed_out {
                // Per the source: once the wait reports timeout expired,
                // Connect fails — it does not re-check whether admission
                // snuck in during the wake/timeout race. A would-be racing
                // Accept still completes (the peer wiring it did stands),
                // it just leaves this caller's own socket unused.
                drop_socket_ref(&mut state, sock_idx);
                return Err(KernelError::ConnectTimeout);
            }
        }
    }

    pub fn sys_shutdown(&self, sock_fid: Fid, how: ShutdownMode) -> Result<()> {
        let pid = sched::current_pid();
        let mut state = self.lock();
        let sock_idx = resolve_socket(&state, pid, sock_fid)?;

        let (read_pipe, write_pipe) = match &mut state.sockets[sock_idx].as_mut().unwrap().state {
            SocketState::Peer { read_pipe, write_pipe, .. } => (read_pipe, write_pipe),
            _ => return Err(KernelError::WrongSocketState),
        };
        let rp = *read_pipe;
        let wp = *write_pipe;
        if matches!(how, ShutdownMode::Read | ShutdownMode::Both) {
            if let Some(idx) = rp {
                pipe::pipe_reader_close(&mut state, idx);
                if let SocketState::Peer { read_pipe, .. } = &mut state.sockets[sock_idx].as_mut().unwrap().state {
                    *read_pipe = None;
                }
            }
        }
        if matches!(how, ShutdownMode::Write | ShutdownMode::Both) {
            if let Some(idx) = wp {
                pipe::pipe_writer_close(&mut state, idx);
                if let SocketState::Peer { write_pipe, .. } = &mut state.sockets[sock_idx].as_mut().unwrap().state {
                    *write_pipe = None;
                }
            }
        }
        Ok(())
    }

    /// Internal helper used by `sys_accept` to allocate the server-side
    /// socket fid while the kernel mutex is already held.
    fn sys_socket_locked(&self, state: &mut MutexGuard<'_, KernelState>, port: Port) -> Result<Fid> {
        let pid = sched::current_pid();
        let fcb_idx = state.fcbs.reserve(StreamObj::Socket(usize::MAX));
        let sock_idx = state.alloc_socket(Socket::unbound(port, fcb_idx));
        state.fcbs.get_mut(fcb_idx).unwrap().obj = StreamObj::Socket(sock_idx);
        let fid = state.install_fid(pid, fcb_idx);
        if fid == NOFILE {
            state.fcbs.decref(fcb_idx);
            state.free_socket(sock_idx);
            return Err(KernelError::FileTableFull);
        }
        Ok(fid)
    }
}

fn resolve_socket(state: &KernelState, pid: crate::types::Pid, fid: Fid) -> Result<usize> {
    let fcb_idx = state.resolve_fid(pid, fid).ok_or(KernelError::InvalidFid)?;
    match state.fcbs.get(fcb_idx).map(|f| &f.obj) {
        Some(StreamObj::Socket(idx)) => Ok(*idx),
        _ => Err(KernelError::InvalidFid),
    }
}

fn drop_socket_ref(state: &mut KernelState, sock_idx: usize) {
    if let Some(sock) = state.sockets[sock_idx].as_mut() {
        sock.refcount = sock.refcount.saturating_sub(1);
    }
}

fn wire_peer_pipe(state: &mut KernelState, pipe_idx: usize, writer_sock: usize, reader_sock: usize) {
    let writer_fcb = state.sockets[writer_sock].as_ref().unwrap().fcb;
    let reader_fcb = state.sockets[reader_sock].as_ref().unwrap().fcb;
    let pipe = state.pipes[pipe_idx].as_mut().unwrap();
    pipe.writer = Some(writer_fcb);
    pipe.reader = Some(reader_fcb);
}

/// Read from the connected peer's pipe. 0 if the peer's write half is
/// closed and our read half has drained; -1 if not a peer or our read
/// half is already closed.
pub fn socket_read<'a>(
    state: MutexGuard<'a, KernelState>,
    sock_idx: usize,
    buf: &mut [u8],
) -> (MutexGuard<'a, KernelState>, i64) {
    let read_pipe = match state.sockets.get(sock_idx).and_then(|s| s.as_ref()) {
        Some(Socket { state: SocketState::Peer { read_pipe, .. }, .. }) => *read_pipe,
        _ => return (state, -1),
    };
    match read_pipe {
        Some(idx) => pipe::pipe_read(state, idx, buf),
        None => (state, -1),
    }
}

/// Write to the connected peer's pipe. -1 if not a peer, or if either
/// half of the connection has been shut down.
pub fn socket_write<'a>(
    state: MutexGuard<'a, KernelState>,
    sock_idx: usize,
    buf: &[u8],
) -> (MutexGuard<'a, KernelState>, i64) {
    let write_pipe = match state.sockets.get(sock_idx).and_then(|s| s.as_ref()) {
        Some(Socket { state: SocketState::Peer { write_pipe, .. }, .. }) => *write_pipe,
        _ => return (state, -1),
    };
    match write_pipe {
        Some(idx) => pipe::pipe_write(state, idx, buf),
        None => (state, -1),
    }
}

/// Close this end of the socket: if a peer, close both pipe halves on
/// this side; if a listener, clear the port map entry and wake every
/// waiter so they observe the closure instead of blocking forever.
/// Always frees the socket slab slot.
enum ClosePlan {
    None,
    Peer {
        read_pipe: Option<usize>,
        write_pipe: Option<usize>,
    },
    Listener {
        port: Port,
        req_available: Arc<Condvar>,
        pending_cvs: Vec<Arc<Condvar>>,
    },
}

pub fn socket_close(state: &mut KernelState, sock_idx: usize) -> i32 {
    let plan = match state.sockets.get_mut(sock_idx).and_then(|s| s.as_mut()) {
        None => return -1,
        Some(sock) => match &mut sock.state {
            SocketState::Peer { read_pipe, write_pipe, .. } => ClosePlan::Peer {
                read_pipe: read_pipe.take(),
                write_pipe: write_pipe.take(),
            },
            SocketState::Listener { req_available, queue } => ClosePlan::Listener {
                port: sock.port,
                req_available: req_available.clone(),
                pending_cvs: queue.iter().map(|r| r.connected_cv.clone()).collect(),
            },
            SocketState::Unbound => ClosePlan::None,
        },
    };

    match plan {
        ClosePlan::None => {}
        ClosePlan::Peer { read_pipe, write_pipe } => {
            if let Some(idx) = read_pipe {
                pipe::pipe_reader_close(state, idx);
            }
            if let Some(idx) = write_pipe {
                pipe::pipe_writer_close(state, idx);
            }
        }
        ClosePlan::Listener { port, req_available, pending_cvs } => {
            if port >= 0 {
                state.port_map[port as usize] = None;
            }
            sched::kernel_broadcast(&req_available);
            for cv in pending_cvs {
                sched::kernel_broadcast(&cv);
            }
        }
    }

    state.free_socket(sock_idx);
    0
}
