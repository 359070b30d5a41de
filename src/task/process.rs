//! Process manager: `Exec`, `GetPid`/`GetPPid`, `WaitChild`, `Exit`, and
//! the teardown that runs when a process's last thread exits.

use tracing::debug;

use crate::error::{KernelError, Result};
use crate::kernel::{Kernel, KernelState};
use crate::sched;
use crate::task::pcb::{Ptcb, ProcState};
use crate::types::{Pid, Task, NOPROC};

impl Kernel {
    /// Create a new process. `task` is `None` only for the bootstrap
    /// idle process; every other call spawns a main thread that runs
    /// `task` and then calls `sys_thread_exit` with its return value.
    pub fn sys_exec(&self, task: Option<Task>, args: &[u8]) -> Result<Pid> {
        let caller = sched::current_pid();
        let mut state = self.lock();
        let pid = state.acquire_pcb().ok_or(KernelError::ProcessTableFull)?;

        if pid > 1 {
            let fidt_copy = state
                .get_pcb(caller)
                .map(|p| p.fidt.clone())
                .unwrap_or_default();
            for slot in fidt_copy.iter().flatten() {
                state.fcbs.incref(*slot);
            }
            if let Some(parent_pcb) = state.get_pcb_mut(caller) {
                parent_pcb.children.push_back(pid);
            }
            let child_pcb = state.get_pcb_mut(pid).unwrap();
            child_pcb.parent = Some(caller);
            child_pcb.fidt = fidt_copy;
        }

        state.get_pcb_mut(pid).unwrap().args = args.to_vec();

        if let Some(task) = task {
            let tid = state.next_tid();
            {
                let pcb = state.get_pcb_mut(pid).unwrap();
                pcb.ptcbs.push(Ptcb::new(tid));
                pcb.thread_count += 1;
                pcb.has_main_task = true;
            }
            drop(state);
            let kernel = self.clone();
            let args_owned = args.to_vec();
            sched::spawn_thread(move || {
                sched::set_current(pid, tid);
                let exitval = task(kernel.clone(), &args_owned);
                kernel.sys_thread_exit(exitval);
            });
        }

        debug!(pid, caller, "sys_exec");
        Ok(pid)
    }

    pub fn sys_getpid(&self) -> Pid {
        sched::current_pid()
    }

    pub fn sys_getppid(&self) -> Pid {
        let pid = sched::current_pid();
        self.lock().get_pcb(pid).and_then(|p| p.parent).unwrap_or(NOPROC)
    }

    /// Wait for `cpid` (or any child, if `None`). Returns the reaped
    /// child's pid and its exit status.
    pub fn sys_wait_child(&self, cpid: Option<Pid>) -> Result<(Pid, Option<i32>)> {
        match cpid {
            Some(cpid) => self.wait_for_specific_child(cpid),
            None => self.wait_for_any_child(),
        }
    }

    fn wait_for_specific_child(&self, cpid: Pid) -> Result<(Pid, Option<i32>)> {
        let parent_pid = sched::current_pid();
        let mut state = self.lock();

        if cpid < 0 || cpid as usize >= state.procs.len() {
            return Err(KernelError::NoSuchProcess);
        }
        let is_my_child = state
            .get_pcb(cpid)
            .map(|c| c.parent == Some(parent_pid))
            .unwrap_or(false);
        if !is_my_child {
            return Err(KernelError::NoSuchProcess);
        }

        loop {
            let alive = state
                .get_pcb(cpid)
                .map(|c| c.state == ProcState::Alive)
                .unwrap_or(false);
            if !alive {
                break;
            }
            let child_exit = state.get_pcb(parent_pid).unwrap().child_exit.clone();
            state = sched::kernel_wait(&child_exit, state);
        }

        let status = reap_zombie(&mut state, parent_pid, cpid);
        Ok((cpid, status))
    }

    fn wait_for_any_child(&self) -> Result<(Pid, Option<i32>)> {
        let parent_pid = sched::current_pid();
        let mut state = self.lock();

        loop {
            let no_children = state
                .get_pcb(parent_pid)
                .map(|p| p.children.is_empty())
                .unwrap_or(true);
            if no_children {
                return Err(KernelError::NoSuchProcess);
            }
            let exited_front = state
                .get_pcb(parent_pid)
                .and_then(|p| p.exited.front().copied());
            if let Some(cpid) = exited_front {
                let status = reap_zombie(&mut state, parent_pid, cpid);
                return Ok((cpid, status));
            }
            let child_exit = state.get_pcb(parent_pid).unwrap().child_exit.clone();
            state = sched::kernel_wait(&child_exit, state);
        }
    }

    /// Record the exit status and, if this is the init process, drain
    /// every child before the calling thread's own `sys_thread_exit`
    /// runs process teardown. Returns `exitval` unchanged so a task
    /// closure can write `return kernel.sys_exit(code);` as its last
    /// statement.
    pub fn sys_exit(&self, exitval: i32) -> i32 {
        let pid = sched::current_pid();
        {
            let mut state = self.lock();
            if let Some(pcb) = state.get_pcb_mut(pid) {
                pcb.exitval = exitval;
            }
        }
        if pid == 1 {
            while self.sys_wait_child(None).is_ok() {}
        }
        exitval
    }
}

fn reap_zombie(state: &mut KernelState, parent_pid: Pid, cpid: Pid) -> Option<i32> {
    let status = state.get_pcb(cpid).map(|c| c.exitval);
    if let Some(parent) = state.get_pcb_mut(parent_pid) {
        parent.children.retain(|&c| c != cpid);
        parent.exited.retain(|&c| c != cpid);
    }
    state.release_pcb(cpid);
    status
}

/// Runs when a process's thread count reaches zero: reparent surviving
/// children to init, publish this process's zombie status to its
/// parent, release its FIDT, and free every PTCB (waking any
/// outstanding joiners first, so no joiner is ever left blocked on a
/// condvar whose backing PTCB is about to disappear).
pub(crate) fn teardown_process(state: &mut KernelState, pid: Pid) {
    if pid != 1 {
        if let Some(parent_pid) = state.get_pcb(pid).and_then(|p| p.parent) {
            let (children, exited) = {
                let pcb = state.get_pcb_mut(pid).unwrap();
                (
                    std::mem::take(&mut pcb.children),
                    std::mem::take(&mut pcb.exited),
                )
            };
            for child in &children {
                if let Some(child_pcb) = state.get_pcb_mut(*child) {
                    child_pcb.parent = Some(1);
                }
            }
            if !children.is_empty() || !exited.is_empty() {
                if let Some(init_pcb) = state.get_pcb_mut(1) {
                    init_pcb.children.extend(children);
                    init_pcb.exited.extend(exited);
                }
                let init_cv = state.get_pcb(1).unwrap().child_exit.clone();
                sched::kernel_broadcast(&init_cv);
            }

            if let Some(parent_pcb) = state.get_pcb_mut(parent_pid) {
                // LIFO on the parent side: push to the front so WaitChild(any)
                // reaps the most-recently-exited zombie first.
                parent_pcb.exited.push_front(pid);
            }
            let parent_cv = state.get_pcb(parent_pid).unwrap().child_exit.clone();
            sched::kernel_broadcast(&parent_cv);
        }
    }

    let fidt = {
        let pcb = state.get_pcb_mut(pid).unwrap();
        pcb.args.clear();
        pcb.has_main_task = false;
        std::mem::take(&mut pcb.fidt)
    };
    for slot in fidt.into_iter().flatten() {
        if let Some(obj) = state.fcbs.decref(slot) {
            crate::ipc::stream::close(state, obj);
        }
    }

    state.get_pcb_mut(pid).unwrap().state = ProcState::Zombie;

    let joiner_cvs: Vec<_> = state
        .get_pcb(pid)
        .unwrap()
        .ptcbs
        .iter()
        .map(|p| p.exit_cv.clone())
        .collect();
    for cv in joiner_cvs {
        sched::kernel_broadcast(&cv);
    }
    // Every remaining PTCB is already `exited` by construction (thread_count
    // only reaches zero once each thread has run its own sys_thread_exit).
    // Keep the ones a blocked joiner still holds a refcount on — it wakes
    // from the broadcast above, reads the exit value, and removes its own
    // PTCB the same way sys_thread_join always does. Dropping them here
    // instead would let the joiner wake into a PTCB that no longer exists.
    state.get_pcb_mut(pid).unwrap().ptcbs.retain(|p| p.refcount > 0);
}
