//! Thread manager: `CreateThread`, `ThreadJoin`, `ThreadDetach`,
//! `ThreadExit`, all scoped to PTCBs hanging off the current process's
//! PCB.

use tracing::debug;

use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::sched;
use crate::task::pcb::Ptcb;
use crate::task::process::teardown_process;
use crate::types::Task;
use crate::types::Tid;

impl Kernel {
    /// Spawn a new thread in the calling process, running `task` on a
    /// fresh OS thread. Returns the new thread's generated id.
    pub fn sys_create_thread(&self, task: Task, args: &[u8]) -> Tid {
        let pid = sched::current_pid();
        let mut state = self.lock();
        let tid = state.next_tid();
        if let Some(pcb) = state.get_pcb_mut(pid) {
            pcb.ptcbs.push(Ptcb::new(tid));
            pcb.thread_count += 1;
        }
        drop(state);

        let kernel = self.clone();
        let args_owned = args.to_vec();
        sched::spawn_thread(move || {
            sched::set_current(pid, tid);
            let exitval = task(kernel.clone(), &args_owned);
            kernel.sys_thread_exit(exitval);
        });
        debug!(pid, tid, "sys_create_thread");
        tid
    }

    pub fn sys_thread_self(&self) -> Tid {
        sched::current_tid()
    }

    /// Block until `tid` exits, returning its exit value. Fails if
    /// `tid` is not a thread of the calling process, is the caller
    /// itself, or is (or becomes) detached.
    pub fn sys_thread_join(&self, tid: Tid) -> Result<i32> {
        let pid = sched::current_pid();
        if tid == sched::current_tid() {
            return Err(KernelError::NoSuchThread);
        }

        let mut state = self.lock();
        {
            let pcb = state.get_pcb(pid).ok_or(KernelError::NoSuchProcess)?;
            let idx = pcb.find_ptcb(tid).ok_or(KernelError::NoSuchThread)?;
            if pcb.ptcbs[idx].detached {
                return Err(KernelError::ThreadDetached);
            }
        }
        {
            let pcb = state.get_pcb_mut(pid).unwrap();
            let idx = pcb.find_ptcb(tid).unwrap();
            pcb.ptcbs[idx].refcount += 1;
        }

        loop {
            let (done, cv) = {
                let pcb = state.get_pcb(pid).ok_or(KernelError::NoSuchProcess)?;
                let idx = pcb.find_ptcb(tid).ok_or(KernelError::NoSuchThread)?;
                let ptcb = &pcb.ptcbs[idx];
                (ptcb.exited || ptcb.detached, ptcb.exit_cv.clone())
            };
            if done {
                break;
            }
            state = sched::kernel_wait(&cv, state);
        }

        let pcb = state.get_pcb_mut(pid).ok_or(KernelError::NoSuchProcess)?;
        let idx = pcb.find_ptcb(tid).ok_or(KernelError::NoSuchThread)?;
        if pcb.ptcbs[idx].detached {
            pcb.ptcbs[idx].refcount -= 1;
            return Err(KernelError::ThreadDetached);
        }
        let exitval = pcb.ptcbs[idx].exitval;
        pcb.ptcbs[idx].refcount -= 1;
        if pcb.ptcbs[idx].refcount == 0 {
            pcb.ptcbs.remove(idx);
        }
        Ok(exitval)
    }

    /// Mark `tid` detached, waking any joiner so it observes the
    /// detach and fails rather than blocking forever.
    pub fn sys_thread_detach(&self, tid: Tid) -> Result<()> {
        let pid = sched::current_pid();
        let mut state = self.lock();
        let pcb = state.get_pcb_mut(pid).ok_or(KernelError::NoSuchProcess)?;
        let idx = pcb.find_ptcb(tid).ok_or(KernelError::NoSuchThread)?;
        if pcb.ptcbs[idx].exited {
            return Err(KernelError::NoSuchThread);
        }
        pcb.ptcbs[idx].detached = true;
        let cv = pcb.ptcbs[idx].exit_cv.clone();
        sched::kernel_broadcast(&cv);
        Ok(())
    }

    /// Terminate the calling thread. If it is the last thread in its
    /// process, runs full process teardown before returning.
    pub fn sys_thread_exit(&self, exitval: i32) {
        let pid = sched::current_pid();
        let tid = sched::current_tid();
        let mut state = self.lock();

        let (remaining, cv) = {
            let pcb = match state.get_pcb_mut(pid) {
                Some(p) => p,
                None => return,
            };
            if let Some(idx) = pcb.find_ptcb(tid) {
                pcb.ptcbs[idx].exited = true;
                pcb.ptcbs[idx].exitval = exitval;
            }
            pcb.thread_count = pcb.thread_count.saturating_sub(1);
            let cv = pcb.find_ptcb(tid).map(|idx| pcb.ptcbs[idx].exit_cv.clone());
            (pcb.thread_count, cv)
        };
        if let Some(cv) = cv {
            sched::kernel_broadcast(&cv);
        }
        debug!(pid, tid, exitval, remaining, "sys_thread_exit");
        if remaining == 0 {
            teardown_process(&mut state, pid);
        }
    }
}
