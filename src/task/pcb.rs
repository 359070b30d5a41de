//! Process and thread control block data types.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar};

use crate::sched;
use crate::types::{Pid, Tid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Free,
    Alive,
    Zombie,
}

pub struct Ptcb {
    pub tid: Tid,
    pub exitval: i32,
    pub exited: bool,
    pub detached: bool,
    pub refcount: u32,
    pub exit_cv: Arc<Condvar>,
}

impl Ptcb {
    pub fn new(tid: Tid) -> Self {
        Ptcb {
            tid,
            exitval: 0,
            exited: false,
            detached: false,
            refcount: 0,
            exit_cv: sched::new_condvar(),
        }
    }
}

pub struct Pcb {
    pub state: ProcState,
    pub parent: Option<Pid>,
    pub children: VecDeque<Pid>,
    pub exited: VecDeque<Pid>,
    pub args: Vec<u8>,
    pub fidt: Vec<Option<usize>>,
    pub thread_count: u32,
    /// Whether `sys_exec` was given a task closure to run. The original's
    /// `main_task` field is a nullable function pointer; a moved-from
    /// `Box<dyn FnOnce>` has no stable address once its thread has been
    /// spawned, so this tracks the same presence/absence as a plain bool.
    pub has_main_task: bool,
    pub child_exit: Arc<Condvar>,
    pub exitval: i32,
    pub ptcbs: Vec<Ptcb>,
}

impl Pcb {
    pub fn new_free(max_fileid: usize) -> Self {
        Pcb {
            state: ProcState::Free,
            parent: None,
            children: VecDeque::new(),
            exited: VecDeque::new(),
            args: Vec::new(),
            fidt: vec![None; max_fileid],
            thread_count: 0,
            has_main_task: false,
            child_exit: sched::new_condvar(),
            exitval: 0,
            ptcbs: Vec::new(),
        }
    }

    pub fn find_ptcb(&self, tid: Tid) -> Option<usize> {
        self.ptcbs.iter().position(|p| p.tid == tid)
    }
}
