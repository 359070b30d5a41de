//! The file-control-block table: the external collaborator the core is
//! handed, realized as a small reference-counted slab.
//!
//! Each FCB pairs a refcount with a [`StreamObj`](crate::ipc::stream::StreamObj)
//! describing which backend a stream dispatches to. The core only ever
//! reserves, increfs, and decrefs slots; it never inspects the refcount
//! for anything beyond "reached zero".

use crate::ipc::stream::StreamObj;

pub struct Fcb {
    pub refcount: u32,
    pub obj: StreamObj,
}

#[derive(Default)]
pub struct FcbTable {
    slots: Vec<Option<Fcb>>,
    free: Vec<usize>,
}

impl FcbTable {
    pub fn new() -> Self {
        FcbTable::default()
    }

    /// Reserve a fresh FCB with refcount 1, wrapping `obj`. Returns the
    /// slab index (never `None` — the table grows on demand, unlike the
    /// fixed-size process table).
    pub fn reserve(&mut self, obj: StreamObj) -> usize {
        let fcb = Fcb { refcount: 1, obj };
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(fcb);
            idx
        } else {
            self.slots.push(Some(fcb));
            self.slots.len() - 1
        }
    }

    pub fn get(&self, idx: usize) -> Option<&Fcb> {
        self.slots.get(idx).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Fcb> {
        self.slots.get_mut(idx).and_then(|s| s.as_mut())
    }

    pub fn incref(&mut self, idx: usize) {
        if let Some(fcb) = self.get_mut(idx) {
            fcb.refcount += 1;
        }
    }

    /// Decrement the refcount; free the slot and return the stream
    /// object if this was the last reference.
    pub fn decref(&mut self, idx: usize) -> Option<StreamObj> {
        let should_free = match self.get_mut(idx) {
            Some(fcb) => {
                fcb.refcount -= 1;
                fcb.refcount == 0
            }
            None => return None,
        };
        if should_free {
            let fcb = self.slots[idx].take().unwrap();
            self.free.push(idx);
            Some(fcb.obj)
        } else {
            None
        }
    }
}
