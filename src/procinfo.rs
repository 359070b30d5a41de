//! Read-only iterator over live process table slots, exposed as a
//! stream via `sys_open_info`.

use crate::task::pcb::Pcb;
use crate::types::{Pid, ProcInfo};

/// Cursor state for one open ProcInfo stream. Advances monotonically
/// through the process table; once it walks off the end it stays at
/// EOF for the lifetime of the stream.
pub struct ProcInfoCursor {
    next_pid: Pid,
}

impl ProcInfoCursor {
    pub fn new() -> Self {
        ProcInfoCursor { next_pid: 0 }
    }

    /// Serialize the next live slot into `buf`, truncating to `buf`'s
    /// length if it is smaller than the record. Returns the byte count
    /// written, or 0 once the cursor has walked past the last slot.
    ///
    /// Takes the process table and arg-size cap as plain field
    /// borrows (not the whole `KernelState`) so a caller can hold this
    /// call alongside an outstanding mutable borrow of a sibling field
    /// such as the FCB table.
    pub fn read(&mut self, procs: &[Option<Pcb>], procinfo_max_args_size: usize, buf: &mut [u8]) -> i64 {
        let max_proc = procs.len() as Pid;
        while self.next_pid < max_proc {
            let pid = self.next_pid;
            self.next_pid += 1;
            if let Some(pcb) = procs[pid as usize].as_ref() {
                let info = ProcInfo {
                    pid,
                    ppid: pcb.parent.unwrap_or(crate::types::NOPROC),
                    alive: pcb.state == crate::task::pcb::ProcState::Alive,
                    thread_count: pcb.thread_count,
                    has_main_task: pcb.has_main_task,
                    argl: pcb.args.len(),
                    args: {
                        let cap = procinfo_max_args_size.min(pcb.args.len());
                        pcb.args[..cap].to_vec()
                    },
                };
                return encode(&info, procinfo_max_args_size, buf);
            }
        }
        0
    }
}

impl Default for ProcInfoCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed wire layout, every record exactly `RECORD_HEADER_LEN +
/// procinfo_max_args_size` bytes regardless of the process's actual
/// argument length: pid, ppid, alive, thread_count, has_main_task, argl
/// as little-endian integers, followed by the argument bytes zero-padded
/// out to the cap. A constant record size is what makes the stream
/// seekable by record index; a variable-length tail would defeat that.
const RECORD_HEADER_LEN: usize = 8 + 8 + 1 + 4 + 1 + 8;

fn encode(info: &ProcInfo, procinfo_max_args_size: usize, buf: &mut [u8]) -> i64 {
    let mut record = vec![0u8; RECORD_HEADER_LEN + procinfo_max_args_size];
    let mut off = 0;
    record[off..off + 8].copy_from_slice(&info.pid.to_le_bytes());
    off += 8;
    record[off..off + 8].copy_from_slice(&info.ppid.to_le_bytes());
    off += 8;
    record[off] = info.alive as u8;
    off += 1;
    record[off..off + 4].copy_from_slice(&info.thread_count.to_le_bytes());
    off += 4;
    record[off] = info.has_main_task as u8;
    off += 1;
    record[off..off + 8].copy_from_slice(&(info.argl as u64).to_le_bytes());
    off += 8;
    record[off..off + info.args.len()].copy_from_slice(&info.args);

    let n = record.len().min(buf.len());
    buf[..n].copy_from_slice(&record[..n]);
    n as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;

    #[test]
    fn cursor_skips_free_slots_and_reaches_eof() {
        let kernel = Kernel::new(crate::config::Config { max_proc: 4, ..Default::default() });
        let fid = kernel.sys_open_info();
        assert_ne!(fid, crate::types::NOFILE);

        let mut buf = [0u8; 256];
        let mut records = 0;
        loop {
            let n = kernel.sys_read(fid, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            records += 1;
        }
        // pid 0 (idle) and pid 1 (init) always exist by construction.
        assert!(records >= 2);
    }
}
