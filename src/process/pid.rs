// Process slot allocator
use crate::config::MAX_PROCESSES;
use crate::process::pcb::{ProcessError, ProcessId};

const _: () = assert!(MAX_PROCESSES <= u32::BITS as usize);

/// Busy/free bitmap over the fixed pid range. First fit, no reuse ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PidAllocator {
    busy: u32,
}

impl PidAllocator {
    pub const fn new() -> Self {
        Self { busy: 0 }
    }

    pub fn allocate(&mut self) -> Result<ProcessId, ProcessError> {
        let pid = (0..MAX_PROCESSES)
            .find(|&pid| !self.is_busy(pid))
            .ok_or(ProcessError::ResourceExhausted)?;
        self.busy |= 1 << pid;
        Ok(pid)
    }

    pub fn release(&mut self, pid: ProcessId) {
        if pid < MAX_PROCESSES {
            self.busy &= !(1 << pid);
        }
    }

    pub fn is_busy(&self, pid: ProcessId) -> bool {
        pid < MAX_PROCESSES && self.busy & (1 << pid) != 0
    }

    pub fn live(&self) -> usize {
        self.busy.count_ones() as usize
    }
}
