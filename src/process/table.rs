// Process table: pid bitmap, PCB arena and the current process
use core::ptr::NonNull;

use crate::config::MAX_PROCESSES;
use crate::process::context::Continuation;
use crate::process::fd::DescriptorTable;
use crate::process::pcb::{ProcessControlBlock, ProcessError, ProcessId};
use crate::process::pid::PidAllocator;

/// All process state of the kernel, passed explicitly instead of living in
/// globals. `ProcessService` keeps it behind a lock and only mutates pids,
/// mappings and the current process with interrupts off.
#[derive(Debug)]
pub struct ProcessTable {
    pids: PidAllocator,
    pcbs: [ProcessControlBlock; MAX_PROCESSES],
    current: Option<ProcessId>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            pids: PidAllocator::new(),
            pcbs: core::array::from_fn(ProcessControlBlock::vacant),
            current: None,
        }
    }

    pub fn allocate_pid(&mut self) -> Result<ProcessId, ProcessError> {
        self.pids.allocate()
    }

    pub fn release_pid(&mut self, pid: ProcessId) {
        self.pids.release(pid);
    }

    pub fn is_live(&self, pid: ProcessId) -> bool {
        self.pids.is_busy(pid)
    }

    pub fn live_count(&self) -> usize {
        self.pids.live()
    }

    /// Arena slot of `pid`, live or not.
    pub fn pcb(&self, pid: ProcessId) -> Result<&ProcessControlBlock, ProcessError> {
        self.pcbs.get(pid).ok_or(ProcessError::InvalidProcessId)
    }

    pub fn pcb_mut(&mut self, pid: ProcessId) -> Result<&mut ProcessControlBlock, ProcessError> {
        self.pcbs.get_mut(pid).ok_or(ProcessError::InvalidProcessId)
    }

    pub fn current_pid(&self) -> Option<ProcessId> {
        self.current
    }

    pub fn set_current(&mut self, pid: Option<ProcessId>) {
        self.current = pid;
    }

    pub fn current(&self) -> Result<&ProcessControlBlock, ProcessError> {
        let pid = self.current.ok_or(ProcessError::NoCurrentProcess)?;
        self.pcb(pid)
    }

    pub fn current_mut(&mut self) -> Result<&mut ProcessControlBlock, ProcessError> {
        let pid = self.current.ok_or(ProcessError::NoCurrentProcess)?;
        self.pcb_mut(pid)
    }

    /// Descriptor table of the running process.
    pub fn files(&mut self) -> Result<&mut DescriptorTable, ProcessError> {
        Ok(&mut self.current_mut()?.files)
    }

    /// Arms `pid`'s continuation slot and returns where the transition
    /// code must store the suspended kernel frame. The arena never moves,
    /// so the pointer stays valid after the table lock is dropped.
    pub fn continuation_slot(&mut self, pid: ProcessId) -> Result<NonNull<Continuation>, ProcessError> {
        let pcb = self.pcb_mut(pid)?;
        Ok(NonNull::from(pcb.saved.insert(Continuation::default())))
    }

    /// Consumes the continuation stored for `pid`.
    pub fn take_continuation(&mut self, pid: ProcessId) -> Result<Continuation, ProcessError> {
        self.pcb_mut(pid)?
            .saved
            .take()
            .ok_or(ProcessError::MissingContinuation)
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
