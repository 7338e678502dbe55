// Per-process file descriptor table
use core::fmt;

use crate::config::MAX_OPEN_FILES;
use crate::fs::{FileName, FileOps, OpenFile};
use crate::process::pcb::ProcessError;

pub const STDIN: usize = 0;
pub const STDOUT: usize = 1;

/// First descriptor handed out by open; below it the terminal lives.
const FIRST_FREE: usize = 2;

/// A busy slot: the operation table plus the per-open state.
#[derive(Clone, Copy)]
pub struct Descriptor {
    pub ops: &'static dyn FileOps,
    pub file: OpenFile,
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Descriptor").field("file", &self.file).finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Free,
    Busy(Descriptor),
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorTable {
    slots: [Slot; MAX_OPEN_FILES],
}

impl DescriptorTable {
    pub const fn empty() -> Self {
        Self {
            slots: [Slot::Free; MAX_OPEN_FILES],
        }
    }

    /// Fresh table: stdin and stdout bound to the terminal, the rest free.
    pub fn with_terminal(terminal: &'static dyn FileOps) -> Self {
        let mut table = Self::empty();
        for fd in [STDIN, STDOUT] {
            table.slots[fd] = Slot::Busy(Descriptor {
                ops: terminal,
                file: OpenFile::device(FileName::empty()),
            });
        }
        table
    }

    pub fn get(&self, fd: usize) -> Option<&Descriptor> {
        match self.slots.get(fd)? {
            Slot::Busy(desc) => Some(desc),
            Slot::Free => None,
        }
    }

    pub fn get_mut(&mut self, fd: usize) -> Option<&mut Descriptor> {
        match self.slots.get_mut(fd)? {
            Slot::Busy(desc) => Some(desc),
            Slot::Free => None,
        }
    }

    pub fn is_busy(&self, fd: usize) -> bool {
        self.get(fd).is_some()
    }

    /// Lowest free descriptor open may use.
    pub fn first_free(&self) -> Result<usize, ProcessError> {
        (FIRST_FREE..MAX_OPEN_FILES)
            .find(|&fd| !self.is_busy(fd))
            .ok_or(ProcessError::DescriptorTableFull)
    }

    pub fn bind(&mut self, fd: usize, desc: Descriptor) {
        self.slots[fd] = Slot::Busy(desc);
    }

    /// Ordinary close path: the terminal slots are refused.
    pub fn release(&mut self, fd: usize) -> Result<Descriptor, ProcessError> {
        if fd >= MAX_OPEN_FILES {
            return Err(ProcessError::BadDescriptor);
        }
        if fd < FIRST_FREE {
            return Err(ProcessError::ProtectedDescriptor);
        }
        self.force_release(fd).ok_or(ProcessError::BadDescriptor)
    }

    /// Teardown path, ignores the terminal protection.
    pub fn force_release(&mut self, fd: usize) -> Option<Descriptor> {
        match core::mem::replace(self.slots.get_mut(fd)?, Slot::Free) {
            Slot::Busy(desc) => Some(desc),
            Slot::Free => None,
        }
    }

    pub fn open_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Busy(_)))
            .count()
    }
}
