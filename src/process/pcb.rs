// Process Control Block (PCB) for the EMOS execution core
use core::fmt;

use x86_64::VirtAddr;

use crate::config::MAX_ARGS_LEN;
use crate::fs::{FileName, FileOps};
use crate::process::context::Continuation;
use crate::process::fd::DescriptorTable;

/// Process ID type. Doubles as the index into the PCB arena.
pub type ProcessId = usize;

/// Argument string a process was started with.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ArgBuffer {
    bytes: [u8; MAX_ARGS_LEN],
    len: usize,
}

impl ArgBuffer {
    pub const fn empty() -> Self {
        Self {
            bytes: [0; MAX_ARGS_LEN],
            len: 0,
        }
    }

    /// `None` when `args` does not fit.
    pub fn new(args: &[u8]) -> Option<Self> {
        if args.len() > MAX_ARGS_LEN {
            return None;
        }
        let mut bytes = [0; MAX_ARGS_LEN];
        bytes[..args.len()].copy_from_slice(args);
        Some(Self {
            bytes,
            len: args.len(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for ArgBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("\"")?;
        for &byte in self.as_bytes() {
            write!(f, "{}", byte as char)?;
        }
        f.write_str("\"")
    }
}

/// Process Control Block (PCB) - one per pid, reused in place
#[derive(Debug, Clone, Copy)]
pub struct ProcessControlBlock {
    pub pid: ProcessId,
    /// `None` for the root process.
    pub parent_pid: Option<ProcessId>,
    pub name: FileName,
    pub files: DescriptorTable,
    /// Privilege-zero stack pointer installed while this process runs.
    pub kernel_stack_top: VirtAddr,
    /// Kernel frame of this process's pending execute, filled while a child runs.
    pub saved: Option<Continuation>,
    pub args: ArgBuffer,
}

impl ProcessControlBlock {
    pub fn vacant(pid: ProcessId) -> Self {
        Self {
            pid,
            parent_pid: None,
            name: FileName::empty(),
            files: DescriptorTable::empty(),
            kernel_stack_top: VirtAddr::zero(),
            saved: None,
            args: ArgBuffer::empty(),
        }
    }

    /// Overwrites every field. Slots are not wiped on halt, so reuse must
    /// go through here.
    pub fn reinitialize(
        &mut self,
        parent_pid: Option<ProcessId>,
        name: FileName,
        args: ArgBuffer,
        kernel_stack_top: VirtAddr,
        terminal: &'static dyn FileOps,
    ) {
        self.parent_pid = parent_pid;
        self.name = name;
        self.files = DescriptorTable::with_terminal(terminal);
        self.kernel_stack_top = kernel_stack_top;
        self.saved = None;
        self.args = args;
    }

    /// Parent pid with `-1` for the root, as user space sees it.
    pub fn parent_id(&self) -> i32 {
        self.parent_pid.map_or(-1, |pid| pid as i32)
    }

    pub fn is_root(&self) -> bool {
        self.parent_pid.is_none()
    }
}

/// Process management errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    ResourceExhausted,
    NoCurrentProcess,
    InvalidProcessId,
    DescriptorTableFull,
    BadDescriptor,
    ProtectedDescriptor,
    MissingContinuation,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProcessError::ResourceExhausted => write!(f, "No free process slot"),
            ProcessError::NoCurrentProcess => write!(f, "No current process"),
            ProcessError::InvalidProcessId => write!(f, "Invalid process ID"),
            ProcessError::DescriptorTableFull => write!(f, "Descriptor table full"),
            ProcessError::BadDescriptor => write!(f, "Bad file descriptor"),
            ProcessError::ProtectedDescriptor => write!(f, "Descriptor is reserved for the terminal"),
            ProcessError::MissingContinuation => write!(f, "Parent has no suspended execute"),
        }
    }
}
