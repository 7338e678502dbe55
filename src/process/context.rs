// Privilege transition frames and suspended kernel continuations
use x86_64::structures::gdt::SegmentSelector;
use x86_64::VirtAddr;

use crate::config::EXCEPTION_STATUS;

/// RFLAGS for a fresh user context: IF set plus the always-one bit 1.
pub const USER_RFLAGS: u64 = 0x202;

/// Kernel stack state captured when a parent transitions into its child.
/// Resuming it makes the parent's execute return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Continuation {
    pub stack_pointer: u64,
    pub frame_pointer: u64,
}

/// Interrupt-return frame that starts user code, in iretq pop order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct UserFrame {
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl UserFrame {
    pub fn new(
        entry: VirtAddr,
        stack_top: VirtAddr,
        code: SegmentSelector,
        data: SegmentSelector,
    ) -> Self {
        Self {
            rip: entry.as_u64(),
            cs: u64::from(code.0),
            rflags: USER_RFLAGS,
            rsp: stack_top.as_u64(),
            ss: u64::from(data.0),
        }
    }
}

/// Why a process is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltCause {
    /// Explicit halt with a status byte.
    Exit(u8),
    /// Unhandled CPU exception raised by user code.
    Exception,
}

impl HaltCause {
    /// What the parent's execute call returns.
    pub fn return_value(self) -> u16 {
        match self {
            HaltCause::Exit(status) => u16::from(status),
            HaltCause::Exception => EXCEPTION_STATUS,
        }
    }
}

/// Where control goes after a halt has released the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resumption {
    /// Return `value` from the parent's suspended execute.
    Resume {
        continuation: Continuation,
        value: u16,
    },
    /// The root halted; start a new shell instead.
    Restart,
}
