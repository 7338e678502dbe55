// Architecture trap interface used by the process core
#[cfg(target_os = "none")]
pub mod x86;

use core::ptr::NonNull;

use x86_64::structures::gdt::SegmentSelector;
use x86_64::structures::paging::PageTableFlags;
use x86_64::{PhysAddr, VirtAddr};

use crate::process::{Continuation, UserFrame};

/// Page-directory entry mapping one large page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub frame: PhysAddr,
    pub flags: PageTableFlags,
}

impl DirectoryEntry {
    /// Present, writable, user-accessible large page at `frame`.
    pub fn user_page(frame: PhysAddr) -> Self {
        Self {
            frame,
            flags: PageTableFlags::PRESENT
                | PageTableFlags::WRITABLE
                | PageTableFlags::USER_ACCESSIBLE
                | PageTableFlags::HUGE_PAGE,
        }
    }
}

/// Ring 3 code and data selectors (RPL 3).
#[derive(Debug, Clone, Copy)]
pub struct UserSegments {
    pub code: SegmentSelector,
    pub data: SegmentSelector,
}

/// What the process core needs from the CPU. Single CPU, no preemption:
/// implementations may assume calls never overlap.
pub trait Arch {
    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R;

    fn user_segments(&self) -> UserSegments;

    /// Privilege-zero stack used by the next trap from user mode.
    fn set_kernel_stack(&self, top: VirtAddr);

    fn set_directory_entry(&self, index: usize, entry: DirectoryEntry);

    /// Backs the 4 KiB page at `virt` with `frame`.
    fn map_page(&self, virt: VirtAddr, frame: PhysAddr, flags: PageTableFlags);

    fn flush_tlb(&self);

    /// Runs `f` over the currently mapped user region.
    fn with_user_region<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R;

    /// Stores the caller's kernel frame in `save` (if any) and irets into
    /// `frame`. Comes back only when that frame is resumed, returning the
    /// delivered value.
    ///
    /// # Safety
    ///
    /// The user region must hold a loaded image, the kernel stack target
    /// must be installed and `save` must stay valid until resumed.
    unsafe fn enter_user(&self, frame: &UserFrame, save: Option<NonNull<Continuation>>) -> u32;

    /// Abandons the current kernel stack and returns `value` from the
    /// `enter_user` call that captured `continuation`.
    ///
    /// # Safety
    ///
    /// `continuation` must come from a still-suspended `enter_user`.
    unsafe fn resume(&self, continuation: Continuation, value: u16) -> !;
}
