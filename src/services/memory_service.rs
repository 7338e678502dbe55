// Memory Service: user address space switching and user pointer checks
use core::mem::size_of;
use core::ops::Range;

use x86_64::structures::paging::PageTableFlags;
use x86_64::VirtAddr;

use crate::arch::{Arch, DirectoryEntry};
use crate::config::Layout;
use crate::process::ProcessId;
use crate::syscalls::SyscallError;

/// Memory Service - Owns the one page-directory entry that maps the user
/// region and validates every user pointer handed to the kernel.
#[derive(Debug, Clone, Copy)]
pub struct MemoryService {
    layout: Layout,
}

impl MemoryService {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Points the user region at `pid`'s frame. Callers hold interrupts off.
    pub fn switch_to<A: Arch>(&self, arch: &A, pid: ProcessId) {
        let entry = DirectoryEntry::user_page(self.layout.user_frame(pid));
        arch.set_directory_entry(self.layout.directory_index(), entry);
        arch.flush_tlb();
    }

    /// Offsets of `[addr, addr + len)` inside the user region slice.
    pub fn user_range(&self, addr: u64, len: usize) -> Result<Range<usize>, SyscallError> {
        if addr == 0 || !self.layout.contains_user_range(addr, len) {
            return Err(SyscallError::InvalidArgument);
        }
        let start = self.layout.user_offset(addr);
        Ok(start..start + len)
    }

    /// Copies a NUL-terminated user string into `buf`, returning its length.
    /// Strings that do not terminate within `buf` are rejected.
    pub fn copy_user_str<A: Arch>(
        &self,
        arch: &A,
        addr: u64,
        buf: &mut [u8],
    ) -> Result<usize, SyscallError> {
        let start = self.user_range(addr, 1)?.start;
        arch.with_user_region(|region| {
            let source = &region[start..];
            let len = source
                .iter()
                .take(buf.len())
                .position(|&byte| byte == 0)
                .ok_or(SyscallError::InvalidArgument)?;
            buf[..len].copy_from_slice(&source[..len]);
            Ok(len)
        })
    }

    /// Maps the text-mode video frame at the fixed user alias and stores
    /// that address at `out_addr`.
    pub fn vidmap<A: Arch>(&self, arch: &A, out_addr: u64) -> Result<VirtAddr, SyscallError> {
        let slot = self.user_range(out_addr, size_of::<u64>())?;
        let video = self.layout.user_video;

        arch.map_page(
            video,
            self.layout.video_frame,
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE,
        );
        arch.flush_tlb();
        arch.with_user_region(|region| region[slot].copy_from_slice(&video.as_u64().to_le_bytes()));

        log::debug!("[VIDMAP] video memory at {:#x}, pointer stored at {:#x}", video.as_u64(), out_addr);
        Ok(video)
    }
}
