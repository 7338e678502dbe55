// Fixed limits and memory layout for the process execution core
use x86_64::{PhysAddr, VirtAddr};

use crate::process::ProcessId;

/// Hard cap on live processes. Each pid owns one kernel stack slab and one user frame.
pub const MAX_PROCESSES: usize = 6;

/// Descriptor slots per process; 0 and 1 are the terminal.
pub const MAX_OPEN_FILES: usize = 8;

/// Longest file name the filesystem stores (no terminator).
pub const MAX_NAME_LEN: usize = 32;

/// Longest argument string a process can be started with.
pub const MAX_ARGS_LEN: usize = 128;

/// Longest raw command line accepted from user space, leading spaces included.
pub const MAX_COMMAND_LEN: usize = MAX_NAME_LEN + MAX_ARGS_LEN + 32;

pub const KERNEL_STACK_SIZE: u64 = 8 * 1024;

/// Gap left below every stack top so the first push stays inside the slab.
pub const STACK_FENCE: u64 = 8;

pub const USER_REGION_BASE: u64 = 0x0800_0000;

/// One 2 MiB page-directory entry covers code, data and stack of a process.
pub const USER_REGION_SIZE: u64 = 0x0020_0000;

/// Load address of executable images inside the user region.
pub const USER_IMAGE_BASE: u64 = 0x0804_8000;

/// User-visible alias of the VGA text frame handed out by vidmap.
pub const USER_VIDEO_BASE: u64 = 0x0840_0000;

/// Physical frame of pid 0; pid N uses `USER_FRAME_BASE + N * USER_REGION_SIZE`.
pub const USER_FRAME_BASE: u64 = 0x0080_0000;

pub const VGA_TEXT_FRAME: u64 = 0x000B_8000;

pub const EXEC_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Byte offset of the little-endian 64-bit entry point inside an image.
pub const ENTRY_POINT_OFFSET: usize = 24;

/// Header bytes read while validating an executable.
pub const EXEC_HEADER_LEN: usize = ENTRY_POINT_OFFSET + 8;

/// Value a parent's execute observes when its child died on a CPU exception.
pub const EXCEPTION_STATUS: u16 = 256;

pub const DEFAULT_SHELL: &[u8] = b"shell";

/// Where things live in memory. Built at boot once the kernel stack slab
/// address is known; everything else is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub user_region: VirtAddr,
    pub user_region_size: u64,
    pub image_base: VirtAddr,
    pub user_video: VirtAddr,
    pub frame_base: PhysAddr,
    pub video_frame: PhysAddr,
    /// One past the highest byte of the kernel stack slabs; pid 0's slab is on top.
    pub kernel_stacks_end: VirtAddr,
    pub kernel_stack_size: u64,
}

impl Layout {
    pub fn new(kernel_stacks_end: VirtAddr) -> Self {
        Self {
            user_region: VirtAddr::new(USER_REGION_BASE),
            user_region_size: USER_REGION_SIZE,
            image_base: VirtAddr::new(USER_IMAGE_BASE),
            user_video: VirtAddr::new(USER_VIDEO_BASE),
            frame_base: PhysAddr::new(USER_FRAME_BASE),
            video_frame: PhysAddr::new(VGA_TEXT_FRAME),
            kernel_stacks_end,
            kernel_stack_size: KERNEL_STACK_SIZE,
        }
    }

    /// Physical frame backing the user region while `pid` runs.
    pub fn user_frame(&self, pid: ProcessId) -> PhysAddr {
        self.frame_base + self.user_region_size * pid as u64
    }

    pub fn user_end(&self) -> VirtAddr {
        self.user_region + self.user_region_size
    }

    pub fn user_stack_top(&self) -> VirtAddr {
        self.user_end() - STACK_FENCE
    }

    /// Initial privilege-zero stack pointer for `pid`.
    pub fn kernel_stack_top(&self, pid: ProcessId) -> VirtAddr {
        self.kernel_stacks_end - self.kernel_stack_size * pid as u64 - STACK_FENCE
    }

    /// Page-directory slot that maps the user region.
    pub fn directory_index(&self) -> usize {
        usize::from(self.user_region.p2_index())
    }

    /// Bytes available to an image between its load address and the stack top.
    pub fn image_capacity(&self) -> usize {
        (self.user_stack_top() - self.image_base) as usize
    }

    /// `[start, start + len)` lies inside the user region.
    pub fn contains_user_range(&self, start: u64, len: usize) -> bool {
        let base = self.user_region.as_u64();
        let end = self.user_end().as_u64();
        match start.checked_add(len as u64) {
            Some(stop) => start >= base && stop <= end,
            None => false,
        }
    }

    /// Offset of a validated user address inside the region slice.
    pub fn user_offset(&self, addr: u64) -> usize {
        (addr - self.user_region.as_u64()) as usize
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    pub layout: Layout,
    /// Program started for the root process and after the root halts.
    pub shell: &'static [u8],
}

impl KernelConfig {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            shell: DEFAULT_SHELL,
        }
    }
}
