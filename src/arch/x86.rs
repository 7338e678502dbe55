// Bare-metal x86_64 backend and the kernel-wide process service
use core::ptr::{self, NonNull};

use conquer_once::spin::OnceCell;
use log::LevelFilter;
use x86_64::instructions::{interrupts, tlb};
use x86_64::structures::paging::{PageTable, PageTableFlags};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::{PhysAddr, VirtAddr};

use super::{Arch, DirectoryEntry, UserSegments};
use crate::config::{KernelConfig, Layout};
use crate::fs::{Drivers, FileSystem};
use crate::process::{Continuation, UserFrame};
use crate::services::ProcessService;
use crate::{logging, userspace};

static SERVICE: OnceCell<ProcessService<X86Arch>> = OnceCell::uninit();

/// Page tables and TSS the process core writes to.
pub struct X86Arch {
    tss: *mut TaskStateSegment,
    /// Level-2 table that holds the user region's huge-page entry.
    directory: *mut PageTable,
    /// Level-1 table backing the 2 MiB slot of the video alias.
    video_table: *mut PageTable,
    video_table_frame: PhysAddr,
    segments: UserSegments,
    layout: Layout,
}

// The raw pointers name statically allocated tables; every write happens
// on the single CPU with interrupts off or from the current process.
unsafe impl Send for X86Arch {}
unsafe impl Sync for X86Arch {}

impl X86Arch {
    /// # Safety
    ///
    /// `tss` must be the loaded TSS. `directory` must be the active level-2
    /// table covering `layout.user_region`, and `video_table` an otherwise
    /// unused level-1 table located at physical `video_table_frame`. All of
    /// them must live for the rest of the kernel's life.
    pub unsafe fn new(
        tss: *mut TaskStateSegment,
        directory: *mut PageTable,
        video_table: *mut PageTable,
        video_table_frame: PhysAddr,
        segments: UserSegments,
        layout: Layout,
    ) -> Self {
        Self {
            tss,
            directory,
            video_table,
            video_table_frame,
            segments,
            layout,
        }
    }
}

impl Arch for X86Arch {
    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R {
        interrupts::without_interrupts(f)
    }

    fn user_segments(&self) -> UserSegments {
        self.segments
    }

    fn set_kernel_stack(&self, top: VirtAddr) {
        unsafe { (*self.tss).privilege_stack_table[0] = top };
    }

    fn set_directory_entry(&self, index: usize, entry: DirectoryEntry) {
        let directory = unsafe { &mut *self.directory };
        directory[index].set_addr(entry.frame, entry.flags);
    }

    fn map_page(&self, virt: VirtAddr, frame: PhysAddr, flags: PageTableFlags) {
        let (table, directory) = unsafe { (&mut *self.video_table, &mut *self.directory) };
        table[usize::from(virt.p1_index())].set_addr(frame, flags);
        directory[usize::from(virt.p2_index())].set_addr(
            self.video_table_frame,
            PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE,
        );
    }

    fn flush_tlb(&self) {
        tlb::flush_all();
    }

    fn with_user_region<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let region = unsafe {
            core::slice::from_raw_parts_mut(
                self.layout.user_region.as_mut_ptr::<u8>(),
                self.layout.user_region_size as usize,
            )
        };
        f(region)
    }

    unsafe fn enter_user(&self, frame: &UserFrame, save: Option<NonNull<Continuation>>) -> u32 {
        let save = save.map_or(ptr::null_mut(), NonNull::as_ptr);
        unsafe { userspace::enter_user(frame, save) as u32 }
    }

    unsafe fn resume(&self, continuation: Continuation, value: u16) -> ! {
        unsafe { userspace::resume(&continuation, u64::from(value)) }
    }
}

/// The process service used by trap handlers.
pub fn service() -> &'static ProcessService<X86Arch> {
    match SERVICE.try_get() {
        Ok(service) => service,
        Err(_) => panic!("process service used before run()"),
    }
}

/// Brings up logging, the IDT and the process service, then runs the shell
/// as the root process for good.
pub fn run(arch: X86Arch, fs: &'static dyn FileSystem, drivers: Drivers, config: KernelConfig) -> ! {
    logging::init(LevelFilter::Info);
    crate::interrupts::init_idt();

    if SERVICE
        .try_init_once(|| ProcessService::new(arch, fs, drivers, config))
        .is_err()
    {
        panic!("process service initialized twice");
    }

    log::info!("[EXEC] starting root shell");
    match service().execute(config.shell) {
        Ok(value) => panic!("root shell returned {}", value),
        Err(err) => panic!("cannot start the shell: {}", err),
    }
}
