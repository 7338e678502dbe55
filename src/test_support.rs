// Hosted doubles for the process core: a simulated CPU with scripted user
// programs, mock devices and an embedded test filesystem.
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::Mutex;

use x86_64::structures::gdt::SegmentSelector;
use x86_64::structures::paging::PageTableFlags;
use x86_64::{PhysAddr, PrivilegeLevel, VirtAddr};

use crate::arch::{Arch, DirectoryEntry, UserSegments};
use crate::config::{KernelConfig, Layout, ENTRY_POINT_OFFSET, EXEC_MAGIC, USER_REGION_BASE};
use crate::fs::{
    DirectoryOps, Drivers, FileError, FileOps, FileSystem, FileType, FileWrite, ImageFile, ImageFs,
    OpenFile, RegularFileOps,
};
use crate::process::{Continuation, ProcessId, UserFrame};
use crate::services::ProcessService;
use crate::syscalls::{handle_syscall, SyscallArgs, SyscallNumber};

pub type TestService = ProcessService<MockArch>;

/// A user program: runs against the kernel and says how it ended.
pub type Program = Rc<dyn Fn(&'static TestService) -> Outcome>;

pub const KERNEL_STACKS_END: u64 = 0x0080_0000;
pub const SHELL_ENTRY: u64 = 0x0804_8100;
pub const TESTPROG_ENTRY: u64 = 0x0804_8200;
pub const FAULT_ENTRY: u64 = 0x0804_8300;

/// What execute returns when the program is still running.
pub const SUSPENDED: u32 = 0x5005;

/// Free user memory below the image for syscall buffers.
pub const USER_SCRATCH: u64 = USER_REGION_BASE + 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Issues the halt syscall with `status`.
    Halt(u8),
    /// Unhandled CPU exception; goes through `halt_on_exception`.
    Fault,
    /// Still running; the launching execute returns `SUSPENDED` so the test
    /// can look at the live state.
    Suspend,
}

const fn executable(entry: u64) -> [u8; 48] {
    let mut image = [0u8; 48];
    let mut i = 0;
    while i < EXEC_MAGIC.len() {
        image[i] = EXEC_MAGIC[i];
        i += 1;
    }
    let entry = entry.to_le_bytes();
    let mut i = 0;
    while i < entry.len() {
        image[ENTRY_POINT_OFFSET + i] = entry[i];
        i += 1;
    }
    image
}

static SHELL_IMAGE: [u8; 48] = executable(SHELL_ENTRY);
static TESTPROG_IMAGE: [u8; 48] = executable(TESTPROG_ENTRY);
static FAULT_IMAGE: [u8; 48] = executable(FAULT_ENTRY);

static FILES: [ImageFile; 8] = [
    ImageFile::device(b".", FileType::Directory),
    ImageFile::regular(b"shell", &SHELL_IMAGE),
    ImageFile::regular(b"testprog", &TESTPROG_IMAGE),
    ImageFile::regular(b"sigtest", &FAULT_IMAGE),
    ImageFile::regular(b"frame0.txt", b"fish swim in the sea\n"),
    ImageFile::device(b"rtc", FileType::Rtc),
    ImageFile::device(b"broken", FileType::Rtc),
    ImageFile::regular(b"notes.txt", b"not a program"),
];

static TEST_FS: ImageFs = ImageFs::new(&FILES);
static DIRECTORY_OPS: DirectoryOps = DirectoryOps::new(&TEST_FS);
static REGULAR_OPS: RegularFileOps = RegularFileOps::new(&TEST_FS);

pub fn test_fs() -> &'static dyn FileSystem {
    &TEST_FS
}

pub fn test_layout() -> Layout {
    Layout::new(VirtAddr::new(KERNEL_STACKS_END))
}

/// Terminal or RTC stand-in that records everything done to it. Opening
/// a file named `broken` fails.
#[derive(Default)]
pub struct MockDevice {
    input: Mutex<Vec<u8>>,
    output: Mutex<Vec<u8>>,
    opened: Mutex<Vec<Vec<u8>>>,
    closed: Mutex<Vec<Vec<u8>>>,
}

impl MockDevice {
    pub fn leak() -> &'static Self {
        Box::leak(Box::default())
    }

    pub fn feed(&self, bytes: &[u8]) {
        self.input.lock().unwrap().extend_from_slice(bytes);
    }

    pub fn output(&self) -> Vec<u8> {
        self.output.lock().unwrap().clone()
    }

    pub fn opened_names(&self) -> Vec<Vec<u8>> {
        self.opened.lock().unwrap().clone()
    }

    pub fn closed_names(&self) -> Vec<Vec<u8>> {
        self.closed.lock().unwrap().clone()
    }
}

impl FileOps for MockDevice {
    fn open(&self, name: &[u8]) -> Result<(), FileError> {
        if name == b"broken" {
            return Err(FileError::Io);
        }
        self.opened.lock().unwrap().push(name.to_vec());
        Ok(())
    }

    fn close(&self, name: &[u8]) -> Result<(), FileError> {
        self.closed.lock().unwrap().push(name.to_vec());
        Ok(())
    }

    fn read(&self, _file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, FileError> {
        let mut input = self.input.lock().unwrap();
        let count = buf.len().min(input.len());
        for (dst, src) in buf.iter_mut().zip(input.drain(..count)) {
            *dst = src;
        }
        Ok(count)
    }

    fn writer(&self) -> Option<&dyn FileWrite> {
        Some(self as &dyn FileWrite)
    }
}

impl FileWrite for MockDevice {
    fn write(&self, _file: &mut OpenFile, buf: &[u8]) -> Result<usize, FileError> {
        self.output.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
}

pub struct TestDevices {
    pub drivers: Drivers,
    pub terminal: &'static MockDevice,
    pub rtc: &'static MockDevice,
}

/// Fresh devices per test so parallel tests never share logs.
pub fn devices() -> TestDevices {
    let terminal = MockDevice::leak();
    let rtc = MockDevice::leak();
    TestDevices {
        drivers: Drivers {
            terminal,
            rtc,
            directory: &DIRECTORY_OPS,
            regular: &REGULAR_OPS,
        },
        terminal,
        rtc,
    }
}

/// What `MockArch::resume` unwinds with.
struct Resumed {
    continuation: Continuation,
    value: u16,
}

/// A shell relaunched by a root halt went idle with this value.
struct Relaunched(u32);

/// Single-CPU stand-in. The user region is backed by one buffer per
/// physical frame, picked by whatever the directory entry points at.
/// `enter_user` runs the program registered for the entry point as a
/// nested Rust call. `resume` unwinds the stack back to the `enter_user`
/// that saved the continuation and makes it return the delivered value.
pub struct MockArch {
    layout: Layout,
    frames: RefCell<HashMap<u64, Vec<u8>>>,
    directory: Cell<Option<DirectoryEntry>>,
    video: Cell<Option<(VirtAddr, PhysAddr, PageTableFlags)>>,
    kernel_stack: Cell<Option<VirtAddr>>,
    interrupts_enabled: Cell<bool>,
    tlb_flushes: Cell<usize>,
    launches: RefCell<Vec<UserFrame>>,
    programs: RefCell<HashMap<u64, Program>>,
    service: Cell<Option<&'static TestService>>,
    depth: Cell<u64>,
}

impl MockArch {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            frames: RefCell::new(HashMap::new()),
            directory: Cell::new(None),
            video: Cell::new(None),
            kernel_stack: Cell::new(None),
            interrupts_enabled: Cell::new(true),
            tlb_flushes: Cell::new(0),
            launches: RefCell::new(Vec::new()),
            programs: RefCell::new(HashMap::new()),
            service: Cell::new(None),
            depth: Cell::new(0),
        }
    }

    pub fn bind(&self, service: &'static TestService) {
        self.service.set(Some(service));
    }

    pub fn install(&self, entry: u64, program: impl Fn(&'static TestService) -> Outcome + 'static) {
        self.programs.borrow_mut().insert(entry, Rc::new(program));
    }

    pub fn directory(&self) -> Option<DirectoryEntry> {
        self.directory.get()
    }

    /// Physical frame currently behind the user region.
    pub fn mapped_frame(&self) -> Option<PhysAddr> {
        self.directory.get().map(|entry| entry.frame)
    }

    pub fn video_mapping(&self) -> Option<(VirtAddr, PhysAddr, PageTableFlags)> {
        self.video.get()
    }

    pub fn kernel_stack(&self) -> Option<VirtAddr> {
        self.kernel_stack.get()
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled.get()
    }

    pub fn tlb_flushes(&self) -> usize {
        self.tlb_flushes.get()
    }

    pub fn launches(&self) -> Vec<UserFrame> {
        self.launches.borrow().clone()
    }

    pub fn poke(&self, addr: u64, bytes: &[u8]) {
        let start = self.layout.user_offset(addr);
        self.with_user_region(|region| region[start..start + bytes.len()].copy_from_slice(bytes));
    }

    pub fn peek(&self, addr: u64, len: usize) -> Vec<u8> {
        let start = self.layout.user_offset(addr);
        self.with_user_region(|region| region[start..start + len].to_vec())
    }

    /// Bytes of `pid`'s frame, whether or not it is mapped.
    pub fn frame_bytes(&self, pid: ProcessId, addr: u64, len: usize) -> Vec<u8> {
        let start = self.layout.user_offset(addr);
        let frames = self.frames.borrow();
        match frames.get(&self.layout.user_frame(pid).as_u64()) {
            Some(frame) => frame[start..start + len].to_vec(),
            None => vec![0; len],
        }
    }

}

impl Arch for MockArch {
    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = self.interrupts_enabled.replace(false);
        let result = f();
        self.interrupts_enabled.set(previous);
        result
    }

    fn user_segments(&self) -> UserSegments {
        UserSegments {
            code: SegmentSelector::new(4, PrivilegeLevel::Ring3),
            data: SegmentSelector::new(3, PrivilegeLevel::Ring3),
        }
    }

    fn set_kernel_stack(&self, top: VirtAddr) {
        assert!(!self.interrupts_enabled.get(), "kernel stack switched with interrupts on");
        self.kernel_stack.set(Some(top));
    }

    fn set_directory_entry(&self, index: usize, entry: DirectoryEntry) {
        assert!(!self.interrupts_enabled.get(), "user mapping changed with interrupts on");
        assert_eq!(index, self.layout.directory_index());
        self.directory.set(Some(entry));
    }

    fn map_page(&self, virt: VirtAddr, frame: PhysAddr, flags: PageTableFlags) {
        self.video.set(Some((virt, frame, flags)));
    }

    fn flush_tlb(&self) {
        self.tlb_flushes.set(self.tlb_flushes.get() + 1);
    }

    fn with_user_region<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let entry = self.directory.get().expect("user region is not mapped");
        let size = self.layout.user_region_size as usize;
        let mut frames = self.frames.borrow_mut();
        let frame = frames
            .entry(entry.frame.as_u64())
            .or_insert_with(|| vec![0; size]);
        f(frame.as_mut_slice())
    }

    unsafe fn enter_user(&self, frame: &UserFrame, save: Option<NonNull<Continuation>>) -> u32 {
        let service = self.service.get().expect("MockArch is not bound to a service");
        let program = self
            .programs
            .borrow()
            .get(&frame.rip)
            .cloned()
            .unwrap_or_else(|| panic!("no program at {:#x}", frame.rip));
        self.launches.borrow_mut().push(*frame);

        let depth = self.depth.get() + 1;
        self.depth.set(depth);
        let token = Continuation {
            stack_pointer: depth,
            frame_pointer: depth,
        };
        if let Some(slot) = save {
            unsafe { slot.as_ptr().write(token) };
        }

        let root = save.is_none();

        let ran = panic::catch_unwind(AssertUnwindSafe(|| match program(service) {
            Outcome::Suspend => SUSPENDED,
            Outcome::Halt(status) => {
                let args = SyscallArgs {
                    arg0: u64::from(status),
                    ..SyscallArgs::default()
                };
                let result = handle_syscall(service, SyscallNumber::Halt as u64, args);
                panic!("halt syscall returned {:?}", result)
            }
            Outcome::Fault => service.halt_on_exception(),
        }));
        self.depth.set(depth - 1);

        let value = match ran {
            Ok(value) => value,
            Err(payload) => match payload.downcast::<Resumed>() {
                Ok(resumed) => {
                    assert_eq!(resumed.continuation, token, "halt resumed the wrong execute");
                    u32::from(resumed.value)
                }
                Err(payload) => match payload.downcast::<Relaunched>() {
                    Ok(relaunched) if root => relaunched.0,
                    Ok(relaunched) => panic::resume_unwind(relaunched),
                    Err(payload) => panic::resume_unwind(payload),
                },
            },
        };

        // A relaunched shell runs inside the old root's halt, which must
        // never see execute return; hand the value to the first root launch.
        if root && depth > 1 {
            panic::resume_unwind(Box::new(Relaunched(value)));
        }
        value
    }

    unsafe fn resume(&self, continuation: Continuation, value: u16) -> ! {
        panic::resume_unwind(Box::new(Resumed { continuation, value }))
    }
}

/// A booted-but-idle kernel over the test filesystem.
pub struct TestKernel {
    pub service: &'static TestService,
    pub terminal: &'static MockDevice,
    pub rtc: &'static MockDevice,
}

impl TestKernel {
    pub fn new() -> Self {
        let devices = devices();
        let layout = test_layout();
        let service: &'static TestService = Box::leak(Box::new(ProcessService::new(
            MockArch::new(layout),
            test_fs(),
            devices.drivers,
            KernelConfig::new(layout),
        )));
        service.arch().bind(service);
        Self {
            service,
            terminal: devices.terminal,
            rtc: devices.rtc,
        }
    }

    pub fn arch(&self) -> &'static MockArch {
        self.service.arch()
    }

    pub fn program(&self, entry: u64, program: impl Fn(&'static TestService) -> Outcome + 'static) {
        self.arch().install(entry, program);
    }
}
