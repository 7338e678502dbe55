// Process Management Service for the EMOS execution core
use spin::Mutex;
use x86_64::VirtAddr;

use crate::arch::Arch;
use crate::config::{KernelConfig, MAX_PROCESSES};
use crate::fs::{Drivers, FileName, FileSystem};
use crate::loader::{self, Command};
use crate::process::{Descriptor, HaltCause, ProcessId, ProcessTable, Resumption, UserFrame};
use crate::services::file_system_service::FileSystemService;
use crate::services::memory_service::MemoryService;
use crate::syscalls::SyscallError;

/// Process Management Service - Runs programs as a nested chain of
/// processes. Every execute suspends its caller until the child halts.
pub struct ProcessService<A: Arch> {
    arch: A,
    config: KernelConfig,
    memory: MemoryService,
    files: FileSystemService,
    table: Mutex<ProcessTable>,
}

impl<A: Arch> ProcessService<A> {
    pub fn new(arch: A, fs: &'static dyn FileSystem, drivers: Drivers, config: KernelConfig) -> Self {
        Self {
            arch,
            config,
            memory: MemoryService::new(config.layout),
            files: FileSystemService::new(fs, drivers),
            table: Mutex::new(ProcessTable::new()),
        }
    }

    pub fn arch(&self) -> &A {
        &self.arch
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryService {
        &self.memory
    }

    pub fn files(&self) -> &FileSystemService {
        &self.files
    }

    /// Loads and starts `command`, returning once the new process halts.
    ///
    /// The returned value is the child's status byte, or 256 when it died
    /// on an exception. Validation happens before a pid is taken.
    pub fn execute(&self, command: &[u8]) -> Result<u32, SyscallError> {
        let command = Command::parse(command)?;
        let layout = self.config.layout;
        let exe = loader::validate(self.files.filesystem(), &layout, &command.name)?;

        let (frame, save) = self.arch.without_interrupts(|| -> Result<_, SyscallError> {
            let mut table = self.table.lock();
            let parent = table.current_pid();
            let pid = table.allocate_pid()?;

            self.memory.switch_to(&self.arch, pid);
            let loaded = self
                .arch
                .with_user_region(|region| loader::load(self.files.filesystem(), &layout, &exe, region));
            if let Err(err) = loaded {
                table.release_pid(pid);
                if let Some(parent) = parent {
                    self.memory.switch_to(&self.arch, parent);
                }
                log::warn!("[EXEC] loading {} failed: {}", command.name, err);
                return Err(err);
            }

            let kernel_stack_top = layout.kernel_stack_top(pid);
            table.pcb_mut(pid)?.reinitialize(
                parent,
                command.name,
                command.args,
                kernel_stack_top,
                self.files.drivers().terminal,
            );
            table.set_current(Some(pid));
            self.arch.set_kernel_stack(kernel_stack_top);

            let save = match parent {
                Some(parent) => Some(table.continuation_slot(parent)?),
                None => None,
            };

            let segments = self.arch.user_segments();
            let frame = UserFrame::new(exe.entry_point, layout.user_stack_top(), segments.code, segments.data);
            log::info!(
                "[EXEC] {} as pid {} (parent {}), entry {:#x}",
                command.name,
                pid,
                table.pcb(pid)?.parent_id(),
                exe.entry_point.as_u64()
            );
            Ok((frame, save))
        })?;

        // SAFETY: the image is loaded into the mapped frame, the kernel
        // stack target is installed and the parent's slot lives in the
        // table arena, which never moves.
        let value = unsafe { self.arch.enter_user(&frame, save) };
        Ok(value)
    }

    /// Releases the current process and reports where control goes next.
    pub fn teardown(&self, cause: HaltCause) -> Result<Resumption, SyscallError> {
        self.arch.without_interrupts(|| -> Result<Resumption, SyscallError> {
            let mut table = self.table.lock();
            let pid = table.current_pid().ok_or(SyscallError::NoCurrentProcess)?;
            let parent = table.pcb(pid)?.parent_pid;
            table.release_pid(pid);

            if let Some(parent) = parent {
                let parent_stack = table.pcb(parent)?.kernel_stack_top;
                self.arch.set_kernel_stack(parent_stack);
                self.memory.switch_to(&self.arch, parent);
            }

            self.files.release_all(&mut table.pcb_mut(pid)?.files);
            table.set_current(parent);

            let value = cause.return_value();
            log::info!("[HALT] pid {} {:?}, returning {}", pid, cause, value);

            match parent {
                Some(parent) => Ok(Resumption::Resume {
                    continuation: table.take_continuation(parent)?,
                    value,
                }),
                None => Ok(Resumption::Restart),
            }
        })
    }

    /// Starts a fresh root shell.
    pub fn relaunch_shell(&self) -> Result<u32, SyscallError> {
        log::warn!("[HALT] root process exited, restarting shell");
        self.execute(self.config.shell)
    }

    /// Ends the current process with `status` and resumes its parent.
    pub fn halt(&self, status: u8) -> ! {
        self.terminate(HaltCause::Exit(status))
    }

    /// Forced halt after an unhandled exception in user mode.
    pub fn halt_on_exception(&self) -> ! {
        self.terminate(HaltCause::Exception)
    }

    fn terminate(&self, cause: HaltCause) -> ! {
        match self.teardown(cause) {
            // SAFETY: the continuation was captured by the parent's execute,
            // which stays suspended until exactly this point.
            Ok(Resumption::Resume { continuation, value }) => unsafe { self.arch.resume(continuation, value) },
            Ok(Resumption::Restart) => match self.relaunch_shell() {
                Ok(value) => panic!("root shell returned {}", value),
                Err(err) => panic!("cannot restart shell: {}", err),
            },
            Err(err) => panic!("halt failed: {}", err),
        }
    }

    pub fn current_pid(&self) -> Option<ProcessId> {
        self.table.lock().current_pid()
    }

    /// Parent of a live process, -1 for the root.
    pub fn parent_of(&self, pid: ProcessId) -> Option<i32> {
        let table = self.table.lock();
        if !table.is_live(pid) {
            return None;
        }
        table.pcb(pid).ok().map(|pcb| pcb.parent_id())
    }

    /// Get process statistics
    pub fn process_stats(&self, pid: ProcessId) -> Option<ProcessStats> {
        let table = self.table.lock();
        if !table.is_live(pid) {
            return None;
        }
        let pcb = table.pcb(pid).ok()?;
        Some(ProcessStats {
            pid,
            parent: pcb.parent_id(),
            name: pcb.name,
            open_files: pcb.files.open_count(),
            kernel_stack_top: pcb.kernel_stack_top,
        })
    }

    /// Get system statistics
    pub fn stats(&self) -> SystemStats {
        let table = self.table.lock();
        SystemStats {
            live_processes: table.live_count(),
            capacity: MAX_PROCESSES,
            current_process: table.current_pid(),
        }
    }
}

// Descriptor syscalls. Buffers are user addresses checked against the
// user region before any descriptor is looked at.
impl<A: Arch> ProcessService<A> {
    pub fn open(&self, name: &[u8]) -> Result<usize, SyscallError> {
        let mut table = self.table.lock();
        self.files.open(table.files()?, name)
    }

    pub fn close(&self, fd: usize) -> Result<(), SyscallError> {
        let mut table = self.table.lock();
        self.files.close(table.files()?, fd)
    }

    pub fn read(&self, fd: usize, buf: u64, len: usize) -> Result<i32, SyscallError> {
        let range = self.memory.user_range(buf, len)?;
        let mut desc = {
            let mut table = self.table.lock();
            self.files.readable(table.files()?, fd)?
        };
        let count = self
            .arch
            .with_user_region(|region| self.files.read(&mut desc, &mut region[range]))?;
        self.store_position(fd, &desc);
        Ok(count as i32)
    }

    pub fn write(&self, fd: usize, buf: u64, len: usize) -> Result<i32, SyscallError> {
        let range = self.memory.user_range(buf, len)?;
        let mut desc = {
            let mut table = self.table.lock();
            self.files.writable(table.files()?, fd)?
        };
        let count = self
            .arch
            .with_user_region(|region| self.files.write(&mut desc, &region[range]))?;
        self.store_position(fd, &desc);
        Ok(count as i32)
    }

    pub fn getargs(&self, buf: u64, len: usize) -> Result<(), SyscallError> {
        let range = self.memory.user_range(buf, len)?;
        let args = self.table.lock().current()?.args;
        self.arch
            .with_user_region(|region| self.files.getargs(&args, &mut region[range]))
    }

    pub fn vidmap(&self, out: u64) -> Result<VirtAddr, SyscallError> {
        self.memory.vidmap(&self.arch, out)
    }

    pub fn set_handler(&self, _signum: u32, _handler: u64) -> Result<i32, SyscallError> {
        Err(SyscallError::Unimplemented)
    }

    pub fn sigreturn(&self) -> Result<i32, SyscallError> {
        Err(SyscallError::Unimplemented)
    }

    fn store_position(&self, fd: usize, desc: &Descriptor) {
        let mut table = self.table.lock();
        if let Ok(files) = table.files() {
            if let Some(slot) = files.get_mut(fd) {
                slot.file.position = desc.file.position;
            }
        }
    }
}

/// Process statistics
#[derive(Debug, Clone, Copy)]
pub struct ProcessStats {
    pub pid: ProcessId,
    pub parent: i32,
    pub name: FileName,
    pub open_files: usize,
    pub kernel_stack_top: VirtAddr,
}

/// System statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemStats {
    pub live_processes: usize,
    pub capacity: usize,
    pub current_process: Option<ProcessId>,
}
