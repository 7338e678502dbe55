// File System Service: descriptor-level open/close/read/write for processes
use crate::config::MAX_OPEN_FILES;
use crate::fs::{Drivers, FileName, FileSystem, OpenFile};
use crate::process::{ArgBuffer, Descriptor, DescriptorTable, STDIN, STDOUT};
use crate::syscalls::SyscallError;

/// File System Service - Binds names from the filesystem to descriptor
/// slots and routes descriptor I/O to the matching operation table.
#[derive(Clone, Copy)]
pub struct FileSystemService {
    fs: &'static dyn FileSystem,
    drivers: Drivers,
}

impl FileSystemService {
    pub fn new(fs: &'static dyn FileSystem, drivers: Drivers) -> Self {
        Self { fs, drivers }
    }

    pub fn filesystem(&self) -> &'static dyn FileSystem {
        self.fs
    }

    pub fn drivers(&self) -> &Drivers {
        &self.drivers
    }

    /// Opens `name` in the lowest free slot. A failing open hook leaves the
    /// slot free.
    pub fn open(&self, files: &mut DescriptorTable, name: &[u8]) -> Result<usize, SyscallError> {
        if name.is_empty() {
            return Err(SyscallError::InvalidArgument);
        }
        let name = FileName::new(name)?;
        let entry = self.fs.lookup_by_name(name.as_bytes())?;
        let fd = files.first_free()?;

        let ops = self.drivers.for_type(entry.file_type);
        ops.open(name.as_bytes())?;

        let inode = if entry.file_type.is_device() {
            None
        } else {
            Some(entry.inode)
        };
        files.bind(
            fd,
            Descriptor {
                ops,
                file: OpenFile {
                    inode,
                    position: 0,
                    name,
                },
            },
        );
        log::debug!("[FD] open {} -> fd {} ({:?})", name, fd, entry.file_type);
        Ok(fd)
    }

    /// Frees `fd` and runs the close hook with the name it was opened with.
    pub fn close(&self, files: &mut DescriptorTable, fd: usize) -> Result<(), SyscallError> {
        let desc = files.release(fd)?;
        log::debug!("[FD] close fd {} ({})", fd, desc.file.name);
        desc.ops.close(desc.file.name.as_bytes())?;
        Ok(())
    }

    /// Teardown: ordinary close for 2..8, then the terminal slots.
    pub fn release_all(&self, files: &mut DescriptorTable) {
        for fd in (STDOUT + 1)..MAX_OPEN_FILES {
            if files.is_busy(fd) {
                if let Err(err) = self.close(files, fd) {
                    log::warn!("[FD] close hook failed for fd {} during teardown: {}", fd, err);
                }
            }
        }
        for fd in [STDIN, STDOUT] {
            if let Some(desc) = files.force_release(fd) {
                if let Err(err) = desc.ops.close(desc.file.name.as_bytes()) {
                    log::warn!("[FD] terminal close failed for fd {}: {}", fd, err);
                }
            }
        }
    }

    /// Descriptor `fd` if it may be read. Stdout is write-only.
    pub fn readable(&self, files: &DescriptorTable, fd: usize) -> Result<Descriptor, SyscallError> {
        if fd == STDOUT {
            return Err(SyscallError::BadDescriptor);
        }
        files.get(fd).copied().ok_or(SyscallError::BadDescriptor)
    }

    /// Descriptor `fd` if it may be written. Stdin and read-only types refuse.
    pub fn writable(&self, files: &DescriptorTable, fd: usize) -> Result<Descriptor, SyscallError> {
        if fd == STDIN {
            return Err(SyscallError::BadDescriptor);
        }
        let desc = files.get(fd).copied().ok_or(SyscallError::BadDescriptor)?;
        if desc.ops.writer().is_none() {
            return Err(SyscallError::Unsupported);
        }
        Ok(desc)
    }

    pub fn read(&self, desc: &mut Descriptor, buf: &mut [u8]) -> Result<usize, SyscallError> {
        Ok(desc.ops.read(&mut desc.file, buf)?)
    }

    pub fn write(&self, desc: &mut Descriptor, buf: &[u8]) -> Result<usize, SyscallError> {
        let writer = desc.ops.writer().ok_or(SyscallError::Unsupported)?;
        Ok(writer.write(&mut desc.file, buf)?)
    }

    /// strncpy-style copy of the argument string; the rest of `out` is
    /// zero-filled.
    pub fn getargs(&self, args: &ArgBuffer, out: &mut [u8]) -> Result<(), SyscallError> {
        if args.is_empty() {
            return Err(SyscallError::InvalidArgument);
        }
        let bytes = args.as_bytes();
        let count = bytes.len().min(out.len());
        out[..count].copy_from_slice(&bytes[..count]);
        out[count..].fill(0);
        Ok(())
    }
}
