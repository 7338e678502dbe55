// Filesystem and device contracts consumed by the process core
pub mod image;
pub mod ops;

use core::fmt;

use crate::config::MAX_NAME_LEN;

pub use image::{ImageFile, ImageFs};
pub use ops::{DirectoryOps, RegularFileOps};

/// Kind of object a directory entry names. Picks the operation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Rtc,
    Directory,
    Regular,
    Terminal,
}

impl FileType {
    /// Device files carry no inode.
    pub fn is_device(self) -> bool {
        matches!(self, FileType::Rtc | FileType::Terminal)
    }
}

/// Errors reported by filesystem and driver collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileError {
    NotFound,
    InvalidName,
    Io,
    Unsupported,
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FileError::NotFound => write!(f, "No such file"),
            FileError::InvalidName => write!(f, "Invalid file name"),
            FileError::Io => write!(f, "I/O error"),
            FileError::Unsupported => write!(f, "Operation not supported"),
        }
    }
}

/// Fixed-capacity file name, at most `MAX_NAME_LEN` bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FileName {
    bytes: [u8; MAX_NAME_LEN],
    len: usize,
}

impl FileName {
    pub const fn empty() -> Self {
        Self {
            bytes: [0; MAX_NAME_LEN],
            len: 0,
        }
    }

    pub fn new(name: &[u8]) -> Result<Self, FileError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains(&0) {
            return Err(FileError::InvalidName);
        }
        let mut bytes = [0; MAX_NAME_LEN];
        bytes[..name.len()].copy_from_slice(name);
        Ok(Self {
            bytes,
            len: name.len(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &byte in self.as_bytes() {
            write!(f, "{}", byte as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: FileName,
    pub file_type: FileType,
    pub inode: u32,
}

/// Read-only filesystem holding programs and data files
pub trait FileSystem: Sync {
    fn lookup_by_name(&self, name: &[u8]) -> Result<DirEntry, FileError>;

    fn lookup_by_index(&self, index: usize) -> Result<DirEntry, FileError>;

    /// Copies file bytes starting at `offset`; returns 0 at end of file.
    fn read_data(&self, inode: u32, offset: usize, buf: &mut [u8]) -> Result<usize, FileError>;
}

/// Per-descriptor state handed to operation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    /// `None` for device files.
    pub inode: Option<u32>,
    /// Byte offset for regular files, entry index for directories.
    pub position: usize,
    /// Name the descriptor was opened with.
    pub name: FileName,
}

impl OpenFile {
    pub fn device(name: FileName) -> Self {
        Self {
            inode: None,
            position: 0,
            name,
        }
    }
}

/// Operation table of a file type
pub trait FileOps: Sync {
    fn open(&self, name: &[u8]) -> Result<(), FileError>;

    fn close(&self, name: &[u8]) -> Result<(), FileError>;

    fn read(&self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, FileError>;

    /// Write capability; `None` for read-only types.
    fn writer(&self) -> Option<&dyn FileWrite> {
        None
    }
}

pub trait FileWrite: Sync {
    fn write(&self, file: &mut OpenFile, buf: &[u8]) -> Result<usize, FileError>;
}

/// Operation tables supplied by the drivers, one per file type.
#[derive(Clone, Copy)]
pub struct Drivers {
    pub terminal: &'static dyn FileOps,
    pub rtc: &'static dyn FileOps,
    pub directory: &'static dyn FileOps,
    pub regular: &'static dyn FileOps,
}

impl Drivers {
    pub fn for_type(&self, file_type: FileType) -> &'static dyn FileOps {
        match file_type {
            FileType::Rtc => self.rtc,
            FileType::Directory => self.directory,
            FileType::Regular => self.regular,
            FileType::Terminal => self.terminal,
        }
    }
}
