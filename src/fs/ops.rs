// Operation tables for filesystem-backed descriptors
use super::{FileError, FileOps, FileSystem, OpenFile};

/// Sequential reads of a regular file; `position` is a byte offset.
pub struct RegularFileOps {
    fs: &'static dyn FileSystem,
}

impl RegularFileOps {
    pub const fn new(fs: &'static dyn FileSystem) -> Self {
        Self { fs }
    }
}

impl FileOps for RegularFileOps {
    fn open(&self, _name: &[u8]) -> Result<(), FileError> {
        Ok(())
    }

    fn close(&self, _name: &[u8]) -> Result<(), FileError> {
        Ok(())
    }

    fn read(&self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, FileError> {
        let inode = file.inode.ok_or(FileError::Io)?;
        let count = self.fs.read_data(inode, file.position, buf)?;
        file.position += count;
        Ok(count)
    }
}

/// Directory listing: each read returns one entry name, `position` counts entries.
pub struct DirectoryOps {
    fs: &'static dyn FileSystem,
}

impl DirectoryOps {
    pub const fn new(fs: &'static dyn FileSystem) -> Self {
        Self { fs }
    }
}

impl FileOps for DirectoryOps {
    fn open(&self, _name: &[u8]) -> Result<(), FileError> {
        Ok(())
    }

    fn close(&self, _name: &[u8]) -> Result<(), FileError> {
        Ok(())
    }

    fn read(&self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, FileError> {
        let entry = match self.fs.lookup_by_index(file.position) {
            Ok(entry) => entry,
            Err(FileError::NotFound) => return Ok(0),
            Err(err) => return Err(err),
        };
        let name = entry.name.as_bytes();
        let count = name.len().min(buf.len());
        buf[..count].copy_from_slice(&name[..count]);
        file.position += 1;
        Ok(count)
    }
}
