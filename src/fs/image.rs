// Read-only in-memory filesystem for images linked into the kernel
use super::{DirEntry, FileError, FileName, FileSystem, FileType};

/// One file of an embedded image. Its inode is its index in the table.
#[derive(Debug, Clone, Copy)]
pub struct ImageFile {
    pub name: &'static [u8],
    pub file_type: FileType,
    pub data: &'static [u8],
}

impl ImageFile {
    pub const fn regular(name: &'static [u8], data: &'static [u8]) -> Self {
        Self {
            name,
            file_type: FileType::Regular,
            data,
        }
    }

    pub const fn device(name: &'static [u8], file_type: FileType) -> Self {
        Self {
            name,
            file_type,
            data: &[],
        }
    }
}

/// Directory of embedded files, e.g. `include_bytes!` programs.
#[derive(Debug, Clone, Copy)]
pub struct ImageFs {
    files: &'static [ImageFile],
}

impl ImageFs {
    pub const fn new(files: &'static [ImageFile]) -> Self {
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn entry(&self, index: usize) -> Result<DirEntry, FileError> {
        let file = self.files.get(index).ok_or(FileError::NotFound)?;
        Ok(DirEntry {
            name: FileName::new(file.name)?,
            file_type: file.file_type,
            inode: index as u32,
        })
    }
}

impl FileSystem for ImageFs {
    fn lookup_by_name(&self, name: &[u8]) -> Result<DirEntry, FileError> {
        let index = self
            .files
            .iter()
            .position(|file| file.name == name)
            .ok_or(FileError::NotFound)?;
        self.entry(index)
    }

    fn lookup_by_index(&self, index: usize) -> Result<DirEntry, FileError> {
        self.entry(index)
    }

    fn read_data(&self, inode: u32, offset: usize, buf: &mut [u8]) -> Result<usize, FileError> {
        let file = self.files.get(inode as usize).ok_or(FileError::NotFound)?;
        if offset >= file.data.len() {
            return Ok(0);
        }
        let count = buf.len().min(file.data.len() - offset);
        buf[..count].copy_from_slice(&file.data[offset..offset + count]);
        Ok(count)
    }
}
