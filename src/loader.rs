// Command parsing and executable loading for execute
use x86_64::VirtAddr;

use crate::config::{
    Layout, ENTRY_POINT_OFFSET, EXEC_HEADER_LEN, EXEC_MAGIC, MAX_COMMAND_LEN,
};
use crate::fs::{DirEntry, FileName, FileSystem, FileType};
use crate::process::ArgBuffer;
use crate::syscalls::SyscallError;

/// A command line split into program name and argument string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub name: FileName,
    pub args: ArgBuffer,
}

impl Command {
    /// `"  cat  frame0.txt"` becomes name `cat`, args `frame0.txt`. Input
    /// ends at the first NUL; any ASCII whitespace separates the name, and
    /// trailing whitespace is dropped from the args.
    pub fn parse(raw: &[u8]) -> Result<Self, SyscallError> {
        let raw = match raw.iter().position(|&byte| byte == 0) {
            Some(nul) => &raw[..nul],
            None => raw,
        };
        if raw.len() > MAX_COMMAND_LEN {
            return Err(SyscallError::InvalidArgument);
        }

        let line = skip_whitespace(raw);
        let name_len = line
            .iter()
            .position(|byte| byte.is_ascii_whitespace())
            .unwrap_or(line.len());
        let (name, rest) = line.split_at(name_len);
        let name = FileName::new(name).map_err(|_| SyscallError::InvalidArgument)?;

        let mut args = skip_whitespace(rest);
        while let [head @ .., last] = args {
            if !last.is_ascii_whitespace() {
                break;
            }
            args = head;
        }
        let args = ArgBuffer::new(args).ok_or(SyscallError::InvalidArgument)?;

        Ok(Self { name, args })
    }
}

fn skip_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// A program that passed validation and may be given a pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executable {
    pub entry: DirEntry,
    pub entry_point: VirtAddr,
}

/// Checks that `name` is a loadable program without touching any process
/// state, so a bad name never costs a pid.
pub fn validate(
    fs: &dyn FileSystem,
    layout: &Layout,
    name: &FileName,
) -> Result<Executable, SyscallError> {
    let entry = fs
        .lookup_by_name(name.as_bytes())
        .map_err(|_| SyscallError::InvalidExecutable)?;
    if entry.file_type != FileType::Regular {
        return Err(SyscallError::InvalidExecutable);
    }

    let mut header = [0u8; EXEC_HEADER_LEN];
    let read = fs
        .read_data(entry.inode, 0, &mut header)
        .map_err(|_| SyscallError::InvalidExecutable)?;
    if read < EXEC_MAGIC.len() || header[..EXEC_MAGIC.len()] != EXEC_MAGIC {
        return Err(SyscallError::InvalidExecutable);
    }
    if read < EXEC_HEADER_LEN {
        return Err(SyscallError::InvalidExecutable);
    }

    let mut raw_entry = [0u8; 8];
    raw_entry.copy_from_slice(&header[ENTRY_POINT_OFFSET..EXEC_HEADER_LEN]);
    let entry_point = u64::from_le_bytes(raw_entry);
    if entry_point < layout.image_base.as_u64() || entry_point >= layout.user_stack_top().as_u64() {
        return Err(SyscallError::InvalidExecutable);
    }

    let mut probe = [0u8; 1];
    let overflow = fs
        .read_data(entry.inode, layout.image_capacity(), &mut probe)
        .map_err(|_| SyscallError::InvalidExecutable)?;
    if overflow != 0 {
        return Err(SyscallError::InvalidExecutable);
    }

    Ok(Executable {
        entry,
        entry_point: VirtAddr::new(entry_point),
    })
}

/// Copies the whole image to its load address inside the mapped `region`.
pub fn load(
    fs: &dyn FileSystem,
    layout: &Layout,
    exe: &Executable,
    region: &mut [u8],
) -> Result<usize, SyscallError> {
    let start = layout.user_offset(layout.image_base.as_u64());
    let image = &mut region[start..start + layout.image_capacity()];
    let mut copied = 0;
    while copied < image.len() {
        let read = fs.read_data(exe.entry.inode, copied, &mut image[copied..])?;
        if read == 0 {
            break;
        }
        copied += read;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_ARGS_LEN, USER_IMAGE_BASE, USER_REGION_SIZE};
    use crate::fs::{ImageFile, ImageFs};

    fn layout() -> Layout {
        Layout::new(VirtAddr::new(0x0080_0000))
    }

    fn header(entry: u64) -> [u8; 40] {
        let mut image = [0u8; 40];
        image[..4].copy_from_slice(&EXEC_MAGIC);
        image[ENTRY_POINT_OFFSET..EXEC_HEADER_LEN].copy_from_slice(&entry.to_le_bytes());
        image[32..].copy_from_slice(b"progbody");
        image
    }

    static GOOD: [u8; 40] = {
        let mut image = [0u8; 40];
        image[0] = 0x7f;
        image[1] = b'E';
        image[2] = b'L';
        image[3] = b'F';
        image[24] = 0x10;
        image[25] = 0x81;
        image[26] = 0x04;
        image[27] = 0x08;
        image
    };

    static FILES: [ImageFile; 5] = [
        ImageFile::device(b".", FileType::Directory),
        ImageFile::regular(b"prog", &GOOD),
        ImageFile::regular(b"frame0.txt", b"fish fish fish fish fish fish fish"),
        ImageFile::regular(b"tiny", b"\x7fELF"),
        ImageFile::device(b"rtc", FileType::Rtc),
    ];
    static FS: ImageFs = ImageFs::new(&FILES);

    #[test]
    fn parse_splits_name_and_args() {
        let cmd = Command::parse(b"  testprog   arg1 arg2 \n").unwrap();
        assert_eq!(cmd.name.as_bytes(), b"testprog");
        assert_eq!(cmd.args.as_bytes(), b"arg1 arg2");

        let bare = Command::parse(b"shell\0garbage").unwrap();
        assert_eq!(bare.name.as_bytes(), b"shell");
        assert!(bare.args.is_empty());
    }

    #[test]
    fn parse_ends_name_at_line_terminator() {
        let cmd = Command::parse(b"testprog\n").unwrap();
        assert_eq!(cmd.name.as_bytes(), b"testprog");
        assert!(cmd.args.is_empty());

        let tabbed = Command::parse(b"\tcat\tframe0.txt\r\n").unwrap();
        assert_eq!(tabbed.name.as_bytes(), b"cat");
        assert_eq!(tabbed.args.as_bytes(), b"frame0.txt");

        assert_eq!(Command::parse(b" \n"), Err(SyscallError::InvalidArgument));
    }

    #[test]
    fn parse_rejects_empty_and_oversized_input() {
        assert_eq!(Command::parse(b""), Err(SyscallError::InvalidArgument));
        assert_eq!(Command::parse(b"    "), Err(SyscallError::InvalidArgument));
        assert_eq!(Command::parse(&[b'n'; 33]), Err(SyscallError::InvalidArgument));

        let mut long_args = [b'a'; 4 + MAX_ARGS_LEN + 1];
        long_args[..4].copy_from_slice(b"cat ");
        assert_eq!(Command::parse(&long_args), Err(SyscallError::InvalidArgument));
    }

    #[test]
    fn validate_accepts_magic_and_reads_entry_point() {
        let exe = validate(&FS, &layout(), &FileName::new(b"prog").unwrap()).unwrap();
        assert_eq!(exe.entry.inode, 1);
        assert_eq!(exe.entry_point.as_u64(), 0x0804_8110);
    }

    #[test]
    fn validate_rejects_non_executables() {
        let layout = layout();
        for name in [&b"frame0.txt"[..], b"tiny", b"rtc", b".", b"missing"] {
            let name = FileName::new(name).unwrap();
            assert_eq!(validate(&FS, &layout, &name), Err(SyscallError::InvalidExecutable));
        }
    }

    #[test]
    fn validate_rejects_entry_outside_image_range() {
        let image: &'static [u8] = Box::leak(Box::new(header(USER_REGION_BASE_TEST)));
        let files: &'static [ImageFile] = Box::leak(Box::new([ImageFile::regular(b"low", image)]));
        let fs = ImageFs::new(files);
        let name = FileName::new(b"low").unwrap();
        assert_eq!(validate(&fs, &layout(), &name), Err(SyscallError::InvalidExecutable));
    }

    const USER_REGION_BASE_TEST: u64 = USER_IMAGE_BASE - 0x1000;

    #[test]
    fn load_copies_image_to_load_address() {
        let layout = layout();
        let exe = validate(&FS, &layout, &FileName::new(b"prog").unwrap()).unwrap();
        let mut region = vec![0u8; USER_REGION_SIZE as usize];
        assert_eq!(load(&FS, &layout, &exe, &mut region), Ok(40));
        let at = (USER_IMAGE_BASE - layout.user_region.as_u64()) as usize;
        assert_eq!(&region[at..at + 40], &GOOD[..]);
        assert!(region[..at].iter().all(|&byte| byte == 0));
    }
}
