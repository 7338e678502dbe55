// src/syscalls.rs
use core::fmt;

use crate::arch::Arch;
use crate::config::MAX_COMMAND_LEN;
use crate::fs::FileError;
use crate::process::ProcessError;
use crate::services::process_service::ProcessService;

/// System call numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    Halt = 1,
    Execute = 2,
    Read = 3,
    Write = 4,
    Open = 5,
    Close = 6,
    GetArgs = 7,
    Vidmap = 8,
    SetHandler = 9,
    SigReturn = 10,
}

impl SyscallNumber {
    pub fn from_raw(raw: u64) -> Option<Self> {
        Some(match raw {
            1 => SyscallNumber::Halt,
            2 => SyscallNumber::Execute,
            3 => SyscallNumber::Read,
            4 => SyscallNumber::Write,
            5 => SyscallNumber::Open,
            6 => SyscallNumber::Close,
            7 => SyscallNumber::GetArgs,
            8 => SyscallNumber::Vidmap,
            9 => SyscallNumber::SetHandler,
            10 => SyscallNumber::SigReturn,
            _ => return None,
        })
    }
}

/// System call arguments
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallArgs {
    pub arg0: u64, // rbx
    pub arg1: u64, // rcx
    pub arg2: u64, // rdx
}

/// System call result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallResult {
    Success(i32),
    Error(SyscallError),
}

impl From<Result<i32, SyscallError>> for SyscallResult {
    fn from(result: Result<i32, SyscallError>) -> Self {
        match result {
            Ok(value) => SyscallResult::Success(value),
            Err(err) => SyscallResult::Error(err),
        }
    }
}

/// System call errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidSyscall,
    InvalidArgument,
    BadDescriptor,
    ResourceExhausted,
    InvalidExecutable,
    Unsupported,
    NoCurrentProcess,
    FileNotFound,
    DeviceFailure,
    Unimplemented,
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyscallError::InvalidSyscall => write!(f, "Invalid syscall number"),
            SyscallError::InvalidArgument => write!(f, "Invalid argument"),
            SyscallError::BadDescriptor => write!(f, "Bad file descriptor"),
            SyscallError::ResourceExhausted => write!(f, "Resource exhausted"),
            SyscallError::InvalidExecutable => write!(f, "Not an executable"),
            SyscallError::Unsupported => write!(f, "Operation not supported"),
            SyscallError::NoCurrentProcess => write!(f, "No current process"),
            SyscallError::FileNotFound => write!(f, "File not found"),
            SyscallError::DeviceFailure => write!(f, "Device failure"),
            SyscallError::Unimplemented => write!(f, "Not implemented"),
        }
    }
}

impl From<ProcessError> for SyscallError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::ResourceExhausted | ProcessError::DescriptorTableFull => {
                SyscallError::ResourceExhausted
            }
            ProcessError::NoCurrentProcess => SyscallError::NoCurrentProcess,
            ProcessError::BadDescriptor | ProcessError::ProtectedDescriptor => {
                SyscallError::BadDescriptor
            }
            ProcessError::InvalidProcessId | ProcessError::MissingContinuation => {
                SyscallError::InvalidArgument
            }
        }
    }
}

impl From<FileError> for SyscallError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::NotFound => SyscallError::FileNotFound,
            FileError::InvalidName => SyscallError::InvalidArgument,
            FileError::Io => SyscallError::DeviceFailure,
            FileError::Unsupported => SyscallError::Unsupported,
        }
    }
}

/// Every failure reaches user space as -1.
impl From<SyscallResult> for i32 {
    fn from(result: SyscallResult) -> i32 {
        match result {
            SyscallResult::Success(value) => value,
            SyscallResult::Error(_) => -1,
        }
    }
}

/// Handle a system call raised by the current process.
///
/// Halt never comes back here: it resumes the parent's execute instead.
pub fn handle_syscall<A: Arch>(service: &ProcessService<A>, syscall_num: u64, args: SyscallArgs) -> SyscallResult {
    let Some(number) = SyscallNumber::from_raw(syscall_num) else {
        log::debug!("[SYSCALL] unknown syscall {}", syscall_num);
        return SyscallResult::Error(SyscallError::InvalidSyscall);
    };

    let result = match number {
        SyscallNumber::Halt => service.halt(args.arg0 as u8),
        SyscallNumber::Execute => syscall_execute(service, args),
        SyscallNumber::Read => service.read(args.arg0 as usize, args.arg1, args.arg2 as usize),
        SyscallNumber::Write => service.write(args.arg0 as usize, args.arg1, args.arg2 as usize),
        SyscallNumber::Open => syscall_open(service, args),
        SyscallNumber::Close => service.close(args.arg0 as usize).map(|()| 0),
        SyscallNumber::GetArgs => service.getargs(args.arg0, args.arg1 as usize).map(|()| 0),
        SyscallNumber::Vidmap => service.vidmap(args.arg0).map(|_| 0),
        SyscallNumber::SetHandler => service.set_handler(args.arg0 as u32, args.arg1),
        SyscallNumber::SigReturn => service.sigreturn(),
    };

    if let Err(err) = result {
        log::debug!("[SYSCALL] {:?} failed: {}", number, err);
    }
    result.into()
}

fn syscall_execute<A: Arch>(service: &ProcessService<A>, args: SyscallArgs) -> Result<i32, SyscallError> {
    let mut command = [0u8; MAX_COMMAND_LEN + 1];
    let len = service.memory().copy_user_str(service.arch(), args.arg0, &mut command)?;
    service.execute(&command[..len]).map(|value| value as i32)
}

fn syscall_open<A: Arch>(service: &ProcessService<A>, args: SyscallArgs) -> Result<i32, SyscallError> {
    let mut name = [0u8; MAX_COMMAND_LEN + 1];
    let len = service.memory().copy_user_str(service.arch(), args.arg0, &mut name)?;
    service.open(&name[..len]).map(|fd| fd as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_follow_the_user_abi() {
        assert_eq!(SyscallNumber::from_raw(1), Some(SyscallNumber::Halt));
        assert_eq!(SyscallNumber::from_raw(2), Some(SyscallNumber::Execute));
        assert_eq!(SyscallNumber::from_raw(8), Some(SyscallNumber::Vidmap));
        assert_eq!(SyscallNumber::from_raw(10), Some(SyscallNumber::SigReturn));
        assert_eq!(SyscallNumber::from_raw(0), None);
        assert_eq!(SyscallNumber::from_raw(11), None);
    }

    #[test]
    fn every_error_becomes_minus_one() {
        assert_eq!(i32::from(SyscallResult::Success(7)), 7);
        assert_eq!(i32::from(SyscallResult::Success(256)), 256);
        for err in [
            SyscallError::InvalidSyscall,
            SyscallError::BadDescriptor,
            SyscallError::Unimplemented,
        ] {
            assert_eq!(i32::from(SyscallResult::Error(err)), -1);
        }
    }

    #[test]
    fn lower_layer_errors_map_to_categories() {
        assert_eq!(SyscallError::from(ProcessError::DescriptorTableFull), SyscallError::ResourceExhausted);
        assert_eq!(SyscallError::from(ProcessError::ProtectedDescriptor), SyscallError::BadDescriptor);
        assert_eq!(SyscallError::from(FileError::NotFound), SyscallError::FileNotFound);
        assert_eq!(SyscallError::from(FileError::Unsupported), SyscallError::Unsupported);
    }
}
