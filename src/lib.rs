#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_os = "none", feature(abi_x86_interrupt))]

pub mod arch;
pub mod config;
pub mod fs;
pub mod loader;
pub mod process;
pub mod services;
pub mod syscalls;

#[cfg(target_os = "none")]
pub mod interrupts;
#[cfg(target_os = "none")]
pub mod logging;
#[cfg(target_os = "none")]
pub mod userspace;

#[cfg(test)]
mod test_support;

pub use config::{KernelConfig, Layout};
pub use services::ProcessService;
pub use syscalls::{handle_syscall, SyscallArgs, SyscallError, SyscallNumber, SyscallResult};
