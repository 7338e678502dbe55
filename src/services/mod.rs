// Kernel services behind the syscall surface
pub mod file_system_service;
pub mod memory_service;
pub mod process_service;

pub use file_system_service::FileSystemService;
pub use memory_service::MemoryService;
pub use process_service::{ProcessService, ProcessStats, SystemStats};
