// Process management for the EMOS execution core
pub mod context;
pub mod fd;
pub mod pcb;
pub mod pid;
pub mod table;

pub use context::{Continuation, HaltCause, Resumption, UserFrame};
pub use fd::{Descriptor, DescriptorTable, STDIN, STDOUT};
pub use pcb::{ArgBuffer, ProcessControlBlock, ProcessError, ProcessId};
pub use pid::PidAllocator;
pub use table::ProcessTable;
