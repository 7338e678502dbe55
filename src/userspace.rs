// Ring 3 entry and the return path into a suspended execute
use core::arch::naked_asm;

use crate::process::{Continuation, UserFrame};

/// Pushes the callee-saved registers, records the stack in `save` (skipped
/// when null) and irets into `frame`. Control comes back out of this call
/// only through [`resume`], with its value in rax.
///
/// # Safety
///
/// `frame` must describe mapped user code and stack with ring 3 selectors,
/// and the TSS must hold a valid privilege-zero stack.
#[unsafe(naked)]
pub unsafe extern "C" fn enter_user(frame: *const UserFrame, save: *mut Continuation) -> u64 {
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "test rsi, rsi",
        "jz 2f",
        "mov [rsi], rsp",
        "mov [rsi + 8], rbp",
        "2:",
        // iretq frame: ss, rsp, rflags, cs, rip
        "push qword ptr [rdi + 32]",
        "push qword ptr [rdi + 24]",
        "push qword ptr [rdi + 16]",
        "push qword ptr [rdi + 8]",
        "push qword ptr [rdi]",
        "mov ax, word ptr [rdi + 32]",
        "mov ds, ax",
        "mov es, ax",
        "iretq",
    );
}

/// Switches to the stack saved by [`enter_user`] and returns `value` from it.
///
/// # Safety
///
/// `continuation` must come from an `enter_user` call whose stack has not
/// been reused since.
#[unsafe(naked)]
pub unsafe extern "C" fn resume(continuation: *const Continuation, value: u64) -> ! {
    naked_asm!(
        "mov rsp, [rdi]",
        "mov rax, rsi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    );
}
