// src/interrupts.rs
use lazy_static::lazy_static;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use x86_64::{PrivilegeLevel, VirtAddr};

use crate::arch::x86::service;
use crate::syscalls::{self, SyscallArgs};

/// `int 0x80`: rax = number, rbx/rcx/rdx = arguments, result in rax.
/// Entered through a trap gate, so IF is left as user code had it.
pub const SYSCALL_VECTOR: usize = 0x80;

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        idt.divide_error.set_handler_fn(divide_error_handler);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.overflow.set_handler_fn(overflow_handler);
        idt.bound_range_exceeded.set_handler_fn(bound_range_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
        idt.device_not_available.set_handler_fn(device_not_available_handler);
        idt.x87_floating_point.set_handler_fn(x87_floating_point_handler);
        idt.simd_floating_point.set_handler_fn(simd_floating_point_handler);
        idt.segment_not_present.set_handler_fn(segment_not_present_handler);
        idt.stack_segment_fault.set_handler_fn(stack_segment_fault_handler);
        idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
        idt.alignment_check.set_handler_fn(alignment_check_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.double_fault.set_handler_fn(double_fault_handler);
        // Drivers may wait on IRQs; critical sections mask interrupts themselves.
        unsafe {
            idt[SYSCALL_VECTOR]
                .set_handler_addr(VirtAddr::new(syscall_entry as u64))
                .set_privilege_level(PrivilegeLevel::Ring3)
                .disable_interrupts(false);
        }
        idt
    };
}

pub fn init_idt() {
    IDT.load();
}

/// Faults raised by user code kill the process; the kernel faulting is a bug.
fn exception(name: &str, stack_frame: &InterruptStackFrame) -> ! {
    if stack_frame.code_segment & 0x3 == 0x3 {
        log::warn!(
            "[HALT] {} in user mode at {:#x}",
            name,
            stack_frame.instruction_pointer.as_u64()
        );
        service().halt_on_exception();
    }
    panic!("EXCEPTION: {}\n{:#?}", name, stack_frame);
}

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    exception("DIVIDE ERROR", &stack_frame);
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    exception("BREAKPOINT", &stack_frame);
}

extern "x86-interrupt" fn overflow_handler(stack_frame: InterruptStackFrame) {
    exception("OVERFLOW", &stack_frame);
}

extern "x86-interrupt" fn bound_range_handler(stack_frame: InterruptStackFrame) {
    exception("BOUND RANGE EXCEEDED", &stack_frame);
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    exception("INVALID OPCODE", &stack_frame);
}

extern "x86-interrupt" fn device_not_available_handler(stack_frame: InterruptStackFrame) {
    exception("DEVICE NOT AVAILABLE", &stack_frame);
}

extern "x86-interrupt" fn x87_floating_point_handler(stack_frame: InterruptStackFrame) {
    exception("x87 FLOATING POINT", &stack_frame);
}

extern "x86-interrupt" fn simd_floating_point_handler(stack_frame: InterruptStackFrame) {
    exception("SIMD FLOATING POINT", &stack_frame);
}

extern "x86-interrupt" fn segment_not_present_handler(stack_frame: InterruptStackFrame, _error_code: u64) {
    exception("SEGMENT NOT PRESENT", &stack_frame);
}

extern "x86-interrupt" fn stack_segment_fault_handler(stack_frame: InterruptStackFrame, _error_code: u64) {
    exception("STACK SEGMENT FAULT", &stack_frame);
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    log::debug!("[HALT] general protection fault, error code {:#x}", error_code);
    exception("GENERAL PROTECTION FAULT", &stack_frame);
}

extern "x86-interrupt" fn alignment_check_handler(stack_frame: InterruptStackFrame, _error_code: u64) {
    exception("ALIGNMENT CHECK", &stack_frame);
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    log::debug!("[HALT] page fault at {:?}, {:?}", Cr2::read(), error_code);
    exception("PAGE FAULT", &stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) -> ! {
    panic!("EXCEPTION: DOUBLE FAULT\n{:#?}", stack_frame);
}

#[unsafe(naked)]
extern "C" fn syscall_entry() -> ! {
    core::arch::naked_asm!(
        "push r15",
        "push r14",
        "push r13",
        "push r12",
        "push r11",
        "push r10",
        "push r9",
        "push r8",
        "push rbp",
        "push rdi",
        "push rsi",
        "push rdx",
        "push rcx",
        "push rbx",
        "push rax",
        // 15 pushes on top of the 5-word trap frame keep rsp 16-byte aligned.
        "mov rdi, [rsp]",      // number
        "mov rsi, [rsp + 8]",  // rbx
        "mov rdx, [rsp + 16]", // rcx
        "mov rcx, [rsp + 24]", // rdx
        "call {dispatch}",
        "mov [rsp], rax",
        "pop rax",
        "pop rbx",
        "pop rcx",
        "pop rdx",
        "pop rsi",
        "pop rdi",
        "pop rbp",
        "pop r8",
        "pop r9",
        "pop r10",
        "pop r11",
        "pop r12",
        "pop r13",
        "pop r14",
        "pop r15",
        "iretq",
        dispatch = sym syscall_dispatch,
    );
}

extern "C" fn syscall_dispatch(syscall_num: u64, arg0: u64, arg1: u64, arg2: u64) -> u64 {
    let args = SyscallArgs { arg0, arg1, arg2 };
    let result = syscalls::handle_syscall(service(), syscall_num, args);
    i32::from(result) as i64 as u64
}
