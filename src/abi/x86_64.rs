//! x86-64 register definitions and the System V ABI descriptor.

use super::storage::{AbiDescriptor, Storage, StorageKind};

macro_rules! int_reg {
    ($name:ident, $index:expr, $asm:literal) => {
        pub const $name: Storage = Storage::reg(StorageKind::Integer, $index, $asm);
    };
}

macro_rules! xmm_reg {
    ($name:ident, $index:expr, $asm:literal) => {
        pub const $name: Storage = Storage::reg(StorageKind::Vector, $index, $asm);
    };
}

// General-purpose registers, indexed by hardware encoding.
int_reg!(RAX, 0, "rax");
int_reg!(RCX, 1, "rcx");
int_reg!(RDX, 2, "rdx");
int_reg!(RSI, 6, "rsi");
int_reg!(RDI, 7, "rdi");
int_reg!(R8, 8, "r8");
int_reg!(R9, 9, "r9");
int_reg!(R10, 10, "r10");
int_reg!(R11, 11, "r11");

xmm_reg!(XMM0, 0, "xmm0");
xmm_reg!(XMM1, 1, "xmm1");
xmm_reg!(XMM2, 2, "xmm2");
xmm_reg!(XMM3, 3, "xmm3");
xmm_reg!(XMM4, 4, "xmm4");
xmm_reg!(XMM5, 5, "xmm5");
xmm_reg!(XMM6, 6, "xmm6");
xmm_reg!(XMM7, 7, "xmm7");
xmm_reg!(XMM8, 8, "xmm8");
xmm_reg!(XMM9, 9, "xmm9");
xmm_reg!(XMM10, 10, "xmm10");
xmm_reg!(XMM11, 11, "xmm11");
xmm_reg!(XMM12, 12, "xmm12");
xmm_reg!(XMM13, 13, "xmm13");
xmm_reg!(XMM14, 14, "xmm14");
xmm_reg!(XMM15, 15, "xmm15");

/// The System V AMD64 calling convention.
///
/// `rax` trails the six integer argument registers: it is never allocated
/// to a declared argument (the cap stops at six) but names the storage of
/// the synthetic vector-register-count argument used by variadic calls.
pub static SYS_V: AbiDescriptor = AbiDescriptor {
    integer_argument_regs: &[RDI, RSI, RDX, RCX, R8, R9, RAX],
    vector_argument_regs: &[XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7],
    integer_return_regs: &[RAX, RDX],
    vector_return_regs: &[XMM0, XMM1],
    volatile_integer_regs: &[R10, R11],
    volatile_vector_regs: &[XMM8, XMM9, XMM10, XMM11, XMM12, XMM13, XMM14, XMM15],
    stack_alignment: 16,
    shadow_space: 0,
};
