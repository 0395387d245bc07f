//! System V AMD64 argument classification and call arrangement.

pub mod arrange;
pub mod classify;

pub use arrange::{arrange_downcall, arrange_upcall, DowncallHandle, HostFunction, UpcallHandler};
pub use classify::{classify_layout, classify_type, ArgumentClass, ClassVec, TypeClass};

/// Integer registers available for declared arguments (`rdi` through `r9`).
pub const MAX_INTEGER_ARGUMENT_REGISTERS: usize = 6;
/// Vector registers available for arguments (`xmm0` through `xmm7`).
pub const MAX_VECTOR_ARGUMENT_REGISTERS: usize = 8;
/// Integer registers available for returns (`rax`, `rdx`).
pub const MAX_INTEGER_RETURN_REGISTERS: usize = 2;
/// Vector registers available for returns (`xmm0`, `xmm1`).
pub const MAX_VECTOR_RETURN_REGISTERS: usize = 2;
