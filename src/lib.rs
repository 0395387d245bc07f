//! Calling-sequence construction for the System V AMD64 C ABI.
//!
//! Given the memory layouts of a foreign C function's arguments and return
//! value, this crate classifies every layout into per-eightbyte ABI classes,
//! assigns integer registers, vector registers and stack slots under the
//! psABI exhaustion rules, and emits the ordered data-movement bindings that
//! a downstream invoker or upcall stub executes to marshal values across the
//! call boundary.
//!
//! The crate is a pure builder: it performs no I/O, holds no global state,
//! and never touches native memory itself. Executing the emitted bindings
//! (loading registers, performing the call, allocating return buffers) is
//! the job of an external invoker.
//!
//! Entry points are [`arrange_downcall`] for calls from the host into native
//! code and [`arrange_upcall`] for native calls back into a host function.

pub mod abi;
pub mod common;

pub use abi::binding::{Binding, CallingSequence, Carrier, HostSignature};
pub use abi::storage::{AbiDescriptor, Storage, StorageKind};
pub use abi::sysv::{
    arrange_downcall, arrange_upcall, classify_layout, classify_type, ArgumentClass,
    DowncallHandle, HostFunction, TypeClass, UpcallHandler,
};
pub use common::error::ArrangeError;
pub use common::layout::{FunctionDescriptor, Layout};
