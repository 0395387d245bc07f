//! Storage assignment and calling-sequence construction.
//!
//! The storage calculator hands out integer registers, vector registers
//! and 8-byte stack slots under the ABI exhaustion rules; the binding
//! calculators turn classified layouts into ordered binding lists; and
//! `arrange_downcall` / `arrange_upcall` orchestrate a whole call site,
//! including the hidden return-buffer pointer for in-memory returns and
//! the trailing vector-register-count argument variadic callees read
//! from `al`.

use log::debug;
use smallvec::SmallVec;

use crate::abi::binding::{
    Binding, CallingSequence, CallingSequenceBuilder, Carrier, HostSignature,
};
use crate::abi::storage::{AbiDescriptor, Storage, StorageKind};
use crate::abi::x86_64::{RAX, SYS_V};
use crate::common::error::ArrangeError;
use crate::common::layout::{FunctionDescriptor, Layout};

use super::classify::{classify_layout, ArgumentClass, TypeClass};
use super::{
    MAX_INTEGER_ARGUMENT_REGISTERS, MAX_INTEGER_RETURN_REGISTERS,
    MAX_VECTOR_ARGUMENT_REGISTERS, MAX_VECTOR_RETURN_REGISTERS,
};

/// Greedy register and stack-slot allocator for one direction of one call
/// site. Counters only ever grow.
struct StorageCalculator {
    /// Arguments may overflow to the stack; return values may not.
    for_arguments: bool,
    n_integer_reg: usize,
    n_vector_reg: usize,
    stack_offset: u32,
}

/// Per-eightbyte storages for an aggregate. `None` marks an eightbyte that
/// needs no data movement (SSEUP upper halves and padding-only chunks).
type StructStorages = SmallVec<[Option<Storage>; 8]>;

impl StorageCalculator {
    fn new(for_arguments: bool) -> StorageCalculator {
        StorageCalculator {
            for_arguments,
            n_integer_reg: 0,
            n_vector_reg: 0,
            stack_offset: 0,
        }
    }

    fn register_count(&self, kind: StorageKind) -> usize {
        match kind {
            StorageKind::Integer => self.n_integer_reg,
            StorageKind::Vector => self.n_vector_reg,
            StorageKind::Stack => unreachable!("stack slots are not counted as registers"),
        }
    }

    fn register_cap(&self, kind: StorageKind) -> usize {
        match (kind, self.for_arguments) {
            (StorageKind::Integer, true) => MAX_INTEGER_ARGUMENT_REGISTERS,
            (StorageKind::Integer, false) => MAX_INTEGER_RETURN_REGISTERS,
            (StorageKind::Vector, true) => MAX_VECTOR_ARGUMENT_REGISTERS,
            (StorageKind::Vector, false) => MAX_VECTOR_RETURN_REGISTERS,
            (StorageKind::Stack, _) => unreachable!("stack slots have no register cap"),
        }
    }

    fn increment(&mut self, kind: StorageKind) {
        match kind {
            StorageKind::Integer => self.n_integer_reg += 1,
            StorageKind::Vector => self.n_vector_reg += 1,
            StorageKind::Stack => unreachable!("stack slots are not counted as registers"),
        }
    }

    fn stack_alloc(&mut self) -> Storage {
        assert!(self.for_arguments, "return values never use stack slots");
        let slot = Storage::stack_slot(self.stack_offset);
        self.stack_offset += 1;
        slot
    }

    /// Next register of `kind`, or the next stack slot once the register
    /// file is exhausted.
    fn next_storage(&mut self, kind: StorageKind) -> Storage {
        let used = self.register_count(kind);
        if used < self.register_cap(kind) {
            let file = if self.for_arguments {
                SYS_V.argument_registers(kind)
            } else {
                SYS_V.return_registers(kind)
            };
            self.increment(kind);
            file[used]
        } else {
            self.stack_alloc()
        }
    }

    /// Storages for a classified aggregate, one entry per eightbyte.
    ///
    /// An aggregate goes to registers only if every eightbyte finds one:
    /// if either register file is too short for its share, the whole
    /// aggregate takes stack slots instead. X87-family classes (reachable
    /// only through a `_Complex long double` group) always go to the
    /// stack.
    fn struct_storages(&mut self, classes: &[ArgumentClass]) -> StructStorages {
        let spill_all = |calc: &mut StorageCalculator| -> StructStorages {
            classes.iter().map(|_| Some(calc.stack_alloc())).collect()
        };

        if classes.contains(&ArgumentClass::Memory) {
            return spill_all(self);
        }
        if classes.iter().any(|c| c.is_x87_family()) {
            return spill_all(self);
        }

        let integers_needed = classes
            .iter()
            .filter(|c| matches!(c, ArgumentClass::Integer | ArgumentClass::Pointer))
            .count();
        if self.n_integer_reg + integers_needed > self.register_cap(StorageKind::Integer) {
            return spill_all(self);
        }

        let vectors_needed = classes
            .iter()
            .filter(|&&c| c == ArgumentClass::Sse)
            .count();
        if self.n_vector_reg + vectors_needed > self.register_cap(StorageKind::Vector) {
            return spill_all(self);
        }

        classes
            .iter()
            .map(|&c| match c {
                ArgumentClass::Integer | ArgumentClass::Pointer => {
                    Some(self.next_storage(StorageKind::Integer))
                }
                ArgumentClass::Sse => Some(self.next_storage(StorageKind::Vector)),
                ArgumentClass::SseUp | ArgumentClass::NoClass => None,
                _ => unreachable!("class {:?} cannot reach register assignment", c),
            })
            .collect()
    }
}

/// Computes the binding list of one argument or return value.
///
/// Unboxing moves a host value into native storages (downcall arguments,
/// upcall returns); boxing recovers a host value from native storages
/// (downcall returns, upcall arguments). The two directions differ only
/// in the order around `BoxAddress` and in the leading buffer allocation
/// for boxed aggregates.
struct BindingCalculator {
    storage: StorageCalculator,
    boxing: bool,
}

impl BindingCalculator {
    fn for_unboxing(for_arguments: bool) -> BindingCalculator {
        BindingCalculator { storage: StorageCalculator::new(for_arguments), boxing: false }
    }

    fn for_boxing(for_arguments: bool) -> BindingCalculator {
        BindingCalculator { storage: StorageCalculator::new(for_arguments), boxing: true }
    }

    fn bindings(&mut self, carrier: Carrier, layout: &Layout) -> Result<Vec<Binding>, ArrangeError> {
        let type_class = classify_layout(layout)?;
        let mut bindings = Vec::new();
        match type_class {
            TypeClass::Struct { classes } => {
                if carrier != Carrier::Buffer {
                    return Err(ArrangeError::unsupported(format!(
                        "aggregate layouts require a buffer carrier, got {:?}",
                        carrier
                    )));
                }
                if !self.storage.for_arguments
                    && classes.iter().any(|c| c.is_x87_family())
                {
                    return Err(ArrangeError::unsupported(
                        "x87-class aggregate returns are not supported",
                    ));
                }
                if self.boxing {
                    bindings.push(Binding::AllocateBuffer { layout: layout.clone() });
                }
                let storages = self.storage.struct_storages(&classes);
                let byte_size = layout.byte_size();
                for (i, storage) in storages.iter().enumerate() {
                    let Some(storage) = *storage else {
                        continue;
                    };
                    let offset = i as u64 * 8;
                    let size = (byte_size - offset).min(8);
                    bindings.push(Binding::Dereference { storage, offset, size });
                }
            }
            TypeClass::Pointer => {
                let storage = self.storage.next_storage(StorageKind::Integer);
                if self.boxing {
                    bindings.push(Binding::Move { storage, carrier: Carrier::I64 });
                    bindings.push(Binding::BoxAddress);
                } else {
                    bindings.push(Binding::BoxAddress);
                    bindings.push(Binding::Move { storage, carrier: Carrier::I64 });
                }
            }
            TypeClass::Integer => {
                let storage = self.storage.next_storage(StorageKind::Integer);
                bindings.push(Binding::Move { storage, carrier });
            }
            TypeClass::Float => {
                let storage = self.storage.next_storage(StorageKind::Vector);
                bindings.push(Binding::Move { storage, carrier });
            }
        }
        Ok(bindings)
    }
}

/// Opaque handle to the host function an upcall stub dispatches into.
///
/// The runtime that executes calling sequences resolves it to a callable;
/// the arranger only threads it through to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostFunction(pub u64);

/// A downcall call-site artifact: everything an invoker needs to load
/// registers and stack slots, perform the call, and recover the result.
///
/// For in-memory returns the invoker allocates a buffer of
/// [`return_layout`](DowncallHandle::return_layout)'s size, threads its
/// base address through the hidden leading pointer argument, and yields
/// that same buffer as the call's result.
#[derive(Debug)]
pub struct DowncallHandle {
    abi: &'static AbiDescriptor,
    address: u64,
    sequence: CallingSequence,
    vector_argument_count: u32,
    in_memory_return: bool,
    return_layout: Option<Layout>,
}

impl DowncallHandle {
    pub fn abi(&self) -> &'static AbiDescriptor {
        self.abi
    }

    /// Address of the native function being called.
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn calling_sequence(&self) -> &CallingSequence {
        &self.sequence
    }

    /// Number of vector registers the argument list uses, frozen into the
    /// trailing synthetic argument (`al` for variadic callees).
    pub fn vector_argument_count(&self) -> u32 {
        self.vector_argument_count
    }

    pub fn in_memory_return(&self) -> bool {
        self.in_memory_return
    }

    pub fn return_layout(&self) -> Option<&Layout> {
        self.return_layout.as_ref()
    }
}

/// An upcall call-site artifact: how a native caller's registers and stack
/// map onto the host function's arguments and result.
///
/// For in-memory returns the stub copies the buffer the host function
/// produced into the caller-provided destination and returns the
/// destination pointer in `rax`.
#[derive(Debug)]
pub struct UpcallHandler {
    abi: &'static AbiDescriptor,
    target: HostFunction,
    sequence: CallingSequence,
    in_memory_return: bool,
    return_layout: Option<Layout>,
}

impl UpcallHandler {
    pub fn abi(&self) -> &'static AbiDescriptor {
        self.abi
    }

    pub fn target(&self) -> HostFunction {
        self.target
    }

    pub fn calling_sequence(&self) -> &CallingSequence {
        &self.sequence
    }

    pub fn in_memory_return(&self) -> bool {
        self.in_memory_return
    }

    pub fn return_layout(&self) -> Option<&Layout> {
        self.return_layout.as_ref()
    }
}

fn validate(host: &HostSignature, descriptor: &FunctionDescriptor) -> Result<(), ArrangeError> {
    if host.param_count() != descriptor.argument_layouts().len() {
        return Err(ArrangeError::ArityMismatch {
            host: host.param_count(),
            native: descriptor.argument_layouts().len(),
        });
    }
    if host.return_carrier().is_some() != descriptor.return_layout().is_some() {
        return Err(ArrangeError::ReturnPresenceMismatch);
    }
    Ok(())
}

/// True when the return value is an aggregate the ABI passes through a
/// caller-allocated buffer instead of registers.
fn is_in_memory_return(ret: Option<&Layout>) -> Result<bool, ArrangeError> {
    match ret {
        Some(layout @ Layout::Group(_)) => Ok(classify_layout(layout)?.in_memory()),
        _ => Ok(false),
    }
}

/// Arrange a call from the host into the native function at `address`.
///
/// Returns the finished calling sequence wrapped in a [`DowncallHandle`].
/// The sequence's last argument is always the synthetic vector-register
/// count bound to `rax`; for in-memory returns a hidden pointer argument
/// precedes all declared arguments.
pub fn arrange_downcall(
    address: u64,
    host: &HostSignature,
    descriptor: &FunctionDescriptor,
) -> Result<DowncallHandle, ArrangeError> {
    validate(host, descriptor)?;

    let mut builder = CallingSequenceBuilder::new();
    let mut arg_calc = BindingCalculator::for_unboxing(true);
    let mut ret_calc = BindingCalculator::for_boxing(false);

    let in_memory_return = is_in_memory_return(descriptor.return_layout())?;
    if in_memory_return {
        let pointer = Layout::c_pointer();
        let bindings = arg_calc.bindings(Carrier::Address, &pointer)?;
        builder.add_argument(Carrier::Address, pointer, bindings);
    } else if let Some(ret_layout) = descriptor.return_layout() {
        let carrier = host
            .return_carrier()
            .ok_or(ArrangeError::ReturnPresenceMismatch)?;
        let bindings = ret_calc.bindings(carrier, ret_layout)?;
        builder.set_return(carrier, ret_layout.clone(), bindings);
    }

    for (&carrier, layout) in host.params().iter().zip(descriptor.argument_layouts()) {
        let bindings = arg_calc.bindings(carrier, layout)?;
        builder.add_argument(carrier, layout.clone(), bindings);
    }

    // Trailing synthetic argument: the number of vector registers the call
    // uses, read by variadic callees from al. Harmless otherwise.
    builder.add_argument(
        Carrier::I64,
        Layout::c_long(),
        vec![Binding::Move { storage: RAX, carrier: Carrier::I64 }],
    );

    let vector_argument_count = arg_calc.storage.n_vector_reg as u32;
    let sequence = builder.build();
    debug!(
        "arranged downcall to {:#x}: {} arguments, in-memory return: {}, vector registers: {}",
        address,
        sequence.argument_count(),
        in_memory_return,
        vector_argument_count
    );

    Ok(DowncallHandle {
        abi: &SYS_V,
        address,
        sequence,
        vector_argument_count,
        in_memory_return,
        return_layout: descriptor.return_layout().cloned(),
    })
}

/// Arrange a native call back into the host function `target`.
///
/// Mirrors [`arrange_downcall`]: arguments are boxed out of the caller's
/// registers and stack, the return value is unboxed into the return
/// registers. No trailing vector-count argument is added; the stub is the
/// callee and simply ignores `al`.
pub fn arrange_upcall(
    target: HostFunction,
    host: &HostSignature,
    descriptor: &FunctionDescriptor,
) -> Result<UpcallHandler, ArrangeError> {
    validate(host, descriptor)?;

    let mut builder = CallingSequenceBuilder::new();
    let mut arg_calc = BindingCalculator::for_boxing(true);
    let mut ret_calc = BindingCalculator::for_unboxing(false);

    let in_memory_return = is_in_memory_return(descriptor.return_layout())?;
    if in_memory_return {
        let pointer = Layout::c_pointer();
        let bindings = arg_calc.bindings(Carrier::Address, &pointer)?;
        builder.add_argument(Carrier::Address, pointer, bindings);
    } else if let Some(ret_layout) = descriptor.return_layout() {
        let carrier = host
            .return_carrier()
            .ok_or(ArrangeError::ReturnPresenceMismatch)?;
        let bindings = ret_calc.bindings(carrier, ret_layout)?;
        builder.set_return(carrier, ret_layout.clone(), bindings);
    }

    for (&carrier, layout) in host.params().iter().zip(descriptor.argument_layouts()) {
        let bindings = arg_calc.bindings(carrier, layout)?;
        builder.add_argument(carrier, layout.clone(), bindings);
    }

    let sequence = builder.build();
    debug!(
        "arranged upcall into {:?}: {} arguments, in-memory return: {}",
        target,
        sequence.argument_count(),
        in_memory_return
    );

    Ok(UpcallHandler {
        abi: &SYS_V,
        target,
        sequence,
        in_memory_return,
        return_layout: descriptor.return_layout().cloned(),
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────
