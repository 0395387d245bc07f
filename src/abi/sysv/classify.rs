//! Eightbyte classification of memory layouts.
//!
//! The System V AMD64 ABI classifies every argument and return value in
//! 8-byte chunks ("eightbytes"). Scalars classify directly from their ABI
//! annotation; arrays and structs classify recursively, merging the classes
//! of members that share an eightbyte, and then apply the post-merge fixups
//! that force ill-formed aggregates into memory. The result feeds the
//! storage calculator in `arrange`.

use log::error;
use smallvec::{smallvec, SmallVec};

use crate::common::error::ArrangeError;
use crate::common::layout::{align_up, GroupKind, GroupLayout, Layout, SequenceLayout, ValueLayout};

/// Per-eightbyte argument classes of the System V AMD64 ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentClass {
    /// Unclassified (empty or padding-only eightbyte).
    NoClass,
    /// General-purpose register class.
    Integer,
    /// Vector register class.
    Sse,
    /// Upper half of a vector value; always follows an `Sse` eightbyte.
    SseUp,
    /// Low eightbyte of an x87 extended-precision value.
    X87,
    /// High eightbyte of an x87 extended-precision value.
    X87Up,
    /// `_Complex long double`.
    ComplexX87,
    /// Passed in memory.
    Memory,
    /// Like `Integer`, but the value is a host address handle.
    Pointer,
}

impl ArgumentClass {
    /// Merge two classes that share an eightbyte.
    pub fn merge(self, other: ArgumentClass) -> ArgumentClass {
        use ArgumentClass::*;
        if self == other {
            return self;
        }
        if self == NoClass {
            return other;
        }
        if other == NoClass {
            return self;
        }
        if self == Memory || other == Memory {
            return Memory;
        }
        if self == Integer || other == Integer {
            return Integer;
        }
        if self.is_x87_family() || other.is_x87_family() {
            return Memory;
        }
        Sse
    }

    pub(crate) fn is_x87_family(self) -> bool {
        matches!(
            self,
            ArgumentClass::X87 | ArgumentClass::X87Up | ArgumentClass::ComplexX87
        )
    }
}

/// One class per eightbyte of a layout, in address order.
pub type ClassVec = SmallVec<[ArgumentClass; 8]>;

// The AVX-512 revision of the ABI allows aggregates of up to eight
// eightbytes in registers; older revisions stopped at four.
const MAX_AGGREGATE_EIGHTBYTES: u64 = 8;

const COMPLEX_X87_CLASSES: [ArgumentClass; 4] = [
    ArgumentClass::X87,
    ArgumentClass::X87Up,
    ArgumentClass::X87,
    ArgumentClass::X87Up,
];

fn memory_classes(n: usize) -> ClassVec {
    smallvec![ArgumentClass::Memory; n]
}

fn classify_value(value: &ValueLayout) -> Result<ClassVec, ArrangeError> {
    let mut classes = ClassVec::new();
    match value.class {
        ArgumentClass::Integer => {
            classes.push(ArgumentClass::Integer);
            // __int128 and friends span several eightbytes.
            let mut left = value.byte_size as i64 - 8;
            while left > 0 {
                classes.push(ArgumentClass::Integer);
                left -= 8;
            }
        }
        ArgumentClass::X87 => {
            classes.push(ArgumentClass::X87);
            classes.push(ArgumentClass::X87Up);
        }
        c @ (ArgumentClass::Sse | ArgumentClass::Pointer) => classes.push(c),
        c => {
            return Err(ArrangeError::unsupported(format!(
                "ABI class {:?} cannot annotate a value layout",
                c
            )))
        }
    }
    Ok(classes)
}

/// Merge `sub` into `classes` starting at eightbyte `pos`.
fn merge_at(classes: &mut ClassVec, sub: &[ArgumentClass], pos: usize) {
    for (i, &c) in sub.iter().enumerate() {
        classes[pos + i] = classes[pos + i].merge(c);
    }
}

/// Post-merge fixups shared by the sequence and group cases: any MEMORY
/// eightbyte, a misplaced X87UP, or a long aggregate that is not one SSE
/// value with SSEUP extensions all collapse the whole vector to MEMORY.
fn apply_psabi_fixups(classes: ClassVec) -> Result<ClassVec, ArrangeError> {
    let n = classes.len();
    for (i, &c) in classes.iter().enumerate() {
        if c == ArgumentClass::Memory {
            return Ok(memory_classes(n));
        }
        if c == ArgumentClass::X87Up {
            if i == 0 {
                return Err(ArrangeError::malformed(
                    "X87UP eightbyte with no preceding X87",
                ));
            }
            if classes[i - 1] != ArgumentClass::X87 {
                return Ok(memory_classes(n));
            }
        }
    }
    if n > 2 {
        if classes[0] != ArgumentClass::Sse {
            return Ok(memory_classes(n));
        }
        if classes[1..].iter().any(|&c| c != ArgumentClass::SseUp) {
            return Ok(memory_classes(n));
        }
    }
    Ok(classes)
}

fn classify_sequence(seq: &SequenceLayout) -> Result<ClassVec, ArrangeError> {
    let n_words = align_up(seq.byte_size(), 8) / 8;
    if n_words > MAX_AGGREGATE_EIGHTBYTES {
        return Ok(memory_classes(n_words as usize));
    }

    let mut classes: ClassVec = smallvec![ArgumentClass::NoClass; n_words as usize];
    let mut offset = 0u64;
    for _ in 0..seq.count {
        offset = align_up(offset, seq.element.alignment());
        let sub = classify_type(&seq.element)?;
        if sub.is_empty() {
            return Ok(classes);
        }
        merge_at(&mut classes, &sub, (offset / 8) as usize);
        offset += seq.element.byte_size();
    }

    apply_psabi_fixups(classes)
}

fn classify_group(group: &GroupLayout) -> Result<ClassVec, ArrangeError> {
    // _Complex long double has a fixed classification and skips the merge
    // loop and fixups entirely.
    if group.class == Some(ArgumentClass::ComplexX87) {
        return Ok(COMPLEX_X87_CLASSES.iter().copied().collect());
    }

    let n_words = align_up(group.byte_size(), 8) / 8;
    if n_words > MAX_AGGREGATE_EIGHTBYTES {
        return Ok(memory_classes(n_words as usize));
    }

    let mut classes: ClassVec = smallvec![ArgumentClass::NoClass; n_words as usize];
    let mut offset = 0u64;
    for member in &group.members {
        if member.is_padding() {
            continue;
        }
        // TODO: zero-length array members are skipped wholesale; confirm
        // against the psABI how zero-sized fields affect classification.
        if matches!(member, Layout::Sequence(s) if s.count == 0) {
            continue;
        }
        offset = align_up(offset, member.alignment());
        let sub = classify_type(member)?;
        if sub.is_empty() {
            return Ok(classes);
        }
        merge_at(&mut classes, &sub, (offset / 8) as usize);
        // Union members all overlay the group's base offset.
        if group.kind == GroupKind::Struct {
            offset += member.byte_size();
        }
    }

    apply_psabi_fixups(classes)
}

/// Classify a layout into one ABI class per eightbyte.
///
/// Total on the supported layout grammar; fails only on inputs the data
/// model cannot express as an argument (padding outside a group, bad value
/// annotations, a leading X87UP).
pub fn classify_type(layout: &Layout) -> Result<ClassVec, ArrangeError> {
    match layout {
        Layout::Value(v) => classify_value(v),
        Layout::Sequence(s) => classify_sequence(s),
        Layout::Group(g) => classify_group(g),
        Layout::Padding(_) => Err(ArrangeError::unsupported(
            "padding layout has no ABI class",
        )),
    }
}

/// Summary of a classified argument or return value.
///
/// Scalars collapse to their kind; aggregates keep the full class vector
/// for the storage calculator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeClass {
    Integer,
    Pointer,
    Float,
    Struct { classes: ClassVec },
}

impl TypeClass {
    fn of_value(classes: ClassVec) -> Result<TypeClass, ArrangeError> {
        if classes.len() != 1 {
            return Err(ArrangeError::unsupported(format!(
                "scalar classifies to {} eightbytes; only single-eightbyte scalars can cross the boundary directly",
                classes.len()
            )));
        }
        match classes[0] {
            ArgumentClass::Pointer => Ok(TypeClass::Pointer),
            ArgumentClass::Integer => Ok(TypeClass::Integer),
            ArgumentClass::Sse => Ok(TypeClass::Float),
            c => Err(ArrangeError::unsupported(format!(
                "unexpected scalar class {:?}",
                c
            ))),
        }
    }

    /// True when any eightbyte of an aggregate is MEMORY. After fixups this
    /// means all of them are.
    pub fn in_memory(&self) -> bool {
        match self {
            TypeClass::Struct { classes } => classes.contains(&ArgumentClass::Memory),
            _ => false,
        }
    }
}

/// Classify and summarize a top-level argument or return layout.
pub fn classify_layout(layout: &Layout) -> Result<TypeClass, ArrangeError> {
    let result = classify_type(layout).and_then(|classes| match layout {
        Layout::Value(_) => TypeClass::of_value(classes),
        Layout::Group(_) => Ok(TypeClass::Struct { classes }),
        _ => Err(ArrangeError::unsupported(
            "sequence layouts only classify as aggregate members",
        )),
    });
    if let Err(err) = &result {
        error!("failed to classify layout {:?}: {}", layout, err);
    }
    result
}
