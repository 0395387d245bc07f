//! Memory layouts of native C types.
//!
//! A [`Layout`] describes the size, alignment and ABI classification of a C
//! type as a tree: annotated scalar values at the leaves, arrays and
//! struct/union groups above them, with explicit padding members wherever
//! the C type contains them. The classifier walks this tree; it never
//! inspects native memory.
//!
//! Group sizes are not padded implicitly: a struct layout is expected to
//! carry the padding members the C compiler would insert, so its byte size
//! is simply the sum of its member sizes (the maximum for a union).

use crate::abi::sysv::ArgumentClass;

/// Round `offset` up to the next multiple of `alignment`.
///
/// `alignment` must be a non-zero power of two.
pub fn align_up(offset: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (offset + alignment - 1) & !(alignment - 1)
}

/// The layout of a single native value: size, alignment, and the ABI class
/// the value belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueLayout {
    pub byte_size: u64,
    pub alignment: u64,
    /// ABI class annotation. Only `Integer`, `Sse`, `X87` and `Pointer`
    /// are meaningful on values; anything else is rejected during
    /// classification.
    pub class: ArgumentClass,
}

/// A homogeneous array of `count` elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceLayout {
    pub element: Box<Layout>,
    pub count: u64,
}

/// Whether a group lays its members out consecutively or overlays them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Struct,
    Union,
}

/// A struct or union with ordered member layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLayout {
    pub kind: GroupKind,
    pub members: Vec<Layout>,
    /// Optional ABI class annotation on the whole group. Used for
    /// `_Complex long double`, whose classification is fixed rather than
    /// derived from the members.
    pub class: Option<ArgumentClass>,
}

/// A native memory layout tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    Value(ValueLayout),
    Sequence(SequenceLayout),
    Group(GroupLayout),
    /// Inter-member padding inside a group, in bytes. Padding carries no
    /// ABI class and is skipped during classification; it only contributes
    /// to the enclosing group's size.
    Padding(u64),
}

impl Layout {
    pub fn value(byte_size: u64, alignment: u64, class: ArgumentClass) -> Layout {
        Layout::Value(ValueLayout { byte_size, alignment, class })
    }

    pub fn sequence(count: u64, element: Layout) -> Layout {
        Layout::Sequence(SequenceLayout { element: Box::new(element), count })
    }

    pub fn struct_of(members: Vec<Layout>) -> Layout {
        Layout::Group(GroupLayout { kind: GroupKind::Struct, members, class: None })
    }

    pub fn union_of(members: Vec<Layout>) -> Layout {
        Layout::Group(GroupLayout { kind: GroupKind::Union, members, class: None })
    }

    pub fn padding(byte_size: u64) -> Layout {
        Layout::Padding(byte_size)
    }

    pub fn byte_size(&self) -> u64 {
        match self {
            Layout::Value(v) => v.byte_size,
            Layout::Sequence(s) => s.byte_size(),
            Layout::Group(g) => g.byte_size(),
            Layout::Padding(size) => *size,
        }
    }

    /// Natural alignment: declared for values, the element's for sequences,
    /// the strictest member's for groups. Padding aligns to one byte.
    pub fn alignment(&self) -> u64 {
        match self {
            Layout::Value(v) => v.alignment,
            Layout::Sequence(s) => s.element.alignment(),
            Layout::Group(g) => g.members.iter().map(Layout::alignment).max().unwrap_or(1),
            Layout::Padding(_) => 1,
        }
    }

    pub fn is_padding(&self) -> bool {
        matches!(self, Layout::Padding(_))
    }
}

impl SequenceLayout {
    pub fn byte_size(&self) -> u64 {
        self.count * self.element.byte_size()
    }
}

impl GroupLayout {
    pub fn byte_size(&self) -> u64 {
        let sizes = self.members.iter().map(Layout::byte_size);
        match self.kind {
            GroupKind::Struct => sizes.sum(),
            GroupKind::Union => sizes.max().unwrap_or(0),
        }
    }
}

// C type constructors for the System V AMD64 data model (LP64).
impl Layout {
    pub fn c_bool() -> Layout {
        Layout::value(1, 1, ArgumentClass::Integer)
    }

    pub fn c_char() -> Layout {
        Layout::value(1, 1, ArgumentClass::Integer)
    }

    pub fn c_short() -> Layout {
        Layout::value(2, 2, ArgumentClass::Integer)
    }

    pub fn c_int() -> Layout {
        Layout::value(4, 4, ArgumentClass::Integer)
    }

    pub fn c_long() -> Layout {
        Layout::value(8, 8, ArgumentClass::Integer)
    }

    pub fn c_long_long() -> Layout {
        Layout::value(8, 8, ArgumentClass::Integer)
    }

    /// `__int128`, classified as two INTEGER eightbytes.
    pub fn c_int128() -> Layout {
        Layout::value(16, 16, ArgumentClass::Integer)
    }

    pub fn c_float() -> Layout {
        Layout::value(4, 4, ArgumentClass::Sse)
    }

    pub fn c_double() -> Layout {
        Layout::value(8, 8, ArgumentClass::Sse)
    }

    /// 80-bit x87 extended precision, stored in 16 bytes.
    pub fn c_long_double() -> Layout {
        Layout::value(16, 16, ArgumentClass::X87)
    }

    pub fn c_pointer() -> Layout {
        Layout::value(8, 8, ArgumentClass::Pointer)
    }

    /// `_Complex long double`: a two-member group with a fixed
    /// classification of four x87 eightbytes.
    pub fn c_complex_long_double() -> Layout {
        Layout::Group(GroupLayout {
            kind: GroupKind::Struct,
            members: vec![Layout::c_long_double(), Layout::c_long_double()],
            class: Some(ArgumentClass::ComplexX87),
        })
    }
}

/// The native-side description of a C function: one layout per argument
/// and an optional return layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    args: Vec<Layout>,
    ret: Option<Layout>,
}

impl FunctionDescriptor {
    /// Describe a function returning `ret`.
    pub fn of(ret: Layout, args: Vec<Layout>) -> FunctionDescriptor {
        FunctionDescriptor { args, ret: Some(ret) }
    }

    /// Describe a `void` function.
    pub fn of_void(args: Vec<Layout>) -> FunctionDescriptor {
        FunctionDescriptor { args, ret: None }
    }

    pub fn argument_layouts(&self) -> &[Layout] {
        &self.args
    }

    pub fn return_layout(&self) -> Option<&Layout> {
        self.ret.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(12, 4), 12);
        assert_eq!(align_up(13, 16), 16);
    }

    #[test]
    fn test_struct_size_is_member_sum() {
        let s = Layout::struct_of(vec![Layout::c_int(), Layout::c_int(), Layout::c_double()]);
        assert_eq!(s.byte_size(), 16);
        assert_eq!(s.alignment(), 8);
    }

    #[test]
    fn test_union_size_is_member_max() {
        let u = Layout::union_of(vec![Layout::c_char(), Layout::c_double()]);
        assert_eq!(u.byte_size(), 8);
        assert_eq!(u.alignment(), 8);
    }

    #[test]
    fn test_padding_contributes_size_only() {
        let s = Layout::struct_of(vec![Layout::c_char(), Layout::padding(7), Layout::c_long()]);
        assert_eq!(s.byte_size(), 16);
        assert_eq!(s.alignment(), 8);
        assert!(Layout::padding(7).is_padding());
        assert_eq!(Layout::padding(7).alignment(), 1);
    }

    #[test]
    fn test_sequence_size() {
        let a = Layout::sequence(3, Layout::c_double());
        assert_eq!(a.byte_size(), 24);
        assert_eq!(a.alignment(), 8);
    }

    #[test]
    fn test_c_scalars() {
        assert_eq!(Layout::c_pointer().byte_size(), 8);
        assert_eq!(Layout::c_long_double().byte_size(), 16);
        assert_eq!(Layout::c_int128().alignment(), 16);
        assert_eq!(Layout::c_complex_long_double().byte_size(), 32);
    }
}
