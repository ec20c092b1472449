//! Native type descriptors
//!
//! Every type that crosses the bridge is described by a [`TypeInfo`]: its size,
//! a packed [`TypeTag`] and the name the native side knows it by. Descriptors
//! are computed in `const` context from [`TypeDescriptor`] associated
//! constants, so fetching one at runtime is a plain load.
//!
//! # TypeTag layout
//!
//! ```text
//! 31        24 23   20 19   16 15   12 11    8 7     4 3     0
//! ┌───────────┬───────┬───────┬───────┬───────┬───────┬───────┐
//! │ base kind │  q5   │  q4   │  q3   │  q2   │  q1   │  q0   │
//! └───────────┴───────┴───────┴───────┴───────┴───────┴───────┘
//! ```
//!
//! `q0` is always [`Qualifier::Value`]. Each qualifier applied to a type lands
//! in the first empty field, so the chain reads inner-to-outer and never has
//! holes: `const T*` is `[Value, Const, Pointer]`.

use std::ffi::{c_char, c_long, c_ulong};
use std::fmt;

/// Maximum number of qualifier fields in a [`TypeTag`]
pub const MAX_QUALIFIERS: usize = 6;

/// Base kind of a native type (top 8 bits of a [`TypeTag`])
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseKind {
    Void = 0,
    Char = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    Long = 6,
    UInt8 = 7,
    UInt16 = 8,
    UInt32 = 9,
    UInt64 = 10,
    ULong = 11,
    WChar = 12,
    Bool = 13,
    Float = 14,
    Double = 15,
    /// Null-terminated byte string
    CString = 16,
    /// Null-terminated wide string
    WString = 17,
    Enum = 18,
    /// Opaque class or struct (catch-all)
    Class = 19,
}

impl BaseKind {
    /// Decode an ordinal; anything unknown is an opaque class
    pub const fn from_ordinal(ordinal: u8) -> Self {
        match ordinal {
            0 => BaseKind::Void,
            1 => BaseKind::Char,
            2 => BaseKind::Int8,
            3 => BaseKind::Int16,
            4 => BaseKind::Int32,
            5 => BaseKind::Int64,
            6 => BaseKind::Long,
            7 => BaseKind::UInt8,
            8 => BaseKind::UInt16,
            9 => BaseKind::UInt32,
            10 => BaseKind::UInt64,
            11 => BaseKind::ULong,
            12 => BaseKind::WChar,
            13 => BaseKind::Bool,
            14 => BaseKind::Float,
            15 => BaseKind::Double,
            16 => BaseKind::CString,
            17 => BaseKind::WString,
            18 => BaseKind::Enum,
            _ => BaseKind::Class,
        }
    }

    /// Fixed built-in kinds (everything except enums and classes)
    pub const fn is_builtin(self) -> bool {
        !matches!(self, BaseKind::Enum | BaseKind::Class)
    }
}

/// One field of a qualifier chain
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qualifier {
    None = 0,
    Value = 1,
    Const = 2,
    Pointer = 3,
    /// `T* const`
    ConstPointer = 4,
    Reference = 5,
}

impl Qualifier {
    const fn from_bits(bits: u32) -> Self {
        match bits {
            1 => Qualifier::Value,
            2 => Qualifier::Const,
            3 => Qualifier::Pointer,
            4 => Qualifier::ConstPointer,
            5 => Qualifier::Reference,
            _ => Qualifier::None,
        }
    }
}

/// Packed base kind + qualifier chain
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(u32);

impl TypeTag {
    /// Plain value of the given kind
    pub const fn new(kind: BaseKind) -> Self {
        TypeTag(((kind as u32) << 24) | Qualifier::Value as u32)
    }

    /// Reinterpret raw bits
    pub const fn from_bits(bits: u32) -> Self {
        TypeTag(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Base kind
    pub const fn kind(self) -> BaseKind {
        BaseKind::from_ordinal((self.0 >> 24) as u8)
    }

    /// Qualifier stored in field `index`
    pub const fn qualifier(self, index: usize) -> Qualifier {
        if index >= MAX_QUALIFIERS {
            return Qualifier::None;
        }
        Qualifier::from_bits((self.0 >> (4 * index)) & 0xf)
    }

    /// Number of populated qualifier fields
    pub const fn depth(self) -> usize {
        let mut depth = 0;
        while depth < MAX_QUALIFIERS && !matches!(self.qualifier(depth), Qualifier::None) {
            depth += 1;
        }
        depth
    }

    /// Apply a qualifier on the outside of this type.
    ///
    /// The qualifier lands in the first empty field; once all six fields are
    /// used further qualifiers are dropped.
    pub const fn push(self, qualifier: Qualifier) -> Self {
        let depth = self.depth();
        if depth >= MAX_QUALIFIERS || matches!(qualifier, Qualifier::None) {
            return self;
        }
        TypeTag(self.0 | ((qualifier as u32) << (4 * depth)))
    }

    /// Outermost qualifier
    pub const fn outermost(self) -> Qualifier {
        let depth = self.depth();
        if depth == 0 {
            Qualifier::None
        } else {
            self.qualifier(depth - 1)
        }
    }

    /// Argument slot holds a pointer to the value
    pub const fn is_reference(self) -> bool {
        matches!(self.outermost(), Qualifier::Reference)
    }

    /// Any pointer or reference in the chain
    pub const fn is_indirect(self) -> bool {
        let mut i = 0;
        while i < MAX_QUALIFIERS {
            if matches!(
                self.qualifier(i),
                Qualifier::Pointer | Qualifier::ConstPointer | Qualifier::Reference
            ) {
                return true;
            }
            i += 1;
        }
        false
    }

    /// Iterate the populated qualifier chain, innermost first
    pub fn qualifiers(self) -> impl Iterator<Item = Qualifier> {
        (0..self.depth()).map(move |i| self.qualifier(i))
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind())?;
        f.debug_list().entries(self.qualifiers()).finish()
    }
}

/// `{size, tag, abi-name}` triple for one native type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    /// Size in bytes (0 for void)
    pub size: u32,
    /// Packed kind and qualifiers
    pub tag: TypeTag,
    /// Name the native side uses for the type
    pub name: &'static str,
}

/// Ordered parameter descriptors followed by the return descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeInfoArray {
    infos: Vec<TypeInfo>,
}

impl TypeInfoArray {
    /// Build from parameter descriptors and a return descriptor
    pub fn new(params: Vec<TypeInfo>, ret: TypeInfo) -> Self {
        let mut infos = params;
        infos.push(ret);
        Self { infos }
    }

    /// Parameter descriptors
    pub fn params(&self) -> &[TypeInfo] {
        &self.infos[..self.infos.len() - 1]
    }

    /// Return descriptor
    pub fn ret(&self) -> &TypeInfo {
        &self.infos[self.infos.len() - 1]
    }

    /// Number of parameters
    pub fn param_count(&self) -> usize {
        self.infos.len() - 1
    }

    /// Total size of all parameters
    pub fn param_size(&self) -> u32 {
        self.params().iter().map(|info| info.size).sum()
    }

    /// All descriptors, return last
    pub fn as_slice(&self) -> &[TypeInfo] {
        &self.infos
    }

    /// Qualified signature key, e.g. `speak(i32,f64)->bool`
    pub fn signature(&self, name: &str) -> String {
        let params: Vec<&str> = self.params().iter().map(|info| info.name).collect();
        format!("{}({})->{}", name, params.join(","), self.ret().name)
    }
}

/// Compile-time description of a native type
pub trait TypeDescriptor {
    /// Packed kind and qualifiers
    const TAG: TypeTag;

    /// Size in bytes
    const SIZE: u32;

    /// `const T&` of this type is passed as a plain value
    const CONST_REF_BY_VALUE: bool = false;

    /// Name the native side knows the type by
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Full descriptor
    fn type_info() -> TypeInfo {
        TypeInfo {
            size: Self::SIZE,
            tag: Self::TAG,
            name: Self::type_name(),
        }
    }
}

/// Platform `long`
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CLong(pub c_long);

/// Platform `unsigned long`
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CULong(pub c_ulong);

/// Null-terminated byte string argument
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CStrArg(pub *const c_char);

/// Platform wide character
#[cfg(windows)]
pub type WChar = u16;
/// Platform wide character
#[cfg(not(windows))]
pub type WChar = u32;

/// Null-terminated wide string argument
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WStrArg(pub *const WChar);

impl Default for CStrArg {
    fn default() -> Self {
        CStrArg(std::ptr::null())
    }
}

impl Default for WStrArg {
    fn default() -> Self {
        WStrArg(std::ptr::null())
    }
}

macro_rules! builtin_descriptor {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl TypeDescriptor for $ty {
                const TAG: TypeTag = TypeTag::new(BaseKind::$kind);
                const SIZE: u32 = std::mem::size_of::<$ty>() as u32;
                const CONST_REF_BY_VALUE: bool = true;
            }
        )+
    };
}

builtin_descriptor! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    CLong => Long,
    CULong => ULong,
    char => WChar,
    bool => Bool,
    f32 => Float,
    f64 => Double,
}

impl TypeDescriptor for () {
    const TAG: TypeTag = TypeTag::new(BaseKind::Void);
    const SIZE: u32 = 0;

    fn type_name() -> &'static str {
        "void"
    }
}

impl TypeDescriptor for CStrArg {
    const TAG: TypeTag = TypeTag::new(BaseKind::CString);
    const SIZE: u32 = std::mem::size_of::<CStrArg>() as u32;
}

impl TypeDescriptor for WStrArg {
    const TAG: TypeTag = TypeTag::new(BaseKind::WString);
    const SIZE: u32 = std::mem::size_of::<WStrArg>() as u32;
}

impl<T: TypeDescriptor> TypeDescriptor for *mut T {
    const TAG: TypeTag = T::TAG.push(Qualifier::Pointer);
    const SIZE: u32 = std::mem::size_of::<*mut T>() as u32;
}

impl<T: TypeDescriptor> TypeDescriptor for *const T {
    const TAG: TypeTag = T::TAG.push(Qualifier::Const).push(Qualifier::Pointer);
    const SIZE: u32 = std::mem::size_of::<*const T>() as u32;
}

/// Declare native classes to the type encoder.
///
/// Only the descriptor is generated; use [`native_value!`](crate::native_value)
/// as well for classes passed or returned by value.
#[macro_export]
macro_rules! native_class {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::TypeDescriptor for $ty {
                const TAG: $crate::TypeTag = $crate::TypeTag::new($crate::BaseKind::Class);
                const SIZE: u32 = ::std::mem::size_of::<$ty>() as u32;
            }
        )+
    };
}

/// Declare native enums to the type encoder, with by-value marshaling.
#[macro_export]
macro_rules! native_enum {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::TypeDescriptor for $ty {
                const TAG: $crate::TypeTag = $crate::TypeTag::new($crate::BaseKind::Enum);
                const SIZE: u32 = ::std::mem::size_of::<$ty>() as u32;
            }
            $crate::native_value!($ty);
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Widget {
        _id: u32,
    }
    crate::native_class!(Widget);

    #[derive(Clone, Copy, PartialEq, Debug)]
    #[repr(u8)]
    enum Color {
        _Red,
    }
    crate::native_enum!(Color);

    #[test]
    fn test_plain_value_tag() {
        let tag = <i32 as TypeDescriptor>::TAG;
        assert_eq!(tag.kind(), BaseKind::Int32);
        assert_eq!(tag.depth(), 1);
        assert_eq!(tag.qualifier(0), Qualifier::Value);
        assert_eq!(tag.bits(), (4 << 24) | 1);
    }

    #[test]
    fn test_pointer_to_const_chain() {
        let tag = <*const Widget as TypeDescriptor>::TAG;
        let chain: Vec<_> = tag.qualifiers().collect();
        assert_eq!(chain, vec![Qualifier::Value, Qualifier::Const, Qualifier::Pointer]);
        assert_eq!(tag.kind(), BaseKind::Class);
    }

    #[test]
    fn test_qualifiers_are_prefix_consistent() {
        let inner = <*mut Widget as TypeDescriptor>::TAG;
        let outer = <*mut *mut Widget as TypeDescriptor>::TAG;
        for i in 0..inner.depth() {
            assert_eq!(inner.qualifier(i), outer.qualifier(i));
        }
        assert_eq!(outer.outermost(), Qualifier::Pointer);
        assert_eq!(outer.depth(), inner.depth() + 1);
    }

    #[test]
    fn test_chain_saturates_at_six() {
        let mut tag = TypeTag::new(BaseKind::Int8);
        for _ in 0..10 {
            tag = tag.push(Qualifier::Pointer);
        }
        assert_eq!(tag.depth(), MAX_QUALIFIERS);
        assert_eq!(tag.kind(), BaseKind::Int8);
    }

    #[test]
    fn test_enum_is_distinct_from_class() {
        assert_eq!(<Color as TypeDescriptor>::TAG.kind(), BaseKind::Enum);
        assert_eq!(<Widget as TypeDescriptor>::TAG.kind(), BaseKind::Class);
        assert_ne!(<Color as TypeDescriptor>::TAG, <Widget as TypeDescriptor>::TAG);
    }

    #[test]
    fn test_string_kinds() {
        assert_eq!(<CStrArg as TypeDescriptor>::TAG.kind(), BaseKind::CString);
        assert_eq!(<WStrArg as TypeDescriptor>::TAG.kind(), BaseKind::WString);
        assert_eq!(<() as TypeDescriptor>::SIZE, 0);
        assert_eq!(<() as TypeDescriptor>::TAG.kind(), BaseKind::Void);
    }

    #[test]
    fn test_unknown_ordinal_is_class() {
        assert_eq!(BaseKind::from_ordinal(200), BaseKind::Class);
        assert!(BaseKind::Double.is_builtin());
        assert!(!BaseKind::Enum.is_builtin());
    }

    #[test]
    fn test_type_info_array_layout() {
        let array = TypeInfoArray::new(
            vec![i32::type_info(), f64::type_info()],
            bool::type_info(),
        );
        assert_eq!(array.param_count(), 2);
        assert_eq!(array.param_size(), 12);
        assert_eq!(array.ret().tag.kind(), BaseKind::Bool);
        assert_eq!(array.signature("speak"), "speak(i32,f64)->bool");
    }
}
