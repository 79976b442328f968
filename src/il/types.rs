//! Type definitions for the IL type model.
//!
//! Types form a closed sum. Primitive and wrapper types compare
//! structurally; declared structs are identified by their [`DeclId`].

use std::fmt;

/// Identifies a module inside a [`Context`](super::Context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

/// A declared type: its owning module and its id in that module's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId {
    pub module: ModuleId,
    pub index: u32,
}

/// Size in bytes of a pointer or reference descriptor (handle + offset).
pub const POINTER_SIZE: u32 = 8;

/// Size in bytes of a slice descriptor (handle + offset + length).
pub const SLICE_SIZE: u32 = 12;

/// Size in bytes of the length prefix in front of array storage.
pub const ARRAY_HEADER_SIZE: u32 = 4;

/// Size in bytes of an array index or length on the operand stack.
pub const INDEX_SIZE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bytes(self) -> u32 {
        match self {
            IntWidth::W8 => 1,
            IntWidth::W16 => 2,
            IntWidth::W32 => 4,
            IntWidth::W64 => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() * 8
    }

    pub fn from_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            1 => Some(IntWidth::W8),
            2 => Some(IntWidth::W16),
            4 => Some(IntWidth::W32),
            8 => Some(IntWidth::W64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatWidth {
    F32,
    F64,
}

impl FloatWidth {
    pub fn bytes(self) -> u32 {
        match self {
            FloatWidth::F32 => 4,
            FloatWidth::F64 => 8,
        }
    }

    pub fn from_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            4 => Some(FloatWidth::F32),
            8 => Some(FloatWidth::F64),
            _ => None,
        }
    }
}

/// Core type representation of the IL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Integer { width: IntWidth, signed: bool },
    Float(FloatWidth),
    Boolean,
    /// A Unicode scalar value, 4 bytes.
    Char,
    /// Stored as a dynamic array of `Char`.
    String,
    /// A declared struct; layout lives in the owning module's registry.
    Struct(DeclId),
    StaticArray { element: Box<Type>, count: u32 },
    DynamicArray(Box<Type>),
    Pointer(Box<Type>),
    Reference(Box<Type>),
    Vector { element: Box<Type>, count: u32 },
}

impl Type {
    pub fn int(width: IntWidth, signed: bool) -> Type {
        Type::Integer { width, signed }
    }

    pub fn i8() -> Type {
        Type::int(IntWidth::W8, true)
    }

    pub fn i16() -> Type {
        Type::int(IntWidth::W16, true)
    }

    pub fn i32() -> Type {
        Type::int(IntWidth::W32, true)
    }

    pub fn i64() -> Type {
        Type::int(IntWidth::W64, true)
    }

    pub fn u8() -> Type {
        Type::int(IntWidth::W8, false)
    }

    pub fn u16() -> Type {
        Type::int(IntWidth::W16, false)
    }

    pub fn u32() -> Type {
        Type::int(IntWidth::W32, false)
    }

    pub fn u64() -> Type {
        Type::int(IntWidth::W64, false)
    }

    pub fn f32() -> Type {
        Type::Float(FloatWidth::F32)
    }

    pub fn f64() -> Type {
        Type::Float(FloatWidth::F64)
    }

    pub fn pointer(inner: Type) -> Type {
        Type::Pointer(Box::new(inner))
    }

    pub fn reference(inner: Type) -> Type {
        Type::Reference(Box::new(inner))
    }

    pub fn array(element: Type, count: u32) -> Type {
        Type::StaticArray {
            element: Box::new(element),
            count,
        }
    }

    pub fn dynamic_array(element: Type) -> Type {
        Type::DynamicArray(Box::new(element))
    }

    pub fn vector(element: Type, count: u32) -> Type {
        Type::Vector {
            element: Box::new(element),
            count,
        }
    }

    /// Whether this type is one of the wrapper variants that a type
    /// reference descriptor peels off around a declared base type.
    pub fn is_wrapper(&self) -> bool {
        matches!(
            self,
            Type::StaticArray { .. }
                | Type::DynamicArray(_)
                | Type::Pointer(_)
                | Type::Reference(_)
                | Type::Vector { .. }
        )
    }

    /// Element type of an indexable type (arrays, strings, vectors).
    pub fn element(&self) -> Option<Type> {
        match self {
            Type::StaticArray { element, .. }
            | Type::DynamicArray(element)
            | Type::Vector { element, .. } => Some((**element).clone()),
            Type::String => Some(Type::Char),
            _ => None,
        }
    }

    /// Whether values of this type are represented by a slice descriptor.
    pub fn is_slice(&self) -> bool {
        matches!(self, Type::DynamicArray(_) | Type::String)
    }

    /// Whether values of this type are represented by an address descriptor.
    pub fn is_address(&self) -> bool {
        matches!(self, Type::Pointer(_) | Type::Reference(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer { width, signed } => {
                write!(f, "{}{}", if *signed { "i" } else { "u" }, width.bits())
            }
            Type::Float(FloatWidth::F32) => write!(f, "f32"),
            Type::Float(FloatWidth::F64) => write!(f, "f64"),
            Type::Boolean => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::String => write!(f, "string"),
            Type::Struct(id) => write!(f, "struct#{}.{}", id.module.0, id.index),
            Type::StaticArray { element, count } => write!(f, "{}[{}]", element, count),
            Type::DynamicArray(element) => write!(f, "{}[]", element),
            Type::Pointer(inner) => write!(f, "{}*", inner),
            Type::Reference(inner) => write!(f, "{}&", inner),
            Type::Vector { element, count } => write!(f, "vec<{}, {}>", element, count),
        }
    }
}

/// Operand kind carried by typed arithmetic, comparison and conversion
/// instructions. Only scalar types have a `NumKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumKind {
    Int { width: IntWidth, signed: bool },
    Float(FloatWidth),
    Bool,
    Char,
}

// Flag byte layout: bits 0-3 width in bytes, bit 4 signed, bits 5-6 class.
const NUM_CLASS_INT: u8 = 0;
const NUM_CLASS_FLOAT: u8 = 1;
const NUM_CLASS_BOOL: u8 = 2;
const NUM_CLASS_CHAR: u8 = 3;
const NUM_SIGNED_BIT: u8 = 1 << 4;
const NUM_CLASS_SHIFT: u8 = 5;

impl NumKind {
    pub const I32: NumKind = NumKind::Int {
        width: IntWidth::W32,
        signed: true,
    };
    pub const I64: NumKind = NumKind::Int {
        width: IntWidth::W64,
        signed: true,
    };
    pub const F64: NumKind = NumKind::Float(FloatWidth::F64);

    pub fn size(self) -> u32 {
        match self {
            NumKind::Int { width, .. } => width.bytes(),
            NumKind::Float(width) => width.bytes(),
            NumKind::Bool => 1,
            NumKind::Char => 4,
        }
    }

    pub fn from_type(ty: &Type) -> Option<NumKind> {
        match ty {
            Type::Integer { width, signed } => Some(NumKind::Int {
                width: *width,
                signed: *signed,
            }),
            Type::Float(width) => Some(NumKind::Float(*width)),
            Type::Boolean => Some(NumKind::Bool),
            Type::Char => Some(NumKind::Char),
            _ => None,
        }
    }

    pub fn to_type(self) -> Type {
        match self {
            NumKind::Int { width, signed } => Type::Integer { width, signed },
            NumKind::Float(width) => Type::Float(width),
            NumKind::Bool => Type::Boolean,
            NumKind::Char => Type::Char,
        }
    }

    /// Pack into the single flag byte used by the raw instruction record.
    pub fn encode(self) -> u8 {
        let (class, width, signed) = match self {
            NumKind::Int { width, signed } => (NUM_CLASS_INT, width.bytes() as u8, signed),
            NumKind::Float(width) => (NUM_CLASS_FLOAT, width.bytes() as u8, true),
            NumKind::Bool => (NUM_CLASS_BOOL, 1, false),
            NumKind::Char => (NUM_CLASS_CHAR, 4, false),
        };
        let mut byte = (class << NUM_CLASS_SHIFT) | (width & 0x0F);
        if signed {
            byte |= NUM_SIGNED_BIT;
        }
        byte
    }

    pub fn decode(byte: u8) -> Option<NumKind> {
        let width = (byte & 0x0F) as u32;
        let signed = byte & NUM_SIGNED_BIT != 0;
        match byte >> NUM_CLASS_SHIFT {
            NUM_CLASS_INT => Some(NumKind::Int {
                width: IntWidth::from_bytes(width)?,
                signed,
            }),
            NUM_CLASS_FLOAT => Some(NumKind::Float(FloatWidth::from_bytes(width)?)),
            NUM_CLASS_BOOL => Some(NumKind::Bool),
            NUM_CLASS_CHAR => Some(NumKind::Char),
            _ => None,
        }
    }
}

impl fmt::Display for NumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapper_chains_compare_structurally() {
        let a = Type::pointer(Type::dynamic_array(Type::i32()));
        let b = Type::pointer(Type::dynamic_array(Type::i32()));
        let c = Type::pointer(Type::dynamic_array(Type::i64()));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_struct_identity_is_by_decl_id() {
        let p = DeclId {
            module: ModuleId(0),
            index: 3,
        };
        let q = DeclId {
            module: ModuleId(1),
            index: 3,
        };
        assert_ne!(Type::Struct(p), Type::Struct(q));
        assert_eq!(Type::Struct(p), Type::Struct(p));
    }

    #[test]
    fn test_num_kind_flag_byte() {
        let kinds = [
            NumKind::I32,
            NumKind::Int {
                width: IntWidth::W8,
                signed: false,
            },
            NumKind::Float(FloatWidth::F32),
            NumKind::F64,
            NumKind::Bool,
            NumKind::Char,
        ];
        for kind in kinds {
            assert_eq!(NumKind::decode(kind.encode()), Some(kind));
        }
        assert_eq!(NumKind::decode(0b0000_0011), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::array(Type::u8(), 4).to_string(), "u8[4]");
        assert_eq!(Type::reference(Type::String).to_string(), "string&");
        assert_eq!(Type::pointer(Type::f64()).to_string(), "f64*");
    }
}
