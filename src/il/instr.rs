//! Instruction set.
//!
//! In memory an instruction is the [`Instr`] enum. On disk every
//! instruction is the same fixed-shape [`RawInstr`] record: an opcode, two
//! narrow flag bytes and one 64-bit payload whose meaning is fixed by the
//! opcode.

use std::fmt;

use super::error::IlError;
use super::refs::{FunctionRefId, GlobalRef, StringId, TypeRefId};
use super::types::{FloatWidth, NumKind};

/// Index of a block inside its function. Block 0 is the entry block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);
}

/// Operand-stack conventions:
/// - binary operators pop `b` then `a` and push `a op b`;
/// - array indices and lengths are `i32`, pointer offsets are `i64`;
/// - `Store*`/`*Element` pop the value first, then the index, then the
///   container or address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr {
    // Constants
    PushInt { kind: NumKind, value: u64 },
    PushFloat { width: FloatWidth, bits: u64 },
    PushBool(bool),
    PushChar(char),
    /// Null pointer / reference descriptor.
    PushNull,
    /// Zero value of any type.
    PushDefault(TypeRefId),
    /// Interned string literal as a slice.
    PushString(StringId),

    // Stack
    Pop(TypeRefId),
    Dup(TypeRefId),

    // Variables
    LoadLocal(u32),
    StoreLocal(u32),
    LocalAddr(u32),
    LoadArg(u32),
    StoreArg(u32),
    ArgAddr(u32),
    LoadGlobal(GlobalRef),
    StoreGlobal(GlobalRef),
    GlobalAddr(GlobalRef),

    // Memory, addressed by pointer/reference
    Load(TypeRefId),
    Store(TypeRefId),
    FieldPtr { ty: TypeRefId, field: u16 },
    LoadField { ty: TypeRefId, field: u16 },
    StoreField { ty: TypeRefId, field: u16 },
    /// Operand is the container type: static array, vector, dynamic array
    /// or string.
    ElementPtr(TypeRefId),
    LoadElement(TypeRefId),
    StoreElement(TypeRefId),
    ArrayLength(TypeRefId),
    SliceRange(TypeRefId),
    /// Operand is the pointee type.
    PtrOffset(TypeRefId),
    IsNull,

    // Heap
    New(TypeRefId),
    /// Operand is the element type.
    NewArray(TypeRefId),

    // Arithmetic and logic
    Add(NumKind),
    Sub(NumKind),
    Mul(NumKind),
    Div(NumKind),
    Rem(NumKind),
    Neg(NumKind),
    And(NumKind),
    Or(NumKind),
    Xor(NumKind),
    Shl(NumKind),
    Shr(NumKind),
    BitNot(NumKind),
    Not,

    // Comparison
    Eq(NumKind),
    Ne(NumKind),
    Lt(NumKind),
    Le(NumKind),
    Gt(NumKind),
    Ge(NumKind),

    Convert { from: NumKind, to: NumKind },

    // Control
    Jump(BlockId),
    JumpIfFalse(BlockId),
    Call(FunctionRefId),
    Return,

    Print(TypeRefId),
}

impl Instr {
    pub fn push_i32(value: i32) -> Instr {
        Instr::PushInt {
            kind: NumKind::I32,
            value: value as i64 as u64,
        }
    }

    pub fn push_i64(value: i64) -> Instr {
        Instr::PushInt {
            kind: NumKind::I64,
            value: value as u64,
        }
    }

    pub fn push_f32(value: f32) -> Instr {
        Instr::PushFloat {
            width: FloatWidth::F32,
            bits: value.to_bits() as u64,
        }
    }

    pub fn push_f64(value: f64) -> Instr {
        Instr::PushFloat {
            width: FloatWidth::F64,
            bits: value.to_bits(),
        }
    }

    /// Whether this instruction ends a block.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Instr::Jump(_) | Instr::Return)
    }

    /// Jump target, if this instruction branches.
    pub fn target(&self) -> Option<BlockId> {
        match self {
            Instr::Jump(b) | Instr::JumpIfFalse(b) => Some(*b),
            _ => None,
        }
    }

    pub(crate) fn target_mut(&mut self) -> Option<&mut BlockId> {
        match self {
            Instr::Jump(b) | Instr::JumpIfFalse(b) => Some(b),
            _ => None,
        }
    }

    /// Type reference operand, if any.
    pub fn type_ref(&self) -> Option<TypeRefId> {
        match self {
            Instr::PushDefault(t)
            | Instr::Pop(t)
            | Instr::Dup(t)
            | Instr::Load(t)
            | Instr::Store(t)
            | Instr::ElementPtr(t)
            | Instr::LoadElement(t)
            | Instr::StoreElement(t)
            | Instr::ArrayLength(t)
            | Instr::SliceRange(t)
            | Instr::PtrOffset(t)
            | Instr::New(t)
            | Instr::NewArray(t)
            | Instr::Print(t) => Some(*t),
            Instr::FieldPtr { ty, .. }
            | Instr::LoadField { ty, .. }
            | Instr::StoreField { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instr::PushInt { .. } => "push.int",
            Instr::PushFloat { .. } => "push.float",
            Instr::PushBool(_) => "push.bool",
            Instr::PushChar(_) => "push.char",
            Instr::PushNull => "push.null",
            Instr::PushDefault(_) => "push.default",
            Instr::PushString(_) => "push.str",
            Instr::Pop(_) => "pop",
            Instr::Dup(_) => "dup",
            Instr::LoadLocal(_) => "ld.loc",
            Instr::StoreLocal(_) => "st.loc",
            Instr::LocalAddr(_) => "addr.loc",
            Instr::LoadArg(_) => "ld.arg",
            Instr::StoreArg(_) => "st.arg",
            Instr::ArgAddr(_) => "addr.arg",
            Instr::LoadGlobal(_) => "ld.glob",
            Instr::StoreGlobal(_) => "st.glob",
            Instr::GlobalAddr(_) => "addr.glob",
            Instr::Load(_) => "ld",
            Instr::Store(_) => "st",
            Instr::FieldPtr { .. } => "addr.fld",
            Instr::LoadField { .. } => "ld.fld",
            Instr::StoreField { .. } => "st.fld",
            Instr::ElementPtr(_) => "addr.elem",
            Instr::LoadElement(_) => "ld.elem",
            Instr::StoreElement(_) => "st.elem",
            Instr::ArrayLength(_) => "len",
            Instr::SliceRange(_) => "slice",
            Instr::PtrOffset(_) => "ptr.add",
            Instr::IsNull => "isnull",
            Instr::New(_) => "new",
            Instr::NewArray(_) => "newarr",
            Instr::Add(_) => "add",
            Instr::Sub(_) => "sub",
            Instr::Mul(_) => "mul",
            Instr::Div(_) => "div",
            Instr::Rem(_) => "rem",
            Instr::Neg(_) => "neg",
            Instr::And(_) => "and",
            Instr::Or(_) => "or",
            Instr::Xor(_) => "xor",
            Instr::Shl(_) => "shl",
            Instr::Shr(_) => "shr",
            Instr::BitNot(_) => "bitnot",
            Instr::Not => "not",
            Instr::Eq(_) => "eq",
            Instr::Ne(_) => "ne",
            Instr::Lt(_) => "lt",
            Instr::Le(_) => "le",
            Instr::Gt(_) => "gt",
            Instr::Ge(_) => "ge",
            Instr::Convert { .. } => "conv",
            Instr::Jump(_) => "jmp",
            Instr::JumpIfFalse(_) => "jmp.false",
            Instr::Call(_) => "call",
            Instr::Return => "ret",
            Instr::Print(_) => "print",
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.mnemonic();
        match self {
            Instr::PushInt { kind, value } => match kind {
                NumKind::Int { signed: true, width } => {
                    let shift = 64 - width.bits();
                    write!(f, "{} {} {}", m, kind, ((*value << shift) as i64) >> shift)
                }
                _ => write!(f, "{} {} {}", m, kind, value),
            },
            Instr::PushFloat { width, bits } => match width {
                FloatWidth::F32 => write!(f, "{} f32 {}", m, f32::from_bits(*bits as u32)),
                FloatWidth::F64 => write!(f, "{} f64 {}", m, f64::from_bits(*bits)),
            },
            Instr::PushBool(b) => write!(f, "{} {}", m, b),
            Instr::PushChar(c) => write!(f, "{} {:?}", m, c),
            Instr::PushString(s) => write!(f, "{} str#{}", m, s.0),
            Instr::LoadLocal(i)
            | Instr::StoreLocal(i)
            | Instr::LocalAddr(i)
            | Instr::LoadArg(i)
            | Instr::StoreArg(i)
            | Instr::ArgAddr(i) => write!(f, "{} {}", m, i),
            Instr::LoadGlobal(g) | Instr::StoreGlobal(g) | Instr::GlobalAddr(g) => {
                write!(f, "{} mref#{}:{}", m, g.module_ref, g.index)
            }
            Instr::FieldPtr { ty, field }
            | Instr::LoadField { ty, field }
            | Instr::StoreField { ty, field } => write!(f, "{} tref#{}.{}", m, ty.0, field),
            Instr::Add(k)
            | Instr::Sub(k)
            | Instr::Mul(k)
            | Instr::Div(k)
            | Instr::Rem(k)
            | Instr::Neg(k)
            | Instr::And(k)
            | Instr::Or(k)
            | Instr::Xor(k)
            | Instr::Shl(k)
            | Instr::Shr(k)
            | Instr::BitNot(k)
            | Instr::Eq(k)
            | Instr::Ne(k)
            | Instr::Lt(k)
            | Instr::Le(k)
            | Instr::Gt(k)
            | Instr::Ge(k) => write!(f, "{} {}", m, k),
            Instr::Convert { from, to } => write!(f, "{} {} -> {}", m, from, to),
            Instr::Jump(b) | Instr::JumpIfFalse(b) => write!(f, "{} block{}", m, b.0),
            Instr::Call(r) => write!(f, "{} fref#{}", m, r.0),
            other => match other.type_ref() {
                Some(t) => write!(f, "{} tref#{}", m, t.0),
                None => write!(f, "{}", m),
            },
        }
    }
}

// Opcode tags
const OP_PUSH_INT: u8 = 0x00;
const OP_PUSH_FLOAT: u8 = 0x01;
const OP_PUSH_BOOL: u8 = 0x02;
const OP_PUSH_CHAR: u8 = 0x03;
const OP_PUSH_NULL: u8 = 0x04;
const OP_PUSH_DEFAULT: u8 = 0x05;
const OP_PUSH_STRING: u8 = 0x06;
const OP_POP: u8 = 0x08;
const OP_DUP: u8 = 0x09;
const OP_LOAD_LOCAL: u8 = 0x10;
const OP_STORE_LOCAL: u8 = 0x11;
const OP_LOCAL_ADDR: u8 = 0x12;
const OP_LOAD_ARG: u8 = 0x13;
const OP_STORE_ARG: u8 = 0x14;
const OP_ARG_ADDR: u8 = 0x15;
const OP_LOAD_GLOBAL: u8 = 0x16;
const OP_STORE_GLOBAL: u8 = 0x17;
const OP_GLOBAL_ADDR: u8 = 0x18;
const OP_LOAD: u8 = 0x20;
const OP_STORE: u8 = 0x21;
const OP_FIELD_PTR: u8 = 0x22;
const OP_LOAD_FIELD: u8 = 0x23;
const OP_STORE_FIELD: u8 = 0x24;
const OP_ELEMENT_PTR: u8 = 0x25;
const OP_LOAD_ELEMENT: u8 = 0x26;
const OP_STORE_ELEMENT: u8 = 0x27;
const OP_ARRAY_LENGTH: u8 = 0x28;
const OP_SLICE_RANGE: u8 = 0x29;
const OP_PTR_OFFSET: u8 = 0x2A;
const OP_IS_NULL: u8 = 0x2B;
const OP_NEW: u8 = 0x30;
const OP_NEW_ARRAY: u8 = 0x31;
const OP_ADD: u8 = 0x40;
const OP_SUB: u8 = 0x41;
const OP_MUL: u8 = 0x42;
const OP_DIV: u8 = 0x43;
const OP_REM: u8 = 0x44;
const OP_NEG: u8 = 0x45;
const OP_AND: u8 = 0x46;
const OP_OR: u8 = 0x47;
const OP_XOR: u8 = 0x48;
const OP_SHL: u8 = 0x49;
const OP_SHR: u8 = 0x4A;
const OP_BIT_NOT: u8 = 0x4B;
const OP_NOT: u8 = 0x4C;
const OP_EQ: u8 = 0x50;
const OP_NE: u8 = 0x51;
const OP_LT: u8 = 0x52;
const OP_LE: u8 = 0x53;
const OP_GT: u8 = 0x54;
const OP_GE: u8 = 0x55;
const OP_CONVERT: u8 = 0x58;
const OP_JUMP: u8 = 0x60;
const OP_JUMP_IF_FALSE: u8 = 0x61;
const OP_CALL: u8 = 0x62;
const OP_RETURN: u8 = 0x63;
const OP_PRINT: u8 = 0x70;

/// On-disk instruction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawInstr {
    pub opcode: u8,
    pub flag_a: u8,
    pub flag_b: u8,
    pub payload: u64,
}

impl RawInstr {
    /// Encoded size in bytes.
    pub const SIZE: usize = 11;

    fn op(opcode: u8) -> Self {
        Self {
            opcode,
            ..Self::default()
        }
    }

    fn with_payload(opcode: u8, payload: u64) -> Self {
        Self {
            opcode,
            payload,
            ..Self::default()
        }
    }

    fn with_kind(opcode: u8, kind: NumKind) -> Self {
        Self {
            opcode,
            flag_a: kind.encode(),
            ..Self::default()
        }
    }

    fn with_field(opcode: u8, ty: TypeRefId, field: u16) -> Self {
        let [lo, hi] = field.to_le_bytes();
        Self {
            opcode,
            flag_a: lo,
            flag_b: hi,
            payload: ty.0 as u64,
        }
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = self.opcode;
        out[1] = self.flag_a;
        out[2] = self.flag_b;
        out[3..].copy_from_slice(&self.payload.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut payload = [0u8; 8];
        payload.copy_from_slice(&bytes[3..]);
        Self {
            opcode: bytes[0],
            flag_a: bytes[1],
            flag_b: bytes[2],
            payload: u64::from_le_bytes(payload),
        }
    }

    fn kind_a(&self) -> Result<NumKind, IlError> {
        NumKind::decode(self.flag_a).ok_or(IlError::InvalidInstruction {
            opcode: self.opcode,
        })
    }

    fn kind_b(&self) -> Result<NumKind, IlError> {
        NumKind::decode(self.flag_b).ok_or(IlError::InvalidInstruction {
            opcode: self.opcode,
        })
    }

    fn type_ref(&self) -> TypeRefId {
        TypeRefId(self.payload as u32)
    }

    fn index(&self) -> u32 {
        self.payload as u32
    }

    fn field(&self) -> u16 {
        u16::from_le_bytes([self.flag_a, self.flag_b])
    }
}

impl From<Instr> for RawInstr {
    fn from(instr: Instr) -> Self {
        match instr {
            Instr::PushInt { kind, value } => RawInstr {
                opcode: OP_PUSH_INT,
                flag_a: kind.encode(),
                flag_b: 0,
                payload: value,
            },
            Instr::PushFloat { width, bits } => RawInstr {
                opcode: OP_PUSH_FLOAT,
                flag_a: NumKind::Float(width).encode(),
                flag_b: 0,
                payload: bits,
            },
            Instr::PushBool(b) => RawInstr::with_payload(OP_PUSH_BOOL, b as u64),
            Instr::PushChar(c) => RawInstr::with_payload(OP_PUSH_CHAR, c as u64),
            Instr::PushNull => RawInstr::op(OP_PUSH_NULL),
            Instr::PushDefault(t) => RawInstr::with_payload(OP_PUSH_DEFAULT, t.0 as u64),
            Instr::PushString(s) => RawInstr::with_payload(OP_PUSH_STRING, s.0 as u64),
            Instr::Pop(t) => RawInstr::with_payload(OP_POP, t.0 as u64),
            Instr::Dup(t) => RawInstr::with_payload(OP_DUP, t.0 as u64),
            Instr::LoadLocal(i) => RawInstr::with_payload(OP_LOAD_LOCAL, i as u64),
            Instr::StoreLocal(i) => RawInstr::with_payload(OP_STORE_LOCAL, i as u64),
            Instr::LocalAddr(i) => RawInstr::with_payload(OP_LOCAL_ADDR, i as u64),
            Instr::LoadArg(i) => RawInstr::with_payload(OP_LOAD_ARG, i as u64),
            Instr::StoreArg(i) => RawInstr::with_payload(OP_STORE_ARG, i as u64),
            Instr::ArgAddr(i) => RawInstr::with_payload(OP_ARG_ADDR, i as u64),
            Instr::LoadGlobal(g) => RawInstr::with_payload(OP_LOAD_GLOBAL, g.pack()),
            Instr::StoreGlobal(g) => RawInstr::with_payload(OP_STORE_GLOBAL, g.pack()),
            Instr::GlobalAddr(g) => RawInstr::with_payload(OP_GLOBAL_ADDR, g.pack()),
            Instr::Load(t) => RawInstr::with_payload(OP_LOAD, t.0 as u64),
            Instr::Store(t) => RawInstr::with_payload(OP_STORE, t.0 as u64),
            Instr::FieldPtr { ty, field } => RawInstr::with_field(OP_FIELD_PTR, ty, field),
            Instr::LoadField { ty, field } => RawInstr::with_field(OP_LOAD_FIELD, ty, field),
            Instr::StoreField { ty, field } => RawInstr::with_field(OP_STORE_FIELD, ty, field),
            Instr::ElementPtr(t) => RawInstr::with_payload(OP_ELEMENT_PTR, t.0 as u64),
            Instr::LoadElement(t) => RawInstr::with_payload(OP_LOAD_ELEMENT, t.0 as u64),
            Instr::StoreElement(t) => RawInstr::with_payload(OP_STORE_ELEMENT, t.0 as u64),
            Instr::ArrayLength(t) => RawInstr::with_payload(OP_ARRAY_LENGTH, t.0 as u64),
            Instr::SliceRange(t) => RawInstr::with_payload(OP_SLICE_RANGE, t.0 as u64),
            Instr::PtrOffset(t) => RawInstr::with_payload(OP_PTR_OFFSET, t.0 as u64),
            Instr::IsNull => RawInstr::op(OP_IS_NULL),
            Instr::New(t) => RawInstr::with_payload(OP_NEW, t.0 as u64),
            Instr::NewArray(t) => RawInstr::with_payload(OP_NEW_ARRAY, t.0 as u64),
            Instr::Add(k) => RawInstr::with_kind(OP_ADD, k),
            Instr::Sub(k) => RawInstr::with_kind(OP_SUB, k),
            Instr::Mul(k) => RawInstr::with_kind(OP_MUL, k),
            Instr::Div(k) => RawInstr::with_kind(OP_DIV, k),
            Instr::Rem(k) => RawInstr::with_kind(OP_REM, k),
            Instr::Neg(k) => RawInstr::with_kind(OP_NEG, k),
            Instr::And(k) => RawInstr::with_kind(OP_AND, k),
            Instr::Or(k) => RawInstr::with_kind(OP_OR, k),
            Instr::Xor(k) => RawInstr::with_kind(OP_XOR, k),
            Instr::Shl(k) => RawInstr::with_kind(OP_SHL, k),
            Instr::Shr(k) => RawInstr::with_kind(OP_SHR, k),
            Instr::BitNot(k) => RawInstr::with_kind(OP_BIT_NOT, k),
            Instr::Not => RawInstr::op(OP_NOT),
            Instr::Eq(k) => RawInstr::with_kind(OP_EQ, k),
            Instr::Ne(k) => RawInstr::with_kind(OP_NE, k),
            Instr::Lt(k) => RawInstr::with_kind(OP_LT, k),
            Instr::Le(k) => RawInstr::with_kind(OP_LE, k),
            Instr::Gt(k) => RawInstr::with_kind(OP_GT, k),
            Instr::Ge(k) => RawInstr::with_kind(OP_GE, k),
            Instr::Convert { from, to } => RawInstr {
                opcode: OP_CONVERT,
                flag_a: from.encode(),
                flag_b: to.encode(),
                payload: 0,
            },
            Instr::Jump(b) => RawInstr::with_payload(OP_JUMP, b.0 as u64),
            Instr::JumpIfFalse(b) => RawInstr::with_payload(OP_JUMP_IF_FALSE, b.0 as u64),
            Instr::Call(r) => RawInstr::with_payload(OP_CALL, r.0 as u64),
            Instr::Return => RawInstr::op(OP_RETURN),
            Instr::Print(t) => RawInstr::with_payload(OP_PRINT, t.0 as u64),
        }
    }
}

impl TryFrom<RawInstr> for Instr {
    type Error = IlError;

    fn try_from(raw: RawInstr) -> Result<Self, Self::Error> {
        let instr = match raw.opcode {
            OP_PUSH_INT => match raw.kind_a()? {
                kind @ NumKind::Int { .. } => Instr::PushInt {
                    kind,
                    value: raw.payload,
                },
                _ => return Err(IlError::InvalidLiteral { opcode: raw.opcode }),
            },
            OP_PUSH_FLOAT => match raw.kind_a()? {
                NumKind::Float(width) => Instr::PushFloat {
                    width,
                    bits: raw.payload,
                },
                _ => return Err(IlError::InvalidLiteral { opcode: raw.opcode }),
            },
            OP_PUSH_BOOL => match raw.payload {
                0 => Instr::PushBool(false),
                1 => Instr::PushBool(true),
                _ => return Err(IlError::InvalidLiteral { opcode: raw.opcode }),
            },
            OP_PUSH_CHAR => u32::try_from(raw.payload)
                .ok()
                .and_then(char::from_u32)
                .map(Instr::PushChar)
                .ok_or(IlError::InvalidLiteral { opcode: raw.opcode })?,
            OP_PUSH_NULL => Instr::PushNull,
            OP_PUSH_DEFAULT => Instr::PushDefault(raw.type_ref()),
            OP_PUSH_STRING => Instr::PushString(StringId(raw.index())),
            OP_POP => Instr::Pop(raw.type_ref()),
            OP_DUP => Instr::Dup(raw.type_ref()),
            OP_LOAD_LOCAL => Instr::LoadLocal(raw.index()),
            OP_STORE_LOCAL => Instr::StoreLocal(raw.index()),
            OP_LOCAL_ADDR => Instr::LocalAddr(raw.index()),
            OP_LOAD_ARG => Instr::LoadArg(raw.index()),
            OP_STORE_ARG => Instr::StoreArg(raw.index()),
            OP_ARG_ADDR => Instr::ArgAddr(raw.index()),
            OP_LOAD_GLOBAL => Instr::LoadGlobal(GlobalRef::unpack(raw.payload)),
            OP_STORE_GLOBAL => Instr::StoreGlobal(GlobalRef::unpack(raw.payload)),
            OP_GLOBAL_ADDR => Instr::GlobalAddr(GlobalRef::unpack(raw.payload)),
            OP_LOAD => Instr::Load(raw.type_ref()),
            OP_STORE => Instr::Store(raw.type_ref()),
            OP_FIELD_PTR => Instr::FieldPtr {
                ty: raw.type_ref(),
                field: raw.field(),
            },
            OP_LOAD_FIELD => Instr::LoadField {
                ty: raw.type_ref(),
                field: raw.field(),
            },
            OP_STORE_FIELD => Instr::StoreField {
                ty: raw.type_ref(),
                field: raw.field(),
            },
            OP_ELEMENT_PTR => Instr::ElementPtr(raw.type_ref()),
            OP_LOAD_ELEMENT => Instr::LoadElement(raw.type_ref()),
            OP_STORE_ELEMENT => Instr::StoreElement(raw.type_ref()),
            OP_ARRAY_LENGTH => Instr::ArrayLength(raw.type_ref()),
            OP_SLICE_RANGE => Instr::SliceRange(raw.type_ref()),
            OP_PTR_OFFSET => Instr::PtrOffset(raw.type_ref()),
            OP_IS_NULL => Instr::IsNull,
            OP_NEW => Instr::New(raw.type_ref()),
            OP_NEW_ARRAY => Instr::NewArray(raw.type_ref()),
            OP_ADD => Instr::Add(raw.kind_a()?),
            OP_SUB => Instr::Sub(raw.kind_a()?),
            OP_MUL => Instr::Mul(raw.kind_a()?),
            OP_DIV => Instr::Div(raw.kind_a()?),
            OP_REM => Instr::Rem(raw.kind_a()?),
            OP_NEG => Instr::Neg(raw.kind_a()?),
            OP_AND => Instr::And(raw.kind_a()?),
            OP_OR => Instr::Or(raw.kind_a()?),
            OP_XOR => Instr::Xor(raw.kind_a()?),
            OP_SHL => Instr::Shl(raw.kind_a()?),
            OP_SHR => Instr::Shr(raw.kind_a()?),
            OP_BIT_NOT => Instr::BitNot(raw.kind_a()?),
            OP_NOT => Instr::Not,
            OP_EQ => Instr::Eq(raw.kind_a()?),
            OP_NE => Instr::Ne(raw.kind_a()?),
            OP_LT => Instr::Lt(raw.kind_a()?),
            OP_LE => Instr::Le(raw.kind_a()?),
            OP_GT => Instr::Gt(raw.kind_a()?),
            OP_GE => Instr::Ge(raw.kind_a()?),
            OP_CONVERT => Instr::Convert {
                from: raw.kind_a()?,
                to: raw.kind_b()?,
            },
            OP_JUMP => Instr::Jump(BlockId(raw.index())),
            OP_JUMP_IF_FALSE => Instr::JumpIfFalse(BlockId(raw.index())),
            OP_CALL => Instr::Call(FunctionRefId(raw.index())),
            OP_RETURN => Instr::Return,
            OP_PRINT => Instr::Print(raw.type_ref()),
            opcode => return Err(IlError::InvalidInstruction { opcode }),
        };
        Ok(instr)
    }
}
