//! Typed arithmetic over raw operand bits.
//!
//! Operands arrive as the little-endian bytes of their kind zero-extended to
//! a `u64`; results are returned the same way and truncated to the kind's
//! width by the caller when pushed.

use super::error::VmError;
use crate::il::types::{FloatWidth, IntWidth, NumKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinOp {
    fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Rem => "rem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn mismatch(op: &'static str, kind: NumKind) -> VmError {
    VmError::TypeMismatch {
        op,
        kind: kind.to_string(),
    }
}

fn sign_extend(bits: u64, width: IntWidth) -> i64 {
    let shift = 64 - width.bits();
    ((bits << shift) as i64) >> shift
}

fn truncate(bits: u64, width: IntWidth) -> u64 {
    match width {
        IntWidth::W64 => bits,
        _ => bits & ((1u64 << width.bits()) - 1),
    }
}

fn to_f64(bits: u64, width: FloatWidth) -> f64 {
    match width {
        FloatWidth::F32 => f64::from(f32::from_bits(bits as u32)),
        FloatWidth::F64 => f64::from_bits(bits),
    }
}

fn from_f64(value: f64, width: FloatWidth) -> u64 {
    match width {
        FloatWidth::F32 => u64::from((value as f32).to_bits()),
        FloatWidth::F64 => value.to_bits(),
    }
}

pub fn binary(op: BinOp, kind: NumKind, a: u64, b: u64) -> Result<u64, VmError> {
    match kind {
        NumKind::Int { width, signed } => {
            let shift = (b as u32) & (width.bits() - 1);
            let result = if signed {
                let (x, y) = (sign_extend(a, width), sign_extend(b, width));
                (match op {
                    BinOp::Add => x.wrapping_add(y),
                    BinOp::Sub => x.wrapping_sub(y),
                    BinOp::Mul => x.wrapping_mul(y),
                    BinOp::Div if y == 0 => return Err(VmError::DivisionByZero),
                    BinOp::Div => x.wrapping_div(y),
                    BinOp::Rem if y == 0 => return Err(VmError::DivisionByZero),
                    BinOp::Rem => x.wrapping_rem(y),
                    BinOp::And => x & y,
                    BinOp::Or => x | y,
                    BinOp::Xor => x ^ y,
                    BinOp::Shl => x << shift,
                    BinOp::Shr => x >> shift,
                }) as u64
            } else {
                let (x, y) = (truncate(a, width), truncate(b, width));
                match op {
                    BinOp::Add => x.wrapping_add(y),
                    BinOp::Sub => x.wrapping_sub(y),
                    BinOp::Mul => x.wrapping_mul(y),
                    BinOp::Div if y == 0 => return Err(VmError::DivisionByZero),
                    BinOp::Div => x / y,
                    BinOp::Rem if y == 0 => return Err(VmError::DivisionByZero),
                    BinOp::Rem => x % y,
                    BinOp::And => x & y,
                    BinOp::Or => x | y,
                    BinOp::Xor => x ^ y,
                    BinOp::Shl => x << shift,
                    BinOp::Shr => x >> shift,
                }
            };
            Ok(truncate(result, width))
        }
        NumKind::Float(width) => {
            let (x, y) = (to_f64(a, width), to_f64(b, width));
            let result = match op {
                BinOp::Add => x + y,
                BinOp::Sub => x - y,
                BinOp::Mul => x * y,
                BinOp::Div | BinOp::Rem if y == 0.0 => return Err(VmError::DivisionByZero),
                BinOp::Div => x / y,
                BinOp::Rem => x % y,
                _ => return Err(mismatch(op.name(), kind)),
            };
            Ok(from_f64(result, width))
        }
        NumKind::Bool => {
            let (x, y) = (a != 0, b != 0);
            let result = match op {
                BinOp::And => x & y,
                BinOp::Or => x | y,
                BinOp::Xor => x ^ y,
                _ => return Err(mismatch(op.name(), kind)),
            };
            Ok(u64::from(result))
        }
        NumKind::Char => Err(mismatch(op.name(), kind)),
    }
}

pub fn negate(kind: NumKind, a: u64) -> Result<u64, VmError> {
    match kind {
        NumKind::Int { width, .. } => Ok(truncate(a.wrapping_neg(), width)),
        NumKind::Float(width) => Ok(from_f64(-to_f64(a, width), width)),
        _ => Err(mismatch("neg", kind)),
    }
}

pub fn bit_not(kind: NumKind, a: u64) -> Result<u64, VmError> {
    match kind {
        NumKind::Int { width, .. } => Ok(truncate(!a, width)),
        NumKind::Bool => Ok(u64::from(a == 0)),
        _ => Err(mismatch("bitnot", kind)),
    }
}

pub fn compare(op: CmpOp, kind: NumKind, a: u64, b: u64) -> bool {
    let ordering = match kind {
        NumKind::Int {
            width,
            signed: true,
        } => Some(sign_extend(a, width).cmp(&sign_extend(b, width))),
        NumKind::Int { width, .. } => Some(truncate(a, width).cmp(&truncate(b, width))),
        NumKind::Float(width) => to_f64(a, width).partial_cmp(&to_f64(b, width)),
        NumKind::Bool => Some((a != 0).cmp(&(b != 0))),
        NumKind::Char => Some((a as u32).cmp(&(b as u32))),
    };
    // Unordered (NaN) only satisfies `ne`.
    let Some(ordering) = ordering else {
        return op == CmpOp::Ne;
    };
    match op {
        CmpOp::Eq => ordering.is_eq(),
        CmpOp::Ne => ordering.is_ne(),
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
    }
}

pub fn convert(from: NumKind, to: NumKind, a: u64) -> Result<u64, VmError> {
    let converted = match (from, to) {
        (NumKind::Int { width, signed }, NumKind::Int { width: to_width, .. }) => {
            let wide = if signed {
                sign_extend(a, width) as u64
            } else {
                truncate(a, width)
            };
            truncate(wide, to_width)
        }
        (NumKind::Int { width, signed }, NumKind::Float(to_width)) => {
            let value = if signed {
                sign_extend(a, width) as f64
            } else {
                truncate(a, width) as f64
            };
            from_f64(value, to_width)
        }
        (NumKind::Int { width, .. }, NumKind::Bool) => u64::from(truncate(a, width) != 0),
        (NumKind::Int { width, .. }, NumKind::Char) => {
            let code = truncate(a, width);
            let c = u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .unwrap_or(char::REPLACEMENT_CHARACTER);
            u64::from(c as u32)
        }
        (NumKind::Float(width), NumKind::Int { width: to_width, signed }) => {
            let value = to_f64(a, width);
            let bits = if signed {
                value as i64 as u64
            } else {
                value as u64
            };
            truncate(bits, to_width)
        }
        (NumKind::Float(width), NumKind::Float(to_width)) => from_f64(to_f64(a, width), to_width),
        (NumKind::Float(width), NumKind::Bool) => u64::from(to_f64(a, width) != 0.0),
        (NumKind::Bool, NumKind::Int { .. }) | (NumKind::Bool, NumKind::Bool) => {
            u64::from(a != 0)
        }
        (NumKind::Bool, NumKind::Float(width)) => from_f64(if a != 0 { 1.0 } else { 0.0 }, width),
        (NumKind::Char, NumKind::Int { width, .. }) => truncate(a, width),
        (NumKind::Char, NumKind::Char) => a,
        _ => {
            return Err(VmError::TypeMismatch {
                op: "convert",
                kind: format!("{} -> {}", from, to),
            });
        }
    };
    Ok(converted)
}
