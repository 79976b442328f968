use std::io;

use thiserror::Error;

use super::heap::HeapError;
use crate::il::IlError;

/// Failures raised to the host. Each invocation aborts on the first one.
#[derive(Error, Debug)]
pub enum VmError {
    #[error("'{function}' expects {expected} arguments, {actual} were pushed")]
    ArgumentCount {
        function: String,
        expected: usize,
        actual: usize,
    },
    #[error("signature mismatch for {what}: declared size {declared}, native size {native}")]
    SignatureMismatch {
        what: String,
        declared: u32,
        native: u32,
    },
    #[error("'{function}' has no parameter {index} ({count} declared)")]
    ArgumentIndex {
        function: String,
        index: u32,
        count: usize,
    },
    #[error("index {index} out of range for length {length}")]
    IndexOutOfRange { index: i64, length: u32 },
    #[error("null dereference")]
    NullDereference,
    #[error("operand stack overflow")]
    StackOverflow,
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("negative array length {0}")]
    NegativeLength(i32),
    #[error("block {block} of '{function}' ran off its end without a terminator")]
    UnterminatedBlock { function: String, block: u32 },
    #[error("{op} is not defined for {kind}")]
    TypeMismatch { op: &'static str, kind: String },
    #[error("pointer arithmetic left the addressable range")]
    PointerOutOfRange,
    #[error(transparent)]
    Il(#[from] IlError),
    #[error(transparent)]
    Heap(HeapError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<HeapError> for VmError {
    fn from(err: HeapError) -> Self {
        match err {
            HeapError::NullDereference => VmError::NullDereference,
            other => VmError::Heap(other),
        }
    }
}
