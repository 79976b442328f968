//! stil - execution engine for a statically-typed block IL
//!
//! This library provides the IL model, the binary image format, and the
//! interpreter with its garbage-collected heap.
//! For C/C++ embedding, use the FFI module functions.

pub mod config;
pub mod error;
pub mod ffi;
pub mod host;
pub mod il;
pub mod vm;

// Re-export commonly used types
pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use host::{Invocation, Runtime};
pub use il::{Context, Type};
pub use vm::{Handle, NativeValue, Pointer, Slice, Vm, VmError};

// Re-export FFI types for C bindings
pub use ffi::*;
