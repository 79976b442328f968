//! The intermediate language: type model, module graph, reference tables
//! and the binary image format.

pub mod bytecode;
pub mod context;
pub mod dump;
pub mod error;
pub mod function;
pub mod instr;
pub mod module;
pub mod refs;
pub mod registry;
pub mod types;
pub mod verifier;

pub use bytecode::BytecodeError;
pub use context::Context;
pub use error::IlError;
pub use function::{Block, Function, FunctionId, Local, Param};
pub use instr::{BlockId, Instr, RawInstr};
pub use module::{Global, Module};
pub use refs::{FunctionRefId, GlobalRef, ResolvedType, StringId, TypeRefId};
pub use registry::{DeclaredKind, DeclaredType, Field, StructDef, TypeRegistry};
pub use types::{DeclId, FloatWidth, IntWidth, ModuleId, NumKind, Type};
