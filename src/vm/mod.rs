mod error;
pub mod heap;
pub mod marshal;
mod ops;
mod stack;
pub mod value;
mod vm;

pub use error::VmError;
pub use heap::{GcStats, Heap, HeapError, HeapStats, HeapValue, SlotKind, Tracer};
pub use value::{Handle, NativeValue, Pointer, Slice};
pub use vm::Vm;
