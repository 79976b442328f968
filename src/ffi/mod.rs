//! C FFI for embedding the engine.
//!
//! All public functions use the `extern "C"` ABI; `build.rs` generates
//! `include/stil.h` from them.
//!
//! # Safety
//!
//! All FFI functions that take raw pointers require:
//! - Non-null pointers (unless documented otherwise)
//! - Valid VM instances created by `stil_vm_new()`
//! - The VM outliving every invocation and heap address obtained from it

mod call;
mod error;
mod heap;
mod load;
mod types;
mod vm_ffi;

pub use call::*;
pub use error::*;
pub use heap::*;
pub use load::*;
pub use types::{StilErrorFn, StilInvocation, StilResult, StilVm};
pub use vm_ffi::*;

pub const STIL_VERSION_MAJOR: u32 = 0;
pub const STIL_VERSION_MINOR: u32 = 1;
pub const STIL_VERSION_PATCH: u32 = 0;

/// Get the version string
#[unsafe(no_mangle)]
pub extern "C" fn stil_version() -> *const std::ffi::c_char {
    static VERSION: &[u8] = b"0.1.0\0";
    VERSION.as_ptr() as *const std::ffi::c_char
}

#[unsafe(no_mangle)]
pub extern "C" fn stil_version_major() -> u32 {
    STIL_VERSION_MAJOR
}

#[unsafe(no_mangle)]
pub extern "C" fn stil_version_minor() -> u32 {
    STIL_VERSION_MINOR
}

#[unsafe(no_mangle)]
pub extern "C" fn stil_version_patch() -> u32 {
    STIL_VERSION_PATCH
}

/// Image with module `main` holding `struct Pair { a: i32, b: f64 }` and
/// `sub(a: i32, b: i32) -> i32`.
#[cfg(test)]
pub(crate) fn test_image() -> Vec<u8> {
    use crate::il::{BlockId, Context, Function, Instr, NumKind, Type, bytecode};

    let mut ctx = Context::new();
    let m = ctx.add_module("main").unwrap();
    ctx.define_struct(m, "Pair", vec![("a".into(), Type::i32()), ("b".into(), Type::f64())])
        .unwrap();
    let mut f = Function::new("sub", Some(Type::i32()));
    f.add_param("a", Type::i32());
    f.add_param("b", Type::i32());
    for instr in [
        Instr::LoadArg(0),
        Instr::LoadArg(1),
        Instr::Sub(NumKind::I32),
        Instr::Return,
    ] {
        f.emit(BlockId::ENTRY, instr).unwrap();
    }
    ctx.add_function(m, f).unwrap();
    bytecode::serialize(&ctx).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(stil_version_major(), 0);
        assert_eq!(stil_version_minor(), 1);
        assert_eq!(stil_version_patch(), 0);

        let version = unsafe { std::ffi::CStr::from_ptr(stil_version()).to_str().unwrap() };
        assert_eq!(version, "0.1.0");
    }
}
