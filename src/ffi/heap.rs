//! Heap FFI functions: allocate objects the host passes into calls, read
//! and write their elements and fields, and control their lifetime.
//!
//! Host allocations never trigger a collection. Objects stay valid until
//! the next invocation allocates, unless pinned.

#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::c_char;

use super::types::{StilResult, StilVm};
use super::vm_ffi::{c_str, get_wrapper_mut, with_runtime};
use crate::host::Runtime;
use crate::il::{IlError, Type};
use crate::vm::{Handle, Pointer, Slice, VmError};

fn resolve_type(runtime: &Runtime, module: &str, name: &str) -> Result<Type, VmError> {
    let ctx = runtime.context();
    let id = ctx
        .module_id(module)
        .ok_or_else(|| IlError::ModuleNotFound(module.to_string()))?;
    Ok(ctx.get_type(id, name)?)
}

/// Resolve the two name arguments, then run `f` with the named type.
unsafe fn with_named_type<F>(
    vm: *mut StilVm,
    module: *const c_char,
    type_name: *const c_char,
    f: F,
) -> StilResult
where
    F: FnOnce(&mut Runtime, &Type) -> Result<(), VmError>,
{
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return StilResult::ErrorInvalidArg;
    };
    let Some(module) = c_str(wrapper, module, "module name") else {
        return StilResult::ErrorInvalidArg;
    };
    let Some(type_name) = c_str(wrapper, type_name, "type name") else {
        return StilResult::ErrorInvalidArg;
    };
    with_runtime(vm, |runtime| {
        let ty = resolve_type(runtime, module, type_name)?;
        f(runtime, &ty)
    })
}

// =============================================================================
// Allocation
// =============================================================================

/// Allocate a zeroed object of the named type and store its address in
/// `out`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_alloc_object(
    vm: *mut StilVm,
    module: *const c_char,
    type_name: *const c_char,
    out: *mut Pointer,
) -> StilResult {
    if out.is_null() {
        return StilResult::ErrorInvalidArg;
    }
    with_named_type(vm, module, type_name, |runtime, ty| {
        *out = runtime.alloc_object(ty)?;
        Ok(())
    })
}

/// Allocate a zeroed array of `len` elements of the named type.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_alloc_array(
    vm: *mut StilVm,
    module: *const c_char,
    element_type: *const c_char,
    len: u32,
    out: *mut Slice,
) -> StilResult {
    if out.is_null() {
        return StilResult::ErrorInvalidArg;
    }
    with_named_type(vm, module, element_type, |runtime, ty| {
        *out = runtime.alloc_array(ty, len)?;
        Ok(())
    })
}

/// Copy `len` bytes of UTF-8 text into a new string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_alloc_string(
    vm: *mut StilVm,
    data: *const c_char,
    len: usize,
    out: *mut Slice,
) -> StilResult {
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return StilResult::ErrorInvalidArg;
    };
    if out.is_null() || (data.is_null() && len > 0) {
        wrapper.set_error("string or output pointer is NULL");
        return StilResult::ErrorInvalidArg;
    }
    let bytes = if len == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(data as *const u8, len)
    };
    let Ok(text) = std::str::from_utf8(bytes) else {
        wrapper.set_error("invalid UTF-8 in string");
        return StilResult::ErrorInvalidArg;
    };
    with_runtime(vm, |runtime| {
        *out = runtime.alloc_string(text)?;
        Ok(())
    })
}

/// Copy the bytes of a string into `buf`.
///
/// `out_len` always receives the string's full length; at most `cap`
/// bytes are written, so a call with `cap == 0` queries the size.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_read_string(
    vm: *mut StilVm,
    string: Slice,
    buf: *mut c_char,
    cap: usize,
    out_len: *mut usize,
) -> StilResult {
    if out_len.is_null() || (buf.is_null() && cap > 0) {
        return StilResult::ErrorInvalidArg;
    }
    with_runtime(vm, |runtime| {
        let text = runtime.read_string(string)?;
        let n = text.len().min(cap);
        if n > 0 {
            std::ptr::copy_nonoverlapping(text.as_ptr(), buf as *mut u8, n);
        }
        *out_len = text.len();
        Ok(())
    })
}

// =============================================================================
// Lifetime
// =============================================================================

/// Keep an object alive across collections until unpinned.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_pin(vm: *mut StilVm, handle: Handle) -> StilResult {
    with_runtime(vm, |runtime| runtime.pin(handle))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_unpin(vm: *mut StilVm, handle: Handle) -> StilResult {
    with_runtime(vm, |runtime| runtime.unpin(handle))
}

/// Collect with only pinned objects as roots. `freed` (optional) receives
/// the number of slots released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_collect(vm: *mut StilVm, freed: *mut usize) -> StilResult {
    with_runtime(vm, |runtime| {
        let count = runtime.collect_garbage()?;
        if !freed.is_null() {
            *freed = count;
        }
        Ok(())
    })
}

// =============================================================================
// Elements and fields
// =============================================================================
//
// Values travel as raw little-endian bytes; `len` must equal the declared
// size of the element or field.

#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_get_element(
    vm: *mut StilVm,
    array: Slice,
    index: u32,
    out: *mut u8,
    len: usize,
) -> StilResult {
    if out.is_null() {
        return StilResult::ErrorInvalidArg;
    }
    with_runtime(vm, |runtime| {
        let bytes = runtime.get_element_bytes(array, index)?;
        copy_out(&bytes, out, len)
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_set_element(
    vm: *mut StilVm,
    array: Slice,
    index: u32,
    data: *const u8,
    len: usize,
) -> StilResult {
    if data.is_null() {
        return StilResult::ErrorInvalidArg;
    }
    let bytes = std::slice::from_raw_parts(data, len);
    with_runtime(vm, |runtime| runtime.set_element_bytes(array, index, bytes))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_get_field(
    vm: *mut StilVm,
    object: Pointer,
    field: u32,
    out: *mut u8,
    len: usize,
) -> StilResult {
    if out.is_null() {
        return StilResult::ErrorInvalidArg;
    }
    with_runtime(vm, |runtime| {
        let bytes = runtime.get_field_bytes(object, field)?;
        copy_out(&bytes, out, len)
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_set_field(
    vm: *mut StilVm,
    object: Pointer,
    field: u32,
    data: *const u8,
    len: usize,
) -> StilResult {
    if data.is_null() {
        return StilResult::ErrorInvalidArg;
    }
    let bytes = std::slice::from_raw_parts(data, len);
    with_runtime(vm, |runtime| runtime.set_field_bytes(object, field, bytes))
}

unsafe fn copy_out(bytes: &[u8], out: *mut u8, len: usize) -> Result<(), VmError> {
    if bytes.len() != len {
        return Err(VmError::SignatureMismatch {
            what: "output buffer".to_string(),
            declared: bytes.len() as u32,
            native: len as u32,
        });
    }
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), out, len);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::load::stil_load_image;
    use crate::ffi::test_image;
    use crate::ffi::vm_ffi::{stil_vm_free, stil_vm_new};
    use std::ffi::CString;

    unsafe fn loaded_vm() -> *mut StilVm {
        let image = test_image();
        let vm = stil_vm_new();
        assert_eq!(stil_load_image(vm, image.as_ptr(), image.len()), StilResult::Ok);
        vm
    }

    #[test]
    fn test_struct_fields() {
        let module = CString::new("main").unwrap();
        let pair = CString::new("Pair").unwrap();
        let unknown = CString::new("Triple").unwrap();
        unsafe {
            let vm = loaded_vm();
            let mut obj = Pointer::NULL;
            assert_eq!(
                stil_alloc_object(vm, module.as_ptr(), pair.as_ptr(), &mut obj),
                StilResult::Ok
            );
            assert!(!obj.is_null());
            assert_eq!(
                stil_alloc_object(vm, module.as_ptr(), unknown.as_ptr(), &mut obj),
                StilResult::ErrorNotFound
            );

            let value = 2.5f64.to_le_bytes();
            assert_eq!(stil_set_field(vm, obj, 1, value.as_ptr(), 8), StilResult::Ok);
            let mut out = [0u8; 8];
            assert_eq!(stil_get_field(vm, obj, 1, out.as_mut_ptr(), 8), StilResult::Ok);
            assert_eq!(f64::from_le_bytes(out), 2.5);
            assert_eq!(
                stil_get_field(vm, obj, 0, out.as_mut_ptr(), 8),
                StilResult::ErrorSignature
            );
            assert_eq!(
                stil_get_field(vm, Pointer::NULL, 0, out.as_mut_ptr(), 4),
                StilResult::ErrorNull
            );
            stil_vm_free(vm);
        }
    }

    #[test]
    fn test_array_elements() {
        let module = CString::new("main").unwrap();
        let int = CString::new("i32").unwrap();
        unsafe {
            let vm = loaded_vm();
            let mut arr = Slice::EMPTY;
            assert_eq!(
                stil_alloc_array(vm, module.as_ptr(), int.as_ptr(), 4, &mut arr),
                StilResult::Ok
            );
            assert_eq!(arr.len, 4);
            let value = 42i32.to_le_bytes();
            assert_eq!(stil_set_element(vm, arr, 3, value.as_ptr(), 4), StilResult::Ok);
            let mut out = [0u8; 4];
            assert_eq!(stil_get_element(vm, arr, 3, out.as_mut_ptr(), 4), StilResult::Ok);
            assert_eq!(i32::from_le_bytes(out), 42);
            assert_eq!(
                stil_get_element(vm, arr, 4, out.as_mut_ptr(), 4),
                StilResult::ErrorIndex
            );
            stil_vm_free(vm);
        }
    }

    #[test]
    fn test_strings_and_pinning() {
        let text = "hello";
        unsafe {
            let vm = loaded_vm();
            let mut kept = Slice::EMPTY;
            let mut dropped = Slice::EMPTY;
            assert_eq!(
                stil_alloc_string(vm, text.as_ptr() as *const c_char, text.len(), &mut kept),
                StilResult::Ok
            );
            assert_eq!(
                stil_alloc_string(vm, text.as_ptr() as *const c_char, text.len(), &mut dropped),
                StilResult::Ok
            );
            assert_eq!(stil_pin(vm, kept.handle), StilResult::Ok);

            let mut freed = 0usize;
            assert_eq!(stil_collect(vm, &mut freed), StilResult::Ok);
            assert_eq!(freed, 1);

            let mut len = 0usize;
            assert_eq!(
                stil_read_string(vm, kept, std::ptr::null_mut(), 0, &mut len),
                StilResult::Ok
            );
            assert_eq!(len, 5);
            let mut buf = [0u8; 5];
            assert_eq!(
                stil_read_string(vm, kept, buf.as_mut_ptr() as *mut c_char, 5, &mut len),
                StilResult::Ok
            );
            assert_eq!(&buf, b"hello");

            assert_eq!(stil_unpin(vm, kept.handle), StilResult::Ok);
            stil_vm_free(vm);
        }
    }
}
