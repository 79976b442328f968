//! Function invocation FFI functions.
//!
//! A call is built in three steps: `stil_begin_invoke` names the function,
//! `stil_push_argument` fills parameters by index in any order, and
//! `stil_invoke` runs it and copies the result into a caller buffer.

#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::c_char;

use super::types::{
    StilInvocation, StilResult, StilVm, from_raw_invocation, into_raw_invocation,
};
use super::vm_ffi::{c_str, get_wrapper_mut};

/// Start a call to `function` in `module`.
///
/// Returns NULL and sets the error if the function does not exist. The
/// invocation must be consumed by `stil_invoke()` or released with
/// `stil_invocation_free()`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_begin_invoke(
    vm: *mut StilVm,
    module: *const c_char,
    function: *const c_char,
) -> *mut StilInvocation {
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return std::ptr::null_mut();
    };
    let Some(module) = c_str(wrapper, module, "module name") else {
        return std::ptr::null_mut();
    };
    let Some(function) = c_str(wrapper, function, "function name") else {
        return std::ptr::null_mut();
    };
    let Some(runtime) = wrapper.runtime.as_ref() else {
        wrapper.set_error("no image loaded");
        return std::ptr::null_mut();
    };

    match runtime.begin_invoke(module, function) {
        Ok(invocation) => {
            wrapper.clear_error();
            into_raw_invocation(invocation)
        }
        Err(e) => {
            wrapper.fail(&e);
            std::ptr::null_mut()
        }
    }
}

/// Set parameter `index` from `len` raw bytes.
///
/// `len` must equal the declared size of the parameter.
///
/// # Returns
/// - `ErrorSignature` if `len` differs from the declared size
/// - `ErrorIndex` if the function has no parameter `index`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_push_argument(
    vm: *mut StilVm,
    invocation: *mut StilInvocation,
    index: u32,
    data: *const u8,
    len: usize,
) -> StilResult {
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return StilResult::ErrorInvalidArg;
    };
    if invocation.is_null() || (data.is_null() && len > 0) {
        wrapper.set_error("invocation or data pointer is NULL");
        return StilResult::ErrorInvalidArg;
    }
    let Some(runtime) = wrapper.runtime.as_ref() else {
        wrapper.set_error("no image loaded");
        return StilResult::ErrorInvalidArg;
    };

    let bytes = if len == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(data, len)
    };
    let invocation = &mut *(invocation as *mut crate::host::Invocation);
    match runtime.push_argument_bytes(invocation, bytes, index) {
        Ok(()) => {
            wrapper.clear_error();
            StilResult::Ok
        }
        Err(e) => wrapper.fail(&e),
    }
}

/// Run an invocation and copy the result into `out`.
///
/// `out_len` must equal the declared return size (0 for void functions,
/// in which case `out` may be NULL). The invocation is consumed whether or
/// not the call succeeds.
///
/// # Returns
/// - `ErrorArgumentCount` if a parameter was never pushed
/// - `ErrorSignature` if `out_len` differs from the declared return size
/// - any runtime code raised while executing
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_invoke(
    vm: *mut StilVm,
    invocation: *mut StilInvocation,
    out: *mut u8,
    out_len: usize,
) -> StilResult {
    if invocation.is_null() {
        if let Some(wrapper) = get_wrapper_mut(vm) {
            wrapper.set_error("invocation is NULL");
        }
        return StilResult::ErrorInvalidArg;
    }
    let invocation = from_raw_invocation(invocation);
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return StilResult::ErrorInvalidArg;
    };
    if out.is_null() && out_len > 0 {
        wrapper.set_error("output buffer is NULL");
        return StilResult::ErrorInvalidArg;
    }
    let Some(runtime) = wrapper.runtime.as_mut() else {
        wrapper.set_error("no image loaded");
        return StilResult::ErrorInvalidArg;
    };

    match runtime.invoke_raw(*invocation, out_len as u32) {
        Ok(bytes) => {
            if !bytes.is_empty() {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), out, bytes.len());
            }
            wrapper.clear_error();
            StilResult::Ok
        }
        Err(e) => wrapper.fail(&e),
    }
}

/// Release an invocation that will not be run.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_invocation_free(invocation: *mut StilInvocation) {
    if invocation.is_null() {
        return;
    }
    drop(from_raw_invocation(invocation));
}
