//! Error handling FFI functions.

#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::c_char;

use super::types::StilVm;
use super::vm_ffi::{get_wrapper, get_wrapper_mut};

/// Get the last error message.
///
/// Returns NULL if there is no error. The pointer is valid until the next
/// API call on this VM.
///
/// # Example (C)
/// ```c
/// if (stil_invoke(vm, inv, &out, sizeof out) != STIL_RESULT_OK) {
///     printf("Error: %s\n", stil_get_error(vm));
/// }
/// ```
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_get_error(vm: *const StilVm) -> *const c_char {
    get_wrapper(vm)
        .and_then(|w| w.last_error.as_ref())
        .map_or(std::ptr::null(), |e| e.as_ptr())
}

/// Clear the last error.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_clear_error(vm: *mut StilVm) {
    if let Some(wrapper) = get_wrapper_mut(vm) {
        wrapper.clear_error();
    }
}

/// Check if there is a pending error.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_has_error(vm: *const StilVm) -> bool {
    get_wrapper(vm).is_some_and(|w| w.last_error.is_some())
}
