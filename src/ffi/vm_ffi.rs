//! VM lifecycle FFI functions.

#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::{CStr, c_char, c_void};

use super::types::{StilErrorFn, StilResult, StilVm, VmWrapper};
use crate::host::Runtime;
use crate::vm::VmError;

/// Create a new VM instance.
///
/// The returned VM must be freed with `stil_vm_free()`.
///
/// # Example (C)
/// ```c
/// StilVm *vm = stil_vm_new();
/// stil_load_file(vm, "program.stil");
/// // ... invoke functions ...
/// stil_vm_free(vm);
/// ```
#[unsafe(no_mangle)]
pub extern "C" fn stil_vm_new() -> *mut StilVm {
    let wrapper = Box::new(VmWrapper::new());
    Box::into_raw(wrapper) as *mut StilVm
}

/// Free a VM instance.
///
/// # Safety
///
/// - `vm` must be a valid pointer returned by `stil_vm_new()`
/// - `vm` must not have been freed already
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_vm_free(vm: *mut StilVm) {
    if vm.is_null() {
        return;
    }
    let _ = Box::from_raw(vm as *mut VmWrapper);
}

/// Set the initial collection threshold in bytes.
///
/// Takes effect on the next load.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_set_heap_capacity(vm: *mut StilVm, bytes: usize) {
    if let Some(wrapper) = get_wrapper_mut(vm) {
        wrapper.config.heap_capacity = bytes;
    }
}

/// Set the operand stack size in bytes. Takes effect on the next load.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_set_stack_size(vm: *mut StilVm, bytes: u32) {
    if let Some(wrapper) = get_wrapper_mut(vm) {
        wrapper.config.stack_size = bytes;
    }
}

/// Enable or disable collection. Takes effect on the next load.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_set_gc_enabled(vm: *mut StilVm, enabled: bool) {
    if let Some(wrapper) = get_wrapper_mut(vm) {
        wrapper.config.gc_enabled = enabled;
    }
}

/// Set the error callback function.
///
/// # Arguments
/// - `vm`: Valid VM instance
/// - `callback`: Error callback function (or NULL to disable)
/// - `userdata`: User data passed to callback
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_set_error_callback(
    vm: *mut StilVm,
    callback: StilErrorFn,
    userdata: *mut c_void,
) {
    if let Some(wrapper) = get_wrapper_mut(vm) {
        wrapper.error_callback = callback;
        wrapper.error_userdata = userdata;
    }
}

/// Returns true once an image has been loaded.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_has_image(vm: *const StilVm) -> bool {
    get_wrapper(vm).is_some_and(|w| w.runtime.is_some())
}

/// Helper to get a mutable reference to the wrapper from a raw pointer.
pub(crate) unsafe fn get_wrapper_mut(vm: *mut StilVm) -> Option<&'static mut VmWrapper> {
    if vm.is_null() {
        None
    } else {
        Some(&mut *(vm as *mut VmWrapper))
    }
}

/// Helper to get an immutable reference to the wrapper from a raw pointer.
pub(crate) unsafe fn get_wrapper(vm: *const StilVm) -> Option<&'static VmWrapper> {
    if vm.is_null() {
        None
    } else {
        Some(&*(vm as *const VmWrapper))
    }
}

/// Run `f` against the loaded runtime, recording any failure.
pub(crate) unsafe fn with_runtime<F>(vm: *mut StilVm, f: F) -> StilResult
where
    F: FnOnce(&mut Runtime) -> Result<(), VmError>,
{
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return StilResult::ErrorInvalidArg;
    };
    let Some(runtime) = wrapper.runtime.as_mut() else {
        wrapper.set_error("no image loaded");
        return StilResult::ErrorInvalidArg;
    };
    match f(runtime) {
        Ok(()) => {
            wrapper.clear_error();
            StilResult::Ok
        }
        Err(e) => wrapper.fail(&e),
    }
}

/// Borrow a NUL-terminated UTF-8 argument, recording an error if it is
/// null or malformed.
pub(crate) unsafe fn c_str<'a>(
    wrapper: &mut VmWrapper,
    ptr: *const c_char,
    what: &str,
) -> Option<&'a str> {
    if ptr.is_null() {
        wrapper.set_error(format!("{what} is NULL"));
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            wrapper.set_error(format!("invalid UTF-8 in {what}"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_new_free() {
        let vm = stil_vm_new();
        assert!(!vm.is_null());
        unsafe {
            assert!(!stil_has_image(vm));
            stil_vm_free(vm);
        }
    }

    #[test]
    fn test_vm_free_null() {
        unsafe {
            stil_vm_free(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_config_setters() {
        let vm = stil_vm_new();
        unsafe {
            stil_set_heap_capacity(vm, 4096);
            stil_set_stack_size(vm, 256);
            stil_set_gc_enabled(vm, false);
            let wrapper = get_wrapper(vm).unwrap();
            assert_eq!(wrapper.config.heap_capacity, 4096);
            assert_eq!(wrapper.config.stack_size, 256);
            assert!(!wrapper.config.gc_enabled);
            stil_vm_free(vm);
        }
    }

    #[test]
    fn test_runtime_required() {
        let vm = stil_vm_new();
        unsafe {
            let result = with_runtime(vm, |_| Ok(()));
            assert_eq!(result, StilResult::ErrorInvalidArg);
            assert!(get_wrapper(vm).unwrap().last_error.is_some());
            stil_vm_free(vm);
        }
    }

    #[test]
    fn test_error_callback() {
        use std::sync::atomic::{AtomicBool, Ordering};

        static CALLBACK_CALLED: AtomicBool = AtomicBool::new(false);

        unsafe extern "C" fn test_callback(_message: *const c_char, _userdata: *mut c_void) {
            CALLBACK_CALLED.store(true, Ordering::SeqCst);
        }

        let vm = stil_vm_new();
        unsafe {
            stil_set_error_callback(vm, Some(test_callback), std::ptr::null_mut());
            get_wrapper_mut(vm).unwrap().set_error("test error");
            assert!(CALLBACK_CALLED.load(Ordering::SeqCst));
            stil_vm_free(vm);
        }
    }
}
