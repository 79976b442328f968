//! Image loading FFI functions.

#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::c_char;
use std::path::Path;

use super::types::{StilResult, StilVm, VmWrapper};
use super::vm_ffi::{c_str, get_wrapper_mut};
use crate::error::Result;
use crate::host::Runtime;

/// Load an image from memory, replacing any previously loaded one.
///
/// The image is decoded and committed with the VM's current settings.
///
/// # Returns
/// - `Ok` on success
/// - `ErrorInvalidArg` if data is NULL
/// - `ErrorLoad` if the image is malformed or fails to commit
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_load_image(
    vm: *mut StilVm,
    data: *const u8,
    len: usize,
) -> StilResult {
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return StilResult::ErrorInvalidArg;
    };

    if data.is_null() {
        wrapper.set_error("data pointer is NULL");
        return StilResult::ErrorInvalidArg;
    }

    let bytes = std::slice::from_raw_parts(data, len);
    let loaded = Runtime::from_image(bytes, &wrapper.config);
    install(wrapper, loaded)
}

/// Load an image from a file, replacing any previously loaded one.
///
/// # Returns
/// - `Ok` on success
/// - `ErrorInvalidArg` if path is NULL or not UTF-8
/// - `ErrorLoad` if the file cannot be read or decoded
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stil_load_file(vm: *mut StilVm, path: *const c_char) -> StilResult {
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return StilResult::ErrorInvalidArg;
    };
    let Some(path) = c_str(wrapper, path, "path") else {
        return StilResult::ErrorInvalidArg;
    };

    let loaded = Runtime::load_file(Path::new(path), &wrapper.config);
    install(wrapper, loaded)
}

fn install(wrapper: &mut VmWrapper, loaded: Result<Runtime>) -> StilResult {
    match loaded {
        Ok(runtime) => {
            wrapper.runtime = Some(runtime);
            wrapper.clear_error();
            StilResult::Ok
        }
        Err(e) => {
            wrapper.set_error(format!("load failed: {e}"));
            (&e).into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::test_image;
    use crate::ffi::vm_ffi::{stil_has_image, stil_vm_free, stil_vm_new};
    use std::ffi::CString;

    #[test]
    fn test_load_image() {
        let image = test_image();
        unsafe {
            let vm = stil_vm_new();
            assert_eq!(stil_load_image(vm, image.as_ptr(), image.len()), StilResult::Ok);
            assert!(stil_has_image(vm));
            stil_vm_free(vm);
        }
    }

    #[test]
    fn test_load_garbage() {
        let garbage = b"not an image";
        unsafe {
            let vm = stil_vm_new();
            let result = stil_load_image(vm, garbage.as_ptr(), garbage.len());
            assert_eq!(result, StilResult::ErrorLoad);
            assert!(!stil_has_image(vm));
            assert_eq!(
                stil_load_image(vm, std::ptr::null(), 0),
                StilResult::ErrorInvalidArg
            );
            stil_vm_free(vm);
        }
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.stil");
        std::fs::write(&path, test_image()).unwrap();
        let c_path = CString::new(path.to_str().unwrap()).unwrap();
        let missing = CString::new(dir.path().join("missing.stil").to_str().unwrap()).unwrap();
        unsafe {
            let vm = stil_vm_new();
            assert_eq!(stil_load_file(vm, c_path.as_ptr()), StilResult::Ok);
            assert_eq!(stil_load_file(vm, missing.as_ptr()), StilResult::ErrorLoad);
            // A failed load keeps the previous image.
            assert!(stil_has_image(vm));
            stil_vm_free(vm);
        }
    }
}
