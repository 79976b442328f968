//! FFI type definitions for the C API.

use std::ffi::{CString, c_char, c_void};

use crate::config::RuntimeConfig;
use crate::error::Error;
use crate::host::{Invocation, Runtime};
use crate::il::IlError;
use crate::vm::VmError;

/// Result codes for FFI operations.
///
/// These map to the `StilResult` enum in `stil.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StilResult {
    /// Operation succeeded
    Ok = 0,
    /// Runtime error during execution
    ErrorRuntime = 1,
    /// Native size disagrees with the declared size
    ErrorSignature = 2,
    /// Invocation started with parameters still missing
    ErrorArgumentCount = 3,
    /// Index out of range
    ErrorIndex = 4,
    /// Null dereference
    ErrorNull = 5,
    /// Image could not be read, decoded or committed
    ErrorLoad = 6,
    /// Invalid argument passed to function
    ErrorInvalidArg = 7,
    /// Module, function or type not found
    ErrorNotFound = 8,
}

impl StilResult {
    pub fn is_ok(self) -> bool {
        self == StilResult::Ok
    }

    pub fn is_err(self) -> bool {
        self != StilResult::Ok
    }
}

impl From<&VmError> for StilResult {
    fn from(err: &VmError) -> Self {
        match err {
            VmError::SignatureMismatch { .. } => StilResult::ErrorSignature,
            VmError::ArgumentCount { .. } => StilResult::ErrorArgumentCount,
            VmError::ArgumentIndex { .. } | VmError::IndexOutOfRange { .. } => {
                StilResult::ErrorIndex
            }
            VmError::NullDereference => StilResult::ErrorNull,
            VmError::Il(
                IlError::ModuleNotFound(_)
                | IlError::FunctionNotFound { .. }
                | IlError::UnknownType(_),
            ) => StilResult::ErrorNotFound,
            _ => StilResult::ErrorRuntime,
        }
    }
}

impl From<&Error> for StilResult {
    fn from(err: &Error) -> Self {
        match err {
            Error::Vm(e) => e.into(),
            Error::Il(_) | Error::Bytecode(_) | Error::Config(_) => StilResult::ErrorLoad,
        }
    }
}

/// Error callback function type.
///
/// Called when an error occurs, with the error message and user data.
pub type StilErrorFn = Option<unsafe extern "C" fn(message: *const c_char, userdata: *mut c_void)>;

/// Opaque VM instance type.
///
/// All operations require a valid `StilVm` pointer created by
/// `stil_vm_new()`.
#[repr(C)]
pub struct StilVm {
    _private: [u8; 0],
}

/// Opaque pending call created by `stil_begin_invoke()`.
#[repr(C)]
pub struct StilInvocation {
    _private: [u8; 0],
}

/// Internal VM wrapper that holds the runtime and FFI state.
pub(crate) struct VmWrapper {
    /// Applied when the next image is loaded
    pub config: RuntimeConfig,
    /// Loaded image and its machine (if any)
    pub runtime: Option<Runtime>,
    /// Last error message (as CString for FFI compatibility)
    pub last_error: Option<CString>,
    pub error_callback: StilErrorFn,
    pub error_userdata: *mut c_void,
}

impl VmWrapper {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            runtime: None,
            last_error: None,
            error_callback: None,
            error_userdata: std::ptr::null_mut(),
        }
    }

    /// Set an error message and optionally call the error callback.
    pub fn set_error(&mut self, message: impl Into<String>) {
        let c_msg = CString::new(message.into()).unwrap_or_default();

        if let Some(callback) = self.error_callback {
            unsafe {
                callback(c_msg.as_ptr(), self.error_userdata);
            }
        }

        self.last_error = Some(c_msg);
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Record `err` and return its result code.
    pub fn fail(&mut self, err: &VmError) -> StilResult {
        self.set_error(err.to_string());
        err.into()
    }
}

impl Default for VmWrapper {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn into_raw_invocation(invocation: Invocation) -> *mut StilInvocation {
    Box::into_raw(Box::new(invocation)) as *mut StilInvocation
}

/// Take ownership of an invocation created by `into_raw_invocation`.
///
/// # Safety
///
/// `ptr` must be non-null, come from `into_raw_invocation` and not have
/// been reclaimed already.
pub(crate) unsafe fn from_raw_invocation(ptr: *mut StilInvocation) -> Box<Invocation> {
    unsafe { Box::from_raw(ptr as *mut Invocation) }
}
