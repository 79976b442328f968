use thiserror::Error;

use crate::config::ConfigError;
use crate::il::{BytecodeError, IlError};
use crate::vm::VmError;

/// Any failure surfaced by the library.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Il(#[from] IlError),
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
