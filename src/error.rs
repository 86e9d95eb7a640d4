//! @ai:module:intent Error taxonomy for compile, load, adapter, device and sandbox stages
//! @ai:module:layer domain
//! @ai:module:public_api CompileError, LoadError, AdapterError, DeviceError, SandboxError, JudgeError
//! @ai:module:stateless true

use crate::compile::diagnostics::CompileDiagnostics;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// @ai:intent Failures of the artifact cache and the external compiler
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    /// Configuration error: the device is not in the capability table. Never retried.
    #[error("unsupported device '{0}'")]
    UnsupportedDevice(String),

    /// The compiler ran and exited non-zero. Cached like a success.
    #[error("compilation failed:\n{}", .0.stderr)]
    Failed(Arc<CompileDiagnostics>),

    #[error("failed to invoke compiler '{program}': {reason}")]
    Toolchain { program: String, reason: String },

    /// The compiler was still running at the deadline and was killed. Never cached.
    #[error("compiler exceeded time limit of {:.2}s", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("build directory error: {0}")]
    Io(String),
}

impl CompileError {
    /// @ai:intent Diagnostics of a failed compile, if this is one
    /// @ai:effects pure
    pub fn diagnostics(&self) -> Option<&CompileDiagnostics> {
        match self {
            CompileError::Failed(diagnostics) => Some(diagnostics),
            _ => None,
        }
    }
}

/// @ai:intent Failures materializing an artifact as a native module
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to stage artifact on disk: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load library at {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },
}

/// @ai:intent Contract violations between a problem's arguments and an entry point
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("entry point takes {expected} arguments, got {inputs} inputs + 1 output + {scalars} scalars")]
    ArityMismatch {
        expected: usize,
        inputs: usize,
        scalars: usize,
    },

    #[error("argument {index} is declared as {declared} but a {supplied} was supplied")]
    KindMismatch {
        index: usize,
        declared: String,
        supplied: &'static str,
    },
}

/// @ai:intent Failures reported by the device collaborator
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("device allocation of {bytes} bytes failed: {reason}")]
    Allocation { bytes: usize, reason: String },

    #[error("device synchronization failed: {0}")]
    Synchronize(String),

    #[error("device timer error: {0}")]
    Timer(String),
}

/// @ai:intent Failures setting up an isolated worker
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("failed to create event channel: {0}")]
    Pipe(String),

    #[error("failed to spawn worker process: {0}")]
    Spawn(String),
}

/// @ai:intent Any failure of the end-to-end judging pipeline
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}
