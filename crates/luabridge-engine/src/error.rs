//! Error types surfaced to the host when it enters the VM.

use luabridge_sdk::BridgeError;

/// Host-side reasons to stop a running script.
///
/// Raised from the step hook; the VM unwinds and the entry call returns
/// [`VmError::Aborted`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Abort {
    /// Step budget exhausted
    #[error("run step arrive limit {step}/{limit}")]
    StepLimit {
        /// Steps executed when the limit was hit
        step: u64,
        /// Configured limit
        limit: u64,
    },

    /// Wall-clock deadline passed
    #[error("deadline exceeded")]
    Timeout,

    /// Cancelled by the host, or by an earlier abort of the same instance
    #[error("execution cancelled")]
    Cancelled,
}

/// Errors returned by VM-entry calls (`exec`, `eval`, `check`, ...)
#[derive(Debug, Clone, thiserror::Error)]
pub enum VmError {
    /// Chunk failed to compile
    #[error("load error : {0}")]
    Load(String),

    /// Script raised an error at run time
    #[error("call error : {0}")]
    Runtime(String),

    /// Script stopped by a host limit or cancellation
    #[error(transparent)]
    Aborted(#[from] Abort),

    /// A host function failed
    #[error("host function error: {0}")]
    Host(#[from] BridgeError),

    /// A value could not be projected across the boundary
    #[error("projection error: {0}")]
    Projection(BridgeError),

    /// The VM could not be created or configured
    #[error("VM initialisation failed: {0}")]
    Init(String),
}

impl VmError {
    /// The abort reason, if this error is an abort
    pub fn abort(&self) -> Option<&Abort> {
        match self {
            VmError::Aborted(abort) => Some(abort),
            _ => None,
        }
    }
}

/// VM-entry result
pub type VmResult<T> = Result<T, VmError>;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML or unknown keys
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
