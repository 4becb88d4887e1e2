use std::time::Duration;
use thiserror::Error;

/// Why a middleware configuration or execution failed.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("middleware binary not found: {0}")]
    BinaryNotFound(String),

    #[error("middleware exited with status {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("middleware did not answer within {0:?}")]
    Timeout(Duration),

    #[error("request/response pair could not be serialized for middleware: {0}")]
    InvalidInput(String),

    #[error("middleware output is not a valid request/response pair: {0}")]
    MalformedOutput(String),

    #[error("remote middleware unreachable: {0}")]
    TransportError(String),

    #[error("a middleware script needs a binary to run it")]
    ScriptWithoutBinary,

    #[error("middleware must be a local binary or a remote endpoint, not both")]
    ConflictingTargets,

    #[error("middleware I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl MiddlewareError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MiddlewareError::BinaryNotFound(_) => "binary_not_found",
            MiddlewareError::NonZeroExit { .. } => "non_zero_exit",
            MiddlewareError::Timeout(_) => "timeout",
            MiddlewareError::InvalidInput(_) => "invalid_input",
            MiddlewareError::MalformedOutput(_) => "malformed_output",
            MiddlewareError::TransportError(_) => "transport_error",
            MiddlewareError::ScriptWithoutBinary => "script_without_binary",
            MiddlewareError::ConflictingTargets => "conflicting_targets",
            MiddlewareError::Io(_) => "io",
        }
    }
}
