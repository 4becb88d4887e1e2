//! Engine-level errors. Every variant is a configuration error: the call that
//! produced it changed nothing.

use crate::middleware::MiddlewareError;
use crate::mode::Mode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not a valid mode: {0:?}")]
    InvalidMode(String),

    #[error("can't change mode to {0} when configured as a webserver")]
    IncompatibleMode(Mode),

    #[error("destination is not a valid regular expression: {0}")]
    InvalidDestination(String),

    #[error("invalid response delay: {0}")]
    InvalidDelay(String),

    #[error("invalid request template #{index}: {reason}")]
    InvalidTemplate { index: usize, reason: String },

    #[error("unsupported simulation schema version {0:?}")]
    UnsupportedSchema(String),

    #[error("middleware rejected: {0}")]
    Middleware(#[from] MiddlewareError),
}
