//! The engine's view of the real backend.

use crate::model::{RequestDetails, ResponseDetails};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("no upstream is available in webserver configuration")]
    Unavailable,

    #[error("request can't be forwarded: {0}")]
    InvalidRequest(String),

    #[error("upstream {destination} unreachable: {reason}")]
    Connect { destination: String, reason: String },

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
}

/// Forwards a request to the real service and returns its answer.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(&self, request: &RequestDetails) -> Result<ResponseDetails, UpstreamError>;
}

/// Upstream for webserver deployments: every forward fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUpstream;

#[async_trait]
impl Upstream for NoUpstream {
    async fn forward(&self, _request: &RequestDetails) -> Result<ResponseDetails, UpstreamError> {
        Err(UpstreamError::Unavailable)
    }
}
