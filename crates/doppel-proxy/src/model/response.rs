//! Response side of an exchange.

use super::body::{decode_body, BodyMode};
use super::request::Headers;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An HTTP response, either recorded, authored or produced by middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDetails {
    pub status: u16,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "BodyMode::is_text")]
    pub body_mode: BodyMode,
    #[serde(default)]
    pub headers: Headers,
    /// Fixed delay in milliseconds; takes the place of any response delay rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_delay: Option<u64>,
}

impl ResponseDetails {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Default::default()
        }
    }

    /// Add a header value, keeping values already present.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    /// Body bytes as they go on the wire.
    pub fn body_bytes(&self) -> Vec<u8> {
        decode_body(&self.body, self.body_mode)
    }

    pub fn fixed_delay(&self) -> Option<Duration> {
        self.fixed_delay.map(Duration::from_millis)
    }

    /// Whether the status code is a real HTTP status.
    pub fn has_valid_status(&self) -> bool {
        (100..=599).contains(&self.status)
    }
}
