//! Body encoding: UTF-8 bodies are kept as text, anything else as base64.

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How a body string maps back to bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyMode {
    /// Body is UTF-8 text (default)
    #[default]
    Text,
    /// Body is base64-encoded binary data
    Binary,
}

impl BodyMode {
    pub fn is_text(&self) -> bool {
        *self == BodyMode::Text
    }
}

/// Body string and mode for bytes received on the wire.
pub fn encode_body(bytes: &[u8]) -> (String, BodyMode) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), BodyMode::Text),
        Err(_) => (
            base64::engine::general_purpose::STANDARD.encode(bytes),
            BodyMode::Binary,
        ),
    }
}

/// Bytes to put on the wire. A binary body that is not valid base64 is sent as its text.
pub fn decode_body(body: &str, mode: BodyMode) -> Vec<u8> {
    match mode {
        BodyMode::Text => body.as_bytes().to_vec(),
        BodyMode::Binary => match base64::engine::general_purpose::STANDARD.decode(body) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Failed to decode base64 body: {}, using raw body", e);
                body.as_bytes().to_vec()
            }
        },
    }
}
