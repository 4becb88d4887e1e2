//! External transformation step over request/response pairs.
//!
//! A middleware is either a local process (binary, optionally interpreting a
//! script) or a remote HTTP endpoint. Both speak the same contract: a JSON
//! serialized `RequestResponsePair` in, a pair of the same shape out.

mod error;
mod local;
mod remote;

pub use error::MiddlewareError;
pub use local::LocalMiddleware;
pub use remote::RemoteMiddleware;

use crate::model::{Headers, RequestDetails, RequestResponsePair, ResponseDetails};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default bound on one middleware execution.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Executes one transformation.
#[async_trait]
pub trait MiddlewareRunner: Send + Sync {
    async fn execute(&self, pair: RequestResponsePair)
        -> Result<RequestResponsePair, MiddlewareError>;

    /// Human readable target, for logs.
    fn describe(&self) -> String;
}

/// Middleware settings as supplied by the administrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    #[serde(default)]
    pub binary: String,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub remote: String,
}

impl MiddlewareConfig {
    pub fn new(binary: &str, script: &str, remote: &str) -> Self {
        Self {
            binary: binary.to_string(),
            script: script.to_string(),
            remote: remote.to_string(),
        }
    }

    /// All three empty: middleware disabled.
    pub fn is_empty(&self) -> bool {
        self.binary.is_empty() && self.script.is_empty() && self.remote.is_empty()
    }

    /// Structural checks that need no execution.
    pub fn validate(&self) -> Result<(), MiddlewareError> {
        if !self.script.is_empty() && self.binary.is_empty() {
            return Err(MiddlewareError::ScriptWithoutBinary);
        }
        if !self.binary.is_empty() && !self.remote.is_empty() {
            return Err(MiddlewareError::ConflictingTargets);
        }
        Ok(())
    }
}

/// An installed middleware: its configuration and the runner that executes it.
pub struct Middleware {
    config: MiddlewareConfig,
    runner: Arc<dyn MiddlewareRunner>,
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware")
            .field("config", &self.config)
            .field("runner", &self.runner.describe())
            .finish()
    }
}

impl Middleware {
    /// Build the runner a configuration describes, or `None` when it is empty.
    /// Nothing is executed here; see `Middleware::validate`.
    pub fn from_config(
        config: MiddlewareConfig,
        timeout: Duration,
    ) -> Result<Option<Self>, MiddlewareError> {
        if config.is_empty() {
            return Ok(None);
        }
        config.validate()?;

        let runner: Arc<dyn MiddlewareRunner> = if config.remote.is_empty() {
            Arc::new(LocalMiddleware::new(&config.binary, &config.script, timeout)?)
        } else {
            Arc::new(RemoteMiddleware::new(&config.remote, timeout)?)
        };
        Ok(Some(Self { config, runner }))
    }

    /// Wrap a custom runner.
    pub fn with_runner(config: MiddlewareConfig, runner: Arc<dyn MiddlewareRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &MiddlewareConfig {
        &self.config
    }

    pub async fn execute(
        &self,
        pair: RequestResponsePair,
    ) -> Result<RequestResponsePair, MiddlewareError> {
        self.runner.execute(pair).await
    }

    /// Run the canary exchange once. A middleware that fails it is never installed.
    pub async fn validate(&self) -> Result<(), MiddlewareError> {
        self.execute(canary_pair()).await?;
        info!(target = %self.runner.describe(), "Middleware passed canary");
        Ok(())
    }
}

/// Fixed synthetic exchange used to validate a configuration.
pub fn canary_pair() -> RequestResponsePair {
    let test_header = || Headers::from([("test_header".to_string(), vec!["true".to_string()])]);
    RequestResponsePair {
        request: RequestDetails {
            path: "/".to_string(),
            method: "GET".to_string(),
            destination: "www.test.com".to_string(),
            headers: test_header(),
            ..Default::default()
        },
        response: ResponseDetails {
            status: 200,
            body: "ok".to_string(),
            headers: test_header(),
            ..Default::default()
        },
    }
}

/// Serialize the pair handed to a middleware.
pub fn encode_input(pair: &RequestResponsePair) -> Result<Vec<u8>, MiddlewareError> {
    serde_json::to_vec(pair).map_err(|e| MiddlewareError::InvalidInput(e.to_string()))
}

/// Parse middleware output into a pair with a usable status.
pub fn decode_output(bytes: &[u8]) -> Result<RequestResponsePair, MiddlewareError> {
    let pair: RequestResponsePair = serde_json::from_slice(bytes)
        .map_err(|e| MiddlewareError::MalformedOutput(e.to_string()))?;
    if !pair.response.has_valid_status() {
        return Err(MiddlewareError::MalformedOutput(format!(
            "response status {} is not an HTTP status",
            pair.response.status
        )));
    }
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_disables_middleware() {
        let middleware = Middleware::from_config(MiddlewareConfig::default(), DEFAULT_TIMEOUT);
        assert!(middleware.unwrap().is_none());
    }

    #[test]
    fn test_script_requires_binary() {
        let err = Middleware::from_config(MiddlewareConfig::new("", "cat", ""), DEFAULT_TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, MiddlewareError::ScriptWithoutBinary));
    }

    #[test]
    fn test_binary_and_remote_conflict() {
        let err = Middleware::from_config(
            MiddlewareConfig::new("cat", "", "http://localhost:9000"),
            DEFAULT_TIMEOUT,
        )
        .unwrap_err();
        assert!(matches!(err, MiddlewareError::ConflictingTargets));
    }

    #[test]
    fn test_encoded_input_decodes_as_output() {
        let input = encode_input(&canary_pair()).unwrap();
        assert_eq!(decode_output(&input).unwrap(), canary_pair());
        assert_eq!(
            MiddlewareError::InvalidInput("x".to_string()).kind(),
            "invalid_input"
        );
    }

    #[test]
    fn test_decode_output_rejects_bad_pairs() {
        assert!(matches!(
            decode_output(b"notjson"),
            Err(MiddlewareError::MalformedOutput(_))
        ));
        assert!(matches!(
            decode_output(br#"{"request": {}}"#),
            Err(MiddlewareError::MalformedOutput(_))
        ));
        assert!(matches!(
            decode_output(br#"{"request": {}, "response": {"status": 42}}"#),
            Err(MiddlewareError::MalformedOutput(_))
        ));

        let pair = decode_output(br#"{"request": {}, "response": {"status": 201}}"#).unwrap();
        assert_eq!(pair.response.status, 201);
    }

    #[test]
    fn test_canary_pair_shape() {
        let canary = canary_pair();
        assert_eq!(canary.request.method, "GET");
        assert_eq!(canary.request.destination, "www.test.com");
        assert_eq!(
            canary.request.header_values("test_header"),
            Some(&["true".to_string()][..])
        );
        assert_eq!(canary.response.body, "ok");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_validate_runs_canary() {
        let ok = Middleware::from_config(MiddlewareConfig::new("cat", "", ""), DEFAULT_TIMEOUT)
            .unwrap()
            .unwrap();
        ok.validate().await.unwrap();

        let failing =
            Middleware::from_config(MiddlewareConfig::new("false", "", ""), DEFAULT_TIMEOUT)
                .unwrap()
                .unwrap();
        assert!(matches!(
            failing.validate().await,
            Err(MiddlewareError::NonZeroExit { code: 1, .. })
        ));
    }
}
