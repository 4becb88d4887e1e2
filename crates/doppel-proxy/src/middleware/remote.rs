//! Remote middleware: the pair is POSTed as JSON, the reply body is the result.

use super::{decode_output, encode_input, MiddlewareError, MiddlewareRunner};
use crate::model::RequestResponsePair;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct RemoteMiddleware {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl RemoteMiddleware {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, MiddlewareError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MiddlewareError::TransportError(e.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            client,
            timeout,
        })
    }
}

#[async_trait]
impl MiddlewareRunner for RemoteMiddleware {
    async fn execute(
        &self,
        pair: RequestResponsePair,
    ) -> Result<RequestResponsePair, MiddlewareError> {
        let input = encode_input(&pair)?;
        let start = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(input)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MiddlewareError::Timeout(self.timeout)
                } else {
                    MiddlewareError::TransportError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MiddlewareError::TransportError(format!(
                "{} answered {}",
                self.url, status
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                MiddlewareError::Timeout(self.timeout)
            } else {
                MiddlewareError::TransportError(e.to_string())
            }
        })?;

        debug!(
            url = %self.url,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Remote middleware answered"
        );
        decode_output(&body)
    }

    fn describe(&self) -> String {
        format!("remote:{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::canary_pair;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Nothing listens on the discard port.
        let middleware =
            RemoteMiddleware::new("http://127.0.0.1:9/process", Duration::from_secs(2)).unwrap();
        let err = middleware.execute(canary_pair()).await.unwrap_err();
        assert!(matches!(err, MiddlewareError::TransportError(_)));
    }

    #[test]
    fn test_describe_names_the_endpoint() {
        let middleware =
            RemoteMiddleware::new("http://localhost:8080/mw", Duration::from_secs(1)).unwrap();
        assert_eq!(middleware.describe(), "remote:http://localhost:8080/mw");
    }
}
