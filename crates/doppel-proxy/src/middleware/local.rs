//! Local process middleware: the pair goes to stdin, the result comes from stdout.

use super::{decode_output, encode_input, MiddlewareError, MiddlewareRunner};
use crate::model::RequestResponsePair;
use async_trait::async_trait;
use std::io::Write;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

pub struct LocalMiddleware {
    binary: String,
    /// Script source written out for the binary; removed when dropped
    script: Option<TempPath>,
    timeout: Duration,
}

impl LocalMiddleware {
    /// Prepare a local middleware. A non-empty script is written to a private
    /// temporary file passed to the binary as its only argument.
    pub fn new(binary: &str, script: &str, timeout: Duration) -> Result<Self, MiddlewareError> {
        let script = if script.is_empty() {
            None
        } else {
            let mut file = tempfile::Builder::new()
                .prefix("doppel-middleware-")
                .tempfile()?;
            file.write_all(script.as_bytes())?;
            file.flush()?;
            Some(file.into_temp_path())
        };

        Ok(Self {
            binary: binary.to_string(),
            script,
            timeout,
        })
    }

    async fn run(&self, input: Vec<u8>) -> Result<std::process::Output, MiddlewareError> {
        let mut command = Command::new(&self.binary);
        if let Some(script) = &self.script {
            command.arg(script.as_os_str());
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MiddlewareError::BinaryNotFound(self.binary.clone())
                } else {
                    MiddlewareError::Io(e)
                }
            })?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A middleware may exit without reading its input; its exit status decides.
                let _ = stdin.write_all(&input).await;
            }
        };

        let ((), output) = tokio::join!(feed, child.wait_with_output());
        Ok(output?)
    }
}

#[async_trait]
impl MiddlewareRunner for LocalMiddleware {
    async fn execute(
        &self,
        pair: RequestResponsePair,
    ) -> Result<RequestResponsePair, MiddlewareError> {
        let input = encode_input(&pair)?;
        let start = Instant::now();

        let output = tokio::time::timeout(self.timeout, self.run(input))
            .await
            .map_err(|_| MiddlewareError::Timeout(start.elapsed()))??;

        if !output.status.success() {
            return Err(MiddlewareError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(
            binary = %self.binary,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Local middleware finished"
        );
        decode_output(&output.stdout)
    }

    fn describe(&self) -> String {
        format!("local:{}", self.binary)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::middleware::canary_pair;

    fn local(binary: &str, script: &str) -> LocalMiddleware {
        LocalMiddleware::new(binary, script, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_script_transforms_pair() {
        let middleware = local("sh", "sed 's/\"ok\"/\"OK\"/'");
        let pair = middleware.execute(canary_pair()).await.unwrap();
        assert_eq!(pair.response.body, "OK");
        assert_eq!(pair.request.destination, "www.test.com");
    }

    #[tokio::test]
    async fn test_identity_binary() {
        let middleware = local("cat", "");
        assert_eq!(middleware.execute(canary_pair()).await.unwrap(), canary_pair());
    }

    #[tokio::test]
    async fn test_script_file_is_removed_with_middleware() {
        let middleware = local("sh", "cat");
        let path = middleware.script.as_ref().unwrap().to_path_buf();
        assert!(path.exists());
        drop(middleware);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let middleware = local("/nonexistent/doppel-middleware", "");
        let err = middleware.execute(canary_pair()).await.unwrap_err();
        assert!(matches!(err, MiddlewareError::BinaryNotFound(_)));
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr() {
        let middleware = local("sh", "echo broken >&2; exit 3");
        match middleware.execute(canary_pair()).await.unwrap_err() {
            MiddlewareError::NonZeroExit { code, stderr } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_output() {
        let middleware = local("sh", "cat >/dev/null; echo notjson");
        assert!(matches!(
            middleware.execute(canary_pair()).await,
            Err(MiddlewareError::MalformedOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_kills_the_process() {
        let middleware = LocalMiddleware::new("sh", "sleep 5", Duration::from_millis(100)).unwrap();
        let start = Instant::now();
        let err = middleware.execute(canary_pair()).await.unwrap_err();
        assert!(matches!(err, MiddlewareError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
