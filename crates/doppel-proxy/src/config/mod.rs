//! Configuration types for doppel.

mod listen;

use crate::engine::EngineConfig;
use crate::middleware::MiddlewareConfig;
use crate::mode::Mode;
use crate::proxy::UpstreamProxy;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use listen::{ListenConfig, MetricsConfig};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Mode entered at startup
    #[serde(default)]
    pub mode: Mode,

    /// Serve stored templates only: no upstream, Capture refused
    #[serde(default)]
    pub webserver: bool,

    /// Regex over destinations the engine handles; others pass through
    #[serde(default = "default_destination")]
    pub destination: String,

    #[serde(default)]
    pub middleware: MiddlewareSection,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Simulation snapshot imported at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<String>,
}

fn default_destination() -> String {
    ".".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            metrics: MetricsConfig::default(),
            mode: Mode::default(),
            webserver: false,
            destination: default_destination(),
            middleware: MiddlewareSection::default(),
            cache: CacheConfig::default(),
            upstream: UpstreamConfig::default(),
            simulation: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MiddlewareSection {
    #[serde(default)]
    pub binary: String,
    /// Inline script source
    #[serde(default)]
    pub script: String,
    /// Script read from a file; exclusive with `script`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_file: Option<String>,
    #[serde(default)]
    pub remote: String,
    #[serde(default = "default_middleware_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_middleware_timeout_ms() -> u64 {
    10_000
}

impl Default for MiddlewareSection {
    fn default() -> Self {
        Self {
            binary: String::new(),
            script: String::new(),
            script_file: None,
            remote: String::new(),
            timeout_ms: default_middleware_timeout_ms(),
        }
    }
}

impl MiddlewareSection {
    /// Resolve the script source and build the middleware settings.
    pub fn resolve(&self) -> Result<MiddlewareConfig, anyhow::Error> {
        let script = match &self.script_file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read middleware script {}", path))?,
            None => self.script.clone(),
        };
        Ok(MiddlewareConfig::new(&self.binary, &script, &self.remote))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Headers always part of the request fingerprint
    #[serde(default)]
    pub significant_headers: Vec<String>,
    /// Cap on cached no-match outcomes (0 = unbounded)
    #[serde(default = "default_max_unmatched")]
    pub max_unmatched: usize,
}

fn default_max_unmatched() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            significant_headers: Vec::new(),
            max_unmatched: default_max_unmatched(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// HTTP proxy upstream traffic goes through, `http://[user:pass@]host:port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            proxy: None,
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.listen.socket_addr()?;

        if self.webserver && self.mode == Mode::Capture {
            anyhow::bail!("mode 'capture' needs an upstream and can't be used with webserver: true");
        }

        if regex::Regex::new(&self.destination).is_err() {
            anyhow::bail!(
                "destination '{}' is not a valid regular expression",
                self.destination
            );
        }

        let middleware = &self.middleware;
        if middleware.script_file.is_some() && !middleware.script.is_empty() {
            anyhow::bail!("middleware.script and middleware.script_file are mutually exclusive");
        }
        if middleware.timeout_ms == 0 {
            anyhow::bail!("middleware.timeout_ms must be greater than zero");
        }

        if let Some(proxy) = &self.upstream.proxy {
            if self.webserver {
                anyhow::bail!("upstream.proxy can't be used with webserver: true");
            }
            UpstreamProxy::parse(proxy)?;
        }

        if self.metrics.enabled && self.metrics.port == self.listen.port {
            anyhow::bail!(
                "metrics port {} collides with the listen port",
                self.metrics.port
            );
        }

        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            webserver: self.webserver,
            destination: self.destination.clone(),
            middleware_timeout: Duration::from_millis(self.middleware.timeout_ms),
            significant_headers: self.cache.significant_headers.clone(),
            max_unmatched: self.cache.max_unmatched,
            upstream_proxy: self.upstream.proxy.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse("{}");
        assert_eq!(config.listen.port, 8500);
        assert_eq!(config.mode, Mode::Simulate);
        assert_eq!(config.destination, ".");
        assert_eq!(config.middleware.timeout_ms, 10_000);
        assert_eq!(config.cache.max_unmatched, 10_000);
        assert!(config.upstream.proxy.is_none());
        assert!(!config.metrics.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_full_document() {
        let config = parse(
            r#"
listen:
  host: 127.0.0.1
  port: 9000
mode: capture
destination: "api\\.example\\.com"
middleware:
  binary: python3
  script: "import sys; print(sys.stdin.read())"
  timeout_ms: 2500
cache:
  significant_headers: [Accept, X-Tenant]
  max_unmatched: 500
upstream:
  request_timeout_ms: 1000
  proxy: "http://corp-proxy:3128"
simulation: ./sim.json
"#,
        );
        config.validate().unwrap();

        let engine = config.engine_config();
        assert!(!engine.webserver);
        assert_eq!(engine.destination, r"api\.example\.com");
        assert_eq!(engine.middleware_timeout, Duration::from_millis(2500));
        assert_eq!(engine.significant_headers, vec!["Accept", "X-Tenant"]);
        assert_eq!(engine.max_unmatched, 500);
        assert_eq!(engine.upstream_proxy.as_deref(), Some("http://corp-proxy:3128"));
        assert_eq!(config.upstream.request_timeout(), Duration::from_secs(1));
        assert_eq!(config.upstream.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.simulation.as_deref(), Some("./sim.json"));
    }

    #[test]
    fn test_validation_failures() {
        assert!(parse("webserver: true\nmode: capture").validate().is_err());
        assert!(parse("destination: '(unclosed'").validate().is_err());
        assert!(parse("middleware: {script: a, script_file: b}")
            .validate()
            .is_err());
        assert!(parse("listen: {host: 'not an ip'}").validate().is_err());
        assert!(parse("upstream: {proxy: 'socks5://corp:1080'}")
            .validate()
            .is_err());
        assert!(parse("webserver: true\nupstream: {proxy: 'http://corp:3128'}")
            .validate()
            .is_err());
        assert!(parse("metrics: {enabled: true, port: 8500}")
            .validate()
            .is_err());
    }

    #[test]
    fn test_unknown_mode_is_a_parse_error() {
        assert!(serde_yaml::from_str::<Config>("mode: replay").is_err());
    }

    #[test]
    fn test_script_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "cat").unwrap();

        let section = MiddlewareSection {
            binary: "sh".to_string(),
            script_file: Some(file.path().display().to_string()),
            ..Default::default()
        };
        let resolved = section.resolve().unwrap();
        assert_eq!(resolved.script, "cat");
        assert_eq!(resolved.binary, "sh");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode: simulate\nwebserver: true").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert!(config.webserver);

        assert!(Config::from_file("/nonexistent/doppel.yaml").is_err());
    }
}
