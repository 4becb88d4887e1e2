//! The request handling engine and its administrative surface.
//!
//! One `Engine` owns every piece of mutable state: the mode, the middleware,
//! the destination filter, the interaction store and the request cache.
//! Request handling lives in `handler`.

mod handler;
mod stats;
mod upstream;


pub use handler::{Outcome, ERROR_HEADER};
pub use stats::Stats;
pub use upstream::{NoUpstream, Upstream, UpstreamError};

use crate::cache::{CacheEntryView, RequestCache};
use crate::delay::ResponseDelay;
use crate::error::EngineError;
use crate::middleware::{self, Middleware, MiddlewareConfig};
use crate::mode::{Mode, ModeController};
use crate::model::{Simulation, SCHEMA_VERSION};
use crate::store::InteractionStore;
use parking_lot::RwLock;
use regex::Regex;
use stats::Counters;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Construction-time settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pure webserver: no upstream, Capture refused, destination filter ignored
    pub webserver: bool,
    /// Regex over request destinations the engine handles
    pub destination: String,
    pub middleware_timeout: Duration,
    /// Headers that always take part in request fingerprints
    pub significant_headers: Vec<String>,
    /// Cap on cached no-match outcomes (0 = unbounded)
    pub max_unmatched: usize,
    /// HTTP proxy the upstream client forwards through
    pub upstream_proxy: Option<String>,
    /// Producer version written into exported simulations
    pub version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            webserver: false,
            destination: ".".to_string(),
            middleware_timeout: middleware::DEFAULT_TIMEOUT,
            significant_headers: Vec::new(),
            max_unmatched: 0,
            upstream_proxy: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Destination {
    pattern: String,
    regex: Regex,
}

impl Destination {
    fn compile(pattern: &str) -> Result<Self, EngineError> {
        let regex = Regex::new(pattern)
            .map_err(|e| EngineError::InvalidDestination(format!("{pattern:?}: {e}")))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    fn matches(&self, destination: &str) -> bool {
        self.regex.is_match(destination)
    }
}

/// Settings read at the start of every exchange and changed only by
/// administrative calls, under one lock.
#[derive(Debug, Clone)]
struct Settings {
    mode: Mode,
    middleware: Option<Arc<Middleware>>,
    destination: Destination,
}

pub struct Engine {
    settings: RwLock<Settings>,
    modes: ModeController,
    store: InteractionStore,
    cache: RequestCache,
    upstream: Arc<dyn Upstream>,
    counters: Counters,
    significant_headers: BTreeSet<String>,
    middleware_timeout: Duration,
    upstream_proxy: Option<String>,
    version: String,
}

impl Engine {
    /// New engine in Simulate mode with an empty store and no middleware.
    pub fn new(config: EngineConfig, upstream: Arc<dyn Upstream>) -> Result<Self, EngineError> {
        let destination = Destination::compile(&config.destination)?;
        Ok(Self {
            settings: RwLock::new(Settings {
                mode: Mode::default(),
                middleware: None,
                destination,
            }),
            modes: ModeController::new(config.webserver),
            store: InteractionStore::new(),
            cache: RequestCache::with_max_unmatched(config.max_unmatched),
            upstream,
            counters: Counters::default(),
            significant_headers: config
                .significant_headers
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            middleware_timeout: config.middleware_timeout,
            upstream_proxy: config.upstream_proxy,
            version: config.version,
        })
    }

    pub fn is_webserver(&self) -> bool {
        self.modes.is_webserver()
    }

    pub fn mode(&self) -> Mode {
        self.settings.read().mode
    }

    /// Change the mode. Entering Capture flushes the cache before any further
    /// exchange can start.
    pub fn set_mode(&self, candidate: &str) -> Result<Mode, EngineError> {
        let mut settings = self.settings.write();
        let transition = self.modes.transition(settings.mode, candidate)?;
        if transition.flush_cache {
            self.cache.flush();
        }
        if transition.needs_middleware && settings.middleware.is_none() {
            warn!(mode = %transition.to, "No middleware installed; requests will fail until one is set");
        }
        settings.mode = transition.to;
        info!(from = %transition.from, to = %transition.to, "Mode changed");
        Ok(transition.to)
    }

    /// Proxy upstream traffic is routed through, if any.
    pub fn upstream_proxy(&self) -> Option<&str> {
        self.upstream_proxy.as_deref()
    }

    pub fn destination(&self) -> String {
        self.settings.read().destination.pattern.clone()
    }

    pub fn set_destination(&self, pattern: &str) -> Result<(), EngineError> {
        let destination = Destination::compile(pattern)?;
        self.settings.write().destination = destination;
        info!(destination = pattern, "Destination filter changed");
        Ok(())
    }

    /// Active middleware configuration; all empty when none is installed.
    pub fn middleware(&self) -> MiddlewareConfig {
        self.settings
            .read()
            .middleware
            .as_ref()
            .map(|m| m.config().clone())
            .unwrap_or_default()
    }

    /// Replace the middleware. The new configuration must pass the canary
    /// exchange first; on any failure the previous middleware stays active.
    /// All three empty removes the middleware without validation.
    pub async fn set_middleware(
        &self,
        binary: &str,
        script: &str,
        remote: &str,
    ) -> Result<(), EngineError> {
        let config = MiddlewareConfig::new(binary, script, remote);
        match Middleware::from_config(config, self.middleware_timeout)? {
            Some(middleware) => self.install_middleware(middleware).await,
            None => {
                self.delete_middleware();
                Ok(())
            }
        }
    }

    /// Validate and install an already built middleware.
    pub async fn install_middleware(&self, middleware: Middleware) -> Result<(), EngineError> {
        // The canary runs without the settings lock held.
        middleware.validate().await?;
        let config = middleware.config().clone();
        self.settings.write().middleware = Some(Arc::new(middleware));
        info!(
            binary = %config.binary,
            remote = %config.remote,
            script = !config.script.is_empty(),
            "Middleware installed"
        );
        Ok(())
    }

    pub fn delete_middleware(&self) {
        if self.settings.write().middleware.take().is_some() {
            info!("Middleware removed");
        }
    }

    pub fn response_delays(&self) -> Vec<ResponseDelay> {
        self.store.delays()
    }

    pub fn set_response_delays(&self, delays: Vec<ResponseDelay>) -> Result<(), EngineError> {
        let count = delays.len();
        self.store.set_delays(delays)?;
        info!("Response delays set: {} rules", count);
        Ok(())
    }

    pub fn delete_response_delays(&self) {
        // An empty list always compiles.
        let _ = self.store.set_delays(Vec::new());
        info!("Response delays deleted");
    }

    /// Export the store as a snapshot.
    pub fn simulation(&self) -> Simulation {
        let snapshot = self.store.snapshot();
        Simulation::new(
            snapshot.templates.iter().map(|t| t.pair.clone()).collect(),
            snapshot.delays.rules(),
            &self.version,
        )
    }

    /// Replace templates and delays with a snapshot's, then flush the cache.
    /// A snapshot that fails validation changes nothing.
    pub fn put_simulation(&self, simulation: Simulation) -> Result<(), EngineError> {
        if simulation.meta.schema_version != SCHEMA_VERSION {
            return Err(EngineError::UnsupportedSchema(
                simulation.meta.schema_version,
            ));
        }
        self.store.replace(
            simulation.data.pairs,
            simulation.data.global_actions.delays,
        )?;
        self.cache.flush();
        Ok(())
    }

    pub fn delete_simulation(&self) {
        self.store.clear();
        self.cache.flush();
    }

    pub fn cache_entries(&self) -> Vec<CacheEntryView> {
        self.cache.entries()
    }

    pub fn cache_count(&self) -> usize {
        self.cache.len()
    }

    pub fn flush_cache(&self) {
        self.cache.flush();
    }

    pub fn template_count(&self) -> usize {
        self.store.len()
    }

    pub fn stats(&self) -> Stats {
        self.counters.snapshot()
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}
