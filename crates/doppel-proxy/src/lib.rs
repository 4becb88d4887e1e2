// Library exports for the binary and for integration tests

// ===== Engine core =====
pub mod cache;
pub mod delay;
pub mod engine;
pub mod error;
pub mod matching;
pub mod middleware;
pub mod mode;
pub mod model;
pub mod predicate;
pub mod store;

// ===== Ambient plumbing =====
pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod proxy;

pub use engine::{Engine, EngineConfig, NoUpstream, Outcome, Stats, Upstream, UpstreamError};
pub use error::EngineError;
pub use mode::Mode;
pub use model::{
    RequestDetails, RequestResponsePair, RequestTemplate, ResponseDetails, Simulation, TemplatePair,
};
