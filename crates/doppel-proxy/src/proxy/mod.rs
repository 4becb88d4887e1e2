//! Thin HTTP transport around the engine.
//!
//! Plain HTTP/1.1 only: absolute-form proxy requests and origin-form
//! webserver requests. TLS interception is not provided.

pub mod convert;
mod forwarding;
mod server;
mod upstream_proxy;

pub use forwarding::{install_crypto_provider, HttpClient, HyperUpstream};
pub use server::{serve_metrics, ProxyServer};
pub use upstream_proxy::{UpstreamConnector, UpstreamProxy};
