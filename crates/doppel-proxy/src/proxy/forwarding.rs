//! Upstream forwarding over a pooled hyper client.

use super::convert::{copy_forwardable, headers_from_map, upstream_request};
use super::upstream_proxy::{UpstreamConnector, UpstreamProxy};
use crate::config::UpstreamConfig;
use crate::engine::{Upstream, UpstreamError};
use crate::model::{encode_body, RequestDetails, ResponseDetails};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, PROXY_AUTHORIZATION};
use hyper::http::request::Parts;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Type alias for the HTTP client used for forwarding.
pub type HttpClient = Client<hyper_rustls::HttpsConnector<UpstreamConnector>, Full<Bytes>>;

/// Install ring as the process-wide rustls provider. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Forwards requests to the destination they name.
pub struct HyperUpstream {
    client: HttpClient,
    request_timeout: Duration,
    proxy: Option<UpstreamProxy>,
}

impl HyperUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, anyhow::Error> {
        install_crypto_provider();

        let mut http_connector = HttpConnector::new();
        http_connector.set_connect_timeout(Some(config.connect_timeout()));
        http_connector.enforce_http(false); // Allow both HTTP and HTTPS

        let proxy = config
            .proxy
            .as_deref()
            .map(UpstreamProxy::parse)
            .transpose()?;
        if let Some(proxy) = &proxy {
            info!("Forwarding upstream traffic through proxy {}", proxy.authority());
        }

        let builder = match hyper_rustls::HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                warn!("No native root certificates ({}); https upstreams will fail verification", e);
                let tls = rustls::ClientConfig::builder()
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth();
                hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls)
            }
        };
        let https_connector = builder
            .https_or_http()
            .enable_http1()
            .wrap_connector(UpstreamConnector::new(http_connector, proxy.clone()));

        let client = Client::builder(TokioExecutor::new()).build(https_connector);

        info!(
            "Upstream client configured (HTTP/1.1): connect_timeout={}ms, request_timeout={}ms",
            config.connect_timeout_ms, config.request_timeout_ms
        );

        Ok(Self {
            client,
            request_timeout: config.request_timeout(),
            proxy,
        })
    }

    /// Proxy upstream traffic goes through, as `host:port`.
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_ref().map(UpstreamProxy::authority)
    }

    /// Credentials for a proxy that sees the request itself (plain http).
    fn proxy_authorization(&self, request: &Request<Full<Bytes>>) -> Option<HeaderValue> {
        if request.uri().scheme_str() == Some("https") {
            return None;
        }
        self.proxy.as_ref()?.authorization().cloned()
    }

    async fn send(&self, mut request: Request<Full<Bytes>>) -> Result<Response<Bytes>, UpstreamError> {
        let destination = request
            .uri()
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let connect_error = |reason: String| UpstreamError::Connect {
            destination: destination.clone(),
            reason,
        };
        if let Some(value) = self.proxy_authorization(&request) {
            request.headers_mut().insert(PROXY_AUTHORIZATION, value);
        }

        let response = tokio::time::timeout(self.request_timeout, self.client.request(request))
            .await
            .map_err(|_| UpstreamError::Timeout(self.request_timeout))?
            .map_err(|e| connect_error(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| connect_error(e.to_string()))?
            .to_bytes();
        Ok(Response::from_parts(parts, body))
    }

    /// Forward an exchange the engine does not handle, byte for byte.
    pub async fn passthrough(
        &self,
        parts: &Parts,
        details: &RequestDetails,
        body: Bytes,
    ) -> Result<Response<Full<Bytes>>, UpstreamError> {
        let mut request = Request::new(Full::new(body));
        *request.method_mut() = parts.method.clone();
        *request.uri_mut() = super::convert::upstream_uri(details)?;
        copy_forwardable(&parts.headers, request.headers_mut());

        debug!("Passing through to {}", request.uri());
        let response = self.send(request).await?;

        let (parts, body) = response.into_parts();
        let mut response = Response::from_parts(parts, Full::new(body));
        response
            .headers_mut()
            .remove(hyper::header::TRANSFER_ENCODING);
        Ok(response)
    }
}

#[async_trait]
impl Upstream for HyperUpstream {
    async fn forward(&self, request: &RequestDetails) -> Result<ResponseDetails, UpstreamError> {
        let outbound = upstream_request(request)?;
        debug!("Forwarding to {}", outbound.uri());
        let response = self.send(outbound).await?;

        let (body, body_mode) = encode_body(response.body());
        Ok(ResponseDetails {
            status: response.status().as_u16(),
            headers: headers_from_map(response.headers()),
            body,
            body_mode,
            fixed_delay: None,
        })
    }
}
