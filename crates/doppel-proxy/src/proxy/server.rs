//! HTTP/1.1 listener feeding the engine.

use super::convert::{error_response, into_hyper_response, request_details};
use super::forwarding::HyperUpstream;
use crate::engine::{Engine, Outcome};
use crate::metrics::collect_metrics;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

pub struct ProxyServer {
    listener: TcpListener,
    engine: Arc<Engine>,
    /// Used for exchanges the engine passes through; absent in webserver deployments
    passthrough: Option<Arc<HyperUpstream>>,
}

impl ProxyServer {
    pub async fn bind(
        addr: SocketAddr,
        engine: Arc<Engine>,
        passthrough: Option<Arc<HyperUpstream>>,
    ) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
        Ok(Self {
            listener,
            engine,
            passthrough,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), anyhow::Error> {
        let addr = self.local_addr()?;
        info!(
            "Listening on http://{} (mode: {}, webserver: {})",
            addr,
            self.engine.mode(),
            self.engine.is_webserver()
        );

        let handler = Arc::new(Handler {
            engine: self.engine,
            passthrough: self.passthrough,
        });
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    let handler = Arc::clone(&handler);

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let handler = Arc::clone(&handler);
                            async move { Ok::<_, Infallible>(handler.handle(req).await) }
                        });

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            debug!("Error serving connection from {}: {}", remote_addr, err);
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Proxy listener on {} shutting down", addr);
                    return Ok(());
                }
            }
        }
    }
}

struct Handler {
    engine: Arc<Engine>,
    passthrough: Option<Arc<HyperUpstream>>,
}

impl Handler {
    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        if req.method() == Method::CONNECT {
            return error_response(
                StatusCode::NOT_IMPLEMENTED,
                "CONNECT tunnelling is not supported",
            );
        }

        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("Failed to read request body: {}", e);
                return error_response(StatusCode::BAD_REQUEST, "unreadable request body");
            }
        };
        let details = request_details(&parts, &body);

        match self.engine.handle(details.clone()).await {
            Outcome::Respond(response) => into_hyper_response(response),
            Outcome::Forward => match &self.passthrough {
                Some(upstream) => match upstream.passthrough(&parts, &details, body).await {
                    Ok(response) => response,
                    Err(e) => {
                        error!("Passthrough to {} failed: {}", details.destination, e);
                        error_response(StatusCode::BAD_GATEWAY, &format!("upstream failed: {e}"))
                    }
                },
                None => error_response(
                    StatusCode::BAD_GATEWAY,
                    "no upstream available for passthrough",
                ),
            },
        }
    }
}

/// Serve `GET /metrics` until `shutdown` resolves.
pub async fn serve_metrics(
    addr: SocketAddr,
    shutdown: impl Future<Output = ()>,
) -> Result<(), anyhow::Error> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind metrics listener {}: {}", addr, e))?;
    info!("Metrics available at http://{}/metrics", addr);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let Ok((stream, _)) = accepted else { continue };
                tokio::spawn(async move {
                    let service = service_fn(|req: Request<Incoming>| async move {
                        let response = if req.method() == Method::GET && req.uri().path() == "/metrics" {
                            Response::new(Full::new(Bytes::from(collect_metrics())))
                        } else {
                            error_response(StatusCode::NOT_FOUND, "not found")
                        };
                        Ok::<_, Infallible>(response)
                    });
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!("Error serving metrics connection: {}", err);
                    }
                });
            }
            _ = &mut shutdown => return Ok(()),
        }
    }
}
