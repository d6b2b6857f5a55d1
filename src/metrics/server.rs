//! `/metrics` HTTP endpoint.
//!
//! - `GET /metrics` → registry in Prometheus text format
//! - `GET /health`  → `OK`
//! - anything else  → 404

use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::encode;

/// Running endpoint. Stops when its token is cancelled.
pub struct MetricsServer {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl MetricsServer {
    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the server task to finish.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Binds `addr` and serves `registry` until `token` is cancelled.
///
/// Binding happens before this returns, so an occupied port is reported to the caller.
pub fn serve_metrics(
    addr: SocketAddr,
    registry: Registry,
    token: CancellationToken,
) -> Result<MetricsServer, hyper::Error> {
    let make_svc = make_service_fn(move |_conn| {
        let registry = registry.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let registry = registry.clone();
                async move { Ok::<_, Infallible>(respond(&req, &registry)) }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    let local_addr = server.local_addr();
    tracing::info!(%local_addr, "serving metrics at /metrics");

    let server = server.with_graceful_shutdown(async move { token.cancelled().await });
    let task = tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!(error = %e, "metrics server stopped");
        }
    });

    Ok(MetricsServer { local_addr, task })
}

fn respond(req: &Request<Body>, registry: &Registry) -> Response<Body> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => match encode(registry) {
            Ok(text) => {
                let mut resp = Response::new(Body::from(text));
                if let Ok(value) = HeaderValue::from_str(TextEncoder::new().format_type()) {
                    resp.headers_mut().insert(CONTENT_TYPE, value);
                }
                resp
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to encode metrics");
                status(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics")
            }
        },
        (&Method::GET, "/health") => status(StatusCode::OK, "OK"),
        _ => status(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn status(code: StatusCode, body: &'static str) -> Response<Body> {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = code;
    resp
}
