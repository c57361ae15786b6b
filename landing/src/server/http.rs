//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling; requests are routed
//! through a plain `(Method, path)` match.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Args;
use crate::db::store::RecordStore;
use crate::relay::queue::JobStore;
use crate::routes;
use crate::types::LandingError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Primary store of catch records
    pub records: Arc<dyn RecordStore>,
    /// Relay queue
    pub jobs: Arc<dyn JobStore>,
    /// Whether the stores are MongoDB-backed (false = dev-mode memory)
    pub mongo_backed: bool,
}

impl AppState {
    pub fn new(
        args: Args,
        records: Arc<dyn RecordStore>,
        jobs: Arc<dyn JobStore>,
        mongo_backed: bool,
    ) -> Self {
        Self {
            args,
            records,
            jobs,
            mongo_backed,
        }
    }
}

/// Run the HTTP server until the process is stopped
pub async fn run(state: Arc<AppState>) -> Result<(), LandingError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Landing listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::POST, "/catches") => {
            let actor_header = req
                .headers()
                .get("x-actor-id")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            let max_bytes = state.args.max_body_bytes;
            if body_too_large(&req, max_bytes) {
                payload_too_large_response(max_bytes)
            } else {
                let body = req.into_body().collect().await?.to_bytes();
                if body.len() > max_bytes {
                    payload_too_large_response(max_bytes)
                } else {
                    routes::catches::handle_submit(state, actor_header, body).await
                }
            }
        }

        (Method::GET, p) if p.starts_with("/catches/") => {
            let catch_id = &p["/catches/".len()..];
            if catch_id.is_empty() || catch_id.contains('/') {
                not_found_response(p)
            } else {
                routes::catches::handle_get(state, catch_id).await
            }
        }

        (Method::GET, "/relay/jobs") => {
            let query = req.uri().query().map(|q| q.to_string());
            routes::relay_jobs::handle_list(state, query.as_deref()).await
        }

        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::status::handle_health().await
        }

        (Method::GET, "/status") => routes::status::handle_status(state).await,

        (_, p) => not_found_response(p),
    };

    Ok(to_boxed(response))
}

/// Whether the declared content length already exceeds the limit
fn body_too_large(req: &Request<Incoming>, max_bytes: usize) -> bool {
    req.headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .map(|len| len > max_bytes)
        .unwrap_or(false)
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response parts are valid")
}

/// Payload too large response
fn payload_too_large_response(max_bytes: usize) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Payload too large",
        "max_bytes": max_bytes,
    });

    Response::builder()
        .status(StatusCode::PAYLOAD_TOO_LARGE)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response parts are valid")
}
