//! HTTP server shell.
//!
//! # Responsibilities
//! - Build the Axum router and wire up middleware (tracing, request ID)
//! - Construct the shared upstream clients once at startup
//! - Accept connections and serve HTTP/1.1 and HTTP/2 per connection
//! - Dispatch every request into the resumption controller
//! - Treat a triggered close as normal shutdown of the accept loop
//!
//! # Design Decisions
//! - Connections are served manually (hyper auto builder) rather than
//!   through `axum::serve`, so the header-size cap and the
//!   close-unblocks-accept contract stay explicit
//! - No request timeout layer: a stitched response has no deadline

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tower::ServiceExt;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use url::Url;

use crate::config::ProxyConfig;
use crate::http::director::{DirectorError, UpstreamTarget};
use crate::http::resume;
use crate::http::transport::{probe_client, ProbeClient, RetryingClient};
use crate::lifecycle::Shutdown;
use crate::net::Listener;
use crate::resilience::RetryPolicy;

/// Maximum size of a request head the server will buffer.
const MAX_HEADER_BYTES: usize = 50 << 20;

/// Error type for server construction.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("upstream URL does not parse: {0}")]
    UpstreamUrl(#[from] url::ParseError),
    #[error(transparent)]
    Director(#[from] DirectorError),
}

/// Application state injected into the proxy handler.
#[derive(Clone)]
pub struct AppState {
    /// The upstream origin, parsed once.
    pub target: Arc<UpstreamTarget>,
    /// Long-lived streaming client with connection-level retries.
    pub streaming: RetryingClient,
    /// Short-dial client for resumption requests.
    pub probe: ProbeClient,
    /// Retry policy shared by both retry loops.
    pub policy: RetryPolicy,
}

/// HTTP server for the resuming proxy.
pub struct ProxyServer {
    router: Router,
    shutdown: Shutdown,
}

impl ProxyServer {
    /// Construct the server. Fails when the upstream URL does not parse
    /// into a usable origin.
    pub fn new(config: &ProxyConfig) -> Result<Self, ServerError> {
        let upstream = Url::parse(&config.upstream.url)?;
        let target = Arc::new(UpstreamTarget::from_url(&upstream)?);
        let policy = RetryPolicy::from_config(&config.retries);

        let state = AppState {
            target,
            streaming: RetryingClient::new(&config.timeouts, policy),
            probe: probe_client(&config.timeouts),
            policy,
        };

        Ok(Self {
            router: Self::build_router(state),
            shutdown: Shutdown::new(),
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
    }

    /// Handle used to close the server; cloneable, idempotent.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run the server on the given listener until closed.
    ///
    /// A triggered shutdown unblocks the accept loop and returns Ok;
    /// in-flight connections finish on their own tasks.
    pub async fn run(self, listener: Listener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder.http1().max_buf_size(MAX_HEADER_BYTES);
        builder
            .http2()
            .max_header_list_size(MAX_HEADER_BYTES as u32);
        let builder = Arc::new(builder);

        let mut closing = self.shutdown.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _peer)) => {
                            let router = self.router.clone();
                            let builder = builder.clone();
                            tokio::spawn(async move {
                                let service = service_fn(move |request: hyper::Request<Incoming>| {
                                    router.clone().oneshot(request.map(Body::new))
                                });
                                let io = TokioIo::new(stream);
                                if let Err(error) =
                                    builder.serve_connection_with_upgrades(io, service).await
                                {
                                    tracing::debug!(error = %error, "connection closed with error");
                                }
                            });
                        }
                        Err(error) => {
                            if self.shutdown.is_triggered() {
                                break;
                            }
                            tracing::warn!(error = %error, "accept failed");
                        }
                    }
                }
                _ = closing.recv() => break,
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler: every request goes through the resumption
/// controller. Errors never escape to the accept loop.
async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let url = request.uri().clone();
    match resume::serve_resumable(state, request).await {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(url = %url, error = %error, "proxy request failed");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
