//! Upstream transport: the retrying round trip and the shared clients.
//!
//! # Responsibilities
//! - Round-trip a request against the origin, retrying connection-level
//!   failures (dial, reset before headers, timeout before headers) with
//!   exponential backoff
//! - Pass every received HTTP response through untouched; retrying after
//!   the head has arrived would lose the body to the caller
//! - Construct the two shared clients: the long-lived streaming client
//!   and the short-dial resumption probe client
//!
//! # Design Decisions
//! - Two clients, not one: the probe client's aggressive connect timeout
//!   must not disturb the streaming client's pool
//! - Neither client carries a per-request deadline; a stitched response
//!   may take arbitrarily long

use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::{Client, Error as ClientError};
use hyper_util::rt::TokioExecutor;

use crate::config::TimeoutConfig;
use crate::http::director::UpstreamRequest;
use crate::resilience::{RetryPolicy, RetryState};

/// Idle connections kept around for re-dials during long transfers.
const POOL_MAX_IDLE_PER_HOST: usize = 500;

pub type ProbeClient = Client<HttpConnector, Full<Bytes>>;

/// The streaming client with connection-level retries.
#[derive(Clone)]
pub struct RetryingClient {
    inner: Client<HttpConnector, Full<Bytes>>,
    policy: RetryPolicy,
}

impl RetryingClient {
    /// Build the long-lived streaming client. Keep-alive stays on and the
    /// idle pool is large; transfers through this client can outlive many
    /// origin connections.
    pub fn new(timeouts: &TimeoutConfig, policy: RetryPolicy) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        connector.set_keepalive(Some(Duration::from_secs(30)));

        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.pool_idle_secs))
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build(connector);

        Self { inner, policy }
    }

    /// Round-trip the first attempt, retrying transport-level failures.
    ///
    /// Every error surfaced here precedes the response head, so retrying
    /// is safe. Client cancellation drops this future, which abandons the
    /// in-flight dial or backoff sleep promptly.
    pub async fn round_trip(
        &self,
        upstream: &UpstreamRequest,
    ) -> Result<hyper::Response<Incoming>, ClientError> {
        let mut retry = RetryState::new(&self.policy);
        loop {
            match self.inner.request(upstream.build()).await {
                Ok(response) => return Ok(response),
                Err(error) if !retry.exhausted(&self.policy) => {
                    tracing::info!(
                        error = %error,
                        url = %upstream.uri(),
                        delay_ms = retry.interval().as_millis() as u64,
                        "round trip failed, retrying after backoff"
                    );
                    tokio::time::sleep(retry.interval()).await;
                    retry.bump();
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Build the resumption probe client: its own pool, short connect
/// timeout, default sizing.
pub fn probe_client(timeouts: &TimeoutConfig) -> ProbeClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_secs(timeouts.probe_connect_secs)));

    Client::builder(TokioExecutor::new()).build(connector)
}
