//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the resuming proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind host and port).
    pub listener: ListenerConfig,

    /// Upstream origin the proxy fronts.
    pub upstream: UpstreamConfig,

    /// Retry policy, applied independently to connection-level failures
    /// and to mid-stream resumption.
    pub retries: RetryConfig,

    /// Timeout configuration for the upstream clients.
    pub timeouts: TimeoutConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind. Empty means all interfaces.
    pub host: String,

    /// TCP port to bind.
    pub port: u16,
}

impl ListenerConfig {
    /// The `host:port` string to bind, mapping the empty host to all
    /// interfaces.
    pub fn bind_address(&self) -> String {
        if self.host.is_empty() {
            format!("0.0.0.0:{}", self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8080,
        }
    }
}

/// Upstream origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Origin base URL (scheme + host + optional path prefix). Required.
    pub url: String,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries per request at each layer.
    pub max_attempts: u32,

    /// Starting backoff interval in milliseconds; doubles per retry.
    pub initial_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_interval_ms: 50,
        }
    }
}

/// Timeout configuration for the two upstream clients.
///
/// There is deliberately no per-request deadline: a stitched-together
/// response may take arbitrarily long, and availability is preferred
/// over latency.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connect timeout for the streaming client, in seconds.
    pub connect_secs: u64,

    /// Connect timeout for the resumption probe client, in seconds.
    /// Kept short so a dead upstream fails a continuation attempt fast.
    pub probe_connect_secs: u64,

    /// Idle timeout for pooled upstream connections, in seconds.
    pub pool_idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            probe_connect_secs: 5,
            pool_idle_secs: 300,
        }
    }
}
