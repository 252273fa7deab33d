//! Resuming reverse HTTP proxy.
//!
//! Sits in front of a single upstream origin and hides transient
//! failures from clients. When an upstream connection dies after part of
//! the response body has been flushed, the proxy reconnects, issues a
//! byte-range continuation request, validates that the resource has not
//! changed (ETag continuity), and resumes streaming on the same client
//! socket. The client sees one HTTP response even when the proxy
//! stitched it together from many upstream attempts.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌────────────────────────────────────────────────┐
//!                    │                RESUMING PROXY                   │
//!  Client Request    │  ┌─────────┐   ┌─────────┐   ┌──────────────┐ │
//!  ──────────────────┼─▶│   net   │──▶│  http   │──▶│  resumption  │ │
//!                    │  │listener │   │ server  │   │  controller  │ │
//!                    │  └─────────┘   └─────────┘   └──────┬───────┘ │
//!                    │                                      │         │
//!                    │                              ┌───────▼──────┐  │
//!                    │                              │   director   │  │
//!                    │                              └───────┬──────┘  │
//!  Client Response   │  ┌───────────┐                ┌──────▼──────┐  │
//!  ◀─────────────────┼──│interceptor│◀───────────────│  retrying   │◀─┼── Upstream
//!                    │  │  (sink)   │                │  transport  │  │     Origin
//!                    │  └───────────┘                └─────────────┘  │
//!                    │                                                │
//!                    │  config · lifecycle · resilience (cross-cutting)│
//!                    └────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod resilience;

pub use config::{load_config, validate_config, ProxyConfig};
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
pub use net::Listener;
pub use resilience::RetryPolicy;
