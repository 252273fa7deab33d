//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, per-connection serve, proxy handler)
//!     → resume.rs (first attempt, failure decision, resumption loop)
//!     → director.rs (rewrite request for the upstream)
//!     → transport.rs (retrying round trip, shared clients)
//!     → interceptor.rs (client-bound body sink, bytes-written accounting)
//!     → Send to client
//! ```
//!
//! recover.rs wraps the attempt futures so a panic surfaces as an abort
//! error instead of tearing down the connection task.

pub mod director;
pub mod interceptor;
pub mod recover;
pub mod resume;
pub mod server;
pub mod transport;

pub use server::ProxyServer;
