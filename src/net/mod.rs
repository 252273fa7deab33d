//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, accept)
//!     → Hand off to HTTP layer (per-connection task)
//! ```

pub mod listener;

pub use listener::{Listener, ListenerError};
