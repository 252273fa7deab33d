//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! First attempt (transport.rs):
//!     → connection-level failure → RetryState (backoff.rs), bounded by RetryPolicy
//! Mid-stream failure (resume.rs):
//!     → independent RetryState with the same policy shape
//! ```
//!
//! # Design Decisions
//! - The connection-level and mid-stream retry loops never share a counter;
//!   each carries its own `RetryState`
//! - Backoff is plain exponential doubling, no jitter
//! - The mid-stream loop may reset its state on sustained forward progress

pub mod backoff;

pub use backoff::{RetryPolicy, RetryState};
