//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Construct server → Bind listener → Accept
//!
//! Shutdown (shutdown.rs):
//!     close() triggered → accept loop unblocks → run() returns Ok
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Close is idempotent; the accept loop treats it as normal shutdown

pub mod shutdown;

pub use shutdown::Shutdown;
