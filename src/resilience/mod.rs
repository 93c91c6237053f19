//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Registry poll fails:
//!     → backoff.rs (next delay, doubled per consecutive failure, jittered)
//!     → poller sleeps, retries, keeps last good snapshot meanwhile
//! Registry poll succeeds:
//!     → backoff reset
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline (probe and registry timeouts)
//! - Jittered backoff prevents many routers hammering a recovering registry

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
