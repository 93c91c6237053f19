//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Registry snapshot + InstanceHealthView
//!     → filter: active && effective health > threshold
//!     → select_next: round-robin cursor over the filtered list
//!     → select_best: healthiest candidate, excluding the failing instance
//! ```
//!
//! # Design Decisions
//! - Selection reads cached health only, never probes inline
//! - An empty candidate list is returned as `None`, never a stale pick

pub mod selector;

pub use selector::{is_eligible, Selector};
