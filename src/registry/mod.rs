//! Instance registry integration.
//!
//! # Data Flow
//! ```text
//! External registry (HTTP) or [[registry.instances]] in config
//!     → client.rs (list_instances, envelope decoding)
//!     → poller.rs (fixed period, backoff on failure)
//!     → RoutingController::sync_instances
//! ```
//!
//! # Design Decisions
//! - The registry owns instances; routing only holds snapshots
//! - A failed poll never clears the last good snapshot

pub mod client;
pub mod instance;
pub mod poller;

pub use client::{decode_instances, HttpRegistry, InstanceRegistry, RegistryError, StaticRegistry};
pub use instance::{sanitize_snapshot, Instance, InstanceId, ModelMetadata};
pub use poller::RegistryPoller;
