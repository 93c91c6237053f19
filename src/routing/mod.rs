//! Routing subsystem (composition root).
//!
//! # Data Flow
//! ```text
//! Registry snapshot → sync_instances
//!     → one HealthMonitor per instance (start / restart / stop)
//!     → InstanceHealthView
//!
//! Rotation loop (immediately, then every rotation interval):
//!     Selector::select_next → publish current instance
//!
//! Failover loop:
//!     monitor observation channel + periodic view poll
//!     → FailoverSupervisor::observe → switch / outage / recovery
//!     → publish current instance
//!
//! Consumers:
//!     current_instance(), health_snapshot(), subscribe(), on_instance_changed()
//! ```
//!
//! # Design Decisions
//! - All changes to the published instance go through one lock-held path
//! - Consumers are notified over a broadcast channel, never re-entrantly
//! - No instance is published while none qualifies; callers get `None`

pub mod controller;

pub use controller::{
    ChangeReason, InstanceChange, RoutingController, RoutingError, RoutingSettings, RoutingStatus,
};
