//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! monitor.rs (one loop per instance):
//!     Immediate first tick, then fixed interval
//!     → probe.rs (one bounded HTTP check, failures become score 0)
//!     → view.rs (latest observation per instance)
//!     → observation channel → failover supervisor
//!
//! Readers (selector, failover, admin API):
//!     view.rs effective health = live score, else advertised score
//! ```
//!
//! # Design Decisions
//! - One writer per instance; readers never lock
//! - No history: only the latest observation is kept
//! - Routing decisions never trigger a live check

pub mod monitor;
pub mod observation;
pub mod probe;
pub mod view;

pub use monitor::{HealthMonitor, MonitorHandle};
pub use observation::{HealthObservation, HealthStatus, ProbeMetrics};
pub use probe::{HealthProbe, HttpProbe};
pub use view::InstanceHealthView;
