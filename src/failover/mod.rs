//! Failover subsystem.
//!
//! # Data Flow
//! ```text
//! HealthMonitor observation channel ─┐
//!                                    ├→ supervisor.rs (dedup by sequence)
//! periodic InstanceHealthView poll ──┘     → count consecutive sub-threshold scores
//!                                          → at max_failures: Selector::select_best
//!                                          → switch, or report no candidate
//! ```

pub mod supervisor;

pub use supervisor::{FailoverDecision, FailoverSupervisor, SupervisorState};
