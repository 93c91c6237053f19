//! Health-aware model instance router.
//!
//! Picks one model-serving instance for chat traffic, watches the health of
//! every registered instance and fails over when the active one degrades.

pub mod admin;
pub mod config;
pub mod failover;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod routing;

pub use config::RouterConfig;
pub use lifecycle::Shutdown;
pub use routing::RoutingController;
