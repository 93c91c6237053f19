//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → probe + controller → admin listener → poller, reload, admin tasks
//!
//! Shutdown (shutdown.rs):
//!     Trigger → background tasks exit → controller stops monitors → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{RouterApp, StartupError};
