//! Shared configuration, error types, IDs, and observability primitives for Rill crates.
//!
//! Architecture role:
//! - defines engine configuration passed across layers
//! - provides the common [`RillError`] / [`Result`] contracts
//! - hosts prometheus metrics and tracing setup
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`logging`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod ids;
pub mod logging;
pub mod metrics;

pub use config::EngineConfig;
pub use error::{Result, RillError};
pub use ids::*;
pub use logging::init_tracing;
pub use metrics::{MetricsRegistry, OperatorSample, global_metrics};
