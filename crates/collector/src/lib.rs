//! OS metric sources that feed Rill graphs.
//!
//! Architecture role:
//! - one polling contract ([`MetricSource`]) for kernel counters
//! - adapter turning a source into a graph [`rill_execution::BatchGenerator`]
//!
//! Key modules:
//! - [`source`]
//! - [`proc_stat`]
//! - [`generator`]

pub mod generator;
pub mod proc_stat;
pub mod source;

pub use generator::MetricSourceGenerator;
pub use proc_stat::{CpuTimes, CpuUsage, ProcStatSource};
pub use source::MetricSource;
