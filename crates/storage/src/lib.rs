//! Table stores backing source and sink nodes.
//!
//! Key modules:
//! - [`memory`]

pub mod memory;

pub use memory::MemoryTableStore;
