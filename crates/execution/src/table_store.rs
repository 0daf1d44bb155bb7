//! Table storage contract consumed by source and sink nodes.

use std::fmt::Debug;

use rill_common::Result;

use crate::row_batch::{RowBatch, RowDescriptor};

/// Snapshot of a stored table: its descriptor and batches in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub descriptor: RowDescriptor,
    pub batches: Vec<RowBatch>,
}

impl Table {
    pub fn new(descriptor: RowDescriptor) -> Self {
        Self {
            descriptor,
            batches: Vec::new(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RowBatch::num_rows).sum()
    }
}

/// Named tables shared across queries.
///
/// Implementations are internally synchronized.
pub trait TableStore: Send + Sync + Debug {
    /// Snapshot a table. `NotFound` if it does not exist.
    fn get(&self, name: &str) -> Result<Table>;
    /// Append a batch to a table.
    fn put(&self, name: &str, batch: RowBatch) -> Result<()>;
}
