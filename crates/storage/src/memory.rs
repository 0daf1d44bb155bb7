use std::collections::HashMap;
use std::sync::RwLock;

use rill_common::{Result, RillError};
use rill_execution::{RowBatch, RowDescriptor, Table, TableStore};
use tracing::debug;

/// Process-local tables kept in memory.
///
/// Batches are stored without their flow flags; zero-row batches are not kept.
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table. `AlreadyExists` if the name is taken.
    pub fn create_table(&self, name: &str, descriptor: RowDescriptor) -> Result<()> {
        let mut tables = self.tables.write().expect("table store lock poisoned");
        if tables.contains_key(name) {
            return Err(RillError::AlreadyExists(format!("table {name}")));
        }
        debug!(table = name, descriptor = %descriptor, "table created");
        tables.insert(name.to_string(), Table::new(descriptor));
        Ok(())
    }

    /// Table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names = self
            .tables
            .read()
            .expect("table store lock poisoned")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

impl TableStore for MemoryTableStore {
    fn get(&self, name: &str) -> Result<Table> {
        self.tables
            .read()
            .expect("table store lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| RillError::NotFound(format!("unknown table: {name}")))
    }

    /// Appends `batch`, creating the table on first write. A descriptor that
    /// differs from the table's is `InvalidArgument`.
    fn put(&self, name: &str, batch: RowBatch) -> Result<()> {
        let mut tables = self.tables.write().expect("table store lock poisoned");
        let table = tables
            .entry(name.to_string())
            .or_insert_with(|| Table::new(batch.descriptor().clone()));
        if !table.descriptor.is_compatible(batch.descriptor()) {
            return Err(RillError::InvalidArgument(format!(
                "table {name} has descriptor {}, batch has {}",
                table.descriptor,
                batch.descriptor()
            )));
        }
        if batch.num_rows() > 0 {
            table.batches.push(batch.with_flags(false, false));
        }
        Ok(())
    }
}
