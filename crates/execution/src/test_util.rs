use rill_common::{Result, RillError};

use crate::row_batch::RowBatch;
use crate::table_store::{Table, TableStore};

/// Store with no tables that discards writes.
#[derive(Debug)]
pub(crate) struct NullStore;

impl TableStore for NullStore {
    fn get(&self, name: &str) -> Result<Table> {
        Err(RillError::NotFound(format!("table {name}")))
    }

    fn put(&self, _name: &str, _batch: RowBatch) -> Result<()> {
        Ok(())
    }
}
