use rill_common::Result;
use tracing::debug;

use crate::context::ExecState;
use crate::exec_node::{ExecNode, NodeContext};
use crate::row_batch::RowBatch;

/// Writes every consumed batch to a table of the query's table store.
#[derive(Debug)]
pub struct SinkNode {
    table: String,
    rows_written: usize,
    saw_end_of_stream: bool,
}

impl SinkNode {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rows_written: 0,
            saw_end_of_stream: false,
        }
    }
}

impl ExecNode for SinkNode {
    fn name(&self) -> &'static str {
        "MemorySink"
    }

    fn init(&mut self, ctx: &NodeContext, _state: &ExecState) -> Result<()> {
        ctx.expect_inputs(self.name(), 1)
    }

    fn open(&mut self, _ctx: &NodeContext, _state: &ExecState) -> Result<()> {
        self.rows_written = 0;
        self.saw_end_of_stream = false;
        Ok(())
    }

    fn consume_next(
        &mut self,
        _ctx: &NodeContext,
        state: &ExecState,
        batch: RowBatch,
        _parent_index: usize,
    ) -> Result<Option<RowBatch>> {
        let rows = batch.num_rows();
        let eos = batch.end_of_stream();
        state.table_store().put(&self.table, batch)?;
        self.rows_written += rows;
        self.saw_end_of_stream |= eos;
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        debug!(
            table = %self.table,
            rows = self.rows_written,
            end_of_stream = self.saw_end_of_stream,
            "sink closed"
        );
        Ok(())
    }
}
