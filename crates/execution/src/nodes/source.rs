use std::collections::VecDeque;

use rill_common::{Result, RillError};
use tracing::debug;

use crate::context::ExecState;
use crate::exec_node::{ExecNode, NodeContext};
use crate::row_batch::{RowBatch, RowDescriptor};

/// Pull-style producer wrapped by a generator [`SourceNode`].
pub trait BatchGenerator: Send {
    fn descriptor(&self) -> RowDescriptor;
    /// Next batch, `None` once exhausted. The last batch should carry
    /// end-of-stream; the graph synthesizes a terminal batch otherwise.
    fn next_batch(&mut self) -> Result<Option<RowBatch>>;
}

enum SourceKind {
    Table {
        table: String,
        pending: VecDeque<RowBatch>,
        finished: bool,
    },
    Generator(Box<dyn BatchGenerator>),
}

/// Leaf node driven by the graph through `generate_next`.
pub struct SourceNode {
    kind: SourceKind,
}

impl SourceNode {
    /// Scan of `table` in the query's table store, snapshotted at `open`.
    /// Stored batches larger than the query's batch size are split.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Table {
                table: table.into(),
                pending: VecDeque::new(),
                finished: false,
            },
        }
    }

    pub fn generator(generator: Box<dyn BatchGenerator>) -> Self {
        Self {
            kind: SourceKind::Generator(generator),
        }
    }
}

impl ExecNode for SourceNode {
    fn name(&self) -> &'static str {
        match self.kind {
            SourceKind::Table { .. } => "MemorySource",
            SourceKind::Generator(_) => "GeneratorSource",
        }
    }

    fn init(&mut self, ctx: &NodeContext, _state: &ExecState) -> Result<()> {
        let name = self.name();
        ctx.expect_inputs(name, 0)?;
        if let SourceKind::Generator(g) = &self.kind {
            ctx.expect_output(name, &g.descriptor())?;
        }
        Ok(())
    }

    fn open(&mut self, ctx: &NodeContext, state: &ExecState) -> Result<()> {
        if let SourceKind::Table {
            table,
            pending,
            finished,
        } = &mut self.kind
        {
            let snapshot = state.table_store().get(table)?;
            if !snapshot.descriptor.is_compatible(&ctx.output_descriptor) {
                return Err(RillError::InvalidArgument(format!(
                    "table {table} has descriptor {} but node {} declares {}",
                    snapshot.descriptor, ctx.id, ctx.output_descriptor
                )));
            }
            let max_rows = state.batch_size_rows();
            *pending = VecDeque::with_capacity(snapshot.batches.len());
            for batch in &snapshot.batches {
                if batch.num_rows() <= max_rows {
                    pending.push_back(batch.clone());
                    continue;
                }
                for offset in (0..batch.num_rows()).step_by(max_rows) {
                    let len = max_rows.min(batch.num_rows() - offset);
                    pending.push_back(batch.slice(offset, len)?);
                }
            }
            debug!(
                query_id = %state.query_id(),
                node_id = ctx.id.0,
                table = %table,
                stored_batches = snapshot.batches.len(),
                batches = pending.len(),
                rows = snapshot.num_rows(),
                max_rows,
                "table snapshot taken"
            );
            *finished = false;
        }
        Ok(())
    }

    fn consume_next(
        &mut self,
        ctx: &NodeContext,
        _state: &ExecState,
        _batch: RowBatch,
        _parent_index: usize,
    ) -> Result<Option<RowBatch>> {
        Err(RillError::InvalidState(format!(
            "source node {} has no inputs",
            ctx.id
        )))
    }

    fn generate_next(&mut self, ctx: &NodeContext, _state: &ExecState) -> Result<Option<RowBatch>> {
        match &mut self.kind {
            SourceKind::Table {
                pending, finished, ..
            } => {
                if *finished {
                    return Ok(None);
                }
                let Some(batch) = pending.pop_front() else {
                    *finished = true;
                    return Ok(Some(RowBatch::empty(
                        ctx.output_descriptor.clone(),
                        true,
                        true,
                    )));
                };
                let last = pending.is_empty();
                *finished = last;
                Ok(Some(batch.with_flags(last, last)))
            }
            SourceKind::Generator(g) => g.next_batch(),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let SourceKind::Table { pending, .. } = &mut self.kind {
            pending.clear();
        }
        Ok(())
    }
}
