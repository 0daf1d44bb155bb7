use rill_common::Result;

use crate::context::ExecState;
use crate::exec_node::{ExecNode, NodeContext};
use crate::row_batch::RowBatch;

/// Merges inputs of one shape. End-of-stream is forwarded only once every
/// input has finished; end-of-window is copied per batch.
#[derive(Debug, Default)]
pub struct UnionNode;

impl ExecNode for UnionNode {
    fn name(&self) -> &'static str {
        "Union"
    }

    fn init(&mut self, ctx: &NodeContext, _state: &ExecState) -> Result<()> {
        if ctx.input_descriptors.is_empty() {
            return Err(rill_common::RillError::InvalidArgument(format!(
                "union node {} has no inputs",
                ctx.id
            )));
        }
        for input in &ctx.input_descriptors {
            ctx.expect_output(self.name(), input)?;
        }
        Ok(())
    }

    fn consume_next(
        &mut self,
        ctx: &NodeContext,
        _state: &ExecState,
        batch: RowBatch,
        _parent_index: usize,
    ) -> Result<Option<RowBatch>> {
        let eow = batch.end_of_window();
        Ok(Some(batch.with_flags(eow, ctx.all_inputs_finished)))
    }
}
