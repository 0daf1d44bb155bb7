use std::sync::Arc;

use rill_common::{Result, RillError};

use crate::context::ExecState;
use crate::exec_node::{ExecNode, NodeContext};
use crate::expressions::{PhysicalExpr, compile_expr};
use crate::plan::ScalarExpression;
use crate::row_batch::{RowBatch, RowDescriptor};

/// One output column per expression.
pub struct MapNode {
    expressions: Vec<ScalarExpression>,
    compiled: Vec<Arc<dyn PhysicalExpr>>,
}

impl MapNode {
    pub fn new(expressions: Vec<ScalarExpression>) -> Self {
        Self {
            expressions,
            compiled: Vec::new(),
        }
    }
}

impl ExecNode for MapNode {
    fn name(&self) -> &'static str {
        "Map"
    }

    fn init(&mut self, ctx: &NodeContext, state: &ExecState) -> Result<()> {
        self.compiled.clear();
        ctx.expect_inputs(self.name(), 1)?;
        let compiled = self
            .expressions
            .iter()
            .map(|e| compile_expr(e, &ctx.input_descriptors[0], ctx.id, state))
            .collect::<Result<Vec<_>>>()?;
        let produced = RowDescriptor::new(compiled.iter().map(|e| e.data_type()).collect());
        ctx.expect_output(self.name(), &produced)?;
        self.compiled = compiled;
        Ok(())
    }

    fn consume_next(
        &mut self,
        ctx: &NodeContext,
        _state: &ExecState,
        batch: RowBatch,
        _parent_index: usize,
    ) -> Result<Option<RowBatch>> {
        if self.compiled.len() != ctx.output_descriptor.len() {
            return Err(RillError::InvalidState(format!(
                "map node {} is not initialized",
                ctx.id
            )));
        }
        let columns = self
            .compiled
            .iter()
            .map(|e| e.evaluate(&batch))
            .collect::<Result<Vec<_>>>()?;
        RowBatch::try_new(
            ctx.output_descriptor.clone(),
            batch.num_rows(),
            columns,
            batch.end_of_window(),
            batch.end_of_stream(),
        )
        .map(Some)
    }

    fn close(&mut self) -> Result<()> {
        self.compiled.clear();
        Ok(())
    }
}
