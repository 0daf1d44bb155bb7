use std::sync::Arc;

use arrow::array::BooleanArray;
use arrow_schema::DataType;
use rill_common::{Result, RillError};

use crate::context::ExecState;
use crate::exec_node::{ExecNode, NodeContext};
use crate::expressions::{PhysicalExpr, compile_expr};
use crate::plan::ScalarExpression;
use crate::row_batch::RowBatch;

/// Forwards the rows of each batch for which the predicate is true.
///
/// Row order and flow flags are preserved. A null predicate value drops the row.
pub struct FilterNode {
    predicate: ScalarExpression,
    compiled: Option<Arc<dyn PhysicalExpr>>,
}

impl FilterNode {
    pub fn new(predicate: ScalarExpression) -> Self {
        Self {
            predicate,
            compiled: None,
        }
    }
}

impl ExecNode for FilterNode {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn init(&mut self, ctx: &NodeContext, state: &ExecState) -> Result<()> {
        self.compiled = None;
        ctx.expect_inputs(self.name(), 1)?;
        ctx.expect_output(self.name(), &ctx.input_descriptors[0])?;
        let compiled = compile_expr(&self.predicate, &ctx.input_descriptors[0], ctx.id, state)?;
        if compiled.data_type() != DataType::Boolean {
            return Err(RillError::InvalidArgument(format!(
                "filter predicate of node {} has type {}, expected Boolean",
                ctx.id,
                compiled.data_type()
            )));
        }
        self.compiled = Some(compiled);
        Ok(())
    }

    fn consume_next(
        &mut self,
        ctx: &NodeContext,
        _state: &ExecState,
        batch: RowBatch,
        _parent_index: usize,
    ) -> Result<Option<RowBatch>> {
        let pred = self.compiled.as_ref().ok_or_else(|| {
            RillError::InvalidState(format!("filter node {} is not initialized", ctx.id))
        })?;
        let mask = pred.evaluate(&batch)?;
        let mask = mask
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| {
                RillError::Execution("filter predicate must evaluate to boolean".to_string())
            })?;
        batch.filter(mask).map(Some)
    }

    fn close(&mut self) -> Result<()> {
        self.compiled = None;
        Ok(())
    }
}
