//! Expression compilation and evaluation for execution operators.
//!
//! Input contract:
//! - plan expressions address input columns by position;
//! - every function call site was bound in [`ExecState`] before compilation.
//!
//! Output contract:
//! - each evaluation returns an `ArrayRef` aligned to the input batch row count.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
};
use arrow_schema::DataType;
use rill_common::{PlanNodeId, Result, RillError};

use crate::context::{BoundFunction, ExecState};
use crate::plan::{ScalarExpression, ScalarValue};
use crate::row_batch::{RowBatch, RowDescriptor};
use crate::udf::{FunctionContext, format_types};

/// Executable expression.
///
/// - plan descriptors carry `ScalarExpression` trees
/// - nodes compile them into `PhysicalExpr` at `init`
/// - evaluation returns an Arrow `ArrayRef` aligned with the input batch length
pub trait PhysicalExpr: Send + Sync {
    /// Static output data type of this expression.
    fn data_type(&self) -> DataType;
    /// Evaluate the expression for every row in `batch`.
    fn evaluate(&self, batch: &RowBatch) -> Result<ArrayRef>;
}

/// Compile a plan expression for node `node_id` reading `input`.
///
/// Function calls resolve through `state`'s bindings; the compiled argument
/// types must equal the bound function's argument types exactly.
pub fn compile_expr(
    expr: &ScalarExpression,
    input: &RowDescriptor,
    node_id: PlanNodeId,
    state: &ExecState,
) -> Result<Arc<dyn PhysicalExpr>> {
    match expr {
        ScalarExpression::Column { index } => {
            let dt = input.type_at(*index).cloned().ok_or_else(|| {
                RillError::InvalidArgument(format!(
                    "column {index} out of range for input {input}"
                ))
            })?;
            Ok(Arc::new(ColumnExpr { index: *index, dt }))
        }

        ScalarExpression::Constant(v) => Ok(Arc::new(LiteralExpr { v: v.clone() })),

        ScalarExpression::Call {
            call_site_id,
            name,
            args,
            ..
        } => {
            let compiled_args = args
                .iter()
                .map(|a| compile_expr(a, input, node_id, state))
                .collect::<Result<Vec<_>>>()?;
            let bound = state.get_bound_function(node_id, *call_site_id)?;
            if !bound.function.name().eq_ignore_ascii_case(name) {
                return Err(RillError::InvalidArgument(format!(
                    "call site {call_site_id} of node {node_id} calls {name} but {} is bound",
                    bound.function.name()
                )));
            }
            let actual = compiled_args
                .iter()
                .map(|arg| arg.data_type())
                .collect::<Vec<_>>();
            if actual != bound.arg_types {
                return Err(RillError::InvalidArgument(format!(
                    "{name} bound for ({}) but called with ({})",
                    format_types(&bound.arg_types),
                    format_types(&actual)
                )));
            }
            Ok(Arc::new(ScalarCallExpr {
                ctx: FunctionContext {
                    query_id: state.query_id(),
                    node_id,
                    call_site: *call_site_id,
                },
                bound,
                args: compiled_args,
            }))
        }
    }
}

struct ColumnExpr {
    index: usize,
    dt: DataType,
}

impl PhysicalExpr for ColumnExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, batch: &RowBatch) -> Result<ArrayRef> {
        Ok(batch.column(self.index).clone())
    }
}

struct LiteralExpr {
    v: ScalarValue,
}

impl PhysicalExpr for LiteralExpr {
    fn data_type(&self) -> DataType {
        self.v.data_type()
    }

    fn evaluate(&self, batch: &RowBatch) -> Result<ArrayRef> {
        Ok(scalar_to_array(&self.v, batch.num_rows()))
    }
}

struct ScalarCallExpr {
    ctx: FunctionContext,
    bound: Arc<BoundFunction>,
    args: Vec<Arc<dyn PhysicalExpr>>,
}

impl PhysicalExpr for ScalarCallExpr {
    fn data_type(&self) -> DataType {
        self.bound.return_type.clone()
    }

    fn evaluate(&self, batch: &RowBatch) -> Result<ArrayRef> {
        let arrays = self
            .args
            .iter()
            .map(|arg| arg.evaluate(batch))
            .collect::<Result<Vec<_>>>()?;
        let out = self.bound.function.invoke(&self.ctx, &arrays)?;
        if out.len() != batch.num_rows() || out.data_type() != &self.bound.return_type {
            return Err(RillError::Execution(format!(
                "{} returned {} values of type {}, expected {} of type {}",
                self.bound.function.name(),
                out.len(),
                out.data_type(),
                batch.num_rows(),
                self.bound.return_type
            )));
        }
        Ok(out)
    }
}

pub(crate) fn scalar_to_array(v: &ScalarValue, len: usize) -> ArrayRef {
    match v {
        ScalarValue::Int64(x) => {
            let mut b = Int64Builder::with_capacity(len);
            for _ in 0..len {
                b.append_value(*x);
            }
            Arc::new(b.finish())
        }
        ScalarValue::Float64(x) => {
            let mut b = Float64Builder::with_capacity(len);
            for _ in 0..len {
                b.append_value(*x);
            }
            Arc::new(b.finish())
        }
        ScalarValue::Boolean(x) => {
            let mut b = BooleanBuilder::with_capacity(len);
            for _ in 0..len {
                b.append_value(*x);
            }
            Arc::new(b.finish())
        }
        ScalarValue::Utf8(s) => {
            let mut b = StringBuilder::with_capacity(len, s.len() * len);
            for _ in 0..len {
                b.append_value(s);
            }
            Arc::new(b.finish())
        }
    }
}
