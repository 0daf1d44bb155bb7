//! Serializable plan descriptors handed over by the planner.
//!
//! A plan is a flat list of [`PlanNode`]s. Edges are expressed by `parents`
//! (upstream producers, in input order); `input_descriptors[i]` describes what
//! `parents[i]` delivers.

use arrow_schema::DataType;
use rill_common::{CallSiteId, PlanNodeId};
use serde::{Deserialize, Serialize};

use crate::row_batch::RowDescriptor;

/// Constant value inside an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
}

impl ScalarValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
            ScalarValue::Boolean(_) => DataType::Boolean,
        }
    }
}

/// Expression tree over the columns of a node's (first) input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarExpression {
    /// Input column by position.
    Column { index: usize },
    Constant(ScalarValue),
    /// Call to a function bound under `(node id, call_site_id)`.
    Call {
        call_site_id: CallSiteId,
        name: String,
        args: Vec<ScalarExpression>,
        arg_types: Vec<DataType>,
    },
}

impl ScalarExpression {
    pub fn column(index: usize) -> Self {
        ScalarExpression::Column { index }
    }

    pub fn constant(value: ScalarValue) -> Self {
        ScalarExpression::Constant(value)
    }

    pub fn call(
        call_site_id: u64,
        name: impl Into<String>,
        args: Vec<ScalarExpression>,
        arg_types: Vec<DataType>,
    ) -> Self {
        ScalarExpression::Call {
            call_site_id: CallSiteId(call_site_id),
            name: name.into(),
            args,
            arg_types,
        }
    }

    /// Visit every function call in this tree, arguments before the call.
    pub fn for_each_call<'a>(&'a self, f: &mut impl FnMut(CallSiteId, &'a str, &'a [DataType])) {
        if let ScalarExpression::Call {
            call_site_id,
            name,
            args,
            arg_types,
        } = self
        {
            for arg in args {
                arg.for_each_call(f);
            }
            f(*call_site_id, name, arg_types);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

/// One aggregate output column. `column: None` is only valid for `Count`
/// and counts rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub func: AggregateFunction,
    pub column: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operator {
    /// Scan of a table in the query's table store.
    MemorySource { table: String },
    /// Batches delivered by a remote peer.
    RemoteSource,
    Filter { predicate: ScalarExpression },
    Map { expressions: Vec<ScalarExpression> },
    /// Group keys are input column indexes.
    Aggregate {
        group_by: Vec<usize>,
        aggregates: Vec<AggregateExpr>,
    },
    Union,
    /// Append every batch to a table in the query's table store.
    MemorySink { table: String },
    /// Forward every batch to `destination` on `peer_id`.
    RemoteSink {
        peer_id: String,
        destination: PlanNodeId,
    },
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::MemorySource { .. } => "MemorySource",
            Operator::RemoteSource => "RemoteSource",
            Operator::Filter { .. } => "Filter",
            Operator::Map { .. } => "Map",
            Operator::Aggregate { .. } => "Aggregate",
            Operator::Union => "Union",
            Operator::MemorySink { .. } => "MemorySink",
            Operator::RemoteSink { .. } => "RemoteSink",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: PlanNodeId,
    #[serde(default)]
    pub parents: Vec<PlanNodeId>,
    #[serde(default)]
    pub input_descriptors: Vec<RowDescriptor>,
    pub output_descriptor: RowDescriptor,
    pub operator: Operator,
}

impl PlanNode {
    /// Expressions evaluated by this node, in declaration order.
    pub fn expressions(&self) -> Vec<&ScalarExpression> {
        match &self.operator {
            Operator::Filter { predicate } => vec![predicate],
            Operator::Map { expressions } => expressions.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Every `(call site, function name, argument types)` this node needs bound.
    pub fn function_calls(&self) -> Vec<(CallSiteId, &str, &[DataType])> {
        let mut out = Vec::new();
        for expr in self.expressions() {
            expr.for_each_call(&mut |site, name, types| out.push((site, name, types)));
        }
        out
    }
}
