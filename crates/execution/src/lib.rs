//! Push-based operator execution core.
//!
//! Architecture role:
//! - typed row batches and their descriptors
//! - per-query function binding context
//! - operator variants and the arena graph that drives them
//!
//! Key modules:
//! - [`row_batch`]
//! - [`context`]
//! - [`exec_node`]
//! - [`graph`]
//! - [`nodes`]
//! - [`plan`]

pub mod builtins;
pub mod context;
pub mod exec_node;
pub mod expressions;
pub mod graph;
pub mod nodes;
pub mod plan;
pub mod remote;
pub mod row_batch;
pub mod table_store;
pub mod udf;

#[cfg(test)]
mod test_util;

// Re-export only what you want at the crate root (no globs).
pub use builtins::register_builtins;
pub use context::{BoundFunction, ExecState};
pub use exec_node::{ExecNode, ExecNodeKind, NodeContext, NodeState};
pub use expressions::{PhysicalExpr, compile_expr};
pub use graph::ExecGraph;
pub use nodes::BatchGenerator;
pub use plan::{AggregateExpr, AggregateFunction, Operator, PlanNode, ScalarExpression, ScalarValue};
pub use remote::{NoRemotePeers, RemoteStub, RemoteStubFactory};
pub use row_batch::{RowBatch, RowDescriptor};
pub use table_store::{Table, TableStore};
pub use udf::{FnScalarFunction, FunctionContext, FunctionRegistry, ScalarFunction};
