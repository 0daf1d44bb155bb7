#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow_schema::DataType;
use rill_common::{MetricsRegistry, PlanNodeId, QueryId};
use rill_execution::{
    ExecState, FunctionRegistry, Operator, PlanNode, RemoteStubFactory, RowBatch, RowDescriptor,
    TableStore,
};

pub fn events_descriptor() -> RowDescriptor {
    RowDescriptor::new(vec![DataType::Int64, DataType::Utf8])
}

pub fn events_batch(ids: &[i64], names: &[&str]) -> RowBatch {
    let cols: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(ids.to_vec())),
        Arc::new(StringArray::from(names.to_vec())),
    ];
    RowBatch::try_new(events_descriptor(), ids.len(), cols, false, false).expect("batch")
}

pub fn plan_node(id: u64, parents: &[u64], operator: Operator) -> PlanNode {
    let d = events_descriptor();
    PlanNode {
        id: PlanNodeId(id),
        parents: parents.iter().map(|&p| PlanNodeId(p)).collect(),
        input_descriptors: parents.iter().map(|_| d.clone()).collect(),
        output_descriptor: d,
        operator,
    }
}

pub fn state(
    query_id: QueryId,
    store: Arc<dyn TableStore>,
    stubs: Arc<dyn RemoteStubFactory>,
) -> ExecState {
    ExecState::new(
        Arc::new(FunctionRegistry::with_builtins().expect("builtins")),
        store,
        stubs,
        query_id,
    )
    .with_metrics(MetricsRegistry::new())
}
