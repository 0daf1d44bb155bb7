#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow_schema::DataType;
use rill_common::{MetricsRegistry, PlanNodeId, QueryId, Result, RillError};
use rill_execution::nodes::SinkNode;
use rill_execution::{
    ExecGraph, ExecNodeKind, ExecState, FunctionRegistry, NoRemotePeers, RowBatch, RowDescriptor,
    Table, TableStore,
};

pub fn ints(values: &[i64]) -> ArrayRef {
    Arc::new(Int64Array::from(values.to_vec()))
}

pub fn floats(values: &[f64]) -> ArrayRef {
    Arc::new(Float64Array::from(values.to_vec()))
}

pub fn strs(values: &[&str]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

pub fn bools(values: &[bool]) -> ArrayRef {
    Arc::new(BooleanArray::from(values.to_vec()))
}

pub fn desc(types: &[DataType]) -> RowDescriptor {
    RowDescriptor::new(types.to_vec())
}

pub fn batch(
    descriptor: &RowDescriptor,
    columns: Vec<ArrayRef>,
    end_of_window: bool,
    end_of_stream: bool,
) -> RowBatch {
    let rows = columns.first().map_or(0, |c| c.len());
    RowBatch::try_new(descriptor.clone(), rows, columns, end_of_window, end_of_stream)
        .expect("valid test batch")
}

/// Table store that records every put, flags and empty batches included.
#[derive(Debug, Default)]
pub struct RecordingTableStore {
    tables: Mutex<HashMap<String, Table>>,
}

impl RecordingTableStore {
    pub fn with_table(self, name: &str, descriptor: RowDescriptor, batches: Vec<RowBatch>) -> Self {
        self.tables.lock().expect("store lock").insert(
            name.to_string(),
            Table {
                descriptor,
                batches,
            },
        );
        self
    }

    pub fn batches(&self, name: &str) -> Vec<RowBatch> {
        self.tables
            .lock()
            .expect("store lock")
            .get(name)
            .map(|t| t.batches.clone())
            .unwrap_or_default()
    }
}

impl TableStore for RecordingTableStore {
    fn get(&self, name: &str) -> Result<Table> {
        self.tables
            .lock()
            .expect("store lock")
            .get(name)
            .cloned()
            .ok_or_else(|| RillError::NotFound(format!("table {name}")))
    }

    fn put(&self, name: &str, batch: RowBatch) -> Result<()> {
        self.tables
            .lock()
            .expect("store lock")
            .entry(name.to_string())
            .or_insert_with(|| Table::new(batch.descriptor().clone()))
            .batches
            .push(batch);
        Ok(())
    }
}

/// Store whose writes always fail.
#[derive(Debug, Default)]
pub struct FailingTableStore;

impl TableStore for FailingTableStore {
    fn get(&self, name: &str) -> Result<Table> {
        Err(RillError::NotFound(format!("table {name}")))
    }

    fn put(&self, _name: &str, _batch: RowBatch) -> Result<()> {
        Err(RillError::InvalidArgument("args".to_string()))
    }
}

pub fn exec_state(store: Arc<dyn TableStore>) -> ExecState {
    ExecState::new(
        Arc::new(FunctionRegistry::with_builtins().expect("builtins")),
        store,
        Arc::new(NoRemotePeers),
        QueryId::new_v4(),
    )
    .with_metrics(MetricsRegistry::new())
}

pub const NODE: PlanNodeId = PlanNodeId(1);
const SINK: PlanNodeId = PlanNodeId(1_000);
const OUT: &str = "tester_out";

/// Drives a single node whose output is captured by a table sink.
pub struct ExecNodeTester {
    pub graph: ExecGraph,
    pub state: ExecState,
    store: Arc<RecordingTableStore>,
    seen: usize,
}

impl ExecNodeTester {
    /// `register` binds the node's functions before the graph is prepared.
    pub fn new(
        kind: ExecNodeKind,
        inputs: Vec<RowDescriptor>,
        output: RowDescriptor,
        store: Arc<dyn TableStore>,
        recorder: Option<Arc<RecordingTableStore>>,
        register: impl FnOnce(&mut ExecState),
    ) -> Result<Self> {
        let mut state = exec_state(store);
        register(&mut state);
        let mut graph = ExecGraph::new();
        graph.add_node(NODE, inputs, output.clone(), kind)?;
        graph.add_node(
            SINK,
            vec![output.clone()],
            output,
            ExecNodeKind::Sink(SinkNode::new(OUT)),
        )?;
        graph.connect(NODE, SINK)?;
        graph.prepare(&state)?;
        Ok(Self {
            graph,
            state,
            store: recorder.unwrap_or_default(),
            seen: 0,
        })
    }

    /// Tester whose sink writes into a fresh recording store.
    pub fn recording(
        kind: ExecNodeKind,
        inputs: Vec<RowDescriptor>,
        output: RowDescriptor,
        register: impl FnOnce(&mut ExecState),
    ) -> Result<Self> {
        let store = Arc::new(RecordingTableStore::default());
        Self::new(kind, inputs, output, store.clone(), Some(store), register)
    }

    pub fn consume_next(&mut self, batch: RowBatch, parent_index: usize) -> Result<()> {
        self.graph.consume_next(NODE, batch, parent_index, &self.state)
    }

    pub fn expect_row_batch(&mut self, expected: &RowBatch) {
        let batches = self.store.batches(OUT);
        let got = batches
            .get(self.seen)
            .unwrap_or_else(|| panic!("expected output batch #{}", self.seen));
        assert_eq!(got, expected, "output batch #{}", self.seen);
        self.seen += 1;
    }

    pub fn expect_no_more_batches(&self) {
        assert_eq!(self.store.batches(OUT).len(), self.seen);
    }

    pub fn close(&mut self) -> Result<()> {
        self.graph.close_all()
    }
}
