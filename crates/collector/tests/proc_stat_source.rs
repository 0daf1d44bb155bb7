use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{Array, Float64Array, TimestampNanosecondArray};
use arrow_schema::DataType;
use rill_collector::{MetricSource, MetricSourceGenerator, ProcStatSource};
use rill_common::{CallSiteId, MetricsRegistry, PlanNodeId, QueryId, RillError};
use rill_execution::nodes::{FilterNode, SinkNode, SourceNode};
use rill_execution::{
    ExecGraph, ExecNodeKind, ExecState, FunctionRegistry, NoRemotePeers, ScalarExpression,
    ScalarValue, TableStore,
};
use rill_storage::MemoryTableStore;

fn fixture(name: &str, first_line: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("rill-{}-{name}.stat", std::process::id()));
    write_line(&path, first_line);
    path
}

fn write_line(path: &PathBuf, first_line: &str) {
    fs::write(path, format!("{first_line}\ncpu0 1 1 1 1 1 1 1 1 1 1\nintr 42\n"))
        .expect("write fixture");
}

#[test]
fn poll_reports_percentages_since_previous_read() {
    let path = fixture("percent", "cpu  100 0 0 100 0 0 0 0 0 0");
    let mut source = ProcStatSource::new(&path).expect("source");

    write_line(&path, "cpu  130 0 10 150 10 0 0 0 0 0");
    let batch = source.poll().expect("poll");
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(batch.descriptor(), &ProcStatSource::usage_descriptor());
    assert!(!batch.end_of_window());
    assert!(!batch.end_of_stream());

    let col = |i: usize| {
        batch
            .column(i)
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("float column")
            .value(0)
    };
    assert_eq!(col(1), 10.0);
    assert_eq!(col(2), 30.0);
    assert_eq!(col(3), 60.0);
    let ts = batch
        .column(0)
        .as_any()
        .downcast_ref::<TimestampNanosecondArray>()
        .expect("timestamp column")
        .value(0);
    assert!(ts > 0);

    // Unchanged counters: nothing happened in the interval.
    let usage = source.poll_usage().expect("second poll");
    assert_eq!(usage.user_percent, 0.0);
    assert_eq!(usage.idle_percent, 0.0);
    assert_eq!(usage.system_percent, 0.0);

    fs::remove_file(&path).expect("cleanup");
}

#[test]
fn malformed_first_line_is_rejected() {
    let path = fixture("short", "cpu  1 2 3 4 5 6 7 8 9");
    let err = ProcStatSource::new(&path).expect_err("nine fields");
    assert!(matches!(err, RillError::InvalidArgument(_)));
    fs::remove_file(&path).expect("cleanup");
}

#[test]
fn file_vanishing_after_construction_fails_the_poll() {
    let path = fixture("vanish", "cpu  1 2 3 4 5 6 7 8 9 10");
    let mut source = ProcStatSource::new(&path).expect("source");
    fs::remove_file(&path).expect("remove");
    let err = source.poll().expect_err("file gone");
    assert!(matches!(err, RillError::NotFound(_)));
}

#[test]
fn generator_source_feeds_filter_and_sink() {
    let path = fixture("graph", "cpu  5 5 5 5 5 5 5 5 5 5");
    let source = ProcStatSource::new(&path).expect("source");
    let descriptor = ProcStatSource::usage_descriptor();

    let store = Arc::new(MemoryTableStore::new());
    let mut state = ExecState::new(
        Arc::new(FunctionRegistry::with_builtins().expect("builtins")),
        store.clone(),
        Arc::new(NoRemotePeers),
        QueryId::new_v4(),
    )
    .with_metrics(MetricsRegistry::new());
    state
        .register_scalar_function(
            PlanNodeId(2),
            CallSiteId(0),
            "ge",
            &[DataType::Float64, DataType::Float64],
        )
        .expect("bind ge");

    let mut graph = ExecGraph::new();
    graph
        .add_node(
            PlanNodeId(1),
            vec![],
            descriptor.clone(),
            ExecNodeKind::Source(SourceNode::generator(Box::new(MetricSourceGenerator::new(
                Box::new(source),
                3,
            )))),
        )
        .expect("source node");
    graph
        .add_node(
            PlanNodeId(2),
            vec![descriptor.clone()],
            descriptor.clone(),
            ExecNodeKind::Filter(FilterNode::new(ScalarExpression::call(
                0,
                "ge",
                vec![
                    ScalarExpression::column(3),
                    ScalarExpression::constant(ScalarValue::Float64(0.0)),
                ],
                vec![DataType::Float64, DataType::Float64],
            ))),
        )
        .expect("filter node");
    graph
        .add_node(
            PlanNodeId(3),
            vec![descriptor.clone()],
            descriptor.clone(),
            ExecNodeKind::Sink(SinkNode::new("cpu")),
        )
        .expect("sink node");
    graph.connect(PlanNodeId(1), PlanNodeId(2)).expect("connect");
    graph.connect(PlanNodeId(2), PlanNodeId(3)).expect("connect");

    graph.execute(&state).expect("execute");
    assert!(graph.is_finished());

    let table = store.get("cpu").expect("table");
    assert_eq!(table.descriptor, descriptor);
    assert_eq!(table.num_rows(), 3);
    fs::remove_file(&path).expect("cleanup");
}
