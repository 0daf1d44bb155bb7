mod support;

use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow_schema::DataType;
use rill_common::{CallSiteId, PlanNodeId, RillError};
use rill_execution::nodes::{FilterNode, SinkNode};
use rill_execution::{
    ExecGraph, ExecNodeKind, ExecState, FnScalarFunction, FunctionContext, NodeState, RowBatch,
    ScalarExpression, ScalarValue,
};

use support::*;

fn eq_filter(column: usize, constant: ScalarValue, t: DataType) -> ExecNodeKind {
    ExecNodeKind::Filter(FilterNode::new(ScalarExpression::call(
        0,
        "eq",
        vec![
            ScalarExpression::column(column),
            ScalarExpression::constant(constant),
        ],
        vec![t.clone(), t],
    )))
}

fn bind_eq(t: DataType) -> impl FnOnce(&mut ExecState) {
    move |state: &mut ExecState| {
        state
            .register_scalar_function(NODE, CallSiteId(0), "eq", &[t.clone(), t])
            .expect("bind eq");
    }
}

#[test]
fn integer_equality_filter() {
    let d = desc(&[DataType::Int64, DataType::Int64, DataType::Utf8]);
    let mut tester = ExecNodeTester::recording(
        eq_filter(0, ScalarValue::Int64(1), DataType::Int64),
        vec![d.clone()],
        d.clone(),
        bind_eq(DataType::Int64),
    )
    .expect("tester");

    tester
        .consume_next(
            batch(
                &d,
                vec![
                    ints(&[1, 1, 3, 4]),
                    ints(&[1, 3, 6, 9]),
                    strs(&["ABC", "DEF", "HELLO", "WORLD"]),
                ],
                false,
                false,
            ),
            0,
        )
        .expect("first batch");
    tester.expect_row_batch(&batch(
        &d,
        vec![ints(&[1, 1]), ints(&[1, 3]), strs(&["ABC", "DEF"])],
        false,
        false,
    ));

    tester
        .consume_next(
            batch(
                &d,
                vec![
                    ints(&[1, 2, 3]),
                    ints(&[1, 4, 6]),
                    strs(&["Hello", "world", "now"]),
                ],
                true,
                true,
            ),
            0,
        )
        .expect("terminal batch");
    tester.expect_row_batch(&batch(
        &d,
        vec![ints(&[1]), ints(&[1]), strs(&["Hello"])],
        true,
        true,
    ));
    tester.expect_no_more_batches();
    assert!(tester.graph.is_finished());
    tester.close().expect("close");
}

#[test]
fn string_equality_filter() {
    let d = desc(&[DataType::Utf8, DataType::Int64]);
    let mut tester = ExecNodeTester::recording(
        eq_filter(0, ScalarValue::Utf8("A".to_string()), DataType::Utf8),
        vec![d.clone()],
        d.clone(),
        bind_eq(DataType::Utf8),
    )
    .expect("tester");

    tester
        .consume_next(
            batch(
                &d,
                vec![strs(&["A", "B", "A", "D"]), ints(&[1, 3, 6, 9])],
                false,
                false,
            ),
            0,
        )
        .expect("first batch");
    tester.expect_row_batch(&batch(
        &d,
        vec![strs(&["A", "A"]), ints(&[1, 6])],
        false,
        false,
    ));

    tester
        .consume_next(
            batch(&d, vec![strs(&["C", "B", "A"]), ints(&[1, 4, 6])], true, true),
            0,
        )
        .expect("terminal batch");
    tester.expect_row_batch(&batch(&d, vec![strs(&["A"]), ints(&[6])], true, true));
    tester.close().expect("close");
}

#[test]
fn downstream_failure_surfaces_unchanged() {
    let d = desc(&[DataType::Utf8, DataType::Int64]);
    let mut tester = ExecNodeTester::new(
        eq_filter(0, ScalarValue::Utf8("A".to_string()), DataType::Utf8),
        vec![d.clone()],
        d.clone(),
        Arc::new(FailingTableStore),
        None,
        bind_eq(DataType::Utf8),
    )
    .expect("tester");

    let err = tester
        .consume_next(
            batch(&d, vec![strs(&["A", "B"]), ints(&[1, 2])], false, false),
            0,
        )
        .expect_err("sink put fails");
    match err {
        RillError::InvalidArgument(msg) => assert_eq!(msg, "args"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn zero_row_input_keeps_flags() {
    let d = desc(&[DataType::Int64, DataType::Int64, DataType::Utf8]);
    let mut tester = ExecNodeTester::recording(
        eq_filter(0, ScalarValue::Int64(1), DataType::Int64),
        vec![d.clone()],
        d.clone(),
        bind_eq(DataType::Int64),
    )
    .expect("tester");

    tester
        .consume_next(RowBatch::empty(d.clone(), true, false), 0)
        .expect("empty window");
    tester.expect_row_batch(&RowBatch::empty(d.clone(), true, false));

    // No row matches: still one zero-row output with the input flags.
    tester
        .consume_next(
            batch(&d, vec![ints(&[5]), ints(&[5]), strs(&["x"])], true, true),
            0,
        )
        .expect("terminal");
    tester.expect_row_batch(&RowBatch::empty(d, true, true));
}

#[test]
fn batch_after_end_of_stream_is_rejected() {
    let d = desc(&[DataType::Int64, DataType::Int64, DataType::Utf8]);
    let mut tester = ExecNodeTester::recording(
        eq_filter(0, ScalarValue::Int64(1), DataType::Int64),
        vec![d.clone()],
        d.clone(),
        bind_eq(DataType::Int64),
    )
    .expect("tester");
    tester
        .consume_next(RowBatch::empty(d.clone(), true, true), 0)
        .expect("terminal");
    let err = tester
        .consume_next(RowBatch::empty(d, false, false), 0)
        .expect_err("after eos");
    assert!(matches!(err, RillError::InvalidState(_)));
}

#[test]
fn mismatched_or_incomplete_batches_are_rejected() {
    let d = desc(&[DataType::Int64, DataType::Int64, DataType::Utf8]);
    let mut tester = ExecNodeTester::recording(
        eq_filter(0, ScalarValue::Int64(1), DataType::Int64),
        vec![d.clone()],
        d.clone(),
        bind_eq(DataType::Int64),
    )
    .expect("tester");

    let other = desc(&[DataType::Utf8, DataType::Int64]);
    let err = tester
        .consume_next(batch(&other, vec![strs(&["a"]), ints(&[1])], false, false), 0)
        .expect_err("wrong descriptor");
    assert!(matches!(err, RillError::InvalidArgument(_)));

    let mut partial = RowBatch::with_capacity(d.clone(), 1, false, false);
    partial.add_column(ints(&[1])).expect("column");
    let err = tester.consume_next(partial, 0).expect_err("incomplete");
    assert!(matches!(err, RillError::InvalidArgument(_)));

    let err = tester
        .consume_next(RowBatch::empty(d, false, false), 3)
        .expect_err("bad input index");
    assert!(matches!(err, RillError::InvalidArgument(_)));
}

#[test]
fn non_boolean_predicate_fails_init() {
    let d = desc(&[DataType::Int64]);
    let kind = ExecNodeKind::Filter(FilterNode::new(ScalarExpression::column(0)));
    let err = ExecNodeTester::recording(kind, vec![d.clone()], d, |_: &mut ExecState| {})
        .err()
        .expect("non-boolean predicate");
    assert!(matches!(err, RillError::InvalidArgument(_)));
}

#[test]
fn predicate_arguments_must_match_binding() {
    let d = desc(&[DataType::Int64]);
    // Bound for strings, called with an integer column.
    let err = ExecNodeTester::recording(
        eq_filter(0, ScalarValue::Utf8("1".to_string()), DataType::Int64),
        vec![d.clone()],
        d,
        bind_eq(DataType::Utf8),
    )
    .err()
    .expect("type mismatch");
    assert!(matches!(err, RillError::InvalidArgument(_)));
}

#[test]
fn reinit_is_idempotent_and_lifecycle_is_enforced() {
    let d = desc(&[DataType::Int64, DataType::Int64, DataType::Utf8]);
    let store = Arc::new(RecordingTableStore::default());
    let mut state = exec_state(store.clone());
    state
        .register_scalar_function(NODE, CallSiteId(0), "eq", &[DataType::Int64, DataType::Int64])
        .expect("bind");
    let sink = PlanNodeId(2);
    let mut graph = ExecGraph::new();
    graph
        .add_node(
            NODE,
            vec![d.clone()],
            d.clone(),
            eq_filter(0, ScalarValue::Int64(1), DataType::Int64),
        )
        .expect("add");
    graph
        .add_node(sink, vec![d.clone()], d.clone(), ExecNodeKind::Sink(SinkNode::new("out")))
        .expect("add sink");
    graph.connect(NODE, sink).expect("connect");

    assert_eq!(graph.node_state(NODE).expect("state"), NodeState::Created);
    let bound = state.get_bound_function(NODE, CallSiteId(0)).expect("bound");
    graph.init_node(NODE, &state).expect("init");
    graph.init_node(NODE, &state).expect("re-init");
    assert_eq!(graph.node_state(NODE).expect("state"), NodeState::Initialized);
    let rebound = state.get_bound_function(NODE, CallSiteId(0)).expect("bound");
    assert!(Arc::ptr_eq(&bound, &rebound));

    let err = graph
        .consume_next(NODE, RowBatch::empty(d.clone(), false, false), 0, &state)
        .expect_err("not open");
    assert!(matches!(err, RillError::InvalidState(_)));

    graph.init_node(sink, &state).expect("init sink");
    graph.open_node(sink, &state).expect("open sink");
    graph.open_node(NODE, &state).expect("open");
    assert!(matches!(
        graph.open_node(NODE, &state),
        Err(RillError::InvalidState(_))
    ));
    assert!(matches!(
        graph.init_node(NODE, &state),
        Err(RillError::InvalidState(_))
    ));

    // The twice-initialized predicate filters exactly like a fresh one.
    graph
        .consume_next(
            NODE,
            batch(
                &d,
                vec![ints(&[1, 2, 1]), ints(&[7, 8, 9]), strs(&["a", "b", "c"])],
                false,
                false,
            ),
            0,
            &state,
        )
        .expect("consume");
    assert_eq!(
        store.batches("out"),
        vec![batch(
            &d,
            vec![ints(&[1, 1]), ints(&[7, 9]), strs(&["a", "c"])],
            false,
            false,
        )]
    );

    graph.close_node(NODE).expect("close");
    assert!(matches!(graph.close_node(NODE), Err(RillError::InvalidState(_))));
    assert!(matches!(
        graph.consume_next(NODE, RowBatch::empty(d, false, false), 0, &state),
        Err(RillError::InvalidState(_))
    ));
}

#[test]
fn failed_reinit_returns_node_to_created() {
    let d = desc(&[DataType::Int64, DataType::Int64, DataType::Utf8]);
    let mut bound = exec_state(Arc::new(RecordingTableStore::default()));
    bound
        .register_scalar_function(NODE, CallSiteId(0), "eq", &[DataType::Int64, DataType::Int64])
        .expect("bind");
    let unbound = exec_state(Arc::new(RecordingTableStore::default()));

    let mut graph = ExecGraph::new();
    graph
        .add_node(
            NODE,
            vec![d.clone()],
            d.clone(),
            eq_filter(0, ScalarValue::Int64(1), DataType::Int64),
        )
        .expect("add");
    graph.init_node(NODE, &bound).expect("init");

    let err = graph.init_node(NODE, &unbound).expect_err("no binding");
    assert!(matches!(err, RillError::NotFound(_)));
    assert_eq!(graph.node_state(NODE).expect("state"), NodeState::Created);
    assert!(matches!(
        graph.open_node(NODE, &unbound),
        Err(RillError::InvalidState(_))
    ));
    assert!(matches!(
        graph.consume_next(NODE, RowBatch::empty(d.clone(), false, false), 0, &unbound),
        Err(RillError::InvalidState(_))
    ));

    graph.init_node(NODE, &bound).expect("init again");
    graph.open_node(NODE, &bound).expect("open");
    graph
        .consume_next(NODE, RowBatch::empty(d, true, true), 0, &bound)
        .expect("consume");
}

#[test]
fn predicate_invocation_failure_aborts_the_batch() {
    let d = desc(&[DataType::Int64]);
    let kind = ExecNodeKind::Filter(FilterNode::new(ScalarExpression::call(
        0,
        "boom",
        vec![ScalarExpression::column(0)],
        vec![DataType::Int64],
    )));
    let mut tester = ExecNodeTester::recording(
        kind,
        vec![d.clone()],
        d.clone(),
        |state: &mut ExecState| {
            state
                .registry()
                .register(Arc::new(FnScalarFunction::new(
                    "boom",
                    vec![DataType::Int64],
                    DataType::Boolean,
                    |_: &FunctionContext, _: &[ArrayRef]| -> rill_common::Result<ArrayRef> {
                        Err(RillError::InvalidArgument("args".to_string()))
                    },
                )))
                .expect("register boom");
            state
                .register_scalar_function(NODE, CallSiteId(0), "boom", &[DataType::Int64])
                .expect("bind boom");
        },
    )
    .expect("tester");

    let err = tester
        .consume_next(batch(&d, vec![ints(&[1, 2, 3])], true, true), 0)
        .expect_err("predicate fails");
    match err {
        RillError::InvalidArgument(msg) => assert_eq!(msg, "args"),
        other => panic!("unexpected error: {other}"),
    }
    tester.expect_no_more_batches();
}
