use std::env;
use std::sync::Arc;
use std::time::Duration;

use arrow::util::pretty::pretty_format_batches;
use rill_collector::{MetricSourceGenerator, ProcStatSource};
use rill_common::{EngineConfig, PlanNodeId, QueryId, init_tracing};
use rill_execution::nodes::{SinkNode, SourceNode};
use rill_execution::{ExecGraph, ExecNodeKind, ExecState, FunctionRegistry, NoRemotePeers, TableStore};
use rill_storage::MemoryTableStore;
use tracing::info;

const OUTPUT_TABLE: &str = "cpu_usage";

fn env_usize_or_default(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn load_config() -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let base = match env::var("RILL_CONFIG_PATH") {
        Ok(path) => EngineConfig::load_from_json(&path)?,
        Err(_) => EngineConfig::default(),
    };
    Ok(base.with_env_overrides()?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info");
    let config = load_config()?;
    let polls = env_usize_or_default("RILL_CPU_POLLS", 5);

    let source = ProcStatSource::new(&config.proc_stat_path)?;
    let descriptor = ProcStatSource::usage_descriptor();
    let generator = MetricSourceGenerator::new(Box::new(source), polls)
        .with_interval(Duration::from_millis(config.metric_poll_interval_ms));

    let store = Arc::new(MemoryTableStore::new());
    let state = ExecState::new(
        Arc::new(FunctionRegistry::with_builtins()?),
        store.clone(),
        Arc::new(NoRemotePeers),
        QueryId::new_v4(),
    )
    .with_batch_size_rows(config.batch_size_rows);

    let mut graph = ExecGraph::new();
    graph.add_node(
        PlanNodeId(1),
        vec![],
        descriptor.clone(),
        ExecNodeKind::Source(SourceNode::generator(Box::new(generator))),
    )?;
    graph.add_node(
        PlanNodeId(2),
        vec![descriptor.clone()],
        descriptor,
        ExecNodeKind::Sink(SinkNode::new(OUTPUT_TABLE)),
    )?;
    graph.connect(PlanNodeId(1), PlanNodeId(2))?;

    info!(
        query_id = %state.query_id(),
        path = %config.proc_stat_path,
        polls,
        interval_ms = config.metric_poll_interval_ms,
        "collecting cpu usage"
    );
    graph.execute(&state)?;

    let table = store.get(OUTPUT_TABLE)?;
    let batches = table
        .batches
        .iter()
        .map(|b| b.to_record_batch())
        .collect::<Result<Vec<_>, _>>()?;
    println!("{}", pretty_format_batches(&batches)?);
    Ok(())
}
