use std::sync::{Arc, OnceLock};

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

/// Prometheus-backed counters for operators, queries and remote pushes.
#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    operator_rows_in: CounterVec,
    operator_rows_out: CounterVec,
    operator_batches_in: CounterVec,
    operator_batches_out: CounterVec,
    operator_time_seconds: HistogramVec,
    queries_total: CounterVec,
    remote_batches_sent: CounterVec,
    remote_send_failures: CounterVec,
}

/// Per-call operator statistics recorded after one `consume_next`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperatorSample {
    /// Rows received by the operator.
    pub rows_in: u64,
    /// Rows emitted downstream.
    pub rows_out: u64,
    /// Batches received.
    pub batches_in: u64,
    /// Batches emitted.
    pub batches_out: u64,
    /// Time spent in the operator itself.
    pub secs: f64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    pub fn record_operator(&self, query_id: &str, node_id: u64, operator: &str, s: OperatorSample) {
        let node = node_id.to_string();
        let labels = [query_id, node.as_str(), operator];
        self.inner
            .operator_rows_in
            .with_label_values(&labels)
            .inc_by(s.rows_in as f64);
        self.inner
            .operator_rows_out
            .with_label_values(&labels)
            .inc_by(s.rows_out as f64);
        self.inner
            .operator_batches_in
            .with_label_values(&labels)
            .inc_by(s.batches_in as f64);
        self.inner
            .operator_batches_out
            .with_label_values(&labels)
            .inc_by(s.batches_out as f64);
        self.inner
            .operator_time_seconds
            .with_label_values(&labels)
            .observe(s.secs.max(0.0));
    }

    /// Count a query reaching a terminal `status` (`succeeded` / `failed`).
    pub fn inc_query(&self, status: &str) {
        self.inner.queries_total.with_label_values(&[status]).inc();
    }

    pub fn inc_remote_sent(&self, peer_id: &str) {
        self.inner
            .remote_batches_sent
            .with_label_values(&[peer_id])
            .inc();
    }

    pub fn inc_remote_failure(&self, peer_id: &str) {
        self.inner
            .remote_send_failures
            .with_label_values(&[peer_id])
            .inc();
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();
        let op_labels = &["query_id", "node_id", "operator"];

        let operator_rows_in = counter_vec(
            &registry,
            "rill_operator_rows_in_total",
            "Input rows consumed per operator",
            op_labels,
        );
        let operator_rows_out = counter_vec(
            &registry,
            "rill_operator_rows_out_total",
            "Output rows pushed downstream per operator",
            op_labels,
        );
        let operator_batches_in = counter_vec(
            &registry,
            "rill_operator_batches_in_total",
            "Input batches consumed per operator",
            op_labels,
        );
        let operator_batches_out = counter_vec(
            &registry,
            "rill_operator_batches_out_total",
            "Output batches pushed downstream per operator",
            op_labels,
        );
        let operator_time_seconds = histogram_vec(
            &registry,
            "rill_operator_time_seconds",
            "Time spent inside each operator",
            op_labels,
        );
        let queries_total = counter_vec(
            &registry,
            "rill_queries_total",
            "Queries that reached a terminal status",
            &["status"],
        );
        let remote_batches_sent = counter_vec(
            &registry,
            "rill_remote_batches_sent_total",
            "Batches acknowledged by remote peers",
            &["peer_id"],
        );
        let remote_send_failures = counter_vec(
            &registry,
            "rill_remote_send_failures_total",
            "Batches a remote peer rejected or never acknowledged",
            &["peer_id"],
        );

        Self {
            registry,
            operator_rows_in,
            operator_rows_out,
            operator_batches_in,
            operator_batches_out,
            operator_time_seconds,
            queries_total,
            remote_batches_sent,
            remote_send_failures,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

/// Process-wide registry used when a query does not bring its own.
pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}
