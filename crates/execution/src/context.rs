//! Per-query execution state.
//!
//! `ExecState` is built once per query. Function bindings are registered
//! through `&mut self` before execution starts; afterwards the state is shared
//! read-only. The remote stub cache is the only part mutated during execution.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use arrow_schema::DataType;
use rill_common::{CallSiteId, EngineConfig, MetricsRegistry, PlanNodeId, QueryId, Result, RillError};
use tracing::debug;

use crate::plan::PlanNode;
use crate::remote::{RemoteStub, RemoteStubFactory};
use crate::table_store::TableStore;
use crate::udf::{FunctionRegistry, ScalarFunction, format_types};

/// A function resolved for one call site.
#[derive(Clone)]
pub struct BoundFunction {
    pub function: Arc<dyn ScalarFunction>,
    pub arg_types: Vec<DataType>,
    pub return_type: DataType,
}

impl fmt::Debug for BoundFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundFunction")
            .field("name", &self.function.name())
            .field("arg_types", &self.arg_types)
            .field("return_type", &self.return_type)
            .finish()
    }
}

pub struct ExecState {
    query_id: QueryId,
    registry: Arc<FunctionRegistry>,
    table_store: Arc<dyn TableStore>,
    stub_factory: Arc<dyn RemoteStubFactory>,
    bound: HashMap<(PlanNodeId, CallSiteId), Arc<BoundFunction>>,
    stubs: Mutex<HashMap<String, Arc<dyn RemoteStub>>>,
    metrics: MetricsRegistry,
    batch_size_rows: usize,
}

impl ExecState {
    pub fn new(
        registry: Arc<FunctionRegistry>,
        table_store: Arc<dyn TableStore>,
        stub_factory: Arc<dyn RemoteStubFactory>,
        query_id: QueryId,
    ) -> Self {
        Self {
            query_id,
            registry,
            table_store,
            stub_factory,
            bound: HashMap::new(),
            stubs: Mutex::new(HashMap::new()),
            metrics: rill_common::global_metrics().clone(),
            batch_size_rows: EngineConfig::default().batch_size_rows,
        }
    }

    /// Record operator and remote metrics into `metrics` instead of the
    /// process-wide registry.
    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = metrics;
        self
    }

    /// Upper bound on the rows of a batch emitted by a table source.
    pub fn with_batch_size_rows(mut self, rows: usize) -> Self {
        self.batch_size_rows = rows.max(1);
        self
    }

    /// Bind `function_name(arg_types)` to `(plan_node_id, call_site_id)`.
    ///
    /// # Errors
    /// - `NotFound` when no overload matches `arg_types` exactly;
    /// - `AlreadyExists` when the key is already bound.
    pub fn register_scalar_function(
        &mut self,
        plan_node_id: PlanNodeId,
        call_site_id: CallSiteId,
        function_name: &str,
        arg_types: &[DataType],
    ) -> Result<()> {
        let key = (plan_node_id, call_site_id);
        if self.bound.contains_key(&key) {
            return Err(RillError::AlreadyExists(format!(
                "call site {call_site_id} of node {plan_node_id} is already bound"
            )));
        }
        let function = self.registry.lookup(function_name, arg_types)?;
        debug!(
            query_id = %self.query_id,
            node_id = plan_node_id.0,
            call_site = call_site_id.0,
            function = function_name,
            args = %format_types(arg_types),
            "bound scalar function"
        );
        self.bound.insert(
            key,
            Arc::new(BoundFunction {
                return_type: function.return_type(),
                arg_types: arg_types.to_vec(),
                function,
            }),
        );
        Ok(())
    }

    pub fn get_bound_function(
        &self,
        plan_node_id: PlanNodeId,
        call_site_id: CallSiteId,
    ) -> Result<Arc<BoundFunction>> {
        self.bound
            .get(&(plan_node_id, call_site_id))
            .cloned()
            .ok_or_else(|| {
                RillError::NotFound(format!(
                    "no function bound for call site {call_site_id} of node {plan_node_id}"
                ))
            })
    }

    /// Register every function call found in `nodes`.
    pub fn register_plan_functions(&mut self, nodes: &[PlanNode]) -> Result<()> {
        for node in nodes {
            for (site, name, arg_types) in node.function_calls() {
                self.register_scalar_function(node.id, site, name, arg_types)?;
            }
        }
        Ok(())
    }

    /// Cached stub for `peer_id`, created through the factory on first use.
    ///
    /// Factory errors are returned unchanged and nothing is cached.
    pub fn get_remote_stub(&self, peer_id: &str) -> Result<Arc<dyn RemoteStub>> {
        let mut stubs = self.stubs.lock().expect("stub cache lock poisoned");
        if let Some(stub) = stubs.get(peer_id) {
            return Ok(Arc::clone(stub));
        }
        let stub = self.stub_factory.create_stub(peer_id)?;
        debug!(query_id = %self.query_id, peer_id, "created remote stub");
        stubs.insert(peer_id.to_string(), Arc::clone(&stub));
        Ok(stub)
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn table_store(&self) -> &Arc<dyn TableStore> {
        &self.table_store
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn batch_size_rows(&self) -> usize {
        self.batch_size_rows
    }
}

impl fmt::Debug for ExecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecState")
            .field("query_id", &self.query_id)
            .field("bound_functions", &self.bound.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use arrow_schema::DataType;
    use rill_common::{CallSiteId, PlanNodeId, QueryId, Result, RillError};

    use super::ExecState;
    use crate::remote::{NoRemotePeers, RemoteStub, RemoteStubFactory};
    use crate::row_batch::RowBatch;
    use crate::test_util::NullStore;
    use crate::udf::FunctionRegistry;

    fn state() -> ExecState {
        ExecState::new(
            Arc::new(FunctionRegistry::with_builtins().expect("builtins")),
            Arc::new(NullStore),
            Arc::new(NoRemotePeers),
            QueryId::new_v4(),
        )
    }

    #[test]
    fn binds_and_looks_up() {
        let mut s = state();
        s.register_scalar_function(
            PlanNodeId(1),
            CallSiteId(0),
            "eq",
            &[DataType::Int64, DataType::Int64],
        )
        .expect("bind");
        let f = s
            .get_bound_function(PlanNodeId(1), CallSiteId(0))
            .expect("bound");
        assert_eq!(f.function.name(), "eq");
        assert_eq!(f.return_type, DataType::Boolean);
        assert!(matches!(
            s.get_bound_function(PlanNodeId(2), CallSiteId(0)),
            Err(RillError::NotFound(_))
        ));
    }

    #[test]
    fn rebinding_a_key_is_rejected() {
        let mut s = state();
        let args = [DataType::Utf8, DataType::Utf8];
        s.register_scalar_function(PlanNodeId(1), CallSiteId(0), "eq", &args)
            .expect("bind");
        let err = s
            .register_scalar_function(PlanNodeId(1), CallSiteId(0), "ne", &args)
            .expect_err("duplicate");
        assert!(matches!(err, RillError::AlreadyExists(_)));
        // The original binding is untouched.
        let f = s
            .get_bound_function(PlanNodeId(1), CallSiteId(0))
            .expect("bound");
        assert_eq!(f.function.name(), "eq");
    }

    #[test]
    fn unknown_function_is_not_found() {
        let mut s = state();
        let err = s
            .register_scalar_function(PlanNodeId(1), CallSiteId(0), "nope", &[DataType::Int64])
            .expect_err("unknown");
        assert!(matches!(err, RillError::NotFound(_)));
    }

    #[derive(Debug, Default)]
    struct CountingFactory {
        created: AtomicUsize,
    }

    #[derive(Debug)]
    struct DummyStub(String);

    impl RemoteStub for DummyStub {
        fn peer_id(&self) -> &str {
            &self.0
        }

        fn push_batch(&self, _: QueryId, _: PlanNodeId, _: &RowBatch) -> Result<()> {
            Ok(())
        }
    }

    impl RemoteStubFactory for CountingFactory {
        fn create_stub(&self, peer_id: &str) -> Result<Arc<dyn RemoteStub>> {
            if peer_id == "down" {
                return Err(RillError::Unavailable("peer down".to_string()));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(DummyStub(peer_id.to_string())))
        }
    }

    #[test]
    fn stubs_are_cached_per_peer() {
        let factory = Arc::new(CountingFactory::default());
        let s = ExecState::new(
            Arc::new(FunctionRegistry::new()),
            Arc::new(NullStore),
            factory.clone(),
            QueryId::new_v4(),
        );
        let a = s.get_remote_stub("a").expect("a");
        let a2 = s.get_remote_stub("a").expect("a again");
        assert!(Arc::ptr_eq(&a, &a2));
        s.get_remote_stub("b").expect("b");
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert!(matches!(
            s.get_remote_stub("down"),
            Err(RillError::Unavailable(_))
        ));
    }

    #[test]
    fn no_remote_peers_is_not_found() {
        assert!(matches!(
            state().get_remote_stub("x"),
            Err(RillError::NotFound(_))
        ));
    }
}
