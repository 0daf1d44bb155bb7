use rill_common::{PlanNodeId, Result, RillError};

use crate::context::ExecState;
use crate::nodes::{
    AggregateNode, FilterNode, MapNode, RemoteSinkNode, RemoteSourceNode, SinkNode, SourceNode,
    UnionNode,
};
use crate::plan::{Operator, PlanNode};
use crate::row_batch::{RowBatch, RowDescriptor};

/// Lifecycle of a node inside an [`crate::ExecGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Initialized,
    Open,
    Closed,
}

/// Graph-owned facts about a node, handed to every operator call.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub id: PlanNodeId,
    /// One entry per input, in parent order.
    pub input_descriptors: Vec<RowDescriptor>,
    pub output_descriptor: RowDescriptor,
    /// Set by the graph before `consume_next`: every input has delivered
    /// end-of-stream, counting the batch being consumed.
    pub all_inputs_finished: bool,
}

impl NodeContext {
    pub(crate) fn expect_inputs(&self, operator: &str, n: usize) -> Result<()> {
        if self.input_descriptors.len() != n {
            return Err(RillError::InvalidArgument(format!(
                "{operator} node {} expects {n} input(s), has {}",
                self.id,
                self.input_descriptors.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn expect_output(&self, operator: &str, actual: &RowDescriptor) -> Result<()> {
        if !self.output_descriptor.is_compatible(actual) {
            return Err(RillError::InvalidArgument(format!(
                "{operator} node {} produces {actual} but declares {}",
                self.id, self.output_descriptor
            )));
        }
        Ok(())
    }
}

/// A push-based physical operator.
///
/// The graph owns lifecycle bookkeeping and batch validation; operators only
/// implement their own transformation. Operators are driven by one thread at
/// a time.
pub trait ExecNode: Send {
    fn name(&self) -> &'static str;

    /// Validate shapes and resolve bound functions. May run again while the
    /// node is still `Initialized` and must then produce the same result.
    /// A failed call drops whatever an earlier call resolved; the graph puts
    /// the node back into `Created`.
    fn init(&mut self, ctx: &NodeContext, state: &ExecState) -> Result<()>;

    /// Allocate per-execution working state.
    fn open(&mut self, _ctx: &NodeContext, _state: &ExecState) -> Result<()> {
        Ok(())
    }

    /// Consume one batch from input `parent_index` and return at most one
    /// batch for the children.
    fn consume_next(
        &mut self,
        ctx: &NodeContext,
        state: &ExecState,
        batch: RowBatch,
        parent_index: usize,
    ) -> Result<Option<RowBatch>>;

    /// Produce the next batch of a source. `None` once exhausted.
    fn generate_next(
        &mut self,
        ctx: &NodeContext,
        _state: &ExecState,
    ) -> Result<Option<RowBatch>> {
        Err(RillError::InvalidState(format!(
            "{} node {} does not generate batches",
            self.name(),
            ctx.id
        )))
    }

    /// Release buffers.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Closed set of operator variants.
pub enum ExecNodeKind {
    Source(SourceNode),
    RemoteSource(RemoteSourceNode),
    Filter(FilterNode),
    Map(MapNode),
    Aggregate(AggregateNode),
    Union(UnionNode),
    Sink(SinkNode),
    RemoteSink(RemoteSinkNode),
}

impl ExecNodeKind {
    pub fn from_plan(node: &PlanNode) -> Result<Self> {
        Ok(match &node.operator {
            Operator::MemorySource { table } => ExecNodeKind::Source(SourceNode::table(table)),
            Operator::RemoteSource => ExecNodeKind::RemoteSource(RemoteSourceNode::default()),
            Operator::Filter { predicate } => {
                ExecNodeKind::Filter(FilterNode::new(predicate.clone()))
            }
            Operator::Map { expressions } => ExecNodeKind::Map(MapNode::new(expressions.clone())),
            Operator::Aggregate {
                group_by,
                aggregates,
            } => ExecNodeKind::Aggregate(AggregateNode::new(group_by.clone(), aggregates.clone())),
            Operator::Union => ExecNodeKind::Union(UnionNode::default()),
            Operator::MemorySink { table } => ExecNodeKind::Sink(SinkNode::new(table)),
            Operator::RemoteSink {
                peer_id,
                destination,
            } => ExecNodeKind::RemoteSink(RemoteSinkNode::new(peer_id, *destination)),
        })
    }

    pub fn as_node_mut(&mut self) -> &mut dyn ExecNode {
        match self {
            ExecNodeKind::Source(n) => n,
            ExecNodeKind::RemoteSource(n) => n,
            ExecNodeKind::Filter(n) => n,
            ExecNodeKind::Map(n) => n,
            ExecNodeKind::Aggregate(n) => n,
            ExecNodeKind::Union(n) => n,
            ExecNodeKind::Sink(n) => n,
            ExecNodeKind::RemoteSink(n) => n,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExecNodeKind::Source(n) => n.name(),
            ExecNodeKind::RemoteSource(n) => n.name(),
            ExecNodeKind::Filter(n) => n.name(),
            ExecNodeKind::Map(n) => n.name(),
            ExecNodeKind::Aggregate(n) => n.name(),
            ExecNodeKind::Union(n) => n.name(),
            ExecNodeKind::Sink(n) => n.name(),
            ExecNodeKind::RemoteSink(n) => n.name(),
        }
    }

    /// Driven through `generate_next`.
    pub fn is_source(&self) -> bool {
        matches!(self, ExecNodeKind::Source(_))
    }

    /// Fed through `push_remote`.
    pub fn is_remote_source(&self) -> bool {
        matches!(self, ExecNodeKind::RemoteSource(_))
    }
}
