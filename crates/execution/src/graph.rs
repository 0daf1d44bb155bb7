//! Arena graph that owns node lifecycle and push delivery.
//!
//! Nodes live in a `Vec` indexed by insertion order and are addressed by their
//! [`PlanNodeId`]. `parents` of a node are its upstream producers in input
//! order; `children` are `(consumer, input index at the consumer)` pairs.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use rill_common::{OperatorSample, PlanNodeId, Result, RillError};
use tracing::{debug, error, info};

use crate::context::ExecState;
use crate::exec_node::{ExecNodeKind, NodeContext, NodeState};
use crate::plan::PlanNode;
use crate::row_batch::{RowBatch, RowDescriptor};

struct NodeSlot {
    kind: ExecNodeKind,
    ctx: NodeContext,
    state: NodeState,
    parents: Vec<usize>,
    children: Vec<(usize, usize)>,
    eos_seen: Vec<bool>,
    emitted_eos: bool,
}

impl NodeSlot {
    fn all_inputs_finished(&self) -> bool {
        self.eos_seen.iter().all(|&s| s)
    }
}

#[derive(Default)]
pub struct ExecGraph {
    nodes: Vec<NodeSlot>,
    index: HashMap<PlanNodeId, usize>,
}

impl ExecGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from plan descriptors.
    ///
    /// Nodes may appear in any order; parents are connected in declared input
    /// order.
    pub fn from_plan(plan: &[PlanNode]) -> Result<Self> {
        let mut graph = Self::new();
        for node in plan {
            if node.parents.len() != node.input_descriptors.len()
                && !matches!(node.operator, crate::plan::Operator::RemoteSource)
            {
                return Err(RillError::InvalidArgument(format!(
                    "node {} lists {} parents but {} input descriptors",
                    node.id,
                    node.parents.len(),
                    node.input_descriptors.len()
                )));
            }
            graph.add_node(
                node.id,
                node.input_descriptors.clone(),
                node.output_descriptor.clone(),
                ExecNodeKind::from_plan(node)?,
            )?;
        }
        for node in plan {
            for parent in &node.parents {
                if !graph.index.contains_key(parent) {
                    return Err(RillError::InvalidArgument(format!(
                        "node {} lists unknown parent {parent}",
                        node.id
                    )));
                }
                graph.connect(*parent, node.id)?;
            }
        }
        Ok(graph)
    }

    /// Add a node. Remote sources without declared inputs get one implicit
    /// input shaped like their output.
    pub fn add_node(
        &mut self,
        id: PlanNodeId,
        input_descriptors: Vec<RowDescriptor>,
        output_descriptor: RowDescriptor,
        kind: ExecNodeKind,
    ) -> Result<()> {
        if self.index.contains_key(&id) {
            return Err(RillError::InvalidArgument(format!(
                "duplicate plan node id {id}"
            )));
        }
        let input_descriptors = if kind.is_remote_source() && input_descriptors.is_empty() {
            vec![output_descriptor.clone()]
        } else {
            input_descriptors
        };
        let eos_seen = vec![false; input_descriptors.len()];
        self.index.insert(id, self.nodes.len());
        self.nodes.push(NodeSlot {
            kind,
            ctx: NodeContext {
                id,
                input_descriptors,
                output_descriptor,
                all_inputs_finished: false,
            },
            state: NodeState::Created,
            parents: Vec::new(),
            children: Vec::new(),
            eos_seen,
            emitted_eos: false,
        });
        Ok(())
    }

    /// Wire `parent`'s output into the next free input of `child`.
    pub fn connect(&mut self, parent: PlanNodeId, child: PlanNodeId) -> Result<()> {
        let p = self.slot_index(parent)?;
        let c = self.slot_index(child)?;
        if self.nodes[p].state != NodeState::Created || self.nodes[c].state != NodeState::Created {
            return Err(RillError::InvalidState(
                "nodes can only be connected before init".to_string(),
            ));
        }
        let input = self.nodes[c].parents.len();
        let expected = self.nodes[c].ctx.input_descriptors.get(input).ok_or_else(|| {
            RillError::InvalidArgument(format!(
                "node {child} has no free input for parent {parent}"
            ))
        })?;
        let produced = &self.nodes[p].ctx.output_descriptor;
        if !produced.is_compatible(expected) {
            return Err(RillError::InvalidArgument(format!(
                "node {parent} produces {produced} but input {input} of node {child} expects {expected}"
            )));
        }
        if p == c || self.reaches(c, p) {
            return Err(RillError::InvalidArgument(format!(
                "edge {parent} -> {child} would create a cycle"
            )));
        }
        self.nodes[c].parents.push(p);
        self.nodes[p].children.push((c, input));
        Ok(())
    }

    fn reaches(&self, from: usize, to: usize) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(n) = stack.pop() {
            if n == to {
                return true;
            }
            if std::mem::replace(&mut seen[n], true) {
                continue;
            }
            stack.extend(self.nodes[n].children.iter().map(|&(c, _)| c));
        }
        false
    }

    /// Producers before consumers; ties keep insertion order.
    fn topo_order(&self) -> Vec<usize> {
        let mut indegree = self
            .nodes
            .iter()
            .map(|n| n.parents.len())
            .collect::<Vec<_>>();
        let mut ready = (0..self.nodes.len())
            .filter(|&i| indegree[i] == 0)
            .collect::<VecDeque<_>>();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(n) = ready.pop_front() {
            order.push(n);
            for &(c, _) in &self.nodes[n].children {
                indegree[c] -= 1;
                if indegree[c] == 0 {
                    ready.push_back(c);
                }
            }
        }
        order
    }

    fn slot_index(&self, id: PlanNodeId) -> Result<usize> {
        self.index
            .get(&id)
            .copied()
            .ok_or_else(|| RillError::NotFound(format!("plan node {id} is not in the graph")))
    }

    pub fn node_state(&self, id: PlanNodeId) -> Result<NodeState> {
        Ok(self.nodes[self.slot_index(id)?].state)
    }

    pub fn init_node(&mut self, id: PlanNodeId, state: &ExecState) -> Result<()> {
        let idx = self.slot_index(id)?;
        self.init_at(idx, state)
    }

    fn init_at(&mut self, idx: usize, state: &ExecState) -> Result<()> {
        let slot = &mut self.nodes[idx];
        match slot.state {
            NodeState::Created | NodeState::Initialized => {}
            other => {
                return Err(RillError::InvalidState(format!(
                    "cannot init node {} in state {other:?}",
                    slot.ctx.id
                )));
            }
        }
        if let Err(e) = slot.kind.as_node_mut().init(&slot.ctx, state) {
            slot.state = NodeState::Created;
            return Err(e);
        }
        slot.state = NodeState::Initialized;
        debug!(
            query_id = %state.query_id(),
            node_id = slot.ctx.id.0,
            operator = slot.kind.name(),
            "node initialized"
        );
        Ok(())
    }

    pub fn open_node(&mut self, id: PlanNodeId, state: &ExecState) -> Result<()> {
        let idx = self.slot_index(id)?;
        self.open_at(idx, state)
    }

    fn open_at(&mut self, idx: usize, state: &ExecState) -> Result<()> {
        let slot = &mut self.nodes[idx];
        if slot.state != NodeState::Initialized {
            return Err(RillError::InvalidState(format!(
                "cannot open node {} in state {:?}",
                slot.ctx.id, slot.state
            )));
        }
        slot.kind.as_node_mut().open(&slot.ctx, state)?;
        slot.state = NodeState::Open;
        debug!(
            query_id = %state.query_id(),
            node_id = slot.ctx.id.0,
            operator = slot.kind.name(),
            "node opened"
        );
        Ok(())
    }

    pub fn close_node(&mut self, id: PlanNodeId) -> Result<()> {
        let idx = self.slot_index(id)?;
        self.close_at(idx)
    }

    fn close_at(&mut self, idx: usize) -> Result<()> {
        let slot = &mut self.nodes[idx];
        if slot.state == NodeState::Closed {
            return Err(RillError::InvalidState(format!(
                "node {} is already closed",
                slot.ctx.id
            )));
        }
        slot.state = NodeState::Closed;
        slot.kind.as_node_mut().close()
    }

    pub fn init_all(&mut self, state: &ExecState) -> Result<()> {
        for idx in self.topo_order() {
            self.init_at(idx, state)?;
        }
        Ok(())
    }

    pub fn open_all(&mut self, state: &ExecState) -> Result<()> {
        for idx in self.topo_order() {
            self.open_at(idx, state)?;
        }
        Ok(())
    }

    /// `init_all` then `open_all`.
    pub fn prepare(&mut self, state: &ExecState) -> Result<()> {
        self.init_all(state)?;
        self.open_all(state)
    }

    /// Close every node. Returns the first error, still closing the rest.
    pub fn close_all(&mut self) -> Result<()> {
        let mut first = None;
        for idx in self.topo_order() {
            if let Err(e) = self.close_at(idx) {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Push `batch` into input `parent_index` of node `id`, then on to its
    /// children.
    pub fn consume_next(
        &mut self,
        id: PlanNodeId,
        batch: RowBatch,
        parent_index: usize,
        state: &ExecState,
    ) -> Result<()> {
        let idx = self.slot_index(id)?;
        self.deliver(idx, batch, parent_index, state)
    }

    /// Feed a batch that arrived from a remote peer into remote source `id`.
    pub fn push_remote(&mut self, id: PlanNodeId, batch: RowBatch, state: &ExecState) -> Result<()> {
        let idx = self.slot_index(id)?;
        if !self.nodes[idx].kind.is_remote_source() {
            return Err(RillError::InvalidArgument(format!(
                "node {id} is not a remote source"
            )));
        }
        self.deliver(idx, batch, 0, state)
    }

    /// Ask source `id` for its next batch and push it downstream.
    ///
    /// Returns `false` once the source has emitted end-of-stream.
    pub fn generate_next(&mut self, id: PlanNodeId, state: &ExecState) -> Result<bool> {
        let idx = self.slot_index(id)?;
        let slot = &mut self.nodes[idx];
        if !slot.kind.is_source() {
            return Err(RillError::InvalidArgument(format!("node {id} is not a source")));
        }
        if slot.state != NodeState::Open {
            return Err(RillError::InvalidState(format!(
                "cannot generate from node {id} in state {:?}",
                slot.state
            )));
        }
        if slot.emitted_eos {
            return Ok(false);
        }
        let started = Instant::now();
        let produced = slot.kind.as_node_mut().generate_next(&slot.ctx, state)?;
        let out = match produced {
            Some(batch) => batch,
            None => RowBatch::empty(slot.ctx.output_descriptor.clone(), true, true),
        };
        self.check_output(idx, &out)?;
        self.record(idx, state, 0, 0, Some(&out), started);
        self.emit(idx, out, state)?;
        Ok(!self.nodes[idx].emitted_eos)
    }

    fn deliver(
        &mut self,
        idx: usize,
        batch: RowBatch,
        parent_index: usize,
        state: &ExecState,
    ) -> Result<()> {
        let slot = &mut self.nodes[idx];
        let id = slot.ctx.id;
        if slot.state != NodeState::Open {
            return Err(RillError::InvalidState(format!(
                "node {id} is {:?}, not open",
                slot.state
            )));
        }
        let expected = slot.ctx.input_descriptors.get(parent_index).ok_or_else(|| {
            RillError::InvalidArgument(format!("node {id} has no input {parent_index}"))
        })?;
        if slot.eos_seen[parent_index] {
            return Err(RillError::InvalidState(format!(
                "input {parent_index} of node {id} already delivered end of stream"
            )));
        }
        if !batch.is_complete() {
            return Err(RillError::InvalidArgument(format!(
                "incomplete batch pushed into node {id}"
            )));
        }
        if !batch.descriptor().is_compatible(expected) {
            return Err(RillError::InvalidArgument(format!(
                "node {id} input {parent_index} expects {expected}, got {}",
                batch.descriptor()
            )));
        }

        if batch.end_of_stream() {
            slot.eos_seen[parent_index] = true;
        }
        slot.ctx.all_inputs_finished = slot.all_inputs_finished();
        let rows_in = batch.num_rows() as u64;
        debug!(
            query_id = %state.query_id(),
            node_id = id.0,
            operator = slot.kind.name(),
            input = parent_index,
            rows = rows_in,
            end_of_window = batch.end_of_window(),
            end_of_stream = batch.end_of_stream(),
            "consume batch"
        );

        let started = Instant::now();
        let produced = slot
            .kind
            .as_node_mut()
            .consume_next(&slot.ctx, state, batch, parent_index)?;
        let finished = slot.ctx.all_inputs_finished;
        let out = match produced {
            Some(out) => Some(out),
            None if finished && !slot.emitted_eos && !slot.children.is_empty() => Some(
                RowBatch::empty(slot.ctx.output_descriptor.clone(), true, true),
            ),
            None => None,
        };
        self.record(idx, state, rows_in, 1, out.as_ref(), started);

        match out {
            Some(out) => {
                self.check_output(idx, &out)?;
                if finished && !out.end_of_stream() {
                    return Err(RillError::Execution(format!(
                        "node {id} finished all inputs without emitting end of stream"
                    )));
                }
                self.emit(idx, out, state)
            }
            None => {
                if finished {
                    self.nodes[idx].emitted_eos = true;
                }
                Ok(())
            }
        }
    }

    fn check_output(&self, idx: usize, out: &RowBatch) -> Result<()> {
        let slot = &self.nodes[idx];
        let id = slot.ctx.id;
        if slot.emitted_eos {
            return Err(RillError::Execution(format!(
                "node {id} emitted a batch after end of stream"
            )));
        }
        if !out.is_complete() || !out.descriptor().is_compatible(&slot.ctx.output_descriptor) {
            return Err(RillError::Execution(format!(
                "node {id} emitted {} but declares {}",
                out.descriptor(),
                slot.ctx.output_descriptor
            )));
        }
        if out.end_of_stream() && !slot.kind.is_source() && !slot.all_inputs_finished() {
            return Err(RillError::Execution(format!(
                "node {id} emitted end of stream before all inputs finished"
            )));
        }
        Ok(())
    }

    fn emit(&mut self, idx: usize, out: RowBatch, state: &ExecState) -> Result<()> {
        if out.end_of_stream() {
            self.nodes[idx].emitted_eos = true;
        }
        let children = self.nodes[idx].children.clone();
        for (child, input) in children {
            self.deliver(child, out.clone(), input, state)?;
        }
        Ok(())
    }

    fn record(
        &self,
        idx: usize,
        state: &ExecState,
        rows_in: u64,
        batches_in: u64,
        out: Option<&RowBatch>,
        started: Instant,
    ) {
        let slot = &self.nodes[idx];
        state.metrics().record_operator(
            &state.query_id().to_string(),
            slot.ctx.id.0,
            slot.kind.name(),
            OperatorSample {
                rows_in,
                rows_out: out.map_or(0, |b| b.num_rows() as u64),
                batches_in,
                batches_out: u64::from(out.is_some()),
                secs: started.elapsed().as_secs_f64(),
            },
        );
    }

    /// Every source emitted end of stream and every leaf saw it on all inputs.
    pub fn is_finished(&self) -> bool {
        self.nodes.iter().all(|n| {
            if n.children.is_empty() && !n.kind.is_source() {
                n.all_inputs_finished()
            } else {
                n.emitted_eos
            }
        })
    }

    pub fn source_ids(&self) -> Vec<PlanNodeId> {
        self.topo_order()
            .into_iter()
            .filter(|&i| self.nodes[i].kind.is_source())
            .map(|i| self.nodes[i].ctx.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Run a self-contained graph: prepare, drive every source round-robin
    /// until end of stream, close.
    ///
    /// On failure every node is still closed and the first error is returned.
    pub fn execute(&mut self, state: &ExecState) -> Result<()> {
        if self.nodes.iter().any(|n| n.kind.is_remote_source()) {
            return Err(RillError::InvalidState(
                "graphs with remote sources are driven through push_remote".to_string(),
            ));
        }
        info!(query_id = %state.query_id(), nodes = self.nodes.len(), "graph execution started");
        let result = self.prepare(state).and_then(|()| self.drive(state));
        let closed = self.close_remaining();
        match result.and(closed) {
            Ok(()) => {
                info!(query_id = %state.query_id(), "graph execution finished");
                Ok(())
            }
            Err(e) => {
                error!(query_id = %state.query_id(), error = %e, "graph execution failed");
                Err(e)
            }
        }
    }

    fn drive(&mut self, state: &ExecState) -> Result<()> {
        let mut active = self.source_ids();
        while !active.is_empty() {
            let mut still = Vec::with_capacity(active.len());
            for id in active {
                if self.generate_next(id, state)? {
                    still.push(id);
                }
            }
            active = still;
        }
        Ok(())
    }

    fn close_remaining(&mut self) -> Result<()> {
        let mut first = None;
        for idx in self.topo_order() {
            if self.nodes[idx].state == NodeState::Closed {
                continue;
            }
            if let Err(e) = self.close_at(idx) {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for ExecGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.nodes
                    .iter()
                    .map(|n| (n.ctx.id.0, n.kind.name(), n.state)),
            )
            .finish()
    }
}
