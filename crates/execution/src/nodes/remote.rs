use std::sync::Arc;

use rill_common::{PlanNodeId, Result, RillError};
use tracing::warn;

use crate::context::ExecState;
use crate::exec_node::{ExecNode, NodeContext};
use crate::remote::RemoteStub;
use crate::row_batch::RowBatch;

/// Entry point for batches shipped by a remote peer. The graph feeds it
/// through `push_remote`; it forwards them unchanged.
#[derive(Debug, Default)]
pub struct RemoteSourceNode;

impl ExecNode for RemoteSourceNode {
    fn name(&self) -> &'static str {
        "RemoteSource"
    }

    fn init(&mut self, ctx: &NodeContext, _state: &ExecState) -> Result<()> {
        ctx.expect_inputs(self.name(), 1)?;
        ctx.expect_output(self.name(), &ctx.input_descriptors[0])
    }

    fn consume_next(
        &mut self,
        _ctx: &NodeContext,
        _state: &ExecState,
        batch: RowBatch,
        _parent_index: usize,
    ) -> Result<Option<RowBatch>> {
        Ok(Some(batch))
    }
}

/// Forwards every consumed batch to `destination` on a remote peer.
#[derive(Debug)]
pub struct RemoteSinkNode {
    peer_id: String,
    destination: PlanNodeId,
    stub: Option<Arc<dyn RemoteStub>>,
}

impl RemoteSinkNode {
    pub fn new(peer_id: impl Into<String>, destination: PlanNodeId) -> Self {
        Self {
            peer_id: peer_id.into(),
            destination,
            stub: None,
        }
    }
}

impl ExecNode for RemoteSinkNode {
    fn name(&self) -> &'static str {
        "RemoteSink"
    }

    fn init(&mut self, ctx: &NodeContext, state: &ExecState) -> Result<()> {
        self.stub = None;
        ctx.expect_inputs(self.name(), 1)?;
        self.stub = Some(state.get_remote_stub(&self.peer_id)?);
        Ok(())
    }

    fn consume_next(
        &mut self,
        ctx: &NodeContext,
        state: &ExecState,
        batch: RowBatch,
        _parent_index: usize,
    ) -> Result<Option<RowBatch>> {
        let stub = self.stub.as_ref().ok_or_else(|| {
            RillError::InvalidState(format!("remote sink {} has no stub", ctx.id))
        })?;
        match stub.push_batch(state.query_id(), self.destination, &batch) {
            Ok(()) => {
                state.metrics().inc_remote_sent(&self.peer_id);
                Ok(None)
            }
            Err(e) => {
                state.metrics().inc_remote_failure(&self.peer_id);
                warn!(
                    query_id = %state.query_id(),
                    node_id = ctx.id.0,
                    peer_id = %self.peer_id,
                    destination = self.destination.0,
                    error = %e,
                    "remote push failed"
                );
                Err(e)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.stub = None;
        Ok(())
    }
}
