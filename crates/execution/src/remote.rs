//! Remote stub contract.
//!
//! A stub stands in for a plan node that runs on another peer. Pushing a batch
//! through it delivers the batch to `destination` on that peer and waits for
//! the peer's acknowledgement.

use std::fmt::Debug;
use std::sync::Arc;

use rill_common::{PlanNodeId, QueryId, Result, RillError};

use crate::row_batch::RowBatch;

pub trait RemoteStub: Send + Sync + Debug {
    fn peer_id(&self) -> &str;

    /// Deliver one batch. Returns once the peer accepted it, or with the
    /// peer's error / a transport error (`Unavailable`).
    fn push_batch(&self, query_id: QueryId, destination: PlanNodeId, batch: &RowBatch)
    -> Result<()>;
}

/// Creates stubs on demand for [`crate::ExecState::get_remote_stub`].
pub trait RemoteStubFactory: Send + Sync + Debug {
    fn create_stub(&self, peer_id: &str) -> Result<Arc<dyn RemoteStub>>;
}

/// Factory for single-process queries: every peer is unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemotePeers;

impl RemoteStubFactory for NoRemotePeers {
    fn create_stub(&self, peer_id: &str) -> Result<Arc<dyn RemoteStub>> {
        Err(RillError::NotFound(format!("unknown peer: {peer_id}")))
    }
}
