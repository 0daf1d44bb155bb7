//! Channel-backed remote stubs.
//!
//! A peer is addressed by a [`Sender<PeerRequest>`] registered in a
//! [`ChannelStubFactory`]. Every push carries its own acknowledgement channel
//! and blocks until the peer answers or the configured timeout elapses.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, SendTimeoutError, Sender, bounded};
use rill_common::{EngineConfig, PlanNodeId, QueryId, Result, RillError};
use rill_execution::{RemoteStub, RemoteStubFactory, RowBatch};
use tracing::debug;

use crate::ipc::encode_row_batch;

/// One batch in transit.
#[derive(Debug, Clone)]
pub struct BatchEnvelope {
    pub query_id: QueryId,
    pub destination: PlanNodeId,
    pub end_of_window: bool,
    pub end_of_stream: bool,
    /// Arrow IPC stream bytes.
    pub payload: Vec<u8>,
}

pub type Ack = std::result::Result<(), WireError>;

pub struct PeerRequest {
    pub envelope: BatchEnvelope,
    pub ack: Sender<Ack>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    InvalidState,
    Execution,
    Unavailable,
    InvalidConfig,
}

/// Error shipped back to the sender; keeps the error kind across the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireError {
    pub kind: WireErrorKind,
    pub message: String,
}

impl From<&RillError> for WireError {
    fn from(e: &RillError) -> Self {
        let (kind, message) = match e {
            RillError::InvalidArgument(m) => (WireErrorKind::InvalidArgument, m.clone()),
            RillError::NotFound(m) => (WireErrorKind::NotFound, m.clone()),
            RillError::AlreadyExists(m) => (WireErrorKind::AlreadyExists, m.clone()),
            RillError::InvalidState(m) => (WireErrorKind::InvalidState, m.clone()),
            RillError::Execution(m) => (WireErrorKind::Execution, m.clone()),
            RillError::Unavailable(m) => (WireErrorKind::Unavailable, m.clone()),
            RillError::InvalidConfig(m) => (WireErrorKind::InvalidConfig, m.clone()),
            RillError::Io(io) => (WireErrorKind::Execution, io.to_string()),
        };
        Self { kind, message }
    }
}

impl From<WireError> for RillError {
    fn from(e: WireError) -> Self {
        match e.kind {
            WireErrorKind::InvalidArgument => RillError::InvalidArgument(e.message),
            WireErrorKind::NotFound => RillError::NotFound(e.message),
            WireErrorKind::AlreadyExists => RillError::AlreadyExists(e.message),
            WireErrorKind::InvalidState => RillError::InvalidState(e.message),
            WireErrorKind::Execution => RillError::Execution(e.message),
            WireErrorKind::Unavailable => RillError::Unavailable(e.message),
            WireErrorKind::InvalidConfig => RillError::InvalidConfig(e.message),
        }
    }
}

/// Stub that ships batches over a crossbeam channel.
pub struct ChannelStub {
    peer_id: String,
    sender: Sender<PeerRequest>,
    timeout: Duration,
}

impl ChannelStub {
    pub fn new(peer_id: impl Into<String>, sender: Sender<PeerRequest>, timeout: Duration) -> Self {
        Self {
            peer_id: peer_id.into(),
            sender,
            timeout,
        }
    }
}

impl fmt::Debug for ChannelStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelStub")
            .field("peer_id", &self.peer_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemoteStub for ChannelStub {
    fn peer_id(&self) -> &str {
        &self.peer_id
    }

    fn push_batch(
        &self,
        query_id: QueryId,
        destination: PlanNodeId,
        batch: &RowBatch,
    ) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        let request = PeerRequest {
            envelope: BatchEnvelope {
                query_id,
                destination,
                end_of_window: batch.end_of_window(),
                end_of_stream: batch.end_of_stream(),
                payload: encode_row_batch(batch)?,
            },
            ack: ack_tx,
        };
        let bytes = request.envelope.payload.len();
        self.sender
            .send_timeout(request, self.timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => RillError::Unavailable(format!(
                    "peer {} did not accept a batch within {:?}",
                    self.peer_id, self.timeout
                )),
                SendTimeoutError::Disconnected(_) => {
                    RillError::Unavailable(format!("peer {} is disconnected", self.peer_id))
                }
            })?;
        debug!(
            query_id = %query_id,
            peer_id = %self.peer_id,
            destination = destination.0,
            rows = batch.num_rows(),
            bytes,
            "batch sent to peer"
        );
        match ack_rx.recv_timeout(self.timeout) {
            Ok(ack) => ack.map_err(RillError::from),
            Err(RecvTimeoutError::Timeout) => Err(RillError::Unavailable(format!(
                "peer {} did not acknowledge within {:?}",
                self.peer_id, self.timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(RillError::Unavailable(format!(
                "peer {} dropped the batch without acknowledging",
                self.peer_id
            ))),
        }
    }
}

/// Directory of reachable peers.
pub struct ChannelStubFactory {
    peers: RwLock<HashMap<String, Sender<PeerRequest>>>,
    timeout: Duration,
}

impl ChannelStubFactory {
    pub fn new(timeout: Duration) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(Duration::from_millis(config.remote_timeout_ms))
    }

    /// Register or replace a peer. Returns `true` when an existing entry was replaced.
    pub fn register_peer(&self, peer_id: impl Into<String>, sender: Sender<PeerRequest>) -> bool {
        self.peers
            .write()
            .expect("peer directory lock poisoned")
            .insert(peer_id.into(), sender)
            .is_some()
    }
}

impl fmt::Debug for ChannelStubFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut peers = self
            .peers
            .read()
            .expect("peer directory lock poisoned")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        peers.sort();
        f.debug_struct("ChannelStubFactory")
            .field("peers", &peers)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemoteStubFactory for ChannelStubFactory {
    fn create_stub(&self, peer_id: &str) -> Result<Arc<dyn RemoteStub>> {
        let sender = self
            .peers
            .read()
            .expect("peer directory lock poisoned")
            .get(peer_id)
            .cloned()
            .ok_or_else(|| RillError::NotFound(format!("unknown peer: {peer_id}")))?;
        Ok(Arc::new(ChannelStub::new(peer_id, sender, self.timeout)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use arrow::array::{ArrayRef, Int64Array};
    use arrow_schema::DataType;
    use crossbeam_channel::bounded;
    use rill_common::{PlanNodeId, QueryId, RillError};
    use rill_execution::{RemoteStubFactory, RowBatch, RowDescriptor};

    use super::{ChannelStubFactory, WireError, WireErrorKind};

    fn batch() -> RowBatch {
        let col: ArrayRef = Arc::new(Int64Array::from(vec![1, 2]));
        RowBatch::try_new(RowDescriptor::new(vec![DataType::Int64]), 2, vec![col], true, true)
            .expect("batch")
    }

    #[test]
    fn unknown_peer_is_not_found() {
        let factory = ChannelStubFactory::new(Duration::from_millis(10));
        assert!(matches!(
            factory.create_stub("ghost"),
            Err(RillError::NotFound(_))
        ));
    }

    #[test]
    fn missing_ack_times_out_as_unavailable() {
        let factory = ChannelStubFactory::new(Duration::from_millis(20));
        let (tx, _rx) = bounded(4);
        assert!(!factory.register_peer("slow", tx));
        let stub = factory.create_stub("slow").expect("stub");
        let err = stub
            .push_batch(QueryId::new_v4(), PlanNodeId(1), &batch())
            .expect_err("no ack");
        assert!(matches!(err, RillError::Unavailable(_)));
    }

    #[test]
    fn dropped_peer_is_unavailable() {
        let factory = ChannelStubFactory::new(Duration::from_millis(20));
        let (tx, rx) = bounded(1);
        factory.register_peer("gone", tx);
        drop(rx);
        let stub = factory.create_stub("gone").expect("stub");
        assert!(matches!(
            stub.push_batch(QueryId::new_v4(), PlanNodeId(1), &batch()),
            Err(RillError::Unavailable(_))
        ));
    }

    #[test]
    fn peer_errors_keep_their_kind() {
        let wire = WireError::from(&RillError::InvalidState("late batch".to_string()));
        assert_eq!(wire.kind, WireErrorKind::InvalidState);
        assert!(matches!(RillError::from(wire), RillError::InvalidState(m) if m == "late batch"));
    }
}
