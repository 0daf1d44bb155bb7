//! Receiving side of the channel transport.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use rill_common::{Result, RillError};
use rill_execution::{ExecGraph, ExecState};
use tracing::{debug, error, info};

use crate::ipc::decode_row_batch;
use crate::stub::{BatchEnvelope, PeerRequest, WireError};

/// Hosts an [`ExecGraph`] whose remote sources are fed by incoming envelopes.
pub struct PeerEndpoint;

impl PeerEndpoint {
    /// Prepare `graph` and serve it on a dedicated thread.
    ///
    /// The thread stops once the graph has finished, after the first failed
    /// request, or when every sender is dropped; it then closes the graph.
    pub fn spawn(
        peer_id: impl Into<String>,
        mut graph: ExecGraph,
        state: Arc<ExecState>,
        capacity: usize,
    ) -> Result<PeerHandle> {
        let peer_id = peer_id.into();
        graph.prepare(&state)?;
        let (sender, receiver) = bounded(capacity.max(1));
        let thread_peer = peer_id.clone();
        let join = thread::Builder::new()
            .name(format!("rill-peer-{peer_id}"))
            .spawn(move || serve(&thread_peer, graph, &state, receiver))?;
        Ok(PeerHandle {
            peer_id,
            sender,
            join,
        })
    }
}

pub struct PeerHandle {
    peer_id: String,
    sender: Sender<PeerRequest>,
    join: JoinHandle<Result<()>>,
}

impl PeerHandle {
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Address to register in a [`crate::ChannelStubFactory`].
    pub fn sender(&self) -> Sender<PeerRequest> {
        self.sender.clone()
    }

    /// Wait for the serving thread and return its outcome.
    pub fn join(self) -> Result<()> {
        drop(self.sender);
        self.join.join().map_err(|_| {
            RillError::Execution(format!("peer {} thread panicked", self.peer_id))
        })?
    }
}

fn serve(
    peer_id: &str,
    mut graph: ExecGraph,
    state: &ExecState,
    receiver: Receiver<PeerRequest>,
) -> Result<()> {
    info!(peer_id, query_id = %state.query_id(), "peer endpoint serving");
    let mut outcome = Ok(());
    while let Ok(PeerRequest { envelope, ack }) = receiver.recv() {
        let result = accept(&mut graph, state, envelope);
        let reply = result.as_ref().map(|_| ()).map_err(WireError::from);
        // The sender may have timed out and gone away.
        let _ = ack.send(reply);
        if let Err(e) = result {
            error!(peer_id, query_id = %state.query_id(), error = %e, "peer rejected batch");
            outcome = Err(e);
            break;
        }
        if graph.is_finished() {
            break;
        }
    }
    if outcome.is_ok() && !graph.is_finished() {
        outcome = Err(RillError::Unavailable(format!(
            "peer {peer_id} lost its senders before end of stream"
        )));
    }
    let closed = graph.close_all();
    info!(peer_id, query_id = %state.query_id(), ok = outcome.is_ok(), "peer endpoint stopped");
    outcome.and(closed)
}

fn accept(graph: &mut ExecGraph, state: &ExecState, envelope: BatchEnvelope) -> Result<()> {
    if envelope.query_id != state.query_id() {
        return Err(RillError::InvalidArgument(format!(
            "batch for query {} delivered to query {}",
            envelope.query_id,
            state.query_id()
        )));
    }
    let batch = decode_row_batch(
        &envelope.payload,
        envelope.end_of_window,
        envelope.end_of_stream,
    )?;
    debug!(
        query_id = %state.query_id(),
        node_id = envelope.destination.0,
        rows = batch.num_rows(),
        end_of_stream = batch.end_of_stream(),
        "remote batch received"
    );
    graph.push_remote(envelope.destination, batch, state)
}
