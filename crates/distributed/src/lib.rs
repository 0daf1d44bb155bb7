//! Distributed plumbing for Rill query graphs.
//!
//! Architecture role:
//! - encodes row batches as Arrow IPC for transport
//! - channel-backed remote stubs and the peer endpoints that receive them
//! - bounded concurrent execution of independent queries
//!
//! Key modules:
//! - [`ipc`]
//! - [`stub`]
//! - [`peer`]
//! - [`executor`]

pub mod executor;
pub mod ipc;
pub mod peer;
pub mod stub;

pub use executor::{QueryExecutor, QuerySummary, QueryTask};
pub use ipc::{decode_row_batch, encode_row_batch};
pub use peer::{PeerEndpoint, PeerHandle};
pub use stub::{BatchEnvelope, ChannelStub, ChannelStubFactory, PeerRequest, WireError, WireErrorKind};
