//! Operator variants wired together by [`crate::ExecGraph`].

mod aggregate;
mod filter;
mod map;
mod remote;
mod sink;
mod source;
mod union;

pub use aggregate::AggregateNode;
pub use filter::FilterNode;
pub use map::MapNode;
pub use remote::{RemoteSinkNode, RemoteSourceNode};
pub use sink::SinkNode;
pub use source::{BatchGenerator, SourceNode};
pub use union::UnionNode;
