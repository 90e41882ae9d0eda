mod error;
mod message;
mod node;

pub use error::KrpcError;
pub use message::{Message, Query, Response};
pub use node::{decode_compact_nodes, Infohash, Node, NodeId, ID_LEN};
