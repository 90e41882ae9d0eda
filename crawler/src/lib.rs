mod builder;
mod crawler;
mod session;
mod table;
mod transport;

pub use builder::{CrawlerBuilder, CrawlerBuilderError, DEFAULT_LISTEN_PORT};
pub use crawler::{Crawler, CrawlerError, CrawlerMessage, DiscoverySource};

// Re-exports.
pub use dht_harvest_krpc::{Infohash, KrpcError, Message, Node, NodeId, Query, Response};
