//! Public crawler surface and discovery event types.

use crate::session::{CrawlSession, SessionConfig};
use crate::transport::{Datagrams, UdpTransport};
use dht_harvest_krpc::{Infohash, NodeId};
use log::info;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver};

/// Buffered discovery events before the sender starts awaiting the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// How an infohash came to the crawler's attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    /// Passively observed in a get_peers or announce_peer query.
    Observed,
    /// Actively requested from a node via BEP51 sampling.
    Sampled,
}

/// Messages sent from the [`Crawler`] to the caller about infohash discovery.
///
/// No deduplication happens upstream; the same infohash can and will arrive
/// repeatedly as different peers look it up.
#[derive(Debug, Clone)]
pub enum CrawlerMessage {
    /// One discovery event: infohashes observed from a single peer.
    Infohashes {
        /// The discovered infohashes, in observation order.
        hashes: Vec<Infohash>,
        /// The peer the discovery is attributed to.
        peer: SocketAddr,
        /// Passive observation or active sampling.
        source: DiscoverySource,
    },
}

impl fmt::Display for CrawlerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerMessage::Infohashes {
                hashes,
                peer,
                source,
            } => {
                let source = match source {
                    DiscoverySource::Observed => "observed",
                    DiscoverySource::Sampled => "sampled",
                };
                write!(f, "{} infohash(es) from {peer} ({source})", hashes.len())
            }
        }
    }
}

/// Errors that can occur while starting the crawler.
#[derive(Debug)]
pub enum CrawlerError {
    /// The UDP socket could not be bound.
    Bind(io::Error),
}

impl fmt::Display for CrawlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerError::Bind(err) => write!(f, "failed to bind udp socket: {err}"),
        }
    }
}

impl std::error::Error for CrawlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CrawlerError::Bind(err) => Some(err),
        }
    }
}

/// A crawler for the BitTorrent DHT.
///
/// The crawler joins the DHT under a throwaway identity, expands its view of
/// the network every cycle through neighbor-biased find_node queries, and
/// surfaces the infohashes peers are looking up, announcing, or willing to
/// sample out.
///
/// Built via [`CrawlerBuilder`](crate::CrawlerBuilder).
#[derive(Debug, Clone)]
pub struct Crawler {
    /// Address and port the UDP socket binds to.
    pub(crate) listen: SocketAddr,
    /// Pause between crawl cycles.
    pub(crate) interval: Duration,
    /// Well-known nodes contacted at the start of every cycle.
    pub(crate) bootstrap: Vec<SocketAddr>,
    /// Routing-table capacity.
    pub(crate) table_capacity: usize,
    /// Whether to issue BEP51 sample_infohashes queries.
    pub(crate) sampling: bool,
}

impl Crawler {
    /// Start crawling: bind the socket, generate a fresh identity, and begin
    /// the cycle timer.
    ///
    /// Discovery events arrive on the returned channel as peers interact with
    /// the crawler. The crawler is stateless across restarts; its identity is
    /// regenerated on every call.
    ///
    /// # Termination
    ///
    /// Dropping the receiver stops the crawler: the cycle timer is cancelled,
    /// the receive loop exits, and the socket closes once in-flight sends
    /// have completed. Queries already queued may still go out; their
    /// responses go nowhere.
    ///
    /// # Returns
    ///
    /// * `Ok(Receiver<CrawlerMessage>)` - A channel receiving discovery events.
    /// * `Err(CrawlerError)` - If the socket could not be bound.
    pub async fn crawl(&self) -> Result<Receiver<CrawlerMessage>, CrawlerError> {
        let transport = UdpTransport::bind(self.listen)
            .await
            .map_err(CrawlerError::Bind)?;
        let local_addr = transport.local_addr().map_err(CrawlerError::Bind)?;
        let local_id = NodeId::generate();
        info!("dht crawler listening on {local_addr} as {local_id}");

        let (crawl_tx, crawl_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let config = SessionConfig {
            interval: self.interval,
            bootstrap: self.bootstrap.clone(),
            table_capacity: self.table_capacity,
            sampling: self.sampling,
        };
        let session = CrawlSession::new(config, Arc::new(transport), local_id, local_addr, crawl_tx);
        tokio::spawn(session.run());

        Ok(crawl_rx)
    }
}
