//! Builder pattern for configuring and creating crawler instances.

use crate::crawler::Crawler;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default UDP port the crawler listens on.
pub const DEFAULT_LISTEN_PORT: u16 = 6881;
/// Default pause between crawl cycles.
const DEFAULT_CRAWL_INTERVAL: Duration = Duration::from_secs(1);
/// Default routing-table capacity.
const DEFAULT_TABLE_CAPACITY: usize = 128;

/// Errors that can occur during crawler configuration.
#[derive(Debug, Clone)]
pub enum CrawlerBuilderError {
    /// The crawler has no bootstrap nodes to seed its first cycle from.
    EmptyBootstrapList,
    /// The routing table must be able to hold at least one node.
    ZeroTableCapacity,
}

impl fmt::Display for CrawlerBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerBuilderError::EmptyBootstrapList => {
                write!(f, "bootstrap node list is empty")
            }
            CrawlerBuilderError::ZeroTableCapacity => {
                write!(f, "routing table capacity must be at least 1")
            }
        }
    }
}

impl std::error::Error for CrawlerBuilderError {}

/// Builder for creating a customized [`Crawler`] instance.
///
/// # Example
///
/// ```
/// # fn main() -> Result<(), dht_harvest_crawler::CrawlerBuilderError> {
/// use dht_harvest_crawler::CrawlerBuilder;
/// use std::time::Duration;
///
/// let bootstrap = vec!["67.215.246.10:6881".parse().unwrap()];
///
/// // Crawler with default settings.
/// let basic_crawler = CrawlerBuilder::new(bootstrap.clone()).build()?;
///
/// // Crawler with custom settings.
/// let custom_crawler = CrawlerBuilder::new(bootstrap)
///     .with_crawl_interval(Duration::from_secs(5))
///     .with_table_capacity(256)
///     .with_sampling(false)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CrawlerBuilder {
    listen: SocketAddr,
    interval: Duration,
    bootstrap: Vec<SocketAddr>,
    table_capacity: usize,
    sampling: bool,
}

impl CrawlerBuilder {
    /// Create a new crawler builder seeded with the given bootstrap nodes.
    ///
    /// # Arguments
    ///
    /// * `bootstrap` - Well-known stable node addresses used to join the
    ///   network at the start of every crawl cycle.
    pub fn new(bootstrap: Vec<SocketAddr>) -> Self {
        CrawlerBuilder {
            listen: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
                DEFAULT_LISTEN_PORT,
            ),
            interval: DEFAULT_CRAWL_INTERVAL,
            bootstrap,
            table_capacity: DEFAULT_TABLE_CAPACITY,
            sampling: true,
        }
    }

    /// Set the address and port the UDP socket binds to.
    pub fn with_listen_address(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Set the pause between crawl cycles. Defaults to one second.
    pub fn with_crawl_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the routing-table capacity. Defaults to 128 nodes.
    pub fn with_table_capacity(mut self, capacity: usize) -> Self {
        self.table_capacity = capacity;
        self
    }

    /// Enable or disable BEP51 infohash sampling. Enabled by default.
    ///
    /// With sampling off the crawler still harvests passively from the
    /// get_peers and announce_peer queries other peers send it.
    pub fn with_sampling(mut self, sampling: bool) -> Self {
        self.sampling = sampling;
        self
    }

    /// Build the crawler with the configured options.
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - A configured crawler.
    /// * `Err(CrawlerBuilderError)` - If the configuration is unusable.
    pub fn build(self) -> Result<Crawler, CrawlerBuilderError> {
        if self.bootstrap.is_empty() {
            return Err(CrawlerBuilderError::EmptyBootstrapList);
        }
        if self.table_capacity == 0 {
            return Err(CrawlerBuilderError::ZeroTableCapacity);
        }
        Ok(Crawler {
            listen: self.listen,
            interval: self.interval,
            bootstrap: self.bootstrap,
            table_capacity: self.table_capacity,
            sampling: self.sampling,
        })
    }
}
