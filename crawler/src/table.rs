//! Routing table: the crawl frontier for a single cycle.
//!
//! Deliberately not an LRU cache or a Kademlia bucket tree. The table is
//! wiped at the start of every crawl cycle, so it only ever holds the nodes
//! discovered since the last reset. Durability of known-good peers is not a
//! goal of this layer; freshness and bounded memory are.

use dht_harvest_krpc::{Node, NodeId};
use std::net::SocketAddr;

/// Bounded collection of nodes discovered during the current crawl cycle.
#[derive(Debug)]
pub(crate) struct RoutingTable {
    /// The crawler's own identity, never stored as an entry.
    local_id: NodeId,
    /// The crawler's own socket address, never stored as an entry.
    local_addr: SocketAddr,
    /// Maximum number of entries.
    capacity: usize,
    nodes: Vec<Node>,
}

impl RoutingTable {
    pub fn new(local_id: NodeId, local_addr: SocketAddr, capacity: usize) -> Self {
        RoutingTable {
            local_id,
            local_addr,
            capacity,
            nodes: Vec::new(),
        }
    }

    /// Empty the table. Called once per crawl cycle before any query is issued.
    pub fn reset(&mut self) {
        self.nodes.clear();
    }

    /// Insert a node, best effort.
    ///
    /// Entries referring to the local node are rejected, addresses already
    /// present are deduplicated, and once the table is full new observations
    /// are dropped rather than evicting existing entries.
    pub fn push(&mut self, node: Node) {
        if node.id == self.local_id || node.addr == self.local_addr {
            return;
        }
        if self.nodes.len() >= self.capacity {
            return;
        }
        if self.nodes.iter().any(|known| known.addr == node.addr) {
            return;
        }
        self.nodes.push(node);
    }

    /// Read-only enumeration of the current frontier.
    pub fn snapshot(&self) -> Vec<Node> {
        self.nodes.clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}
