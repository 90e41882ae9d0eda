//! Crawl-cycle scheduling and inbound KRPC dispatch.
//!
//! A session runs two cooperating tasks over one shared socket: the cycle
//! loop, which fires the periodic reset/bootstrap/expand/sample sequence, and
//! the receive loop, which classifies every inbound datagram and either
//! updates the routing table, answers the querying peer, or emits discovered
//! infohashes. The routing table sits behind a mutex; mutations are cheap and
//! the two loops are the only writers.
//!
//! Outbound queries are fire and forget. There is no pending-request table,
//! no timeout, and no retry: an unanswered query simply contributes nothing
//! to the cycle. Responses are accepted by shape, not by transaction id.

use crate::crawler::{CrawlerMessage, DiscoverySource};
use crate::table::RoutingTable;
use crate::transport::Datagrams;
use dht_harvest_krpc::{decode_compact_nodes, Infohash, Message, NodeId, Query, Response};
use log::{debug, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};

/// Receive buffer size, comfortably above any KRPC datagram seen in practice.
const RECV_BUFFER_LEN: usize = 2048;

/// Configuration for a crawl session.
#[derive(Debug, Clone)]
pub(crate) struct SessionConfig {
    pub interval: Duration,
    pub bootstrap: Vec<SocketAddr>,
    pub table_capacity: usize,
    pub sampling: bool,
}

/// Execution engine for a [`Crawler`](crate::Crawler) instance.
pub(crate) struct CrawlSession<D> {
    config: SessionConfig,
    transport: Arc<D>,
    /// The identity professed in bootstrap queries and used to derive
    /// neighbor identities everywhere else. Fresh per session.
    local_id: NodeId,
    local_addr: SocketAddr,
    table: Arc<Mutex<RoutingTable>>,
    crawl_tx: mpsc::Sender<CrawlerMessage>,
}

impl<D> Clone for CrawlSession<D> {
    fn clone(&self) -> Self {
        CrawlSession {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            local_id: self.local_id,
            local_addr: self.local_addr,
            table: Arc::clone(&self.table),
            crawl_tx: self.crawl_tx.clone(),
        }
    }
}

impl<D: Datagrams> CrawlSession<D> {
    pub fn new(
        config: SessionConfig,
        transport: Arc<D>,
        local_id: NodeId,
        local_addr: SocketAddr,
        crawl_tx: mpsc::Sender<CrawlerMessage>,
    ) -> Self {
        let table = RoutingTable::new(local_id, local_addr, config.table_capacity);
        CrawlSession {
            config,
            transport,
            local_id,
            local_addr,
            table: Arc::new(Mutex::new(table)),
            crawl_tx,
        }
    }

    /// Drive the session until the event receiver is dropped.
    pub async fn run(self) {
        let receiver = self.clone();
        let receive_task = tokio::spawn(async move { receiver.receive_loop().await });
        self.cycle_loop().await;
        let _ = receive_task.await;
    }

    /// Fire crawl cycles on the configured interval.
    ///
    /// The loop is a single task, so a cycle can never overlap itself; a tick
    /// that fires while the previous cycle is still dispatching is delayed,
    /// not run concurrently.
    async fn cycle_loop(&self) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.crawl_tx.closed() => {
                    debug!("receiver dropped, stopping crawl cycles");
                    break;
                }
            }
            self.cycle().await;
        }
    }

    /// One crawl cycle: reset, bootstrap, neighbor expansion, optional sampling.
    ///
    /// The nodes gathered since the previous reset are this cycle's expansion
    /// frontier; the table populated during one cycle feeds the next cycle's
    /// expansion step. How much lands in the table per cycle depends on
    /// wall-clock timing of responses, which is fine for best-effort crawling.
    async fn cycle(&self) {
        let frontier = {
            let mut table = self.table.lock().await;
            let frontier = table.snapshot();
            table.reset();
            frontier
        };
        debug!(
            "crawl cycle: {} bootstrap node(s), {} frontier node(s)",
            self.config.bootstrap.len(),
            frontier.len()
        );

        for addr in &self.config.bootstrap {
            self.queue_find_node(*addr, self.local_id, self.local_id);
        }

        for node in &frontier {
            let neighbor = node.id.neighbor(&self.local_id);
            self.queue_find_node(node.addr, neighbor, neighbor);
        }

        if self.config.sampling {
            for node in &frontier {
                self.queue_sample_infohashes(node.addr, node.id);
            }
        }
    }

    /// Queue an outbound find_node query.
    ///
    /// The per-send request id is generated on a spawned task, so completion
    /// is eventual and unordered relative to other sends and to inbound
    /// datagrams. Sends that complete after shutdown fail silently.
    fn queue_find_node(&self, dest: SocketAddr, profess: NodeId, target: NodeId) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let request_id = NodeId::generate();
            let message = Message::find_node_query(profess, target, request_id);
            send_message(&*transport, &message, dest).await;
        });
    }

    /// Queue an outbound BEP51 sample_infohashes query targeting the remote
    /// node's own neighborhood.
    fn queue_sample_infohashes(&self, dest: SocketAddr, target: NodeId) {
        let transport = Arc::clone(&self.transport);
        let profess = self.local_id;
        tokio::spawn(async move {
            let request_id = NodeId::generate();
            let message = Message::sample_infohashes_query(profess, target, request_id);
            send_message(&*transport, &message, dest).await;
        });
    }

    /// Pull datagrams off the socket until the event receiver is dropped.
    async fn receive_loop(&self) {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        loop {
            tokio::select! {
                _ = self.crawl_tx.closed() => {
                    debug!("receiver dropped, stopping datagram loop");
                    break;
                }
                received = self.transport.recv_from(&mut buf) => match received {
                    Ok((len, from)) => self.handle_datagram(&buf[..len], from).await,
                    Err(err) => warn!("udp receive error: {err}"),
                }
            }
        }
    }

    /// Single entry point for inbound datagrams.
    ///
    /// Decode and validation failures are logged and dropped here; one
    /// malformed or hostile datagram never affects the next one, and never
    /// touches crawler state.
    async fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) {
        match Message::decode(datagram) {
            Ok(Some(message)) => self.dispatch(message, from).await,
            Ok(None) => {}
            Err(err) => debug!("dropping datagram from {from}: {err}"),
        }
    }

    async fn dispatch(&self, message: Message, from: SocketAddr) {
        match message {
            Message::Response { response, .. } => match response {
                Response::Samples { samples, nodes, .. } => {
                    if !samples.is_empty() {
                        self.emit(samples, from, DiscoverySource::Sampled).await;
                    }
                    self.accept_nodes(&nodes).await;
                }
                Response::Nodes { nodes, .. } => self.accept_nodes(&nodes).await,
                // Shapes we never solicit; nothing to harvest from them.
                Response::Id { .. } | Response::GetPeers { .. } => {}
            },
            Message::Query {
                transaction_id,
                query,
            } => match query {
                Query::Ping { id } => self.on_ping(transaction_id, id, from).await,
                Query::FindNode { id, .. } => self.on_find_node(transaction_id, id, from).await,
                Query::GetPeers { info_hash, .. } => {
                    self.on_get_peers(transaction_id, info_hash, from).await
                }
                Query::AnnouncePeer {
                    id,
                    info_hash,
                    token,
                    port,
                    implied_port,
                } => {
                    self.on_announce_peer(
                        transaction_id,
                        id,
                        info_hash,
                        token,
                        port,
                        implied_port,
                        from,
                    )
                    .await
                }
                // This crawler keeps no sample store to serve from.
                Query::SampleInfohashes { .. } => {}
            },
        }
    }

    /// Fold a packed node list into the routing table.
    async fn accept_nodes(&self, blob: &[u8]) {
        let nodes = decode_compact_nodes(blob);
        if nodes.is_empty() {
            return;
        }
        let mut table = self.table.lock().await;
        for node in nodes {
            // The compact form caps ports at 65535, so the out-of-range check
            // reduces to rejecting zero. Self-reference checks live in push.
            if node.addr.port() == 0 {
                continue;
            }
            table.push(node);
        }
        debug!("routing table holds {} node(s)", table.len());
    }

    /// Answer a ping, professing an identity close to the requester so it
    /// keeps us in its routing table.
    async fn on_ping(&self, transaction_id: Vec<u8>, requester: NodeId, from: SocketAddr) {
        let reply = Message::Response {
            transaction_id,
            response: Response::Id {
                id: requester.neighbor(&self.local_id),
            },
        };
        send_message(&*self.transport, &reply, from).await;
    }

    /// Answer a find_node query.
    ///
    /// The node list deliberately echoes our own identity instead of real
    /// peer data; this crawler does not help others route.
    async fn on_find_node(&self, transaction_id: Vec<u8>, requester: NodeId, from: SocketAddr) {
        let reply = Message::Response {
            transaction_id,
            response: Response::Nodes {
                id: Some(requester.neighbor(&self.local_id)),
                nodes: self.local_id.as_bytes().to_vec(),
            },
        };
        send_message(&*self.transport, &reply, from).await;
    }

    /// Answer a get_peers query and harvest the infohash being looked up.
    /// This is the primary passive-harvesting path.
    async fn on_get_peers(&self, transaction_id: Vec<u8>, info_hash: Infohash, from: SocketAddr) {
        let reply = Message::Response {
            transaction_id,
            response: Response::GetPeers {
                id: NodeId::from(*info_hash.as_bytes()).neighbor(&self.local_id),
                nodes: Vec::new(),
                token: info_hash.token().to_vec(),
            },
        };
        send_message(&*self.transport, &reply, from).await;
        self.emit(vec![info_hash], from, DiscoverySource::Observed)
            .await;
    }

    /// Validate and harvest an announce.
    ///
    /// Token mismatches and unusable ports are expected adversarial noise:
    /// silent drops, no reply, no emission, no error logged.
    #[allow(clippy::too_many_arguments)]
    async fn on_announce_peer(
        &self,
        transaction_id: Vec<u8>,
        requester: NodeId,
        info_hash: Infohash,
        token: Vec<u8>,
        port: i64,
        implied_port: bool,
        from: SocketAddr,
    ) {
        // Only peers holding a token from our own get_peers reply may announce.
        if token != info_hash.token() {
            return;
        }

        let resolved_port = if implied_port {
            i64::from(from.port())
        } else {
            port
        };
        if resolved_port <= 0 || resolved_port >= 65536 {
            return;
        }

        let reply = Message::Response {
            transaction_id,
            response: Response::Id {
                id: requester.neighbor(&self.local_id),
            },
        };
        send_message(&*self.transport, &reply, from).await;

        let peer = SocketAddr::new(from.ip(), resolved_port as u16);
        self.emit(vec![info_hash], peer, DiscoverySource::Observed)
            .await;
    }

    /// Emit one discovery event toward the indexing layer.
    async fn emit(&self, hashes: Vec<Infohash>, peer: SocketAddr, source: DiscoverySource) {
        let event = CrawlerMessage::Infohashes {
            hashes,
            peer,
            source,
        };
        if self.crawl_tx.send(event).await.is_err() {
            debug!("receiver dropped, discovery event discarded");
        }
    }
}

/// Encode and send a message, swallowing transport errors.
///
/// A failed send is indistinguishable from a dropped reply to the rest of the
/// crawler, so it is only worth a log line.
async fn send_message<D: Datagrams>(transport: &D, message: &Message, dest: SocketAddr) {
    match message.encode() {
        Ok(bytes) => {
            if let Err(err) = transport.send_to(&bytes, dest).await {
                debug!("failed to send to {dest}: {err}");
            }
        }
        Err(err) => warn!("failed to encode outbound message: {err}"),
    }
}
