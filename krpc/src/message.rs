//! KRPC message variants and their bencoded wire form.
//!
//! The bencode primitive itself comes from `serde_bencode`; this module only
//! defines which field combinations are valid per message kind and how the
//! tagged variants map onto the top-level `t`/`y`/`q`/`a`/`r` dictionaries.
//!
//! Responses are classified purely by shape (a `samples` field, then a
//! `nodes` field) rather than by matching transaction ids against a pending
//! table. The crawler cares about data volume, not strict RPC semantics, so
//! any well-shaped response is accepted regardless of who asked for it.

use crate::error::KrpcError;
use crate::node::{Infohash, NodeId, ID_LEN};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// Bytes taken from a freshly generated request id to form an outbound
/// transaction id.
const TRANSACTION_ID_LEN: usize = 4;

/// Wire form of a KRPC message. Fields are declared in bencoded key order.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    a: Option<RawArgs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    r: Option<RawResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<ByteBuf>,
    y: String,
}

/// Wire form of the `a` query-argument dictionary.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    implied_port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    info_hash: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<ByteBuf>,
}

/// Wire form of the `r` response dictionary.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nodes: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    samples: Option<ByteBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<ByteBuf>,
}

/// A decoded KRPC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A query from a peer, carrying the transaction id to echo in the reply.
    Query {
        transaction_id: Vec<u8>,
        query: Query,
    },
    /// A response from a peer, accepted by shape.
    Response {
        transaction_id: Vec<u8>,
        response: Response,
    },
}

/// The query kinds the crawler understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Liveness probe.
    Ping { id: NodeId },
    /// Request for nodes close to a target id.
    FindNode { id: NodeId, target: NodeId },
    /// Request for peers serving an infohash. The primary passive-harvesting path.
    GetPeers { id: NodeId, info_hash: Infohash },
    /// A peer announcing it serves an infohash.
    AnnouncePeer {
        id: NodeId,
        info_hash: Infohash,
        /// Token previously handed out in our get_peers reply.
        token: Vec<u8>,
        /// Explicit announce port, raw off the wire. Validated at resolution
        /// time, not here.
        port: i64,
        /// When set, the announce port is the datagram's UDP source port.
        implied_port: bool,
    },
    /// BEP51 request for a sample of infohashes the remote node has seen.
    SampleInfohashes { id: NodeId, target: NodeId },
}

/// The response shapes the crawler understands or produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Identity-only reply, sent for ping and announce_peer.
    Id { id: NodeId },
    /// A packed compact node list, the find_node response shape.
    Nodes { id: Option<NodeId>, nodes: Vec<u8> },
    /// get_peers reply carrying the announce token.
    GetPeers {
        id: NodeId,
        nodes: Vec<u8>,
        token: Vec<u8>,
    },
    /// BEP51 sample response. Any accompanying node list rides along and is
    /// folded into the routing table like a find_node response.
    Samples {
        id: Option<NodeId>,
        samples: Vec<Infohash>,
        nodes: Vec<u8>,
    },
}

impl Message {
    /// Outbound find_node query.
    ///
    /// The transaction id is the leading bytes of `request_id`, a throwaway
    /// identifier generated per send. Responses are matched by shape rather
    /// than by transaction id, so the id only needs to be present, not tracked.
    pub fn find_node_query(id: NodeId, target: NodeId, request_id: NodeId) -> Self {
        Message::Query {
            transaction_id: request_id.as_bytes()[..TRANSACTION_ID_LEN].to_vec(),
            query: Query::FindNode { id, target },
        }
    }

    /// Outbound BEP51 sample_infohashes query.
    pub fn sample_infohashes_query(id: NodeId, target: NodeId, request_id: NodeId) -> Self {
        Message::Query {
            transaction_id: request_id.as_bytes()[..TRANSACTION_ID_LEN].to_vec(),
            query: Query::SampleInfohashes { id, target },
        }
    }

    /// Decode a datagram.
    ///
    /// Returns `Ok(None)` for payloads that are valid bencode but match no
    /// known message kind; those are silently ignored upstream. Validation
    /// failures on a recognized query kind are errors so the caller can log
    /// the drop.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>, KrpcError> {
        let raw: RawMessage = serde_bencode::from_bytes(bytes)?;
        match raw.y.as_str() {
            "q" => decode_query(raw),
            "r" => Ok(decode_response(raw)),
            _ => Ok(None),
        }
    }

    /// Encode to the bencoded wire form.
    pub fn encode(&self) -> Result<Vec<u8>, KrpcError> {
        Ok(serde_bencode::to_bytes(&self.to_raw())?)
    }

    fn to_raw(&self) -> RawMessage {
        match self {
            Message::Query {
                transaction_id,
                query,
            } => {
                let (kind, args) = match query {
                    Query::Ping { id } => (
                        "ping",
                        RawArgs {
                            id: Some(buf(id.as_bytes())),
                            ..RawArgs::default()
                        },
                    ),
                    Query::FindNode { id, target } => (
                        "find_node",
                        RawArgs {
                            id: Some(buf(id.as_bytes())),
                            target: Some(buf(target.as_bytes())),
                            ..RawArgs::default()
                        },
                    ),
                    Query::GetPeers { id, info_hash } => (
                        "get_peers",
                        RawArgs {
                            id: Some(buf(id.as_bytes())),
                            info_hash: Some(buf(info_hash.as_bytes())),
                            ..RawArgs::default()
                        },
                    ),
                    Query::AnnouncePeer {
                        id,
                        info_hash,
                        token,
                        port,
                        implied_port,
                    } => (
                        "announce_peer",
                        RawArgs {
                            id: Some(buf(id.as_bytes())),
                            implied_port: implied_port.then_some(1),
                            info_hash: Some(buf(info_hash.as_bytes())),
                            port: Some(*port),
                            token: Some(ByteBuf::from(token.clone())),
                            ..RawArgs::default()
                        },
                    ),
                    Query::SampleInfohashes { id, target } => (
                        "sample_infohashes",
                        RawArgs {
                            id: Some(buf(id.as_bytes())),
                            target: Some(buf(target.as_bytes())),
                            ..RawArgs::default()
                        },
                    ),
                };
                RawMessage {
                    a: Some(args),
                    q: Some(kind.to_string()),
                    t: Some(ByteBuf::from(transaction_id.clone())),
                    y: "q".to_string(),
                    ..RawMessage::default()
                }
            }
            Message::Response {
                transaction_id,
                response,
            } => {
                let r = match response {
                    Response::Id { id } => RawResponse {
                        id: Some(buf(id.as_bytes())),
                        ..RawResponse::default()
                    },
                    Response::Nodes { id, nodes } => RawResponse {
                        id: id.as_ref().map(|id| buf(id.as_bytes())),
                        nodes: Some(ByteBuf::from(nodes.clone())),
                        ..RawResponse::default()
                    },
                    Response::GetPeers { id, nodes, token } => RawResponse {
                        id: Some(buf(id.as_bytes())),
                        nodes: Some(ByteBuf::from(nodes.clone())),
                        token: Some(ByteBuf::from(token.clone())),
                        ..RawResponse::default()
                    },
                    Response::Samples { id, samples, nodes } => {
                        let mut blob = Vec::with_capacity(samples.len() * ID_LEN);
                        for infohash in samples {
                            blob.extend_from_slice(infohash.as_bytes());
                        }
                        RawResponse {
                            id: id.as_ref().map(|id| buf(id.as_bytes())),
                            nodes: Some(ByteBuf::from(nodes.clone())),
                            samples: Some(ByteBuf::from(blob)),
                            ..RawResponse::default()
                        }
                    }
                };
                RawMessage {
                    r: Some(r),
                    t: Some(ByteBuf::from(transaction_id.clone())),
                    y: "r".to_string(),
                    ..RawMessage::default()
                }
            }
        }
    }
}

fn decode_query(raw: RawMessage) -> Result<Option<Message>, KrpcError> {
    let kind = match raw.q {
        Some(kind) => kind,
        None => return Ok(None),
    };
    match kind.as_str() {
        "ping" | "find_node" | "get_peers" | "announce_peer" | "sample_infohashes" => {}
        _ => return Ok(None),
    }

    let transaction_id = match raw.t {
        Some(t) if !t.is_empty() => t.into_vec(),
        _ => return Err(KrpcError::MissingTransactionId),
    };
    let args = raw.a.unwrap_or_default();
    let id = node_id_field(&args.id, "id")?;

    let query = match kind.as_str() {
        "ping" => Query::Ping { id },
        "find_node" => Query::FindNode {
            id,
            target: node_id_field(&args.target, "target")?,
        },
        "get_peers" => Query::GetPeers {
            id,
            info_hash: infohash_field(&args.info_hash)?,
        },
        "announce_peer" => Query::AnnouncePeer {
            id,
            info_hash: infohash_field(&args.info_hash)?,
            token: args.token.map(ByteBuf::into_vec).unwrap_or_default(),
            port: args.port.unwrap_or(0),
            implied_port: args.implied_port.unwrap_or(0) != 0,
        },
        "sample_infohashes" => Query::SampleInfohashes {
            id,
            target: node_id_field(&args.target, "target")?,
        },
        _ => return Ok(None),
    };

    Ok(Some(Message::Query {
        transaction_id,
        query,
    }))
}

fn decode_response(raw: RawMessage) -> Option<Message> {
    let transaction_id = raw.t.map(ByteBuf::into_vec).unwrap_or_default();
    let r = raw.r?;
    let id = r.id.as_ref().and_then(|bytes| NodeId::from_slice(bytes));

    let response = if let Some(samples) = r.samples {
        Response::Samples {
            id,
            samples: split_samples(&samples),
            nodes: r.nodes.map(ByteBuf::into_vec).unwrap_or_default(),
        }
    } else if let Some(nodes) = r.nodes {
        Response::Nodes {
            id,
            nodes: nodes.into_vec(),
        }
    } else if let Some(id) = id {
        Response::Id { id }
    } else {
        return None;
    };

    Some(Message::Response {
        transaction_id,
        response,
    })
}

/// Split a BEP51 sample blob into 20-byte infohashes, preserving blob order.
/// A trailing partial chunk is dropped.
fn split_samples(blob: &[u8]) -> Vec<Infohash> {
    blob.chunks_exact(ID_LEN)
        .filter_map(Infohash::from_slice)
        .collect()
}

fn node_id_field(field: &Option<ByteBuf>, name: &'static str) -> Result<NodeId, KrpcError> {
    let bytes = field.as_ref().ok_or(KrpcError::MissingField(name))?;
    NodeId::from_slice(bytes).ok_or(KrpcError::BadIdentifier {
        field: name,
        len: bytes.len(),
    })
}

fn infohash_field(field: &Option<ByteBuf>) -> Result<Infohash, KrpcError> {
    let bytes = field.as_ref().ok_or(KrpcError::MissingField("info_hash"))?;
    Infohash::from_slice(bytes).ok_or(KrpcError::BadIdentifier {
        field: "info_hash",
        len: bytes.len(),
    })
}

fn buf(bytes: &[u8]) -> ByteBuf {
    ByteBuf::from(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> NodeId {
        NodeId::from([byte; ID_LEN])
    }

    fn infohash(byte: u8) -> Infohash {
        Infohash::from([byte; ID_LEN])
    }

    fn round_trip(message: Message) {
        let bytes = message.encode().unwrap();
        let decoded = Message::decode(&bytes).unwrap().unwrap();
        assert_eq!(message, decoded);
    }

    #[test]
    fn round_trip_ping_query() {
        round_trip(Message::Query {
            transaction_id: b"aa".to_vec(),
            query: Query::Ping { id: id(0x01) },
        });
    }

    #[test]
    fn round_trip_find_node_query() {
        round_trip(Message::Query {
            transaction_id: b"ab".to_vec(),
            query: Query::FindNode {
                id: id(0x01),
                target: id(0x02),
            },
        });
    }

    #[test]
    fn round_trip_get_peers_query() {
        round_trip(Message::Query {
            transaction_id: b"ac".to_vec(),
            query: Query::GetPeers {
                id: id(0x01),
                info_hash: infohash(0x7f),
            },
        });
    }

    #[test]
    fn round_trip_announce_peer_query() {
        round_trip(Message::Query {
            transaction_id: b"ad".to_vec(),
            query: Query::AnnouncePeer {
                id: id(0x01),
                info_hash: infohash(0x7f),
                token: vec![0x7f, 0x7f],
                port: 6881,
                implied_port: true,
            },
        });
        round_trip(Message::Query {
            transaction_id: b"ad".to_vec(),
            query: Query::AnnouncePeer {
                id: id(0x01),
                info_hash: infohash(0x7f),
                token: vec![0x7f, 0x7f],
                port: 0,
                implied_port: false,
            },
        });
    }

    #[test]
    fn round_trip_sample_infohashes_query() {
        round_trip(Message::Query {
            transaction_id: b"ae".to_vec(),
            query: Query::SampleInfohashes {
                id: id(0x01),
                target: id(0x02),
            },
        });
    }

    #[test]
    fn round_trip_nodes_response() {
        round_trip(Message::Response {
            transaction_id: b"aa".to_vec(),
            response: Response::Nodes {
                id: Some(id(0x03)),
                nodes: vec![0x44; 26],
            },
        });
        round_trip(Message::Response {
            transaction_id: b"aa".to_vec(),
            response: Response::Nodes {
                id: None,
                nodes: vec![0x44; 52],
            },
        });
    }

    #[test]
    fn round_trip_samples_response() {
        round_trip(Message::Response {
            transaction_id: b"ab".to_vec(),
            response: Response::Samples {
                id: Some(id(0x03)),
                samples: vec![infohash(0x10), infohash(0x20)],
                nodes: vec![0x44; 26],
            },
        });
    }

    #[test]
    fn find_node_query_derives_transaction_id() {
        let request_id = id(0x5a);
        let message = Message::find_node_query(id(0x01), id(0x02), request_id);
        match message {
            Message::Query { transaction_id, .. } => {
                assert_eq!(transaction_id, request_id.as_bytes()[..4].to_vec());
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn decode_rejects_missing_transaction_id() {
        let raw = RawMessage {
            a: Some(RawArgs {
                id: Some(buf(&[0x01; ID_LEN])),
                ..RawArgs::default()
            }),
            q: Some("ping".to_string()),
            y: "q".to_string(),
            ..RawMessage::default()
        };
        let bytes = serde_bencode::to_bytes(&raw).unwrap();
        assert!(matches!(
            Message::decode(&bytes),
            Err(KrpcError::MissingTransactionId)
        ));
    }

    #[test]
    fn decode_rejects_empty_transaction_id() {
        let raw = RawMessage {
            a: Some(RawArgs {
                id: Some(buf(&[0x01; ID_LEN])),
                ..RawArgs::default()
            }),
            q: Some("ping".to_string()),
            t: Some(ByteBuf::new()),
            y: "q".to_string(),
            ..RawMessage::default()
        };
        let bytes = serde_bencode::to_bytes(&raw).unwrap();
        assert!(matches!(
            Message::decode(&bytes),
            Err(KrpcError::MissingTransactionId)
        ));
    }

    #[test]
    fn decode_rejects_short_requester_id() {
        let raw = RawMessage {
            a: Some(RawArgs {
                id: Some(buf(&[0x01; 19])),
                ..RawArgs::default()
            }),
            q: Some("ping".to_string()),
            t: Some(buf(b"aa")),
            y: "q".to_string(),
            ..RawMessage::default()
        };
        let bytes = serde_bencode::to_bytes(&raw).unwrap();
        assert!(matches!(
            Message::decode(&bytes),
            Err(KrpcError::BadIdentifier { field: "id", len: 19 })
        ));
    }

    #[test]
    fn decode_rejects_short_info_hash() {
        let raw = RawMessage {
            a: Some(RawArgs {
                id: Some(buf(&[0x01; ID_LEN])),
                info_hash: Some(buf(&[0x7f; 12])),
                ..RawArgs::default()
            }),
            q: Some("get_peers".to_string()),
            t: Some(buf(b"aa")),
            y: "q".to_string(),
            ..RawMessage::default()
        };
        let bytes = serde_bencode::to_bytes(&raw).unwrap();
        assert!(matches!(
            Message::decode(&bytes),
            Err(KrpcError::BadIdentifier {
                field: "info_hash",
                len: 12
            })
        ));
    }

    #[test]
    fn decode_ignores_unknown_query_kind() {
        let raw = RawMessage {
            a: Some(RawArgs {
                id: Some(buf(&[0x01; ID_LEN])),
                ..RawArgs::default()
            }),
            q: Some("vote".to_string()),
            t: Some(buf(b"aa")),
            y: "q".to_string(),
            ..RawMessage::default()
        };
        let bytes = serde_bencode::to_bytes(&raw).unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), None);
    }

    #[test]
    fn decode_ignores_error_messages() {
        let bytes = b"d1:t2:aa1:y1:ee";
        assert_eq!(Message::decode(bytes).unwrap(), None);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Message::decode(b"\xff\xfe\x00junk").is_err());
    }

    #[test]
    fn announce_peer_fields_default() {
        let raw = RawMessage {
            a: Some(RawArgs {
                id: Some(buf(&[0x01; ID_LEN])),
                info_hash: Some(buf(&[0x7f; ID_LEN])),
                ..RawArgs::default()
            }),
            q: Some("announce_peer".to_string()),
            t: Some(buf(b"aa")),
            y: "q".to_string(),
            ..RawMessage::default()
        };
        let bytes = serde_bencode::to_bytes(&raw).unwrap();
        match Message::decode(&bytes).unwrap().unwrap() {
            Message::Query {
                query:
                    Query::AnnouncePeer {
                        token,
                        port,
                        implied_port,
                        ..
                    },
                ..
            } => {
                assert!(token.is_empty());
                assert_eq!(port, 0);
                assert!(!implied_port);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn get_peers_reply_classifies_as_nodes_shape() {
        // Shape-based acceptance: a token-bearing response with a nodes field
        // is still just a node list to the receiving side.
        let reply = Message::Response {
            transaction_id: b"aa".to_vec(),
            response: Response::GetPeers {
                id: id(0x03),
                nodes: Vec::new(),
                token: vec![0x7f, 0x7f],
            },
        };
        let bytes = reply.encode().unwrap();
        match Message::decode(&bytes).unwrap().unwrap() {
            Message::Response {
                response: Response::Nodes { id: decoded, nodes },
                ..
            } => {
                assert_eq!(decoded, Some(id(0x03)));
                assert!(nodes.is_empty());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn samples_split_drops_trailing_partial() {
        let mut blob = vec![0x10; ID_LEN];
        blob.extend_from_slice(&[0x20; ID_LEN]);
        blob.extend_from_slice(&[0x30; 5]);
        let samples = split_samples(&blob);
        assert_eq!(samples, vec![infohash(0x10), infohash(0x20)]);
    }
}
