//! Node identifiers, infohashes, and XOR-distance utilities for the DHT keyspace.

use rand::RngCore;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Length in bytes of node identifiers and infohashes.
pub const ID_LEN: usize = 20;

/// Leading bytes copied verbatim from the target when deriving a neighbor identity.
const NEIGHBOR_PREFIX_LEN: usize = 10;

/// Length of the announce token handed out with get_peers replies.
const TOKEN_LEN: usize = 2;

/// One entry in a compact node list: 20-byte id, 4-byte IPv4 address, 2-byte port.
const COMPACT_NODE_LEN: usize = ID_LEN + 6;

/// A 20-byte identifier in the DHT keyspace.
///
/// Equality is byte-exact. Distance between two identifiers is their bitwise
/// XOR, smaller meaning logically closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId([u8; ID_LEN]);

impl NodeId {
    /// Generate a uniformly random identifier.
    ///
    /// The crawler regenerates its identity on every start; nothing about an
    /// id persists across sessions.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        NodeId(bytes)
    }

    /// Build an id from a byte slice, returning `None` on a length mismatch.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; ID_LEN] = bytes.try_into().ok()?;
        Some(NodeId(bytes))
    }

    /// The raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// XOR distance to another identifier.
    pub fn distance(&self, other: &NodeId) -> [u8; ID_LEN] {
        let mut out = [0u8; ID_LEN];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        out
    }

    /// Derive an identity that appears Kademlia-close to `self`.
    ///
    /// The leading bytes are copied from `self` so the result shares its
    /// keyspace prefix; the remaining bytes XOR-combine `self` with `local`.
    /// Professing such an id when replying to a peer raises the odds the peer
    /// keeps us in its own routing table, and professing it when querying
    /// biases discovery toward regions already rich in known nodes.
    pub fn neighbor(&self, local: &NodeId) -> NodeId {
        let mut out = [0u8; ID_LEN];
        out[..NEIGHBOR_PREFIX_LEN].copy_from_slice(&self.0[..NEIGHBOR_PREFIX_LEN]);
        for i in NEIGHBOR_PREFIX_LEN..ID_LEN {
            out[i] = self.0[i] ^ local.0[i];
        }
        NodeId(out)
    }
}

impl From<[u8; ID_LEN]> for NodeId {
    fn from(bytes: [u8; ID_LEN]) -> Self {
        NodeId(bytes)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A 20-byte identifier of shared content observed on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Infohash([u8; ID_LEN]);

impl Infohash {
    /// Build an infohash from a byte slice, returning `None` on a length mismatch.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; ID_LEN] = bytes.try_into().ok()?;
        Some(Infohash(bytes))
    }

    /// The raw infohash bytes.
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// The announce token for this infohash: its first two bytes.
    ///
    /// Handed out in get_peers replies and required unmodified in a later
    /// announce_peer, a lightweight anti-spoofing check without cryptographic
    /// strength.
    pub fn token(&self) -> [u8; TOKEN_LEN] {
        [self.0[0], self.0[1]]
    }
}

impl From<[u8; ID_LEN]> for Infohash {
    fn from(bytes: [u8; ID_LEN]) -> Self {
        Infohash(bytes)
    }
}

impl fmt::Display for Infohash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A DHT participant known to the crawler.
///
/// Ephemeral: valid only within the crawl cycle that discovered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    /// The node's identifier in the keyspace.
    pub id: NodeId,
    /// The node's UDP address.
    pub addr: SocketAddr,
}

/// Decode a packed compact node list into nodes.
///
/// Each entry is 26 bytes: node id, IPv4 address, big-endian port. A trailing
/// partial entry is silently skipped, so a blob of any length decodes without
/// error. No validity filtering happens here; callers decide which entries
/// are usable.
pub fn decode_compact_nodes(blob: &[u8]) -> Vec<Node> {
    blob.chunks_exact(COMPACT_NODE_LEN)
        .map(|chunk| {
            let mut id = [0u8; ID_LEN];
            id.copy_from_slice(&chunk[..ID_LEN]);
            let ip = Ipv4Addr::new(chunk[20], chunk[21], chunk[22], chunk[23]);
            let port = u16::from_be_bytes([chunk[24], chunk[25]]);
            Node {
                id: NodeId(id),
                addr: SocketAddr::new(IpAddr::V4(ip), port),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> NodeId {
        NodeId([byte; ID_LEN])
    }

    #[test]
    fn generated_ids_differ() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = id(0xab);
        assert_eq!(a.distance(&a), [0u8; ID_LEN]);
    }

    #[test]
    fn distance_is_xor() {
        let a = id(0b1100);
        let b = id(0b1010);
        assert_eq!(a.distance(&b), [0b0110; ID_LEN]);
    }

    #[test]
    fn neighbor_shares_prefix_and_xors_tail() {
        let target = id(0x11);
        let local = id(0x2f);
        let neighbor = target.neighbor(&local);
        assert_eq!(&neighbor.as_bytes()[..10], &target.as_bytes()[..10]);
        for i in 10..ID_LEN {
            assert_eq!(neighbor.as_bytes()[i], 0x11 ^ 0x2f);
        }
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(NodeId::from_slice(&[0u8; 19]).is_none());
        assert!(NodeId::from_slice(&[0u8; 21]).is_none());
        assert!(NodeId::from_slice(&[0u8; 20]).is_some());
        assert!(Infohash::from_slice(&[0u8; 7]).is_none());
    }

    #[test]
    fn token_is_first_two_bytes() {
        let mut bytes = [0u8; ID_LEN];
        bytes[0] = 0xde;
        bytes[1] = 0xad;
        assert_eq!(Infohash(bytes).token(), [0xde, 0xad]);
    }

    #[test]
    fn compact_nodes_decode() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&[0x01; ID_LEN]);
        blob.extend_from_slice(&[10, 0, 0, 1]);
        blob.extend_from_slice(&6881u16.to_be_bytes());
        blob.extend_from_slice(&[0x02; ID_LEN]);
        blob.extend_from_slice(&[192, 168, 1, 9]);
        blob.extend_from_slice(&9000u16.to_be_bytes());

        let nodes = decode_compact_nodes(&blob);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, id(0x01));
        assert_eq!(nodes[0].addr, "10.0.0.1:6881".parse().unwrap());
        assert_eq!(nodes[1].id, id(0x02));
        assert_eq!(nodes[1].addr, "192.168.1.9:9000".parse().unwrap());
    }

    #[test]
    fn compact_nodes_skip_trailing_partial() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&[0x01; ID_LEN]);
        blob.extend_from_slice(&[10, 0, 0, 1]);
        blob.extend_from_slice(&6881u16.to_be_bytes());
        blob.extend_from_slice(&[0xff; 13]);

        assert_eq!(decode_compact_nodes(&blob).len(), 1);
        assert!(decode_compact_nodes(&[0xff; 25]).is_empty());
        assert!(decode_compact_nodes(&[]).is_empty());
    }
}
