use crate::error::{BittorrentError, Result};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Size of one entry in a compact peer list
pub const COMPACT_PEER_LEN: usize = 6;

/// Represents a peer in the swarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    pub addr: SocketAddrV4,
}

impl Peer {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            addr: SocketAddrV4::new(ip, port),
        }
    }

    /// Parse a peer from compact format (6 bytes: 4 IP + 2 port, big-endian)
    pub fn from_compact(data: &[u8; COMPACT_PEER_LEN]) -> Self {
        let ip = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
        let port = u16::from_be_bytes([data[4], data[5]]);
        Self::new(ip, port)
    }

    /// Parse multiple peers from compact format
    pub fn from_compact_list(data: &[u8]) -> Result<Vec<Self>> {
        if data.len() % COMPACT_PEER_LEN != 0 {
            return Err(BittorrentError::MalformedPeerList(data.len()));
        }

        Ok(data
            .chunks_exact(COMPACT_PEER_LEN)
            .map(|chunk| {
                let mut entry = [0u8; COMPACT_PEER_LEN];
                entry.copy_from_slice(chunk);
                Self::from_compact(&entry)
            })
            .collect())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.addr)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}
