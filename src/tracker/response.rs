use super::Peer;
use crate::bencode::BencodeValue;
use crate::error::{BittorrentError, Result};

/// Response from a tracker
#[derive(Debug, Clone)]
pub struct TrackerResponse {
    /// Interval in seconds to wait before next request
    pub interval: u64,
    /// List of peers
    pub peers: Vec<Peer>,
}

impl TrackerResponse {
    pub fn from_bencode(value: &BencodeValue) -> Result<Self> {
        let dict = value.as_dict().map_err(|e| {
            BittorrentError::TrackerError(format!("response must be a dictionary: {}", e))
        })?;

        // Check for failure reason
        if let Some(failure) = dict.get(b"failure reason") {
            let reason = failure
                .as_bytes()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_else(|_| "unknown failure".to_string());
            return Err(BittorrentError::TrackerError(reason));
        }

        let interval = match dict.get(b"interval") {
            Some(v) => v.as_integer().map_err(|e| {
                BittorrentError::TrackerError(format!("'interval': {}", e))
            })?
            .max(0) as u64,
            None => 0,
        };

        // Only the compact form is understood
        let peers = dict
            .get(b"peers")
            .ok_or_else(|| BittorrentError::TrackerError("missing 'peers' field".to_string()))?
            .as_bytes()
            .map_err(|e| BittorrentError::TrackerError(format!("'peers': {}", e)))?;

        Ok(TrackerResponse {
            interval,
            peers: Peer::from_compact_list(peers)?,
        })
    }
}
