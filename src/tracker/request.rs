use url::form_urlencoded::byte_serialize;
use url::Url;

/// Request parameters for tracker communication
#[derive(Debug, Clone)]
pub struct TrackerRequest {
    /// SHA1 hash of the info dictionary
    pub info_hash: [u8; 20],
    /// Unique peer ID
    pub peer_id: [u8; 20],
    /// Port this peer is listening on
    pub port: u16,
    /// Total amount uploaded
    pub uploaded: u64,
    /// Total amount downloaded
    pub downloaded: u64,
    /// Number of bytes left to download
    pub left: u64,
    /// Request compact peer list format
    pub compact: bool,
}

impl TrackerRequest {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], port: u16, left: u64) -> Self {
        Self {
            info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left,
            compact: true,
        }
    }

    /// Build the query string. The raw 20-byte fields are percent-encoded
    /// here, so the result must not be encoded again.
    pub fn to_query_string(&self) -> String {
        let params = [
            ("info_hash", urlencoded_bytes(&self.info_hash)),
            ("peer_id", urlencoded_bytes(&self.peer_id)),
            ("port", self.port.to_string()),
            ("uploaded", self.uploaded.to_string()),
            ("downloaded", self.downloaded.to_string()),
            ("left", self.left.to_string()),
            ("compact", if self.compact { "1" } else { "0" }.to_string()),
        ];

        params
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Append the announce parameters to the tracker URL, keeping any query
    /// the URL already carries
    pub fn announce_url(&self, tracker_url: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(tracker_url)?;
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => {
                format!("{}&{}", existing, self.to_query_string())
            }
            _ => self.to_query_string(),
        };
        url.set_query(Some(&query));
        Ok(url)
    }
}

fn urlencoded_bytes(bytes: &[u8]) -> String {
    byte_serialize(bytes).collect()
}
