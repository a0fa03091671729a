use thiserror::Error;

#[derive(Error, Debug)]
pub enum BittorrentError {
    #[error("Malformed bencode at byte {offset}: {reason}")]
    MalformedInput { offset: usize, reason: String },

    #[error("Unexpected bencode type: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid torrent metadata: {0}")]
    InvalidMetadata(String),

    #[error("Tracker error: {0}")]
    TrackerError(String),

    #[error("Malformed compact peer list: {0} bytes is not a multiple of 6")]
    MalformedPeerList(usize),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Truncated message: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    #[error("Invalid peer message: {0}")]
    InvalidMessage(String),

    #[error("Peer choked us mid-piece")]
    PeerChoked,

    #[error("Timed out while {0}")]
    Timeout(&'static str),

    #[error("Piece {index} failed hash verification")]
    PieceVerificationFailed { index: usize },

    #[error("Payload of {0} bytes exceeds the 32-bit length field")]
    PayloadTooLarge(usize),

    #[error("Download incomplete: {missing} piece(s) could not be downloaded")]
    DownloadIncomplete { missing: usize },

    #[error("Download cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(String),
}

impl From<url::ParseError> for BittorrentError {
    fn from(err: url::ParseError) -> Self {
        BittorrentError::UrlParseError(err.to_string())
    }
}

impl BittorrentError {
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        BittorrentError::MalformedInput {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether the connection this error came from can no longer be used.
    ///
    /// Verification failures and mid-piece chokes only cost the current
    /// piece; everything else retires the worker that owns the connection.
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(
            self,
            BittorrentError::PieceVerificationFailed { .. } | BittorrentError::PeerChoked
        )
    }
}

pub type Result<T> = std::result::Result<T, BittorrentError>;
