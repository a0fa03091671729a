use super::Pieces;
use crate::bencode::{encode, BencodeDict, BencodeValue};
use crate::error::{BittorrentError, Result};
use sha1::{Digest, Sha1};

/// Information about the torrent contents (single-file mode)
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    /// Suggested name for the file
    pub name: Option<String>,
    /// Number of bytes in each piece
    pub piece_length: u64,
    /// SHA1 hashes of all pieces
    pub pieces: Pieces,
    /// Total length of the file
    pub length: u64,
}

impl TorrentInfo {
    fn from_bencode(dict: &BencodeDict) -> Result<Self> {
        let name = match dict.get(b"name") {
            Some(value) => Some(
                value
                    .as_str()
                    .map_err(|e| field_error("info.name", e))?
                    .to_string(),
            ),
            None => None,
        };

        let length = required(dict, "length", "info.length")?
            .as_integer()
            .map_err(|e| field_error("info.length", e))?;
        if length < 0 {
            return Err(BittorrentError::InvalidMetadata(format!(
                "'info.length' must not be negative, got {}",
                length
            )));
        }

        let piece_length = required(dict, "piece length", "info.piece length")?
            .as_integer()
            .map_err(|e| field_error("info.piece length", e))?;
        if piece_length <= 0 {
            return Err(BittorrentError::InvalidMetadata(format!(
                "'info.piece length' must be positive, got {}",
                piece_length
            )));
        }

        let pieces_bytes = required(dict, "pieces", "info.pieces")?
            .as_bytes()
            .map_err(|e| field_error("info.pieces", e))?;
        let pieces = Pieces::from_bytes(pieces_bytes)?;

        let info = TorrentInfo {
            name,
            piece_length: piece_length as u64,
            pieces,
            length: length as u64,
        };
        info.check_piece_count()?;

        Ok(info)
    }

    /// The hashes must cover the file exactly: every piece but the last is
    /// full and the last one is non-empty.
    fn check_piece_count(&self) -> Result<()> {
        let count = self.pieces.len() as u64;
        let fits = self.length.div_ceil(self.piece_length) == count;

        if !fits {
            return Err(BittorrentError::InvalidMetadata(format!(
                "{} piece hash(es) of {} bytes cannot describe a {} byte file",
                count, self.piece_length, self.length
            )));
        }
        Ok(())
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Actual length of a piece; only the last one may be short
    pub fn piece_len(&self, index: usize) -> u64 {
        let count = self.piece_count();
        if index + 1 < count {
            self.piece_length
        } else if index + 1 == count {
            self.length - (count as u64 - 1) * self.piece_length
        } else {
            0
        }
    }
}

/// Top-level metainfo structure from a .torrent file
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// URL of the tracker
    pub announce: String,
    /// Information about the torrent contents
    pub info: TorrentInfo,
    /// SHA1 hash of the bencoded info dictionary
    pub info_hash: [u8; 20],
}

impl Metainfo {
    pub fn from_bencode(value: &BencodeValue) -> Result<Self> {
        let dict = value
            .as_dict()
            .map_err(|e| field_error("top-level value", e))?;

        let announce = required(dict, "announce", "announce")?
            .as_str()
            .map_err(|e| field_error("announce", e))?
            .to_string();

        let info_value = required(dict, "info", "info")?;
        let info_dict = info_value
            .as_dict()
            .map_err(|e| field_error("info", e))?;

        let info = TorrentInfo::from_bencode(info_dict)?;
        let info_hash = calculate_info_hash(info_value);

        Ok(Metainfo {
            announce,
            info,
            info_hash,
        })
    }

    /// Get the info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}

/// SHA1 over the re-encoded info dictionary, in the key order it was read
fn calculate_info_hash(info: &BencodeValue) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(encode(info));
    let hash = hasher.finalize();

    let mut result = [0u8; 20];
    result.copy_from_slice(&hash);
    result
}

fn required<'a>(dict: &'a BencodeDict, key: &str, path: &str) -> Result<&'a BencodeValue> {
    dict.get(key.as_bytes())
        .ok_or_else(|| BittorrentError::InvalidMetadata(format!("missing '{}' field", path)))
}

fn field_error(path: &str, err: BittorrentError) -> BittorrentError {
    BittorrentError::InvalidMetadata(format!("'{}': {}", path, err))
}
