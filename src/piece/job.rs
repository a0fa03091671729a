use crate::error::{BittorrentError, Result};
use crate::torrent::{PieceHash, TorrentInfo};

/// One unit of work: a whole piece to fetch and verify
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceJob {
    pub index: usize,
    pub hash: PieceHash,
    pub length: u32,
    /// Failed attempts so far
    pub attempts: u32,
}

impl PieceJob {
    pub fn new(index: usize, hash: PieceHash, length: u32) -> Self {
        Self {
            index,
            hash,
            length,
            attempts: 0,
        }
    }

    /// One job per piece, in index order
    pub fn for_torrent(info: &TorrentInfo) -> Result<Vec<PieceJob>> {
        info.pieces
            .iter()
            .enumerate()
            .map(|(index, hash)| {
                let length = u32::try_from(info.piece_len(index)).map_err(|_| {
                    BittorrentError::InvalidMetadata(format!(
                        "piece {} is too large to request ({} bytes)",
                        index,
                        info.piece_len(index)
                    ))
                })?;
                Ok(PieceJob::new(index, *hash, length))
            })
            .collect()
    }
}
