use super::PieceJob;
use crate::error::{BittorrentError, Result};
use crate::peer::BlockInfo;
use crate::torrent::PieceHash;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

/// Assembles the blocks of one piece and checks the result against its hash.
///
/// Blocks are placed by the offset they carry, so replies may arrive in any
/// order.
pub struct PieceBuffer {
    index: usize,
    hash: PieceHash,
    block_size: u32,
    data: Vec<u8>,
    received: Vec<bool>,
    missing: usize,
}

impl PieceBuffer {
    pub fn new(job: &PieceJob, block_size: u32) -> Self {
        let block_count = job.length.div_ceil(block_size) as usize;
        Self {
            index: job.index,
            hash: job.hash,
            block_size,
            data: vec![0u8; job.length as usize],
            received: vec![false; block_count],
            missing: block_count,
        }
    }

    /// Every block of the piece, in ascending offset order. Only the last
    /// block may be shorter than the block size.
    pub fn blocks(&self) -> Vec<BlockInfo> {
        (0..self.received.len())
            .map(|block| {
                let offset = block as u32 * self.block_size;
                let length = self.block_size.min(self.data.len() as u32 - offset);
                BlockInfo::new(self.index as u32, offset, length)
            })
            .collect()
    }

    /// Store a block. Returns `false` for a block that was already stored.
    pub fn add_block(&mut self, offset: u32, data: &[u8]) -> Result<bool> {
        let block = (offset / self.block_size) as usize;
        let start = offset as usize;

        if offset % self.block_size != 0 || block >= self.received.len() {
            return Err(BittorrentError::InvalidMessage(format!(
                "block offset {} does not belong to piece {}",
                offset, self.index
            )));
        }

        let expected = self.block_size.min(self.data.len() as u32 - offset) as usize;
        if data.len() != expected {
            return Err(BittorrentError::InvalidMessage(format!(
                "block at offset {} of piece {} has {} bytes, expected {}",
                offset,
                self.index,
                data.len(),
                expected
            )));
        }

        if self.received[block] {
            debug!("Duplicate block at offset {} of piece {}", offset, self.index);
            return Ok(false);
        }

        self.data[start..start + expected].copy_from_slice(data);
        self.received[block] = true;
        self.missing -= 1;
        Ok(true)
    }

    pub fn is_complete(&self) -> bool {
        self.missing == 0
    }

    /// Hand out the piece bytes if their SHA1 matches the expected hash
    pub fn verify(self) -> Result<Vec<u8>> {
        let hash = Sha1::digest(&self.data);

        if hash.as_slice() != self.hash.as_bytes() {
            warn!("Piece {} failed verification", self.index);
            return Err(BittorrentError::PieceVerificationFailed { index: self.index });
        }

        debug!("Piece {} verified", self.index);
        Ok(self.data)
    }
}
