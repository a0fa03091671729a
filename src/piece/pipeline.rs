use super::{PieceBuffer, PieceJob, BLOCK_SIZE, PIPELINE_DEPTH};
use crate::error::{BittorrentError, Result};
use crate::peer::{PeerConnection, PeerMessage};
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Semaphore;
use tracing::debug;

// Per-block request state
const PENDING: u8 = 0;
const REQUESTED: u8 = 1;
const RECEIVED: u8 = 2;

/// Tuning for block requests on one connection
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub block_size: u32,
    /// Maximum number of unanswered requests
    pub depth: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            depth: PIPELINE_DEPTH,
        }
    }
}

/// Download one whole piece over an established connection and verify it.
///
/// Requests go out in ascending block order from one side of the
/// connection while replies are drained from the other. A request slot is
/// only freed when a new block arrives for a request made by this call; a
/// block that shows up before it was requested (a late reply to an earlier
/// attempt) is kept and never requested.
pub async fn download_piece(
    conn: &mut PeerConnection,
    job: &PieceJob,
    options: PipelineOptions,
) -> Result<Vec<u8>> {
    conn.ensure_unchoked().await?;

    if conn.has_bitfield() && !conn.has_piece(job.index) {
        debug!("{} did not announce piece {}, requesting anyway", conn.addr(), job.index);
    }

    let mut buffer = PieceBuffer::new(job, options.block_size);
    let blocks = buffer.blocks();
    let status: Vec<AtomicU8> = blocks.iter().map(|_| AtomicU8::new(PENDING)).collect();
    let slots = Semaphore::new(options.depth.max(1));
    let (mut reader, mut writer) = conn.split();

    let send = async {
        for (block, state) in blocks.iter().zip(&status) {
            // Closed once every block is in
            let Ok(permit) = slots.acquire().await else {
                break;
            };
            if state
                .compare_exchange(PENDING, REQUESTED, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                continue;
            }
            permit.forget();
            writer.send_message(&PeerMessage::Request { block: *block }).await?;
        }
        Ok::<(), BittorrentError>(())
    };

    let receive = async {
        while !buffer.is_complete() {
            match reader.receive_message().await? {
                PeerMessage::Piece {
                    piece_index,
                    offset,
                    data,
                } => {
                    if piece_index as usize != job.index {
                        debug!("Dropping stale block of piece {}", piece_index);
                        continue;
                    }
                    if buffer.add_block(offset, &data)? {
                        let block = (offset / options.block_size) as usize;
                        if status[block].swap(RECEIVED, Ordering::SeqCst) == REQUESTED {
                            slots.add_permits(1);
                        }
                    }
                }
                PeerMessage::Choke => return Err(BittorrentError::PeerChoked),
                _ => {}
            }
        }
        slots.close();
        Ok(())
    };

    tokio::try_join!(send, receive)?;

    buffer.verify()
}
