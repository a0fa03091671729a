use crate::error::{BittorrentError, Result};
use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame accepted from a peer (length prefix value)
pub const MAX_FRAME_LEN: usize = 1 << 22;

/// Information about a block within a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Piece index
    pub piece_index: u32,
    /// Byte offset within the piece
    pub offset: u32,
    /// Length of the block
    pub length: u32,
}

impl BlockInfo {
    pub fn new(piece_index: u32, offset: u32, length: u32) -> Self {
        Self {
            piece_index,
            offset,
            length,
        }
    }
}

/// Message type IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = BittorrentError;

    fn try_from(id: u8) -> Result<Self> {
        Ok(match id {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            other => {
                return Err(BittorrentError::InvalidMessage(format!(
                    "unknown message ID: {}",
                    other
                )))
            }
        })
    }
}

/// Messages exchanged between peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    /// Choke the peer
    Choke,
    /// Unchoke the peer
    Unchoke,
    /// Indicate interest
    Interested,
    /// Indicate lack of interest
    NotInterested,
    /// Indicate possession of a piece
    Have { piece_index: u32 },
    /// Bitfield of available pieces
    Bitfield { bitfield: Vec<u8> },
    /// Request a block
    Request { block: BlockInfo },
    /// Send a block
    Piece {
        piece_index: u32,
        offset: u32,
        data: Vec<u8>,
    },
    /// Cancel a block request
    Cancel { block: BlockInfo },
}

impl PeerMessage {
    pub fn id(&self) -> MessageId {
        match self {
            PeerMessage::Choke => MessageId::Choke,
            PeerMessage::Unchoke => MessageId::Unchoke,
            PeerMessage::Interested => MessageId::Interested,
            PeerMessage::NotInterested => MessageId::NotInterested,
            PeerMessage::Have { .. } => MessageId::Have,
            PeerMessage::Bitfield { .. } => MessageId::Bitfield,
            PeerMessage::Request { .. } => MessageId::Request,
            PeerMessage::Piece { .. } => MessageId::Piece,
            PeerMessage::Cancel { .. } => MessageId::Cancel,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            PeerMessage::Choke
            | PeerMessage::Unchoke
            | PeerMessage::Interested
            | PeerMessage::NotInterested => 0,
            PeerMessage::Have { .. } => 4,
            PeerMessage::Bitfield { bitfield } => bitfield.len(),
            PeerMessage::Request { .. } | PeerMessage::Cancel { .. } => 12,
            PeerMessage::Piece { data, .. } => 8 + data.len(),
        }
    }

    /// Serialize message to bytes
    /// Format: <length prefix><message ID><payload>
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload_len = self.payload_len();
        let length = frame_len(payload_len)?;
        let mut buf = BytesMut::with_capacity(4 + length as usize);

        buf.put_u32(length);
        buf.put_u8(self.id() as u8);

        match self {
            PeerMessage::Choke
            | PeerMessage::Unchoke
            | PeerMessage::Interested
            | PeerMessage::NotInterested => {}
            PeerMessage::Have { piece_index } => buf.put_u32(*piece_index),
            PeerMessage::Bitfield { bitfield } => buf.put_slice(bitfield),
            PeerMessage::Request { block } | PeerMessage::Cancel { block } => {
                buf.put_u32(block.piece_index);
                buf.put_u32(block.offset);
                buf.put_u32(block.length);
            }
            PeerMessage::Piece {
                piece_index,
                offset,
                data,
            } => {
                buf.put_u32(*piece_index);
                buf.put_u32(*offset);
                buf.put_slice(data);
            }
        }

        Ok(buf.to_vec())
    }

    /// Build a message from its type byte and payload
    pub fn parse(id: u8, mut payload: &[u8]) -> Result<Self> {
        let id = MessageId::try_from(id)?;

        match id {
            MessageId::Choke => Ok(PeerMessage::Choke),
            MessageId::Unchoke => Ok(PeerMessage::Unchoke),
            MessageId::Interested => Ok(PeerMessage::Interested),
            MessageId::NotInterested => Ok(PeerMessage::NotInterested),
            MessageId::Have => {
                expect_len(id, payload, 4)?;
                Ok(PeerMessage::Have {
                    piece_index: payload.get_u32(),
                })
            }
            MessageId::Bitfield => Ok(PeerMessage::Bitfield {
                bitfield: payload.to_vec(),
            }),
            MessageId::Request | MessageId::Cancel => {
                expect_len(id, payload, 12)?;
                let block = BlockInfo::new(payload.get_u32(), payload.get_u32(), payload.get_u32());
                Ok(if id == MessageId::Request {
                    PeerMessage::Request { block }
                } else {
                    PeerMessage::Cancel { block }
                })
            }
            MessageId::Piece => {
                if payload.len() < 8 {
                    return Err(BittorrentError::InvalidMessage(format!(
                        "Piece payload too short: {} bytes",
                        payload.len()
                    )));
                }
                let piece_index = payload.get_u32();
                let offset = payload.get_u32();
                Ok(PeerMessage::Piece {
                    piece_index,
                    offset,
                    data: payload.to_vec(),
                })
            }
        }
    }
}

fn expect_len(id: MessageId, payload: &[u8], want: usize) -> Result<()> {
    if payload.len() != want {
        return Err(BittorrentError::InvalidMessage(format!(
            "{:?} payload must be {} bytes, got {}",
            id,
            want,
            payload.len()
        )));
    }
    Ok(())
}

/// Value of the length prefix for a payload: type byte plus payload
fn frame_len(payload_len: usize) -> Result<u32> {
    payload_len
        .checked_add(1)
        .and_then(|len| u32::try_from(len).ok())
        .ok_or(BittorrentError::PayloadTooLarge(payload_len))
}

/// Fill `buf` completely, telling a clean close apart from a cut-off frame
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8], frame_started: bool) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 && !frame_started {
                return Err(BittorrentError::ConnectionClosed);
            }
            return Err(BittorrentError::Truncated {
                expected: buf.len(),
                received: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

/// Read the next message, silently dropping keep-alives
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<PeerMessage> {
    loop {
        let mut length_buf = [0u8; 4];
        read_full(reader, &mut length_buf, false).await?;

        let length = u32::from_be_bytes(length_buf) as usize;

        // Keep-alive
        if length == 0 {
            continue;
        }

        if length > MAX_FRAME_LEN {
            return Err(BittorrentError::InvalidMessage(format!(
                "frame of {} bytes exceeds limit of {}",
                length, MAX_FRAME_LEN
            )));
        }

        let mut frame = vec![0u8; length];
        read_full(reader, &mut frame, true).await?;

        return PeerMessage::parse(frame[0], &frame[1..]);
    }
}

/// Write one framed message and flush it
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &PeerMessage) -> Result<()> {
    let bytes = message.to_bytes()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
