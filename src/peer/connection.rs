use super::{read_message, write_message, Handshake, PeerMessage, PeerState};
use crate::error::{BittorrentError, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

/// Manages a connection to a peer
pub struct PeerConnection {
    addr: SocketAddr,
    stream: TcpStream,
    state: PeerState,
    peer_id: [u8; 20],
    bitfield: Option<Vec<u8>>,
    io_timeout: Duration,
}

impl PeerConnection {
    /// Connect to a peer and perform handshake
    pub async fn connect(
        addr: SocketAddr,
        info_hash: [u8; 20],
        our_peer_id: [u8; 20],
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self> {
        info!("Connecting to peer: {}", addr);

        let mut stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| BittorrentError::Timeout("connecting to peer"))?
            .map_err(|e| {
                BittorrentError::HandshakeFailed(format!("failed to connect to {}: {}", addr, e))
            })?;

        let handshake = Handshake::new(info_hash, our_peer_id);
        let peer_handshake = timeout(io_timeout, handshake.exchange(&mut stream))
            .await
            .map_err(|_| BittorrentError::Timeout("waiting for handshake"))??;

        if peer_handshake.info_hash != info_hash {
            return Err(BittorrentError::HandshakeFailed(format!(
                "info hash mismatch: peer sent {}",
                hex::encode(peer_handshake.info_hash)
            )));
        }

        info!(
            "Handshake complete with {} (peer id {})",
            addr,
            hex::encode(peer_handshake.peer_id)
        );

        Ok(Self {
            addr,
            stream,
            state: PeerState::default(),
            peer_id: peer_handshake.peer_id,
            bitfield: None,
            io_timeout,
        })
    }

    /// Borrow independent reading and writing ends of the connection
    pub fn split(&mut self) -> (PeerReader<'_>, PeerWriter<'_>) {
        let (read, write) = self.stream.split();
        let reader = PeerReader {
            addr: self.addr,
            half: read,
            state: &mut self.state,
            bitfield: &mut self.bitfield,
            io_timeout: self.io_timeout,
        };
        let writer = PeerWriter {
            addr: self.addr,
            half: write,
            io_timeout: self.io_timeout,
        };
        (reader, writer)
    }

    /// Send a message to the peer
    pub async fn send_message(&mut self, message: &PeerMessage) -> Result<()> {
        {
            let (_, mut writer) = self.split();
            writer.send_message(message).await?;
        }

        // Update our state based on what we sent
        match message {
            PeerMessage::Choke => self.state.am_choking = true,
            PeerMessage::Unchoke => self.state.am_choking = false,
            PeerMessage::Interested => self.state.am_interested = true,
            PeerMessage::NotInterested => self.state.am_interested = false,
            _ => {}
        }
        Ok(())
    }

    /// Receive a message from the peer
    pub async fn receive_message(&mut self) -> Result<PeerMessage> {
        let (mut reader, _) = self.split();
        reader.receive_message().await
    }

    /// Bring a fresh connection to the point where blocks can be requested:
    /// take the peer's opening announcement, declare interest, then wait to
    /// be unchoked.
    pub async fn prepare(&mut self) -> Result<()> {
        // Bitfield or Have; recorded but not used to filter work
        let opening = self.receive_message().await?;
        debug!("Opening message from {}: {:?}", self.addr, opening.id());

        self.ensure_unchoked().await
    }

    /// Declare interest if needed and block until the peer unchokes us.
    /// Anything else received meanwhile is dropped.
    pub async fn ensure_unchoked(&mut self) -> Result<()> {
        if !self.state.am_interested {
            self.send_message(&PeerMessage::Interested).await?;
        }

        while self.state.peer_choking {
            let message = self.receive_message().await?;
            if message != PeerMessage::Unchoke {
                debug!("Dropping {:?} from {} while choked", message.id(), self.addr);
            }
        }
        Ok(())
    }

    /// Check if peer has a specific piece
    pub fn has_piece(&self, piece_index: usize) -> bool {
        if let Some(bitfield) = &self.bitfield {
            let byte_index = piece_index / 8;
            let bit_index = 7 - (piece_index % 8);

            if byte_index < bitfield.len() {
                return (bitfield[byte_index] >> bit_index) & 1 == 1;
            }
        }
        false
    }

    /// Whether the peer announced its pieces with a bitfield
    pub fn has_bitfield(&self) -> bool {
        self.bitfield.is_some()
    }

    #[cfg(test)]
    pub fn state(&self) -> &PeerState {
        &self.state
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn peer_id(&self) -> &[u8; 20] {
        &self.peer_id
    }
}

/// Receiving end of a split connection; keeps the peer's state current
pub struct PeerReader<'a> {
    addr: SocketAddr,
    half: ReadHalf<'a>,
    state: &'a mut PeerState,
    bitfield: &'a mut Option<Vec<u8>>,
    io_timeout: Duration,
}

impl PeerReader<'_> {
    pub async fn receive_message(&mut self) -> Result<PeerMessage> {
        let message = timeout(self.io_timeout, read_message(&mut self.half))
            .await
            .map_err(|_| BittorrentError::Timeout("waiting for a peer message"))??;

        match &message {
            PeerMessage::Choke => self.state.peer_choking = true,
            PeerMessage::Unchoke => self.state.peer_choking = false,
            PeerMessage::Interested => self.state.peer_interested = true,
            PeerMessage::NotInterested => self.state.peer_interested = false,
            PeerMessage::Bitfield { bitfield } => *self.bitfield = Some(bitfield.clone()),
            PeerMessage::Have { piece_index } => set_bit(self.bitfield, *piece_index as usize),
            _ => {}
        }

        debug!("Received {:?} from {}", message.id(), self.addr);
        Ok(message)
    }
}

/// Sending end of a split connection
pub struct PeerWriter<'a> {
    addr: SocketAddr,
    half: WriteHalf<'a>,
    io_timeout: Duration,
}

impl PeerWriter<'_> {
    pub async fn send_message(&mut self, message: &PeerMessage) -> Result<()> {
        timeout(self.io_timeout, write_message(&mut self.half, message))
            .await
            .map_err(|_| BittorrentError::Timeout("sending a peer message"))??;

        debug!("Sent {:?} to {}", message.id(), self.addr);
        Ok(())
    }
}

fn set_bit(bitfield: &mut Option<Vec<u8>>, piece_index: usize) {
    let bits = bitfield.get_or_insert_with(Vec::new);
    let byte_index = piece_index / 8;
    if bits.len() <= byte_index {
        bits.resize(byte_index + 1, 0);
    }
    bits[byte_index] |= 0x80 >> (piece_index % 8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::HANDSHAKE_LEN;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const INFO_HASH: [u8; 20] = [5u8; 20];
    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    async fn accept_handshake(listener: &TcpListener, reply_hash: [u8; 20]) -> TcpStream {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; HANDSHAKE_LEN];
        socket.read_exact(&mut buf).await.unwrap();
        socket
            .write_all(&Handshake::new(reply_hash, *b"-FAKE00-000000000000").to_bytes())
            .await
            .unwrap();
        socket
    }

    #[tokio::test]
    async fn test_connect_and_prepare() {
        let (listener, addr) = listener().await;
        let peer = tokio::spawn(async move {
            let mut socket = accept_handshake(&listener, INFO_HASH).await;
            write_message(&mut socket, &PeerMessage::Bitfield { bitfield: vec![0b0100_0000] })
                .await
                .unwrap();
            assert_eq!(read_message(&mut socket).await.unwrap(), PeerMessage::Interested);
            write_message(&mut socket, &PeerMessage::Have { piece_index: 9 }).await.unwrap();
            write_message(&mut socket, &PeerMessage::Unchoke).await.unwrap();
            socket
        });

        let mut conn = PeerConnection::connect(addr, INFO_HASH, [1u8; 20], TIMEOUT, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(conn.peer_id(), b"-FAKE00-000000000000");

        conn.prepare().await.unwrap();
        assert!(conn.state().am_interested);
        assert!(!conn.state().peer_choking);
        assert!(conn.has_bitfield());
        assert!(conn.has_piece(1));
        assert!(!conn.has_piece(0));
        assert!(conn.has_piece(9));

        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_info_hash_mismatch_rejected() {
        let (listener, addr) = listener().await;
        let peer = tokio::spawn(async move { accept_handshake(&listener, [6u8; 20]).await });

        let result = PeerConnection::connect(addr, INFO_HASH, [1u8; 20], TIMEOUT, TIMEOUT).await;
        assert!(matches!(result, Err(BittorrentError::HandshakeFailed(_))));
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (listener, addr) = listener().await;
        let peer = tokio::spawn(async move {
            let socket = accept_handshake(&listener, INFO_HASH).await;
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(socket);
        });

        let mut conn = PeerConnection::connect(
            addr,
            INFO_HASH,
            [1u8; 20],
            TIMEOUT,
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert!(matches!(
            conn.receive_message().await,
            Err(BittorrentError::Timeout(_))
        ));
        peer.await.unwrap();
    }
}
