use crate::error::{BittorrentError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_STRING: &[u8] = b"BitTorrent protocol";

/// 1 + 19 + 8 + 20 + 20
pub const HANDSHAKE_LEN: usize = 68;

/// Handshake message for peer wire protocol
/// Format: <pstrlen><pstr><reserved><info_hash><peer_id>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self { info_hash, peer_id }
    }

    /// Serialize handshake to bytes; reserved bytes are always zero
    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[0] = PROTOCOL_STRING.len() as u8;
        buf[1..20].copy_from_slice(PROTOCOL_STRING);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    /// Deserialize handshake from bytes. Reserved bytes are ignored.
    pub fn from_bytes(data: &[u8; HANDSHAKE_LEN]) -> Result<Self> {
        let pstrlen = data[0] as usize;
        if pstrlen != PROTOCOL_STRING.len() || &data[1..20] != PROTOCOL_STRING {
            return Err(BittorrentError::HandshakeFailed(
                "peer does not speak the BitTorrent protocol".to_string(),
            ));
        }

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        Ok(Handshake { info_hash, peer_id })
    }

    /// Send our handshake and block until the peer's 68-byte reply arrives
    pub async fn exchange<S>(&self, stream: &mut S) -> Result<Handshake>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream
            .write_all(&self.to_bytes())
            .await
            .map_err(|e| BittorrentError::HandshakeFailed(format!("send failed: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| BittorrentError::HandshakeFailed(format!("send failed: {}", e)))?;

        let mut reply = [0u8; HANDSHAKE_LEN];
        stream
            .read_exact(&mut reply)
            .await
            .map_err(|e| BittorrentError::HandshakeFailed(format!("no complete reply: {}", e)))?;

        Handshake::from_bytes(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_handshake_serialization() {
        let info_hash = [1u8; 20];
        let peer_id = [2u8; 20];

        let handshake = Handshake::new(info_hash, peer_id);
        let bytes = handshake.to_bytes();

        assert_eq!(bytes.len(), 68);
        assert_eq!(bytes[0], 19); // pstrlen
        assert_eq!(&bytes[1..20], PROTOCOL_STRING);
        assert_eq!(&bytes[20..28], &[0u8; 8]);

        let decoded = Handshake::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, handshake);
    }

    #[test]
    fn test_reserved_bytes_ignored_on_receive() {
        let mut bytes = Handshake::new([3u8; 20], [4u8; 20]).to_bytes();
        bytes[20..28].copy_from_slice(&[0xff; 8]);
        let decoded = Handshake::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.peer_id, [4u8; 20]);
    }

    #[test]
    fn test_wrong_protocol_rejected() {
        let mut bytes = Handshake::new([3u8; 20], [4u8; 20]).to_bytes();
        bytes[1] = b'X';
        assert!(matches!(
            Handshake::from_bytes(&bytes),
            Err(BittorrentError::HandshakeFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange() {
        let ours = Handshake::new([9u8; 20], *b"-BF0001-aaaaaaaaaaaa");
        let theirs = Handshake::new([9u8; 20], *b"-XX0001-bbbbbbbbbbbb");

        let mut mock = Builder::new()
            .write(&ours.to_bytes())
            .read(&theirs.to_bytes()[..30])
            .read(&theirs.to_bytes()[30..])
            .build();

        let reply = ours.exchange(&mut mock).await.unwrap();
        assert_eq!(reply, theirs);
    }

    #[tokio::test]
    async fn test_exchange_short_reply() {
        let ours = Handshake::new([9u8; 20], [1u8; 20]);
        let mut mock = Builder::new()
            .write(&ours.to_bytes())
            .read(&[19, b'B', b'i'])
            .build();

        assert!(matches!(
            ours.exchange(&mut mock).await,
            Err(BittorrentError::HandshakeFailed(_))
        ));
    }
}
