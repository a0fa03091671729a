mod metainfo;
mod piece;

pub use metainfo::{Metainfo, TorrentInfo};
pub use piece::{PieceHash, Pieces};

use crate::bencode::decode_all;
use crate::error::Result;
use std::path::Path;
use tokio::fs;

/// Load and parse a .torrent file
pub async fn load_torrent_file<P: AsRef<Path>>(path: P) -> Result<Metainfo> {
    let data = fs::read(path).await?;
    parse_torrent(&data)
}

/// Parse torrent data from bytes
pub fn parse_torrent(data: &[u8]) -> Result<Metainfo> {
    let value = decode_all(data)?;
    Metainfo::from_bencode(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::{encode, BencodeDict, BencodeValue};
    use crate::error::BittorrentError;
    use sha1::{Digest, Sha1};

    fn torrent_bytes(length: i64, piece_length: i64, pieces: &[u8]) -> Vec<u8> {
        let mut info = BencodeDict::new();
        info.insert("length", BencodeValue::Integer(length));
        info.insert("name", BencodeValue::from("sample.txt"));
        info.insert("piece length", BencodeValue::Integer(piece_length));
        info.insert("pieces", BencodeValue::String(pieces.to_vec()));

        let mut root = BencodeDict::new();
        root.insert("announce", BencodeValue::from("http://tracker.example/announce"));
        root.insert("info", BencodeValue::Dict(info));
        encode(&BencodeValue::Dict(root))
    }

    #[test]
    fn test_parse_single_file() {
        let data = torrent_bytes(1000, 400, &[7u8; 60]);
        let metainfo = parse_torrent(&data).unwrap();

        assert_eq!(metainfo.announce, "http://tracker.example/announce");
        assert_eq!(metainfo.info.name.as_deref(), Some("sample.txt"));
        assert_eq!(metainfo.info.length, 1000);
        assert_eq!(metainfo.info.piece_length, 400);
        assert_eq!(metainfo.info.piece_count(), 3);
    }

    #[test]
    fn test_piece_length_arithmetic() {
        let metainfo = parse_torrent(&torrent_bytes(1000, 400, &[0u8; 60])).unwrap();
        assert_eq!(metainfo.info.piece_len(0), 400);
        assert_eq!(metainfo.info.piece_len(1), 400);
        assert_eq!(metainfo.info.piece_len(2), 200);
        assert_eq!(metainfo.info.piece_len(3), 0);

        let exact = parse_torrent(&torrent_bytes(800, 400, &[0u8; 40])).unwrap();
        assert_eq!(exact.info.piece_len(1), 400);
    }

    #[test]
    fn test_info_hash_matches_raw_info_bytes() {
        let data = torrent_bytes(1000, 400, &[3u8; 60]);
        let metainfo = parse_torrent(&data).unwrap();

        // The info dict is the tail of the file minus the closing 'e'.
        let start = data.windows(6).position(|w| w == b"4:info").unwrap() + 6;
        let raw_info = &data[start..data.len() - 1];
        let expected = Sha1::digest(raw_info);

        assert_eq!(&metainfo.info_hash[..], expected.as_slice());
        assert_eq!(parse_torrent(&data).unwrap().info_hash, metainfo.info_hash);
    }

    #[test]
    fn test_info_hash_uses_file_key_order() {
        // Keys deliberately out of sorted order.
        let data = b"d8:announce3:url4:infod6:pieces20:aaaaaaaaaaaaaaaaaaaa6:lengthi10e12:piece lengthi16eee";
        let metainfo = parse_torrent(data).unwrap();

        let raw_info = b"d6:pieces20:aaaaaaaaaaaaaaaaaaaa6:lengthi10e12:piece lengthi16ee";
        let expected = Sha1::digest(raw_info);
        assert_eq!(&metainfo.info_hash[..], expected.as_slice());
    }

    #[test]
    fn test_info_hash_changes_with_info_bytes() {
        let a = parse_torrent(&torrent_bytes(1000, 400, &[1u8; 60])).unwrap();
        let b = parse_torrent(&torrent_bytes(1000, 400, &[2u8; 60])).unwrap();
        assert_ne!(a.info_hash, b.info_hash);
    }

    #[test]
    fn test_missing_fields() {
        let err = parse_torrent(b"d4:infod6:lengthi1eee").unwrap_err();
        assert!(matches!(err, BittorrentError::InvalidMetadata(ref m) if m.contains("announce")));

        let err = parse_torrent(b"d8:announce3:url4:infod6:lengthi1eee").unwrap_err();
        assert!(matches!(err, BittorrentError::InvalidMetadata(ref m) if m.contains("piece length")));
    }

    #[test]
    fn test_wrong_types() {
        let err = parse_torrent(b"d8:announcei5e4:infod6:lengthi1eee").unwrap_err();
        assert!(matches!(err, BittorrentError::InvalidMetadata(ref m) if m.contains("announce")));

        let err = parse_torrent(&torrent_bytes(1000, 400, &[0u8; 50])).unwrap_err();
        assert!(matches!(err, BittorrentError::InvalidMetadata(ref m) if m.contains("multiple of 20")));
    }

    #[test]
    fn test_piece_count_must_cover_length() {
        assert!(parse_torrent(&torrent_bytes(1000, 400, &[0u8; 40])).is_err());
        assert!(parse_torrent(&torrent_bytes(1000, 400, &[0u8; 80])).is_err());
        assert!(parse_torrent(&torrent_bytes(1000, 0, &[0u8; 60])).is_err());

        // 3 * i64::MAX does not fit in the arithmetic
        assert!(matches!(
            parse_torrent(&torrent_bytes(1000, i64::MAX, &[0u8; 60])),
            Err(BittorrentError::InvalidMetadata(_))
        ));
        let huge = parse_torrent(&torrent_bytes(i64::MAX, i64::MAX, &[0u8; 20])).unwrap();
        assert_eq!(huge.info.piece_len(0), i64::MAX as u64);
    }

    #[test]
    fn test_codec_errors_propagate() {
        assert!(matches!(
            parse_torrent(b"d8:announce"),
            Err(BittorrentError::MalformedInput { .. })
        ));
    }
}
