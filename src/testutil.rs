//! In-process fake seeders and sample torrents for exercising the download
//! path over real loopback sockets.

use crate::bencode::{encode, BencodeDict, BencodeValue};
use crate::error::Result;
use crate::peer::{read_message, write_message, BlockInfo, Handshake, PeerMessage, HANDSHAKE_LEN};
use crate::torrent::{parse_torrent, Metainfo};
use sha1::{Digest, Sha1};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Fresh directory under the system temp dir, unique per call
pub fn scratch_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "bitfetch-{}-{}-{}",
        label,
        std::process::id(),
        DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Build a single-file torrent over deterministic content
pub fn sample_torrent(length: usize, piece_length: usize) -> (Metainfo, Arc<Vec<u8>>) {
    let content: Vec<u8> = (0..length).map(|i| (i * 31 % 251) as u8).collect();

    let mut pieces = Vec::new();
    for chunk in content.chunks(piece_length) {
        pieces.extend_from_slice(Sha1::digest(chunk).as_slice());
    }

    let mut info = BencodeDict::new();
    info.insert("length", BencodeValue::Integer(length as i64));
    info.insert("name", BencodeValue::from("sample.bin"));
    info.insert("piece length", BencodeValue::Integer(piece_length as i64));
    info.insert("pieces", BencodeValue::String(pieces));

    let mut root = BencodeDict::new();
    root.insert("announce", BencodeValue::from("http://127.0.0.1:1/announce"));
    root.insert("info", BencodeValue::Dict(info));

    let metainfo = parse_torrent(&encode(&BencodeValue::Dict(root))).unwrap();
    (metainfo, Arc::new(content))
}

#[derive(Debug, Clone, Default)]
pub struct FakePeerOptions {
    /// Answer each batch of requests last-first
    pub reply_in_reverse: bool,
    /// Pieces served with a flipped byte
    pub corrupt_pieces: Vec<u32>,
    /// Choke (and immediately unchoke) once after this many blocks
    pub choke_after_blocks: Option<usize>,
    /// Hang up after this many blocks on a connection
    pub close_after_blocks: Option<usize>,
    /// Block pushed right after unchoking, before any request
    pub unsolicited_block: Option<BlockInfo>,
}

#[derive(Default)]
struct Stats {
    max_outstanding: AtomicUsize,
    served: AtomicUsize,
}

/// A seeder holding the whole file, listening on 127.0.0.1
pub struct FakePeer {
    pub addr: SocketAddr,
    stats: Arc<Stats>,
    task: JoinHandle<()>,
}

impl FakePeer {
    pub async fn spawn(
        info_hash: [u8; 20],
        content: Arc<Vec<u8>>,
        piece_length: usize,
        options: FakePeerOptions,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(Stats::default());

        let task_stats = stats.clone();
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let content = content.clone();
                let options = options.clone();
                let stats = task_stats.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, info_hash, content, piece_length, options, stats).await;
                });
            }
        });

        Self { addr, stats, task }
    }

    pub fn max_outstanding(&self) -> usize {
        self.stats.max_outstanding.load(Ordering::SeqCst)
    }

    pub fn served_blocks(&self) -> usize {
        self.stats.served.load(Ordering::SeqCst)
    }
}

impl Drop for FakePeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut socket: TcpStream,
    info_hash: [u8; 20],
    content: Arc<Vec<u8>>,
    piece_length: usize,
    options: FakePeerOptions,
    stats: Arc<Stats>,
) -> Result<()> {
    let mut handshake = [0u8; HANDSHAKE_LEN];
    socket.read_exact(&mut handshake).await?;
    socket
        .write_all(&Handshake::new(info_hash, *b"-FAKE00-000000000000").to_bytes())
        .await?;

    let piece_count = content.len().div_ceil(piece_length);
    let (mut read, mut write) = socket.into_split();

    // Reading on its own task keeps the batching timeout below cancel-safe.
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok(message) = read_message(&mut read).await {
            if tx.send(message).is_err() {
                break;
            }
        }
    });

    let bitfield = vec![0xff; piece_count.div_ceil(8)];
    write_message(&mut write, &PeerMessage::Bitfield { bitfield }).await?;

    loop {
        match rx.recv().await {
            Some(PeerMessage::Interested) => break,
            Some(_) => continue,
            None => return Ok(()),
        }
    }
    write_message(&mut write, &PeerMessage::Unchoke).await?;

    if let Some(block) = options.unsolicited_block {
        let piece = piece_message(&content, piece_length, block, false);
        write_message(&mut write, &piece).await?;
    }

    let mut served = 0;
    let mut choked_once = false;
    loop {
        let Some(first) = rx.recv().await else {
            return Ok(());
        };

        let mut pending: Vec<BlockInfo> = Vec::new();
        let mut next = Some(first);
        while let Some(message) = next.take() {
            if let PeerMessage::Request { block } = message {
                pending.push(block);
            }
            if let Ok(Some(message)) = tokio::time::timeout(Duration::from_millis(30), rx.recv()).await {
                next = Some(message);
            }
        }

        stats.max_outstanding.fetch_max(pending.len(), Ordering::SeqCst);
        if options.reply_in_reverse {
            pending.reverse();
        }

        for block in pending {
            if options.close_after_blocks == Some(served) {
                return Ok(());
            }

            if options.choke_after_blocks == Some(served) && !choked_once {
                choked_once = true;
                write_message(&mut write, &PeerMessage::Choke).await?;
                tokio::time::sleep(Duration::from_millis(20)).await;
                while rx.try_recv().is_ok() {}
                write_message(&mut write, &PeerMessage::Unchoke).await?;
                break;
            }

            let corrupt = options.corrupt_pieces.contains(&block.piece_index);
            let piece = piece_message(&content, piece_length, block, corrupt);
            write_message(&mut write, &piece).await?;

            served += 1;
            stats.served.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn piece_message(content: &[u8], piece_length: usize, block: BlockInfo, corrupt: bool) -> PeerMessage {
    let start = block.piece_index as usize * piece_length + block.offset as usize;
    let mut data = content[start..start + block.length as usize].to_vec();
    if corrupt {
        data[0] ^= 0xff;
    }

    PeerMessage::Piece {
        piece_index: block.piece_index,
        offset: block.offset,
        data,
    }
}
