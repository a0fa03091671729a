use crate::bencode::decode_all;
use crate::client::{ClientConfig, TorrentClient};
use crate::error::{BittorrentError, Result};
use crate::torrent::{load_torrent_file, Metainfo};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "bitfetch")]
#[command(about = "A minimal BitTorrent download client", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a bencoded value and print it as JSON
    Decode {
        value: String,
    },

    /// Show information about a torrent file
    Info {
        /// Path to the .torrent file
        torrent: PathBuf,
    },

    /// List the peers the tracker returns for a torrent
    Peers {
        torrent: PathBuf,
    },

    /// Handshake with a peer and print its peer id
    Handshake {
        torrent: PathBuf,

        /// Peer address as ip:port
        peer: SocketAddr,
    },

    /// Download and verify a single piece
    #[command(name = "download_piece")]
    DownloadPiece {
        /// File to write the piece to
        #[arg(short, long)]
        output: PathBuf,

        torrent: PathBuf,

        index: usize,
    },

    /// Download the whole file
    Download {
        /// File to write the download to
        #[arg(short, long)]
        output: PathBuf,

        /// Path to the .torrent file
        torrent: PathBuf,

        /// Port reported to the tracker
        #[arg(short, long, default_value = "6881")]
        port: u16,

        /// Maximum number of peers to download from
        #[arg(short, long, default_value = "50")]
        max_peers: usize,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Decode { value } => {
                let decoded = decode_all(value.as_bytes())?;
                let json = serde_json::to_string(&decoded).map_err(|e| {
                    BittorrentError::InvalidMetadata(format!("cannot render as JSON: {}", e))
                })?;
                println!("{}", json);
            }

            Commands::Info { torrent } => {
                let metainfo = load_torrent_file(torrent).await?;
                print_info(&metainfo);
            }

            Commands::Peers { torrent } => {
                let metainfo = load_torrent_file(torrent).await?;
                let client = TorrentClient::default();
                for peer in client.announce(&metainfo).await? {
                    println!("{}", peer);
                }
            }

            Commands::Handshake { torrent, peer } => {
                let metainfo = load_torrent_file(torrent).await?;
                let client = TorrentClient::default();
                let peer_id = client.handshake(&metainfo, *peer).await?;
                println!("Peer ID: {}", hex::encode(peer_id));
            }

            Commands::DownloadPiece {
                output,
                torrent,
                index,
            } => {
                let metainfo = load_torrent_file(torrent).await?;
                let client = TorrentClient::default();
                let peers = client.announce(&metainfo).await?;
                client
                    .download_piece_to(&metainfo, &peers, *index, output)
                    .await?;
                println!("Piece {} downloaded to {}.", index, output.display());
            }

            Commands::Download {
                output,
                torrent,
                port,
                max_peers,
            } => {
                let config = ClientConfig {
                    listen_port: *port,
                    max_peers: *max_peers,
                    ..Default::default()
                };

                let metainfo = load_torrent_file(torrent).await?;
                let client = TorrentClient::new(config);
                let peers = client.announce(&metainfo).await?;

                let summary = client
                    .download(&metainfo, &peers, output, shutdown_on_ctrl_c())
                    .await?;
                println!(
                    "Downloaded {} to {} ({} bytes in {:.1}s).",
                    torrent.display(),
                    output.display(),
                    summary.bytes,
                    summary.elapsed.as_secs_f64()
                );
            }
        }

        Ok(())
    }
}

fn print_info(metainfo: &Metainfo) {
    println!("Tracker URL: {}", metainfo.announce);
    if let Some(name) = &metainfo.info.name {
        println!("Name: {}", name);
    }
    println!("Length: {}", metainfo.info.length);
    println!("Info Hash: {}", metainfo.info_hash_hex());
    println!("Piece Length: {}", metainfo.info.piece_length);
    println!("Piece Hashes:");
    for hash in metainfo.info.pieces.iter() {
        println!("{}", hash.to_hex());
    }
}

/// Shutdown signal that flips once on Ctrl-C
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping download");
            let _ = tx.send(true);
        }
    });
    rx
}
