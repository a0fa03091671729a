mod queue;
mod worker;

use crate::error::{BittorrentError, Result};
use crate::peer::PeerConnection;
use crate::piece::{download_piece, PieceJob, PipelineOptions, BLOCK_SIZE, PIPELINE_DEPTH};
use crate::storage::PieceStore;
use crate::torrent::Metainfo;
use crate::tracker::{generate_peer_id, Peer, TrackerClient, TrackerRequest};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use queue::WorkQueue;
use tracing::{debug, error, info, warn};
use worker::{run_worker, WorkerContext};

/// Configuration for the BitTorrent client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Fixed peer id; generated when `None`
    pub peer_id: Option<[u8; 20]>,
    pub listen_port: u16,
    /// Upper bound on concurrent peer workers
    pub max_peers: usize,
    pub block_size: u32,
    pub pipeline_depth: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_piece_attempts: u32,
    /// Bad pieces accepted from one peer before it is dropped
    pub max_peer_strikes: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            peer_id: None,
            listen_port: 6881,
            max_peers: 50,
            block_size: BLOCK_SIZE,
            pipeline_depth: PIPELINE_DEPTH,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            max_piece_attempts: 5,
            max_peer_strikes: 2,
        }
    }
}

/// Outcome of a finished download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub pieces: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Main BitTorrent client
pub struct TorrentClient {
    config: ClientConfig,
    peer_id: [u8; 20],
    tracker: TrackerClient,
}

impl TorrentClient {
    pub fn new(config: ClientConfig) -> Self {
        let peer_id = config.peer_id.unwrap_or_else(generate_peer_id);
        info!("Client initialized with peer_id: {}", hex::encode(peer_id));

        Self {
            config,
            peer_id,
            tracker: TrackerClient::new(),
        }
    }

    fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            block_size: self.config.block_size,
            depth: self.config.pipeline_depth,
        }
    }

    /// Ask the torrent's tracker for peers
    pub async fn announce(&self, metainfo: &Metainfo) -> Result<Vec<Peer>> {
        let request = TrackerRequest::new(
            metainfo.info_hash,
            self.peer_id,
            self.config.listen_port,
            metainfo.info.length,
        );

        let response = self.tracker.announce(&metainfo.announce, &request).await?;
        info!(
            "Received {} peers from tracker (interval {}s)",
            response.peers.len(),
            response.interval
        );
        Ok(response.peers)
    }

    /// Handshake with a single peer and return its peer id
    pub async fn handshake(&self, metainfo: &Metainfo, addr: SocketAddr) -> Result<[u8; 20]> {
        let conn = self.connect(metainfo, addr).await?;
        Ok(*conn.peer_id())
    }

    async fn connect(&self, metainfo: &Metainfo, addr: SocketAddr) -> Result<PeerConnection> {
        PeerConnection::connect(
            addr,
            metainfo.info_hash,
            self.peer_id,
            self.config.connect_timeout,
            self.config.read_timeout,
        )
        .await
    }

    /// Download and verify one piece, trying peers in order until one
    /// delivers it, and write it to `output`. Returns the piece length.
    pub async fn download_piece_to(
        &self,
        metainfo: &Metainfo,
        peers: &[Peer],
        index: usize,
        output: &Path,
    ) -> Result<usize> {
        let piece_count = metainfo.info.piece_count();
        let job = PieceJob::for_torrent(&metainfo.info)?
            .into_iter()
            .nth(index)
            .ok_or_else(|| {
                BittorrentError::InvalidMetadata(format!(
                    "piece index {} out of range ({} pieces)",
                    index, piece_count
                ))
            })?;

        let mut last_error = None;
        for peer in peers {
            match self.fetch_piece(metainfo, peer.socket_addr(), &job).await {
                Ok(data) => {
                    tokio::fs::write(output, &data).await.map_err(|e| {
                        BittorrentError::StorageError(format!("writing {}: {}", output.display(), e))
                    })?;
                    info!("Piece {} saved to {}", index, output.display());
                    return Ok(data.len());
                }
                Err(e) => {
                    warn!("Piece {} from {} failed: {}", index, peer, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(BittorrentError::DownloadIncomplete { missing: 1 }))
    }

    async fn fetch_piece(&self, metainfo: &Metainfo, addr: SocketAddr, job: &PieceJob) -> Result<Vec<u8>> {
        let mut conn = self.connect(metainfo, addr).await?;
        conn.prepare().await?;
        download_piece(&mut conn, job, self.pipeline_options()).await
    }

    /// Download the whole file from `peers` into `output`.
    ///
    /// One worker per peer pulls pieces from a shared queue; failed pieces
    /// go back on the queue for any worker to pick up. The output file only
    /// appears once every piece is verified. On failure or cancellation
    /// all temporaries are removed.
    pub async fn download(
        &self,
        metainfo: &Metainfo,
        peers: &[Peer],
        output: &Path,
        shutdown: watch::Receiver<bool>,
    ) -> Result<DownloadSummary> {
        let started = Instant::now();
        let jobs = PieceJob::for_torrent(&metainfo.info)?;
        let piece_count = jobs.len();

        info!(
            "Downloading {} ({} pieces, {} bytes) from {} peers",
            output.display(),
            piece_count,
            metainfo.info.length,
            peers.len().min(self.config.max_peers)
        );

        let ctx = Arc::new(WorkerContext {
            info_hash: metainfo.info_hash,
            peer_id: self.peer_id,
            queue: WorkQueue::new(jobs, self.config.max_piece_attempts),
            store: PieceStore::new(output),
            options: self.pipeline_options(),
            connect_timeout: self.config.connect_timeout,
            read_timeout: self.config.read_timeout,
            max_peer_strikes: self.config.max_peer_strikes,
        });

        let mut workers = JoinSet::new();
        for peer in peers.iter().take(self.config.max_peers) {
            let addr = peer.socket_addr();
            let ctx = ctx.clone();
            let shutdown = shutdown.clone();
            workers.spawn(async move { (addr, run_worker(addr, ctx, shutdown).await) });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((addr, Ok(pieces))) => debug!("Worker for {} done ({} pieces)", addr, pieces),
                Ok((addr, Err(e))) => warn!("Worker for {} retired: {}", addr, e),
                Err(e) => error!("Worker task failed: {}", e),
            }
        }
        ctx.queue.close();

        if *shutdown.borrow() {
            ctx.store.cleanup(piece_count).await;
            return Err(BittorrentError::Cancelled);
        }

        let missing = ctx.queue.missing();
        if missing > 0 {
            error!("{} of {} pieces could not be downloaded", missing, piece_count);
            ctx.store.cleanup(piece_count).await;
            return Err(BittorrentError::DownloadIncomplete { missing });
        }

        let bytes = ctx.store.assemble(piece_count).await?;
        let summary = DownloadSummary {
            pieces: piece_count,
            bytes,
            elapsed: started.elapsed(),
        };
        info!(
            "Download of {} complete in {:.1}s",
            ctx.store.output().display(),
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }
}

impl Default for TorrentClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}
