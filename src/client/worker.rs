use super::queue::WorkQueue;
use crate::error::{BittorrentError, Result};
use crate::peer::PeerConnection;
use crate::piece::{download_piece, PipelineOptions};
use crate::storage::PieceStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// State shared by every worker of one download
pub struct WorkerContext {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub queue: WorkQueue,
    pub store: PieceStore,
    pub options: PipelineOptions,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Verification failures tolerated from one peer
    pub max_peer_strikes: u32,
}

/// Serve pieces from one peer until the queue drains, the connection
/// breaks or shutdown is signalled. Returns the number of pieces stored.
///
/// Every job this worker pulls is either completed or handed back to the
/// queue before it returns.
pub async fn run_worker(
    addr: SocketAddr,
    ctx: Arc<WorkerContext>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<usize> {
    let mut conn = tokio::select! {
        biased;
        _ = wait_for_shutdown(&mut shutdown) => return Ok(0),
        conn = open(addr, &ctx) => conn?,
    };

    let mut completed = 0;
    let mut strikes = 0;

    loop {
        let job = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            job = ctx.queue.pull() => match job {
                Some(job) => job,
                None => break,
            },
        };

        debug!("{} assigned piece {}", addr, job.index);

        let result = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => None,
            result = download_piece(&mut conn, &job, ctx.options) => Some(result),
        };

        let Some(result) = result else {
            ctx.queue.retry(job);
            break;
        };

        match result {
            Ok(data) => {
                if let Err(e) = ctx.store.write_piece(job.index, &data).await {
                    ctx.queue.retry(job);
                    return Err(e);
                }
                ctx.queue.complete();
                completed += 1;
                info!("Piece {} downloaded from {}", job.index, addr);
            }
            Err(e) if !e.is_connection_fatal() => {
                warn!("Piece {} from {} failed: {}", job.index, addr, e);
                let bad_data = matches!(e, BittorrentError::PieceVerificationFailed { .. });
                ctx.queue.retry(job);

                if bad_data {
                    strikes += 1;
                    if strikes >= ctx.max_peer_strikes {
                        warn!("Dropping {} after {} bad pieces", addr, strikes);
                        break;
                    }
                }
            }
            Err(e) => {
                ctx.queue.retry(job);
                return Err(e);
            }
        }
    }

    debug!("Worker for {} finished with {} pieces", addr, completed);
    Ok(completed)
}

async fn open(addr: SocketAddr, ctx: &WorkerContext) -> Result<PeerConnection> {
    let mut conn = PeerConnection::connect(
        addr,
        ctx.info_hash,
        ctx.peer_id,
        ctx.connect_timeout,
        ctx.read_timeout,
    )
    .await?;
    conn.prepare().await?;
    Ok(conn)
}

/// Resolves once shutdown is signalled. Never resolves if the sender is
/// gone without signalling.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::PieceJob;
    use crate::testutil::{sample_torrent, scratch_dir, FakePeer, FakePeerOptions};

    fn context(info_hash: [u8; 20], jobs: Vec<PieceJob>, store: PieceStore) -> Arc<WorkerContext> {
        Arc::new(WorkerContext {
            info_hash,
            peer_id: [1u8; 20],
            queue: WorkQueue::new(jobs, 5),
            store,
            options: PipelineOptions::default(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            max_peer_strikes: 2,
        })
    }

    #[tokio::test]
    async fn test_worker_drains_queue() {
        let dir = scratch_dir("worker");
        let (metainfo, content) = sample_torrent(70_000, 32_768);
        let peer = FakePeer::spawn(metainfo.info_hash, content, 32_768, FakePeerOptions::default()).await;

        let jobs = PieceJob::for_torrent(&metainfo.info).unwrap();
        let ctx = context(metainfo.info_hash, jobs, PieceStore::new(dir.join("out.bin")));
        let (_tx, rx) = watch::channel(false);

        let stored = run_worker(peer.addr, ctx.clone(), rx).await.unwrap();
        assert_eq!(stored, 3);
        assert_eq!(ctx.queue.missing(), 0);
        assert!(ctx.store.piece_path(2).exists());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_worker_retires_after_bad_pieces() {
        let dir = scratch_dir("worker-bad");
        let (metainfo, content) = sample_torrent(40_000, 20_000);
        let options = FakePeerOptions {
            corrupt_pieces: vec![0, 1],
            ..Default::default()
        };
        let peer = FakePeer::spawn(metainfo.info_hash, content, 20_000, options).await;

        let jobs = PieceJob::for_torrent(&metainfo.info).unwrap();
        let ctx = context(metainfo.info_hash, jobs, PieceStore::new(dir.join("out.bin")));
        let (_tx, rx) = watch::channel(false);

        let stored = run_worker(peer.addr, ctx.clone(), rx).await.unwrap();
        assert_eq!(stored, 0);
        // Both jobs went back on the queue
        assert_eq!(ctx.queue.missing(), 2);
        assert!(ctx.queue.pull().await.is_some());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (metainfo, _) = sample_torrent(1_000, 1_000);
        let jobs = PieceJob::for_torrent(&metainfo.info).unwrap();
        let ctx = context(metainfo.info_hash, jobs, PieceStore::new("unused.bin"));
        let (_tx, rx) = watch::channel(false);

        assert!(run_worker(addr, ctx.clone(), rx).await.is_err());
        assert_eq!(ctx.queue.missing(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let (metainfo, _) = sample_torrent(1_000, 1_000);
        let jobs = PieceJob::for_torrent(&metainfo.info).unwrap();
        let ctx = context(metainfo.info_hash, jobs, PieceStore::new("unused.bin"));
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert_eq!(run_worker(addr, ctx, rx).await.unwrap(), 0);
    }
}
