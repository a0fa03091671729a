use crate::piece::PieceJob;
use async_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// Shared FIFO of pieces still to download.
///
/// Any number of workers may pull concurrently. The queue closes itself
/// once every job has either completed or been abandoned, which wakes idle
/// workers so they can exit.
pub struct WorkQueue {
    sender: Sender<PieceJob>,
    receiver: Receiver<PieceJob>,
    /// Jobs not yet completed or abandoned, including those in flight
    remaining: AtomicUsize,
    abandoned: AtomicUsize,
    max_attempts: u32,
}

impl WorkQueue {
    pub fn new(jobs: Vec<PieceJob>, max_attempts: u32) -> Self {
        let (sender, receiver) = async_channel::unbounded();
        let remaining = jobs.len();

        for job in jobs {
            // Unbounded and still open, cannot fail
            let _ = sender.try_send(job);
        }
        if remaining == 0 {
            sender.close();
        }

        Self {
            sender,
            receiver,
            remaining: AtomicUsize::new(remaining),
            abandoned: AtomicUsize::new(0),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Wait for the next job. `None` once the queue is closed and drained.
    pub async fn pull(&self) -> Option<PieceJob> {
        self.receiver.recv().await.ok()
    }

    /// Record a job as done
    pub fn complete(&self) {
        self.finish_one();
    }

    /// Put a failed job back at the end of the queue. Returns `false` when
    /// it has used up its attempts (or the queue is closed) and was
    /// abandoned instead.
    pub fn retry(&self, mut job: PieceJob) -> bool {
        job.attempts += 1;

        if job.attempts >= self.max_attempts {
            warn!("Giving up on piece {} after {} attempts", job.index, job.attempts);
            self.abandon();
            return false;
        }

        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Closed(job)) | Err(TrySendError::Full(job)) => {
                warn!("Queue closed, dropping piece {}", job.index);
                self.abandon();
                false
            }
        }
    }

    /// Stop handing out jobs. Anything still queued counts as missing.
    pub fn close(&self) {
        self.sender.close();
    }

    /// Jobs that have not been completed
    pub fn missing(&self) -> usize {
        self.remaining.load(Ordering::SeqCst) + self.abandoned.load(Ordering::SeqCst)
    }

    fn abandon(&self) {
        self.abandoned.fetch_add(1, Ordering::SeqCst);
        self.finish_one();
    }

    fn finish_one(&self) {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.sender.close();
        }
    }
}
