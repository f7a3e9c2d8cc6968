//! Drives many single-chunk peer attempts against a shared work queue until
//! every chunk has been downloaded and verified exactly once.
//!
//! Every chunk index is always in exactly one place: queued, held by a running
//! attempt, or recorded in [`CompletedChunks`]. Failed attempts put their index
//! back on the queue; only a successful attempt removes it for good. The queue
//! being empty says nothing about termination, only the completion count does.

mod roster;
mod worker;

pub use roster::{Pick, PeerRoster};

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::piece::{CompletedChunks, ContentDescriptor};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use worker::Attempt;

/// Chunks verified so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// State shared between the dispatcher and its attempts
pub(crate) struct SwarmState {
    descriptor: ContentDescriptor,
    config: FetchConfig,
    queue: mpsc::Sender<usize>,
    completed: CompletedChunks,
    roster: Mutex<PeerRoster>,
    cancel: CancellationToken,
}

impl SwarmState {
    fn roster(&self) -> MutexGuard<'_, PeerRoster> {
        self.roster.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ChunkScheduler {
    state: Arc<SwarmState>,
    queue_rx: mpsc::Receiver<usize>,
    attempts: Vec<u32>,
    workers: JoinSet<()>,
    worker_slots: Arc<Semaphore>,
    progress: watch::Sender<Progress>,
}

impl ChunkScheduler {
    /// Queue every chunk of `descriptor` for download from `peers`.
    ///
    /// `cancel` aborts the run; the scheduler works on a child token so
    /// finishing a download never cancels the caller's token.
    pub fn new(
        descriptor: ContentDescriptor,
        peers: &[SocketAddr],
        config: FetchConfig,
        cancel: &CancellationToken,
    ) -> Self {
        let num_chunks = descriptor.num_chunks();

        let (queue, queue_rx) = mpsc::channel(num_chunks.max(1));
        for index in 0..num_chunks {
            // Capacity is exactly num_chunks
            let _ = queue.try_send(index);
        }

        let roster = PeerRoster::new(peers, config.backoff_base, config.max_backoff);
        let worker_slots = Arc::new(Semaphore::new(
            config
                .max_workers
                .unwrap_or(Semaphore::MAX_PERMITS)
                .clamp(1, Semaphore::MAX_PERMITS),
        ));
        let (progress, _) = watch::channel(Progress {
            completed: 0,
            total: num_chunks,
        });

        Self {
            state: Arc::new(SwarmState {
                descriptor,
                config,
                queue,
                completed: CompletedChunks::new(num_chunks),
                roster: Mutex::new(roster),
                cancel: cancel.child_token(),
            }),
            queue_rx,
            attempts: vec![0; num_chunks],
            workers: JoinSet::new(),
            worker_slots,
            progress,
        }
    }

    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Download everything and return the payloads, indexed by chunk.
    pub async fn run(mut self) -> Result<Vec<Option<Bytes>>> {
        let total = self.state.descriptor.num_chunks();
        if total == 0 {
            return Ok(Vec::new());
        }
        if self.state.roster().is_empty() {
            return Err(FetchError::NoPeers);
        }

        info!(
            "Downloading {} chunks from {} peers",
            total,
            self.state.roster().len()
        );

        // Whatever happens below, in-flight attempts stop with us
        let _stop = self.state.cancel.clone().drop_guard();

        let outcome = match self.state.config.download_deadline {
            Some(limit) => timeout(limit, self.dispatch())
                .await
                .unwrap_or_else(|_| Err(FetchError::DownloadTimedOut)),
            None => self.dispatch().await,
        };
        outcome?;

        info!("All {} chunks verified", total);
        Ok(self.state.completed.take())
    }

    async fn dispatch(&mut self) -> Result<()> {
        let cancel = self.state.cancel.clone();

        while !self.state.completed.is_done() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => {
                    self.reap(joined);
                    continue;
                }
                permit = self.worker_slots.clone().acquire_owned() => {
                    permit.map_err(|_| FetchError::Cancelled)?
                }
            };

            let index = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => {
                    self.reap(joined);
                    continue;
                }
                index = self.queue_rx.recv() => match index {
                    Some(index) => index,
                    None => break,
                },
            };

            if self.state.completed.is_recorded(index) {
                continue;
            }

            let attempts = self.attempts[index];
            if let Some(max) = self.state.config.max_attempts_per_chunk {
                if attempts >= max {
                    return Err(FetchError::DownloadFailed {
                        chunk_index: index,
                        attempts,
                    });
                }
            }

            let peer = self.next_peer(&cancel).await?;
            let chunk = self.state.descriptor.chunk(index).ok_or_else(|| {
                FetchError::InvalidManifest(format!("no chunk {} in descriptor", index))
            })?;

            self.attempts[index] = attempts + 1;
            debug!("Chunk {} -> {} (attempt {})", index, peer, attempts + 1);

            let attempt = Attempt {
                state: self.state.clone(),
                peer,
                chunk,
                number: attempts + 1,
                permit,
            };
            self.workers.spawn(attempt.run());
        }

        self.publish_progress();
        Ok(())
    }

    /// Wait, if need be, for some peer to come out of backoff.
    async fn next_peer(&self, cancel: &CancellationToken) -> Result<SocketAddr> {
        loop {
            let pick = self.state.roster().next_ready(Instant::now());
            match pick {
                Some(Pick::Ready(addr)) => return Ok(addr),
                Some(Pick::WaitUntil(at)) => {
                    debug!("All peers backing off, waiting");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = sleep_until(at) => {}
                    }
                }
                None => return Err(FetchError::NoPeers),
            }
        }
    }

    fn reap(&mut self, joined: std::result::Result<(), JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("Attempt task panicked: {}", e);
            }
        }
        self.publish_progress();
    }

    fn publish_progress(&self) {
        self.progress.send_replace(Progress {
            completed: self.state.completed.completed(),
            total: self.state.descriptor.num_chunks(),
        });
    }
}
