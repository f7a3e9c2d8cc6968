use super::SwarmState;
use crate::error::{FetchError, Result};
use crate::peer::{dialer, Liveness, PeerSession};
use crate::piece::ChunkSpec;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Puts the index back on the queue unless the attempt succeeded, including
/// when the task is aborted or panics part way through.
struct RequeueGuard {
    index: usize,
    queue: mpsc::Sender<usize>,
    armed: bool,
}

impl RequeueGuard {
    fn new(index: usize, queue: mpsc::Sender<usize>) -> Self {
        Self {
            index,
            queue,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RequeueGuard {
    fn drop(&mut self) {
        if self.armed && self.queue.try_send(self.index).is_err() {
            // Only happens once the dispatcher has stopped listening
            debug!("Dropping chunk {} on shutdown", self.index);
        }
    }
}

/// One peer x one chunk.
pub(super) struct Attempt {
    pub state: Arc<SwarmState>,
    pub peer: SocketAddr,
    pub chunk: ChunkSpec,
    pub number: u32,
    pub permit: OwnedSemaphorePermit,
}

impl Attempt {
    #[tracing::instrument(
        name = "attempt",
        skip(self),
        fields(peer = %self.peer, chunk = self.chunk.index, n = self.number)
    )]
    pub async fn run(self) {
        let mut requeue = RequeueGuard::new(self.chunk.index, self.state.queue.clone());

        match self.fetch().await {
            Ok(data) => {
                requeue.disarm();
                self.state.roster().record_success(self.peer);
                if self.state.completed.record(self.chunk.index, data) {
                    info!(
                        "Chunk {} verified ({}/{})",
                        self.chunk.index,
                        self.state.completed.completed(),
                        self.state.descriptor.num_chunks()
                    );
                }
            }
            Err(e) if !e.is_peer_fault() => debug!("Attempt stopped: {}", e),
            Err(e @ FetchError::ChunkUnavailable(_)) => {
                debug!("{}", e);
                self.state.roster().record_failure(self.peer, Instant::now());
            }
            Err(e) => {
                warn!("Chunk {} from {} failed: {}", self.chunk.index, self.peer, e);
                self.state.roster().record_failure(self.peer, Instant::now());
            }
        }

        drop(self.permit);
    }

    async fn fetch(&self) -> Result<Bytes> {
        let config = &self.state.config;
        let cancel = &self.state.cancel;

        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            stream = dialer::connect(self.peer, config.dial_timeout) => stream?,
        };

        let liveness = Liveness::new(
            Instant::now() + config.connection_deadline,
            config.block_timeout,
            cancel.clone(),
        );
        let mut session = PeerSession::open(
            stream,
            self.peer,
            self.state.descriptor.fingerprint(),
            config.client_id,
            self.state.descriptor.num_chunks(),
            liveness,
        )
        .await?;

        session.download_chunk(&self.chunk).await
    }
}
