use crate::assembler::assemble;
use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::manifest::load_manifest;
use crate::piece::ContentDescriptor;
use crate::scheduler::{ChunkScheduler, Progress};
use crate::storage::write_files;
use crate::tracker::{AnnounceRequest, TrackerClient};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads content from a swarm
pub struct SwarmClient {
    config: FetchConfig,
    cancel: CancellationToken,
}

impl SwarmClient {
    pub fn new(config: FetchConfig) -> Self {
        info!("Client initialized with peer id: {}", hex::encode(config.client_id));
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops any download in progress with `Cancelled`.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Download every chunk of `descriptor` from `peers` and return the
    /// content, exactly `total_length` bytes in chunk order.
    pub async fn fetch(
        &self,
        descriptor: &ContentDescriptor,
        peers: &[SocketAddr],
    ) -> Result<Vec<u8>> {
        let scheduler =
            ChunkScheduler::new(descriptor.clone(), peers, self.config.clone(), &self.cancel);
        let reporter = log_progress(scheduler.progress(), self.config.progress_interval);

        let outcome = scheduler.run().await;
        reporter.abort();

        assemble(outcome?, descriptor.total_length())
    }

    /// Load a manifest, announce once, download and write the files under
    /// `output_dir`.
    pub async fn download(&self, manifest_path: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
        info!("Starting download for: {}", manifest_path.display());

        let manifest = load_manifest(manifest_path).await?;
        let descriptor = &manifest.descriptor;
        info!("Name: {}", manifest.name);
        info!("Total size: {} bytes", descriptor.total_length());
        info!("Chunks: {}", descriptor.num_chunks());
        info!("Fingerprint: {}", manifest.fingerprint_hex());

        let peers = if descriptor.num_chunks() == 0 {
            Vec::new()
        } else {
            let tracker = TrackerClient::new(ANNOUNCE_TIMEOUT)?;
            let request = AnnounceRequest::new(
                descriptor.fingerprint(),
                self.config.client_id,
                self.config.listen_port,
                descriptor.total_length(),
            );
            let announced = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                announced = tracker.announce(&manifest.announce, &request) => announced?,
            };
            announced.peers
        };

        let content = self.fetch(descriptor, &peers).await?;
        write_files(output_dir, &manifest.files, &content).await
    }
}

/// Log progress every `every` until the scheduler goes away.
fn log_progress(mut progress: watch::Receiver<Progress>, every: Duration) -> JoinHandle<()> {
    let every = every.max(Duration::from_millis(100));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Progress { completed, total } = *progress.borrow();
                    let percent = if total == 0 {
                        100.0
                    } else {
                        completed as f64 * 100.0 / total as f64
                    };
                    info!("Progress: {}/{} chunks ({:.1}%)", completed, total, percent);
                }
                changed = progress.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    })
}
