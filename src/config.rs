use rand::Rng;
use std::time::Duration;

/// Knobs for one download run
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Our 20-byte identifier, sent in every handshake
    pub client_id: [u8; 20],
    /// Limit on establishing a TCP connection
    pub dial_timeout: Duration,
    /// Lifetime of a connection, counted from when it is established
    pub connection_deadline: Duration,
    /// Longest wait for a single requested block
    pub block_timeout: Duration,
    /// Concurrent chunk attempts. `None` spawns without limit.
    pub max_workers: Option<usize>,
    /// Failed attempts tolerated per chunk before giving up. `None` retries forever.
    pub max_attempts_per_chunk: Option<u32>,
    /// First backoff applied to a peer after a failure. Zero disables backoff.
    pub backoff_base: Duration,
    pub max_backoff: Duration,
    /// Give up on the whole download after this long
    pub download_deadline: Option<Duration>,
    /// Port reported to the tracker
    pub listen_port: u16,
    /// How often progress is logged
    pub progress_interval: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            client_id: generate_peer_id(),
            dial_timeout: Duration::from_secs(10),
            connection_deadline: Duration::from_secs(30),
            block_timeout: Duration::from_secs(15),
            max_workers: Some(50),
            max_attempts_per_chunk: None,
            backoff_base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            download_deadline: None,
            listen_port: 6881,
            progress_interval: Duration::from_secs(2),
        }
    }
}

/// Generate a random peer ID
/// Format: -SF0001-<12 random chars>
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[0..8].copy_from_slice(b"-SF0001-");

    let mut rng = rand::thread_rng();
    for byte in &mut peer_id[8..] {
        *byte = rng.gen_range(b'0'..=b'z');
    }

    peer_id
}
