use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Timed out dialing {0}")]
    DialTimeout(SocketAddr),

    #[error("Connection to {addr} refused: {source}")]
    DialRefused {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Handshake failed: {0}")]
    HandshakeFailure(String),

    #[error("Peer declared a different content fingerprint")]
    FingerprintMismatch,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Peer does not have chunk {0}")]
    ChunkUnavailable(usize),

    #[error("Peer refused to serve: {0}")]
    PeerRefused(&'static str),

    #[error("Integrity check failed for chunk {0}")]
    IntegrityFailure(usize),

    #[error("Connection closed after {got} of {expected} bytes")]
    ShortRead { expected: usize, got: usize },

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Peer connection timed out")]
    Timeout,

    #[error("Download cancelled")]
    Cancelled,

    #[error("No peers to download from")]
    NoPeers,

    #[error("Chunk {chunk_index} failed after {attempts} attempts")]
    DownloadFailed { chunk_index: usize, attempts: u32 },

    #[error("Download did not finish before the deadline")]
    DownloadTimedOut,

    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error("Bencode parsing error: {0}")]
    Bencode(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Tracker error: {0}")]
    Tracker(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl FetchError {
    /// Whether the error came from a single peer attempt rather than from the
    /// download as a whole.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            FetchError::DialTimeout(_)
                | FetchError::DialRefused { .. }
                | FetchError::HandshakeFailure(_)
                | FetchError::FingerprintMismatch
                | FetchError::ProtocolViolation(_)
                | FetchError::ChunkUnavailable(_)
                | FetchError::PeerRefused(_)
                | FetchError::IntegrityFailure(_)
                | FetchError::ShortRead { .. }
                | FetchError::Transport(_)
                | FetchError::Timeout
        )
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
