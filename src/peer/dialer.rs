use crate::error::{FetchError, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Open a TCP connection to `addr`, giving up after `limit`.
pub async fn connect(addr: SocketAddr, limit: Duration) -> Result<TcpStream> {
    debug!("Dialing {}", addr);

    let stream = timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| FetchError::DialTimeout(addr))?
        .map_err(|source| FetchError::DialRefused { addr, source })?;

    // Frames are small and written back-to-back
    stream.set_nodelay(true)?;
    Ok(stream)
}
