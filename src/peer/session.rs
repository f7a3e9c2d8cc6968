use super::message::read_message;
use super::protocol::handshake;
use super::{Bitfield, PeerMessage};
use crate::error::{FetchError, Result};
use crate::piece::ChunkSpec;
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Consecutive frames a session will discard while waiting for one it can use.
/// Keep-alives are not counted.
pub const MAX_SKIPPED_FRAMES: usize = 4096;

/// Where a session is in the per-peer protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    AwaitingBitfield,
    Negotiating,
    AwaitingUnchoke,
    Downloading,
    Done,
    Failed,
}

/// Time and cancellation bounds for everything a connection does.
#[derive(Debug, Clone)]
pub struct Liveness {
    deadline: Instant,
    block_timeout: Duration,
    cancel: CancellationToken,
}

impl Liveness {
    pub fn new(deadline: Instant, block_timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline,
            block_timeout,
            cancel,
        }
    }

    /// Run `fut` until the connection deadline.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.guard_until(self.deadline, fut).await
    }

    async fn guard_until<T, F>(&self, until: Instant, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            result = timeout_at(until, fut) => result.map_err(|_| FetchError::Timeout)?,
        }
    }

    /// Deadline for one block: the block timeout, but never past the
    /// connection deadline.
    fn block_deadline(&self) -> Instant {
        (Instant::now() + self.block_timeout).min(self.deadline)
    }
}

/// One handshaken connection used for a single chunk attempt.
///
/// Dropping the session closes the connection.
pub struct PeerSession<S> {
    addr: SocketAddr,
    stream: S,
    state: SessionState,
    availability: Option<Bitfield>,
    num_chunks: usize,
    liveness: Liveness,
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Handshake over `stream` and return a session ready for one chunk
    /// attempt.
    pub async fn open(
        mut stream: S,
        addr: SocketAddr,
        fingerprint: [u8; 20],
        client_id: [u8; 20],
        num_chunks: usize,
        liveness: Liveness,
    ) -> Result<Self> {
        liveness
            .guard(handshake(&mut stream, fingerprint, client_id))
            .await?;

        Ok(Self {
            addr,
            stream,
            state: SessionState::Connected,
            availability: None,
            num_chunks,
            liveness,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn availability(&self) -> Option<&Bitfield> {
        self.availability.as_ref()
    }

    /// Fetch and verify one chunk.
    ///
    /// Leaves the session in `Done` or `Failed`; either way it should be
    /// dropped afterwards.
    #[tracing::instrument(
        level = "debug",
        skip(self, chunk),
        fields(peer = %self.addr, chunk = chunk.index)
    )]
    pub async fn download_chunk(&mut self, chunk: &ChunkSpec) -> Result<Bytes> {
        let result = self.drive(chunk).await;
        match &result {
            Ok(_) => self.state = SessionState::Done,
            Err(e) => {
                debug!("Session failed in {:?}: {}", self.state, e);
                self.state = SessionState::Failed;
            }
        }
        result
    }

    async fn drive(&mut self, chunk: &ChunkSpec) -> Result<Bytes> {
        if self.state != SessionState::Connected {
            return Err(FetchError::ProtocolViolation(format!(
                "session in state {:?} cannot start a chunk",
                self.state
            )));
        }
        self.state = SessionState::AwaitingBitfield;

        self.await_bitfield().await?;

        // Nothing has been written since the handshake, keep it that way
        if !self.has_chunk(chunk.index) {
            return Err(FetchError::ChunkUnavailable(chunk.index));
        }

        self.negotiate().await?;
        self.await_unchoke().await?;
        let data = self.download_blocks(chunk).await?;
        chunk.verify(&data)?;

        let have = PeerMessage::Have {
            piece_index: chunk.index as u32,
        };
        if let Err(e) = self.send(&have).await {
            debug!("Ignoring failed have announcement: {}", e);
        }

        Ok(data)
    }

    fn has_chunk(&self, index: usize) -> bool {
        self.availability
            .as_ref()
            .map_or(false, |bitfield| bitfield.has_piece(index))
    }

    async fn await_bitfield(&mut self) -> Result<()> {
        let deadline = self.liveness.deadline;
        match self
            .next_message(deadline, |m| !matches!(m, PeerMessage::KeepAlive))
            .await?
        {
            PeerMessage::Bitfield { bitfield } => {
                let bitfield = Bitfield::from_payload(&bitfield, self.num_chunks);
                debug!("Peer advertises {}/{} chunks", bitfield.count(), self.num_chunks);
                self.availability = Some(bitfield);
                self.state = SessionState::Negotiating;
                Ok(())
            }
            other => Err(FetchError::ProtocolViolation(format!(
                "expected bitfield, got {}",
                other.kind()
            ))),
        }
    }

    async fn negotiate(&mut self) -> Result<()> {
        self.send(&PeerMessage::Unchoke).await?;
        self.send(&PeerMessage::Interested).await?;
        self.state = SessionState::AwaitingUnchoke;
        Ok(())
    }

    async fn await_unchoke(&mut self) -> Result<()> {
        let deadline = self.liveness.deadline;
        match self
            .next_message(deadline, |m| {
                matches!(m, PeerMessage::Unchoke | PeerMessage::Choke)
            })
            .await?
        {
            PeerMessage::Unchoke => {
                self.state = SessionState::Downloading;
                Ok(())
            }
            _ => Err(FetchError::PeerRefused("peer refused")),
        }
    }

    async fn download_blocks(&mut self, chunk: &ChunkSpec) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(chunk.length as usize);

        for block in chunk.blocks() {
            self.send(&PeerMessage::Request { block }).await?;

            let until = self.liveness.block_deadline();
            match self
                .next_message(until, |m| {
                    matches!(m, PeerMessage::Piece { .. } | PeerMessage::Choke)
                })
                .await?
            {
                PeerMessage::Piece {
                    piece_index,
                    offset,
                    data,
                } => {
                    if piece_index != block.piece_index
                        || offset != block.offset
                        || data.len() != block.length as usize
                    {
                        return Err(FetchError::ProtocolViolation(format!(
                            "expected block {}@{}+{}, got {}@{}+{}",
                            block.piece_index,
                            block.offset,
                            block.length,
                            piece_index,
                            offset,
                            data.len()
                        )));
                    }
                    buf.extend_from_slice(&data);
                }
                _ => return Err(FetchError::PeerRefused("peer revoked access")),
            }
        }

        Ok(buf.freeze())
    }

    /// Read until `wanted` accepts a frame, discarding keep-alives and anything
    /// else it rejects.
    async fn next_message<F>(&mut self, until: Instant, wanted: F) -> Result<PeerMessage>
    where
        F: Fn(&PeerMessage) -> bool,
    {
        let mut skipped = 0;
        loop {
            let message = self
                .liveness
                .guard_until(until, read_message(&mut self.stream))
                .await?;
            if wanted(&message) {
                trace!("Received {}", message.kind());
                return Ok(message);
            }
            // Keep-alives are bounded by the deadline alone
            if matches!(message, PeerMessage::KeepAlive) {
                continue;
            }

            skipped += 1;
            if skipped > MAX_SKIPPED_FRAMES {
                return Err(FetchError::ProtocolViolation(format!(
                    "{} frames in a row without progress",
                    MAX_SKIPPED_FRAMES
                )));
            }
            self.skip(&message);
        }
    }

    fn skip(&mut self, message: &PeerMessage) {
        if let PeerMessage::Have { piece_index } = message {
            if let Some(bitfield) = self.availability.as_mut() {
                bitfield.set_piece(*piece_index as usize);
            }
        }
        trace!("Skipping {} while {:?}", message.kind(), self.state);
    }

    async fn send(&mut self, message: &PeerMessage) -> Result<()> {
        let bytes = message.to_bytes();
        let stream = &mut self.stream;
        self.liveness
            .guard(async move { stream.write_all(&bytes).await.map_err(FetchError::from) })
            .await?;
        trace!("Sent {}", message.kind());
        Ok(())
    }
}
