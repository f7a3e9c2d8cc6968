//! Loopback peers for exercising the scheduler over real sockets.

use crate::peer::{read_message, Handshake, PeerMessage, HANDSHAKE_LEN};
use crate::piece::ContentDescriptor;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Split `content` into `chunk_size` chunks and describe it.
pub fn chunked(content: &[u8], chunk_size: u64) -> ContentDescriptor {
    let hashes = content
        .chunks(chunk_size as usize)
        .map(|chunk| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&Sha1::digest(chunk));
            hash
        })
        .collect();
    ContentDescriptor::new([0x5a; 20], hashes, chunk_size, content.len() as u64).unwrap()
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A seeding peer with configurable misbehaviour.
pub struct Seed {
    fingerprint: [u8; 20],
    chunks: Vec<Bytes>,
    holds: Vec<bool>,
    drop_every: Option<usize>,
    corrupt_every: Option<usize>,
    silent: bool,
}

pub struct SeedHandle {
    pub addr: SocketAddr,
    requests: Arc<AtomicUsize>,
}

impl SeedHandle {
    /// Piece requests answered so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Seed {
    pub fn new(descriptor: &ContentDescriptor, content: &[u8]) -> Self {
        let chunks: Vec<Bytes> = content
            .chunks(descriptor.chunk_size() as usize)
            .map(Bytes::copy_from_slice)
            .collect();
        Self {
            fingerprint: descriptor.fingerprint(),
            holds: vec![true; chunks.len()],
            chunks,
            drop_every: None,
            corrupt_every: None,
            silent: false,
        }
    }

    /// Advertise only the chunks `keep` accepts.
    pub fn holding(mut self, keep: impl Fn(usize) -> bool) -> Self {
        for (i, held) in self.holds.iter_mut().enumerate() {
            *held = keep(i);
        }
        self
    }

    /// Hang up right after the handshake on every `n`th connection.
    pub fn drop_every(mut self, n: usize) -> Self {
        self.drop_every = Some(n);
        self
    }

    /// Flip a byte in every block served on every `n`th connection.
    pub fn corrupt_every(mut self, n: usize) -> Self {
        self.corrupt_every = Some(n);
        self
    }

    /// Accept connections and never say anything.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub async fn spawn(self) -> SeedHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let seed = Arc::new(self);

        let counter = requests.clone();
        tokio::spawn(async move {
            let mut connections = 0usize;
            while let Ok((stream, _)) = listener.accept().await {
                connections += 1;
                let seed = seed.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let _ = seed.serve(stream, connections, counter).await;
                });
            }
        });

        SeedHandle { addr, requests }
    }

    async fn serve(
        &self,
        mut stream: TcpStream,
        connection: usize,
        requests: Arc<AtomicUsize>,
    ) -> std::io::Result<()> {
        if self.silent {
            let mut sink = Vec::new();
            stream.read_to_end(&mut sink).await?;
            return Ok(());
        }

        let mut greeting = [0u8; HANDSHAKE_LEN];
        stream.read_exact(&mut greeting).await?;
        stream
            .write_all(&Handshake::new(self.fingerprint, [0x33; 20]).to_bytes())
            .await?;

        if self.drop_every.map_or(false, |n| connection % n == 0) {
            return Ok(());
        }
        let corrupt = self.corrupt_every.map_or(false, |n| connection % n == 0);

        let mut bitfield = vec![0u8; self.holds.len().div_ceil(8)];
        for (i, _) in self.holds.iter().enumerate().filter(|(_, held)| **held) {
            bitfield[i / 8] |= 0x80 >> (i % 8);
        }
        stream
            .write_all(
                &PeerMessage::Bitfield {
                    bitfield: Bytes::from(bitfield),
                }
                .to_bytes(),
            )
            .await?;

        loop {
            let message = match read_message(&mut stream).await {
                Ok(message) => message,
                Err(_) => return Ok(()),
            };
            match message {
                PeerMessage::Interested => {
                    stream.write_all(&PeerMessage::Unchoke.to_bytes()).await?;
                }
                PeerMessage::Request { block } => {
                    requests.fetch_add(1, Ordering::SeqCst);
                    let chunk = &self.chunks[block.piece_index as usize];
                    let start = block.offset as usize;
                    let mut data = chunk[start..start + block.length as usize].to_vec();
                    if corrupt {
                        data[0] ^= 0xff;
                    }
                    let piece = PeerMessage::Piece {
                        piece_index: block.piece_index,
                        offset: block.offset,
                        data: Bytes::from(data),
                    };
                    stream.write_all(&piece.to_bytes()).await?;
                }
                _ => {}
            }
        }
    }
}
