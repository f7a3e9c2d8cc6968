use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of asking the roster for a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    Ready(SocketAddr),
    /// Every peer is backing off; the earliest becomes eligible at this instant.
    WaitUntil(Instant),
}

#[derive(Debug)]
struct PeerHealth {
    addr: SocketAddr,
    failures: u32,
    retry_at: Option<Instant>,
}

/// Round-robin over the swarm with per-peer exponential backoff.
#[derive(Debug)]
pub struct PeerRoster {
    peers: Vec<PeerHealth>,
    cursor: usize,
    backoff_base: Duration,
    max_backoff: Duration,
}

impl PeerRoster {
    pub fn new(addrs: &[SocketAddr], backoff_base: Duration, max_backoff: Duration) -> Self {
        let mut peers: Vec<PeerHealth> = Vec::with_capacity(addrs.len());
        for &addr in addrs {
            if peers.iter().all(|p| p.addr != addr) {
                peers.push(PeerHealth {
                    addr,
                    failures: 0,
                    retry_at: None,
                });
            }
        }

        Self {
            peers,
            cursor: 0,
            backoff_base,
            max_backoff,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Next peer after the cursor that is not backing off.
    pub fn next_ready(&mut self, now: Instant) -> Option<Pick> {
        let count = self.peers.len();
        let mut earliest: Option<Instant> = None;

        for step in 0..count {
            let i = (self.cursor + step) % count;
            match self.peers[i].retry_at {
                Some(at) if at > now => {
                    earliest = Some(earliest.map_or(at, |e| e.min(at)));
                }
                _ => {
                    self.cursor = (i + 1) % count;
                    return Some(Pick::Ready(self.peers[i].addr));
                }
            }
        }

        earliest.map(Pick::WaitUntil)
    }

    pub fn record_success(&mut self, addr: SocketAddr) {
        if let Some(peer) = self.find(addr) {
            peer.failures = 0;
            peer.retry_at = None;
        }
    }

    pub fn record_failure(&mut self, addr: SocketAddr, now: Instant) {
        let (base, cap) = (self.backoff_base, self.max_backoff);
        if let Some(peer) = self.find(addr) {
            peer.failures = peer.failures.saturating_add(1);
            peer.retry_at = if base.is_zero() {
                None
            } else {
                Some(now + backoff(base, cap, peer.failures))
            };
        }
    }

    pub fn failures(&self, addr: SocketAddr) -> u32 {
        self.peers
            .iter()
            .find(|p| p.addr == addr)
            .map_or(0, |p| p.failures)
    }

    fn find(&mut self, addr: SocketAddr) -> Option<&mut PeerHealth> {
        self.peers.iter_mut().find(|p| p.addr == addr)
    }
}

/// `base * 2^(failures - 1)`, capped.
fn backoff(base: Duration, cap: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    base.saturating_mul(1 << exponent).min(cap)
}
