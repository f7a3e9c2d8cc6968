//! Chunked content download from a swarm of peers speaking the BitTorrent
//! peer wire protocol.

pub mod assembler;
pub mod bencode;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod manifest;
pub mod peer;
pub mod piece;
pub mod scheduler;
pub mod storage;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use assembler::assemble;
pub use client::SwarmClient;
pub use config::{generate_peer_id, FetchConfig};
pub use error::{FetchError, Result};
pub use piece::{ChunkSpec, ContentDescriptor};
pub use scheduler::{ChunkScheduler, Progress};
