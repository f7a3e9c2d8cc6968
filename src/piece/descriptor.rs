use super::BLOCK_SIZE;
use crate::error::{FetchError, Result};
use crate::peer::BlockInfo;
use sha1::{Digest, Sha1};

/// What is being downloaded: the content fingerprint plus one hash per chunk.
///
/// Every chunk is `chunk_size` bytes except the last, which holds whatever is
/// left of `total_length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDescriptor {
    fingerprint: [u8; 20],
    chunk_hashes: Vec<[u8; 20]>,
    chunk_size: u64,
    total_length: u64,
}

impl ContentDescriptor {
    pub fn new(
        fingerprint: [u8; 20],
        chunk_hashes: Vec<[u8; 20]>,
        chunk_size: u64,
        total_length: u64,
    ) -> Result<Self> {
        if chunk_size == 0 || chunk_size > u32::MAX as u64 {
            return Err(FetchError::InvalidManifest(format!(
                "chunk size {} out of range",
                chunk_size
            )));
        }

        let expected = total_length.div_ceil(chunk_size);
        if expected != chunk_hashes.len() as u64 {
            return Err(FetchError::InvalidManifest(format!(
                "{} bytes in {}-byte chunks needs {} hashes, got {}",
                total_length,
                chunk_size,
                expected,
                chunk_hashes.len()
            )));
        }

        Ok(Self {
            fingerprint,
            chunk_hashes,
            chunk_size,
            total_length,
        })
    }

    pub fn fingerprint(&self) -> [u8; 20] {
        self.fingerprint
    }

    pub fn num_chunks(&self) -> usize {
        self.chunk_hashes.len()
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Byte length of chunk `index`; only the final chunk may be short.
    pub fn chunk_len(&self, index: usize) -> Option<u32> {
        let count = self.num_chunks();
        if index >= count {
            return None;
        }
        let len = if index == count - 1 {
            self.total_length - (count as u64 - 1) * self.chunk_size
        } else {
            self.chunk_size
        };
        Some(len as u32)
    }

    pub fn chunk(&self, index: usize) -> Option<ChunkSpec> {
        Some(ChunkSpec {
            index,
            length: self.chunk_len(index)?,
            hash: *self.chunk_hashes.get(index)?,
        })
    }
}

/// Everything a session needs to fetch and check one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    pub index: usize,
    pub length: u32,
    pub hash: [u8; 20],
}

impl ChunkSpec {
    /// Requests covering the chunk in order: full blocks, then one short
    /// block for any remainder.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        (0..self.length).step_by(BLOCK_SIZE as usize).map(move |offset| {
            BlockInfo::new(
                self.index as u32,
                offset,
                BLOCK_SIZE.min(self.length - offset),
            )
        })
    }

    pub fn block_count(&self) -> usize {
        self.length.div_ceil(BLOCK_SIZE) as usize
    }

    /// Compare the SHA-1 of the assembled chunk against the recorded hash.
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let digest = Sha1::digest(data);
        if digest.as_slice() != self.hash {
            return Err(FetchError::IntegrityFailure(self.index));
        }
        Ok(())
    }
}
