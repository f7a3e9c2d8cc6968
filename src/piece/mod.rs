mod completed;
mod descriptor;

pub use completed::CompletedChunks;
pub use descriptor::{ChunkSpec, ContentDescriptor};

/// Standard block size (16 KB)
pub const BLOCK_SIZE: u32 = 16 * 1024;
