mod files;

pub use files::FileEntry;

use crate::bencode::{decode, raw_entry, Value};
use crate::error::{FetchError, Result};
use crate::piece::ContentDescriptor;
use sha1::{Digest, Sha1};
use std::path::Path;
use tokio::fs;

/// A parsed metainfo file
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Tracker announce URL
    pub announce: String,
    /// Suggested name for the file or directory
    pub name: String,
    pub files: Vec<FileEntry>,
    pub descriptor: ContentDescriptor,
}

impl Manifest {
    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.descriptor.fingerprint())
    }
}

/// Load and parse a metainfo file
pub async fn load_manifest<P: AsRef<Path>>(path: P) -> Result<Manifest> {
    let data = fs::read(path).await?;
    parse_manifest(&data)
}

/// Parse metainfo bytes. The fingerprint is the SHA-1 of the `info`
/// dictionary exactly as encoded in `data`.
pub fn parse_manifest(data: &[u8]) -> Result<Manifest> {
    let root = decode(data)?;

    let announce = root
        .get_str("announce")
        .ok_or_else(|| invalid("missing 'announce'"))?
        .to_string();

    let info = root
        .get("info")
        .filter(|v| v.as_dict().is_some())
        .ok_or_else(|| invalid("missing 'info' dictionary"))?;
    let raw_info = raw_entry(data, b"info")?.ok_or_else(|| invalid("missing 'info' dictionary"))?;

    let mut fingerprint = [0u8; 20];
    fingerprint.copy_from_slice(&Sha1::digest(raw_info));

    let name = info
        .get_str("name")
        .ok_or_else(|| invalid("missing 'name'"))?
        .to_string();
    files::check_path(std::slice::from_ref(&name))?;

    let chunk_size = info
        .get_u64("piece length")
        .ok_or_else(|| invalid("missing 'piece length'"))?;
    let chunk_hashes = parse_hashes(info)?;

    let files = files::parse_files(info, &name)?;
    let total_length = files
        .iter()
        .try_fold(0u64, |acc, f| acc.checked_add(f.length))
        .ok_or_else(|| invalid("total length overflows"))?;

    let descriptor = ContentDescriptor::new(fingerprint, chunk_hashes, chunk_size, total_length)?;

    Ok(Manifest {
        announce,
        name,
        files,
        descriptor,
    })
}

fn parse_hashes(info: &Value) -> Result<Vec<[u8; 20]>> {
    let pieces = info
        .get("pieces")
        .and_then(Value::as_bytes)
        .ok_or_else(|| invalid("missing 'pieces'"))?;

    if pieces.len() % 20 != 0 {
        return Err(invalid(format!(
            "'pieces' is {} bytes, not a multiple of 20",
            pieces.len()
        )));
    }

    Ok(pieces
        .chunks_exact(20)
        .map(|chunk| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect())
}

fn invalid(msg: impl Into<String>) -> FetchError {
    FetchError::InvalidManifest(msg.into())
}
