use crate::error::{FetchError, Result};
use bytes::Bytes;

/// Concatenate verified chunks in index order.
///
/// Every slot must be filled and the result must come to exactly
/// `total_length` bytes.
pub fn assemble(slots: Vec<Option<Bytes>>, total_length: u64) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(total_length as usize);

    for (index, slot) in slots.into_iter().enumerate() {
        let Some(chunk) = slot else {
            return Err(FetchError::Assembly(format!("chunk {} missing", index)));
        };
        output.extend_from_slice(&chunk);
    }

    if output.len() as u64 != total_length {
        return Err(FetchError::Assembly(format!(
            "assembled {} bytes, expected {}",
            output.len(),
            total_length
        )));
    }

    Ok(output)
}
