use crate::bencode::Value;
use crate::error::{FetchError, Result};

/// One file of the content, in manifest order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path components below the output directory
    pub path: Vec<String>,
    pub length: u64,
}

fn invalid(msg: impl Into<String>) -> FetchError {
    FetchError::InvalidManifest(msg.into())
}

/// Read the file layout from an info dictionary.
///
/// A single-file manifest has `length`; a multi-file one has `files`, each
/// placed under a directory called `name`.
pub(super) fn parse_files(info: &Value, name: &str) -> Result<Vec<FileEntry>> {
    if let Some(length) = info.get("length") {
        let length = length
            .as_int()
            .and_then(|i| u64::try_from(i).ok())
            .ok_or_else(|| invalid("bad 'length'"))?;
        return Ok(vec![FileEntry {
            path: vec![name.to_string()],
            length,
        }]);
    }

    let list = info
        .get("files")
        .and_then(Value::as_list)
        .ok_or_else(|| invalid("missing 'length' or 'files'"))?;

    list.iter()
        .map(|entry| {
            let length = entry
                .get_u64("length")
                .ok_or_else(|| invalid("file entry without 'length'"))?;
            let components = entry
                .get("path")
                .and_then(Value::as_list)
                .ok_or_else(|| invalid("file entry without 'path'"))?;

            let mut path = vec![name.to_string()];
            for component in components {
                let component = component
                    .as_str()
                    .ok_or_else(|| invalid("path component is not UTF-8"))?;
                path.push(component.to_string());
            }
            check_path(&path)?;
            Ok(FileEntry { path, length })
        })
        .collect()
}

/// Components must stay inside the output directory.
pub(super) fn check_path(path: &[String]) -> Result<()> {
    for component in path {
        if component.is_empty()
            || component == "."
            || component == ".."
            || component.contains(['/', '\\'])
        {
            return Err(invalid(format!("unsafe path component {:?}", component)));
        }
    }
    Ok(())
}
