use crate::error::{FetchError, Result};
use crate::manifest::FileEntry;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Split assembled content across the manifest's files under `output_dir`.
///
/// Files are laid end to end in manifest order; parent directories are
/// created as needed. Returns the paths written.
pub async fn write_files<P: AsRef<Path>>(
    output_dir: P,
    files: &[FileEntry],
    content: &[u8],
) -> Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();

    let expected: u64 = files.iter().map(|f| f.length).sum();
    if expected != content.len() as u64 {
        return Err(FetchError::Storage(format!(
            "layout covers {} bytes but content is {}",
            expected,
            content.len()
        )));
    }

    fs::create_dir_all(output_dir).await?;

    let mut written = Vec::with_capacity(files.len());
    let mut offset = 0usize;
    for file in files {
        let path: PathBuf = file.path.iter().fold(output_dir.to_path_buf(), |p, c| p.join(c));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let end = offset + file.length as usize;
        fs::write(&path, &content[offset..end]).await?;
        debug!("Wrote {} bytes to {}", file.length, path.display());

        offset = end;
        written.push(path);
    }

    info!(
        "Wrote {} files, {} bytes total, to {}",
        written.len(),
        content.len(),
        output_dir.display()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("swarmfetch-{}-{}", tag, std::process::id()))
    }

    #[tokio::test]
    async fn test_multi_file_split() {
        let dir = scratch_dir("split");
        let files = vec![
            FileEntry {
                path: vec!["pack".into(), "a.txt".into()],
                length: 3,
            },
            FileEntry {
                path: vec!["pack".into(), "nested".into(), "b.txt".into()],
                length: 0,
            },
            FileEntry {
                path: vec!["pack".into(), "c.txt".into()],
                length: 4,
            },
        ];

        let written = write_files(&dir, &files, b"abcdefg").await.unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(fs::read(dir.join("pack/a.txt")).await.unwrap(), b"abc");
        assert!(fs::read(dir.join("pack/nested/b.txt")).await.unwrap().is_empty());
        assert_eq!(fs::read(dir.join("pack/c.txt")).await.unwrap(), b"defg");

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_length_mismatch() {
        let files = vec![FileEntry {
            path: vec!["x".into()],
            length: 5,
        }];
        let result = write_files(scratch_dir("mismatch"), &files, b"abc").await;
        assert!(matches!(result, Err(FetchError::Storage(_))));
    }
}
