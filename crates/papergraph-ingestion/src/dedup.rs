//! Content-addressed upload deduplication.
//!
//! A paper's id is the SHA-256 of its raw bytes, so re-uploading the same
//! PDF under another name lands on the same file and the same store record.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// On-disk name for an upload with the given id.
pub fn stored_filename(id: &str) -> String {
    format!("{id}.pdf")
}

pub fn stored_path(upload_dir: &Path, id: &str) -> PathBuf {
    upload_dir.join(stored_filename(id))
}

/// Upload filter: only names ending in `.pdf` (case-insensitive) are accepted.
pub fn is_pdf_filename(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}

/// Paper id from a user-supplied id, tolerating a trailing `.pdf`.
pub fn normalize_id(id: &str) -> &str {
    id.strip_suffix(".pdf").unwrap_or(id)
}

/// Write `bytes` under its content hash unless that file already exists.
/// Returns the id and whether a new file was written.
pub async fn save_upload(upload_dir: &Path, bytes: &[u8]) -> std::io::Result<(String, bool)> {
    let id = content_hash(bytes);
    let path = stored_path(upload_dir, &id);
    if tokio::fs::try_exists(&path).await? {
        tracing::debug!(paper_id = %id, "Upload already on disk");
        return Ok((id, false));
    }
    tokio::fs::create_dir_all(upload_dir).await?;
    tokio::fs::write(&path, bytes).await?;
    tracing::info!(paper_id = %id, bytes = bytes.len(), "Saved upload");
    Ok((id, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hash_is_lowercase_hex_sha256() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_pdf_filter() {
        assert!(is_pdf_filename("paper.pdf"));
        assert!(is_pdf_filename("PAPER.PDF"));
        assert!(!is_pdf_filename("notes.txt"));
        assert!(!is_pdf_filename("pdf"));
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("abc.pdf"), "abc");
        assert_eq!(normalize_id("abc"), "abc");
    }

    #[tokio::test]
    async fn test_same_bytes_saved_once() {
        let dir = tempfile::tempdir().unwrap();
        let (id1, new1) = save_upload(dir.path(), b"%PDF-1.4 same").await.unwrap();
        let (id2, new2) = save_upload(dir.path(), b"%PDF-1.4 same").await.unwrap();
        assert_eq!(id1, id2);
        assert!(new1);
        assert!(!new2);
        assert!(stored_path(dir.path(), &id1).exists());
    }
}
