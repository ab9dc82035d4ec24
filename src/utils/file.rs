//! File utilities for document scanning and change detection.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Calculate SHA-256 hash of a byte slice.
pub fn content_hash(content: &[u8]) -> String {
    let hash = Sha256::digest(content);
    hex::encode(hash)
}

/// Calculate SHA-256 hash of a file, streaming in 8 KiB blocks.
pub fn file_hash(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Read file content as UTF-8 with a size cap.
pub fn read_text_content(path: &Path, max_size: u64) -> std::io::Result<String> {
    let metadata = fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "file exceeds maximum size: {} > {}",
                metadata.len(),
                max_size
            ),
        ));
    }

    fs::read_to_string(path)
}

/// Check if a path looks like a plain-text document.
pub fn is_text_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            matches!(
                ext.to_string_lossy().to_lowercase().as_str(),
                "txt" | "md" | "markdown" | "rst" | "org" | "csv" | "log"
            )
        })
        .unwrap_or(false)
}

/// Check if a path looks like an image document.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            matches!(
                ext.to_string_lossy().to_lowercase().as_str(),
                "png" | "jpg" | "jpeg" | "webp" | "bmp" | "gif" | "tiff"
            )
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_content_hash() {
        let hash = content_hash(b"hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, content_hash(b"hello world"));
        assert_ne!(hash, content_hash(b"hello worlds"));
    }

    #[test]
    fn test_file_hash_matches_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"some receipt text").unwrap();

        assert_eq!(file_hash(&path).unwrap(), content_hash(b"some receipt text"));
    }

    #[test]
    fn test_read_text_content_size_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "x".repeat(100)).unwrap();

        assert!(read_text_content(&path, 10).is_err());
        assert_eq!(read_text_content(&path, 1000).unwrap().len(), 100);
    }

    #[test]
    fn test_file_kind_detection() {
        assert!(is_text_file(&PathBuf::from("notes.txt")));
        assert!(is_text_file(&PathBuf::from("README.md")));
        assert!(!is_text_file(&PathBuf::from("IMG_4025.jpeg")));

        assert!(is_image_file(&PathBuf::from("IMG_4025.jpeg")));
        assert!(is_image_file(&PathBuf::from("scan.PNG")));
        assert!(!is_image_file(&PathBuf::from("notes.txt")));
    }
}
