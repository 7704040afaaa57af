//! Input resolution: a local path or an HTTP(S) URL becomes a local PDF path.
//!
//! pdfium opens files, not byte buffers, so URLs are downloaded into a
//! `TempDir` owned by the returned [`ResolvedInput`]; the file disappears
//! when it is dropped. Both branches check the `%PDF` magic bytes.

use crate::error::Pdf2DeckError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A local PDF, possibly backed by a temp download.
pub enum ResolvedInput {
    Local(PathBuf),
    /// The `TempDir` keeps the download alive until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2DeckError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

fn check_magic(head: &[u8], path: &Path) -> Result<(), Pdf2DeckError> {
    if head.len() >= 4 && &head[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&head[..4]);
        return Err(Pdf2DeckError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn resolve_local(path: &Path) -> Result<ResolvedInput, Pdf2DeckError> {
    if !path.exists() {
        return Err(Pdf2DeckError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Pdf2DeckError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Pdf2DeckError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let mut head = [0u8; 4];
    if file.read_exact(&mut head).is_ok() {
        check_magic(&head, path)?;
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path.to_path_buf()))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2DeckError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| Pdf2DeckError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2DeckError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let temp_dir = TempDir::new().map_err(|e| Pdf2DeckError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(filename_from_url(url));
    check_magic(&bytes, &file_path)?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| Pdf2DeckError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(filename_from_url("https://x.test/a/brochure.pdf"), "brochure.pdf");
        assert_eq!(filename_from_url("https://x.test/download/"), "downloaded.pdf");
        assert_eq!(filename_from_url("https://x.test/get?id=3"), "downloaded.pdf");
    }

    #[test]
    fn missing_file() {
        let err = resolve_local(Path::new("/definitely/not/here.pdf")).err().unwrap();
        assert!(matches!(err, Pdf2DeckError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"PK\x03\x04rest").unwrap();
        let err = resolve_local(f.path()).err().unwrap();
        match err {
            Pdf2DeckError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pdf_header_is_accepted() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        let resolved = resolve_local(f.path()).unwrap();
        assert_eq!(resolved.path(), f.path());
    }
}
