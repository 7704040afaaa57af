//! Per-run output layout.
//!
//! A [`RunContext`] is created for one run and passed explicitly to every
//! stage that reads or writes files. Two runs with different output
//! directories never share state.

use crate::error::Pdf2DeckError;
use std::path::{Path, PathBuf};

pub const IMAGES_DIR: &str = "images";
pub const ANALYSIS_FILE: &str = "analysis_results.json";
pub const PRESENTATION_FILE: &str = "presentation.json";

#[derive(Debug, Clone)]
pub struct RunContext {
    pub output_dir: PathBuf,
    pub images_dir: PathBuf,
    pub analysis_path: PathBuf,
    pub presentation_path: PathBuf,
}

impl RunContext {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        let output_dir = output_dir.as_ref().to_path_buf();
        Self {
            images_dir: output_dir.join(IMAGES_DIR),
            analysis_path: output_dir.join(ANALYSIS_FILE),
            presentation_path: output_dir.join(PRESENTATION_FILE),
            output_dir,
        }
    }

    /// Create the output and image directories.
    pub async fn prepare(&self) -> Result<(), Pdf2DeckError> {
        tokio::fs::create_dir_all(&self.images_dir)
            .await
            .map_err(|e| Pdf2DeckError::OutputWriteFailed {
                path: self.images_dir.clone(),
                source: e,
            })
    }

    /// Path of the `k`-th crop (1-based) of page `page_num` (1-based).
    pub fn image_path(&self, page_num: usize, k: usize) -> PathBuf {
        self.images_dir.join(format!("page_{page_num}_img_{k}.jpg"))
    }
}

/// Write `bytes` to `path` through a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Pdf2DeckError> {
    let fail = |e| Pdf2DeckError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)
}
