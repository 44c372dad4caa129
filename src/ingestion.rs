//! Loading source files into [`Document`] records.
//!
//! Plain-text formats (`.txt`, `.md`) are read directly; anything else
//! is rejected with [`Error::UnsupportedFormat`]. Batch loading skips
//! and logs unreadable files so one bad file does not abort ingestion.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    document::{Document, keys},
    error::{Error, Result},
};

/// File extensions the loader accepts.
const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];

/// Reads files and directories into metadata-tagged records.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a single file into a record.
    ///
    /// Attaches `source`, `file_name`, and `file_type` metadata. Missing
    /// files fail with [`Error::NotFound`]; unrecognized extensions with
    /// [`Error::UnsupportedFormat`].
    pub fn load_file(&self, path: &Path) -> Result<Document> {
        if !path.exists() {
            return Err(Error::NotFound {
                kind: "source file",
                name: path.display().to_string(),
            });
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(Error::UnsupportedFormat(format!(
                ".{ext} ({})",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut doc = Document::new(content);
        doc.set_meta(keys::SOURCE, path.display().to_string());
        doc.set_meta(keys::FILE_NAME, file_name);
        doc.set_meta(keys::FILE_TYPE, format!(".{ext}"));
        Ok(doc)
    }

    /// Load a batch of files in parallel, skipping and logging failures.
    pub fn load_files(&self, paths: &[PathBuf]) -> Vec<Document> {
        let docs: Vec<Document> = paths
            .par_iter()
            .filter_map(|path| match self.load_file(path) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping file");
                    None
                }
            })
            .collect();

        info!(requested = paths.len(), loaded = docs.len(), "loaded files");
        docs
    }

    /// Recursively discover supported files under a directory and load
    /// them as a batch.
    ///
    /// Hidden files and directories (names starting with `.`) are
    /// skipped; discovery order is stable (sorted by path).
    pub fn load_dir(&self, root: &Path) -> Result<Vec<Document>> {
        if !root.is_dir() {
            return Err(Error::NotFound {
                kind: "directory",
                name: root.display().to_string(),
            });
        }

        let mut files = Vec::new();
        discover_files(root, &mut files)?;
        files.sort();
        Ok(self.load_files(&files))
    }
}

fn discover_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        if entry.file_type()?.is_dir() {
            discover_files(&path, out)?;
        } else {
            let supported = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| {
                    SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str())
                });
            if supported {
                out.push(path);
            }
        }
    }
    Ok(())
}
