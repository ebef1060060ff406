//! Input resolution: turn a path on disk into a [`SourceDocument`].
//!
//! The checks happen here rather than in the pipeline so that a missing or
//! unreadable file is reported as an input problem (retryable or not) and
//! never reaches the decoder.

use crate::document::SourceDocument;
use crate::error::PipelineError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extensions treated as Aozora HTML when scanning directories.
const HTML_EXTENSIONS: &[&str] = &["html", "htm"];

/// Read a local file into a [`SourceDocument`] named by its path.
pub async fn read_source(path: impl AsRef<Path>) -> Result<SourceDocument, PipelineError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => PipelineError::FileNotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => PipelineError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => PipelineError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput {
            path: path.to_path_buf(),
        });
    }

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(SourceDocument::new(path.to_string_lossy(), bytes))
}

/// Whether a path names an HTML file by extension.
pub fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| HTML_EXTENSIONS.iter().any(|h| e.eq_ignore_ascii_case(h)))
}

/// Expand files and directories into a sorted list of input files.
///
/// Directories are walked recursively for `*.html` / `*.htm`; files given
/// explicitly are kept whatever their extension. Previous outputs
/// (`*_tokenized.txt`, `*_workonly.txt`) never match.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>, PipelineError> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk_dir(path, &mut out)?;
        } else if path.exists() {
            out.push(path.clone());
        } else {
            return Err(PipelineError::FileNotFound { path: path.clone() });
        }
    }
    out.sort();
    out.dedup();
    Ok(out)
}

fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::ReadFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let path = entry
            .map_err(|e| PipelineError::ReadFailed {
                path: dir.to_path_buf(),
                source: e,
            })?
            .path();
        if path.is_dir() {
            walk_dir(&path, out)?;
        } else if is_html(&path) {
            out.push(path);
        }
    }
    Ok(())
}
