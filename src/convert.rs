//! Eager conversion entry points.
//!
//! [`process`] is the pipeline itself: one [`SourceDocument`] in, one
//! [`OutputDocument`] out, stages run strictly in order and the first
//! failure wins. Everything else here drives it: a blocking wrapper, a file
//! driver that writes outputs atomically, and batch drivers that run many
//! documents with bounded concurrency. Use [`crate::stream::process_stream`]
//! to receive batch results as they complete.

use crate::config::PipelineConfig;
use crate::document::{output_key, DocumentStats, OutputDocument, SourceDocument};
use crate::error::{PipelineError, Stage};
use crate::pipeline::{input, normalize, postprocess, segment, strip};
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::hash_map::{Entry, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert one document.
///
/// # Errors
/// Returns the first stage failure, tagged with its [`Stage`]:
/// - [`PipelineError::Encoding`]: bytes invalid in the resolved encoding
/// - [`PipelineError::Markup`]: an annotation or tag is never closed
/// - [`PipelineError::Segmentation`]: the analyzer failed or timed out
///
/// No partial output is ever returned.
pub async fn process(
    doc: &SourceDocument,
    config: &PipelineConfig,
) -> Result<OutputDocument, PipelineError> {
    let total_start = Instant::now();
    info!("Processing {} ({} bytes)", doc.name, doc.bytes.len());

    // ── Step 1: Normalize ────────────────────────────────────────────────
    let step = Instant::now();
    let normalized = normalize::normalize(&doc.bytes, &config.normalize_options(doc.encoding))?;
    debug!(
        "normalize: {} chars from {} in {}ms",
        normalized.char_count(),
        normalized.encoding(),
        step.elapsed().as_millis()
    );

    // ── Step 2: Strip ────────────────────────────────────────────────────
    let step = Instant::now();
    let stripped = strip::strip(&normalized, &config.strip_options())?;
    let strip_stats = stripped.stats();
    debug!(
        "strip: {} spans removed in {}ms",
        strip_stats.spans_removed,
        step.elapsed().as_millis()
    );
    if strip_stats.gaiji_dropped > 0 {
        warn!(
            "{}: dropped {} gaiji reference(s) with no known substitute",
            doc.name, strip_stats.gaiji_dropped
        );
    }

    // ── Step 3: Segment ──────────────────────────────────────────────────
    let step = Instant::now();
    let tokens = segment::segment(
        stripped.as_str(),
        config.analyzer.as_ref(),
        config.analyzer_timeout,
    )
    .await?;
    let mut text = segment::join_tokens(&tokens);
    debug!(
        "segment: {} tokens via {} in {}ms",
        tokens.len(),
        config.analyzer_name(),
        step.elapsed().as_millis()
    );

    // ── Step 4: Post-process ─────────────────────────────────────────────
    if config.trim_whitespace {
        text = postprocess::trim_whitespace(&text);
    }

    let stats = DocumentStats {
        source_bytes: doc.bytes.len(),
        encoding: normalized.encoding().to_string(),
        normalized_chars: normalized.char_count(),
        stripped_chars: stripped.char_count(),
        spans_removed: strip_stats.spans_removed,
        gaiji_resolved: strip_stats.gaiji_resolved,
        gaiji_dropped: strip_stats.gaiji_dropped,
        token_count: tokens.len(),
        output_bytes: text.len(),
        analyzer: config.analyzer_name().to_string(),
    };

    info!(
        "Processed {}: {} tokens, {} bytes out, {}ms total",
        doc.name,
        stats.token_count,
        stats.output_bytes,
        total_start.elapsed().as_millis()
    );

    Ok(OutputDocument {
        source_name: doc.name.clone(),
        output_name: output_key(&doc.name, config.analyzer.is_some()),
        text,
        stats,
    })
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(
    doc: &SourceDocument,
    config: &PipelineConfig,
) -> Result<OutputDocument, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal {
            stage: Stage::Input,
            detail: format!("Failed to create tokio runtime: {e}"),
        })?
        .block_on(process(doc, config))
}

// ── File driver ──────────────────────────────────────────────────────────

/// Result of [`convert_to_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// The output was written.
    Written { path: PathBuf, stats: DocumentStats },
    /// An output already existed and `overwrite` is off.
    Skipped { path: PathBuf },
}

impl FileOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Written { path, .. } | FileOutcome::Skipped { path } => path,
        }
    }
}

/// Where [`convert_to_file`] writes the output for `input`.
///
/// Next to the input unless `output_dir` is given.
pub fn output_path_for(input: &Path, output_dir: Option<&Path>, tokenized: bool) -> PathBuf {
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let key = output_key(&file_name, tokenized);
    match output_dir {
        Some(dir) => dir.join(key),
        None => input.with_file_name(key),
    }
}

/// Convert a file and write the output text next to it (or into
/// `output_dir`).
///
/// Existing outputs are left alone unless `config.overwrite` is set. The
/// write is atomic (temp file + rename), and a document that fails any
/// stage writes nothing. Neither does a document whose work body comes out
/// empty or whitespace only: that is [`PipelineError::EmptyWork`].
pub async fn convert_to_file(
    input_path: impl AsRef<Path>,
    output_dir: Option<&Path>,
    config: &PipelineConfig,
) -> Result<FileOutcome, PipelineError> {
    let input_path = input_path.as_ref();
    let path = output_path_for(input_path, output_dir, config.analyzer.is_some());

    if !config.overwrite && tokio::fs::try_exists(&path).await.unwrap_or(false) {
        warn!("Found existing output {}, skipping", path.display());
        return Ok(FileOutcome::Skipped { path });
    }

    let doc = input::read_source(input_path).await?;
    let output = process(&doc, config).await?;
    if output.text.trim().is_empty() {
        return Err(PipelineError::EmptyWork {
            path: input_path.to_path_buf(),
        });
    }
    write_atomic(&path, &output.text).await?;

    info!("Wrote {}", path.display());
    Ok(FileOutcome::Written {
        path,
        stats: output.stats,
    })
}

/// Write to a temp file beside `path`, then rename over it.
async fn write_atomic(path: &Path, text: &str) -> Result<(), PipelineError> {
    let write_failed = |e| PipelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, text).await.map_err(write_failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }
    Ok(())
}

// ── Batch drivers ────────────────────────────────────────────────────────

/// Convert many in-memory documents, at most `config.concurrency` at once.
///
/// Results come back in input order. One document's failure never affects
/// another.
pub async fn process_batch(
    docs: Vec<SourceDocument>,
    config: &PipelineConfig,
) -> Vec<Result<OutputDocument, PipelineError>> {
    let total = docs.len();
    let callback = config.progress_callback.as_ref();
    if let Some(cb) = callback {
        cb.on_batch_start(total);
    }

    let mut results: Vec<(usize, Result<OutputDocument, PipelineError>)> =
        stream::iter(docs.into_iter().enumerate().map(|(index, doc)| async move {
            let result = tracked(
                callback,
                index,
                total,
                &doc.name,
                process(&doc, config),
                |out: &OutputDocument| out.text.len(),
            )
            .await;
            (index, result)
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);
    finish_batch(callback, total, results.into_iter().map(|(_, r)| r).collect())
}

/// Run [`convert_to_file`] over many paths, at most `config.concurrency` at
/// once. Results come back in input order, paired with their input path.
pub async fn convert_files(
    paths: &[PathBuf],
    output_dir: Option<&Path>,
    config: &PipelineConfig,
) -> Vec<(PathBuf, Result<FileOutcome, PipelineError>)> {
    let total = paths.len();
    let callback = config.progress_callback.as_ref();
    if let Some(cb) = callback {
        cb.on_batch_start(total);
    }
    let collisions = claim_outputs(paths, output_dir, config.analyzer.is_some());

    let mut results: Vec<(usize, Result<FileOutcome, PipelineError>)> =
        stream::iter(paths.iter().zip(collisions).enumerate().map(
            |(index, (path, collision))| async move {
                let name = path.to_string_lossy();
                let work = async {
                    if let Some((output, other)) = collision {
                        return Err(PipelineError::OutputCollision {
                            input: path.clone(),
                            output,
                            other,
                        });
                    }
                    convert_to_file(path, output_dir, config).await
                };
                let result = tracked(
                    callback,
                    index,
                    total,
                    &name,
                    work,
                    |outcome: &FileOutcome| match outcome {
                        FileOutcome::Written { stats, .. } => stats.output_bytes,
                        FileOutcome::Skipped { .. } => 0,
                    },
                )
                .await;
                (index, result)
            },
        ))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);
    let results = finish_batch(callback, total, results.into_iter().map(|(_, r)| r).collect());
    paths.iter().cloned().zip(results).collect()
}

/// Give each output path to the first input that maps to it.
///
/// Later inputs with the same output (`a.html` beside `a.htm`, or equal
/// file names flattened into one `output_dir`) get the output path and the
/// input that claimed it.
fn claim_outputs(
    paths: &[PathBuf],
    output_dir: Option<&Path>,
    tokenized: bool,
) -> Vec<Option<(PathBuf, PathBuf)>> {
    let mut claimed: HashMap<PathBuf, &PathBuf> = HashMap::new();
    paths
        .iter()
        .map(|path| match claimed.entry(output_path_for(path, output_dir, tokenized)) {
            Entry::Occupied(e) => {
                warn!(
                    "{} would overwrite {} from {}, skipping",
                    path.display(),
                    e.key().display(),
                    e.get().display()
                );
                Some((e.key().clone(), (*e.get()).clone()))
            }
            Entry::Vacant(e) => {
                e.insert(path);
                None
            }
        })
        .collect()
}

/// Await one document's work, reporting it to the progress callback.
pub(crate) async fn tracked<T, F>(
    callback: Option<&ProgressCallback>,
    index: usize,
    total: usize,
    name: &str,
    work: F,
    output_len: fn(&T) -> usize,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    if let Some(cb) = callback {
        cb.on_document_start(index, total, name);
    }
    let result = work.await;
    match &result {
        Ok(value) => {
            if let Some(cb) = callback {
                cb.on_document_complete(index, total, output_len(value));
            }
        }
        Err(e) => {
            warn!("{} failed at {} stage: {}", name, e.stage(), e);
            if let Some(cb) = callback {
                cb.on_document_error(index, total, &e.to_string());
            }
        }
    }
    result
}

fn finish_batch<T>(
    callback: Option<&ProgressCallback>,
    total: usize,
    results: Vec<Result<T, PipelineError>>,
) -> Vec<Result<T, PipelineError>> {
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    info!("Batch complete: {}/{} documents succeeded", succeeded, total);
    if let Some(cb) = callback {
        cb.on_batch_complete(total, succeeded);
    }
    results
}
