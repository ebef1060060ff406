//! Error types for the aozora-tokenize library.
//!
//! Each pipeline stage has its own error type so it can be used and tested
//! on its own:
//!
//! * [`EncodingError`]: the source bytes are not valid in the resolved
//!   encoding (normalize stage).
//! * [`MarkupError`]: an annotation or tag span is opened but never closed
//!   (strip stage).
//! * [`SegmentationError`]: the analyzer failed, timed out, or returned
//!   boundaries that do not fit the text (segment stage).
//!
//! [`PipelineError`] wraps all of them and adds the failures that belong to
//! the drivers around the pipeline (reading inputs, writing outputs, bad
//! configuration). Every variant reports the [`Stage`] it came from, which is
//! what an invoking collaborator needs to decide between retrying and
//! dead-lettering a document.

use crate::pipeline::annotation::SpanKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The pipeline step an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading the source document.
    Input,
    /// Decoding and canonicalising the source bytes.
    Normalize,
    /// Removing markup and annotations.
    Strip,
    /// Word segmentation.
    Segment,
    /// Writing the output artifact.
    Output,
    /// Building the configuration.
    Config,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Normalize => "normalize",
            Stage::Strip => "strip",
            Stage::Segment => "segment",
            Stage::Output => "output",
            Stage::Config => "config",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A byte sequence that is not valid in the source encoding.
///
/// `offset` is the position of the first malformed byte in the raw input,
/// counting any byte-order mark.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode byte 0x{byte:02X} at offset {offset} as {encoding}")]
pub struct EncodingError {
    pub offset: usize,
    pub byte: u8,
    pub encoding: String,
}

/// An annotation or tag span that is opened but never closed.
///
/// `offset` counts characters (code points) from the start of the
/// normalized text; `line` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unterminated {kind} span at character {offset} (line {line})")]
pub struct MarkupError {
    pub kind: SpanKind,
    pub offset: usize,
    pub line: usize,
}

/// Failure reported by an [`crate::analyzer::Analyzer`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyzerError {
    /// The backing model or dictionary cannot be used.
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),

    /// The analyzer could not process this particular text.
    #[error("analysis failed: {0}")]
    Failed(String),
}

/// Word segmentation failed for the current document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentationError {
    /// The analyzer returned an error or its worker panicked.
    #[error("analyzer '{analyzer}' failed: {detail}")]
    AnalyzerFailed { analyzer: String, detail: String },

    /// The analyzer did not answer within the configured timeout.
    #[error("analyzer '{analyzer}' timed out after {timeout_ms}ms")]
    Timeout { analyzer: String, timeout_ms: u64 },

    /// The boundaries do not partition the text.
    #[error("analyzer '{analyzer}' returned invalid boundaries: {detail}")]
    InvalidBoundaries { analyzer: String, detail: String },
}

/// All fatal errors returned by the pipeline and its drivers.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Stage errors ──────────────────────────────────────────────────────
    #[error("normalize stage failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("strip stage failed: {0}")]
    Markup(#[from] MarkupError),

    #[error("segment stage failed: {0}")]
    Segmentation(#[from] SegmentationError),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but holds no bytes.
    #[error("Source file is empty: '{path}'")]
    EmptyInput { path: PathBuf },

    /// Any other read failure.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output text file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The work body is empty or whitespace only, so no output was written.
    #[error("No work text found in '{path}'\nThe file has no main_text body or it is empty; nothing was written.")]
    EmptyWork { path: PathBuf },

    /// Two inputs of one batch map to the same output file.
    #[error(
        "Output '{output}' for '{input}' is already produced by '{other}'\n\
         Rename one of the inputs or convert them separately."
    )]
    OutputCollision {
        input: PathBuf,
        output: PathBuf,
        other: PathBuf,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A gaiji mapping file could not be read or parsed.
    #[error("Invalid gaiji table '{path}': {detail}")]
    InvalidGaijiTable { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error during {stage}: {detail}")]
    Internal { stage: Stage, detail: String },
}

impl PipelineError {
    /// The stage this failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Encoding(_) => Stage::Normalize,
            PipelineError::Markup(_) => Stage::Strip,
            PipelineError::Segmentation(_) => Stage::Segment,
            PipelineError::FileNotFound { .. }
            | PipelineError::PermissionDenied { .. }
            | PipelineError::EmptyInput { .. }
            | PipelineError::ReadFailed { .. } => Stage::Input,
            PipelineError::OutputWriteFailed { .. }
            | PipelineError::EmptyWork { .. }
            | PipelineError::OutputCollision { .. } => Stage::Output,
            PipelineError::InvalidConfig(_) | PipelineError::InvalidGaijiTable { .. } => {
                Stage::Config
            }
            PipelineError::Internal { stage, .. } => *stage,
        }
    }

    /// Whether re-running the same document could succeed.
    ///
    /// Decoding and markup failures are properties of the bytes and will
    /// fail identically every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Segmentation(SegmentationError::Timeout { .. })
                | PipelineError::Segmentation(SegmentationError::AnalyzerFailed { .. })
                | PipelineError::ReadFailed { .. }
                | PipelineError::OutputWriteFailed { .. }
        )
    }
}
