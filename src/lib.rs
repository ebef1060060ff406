//! # aozora-tokenize
//!
//! Convert Aozora Bunko HTML into clean, word-segmented plain text.
//!
//! Aozora Bunko publishes public-domain Japanese literature as Shift_JIS
//! HTML, annotated with ruby glosses (`《…》`, `<ruby>`), references to
//! characters missing from Shift_JIS (gaiji, `※［＃…］`) and editorial notes.
//! This crate turns such a file into UTF-8 text a corpus tool can consume:
//! the work itself, without glosses or notes, optionally split into words.
//!
//! ## Pipeline Overview
//!
//! ```text
//! HTML bytes
//!  │
//!  ├─ 1. Normalize  decode (BOM → declared → <meta charset> → Shift_JIS),
//!  │                no replacement characters, LF line endings, NFC
//!  ├─ 2. Strip      state-machine scan for tags, ruby, gaiji, notes;
//!  │                spans excised in one pass
//!  ├─ 3. Segment    analyzer boundaries → tokens joined by spaces
//!  └─ 4. Output     text + output key + deterministic statistics
//! ```
//!
//! The pipeline is a pure function of the input bytes and the
//! configuration: the same document always yields the same output, so
//! re-processing after a failure is always safe.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aozora_tokenize::{process, PipelineConfig, ScriptAnalyzer, SourceDocument};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .analyzer(Arc::new(ScriptAnalyzer::new()))
//!         .build()?;
//!     let doc = SourceDocument::new("127_15260.html", std::fs::read("127_15260.html")?);
//!     let output = process(&doc, &config).await?;
//!     println!("{}", output.text);
//!     eprintln!("{} → {}", output.source_name, output.output_name);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `aozora2txt` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! aozora-tokenize = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyzer;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod gaiji;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyzer::{Analyzer, LexiconAnalyzer, PassThroughAnalyzer, ScriptAnalyzer};
pub use config::{PipelineConfig, PipelineConfigBuilder, SourceEncoding};
pub use convert::{convert_files, convert_to_file, process, process_batch, process_sync, FileOutcome};
pub use document::{DocumentStats, OutputDocument, SourceDocument};
pub use error::{
    AnalyzerError, EncodingError, MarkupError, PipelineError, SegmentationError, Stage,
};
pub use gaiji::GaijiTable;
pub use pipeline::annotation::{AnnotationSpan, SpanKind};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{process_stream, DocumentStream, StreamItem};
