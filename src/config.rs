//! Configuration types for the Aozora text pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The analyzer and the gaiji table are held
//! behind `Arc`, so cloning a config for another document is cheap and every
//! concurrent pipeline instance reads the same loaded-once resources.

use crate::analyzer::Analyzer;
use crate::error::PipelineError;
use crate::gaiji::GaijiTable;
use crate::pipeline::normalize::NormalizeOptions;
use crate::pipeline::strip::StripOptions;
use crate::progress::ProgressCallback;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for converting Aozora documents.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use aozora_tokenize::{PipelineConfig, ScriptAnalyzer};
/// use std::sync::Arc;
///
/// let config = PipelineConfig::builder()
///     .preserve_paragraph_breaks(true)
///     .analyzer(Arc::new(ScriptAnalyzer::new()))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Encoding assumed when neither a BOM, a declared encoding nor a
    /// `<meta charset>` identifies one. Default: Shift_JIS.
    pub source_encoding: SourceEncoding,

    /// Honour a `<meta charset=…>` declaration near the top of the file.
    /// Default: true.
    pub sniff_charset: bool,

    /// Apply Unicode NFC after decoding. Default: true.
    ///
    /// NFC also folds CJK compatibility ideographs into their unified
    /// forms. Windows-31J decodes some IBM extension rows to those code
    /// points, so e.g. U+F929 comes out as 朗 U+6717 and the glyph
    /// distinction is lost. Turn this off to keep the decoded code points.
    pub unicode_nfc: bool,

    /// Turn block-level tags into a single line break. Default: false.
    ///
    /// Aozora HTML already ends every line with a newline after `<br />`,
    /// so this mainly matters for files that put paragraphs on one line.
    pub preserve_paragraph_breaks: bool,

    /// Strip only the work body (`<div class="main_text">`, else `<body>`).
    /// Default: true.
    pub work_only: bool,

    /// Decode HTML character references. Default: false.
    ///
    /// Off by default because decoding is not idempotent: `&amp;lt;`
    /// becomes `&lt;`, which a second pass would turn into `<`.
    pub decode_entities: bool,

    /// Resolve gaiji notes that embed a `U+XXXX` code point. Default: true.
    pub resolve_code_points: bool,

    /// Gaiji description → Unicode substitute. Default: empty.
    pub gaiji_table: Arc<GaijiTable>,

    /// Morphological analyzer. `None` selects pass-through segmentation.
    pub analyzer: Option<Arc<dyn Analyzer>>,

    /// Upper bound for a single analyzer call. Default: 30 s.
    pub analyzer_timeout: Duration,

    /// Trim every output line and the whole text. Default: false.
    pub trim_whitespace: bool,

    /// Documents processed at once by the batch and stream drivers. Default: 4.
    pub concurrency: usize,

    /// Replace existing output files in [`crate::convert::convert_to_file`].
    /// Default: false (existing outputs are skipped).
    pub overwrite: bool,

    /// Optional per-document progress events for the batch drivers.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_encoding: SourceEncoding::default(),
            sniff_charset: true,
            unicode_nfc: true,
            preserve_paragraph_breaks: false,
            work_only: true,
            decode_entities: false,
            resolve_code_points: true,
            gaiji_table: Arc::new(GaijiTable::default()),
            analyzer: None,
            analyzer_timeout: Duration::from_secs(30),
            trim_whitespace: false,
            concurrency: 4,
            overwrite: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("source_encoding", &self.source_encoding)
            .field("sniff_charset", &self.sniff_charset)
            .field("unicode_nfc", &self.unicode_nfc)
            .field("preserve_paragraph_breaks", &self.preserve_paragraph_breaks)
            .field("work_only", &self.work_only)
            .field("decode_entities", &self.decode_entities)
            .field("resolve_code_points", &self.resolve_code_points)
            .field("gaiji_table", &format_args!("<{} entries>", self.gaiji_table.len()))
            .field("analyzer", &self.analyzer.as_ref().map(|a| a.name()))
            .field("analyzer_timeout", &self.analyzer_timeout)
            .field("trim_whitespace", &self.trim_whitespace)
            .field("concurrency", &self.concurrency)
            .field("overwrite", &self.overwrite)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Name of the configured analyzer, `"pass-through"` when none is set.
    pub fn analyzer_name(&self) -> &str {
        self.analyzer
            .as_ref()
            .map(|a| a.name())
            .unwrap_or(crate::analyzer::PASS_THROUGH_NAME)
    }

    /// Options for the normalize stage, given the document's declared encoding.
    pub fn normalize_options(&self, declared: Option<SourceEncoding>) -> NormalizeOptions {
        NormalizeOptions {
            declared,
            fallback: self.source_encoding,
            sniff_charset: self.sniff_charset,
            nfc: self.unicode_nfc,
        }
    }

    /// Options for the strip stage.
    pub fn strip_options(&self) -> StripOptions {
        StripOptions {
            preserve_paragraph_breaks: self.preserve_paragraph_breaks,
            work_only: self.work_only,
            decode_entities: self.decode_entities,
            resolve_code_points: self.resolve_code_points,
            gaiji_table: Arc::clone(&self.gaiji_table),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn source_encoding(mut self, encoding: SourceEncoding) -> Self {
        self.config.source_encoding = encoding;
        self
    }

    pub fn sniff_charset(mut self, v: bool) -> Self {
        self.config.sniff_charset = v;
        self
    }

    pub fn unicode_nfc(mut self, v: bool) -> Self {
        self.config.unicode_nfc = v;
        self
    }

    pub fn preserve_paragraph_breaks(mut self, v: bool) -> Self {
        self.config.preserve_paragraph_breaks = v;
        self
    }

    pub fn work_only(mut self, v: bool) -> Self {
        self.config.work_only = v;
        self
    }

    pub fn decode_entities(mut self, v: bool) -> Self {
        self.config.decode_entities = v;
        self
    }

    pub fn resolve_code_points(mut self, v: bool) -> Self {
        self.config.resolve_code_points = v;
        self
    }

    pub fn gaiji_table(mut self, table: GaijiTable) -> Self {
        self.config.gaiji_table = Arc::new(table);
        self
    }

    pub fn shared_gaiji_table(mut self, table: Arc<GaijiTable>) -> Self {
        self.config.gaiji_table = table;
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.config.analyzer = Some(analyzer);
        self
    }

    pub fn analyzer_timeout(mut self, timeout: Duration) -> Self {
        self.config.analyzer_timeout = timeout;
        self
    }

    pub fn trim_whitespace(mut self, v: bool) -> Self {
        self.config.trim_whitespace = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn overwrite(mut self, v: bool) -> Self {
        self.config.overwrite = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.analyzer_timeout.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "Analyzer timeout must be greater than zero".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Source encodings the normalizer accepts.
///
/// Aozora Bunko publishes its HTML in Shift_JIS; the others cover mirrors
/// and re-encoded copies found in the wild. `ShiftJis` decodes with the
/// Windows-31J extensions (NEC and IBM rows), which Aozora files use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceEncoding {
    #[default]
    ShiftJis,
    EucJp,
    Iso2022Jp,
    Utf8,
}

impl SourceEncoding {
    /// The `encoding_rs` decoder for this encoding.
    pub fn encoding(&self) -> &'static Encoding {
        match self {
            SourceEncoding::ShiftJis => encoding_rs::SHIFT_JIS,
            SourceEncoding::EucJp => encoding_rs::EUC_JP,
            SourceEncoding::Iso2022Jp => encoding_rs::ISO_2022_JP,
            SourceEncoding::Utf8 => encoding_rs::UTF_8,
        }
    }

    /// Map a WHATWG encoding label (`"sjis"`, `"x-euc-jp"`, `"utf8"`, …).
    pub fn from_label(label: &str) -> Option<Self> {
        let encoding = Encoding::for_label(label.trim().as_bytes())?;
        [
            SourceEncoding::ShiftJis,
            SourceEncoding::EucJp,
            SourceEncoding::Iso2022Jp,
            SourceEncoding::Utf8,
        ]
        .into_iter()
        .find(|candidate| candidate.encoding() == encoding)
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encoding().name())
    }
}

impl FromStr for SourceEncoding {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "Unsupported source encoding '{s}' (expected Shift_JIS, EUC-JP, ISO-2022-JP or UTF-8)"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ScriptAnalyzer;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.source_encoding, SourceEncoding::ShiftJis);
        assert!(c.work_only);
        assert!(!c.preserve_paragraph_breaks);
        assert!(!c.decode_entities);
        assert!(c.analyzer.is_none());
        assert_eq!(c.analyzer_name(), "pass-through");
        assert_eq!(c.analyzer_timeout, Duration::from_secs(30));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = PipelineConfig::builder()
            .analyzer_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn builder_rejects_zero_concurrency() {
        assert!(PipelineConfig::builder().concurrency(0).build().is_err());
    }

    #[test]
    fn builder_sets_analyzer() {
        let c = PipelineConfig::builder()
            .analyzer(Arc::new(ScriptAnalyzer::new()))
            .build()
            .unwrap();
        assert_eq!(c.analyzer_name(), "script");
        assert!(format!("{c:?}").contains("script"));
    }

    #[test]
    fn encoding_labels() {
        assert_eq!(SourceEncoding::from_label("Shift_JIS"), Some(SourceEncoding::ShiftJis));
        assert_eq!(SourceEncoding::from_label("sjis"), Some(SourceEncoding::ShiftJis));
        assert_eq!(SourceEncoding::from_label("x-euc-jp"), Some(SourceEncoding::EucJp));
        assert_eq!(SourceEncoding::from_label("iso-2022-jp"), Some(SourceEncoding::Iso2022Jp));
        assert_eq!(SourceEncoding::from_label("UTF-8"), Some(SourceEncoding::Utf8));
        assert_eq!(SourceEncoding::from_label("latin1"), None);
        assert!("koi8-r".parse::<SourceEncoding>().is_err());
    }

    #[test]
    fn strip_options_share_gaiji_table() {
        let c = PipelineConfig::builder()
            .gaiji_table(GaijiTable::from_pairs([("木＋吉", "桔")]))
            .build()
            .unwrap();
        let opts = c.strip_options();
        assert!(Arc::ptr_eq(&opts.gaiji_table, &c.gaiji_table));
    }
}
