//! Documents entering and leaving the pipeline.

use crate::config::SourceEncoding;
use serde::{Deserialize, Serialize};

/// Suffix of the output key when an analyzer segmented the text.
pub const TOKENIZED_SUFFIX: &str = "_tokenized.txt";
/// Suffix of the output key for pass-through (work text only) output.
pub const WORK_ONLY_SUFFIX: &str = "_workonly.txt";

/// Raw bytes of one archival document plus its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Logical filename or storage key, e.g. `000879/files/127_15260.html`.
    pub name: String,
    pub bytes: Vec<u8>,
    /// Encoding declared by the collaborator that supplied the bytes.
    pub encoding: Option<SourceEncoding>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            encoding: None,
        }
    }

    pub fn with_encoding(mut self, encoding: SourceEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }
}

/// Deterministic counters for one processed document.
///
/// Contains no timings, so two runs over the same input compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub source_bytes: usize,
    /// Encoding the bytes were decoded from.
    pub encoding: String,
    pub normalized_chars: usize,
    pub stripped_chars: usize,
    pub spans_removed: usize,
    pub gaiji_resolved: usize,
    /// Gaiji references with no known substitute, removed from the text.
    pub gaiji_dropped: usize,
    pub token_count: usize,
    /// Byte length of the final UTF-8 text.
    pub output_bytes: usize,
    pub analyzer: String,
}

/// Final segmented text of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDocument {
    pub source_name: String,
    /// Key the text is stored under, derived with [`output_key`].
    pub output_name: String,
    pub text: String,
    pub stats: DocumentStats,
}

/// Derive the output key for a source key.
///
/// A trailing `.html`/`.htm` (any case) is replaced by
/// [`TOKENIZED_SUFFIX`], or [`WORK_ONLY_SUFFIX`] when `tokenized` is false.
/// Directory prefixes are kept.
///
/// ```rust
/// use aozora_tokenize::document::output_key;
///
/// assert_eq!(output_key("files/127_15260.html", true), "files/127_15260_tokenized.txt");
/// assert_eq!(output_key("rashomon.HTM", false), "rashomon_workonly.txt");
/// ```
pub fn output_key(source_name: &str, tokenized: bool) -> String {
    let lower = source_name.to_ascii_lowercase();
    let stem = [".html", ".htm"]
        .iter()
        .find(|ext| lower.ends_with(**ext))
        .map_or(source_name, |ext| &source_name[..source_name.len() - ext.len()]);
    let suffix = if tokenized {
        TOKENIZED_SUFFIX
    } else {
        WORK_ONLY_SUFFIX
    };
    format!("{stem}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_key_strips_html_extension() {
        assert_eq!(output_key("127_15260.html", true), "127_15260_tokenized.txt");
        assert_eq!(output_key("a/b/c.htm", true), "a/b/c_tokenized.txt");
        assert_eq!(output_key("RASHOMON.HTML", false), "RASHOMON_workonly.txt");
    }

    #[test]
    fn output_key_keeps_other_extensions() {
        assert_eq!(output_key("notes.txt", true), "notes.txt_tokenized.txt");
        assert_eq!(output_key("html", true), "html_tokenized.txt");
    }

    #[test]
    fn source_document_builder() {
        let doc = SourceDocument::new("x.html", b"abc".to_vec()).with_encoding(SourceEncoding::EucJp);
        assert_eq!(doc.encoding, Some(SourceEncoding::EucJp));
        assert_eq!(doc.bytes, b"abc");
    }

    #[test]
    fn output_serialises_to_json() {
        let out = OutputDocument {
            source_name: "a.html".into(),
            output_name: "a_tokenized.txt".into(),
            text: "雨 が".into(),
            stats: DocumentStats {
                token_count: 2,
                analyzer: "script".into(),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["output_name"], "a_tokenized.txt");
        assert_eq!(json["stats"]["token_count"], 2);
    }
}
