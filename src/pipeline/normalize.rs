//! Encoding normalization: raw bytes → canonical Unicode text.
//!
//! ## Why no replacement characters?
//!
//! `encoding_rs` normally swaps undecodable bytes for U+FFFD. A stray
//! replacement character next to `《` or `［＃` would silently change how the
//! stripper reads the annotation around it, so the decoder runs in its
//! "without replacement" mode and the first malformed sequence becomes an
//! [`EncodingError`] instead. No partially decoded text is ever returned.
//!
//! ## Encoding resolution
//!
//! 1. a byte-order mark (UTF-8, UTF-16LE/BE) wins outright;
//! 2. then the encoding the caller declared for this document;
//! 3. then a `charset` declared by an HTML `<meta>` tag near the top;
//! 4. then the configured default (Shift_JIS).

use crate::config::SourceEncoding;
use crate::error::EncodingError;
use encoding_rs::{DecoderResult, Encoding};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::fmt;
use std::ops::Deref;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// How many leading bytes are searched for a `<meta charset>` declaration.
const SNIFF_LEN: usize = 1024;

/// Decoding options derived from [`crate::config::PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// Encoding declared for this particular document, if any.
    pub declared: Option<SourceEncoding>,
    /// Encoding used when nothing else identifies one.
    pub fallback: SourceEncoding,
    /// Honour `<meta charset=…>` declarations.
    pub sniff_charset: bool,
    /// Apply Unicode NFC after decoding.
    pub nfc: bool,
}

/// Canonical Unicode text produced by [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    text: String,
    encoding: &'static str,
}

impl NormalizedText {
    /// Canonicalise text that is already Unicode (e.g. a previous output).
    pub fn from_unicode(text: &str, nfc: bool) -> Self {
        Self {
            text: canonicalize(text, nfc),
            encoding: encoding_rs::UTF_8.name(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Name of the encoding the bytes were decoded from.
    pub fn encoding(&self) -> &'static str {
        self.encoding
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl Deref for NormalizedText {
    type Target = str;

    fn deref(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Decode `bytes` and canonicalise the result.
pub fn normalize(bytes: &[u8], options: &NormalizeOptions) -> Result<NormalizedText, EncodingError> {
    let (encoding, bom_len) = resolve_encoding(bytes, options);
    debug!(
        "Decoding {} bytes as {} (bom: {} bytes)",
        bytes.len(),
        encoding.name(),
        bom_len
    );

    let decoded = decode_strict(&bytes[bom_len..], encoding, bom_len)?;
    Ok(NormalizedText {
        text: canonicalize(&decoded, options.nfc),
        encoding: encoding.name(),
    })
}

/// Pick the encoding and the number of BOM bytes to skip.
fn resolve_encoding(bytes: &[u8], options: &NormalizeOptions) -> (&'static Encoding, usize) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return (encoding, bom_len);
    }
    if let Some(ref declared) = options.declared {
        return (declared.encoding(), 0);
    }
    if options.sniff_charset {
        if let Some(encoding) = sniff_meta_charset(bytes) {
            return (encoding, 0);
        }
    }
    (options.fallback.encoding(), 0)
}

static RE_META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i-u)<meta[^>]*charset\s*=\s*["']?([a-z0-9_\-]+)"#).unwrap()
});

/// Find a `charset` declared by a `<meta>` tag near the start of the file.
///
/// Only labels that map to a supported [`SourceEncoding`] are honoured.
pub fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    let caps = RE_META_CHARSET.captures(head)?;
    let label = std::str::from_utf8(&caps[1]).ok()?;
    SourceEncoding::from_label(label).map(|e| e.encoding())
}

/// Decode without replacement, reporting the first malformed byte.
///
/// `base` is added to reported offsets (the length of a skipped BOM).
fn decode_strict(
    bytes: &[u8],
    encoding: &'static Encoding,
    base: usize,
) -> Result<String, EncodingError> {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let capacity = decoder
        .max_utf8_buffer_length_without_replacement(bytes.len())
        .unwrap_or(bytes.len());
    let mut text = String::with_capacity(capacity);
    let mut total_read = 0usize;

    loop {
        let (result, read) =
            decoder.decode_to_string_without_replacement(&bytes[total_read..], &mut text, true);
        total_read += read;
        match result {
            DecoderResult::InputEmpty => return Ok(text),
            DecoderResult::OutputFull => {
                text.reserve((bytes.len() - total_read).max(16) * 3);
            }
            DecoderResult::Malformed(bad_len, consumed_after) => {
                let end = total_read.saturating_sub(consumed_after as usize);
                let offset = end.saturating_sub(bad_len as usize);
                return Err(EncodingError {
                    offset: offset + base,
                    byte: bytes.get(offset).copied().unwrap_or_default(),
                    encoding: encoding.name().to_string(),
                });
            }
        }
    }
}

/// Strip a BOM, unify line endings to LF and optionally apply NFC.
pub fn canonicalize(text: &str, nfc: bool) -> String {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    if nfc {
        text.nfc().collect()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shift_jis() -> NormalizeOptions {
        NormalizeOptions {
            nfc: true,
            sniff_charset: true,
            ..Default::default()
        }
    }

    #[test]
    fn decodes_shift_jis() {
        let (bytes, _, unmappable) = encoding_rs::SHIFT_JIS.encode("雨が降る。");
        assert!(!unmappable);
        let text = normalize(&bytes, &shift_jis()).expect("valid Shift_JIS");
        assert_eq!(text.as_str(), "雨が降る。");
        assert_eq!(text.encoding(), "Shift_JIS");
    }

    #[test]
    fn reports_offset_of_invalid_byte() {
        let err = normalize(b"abc\xA0def", &shift_jis()).unwrap_err();
        assert_eq!(err.offset, 3);
        assert_eq!(err.byte, 0xA0);
        assert_eq!(err.encoding, "Shift_JIS");
    }

    #[test]
    fn reports_truncated_lead_byte() {
        let err = normalize(b"ab\x82", &shift_jis()).unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.byte, 0x82);
    }

    #[test]
    fn declared_encoding_overrides_default() {
        let (bytes, _, _) = encoding_rs::EUC_JP.encode("吾輩は猫である");
        let options = NormalizeOptions {
            declared: Some(SourceEncoding::EucJp),
            ..shift_jis()
        };
        let text = normalize(&bytes, &options).expect("valid EUC-JP");
        assert_eq!(text.as_str(), "吾輩は猫である");
    }

    #[test]
    fn utf8_bom_wins_and_offsets_count_it() {
        let err = normalize(b"\xEF\xBB\xBFa\xFFb", &shift_jis()).unwrap_err();
        assert_eq!(err.encoding, "UTF-8");
        assert_eq!(err.offset, 4);
        assert_eq!(err.byte, 0xFF);

        let ok = normalize("\u{FEFF}本文".as_bytes(), &shift_jis()).unwrap();
        assert_eq!(ok.as_str(), "本文");
    }

    #[test]
    fn sniffs_meta_charset() {
        let html = "<html><head><meta http-equiv=\"Content-Type\" content=\"text/html;charset=EUC-JP\" /></head><body>猫</body></html>";
        let (bytes, _, _) = encoding_rs::EUC_JP.encode(html);
        assert_eq!(sniff_meta_charset(&bytes), Some(encoding_rs::EUC_JP));
        let text = normalize(&bytes, &shift_jis()).unwrap();
        assert!(text.contains("猫"));
    }

    #[test]
    fn sniffing_can_be_disabled() {
        let bytes = b"<meta charset=\"utf-8\">\xA0";
        let options = NormalizeOptions {
            sniff_charset: false,
            ..shift_jis()
        };
        // 0xA0 is invalid Shift_JIS but also invalid UTF-8; the reported
        // encoding shows which decoder ran.
        assert_eq!(normalize(bytes, &options).unwrap_err().encoding, "Shift_JIS");
        assert_eq!(normalize(bytes, &shift_jis()).unwrap_err().encoding, "UTF-8");
    }

    #[test]
    fn canonicalizes_line_endings_and_nfc() {
        assert_eq!(canonicalize("a\r\nb\rc", false), "a\nb\nc");
        // か + combining voiced mark composes to が
        assert_eq!(canonicalize("\u{304B}\u{3099}", true), "が");
        assert_eq!(canonicalize("\u{304B}\u{3099}", false), "\u{304B}\u{3099}");
    }

    #[test]
    fn nfc_folds_compatibility_ideographs() {
        assert_eq!(canonicalize("\u{F929}", true), "\u{6717}");
        assert_eq!(canonicalize("\u{F929}", false), "\u{F929}");
    }
}
