//! Annotation spans and the rules that classify Aozora editorial notes.
//!
//! The stripper never edits text in place. It records every region to drop
//! as an [`AnnotationSpan`] and excises them all in one pass at the end, so
//! each removal can be inspected (and tested) before the text is rebuilt.

use crate::gaiji::GaijiTable;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a removed span was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Ruby gloss (furigana) and its markers.
    Ruby,
    /// Reference to a character outside the source repertoire.
    Gaiji,
    /// Free-text editorial note.
    Note,
    /// Emphasis marks layered over base text.
    Emphasis,
    /// HTML tag, comment, or character reference.
    Tag,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Ruby => "ruby",
            SpanKind::Gaiji => "gaiji",
            SpanKind::Note => "note",
            SpanKind::Emphasis => "emphasis",
            SpanKind::Tag => "tag",
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A half-open byte range `[start, end)` of normalized text to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSpan {
    pub start: usize,
    pub end: usize,
    pub kind: SpanKind,
    /// Text written in place of the span (resolved gaiji, decoded entity).
    pub substitute: Option<String>,
    /// The span separates two blocks; excision may leave one line break.
    pub line_break: bool,
}

impl AnnotationSpan {
    pub fn new(start: usize, end: usize, kind: SpanKind) -> Self {
        Self {
            start,
            end,
            kind,
            substitute: None,
            line_break: false,
        }
    }

    pub fn with_substitute(mut self, substitute: Option<String>) -> Self {
        self.substitute = substitute;
        self
    }

    pub fn with_line_break(mut self, line_break: bool) -> Self {
        self.line_break = line_break;
        self
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

// ── Note classification ──────────────────────────────────────────────────

static RE_EMPHASIS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:「[^」]+」に|ここから|ここで)?(?:白ゴマ|丸|白丸|黒三角|白三角|二重丸|蛇の目|ばつ|黒ゴマ)?(?:傍点|二重傍線|傍線|鎖線|破線|波線)(?:終わり)?$",
    )
    .unwrap()
});

static RE_CODE_POINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"U\+([0-9A-Fa-f]{4,6})").unwrap());

static RE_DESCRIPTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^「([^」]+)」").unwrap());

/// Classify the inner text of a `［＃…］` note that is not a gaiji reference.
pub fn classify_note(inner: &str) -> SpanKind {
    if RE_EMPHASIS.is_match(inner.trim()) {
        SpanKind::Emphasis
    } else {
        SpanKind::Note
    }
}

/// Resolve a gaiji description to its Unicode replacement.
///
/// Lookup order: the full description, then the quoted part `「…」`, then an
/// embedded `U+XXXX` reference when `code_points` is set. Returns `None`
/// when nothing matches; callers drop the reference entirely.
pub fn resolve_gaiji(inner: &str, table: &GaijiTable, code_points: bool) -> Option<String> {
    let inner = inner.trim();
    if let Some(found) = table.get(inner) {
        return Some(found.to_string());
    }
    if let Some(caps) = RE_DESCRIPTION.captures(inner) {
        if let Some(found) = table.get(&caps[1]) {
            return Some(found.to_string());
        }
    }
    if code_points {
        if let Some(caps) = RE_CODE_POINT.captures(inner) {
            return u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from);
        }
    }
    None
}

/// Reduce an `<img class="gaiji">` alt text to the note description.
///
/// `※(「弓＋椁のつくり」、第3水準1-84-22)` → `「弓＋椁のつくり」、第3水準1-84-22`
pub fn gaiji_alt_description(alt: &str) -> &str {
    let s = alt.trim();
    let s = s.strip_prefix('※').unwrap_or(s);
    let s = s
        .strip_prefix('(')
        .or_else(|| s.strip_prefix('（'))
        .unwrap_or(s);
    s.strip_suffix(')')
        .or_else(|| s.strip_suffix('）'))
        .unwrap_or(s)
}
