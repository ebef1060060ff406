//! Markup and annotation stripping.
//!
//! A single left-to-right scan over the normalized text, driven by an
//! explicit state machine:
//!
//! ```text
//!            '<'              '>'
//!   NORMAL ───────▶ IN_TAG ───────▶ NORMAL
//!     │  《 （ ❬<ruby>❭        │ <ruby>
//!     ├───────────▶ IN_RUBY ◀─┘
//!     │                │ 》 ） </ruby>
//!     │                └──────────────▶ NORMAL
//!     │  ［＃ [#                  ］ ]
//!     └───────────▶ IN_ANNOTATION ─────▶ NORMAL
//! ```
//!
//! The scan only records what to remove, as [`AnnotationSpan`]s; the text is
//! rebuilt once at the end by [`excise`]. Lookahead is bounded: each state
//! searches forward only for its own close marker, and `《…》`, `（…）` and
//! `［＃…］` may not cross a line break.
//!
//! Ruby notations handled:
//!
//! * `｜base《gloss》` / `base《gloss》`: gloss removed, `｜` removed;
//! * `<ruby><rb>base</rb><rp>（</rp><rt>gloss</rt><rp>）</rp></ruby>`: only
//!   the `<rb>` content survives; a ruby element without `<rb>` vanishes;
//! * `<!R>base（gloss）`: the notation of the oldest Aozora files.

use crate::error::MarkupError;
use crate::gaiji::GaijiTable;
use crate::pipeline::annotation::{
    classify_note, gaiji_alt_description, resolve_gaiji, AnnotationSpan, SpanKind,
};
use crate::pipeline::extract::work_region;
use crate::pipeline::normalize::NormalizedText;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, Range};
use std::sync::Arc;
use tracing::debug;

const RUBY_OPEN: char = '《';
const RUBY_CLOSE: char = '》';
const RUBY_BASE: char = '｜';
const PAREN_RUBY_OPEN: char = '（';
const PAREN_RUBY_CLOSE: char = '）';
const GAIJI_MARK: char = '※';
const NOTE_OPEN: &str = "［＃";
const NOTE_CLOSE: char = '］';
const ASCII_NOTE_OPEN: &str = "[#";
const ASCII_NOTE_CLOSE: char = ']';
const EMPHASIS_MARKS: [char; 2] = ['﹅', '﹆'];

/// Tags that end a block of text when paragraph breaks are preserved.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr", "blockquote", "dd",
    "dt", "hr",
];

/// Elements whose content is never text.
pub(crate) const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// Options for the strip stage.
#[derive(Debug, Clone)]
pub struct StripOptions {
    pub preserve_paragraph_breaks: bool,
    pub work_only: bool,
    pub decode_entities: bool,
    pub resolve_code_points: bool,
    pub gaiji_table: Arc<GaijiTable>,
}

impl Default for StripOptions {
    fn default() -> Self {
        Self {
            preserve_paragraph_breaks: false,
            work_only: true,
            decode_entities: false,
            resolve_code_points: true,
            gaiji_table: Arc::new(GaijiTable::default()),
        }
    }
}

/// Counters gathered while stripping one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripStats {
    pub spans_removed: usize,
    pub gaiji_resolved: usize,
    pub gaiji_dropped: usize,
}

impl StripStats {
    fn absorb(&mut self, other: StripStats) {
        self.spans_removed += other.spans_removed;
        self.gaiji_resolved += other.gaiji_resolved;
        self.gaiji_dropped += other.gaiji_dropped;
    }
}

/// Text with every tag and annotation removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedText {
    text: String,
    stats: StripStats,
}

impl StrippedText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn stats(&self) -> StripStats {
        self.stats
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl Deref for StrippedText {
    type Target = str;

    fn deref(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for StrippedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Spans found by [`scan`], sorted and non-overlapping.
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    pub spans: Vec<AnnotationSpan>,
    pub stats: StripStats,
}

/// Remove tags and annotations from `text`.
///
/// Excising a span can join the text around it into a new marker
/// (`<<b>p>` leaves `<p>`), so the result is scanned again until a pass
/// finds nothing. Every pass that removes something shortens the text,
/// which bounds the loop. A [`MarkupError`] raised by a later pass carries
/// offsets into that pass's input.
///
/// With `decode_entities` there is a single pass: a decoded `&lt;` is text
/// and must not be read as markup.
pub fn strip(text: &NormalizedText, options: &StripOptions) -> Result<StrippedText, MarkupError> {
    let scanned = scan(text.as_str(), options)?;
    let mut stats = scanned.stats;
    let mut stripped = excise(text.as_str(), &scanned.spans);
    let mut passes = 1usize;

    if !scanned.spans.is_empty() && !options.decode_entities {
        loop {
            let rescanned = scan(&stripped, options)?;
            if rescanned.spans.is_empty() {
                break;
            }
            let next = excise(&stripped, &rescanned.spans);
            let shrank = next.len() < stripped.len();
            stats.absorb(rescanned.stats);
            stripped = next;
            passes += 1;
            if !shrank {
                break;
            }
        }
    }

    debug!(
        "Stripped {} spans in {} pass(es) ({} gaiji resolved, {} dropped): {} → {} bytes",
        stats.spans_removed,
        passes,
        stats.gaiji_resolved,
        stats.gaiji_dropped,
        text.len(),
        stripped.len()
    );
    Ok(StrippedText {
        text: stripped,
        stats,
    })
}

/// Find every span to remove, without touching the text.
///
/// With `work_only`, the text outside the work body is reported as two
/// [`SpanKind::Tag`] spans so that span lengths always account for the full
/// difference between input and output.
pub fn scan(text: &str, options: &StripOptions) -> Result<ScanOutput, MarkupError> {
    let region = if options.work_only {
        work_region(text)?
    } else {
        0..text.len()
    };

    let mut output = Scanner::new(text, region.clone(), options).run()?;

    if region.start > 0 {
        output
            .spans
            .insert(0, AnnotationSpan::new(0, region.start, SpanKind::Tag));
        output.stats.spans_removed += 1;
    }
    if region.end < text.len() {
        output
            .spans
            .push(AnnotationSpan::new(region.end, text.len(), SpanKind::Tag));
        output.stats.spans_removed += 1;
    }
    Ok(output)
}

/// Rebuild `text` without the given spans.
///
/// Substitutes are written in place of their span. A run of spans flagged
/// `line_break` leaves at most one `\n`, and none when the neighbouring
/// kept text already breaks the line or when it would start or end the
/// output.
pub fn excise(text: &str, spans: &[AnnotationSpan]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    let mut pending_break = false;

    for span in spans {
        push_kept(&mut out, &text[cursor..span.start], &mut pending_break);
        if let Some(ref substitute) = span.substitute {
            push_kept(&mut out, substitute, &mut pending_break);
        }
        pending_break |= span.line_break;
        cursor = span.end;
    }
    push_kept(&mut out, &text[cursor..], &mut pending_break);
    out
}

fn push_kept(out: &mut String, piece: &str, pending_break: &mut bool) {
    if piece.is_empty() {
        return;
    }
    if *pending_break {
        if !out.is_empty() && !out.ends_with('\n') && !piece.starts_with('\n') {
            out.push('\n');
        }
        *pending_break = false;
    }
    out.push_str(piece);
}

/// Build a [`MarkupError`] for a byte offset into `text`.
pub(crate) fn markup_error(text: &str, byte_offset: usize, kind: SpanKind) -> MarkupError {
    let before = &text[..byte_offset];
    MarkupError {
        kind,
        offset: before.chars().count(),
        line: before.matches('\n').count() + 1,
    }
}

// ── State machine ────────────────────────────────────────────────────────

/// Scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Normal,
    InTag,
    InRuby,
    InAnnotation,
}

/// Marker events that move the scanner between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    TagOpen,
    TagClose,
    RubyOpen,
    RubyClose,
    NoteOpen,
    NoteClose,
}

/// The transition table. `None` marks an event that cannot occur in a state.
pub fn transition(state: ScanState, event: ScanEvent) -> Option<ScanState> {
    use ScanEvent::*;
    use ScanState::*;
    match (state, event) {
        (Normal, TagOpen) => Some(InTag),
        (Normal, RubyOpen) => Some(InRuby),
        (Normal, NoteOpen) => Some(InAnnotation),
        (InTag, TagClose) => Some(Normal),
        (InTag, RubyOpen) => Some(InRuby),
        (InRuby, RubyClose) => Some(Normal),
        (InAnnotation, NoteClose) => Some(Normal),
        _ => None,
    }
}

/// Which notation the currently open ruby uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RubyForm {
    Bracket,
    Paren,
    Html,
}

struct Scanner<'a> {
    text: &'a str,
    pos: usize,
    end: usize,
    state: ScanState,
    options: &'a StripOptions,
    spans: Vec<AnnotationSpan>,
    stats: StripStats,
    /// Start of the span opened by the last state change.
    open_at: usize,
    ruby_form: RubyForm,
    /// Close marker of the open `［＃` or `[#` note.
    note_close: char,
    /// Offset of a `※` that may introduce a gaiji note.
    gaiji_mark: Option<usize>,
    /// Offset of a `｜` that may start a ruby base.
    ruby_base: Option<usize>,
    /// A `<!R>` was seen; the next `（…）` on this line is a gloss.
    paren_ruby_pending: bool,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, region: Range<usize>, options: &'a StripOptions) -> Self {
        Self {
            text,
            pos: region.start,
            end: region.end,
            state: ScanState::Normal,
            options,
            spans: Vec::new(),
            stats: StripStats::default(),
            open_at: region.start,
            ruby_form: RubyForm::Bracket,
            note_close: NOTE_CLOSE,
            gaiji_mark: None,
            ruby_base: None,
            paren_ruby_pending: false,
        }
    }

    fn run(mut self) -> Result<ScanOutput, MarkupError> {
        loop {
            let event = match self.state {
                ScanState::Normal => match self.scan_normal() {
                    Some(event) => event,
                    None => break,
                },
                ScanState::InTag => self.scan_tag()?,
                ScanState::InRuby => self.scan_ruby()?,
                ScanState::InAnnotation => self.scan_annotation()?,
            };
            let next = transition(self.state, event);
            debug_assert!(next.is_some(), "{event:?} in {:?}", self.state);
            self.state = next.unwrap_or(ScanState::Normal);
        }
        self.stats.spans_removed += self.spans.len();
        Ok(ScanOutput {
            spans: self.spans,
            stats: self.stats,
        })
    }

    fn error(&self, at: usize, kind: SpanKind) -> MarkupError {
        markup_error(self.text, at, kind)
    }

    /// Insert a span that starts before spans already recorded.
    fn insert_sorted(&mut self, span: AnnotationSpan) {
        let idx = self.spans.partition_point(|s| s.start < span.start);
        self.spans.insert(idx, span);
    }

    // ── NORMAL ───────────────────────────────────────────────────────────

    /// Advance over kept text until a marker opens a span.
    fn scan_normal(&mut self) -> Option<ScanEvent> {
        let text = self.text;
        while self.pos < self.end {
            let rest = &text[self.pos..self.end];
            let Some(c) = rest.chars().next() else { break };
            let at = self.pos;
            let next = at + c.len_utf8();

            match c {
                '\n' => {
                    self.ruby_base = None;
                    self.paren_ruby_pending = false;
                    self.gaiji_mark = None;
                }
                '<' if starts_tag(&rest[1..]) => {
                    self.open_at = at;
                    return Some(ScanEvent::TagOpen);
                }
                RUBY_OPEN => {
                    self.open_ruby(at, RubyForm::Bracket);
                    self.pos = next;
                    return Some(ScanEvent::RubyOpen);
                }
                PAREN_RUBY_OPEN if self.paren_ruby_pending => {
                    self.paren_ruby_pending = false;
                    self.open_ruby(at, RubyForm::Paren);
                    self.pos = next;
                    return Some(ScanEvent::RubyOpen);
                }
                _ if rest.starts_with(NOTE_OPEN) || rest.starts_with(ASCII_NOTE_OPEN) => {
                    let (open, close) = if rest.starts_with(NOTE_OPEN) {
                        (NOTE_OPEN, NOTE_CLOSE)
                    } else {
                        (ASCII_NOTE_OPEN, ASCII_NOTE_CLOSE)
                    };
                    self.open_at = at;
                    self.note_close = close;
                    self.pos = at + open.len();
                    return Some(ScanEvent::NoteOpen);
                }
                GAIJI_MARK => {
                    self.gaiji_mark = Some(at);
                    self.pos = next;
                    continue;
                }
                RUBY_BASE => {
                    self.ruby_base = Some(at);
                    self.gaiji_mark = None;
                }
                c if EMPHASIS_MARKS.contains(&c) => {
                    self.spans.push(AnnotationSpan::new(at, next, SpanKind::Emphasis));
                }
                '&' if self.options.decode_entities => {
                    if let Some((len, decoded)) = decode_entity(rest) {
                        self.spans.push(
                            AnnotationSpan::new(at, at + len, SpanKind::Tag)
                                .with_substitute(Some(decoded.to_string())),
                        );
                        self.gaiji_mark = None;
                        self.pos = at + len;
                        continue;
                    }
                    self.gaiji_mark = None;
                }
                _ => {
                    self.gaiji_mark = None;
                }
            }
            self.pos = next;
        }
        None
    }

    fn open_ruby(&mut self, at: usize, form: RubyForm) {
        self.open_at = at;
        self.ruby_form = form;
        self.gaiji_mark = None;
        if let Some(base) = self.ruby_base.take() {
            self.insert_sorted(AnnotationSpan::new(
                base,
                base + RUBY_BASE.len_utf8(),
                SpanKind::Ruby,
            ));
        }
    }

    // ── IN_TAG ───────────────────────────────────────────────────────────

    fn scan_tag(&mut self) -> Result<ScanEvent, MarkupError> {
        let text = self.text;
        let start = self.open_at;
        let rest = &text[start..self.end];

        if rest.starts_with("<!--") {
            let close = rest[4..]
                .find("-->")
                .ok_or_else(|| self.error(start, SpanKind::Tag))?;
            let end = start + 4 + close + 3;
            self.spans.push(AnnotationSpan::new(start, end, SpanKind::Tag));
            self.pos = end;
            return Ok(ScanEvent::TagClose);
        }

        let gt = find_tag_end(text, start + 1, self.end)
            .ok_or_else(|| self.error(start, SpanKind::Tag))?;
        let end = gt + 1;
        let tag = Tag::parse(&text[start..end]);

        if tag.name == "ruby" && !tag.closing {
            self.spans.push(AnnotationSpan::new(start, end, SpanKind::Ruby));
            self.open_ruby(start, RubyForm::Html);
            self.pos = end;
            return Ok(ScanEvent::RubyOpen);
        }

        let span = if tag.name == "!r" {
            self.paren_ruby_pending = true;
            AnnotationSpan::new(start, end, SpanKind::Ruby)
        } else if RAW_TEXT_TAGS.contains(&tag.name.as_str()) && !tag.closing && !tag.self_closing {
            let close = find_ascii_ci(text, end, self.end, &format!("</{}", tag.name))
                .and_then(|at| find_tag_end(text, at + 2, self.end))
                .ok_or_else(|| self.error(start, SpanKind::Tag))?;
            AnnotationSpan::new(start, close + 1, SpanKind::Tag)
        } else if tag.is_gaiji_image() {
            self.gaiji_image_span(start, end, &tag)
        } else {
            AnnotationSpan::new(start, end, SpanKind::Tag).with_line_break(
                self.options.preserve_paragraph_breaks && BLOCK_TAGS.contains(&tag.name.as_str()),
            )
        };

        self.pos = span.end;
        self.spans.push(span);
        Ok(ScanEvent::TagClose)
    }

    fn gaiji_image_span(&mut self, start: usize, end: usize, tag: &Tag<'_>) -> AnnotationSpan {
        let substitute = tag.attr("alt").and_then(|alt| {
            resolve_gaiji(
                gaiji_alt_description(alt),
                &self.options.gaiji_table,
                self.options.resolve_code_points,
            )
        });
        self.count_gaiji(substitute.is_some());
        AnnotationSpan::new(start, end, SpanKind::Gaiji).with_substitute(substitute)
    }

    fn count_gaiji(&mut self, resolved: bool) {
        if resolved {
            self.stats.gaiji_resolved += 1;
        } else {
            self.stats.gaiji_dropped += 1;
        }
    }

    // ── IN_RUBY ──────────────────────────────────────────────────────────

    fn scan_ruby(&mut self) -> Result<ScanEvent, MarkupError> {
        match self.ruby_form {
            RubyForm::Bracket => self.close_gloss(RUBY_CLOSE),
            RubyForm::Paren => self.close_gloss(PAREN_RUBY_CLOSE),
            RubyForm::Html => self.close_html_ruby(),
        }
    }

    /// Drop a `《…》` or `（…）` gloss, which must close on the same line.
    fn close_gloss(&mut self, close: char) -> Result<ScanEvent, MarkupError> {
        let text = self.text;
        let rest = &text[self.pos..self.end];
        let found = rest
            .find([close, '\n'])
            .filter(|&i| rest[i..].starts_with(close))
            .ok_or_else(|| self.error(self.open_at, SpanKind::Ruby))?;
        let end = self.pos + found + close.len_utf8();
        self.spans
            .push(AnnotationSpan::new(self.open_at, end, SpanKind::Ruby));
        self.pos = end;
        Ok(ScanEvent::RubyClose)
    }

    /// Walk a `<ruby>` element, keeping only what sits inside `<rb>`.
    fn close_html_ruby(&mut self) -> Result<ScanEvent, MarkupError> {
        let text = self.text;
        let open_at = self.open_at;
        let close_start = find_ascii_ci(text, self.pos, self.end, "</ruby")
            .ok_or_else(|| self.error(open_at, SpanKind::Ruby))?;
        let close_end = find_tag_end(text, close_start + 2, self.end)
            .ok_or_else(|| self.error(open_at, SpanKind::Ruby))?
            + 1;

        let mut i = self.pos;
        while i < close_start {
            let seg_end = text[i..close_start]
                .find('<')
                .map_or(close_start, |j| i + j);
            if seg_end > i {
                self.spans.push(AnnotationSpan::new(i, seg_end, SpanKind::Ruby));
            }
            if seg_end == close_start {
                break;
            }

            let gt = find_tag_end(text, seg_end + 1, close_start)
                .ok_or_else(|| self.error(open_at, SpanKind::Ruby))?;
            let tag = Tag::parse(&text[seg_end..=gt]);
            self.spans
                .push(AnnotationSpan::new(seg_end, gt + 1, SpanKind::Ruby));
            i = gt + 1;

            if tag.name == "rb" && !tag.closing && !tag.self_closing {
                // The base is scanned as one unit so a `※` and its note
                // still pair up across the tags between them.
                let base_end = rb_content_end(text, i, close_start);
                if base_end > i {
                    let inner = Scanner::new(text, i..base_end, self.options).run()?;
                    self.spans.extend(inner.spans);
                    self.stats.absorb(StripStats {
                        spans_removed: 0,
                        ..inner.stats
                    });
                }
                i = base_end;
            }
        }

        self.spans
            .push(AnnotationSpan::new(close_start, close_end, SpanKind::Ruby));
        self.pos = close_end;
        Ok(ScanEvent::RubyClose)
    }

    // ── IN_ANNOTATION ────────────────────────────────────────────────────

    /// Find the balanced close of a `［＃…］` note and classify it.
    fn scan_annotation(&mut self) -> Result<ScanEvent, MarkupError> {
        let text = self.text;
        let close = self.note_close;
        let open = if close == NOTE_CLOSE { '［' } else { '[' };
        let content_start = self.pos;
        let mut depth = 1usize;
        let mut close_at = None;

        for (i, c) in text[content_start..self.end].char_indices() {
            match c {
                '\n' => break,
                c if c == open => depth += 1,
                c if c == close => {
                    depth -= 1;
                    if depth == 0 {
                        close_at = Some(content_start + i);
                        break;
                    }
                }
                _ => {}
            }
        }

        let Some(close_at) = close_at else {
            return Err(match self.gaiji_mark {
                Some(mark) => self.error(mark, SpanKind::Gaiji),
                None => self.error(self.open_at, SpanKind::Note),
            });
        };
        let inner = &text[content_start..close_at];
        let end = close_at + close.len_utf8();

        if let Some(mark) = self.gaiji_mark.take() {
            let substitute = resolve_gaiji(
                inner,
                &self.options.gaiji_table,
                self.options.resolve_code_points,
            );
            self.count_gaiji(substitute.is_some());
            self.insert_sorted(
                AnnotationSpan::new(mark, mark + GAIJI_MARK.len_utf8(), SpanKind::Gaiji)
                    .with_substitute(substitute),
            );
            self.spans
                .push(AnnotationSpan::new(self.open_at, end, SpanKind::Gaiji));
        } else {
            self.spans
                .push(AnnotationSpan::new(self.open_at, end, classify_note(inner)));
        }

        self.pos = end;
        Ok(ScanEvent::NoteClose)
    }
}

// ── Tag helpers ──────────────────────────────────────────────────────────

/// Whether the text after a `<` makes it the start of markup.
pub(crate) fn starts_tag(after: &str) -> bool {
    after
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
}

/// Byte offset of the `>` closing a tag, skipping quoted attribute values.
pub(crate) fn find_tag_end(text: &str, from: usize, limit: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut after_eq = false;
    for (i, c) in text[from..limit].char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '>' => return Some(from + i),
                '"' | '\'' if after_eq => quote = Some(c),
                '=' => {
                    after_eq = true;
                    continue;
                }
                c if c.is_whitespace() && after_eq => continue,
                _ => {}
            },
        }
        after_eq = false;
    }
    None
}

/// End of a `<rb>` base: its `</rb>`, or the `<rt>`/`<rp>` that closes it
/// implicitly, or the end of the ruby element.
fn rb_content_end(text: &str, from: usize, limit: usize) -> usize {
    ["</rb", "<rt", "<rp"]
        .iter()
        .filter_map(|needle| find_ascii_ci(text, from, limit, needle))
        .min()
        .unwrap_or(limit)
}

/// Case-insensitive search for an ASCII needle.
pub(crate) fn find_ascii_ci(text: &str, from: usize, limit: usize, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    text.as_bytes()[from..limit]
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
        .map(|i| from + i)
}

static RE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>/]+))"#)
        .unwrap()
});

pub(crate) struct Tag<'a> {
    raw: &'a str,
    pub(crate) name: String,
    pub(crate) closing: bool,
    pub(crate) self_closing: bool,
}

impl<'a> Tag<'a> {
    /// Parse `<name attr="…">`, `</name>` or `<name/>`.
    pub(crate) fn parse(raw: &'a str) -> Self {
        let inner = raw
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(raw);
        let closing = inner.starts_with('/');
        let name = inner
            .trim_start_matches('/')
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '/')
            .collect::<String>()
            .to_ascii_lowercase();
        Self {
            raw,
            name,
            closing,
            self_closing: inner.trim_end().ends_with('/'),
        }
    }

    pub(crate) fn attr(&self, name: &str) -> Option<&'a str> {
        RE_ATTR.captures_iter(self.raw).find_map(|caps| {
            if !caps[1].eq_ignore_ascii_case(name) {
                return None;
            }
            caps.get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
        })
    }

    /// Whether the whitespace-separated `class` attribute lists `class`.
    pub(crate) fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    fn is_gaiji_image(&self) -> bool {
        self.name == "img" && self.has_class("gaiji")
    }
}

/// Decode an HTML character reference at the start of `s`.
///
/// Returns the reference length in bytes and the decoded character.
fn decode_entity(s: &str) -> Option<(usize, char)> {
    let semi = s.get(..12).unwrap_or(s).find(';')?;
    let name = &s[1..semi];
    let decoded = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{A0}',
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some((semi + 1, decoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> StripOptions {
        StripOptions::default()
    }

    fn run(text: &str, options: &StripOptions) -> Result<String, MarkupError> {
        strip(&NormalizedText::from_unicode(text, true), options).map(StrippedText::into_string)
    }

    fn ok(text: &str) -> String {
        run(text, &opts()).expect("strip should succeed")
    }

    // ── Transition table ────────────────────────────────────────────────

    #[test]
    fn transition_table() {
        use ScanEvent::*;
        use ScanState::*;
        assert_eq!(transition(Normal, TagOpen), Some(InTag));
        assert_eq!(transition(InTag, TagClose), Some(Normal));
        assert_eq!(transition(InTag, RubyOpen), Some(InRuby));
        assert_eq!(transition(Normal, RubyOpen), Some(InRuby));
        assert_eq!(transition(InRuby, RubyClose), Some(Normal));
        assert_eq!(transition(Normal, NoteOpen), Some(InAnnotation));
        assert_eq!(transition(InAnnotation, NoteClose), Some(Normal));
        assert_eq!(transition(Normal, TagClose), None);
        assert_eq!(transition(InRuby, NoteOpen), None);
        assert_eq!(transition(InAnnotation, TagOpen), None);
    }

    // ── Tags ────────────────────────────────────────────────────────────

    #[test]
    fn html_ruby_without_rb_is_removed_whole() {
        assert_eq!(ok("<p>雨<ruby>雨<rt>あめ</rt></ruby>が降る。</p>"), "雨が降る。");
    }

    #[test]
    fn html_ruby_keeps_rb_content() {
        let html = "<ruby><rb>羅生門</rb><rp>（</rp><rt>らしょうもん</rt><rp>）</rp></ruby>の下";
        assert_eq!(ok(html), "羅生門の下");
    }

    #[test]
    fn unterminated_html_ruby() {
        let err = run("前<ruby><rb>雨</rb><rt>あめ</rt>", &opts()).unwrap_err();
        assert_eq!(err.kind, SpanKind::Ruby);
        assert_eq!(err.offset, 1);
    }

    #[test]
    fn unterminated_tag() {
        let err = run("本文<span class=\"notes\"", &opts()).unwrap_err();
        assert_eq!(err.kind, SpanKind::Tag);
        assert_eq!(err.offset, 2);
        assert_eq!(err.line, 1);
    }

    #[test]
    fn bare_angle_bracket_is_text() {
        assert_eq!(ok("1 < 2 かつ 3 > 2"), "1 < 2 かつ 3 > 2");
    }

    #[test]
    fn quoted_gt_inside_attribute() {
        assert_eq!(ok("<a title=\"a>b\">リンク</a>"), "リンク");
    }

    #[test]
    fn comments_script_and_style_are_dropped() {
        let html = "前<!-- <p>注記</p> -->中<script>if (a < b) {}</script><style>p{}</style>後";
        assert_eq!(ok(html), "前中後");
    }

    #[test]
    fn unterminated_comment() {
        let err = run("前<!-- 注記", &opts()).unwrap_err();
        assert_eq!(err.kind, SpanKind::Tag);
    }

    #[test]
    fn paragraph_breaks_are_single_line_breaks() {
        let options = StripOptions {
            preserve_paragraph_breaks: true,
            ..opts()
        };
        let html = "<p>一段落</p><p>二段落</p>\n<p>三段落</p>";
        assert_eq!(run(html, &options).unwrap(), "一段落\n二段落\n三段落");
        assert_eq!(ok(html), "一段落二段落\n三段落");
    }

    #[test]
    fn br_with_source_newline_is_not_doubled() {
        let options = StripOptions {
            preserve_paragraph_breaks: true,
            ..opts()
        };
        assert_eq!(run("一行目<br />\r\n二行目<br />\r\n", &options).unwrap(), "一行目\n二行目\n");
    }

    #[test]
    fn work_body_only() {
        let html = concat!(
            "<html><head><title>羅生門</title></head><body>",
            "<h1>羅生門</h1><div class=\"main_text\">ある日の暮方の事である。</div>",
            "<div class=\"bibliographical_information\">底本：</div></body></html>"
        );
        assert_eq!(ok(html), "ある日の暮方の事である。");

        let full = StripOptions {
            work_only: false,
            ..opts()
        };
        assert_eq!(run(html, &full).unwrap(), "羅生門羅生門ある日の暮方の事である。底本：");
    }

    #[test]
    fn work_body_ignores_markup_in_comments() {
        assert_eq!(ok("頭<div class=\"main_text\">本文<!-- </div> -->続き</div>尾"), "本文続き");
        assert_eq!(ok("<body>頭<div class=\"text main_text\">本文</div>尾</body>"), "本文");
    }

    // ── Aozora annotations ──────────────────────────────────────────────

    #[test]
    fn bracket_ruby_with_base_marker() {
        assert_eq!(ok("｜羅生門《らしょうもん》の下"), "羅生門の下");
        assert_eq!(ok("下人《げにん》が"), "下人が");
    }

    #[test]
    fn base_marker_without_gloss_is_text() {
        assert_eq!(ok("Ａ｜Ｂ\n《あ》"), "Ａ｜Ｂ\n");
    }

    #[test]
    fn unterminated_bracket_ruby() {
        let err = run("雨《あめ", &opts()).unwrap_err();
        assert_eq!(err.kind, SpanKind::Ruby);
        assert_eq!(err.offset, 1);
    }

    #[test]
    fn gloss_may_not_cross_line_break() {
        let err = run("一行目\n雨《あめ\n》", &opts()).unwrap_err();
        assert_eq!(err.kind, SpanKind::Ruby);
        assert_eq!(err.line, 2);
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn old_paren_ruby() {
        assert_eq!(ok("<!R>薔薇（ばら）の花（はな）"), "薔薇の花（はな）");
    }

    #[test]
    fn old_paren_ruby_unterminated() {
        let err = run("<!R>薔薇（ばら", &opts()).unwrap_err();
        assert_eq!(err.kind, SpanKind::Ruby);
    }

    #[test]
    fn editorial_notes_are_removed() {
        assert_eq!(ok("［＃ここから２字下げ］本文［＃ここで字下げ終わり］"), "本文");
        assert_eq!(ok("本文[#改ページ]続き"), "本文続き");
    }

    #[test]
    fn emphasis_is_removed_base_kept() {
        assert_eq!(ok("雨［＃「雨」に傍点］が降る"), "雨が降る");
        assert_eq!(ok("<em class=\"sesame_dot\">雨</em>が"), "雨が");
        assert_eq!(ok("雨﹅が"), "雨が");
    }

    #[test]
    fn note_kinds_are_classified() {
        let out = scan("雨［＃「雨」に傍点］［＃改ページ］", &opts()).unwrap();
        let kinds: Vec<_> = out.spans.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SpanKind::Emphasis, SpanKind::Note]);
    }

    #[test]
    fn unterminated_note() {
        let err = run("本文［＃改ページ", &opts()).unwrap_err();
        assert_eq!(err.kind, SpanKind::Note);
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn nested_note_brackets() {
        assert_eq!(ok("ア［＃「ア［＃小書き］」は小書き］イ"), "アイ");
    }

    // ── Gaiji ───────────────────────────────────────────────────────────

    fn with_table() -> StripOptions {
        StripOptions {
            gaiji_table: Arc::new(GaijiTable::from_pairs([
                ("「高」の「口」が「梯子」", "髙"),
                ("木＋吉", "桔"),
            ])),
            ..opts()
        }
    }

    #[test]
    fn mapped_gaiji_is_substituted() {
        let out = strip(
            &NormalizedText::from_unicode("※［＃「高」の「口」が「梯子」］橋", true),
            &with_table(),
        )
        .unwrap();
        assert_eq!(out.as_str(), "髙橋");
        assert_eq!(out.stats().gaiji_resolved, 1);
        assert_eq!(out.stats().gaiji_dropped, 0);
    }

    #[test]
    fn unmapped_gaiji_leaves_no_residue() {
        let out = strip(
            &NormalizedText::from_unicode("前※［＃「弓＋椁のつくり」、第3水準1-84-22］後", true),
            &with_table(),
        )
        .unwrap();
        assert_eq!(out.as_str(), "前後");
        assert_eq!(out.stats().gaiji_dropped, 1);
    }

    #[test]
    fn gaiji_note_wrapped_in_span() {
        let html = "※<span class=\"notes\">［＃「木＋吉」、第3水準1-85-67］</span>梗";
        assert_eq!(run(html, &with_table()).unwrap(), "桔梗");
    }

    #[test]
    fn gaiji_inside_ruby_base() {
        assert_eq!(
            run("｜※［＃「木＋吉」、第3水準1-85-67］梗《ききょう》", &with_table()).unwrap(),
            "桔梗"
        );
    }

    #[test]
    fn gaiji_note_wrapped_in_span_inside_html_ruby_base() {
        let html = concat!(
            "<ruby><rb>※<span class=\"notes\">［＃「木＋吉」、第3水準1-85-67］</span>梗</rb>",
            "<rp>（</rp><rt>ききょう</rt><rp>）</rp></ruby>の花"
        );
        let out = strip(&NormalizedText::from_unicode(html, true), &with_table()).unwrap();
        assert_eq!(out.as_str(), "桔梗の花");
        assert_eq!(out.stats().gaiji_resolved, 1);

        let dropped = run(html, &opts()).unwrap();
        assert_eq!(dropped, "梗の花");
    }

    #[test]
    fn html_ruby_base_without_closing_rb() {
        let html = "<ruby><rb>下人<rt>げにん</rt></ruby>が";
        assert_eq!(ok(html), "下人が");
    }

    #[test]
    fn gaiji_code_point_reference() {
        assert_eq!(ok("※［＃「てへん＋劣」、U+6318、128-12］"), "挘");
        let off = StripOptions {
            resolve_code_points: false,
            ..opts()
        };
        assert_eq!(run("※［＃「てへん＋劣」、U+6318、128-12］", &off).unwrap(), "");
    }

    #[test]
    fn gaiji_image_uses_alt_text() {
        let html = "<img src=\"../../../gaiji/1-85/1-85-67.png\" alt=\"※(「木＋吉」、第3水準1-85-67)\" class=\"gaiji\" />梗";
        assert_eq!(run(html, &with_table()).unwrap(), "桔梗");
        assert_eq!(ok(html), "梗");
    }

    #[test]
    fn reference_mark_alone_is_text() {
        assert_eq!(ok("※印の注意"), "※印の注意");
    }

    #[test]
    fn unterminated_gaiji_note() {
        let err = run("前※［＃「木＋吉」", &opts()).unwrap_err();
        assert_eq!(err.kind, SpanKind::Gaiji);
        assert_eq!(err.offset, 1);
    }

    // ── Entities ────────────────────────────────────────────────────────

    #[test]
    fn entities_decoded_when_enabled() {
        let options = StripOptions {
            decode_entities: true,
            ..opts()
        };
        assert_eq!(run("A&amp;B&#12354;&#x3044;&nbsp;", &options).unwrap(), "A&Bあい\u{A0}");
        assert_eq!(ok("A&amp;B"), "A&amp;B");
        assert_eq!(run("A&unknown;B", &options).unwrap(), "A&unknown;B");
    }

    // ── Properties ──────────────────────────────────────────────────────

    const SAMPLES: &[&str] = &[
        "<p>雨<ruby>雨<rt>あめ</rt></ruby>が降る。</p>",
        "｜羅生門《らしょうもん》の下で雨やみを待っていた。",
        "※［＃「木＋吉」、第3水準1-85-67］梗［＃「梗」に傍点］\n二行目<br />",
        "<div class=\"main_text\"><ruby><rb>下人</rb><rp>（</rp><rt>げにん</rt><rp>）</rp></ruby>が</div>",
        "<!R>薔薇（ばら）\n<!-- c -->終",
    ];

    #[test]
    fn marker_free_text_is_unchanged() {
        for text in ["雨が降る。", "ただの文章です。\n二行目　全角空白", "1 < 2", "※印"] {
            assert_eq!(ok(text), text);
        }
    }

    #[test]
    fn strip_is_idempotent() {
        for sample in SAMPLES {
            let once = run(sample, &with_table()).unwrap();
            let twice = run(&once, &with_table()).unwrap();
            assert_eq!(once, twice, "sample: {sample}");
        }
    }

    #[test]
    fn markers_formed_by_excision_are_removed() {
        for (text, expected) in [
            ("<<b>p>本文", "本文"),
            ("［<br />＃改ページ］本文", "本文"),
            ("［《る》＃改ページ］本文", "本文"),
            ("［<!-- c -->＃底本：「<<i>p>」］本文", "本文"),
        ] {
            let once = run(text, &opts()).unwrap();
            assert_eq!(once, expected, "input: {text}");
            assert_eq!(run(&once, &opts()).unwrap(), once, "input: {text}");
        }
    }

    #[test]
    fn entities_are_decoded_once() {
        let options = StripOptions {
            decode_entities: true,
            ..opts()
        };
        assert_eq!(run("&lt;p&gt;本文", &options).unwrap(), "<p>本文");
    }

    #[test]
    fn span_lengths_account_for_output_length() {
        for sample in SAMPLES {
            let text = NormalizedText::from_unicode(sample, true);
            let scanned = scan(&text, &with_table()).unwrap();
            let removed: usize = scanned
                .spans
                .iter()
                .map(|s| text[s.start..s.end].chars().count())
                .sum();
            let substituted: usize = scanned
                .spans
                .iter()
                .filter_map(|s| s.substitute.as_ref())
                .map(|s| s.chars().count())
                .sum();
            let out = excise(&text, &scanned.spans);
            assert_eq!(
                out.chars().count(),
                text.char_count() - removed + substituted,
                "sample: {sample}"
            );
        }
    }

    #[test]
    fn spans_are_sorted_and_disjoint() {
        for sample in SAMPLES {
            let scanned = scan(sample, &with_table()).unwrap();
            for pair in scanned.spans.windows(2) {
                assert!(pair[0].end <= pair[1].start, "{:?} overlaps {:?}", pair[0], pair[1]);
            }
            assert_eq!(scanned.stats.spans_removed, scanned.spans.len());
        }
    }
}
