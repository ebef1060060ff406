//! Morphological analyzers: the word-boundary capability used by the
//! segment stage.
//!
//! An [`Analyzer`] receives the stripped text of one document and returns
//! the byte offsets of its word boundaries: the first offset is `0`, the
//! last is `text.len()`, and every offset in between sits on a grapheme
//! cluster boundary. The segment stage validates this contract, so a buggy
//! implementation surfaces as a segmentation error rather than split
//! characters in the output.
//!
//! Analyzers are shared across concurrently processed documents behind an
//! `Arc`, hence `Send + Sync`, and must not change after construction.
//!
//! Three implementations ship with the crate:
//!
//! | Analyzer | Name | Splits on |
//! |----------|------|-----------|
//! | [`PassThroughAnalyzer`] | `pass-through` | nothing (one token) |
//! | [`ScriptAnalyzer`] | `script` | changes of writing system |
//! | [`LexiconAnalyzer`] | `lexicon` | longest dictionary match, else script runs |

use crate::error::AnalyzerError;
use std::collections::HashSet;
use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

/// Name reported when no analyzer is configured.
pub const PASS_THROUGH_NAME: &str = "pass-through";

/// Word-boundary capability.
pub trait Analyzer: Send + Sync {
    /// Short identifier used in logs, statistics and errors.
    fn name(&self) -> &str;

    /// Boundary byte offsets for `text`, from `0` to `text.len()` inclusive.
    fn boundaries(&self, text: &str) -> Result<Vec<usize>, AnalyzerError>;
}

/// Treats the whole input as a single token.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughAnalyzer;

impl Analyzer for PassThroughAnalyzer {
    fn name(&self) -> &str {
        PASS_THROUGH_NAME
    }

    fn boundaries(&self, text: &str) -> Result<Vec<usize>, AnalyzerError> {
        if text.is_empty() {
            Ok(vec![0])
        } else {
            Ok(vec![0, text.len()])
        }
    }
}

// ── Script runs ──────────────────────────────────────────────────────────

/// Writing system of a grapheme, judged by its first code point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    Kanji,
    Hiragana,
    Katakana,
    Latin,
    Digit,
    Whitespace,
    Punctuation,
}

impl Script {
    pub fn of(c: char) -> Script {
        match c {
            c if c.is_whitespace() => Script::Whitespace,
            '\u{3041}'..='\u{309F}' => Script::Hiragana,
            '\u{30A0}'..='\u{30FF}' | '\u{31F0}'..='\u{31FF}' | '\u{FF66}'..='\u{FF9F}' => {
                Script::Katakana
            }
            '\u{3005}'..='\u{3007}'
            | '\u{3400}'..='\u{4DBF}'
            | '\u{4E00}'..='\u{9FFF}'
            | '\u{F900}'..='\u{FAFF}'
            | '\u{20000}'..='\u{3134F}' => Script::Kanji,
            c if c.is_numeric() => Script::Digit,
            c if c.is_alphabetic() => Script::Latin,
            _ => Script::Punctuation,
        }
    }

    fn of_grapheme(g: &str) -> Script {
        g.chars().next().map_or(Script::Punctuation, Script::of)
    }
}

/// Splits wherever the writing system changes.
///
/// Punctuation marks each form their own token; a prolonged sound mark
/// (`ー`) continues a preceding hiragana run. A dictionary-free
/// approximation: `雨が降る。` becomes `雨 が 降 る 。`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptAnalyzer;

impl ScriptAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Byte length of the script run starting at `start`.
    fn run_len(text: &str, start: usize) -> usize {
        let mut graphemes = text[start..].grapheme_indices(true);
        let Some((_, first)) = graphemes.next() else {
            return 0;
        };
        let script = Script::of_grapheme(first);
        if script == Script::Punctuation {
            return first.len();
        }
        for (i, g) in graphemes {
            let next = Script::of_grapheme(g);
            let continues = next == script
                || (script == Script::Hiragana && g.starts_with('ー'));
            if !continues {
                return i;
            }
        }
        text.len() - start
    }
}

impl Analyzer for ScriptAnalyzer {
    fn name(&self) -> &str {
        "script"
    }

    fn boundaries(&self, text: &str) -> Result<Vec<usize>, AnalyzerError> {
        let mut out = vec![0];
        let mut pos = 0;
        while pos < text.len() {
            pos += Self::run_len(text, pos);
            out.push(pos);
        }
        Ok(out)
    }
}

// ── Lexicon ──────────────────────────────────────────────────────────────

/// Greedy longest-match segmentation over a fixed word list.
///
/// Text no dictionary word starts at is covered by script runs, cut short
/// where a dictionary word begins.
#[derive(Debug, Clone, Default)]
pub struct LexiconAnalyzer {
    words: HashSet<String>,
    /// Longest entry, in grapheme clusters.
    max_graphemes: usize,
}

impl LexiconAnalyzer {
    /// Build from an iterator of words. Blank entries are ignored.
    pub fn from_words<S: AsRef<str>>(words: impl IntoIterator<Item = S>) -> Self {
        let words: HashSet<String> = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        let max_graphemes = words
            .iter()
            .map(|w| w.graphemes(true).count())
            .max()
            .unwrap_or(0);
        Self {
            words,
            max_graphemes,
        }
    }

    /// Parse a word list: one entry per line, extra tab-separated columns
    /// ignored, `#` starts a comment line.
    pub fn parse(list: &str) -> Self {
        Self::from_words(
            list.lines()
                .filter(|line| !line.trim_start().starts_with('#'))
                .filter_map(|line| line.split('\t').next()),
        )
    }

    /// Load a word list from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnalyzerError> {
        let path = path.as_ref();
        let list = std::fs::read_to_string(path).map_err(|e| {
            AnalyzerError::Unavailable(format!("cannot read lexicon '{}': {e}", path.display()))
        })?;
        let lexicon = Self::parse(&list);
        if lexicon.is_empty() {
            return Err(AnalyzerError::Unavailable(format!(
                "lexicon '{}' has no entries",
                path.display()
            )));
        }
        Ok(lexicon)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    /// Byte length of the longest entry starting at `start`, if any.
    fn longest_match(&self, text: &str, start: usize) -> Option<usize> {
        let mut ends: Vec<usize> = text[start..]
            .grapheme_indices(true)
            .take(self.max_graphemes)
            .map(|(i, g)| i + g.len())
            .collect();
        ends.reverse();
        ends.into_iter()
            .find(|&len| self.words.contains(&text[start..start + len]))
    }
}

impl Analyzer for LexiconAnalyzer {
    fn name(&self) -> &str {
        "lexicon"
    }

    fn boundaries(&self, text: &str) -> Result<Vec<usize>, AnalyzerError> {
        let mut out = vec![0];
        let mut pos = 0;
        while pos < text.len() {
            if let Some(len) = self.longest_match(text, pos) {
                pos += len;
                out.push(pos);
                continue;
            }

            let run_end = pos + ScriptAnalyzer::run_len(text, pos);
            let mut graphemes = text[pos..run_end].grapheme_indices(true).skip(1);
            let cut = graphemes
                .find(|&(i, _)| self.longest_match(text, pos + i).is_some())
                .map_or(run_end, |(i, _)| pos + i);
            pos = cut;
            out.push(pos);
        }
        Ok(out)
    }
}
