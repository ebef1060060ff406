//! Word segmentation: turn stripped text into tokens joined by spaces.
//!
//! The analyzer is the only potentially slow, blocking call in the pipeline.
//! It runs on tokio's blocking pool under [`tokio::time::timeout`]; when the
//! timeout fires the document fails with [`SegmentationError::Timeout`] and
//! the worker is detached (a synchronous analyzer cannot be interrupted).

use crate::analyzer::{Analyzer, PASS_THROUGH_NAME};
use crate::error::SegmentationError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

/// A maximal substring between two consecutive boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    text: &'a str,
}

impl<'a> Token<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }

    pub fn as_str(&self) -> &'a str {
        self.text
    }
}

/// Segment `text` with `analyzer`, or return it as one token when `None`.
///
/// Empty text yields a single empty token without calling the analyzer.
pub async fn segment<'a>(
    text: &'a str,
    analyzer: Option<&Arc<dyn Analyzer>>,
    timeout: Duration,
) -> Result<Vec<Token<'a>>, SegmentationError> {
    let Some(analyzer) = analyzer else {
        return Ok(vec![Token::new(text)]);
    };
    if text.is_empty() {
        return Ok(vec![Token::new(text)]);
    }

    let name = analyzer.name().to_string();
    let worker = Arc::clone(analyzer);
    let owned = text.to_string();
    let task = tokio::task::spawn_blocking(move || worker.boundaries(&owned));

    let boundaries = match tokio::time::timeout(timeout, task).await {
        Err(_) => {
            return Err(SegmentationError::Timeout {
                analyzer: name,
                timeout_ms: timeout.as_millis() as u64,
            })
        }
        Ok(Err(join)) => {
            return Err(SegmentationError::AnalyzerFailed {
                analyzer: name,
                detail: format!("worker terminated: {join}"),
            })
        }
        Ok(Ok(Err(e))) => {
            return Err(SegmentationError::AnalyzerFailed {
                analyzer: name,
                detail: e.to_string(),
            })
        }
        Ok(Ok(Ok(boundaries))) => boundaries,
    };

    validate_boundaries(text, &boundaries, &name)?;
    let tokens = tokens_from_boundaries(text, &boundaries);
    debug!("Analyzer '{}' produced {} tokens", name, tokens.len());
    Ok(tokens)
}

/// Check that `boundaries` partition `text` along grapheme clusters.
pub fn validate_boundaries(
    text: &str,
    boundaries: &[usize],
    analyzer: &str,
) -> Result<(), SegmentationError> {
    let invalid = |detail: String| SegmentationError::InvalidBoundaries {
        analyzer: analyzer.to_string(),
        detail,
    };

    match (boundaries.first(), boundaries.last()) {
        (Some(0), Some(&last)) if last == text.len() => {}
        (first, last) => {
            return Err(invalid(format!(
                "expected 0..{}, got {:?}..{:?}",
                text.len(),
                first,
                last
            )))
        }
    }

    if let Some(pair) = boundaries.windows(2).find(|w| w[0] >= w[1]) {
        return Err(invalid(format!(
            "offsets not strictly increasing: {} then {}",
            pair[0], pair[1]
        )));
    }

    let starts: Vec<usize> = text.grapheme_indices(true).map(|(i, _)| i).collect();
    let interior = boundaries.get(1..boundaries.len() - 1).unwrap_or(&[]);
    if let Some(bad) = interior.iter().find(|&&b| starts.binary_search(&b).is_err()) {
        return Err(invalid(format!("offset {bad} splits a character")));
    }
    Ok(())
}

/// Cut `text` at already validated boundaries.
pub fn tokens_from_boundaries<'a>(text: &'a str, boundaries: &[usize]) -> Vec<Token<'a>> {
    if boundaries.len() < 2 {
        return vec![Token::new(text)];
    }
    boundaries
        .windows(2)
        .map(|w| Token::new(&text[w[0]..w[1]]))
        .collect()
}

/// Join tokens with a single space, except next to existing whitespace.
pub fn join_tokens(tokens: &[Token<'_>]) -> String {
    let mut out = String::with_capacity(tokens.iter().map(|t| t.text.len() + 1).sum());
    for token in tokens {
        let needs_space = !out.is_empty()
            && !token.text.is_empty()
            && !out.ends_with(char::is_whitespace)
            && !token.text.starts_with(char::is_whitespace);
        if needs_space {
            out.push(' ');
        }
        out.push_str(token.text);
    }
    out
}

/// Name to report for an optional analyzer.
pub fn analyzer_name(analyzer: Option<&Arc<dyn Analyzer>>) -> &str {
    analyzer.map_or(PASS_THROUGH_NAME, |a| a.name())
}
