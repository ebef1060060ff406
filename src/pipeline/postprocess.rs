//! Optional cleanup of the segmented text.
//!
//! Off by default: with it disabled, pass-through output is exactly the
//! stripped text. When enabled, every line loses its leading and trailing
//! whitespace (including the ideographic space U+3000 that Aozora uses for
//! paragraph indentation) and the whole text is trimmed.

/// Apply the `trim_whitespace` rules.
///
/// Rules (applied in order):
/// 1. Trim each line
/// 2. Trim the whole text
pub fn trim_whitespace(input: &str) -> String {
    let s = trim_lines(input);
    s.trim().to_string()
}

// ── Rule 1: Trim each line ──────────────────────────────────────────────────

fn trim_lines(input: &str) -> String {
    input
        .split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_lines_and_text() {
        assert_eq!(trim_whitespace("\n　雨 が 降る 。 \n　風\n\n"), "雨 が 降る 。\n風");
    }

    #[test]
    fn keeps_blank_lines_between_paragraphs() {
        assert_eq!(trim_whitespace("一\n \n二"), "一\n\n二");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(trim_whitespace(""), "");
        assert_eq!(trim_whitespace(" \n　"), "");
    }
}
