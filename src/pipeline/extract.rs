//! Work-body selection: find the part of an Aozora HTML file that holds the
//! literary work itself.
//!
//! Standard Aozora files wrap the work in exactly one element with class
//! `main_text`; the bibliographic header and the colophon sit outside it.
//! Very old files have no such element, so the `<body>` is used instead, and
//! plain text with neither is taken whole. A file with two `main_text`
//! elements has an unexpected structure and is rejected.
//!
//! Tags are found with the same tokenizer the strip scanner uses, so
//! comments and `<script>`/`<style>` content never count.

use crate::error::MarkupError;
use crate::pipeline::annotation::SpanKind;
use crate::pipeline::strip::{
    find_ascii_ci, find_tag_end, markup_error, starts_tag, Tag, RAW_TEXT_TAGS,
};
use std::ops::Range;

const MAIN_TEXT_CLASS: &str = "main_text";

/// Tags of `text` in document order with their byte ranges.
///
/// Comments and raw-text element content are skipped. Iteration stops at
/// the first unterminated tag or comment; the scanner reports those.
fn tags(text: &str) -> impl Iterator<Item = (Range<usize>, Tag<'_>)> {
    let mut pos = 0usize;
    std::iter::from_fn(move || loop {
        let lt = pos + text.get(pos..)?.find('<')?;
        if !starts_tag(&text[lt + 1..]) {
            pos = lt + 1;
            continue;
        }
        if text[lt..].starts_with("<!--") {
            let close = text[lt + 4..].find("-->")?;
            pos = lt + 4 + close + 3;
            continue;
        }

        let gt = find_tag_end(text, lt + 1, text.len())?;
        let tag = Tag::parse(&text[lt..=gt]);
        pos = gt + 1;
        if RAW_TEXT_TAGS.contains(&tag.name.as_str()) && !tag.closing && !tag.self_closing {
            pos = find_ascii_ci(text, pos, text.len(), &format!("</{}", tag.name))?;
        }
        return Some((lt..gt + 1, tag));
    })
}

/// The open `main_text` element while its close is searched for.
struct MainText {
    start: usize,
    name: String,
    depth: usize,
    end: Option<usize>,
}

/// Byte range of `text` that holds the work body.
///
/// The `main_text` element is returned including its own tags, matched by
/// nesting depth of its element name. An unclosed or repeated `main_text`
/// element is a [`MarkupError`] of kind `tag`.
pub fn work_region(text: &str) -> Result<Range<usize>, MarkupError> {
    let mut main: Option<MainText> = None;
    let mut body_start = None;
    let mut body_end = None;

    for (range, tag) in tags(text) {
        if !tag.closing && tag.has_class(MAIN_TEXT_CLASS) {
            if main.is_some() {
                return Err(markup_error(text, range.start, SpanKind::Tag));
            }
            main = Some(MainText {
                start: range.start,
                name: tag.name.clone(),
                depth: 1,
                end: tag.self_closing.then_some(range.end),
            });
            continue;
        }

        if let Some(m) = main.as_mut().filter(|m| m.end.is_none() && m.name == tag.name) {
            if tag.closing {
                m.depth -= 1;
                if m.depth == 0 {
                    m.end = Some(range.end);
                }
            } else if !tag.self_closing {
                m.depth += 1;
            }
        }

        if tag.name == "body" {
            if !tag.closing && body_start.is_none() {
                body_start = Some(range.end);
            } else if tag.closing && body_start.is_some() && body_end.is_none() {
                body_end = Some(range.start);
            }
        }
    }

    if let Some(m) = main {
        return match m.end {
            Some(end) => Ok(m.start..end),
            None => Err(markup_error(text, m.start, SpanKind::Tag)),
        };
    }
    if let Some(start) = body_start {
        return Ok(start..body_end.unwrap_or(text.len()));
    }
    Ok(0..text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_main_text_division() {
        let html = concat!(
            "<body><h1 class=\"title\">羅生門</h1>",
            "<div class=\"main_text\">本文<div class=\"jisage_2\">字下げ</div>続き</div>",
            "<div class=\"bibliographical_information\">底本</div></body>"
        );
        let range = work_region(html).unwrap();
        let region = &html[range];
        assert!(region.starts_with("<div class=\"main_text\">"));
        assert!(region.ends_with("続き</div>"));
        assert!(!region.contains("底本"));
        assert!(!region.contains("羅生門"));
    }

    #[test]
    fn main_text_among_other_classes() {
        let html = "<body>頭<div class=\"text main_text\">本文</div>尾</body>";
        assert_eq!(
            &html[work_region(html).unwrap()],
            "<div class=\"text main_text\">本文</div>"
        );

        let html = "<body>頭<div class=\"main_text_header\">見出し</div>本文</body>";
        assert_eq!(
            &html[work_region(html).unwrap()],
            "頭<div class=\"main_text_header\">見出し</div>本文"
        );
    }

    #[test]
    fn close_tags_in_comments_and_scripts_do_not_count() {
        let html = "<div class=\"main_text\">本文<!-- </div> -->続き</div>尾";
        assert_eq!(
            &html[work_region(html).unwrap()],
            "<div class=\"main_text\">本文<!-- </div> -->続き</div>"
        );

        let html = "<div class=\"main_text\">本文<script>document.write('</div>')</script>続き</div>尾";
        assert!(html[work_region(html).unwrap()].ends_with("続き</div>"));
    }

    #[test]
    fn second_main_text_is_rejected() {
        let err =
            work_region("<div class=\"main_text\">一</div><div class=\"main_text\">二</div>")
                .unwrap_err();
        assert_eq!(err.kind, SpanKind::Tag);
        assert_eq!(err.offset, 30);
    }

    #[test]
    fn falls_back_to_body() {
        let html = "<html><head><title>題</title></head><body>本文</body></html>";
        assert_eq!(&html[work_region(html).unwrap()], "本文");
    }

    #[test]
    fn body_without_close_runs_to_end() {
        let html = "<head><title>題</title></head><body>本文";
        assert_eq!(&html[work_region(html).unwrap()], "本文");
    }

    #[test]
    fn plain_text_is_taken_whole() {
        let text = "雨が降る。";
        assert_eq!(work_region(text).unwrap(), 0..text.len());
    }

    #[test]
    fn unclosed_main_text_is_an_error() {
        let err = work_region("前<div class=\"main_text\">本文<div>入れ子</div>").unwrap_err();
        assert_eq!(err.kind, SpanKind::Tag);
        assert_eq!(err.offset, 1);
    }
}
