//! Image source handling
//!
//! Image `src` values are stored fully percent-decoded and written back
//! verbatim, so a file named `image 56.png` round-trips as
//! `![alt](image 56.png)` rather than `![alt](image%2056.png)`. Strict
//! CommonMark does not accept whitespace in a bare destination, so before
//! tokenizing we rewrite such images into the angle-bracket form the
//! tokenizer understands.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::OnceLock;

use pulldown_cmark::{Event, Parser, Tag};
use regex_lite::Regex;

use super::parser::parser_options;

/// Fully percent-decode an image destination
pub fn decode_src(raw: &str) -> String {
    let bytes = urlencoding::decode_binary(raw.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Emit a decoded `src` verbatim.
///
/// Only a literal `%` followed by two hex digits is written as `%25`, since
/// decoding on the next parse would otherwise turn it into another byte.
pub fn emit_src(src: &str) -> String {
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len());
    for (i, c) in src.char_indices() {
        let escapes_byte = c == '%'
            && bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
            && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
        if escapes_byte {
            out.push_str("%25");
        } else {
            out.push(c);
        }
    }
    out
}

fn verbatim_image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"!\[((?:[^\]\\\n]|\\.)*)\]\(([^()<>"\n]*[ \t][^()<>"\n]*?)((?:[ \t]+"(?:[^"\\\n]|\\.)*")?)\)"#,
        )
        .expect("verbatim image pattern is valid")
    })
}

/// Byte ranges of code spans, code blocks and raw HTML
fn literal_ranges(text: &str) -> Vec<Range<usize>> {
    Parser::new_ext(text, parser_options())
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Start(Tag::CodeBlock(_) | Tag::HtmlBlock)
            | Event::Code(_)
            | Event::Html(_)
            | Event::InlineHtml(_) => Some(range),
            _ => None,
        })
        .collect()
}

/// Rewrite `![alt](path with spaces)` into `![alt](<path with spaces>)` outside code
pub fn normalize_verbatim_images(text: &str) -> Cow<'_, str> {
    if !text.contains("![") {
        return Cow::Borrowed(text);
    }

    let mut literal: Option<Vec<Range<usize>>> = None;
    let mut out = String::new();
    let mut last = 0;

    for caps in verbatim_image_re().captures_iter(text) {
        let (Some(whole), Some(alt), Some(dest)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let dest_text = dest.as_str().trim();
        if !dest_text.contains(char::is_whitespace) {
            continue;
        }
        if whole.start() > 0 && text.as_bytes()[whole.start() - 1] == b'\\' {
            continue;
        }
        let literal = literal.get_or_insert_with(|| literal_ranges(text));
        if literal.iter().any(|r| r.start < whole.end() && whole.start() < r.end) {
            continue;
        }

        out.push_str(&text[last..whole.start()]);
        out.push_str("![");
        out.push_str(alt.as_str());
        out.push_str("](<");
        out.push_str(dest_text);
        out.push('>');
        if let Some(title) = caps.get(3) {
            out.push_str(title.as_str());
        }
        out.push(')');
        last = whole.end();
    }

    if last == 0 {
        return Cow::Borrowed(text);
    }
    out.push_str(&text[last..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_src() {
        assert_eq!(decode_src("image%2056.png"), "image 56.png");
        assert_eq!(decode_src("image 56.png"), "image 56.png");
        assert_eq!(decode_src("100%.png"), "100%.png");
        assert_eq!(decode_src("%E5%9B%BE.png"), "图.png");
    }

    #[test]
    fn test_emit_src_is_verbatim() {
        assert_eq!(emit_src("image 56.png"), "image 56.png");
        assert_eq!(emit_src("https://cdn.example.com/a.png"), "https://cdn.example.com/a.png");
        assert_eq!(emit_src("100% done.png"), "100% done.png");
        assert_eq!(emit_src("a%20b.png"), "a%2520b.png");
    }

    #[test]
    fn test_normalize_wraps_spaced_destination() {
        let text = "before ![alt](image 56.png) after";
        assert_eq!(normalize_verbatim_images(text), "before ![alt](<image 56.png>) after");
    }

    #[test]
    fn test_normalize_keeps_title() {
        let text = "![a](my pic.png \"Title\")";
        assert_eq!(normalize_verbatim_images(text), "![a](<my pic.png> \"Title\")");
    }

    #[test]
    fn test_normalize_leaves_standard_images() {
        let text = "![a](b.png \"t\") and ![c](d.png)";
        assert!(matches!(normalize_verbatim_images(text), Cow::Borrowed(_)));
    }

    #[test]
    fn test_normalize_skips_code() {
        let text = "`![a](b c)`\n\n```\n![a](b c)\n```\n";
        assert!(matches!(normalize_verbatim_images(text), Cow::Borrowed(_)));
    }

    #[test]
    fn test_normalize_skips_escaped() {
        let text = "\\![a](b c)";
        assert!(matches!(normalize_verbatim_images(text), Cow::Borrowed(_)));
    }
}
