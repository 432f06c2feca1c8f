//! Escaping rules that keep literal text literal across a round trip

/// Escape inline syntax characters in a text run
pub fn escape_text(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());

    for (i, &c) in chars.iter().enumerate() {
        match c {
            '\\' | '`' | '*' | '[' | ']' | '<' | '&' | '~' | '|' => {
                out.push('\\');
                out.push(c);
            }
            '_' => {
                // Intraword underscores never open or close emphasis
                let prev = i.checked_sub(1).and_then(|p| chars.get(p));
                let next = chars.get(i + 1);
                let intraword = prev.is_some_and(|p| p.is_alphanumeric()) && next.is_some_and(|n| n.is_alphanumeric());
                if !intraword {
                    out.push('\\');
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out
}

/// Escape characters that would start a block construct at the beginning of a line
pub fn escape_line_starts(inline: &str) -> String {
    let mut out = String::with_capacity(inline.len());
    for (i, line) in inline.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&escape_line_start(line));
    }
    out
}

fn escape_line_start(line: &str) -> String {
    // Block markers may sit behind up to three spaces
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return line.to_string();
    }
    let (lead, rest) = line.split_at(indent);
    match rest.chars().next() {
        Some('#' | '-' | '+' | '=' | '>') => format!("{lead}\\{rest}"),
        Some(c) if c.is_ascii_digit() => {
            let digits = rest.chars().take_while(char::is_ascii_digit).count();
            match rest[digits..].chars().next() {
                Some('.' | ')') if digits <= 9 => format!("{lead}{}\\{}", &rest[..digits], &rest[digits..]),
                _ => line.to_string(),
            }
        }
        _ => line.to_string(),
    }
}

/// Escape a fenced code block info string
pub fn escape_info(info: &str) -> String {
    let mut out = String::with_capacity(info.len());
    for c in info.chars() {
        if matches!(c, '\\' | '&') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Render a code span with a backtick fence longer than any run inside
pub fn code_span(code: &str) -> String {
    let code = code.replace('\n', " ");
    if code.is_empty() {
        return String::new();
    }

    let mut longest = 0;
    let mut current = 0;
    for c in code.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    let fence = "`".repeat(longest + 1);

    let pad = code.starts_with('`')
        || code.ends_with('`')
        || (code.starts_with(' ') && code.ends_with(' ') && !code.trim().is_empty());
    if pad {
        format!("{fence} {code} {fence}")
    } else {
        format!("{fence}{code}{fence}")
    }
}

/// Link destination, wrapped in angle brackets when it cannot stand bare
pub fn link_destination(href: &str) -> String {
    let mut depth: i64 = 0;
    let mut balanced = true;
    for c in href.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    balanced = false;
                }
            }
            _ => {}
        }
    }
    balanced &= depth == 0;

    let needs_brackets = href.is_empty()
        || !balanced
        || href.chars().any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>');
    if needs_brackets {
        let inner = href.replace('<', "\\<").replace('>', "\\>");
        format!("<{inner}>")
    } else {
        href.to_string()
    }
}

/// Quoted link or image title
pub fn link_title(title: &str) -> String {
    format!("\"{}\"", title.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a *b* [c]"), "a \\*b\\* \\[c\\]");
        assert_eq!(escape_text("snake_case"), "snake_case");
        assert_eq!(escape_text("_lead"), "\\_lead");
        assert_eq!(escape_text("x < y & z"), "x \\< y \\& z");
        assert_eq!(escape_text("plain text."), "plain text.");
    }

    #[test]
    fn test_escape_line_starts() {
        assert_eq!(escape_line_starts("# not a heading"), "\\# not a heading");
        assert_eq!(escape_line_starts("a\n- b"), "a\n\\- b");
        assert_eq!(escape_line_starts("2024. A year"), "2024\\. A year");
        assert_eq!(escape_line_starts("2024 was"), "2024 was");
        assert_eq!(escape_line_starts("> quote"), "\\> quote");
        assert_eq!(escape_line_starts("fine"), "fine");
        assert_eq!(escape_line_starts("a\n   #"), "a\n   \\#");
        assert_eq!(escape_line_starts("  1. x"), "  1\\. x");
        assert_eq!(escape_line_starts("    - code"), "    - code");
    }

    #[test]
    fn test_escape_info() {
        assert_eq!(escape_info("rust"), "rust");
        assert_eq!(escape_info("\\<b>"), "\\\\<b>");
        assert_eq!(escape_info("a&amp;"), "a\\&amp;");
    }

    #[test]
    fn test_code_span() {
        assert_eq!(code_span("x"), "`x`");
        assert_eq!(code_span("a`b"), "``a`b``");
        assert_eq!(code_span("`tick"), "`` `tick ``");
        assert_eq!(code_span(" padded "), "`  padded  `");
    }

    #[test]
    fn test_link_destination() {
        assert_eq!(link_destination("https://example.com/a_(b)"), "https://example.com/a_(b)");
        assert_eq!(link_destination("my file.md"), "<my file.md>");
        assert_eq!(link_destination(""), "<>");
        assert_eq!(link_destination("a)"), "<a)>");
    }

    #[test]
    fn test_link_title() {
        assert_eq!(link_title("say \"hi\""), "\"say \\\"hi\\\"\"");
    }
}
