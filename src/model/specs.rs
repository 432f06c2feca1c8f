//! Built-in node specs and the raw block extension

use crate::markdown::escape::{escape_info, escape_line_starts, escape_text, link_title};
use crate::markdown::image_src::{decode_src, emit_src};

use super::error::{ParseError, RenderError};
use super::node::{
    merge_adjacent_text, validate_src, AttrSpec, AttrKind, AttrValue, Attrs, BuiltinKind, Node, NodeType,
};
use super::registry::{Fragment, NodeSpec, RenderCx};

/// Static spec for a built-in kind
pub(crate) fn builtin_spec(kind: BuiltinKind) -> &'static dyn NodeSpec {
    match kind {
        BuiltinKind::Paragraph => &ParagraphSpec,
        BuiltinKind::Heading => &HeadingSpec,
        BuiltinKind::List => &ListSpec,
        BuiltinKind::ListItem => &ListItemSpec,
        BuiltinKind::Blockquote => &BlockquoteSpec,
        BuiltinKind::CodeBlock => &CodeBlockSpec,
        BuiltinKind::HorizontalRule => &HorizontalRuleSpec,
        BuiltinKind::Image => &ImageSpec,
        BuiltinKind::Text => &TextSpec,
        BuiltinKind::HardBreak => &HardBreakSpec,
    }
}

/// Paragraph from inline children. A lone unmarked image becomes a block image.
pub fn paragraph_or_image(children: Vec<Node>) -> Node {
    let mut children = merge_adjacent_text(children);
    if children.len() == 1 && children[0].is(BuiltinKind::Image) && children[0].marks().is_empty() {
        if let Some(image) = children.pop() {
            return image;
        }
    }
    Node::paragraph(children)
}

fn inline_kind(node: &Node) -> bool {
    matches!(
        node.kind(),
        Some(BuiltinKind::Text | BuiltinKind::Image | BuiltinKind::HardBreak)
    )
}

/// Wrap runs of inline nodes into paragraphs, leaving block nodes alone
fn wrap_inline_runs(children: Vec<Node>) -> Vec<Node> {
    let mut blocks = Vec::new();
    let mut run = Vec::new();
    for child in children {
        if inline_kind(&child) {
            run.push(child);
            continue;
        }
        if !run.is_empty() {
            blocks.push(paragraph_or_image(std::mem::take(&mut run)));
        }
        blocks.push(child);
    }
    if !run.is_empty() {
        blocks.push(paragraph_or_image(run));
    }
    blocks
}

fn node_error(kind: BuiltinKind) -> impl Fn(super::error::NodeError) -> RenderError {
    move |err| RenderError::unrenderable(kind.name(), err.to_string())
}

fn add_prefix(content: &str, first: &str, rest: &str) -> String {
    let mut out = String::with_capacity(content.len() + first.len());
    for (i, line) in content.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let prefix = if i == 0 { first } else { rest };
        if line.is_empty() {
            out.push_str(prefix.trim_end());
        } else {
            out.push_str(prefix);
            out.push_str(line);
        }
    }
    out
}

pub struct ParagraphSpec;

impl NodeSpec for ParagraphSpec {
    fn name(&self) -> &str {
        BuiltinKind::Paragraph.name()
    }

    fn schema(&self) -> &[AttrSpec] {
        BuiltinKind::Paragraph.schema()
    }

    fn parse_fragment(&self, fragment: Fragment<'_>) -> Result<Node, ParseError> {
        Ok(paragraph_or_image(fragment.children))
    }

    fn render_fragment(&self, node: &Node, cx: &RenderCx<'_>) -> Result<String, RenderError> {
        let inline = cx.renderer.render_inline(node.children())?;
        Ok(escape_line_starts(&inline))
    }
}

/// ATX headings hold one line: breaks become spaces
fn single_line(children: Vec<Node>) -> Vec<Node> {
    let children = children
        .into_iter()
        .map(|child| {
            if child.is(BuiltinKind::HardBreak) {
                return Node::text(" ");
            }
            let flattened = child
                .text_content()
                .filter(|text| text.contains('\n'))
                .map(|text| text.replace('\n', " "));
            match flattened {
                Some(text) => Node::marked_text(text, child.marks().to_vec()),
                None => child,
            }
        })
        .collect();
    merge_adjacent_text(children)
}

pub struct HeadingSpec;

impl NodeSpec for HeadingSpec {
    fn name(&self) -> &str {
        BuiltinKind::Heading.name()
    }

    fn schema(&self) -> &[AttrSpec] {
        BuiltinKind::Heading.schema()
    }

    fn parse_fragment(&self, fragment: Fragment<'_>) -> Result<Node, ParseError> {
        let children = single_line(fragment.children);
        Ok(Node::builtin(BuiltinKind::Heading, fragment.attrs, children)?)
    }

    fn render_fragment(&self, node: &Node, cx: &RenderCx<'_>) -> Result<String, RenderError> {
        let level = node
            .attr("level")
            .and_then(AttrValue::as_int)
            .filter(|level| (1..=6).contains(level))
            .ok_or_else(|| RenderError::unrenderable(self.name(), "missing or invalid level"))?;

        let mut out = "#".repeat(level as usize);
        let inline = cx.renderer.render_inline(&single_line(node.children().to_vec()))?;
        let mut content = inline.trim().to_string();
        // A trailing `#` run would be read as a closing sequence
        if content.ends_with('#') {
            content.insert(content.len() - 1, '\\');
        }
        if !content.is_empty() {
            out.push(' ');
            out.push_str(&content);
        }
        Ok(out)
    }
}

pub struct ListSpec;

impl ListSpec {
    fn is_ordered(node: &Node) -> bool {
        node.attr("ordered").and_then(AttrValue::as_bool).unwrap_or(false)
    }

    /// Consecutive sibling lists of the same kind alternate markers so they stay separate
    fn alternate(node: &Node, preceding: &[Node]) -> bool {
        let ordered = Self::is_ordered(node);
        let run = preceding
            .iter()
            .rev()
            .take_while(|sibling| sibling.is(BuiltinKind::List) && Self::is_ordered(sibling) == ordered)
            .count();
        run % 2 == 1
    }
}

impl NodeSpec for ListSpec {
    fn name(&self) -> &str {
        BuiltinKind::List.name()
    }

    fn schema(&self) -> &[AttrSpec] {
        BuiltinKind::List.schema()
    }

    fn parse_fragment(&self, fragment: Fragment<'_>) -> Result<Node, ParseError> {
        if let Some(stray) = fragment.children.iter().find(|child| !child.is(BuiltinKind::ListItem)) {
            return Err(ParseError::malformed(
                self.name(),
                format!("unexpected `{}` child", stray.node_type()),
            ));
        }
        Ok(Node::builtin(BuiltinKind::List, fragment.attrs, fragment.children)?)
    }

    fn render_fragment(&self, node: &Node, cx: &RenderCx<'_>) -> Result<String, RenderError> {
        let ordered = Self::is_ordered(node);
        let alternate = Self::alternate(node, cx.preceding);
        let start = node.attr("start").and_then(AttrValue::as_int).unwrap_or(1);

        let items = node.children();
        let mut rendered = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let marker = match (ordered, alternate) {
                (true, false) => format!("{}.", start + i as i64),
                (true, true) => format!("{})", start + i as i64),
                (false, false) => "-".to_string(),
                (false, true) => "*".to_string(),
            };
            let content = cx.renderer.render_block(item, &items[..i])?;
            if content.is_empty() {
                rendered.push(marker);
                continue;
            }
            let indent = " ".repeat(marker.len() + 1);
            rendered.push(add_prefix(&content, &format!("{marker} "), &indent));
        }
        Ok(rendered.join("\n"))
    }
}

pub struct ListItemSpec;

impl NodeSpec for ListItemSpec {
    fn name(&self) -> &str {
        BuiltinKind::ListItem.name()
    }

    fn schema(&self) -> &[AttrSpec] {
        BuiltinKind::ListItem.schema()
    }

    fn parse_fragment(&self, fragment: Fragment<'_>) -> Result<Node, ParseError> {
        let children = wrap_inline_runs(fragment.children);
        Ok(Node::builtin(BuiltinKind::ListItem, fragment.attrs, children)?)
    }

    fn render_fragment(&self, node: &Node, cx: &RenderCx<'_>) -> Result<String, RenderError> {
        let children = node.children();
        let mut out = String::new();
        for (i, child) in children.iter().enumerate() {
            let rendered = cx.renderer.render_block(child, &children[..i])?;
            if rendered.is_empty() {
                continue;
            }
            if !out.is_empty() {
                // A nested list directly under the item's text keeps the list tight
                let tight = child.is(BuiltinKind::List) && children[i - 1].is(BuiltinKind::Paragraph);
                out.push_str(if tight { "\n" } else { "\n\n" });
            }
            out.push_str(&rendered);
        }

        match node.attr("checked").and_then(AttrValue::as_bool) {
            Some(checked) => {
                let marker = if checked { "[x]" } else { "[ ]" };
                // The space after the marker is what makes an empty item a task
                Ok(if out.is_empty() {
                    format!("{marker} ")
                } else {
                    format!("{marker} {out}")
                })
            }
            None => Ok(out),
        }
    }
}

pub struct BlockquoteSpec;

impl NodeSpec for BlockquoteSpec {
    fn name(&self) -> &str {
        BuiltinKind::Blockquote.name()
    }

    fn schema(&self) -> &[AttrSpec] {
        BuiltinKind::Blockquote.schema()
    }

    fn parse_fragment(&self, fragment: Fragment<'_>) -> Result<Node, ParseError> {
        let children = wrap_inline_runs(fragment.children);
        Ok(Node::builtin(BuiltinKind::Blockquote, fragment.attrs, children)?)
    }

    fn render_fragment(&self, node: &Node, cx: &RenderCx<'_>) -> Result<String, RenderError> {
        let inner = cx.renderer.render_blocks(node.children())?;
        if inner.is_empty() {
            return Ok(">".to_string());
        }
        Ok(add_prefix(&inner, "> ", "> "))
    }
}

pub struct CodeBlockSpec;

impl CodeBlockSpec {
    fn longest_run(text: &str, c: char) -> usize {
        let mut longest = 0;
        let mut current = 0;
        for ch in text.chars() {
            if ch == c {
                current += 1;
                longest = longest.max(current);
            } else {
                current = 0;
            }
        }
        longest
    }
}

impl NodeSpec for CodeBlockSpec {
    fn name(&self) -> &str {
        BuiltinKind::CodeBlock.name()
    }

    fn schema(&self) -> &[AttrSpec] {
        BuiltinKind::CodeBlock.schema()
    }

    fn parse_fragment(&self, fragment: Fragment<'_>) -> Result<Node, ParseError> {
        let language = fragment.attrs.get("language").and_then(AttrValue::as_str);
        let node = Node::code_block(language, fragment.text.unwrap_or_default());
        Ok(node)
    }

    fn render_fragment(&self, node: &Node, _cx: &RenderCx<'_>) -> Result<String, RenderError> {
        let code = node.plain_text();
        let language = node.str_attr("language").unwrap_or_default();

        let fence_char = if language.contains('`') { '~' } else { '`' };
        let fence = fence_char
            .to_string()
            .repeat((Self::longest_run(&code, fence_char) + 1).max(3));

        let mut out = format!("{fence}{}\n", escape_info(language));
        out.push_str(&code);
        if !code.is_empty() && !code.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&fence);
        Ok(out)
    }
}

pub struct HorizontalRuleSpec;

impl NodeSpec for HorizontalRuleSpec {
    fn name(&self) -> &str {
        BuiltinKind::HorizontalRule.name()
    }

    fn schema(&self) -> &[AttrSpec] {
        BuiltinKind::HorizontalRule.schema()
    }

    fn parse_fragment(&self, _fragment: Fragment<'_>) -> Result<Node, ParseError> {
        Ok(Node::horizontal_rule())
    }

    fn render_fragment(&self, _node: &Node, _cx: &RenderCx<'_>) -> Result<String, RenderError> {
        Ok("---".to_string())
    }
}

/// Images keep `src` decoded and emit it verbatim: `![alt](image 56.png)`
pub struct ImageSpec;

impl NodeSpec for ImageSpec {
    fn name(&self) -> &str {
        BuiltinKind::Image.name()
    }

    fn schema(&self) -> &[AttrSpec] {
        BuiltinKind::Image.schema()
    }

    fn parse_fragment(&self, fragment: Fragment<'_>) -> Result<Node, ParseError> {
        let raw = fragment
            .attrs
            .get("src")
            .and_then(AttrValue::as_str)
            .ok_or_else(|| ParseError::malformed(self.name(), "missing destination"))?;
        let src = decode_src(raw);
        let alt = fragment.text.as_deref().map(str::trim);
        let title = fragment.attrs.get("title").and_then(AttrValue::as_str);

        let image = Node::image(src, alt, title)?;
        Ok(image.with_marks(fragment.marks))
    }

    fn render_fragment(&self, node: &Node, _cx: &RenderCx<'_>) -> Result<String, RenderError> {
        let src = node
            .str_attr("src")
            .ok_or_else(|| RenderError::unrenderable(self.name(), "missing src"))?;
        validate_src(src).map_err(node_error(BuiltinKind::Image))?;

        let alt = node.str_attr("alt").map(escape_text).unwrap_or_default();
        let mut out = format!("![{alt}]({}", emit_src(src));
        if let Some(title) = node.str_attr("title") {
            out.push(' ');
            out.push_str(&link_title(title));
        }
        out.push(')');
        Ok(out)
    }
}

pub struct TextSpec;

impl NodeSpec for TextSpec {
    fn name(&self) -> &str {
        BuiltinKind::Text.name()
    }

    fn schema(&self) -> &[AttrSpec] {
        BuiltinKind::Text.schema()
    }

    fn parse_fragment(&self, fragment: Fragment<'_>) -> Result<Node, ParseError> {
        Ok(Node::marked_text(fragment.text.unwrap_or_default(), fragment.marks))
    }

    fn render_fragment(&self, node: &Node, _cx: &RenderCx<'_>) -> Result<String, RenderError> {
        Ok(escape_text(node.text_content().unwrap_or_default()))
    }
}

pub struct HardBreakSpec;

impl NodeSpec for HardBreakSpec {
    fn name(&self) -> &str {
        BuiltinKind::HardBreak.name()
    }

    fn schema(&self) -> &[AttrSpec] {
        BuiltinKind::HardBreak.schema()
    }

    fn parse_fragment(&self, _fragment: Fragment<'_>) -> Result<Node, ParseError> {
        Ok(Node::hard_break())
    }

    fn render_fragment(&self, _node: &Node, _cx: &RenderCx<'_>) -> Result<String, RenderError> {
        Ok("\\\n".to_string())
    }
}

/// Extension spec that keeps a block's markup verbatim in a `source` attribute
pub struct RawBlockSpec {
    name: String,
}

impl RawBlockSpec {
    const SCHEMA: &'static [AttrSpec] = &[AttrSpec::required("source", AttrKind::Str)];

    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl NodeSpec for RawBlockSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &[AttrSpec] {
        Self::SCHEMA
    }

    fn parse_fragment(&self, fragment: Fragment<'_>) -> Result<Node, ParseError> {
        let source = fragment.source.trim_end_matches(['\r', '\n']);
        if source.trim().is_empty() {
            return Err(ParseError::malformed(&self.name, "empty block"));
        }
        let mut attrs = Attrs::new();
        attrs.insert("source".to_string(), AttrValue::from(source));
        Ok(Node::extension(&self.name, Self::SCHEMA, attrs, Vec::new())?)
    }

    fn render_fragment(&self, node: &Node, _cx: &RenderCx<'_>) -> Result<String, RenderError> {
        if node.node_type() != &NodeType::Extension(self.name.clone()) {
            return Err(RenderError::unrenderable(&self.name, "node type mismatch"));
        }
        node.str_attr("source")
            .map(str::to_string)
            .ok_or_else(|| RenderError::unrenderable(&self.name, "missing source"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::Mark;

    #[test]
    fn test_paragraph_promotes_lone_image() {
        let image = Node::image("a.png", Some("a"), None).unwrap();
        assert_eq!(paragraph_or_image(vec![image.clone()]), image);

        let linked = image.clone().with_marks(vec![Mark::Link {
            href: "https://example.com".to_string(),
            title: None,
        }]);
        assert!(paragraph_or_image(vec![linked]).is(BuiltinKind::Paragraph));
    }

    #[test]
    fn test_wrap_inline_runs() {
        let blocks = wrap_inline_runs(vec![
            Node::text("item"),
            Node::list(false, None, vec![Node::list_item(None, vec![Node::paragraph(vec![Node::text("x")])])]),
        ]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], Node::paragraph(vec![Node::text("item")]));
        assert!(blocks[1].is(BuiltinKind::List));
    }

    #[test]
    fn test_add_prefix_skips_trailing_space_on_empty_lines() {
        assert_eq!(add_prefix("a\n\nb", "> ", "> "), "> a\n>\n> b");
        assert_eq!(add_prefix("a\nb", "- ", "  "), "- a\n  b");
    }

    #[test]
    fn test_longest_backtick_run() {
        assert_eq!(CodeBlockSpec::longest_run("a ``` b `", '`'), 3);
        assert_eq!(CodeBlockSpec::longest_run("none", '`'), 0);
    }

    #[test]
    fn test_image_parse_decodes_src() {
        let mut fragment = Fragment::new(
            NodeType::Builtin(BuiltinKind::Image),
            crate::model::registry::FragmentLevel::Inline,
            "![x](image%2056.png)",
            0..20,
        );
        fragment.attrs.insert("src".to_string(), AttrValue::from("image%2056.png"));
        fragment.text = Some("x".to_string());

        let node = ImageSpec.parse_fragment(fragment).unwrap();
        assert_eq!(node.str_attr("src"), Some("image 56.png"));
        assert_eq!(node.str_attr("alt"), Some("x"));
    }

    #[test]
    fn test_raw_block_keeps_source() {
        let spec = RawBlockSpec::new("table");
        let fragment = Fragment::new(
            NodeType::Extension("table".to_string()),
            crate::model::registry::FragmentLevel::Block,
            "| a |\n|---|\n| 1 |\n",
            0..18,
        );
        let node = spec.parse_fragment(fragment).unwrap();
        assert_eq!(node.str_attr("source"), Some("| a |\n|---|\n| 1 |"));
    }
}
