//! Markdown to document tree
//!
//! Tokenizes with pulldown-cmark and turns each token into a [`Fragment`]
//! that the registry's spec for that node type converts into a node.
//! Fragments a spec rejects, and constructs no spec is registered for,
//! degrade to plain text so the rest of the document stays usable.

use std::borrow::Cow;
use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::model::node::{AttrValue, Attrs, BuiltinKind, Mark, Node, NodeType};
use crate::model::registry::{Fragment, FragmentLevel, NodeTypeRegistry};
use crate::model::tree::DocumentTree;

use super::{Diagnostic, FragmentError, ParseOutcome};

/// Tokenizer options shared by every pass over the source
pub(crate) fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// A node under construction
struct Frame {
    node_type: NodeType,
    level: FragmentLevel,
    range: Range<usize>,
    attrs: Attrs,
    children: Vec<Node>,
    /// Literal buffer for code block bodies and image alt text
    text: Option<String>,
    marks: Vec<Mark>,
    /// Whether children arriving here are inline
    inline_content: bool,
}

/// A construct kept as one raw fragment, inner events ignored
struct Opaque {
    name: &'static str,
    level: FragmentLevel,
    range: Range<usize>,
    depth: usize,
}

struct TreeBuilder<'a> {
    registry: &'a NodeTypeRegistry,
    source: &'a str,
    blocks: Vec<Node>,
    stack: Vec<Frame>,
    marks: Vec<Mark>,
    opaque: Option<Opaque>,
    /// Text right after a task marker loses its separating space
    after_task_marker: bool,
    diagnostics: Vec<Diagnostic>,
}

/// Parse markdown into a tree using the given registry
pub(crate) fn parse(registry: &NodeTypeRegistry, source: &str) -> ParseOutcome {
    let mut builder = TreeBuilder {
        registry,
        source,
        blocks: Vec::new(),
        stack: Vec::new(),
        marks: Vec::new(),
        opaque: None,
        after_task_marker: false,
        diagnostics: Vec::new(),
    };

    for (event, range) in Parser::new_ext(source, parser_options()).into_offset_iter() {
        builder.event(event, range);
    }

    builder.finish()
}

/// Name given to tokenizer constructs no built-in kind covers
fn opaque_name(tag: &Tag<'_>) -> &'static str {
    match tag {
        Tag::Table(_) => "table",
        Tag::HtmlBlock => "html",
        Tag::FootnoteDefinition(_) => "footnote-definition",
        Tag::MetadataBlock(_) => "metadata",
        _ => "unsupported",
    }
}

impl<'a> TreeBuilder<'a> {
    fn event(&mut self, event: Event<'_>, range: Range<usize>) {
        if let Some(opaque) = self.opaque.as_mut() {
            match event {
                Event::Start(_) => opaque.depth += 1,
                Event::End(_) => {
                    opaque.depth -= 1;
                    if opaque.depth == 0 {
                        if let Some(opaque) = self.opaque.take() {
                            self.finish_opaque(opaque);
                        }
                    }
                }
                _ => {}
            }
            return;
        }

        if !matches!(
            event,
            Event::Text(_) | Event::TaskListMarker(_) | Event::Start(Tag::Paragraph)
        ) {
            self.after_task_marker = false;
        }

        match event {
            Event::Start(tag) => self.start(tag, range),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text, range),
            Event::Code(code) => {
                if !self.literal(&code) {
                    let mut marks = self.marks.clone();
                    marks.push(Mark::Code);
                    self.leaf(BuiltinKind::Text, range, Some(code.to_string()), marks);
                }
            }
            Event::SoftBreak => {
                if !self.literal(" ") {
                    self.leaf(BuiltinKind::Text, range, Some("\n".to_string()), self.marks.clone());
                }
            }
            Event::HardBreak => {
                if !self.literal(" ") {
                    self.leaf(BuiltinKind::HardBreak, range, None, Vec::new());
                }
            }
            Event::Rule => self.leaf(BuiltinKind::HorizontalRule, range, None, Vec::new()),
            Event::TaskListMarker(checked) => {
                if let Some(item) = self
                    .stack
                    .iter_mut()
                    .rev()
                    .find(|frame| frame.node_type == NodeType::Builtin(BuiltinKind::ListItem))
                {
                    item.attrs.insert("checked".to_string(), AttrValue::Bool(checked));
                }
                self.after_task_marker = true;
            }
            Event::Html(raw) | Event::InlineHtml(raw) => {
                tracing::debug!("Keeping inline HTML as text at {:?}", range);
                self.text(&raw, range);
            }
            _ => {
                let source = self.source;
                let raw = &source[range.clone()];
                tracing::debug!("Keeping unsupported inline syntax as text: {:?}", raw);
                self.text(raw, range);
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>, range: Range<usize>) {
        match tag {
            Tag::Paragraph => {
                self.open(BuiltinKind::Paragraph, FragmentLevel::Block, range, true);
            }
            Tag::Heading { level, .. } => {
                let frame = self.open(BuiltinKind::Heading, FragmentLevel::Block, range, true);
                frame.attrs.insert("level".to_string(), AttrValue::Int(level as i64));
            }
            Tag::BlockQuote(_) => {
                self.open(BuiltinKind::Blockquote, FragmentLevel::Block, range, false);
            }
            Tag::CodeBlock(kind) => {
                let frame = self.open(BuiltinKind::CodeBlock, FragmentLevel::Block, range, false);
                frame.text = Some(String::new());
                if let CodeBlockKind::Fenced(info) = kind {
                    let info = info.trim();
                    if !info.is_empty() {
                        frame.attrs.insert("language".to_string(), AttrValue::from(info));
                    }
                }
            }
            Tag::List(start) => {
                let frame = self.open(BuiltinKind::List, FragmentLevel::Block, range, false);
                frame.attrs.insert("ordered".to_string(), AttrValue::Bool(start.is_some()));
                if let Some(start) = start {
                    let start = i64::try_from(start).unwrap_or(i64::MAX);
                    frame.attrs.insert("start".to_string(), AttrValue::Int(start));
                }
            }
            Tag::Item => {
                self.open(BuiltinKind::ListItem, FragmentLevel::Block, range, false);
            }
            Tag::Emphasis => self.marks.push(Mark::Italic),
            Tag::Strong => self.marks.push(Mark::Bold),
            Tag::Strikethrough => self.marks.push(Mark::Strike),
            Tag::Link { dest_url, title, .. } => self.marks.push(Mark::Link {
                href: dest_url.to_string(),
                title: (!title.is_empty()).then(|| title.to_string()),
            }),
            Tag::Image { dest_url, title, .. } => {
                let marks = self.marks.clone();
                let frame = self.open(BuiltinKind::Image, FragmentLevel::Inline, range, false);
                frame.text = Some(String::new());
                frame.marks = marks;
                frame.attrs.insert("src".to_string(), AttrValue::from(dest_url.as_ref()));
                if !title.is_empty() {
                    frame.attrs.insert("title".to_string(), AttrValue::from(title.as_ref()));
                }
            }
            other => {
                self.opaque = Some(Opaque {
                    name: opaque_name(&other),
                    level: self.current_level(),
                    range,
                    depth: 1,
                });
            }
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                self.marks.pop();
            }
            _ => self.close(),
        }
    }

    fn open(&mut self, kind: BuiltinKind, level: FragmentLevel, range: Range<usize>, inline_content: bool) -> &mut Frame {
        self.stack.push(Frame {
            node_type: NodeType::Builtin(kind),
            level,
            range,
            attrs: Attrs::new(),
            children: Vec::new(),
            text: None,
            marks: Vec::new(),
            inline_content,
        });
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn close(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let source = self.source;
        let fragment = Fragment {
            node_type: frame.node_type,
            level: frame.level,
            source: &source[frame.range.clone()],
            range: frame.range,
            attrs: frame.attrs,
            children: frame.children,
            text: frame.text,
            marks: frame.marks,
        };
        if let Some(node) = self.build(fragment) {
            self.push(node);
        }
    }

    fn current_level(&self) -> FragmentLevel {
        match self.stack.last() {
            Some(frame) if frame.inline_content => FragmentLevel::Inline,
            _ => FragmentLevel::Block,
        }
    }

    /// Append to the innermost literal buffer (code body, alt text) if there is one
    fn literal(&mut self, text: &str) -> bool {
        match self.stack.last_mut().and_then(|frame| frame.text.as_mut()) {
            Some(buffer) => {
                buffer.push_str(text);
                true
            }
            None => false,
        }
    }

    fn text(&mut self, text: &str, range: Range<usize>) {
        let text = if std::mem::take(&mut self.after_task_marker) {
            text.trim_start()
        } else {
            text
        };
        if !self.literal(text) {
            self.leaf(BuiltinKind::Text, range, Some(text.to_string()), self.marks.clone());
        }
    }

    fn leaf(&mut self, kind: BuiltinKind, range: Range<usize>, text: Option<String>, marks: Vec<Mark>) {
        let level = match kind {
            BuiltinKind::HorizontalRule => FragmentLevel::Block,
            _ => FragmentLevel::Inline,
        };
        let source = self.source;
        let mut fragment = Fragment::new(NodeType::Builtin(kind), level, &source[range.clone()], range);
        fragment.text = text;
        fragment.marks = marks;
        if let Some(node) = self.build(fragment) {
            self.push(node);
        }
    }

    fn finish_opaque(&mut self, opaque: Opaque) {
        let raw = strip_container_prefixes(self.source, opaque.range.clone());
        let fragment = Fragment::new(
            NodeType::Extension(opaque.name.to_string()),
            opaque.level,
            &raw,
            opaque.range,
        );
        if let Some(node) = self.build(fragment) {
            self.push(node);
        }
    }

    /// Hand a fragment to its spec, degrading to plain text on failure
    fn build(&mut self, fragment: Fragment<'_>) -> Option<Node> {
        let registry = self.registry;
        let source = fragment.source;
        let range = fragment.range.clone();
        let level = fragment.level;

        let result = match registry.lookup(&fragment.node_type) {
            Ok(spec) => spec.parse_fragment(fragment).map_err(FragmentError::from),
            Err(unknown) => Err(FragmentError::from(unknown)),
        };

        match result {
            Ok(node) => Some(node),
            Err(error) => {
                tracing::warn!("Degrading fragment at {:?} to plain text: {}", range, error);
                self.diagnostics.push(Diagnostic { range, error });
                degrade(source, level)
            }
        }
    }

    fn push(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(frame) => frame.children.push(node),
            None => self.blocks.push(node),
        }
    }

    fn finish(mut self) -> ParseOutcome {
        if let Some(opaque) = self.opaque.take() {
            self.finish_opaque(opaque);
        }
        while !self.stack.is_empty() {
            self.close();
        }
        ParseOutcome {
            tree: DocumentTree::new(self.blocks),
            diagnostics: self.diagnostics,
        }
    }
}

/// Source of a raw block with the blockquote markers and list indentation
/// of its containers removed from every line after the first
fn strip_container_prefixes(source: &str, range: Range<usize>) -> Cow<'_, str> {
    let raw = &source[range.clone()];
    let line_start = source[..range.start].rfind('\n').map_or(0, |i| i + 1);
    let column = source[line_start..range.start].chars().count();
    if column == 0 || !raw.contains('\n') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    for (i, line) in raw.split_inclusive('\n').enumerate() {
        if i == 0 {
            out.push_str(line);
            continue;
        }
        let cut = line
            .char_indices()
            .take(column)
            .take_while(|(_, c)| matches!(c, ' ' | '>'))
            .last()
            .map_or(0, |(at, c)| at + c.len_utf8());
        out.push_str(&line[cut..]);
    }
    Cow::Owned(out)
}

/// Plain-text stand-in for a fragment that could not be built.
/// Line indentation is dropped, as paragraph continuation lines lose it anyway.
fn degrade(source: &str, level: FragmentLevel) -> Option<Node> {
    let text = source
        .trim_end_matches(['\r', '\n'])
        .lines()
        .map(str::trim_start)
        .collect::<Vec<_>>()
        .join("\n");
    if text.trim().is_empty() {
        return None;
    }
    match level {
        FragmentLevel::Block => Some(Node::paragraph(vec![Node::text(text)])),
        FragmentLevel::Inline => Some(Node::text(text)),
    }
}
