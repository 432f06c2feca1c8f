//! Document tree to markdown

use crate::model::error::RenderError;
use crate::model::node::{BuiltinKind, Mark, Node};
use crate::model::registry::{NodeTypeRegistry, RenderCx, Renderer};
use crate::model::tree::DocumentTree;

use super::escape::{code_span, escape_text, link_destination, link_title};

/// Renders nodes by dispatching each one to its registered spec
pub(crate) struct MarkdownWriter<'a> {
    registry: &'a NodeTypeRegistry,
}

impl<'a> MarkdownWriter<'a> {
    pub(crate) fn new(registry: &'a NodeTypeRegistry) -> Self {
        Self { registry }
    }

    /// Serialize a whole tree. Non-empty documents end with a newline.
    pub(crate) fn write_tree(&self, tree: &DocumentTree) -> Result<String, RenderError> {
        let mut out = self.render_blocks(tree.blocks())?;
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }

    fn render_node(&self, node: &Node, preceding: &[Node]) -> Result<String, RenderError> {
        let spec = self.registry.lookup(node.node_type())?;
        let cx = RenderCx {
            renderer: self,
            preceding,
        };
        spec.render_fragment(node, &cx)
    }
}

fn open_mark(mark: &Mark) -> &'static str {
    match mark {
        Mark::Link { .. } => "[",
        Mark::Bold => "**",
        Mark::Italic => "*",
        Mark::Strike => "~~",
        Mark::Code => "",
    }
}

fn close_mark(mark: &Mark) -> String {
    match mark {
        Mark::Link { href, title } => {
            let mut out = format!("]({}", link_destination(href));
            if let Some(title) = title {
                out.push(' ');
                out.push_str(&link_title(title));
            }
            out.push(')');
            out
        }
        Mark::Bold => "**".to_string(),
        Mark::Italic => "*".to_string(),
        Mark::Strike => "~~".to_string(),
        Mark::Code => String::new(),
    }
}

/// Split a string into leading whitespace, core and trailing whitespace
fn split_whitespace_edges(text: &str) -> (&str, &str, &str) {
    let core_start = text.len() - text.trim_start().len();
    let core_end = text.trim_end().len();
    if core_start >= core_end {
        return (text, "", "");
    }
    (&text[..core_start], &text[core_start..core_end], &text[core_end..])
}

/// Inline content of one node, ready to sit between mark delimiters
struct InlinePiece {
    marks: Vec<Mark>,
    lead: String,
    core: String,
    trail: String,
}

impl<'a> Renderer for MarkdownWriter<'a> {
    fn render_blocks(&self, nodes: &[Node]) -> Result<String, RenderError> {
        let mut parts = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            let rendered = self.render_node(node, &nodes[..i])?;
            if !rendered.is_empty() {
                parts.push(rendered);
            }
        }
        Ok(parts.join("\n\n"))
    }

    fn render_block(&self, node: &Node, preceding: &[Node]) -> Result<String, RenderError> {
        self.render_node(node, preceding)
    }

    fn render_inline(&self, nodes: &[Node]) -> Result<String, RenderError> {
        let mut out = String::new();
        let mut open: Vec<Mark> = Vec::new();
        // Whitespace held back so it lands outside any delimiter
        let mut pending = String::new();

        for node in nodes {
            let marks: Vec<Mark> = node
                .marks()
                .iter()
                .filter(|mark| **mark != Mark::Code)
                .cloned()
                .collect();

            let piece = if node.is(BuiltinKind::Text) {
                let text = node.text_content().unwrap_or_default();
                if text.is_empty() {
                    continue;
                }
                if node.has_mark(&Mark::Code) {
                    InlinePiece {
                        marks,
                        lead: String::new(),
                        core: code_span(text),
                        trail: String::new(),
                    }
                } else if text.trim().is_empty() {
                    // Whitespace alone cannot carry delimiters; close what it lacks and defer it
                    let keep = common_prefix(&open, &marks);
                    close_to(&mut out, &mut open, keep);
                    pending.push_str(text);
                    continue;
                } else {
                    let (lead, core, trail) = split_whitespace_edges(text);
                    InlinePiece {
                        marks,
                        lead: lead.to_string(),
                        core: escape_text(core),
                        trail: trail.to_string(),
                    }
                }
            } else {
                InlinePiece {
                    marks,
                    lead: String::new(),
                    core: self.render_node(node, &[])?,
                    trail: String::new(),
                }
            };

            let keep = common_prefix(&open, &piece.marks);
            close_to(&mut out, &mut open, keep);
            out.push_str(&pending);
            pending.clear();
            out.push_str(&piece.lead);
            for mark in &piece.marks[keep..] {
                if matches!(mark, Mark::Link { .. }) && out.ends_with('!') && !out.ends_with("\\!") {
                    // `![` would open an image
                    out.insert(out.len() - 1, '\\');
                }
                out.push_str(open_mark(mark));
                open.push(mark.clone());
            }
            out.push_str(&piece.core);
            pending.push_str(&piece.trail);
        }

        close_to(&mut out, &mut open, 0);
        Ok(out)
    }
}

fn common_prefix(open: &[Mark], marks: &[Mark]) -> usize {
    open.iter().zip(marks).take_while(|(a, b)| a == b).count()
}

/// Close open marks innermost first until `keep` remain
fn close_to(out: &mut String, open: &mut Vec<Mark>, keep: usize) {
    while open.len() > keep {
        if let Some(mark) = open.pop() {
            out.push_str(&close_mark(&mark));
        }
    }
}
