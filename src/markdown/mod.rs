//! Markdown codec
//!
//! Parses markdown into a [`DocumentTree`] and serializes it back. All node
//! construction and rendering goes through the [`NodeTypeRegistry`].

pub mod escape;
pub mod image_src;
mod parser;
mod serializer;

use std::ops::Range;
use std::sync::Arc;

use thiserror::Error;

use crate::model::error::{ParseError, RenderError, UnknownNodeType};
use crate::model::registry::NodeTypeRegistry;
use crate::model::tree::DocumentTree;

use serializer::MarkdownWriter;

/// Why a fragment was kept as plain text
#[derive(Debug, Error)]
pub enum FragmentError {
    #[error(transparent)]
    UnknownNodeType(#[from] UnknownNodeType),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A recovered parse failure
#[derive(Debug)]
pub struct Diagnostic {
    /// Byte range of the fragment in the normalized source
    pub range: Range<usize>,
    pub error: FragmentError,
}

/// Result of parsing: the tree plus every fragment that had to be degraded
#[derive(Debug)]
pub struct ParseOutcome {
    pub tree: DocumentTree,
    pub diagnostics: Vec<Diagnostic>,
}

/// Markdown codec bound to a registry
#[derive(Debug, Clone)]
pub struct MarkdownCodec {
    registry: Arc<NodeTypeRegistry>,
}

impl MarkdownCodec {
    pub fn new(registry: Arc<NodeTypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.registry
    }

    /// Parse markdown text. Never fails: bad fragments become text and are reported.
    pub fn parse(&self, text: &str) -> ParseOutcome {
        let text = image_src::normalize_verbatim_images(text);
        parser::parse(&self.registry, &text)
    }

    /// Serialize a tree to markdown
    pub fn serialize(&self, tree: &DocumentTree) -> Result<String, RenderError> {
        MarkdownWriter::new(&self.registry).write_tree(tree)
    }

    /// Parse then serialize, yielding the canonical form of `text`
    pub fn round_trip(&self, text: &str) -> Result<String, RenderError> {
        self.serialize(&self.parse(text).tree)
    }
}

impl Default for MarkdownCodec {
    fn default() -> Self {
        Self::new(Arc::new(NodeTypeRegistry::standard()))
    }
}
