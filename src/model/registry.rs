//! Node type registry
//!
//! Maps node type names to their capability bundle: parsing a markup
//! fragment into a node, rendering a node back to markup, and the
//! attribute schema used for validation. Built-in kinds dispatch through a
//! static table; extension kinds live in an explicit name-keyed table.
//!
//! The registry is built once per session and then shared read-only.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use super::error::{NodeError, ParseError, RegistryError, RenderError, UnknownNodeType};
use super::node::{AttrSpec, Attrs, BuiltinKind, Mark, Node, NodeType};
use super::specs;

/// Whether a fragment sits in block or inline position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentLevel {
    Block,
    Inline,
}

/// A tokenized piece of markup handed to a spec for node construction
#[derive(Debug, Clone)]
pub struct Fragment<'a> {
    pub node_type: NodeType,
    pub level: FragmentLevel,
    /// Raw markup the fragment was tokenized from
    pub source: &'a str,
    pub range: Range<usize>,
    /// Attributes observed by the tokenizer (not yet validated)
    pub attrs: Attrs,
    pub children: Vec<Node>,
    /// Literal content: text runs, code block bodies, image alt text
    pub text: Option<String>,
    pub marks: Vec<Mark>,
}

impl<'a> Fragment<'a> {
    pub fn new(node_type: NodeType, level: FragmentLevel, source: &'a str, range: Range<usize>) -> Self {
        Self {
            node_type,
            level,
            source,
            range,
            attrs: Attrs::new(),
            children: Vec::new(),
            text: None,
            marks: Vec::new(),
        }
    }
}

/// Recursion hooks the serializer exposes to specs
pub trait Renderer {
    /// Render sibling block nodes separated by blank lines
    fn render_blocks(&self, nodes: &[Node]) -> Result<String, RenderError>;

    /// Render a single block node given the siblings that precede it
    fn render_block(&self, node: &Node, preceding: &[Node]) -> Result<String, RenderError>;

    /// Render inline content, opening and closing marks canonically
    fn render_inline(&self, nodes: &[Node]) -> Result<String, RenderError>;
}

/// Context passed to [`NodeSpec::render_fragment`]
pub struct RenderCx<'a> {
    pub renderer: &'a dyn Renderer,
    /// Siblings rendered before this node, in document order
    pub preceding: &'a [Node],
}

/// Capability bundle for one node type
pub trait NodeSpec: Send + Sync {
    /// Registered type name
    fn name(&self) -> &str;

    /// Attribute schema
    fn schema(&self) -> &[AttrSpec];

    /// Turn a tokenized fragment into a node
    fn parse_fragment(&self, fragment: Fragment<'_>) -> Result<Node, ParseError>;

    /// Render a node back to markup
    fn render_fragment(&self, node: &Node, cx: &RenderCx<'_>) -> Result<String, RenderError>;
}

/// Registry of node type specs
#[derive(Default)]
pub struct NodeTypeRegistry {
    extensions: HashMap<String, Arc<dyn NodeSpec>>,
}

impl NodeTypeRegistry {
    /// Registry with only the built-in kinds
    pub fn new() -> Self {
        Self {
            extensions: HashMap::new(),
        }
    }

    /// Built-in kinds plus the raw `table` block
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .extensions
            .insert("table".to_string(), Arc::new(specs::RawBlockSpec::new("table")));
        registry
    }

    /// Register an extension spec. Replaces an extension of the same name.
    pub fn register(&mut self, spec: Arc<dyn NodeSpec>) -> Result<(), RegistryError> {
        let name = spec.name().to_string();
        if BuiltinKind::from_name(&name).is_some() {
            return Err(RegistryError::ReservedName(name));
        }
        tracing::debug!("Registered node type: {}", name);
        self.extensions.insert(name, spec);
        Ok(())
    }

    /// Look up the spec for a node type
    pub fn lookup(&self, node_type: &NodeType) -> Result<&dyn NodeSpec, UnknownNodeType> {
        match node_type {
            NodeType::Builtin(kind) => Ok(specs::builtin_spec(*kind)),
            NodeType::Extension(name) => self
                .extensions
                .get(name)
                .map(|spec| spec.as_ref())
                .ok_or_else(|| UnknownNodeType(name.clone())),
        }
    }

    /// Look up by name
    pub fn lookup_name(&self, name: &str) -> Result<&dyn NodeSpec, UnknownNodeType> {
        self.lookup(&NodeType::from_name(name))
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.lookup_name(name).is_ok()
    }

    /// All registered type names, built-ins first
    pub fn type_names(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.extensions.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        BuiltinKind::ALL
            .iter()
            .map(|kind| kind.name())
            .chain(extensions)
            .collect()
    }

    /// Construct a node of a registered extension type, validating its attributes
    pub fn build_extension(&self, name: &str, attrs: Attrs, children: Vec<Node>) -> Result<Node, NodeError> {
        match self.lookup_name(name) {
            Ok(spec) if BuiltinKind::from_name(name).is_none() => {
                Node::extension(name, spec.schema(), attrs, children)
            }
            _ => Err(NodeError::NotAnExtension(name.to_string())),
        }
    }
}

impl std::fmt::Debug for NodeTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}
