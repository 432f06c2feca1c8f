//! Error types for the document model and codec

use thiserror::Error;

use super::node::AttrKind;

/// Violations of a node type's attribute schema or structural rules
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Attribute key not declared by the type's schema
    #[error("unknown attribute `{attribute}` for node type `{node_type}`")]
    UnknownAttribute { node_type: String, attribute: String },

    /// Required attribute missing
    #[error("missing required attribute `{attribute}` for node type `{node_type}`")]
    MissingAttribute { node_type: String, attribute: String },

    /// Attribute present with the wrong scalar kind
    #[error("attribute `{attribute}` of `{node_type}` must be {expected:?}, got {found:?}")]
    AttributeKind {
        node_type: String,
        attribute: String,
        expected: AttrKind,
        found: AttrKind,
    },

    /// Heading level outside 1..=6
    #[error("heading level {0} out of range 1..=6")]
    HeadingLevel(i64),

    /// Image source that cannot be emitted verbatim
    #[error("invalid image source {src:?}: {reason}")]
    InvalidSource { src: String, reason: &'static str },

    /// Name is not a registered extension type
    #[error("`{0}` is not a registered extension type")]
    NotAnExtension(String),

    /// Leaf node given children
    #[error("node type `{0}` cannot have children")]
    LeafWithChildren(String),
}

/// Registry miss for a node type name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown node type `{0}`")]
pub struct UnknownNodeType(pub String);

/// A markup fragment the owning spec could not turn into a node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("malformed `{node_type}` fragment: {reason}")]
    Malformed { node_type: String, reason: String },
}

impl ParseError {
    pub fn malformed(node_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            node_type: node_type.into(),
            reason: reason.into(),
        }
    }
}

/// Failures while turning a tree back into markup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error(transparent)]
    UnknownNodeType(#[from] UnknownNodeType),

    #[error("cannot render `{node_type}`: {reason}")]
    Unrenderable { node_type: String, reason: String },
}

impl RenderError {
    pub fn unrenderable(node_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unrenderable {
            node_type: node_type.into(),
            reason: reason.into(),
        }
    }
}

/// Registration failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("node type name `{0}` is reserved for a built-in type")]
    ReservedName(String),
}
