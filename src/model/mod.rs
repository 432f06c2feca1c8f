//! Document model: nodes, the node type registry and the document tree

pub mod error;
pub mod node;
pub mod registry;
pub mod specs;
pub mod tree;

pub use error::{NodeError, ParseError, RegistryError, RenderError, UnknownNodeType};
pub use node::{AttrKind, AttrSpec, AttrValue, Attrs, BuiltinKind, Mark, Node, NodeType};
pub use registry::{Fragment, FragmentLevel, NodeSpec, NodeTypeRegistry, RenderCx, Renderer};
pub use specs::RawBlockSpec;
pub use tree::DocumentTree;
