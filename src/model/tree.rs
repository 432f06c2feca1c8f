//! The document tree: ordered top-level blocks owned by a single note

use serde::Serialize;

use super::node::{BuiltinKind, Node};

/// Structured representation of a note
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentTree {
    blocks: Vec<Node>,
}

impl DocumentTree {
    pub fn new(blocks: Vec<Node>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[Node] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Node> {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn push(&mut self, node: Node) {
        self.blocks.push(node);
    }

    /// Insert a block, clamping the index to the end. Returns the index used.
    pub fn insert_block(&mut self, index: usize, node: Node) -> usize {
        let index = index.min(self.blocks.len());
        self.blocks.insert(index, node);
        index
    }

    pub fn remove_block(&mut self, index: usize) -> Option<Node> {
        (index < self.blocks.len()).then(|| self.blocks.remove(index))
    }

    /// Depth-first iterator over every node in document order
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: self.blocks.iter().rev().collect(),
        }
    }

    /// All image nodes, block-level and inline
    pub fn images(&self) -> impl Iterator<Item = &Node> {
        self.walk().filter(|node| node.is(BuiltinKind::Image))
    }
}

/// Iterator returned by [`DocumentTree::walk`]
pub struct Walk<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().iter().rev());
        Some(node)
    }
}
