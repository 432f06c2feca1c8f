//! Document management for markdown notes

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::markdown::{Diagnostic, MarkdownCodec};
use crate::model::error::RenderError;
use crate::model::node::Node;
use crate::model::tree::DocumentTree;

use super::file_system;

/// A markdown note: optional front matter plus the parsed body
#[derive(Debug, Clone)]
pub struct Document {
    /// File path
    pub path: PathBuf,
    /// Raw front matter block, delimiters included, kept byte-for-byte
    front_matter: Option<String>,
    tree: DocumentTree,
    /// Insertion point: a block index in `0..=tree.len()`
    cursor: usize,
    /// Whether the document has unsaved changes
    pub modified: bool,
    /// Last modification time
    pub last_modified: Option<SystemTime>,
    /// Document metadata (front matter)
    pub metadata: DocumentMetadata,
}

/// Document metadata from front matter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub tags: Vec<String>,
}

impl Document {
    /// Create a new empty document
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            front_matter: None,
            tree: DocumentTree::default(),
            cursor: 0,
            modified: false,
            last_modified: None,
            metadata: DocumentMetadata::default(),
        }
    }

    /// Build a document from markdown text. The cursor starts at the end.
    pub fn parse(path: PathBuf, content: &str, codec: &MarkdownCodec) -> (Self, Vec<Diagnostic>) {
        let (front_matter, body) = split_front_matter(content);
        let metadata = front_matter
            .and_then(Self::parse_frontmatter)
            .unwrap_or_default();

        let outcome = codec.parse(body);
        for diagnostic in &outcome.diagnostics {
            tracing::warn!(
                "{}: kept bytes {:?} as text: {}",
                path.display(),
                diagnostic.range,
                diagnostic.error
            );
        }

        let document = Self {
            path,
            front_matter: front_matter.map(str::to_string),
            cursor: outcome.tree.len(),
            tree: outcome.tree,
            modified: false,
            last_modified: None,
            metadata,
        };
        (document, outcome.diagnostics)
    }

    /// Open a document from a file
    pub fn open(path: &Path, codec: &MarkdownCodec) -> Result<(Self, Vec<Diagnostic>)> {
        let content = file_system::read_text_file(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        let (mut document, diagnostics) = Self::parse(path.to_path_buf(), &content, codec);
        document.last_modified = std::fs::metadata(path).ok().and_then(|m| m.modified().ok());

        tracing::info!("Opened document: {} ({} blocks)", path.display(), document.tree.len());
        Ok((document, diagnostics))
    }

    /// Full markdown text: front matter followed by the serialized body
    pub fn to_markdown(&self, codec: &MarkdownCodec) -> Result<String, RenderError> {
        let body = codec.serialize(&self.tree)?;
        Ok(match &self.front_matter {
            Some(front) if body.is_empty() => front.clone(),
            Some(front) => format!("{front}\n{body}"),
            None => body,
        })
    }

    /// Save the document to disk and clear the modified flag
    pub fn save(&mut self, codec: &MarkdownCodec) -> Result<()> {
        let text = self
            .to_markdown(codec)
            .with_context(|| format!("Failed to serialize: {}", self.path.display()))?;
        file_system::write_text_file(&self.path, &text)
            .with_context(|| format!("Failed to save file: {}", self.path.display()))?;

        self.modified = false;
        self.last_modified = Some(SystemTime::now());
        tracing::info!("Saved document: {}", self.path.display());
        Ok(())
    }

    /// Get the document title (metadata title or filename without extension)
    pub fn title(&self) -> String {
        self.metadata.title.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Untitled".to_string())
        })
    }

    pub fn front_matter(&self) -> Option<&str> {
        self.front_matter.as_deref()
    }

    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor, clamped to the end of the document
    pub fn set_cursor(&mut self, index: usize) {
        self.cursor = index.min(self.tree.len());
    }

    /// Insert a top-level block. Returns the index actually used.
    pub fn insert_block(&mut self, index: usize, node: Node) -> usize {
        let index = self.tree.insert_block(index, node);
        if index <= self.cursor {
            self.cursor += 1;
        }
        self.modified = true;
        index
    }

    pub fn remove_block(&mut self, index: usize) -> Option<Node> {
        let removed = self.tree.remove_block(index)?;
        if index < self.cursor {
            self.cursor -= 1;
        }
        self.modified = true;
        Some(removed)
    }

    /// Parse simple `key: value` front matter
    fn parse_frontmatter(front_matter: &str) -> Option<DocumentMetadata> {
        let inner = front_matter
            .lines()
            .skip(1)
            .take_while(|line| !is_closing_fence(line));

        let mut metadata = DocumentMetadata::default();
        let mut found = false;
        for line in inner {
            if let Some((key, value)) = line.split_once(':') {
                let value = value.trim().trim_matches('"');
                match key.trim() {
                    "title" => {
                        metadata.title = Some(value.to_string()).filter(|t| !t.is_empty());
                        found = true;
                    }
                    "tags" => {
                        metadata.tags = value
                            .trim_matches(|c| c == '[' || c == ']')
                            .split(',')
                            .map(|s| s.trim().trim_matches('"').to_string())
                            .filter(|s| !s.is_empty())
                            .collect();
                        found = true;
                    }
                    _ => {}
                }
            }
        }
        found.then_some(metadata)
    }
}

fn is_closing_fence(line: &str) -> bool {
    let line = line.trim_end();
    line == "---" || line == "..."
}

/// Split leading `---` front matter from the body. The front matter keeps its closing newline.
fn split_front_matter(content: &str) -> (Option<&str>, &str) {
    let Some(first) = content.lines().next() else {
        return (None, content);
    };
    if first.trim_end() != "---" {
        return (None, content);
    }

    let mut offset = 0;
    for (i, line) in content.split_inclusive('\n').enumerate() {
        offset += line.len();
        if i > 0 && is_closing_fence(line.trim_end_matches(['\r', '\n'])) {
            return (Some(&content[..offset]), &content[offset..]);
        }
    }
    (None, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::BuiltinKind;

    const NOTE: &str = "---\ntitle: \"Test Document\"\ntags: [rust, markdown]\n---\n\n# Content here\n\nBody text.\n";

    #[test]
    fn test_parse_frontmatter() {
        let codec = MarkdownCodec::default();
        let (document, diagnostics) = Document::parse(PathBuf::from("note.md"), NOTE, &codec);
        assert!(diagnostics.is_empty());
        assert_eq!(document.metadata.title, Some("Test Document".to_string()));
        assert_eq!(document.metadata.tags, vec!["rust", "markdown"]);
        assert_eq!(document.title(), "Test Document");
        assert_eq!(document.tree().len(), 2);
        assert!(document.tree().blocks()[0].is(BuiltinKind::Heading));
    }

    #[test]
    fn test_front_matter_preserved() {
        let codec = MarkdownCodec::default();
        let (document, _) = Document::parse(PathBuf::from("note.md"), NOTE, &codec);
        assert_eq!(document.to_markdown(&codec).unwrap(), NOTE);
    }

    #[test]
    fn test_unterminated_front_matter_is_body() {
        assert_eq!(split_front_matter("---\nno end\n"), (None, "---\nno end\n"));
        assert_eq!(split_front_matter("plain"), (None, "plain"));
        assert_eq!(split_front_matter("---\na: b\n---\nrest"), (Some("---\na: b\n---\n"), "rest"));
    }

    #[test]
    fn test_title_falls_back_to_file_stem() {
        let document = Document::new(PathBuf::from("/notes/my note.md"));
        assert_eq!(document.title(), "my note");
    }

    #[test]
    fn test_cursor_tracks_edits() {
        let codec = MarkdownCodec::default();
        let (mut document, _) = Document::parse(PathBuf::from("n.md"), "a\n\nb\n", &codec);
        assert_eq!(document.cursor(), 2);

        document.set_cursor(1);
        document.insert_block(0, Node::horizontal_rule());
        assert_eq!(document.cursor(), 2);
        document.remove_block(0);
        assert_eq!(document.cursor(), 1);
        document.set_cursor(99);
        assert_eq!(document.cursor(), 2);
        assert!(document.modified);
    }

    #[test]
    fn test_open_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        std::fs::write(&path, "#  Title\n\n* item\n").unwrap();

        let codec = MarkdownCodec::default();
        let (mut document, _) = Document::open(&path, &codec).unwrap();
        assert!(document.last_modified.is_some());
        document.insert_block(2, Node::paragraph(vec![Node::text("added")]));
        document.save(&codec).unwrap();

        assert!(!document.modified);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# Title\n\n- item\n\nadded\n"
        );
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let codec = MarkdownCodec::default();
        assert!(Document::open(&dir.path().join("absent.md"), &codec).is_err());
    }
}
