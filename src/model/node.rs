//! Document tree nodes, attributes and inline marks

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use super::error::NodeError;

/// Built-in node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    Paragraph,
    Heading,
    List,
    ListItem,
    Blockquote,
    CodeBlock,
    HorizontalRule,
    Image,
    Text,
    HardBreak,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 10] = [
        BuiltinKind::Paragraph,
        BuiltinKind::Heading,
        BuiltinKind::List,
        BuiltinKind::ListItem,
        BuiltinKind::Blockquote,
        BuiltinKind::CodeBlock,
        BuiltinKind::HorizontalRule,
        BuiltinKind::Image,
        BuiltinKind::Text,
        BuiltinKind::HardBreak,
    ];

    /// Type name used in the registry and in serialized trees
    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::Paragraph => "paragraph",
            BuiltinKind::Heading => "heading",
            BuiltinKind::List => "list",
            BuiltinKind::ListItem => "list-item",
            BuiltinKind::Blockquote => "blockquote",
            BuiltinKind::CodeBlock => "code-block",
            BuiltinKind::HorizontalRule => "horizontal-rule",
            BuiltinKind::Image => "image",
            BuiltinKind::Text => "text",
            BuiltinKind::HardBreak => "hard-break",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Nodes that never own children
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            BuiltinKind::Text | BuiltinKind::Image | BuiltinKind::HardBreak | BuiltinKind::HorizontalRule
        )
    }

    /// Attribute schema for this kind
    pub fn schema(self) -> &'static [AttrSpec] {
        match self {
            BuiltinKind::Heading => HEADING_SCHEMA,
            BuiltinKind::List => LIST_SCHEMA,
            BuiltinKind::ListItem => LIST_ITEM_SCHEMA,
            BuiltinKind::CodeBlock => CODE_BLOCK_SCHEMA,
            BuiltinKind::Image => IMAGE_SCHEMA,
            _ => &[],
        }
    }
}

const HEADING_SCHEMA: &[AttrSpec] = &[AttrSpec::required("level", AttrKind::Int)];
const LIST_SCHEMA: &[AttrSpec] = &[
    AttrSpec::required("ordered", AttrKind::Bool),
    AttrSpec::optional("start", AttrKind::Int),
];
const LIST_ITEM_SCHEMA: &[AttrSpec] = &[AttrSpec::optional("checked", AttrKind::Bool)];
const CODE_BLOCK_SCHEMA: &[AttrSpec] = &[AttrSpec::optional("language", AttrKind::Str)];
const IMAGE_SCHEMA: &[AttrSpec] = &[
    AttrSpec::required("src", AttrKind::Str),
    AttrSpec::optional("alt", AttrKind::Str),
    AttrSpec::optional("title", AttrKind::Str),
];

/// Node type: a built-in kind or a registered extension name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeType {
    Builtin(BuiltinKind),
    Extension(String),
}

impl NodeType {
    /// Resolve a name, preferring built-in kinds
    pub fn from_name(name: &str) -> Self {
        BuiltinKind::from_name(name)
            .map(NodeType::Builtin)
            .unwrap_or_else(|| NodeType::Extension(name.to_string()))
    }

    pub fn name(&self) -> &str {
        match self {
            NodeType::Builtin(kind) => kind.name(),
            NodeType::Extension(name) => name,
        }
    }

    pub fn builtin(&self) -> Option<BuiltinKind> {
        match self {
            NodeType::Builtin(kind) => Some(*kind),
            NodeType::Extension(_) => None,
        }
    }
}

impl From<BuiltinKind> for NodeType {
    fn from(kind: BuiltinKind) -> Self {
        NodeType::Builtin(kind)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for NodeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Scalar kinds an attribute may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrKind {
    Str,
    Int,
    Bool,
}

/// Attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl AttrValue {
    pub fn kind(&self) -> AttrKind {
        match self {
            AttrValue::Bool(_) => AttrKind::Bool,
            AttrValue::Int(_) => AttrKind::Int,
            AttrValue::Str(_) => AttrKind::Str,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// Attribute map, ordered by key
pub type Attrs = BTreeMap<String, AttrValue>;

/// One entry of a node type's attribute schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrSpec {
    pub name: &'static str,
    pub kind: AttrKind,
    pub required: bool,
}

impl AttrSpec {
    pub const fn required(name: &'static str, kind: AttrKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: AttrKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// Check attributes against a schema: no unknown keys, required keys present, kinds match
pub fn validate_attrs(node_type: &str, schema: &[AttrSpec], attrs: &Attrs) -> Result<(), NodeError> {
    if let Some(key) = attrs.keys().find(|key| !schema.iter().any(|spec| spec.name == key.as_str())) {
        return Err(NodeError::UnknownAttribute {
            node_type: node_type.to_string(),
            attribute: key.clone(),
        });
    }

    for spec in schema {
        match attrs.get(spec.name) {
            None if spec.required => {
                return Err(NodeError::MissingAttribute {
                    node_type: node_type.to_string(),
                    attribute: spec.name.to_string(),
                });
            }
            Some(value) if value.kind() != spec.kind => {
                return Err(NodeError::AttributeKind {
                    node_type: node_type.to_string(),
                    attribute: spec.name.to_string(),
                    expected: spec.kind,
                    found: value.kind(),
                });
            }
            _ => {}
        }
    }

    Ok(())
}

/// Validate an image source: decoded, and emittable verbatim between parentheses
pub fn validate_src(src: &str) -> Result<(), NodeError> {
    let invalid = |reason| NodeError::InvalidSource {
        src: src.to_string(),
        reason,
    };

    if src.trim().is_empty() {
        return Err(invalid("empty"));
    }
    if src.chars().any(char::is_control) {
        return Err(invalid("contains control characters"));
    }
    if src.contains(['<', '>']) {
        return Err(invalid("contains angle brackets"));
    }

    let mut depth = 0usize;
    for c in src.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or_else(|| invalid("unbalanced parentheses"))?,
            _ => {}
        }
    }
    if depth != 0 {
        return Err(invalid("unbalanced parentheses"));
    }

    if src.trim() != src {
        return Err(invalid("leading or trailing whitespace"));
    }
    if src.contains(char::is_whitespace) && src.contains(['(', ')', '"']) {
        return Err(invalid("whitespace with parentheses or quotes"));
    }

    // The tokenizer resolves backslash escapes and entities inside destinations
    let bytes = src.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        let next = bytes.get(i + 1).copied();
        if b == b'\\' && next.is_some_and(|n| n.is_ascii_punctuation()) {
            return Err(invalid("contains a backslash escape"));
        }
        if b == b'&' && looks_like_entity(&bytes[i + 1..]) {
            return Err(invalid("contains a character reference"));
        }
    }

    Ok(())
}

fn looks_like_entity(rest: &[u8]) -> bool {
    let name = rest.iter().take_while(|b| b.is_ascii_alphanumeric() || **b == b'#').count();
    name > 0 && rest.get(name) == Some(&b';')
}

/// Inline formatting mark
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mark {
    Link {
        href: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Bold,
    Italic,
    Strike,
    Code,
}

impl Mark {
    /// Canonical nesting rank, outermost first
    pub fn rank(&self) -> u8 {
        match self {
            Mark::Link { .. } => 0,
            Mark::Bold => 1,
            Mark::Italic => 2,
            Mark::Strike => 3,
            Mark::Code => 4,
        }
    }
}

/// Sort marks canonically and keep one mark per rank (the last one given wins)
pub fn normalize_marks(marks: &mut Vec<Mark>) {
    let mut by_rank: BTreeMap<u8, Mark> = BTreeMap::new();
    for mark in marks.drain(..) {
        by_rank.insert(mark.rank(), mark);
    }
    marks.extend(by_rank.into_values());
}

/// A node in the document tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attrs: Attrs,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    marks: Vec<Mark>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<Node>,
}

impl Node {
    /// Build a built-in node, validating attributes and structure
    pub fn builtin(kind: BuiltinKind, attrs: Attrs, children: Vec<Node>) -> Result<Self, NodeError> {
        validate_attrs(kind.name(), kind.schema(), &attrs)?;

        if kind.is_leaf() && !children.is_empty() {
            return Err(NodeError::LeafWithChildren(kind.name().to_string()));
        }

        match kind {
            BuiltinKind::Heading => {
                let level = attrs.get("level").and_then(AttrValue::as_int).unwrap_or_default();
                if !(1..=6).contains(&level) {
                    return Err(NodeError::HeadingLevel(level));
                }
            }
            BuiltinKind::Image => {
                if let Some(src) = attrs.get("src").and_then(AttrValue::as_str) {
                    validate_src(src)?;
                }
            }
            _ => {}
        }

        Ok(Self {
            node_type: NodeType::Builtin(kind),
            attrs,
            marks: Vec::new(),
            text: None,
            children,
        })
    }

    /// Build an extension node; the schema comes from its registered spec
    pub(crate) fn extension(
        name: &str,
        schema: &[AttrSpec],
        attrs: Attrs,
        children: Vec<Node>,
    ) -> Result<Self, NodeError> {
        validate_attrs(name, schema, &attrs)?;
        Ok(Self {
            node_type: NodeType::Extension(name.to_string()),
            attrs,
            marks: Vec::new(),
            text: None,
            children,
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::marked_text(text, Vec::new())
    }

    pub fn marked_text(text: impl Into<String>, mut marks: Vec<Mark>) -> Self {
        normalize_marks(&mut marks);
        Self {
            node_type: NodeType::Builtin(BuiltinKind::Text),
            attrs: Attrs::new(),
            marks,
            text: Some(text.into()),
            children: Vec::new(),
        }
    }

    pub fn paragraph(children: Vec<Node>) -> Self {
        Self::container(BuiltinKind::Paragraph, Attrs::new(), children)
    }

    pub fn heading(level: u8, children: Vec<Node>) -> Result<Self, NodeError> {
        let mut attrs = Attrs::new();
        attrs.insert("level".to_string(), AttrValue::Int(i64::from(level)));
        Self::builtin(BuiltinKind::Heading, attrs, children)
    }

    pub fn blockquote(children: Vec<Node>) -> Self {
        Self::container(BuiltinKind::Blockquote, Attrs::new(), children)
    }

    pub fn list(ordered: bool, start: Option<u64>, items: Vec<Node>) -> Self {
        let mut attrs = Attrs::new();
        attrs.insert("ordered".to_string(), AttrValue::Bool(ordered));
        if let Some(start) = start.filter(|_| ordered) {
            attrs.insert("start".to_string(), AttrValue::Int(start.min(i64::MAX as u64) as i64));
        }
        Self::container(BuiltinKind::List, attrs, items)
    }

    pub fn list_item(checked: Option<bool>, children: Vec<Node>) -> Self {
        let mut attrs = Attrs::new();
        if let Some(checked) = checked {
            attrs.insert("checked".to_string(), AttrValue::Bool(checked));
        }
        Self::container(BuiltinKind::ListItem, attrs, children)
    }

    pub fn code_block(language: Option<&str>, code: impl Into<String>) -> Self {
        let mut attrs = Attrs::new();
        if let Some(language) = language.filter(|l| !l.is_empty()) {
            attrs.insert("language".to_string(), AttrValue::from(language));
        }
        let code = code.into();
        let children = if code.is_empty() {
            Vec::new()
        } else {
            vec![Node::text(code)]
        };
        Self::container(BuiltinKind::CodeBlock, attrs, children)
    }

    /// Image node; empty alt and title are stored as absent
    pub fn image(src: impl Into<String>, alt: Option<&str>, title: Option<&str>) -> Result<Self, NodeError> {
        let mut attrs = Attrs::new();
        attrs.insert("src".to_string(), AttrValue::Str(src.into()));
        if let Some(alt) = alt.filter(|a| !a.is_empty()) {
            attrs.insert("alt".to_string(), AttrValue::from(alt));
        }
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            attrs.insert("title".to_string(), AttrValue::from(title));
        }
        Self::builtin(BuiltinKind::Image, attrs, Vec::new())
    }

    pub fn hard_break() -> Self {
        Self::container(BuiltinKind::HardBreak, Attrs::new(), Vec::new())
    }

    pub fn horizontal_rule() -> Self {
        Self::container(BuiltinKind::HorizontalRule, Attrs::new(), Vec::new())
    }

    // Attributes are built by the caller from the kind's own schema.
    fn container(kind: BuiltinKind, attrs: Attrs, children: Vec<Node>) -> Self {
        Self {
            node_type: NodeType::Builtin(kind),
            attrs,
            marks: Vec::new(),
            text: None,
            children,
        }
    }

    /// Replace this node's marks (normalized to canonical order)
    pub fn with_marks(mut self, mut marks: Vec<Mark>) -> Self {
        normalize_marks(&mut marks);
        self.marks = marks;
        self
    }

    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    pub fn kind(&self) -> Option<BuiltinKind> {
        self.node_type.builtin()
    }

    pub fn is(&self, kind: BuiltinKind) -> bool {
        self.kind() == Some(kind)
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn str_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(AttrValue::as_str)
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn has_mark(&self, mark: &Mark) -> bool {
        self.marks.contains(mark)
    }

    /// Text content of a text node
    pub fn text_content(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn into_children(self) -> Vec<Node> {
        self.children
    }

    /// Concatenated text of this node and its descendants
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    fn append_text(&mut self, more: &str) {
        if let Some(text) = &mut self.text {
            text.push_str(more);
        }
    }
}

/// Merge adjacent text nodes carrying identical marks and drop empty ones
pub fn merge_adjacent_text(nodes: Vec<Node>) -> Vec<Node> {
    let mut merged: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if node.is(BuiltinKind::Text) {
            if node.text_content().map_or(true, str::is_empty) {
                continue;
            }
            if let Some(last) = merged.last_mut() {
                if last.is(BuiltinKind::Text) && last.marks == node.marks {
                    last.append_text(node.text_content().unwrap_or_default());
                    continue;
                }
            }
        }
        merged.push(node);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rejects_unknown_attribute() {
        let mut attrs = Attrs::new();
        attrs.insert("level".to_string(), AttrValue::Int(2));
        attrs.insert("anchor".to_string(), AttrValue::from("intro"));

        let err = Node::builtin(BuiltinKind::Heading, attrs, Vec::new()).unwrap_err();
        assert_eq!(
            err,
            NodeError::UnknownAttribute {
                node_type: "heading".to_string(),
                attribute: "anchor".to_string(),
            }
        );
    }

    #[test]
    fn test_heading_level_range() {
        assert!(Node::heading(1, Vec::new()).is_ok());
        assert!(Node::heading(6, Vec::new()).is_ok());
        assert_eq!(Node::heading(7, Vec::new()).unwrap_err(), NodeError::HeadingLevel(7));
        assert_eq!(Node::heading(0, Vec::new()).unwrap_err(), NodeError::HeadingLevel(0));
    }

    #[test]
    fn test_attribute_kind_mismatch() {
        let mut attrs = Attrs::new();
        attrs.insert("ordered".to_string(), AttrValue::from("yes"));
        let err = Node::builtin(BuiltinKind::List, attrs, Vec::new()).unwrap_err();
        assert!(matches!(err, NodeError::AttributeKind { expected: AttrKind::Bool, .. }));
    }

    #[test]
    fn test_missing_required_attribute() {
        let err = Node::builtin(BuiltinKind::Image, Attrs::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, NodeError::MissingAttribute { ref attribute, .. } if attribute == "src"));
    }

    #[test]
    fn test_leaf_rejects_children() {
        let mut attrs = Attrs::new();
        attrs.insert("src".to_string(), AttrValue::from("a.png"));
        let err = Node::builtin(BuiltinKind::Image, attrs, vec![Node::text("x")]).unwrap_err();
        assert_eq!(err, NodeError::LeafWithChildren("image".to_string()));
    }

    #[test]
    fn test_validate_src() {
        assert!(validate_src("image 56.png").is_ok());
        assert!(validate_src("https://cdn.example.com/a_(1).png").is_ok());
        assert!(validate_src("").is_err());
        assert!(validate_src("a\nb.png").is_err());
        assert!(validate_src("<a.png>").is_err());
        assert!(validate_src("a(.png").is_err());
        assert!(validate_src("my pic (1).png").is_err());
        assert!(validate_src("x \"y\".png").is_err());
        assert!(validate_src(" x.png").is_err());
        assert!(validate_src("x.png ").is_err());
        assert!(validate_src("a\\*b.png").is_err());
        assert!(validate_src("a&amp;b.png").is_err());
        assert!(validate_src("C:\\Users\\me.png").is_ok());
        assert!(validate_src("tom & jerry.png").is_ok());
    }

    #[test]
    fn test_image_drops_empty_alt_and_title() {
        let image = Node::image("a.png", Some(""), Some("")).unwrap();
        assert_eq!(image.attrs().len(), 1);
        assert_eq!(image.str_attr("src"), Some("a.png"));
    }

    #[test]
    fn test_marks_are_canonical() {
        let node = Node::marked_text("x", vec![Mark::Code, Mark::Italic, Mark::Bold, Mark::Italic]);
        assert_eq!(node.marks(), &[Mark::Bold, Mark::Italic, Mark::Code]);
    }

    #[test]
    fn test_merge_adjacent_text() {
        let merged = merge_adjacent_text(vec![
            Node::text("a"),
            Node::text("b"),
            Node::marked_text("c", vec![Mark::Bold]),
            Node::marked_text("d", vec![Mark::Bold]),
            Node::text(""),
            Node::text("e"),
        ]);
        assert_eq!(
            merged,
            vec![
                Node::text("ab"),
                Node::marked_text("cd", vec![Mark::Bold]),
                Node::text("e"),
            ]
        );
    }

    #[test]
    fn test_node_type_names() {
        for kind in BuiltinKind::ALL {
            assert_eq!(NodeType::from_name(kind.name()), NodeType::Builtin(kind));
        }
        assert_eq!(NodeType::from_name("table"), NodeType::Extension("table".to_string()));
    }
}
