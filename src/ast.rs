//! Lossless syntax tree for BibTeX documents.
//!
//! Nodes live in arenas owned by [`Document`] and are addressed by copyable
//! handles ([`NodeId`], [`FieldId`]). A field refers back to the block that
//! contains it through its `parent` handle; the handle never owns anything,
//! so the tree has a single owner and no reference cycles.
//!
//! Every piece of whitespace the parser skips is stored on the node that
//! follows or encloses it, which lets the renderer reproduce untouched input
//! byte for byte.

/// Handle to a top-level node of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Handle to a field stored in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(usize);

/// The bracket pair enclosing a block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// `@article{...}`
    Brace,
    /// `@article(...)`
    Paren,
}

impl Delimiter {
    pub fn open(self) -> char {
        match self {
            Delimiter::Brace => '{',
            Delimiter::Paren => '(',
        }
    }

    pub fn close(self) -> char {
        match self {
            Delimiter::Brace => '}',
            Delimiter::Paren => ')',
        }
    }
}

/// The `@command{` prefix shared by all blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockHeader {
    /// Command as written, e.g. `Article` or `string`.
    pub command: String,
    /// Whitespace between `@` and the command.
    pub post_at: String,
    /// Whitespace between the command and the opening delimiter.
    pub pre_open: String,
    pub delimiter: Delimiter,
}

impl BlockHeader {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            post_at: String::new(),
            pre_open: String::new(),
            delimiter: Delimiter::Brace,
        }
    }
}

/// A block made of `name = value` pairs: a bibliography entry or an
/// `@string` macro definition (which never carries a key).
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    /// Citation key. `None` when the entry has none.
    pub key: Option<String>,
    pub key_prefix: String,
    pub key_suffix: String,
    /// Whether a comma followed the key in the source.
    pub key_comma: bool,
    pub fields: Vec<FieldId>,
    /// Whether the last field was followed by a comma in the source.
    pub trailing_comma: bool,
    /// Whitespace before the closing delimiter.
    pub tail: String,
}

impl Block {
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header,
            key: None,
            key_prefix: String::new(),
            key_suffix: String::new(),
            key_comma: false,
            fields: Vec::new(),
            trailing_comma: false,
            tail: String::new(),
        }
    }
}

/// A block whose body is kept verbatim (`@preamble`, `@comment`).
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub header: BlockHeader,
    /// Everything between the delimiters.
    pub body: String,
}

/// A top-level node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Free text between blocks, including blank lines and comments.
    Text(String),
    Entry(Block),
    /// `@string{name = value}`
    Macro(Block),
    Preamble(RawBlock),
    Comment(RawBlock),
}

impl Node {
    /// Returns the field-bearing block of an entry or macro definition.
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Entry(block) | Node::Macro(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut Block> {
        match self {
            Node::Entry(block) | Node::Macro(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_entry(&self) -> Option<&Block> {
        match self {
            Node::Entry(block) => Some(block),
            _ => None,
        }
    }

    pub fn header(&self) -> Option<&BlockHeader> {
        match self {
            Node::Text(_) => None,
            Node::Entry(block) | Node::Macro(block) => Some(&block.header),
            Node::Preamble(raw) | Node::Comment(raw) => Some(&raw.header),
        }
    }

    pub fn header_mut(&mut self) -> Option<&mut BlockHeader> {
        match self {
            Node::Text(_) => None,
            Node::Entry(block) | Node::Macro(block) => Some(&mut block.header),
            Node::Preamble(raw) | Node::Comment(raw) => Some(&mut raw.header),
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, Node::Entry(_))
    }
}

/// One piece of a field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `{text}`
    Braced(String),
    /// `"text"`
    Quoted(String),
    /// A bare number or a macro reference.
    Bare(String),
}

impl Segment {
    /// The segment text without its delimiters.
    pub fn text(&self) -> &str {
        match self {
            Segment::Braced(text) | Segment::Quoted(text) | Segment::Bare(text) => text,
        }
    }

    pub fn is_literal(&self) -> bool {
        !matches!(self, Segment::Bare(_))
    }

    /// Replaces the text, keeping the delimiter style.
    pub fn with_text(&self, text: String) -> Segment {
        match self {
            Segment::Braced(_) => Segment::Braced(text),
            Segment::Quoted(_) => Segment::Quoted(text),
            Segment::Bare(_) => Segment::Bare(text),
        }
    }
}

/// A field value: one or more segments joined by `#`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub parts: Vec<Segment>,
    /// Raw text between consecutive parts, `#` included. Always one shorter
    /// than `parts`.
    pub joins: Vec<String>,
}

impl Value {
    pub fn single(segment: Segment) -> Self {
        Self {
            parts: vec![segment],
            joins: Vec::new(),
        }
    }

    /// A braced literal value.
    pub fn braced(text: impl Into<String>) -> Self {
        Self::single(Segment::Braced(text.into()))
    }

    pub fn bare(text: impl Into<String>) -> Self {
        Self::single(Segment::Bare(text.into()))
    }

    /// Returns the only segment when the value is not a concatenation.
    pub fn as_single(&self) -> Option<&Segment> {
        match self.parts.as_slice() {
            [segment] => Some(segment),
            _ => None,
        }
    }
}

/// A `name = value` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// The block this field belongs to.
    pub parent: NodeId,
    pub name: String,
    /// Whitespace before the name.
    pub prefix: String,
    /// Whitespace between the name and `=`.
    pub name_suffix: String,
    /// Whitespace between `=` and the value.
    pub value_prefix: String,
    pub value: Value,
    /// Whitespace between the value and the following comma.
    pub trailing: String,
}

/// An ordered BibTeX document owning every node and field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    nodes: Vec<Node>,
    fields: Vec<Field>,
    order: Vec<NodeId>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live top-level nodes in document order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.0]
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut Field {
        &mut self.fields[id.0]
    }

    /// Field-bearing block behind `id`, if it is an entry or macro.
    pub fn block(&self, id: NodeId) -> Option<&Block> {
        self.node(id).as_block()
    }

    pub fn block_mut(&mut self, id: NodeId) -> Option<&mut Block> {
        self.node_mut(id).as_block_mut()
    }

    /// Entry handles in document order.
    pub fn entries(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order
            .iter()
            .copied()
            .filter(|id| self.node(*id).is_entry())
    }

    /// Appends a node at the end of the document.
    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.order.push(id);
        id
    }

    /// Appends a field-bearing block and takes ownership of its fields,
    /// pointing each one at the new block.
    pub fn push_block(
        &mut self,
        block: Block,
        fields: Vec<Field>,
        wrap: fn(Block) -> Node,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let mut block = block;
        block.fields = fields
            .into_iter()
            .map(|mut field| {
                field.parent = id;
                self.alloc_field(field)
            })
            .collect();
        self.push(wrap(block))
    }

    /// Stores a field without attaching it to its parent's field list.
    pub fn alloc_field(&mut self, field: Field) -> FieldId {
        let id = FieldId(self.fields.len());
        self.fields.push(field);
        id
    }

    pub(crate) fn set_order(&mut self, order: Vec<NodeId>) {
        self.order = order;
    }

    pub(crate) fn detach(&mut self, id: NodeId) {
        self.order.retain(|node| *node != id);
    }

    /// Placeholder parent for fields that are not yet attached.
    pub(crate) fn unattached() -> NodeId {
        NodeId(usize::MAX)
    }
}
