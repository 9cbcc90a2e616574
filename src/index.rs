//! Indexed view over a [`Document`] with memoized field values.
//!
//! Transforms never touch the document directly: every read goes through
//! [`Index::rendered_value`] (macro-expanded text, cached per field) and every
//! write goes through one of the mutation helpers, which invalidate exactly
//! the caches the edit can affect. A cached value is therefore never stale
//! once the editing call returns.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::ast::{Block, Document, Field, FieldId, Node, NodeId, Segment, Value};
use crate::names::{parse_name_list, NameToken};

/// Owns a document and the caches derived from it.
#[derive(Debug)]
pub struct Index {
    doc: Document,
    rendered: RefCell<HashMap<FieldId, String>>,
    names: RefCell<HashMap<FieldId, Vec<NameToken>>>,
    /// Lowercased macro name to defining field. Built on first use.
    macros: RefCell<Option<HashMap<String, FieldId>>>,
}

impl Index {
    pub fn new(doc: Document) -> Self {
        Self {
            doc,
            rendered: RefCell::new(HashMap::new()),
            names: RefCell::new(HashMap::new()),
            macros: RefCell::new(None),
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    /// Entry handles in current document order.
    pub fn entries(&self) -> Vec<NodeId> {
        self.doc.entries().collect()
    }

    /// The entry or macro block behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a field-bearing block. Handles obtained from
    /// [`Index::entries`] always are.
    pub fn block(&self, id: NodeId) -> &Block {
        self.doc
            .block(id)
            .unwrap_or_else(|| panic!("node {id:?} is not an entry"))
    }

    pub fn field(&self, id: FieldId) -> &Field {
        self.doc.field(id)
    }

    /// Snapshot of an entry's field handles, safe to iterate while editing.
    pub fn fields(&self, entry: NodeId) -> Vec<FieldId> {
        self.block(entry).fields.clone()
    }

    pub fn key(&self, entry: NodeId) -> Option<&str> {
        self.block(entry).key.as_deref()
    }

    pub fn command(&self, entry: NodeId) -> &str {
        &self.block(entry).header.command
    }

    /// First field of `entry` named `name`, compared case-insensitively.
    pub fn find_field(&self, entry: NodeId, name: &str) -> Option<FieldId> {
        self.block(entry)
            .fields
            .iter()
            .copied()
            .find(|id| self.doc.field(*id).name.eq_ignore_ascii_case(name))
    }

    /// Rendered value of the named field, if the entry has one.
    ///
    /// # Examples
    ///
    /// ```
    /// use bibtidy::{parse, Index};
    ///
    /// let doc = parse("@string{pub = \"ACM\"}\n@book{b, publisher = pub # \" Press\"}").unwrap();
    /// let index = Index::new(doc);
    /// let book = index.entries()[0];
    /// assert_eq!(index.lookup_rendered(book, "publisher").as_deref(), Some("ACM Press"));
    /// ```
    pub fn lookup_rendered(&self, entry: NodeId, name: &str) -> Option<String> {
        self.find_field(entry, name).map(|id| self.rendered_value(id))
    }

    /// Macro-expanded, concatenated text of a field value.
    pub fn rendered_value(&self, field: FieldId) -> String {
        if let Some(cached) = self.rendered.borrow().get(&field) {
            return cached.clone();
        }
        let mut visiting = Vec::new();
        let text = self.render_value(&self.doc.field(field).value, &mut visiting);
        self.rendered.borrow_mut().insert(field, text.clone());
        text
    }

    /// Parsed name list of an author-like field.
    pub fn name_list(&self, field: FieldId) -> Vec<NameToken> {
        if let Some(cached) = self.names.borrow().get(&field) {
            return cached.clone();
        }
        let names = parse_name_list(&self.rendered_value(field));
        self.names.borrow_mut().insert(field, names.clone());
        names
    }

    fn render_value(&self, value: &Value, visiting: &mut Vec<String>) -> String {
        let mut out = String::new();
        for part in &value.parts {
            match part {
                Segment::Braced(text) | Segment::Quoted(text) => out.push_str(text),
                Segment::Bare(name) => out.push_str(&self.expand_macro(name, visiting)),
            }
        }
        out
    }

    /// Expands a bare token. Numbers, undefined names and self-referencing
    /// macros render as written.
    fn expand_macro(&self, name: &str, visiting: &mut Vec<String>) -> String {
        let lower = name.to_lowercase();
        if visiting.contains(&lower) {
            return name.to_string();
        }
        let Some(definition) = self.macro_field(&lower) else {
            return name.to_string();
        };
        visiting.push(lower);
        let text = self.render_value(&self.doc.field(definition).value, visiting);
        visiting.pop();
        text
    }

    fn macro_field(&self, lower: &str) -> Option<FieldId> {
        let mut macros = self.macros.borrow_mut();
        let table = macros.get_or_insert_with(|| self.macro_table());
        table.get(lower).copied()
    }

    /// Later definitions of the same name win.
    fn macro_table(&self) -> HashMap<String, FieldId> {
        let mut table = HashMap::new();
        for id in self.doc.order() {
            if let Node::Macro(block) = self.doc.node(*id) {
                for field in &block.fields {
                    table.insert(self.doc.field(*field).name.to_lowercase(), *field);
                }
            }
        }
        table
    }

    // -------------------------------------------------------------------------
    // Cache invalidation
    // -------------------------------------------------------------------------

    /// Drops the cached values of `field`. Editing a macro definition can
    /// change any value in the document, so it clears everything.
    pub fn invalidate(&self, field: FieldId) {
        let parent = self.doc.field(field).parent;
        if matches!(self.doc.node(parent), Node::Macro(_)) {
            self.invalidate_all();
        } else {
            self.rendered.borrow_mut().remove(&field);
            self.names.borrow_mut().remove(&field);
        }
    }

    pub fn invalidate_all(&self) {
        self.rendered.borrow_mut().clear();
        self.names.borrow_mut().clear();
        self.macros.borrow_mut().take();
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Edits a value in place. `edit` returns whether it changed anything;
    /// caches are only dropped when it did.
    pub fn update_value(&mut self, field: FieldId, edit: impl FnOnce(&mut Value) -> bool) -> bool {
        let changed = edit(&mut self.doc.field_mut(field).value);
        if changed {
            self.invalidate(field);
        }
        changed
    }

    pub fn set_value(&mut self, field: FieldId, value: Value) {
        self.doc.field_mut(field).value = value;
        self.invalidate(field);
    }

    pub fn rename_field(&mut self, field: FieldId, name: impl Into<String>) {
        self.doc.field_mut(field).name = name.into();
        self.invalidate(field);
    }

    /// Detaches a field from its entry.
    pub fn remove_field(&mut self, field: FieldId) {
        self.invalidate(field);
        let parent = self.doc.field(field).parent;
        if let Some(block) = self.doc.block_mut(parent) {
            block.fields.retain(|id| *id != field);
        }
    }

    /// Appends a new field, laid out like the entry's last field.
    pub fn add_field(&mut self, entry: NodeId, name: impl Into<String>, value: Value) -> FieldId {
        let template = self.block(entry).fields.last().map(|id| self.doc.field(*id));
        let field = Field {
            parent: entry,
            name: name.into(),
            prefix: template.map_or_else(|| "\n  ".to_string(), |t| t.prefix.clone()),
            name_suffix: template.map_or_else(|| " ".to_string(), |t| t.name_suffix.clone()),
            value_prefix: template.map_or_else(|| " ".to_string(), |t| t.value_prefix.clone()),
            value,
            trailing: String::new(),
        };
        let id = self.doc.alloc_field(field);
        if let Some(block) = self.doc.block_mut(entry) {
            block.fields.push(id);
        }
        self.invalidate(id);
        id
    }

    /// Appends a copy of another entry's field.
    pub fn adopt_field(&mut self, entry: NodeId, source: FieldId) -> FieldId {
        let source = self.doc.field(source);
        let (name, value) = (source.name.clone(), source.value.clone());
        self.add_field(entry, name, value)
    }

    /// Replaces the field list of an entry, e.g. to reorder it.
    pub fn set_fields(&mut self, entry: NodeId, fields: Vec<FieldId>) {
        if let Some(block) = self.doc.block_mut(entry) {
            block.fields = fields;
        }
    }

    /// Removes a top-level node from the document, together with the blank
    /// text separating it from the previous node.
    pub fn remove_node(&mut self, id: NodeId) {
        if matches!(self.doc.node(id), Node::Macro(_)) {
            self.invalidate_all();
        }
        let order = self.doc.order();
        if let Some(pos) = order.iter().position(|node| *node == id) {
            if pos > 0 {
                let previous = order[pos - 1];
                if matches!(self.doc.node(previous), Node::Text(text) if text.trim().is_empty()) {
                    self.doc.detach(previous);
                }
            }
        }
        self.doc.detach(id);
    }

    /// Reorders the top-level nodes. `order` must be a permutation of the
    /// current order.
    pub fn set_order(&mut self, order: Vec<NodeId>) {
        debug_assert_eq!(order.len(), self.doc.order().len());
        self.doc.set_order(order);
        // Macro resolution follows document order.
        self.macros.borrow_mut().take();
        self.rendered.borrow_mut().clear();
        self.names.borrow_mut().clear();
    }

    pub fn set_key(&mut self, entry: NodeId, key: Option<String>) {
        if let Some(block) = self.doc.block_mut(entry) {
            block.key = key;
        }
    }

    /// Renames the `@command` of any block.
    pub fn set_command(&mut self, id: NodeId, command: impl Into<String>) {
        if let Some(header) = self.doc.node_mut(id).header_mut() {
            header.command = command.into();
        }
    }
}
