//! Serializes a [`Document`] back to BibTeX.
//!
//! Two layouts are supported. With no indentation configured the stored
//! whitespace of every node is written back, so an untouched document renders
//! to its exact source. With an indentation the output is rebuilt in the
//! canonical layout:
//!
//! ```text
//! @article{key,
//!   title         = {A Title},
//!   year          = 2020
//! }
//! ```

use crate::ast::{Block, Delimiter, Document, Field, Node, RawBlock, Segment, Value};
use crate::options::TidyOptions;

/// Layout options for [`render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Field indentation. `None` keeps the source layout.
    pub indent: Option<String>,
    /// Column at which values start (0 disables alignment).
    pub align: usize,
    /// Column at which long values are wrapped.
    pub wrap: Option<usize>,
    pub blank_lines: bool,
    pub trailing_commas: bool,
    pub strip_comments: bool,
    pub tidy_comments: bool,
}

impl RenderOptions {
    /// Reproduces the source layout exactly.
    pub fn preserve() -> Self {
        Self {
            indent: None,
            align: 0,
            wrap: None,
            blank_lines: false,
            trailing_commas: false,
            strip_comments: false,
            tidy_comments: false,
        }
    }
}

impl From<&TidyOptions> for RenderOptions {
    fn from(options: &TidyOptions) -> Self {
        Self {
            indent: options.indent.map(|indent| indent.as_string()),
            align: options.align,
            wrap: options.wrap,
            blank_lines: options.blank_lines,
            trailing_commas: options.trailing_commas,
            strip_comments: options.strip_comments,
            tidy_comments: options.tidy_comments,
        }
    }
}

/// Renders a document.
///
/// # Arguments
///
/// * `doc` - The document to serialize
/// * `options` - Layout options
///
/// # Examples
///
/// ```
/// use bibtidy::{parse, render, RenderOptions};
///
/// let src = "@misc{k,  note = \"x\"}\n";
/// let doc = parse(src).unwrap();
/// assert_eq!(render(&doc, &RenderOptions::preserve()), src);
///
/// let options = RenderOptions { indent: Some("  ".into()), ..RenderOptions::preserve() };
/// assert_eq!(render(&doc, &options), "@misc{k,\n  note = \"x\"\n}\n");
/// ```
pub fn render(doc: &Document, options: &RenderOptions) -> String {
    let mut writer = Writer {
        doc,
        options,
        out: String::new(),
    };
    match &options.indent {
        Some(indent) => {
            writer.normalized(indent);
            let trimmed = writer.out.trim();
            if trimmed.is_empty() {
                String::new()
            } else {
                format!("{trimmed}\n")
            }
        }
        None => {
            writer.preserved();
            writer.out
        }
    }
}

struct Writer<'a> {
    doc: &'a Document,
    options: &'a RenderOptions,
    out: String,
}

impl Writer<'_> {
    /// Character column of the end of the output.
    fn column(&self) -> usize {
        match self.out.rfind('\n') {
            Some(newline) => self.out[newline + 1..].chars().count(),
            None => self.out.chars().count(),
        }
    }

    fn ensure_newline(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    // -------------------------------------------------------------------------
    // Source layout
    // -------------------------------------------------------------------------

    fn preserved(&mut self) {
        let doc = self.doc;
        for id in doc.order() {
            match doc.node(*id) {
                Node::Text(text) => {
                    if !self.options.strip_comments || text.trim().is_empty() {
                        self.out.push_str(text);
                    } else if text.contains('\n') {
                        self.out.push('\n');
                    }
                }
                Node::Entry(block) | Node::Macro(block) => self.preserved_block(block),
                Node::Comment(_) if self.options.strip_comments => {}
                Node::Preamble(raw) | Node::Comment(raw) => {
                    let header = &raw.header;
                    self.out.push('@');
                    self.out.push_str(&header.post_at);
                    self.out.push_str(&header.command);
                    self.out.push_str(&header.pre_open);
                    self.out.push(header.delimiter.open());
                    self.out.push_str(&raw.body);
                    self.out.push(header.delimiter.close());
                }
            }
        }
    }

    fn preserved_block(&mut self, block: &Block) {
        let header = &block.header;
        self.out.push('@');
        self.out.push_str(&header.post_at);
        self.out.push_str(&header.command);
        self.out.push_str(&header.pre_open);
        self.out.push(header.delimiter.open());
        self.out.push_str(&block.key_prefix);
        if let Some(key) = &block.key {
            self.out.push_str(key);
        }
        self.out.push_str(&block.key_suffix);
        if block.key_comma || (block.key.is_some() && !block.fields.is_empty()) {
            self.out.push(',');
        }
        let doc = self.doc;
        for (i, id) in block.fields.iter().enumerate() {
            let field = doc.field(*id);
            self.out.push_str(&field.prefix);
            self.out.push_str(&field.name);
            self.out.push_str(&field.name_suffix);
            self.out.push('=');
            self.out.push_str(&field.value_prefix);
            self.value(&field.value, false);
            self.out.push_str(&field.trailing);
            if i + 1 < block.fields.len() || block.trailing_comma {
                self.out.push(',');
            }
        }
        self.out.push_str(&block.tail);
        self.out.push(header.delimiter.close());
    }

    // -------------------------------------------------------------------------
    // Canonical layout
    // -------------------------------------------------------------------------

    fn normalized(&mut self, indent: &str) {
        let doc = self.doc;
        for id in doc.order() {
            match doc.node(*id) {
                Node::Text(text) => self.normalized_text(text),
                Node::Comment(_) if self.options.strip_comments => {}
                node => {
                    self.ensure_newline();
                    match node {
                        Node::Entry(block) => self.normalized_entry(block, indent),
                        Node::Macro(block) => self.normalized_macro(block),
                        Node::Preamble(raw) | Node::Comment(raw) => self.normalized_raw(raw),
                        Node::Text(_) => {}
                    }
                    self.out.push('\n');
                    if self.options.blank_lines {
                        self.out.push('\n');
                    }
                }
            }
        }
    }

    /// Free text between blocks. Blank text is dropped; comments keep their
    /// content, with a blank line before them kept unless comments are
    /// tidied.
    fn normalized_text(&mut self, text: &str) {
        if self.options.strip_comments {
            return;
        }
        let content = text.trim();
        if content.is_empty() {
            return;
        }
        self.ensure_newline();
        if !self.options.tidy_comments {
            let leading = &text[..text.len() - text.trim_start().len()];
            let blank_before = leading.matches('\n').count() >= 2;
            if blank_before && !self.out.is_empty() && !self.out.ends_with("\n\n") {
                self.out.push('\n');
            }
            let lines: Vec<&str> = content.lines().map(str::trim_end).collect();
            self.out.push_str(&lines.join("\n"));
        } else {
            self.out.push_str(content);
        }
        self.out.push('\n');
    }

    fn normalized_entry(&mut self, block: &Block, indent: &str) {
        self.out.push('@');
        self.out.push_str(&block.header.command);
        self.out.push('{');
        if let Some(key) = &block.key {
            self.out.push_str(key);
        }
        self.out.push(',');
        let doc = self.doc;
        let width = self.options.align.saturating_sub(1);
        for (i, id) in block.fields.iter().enumerate() {
            let field: &Field = doc.field(*id);
            self.out.push('\n');
            self.out.push_str(indent);
            self.out.push_str(&format!("{:<width$} = ", field.name));
            self.value(&field.value, true);
            if i + 1 < block.fields.len() || self.options.trailing_commas {
                self.out.push(',');
            }
        }
        self.out.push_str("\n}");
    }

    fn normalized_macro(&mut self, block: &Block) {
        self.out.push('@');
        self.out.push_str(&block.header.command.to_lowercase());
        self.out.push('{');
        let doc = self.doc;
        for (i, id) in block.fields.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            let field = doc.field(*id);
            self.out.push_str(&field.name);
            self.out.push_str(" = ");
            self.value(&field.value, true);
        }
        self.out.push('}');
    }

    fn normalized_raw(&mut self, raw: &RawBlock) {
        let delimiter: Delimiter = raw.header.delimiter;
        self.out.push('@');
        self.out.push_str(&raw.header.command.to_lowercase());
        self.out.push(delimiter.open());
        self.out.push_str(&raw.body);
        self.out.push(delimiter.close());
    }

    // -------------------------------------------------------------------------
    // Values
    // -------------------------------------------------------------------------

    fn value(&mut self, value: &Value, normalized: bool) {
        if let (Some(column), Some(segment)) = (self.options.wrap, value.as_single()) {
            if segment.is_literal() {
                self.wrapped(segment, column);
                return;
            }
        }
        for (i, part) in value.parts.iter().enumerate() {
            if i > 0 {
                match value.joins.get(i - 1) {
                    Some(join) if !normalized => self.out.push_str(join),
                    _ => self.out.push_str(" # "),
                }
            }
            self.segment(part);
        }
    }

    fn segment(&mut self, segment: &Segment) {
        match segment {
            Segment::Braced(text) => {
                self.out.push('{');
                self.out.push_str(text);
                self.out.push('}');
            }
            Segment::Quoted(text) => {
                self.out.push('"');
                self.out.push_str(text);
                self.out.push('"');
            }
            Segment::Bare(text) => self.out.push_str(text),
        }
    }

    /// Writes a literal with its words refilled to `limit` columns.
    /// Continuation lines start under the first character of the text.
    fn wrapped(&mut self, segment: &Segment, limit: usize) {
        let (open, close) = match segment {
            Segment::Quoted(_) => ('"', '"'),
            _ => ('{', '}'),
        };
        self.out.push(open);
        let start = self.column();
        let mut line = start;
        let words = split_words(segment.text());
        for (i, word) in words.iter().enumerate() {
            let len = word.chars().count();
            // The last word carries the closing delimiter.
            let closing = usize::from(i + 1 == words.len());
            if i > 0 {
                if line + 1 + len + closing > limit {
                    self.out.push('\n');
                    self.out.push_str(&" ".repeat(start));
                    line = start;
                } else {
                    self.out.push(' ');
                    line += 1;
                }
            }
            self.out.push_str(word);
            line += len;
        }
        self.out.push(close);
    }
}

/// Splits on whitespace outside braces that is not escaped by a backslash.
fn split_words(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        let breaks = c.is_whitespace() && depth == 0 && !escaped;
        escaped = c == '\\' && !escaped;
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if breaks {
            if let Some(s) = start.take() {
                words.push(&text[s..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        words.push(&text[s..]);
    }
    words
}
