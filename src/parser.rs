//! BibTeX parser.
//!
//! A recursive-descent scanner that turns source text into a lossless
//! [`Document`]. Whitespace around every delimiter is recorded on the node it
//! precedes, so an unmodified document renders back to the exact input.
//!
//! The parser is permissive at the top level: anything that is not a block
//! (comments, stray text, an `@` inside an e-mail address) becomes a
//! [`Node::Text`]. Inside a block it is strict, and structural problems are
//! reported as a [`ParseError`] with the line and column where they occur.

use thiserror::Error;

use crate::ast::{Block, BlockHeader, Delimiter, Document, Field, Node, RawBlock, Segment, Value};

/// What went wrong while parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("unterminated {0}")]
    Unterminated(&'static str),

    #[error("unexpected character '{found}', expected {expected}")]
    Unexpected { found: char, expected: &'static str },
}

/// A fatal syntax error with its 1-based position.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at line {line}, column {column}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: usize,
    pub column: usize,
}

/// Parses BibTeX source into a [`Document`].
///
/// # Arguments
///
/// * `input` - BibTeX text with `\n` line endings
///
/// # Returns
///
/// The document, or the first structural error encountered.
///
/// # Examples
///
/// ```
/// use bibtidy::parse;
///
/// let doc = parse("@article{key, title = {A Title}}").unwrap();
/// assert_eq!(doc.entries().count(), 1);
/// ```
pub fn parse(input: &str) -> Result<Document, ParseError> {
    Parser::new(input).parse_document()
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    doc: Document,
    text: String,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            doc: Document::new(),
            text: String::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.src[start..self.pos]
    }

    fn whitespace(&mut self) -> String {
        self.take_while(char::is_whitespace).to_string()
    }

    fn error_at(&self, at: usize, kind: ParseErrorKind) -> ParseError {
        let before = &self.src[..at];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(newline) => before[newline + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        };
        ParseError { kind, line, column }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.peek() {
            Some(found) => self.error_at(self.pos, ParseErrorKind::Unexpected { found, expected }),
            None => self.error_at(self.pos, ParseErrorKind::Unterminated("block")),
        }
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.doc.push(Node::Text(text));
        }
    }

    fn parse_document(mut self) -> Result<Document, ParseError> {
        while let Some(c) = self.peek() {
            if c == '@' && self.at_block_boundary() {
                let start = self.pos;
                if let Some(header) = self.block_header() {
                    if self.parse_block(header, start)? {
                        continue;
                    }
                    self.pos = start;
                }
            }
            self.text.push(c);
            self.pos += c.len_utf8();
        }
        self.flush_text();
        Ok(self.doc)
    }

    /// An `@` opens a block only at the start of input, right after another
    /// block, or after whitespace or a closing brace.
    fn at_block_boundary(&self) -> bool {
        if self.text.is_empty() {
            return true;
        }
        self.src[..self.pos]
            .chars()
            .next_back()
            .is_some_and(|prev| prev.is_whitespace() || prev == '}')
    }

    /// Reads `@command{` or `@command(`. Leaves the position untouched and
    /// returns `None` when the text at `@` is not a block.
    fn block_header(&mut self) -> Option<BlockHeader> {
        let rest = &self.src[self.pos + 1..];
        let (offset, open) = rest
            .char_indices()
            .find(|(_, c)| matches!(c, '{' | '(' | '=' | '#' | ',' | '}' | ')' | '[' | ']' | '@' | '"'))?;
        let delimiter = match open {
            '{' => Delimiter::Brace,
            '(' => Delimiter::Paren,
            _ => return None,
        };

        let raw = &rest[..offset];
        let command = raw.trim();
        if command.is_empty() || command.contains(char::is_whitespace) {
            return None;
        }

        let post_at = &raw[..raw.len() - raw.trim_start().len()];
        let pre_open = &raw[raw.trim_end().len()..];
        let header = BlockHeader {
            command: command.to_string(),
            post_at: post_at.to_string(),
            pre_open: pre_open.to_string(),
            delimiter,
        };
        self.pos += 1 + offset + 1;
        Some(header)
    }

    /// Parses the block opened by `header`. Returns `false` when the text
    /// turns out not to be an entry, leaving the caller to rewind.
    fn parse_block(&mut self, header: BlockHeader, start: usize) -> Result<bool, ParseError> {
        match header.command.to_ascii_lowercase().as_str() {
            "comment" => {
                let body = self.raw_body(header.delimiter, start)?;
                self.flush_text();
                self.doc.push(Node::Comment(RawBlock { header, body }));
            }
            "preamble" => {
                let body = self.raw_body(header.delimiter, start)?;
                self.flush_text();
                self.doc.push(Node::Preamble(RawBlock { header, body }));
            }
            "string" => {
                let Some((block, fields)) = self.field_block(header, false, start)? else {
                    return Ok(false);
                };
                self.flush_text();
                self.doc.push_block(block, fields, Node::Macro);
            }
            _ => {
                let Some((block, fields)) = self.field_block(header, true, start)? else {
                    return Ok(false);
                };
                self.flush_text();
                self.doc.push_block(block, fields, Node::Entry);
            }
        }
        Ok(true)
    }

    /// Reads a balanced body up to the closing delimiter.
    fn raw_body(&mut self, delimiter: Delimiter, start: usize) -> Result<String, ParseError> {
        let body_start = self.pos;
        let mut braces = 0usize;
        let mut parens = 0usize;
        loop {
            let at = self.pos;
            let c = self
                .bump()
                .ok_or_else(|| self.error_at(start, ParseErrorKind::Unterminated("block")))?;
            match (delimiter, c) {
                (_, '{') => braces += 1,
                (Delimiter::Brace, '}') if braces == 0 => {
                    return Ok(self.src[body_start..at].to_string());
                }
                (_, '}') => braces = braces.saturating_sub(1),
                (Delimiter::Paren, '(') if braces == 0 => parens += 1,
                (Delimiter::Paren, ')') if braces == 0 => {
                    if parens == 0 {
                        return Ok(self.src[body_start..at].to_string());
                    }
                    parens -= 1;
                }
                _ => {}
            }
        }
    }

    /// Reads the body of an entry or `@string` block.
    ///
    /// Returns `None` when the citation key is followed by anything other
    /// than `,`, `=` or the closing delimiter: such text (`me @ home{of the
    /// brave}`) was never an entry.
    fn field_block(
        &mut self,
        header: BlockHeader,
        keyed: bool,
        start: usize,
    ) -> Result<Option<(Block, Vec<Field>)>, ParseError> {
        let close = header.delimiter.close();
        let mut block = Block::new(header);
        let mut fields = Vec::new();
        let mut first_field = None;

        if keyed {
            let lead = self.whitespace();
            let token = self
                .take_while(|c| is_key_char(c, close))
                .to_string();
            let gap = self.whitespace();
            match self.peek() {
                Some('=') if !token.is_empty() => first_field = Some((lead, token, gap)),
                Some(',') => {
                    self.bump();
                    block.key = (!token.is_empty()).then_some(token);
                    block.key_prefix = lead;
                    block.key_suffix = gap;
                    block.key_comma = true;
                }
                Some(c) if c == close => {
                    self.bump();
                    block.key = (!token.is_empty()).then_some(token);
                    block.key_prefix = lead;
                    block.key_suffix = gap;
                    return Ok(Some((block, fields)));
                }
                Some(_) => return Ok(None),
                None => return Err(self.error_at(start, ParseErrorKind::Unterminated("entry"))),
            }
        }

        let mut had_comma = false;
        loop {
            let (prefix, name, gap) = match first_field.take() {
                Some(pending) => pending,
                None => {
                    let ws = self.whitespace();
                    match self.peek() {
                        Some(c) if c == close => {
                            self.bump();
                            block.tail = ws;
                            block.trailing_comma = had_comma && !fields.is_empty();
                            return Ok(Some((block, fields)));
                        }
                        None => {
                            return Err(self.error_at(start, ParseErrorKind::Unterminated("entry")))
                        }
                        Some(_) => {}
                    }
                    let name = self.take_while(is_name_char).to_string();
                    if name.is_empty() {
                        return Err(self.unexpected("field name"));
                    }
                    let gap = self.whitespace();
                    (ws, name, gap)
                }
            };

            let mut field = self.field_value(prefix, name, gap, start)?;
            let after = self.whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                    field.trailing = after;
                    fields.push(field);
                    had_comma = true;
                }
                Some(c) if c == close => {
                    self.bump();
                    fields.push(field);
                    block.tail = after;
                    block.trailing_comma = false;
                    return Ok(Some((block, fields)));
                }
                Some(_) => return Err(self.unexpected("',' or end of entry")),
                None => return Err(self.error_at(start, ParseErrorKind::Unterminated("entry"))),
            }
        }
    }

    /// Reads `= value` after a field name.
    fn field_value(
        &mut self,
        prefix: String,
        name: String,
        name_suffix: String,
        start: usize,
    ) -> Result<Field, ParseError> {
        match self.peek() {
            Some('=') => {
                self.bump();
            }
            Some(_) => return Err(self.unexpected("'=' after field name")),
            None => return Err(self.error_at(start, ParseErrorKind::Unterminated("entry"))),
        }
        let value_prefix = self.whitespace();
        let value = self.value(start)?;
        Ok(Field {
            parent: Document::unattached(),
            name,
            prefix,
            name_suffix,
            value_prefix,
            value,
            trailing: String::new(),
        })
    }

    /// Reads one or more segments joined by `#`.
    fn value(&mut self, start: usize) -> Result<Value, ParseError> {
        let mut parts = vec![self.segment(start)?];
        let mut joins = Vec::new();
        loop {
            let save = self.pos;
            let before = self.whitespace();
            if self.peek() != Some('#') {
                self.pos = save;
                break;
            }
            self.bump();
            let after = self.whitespace();
            joins.push(format!("{before}#{after}"));
            parts.push(self.segment(start)?);
        }
        Ok(Value { parts, joins })
    }

    fn segment(&mut self, start: usize) -> Result<Segment, ParseError> {
        match self.peek() {
            Some('{') => self.braced(),
            Some('"') => self.quoted(),
            Some(c) if is_bare_char(c) => Ok(Segment::Bare(self.take_while(is_bare_char).to_string())),
            Some(_) => Err(self.unexpected("field value")),
            None => Err(self.error_at(start, ParseErrorKind::Unterminated("entry"))),
        }
    }

    /// `{...}` with nested braces.
    fn braced(&mut self) -> Result<Segment, ParseError> {
        let start = self.pos;
        self.bump();
        let mut depth = 1usize;
        loop {
            match self.bump() {
                Some('{') => depth += 1,
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        let text = &self.src[start + 1..self.pos - 1];
                        return Ok(Segment::Braced(text.to_string()));
                    }
                }
                Some(_) => {}
                None => {
                    return Err(self.error_at(start, ParseErrorKind::Unterminated("braced value")))
                }
            }
        }
    }

    /// `"..."`; a quote inside a brace group does not end the value.
    fn quoted(&mut self) -> Result<Segment, ParseError> {
        let start = self.pos;
        self.bump();
        let mut depth = 0usize;
        loop {
            match self.bump() {
                Some('{') => depth += 1,
                Some('}') => depth = depth.saturating_sub(1),
                Some('"') if depth == 0 => {
                    let text = &self.src[start + 1..self.pos - 1];
                    return Ok(Segment::Quoted(text.to_string()));
                }
                Some(_) => {}
                None => {
                    return Err(self.error_at(start, ParseErrorKind::Unterminated("quoted value")))
                }
            }
        }
    }
}

fn is_key_char(c: char, close: char) -> bool {
    !c.is_whitespace() && c != close && !matches!(c, ',' | '=' | '{' | '}' | '"' | '#')
}

fn is_name_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '=' | ',' | '{' | '}' | '(' | ')' | '"' | '#')
}

fn is_bare_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '{' | '}' | '"' | '#' | ',' | '=' | '(' | ')')
}
