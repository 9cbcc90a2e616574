//! Structural field edits: names, omission, cleanup, order and author lists.

use std::collections::HashSet;

use crate::ast::{Segment, Value};
use crate::index::Index;
use crate::names::{join_name_list, NameToken};
use crate::warning::Warning;

use super::Transform;

/// Lowercases entry types and field names.
pub struct Lowercase;

impl Transform for Lowercase {
    fn name(&self) -> &'static str {
        "lowercase"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        for entry in index.entries() {
            let command = index.command(entry).to_lowercase();
            if command != index.command(entry) {
                index.set_command(entry, command);
            }
            for field in index.fields(entry) {
                let name = index.field(field).name.to_lowercase();
                if name != index.field(field).name {
                    index.rename_field(field, name);
                }
            }
        }
        Vec::new()
    }
}

/// Removes the named fields from every entry.
pub struct RemoveFields {
    fields: HashSet<String>,
}

impl RemoveFields {
    pub fn new<S: AsRef<str>>(fields: &[S]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.as_ref().to_lowercase()).collect(),
        }
    }
}

impl Transform for RemoveFields {
    fn name(&self) -> &'static str {
        "remove-fields"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        for entry in index.entries() {
            for field in index.fields(entry) {
                if self.fields.contains(&index.field(field).name.to_lowercase()) {
                    index.remove_field(field);
                }
            }
        }
        Vec::new()
    }
}

/// Removes fields whose rendered value is blank.
pub struct RemoveEmptyFields;

impl Transform for RemoveEmptyFields {
    fn name(&self) -> &'static str {
        "remove-empty-fields"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        for entry in index.entries() {
            for field in index.fields(entry) {
                if index.rendered_value(field).trim().is_empty() {
                    index.remove_field(field);
                }
            }
        }
        Vec::new()
    }
}

/// Keeps only the first occurrence of each field name within an entry.
pub struct RemoveDuplicateFields;

impl Transform for RemoveDuplicateFields {
    fn name(&self) -> &'static str {
        "remove-duplicate-fields"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        for entry in index.entries() {
            let mut seen = HashSet::new();
            for field in index.fields(entry) {
                if !seen.insert(index.field(field).name.to_lowercase()) {
                    index.remove_field(field);
                }
            }
        }
        Vec::new()
    }
}

/// Moves the listed fields to the front in list order. Other fields keep
/// their relative order after them.
pub struct SortFields {
    order: Vec<String>,
}

impl SortFields {
    pub fn new<S: AsRef<str>>(order: &[S]) -> Self {
        Self {
            order: order.iter().map(|f| f.as_ref().to_lowercase()).collect(),
        }
    }

    fn rank(&self, name: &str) -> usize {
        let name = name.to_lowercase();
        self.order
            .iter()
            .position(|f| *f == name)
            .unwrap_or(self.order.len())
    }
}

impl Transform for SortFields {
    fn name(&self) -> &'static str {
        "sort-fields"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        for entry in index.entries() {
            let mut fields = index.fields(entry);
            fields.sort_by_key(|id| self.rank(&index.field(*id).name));
            if fields != index.fields(entry) {
                index.set_fields(entry, fields);
            }
        }
        Vec::new()
    }
}

/// Truncates author and editor lists to `max` people followed by `others`.
pub struct MaxAuthors {
    max: usize,
}

impl MaxAuthors {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl Transform for MaxAuthors {
    fn name(&self) -> &'static str {
        "max-authors"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        for entry in index.entries() {
            for field in index.fields(entry) {
                let name = index.field(field).name.to_lowercase();
                if name != "author" && name != "editor" {
                    continue;
                }
                let names = index.name_list(field);
                if names.len() <= self.max {
                    continue;
                }
                let mut kept: Vec<NameToken> = names.into_iter().take(self.max).collect();
                kept.push(NameToken::Others);
                let text = join_name_list(&kept);
                let value = match index.field(field).value.as_single() {
                    Some(segment @ Segment::Quoted(_)) => Value::single(segment.with_text(text)),
                    _ => Value::braced(text),
                };
                if value != index.field(field).value {
                    index.set_value(field, value);
                }
            }
        }
        Vec::new()
    }
}
