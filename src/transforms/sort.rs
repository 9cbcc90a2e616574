//! Entry sorting.
//!
//! Entries move together with the comments and blank text that precede them.
//! Text after the last entry stays at the end of the document.

use std::cmp::Ordering;

use crate::ast::{Node, NodeId};
use crate::index::Index;
use crate::options::SortKey;
use crate::warning::Warning;

use super::Transform;

/// Entry types that other entries build on and that BibTeX wants early.
const SPECIAL_TYPES: &[&str] = &["set", "xdata"];

/// Stable multi-key sort over entries.
pub struct SortEntries {
    keys: Vec<SortKey>,
    special: bool,
}

impl SortEntries {
    pub fn new(keys: Vec<SortKey>) -> Self {
        let special = keys.iter().any(|k| k.field == "special");
        let keys = keys.into_iter().filter(|k| k.field != "special").collect();
        Self { keys, special }
    }

    fn sort_value(&self, index: &Index, entry: NodeId, key: &SortKey) -> Option<String> {
        match key.field.as_str() {
            "key" => index.key(entry).map(str::to_lowercase),
            "type" => Some(index.command(entry).to_lowercase()),
            field => index.lookup_rendered(entry, field).map(|v| v.to_lowercase()),
        }
    }
}

/// A sortable run of nodes ending in a block.
struct Unit {
    nodes: Vec<NodeId>,
    special: bool,
    values: Vec<Option<String>>,
}

/// Missing values sort last on ascending keys and first on descending ones.
fn compare(a: &Option<String>, b: &Option<String>, descending: bool) -> Ordering {
    let ordering = match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

/// Text holding anything besides blank lines and `%` comments.
fn is_raw_text(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with('%'))
}

impl Transform for SortEntries {
    fn name(&self) -> &'static str {
        "sort-entries"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        let mut units = Vec::new();
        let mut pending = Vec::new();
        for &id in index.document().order() {
            pending.push(id);
            match index.document().node(id) {
                Node::Text(text) if self.special && is_raw_text(text) => {
                    units.push(Unit {
                        nodes: std::mem::take(&mut pending),
                        special: true,
                        values: Vec::new(),
                    });
                }
                Node::Text(_) => {}
                Node::Entry(block) => {
                    let command = block.header.command.to_lowercase();
                    units.push(Unit {
                        nodes: std::mem::take(&mut pending),
                        special: self.special && SPECIAL_TYPES.contains(&command.as_str()),
                        values: self
                            .keys
                            .iter()
                            .map(|key| self.sort_value(index, id, key))
                            .collect(),
                    });
                }
                // Without `special`, macros and comments travel with the
                // next entry. `%` comment lines always do.
                Node::Macro(_) | Node::Preamble(_) | Node::Comment(_) if self.special => {
                    units.push(Unit {
                        nodes: std::mem::take(&mut pending),
                        special: true,
                        values: Vec::new(),
                    });
                }
                Node::Macro(_) | Node::Preamble(_) | Node::Comment(_) => {}
            }
        }

        units.sort_by(|a, b| match (a.special, b.special) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .keys
                .iter()
                .zip(a.values.iter().zip(&b.values))
                .map(|(key, (a, b))| compare(a, b, key.descending))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal),
        });

        let order: Vec<NodeId> = units
            .into_iter()
            .flat_map(|unit| unit.nodes)
            .chain(pending)
            .collect();
        if order != index.document().order() {
            index.set_order(order);
        }
        Vec::new()
    }
}
