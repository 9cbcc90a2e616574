//! Document transforms.
//!
//! Each transform is a stateless unit holding only its configuration. It
//! edits the document through an [`Index`] and returns the warnings it
//! raised. Applying a transform to its own output changes nothing.

mod duplicates;
mod fields;
mod keys;
mod sort;
mod values;

pub use duplicates::MergeEntries;
pub use fields::{
    Lowercase, MaxAuthors, RemoveDuplicateFields, RemoveEmptyFields, RemoveFields, SortFields,
};
pub use keys::GenerateKeys;
pub use sort::SortEntries;
pub use values::{
    Curly, DropAllCaps, EncloseInBraces, EncodeUrls, Escape, Months, Numeric, RemoveBraces,
    StripEnclosingBraces,
};

use crate::ast::Segment;
use crate::index::Index;
use crate::warning::Warning;

/// One pass over the document.
pub trait Transform {
    /// Stable identifier used in logs.
    fn name(&self) -> &'static str;

    fn apply(&self, index: &mut Index) -> Vec<Warning>;
}

/// Fields whose values are identifiers or paths rather than prose. Case and
/// escaping edits leave them alone.
pub const VERBATIM_FIELDS: &[&str] = &["url", "doi", "file", "eprint"];

pub(crate) fn is_verbatim(name: &str) -> bool {
    VERBATIM_FIELDS
        .iter()
        .any(|field| field.eq_ignore_ascii_case(name))
}

/// Rewrites the literal segments of every entry field accepted by `select`.
/// `edit` returns `None` to leave a segment unchanged.
pub(crate) fn map_literals(
    index: &mut Index,
    select: impl Fn(&str) -> bool,
    edit: impl Fn(&str) -> Option<String>,
) {
    for entry in index.entries() {
        for field in index.fields(entry) {
            if !select(&index.field(field).name) {
                continue;
            }
            index.update_value(field, |value| {
                let mut changed = false;
                for part in value.parts.iter_mut().filter(|p| p.is_literal()) {
                    if let Some(text) = edit(part.text()) {
                        if text != part.text() {
                            *part = part.with_text(text);
                            changed = true;
                        }
                    }
                }
                changed
            });
        }
    }
}

/// Rewrites whole segments (including bare ones) of every entry field
/// accepted by `select`.
pub(crate) fn map_segments(
    index: &mut Index,
    select: impl Fn(&str) -> bool,
    edit: impl Fn(&Segment) -> Option<Segment>,
) {
    for entry in index.entries() {
        for field in index.fields(entry) {
            if !select(&index.field(field).name) {
                continue;
            }
            index.update_value(field, |value| {
                let mut changed = false;
                for part in value.parts.iter_mut() {
                    if let Some(segment) = edit(part) {
                        if segment != *part {
                            *part = segment;
                            changed = true;
                        }
                    }
                }
                changed
            });
        }
    }
}
