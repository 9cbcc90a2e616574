//! Value normalization: braces, case, escaping, URLs, months and numbers.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{Segment, Value};
use crate::index::Index;
use crate::latex::{escape_latex, is_all_caps, is_enclosed, remove_braces, title_case};
use crate::warning::Warning;

use super::{is_verbatim, map_literals, map_segments, Transform};

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9][0-9]*$").unwrap());

const MONTHS: [(&str, &str); 12] = [
    ("jan", "january"),
    ("feb", "february"),
    ("mar", "march"),
    ("apr", "april"),
    ("may", "may"),
    ("jun", "june"),
    ("jul", "july"),
    ("aug", "august"),
    ("sep", "september"),
    ("oct", "october"),
    ("nov", "november"),
    ("dec", "december"),
];

/// Three-letter abbreviation of a month written as a name, an abbreviation
/// or a number from 1 to 12.
fn month_abbreviation(text: &str) -> Option<&'static str> {
    let text = text.trim().to_lowercase();
    if let Ok(n) = text.parse::<usize>() {
        return (1..=12).contains(&n).then(|| MONTHS[n - 1].0);
    }
    MONTHS
        .iter()
        .find(|(short, long)| text == *short || text == *long)
        .map(|(short, _)| *short)
}

fn is_month_field(name: &str) -> bool {
    name.eq_ignore_ascii_case("month")
}

fn lowercase_set<S: AsRef<str>>(fields: &[S]) -> HashSet<String> {
    fields.iter().map(|f| f.as_ref().to_lowercase()).collect()
}

/// `{{Title}}` becomes `{Title}`.
pub struct StripEnclosingBraces;

impl Transform for StripEnclosingBraces {
    fn name(&self) -> &'static str {
        "strip-enclosing-braces"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        map_literals(index, |_| true, |text| {
            let mut text = text;
            while is_enclosed(text) {
                text = &text[1..text.len() - 1];
            }
            Some(text.to_string())
        });
        Vec::new()
    }
}

/// Rewrites ALL-CAPS values in title case.
pub struct DropAllCaps;

impl Transform for DropAllCaps {
    fn name(&self) -> &'static str {
        "drop-all-caps"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        map_literals(
            index,
            |name| !is_verbatim(name),
            |text| is_all_caps(text).then(|| title_case(text)),
        );
        Vec::new()
    }
}

/// Removes braces that are not command arguments from the listed fields.
pub struct RemoveBraces {
    fields: HashSet<String>,
}

impl RemoveBraces {
    pub fn new<S: AsRef<str>>(fields: &[S]) -> Self {
        Self {
            fields: lowercase_set(fields),
        }
    }
}

impl Transform for RemoveBraces {
    fn name(&self) -> &'static str {
        "remove-braces"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        map_literals(
            index,
            |name| self.fields.contains(&name.to_lowercase()),
            |text| Some(remove_braces(text)),
        );
        Vec::new()
    }
}

/// Wraps the listed fields in an extra pair of braces to protect their case.
pub struct EncloseInBraces {
    fields: HashSet<String>,
}

impl EncloseInBraces {
    pub fn new<S: AsRef<str>>(fields: &[S]) -> Self {
        Self {
            fields: lowercase_set(fields),
        }
    }
}

impl Transform for EncloseInBraces {
    fn name(&self) -> &'static str {
        "enclosing-braces"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        map_literals(
            index,
            |name| self.fields.contains(&name.to_lowercase()),
            |text| (!text.is_empty() && !is_enclosed(text)).then(|| format!("{{{text}}}")),
        );
        Vec::new()
    }
}

/// Escapes `&` and `%` and replaces special characters with LaTeX commands.
pub struct Escape;

impl Transform for Escape {
    fn name(&self) -> &'static str {
        "escape"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        map_literals(index, |name| !is_verbatim(name), |text| Some(escape_latex(text)));
        Vec::new()
    }
}

/// Percent-encodes characters that are not valid in a URL.
pub struct EncodeUrls;

fn encode_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        match c {
            ' ' | '"' | '<' | '>' | '\\' | '^' | '`' | '{' | '|' | '}' => {
                out.push_str(&format!("%{:02X}", c as u32));
            }
            c if !c.is_ascii() => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
            c => out.push(c),
        }
    }
    out
}

impl Transform for EncodeUrls {
    fn name(&self) -> &'static str {
        "encode-urls"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        map_literals(
            index,
            |name| name.eq_ignore_ascii_case("url"),
            |text| Some(encode_url(text)),
        );
        Vec::new()
    }
}

/// Replaces `month` values with the standard `jan`..`dec` macros.
pub struct Months;

impl Transform for Months {
    fn name(&self) -> &'static str {
        "months"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        for entry in index.entries() {
            let Some(field) = index.find_field(entry, "month") else {
                continue;
            };
            let Some(short) = month_abbreviation(&index.rendered_value(field)) else {
                continue;
            };
            index.update_value(field, |value| {
                if value.as_single() == Some(&Segment::Bare(short.to_string())) {
                    return false;
                }
                *value = Value::bare(short);
                true
            });
        }
        Vec::new()
    }
}

/// Drops the delimiters around plain numbers and month abbreviations.
pub struct Numeric;

impl Transform for Numeric {
    fn name(&self) -> &'static str {
        "numeric"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        for entry in index.entries() {
            for field in index.fields(entry) {
                let is_month = is_month_field(&index.field(field).name);
                index.update_value(field, |value| {
                    let mut changed = false;
                    for part in value.parts.iter_mut().filter(|p| p.is_literal()) {
                        let text = part.text().trim();
                        let bare = if NUMBER.is_match(text) {
                            Some(text.to_string())
                        } else if is_month && text.len() == 3 {
                            month_abbreviation(text).map(str::to_string)
                        } else {
                            None
                        };
                        if let Some(bare) = bare {
                            *part = Segment::Bare(bare);
                            changed = true;
                        }
                    }
                    changed
                });
            }
        }
        Vec::new()
    }
}

/// Turns quoted values into braced values.
pub struct Curly;

fn braces_balanced(text: &str) -> bool {
    let mut depth = 0i64;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

impl Transform for Curly {
    fn name(&self) -> &'static str {
        "curly"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        map_segments(
            index,
            |_| true,
            |segment| match segment {
                Segment::Quoted(text) if braces_balanced(text) => {
                    Some(Segment::Braced(text.clone()))
                }
                _ => None,
            },
        );
        Vec::new()
    }
}
