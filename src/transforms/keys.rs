//! Citation key generation from a pattern such as
//! `[auth:required:lower][year:required][veryshorttitle:lower][duplicateNumber]`.
//!
//! Markers:
//!
//! * `auth` - last name of the first author
//! * `authors` - last names of all authors
//! * `authorsN` - last names of the first N authors, `EtAl` when there are more
//! * `year`, `title`, `shorttitle` (three words), `veryshorttitle` (one word)
//! * any other name - the value of that field
//! * `duplicateNumber` / `duplicateLetter` - disambiguates colliding keys
//!
//! Modifiers `lower`, `upper` and `required` follow the marker, separated by
//! colons. When a `required` marker produces nothing, the entry keeps its
//! current key.

use std::collections::HashMap;

use crate::ast::NodeId;
use crate::index::Index;
use crate::latex::fold_to_ascii;
use crate::warning::Warning;

use super::Transform;

/// Words skipped by `shorttitle` and `veryshorttitle`.
const FUNCTION_WORDS: &[&str] = &[
    "a", "about", "above", "across", "against", "along", "among", "an", "and", "around", "at",
    "before", "behind", "below", "beneath", "beside", "between", "beyond", "but", "by", "down",
    "during", "except", "for", "from", "in", "inside", "into", "like", "near", "nor", "of", "off",
    "on", "onto", "or", "out", "over", "since", "so", "the", "through", "to", "toward", "under",
    "until", "up", "upon", "with", "within", "without", "yet",
];

/// Stands in for the duplicate marker until collisions are known.
const DUPLICATE_SLOT: char = '\u{0}';

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Literal(String),
    Marker {
        name: String,
        lower: bool,
        upper: bool,
        required: bool,
    },
    Duplicate(DuplicateStyle),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DuplicateStyle {
    Number,
    Letter,
}

fn parse_pattern(pattern: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut rest = pattern;
    while !rest.is_empty() {
        let Some(open) = rest.find('[') else {
            pieces.push(Piece::Literal(rest.to_string()));
            break;
        };
        let Some(close) = rest[open..].find(']').map(|c| c + open) else {
            pieces.push(Piece::Literal(rest.to_string()));
            break;
        };
        if open > 0 {
            pieces.push(Piece::Literal(rest[..open].to_string()));
        }
        let mut parts = rest[open + 1..close].split(':');
        let name = parts.next().unwrap_or_default().trim();
        let modifiers: Vec<String> = parts.map(|m| m.trim().to_lowercase()).collect();
        let piece = match name.to_lowercase().as_str() {
            "duplicatenumber" => Piece::Duplicate(DuplicateStyle::Number),
            "duplicateletter" => Piece::Duplicate(DuplicateStyle::Letter),
            lower_name => Piece::Marker {
                name: lower_name.to_string(),
                lower: modifiers.iter().any(|m| m == "lower"),
                upper: modifiers.iter().any(|m| m == "upper"),
                required: modifiers.iter().any(|m| m == "required"),
            },
        };
        pieces.push(piece);
        rest = &rest[close + 1..];
    }
    pieces
}

/// Replaces entry keys with keys generated from a pattern.
pub struct GenerateKeys {
    pieces: Vec<Piece>,
}

impl GenerateKeys {
    pub fn new(pattern: &str) -> Self {
        Self {
            pieces: parse_pattern(pattern),
        }
    }

    /// The key for `entry` with [`DUPLICATE_SLOT`] where the duplicate marker
    /// goes, or `None` if a required marker came out empty or no marker
    /// produced anything.
    fn base_key(&self, index: &Index, entry: NodeId) -> Option<String> {
        let mut key = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => key.push_str(text),
                Piece::Duplicate(_) => key.push(DUPLICATE_SLOT),
                Piece::Marker {
                    name,
                    lower,
                    upper,
                    required,
                } => {
                    let mut value = marker_value(index, entry, name);
                    if *lower {
                        value = value.to_lowercase();
                    }
                    if *upper {
                        value = value.to_uppercase();
                    }
                    if value.is_empty() && *required {
                        return None;
                    }
                    key.push_str(&value);
                }
            }
        }
        key.chars().any(|c| c != DUPLICATE_SLOT).then_some(key)
    }

    fn duplicate_style(&self) -> Option<DuplicateStyle> {
        self.pieces.iter().find_map(|piece| match piece {
            Piece::Duplicate(style) => Some(*style),
            _ => None,
        })
    }
}

/// Folds text to ASCII and joins it into one word.
fn squash(text: &str) -> String {
    fold_to_ascii(text).split_whitespace().collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn surnames(index: &Index, entry: NodeId) -> Vec<String> {
    let Some(field) = index
        .find_field(entry, "author")
        .or_else(|| index.find_field(entry, "editor"))
    else {
        return Vec::new();
    };
    index
        .name_list(field)
        .iter()
        .filter_map(|name| name.person())
        .map(|person| squash(&person.last))
        .filter(|last| !last.is_empty())
        .collect()
}

fn title_words(index: &Index, entry: NodeId, skip_function_words: bool) -> Vec<String> {
    let title = index.lookup_rendered(entry, "title").unwrap_or_default();
    fold_to_ascii(&title)
        .split_whitespace()
        .filter(|word| {
            !skip_function_words || !FUNCTION_WORDS.contains(&word.to_lowercase().as_str())
        })
        .map(capitalize)
        .collect()
}

fn marker_value(index: &Index, entry: NodeId, name: &str) -> String {
    match name {
        "auth" => surnames(index, entry).into_iter().next().unwrap_or_default(),
        "authors" => surnames(index, entry).concat(),
        "title" => title_words(index, entry, false).concat(),
        "shorttitle" => title_words(index, entry, true).into_iter().take(3).collect(),
        "veryshorttitle" => title_words(index, entry, true).into_iter().take(1).collect(),
        _ => {
            if let Some(count) = name
                .strip_prefix("authors")
                .and_then(|n| n.parse::<usize>().ok())
            {
                let names = surnames(index, entry);
                let mut value: String = names.iter().take(count).map(String::as_str).collect();
                if names.len() > count {
                    value.push_str("EtAl");
                }
                return value;
            }
            index
                .lookup_rendered(entry, name)
                .map(|value| squash(&value))
                .unwrap_or_default()
        }
    }
}

fn duplicate_suffix(style: DuplicateStyle, position: usize) -> String {
    match style {
        DuplicateStyle::Number => (position + 1).to_string(),
        DuplicateStyle::Letter if position < 26 => char::from(b'a' + position as u8).to_string(),
        DuplicateStyle::Letter => format!("z{}", position - 25),
    }
}

impl Transform for GenerateKeys {
    fn name(&self) -> &'static str {
        "generate-keys"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        let generated: Vec<(NodeId, String)> = index
            .entries()
            .into_iter()
            .filter_map(|entry| self.base_key(index, entry).map(|key| (entry, key)))
            .collect();

        let mut collisions: HashMap<String, usize> = HashMap::new();
        for (_, key) in &generated {
            *collisions.entry(key.to_lowercase()).or_default() += 1;
        }

        let style = self.duplicate_style();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for (entry, key) in generated {
            let lower = key.to_lowercase();
            let suffix = match style {
                Some(style) if collisions[&lower] > 1 => {
                    let position = seen.entry(lower).or_default();
                    let suffix = duplicate_suffix(style, *position);
                    *position += 1;
                    suffix
                }
                _ => String::new(),
            };
            let key = key.replace(DUPLICATE_SLOT, &suffix);
            if index.key(entry) != Some(key.as_str()) {
                index.set_key(entry, Some(key));
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DEFAULT_KEY_PATTERN;
    use crate::transforms::test_support::run;

    #[test]
    fn test_parse_pattern() {
        let pieces = parse_pattern("x[auth:lower]-[duplicateLetter]");
        assert_eq!(pieces.len(), 4);
        assert_eq!(pieces[0], Piece::Literal("x".into()));
        assert_eq!(pieces[3], Piece::Duplicate(DuplicateStyle::Letter));
    }

    #[test]
    fn test_default_pattern() {
        // Given: an entry with an accented author and a leading function word
        let src = "@article{old, author = {M{\\\"u}ller, Hans}, year = {2019}, title = {The Effect of Tea}}";

        // When: keys are generated with the default pattern
        let out = run(&GenerateKeys::new(DEFAULT_KEY_PATTERN), src);

        // Then: the key is folded, lowercased and skips "The"
        assert_eq!(
            out,
            "@article{muller2019effect, author = {M{\\\"u}ller, Hans}, year = {2019}, title = {The Effect of Tea}}"
        );
    }

    #[test]
    fn test_required_marker_keeps_existing_key() {
        let src = "@misc{keep, title = {No Author}}";
        assert_eq!(run(&GenerateKeys::new(DEFAULT_KEY_PATTERN), src), src);
    }

    #[test]
    fn test_empty_key_keeps_existing_key() {
        let src = "@misc{keep, note = {x}}";
        assert_eq!(run(&GenerateKeys::new("[auth][year][duplicateLetter]"), src), src);
    }

    #[test]
    fn test_collisions_get_suffixes() {
        // Given: two entries that generate the same key
        let src = "@misc{a, author = {Doe, J.}, year = 2000}\n@misc{b, author = {Doe, A.}, year = 2000}";

        // When/Then: both colliding entries get a suffix
        let numbered = run(&GenerateKeys::new("[auth][year][duplicateNumber]"), src);
        assert_eq!(
            numbered,
            "@misc{Doe20001, author = {Doe, J.}, year = 2000}\n@misc{Doe20002, author = {Doe, A.}, year = 2000}"
        );
        let lettered = run(&GenerateKeys::new("[auth:upper][duplicateLetter]"), src);
        assert!(lettered.starts_with("@misc{DOEa,"));
        assert!(lettered.contains("@misc{DOEb,"));
    }

    #[test]
    fn test_authors_n_and_shorttitle() {
        let src = "@misc{k, author = {Ann Alpha and Bob Beta and Cy Gamma}, title = {On the Origin of Species}}";
        let out = run(&GenerateKeys::new("[authors2]_[shorttitle]"), src);
        assert!(out.starts_with("@misc{AlphaBetaEtAl_OriginSpecies,"));
    }

    #[test]
    fn test_generation_is_idempotent() {
        let transform = GenerateKeys::new(DEFAULT_KEY_PATTERN);
        let once = run(&transform, "@misc{x, author = {Lee, K.}, year = 1999, title = {Go}}");
        assert_eq!(run(&transform, &once), once);
    }
}
