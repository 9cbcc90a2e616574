//! Tidy options.
//!
//! [`TidyOptions`] is the normalized form consumed by the pipeline and the
//! renderer. [`OptionsFile`] is the loose, user-facing form where most keys
//! accept either a flag or a value (`"sort": true` or `"sort": ["-year"]`),
//! read from JSON or TOML and resolved against the defaults.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field order used by `sort_fields` when no list is given.
pub const DEFAULT_FIELD_ORDER: &[&str] = &[
    "title",
    "shorttitle",
    "author",
    "year",
    "month",
    "day",
    "journal",
    "booktitle",
    "location",
    "on",
    "publisher",
    "address",
    "series",
    "volume",
    "number",
    "pages",
    "doi",
    "isbn",
    "issn",
    "url",
    "urldate",
    "copyright",
    "category",
    "note",
    "metadata",
];

/// Citation key pattern used by `generate_keys: true`.
pub const DEFAULT_KEY_PATTERN: &str =
    "[auth:required:lower][year:required][veryshorttitle:lower][duplicateNumber]";

pub const DEFAULT_ALIGN: usize = 14;
pub const DEFAULT_SPACES: usize = 2;
pub const DEFAULT_WRAP: usize = 80;

/// Criterion deciding that two entries describe the same work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateRule {
    /// Same DOI.
    Doi,
    /// Same citation key.
    Key,
    /// Same abstract.
    Abstract,
    /// Same set of authors and same title.
    Citation,
}

impl DuplicateRule {
    pub const DEFAULTS: [DuplicateRule; 3] = [
        DuplicateRule::Doi,
        DuplicateRule::Citation,
        DuplicateRule::Abstract,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DuplicateRule::Doi => "doi",
            DuplicateRule::Key => "key",
            DuplicateRule::Abstract => "abstract",
            DuplicateRule::Citation => "citation",
        }
    }
}

impl fmt::Display for DuplicateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "doi" => Ok(DuplicateRule::Doi),
            "key" => Ok(DuplicateRule::Key),
            "abstract" => Ok(DuplicateRule::Abstract),
            "citation" => Ok(DuplicateRule::Citation),
            other => Err(format!(
                "unknown duplicate rule '{other}' (expected doi, key, abstract or citation)"
            )),
        }
    }
}

/// What to do with the members of a duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Keep the earliest entry only.
    First,
    /// Keep the latest entry only.
    Last,
    /// Keep the earliest entry and copy in fields it lacks.
    Combine,
    /// Keep the earliest entry and let later fields replace its values.
    Overwrite,
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" => Ok(MergeStrategy::First),
            "last" => Ok(MergeStrategy::Last),
            "combine" => Ok(MergeStrategy::Combine),
            "overwrite" => Ok(MergeStrategy::Overwrite),
            other => Err(format!(
                "unknown merge strategy '{other}' (expected first, last, combine or overwrite)"
            )),
        }
    }
}

/// Field indentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indent {
    Spaces(usize),
    Tab,
}

impl Indent {
    pub fn as_string(self) -> String {
        match self {
            Indent::Spaces(n) => " ".repeat(n),
            Indent::Tab => "\t".to_string(),
        }
    }
}

/// One sort criterion: a field name, `key`, `type` or `special`, with an
/// optional leading `-` for descending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        match spec.strip_prefix('-') {
            Some(field) => Self {
                field: field.to_lowercase(),
                descending: true,
            },
            None => Self {
                field: spec.to_lowercase(),
                descending: false,
            },
        }
    }
}

/// Normalized options.
#[derive(Debug, Clone, PartialEq)]
pub struct TidyOptions {
    /// Fields to remove.
    pub omit: Vec<String>,
    /// Turn quoted values into braced values.
    pub curly: bool,
    /// Drop delimiters around numbers and month abbreviations.
    pub numeric: bool,
    /// Rewrite `month` values as three-letter macros.
    pub months: bool,
    /// Field indentation. `None` keeps the source layout untouched.
    pub indent: Option<Indent>,
    /// Column to align values at (0 disables alignment).
    pub align: usize,
    pub blank_lines: bool,
    pub sort: Option<Vec<SortKey>>,
    /// Active duplicate rules. Empty disables duplicate checks.
    pub duplicates: Vec<DuplicateRule>,
    pub merge: Option<MergeStrategy>,
    pub strip_enclosing_braces: bool,
    pub drop_all_caps: bool,
    pub escape: bool,
    pub sort_fields: Option<Vec<String>>,
    pub strip_comments: bool,
    pub trailing_commas: bool,
    pub encode_urls: bool,
    pub tidy_comments: bool,
    pub remove_empty_fields: bool,
    pub remove_duplicate_fields: bool,
    /// Citation key pattern.
    pub generate_keys: Option<String>,
    pub max_authors: Option<usize>,
    pub lowercase: bool,
    /// Fields to wrap in double braces.
    pub enclosing_braces: Vec<String>,
    /// Fields to strip of non-command braces.
    pub remove_braces: Vec<String>,
    /// Column to wrap long values at.
    pub wrap: Option<usize>,
    pub lookup_dois: bool,
}

impl Default for TidyOptions {
    fn default() -> Self {
        Self {
            omit: Vec::new(),
            curly: false,
            numeric: false,
            months: false,
            indent: Some(Indent::Spaces(DEFAULT_SPACES)),
            align: DEFAULT_ALIGN,
            blank_lines: false,
            sort: None,
            duplicates: Vec::new(),
            merge: None,
            strip_enclosing_braces: false,
            drop_all_caps: false,
            escape: true,
            sort_fields: None,
            strip_comments: false,
            trailing_commas: false,
            encode_urls: false,
            tidy_comments: true,
            remove_empty_fields: false,
            remove_duplicate_fields: true,
            generate_keys: None,
            max_authors: None,
            lowercase: true,
            enclosing_braces: Vec::new(),
            remove_braces: Vec::new(),
            wrap: None,
            lookup_dois: false,
        }
    }
}

impl TidyOptions {
    /// Options that change nothing: parsing and rendering reproduces the
    /// input exactly.
    pub fn preserve() -> Self {
        Self {
            indent: None,
            align: 0,
            escape: false,
            tidy_comments: false,
            remove_duplicate_fields: false,
            lowercase: false,
            ..Self::default()
        }
    }

    /// Duplicate rules in effect, taking `merge` into account.
    pub fn duplicate_rules(&self) -> Vec<DuplicateRule> {
        if self.duplicates.is_empty() && self.merge.is_some() {
            DuplicateRule::DEFAULTS.to_vec()
        } else {
            self.duplicates.clone()
        }
    }
}

/// Errors that can occur when loading an options file.
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid TOML: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Either a plain on/off flag or an explicit value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Toggle<T> {
    Flag(bool),
    Value(T),
}

/// User-facing options as written in a config file. Every key is optional;
/// unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OptionsFile {
    pub omit: Option<Vec<String>>,
    pub curly: Option<bool>,
    pub numeric: Option<bool>,
    pub months: Option<bool>,
    pub space: Option<Toggle<usize>>,
    pub tab: Option<bool>,
    pub align: Option<Toggle<usize>>,
    pub blank_lines: Option<bool>,
    pub sort: Option<Toggle<Vec<String>>>,
    pub duplicates: Option<Toggle<Vec<DuplicateRule>>>,
    pub merge: Option<Toggle<MergeStrategy>>,
    pub strip_enclosing_braces: Option<bool>,
    pub drop_all_caps: Option<bool>,
    pub escape: Option<bool>,
    #[serde(alias = "sortProperties")]
    pub sort_fields: Option<Toggle<Vec<String>>>,
    pub strip_comments: Option<bool>,
    pub trailing_commas: Option<bool>,
    pub encode_urls: Option<bool>,
    pub tidy_comments: Option<bool>,
    pub remove_empty_fields: Option<bool>,
    pub remove_duplicate_fields: Option<bool>,
    pub generate_keys: Option<Toggle<String>>,
    pub max_authors: Option<usize>,
    pub lowercase: Option<bool>,
    pub enclosing_braces: Option<Toggle<Vec<String>>>,
    pub remove_braces: Option<Toggle<Vec<String>>>,
    pub wrap: Option<Toggle<usize>>,
    pub lookup_dois: Option<bool>,
    /// Start from [`TidyOptions::preserve`] instead of the defaults.
    pub preserve: Option<bool>,
}

impl OptionsFile {
    /// Loads options from a `.json` or `.toml` file (by extension; anything
    /// else is read as TOML).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn load(path: &Path) -> Result<Self, OptionsError> {
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    /// Layers `other` on top of `self`; keys set in `other` win.
    pub fn overlay(self, other: OptionsFile) -> OptionsFile {
        OptionsFile {
            omit: other.omit.or(self.omit),
            curly: other.curly.or(self.curly),
            numeric: other.numeric.or(self.numeric),
            months: other.months.or(self.months),
            space: other.space.or(self.space),
            tab: other.tab.or(self.tab),
            align: other.align.or(self.align),
            blank_lines: other.blank_lines.or(self.blank_lines),
            sort: other.sort.or(self.sort),
            duplicates: other.duplicates.or(self.duplicates),
            merge: other.merge.or(self.merge),
            strip_enclosing_braces: other.strip_enclosing_braces.or(self.strip_enclosing_braces),
            drop_all_caps: other.drop_all_caps.or(self.drop_all_caps),
            escape: other.escape.or(self.escape),
            sort_fields: other.sort_fields.or(self.sort_fields),
            strip_comments: other.strip_comments.or(self.strip_comments),
            trailing_commas: other.trailing_commas.or(self.trailing_commas),
            encode_urls: other.encode_urls.or(self.encode_urls),
            tidy_comments: other.tidy_comments.or(self.tidy_comments),
            remove_empty_fields: other.remove_empty_fields.or(self.remove_empty_fields),
            remove_duplicate_fields: other
                .remove_duplicate_fields
                .or(self.remove_duplicate_fields),
            generate_keys: other.generate_keys.or(self.generate_keys),
            max_authors: other.max_authors.or(self.max_authors),
            lowercase: other.lowercase.or(self.lowercase),
            enclosing_braces: other.enclosing_braces.or(self.enclosing_braces),
            remove_braces: other.remove_braces.or(self.remove_braces),
            wrap: other.wrap.or(self.wrap),
            lookup_dois: other.lookup_dois.or(self.lookup_dois),
            preserve: other.preserve.or(self.preserve),
        }
    }

    /// Resolves flags and values against the defaults.
    pub fn resolve(&self) -> TidyOptions {
        let mut options = if self.preserve == Some(true) {
            TidyOptions::preserve()
        } else {
            TidyOptions::default()
        };

        if let Some(omit) = &self.omit {
            options.omit = omit.iter().map(|f| f.to_lowercase()).collect();
        }
        set(&mut options.curly, self.curly);
        set(&mut options.numeric, self.numeric);
        set(&mut options.months, self.months);
        match self.space {
            Some(Toggle::Value(n)) => options.indent = Some(Indent::Spaces(n)),
            Some(Toggle::Flag(true)) => options.indent = Some(Indent::Spaces(DEFAULT_SPACES)),
            Some(Toggle::Flag(false)) | None => {}
        }
        if self.tab == Some(true) {
            options.indent = Some(Indent::Tab);
        }
        match self.align {
            Some(Toggle::Value(n)) => options.align = n,
            Some(Toggle::Flag(true)) => options.align = DEFAULT_ALIGN,
            Some(Toggle::Flag(false)) => options.align = 0,
            None => {}
        }
        set(&mut options.blank_lines, self.blank_lines);
        if let Some(sort) = &self.sort {
            options.sort = list_toggle(sort, &["key"])
                .map(|keys| keys.iter().map(|k| SortKey::parse(k)).collect());
        }
        match &self.duplicates {
            Some(Toggle::Value(rules)) => options.duplicates = rules.clone(),
            Some(Toggle::Flag(true)) => options.duplicates = DuplicateRule::DEFAULTS.to_vec(),
            Some(Toggle::Flag(false)) => options.duplicates = Vec::new(),
            None => {}
        }
        match self.merge {
            Some(Toggle::Value(strategy)) => options.merge = Some(strategy),
            Some(Toggle::Flag(true)) => options.merge = Some(MergeStrategy::Combine),
            Some(Toggle::Flag(false)) => options.merge = None,
            None => {}
        }
        set(&mut options.strip_enclosing_braces, self.strip_enclosing_braces);
        set(&mut options.drop_all_caps, self.drop_all_caps);
        set(&mut options.escape, self.escape);
        if let Some(sort_fields) = &self.sort_fields {
            options.sort_fields = list_toggle(sort_fields, DEFAULT_FIELD_ORDER)
                .map(|fields| fields.iter().map(|f| f.to_lowercase()).collect());
        }
        set(&mut options.strip_comments, self.strip_comments);
        set(&mut options.trailing_commas, self.trailing_commas);
        set(&mut options.encode_urls, self.encode_urls);
        set(&mut options.tidy_comments, self.tidy_comments);
        set(&mut options.remove_empty_fields, self.remove_empty_fields);
        set(&mut options.remove_duplicate_fields, self.remove_duplicate_fields);
        match &self.generate_keys {
            Some(Toggle::Value(pattern)) => options.generate_keys = Some(pattern.clone()),
            Some(Toggle::Flag(true)) => options.generate_keys = Some(DEFAULT_KEY_PATTERN.to_string()),
            Some(Toggle::Flag(false)) => options.generate_keys = None,
            None => {}
        }
        if self.max_authors.is_some() {
            options.max_authors = self.max_authors;
        }
        set(&mut options.lowercase, self.lowercase);
        if let Some(fields) = &self.enclosing_braces {
            options.enclosing_braces = list_toggle(fields, &["title"]).unwrap_or_default();
        }
        if let Some(fields) = &self.remove_braces {
            options.remove_braces = list_toggle(fields, &["title"]).unwrap_or_default();
        }
        match self.wrap {
            Some(Toggle::Value(column)) => options.wrap = Some(column),
            Some(Toggle::Flag(true)) => options.wrap = Some(DEFAULT_WRAP),
            Some(Toggle::Flag(false)) => options.wrap = None,
            None => {}
        }
        set(&mut options.lookup_dois, self.lookup_dois);
        options
    }
}

fn set(target: &mut bool, value: Option<bool>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// `true` (or an empty list) means the default list, `false` means off.
fn list_toggle(toggle: &Toggle<Vec<String>>, default: &[&str]) -> Option<Vec<String>> {
    match toggle {
        Toggle::Flag(false) => None,
        Toggle::Flag(true) => Some(default.iter().map(|s| s.to_string()).collect()),
        Toggle::Value(list) if list.is_empty() => {
            Some(default.iter().map(|s| s.to_string()).collect())
        }
        Toggle::Value(list) => Some(list.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_documented_values() {
        let options = TidyOptions::default();
        assert_eq!(options.indent, Some(Indent::Spaces(2)));
        assert_eq!(options.align, 14);
        assert!(options.escape);
        assert!(options.lowercase);
        assert!(options.remove_duplicate_fields);
        assert!(options.tidy_comments);
        assert!(options.duplicate_rules().is_empty());
    }

    #[test]
    fn test_merge_implies_default_duplicate_rules() {
        let options = TidyOptions {
            merge: Some(MergeStrategy::First),
            ..TidyOptions::default()
        };
        assert_eq!(options.duplicate_rules(), DuplicateRule::DEFAULTS.to_vec());
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(
            SortKey::parse("-Year"),
            SortKey {
                field: "year".into(),
                descending: true
            }
        );
        assert!(!SortKey::parse("key").descending);
    }

    #[test]
    fn test_rule_and_strategy_from_str() {
        assert_eq!("DOI".parse::<DuplicateRule>(), Ok(DuplicateRule::Doi));
        assert_eq!(" last".parse::<MergeStrategy>(), Ok(MergeStrategy::Last));
        assert!("isbn".parse::<DuplicateRule>().unwrap_err().contains("isbn"));
    }

    #[test]
    fn test_resolve_json_flags_and_values() {
        // Given: a JSON options object using flag/value unions
        let json = r#"{
            "sort": ["-year", "author"],
            "duplicates": true,
            "merge": "overwrite",
            "align": false,
            "space": 4,
            "wrap": true,
            "generateKeys": true,
            "sortProperties": true,
            "somethingUnknown": 1
        }"#;

        // When: we decode and resolve it
        let file: OptionsFile = serde_json::from_str(json).unwrap();
        let options = file.resolve();

        // Then: every union is normalized
        assert_eq!(
            options.sort,
            Some(vec![SortKey::parse("-year"), SortKey::parse("author")])
        );
        assert_eq!(options.duplicates, DuplicateRule::DEFAULTS.to_vec());
        assert_eq!(options.merge, Some(MergeStrategy::Overwrite));
        assert_eq!(options.align, 0);
        assert_eq!(options.indent, Some(Indent::Spaces(4)));
        assert_eq!(options.wrap, Some(80));
        assert_eq!(options.generate_keys.as_deref(), Some(DEFAULT_KEY_PATTERN));
        assert_eq!(options.sort_fields.unwrap().len(), DEFAULT_FIELD_ORDER.len());
    }

    #[test]
    fn test_tab_overrides_space() {
        let file = OptionsFile {
            space: Some(Toggle::Value(8)),
            tab: Some(true),
            ..OptionsFile::default()
        };
        assert_eq!(file.resolve().indent, Some(Indent::Tab));
    }

    #[test]
    fn test_preserve_flag() {
        let file = OptionsFile {
            preserve: Some(true),
            curly: Some(true),
            ..OptionsFile::default()
        };
        let options = file.resolve();
        assert_eq!(options.indent, None);
        assert!(options.curly);
        assert!(!options.lowercase);
    }

    #[test]
    fn test_overlay_prefers_later_values() {
        let base = OptionsFile {
            curly: Some(true),
            numeric: Some(true),
            ..OptionsFile::default()
        };
        let top = OptionsFile {
            numeric: Some(false),
            ..OptionsFile::default()
        };
        let merged = base.overlay(top);
        assert_eq!(merged.curly, Some(true));
        assert_eq!(merged.numeric, Some(false));
    }

    #[test]
    fn test_load_toml_file() {
        // Given: a TOML options file
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "curly = true\nremoveBraces = [\"title\", \"journal\"]").unwrap();

        // When: we load it
        let options = OptionsFile::load(file.path()).unwrap().resolve();

        // Then: the values are applied
        assert!(options.curly);
        assert_eq!(options.remove_braces, vec!["title", "journal"]);
    }

    #[test]
    fn test_load_invalid_json_file() {
        let mut file: NamedTempFile = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = OptionsFile::load(file.path()).unwrap_err();
        assert!(matches!(err, OptionsError::JsonError(_)));
    }
}
