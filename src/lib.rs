//! bibtidy: tidy, normalize and deduplicate BibTeX files.
//!
//! This library provides functionality to:
//! - Parse BibTeX losslessly, keeping comments, macros and whitespace
//! - Read macro-expanded field values through a caching index
//! - Normalize values, detect and merge duplicates, sort entries and fields
//! - Render the result in the source layout or a canonical layout

pub mod ast;
pub mod doi;
pub mod index;
pub mod latex;
pub mod names;
pub mod options;
pub mod parser;
pub mod pipeline;
pub mod render;
pub mod transforms;
pub mod warning;

use serde::Serialize;
use tracing::info;

pub use ast::{Document, FieldId, Node, NodeId, Segment, Value};
pub use doi::{CrossrefClient, DoiResolver, LookupError};
pub use index::Index;
pub use names::{join_name_list, parse_name_list, NameToken, Person};
pub use options::{
    DuplicateRule, Indent, MergeStrategy, OptionsError, OptionsFile, SortKey, TidyOptions,
};
pub use parser::{parse, ParseError, ParseErrorKind};
pub use pipeline::Pipeline;
pub use render::{render, RenderOptions};
pub use warning::{Warning, WarningCode};

/// Outcome of a successful [`tidy`] run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TidyResult {
    /// The tidied BibTeX.
    pub bibtex: String,
    /// Every warning raised, in the order it was raised.
    pub warnings: Vec<Warning>,
    /// Number of entries in the output.
    pub count: usize,
}

/// Tidies a BibTeX document.
///
/// # Arguments
///
/// * `input` - BibTeX source, with `\n` or `\r\n` line endings
/// * `options` - Normalized options
///
/// # Returns
///
/// The tidied text with its warnings and entry count, or the parse error
/// that stopped the run.
///
/// # Examples
///
/// ```
/// use bibtidy::{tidy, TidyOptions};
///
/// let result = tidy("@ARTICLE{key, Title = {Fish & Chips}}", &TidyOptions::default()).unwrap();
/// assert_eq!(result.bibtex, "@article{key,\n  title         = {Fish \\& Chips}\n}\n");
/// assert_eq!(result.count, 1);
/// ```
pub fn tidy(input: &str, options: &TidyOptions) -> Result<TidyResult, ParseError> {
    run(input, options, Pipeline::new(options))
}

/// Like [`tidy`], with DOI lookups answered by `resolver`.
pub fn tidy_with_resolver(
    input: &str,
    options: &TidyOptions,
    resolver: Box<dyn DoiResolver>,
) -> Result<TidyResult, ParseError> {
    run(input, options, Pipeline::with_resolver(options, resolver))
}

fn run(input: &str, options: &TidyOptions, pipeline: Pipeline) -> Result<TidyResult, ParseError> {
    let input = input.replace("\r\n", "\n");
    let mut index = Index::new(parse(&input)?);

    let mut warnings: Vec<Warning> = index
        .entries()
        .into_iter()
        .filter(|entry| index.key(*entry).is_none())
        .map(|entry| {
            Warning::new(
                WarningCode::MissingKey,
                format!("{} entry does not have a citation key.", index.command(entry)),
            )
        })
        .collect();

    warnings.extend(pipeline.run(&mut index));

    let bibtex = render(index.document(), &RenderOptions::from(options));
    let count = index.entries().len();
    info!(
        entries = count,
        warnings = warnings.len(),
        transforms = pipeline.names().len(),
        "tidy complete"
    );
    Ok(TidyResult {
        bibtex,
        warnings,
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crlf_is_normalized() {
        let result = tidy("@misc{a,\r\n  note = {x}\r\n}\r\n", &TidyOptions::preserve()).unwrap();
        assert_eq!(result.bibtex, "@misc{a,\n  note = {x}\n}\n");
    }

    #[test]
    fn test_missing_key_warning_and_count() {
        // Given: one keyless entry, one keyed entry and a macro
        let input = "@string{s = \"x\"}\n@book{title = {No Key}}\n@misc{k}";

        // When: tidied
        let result = tidy(input, &TidyOptions::default()).unwrap();

        // Then: exactly one MISSING_KEY warning and both entries counted
        let missing: Vec<&Warning> = result
            .warnings
            .iter()
            .filter(|w| w.code == WarningCode::MissingKey)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].message, "book entry does not have a citation key.");
        assert_eq!(result.count, 2);
    }

    #[test]
    fn test_parse_error_aborts() {
        let err = tidy("@misc{a, title = {open", &TidyOptions::default()).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Unterminated("braced value"));
    }

    #[test]
    fn test_stray_block_like_text_passes_through() {
        let input = "Written by me @ home{of the brave}\n@misc{k, title={T}}\n";
        let result = tidy(input, &TidyOptions::preserve()).unwrap();
        assert_eq!(result.bibtex, input);
        assert_eq!(result.count, 1);
    }

    #[test]
    fn test_result_serializes() {
        let result = tidy("@misc{title = {x}}", &TidyOptions::default()).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["warnings"][0]["code"], "MISSING_KEY");
    }
}
