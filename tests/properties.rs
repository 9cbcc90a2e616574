//! Behavioral properties of the whole tidy run: lossless round trips,
//! idempotence, duplicate handling, names, wrapping and DOI enrichment.

mod common;

use bibtidy::{
    parse, parse_name_list, render, tidy, tidy_with_resolver, DuplicateRule, MergeStrategy,
    NameToken, OptionsFile, RenderOptions, SortKey, TidyOptions, WarningCode,
};

use common::{MockResolver, SAMPLE_BIB, SAMPLE_WITH_DUPLICATE};

fn everything_on() -> TidyOptions {
    TidyOptions {
        omit: vec!["pages".into()],
        curly: true,
        numeric: true,
        months: true,
        blank_lines: true,
        sort: Some(vec![SortKey::parse("-year"), SortKey::parse("key")]),
        duplicates: DuplicateRule::DEFAULTS.to_vec(),
        merge: Some(MergeStrategy::Combine),
        strip_enclosing_braces: true,
        drop_all_caps: true,
        sort_fields: Some(vec!["title".into(), "author".into()]),
        trailing_commas: true,
        encode_urls: true,
        remove_empty_fields: true,
        generate_keys: Some(bibtidy::options::DEFAULT_KEY_PATTERN.to_string()),
        max_authors: Some(2),
        enclosing_braces: vec!["booktitle".into()],
        wrap: Some(60),
        ..TidyOptions::default()
    }
}

// ============================================
// Round trip and idempotence
// ============================================

#[test]
fn test_preserve_round_trip_is_exact() {
    // Given: a bibliography with comments, macros and odd spacing
    // When: tidied with options that change nothing
    let result = tidy(SAMPLE_BIB, &TidyOptions::preserve()).unwrap();

    // Then: the output is byte-identical
    assert_eq!(result.bibtex, SAMPLE_BIB);
    assert_eq!(result.count, 3);
    assert!(result.warnings.is_empty());
}

#[test]
fn test_parse_render_round_trip() {
    let doc = parse(SAMPLE_BIB).unwrap();
    assert_eq!(render(&doc, &RenderOptions::preserve()), SAMPLE_BIB);
}

#[test]
fn test_default_tidy_is_idempotent() {
    let once = tidy(SAMPLE_BIB, &TidyOptions::default()).unwrap();
    let twice = tidy(&once.bibtex, &TidyOptions::default()).unwrap();
    assert_eq!(twice.bibtex, once.bibtex);
}

#[test]
fn test_full_option_set_is_idempotent() {
    // Given: every normalizing option switched on
    let options = everything_on();

    // When: tidied twice
    let once = tidy(SAMPLE_BIB, &options).unwrap();
    let twice = tidy(&once.bibtex, &options).unwrap();

    // Then: the second run changes nothing
    assert_eq!(twice.bibtex, once.bibtex);
    assert_eq!(twice.count, once.count);
}

#[test]
fn test_output_ends_with_single_newline() {
    let result = tidy("\n\n@misc{a}\n\n\n", &TidyOptions::default()).unwrap();
    assert_eq!(result.bibtex, "@misc{a,\n}\n");

    let empty = tidy("  \n", &TidyOptions::default()).unwrap();
    assert_eq!(empty.bibtex, "");
    assert_eq!(empty.count, 0);
}

// ============================================
// Value normalization
// ============================================

#[test]
fn test_default_output_of_sample() {
    let result = tidy(SAMPLE_BIB, &TidyOptions::default()).unwrap();

    assert!(result.bibtex.starts_with("% Library export\n% contact: librarian@example.org\n"));
    assert!(result
        .bibtex
        .contains("@string{jcs = \"Journal of Chemical Stuff\"}\n"));
    assert!(result.bibtex.contains("@preamble{\"\\newcommand{\\noop}[1]{}\"}\n"));
    assert!(result
        .bibtex
        .contains("  title         = {{Caffeine} \\& Cognition},\n"));
    assert!(result.bibtex.contains("  booktitle     = {Proc. } # jcs,\n"));
    // Verbatim fields are not escaped.
    assert!(result
        .bibtex
        .contains("  url           = {http://example.com/a b}\n"));
}

#[test]
fn test_special_characters_are_escaped() {
    let result = tidy("@misc{k, title = {Öl & Wasser}}", &TidyOptions::default()).unwrap();
    assert!(result.bibtex.contains("{{\\\"O}l \\& Wasser}"));
}

#[test]
fn test_months_numeric_and_curly() {
    let options = TidyOptions {
        months: true,
        numeric: true,
        curly: true,
        ..TidyOptions::default()
    };
    let result = tidy(SAMPLE_BIB, &options).unwrap();

    assert!(result.bibtex.contains("  month         = aug,\n"));
    assert!(result.bibtex.contains("  year          = 2020,\n"));
    assert!(result.bibtex.contains("  title         = {Untitled},\n"));
}

#[test]
fn test_encode_urls() {
    let options = TidyOptions {
        encode_urls: true,
        ..TidyOptions::default()
    };
    let result = tidy(SAMPLE_BIB, &options).unwrap();
    assert!(result.bibtex.contains("{http://example.com/a%20b}"));
}

// ============================================
// Duplicates
// ============================================

#[test]
fn test_duplicates_reported_without_merge() {
    // Given: two entries with the same DOI written differently
    let options = TidyOptions {
        duplicates: DuplicateRule::DEFAULTS.to_vec(),
        ..TidyOptions::default()
    };

    // When: tidied with duplicate checks only
    let result = tidy(SAMPLE_WITH_DUPLICATE, &options).unwrap();

    // Then: one warning names both keys and nothing is removed
    assert_eq!(result.count, 2);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(
        result.warnings[0].code,
        WarningCode::DuplicateEntry {
            rule: DuplicateRule::Doi
        }
    );
    assert_eq!(
        result.warnings[0].message,
        "doe-copy appears to be a duplicate of Doe2020"
    );
}

#[test]
fn test_duplicates_merged_with_combine() {
    let options = TidyOptions {
        merge: Some(MergeStrategy::Combine),
        ..TidyOptions::default()
    };
    let result = tidy(SAMPLE_WITH_DUPLICATE, &options).unwrap();

    assert_eq!(result.count, 1);
    assert_eq!(
        result.bibtex,
        "@article{Doe2020,\n  author        = {Doe, Jane},\n  title         = {Caffeine and Cognition},\n  doi           = {10.5555/caffeine},\n  pages         = {5--9}\n}\n"
    );
}

#[test]
fn test_merge_last_keeps_later_entry() {
    let options = TidyOptions {
        merge: Some(MergeStrategy::Last),
        ..TidyOptions::default()
    };
    let result = tidy(SAMPLE_WITH_DUPLICATE, &options).unwrap();

    assert_eq!(result.count, 1);
    assert!(result.bibtex.starts_with("@article{doe-copy,"));
    assert!(result.warnings[0]
        .message
        .starts_with("Doe2020 appears to be a duplicate of doe-copy"));
}

#[test]
fn test_key_rule_is_case_insensitive() {
    let options = TidyOptions {
        duplicates: vec![DuplicateRule::Key],
        ..TidyOptions::default()
    };
    let result = tidy("@misc{Same}\n@misc{same}", &options).unwrap();
    assert_eq!(result.warnings.len(), 1);
}

// ============================================
// Names, keys and sorting
// ============================================

#[test]
fn test_name_list_parsing() {
    let names = parse_name_list("Doe, Jane and {Barnes and Noble} and Ludwig van Beethoven and others");
    assert_eq!(names.len(), 4);

    let doe = names[0].person().unwrap();
    assert_eq!(doe.first.as_deref(), Some("Jane"));
    assert_eq!(doe.last, "Doe");

    let company = names[1].person().unwrap();
    assert_eq!(company.last, "{Barnes and Noble}");

    let ludwig = names[2].person().unwrap();
    assert_eq!(ludwig.von.as_deref(), Some("van"));
    assert_eq!(ludwig.last, "Beethoven");

    assert_eq!(names[3], NameToken::Others);
}

#[test]
fn test_max_authors_truncates() {
    let options = TidyOptions {
        max_authors: Some(2),
        ..TidyOptions::default()
    };
    let result = tidy(SAMPLE_BIB, &options).unwrap();
    assert!(result
        .bibtex
        .contains("  author        = \"Lee, K. and Park, S. and others\",\n"));
    // Two authors are within the limit.
    assert!(result.bibtex.contains("{Doe, Jane and {\\\"O}zt{\\\"u}rk, Ali}"));
}

#[test]
fn test_generated_keys_and_sort() {
    let options = TidyOptions {
        generate_keys: Some("[auth:lower][year]".into()),
        sort: Some(vec![SortKey::parse("key")]),
        ..TidyOptions::default()
    };
    let result = tidy(SAMPLE_BIB, &options).unwrap();

    let doe = result.bibtex.find("@article{doe2020,").unwrap();
    let lee = result.bibtex.find("@inproceedings{lee1999,").unwrap();
    // Nothing to build a key from, so the old one stays.
    let misc = result.bibtex.find("@misc{noauthor,").unwrap();
    assert!(doe < lee && lee < misc);
}

// ============================================
// Missing keys
// ============================================

#[test]
fn test_missing_key_warnings_per_entry() {
    let result = tidy(
        "@book{title = {A}}\n@article{title = {B}}\n@misc{ok}",
        &TidyOptions::default(),
    )
    .unwrap();
    let messages: Vec<String> = result.warnings.iter().map(|w| w.to_string()).collect();
    assert_eq!(
        messages,
        vec![
            "MISSING_KEY: book entry does not have a citation key.",
            "MISSING_KEY: article entry does not have a citation key.",
        ]
    );
}

// ============================================
// Wrapping
// ============================================

#[test]
fn test_wrapped_lines_stay_within_column() {
    // Given: a narrow wrap column
    let options = TidyOptions {
        wrap: Some(40),
        ..TidyOptions::default()
    };

    // When: the sample is tidied
    let result = tidy(SAMPLE_BIB, &options).unwrap();

    // Then: apart from a field's trailing comma no line passes the column,
    // and wrapping again changes nothing
    for line in result.bibtex.lines() {
        assert!(
            line.trim_end_matches(',').chars().count() <= 40,
            "line too long: {line:?}"
        );
    }
    assert!(result.bibtex.contains("\"Lee, K. and Park, S.\n"));
    let again = tidy(&result.bibtex, &options).unwrap();
    assert_eq!(again.bibtex, result.bibtex);
}

// ============================================
// Options files
// ============================================

#[test]
fn test_options_file_resolves_like_cli_flags() {
    let file: OptionsFile = serde_json::from_str(
        r#"{"sort": true, "duplicates": true, "merge": true, "space": 4, "align": false, "unknownKey": 1}"#,
    )
    .unwrap();
    let options = file.resolve();

    let result = tidy(SAMPLE_WITH_DUPLICATE, &options).unwrap();
    assert_eq!(result.count, 1);
    assert!(result.bibtex.contains("\n    pages = {5--9}\n"));
}

// ============================================
// DOI enrichment
// ============================================

#[test]
fn test_lookup_dois_with_mock_resolver() {
    // Given: a resolver that only knows the second author of lee99
    let resolver = MockResolver::new().found("Park", "10.1/light");
    let queries = resolver.queries.clone();
    let options = TidyOptions {
        lookup_dois: true,
        ..TidyOptions::default()
    };

    // When: tidied with lookups enabled
    let result = tidy_with_resolver(SAMPLE_BIB, &options, Box::new(resolver)).unwrap();

    // Then: authors are tried in order and the DOI is added
    assert_eq!(
        *queries.borrow(),
        vec!["ON THE SPEED OF LIGHT|Lee", "ON THE SPEED OF LIGHT|Park"]
    );
    assert!(result
        .bibtex
        .contains("  year          = 1999,\n  doi           = {10.1/light}\n}"));
    let summary = result.warnings.last().unwrap();
    assert_eq!(summary.code, WarningCode::DoiLookupSuccess);
    assert_eq!(summary.message, "Found 1 DOIs out of 3 entries processed");
}

#[test]
fn test_lookup_failure_is_a_warning() {
    let resolver = MockResolver::new().failing("Lee", 503);
    let options = TidyOptions {
        lookup_dois: true,
        ..TidyOptions::default()
    };

    let result = tidy_with_resolver(SAMPLE_BIB, &options, Box::new(resolver)).unwrap();

    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].code, WarningCode::DoiLookupError);
    assert!(result.warnings[0]
        .message
        .starts_with("Failed to lookup DOI for entry lee99: DOI lookup failed: HTTP 503"));
    assert!(!result.bibtex.contains("10.1/"));
}
