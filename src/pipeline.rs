//! Builds the ordered list of transforms for a set of options and runs it.
//!
//! The order is fixed. Passes that add or remove entries run before the
//! per-value passes. Keys are generated from the final values, and sorting
//! runs last so it sees final values and keys.

use tracing::debug;

use crate::doi::{CrossrefClient, DoiResolver, LookupDois};
use crate::index::Index;
use crate::options::TidyOptions;
use crate::transforms::{
    Curly, DropAllCaps, EncloseInBraces, EncodeUrls, Escape, GenerateKeys, Lowercase, MaxAuthors,
    MergeEntries, Months, Numeric, RemoveBraces, RemoveDuplicateFields, RemoveEmptyFields,
    RemoveFields, SortEntries, SortFields, StripEnclosingBraces, Transform,
};
use crate::warning::Warning;

/// An ordered sequence of transforms.
pub struct Pipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    /// Builds the pipeline for `options`, using Crossref for DOI lookups.
    pub fn new(options: &TidyOptions) -> Self {
        Self::build(options, None)
    }

    /// Builds the pipeline with a custom DOI resolver.
    pub fn with_resolver(options: &TidyOptions, resolver: Box<dyn DoiResolver>) -> Self {
        Self::build(options, Some(resolver))
    }

    fn build(options: &TidyOptions, resolver: Option<Box<dyn DoiResolver>>) -> Self {
        let mut transforms: Vec<Box<dyn Transform>> = Vec::new();

        if options.lowercase {
            transforms.push(Box::new(Lowercase));
        }
        if !options.omit.is_empty() {
            transforms.push(Box::new(RemoveFields::new(&options.omit)));
        }
        if options.remove_empty_fields {
            transforms.push(Box::new(RemoveEmptyFields));
        }
        if options.remove_duplicate_fields {
            transforms.push(Box::new(RemoveDuplicateFields));
        }
        if options.lookup_dois {
            let resolver = resolver
                .unwrap_or_else(|| Box::new(CrossrefClient::new()) as Box<dyn DoiResolver>);
            transforms.push(Box::new(LookupDois::new(resolver)));
        }
        let rules = options.duplicate_rules();
        if !rules.is_empty() {
            transforms.push(Box::new(MergeEntries::new(rules, options.merge)));
        }
        if let Some(max) = options.max_authors {
            transforms.push(Box::new(MaxAuthors::new(max)));
        }

        if options.strip_enclosing_braces {
            transforms.push(Box::new(StripEnclosingBraces));
        }
        if options.drop_all_caps {
            transforms.push(Box::new(DropAllCaps));
        }
        if !options.remove_braces.is_empty() {
            transforms.push(Box::new(RemoveBraces::new(&options.remove_braces)));
        }
        if !options.enclosing_braces.is_empty() {
            transforms.push(Box::new(EncloseInBraces::new(&options.enclosing_braces)));
        }
        if options.escape {
            transforms.push(Box::new(Escape));
        }
        if options.encode_urls {
            transforms.push(Box::new(EncodeUrls));
        }
        if options.months {
            transforms.push(Box::new(Months));
        }
        if options.numeric {
            transforms.push(Box::new(Numeric));
        }
        if options.curly {
            transforms.push(Box::new(Curly));
        }

        if let Some(pattern) = &options.generate_keys {
            transforms.push(Box::new(GenerateKeys::new(pattern)));
        }
        if let Some(keys) = &options.sort {
            transforms.push(Box::new(SortEntries::new(keys.clone())));
        }
        if let Some(order) = &options.sort_fields {
            transforms.push(Box::new(SortFields::new(order)));
        }

        Self { transforms }
    }

    /// Transform names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Applies every transform in order and collects their warnings.
    pub fn run(&self, index: &mut Index) -> Vec<Warning> {
        let mut warnings = Vec::new();
        for transform in &self.transforms {
            let raised = transform.apply(index);
            debug!(
                transform = transform.name(),
                warnings = raised.len(),
                "applied transform"
            );
            warnings.extend(raised);
        }
        warnings
    }
}
