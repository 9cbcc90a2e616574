//! DOI enrichment.
//!
//! Entries without a DOI are looked up by title and author surname against
//! the Crossref works search. Lookups run one at a time in document order and
//! a failed lookup only produces a warning.

use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ast::Value;
use crate::index::Index;
use crate::transforms::Transform;
use crate::warning::{Warning, WarningCode};

/// Crossref works search endpoint.
const CROSSREF_API_URL: &str = "https://api.crossref.org/works";

/// Minimum relevance score for accepting the top search hit.
pub const MIN_SCORE: f64 = 1.0;

/// Errors that can occur while looking up a DOI.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
}

/// Searches an external database for the DOI of a work.
pub trait DoiResolver {
    /// Returns the DOI of the best match for `title` by `author`, if the
    /// match is good enough.
    fn search(&self, title: &str, author: &str) -> Result<Option<String>, LookupError>;
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    message: WorksMessage,
}

#[derive(Debug, Default, Deserialize)]
struct WorksMessage {
    #[serde(default)]
    items: Vec<WorkItem>,
}

#[derive(Debug, Deserialize)]
struct WorkItem {
    #[serde(rename = "DOI")]
    doi: String,
    #[serde(default)]
    score: f64,
}

/// [`DoiResolver`] backed by the Crossref REST API.
#[derive(Default)]
pub struct CrossrefClient {
    client: OnceCell<Client>,
}

impl CrossrefClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&Client, LookupError> {
        self.client
            .get_or_try_init(|| Client::builder().build().map_err(LookupError::Network))
    }
}

impl DoiResolver for CrossrefClient {
    fn search(&self, title: &str, author: &str) -> Result<Option<String>, LookupError> {
        let query = format!("{} {}", normalize_query(title), normalize_query(author));
        let url = format!("{CROSSREF_API_URL}?query={}&rows=1", encode_component(&query));
        debug!(%url, "querying Crossref");

        let response = self
            .client()?
            .get(&url)
            .header(
                USER_AGENT,
                format!("bibtidy/{}", env!("CARGO_PKG_VERSION")),
            )
            .header(ACCEPT, "application/json")
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(LookupError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown error").to_string(),
            });
        }

        let works: WorksResponse = response.json()?;
        Ok(works
            .message
            .items
            .into_iter()
            .next()
            .filter(|item| item.score > MIN_SCORE)
            .map(|item| item.doi))
    }
}

static MATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$.*?\$").unwrap());

/// Strips markup and non-ASCII characters from a search term.
fn normalize_query(text: &str) -> String {
    let text: String = text
        .chars()
        .filter(|c| !matches!(c, '{' | '}' | '\\' | '\'' | '"' | '`' | '^'))
        .collect();
    let text = MATH.replace_all(&text, "");
    text.chars()
        .filter(char::is_ascii)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Percent-encodes everything except unreserved URI characters.
fn encode_component(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Adds a `doi` field to entries that lack one.
pub struct LookupDois {
    resolver: Box<dyn DoiResolver>,
}

impl LookupDois {
    pub fn new(resolver: Box<dyn DoiResolver>) -> Self {
        Self { resolver }
    }

    fn find(&self, title: &str, surnames: &[String]) -> Result<Option<String>, LookupError> {
        for surname in surnames {
            if let Some(doi) = self.resolver.search(title, surname)? {
                return Ok(Some(doi));
            }
        }
        Ok(None)
    }
}

impl Transform for LookupDois {
    fn name(&self) -> &'static str {
        "lookup-dois"
    }

    fn apply(&self, index: &mut Index) -> Vec<Warning> {
        let mut warnings = Vec::new();
        let mut processed = 0;
        let mut found = 0;

        for entry in index.entries() {
            processed += 1;

            let has_doi = index
                .lookup_rendered(entry, "doi")
                .is_some_and(|doi| !doi.trim().is_empty());
            if has_doi {
                continue;
            }
            let Some(title) = index
                .lookup_rendered(entry, "title")
                .filter(|title| !title.trim().is_empty())
            else {
                continue;
            };
            let people = ["author", "editor"].iter().find_map(|name| {
                index
                    .find_field(entry, name)
                    .filter(|field| !index.rendered_value(*field).trim().is_empty())
            });
            let Some(people) = people else {
                continue;
            };
            let surnames: Vec<String> = index
                .name_list(people)
                .iter()
                .filter_map(|name| name.person())
                .map(|person| person.last.clone())
                .filter(|last| !last.is_empty())
                .collect();

            match self.find(&title, &surnames) {
                Ok(Some(doi)) => {
                    debug!(key = index.key(entry), %doi, "found DOI");
                    index.add_field(entry, "doi", Value::braced(doi));
                    found += 1;
                }
                Ok(None) => {}
                Err(err) => {
                    let key = index.key(entry).unwrap_or("(no key)");
                    warn!(key, error = %err, "DOI lookup failed");
                    warnings.push(Warning::new(
                        WarningCode::DoiLookupError,
                        format!("Failed to lookup DOI for entry {key}: DOI lookup failed: {err}"),
                    ));
                }
            }
        }

        if found > 0 {
            warnings.push(Warning::new(
                WarningCode::DoiLookupSuccess,
                format!("Found {found} DOIs out of {processed} entries processed"),
            ));
        }
        warnings
    }
}
