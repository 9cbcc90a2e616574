//! Shared test inputs and helpers for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use bibtidy::{DoiResolver, LookupError};

/// A small bibliography touching most syntax: comments, a macro, a preamble,
/// quoted and braced values, concatenation and an e-mail address in free text.
pub const SAMPLE_BIB: &str = r#"% Library export
% contact: librarian@example.org

@string{jcs = "Journal of Chemical Stuff"}
@preamble{"\newcommand{\noop}[1]{}"}

@ARTICLE{Doe2020,
  AUTHOR = {Doe, Jane and {\"O}zt{\"u}rk, Ali},
  Title = {{Caffeine} & Cognition},
  journal = jcs,
  year = "2020",
  month = "August",
  doi = {10.5555/caffeine},
}

@inproceedings{lee99,
  author = "Lee, K. and Park, S. and Kim, M. and Choi, H.",
  title = {ON THE SPEED OF LIGHT},
  booktitle = {Proc. } # jcs,
  pages = {1--10},
  year = 1999
}

@misc{noauthor,
  title = "Untitled",
  url = {http://example.com/a b}
}
"#;

/// `SAMPLE_BIB` with a second copy of `Doe2020` under another key and a
/// differently written DOI.
pub const SAMPLE_WITH_DUPLICATE: &str = r#"@article{Doe2020,
  author = {Doe, Jane},
  title = {Caffeine and Cognition},
  doi = {10.5555/caffeine}
}

@article{doe-copy,
  author = {Doe, J.},
  title = {Caffeine and cognition},
  doi = {https://doi.org/10.5555/CAFFEINE},
  pages = {5--9}
}
"#;

/// Answers DOI searches from a fixed table keyed by author surname and
/// records every query as `title|author`.
#[derive(Default, Clone)]
pub struct MockResolver {
    pub answers: Vec<(String, Result<Option<String>, u16>)>,
    pub queries: Rc<RefCell<Vec<String>>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers searches for `surname` with `doi`.
    pub fn found(mut self, surname: &str, doi: &str) -> Self {
        self.answers
            .push((surname.to_string(), Ok(Some(doi.to_string()))));
        self
    }

    /// Fails searches for `surname` with an HTTP status.
    pub fn failing(mut self, surname: &str, status: u16) -> Self {
        self.answers.push((surname.to_string(), Err(status)));
        self
    }
}

impl DoiResolver for MockResolver {
    fn search(&self, title: &str, author: &str) -> Result<Option<String>, LookupError> {
        self.queries.borrow_mut().push(format!("{title}|{author}"));
        match self.answers.iter().find(|(surname, _)| surname == author) {
            Some((_, Ok(doi))) => Ok(doi.clone()),
            Some((_, Err(status))) => Err(LookupError::Status {
                status: *status,
                message: "Service Unavailable".to_string(),
            }),
            None => Ok(None),
        }
    }
}
