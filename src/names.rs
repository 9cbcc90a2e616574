//! Author and editor name lists.
//!
//! Splits a rendered `author`/`editor` value into people following the BibTeX
//! conventions: people are separated by the word `and` outside braces, and
//! each person is written as `First von Last`, `von Last, First` or
//! `von Last, Jr, First`. The word `others` stands for "et al.".

/// A parsed entry of a name list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameToken {
    Person(Person),
    /// The `others` marker.
    Others,
}

/// One person from a name list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub first: Option<String>,
    /// Lowercase particle such as `van` or `de la`.
    pub von: Option<String>,
    pub last: String,
    pub jr: Option<String>,
    /// The person's text exactly as it appeared in the list.
    pub raw: String,
}

impl NameToken {
    pub fn person(&self) -> Option<&Person> {
        match self {
            NameToken::Person(person) => Some(person),
            NameToken::Others => None,
        }
    }

    /// Text to use when writing the list back out.
    pub fn raw(&self) -> &str {
        match self {
            NameToken::Person(person) => &person.raw,
            NameToken::Others => "others",
        }
    }
}

/// Parses a name list into people and `others` markers.
///
/// # Arguments
///
/// * `value` - The rendered field value (macros already expanded)
///
/// # Examples
///
/// ```
/// use bibtidy::{parse_name_list, NameToken};
///
/// let names = parse_name_list("Smith, John and Doe, Jane and others");
/// assert_eq!(names.len(), 3);
/// assert_eq!(names[0].person().unwrap().last, "Smith");
/// assert_eq!(names[2], NameToken::Others);
/// ```
pub fn parse_name_list(value: &str) -> Vec<NameToken> {
    split_people(value)
        .into_iter()
        .map(|raw| {
            if raw.eq_ignore_ascii_case("others") {
                NameToken::Others
            } else {
                NameToken::Person(parse_person(raw))
            }
        })
        .collect()
}

/// Joins name tokens back into a BibTeX name list.
pub fn join_name_list(names: &[NameToken]) -> String {
    names
        .iter()
        .map(NameToken::raw)
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Byte ranges of the words of `text`, split on whitespace outside braces.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if c.is_whitespace() && depth == 0 {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

fn split_people(value: &str) -> Vec<&str> {
    let mut people = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    for (start, end) in word_spans(value) {
        if value[start..end].eq_ignore_ascii_case("and") {
            if let Some((s, e)) = current.take() {
                people.push(&value[s..e]);
            }
            continue;
        }
        current = Some(match current {
            Some((s, _)) => (s, end),
            None => (start, end),
        });
    }
    if let Some((s, e)) = current {
        people.push(&value[s..e]);
    }
    people
}

/// Splits on commas outside braces.
fn split_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

fn words(text: &str) -> Vec<&str> {
    word_spans(text)
        .into_iter()
        .map(|(start, end)| &text[start..end])
        .collect()
}

/// A word is a particle when its first letter outside braces is lowercase.
/// Brace groups before any letter make the word count as capitalized.
fn is_lowercase_word(word: &str) -> bool {
    for c in word.chars() {
        if c == '{' {
            return false;
        }
        if c.is_alphabetic() {
            return c.is_lowercase();
        }
    }
    false
}

fn join_words(words: &[&str]) -> Option<String> {
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn parse_person(raw: &str) -> Person {
    let parts = split_commas(raw);
    let (first, von, last, jr) = match parts.as_slice() {
        [single] => first_von_last(&words(single)),
        [von_last, rest @ ..] => {
            let (von, last) = von_last_split(&words(von_last));
            let (jr, first) = match rest {
                [first] => (None, non_empty(first)),
                [jr, first @ ..] => (non_empty(jr), non_empty(&first.join(", "))),
                [] => (None, None),
            };
            (first, von, last, jr)
        }
        [] => (None, None, String::new(), None),
    };
    Person {
        first,
        von,
        last,
        jr,
        raw: raw.to_string(),
    }
}

/// `First von Last`: the particle runs from the first lowercase word to the
/// last lowercase word before the final word.
fn first_von_last(words: &[&str]) -> (Option<String>, Option<String>, String, Option<String>) {
    let Some((last_word, leading)) = words.split_last() else {
        return (None, None, String::new(), None);
    };
    match leading.iter().position(|w| is_lowercase_word(w)) {
        Some(von_start) => {
            let von_end = leading
                .iter()
                .rposition(|w| is_lowercase_word(w))
                .unwrap_or(von_start);
            (
                join_words(&words[..von_start]),
                join_words(&words[von_start..=von_end]),
                words[von_end + 1..].join(" "),
                None,
            )
        }
        None => (join_words(leading), None, (*last_word).to_string(), None),
    }
}

/// `von Last`: leading lowercase words are the particle, at least one word
/// stays in the last name.
fn von_last_split(words: &[&str]) -> (Option<String>, String) {
    let Some((_, leading)) = words.split_last() else {
        return (None, String::new());
    };
    let von_len = leading.iter().take_while(|w| is_lowercase_word(w)).count();
    (join_words(&words[..von_len]), words[von_len..].join(" "))
}
