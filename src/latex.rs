//! Text helpers for LaTeX-flavoured field values.
//!
//! Holds the table used to escape non-ASCII characters, and the
//! normalizations used when comparing values (duplicate detection) or
//! building citation keys.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// `(character, LaTeX form, ASCII fold)`.
const SPECIAL_CHARACTERS: &[(char, &str, &str)] = &[
    ('À', r"{\`A}", "A"),
    ('Á', r"{\'A}", "A"),
    ('Â', r"{\^A}", "A"),
    ('Ã', r"{\~A}", "A"),
    ('Ä', r#"{\"A}"#, "A"),
    ('Å', r"{\AA}", "A"),
    ('Æ', r"{\AE}", "AE"),
    ('Ç', r"{\c{C}}", "C"),
    ('È', r"{\`E}", "E"),
    ('É', r"{\'E}", "E"),
    ('Ê', r"{\^E}", "E"),
    ('Ë', r#"{\"E}"#, "E"),
    ('Ì', r"{\`I}", "I"),
    ('Í', r"{\'I}", "I"),
    ('Î', r"{\^I}", "I"),
    ('Ï', r#"{\"I}"#, "I"),
    ('Ñ', r"{\~N}", "N"),
    ('Ò', r"{\`O}", "O"),
    ('Ó', r"{\'O}", "O"),
    ('Ô', r"{\^O}", "O"),
    ('Õ', r"{\~O}", "O"),
    ('Ö', r#"{\"O}"#, "O"),
    ('Ø', r"{\O}", "O"),
    ('Ù', r"{\`U}", "U"),
    ('Ú', r"{\'U}", "U"),
    ('Û', r"{\^U}", "U"),
    ('Ü', r#"{\"U}"#, "U"),
    ('Ý', r"{\'Y}", "Y"),
    ('ß', r"{\ss}", "ss"),
    ('à', r"{\`a}", "a"),
    ('á', r"{\'a}", "a"),
    ('â', r"{\^a}", "a"),
    ('ã', r"{\~a}", "a"),
    ('ä', r#"{\"a}"#, "a"),
    ('å', r"{\aa}", "a"),
    ('æ', r"{\ae}", "ae"),
    ('ç', r"{\c{c}}", "c"),
    ('è', r"{\`e}", "e"),
    ('é', r"{\'e}", "e"),
    ('ê', r"{\^e}", "e"),
    ('ë', r#"{\"e}"#, "e"),
    ('ì', r"{\`\i}", "i"),
    ('í', r"{\'\i}", "i"),
    ('î', r"{\^\i}", "i"),
    ('ï', r#"{\"\i}"#, "i"),
    ('ñ', r"{\~n}", "n"),
    ('ò', r"{\`o}", "o"),
    ('ó', r"{\'o}", "o"),
    ('ô', r"{\^o}", "o"),
    ('õ', r"{\~o}", "o"),
    ('ö', r#"{\"o}"#, "o"),
    ('ø', r"{\o}", "o"),
    ('ù', r"{\`u}", "u"),
    ('ú', r"{\'u}", "u"),
    ('û', r"{\^u}", "u"),
    ('ü', r#"{\"u}"#, "u"),
    ('ý', r"{\'y}", "y"),
    ('ÿ', r#"{\"y}"#, "y"),
    ('Ą', r"{\k{A}}", "A"),
    ('ą', r"{\k{a}}", "a"),
    ('Ć', r"{\'C}", "C"),
    ('ć', r"{\'c}", "c"),
    ('Č', r"{\v{C}}", "C"),
    ('č', r"{\v{c}}", "c"),
    ('Ď', r"{\v{D}}", "D"),
    ('ď', r"{\v{d}}", "d"),
    ('Ę', r"{\k{E}}", "E"),
    ('ę', r"{\k{e}}", "e"),
    ('Ě', r"{\v{E}}", "E"),
    ('ě', r"{\v{e}}", "e"),
    ('Ğ', r"{\u{G}}", "G"),
    ('ğ', r"{\u{g}}", "g"),
    ('İ', r"{\.I}", "I"),
    ('ı', r"{\i}", "i"),
    ('Ł', r"{\L}", "L"),
    ('ł', r"{\l}", "l"),
    ('Ń', r"{\'N}", "N"),
    ('ń', r"{\'n}", "n"),
    ('Ň', r"{\v{N}}", "N"),
    ('ň', r"{\v{n}}", "n"),
    ('Ő', r"{\H{O}}", "O"),
    ('ő', r"{\H{o}}", "o"),
    ('Œ', r"{\OE}", "OE"),
    ('œ', r"{\oe}", "oe"),
    ('Ř', r"{\v{R}}", "R"),
    ('ř', r"{\v{r}}", "r"),
    ('Ś', r"{\'S}", "S"),
    ('ś', r"{\'s}", "s"),
    ('Ş', r"{\c{S}}", "S"),
    ('ş', r"{\c{s}}", "s"),
    ('Š', r"{\v{S}}", "S"),
    ('š', r"{\v{s}}", "s"),
    ('Ť', r"{\v{T}}", "T"),
    ('ť', r"{\v{t}}", "t"),
    ('Ů', r"{\r{U}}", "U"),
    ('ů', r"{\r{u}}", "u"),
    ('Ű', r"{\H{U}}", "U"),
    ('ű', r"{\H{u}}", "u"),
    ('Ź', r"{\'Z}", "Z"),
    ('ź', r"{\'z}", "z"),
    ('Ż', r"{\.Z}", "Z"),
    ('ż', r"{\.z}", "z"),
    ('Ž', r"{\v{Z}}", "Z"),
    ('ž', r"{\v{z}}", "z"),
    ('\u{a0}', "~", " "),
    ('–', "--", "-"),
    ('—', "---", "-"),
    ('‘', "`", ""),
    ('’', "'", ""),
    ('“', "``", ""),
    ('”', "''", ""),
    ('…', r"{\ldots}", ""),
    ('§', r"{\S}", ""),
    ('¶', r"{\P}", ""),
    ('©', r"{\textcopyright}", ""),
    ('®', r"{\textregistered}", ""),
    ('°', r"{\textdegree}", ""),
    ('£', r"{\pounds}", ""),
    ('€', r"{\texteuro}", ""),
    ('¿', r"{?`}", ""),
    ('¡', r"{!`}", ""),
    ('α', r"$\alpha$", "alpha"),
    ('β', r"$\beta$", "beta"),
    ('γ', r"$\gamma$", "gamma"),
    ('δ', r"$\delta$", "delta"),
    ('ε', r"$\epsilon$", "epsilon"),
    ('λ', r"$\lambda$", "lambda"),
    ('μ', r"$\mu$", "mu"),
    ('π', r"$\pi$", "pi"),
    ('σ', r"$\sigma$", "sigma"),
    ('ω', r"$\omega$", "omega"),
];

static ESCAPES: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    SPECIAL_CHARACTERS
        .iter()
        .map(|(c, latex, _)| (*c, *latex))
        .collect()
});

static FOLDS: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    SPECIAL_CHARACTERS
        .iter()
        .map(|(c, _, ascii)| (*c, *ascii))
        .collect()
});

static MATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$[^$]*\$").unwrap());
static COMMAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\([a-zA-Z]+|[^a-zA-Z])").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Replaces special characters with their LaTeX equivalents.
///
/// Characters directly after a backslash and anything inside `$...$` are
/// left alone, so escaping already escaped text changes nothing. `&` and `%`
/// are escaped as `\&` and `\%`.
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut after_backslash = false;
    let mut in_math = false;
    for c in text.chars() {
        if after_backslash {
            after_backslash = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => {
                after_backslash = true;
                out.push(c);
            }
            '$' => {
                in_math = !in_math;
                out.push(c);
            }
            _ if in_math => out.push(c),
            '&' => out.push_str(r"\&"),
            '%' => out.push_str(r"\%"),
            _ => match ESCAPES.get(&c) {
                Some(latex) => out.push_str(latex),
                None => out.push(c),
            },
        }
    }
    out
}

/// Normalizes a value for equality checks: math segments, commands and
/// braces are removed, accented letters folded to ASCII, other non-ASCII
/// characters dropped, whitespace collapsed and the result lowercased.
pub fn normalize_for_comparison(text: &str) -> String {
    let text = MATH.replace_all(text, "");
    let text = replace_latex_forms(&text);
    let text = COMMAND.replace_all(&text, "");
    let text: String = fold_chars(&text)
        .filter(|c| c.is_ascii() && *c != '{' && *c != '}')
        .collect();
    WHITESPACE
        .replace_all(text.trim(), " ")
        .to_lowercase()
}

/// Reduces a value to plain ASCII letters and digits for use in citation
/// keys. Escaped and unescaped spellings of the same character fold the
/// same way (`{\"u}` and `ü` both become `u`).
pub fn fold_to_ascii(text: &str) -> String {
    let text = replace_latex_forms(text);
    let text = COMMAND.replace_all(&text, "");
    fold_chars(&text)
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect()
}

/// Replaces braced LaTeX spellings from the character table with ASCII.
fn replace_latex_forms(text: &str) -> String {
    let mut text = text.to_string();
    for (_, latex, ascii) in SPECIAL_CHARACTERS {
        if latex.starts_with('{') && text.contains(latex) {
            text = text.replace(latex, ascii);
        }
    }
    text
}

/// Folds table characters to their ASCII spelling.
fn fold_chars(text: &str) -> impl Iterator<Item = char> + '_ {
    text.chars().flat_map(|c| match FOLDS.get(&c) {
        Some(ascii) => ascii.chars().collect::<Vec<_>>(),
        None => vec![c],
    })
}

/// Removes braces that do not belong to a command argument.
///
/// `{Foo} \textit{bar}` becomes `Foo \textit{bar}`.
pub fn remove_braces(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut keep = vec![true; chars.len()];
    let mut stack: Vec<(usize, bool)> = Vec::new();
    for (i, c) in chars.iter().enumerate() {
        match c {
            '{' => {
                let is_argument = command_precedes(&chars[..i]);
                keep[i] = is_argument;
                stack.push((i, is_argument));
            }
            '}' => {
                if let Some((_, is_argument)) = stack.pop() {
                    keep[i] = is_argument;
                }
            }
            _ => {}
        }
    }
    chars
        .into_iter()
        .zip(keep)
        .filter_map(|(c, keep)| keep.then_some(c))
        .collect()
}

/// Whether `before` ends with a `\command` (letters or a single symbol).
fn command_precedes(before: &[char]) -> bool {
    let letters = before
        .iter()
        .rev()
        .take_while(|c| c.is_ascii_alphabetic())
        .count();
    let rest = &before[..before.len() - letters];
    if letters > 0 {
        return rest.last() == Some(&'\\');
    }
    matches!(rest, [.., '\\', c] if !c.is_ascii_alphanumeric())
}

/// Whether `text` is wrapped in a single brace group, e.g. `{Title}` but not
/// `{A} and {B}`.
pub fn is_enclosed(text: &str) -> bool {
    if !text.starts_with('{') || !text.ends_with('}') {
        return false;
    }
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == text.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Whether every letter outside commands is uppercase (and there is at
/// least one letter).
pub fn is_all_caps(text: &str) -> bool {
    let stripped = COMMAND.replace_all(text, "");
    let mut letters = stripped.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(|c| !c.is_lowercase())
}

static ROMAN_NUMERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^M{0,4}(CM|CD|D?C{0,3})(XC|XL|L?X{0,3})(IX|IV|V?I{0,3})$").unwrap()
});

/// Capitalizes the first letter of each word and lowercases the rest.
/// Roman numerals and command names are left untouched.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();
    let mut in_command = false;
    let flush = |word: &mut String, out: &mut String| {
        if word.is_empty() {
            return;
        }
        if ROMAN_NUMERAL.is_match(word) {
            out.push_str(word);
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(&chars.as_str().to_lowercase());
            }
        }
        word.clear();
    };
    for c in text.chars() {
        if in_command {
            if c.is_ascii_alphabetic() {
                out.push(c);
                continue;
            }
            in_command = false;
        }
        if c.is_alphabetic() {
            word.push(c);
            continue;
        }
        flush(&mut word, &mut out);
        if c == '\\' {
            in_command = true;
        }
        out.push(c);
    }
    flush(&mut word, &mut out);
    out
}
