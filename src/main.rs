//! CLI for bibtidy - Tidy, normalize and deduplicate BibTeX files.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use bibtidy::options::{Toggle, DEFAULT_KEY_PATTERN};
use bibtidy::{tidy, DuplicateRule, MergeStrategy, OptionsFile, TidyOptions};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Tidy, normalize and deduplicate BibTeX files
#[derive(Parser)]
#[command(name = "bibtidy")]
#[command(version)]
#[command(after_help = "\
Examples:
  bibtidy refs.bib
  bibtidy refs.bib -o tidy.bib --curly --numeric --sort=-year
  bibtidy refs.bib --modify --duplicates --merge=combine
  cat refs.bib | bibtidy - --preserve --generate-keys

Options from --config (JSON or TOML, camelCase keys) are applied first;
command-line flags override them.")]
struct Cli {
    /// Input BibTeX files (use '-' for stdin)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Write output to this file (default: stdout)
    #[arg(short, long, conflicts_with = "modify")]
    output: Option<PathBuf>,

    /// Overwrite each input file with its tidied version
    #[arg(short, long)]
    modify: bool,

    /// Options file (JSON or TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from options that keep the input unchanged
    #[arg(long)]
    preserve: bool,

    /// Remove fields, e.g. --omit=abstract,keywords
    #[arg(long, value_delimiter = ',')]
    omit: Option<Vec<String>>,

    /// Enclose all values in braces
    #[arg(long)]
    curly: bool,

    /// Strip delimiters from numeric values
    #[arg(long)]
    numeric: bool,

    /// Rewrite months as three-letter abbreviations
    #[arg(long)]
    months: bool,

    /// Indent fields with N spaces
    #[arg(long, value_name = "N", num_args = 0..=1, require_equals = true, default_missing_value = "2")]
    space: Option<usize>,

    /// Indent fields with a tab
    #[arg(long)]
    tab: bool,

    /// Align values at column N (0 disables)
    #[arg(long, value_name = "N", num_args = 0..=1, require_equals = true, default_missing_value = "14")]
    align: Option<usize>,

    /// Insert a blank line between entries
    #[arg(long)]
    blank_lines: bool,

    /// Sort entries by fields, e.g. --sort=-year,name (default: key)
    #[arg(long, value_name = "FIELDS", num_args = 0..=1, require_equals = true, value_delimiter = ',')]
    sort: Option<Vec<String>>,

    /// Check for duplicates using rules (doi, key, abstract, citation)
    #[arg(long, value_name = "RULES", num_args = 0..=1, require_equals = true, value_delimiter = ',')]
    duplicates: Option<Vec<DuplicateRule>>,

    /// Merge duplicates (first, last, combine, overwrite)
    #[arg(long, value_name = "STRATEGY", num_args = 0..=1, require_equals = true, default_missing_value = "combine")]
    merge: Option<MergeStrategy>,

    /// Remove braces that enclose a whole value
    #[arg(long)]
    strip_enclosing_braces: bool,

    /// Turn all-caps values into title case
    #[arg(long)]
    drop_all_caps: bool,

    /// Do not escape special characters
    #[arg(long)]
    no_escape: bool,

    /// Sort fields, e.g. --sort-fields=title,author (default: built-in order)
    #[arg(long, value_name = "FIELDS", num_args = 0..=1, require_equals = true, value_delimiter = ',')]
    sort_fields: Option<Vec<String>>,

    /// Remove comments
    #[arg(long)]
    strip_comments: bool,

    /// Add a comma after the last field
    #[arg(long)]
    trailing_commas: bool,

    /// Percent-encode URLs
    #[arg(long)]
    encode_urls: bool,

    /// Keep whitespace around comments
    #[arg(long)]
    no_tidy_comments: bool,

    /// Remove fields with empty values
    #[arg(long)]
    remove_empty_fields: bool,

    /// Keep repeated fields
    #[arg(long)]
    no_remove_dupe_fields: bool,

    /// Regenerate citation keys from a pattern
    #[arg(long, value_name = "PATTERN", num_args = 0..=1, require_equals = true, default_missing_value = DEFAULT_KEY_PATTERN)]
    generate_keys: Option<String>,

    /// Truncate author lists longer than N to "and others"
    #[arg(long, value_name = "N")]
    max_authors: Option<usize>,

    /// Keep the case of entry types and field names
    #[arg(long)]
    no_lowercase: bool,

    /// Enclose field values in double braces, e.g. --enclosing-braces=title
    #[arg(long, value_name = "FIELDS", num_args = 0..=1, require_equals = true, value_delimiter = ',')]
    enclosing_braces: Option<Vec<String>>,

    /// Remove braces from field values, e.g. --remove-braces=title
    #[arg(long, value_name = "FIELDS", num_args = 0..=1, require_equals = true, value_delimiter = ',')]
    remove_braces: Option<Vec<String>>,

    /// Wrap long values at column N
    #[arg(long, value_name = "N", num_args = 0..=1, require_equals = true, default_missing_value = "80")]
    wrap: Option<usize>,

    /// Add missing DOIs found on Crossref
    #[arg(long)]
    lookup_dois: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Suppress warnings and logs
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// The options given on the command line, in config-file form.
    fn options_file(&self) -> OptionsFile {
        OptionsFile {
            omit: self.omit.clone(),
            curly: flag(self.curly),
            numeric: flag(self.numeric),
            months: flag(self.months),
            space: self.space.map(Toggle::Value),
            tab: flag(self.tab),
            align: self.align.map(Toggle::Value),
            blank_lines: flag(self.blank_lines),
            sort: self.sort.clone().map(Toggle::Value),
            duplicates: self.duplicates.clone().map(|rules| {
                if rules.is_empty() {
                    Toggle::Flag(true)
                } else {
                    Toggle::Value(rules)
                }
            }),
            merge: self.merge.map(Toggle::Value),
            strip_enclosing_braces: flag(self.strip_enclosing_braces),
            drop_all_caps: flag(self.drop_all_caps),
            escape: negated(self.no_escape),
            sort_fields: self.sort_fields.clone().map(Toggle::Value),
            strip_comments: flag(self.strip_comments),
            trailing_commas: flag(self.trailing_commas),
            encode_urls: flag(self.encode_urls),
            tidy_comments: negated(self.no_tidy_comments),
            remove_empty_fields: flag(self.remove_empty_fields),
            remove_duplicate_fields: negated(self.no_remove_dupe_fields),
            generate_keys: self.generate_keys.clone().map(Toggle::Value),
            max_authors: self.max_authors,
            lowercase: negated(self.no_lowercase),
            enclosing_braces: self.enclosing_braces.clone().map(Toggle::Value),
            remove_braces: self.remove_braces.clone().map(Toggle::Value),
            wrap: self.wrap.map(Toggle::Value),
            lookup_dois: flag(self.lookup_dois),
            preserve: flag(self.preserve),
        }
    }
}

/// A switch that was given sets its option; one that was not leaves it alone.
fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

fn negated(set: bool) -> Option<bool> {
    set.then_some(false)
}

// ---------------------------------------------------------------------------
// AppError — semantic exit codes
// ---------------------------------------------------------------------------

enum AppError {
    /// Exit 10 — input file not found / unreadable
    InputFile(String),
    /// Exit 11 — options file not found / invalid
    Config(String),
    /// Exit 12 — input is not valid BibTeX
    Parse(String),
    /// Exit 13 — cannot write output file
    OutputFile(String),
}

impl AppError {
    fn exit_code(&self) -> i32 {
        match self {
            AppError::InputFile(_) => 10,
            AppError::Config(_) => 11,
            AppError::Parse(_) => 12,
            AppError::OutputFile(_) => 13,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InputFile(msg) => {
                write!(f, "{}\n  hint: verify the file path is correct", msg)
            }
            AppError::Config(msg) => {
                write!(
                    f,
                    "{}\n  hint: the options file must be JSON (.json) or TOML with camelCase keys",
                    msg
                )
            }
            AppError::Parse(msg) => {
                write!(
                    f,
                    "{}\n  hint: check for unbalanced braces or quotes near this position",
                    msg
                )
            }
            AppError::OutputFile(msg) => {
                write!(
                    f,
                    "{}\n  hint: check that the output directory exists and is writable",
                    msg
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

/// Installs a stderr subscriber. `RUST_LOG` wins over `-v`; `-q` silences
/// everything.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "off",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = if quiet {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<(), AppError> {
    let options = resolve_options(cli)?;
    debug!(?options, "resolved options");

    let mut combined = String::new();
    for input in &cli.inputs {
        let source = read_input(input)?;
        let result = tidy(&source, &options)
            .map_err(|e| AppError::Parse(format!("'{}': {}", input.display(), e)))?;

        if !cli.quiet {
            for warning in &result.warnings {
                eprintln!("Warning: {}", warning);
            }
        }

        if cli.modify && input != Path::new("-") {
            fs::write(input, &result.bibtex)
                .map_err(|e| AppError::OutputFile(format!("'{}': {}", input.display(), e)))?;
            if !cli.quiet {
                eprintln!("tidied {} entries, wrote {}", result.count, input.display());
            }
        } else {
            combined.push_str(&result.bibtex);
        }
    }

    if let Some(output_path) = &cli.output {
        fs::write(output_path, &combined).map_err(|e| {
            AppError::OutputFile(format!("'{}': {}", output_path.display(), e))
        })?;
    } else if !combined.is_empty() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        write!(handle, "{}", combined)
            .map_err(|e| AppError::OutputFile(format!("stdout: {}", e)))?;
    }

    Ok(())
}

/// Config file first, command-line flags on top.
fn resolve_options(cli: &Cli) -> Result<TidyOptions, AppError> {
    let base = match &cli.config {
        Some(path) => OptionsFile::load(path)
            .map_err(|e| AppError::Config(format!("'{}': {}", path.display(), e)))?,
        None => OptionsFile::default(),
    };
    Ok(base.overlay(cli.options_file()).resolve())
}

fn read_input(input: &Path) -> Result<String, AppError> {
    if input == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| AppError::InputFile(format!("failed to read from stdin: {}", e)))?;
        Ok(buf)
    } else {
        fs::read_to_string(input)
            .map_err(|e| AppError::InputFile(format!("'{}': {}", input.display(), e)))
    }
}
