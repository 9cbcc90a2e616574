//! CLI integration tests.
//!
//! Tests the command-line interface by running the binary as a subprocess.

mod common;

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::NamedTempFile;

use common::{SAMPLE_BIB, SAMPLE_WITH_DUPLICATE};

/// Path to the compiled binary
fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_bibtidy"))
}

/// Helper to create a temporary file with content
fn create_temp_file(content: &str, extension: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn bibtidy(args: &[&str]) -> Output {
    Command::new(binary_path())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

const SMALL_BIB: &str = "@ARTICLE{k,\n  Title = \"Fish & Chips\",\n  year = \"2001\"\n}\n";

const SMALL_TIDY: &str = "@article{k,\n  title         = \"Fish \\& Chips\",\n  year          = \"2001\"\n}\n";

// ============================================
// Tests for CLI argument parsing
// ============================================

#[test]
fn test_cli_help() {
    // Given: The CLI binary
    let output = bibtidy(&["--help"]);

    // Then: Help is displayed with expected content
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("bibtidy") && stdout.contains("--sort"),
        "Help should mention the tool name and options: {}",
        stdout
    );
    assert!(output.status.success(), "Help should exit with success");
}

#[test]
fn test_cli_version() {
    let output = bibtidy(&["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_requires_input() {
    let output = bibtidy(&[]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2), "clap usage errors exit with 2");
}

// ============================================
// Tests for tidying
// ============================================

#[test]
fn test_cli_tidies_file_to_stdout() {
    // Given: a small bibliography file
    let input = create_temp_file(SMALL_BIB, ".bib");

    // When: tidied with default options
    let output = bibtidy(&[input.path().to_str().unwrap()]);

    // Then: the tidied text is printed and the file is untouched
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), SMALL_TIDY);
    assert_eq!(fs::read_to_string(input.path()).unwrap(), SMALL_BIB);
}

#[test]
fn test_cli_reads_stdin() {
    let mut child = Command::new(binary_path())
        .args(["-", "--curly", "--numeric"])
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn command");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(SMALL_BIB.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "@article{k,\n  title         = {Fish \\& Chips},\n  year          = 2001\n}\n"
    );
}

#[test]
fn test_cli_writes_output_file() {
    let input = create_temp_file(SMALL_BIB, ".bib");
    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("tidy.bib");

    let output = bibtidy(&[
        input.path().to_str().unwrap(),
        "-o",
        out_path.to_str().unwrap(),
    ]);

    assert!(output.status.success());
    assert!(output.stdout.is_empty(), "nothing goes to stdout with -o");
    assert_eq!(fs::read_to_string(&out_path).unwrap(), SMALL_TIDY);
}

#[test]
fn test_cli_modify_rewrites_input() {
    let input = create_temp_file(SMALL_BIB, ".bib");

    let output = bibtidy(&[input.path().to_str().unwrap(), "--modify"]);

    assert!(output.status.success());
    assert_eq!(fs::read_to_string(input.path()).unwrap(), SMALL_TIDY);
    assert!(String::from_utf8_lossy(&output.stderr).contains("tidied 1 entries"));
}

#[test]
fn test_cli_sort_flag_with_value() {
    let input = create_temp_file("@misc{a, year = 1990}\n@misc{b, year = 2020}\n", ".bib");

    let output = bibtidy(&[input.path().to_str().unwrap(), "--sort=-year", "--align=0"]);

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "@misc{b,\n  year = 2020\n}\n@misc{a,\n  year = 1990\n}\n"
    );
}

#[test]
fn test_cli_preserve_keeps_input() {
    let input = create_temp_file(SAMPLE_BIB, ".bib");
    let output = bibtidy(&[input.path().to_str().unwrap(), "--preserve"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), SAMPLE_BIB);
}

#[test]
fn test_cli_config_file_with_flag_override() {
    // Given: a TOML config asking for tabs and curly braces
    let config = create_temp_file("tab = true\ncurly = true\nalign = false\n", ".toml");
    let input = create_temp_file(SMALL_BIB, ".bib");

    // When: run with the config and an extra flag
    let output = bibtidy(&[
        input.path().to_str().unwrap(),
        "--config",
        config.path().to_str().unwrap(),
        "--no-escape",
    ]);

    // Then: both sources apply
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "@article{k,\n\ttitle = {Fish & Chips},\n\tyear = {2001}\n}\n"
    );
}

#[test]
fn test_cli_json_config() {
    let config = create_temp_file(r#"{"space": 4, "align": false}"#, ".json");
    let input = create_temp_file("@misc{a, note = {x}}", ".bib");

    let output = bibtidy(&[
        input.path().to_str().unwrap(),
        "--config",
        config.path().to_str().unwrap(),
    ]);

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "@misc{a,\n    note = {x}\n}\n"
    );
}

// ============================================
// Tests for warnings
// ============================================

#[test]
fn test_cli_prints_warnings_to_stderr() {
    let input = create_temp_file(SAMPLE_WITH_DUPLICATE, ".bib");

    let output = bibtidy(&[input.path().to_str().unwrap(), "--duplicates"]);

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Warning: DUPLICATE_ENTRY: doe-copy appears to be a duplicate of Doe2020"),
        "stderr: {}",
        stderr
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("@article{doe-copy,"));
}

#[test]
fn test_cli_merge_flag_and_quiet() {
    let input = create_temp_file(SAMPLE_WITH_DUPLICATE, ".bib");

    let output = bibtidy(&[input.path().to_str().unwrap(), "--merge", "--quiet"]);

    assert!(output.status.success());
    assert!(output.stderr.is_empty(), "--quiet silences warnings");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("doe-copy"));
    assert!(stdout.contains("pages         = {5--9}"));
}

// ============================================
// Tests for exit codes
// ============================================

#[test]
fn test_cli_missing_input_exit_code() {
    let output = bibtidy(&["/nonexistent/refs.bib"]);
    assert_eq!(output.status.code(), Some(10));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}

#[test]
fn test_cli_bad_config_exit_code() {
    let config = create_temp_file("{not json", ".json");
    let input = create_temp_file(SMALL_BIB, ".bib");

    let output = bibtidy(&[
        input.path().to_str().unwrap(),
        "--config",
        config.path().to_str().unwrap(),
    ]);

    assert_eq!(output.status.code(), Some(11));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid JSON"));
}

#[test]
fn test_cli_parse_error_exit_code() {
    let input = create_temp_file("@article{k,\n  title = {open\n", ".bib");

    let output = bibtidy(&[input.path().to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(12));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unterminated braced value at line 2, column 11"), "stderr: {}", stderr);
}

#[test]
fn test_cli_unwritable_output_exit_code() {
    let input = create_temp_file(SMALL_BIB, ".bib");

    let output = bibtidy(&[
        input.path().to_str().unwrap(),
        "-o",
        "/nonexistent/dir/out.bib",
    ]);

    assert_eq!(output.status.code(), Some(13));
}
