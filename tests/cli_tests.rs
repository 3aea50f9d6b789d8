use std::process::{Command, Stdio};
use std::str;

// Cargo builds the binary before running integration tests and exposes its
// path through this environment variable.
fn cli_path() -> &'static str {
    env!("CARGO_BIN_EXE_genai_chat_cli")
}

#[test]
fn test_cli_help_message() {
    let output = Command::new(cli_path())
        .arg("--help")
        .output()
        .expect("Failed to execute --help command");

    assert!(output.status.success(), "CLI --help exited with error: {:?}", output);
    let stdout = str::from_utf8(&output.stdout).expect("stdout is not valid UTF-8");

    assert!(stdout.contains("Usage:"), "Help message should contain 'Usage:'");
    assert!(stdout.contains("Options:"), "Help message should contain 'Options:'");
    assert!(stdout.contains("--template"), "Help message should mention --template");
    assert!(stdout.contains("--max-length"), "Help message should mention --max-length");
}

#[test]
fn test_cli_version_message() {
    let output = Command::new(cli_path())
        .arg("--version")
        .output()
        .expect("Failed to execute --version command");

    assert!(output.status.success(), "CLI --version exited with error: {:?}", output);
    let stdout = str::from_utf8(&output.stdout).expect("stdout is not valid UTF-8");
    assert!(
        stdout.contains("0.1.0"),
        "Version output did not contain the package version. Output: {}",
        stdout
    );
}

#[test]
fn test_cli_missing_model_path_exits_one_with_usage() {
    let output = Command::new(cli_path())
        .output()
        .expect("Failed to execute command without arguments");

    assert_eq!(
        output.status.code(),
        Some(1),
        "Missing model path should exit with code 1. Output: {:?}",
        output
    );
    let stderr = str::from_utf8(&output.stderr).expect("stderr is not valid UTF-8");
    assert!(stderr.contains("Usage:"), "Stderr should contain a usage message. Stderr: {}", stderr);
    assert!(
        stderr.contains("MODEL_PATH"),
        "Stderr should name the missing argument. Stderr: {}",
        stderr
    );
}

#[test]
fn test_cli_invalid_max_length_value() {
    let output = Command::new(cli_path())
        .args(["some_model_dir", "--max-length", "not_a_number"])
        .output()
        .expect("Failed to execute command with invalid --max-length");

    assert_eq!(output.status.code(), Some(1), "Output: {:?}", output);
    let stderr = str::from_utf8(&output.stderr).expect("stderr is not valid UTF-8");
    assert!(
        stderr.contains("not_a_number"),
        "Stderr should echo the invalid value. Stderr: {}",
        stderr
    );
}

#[test]
fn test_cli_unknown_template_name() {
    let output = Command::new(cli_path())
        .args(["some_model_dir", "--template", "mystery"])
        .output()
        .expect("Failed to execute command with unknown --template");

    assert_eq!(output.status.code(), Some(1), "Output: {:?}", output);
    let stderr = str::from_utf8(&output.stderr).expect("stderr is not valid UTF-8");
    assert!(
        stderr.contains("mystery"),
        "Stderr should echo the unknown template name. Stderr: {}",
        stderr
    );
}

#[test]
fn test_cli_missing_runtime_library_fails_gracefully() {
    // Point --library at a path that cannot exist so bootstrap fails before
    // any model loading, regardless of what is installed on the host.
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = Command::new(cli_path())
        .arg(dir.path().join("no_such_model"))
        .arg("--library")
        .arg(dir.path().join("libonnxruntime-genai.so"))
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute command with missing library");

    assert_eq!(
        output.status.code(),
        Some(1),
        "Bootstrap failure should exit with code 1. Output: {:?}",
        output
    );
    let stderr = str::from_utf8(&output.stderr).expect("stderr is not valid UTF-8");
    assert!(
        stderr.contains("Application error:"),
        "Stderr should carry the error marker. Stderr: {}",
        stderr
    );
    assert!(
        stderr.contains("Library load error") || stderr.contains("Native API error"),
        "Stderr should describe the load failure. Stderr: {}",
        stderr
    );
}
