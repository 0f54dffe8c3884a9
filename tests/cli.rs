use std::process::Stdio;

use tempfile::tempdir;
use tokio::process::Command;

#[tokio::test]
async fn config_subcommand_prints_commented_defaults() {
    let output = Command::new(env!("CARGO_BIN_EXE_pasta"))
        .arg("config")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .expect("pasta config should run");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout
        .lines()
        .all(|line| line.is_empty() || line.starts_with('#')));
}

#[tokio::test]
async fn config_subcommand_respects_explicit_path() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("pasta.toml");
    std::fs::write(
        &config_path,
        "[pasta.logging]\nlevel = \"debug\"\nmax_size = 5\n",
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_pasta"))
        .arg("--config")
        .arg(&config_path)
        .arg("config")
        .output()
        .await
        .expect("pasta config should run");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    // A non-default config is rendered uncommented.
    assert!(stdout.contains("level = \"debug\""));
}

#[tokio::test]
async fn wrap_without_a_real_tty_fails_fast() {
    // The test harness's own stdin is not a terminal, so `wrap` should
    // surface NotATty rather than hang waiting on a pty it can't allocate.
    let output = Command::new(env!("CARGO_BIN_EXE_pasta"))
        .arg("wrap")
        .arg("--")
        .arg("true")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .expect("pasta wrap should run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not a terminal") || stderr.contains("NotATty"));
}
