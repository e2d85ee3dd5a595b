//! CLI contract tests.

use assert_cmd::Command;

fn wabridge() -> Command {
    match Command::cargo_bin("wabridge") {
        Ok(cmd) => cmd,
        Err(err) => panic!("binary should build: {err}"),
    }
}

#[test]
fn help_lists_overrides() {
    let output = match wabridge().arg("--help").output() {
        Ok(output) => output,
        Err(err) => panic!("binary should run: {err}"),
    };
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--port"));
    assert!(stdout.contains("--bridge-url"));
    assert!(stdout.contains("--config"));
}

#[test]
fn invalid_bridge_url_fails_fast() {
    let tmp = match tempfile::tempdir() {
        Ok(tmp) => tmp,
        Err(err) => panic!("should create temp dir: {err}"),
    };
    let output = match wabridge()
        .current_dir(tmp.path())
        .env_remove("WABRIDGE_CONFIG_PATH")
        .env_remove("WABRIDGE_BRIDGE_URL")
        .env("RUST_LOG", "info")
        .args(["--bridge-url", "not a url"])
        .output()
    {
        Ok(output) => output,
        Err(err) => panic!("binary should run: {err}"),
    };
    assert!(!output.status.success());

    // Config loading logs before the configured subscriber exists.
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("no config file found"),
        "config loading was not logged: {stderr}"
    );
}

#[cfg(unix)]
#[test]
fn interrupt_shuts_down_cleanly() {
    use std::io::{BufRead, BufReader};
    use std::process::Stdio;
    use std::time::{Duration, Instant};

    let tmp = match tempfile::tempdir() {
        Ok(tmp) => tmp,
        Err(err) => panic!("should create temp dir: {err}"),
    };
    let mut child = match std::process::Command::new(assert_cmd::cargo::cargo_bin("wabridge"))
        .current_dir(tmp.path())
        .env_remove("WABRIDGE_CONFIG_PATH")
        .env("WABRIDGE_HOST", "127.0.0.1")
        .env("RUST_LOG", "info")
        // Nothing listens on the discard port; the sidecar calls fail fast.
        .args(["--port", "0", "--bridge-url", "http://127.0.0.1:9"])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => panic!("binary should start: {err}"),
    };

    let stderr = match child.stderr.take() {
        Some(stderr) => stderr,
        None => panic!("stderr should be piped"),
    };
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next() {
            Some(Ok(line)) if line.contains("App running on") => break,
            Some(Ok(_)) if Instant::now() < deadline => {}
            other => {
                let _ = child.kill();
                panic!("server did not come up: {other:?}");
            }
        }
    }
    // Let the server start polling for the shutdown signal.
    std::thread::sleep(Duration::from_millis(500));
    // Keep draining stderr so the child never blocks on a full pipe.
    std::thread::spawn(move || lines.for_each(drop));

    let signalled = std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status();
    assert!(matches!(signalled, Ok(status) if status.success()));

    let status = match child.wait() {
        Ok(status) => status,
        Err(err) => panic!("binary should exit: {err}"),
    };
    assert!(status.success(), "unclean exit: {status:?}");
}
