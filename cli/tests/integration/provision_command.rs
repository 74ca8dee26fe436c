//! Integration tests for `hostforge provision` input handling.
//!
//! Every case fails before any SSH traffic, or against a closed local port.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("agent"), b"\x7fELF agent").expect("write agent");
        Self { dir }
    }

    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).display().to_string()
    }

    fn provision(&self, host: &str) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hostforge"));
        cmd.env("NO_COLOR", "1")
            .env_remove("HOSTFORGE_ACME_EMAIL")
            .env_remove("HOSTFORGE_PASSWORD")
            .env_remove("HOSTFORGE_IDENTITY_FILE")
            .args(["provision", "--host", host])
            .args(["--agent-binary", &self.path("agent")])
            .args(["--ca-command", "true"])
            .args(["--known-hosts", &self.path("known_hosts")]);
        cmd
    }
}

#[test]
fn test_invalid_email_is_rejected_without_connecting() {
    let fx = Fixture::new();
    fx.provision("192.0.2.1")
        .args(["--password", "x", "--acme-email", "not-an-email"])
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid ACME contact email"));
    assert!(!fx.dir.path().join("known_hosts").exists());
}

#[test]
fn test_invalid_email_json_error_has_code() {
    let fx = Fixture::new();
    let output = fx
        .provision("192.0.2.1")
        .args(["--json", "--password", "x", "--acme-email", "admin@localhost"])
        .timeout(std::time::Duration::from_secs(10))
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(1));
    let last = String::from_utf8_lossy(&output.stdout)
        .lines()
        .last()
        .map(str::to_string)
        .expect("an error line");
    let value: serde_json::Value = serde_json::from_str(&last).expect("JSON error object");
    assert_eq!(value["error"], true);
    assert_eq!(value["code"], "INVALID_EMAIL");
}

#[test]
fn test_missing_credentials_are_rejected() {
    let fx = Fixture::new();
    fx.provision("192.0.2.1")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no credentials"));
}

#[test]
fn test_missing_agent_binary_is_reported() {
    let fx = Fixture::new();
    std::fs::remove_file(fx.dir.path().join("agent")).expect("remove");
    fx.provision("192.0.2.1")
        .args(["--password", "x"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("reading agent binary"));
}

#[test]
fn test_refused_connection_reports_connect_step() {
    let fx = Fixture::new();
    let output = fx
        .provision("127.0.0.1")
        .args(["--json", "--port", "1", "--password", "x"])
        .timeout(std::time::Duration::from_secs(30))
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(1));
    let events: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).expect("NDJSON line"))
        .collect();
    assert_eq!(events[0]["step"], "connect");
    assert_eq!(events[0]["status"], "running");
    assert_eq!(events[1]["status"], "failed");
    assert_eq!(events.last().expect("error")["code"], "CONNECTION_FAILED");
}

#[test]
fn test_host_id_with_newline_is_rejected_without_connecting() {
    let fx = Fixture::new();
    let output = fx
        .provision("192.0.2.1")
        .args(["--json", "--password", "x"])
        .args(["--host-id", "srv-1\nExecStartPre=/bin/true"])
        .timeout(std::time::Duration::from_secs(10))
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("\"step\":\"connect\""), "must fail before connecting");
    let last = stdout.lines().last().expect("an error line");
    let value: serde_json::Value = serde_json::from_str(last).expect("JSON error object");
    assert_eq!(value["code"], "INVALID_ARGUMENT");
}
