//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`: never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::process::Output;

use anyhow::Result;

use crate::domain::{CertificateBundle, Step, StepStatus, TargetHost};

// ── Remote Execution Ports ────────────────────────────────────────────────────

/// Command execution on the remote host over the command channel.
///
/// Implementations return `Ok` whenever the command ran, whatever its exit
/// status; `Err` means the transport itself failed.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    /// Run a shell command line and capture its output.
    async fn exec(&self, command: &str) -> Result<Output>;
    /// Run a shell command line with `input` written to its stdin, then EOF.
    async fn exec_with_stdin(&self, command: &str, input: &[u8]) -> Result<Output>;
}

/// File transfer over the SFTP sub-protocol.
#[allow(async_fn_in_trait)]
pub trait FileTransfer {
    /// Create or truncate `path`, stream `contents` in fixed-size chunks, and
    /// set the permission bits to `mode`.
    async fn write_file(&self, path: &str, contents: &[u8], mode: i32) -> Result<()>;
}

/// An authenticated connection to one target host.
#[allow(async_fn_in_trait)]
pub trait RemoteSession: RemoteShell {
    type Transfer: FileTransfer;

    /// Open a file-transfer sub-session on the existing connection.
    async fn open_file_transfer(&self) -> Result<Self::Transfer>;
    /// Disconnect. Idempotent.
    async fn close(&self);
}

/// Dials and authenticates a [`RemoteSession`], enforcing the host-key policy.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Session: RemoteSession;

    async fn connect(&self, host: &TargetHost) -> Result<Self::Session>;
}

// ── Host Key Persistence Port ─────────────────────────────────────────────────

/// Persists host keys observed on first contact (trust on first use).
pub trait HostKeyStore {
    /// Look up the pinned key line for `host_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store exists but cannot be read.
    fn load(&self, host_id: &str) -> Result<Option<String>>;

    /// Pin `key_line` (`<algorithm> <base64>`) for `host_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn save(&self, host_id: &str, key_line: &str) -> Result<()>;
}

// ── Certificate Authority Port ────────────────────────────────────────────────

/// The external certificate authority issuing agent mTLS material.
#[allow(async_fn_in_trait)]
pub trait CertificateAuthority {
    /// Issue a fresh certificate for the agent on `host_id` reachable at `address`.
    async fn issue_agent_certificate(
        &self,
        host_id: &str,
        address: &str,
    ) -> Result<CertificateBundle>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Observer for pipeline progress. Both callbacks are fire-and-forget and
/// default to no-ops; the consumer owns durability.
pub trait ProgressReporter {
    /// A step transitioned to `status`.
    fn step(&self, _step: Step, _status: StepStatus, _message: &str) {}
    /// A free-text log line.
    fn log(&self, _line: &str) {}
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {}
