//! Typed domain error enums.
//!
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator. Callers that need to tell kinds apart (for example a
//! timeout from a confirmed failure) use `anyhow::Error::downcast_ref`.

use thiserror::Error;

// ── Remote command errors ─────────────────────────────────────────────────────

/// Errors produced by a single remote command.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The command ran and exited non-zero.
    #[error("`{command}` exited with {}: {stderr}", exit_label(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The deadline elapsed before the command completed. The remote process
    /// was not terminated and may still finish on the host.
    #[error("`{command}` timed out after {secs}s (remote outcome unknown)")]
    Timeout { command: String, secs: u64 },
}

impl RemoteError {
    /// Returns `true` for [`RemoteError::Timeout`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The captured error stream, if the command ran to completion.
    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { stderr, .. } => Some(stderr),
            Self::Timeout { .. } => None,
        }
    }
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "unknown status".to_string(), |c| format!("status {c}"))
}

// ── Provisioning errors ───────────────────────────────────────────────────────

/// Errors raised by the provisioning pipeline itself.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("cannot connect to {addr}: {reason}")]
    Connection { addr: String, reason: String },

    #[error("host key for {addr} does not match the pinned key (expected {expected}, got {actual})")]
    HostKeyMismatch {
        addr: String,
        expected: String,
        actual: String,
    },

    #[error("invalid ACME contact email {0:?}: expected an address like admin@example.com")]
    InvalidEmail(String),

    #[error("{field} {value:?} contains a control character")]
    UnsafeValue { field: &'static str, value: String },

    #[error("agent binary upload failed: sftp: {primary}; shell fallback: {fallback}")]
    Transfer { primary: String, fallback: String },
}
