//! JSON output helpers.
//!
//! `--json` mode streams one event object per line (NDJSON) to stdout while a
//! command runs, then prints a final result or error object.

use std::cell::RefCell;
use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::application::ports::ProgressReporter;
use crate::domain::{ProvisionError, RemoteError, Step, StepStatus};

/// One progress event.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Event<'a> {
    Step {
        step: Step,
        status: StepStatus,
        message: &'a str,
    },
    Log {
        message: &'a str,
    },
}

/// Progress reporter writing NDJSON events to `out`.
pub struct JsonReporter<W: Write> {
    out: RefCell<W>,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn emit(&self, event: &Event<'_>) {
        let mut out = self.out.borrow_mut();
        let written = serde_json::to_writer(&mut *out, event)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(out))
            .and_then(|()| out.flush());
        if let Err(e) = written {
            tracing::warn!(error = %e, "failed to write progress event");
        }
    }
}

impl<W: Write> ProgressReporter for JsonReporter<W> {
    fn step(&self, step: Step, status: StepStatus, message: &str) {
        self.emit(&Event::Step {
            step,
            status,
            message,
        });
    }

    fn log(&self, line: &str) {
        self.emit(&Event::Log { message: line });
    }
}

/// Format the JSON error object printed when a command fails.
///
/// ```json
/// {"event":"error","error":true,"message":"...","code":"..."}
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "event": "error",
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string(&obj).context("JSON serialization failed")
}

/// Stable machine-readable code for the most specific known error kind.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ProvisionError>() {
            return match e {
                ProvisionError::Connection { .. } => "CONNECTION_FAILED",
                ProvisionError::HostKeyMismatch { .. } => "HOST_KEY_MISMATCH",
                ProvisionError::InvalidEmail(_) => "INVALID_EMAIL",
                ProvisionError::UnsafeValue { .. } => "INVALID_ARGUMENT",
                ProvisionError::Transfer { .. } => "TRANSFER_FAILED",
            };
        }
        if let Some(e) = cause.downcast_ref::<RemoteError>() {
            return if e.is_timeout() {
                "REMOTE_TIMEOUT"
            } else {
                "REMOTE_COMMAND_FAILED"
            };
        }
    }
    "FAILED"
}
