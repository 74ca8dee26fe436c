//! Human-readable `ProgressReporter` for interactive runs.

use std::cell::RefCell;

use indicatif::ProgressBar;

use crate::application::ports::ProgressReporter;
use crate::domain::{Step, StepStatus};
use crate::output::{OutputContext, progress};

/// Terminal progress reporter that wraps an `OutputContext`.
///
/// - running steps show a spinner on a TTY, `"  → {message}"` otherwise
/// - finished steps print `"  ✓ {message}"` or `"  ✗ {message}"`
/// - log lines print dimmed under the current step; lines starting with
///   `warning:` print as `"  ! {message}"`
///
/// Everything except failures is suppressed when `ctx.quiet`.
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
    spinner: RefCell<Option<ProgressBar>>,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self {
            ctx,
            spinner: RefCell::new(None),
        }
    }

    fn finish(&self, status: StepStatus, message: &str) {
        match self.spinner.borrow_mut().take() {
            Some(pb) => progress::finish_with(&pb, &self.ctx.marker(status), message),
            None => self.ctx.step_line(status, message),
        }
    }

    fn print(&self, line: &str) {
        match self.spinner.borrow().as_ref() {
            Some(pb) => pb.println(line),
            None => println!("{line}"),
        }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, _step: Step, status: StepStatus, message: &str) {
        match status {
            StepStatus::Failed => self.finish(status, message),
            _ if self.ctx.quiet => {}
            StepStatus::Running if self.ctx.show_progress() => {
                if let Some(previous) = self.spinner.replace(Some(progress::spinner(message))) {
                    previous.finish_and_clear();
                }
            }
            StepStatus::Running => self.ctx.step_line(status, message),
            StepStatus::Ok => self.finish(status, message),
        }
    }

    fn log(&self, line: &str) {
        tracing::debug!(target: "hostforge::progress", "{line}");
        if !self.ctx.quiet {
            self.print(&self.ctx.detail(line));
        }
    }
}

impl Drop for TerminalReporter<'_> {
    fn drop(&mut self) {
        if let Some(pb) = self.spinner.get_mut().take() {
            pb.finish_and_clear();
        }
    }
}
