//! Terminal and JSON presentation of provisioning progress

pub mod json;
pub mod progress;
pub mod reporter;
pub mod styles;

use console::Term;
use owo_colors::OwoColorize as _;
pub use styles::Styles;

use crate::domain::StepStatus;

/// Width of the key column printed by [`OutputContext::kv`].
const KEY_WIDTH: usize = 12;

/// Output context carrying styling and terminal state.
pub struct OutputContext {
    pub styles: Styles,
    /// Whether stdout is a TTY.
    pub is_tty: bool,
    /// Whether to suppress everything except failures.
    pub quiet: bool,
}

impl OutputContext {
    /// Colors are used only on a TTY, and never with `--no-color` or `NO_COLOR`.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let mut styles = Styles::default();
        if !no_color && is_tty && std::env::var_os("NO_COLOR").is_none() {
            styles.colorize();
        }
        Self { styles, is_tty, quiet }
    }

    /// Spinners replace `→` lines only on an interactive, non-quiet terminal.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        self.is_tty && !self.quiet
    }

    /// Styled symbol for a step status.
    #[must_use]
    pub fn marker(&self, status: StepStatus) -> String {
        match status {
            StepStatus::Running => "→".style(self.styles.running).to_string(),
            StepStatus::Ok => "✓".style(self.styles.success).to_string(),
            StepStatus::Failed => "✗".style(self.styles.error).to_string(),
        }
    }

    /// Print one step line. Failures go to stderr and ignore `quiet`.
    pub fn step_line(&self, status: StepStatus, message: &str) {
        let line = self.marker_line(status, message);
        match status {
            StepStatus::Failed => eprintln!("{line}"),
            _ if self.quiet => {}
            _ => println!("{line}"),
        }
    }

    /// Indented detail line shown under the current step.
    #[must_use]
    pub fn detail(&self, line: &str) -> String {
        match line.strip_prefix("warning: ") {
            Some(warning) => format!("    {} {warning}", "!".style(self.styles.warning)),
            None => format!("    {}", line.style(self.styles.dim)),
        }
    }

    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", self.marker_line(StepStatus::Ok, msg));
        }
    }

    /// Print an aligned `key  value` row of the final summary.
    pub fn kv(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("    {}  {value}", format!("{key:<KEY_WIDTH$}").style(self.styles.dim));
        }
    }

    fn marker_line(&self, status: StepStatus, msg: &str) -> String {
        format!("  {} {msg}", self.marker(status))
    }
}
