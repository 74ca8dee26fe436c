//! Output styles using owo-colors stylesheet pattern

use owo_colors::Style;

/// Centralized stylesheet for CLI output colors.
#[derive(Default, Clone)]
pub struct Styles {
    /// Completed steps (green)
    pub success: Style,
    /// Best-effort degradations (yellow)
    pub warning: Style,
    /// Failed steps (red)
    pub error: Style,
    /// Running steps (cyan)
    pub running: Style,
    /// Dimmed/secondary text
    pub dim: Style,
}

impl Styles {
    /// Apply colors to the stylesheet.
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.warning = Style::new().yellow();
        self.error = Style::new().red();
        self.running = Style::new().cyan();
        self.dim = Style::new().dimmed();
    }
}
