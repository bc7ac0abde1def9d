//! owo-colors stylesheet for terminal output.

use owo_colors::Style;

/// The styles every bridgectl message draws from. Built once by
/// [`crate::output::OutputContext::new`]; plain when color is off, so
/// callers never branch on the color decision themselves.
#[derive(Default, Clone)]
pub struct Styles {
    /// Completed steps and passed checks (green).
    pub success: Style,
    /// Drift, degraded-but-continuing conditions (yellow).
    pub warning: Style,
    /// Failed checks and fatal steps (red).
    pub error: Style,
    /// Progress arrows and neutral notes (cyan).
    pub info: Style,
    /// Keys, paths, suggested commands (dimmed).
    pub dim: Style,
    /// Section headers (bold).
    pub header: Style,
}

impl Styles {
    /// Stylesheet with no styling at all. Rendering through it yields the
    /// message bytes unchanged.
    #[must_use]
    pub fn plain() -> Self {
        Self::default()
    }

    /// Full-color stylesheet.
    #[must_use]
    pub fn colored() -> Self {
        Self {
            success: Style::new().green(),
            warning: Style::new().yellow(),
            error: Style::new().red(),
            info: Style::new().cyan(),
            dim: Style::new().dimmed(),
            header: Style::new().bold(),
        }
    }
}
