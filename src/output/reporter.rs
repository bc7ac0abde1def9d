//! Progress reporting seam between the pipeline and the terminal.
//!
//! Long-running steps (download, extraction, artifact delivery) report
//! through [`ProgressReporter`] instead of printing, so the same pipeline
//! runs silently under tests and could feed a machine-readable frontend.

use owo_colors::OwoColorize as _;

use crate::output::OutputContext;

/// Event sink for pipeline progress. Sync by design; emitting a line never
/// needs to await.
pub trait ProgressReporter {
    /// A step that has started.
    fn step(&self, message: &str);
    /// A step that finished.
    fn success(&self, message: &str);
    /// A degraded condition the pipeline is working around, such as a
    /// transport falling back.
    fn warn(&self, message: &str);
}

/// Renders progress events as indented terminal lines (`→`, `✓`, `!`),
/// styled through the run's [`OutputContext`] so `--no-color` and
/// `--quiet` apply to them like any other output.
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
}

impl<'a> TerminalReporter<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    fn line(&self, glyph: &str, style: owo_colors::Style, message: &str) {
        if !self.ctx.quiet {
            println!("  {} {message}", glyph.style(style));
        }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        self.line("→", self.ctx.styles.info, message);
    }

    fn success(&self, message: &str) {
        self.line("✓", self.ctx.styles.success, message);
    }

    fn warn(&self, message: &str) {
        self.line("!", self.ctx.styles.warning, message);
    }
}
