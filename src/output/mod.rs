//! Terminal output for the provisioning pipeline.
//!
//! One [`OutputContext`] is built per run and handed down; it owns the
//! color decision and the quiet switch, so the pipeline never consults the
//! environment while printing. Errors always reach stderr, everything else
//! is suppressible.

pub mod progress;
pub mod reporter;
pub mod styles;

use console::Term;
use owo_colors::OwoColorize as _;
pub use reporter::{ProgressReporter, TerminalReporter};
pub use styles::Styles;

/// Width values in [`OutputContext::kv`] are aligned to.
const KEY_WIDTH: usize = 12;

fn colors_wanted(no_color_flag: bool, is_tty: bool) -> bool {
    !no_color_flag && is_tty && std::env::var_os("NO_COLOR").is_none()
}

/// Styling and verbosity for one run.
pub struct OutputContext {
    /// Stylesheet; plain when color is off.
    pub styles: Styles,
    /// Whether stdout is a TTY.
    pub is_tty: bool,
    /// Whether to suppress non-error output.
    pub quiet: bool,
}

impl OutputContext {
    /// Build the context from the global CLI flags. Color is on only for a
    /// TTY with no `--no-color` and no `NO_COLOR` in the environment.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let styles = if colors_wanted(no_color, is_tty) {
            Styles::colored()
        } else {
            Styles::plain()
        };
        Self {
            styles,
            is_tty,
            quiet,
        }
    }

    /// Whether spinners should animate. They need a live TTY and are noise
    /// under `--quiet`.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        self.is_tty && !self.quiet
    }

    /// A completed step or passed check, prefixed `✓`.
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "✓".style(self.styles.success));
        }
    }

    /// A condition worth seeing that does not stop the run, prefixed `⚠`.
    pub fn warn(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "⚠".style(self.styles.warning));
        }
    }

    /// A failed check or step, prefixed `✗`. Goes to stderr and ignores
    /// `--quiet` so failures stay visible in scripted runs.
    pub fn error(&self, msg: &str) {
        eprintln!("  {} {msg}", "✗".style(self.styles.error));
    }

    /// A neutral note, prefixed `ℹ`.
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "ℹ".style(self.styles.info));
        }
    }

    /// A command the operator can copy and run, indented and dimmed.
    pub fn hint(&self, command: &str) {
        if !self.quiet {
            println!("      {}", command.style(self.styles.dim));
        }
    }

    /// A section header opening one target's output.
    pub fn header(&self, msg: &str) {
        if !self.quiet {
            println!("  {}", msg.style(self.styles.header));
        }
    }

    /// One row of an aligned key-value block, key dimmed.
    pub fn kv(&self, key: &str, value: &str) {
        if !self.quiet {
            // pad before styling so escape codes do not count against the width
            let padded = format!("{key:<KEY_WIDTH$}");
            println!("  {} {value}", padded.style(self.styles.dim));
        }
    }
}
