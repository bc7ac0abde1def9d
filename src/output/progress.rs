//! indicatif spinners for the long-running pipeline steps.

#![allow(clippy::expect_used)] // templates are literals, checked at test time

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Spinner for a step with no measurable progress, such as waiting for
/// systemd to report the service active. Indented to line up with the
/// rest of the output.
///
/// # Panics
///
/// Panics only if the template literal is invalid.
#[must_use]
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(TICKS)
            .template("  {spinner:.cyan} {msg}")
            .expect("valid template"),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn finish(pb: &ProgressBar, glyph: &str, msg: &str) {
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {prefix} {msg}")
            .expect("valid template"),
    );
    pb.set_prefix(glyph.to_string());
    pb.finish_with_message(msg.to_string());
}

/// Replace the spinner with a final `✓` line.
pub fn finish_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, "✓", msg);
}

/// Replace the spinner with a final `✗` line.
pub fn finish_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, "✗", msg);
}
