//! Command implementations

pub mod install;
pub mod setup;
pub mod status;

use crate::output::OutputContext;
use crate::verify::VerificationReport;

/// Render a check battery, one line per check, with the tally last.
pub(crate) fn print_report(ctx: &OutputContext, report: &VerificationReport) {
    for check in &report.checks {
        if check.passed {
            ctx.success(&format!("{}: {}", check.name, check.detail));
        } else {
            ctx.error(&format!("{}: {}", check.name, check.detail));
        }
    }
    ctx.info(&format!(
        "{} of {} checks passed",
        report.passed(),
        report.checks.len()
    ));
}
