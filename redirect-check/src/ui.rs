//! Terminal display for redirect-check.
//!
//! Header, dry-run report and end-of-run summary. Uses only the `console`
//! crate. Everything here goes to stdout; logs go to stderr.

use console::style;
use redirect_check_lib::{InputSurvey, RunConfig, RunSummary};
use std::time::Duration;

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a run.
pub fn print_header(input: &str, output: &str, config: &RunConfig) {
    println!(
        "{} {} {}",
        style("redirect-check").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!("· {} → {}", input, output)).dim(),
    );

    let meta_parts = [
        format!("Workers: {}", config.workers),
        format!("Rate: {}/s", config.rate_per_second),
        format!("Queue: {}", config.queue_capacity),
        format!("Probe: {}", config.probe),
        format!("Timeout: {}s", config.http.timeout.as_secs()),
    ];
    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

// ── Dry run ──────────────────────────────────────────────────────────────────

/// Print what a run over `input` would check.
pub fn print_survey(input: &str, report: &InputSurvey) {
    println!("{} {}", style("Dry run:").yellow().bold(), input);
    println!(
        "  {} row{} read, {} valid, {} skipped",
        style(report.rows).bold(),
        plural(report.rows),
        report.valid_rows,
        report.skipped_rows,
    );
    println!(
        "  {} eligible pair{} would be checked",
        style(report.eligible_pairs).bold(),
        plural(report.eligible_pairs),
    );
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the final summary bar with colored counts.
pub fn print_summary(summary: &RunSummary, output: &str) {
    let duration = Duration::from_millis(summary.duration_ms as u64);

    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} pair{} in {:.1}s  {}  {}  {}  {}  {}  {}",
        style(summary.pairs_evaluated).bold(),
        plural(summary.pairs_evaluated),
        duration.as_secs_f64(),
        style("|").dim(),
        style(format!("{} redirect", summary.redirect)).red(),
        style("|").dim(),
        style(format!("{} change", summary.change)).green(),
        style("|").dim(),
        style(format!("{} analyze", summary.analyze)).yellow(),
    );
    println!(
        "  {}",
        style(format!(
            "{} rows read, {} admitted, {} skipped, {} not admitted",
            summary.rows_read, summary.rows_admitted, summary.rows_skipped, summary.rows_not_admitted
        ))
        .dim()
    );

    if summary.cancelled {
        println!(
            "  {}",
            style("Run cancelled; results so far were written.").yellow()
        );
    }
    println!("  {} {}", style("Output:").dim(), output);
}
