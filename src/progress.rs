//! Progress reporting for runs
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::config::RunConfig;
use crate::engine::{RunProgress, RunReport};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays run status
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        if let Ok(spinner) = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            bar.set_style(spinner.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &RunProgress) {
        let msg = format!(
            "{} | Done: {} | Failed attempts: {} | Queued: {} | In flight: {} | Rate: {:.0}/s | Workers: {}/{}",
            progress.phase,
            format_number(progress.succeeded),
            format_number(progress.failed_attempts),
            progress.queued,
            progress.in_flight,
            progress.items_per_second(),
            progress.live_workers,
            progress.total_workers,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the run
pub fn print_summary(report: &RunReport, output: &str) {
    let duration_secs = report.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        report.succeeded as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Run Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Discovered:").bold(),
        format_number(report.discovered)
    );
    println!(
        "  {} {}",
        style("Written:").bold(),
        format_number(report.succeeded)
    );
    println!(
        "  {} {} ({} halted, {} abandoned, {} unfinished)",
        style("Failure data:").bold(),
        format_number(report.failure_data()),
        report.halted_items,
        report.abandoned,
        report.leftover
    );
    println!(
        "  {} {}",
        style("Failed attempts:").bold(),
        format_number(report.failed_attempts)
    );
    println!(
        "  {} {} ({} partitions)",
        style("Partition size:").bold(),
        report.partition_size,
        format_number(report.partitions_sent)
    );
    println!(
        "  {} {:.1}s ({:.0} items/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if let Some(cause) = report.halt_cause {
        println!("  {} {}", style("Halted:").bold(), cause);
    }
    if report.dead_workers > 0 {
        println!(
            "  {} {}",
            style("Lost workers:").yellow().bold(),
            report.dead_workers
        );
    }
    if !report.is_balanced() {
        println!(
            "  {} discovered and recorded counts differ",
            style("Warning:").yellow().bold()
        );
    }
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}

/// Print a header at the start of the run
pub fn print_header(config: &RunConfig, output: &str) {
    println!();
    println!(
        "{} {}",
        style("jobherd").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {} ({} processors + writer)",
        style("Workers:").bold(),
        config.cluster_size,
        config.processor_count()
    );
    println!(
        "  {} {}s",
        style("Halt after:").bold(),
        config.halt_after.as_secs()
    );
    println!("  {} {:?}", style("Transport:").bold(), config.transport);
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}
