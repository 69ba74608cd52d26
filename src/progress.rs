//! Progress reporting for set and remove runs
//!
//! Provides a live spinner fed from the orchestrator's shared counters,
//! and the header and summary printed around a run.

use crate::orchestrator::{RunOutcome, RunProgress, RunReport, RunStats};
use chrono::Local;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the spinner message is refreshed from the counters
const REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Progress reporter that displays run status
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,

    /// Stop signal for the refresh thread
    stop: Arc<AtomicBool>,

    /// Refresh thread
    refresher: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Create a reporter refreshing itself from `stats`
    pub fn watch(stats: Arc<RunStats>) -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        let stop = Arc::new(AtomicBool::new(false));
        let refresher = {
            let bar = bar.clone();
            let stop = Arc::clone(&stop);
            let start = Instant::now();
            thread::Builder::new()
                .name("progress".into())
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        bar.set_message(status_line(&stats.snapshot(start.elapsed())));
                        thread::sleep(REFRESH_INTERVAL);
                    }
                })
                .ok()
        };

        Self {
            bar,
            stop,
            refresher,
        }
    }

    /// Finish the progress display with a final message
    pub fn finish(mut self, message: &str) {
        self.halt();
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(mut self) {
        self.halt();
        self.bar.finish_and_clear();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.refresher.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.halt();
    }
}

fn status_line(progress: &RunProgress) -> String {
    format!(
        "Paths: {} | Applied: {} | Failed: {} | Skipped: {} | Traverse: {} | Rate: {:.0}/s",
        format_number(progress.visited),
        format_number(progress.applied),
        format_number(progress.failed),
        format_number(progress.skipped),
        format_number(progress.traverse),
        progress.rate(),
    )
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of a set or remove run
pub fn print_summary(action: &str, report: &RunReport) {
    let summary = &report.summary;
    let title = match report.outcome {
        RunOutcome::Done if summary.failed == 0 => {
            style(format!("{} complete", action)).green().bold()
        }
        RunOutcome::Done => style(format!("{} completed with errors", action))
            .yellow()
            .bold(),
        RunOutcome::NothingToDo => style("Nothing to do: roles already in place".to_string())
            .green()
            .bold(),
        RunOutcome::Aborted(signal) => {
            style(format!("{} aborted by signal {}", action, signal)).red().bold()
        }
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    if report.outcome != RunOutcome::NothingToDo {
        println!("  {} {}", style("Paths:").bold(), format_number(summary.visited));
        println!("  {} {}", style("Applied:").bold(), format_number(summary.applied));
        println!("  {} {}", style("Traverse:").bold(), format_number(summary.traverse));
        if summary.skipped > 0 {
            println!("  {} {}", style("Skipped:").yellow().bold(), format_number(summary.skipped));
        }
        if summary.failed > 0 {
            println!("  {} {}", style("Failed:").yellow().bold(), format_number(summary.failed));
        }
    }
    println!(
        "  {} {:.1}s ({:.0} paths/sec)",
        style("Duration:").bold(),
        summary.elapsed.as_secs_f64(),
        summary.rate()
    );
    println!();
}

/// Print a header at the start of a run
pub fn print_header(action: &str, path: &str, workers: usize) {
    println!();
    println!(
        "{} {}",
        style("filer-acl").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Action:").bold(), action);
    println!("  {} {}", style("Path:").bold(), path);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!(
        "  {} {}",
        style("Started:").bold(),
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_status_line() {
        let line = status_line(&RunProgress {
            visited: 12345,
            applied: 12000,
            failed: 3,
            skipped: 2,
            traverse: 4,
            elapsed: Duration::from_secs(5),
        });
        assert_eq!(
            line,
            "Paths: 12,345 | Applied: 12,000 | Failed: 3 | Skipped: 2 | Traverse: 4 | Rate: 2469/s"
        );
    }
}
