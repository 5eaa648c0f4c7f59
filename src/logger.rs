use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::moderation::ModerationOutcome;
use crate::pipeline::DiscoverySummary;
use crate::result_sink::SinkTarget;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Summary = 0, // Progress and per-user lines (default)
    Debug = 1,   // Skipped rows, API calls, retries
    Trace = 2,   // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Debug,
            2.. => VerbosityLevel::Trace,
        }
    }

    pub fn filter_directive(self) -> &'static str {
        match self {
            VerbosityLevel::Summary => "banhammer=info",
            VerbosityLevel::Debug => "banhammer=debug",
            VerbosityLevel::Trace => "banhammer=trace",
        }
    }
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over `-v`.
pub fn init_tracing(verbosity: VerbosityLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));

    // Results may go to stdout, so logs stay on stderr
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Console reporting for one run: a progress bar while banning and the final summary.
pub struct RunLogger {
    progress_bar: Mutex<Option<ProgressBar>>,
    started: Instant,
}

impl Default for RunLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLogger {
    pub fn new() -> Self {
        Self {
            progress_bar: Mutex::new(None),
            started: Instant::now(),
        }
    }

    pub fn start_progress(&self, total_steps: u64) {
        let pb = ProgressBar::new(total_steps);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        if let Ok(mut guard) = self.progress_bar.lock() {
            *guard = Some(pb);
        }
    }

    pub fn advance_progress(&self, message: &str) {
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_message(message.to_string());
                pb.inc(1);
            }
        }
    }

    pub fn finish_progress(&self) {
        if let Ok(mut guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    pub fn print_discovery_summary(&self, summary: &DiscoverySummary) {
        println!("\n=== SEARCH SUMMARY ===");
        println!("Duration: {:.2}s", self.started.elapsed().as_secs_f64());
        println!("Pages scanned: {}", summary.scan.pages);
        println!("Items inspected: {}", summary.scan.items_seen);
        println!("Users found: {}", summary.records);
        println!("Scan ended: {}", summary.scan.stop);
        match &summary.target {
            SinkTarget::File(path) => println!("Results exported: {}", path.display()),
            SinkTarget::Stdout => println!("Results exported: stdout"),
        }
        println!("======================\n");
    }

    pub fn print_moderation_summary(&self, outcome: &ModerationOutcome) {
        println!("\n=== BAN SUMMARY ===");
        println!("Duration: {:.2}s", self.started.elapsed().as_secs_f64());
        println!("Users processed: {}", outcome.processed());
        println!("Failed calls: {}", outcome.failures());
        match outcome {
            ModerationOutcome::Completed { .. } => println!("Status: completed"),
            ModerationOutcome::Interrupted { remaining, .. } => {
                println!("Status: interrupted, {} users left", remaining)
            }
        }
        println!("===================\n");
    }
}
