//! Console rendering of a run

use colored::Colorize;
use declarative::{ApplyResult, Reporter, ResourceId, RunSummary, Timing};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::ui;

/// Prints one line per resource and a bar per in-flight download
pub struct ConsoleReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    labels: Mutex<HashMap<usize, String>>,
    why_run: bool,
}

impl ConsoleReporter {
    pub fn new(why_run: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            labels: Mutex::new(HashMap::new()),
            why_run,
        }
    }

    /// Name shown next to download `index`
    pub fn label_download(&self, index: usize, label: impl Into<String>) {
        self.labels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, label.into());
    }

    /// Print without tearing the progress bars
    fn line(&self, text: String) {
        self.multi.suspend(|| println!("{text}"));
    }

    fn bar(&self, index: usize) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        bars.entry(index)
            .or_insert_with(|| {
                let label = self
                    .labels
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&index)
                    .cloned()
                    .unwrap_or_else(|| format!("download #{index}"));
                let bar = self.multi.add(ProgressBar::new(0));
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=>-"),
                );
                bar.set_message(ui::truncate(&label, 48));
                bar
            })
            .clone()
    }
}

impl Reporter for ConsoleReporter {
    fn on_run_start(&self, total: usize) {
        let mode = if self.why_run { " (why-run)" } else { "" };
        self.line(format!(
            "{} Converging {total} resources{mode}",
            "→".blue().bold()
        ));
    }

    fn on_resource_start(&self, id: &ResourceId, description: &str) {
        log::info!("{id}: {description}");
    }

    fn on_resource_updated(&self, id: &ResourceId, result: &ApplyResult) {
        self.line(format!(
            "{} {} {}",
            "✓".green(),
            id.to_string().bold(),
            format!("({})", result.action).dimmed()
        ));
    }

    fn on_resource_skipped(&self, id: &ResourceId, reason: &str) {
        let marker = if reason.starts_with("would ") {
            "~".yellow()
        } else {
            "·".dimmed()
        };
        self.line(format!("{marker} {id} {}", format!("({reason})").dimmed()));
    }

    fn on_resource_failed(&self, id: &ResourceId, error: &str, ignored: bool) {
        if ignored {
            self.line(format!(
                "{} {id}: {error} {}",
                "⚠".yellow(),
                "(ignored)".dimmed()
            ));
        } else {
            self.multi
                .suspend(|| eprintln!("{} {}: {error}", "✗".red(), id.to_string().bold()));
        }
    }

    fn on_notification(&self, source: &str, target: &ResourceId, action: &str, timing: Timing) {
        self.line(format!(
            "  {} {target} {action} {}",
            "↳".cyan(),
            format!("({timing}, from {source})").dimmed()
        ));
    }

    fn on_notification_missing(&self, source: &str, target: &str, action: &str) {
        self.line(format!(
            "  {} {source} notifies {target} to {action}, but it is not declared",
            "⚠".yellow()
        ));
    }

    fn on_download_progress(&self, index: usize, downloaded: u64, total: u64) {
        let bar = self.bar(index);
        if total > 0 {
            bar.set_length(total);
        }
        bar.set_position(downloaded);
        if total > 0 && downloaded >= total {
            bar.finish_and_clear();
        }
    }

    fn refresh(&self) {
        for bar in self
            .bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            if !bar.is_finished() {
                bar.tick();
            }
        }
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        for bar in self
            .bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, bar)| bar)
        {
            bar.finish_and_clear();
        }

        self.multi.suspend(|| {
            ui::header("Summary");
            ui::kv("updated", &summary.updated.to_string());
            ui::kv("up to date", &summary.up_to_date.to_string());
            ui::kv("skipped", &summary.skipped.to_string());
            if summary.failed > 0 {
                ui::kv("failed (ignored)", &summary.failed.to_string().yellow().to_string());
            }
            if !summary.delivered.is_empty() {
                ui::kv("notifications", &summary.delivered.len().to_string());
            }
            if !summary.missing_targets.is_empty() {
                ui::kv(
                    "missing targets",
                    &summary.missing_targets.len().to_string().yellow().to_string(),
                );
            }
        });
    }
}
