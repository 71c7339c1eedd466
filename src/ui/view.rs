//! Progress bars for a running batch

use std::collections::HashMap;

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::types::{BatchSummary, DownloadEvent, DownloadResult, DownloadStatus, DownloadTask};

/// Bars count in thousandths
const SCALE: u64 = 1000;

fn overall_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.green/black}] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸ ")
}

fn item_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.green} [{bar:30.cyan/black}] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸ ")
}

fn to_position(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * SCALE as f64).round() as u64
}

/// Renders orchestrator events
pub struct BatchView {
    multi: MultiProgress,
    overall: ProgressBar,
    items: HashMap<usize, ProgressBar>,
    total: usize,
    done: usize,
    show_logs: bool,
}

impl BatchView {
    pub fn new(show_logs: bool) -> Self {
        Self::with_target(ProgressDrawTarget::stderr(), show_logs)
    }

    pub fn with_target(target: ProgressDrawTarget, show_logs: bool) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(SCALE));
        overall.set_style(overall_style());
        overall.set_prefix("Batch");

        Self {
            multi,
            overall,
            items: HashMap::new(),
            total: 0,
            done: 0,
            show_logs,
        }
    }

    pub fn handle(&mut self, event: &DownloadEvent) {
        match event {
            DownloadEvent::BatchStarted { total } => {
                self.total = *total;
                self.overall.set_message(format!("0/{}", total));
            }
            DownloadEvent::ItemStarted { index, task } => {
                let bar = self.multi.add(ProgressBar::new(SCALE));
                bar.set_style(item_style());
                bar.set_message(format!("{} {}", self.position(*index), label(task)));
                bar.enable_steady_tick(std::time::Duration::from_millis(120));
                self.items.insert(*index, bar);
            }
            DownloadEvent::ItemProgress {
                index,
                fraction,
                aggregate,
            } => {
                if let Some(bar) = self.items.get(index) {
                    bar.set_position(to_position(*fraction));
                }
                self.overall.set_position(to_position(*aggregate));
            }
            DownloadEvent::ItemLog { index, line } => {
                if self.show_logs {
                    let _ = self
                        .multi
                        .println(format!("{} {}", self.position(*index), line).dimmed().to_string());
                }
            }
            DownloadEvent::ItemFinished {
                index,
                result,
                aggregate,
            } => {
                self.done += 1;
                self.clear_item(*index);
                let _ = self.multi.println(self.result_line(*index, result));
                self.overall.set_position(to_position(*aggregate));
                self.overall.set_message(format!("{}/{}", self.done, self.total));
            }
            DownloadEvent::ItemCancelled { index } => {
                self.clear_item(*index);
                let _ = self
                    .multi
                    .println(format!("{} {}", self.position(*index), "cancelled".yellow()));
            }
            DownloadEvent::BatchFinished { .. } => self.finish(),
        }
    }

    pub fn finish(&self) {
        for bar in self.items.values() {
            bar.finish_and_clear();
        }
        self.overall.finish_and_clear();
    }

    /// Fraction shown on the overall bar
    pub fn overall_fraction(&self) -> f64 {
        self.overall.position() as f64 / SCALE as f64
    }

    fn clear_item(&mut self, index: usize) {
        if let Some(bar) = self.items.remove(&index) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }

    fn position(&self, index: usize) -> String {
        format!("[{}/{}]", index + 1, self.total)
    }

    fn result_line(&self, index: usize, result: &DownloadResult) -> String {
        let pos = self.position(index);
        let target = result
            .output_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| result.task.url.clone());

        match result.status {
            DownloadStatus::Success => format!("{} {} {}", "✓".green(), pos, target),
            DownloadStatus::Skipped => format!("{} {} {} {}", "↷".cyan(), pos, target, "(already downloaded)".dimmed()),
            DownloadStatus::Failed => format!(
                "{} {} {}: {}",
                "✗".red(),
                pos,
                result.task.url,
                result.error_message.as_deref().unwrap_or("failed").red()
            ),
        }
    }
}

/// Short label for an item bar
fn label(task: &DownloadTask) -> String {
    const MAX: usize = 60;
    let url = &task.url;
    if url.chars().count() <= MAX {
        return url.clone();
    }
    let head: String = url.chars().take(MAX - 1).collect();
    format!("{}…", head)
}

/// One-line report printed after the bars are gone
pub fn summary_line(summary: &BatchSummary) -> String {
    let mut parts = vec![format!("{} succeeded", summary.succeeded).green().to_string()];
    if summary.skipped > 0 {
        parts.push(format!("{} skipped", summary.skipped).cyan().to_string());
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed).red().to_string());
    }
    if summary.not_run > 0 {
        parts.push(format!("{} not run", summary.not_run).yellow().to_string());
    }

    let head = if summary.cancelled {
        "Batch cancelled:".yellow().bold()
    } else {
        "Batch finished:".bold()
    };
    format!("{} {} of {}", head, parts.join(", "), summary.total)
}
