use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::pipeline::ImageOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Stderr reporting for the `annotate` binary. Spinners and bars are drawn
/// only on a TTY; otherwise each stage prints one line when it starts and one
/// when it ends.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn draws(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        let spinner = if self.draws() {
            let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg} {elapsed}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner.set_message(name.to_string());
            Some(spinner)
        } else {
            eprintln!("==> {}", name);
            None
        };
        StageGuard {
            name: name.to_string(),
            note: None,
            start: Instant::now(),
            spinner,
        }
    }

    /// Progress over a batch of `total` images.
    pub fn batch(&self, total: u64) -> BatchProgress {
        let bar = if self.draws() {
            let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
            bar.set_style(
                ProgressStyle::with_template("{bar:30} {pos}/{len} {wide_msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        BatchProgress {
            bar,
            annotated: 0,
            skipped: 0,
        }
    }
}

/// Ends a stage when dropped, reporting its elapsed time and any note.
pub struct StageGuard {
    name: String,
    note: Option<String>,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    /// Detail appended to the completion line.
    pub fn note(&mut self, note: impl Into<String>) {
        self.note = Some(note.into());
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = format_duration(self.start.elapsed());
        let message = match &self.note {
            Some(note) => format!("✔ {}: {} ({})", self.name, note, elapsed),
            None => format!("✔ {} ({})", self.name, elapsed),
        };
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

/// Per-image progress fed from the pipeline callback.
pub struct BatchProgress {
    bar: ProgressBar,
    annotated: usize,
    skipped: usize,
}

impl BatchProgress {
    pub fn record(&mut self, outcome: &ImageOutcome<'_>) {
        match outcome {
            ImageOutcome::Annotated { name, annotation } => {
                self.annotated += 1;
                self.bar.set_message(format!(
                    "{} ({} boxes)",
                    name,
                    annotation.ground_truth_boxes.len()
                ));
            }
            ImageOutcome::Skipped { name, .. } => {
                self.skipped += 1;
                self.bar.set_message(format!("skipped {}", name));
            }
        }
        self.bar.inc(1);
    }

    /// Clear the bar and return a one-line tally.
    pub fn finish(self) -> String {
        self.bar.finish_and_clear();
        format!("{} annotated, {} skipped", self.annotated, self.skipped)
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
