//! Progress display for apply and destroy runs.

use colored::Colorize;
use declarative::{Outcome, ProgressCallback, ResourceId};
use indicatif::{ProgressBar, ProgressStyle};

use crate::ui;

/// Progress bar over the operations of a plan, printing one line per
/// finished operation above the bar.
pub struct ApplyProgress {
    bar: ProgressBar,
    wave: usize,
    verbose: bool,
}

impl ApplyProgress {
    pub fn new(total: usize, quiet: bool, verbose: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self {
            bar,
            wave: 0,
            verbose,
        }
    }

    /// Remove the bar once the run is over
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_wave_start(&mut self, count: usize) {
        self.wave += 1;
        if self.verbose {
            let wave = self.wave;
            self.bar.suspend(|| {
                println!("  {} wave {wave}: {count} operations", "→".cyan());
            });
        }
    }

    fn on_operation_start(&mut self, _id: &ResourceId, description: &str) {
        self.bar.set_message(ui::truncate_middle(description, 40));
    }

    fn on_operation_complete(&mut self, id: &ResourceId, outcome: &Outcome) {
        let detail = match outcome {
            Outcome::Failed { error } => format!(" ({error})").red().to_string(),
            Outcome::Skipped { because } => format!(" ({because} did not complete)")
                .dimmed()
                .to_string(),
            _ => String::new(),
        };
        self.bar.suspend(|| {
            println!(
                "  {} {} {}{detail}",
                ui::outcome_symbol(outcome),
                id,
                ui::outcome_label(outcome)
            );
        });
        self.bar.inc(1);
    }

    fn on_wave_complete(&mut self) {}
}
