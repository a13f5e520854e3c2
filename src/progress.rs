//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il feedback visivo e le statistiche aggregate.
//!
//! ## Responsabilità:
//! - Spinner con `indicatif` durante il round trip di rete
//! - Progress bar durante la scrittura dei file ottimizzati
//! - Statistiche aggregate derivate dalle entry correnti
//!
//! ## Statistiche:
//! `AggregateStats` è una derivazione pura: viene ricalcolata dalle entry ad
//! ogni lettura e non mantiene stato proprio.
//! - **total_original**: Somma delle dimensioni originali
//! - **total_optimized**: Somma delle dimensioni ottimizzate (0 per le entry senza risultato)
//! - **total_reduction_rate**: Riduzione percentuale, 0 se uno dei due totali è 0
//!
//! ## Visual feedback:
//! ```text
//! ⠋ Optimizing 12 files...
//! ✅ [00:00:01] [========================================] 12/12 (100%) optimized_cat.gif
//! ```

use crate::file_manager::FileManager;
use crate::store::{Entry, EntryStatus};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages progress reporting on the terminal
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

/// Totals derived from the current entry set
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AggregateStats {
    pub files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_original: u64,
    pub total_optimized: u64,
    pub total_reduction_rate: f64,
}

impl AggregateStats {
    pub fn from_entries(entries: &[Entry]) -> Self {
        let mut stats = Self {
            files: entries.len(),
            ..Self::default()
        };

        for entry in entries {
            stats.total_original += entry.original_size();
            stats.total_optimized += entry.optimized_size();
            match entry.status() {
                EntryStatus::Succeeded(_) => stats.succeeded += 1,
                EntryStatus::Failed(_) => stats.failed += 1,
                _ => {}
            }
        }

        if stats.total_original > 0 && stats.total_optimized > 0 {
            stats.total_reduction_rate = FileManager::calculate_reduction(stats.total_original, stats.total_optimized);
        }

        stats
    }

    /// Bytes saved by the results known so far, over succeeded entries only
    pub fn bytes_saved(entries: &[Entry]) -> u64 {
        entries
            .iter()
            .filter(|e| e.result().is_some())
            .map(|e| e.original_size().saturating_sub(e.optimized_size()))
            .sum()
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Files: {} | Optimized: {} | Failed: {} | {} -> {} ({:.2}%)",
            self.files,
            self.succeeded,
            self.failed,
            FileManager::format_size(self.total_original),
            FileManager::format_size(self.total_optimized),
            self.total_reduction_rate
        )
    }
}
