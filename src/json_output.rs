//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso programmatico.
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout
//! - Costruisce i messaggi a partire da entry, report e statistiche esistenti
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del batch (file, endpoint, settings)
//! - `ingested`: Esito dell'ingestione (accettati, rifiutati, duplicati)
//! - `file_complete`: Esito di un singolo file
//! - `complete`: Fine del batch con statistiche aggregate
//! - `error`: Errore a livello di batch

use crate::config::Settings;
use crate::progress::AggregateStats;
use crate::session::IngestSummary;
use crate::store::Entry;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start {
        total_files: usize,
        endpoint: String,
        lossy: u16,
        colors: u16,
    },

    #[serde(rename = "ingested")]
    Ingested {
        accepted: usize,
        rejected: usize,
        duplicates: Vec<String>,
    },

    #[serde(rename = "file_complete")]
    FileComplete {
        id: String,
        name: String,
        original_size: u64,
        optimized_size: u64,
        reduction_percent: Option<f64>,
        output: Option<PathBuf>,
        error: Option<String>,
    },

    #[serde(rename = "complete")]
    Complete {
        files: usize,
        succeeded: usize,
        failed: usize,
        total_original: u64,
        total_optimized: u64,
        total_reduction_percent: f64,
        duration_seconds: f64,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(total_files: usize, endpoint: &str, settings: Settings) -> Self {
        Self::Start {
            total_files,
            endpoint: endpoint.to_string(),
            lossy: settings.lossy(),
            colors: settings.color_count(),
        }
    }

    pub fn ingested(summary: &IngestSummary) -> Self {
        Self::Ingested {
            accepted: summary.added.len(),
            rejected: summary.rejected_count,
            duplicates: summary.duplicate_names.clone(),
        }
    }

    /// Crea un messaggio di completamento file
    pub fn file_complete(entry: &Entry, output: Option<PathBuf>) -> Self {
        Self::FileComplete {
            id: entry.id().to_string(),
            name: entry.name().to_string(),
            original_size: entry.original_size(),
            optimized_size: entry.optimized_size(),
            reduction_percent: entry.reduction_rate(),
            output,
            error: entry.error().map(str::to_string),
        }
    }

    pub fn complete(stats: &AggregateStats, duration_seconds: f64) -> Self {
        Self::Complete {
            files: stats.files,
            succeeded: stats.succeeded,
            failed: stats.failed,
            total_original: stats.total_original,
            total_optimized: stats.total_optimized,
            total_reduction_percent: stats.total_reduction_rate,
            duration_seconds,
        }
    }

    /// Crea un messaggio di errore
    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_tagged() {
        let message = JsonMessage::error("No files to optimize".to_string(), None);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "No files to optimize");

        let start = serde_json::to_value(JsonMessage::start(3, "http://x/api", Settings::new(10, 16))).unwrap();
        assert_eq!(start["type"], "start");
        assert_eq!(start["lossy"], 10);
        assert_eq!(start["colors"], 16);
    }

    #[test]
    fn test_complete_carries_stats() {
        let stats = AggregateStats {
            files: 2,
            succeeded: 1,
            failed: 1,
            total_original: 2000,
            total_optimized: 500,
            total_reduction_rate: 75.0,
        };
        let value = serde_json::to_value(JsonMessage::complete(&stats, 1.5)).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["succeeded"], 1);
        assert_eq!(value["total_reduction_percent"], 75.0);
    }
}
