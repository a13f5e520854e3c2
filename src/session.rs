//! # Batch Session Module
//!
//! Punto d'ingresso della libreria: traduce le azioni dell'utente (aggiunta
//! file, rimozione, cambio settings, ottimizza, download) in chiamate sullo
//! store e sul dispatcher.
//!
//! ## Responsabilità:
//! - Possiede store, settings, filtro di ingestione e dispatcher
//! - Mantiene la fase esplicita del batch al posto di flag globali
//! - Garantisce al massimo un batch in volo per sessione
//!
//! ## Fasi:
//! ```text
//! Idle ──run──> Running ──ok──> Completed(report)
//!                  └────err───> Failed(message)
//! ```
//! La fase `Running` viene sempre lasciata al termine del batch, qualunque
//! sia l'esito. Anche se il future di `run_batch` viene droppato (timeout
//! esterno) il batch viene annullato e le entry ripristinate.

use crate::config::{Config, Settings};
use crate::dispatch::{BatchReport, BatchResponse, ConversionDispatcher, PreparedBatch};
use crate::error::OptimizeError;
use crate::ingest::{EntryId, IngestionFilter, SourceFile};
use crate::progress::AggregateStats;
use crate::store::{BatchEntryStore, Download};
use tracing::{debug, info, warn};

pub const BATCH_CANCELLED: &str = "batch cancelled";

#[derive(Debug, Clone, PartialEq)]
pub enum BatchPhase {
    Idle,
    Running,
    Completed(BatchReport),
    Failed(String),
}

/// What happened to one selection of files
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub added: Vec<EntryId>,
    pub rejected_count: usize,
    pub duplicate_names: Vec<String>,
}

pub struct BatchSession {
    store: BatchEntryStore,
    settings: Settings,
    filter: IngestionFilter,
    dispatcher: ConversionDispatcher,
    phase: BatchPhase,
}

impl BatchSession {
    pub fn new(config: &Config) -> Result<Self, OptimizeError> {
        let dispatcher = ConversionDispatcher::new(config.server_url.clone(), config.timeout())?;
        Ok(Self::with_parts(
            dispatcher,
            IngestionFilter::new(config.expected_mime.clone()),
            config.settings(),
        ))
    }

    pub fn with_parts(dispatcher: ConversionDispatcher, filter: IngestionFilter, settings: Settings) -> Self {
        Self {
            store: BatchEntryStore::new(),
            settings,
            filter,
            dispatcher,
            phase: BatchPhase::Idle,
        }
    }

    pub fn store(&self) -> &BatchEntryStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &ConversionDispatcher {
        &self.dispatcher
    }

    pub fn phase(&self) -> &BatchPhase {
        &self.phase
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, BatchPhase::Running)
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn set_lossy(&mut self, value: i64) {
        self.settings.set_lossy(value);
    }

    pub fn set_color_count(&mut self, value: i64) {
        self.settings.set_color_count(value);
    }

    /// Filter a selection and add the accepted files to the store
    pub fn ingest(&mut self, candidates: Vec<SourceFile>) -> IngestSummary {
        let report = self.filter.accept(candidates, &self.store.registered_keys());
        let added = self.store.add_all(report.accepted);

        if report.rejected_count > 0 {
            info!(
                "Added {} files, rejected {} ({} duplicates)",
                added.len(),
                report.rejected_count,
                report.duplicate_names.len()
            );
        } else {
            debug!("Added {} files", added.len());
        }

        IngestSummary {
            added,
            rejected_count: report.rejected_count,
            duplicate_names: report.duplicate_names,
        }
    }

    pub fn remove(&mut self, id: &EntryId) -> bool {
        self.store.remove(id)
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }

    pub fn stats(&self) -> AggregateStats {
        AggregateStats::from_entries(self.store.entries())
    }

    pub fn download(&self, id: &EntryId) -> Option<Download> {
        self.store.download(id)
    }

    /// Downloads of every succeeded entry, in display order
    pub fn downloads(&self) -> Vec<Download> {
        self.store
            .entries()
            .iter()
            .filter_map(|e| self.store.download(e.id()))
            .collect()
    }

    /// Run one batch over every current entry.
    ///
    /// If the returned future is dropped before the response arrives (for
    /// example by an outer `tokio::time::timeout`) the batch is cancelled:
    /// entries are reverted and the phase leaves `Running`.
    pub async fn run_batch(&mut self) -> Result<BatchReport, OptimizeError> {
        let prepared = self.begin_batch()?;
        let dispatcher = self.dispatcher.clone();
        let in_flight = InFlight {
            session: self,
            armed: true,
        };
        let response = dispatcher.send(&prepared).await;
        in_flight.finish(prepared, response)
    }

    /// Abandon a running batch without a response.
    ///
    /// Every `Processing` entry goes back to its state before the batch.
    /// Does nothing when no batch is running.
    pub fn cancel_batch(&mut self) {
        if !self.is_running() {
            return;
        }
        warn!("Batch cancelled before its response, reverting in-flight entries");
        self.store.revert_processing();
        self.phase = BatchPhase::Failed(BATCH_CANCELLED.to_string());
    }

    /// First half of a batch: marks entries `Processing` and enters `Running`.
    ///
    /// The returned batch can be sent with a clone of `dispatcher()` while
    /// the session keeps accepting additions and removals.
    pub fn begin_batch(&mut self) -> Result<PreparedBatch, OptimizeError> {
        if self.is_running() {
            return Err(OptimizeError::BatchInProgress);
        }

        match ConversionDispatcher::prepare(&mut self.store, self.settings) {
            Ok(prepared) => {
                self.phase = BatchPhase::Running;
                Ok(prepared)
            }
            Err(e) => {
                self.phase = BatchPhase::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Second half of a batch: applies the response and leaves `Running`
    pub fn finish_batch(
        &mut self,
        prepared: PreparedBatch,
        response: Result<BatchResponse, OptimizeError>,
    ) -> Result<BatchReport, OptimizeError> {
        let result = ConversionDispatcher::settle(&mut self.store, prepared.ticket, response);
        self.phase = match &result {
            Ok(report) => BatchPhase::Completed(report.clone()),
            Err(e) => BatchPhase::Failed(e.to_string()),
        };
        result
    }
}

/// Keeps a running batch from outliving its future
struct InFlight<'a> {
    session: &'a mut BatchSession,
    armed: bool,
}

impl InFlight<'_> {
    fn finish(
        mut self,
        prepared: PreparedBatch,
        response: Result<BatchResponse, OptimizeError>,
    ) -> Result<BatchReport, OptimizeError> {
        self.armed = false;
        self.session.finish_batch(prepared, response)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.cancel_batch();
        }
    }
}
