//! # Batch Entry Store Module
//!
//! Collezione ordinata delle entry (una per file accettato) e unica fonte di
//! verità sul loro stato di elaborazione.
//!
//! ## Responsabilità:
//! - Aggiunta, rimozione e svuotamento delle entry
//! - Transizioni di stato per entry: `Idle → Processing → {Succeeded | Failed}`
//! - Ciclo di vita degli handle di anteprima tramite `ResourceLedger`
//!
//! ## Gestione risorse:
//! Ogni operazione che distrugge o sostituisce un handle lo rilascia subito:
//! - `remove()` / `clear()` rilasciano gli handle delle entry eliminate
//! - `apply_result()` rilascia il risultato precedente prima di installare il nuovo
//! - il `Drop` dello store rilascia tutto ciò che resta
//!
//! ## Risultato precedente durante un batch:
//! `begin_batch()` ritira il risultato ottimizzato precedente (non più visibile,
//! lo stato diventa `Processing`) ma ne rimanda il rilascio: se il batch fallisce
//! a livello di rete `revert_processing()` lo ripristina, altrimenti viene
//! rilasciato da `apply_result()` o dalla rimozione dell'entry.
//!
//! Le operazioni su un `id` sconosciuto sono no-op, mai errori.

use crate::file_manager::FileManager;
use crate::ingest::{EntryId, EntrySeed, FileKey, SourceFile};
use crate::ledger::{PreviewHandle, ResourceLedger};
use bytes::Bytes;
use std::collections::HashSet;
use tracing::debug;

pub const RESULT_NOT_FOUND: &str = "result not found";

/// Successful conversion installed on an entry
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedResult {
    pub handle: PreviewHandle,
    pub size: u64,
    pub reduction_rate: f64,
}

/// Per-entry state machine
#[derive(Debug, Clone, PartialEq)]
pub enum EntryStatus {
    Idle,
    Processing,
    Succeeded(OptimizedResult),
    Failed(String),
}

impl EntryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
        }
    }
}

/// What the service said about one entry
#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    Succeeded { data: Bytes, size: u64 },
    Failed(String),
    Missing,
}

/// Optimized file ready to be written out
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub data: Bytes,
}

/// One tracked file
#[derive(Debug)]
pub struct Entry {
    id: EntryId,
    source: SourceFile,
    original_handle: PreviewHandle,
    status: EntryStatus,
    retired: Option<OptimizedResult>,
}

impl Entry {
    pub fn id(&self) -> &EntryId {
        &self.id
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    pub fn original_size(&self) -> u64 {
        self.source.size
    }

    pub fn original_handle(&self) -> &PreviewHandle {
        &self.original_handle
    }

    pub fn status(&self) -> &EntryStatus {
        &self.status
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.status, EntryStatus::Processing)
    }

    pub fn result(&self) -> Option<&OptimizedResult> {
        match &self.status {
            EntryStatus::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn optimized_handle(&self) -> Option<&PreviewHandle> {
        self.result().map(|r| &r.handle)
    }

    /// 0 when there is no result
    pub fn optimized_size(&self) -> u64 {
        self.result().map_or(0, |r| r.size)
    }

    /// Only defined once an optimized size is known
    pub fn reduction_rate(&self) -> Option<f64> {
        self.result().filter(|r| r.size > 0).map(|r| r.reduction_rate)
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            EntryStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Key correlating this entry with a result of the batch response.
    ///
    /// The id prefix keeps it unique even when two entries share a name.
    pub fn matching_key(&self) -> String {
        format!("{}_{}", self.id, self.source.name)
    }

    pub fn download_name(&self) -> String {
        format!("optimized_{}", self.source.name)
    }

    /// Release every handle this entry still holds
    fn release_all(&mut self, ledger: &mut ResourceLedger) {
        ledger.release(&self.original_handle);
        self.release_results(ledger);
    }

    /// Release the visible and the retired optimized result, if any
    fn release_results(&mut self, ledger: &mut ResourceLedger) {
        if let Some(retired) = self.retired.take() {
            ledger.release(&retired.handle);
        }
        if let EntryStatus::Succeeded(result) = &self.status {
            ledger.release(&result.handle);
        }
    }
}

/// Ordered collection of entries; insertion order is display order
#[derive(Debug, Default)]
pub struct BatchEntryStore {
    entries: Vec<Entry>,
    ledger: ResourceLedger,
}

impl BatchEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, id: &EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// `(name, size)` of every live entry, for duplicate detection
    pub fn registered_keys(&self) -> HashSet<FileKey> {
        self.entries.iter().map(|e| e.source.key()).collect()
    }

    /// Append new `Idle` entries, each with a fresh preview handle
    pub fn add_all(&mut self, seeds: Vec<EntrySeed>) -> Vec<EntryId> {
        let mut ids = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let original_handle = self.ledger.acquire(seed.file.data.clone());
            ids.push(seed.id.clone());
            self.entries.push(Entry {
                id: seed.id,
                source: seed.file,
                original_handle,
                status: EntryStatus::Idle,
                retired: None,
            });
        }
        ids
    }

    /// Release the entry's handles and drop it. Returns whether it existed.
    pub fn remove(&mut self, id: &EntryId) -> bool {
        let Some(position) = self.entries.iter().position(|e| &e.id == id) else {
            return false;
        };
        let mut entry = self.entries.remove(position);
        entry.release_all(&mut self.ledger);
        debug!("Removed entry {} ({})", entry.id, entry.source.name);
        true
    }

    /// Release every handle and empty the store
    pub fn clear(&mut self) {
        for mut entry in self.entries.drain(..) {
            entry.release_all(&mut self.ledger);
        }
    }

    /// Move every entry to `Processing` and return their ids.
    ///
    /// Error text is cleared. A previous result is retired: hidden from the
    /// entry and released once the batch settles.
    pub fn begin_batch(&mut self) -> Vec<EntryId> {
        let mut ids = Vec::with_capacity(self.entries.len());
        for entry in &mut self.entries {
            let previous = std::mem::replace(&mut entry.status, EntryStatus::Processing);
            if let EntryStatus::Succeeded(result) = previous {
                if let Some(stale) = entry.retired.replace(result) {
                    self.ledger.release(&stale.handle);
                }
            }
            ids.push(entry.id.clone());
        }
        ids
    }

    /// Install the outcome of a conversion on one entry
    pub fn apply_result(&mut self, id: &EntryId, outcome: ConversionOutcome) {
        let Some(entry) = self.entries.iter_mut().find(|e| &e.id == id) else {
            debug!("Dropping result for unknown entry {}", id);
            return;
        };

        entry.release_results(&mut self.ledger);

        entry.status = match outcome {
            ConversionOutcome::Succeeded { data, size } => {
                let handle = self.ledger.acquire(data);
                EntryStatus::Succeeded(OptimizedResult {
                    handle,
                    size,
                    reduction_rate: FileManager::calculate_reduction(entry.source.size, size),
                })
            }
            ConversionOutcome::Failed(reason) => EntryStatus::Failed(reason),
            ConversionOutcome::Missing => EntryStatus::Failed(RESULT_NOT_FOUND.to_string()),
        };
    }

    /// Take every `Processing` entry back to where it was before the batch.
    ///
    /// Entries with a retired result get it back, the rest become `Idle`.
    pub fn revert_processing(&mut self) {
        for entry in &mut self.entries {
            if entry.is_processing() {
                entry.status = match entry.retired.take() {
                    Some(result) => EntryStatus::Succeeded(result),
                    None => EntryStatus::Idle,
                };
            }
        }
    }

    /// Optimized bytes of a succeeded entry, named `optimized_<name>`
    pub fn download(&self, id: &EntryId) -> Option<Download> {
        let entry = self.get(id)?;
        let handle = entry.optimized_handle()?;
        let data = self.ledger.resolve(handle)?.clone();
        Some(Download {
            file_name: entry.download_name(),
            data,
        })
    }
}

impl Drop for BatchEntryStore {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            debug!("Releasing {} entries at session teardown", self.entries.len());
        }
        self.clear();
    }
}
