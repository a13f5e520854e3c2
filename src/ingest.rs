//! # Ingestion Filter Module
//!
//! Decide quali file candidati entrano nello store.
//!
//! ## Responsabilità:
//! - Scarta i file con tipo media diverso da quello atteso
//! - Scarta i duplicati per chiave `(name, size)`, sia rispetto ai file già
//!   registrati sia all'interno della stessa selezione
//! - Assegna a ogni file accettato un identificativo unico per il processo
//!
//! Nessun I/O e nessuna acquisizione di risorse: gli handle di anteprima
//! vengono creati dallo store, dopo l'accettazione.

use bytes::Bytes;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_ENTRY_SEQ: AtomicU64 = AtomicU64::new(1);

/// Opaque entry identifier, unique for the lifetime of the process.
///
/// Built from a monotonically increasing counter plus a random salt. Only
/// ASCII digits, lowercase hex and `-` are used, all of which survive the
/// service's filename sanitisation unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntryId(String);

impl EntryId {
    pub fn next() -> Self {
        let seq = NEXT_ENTRY_SEQ.fetch_add(1, Ordering::Relaxed);
        let salt: u16 = rand::random();
        Self(format!("{}-{:04x}", seq, salt))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Original file payload as selected by the user
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub size: u64,
    pub mime: String,
    pub data: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            size: data.len() as u64,
            mime: mime.into(),
            data,
        }
    }

    pub fn key(&self) -> FileKey {
        FileKey {
            name: self.name.clone(),
            size: self.size,
        }
    }
}

/// Identity used for duplicate detection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileKey {
    pub name: String,
    pub size: u64,
}

/// Accepted file waiting to become an entry
#[derive(Debug, Clone)]
pub struct EntrySeed {
    pub id: EntryId,
    pub file: SourceFile,
}

/// Result of filtering one selection
#[derive(Debug, Default)]
pub struct IngestionReport {
    pub accepted: Vec<EntrySeed>,
    pub rejected_count: usize,
    pub duplicate_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IngestionFilter {
    expected_mime: String,
}

impl IngestionFilter {
    pub fn new(expected_mime: impl Into<String>) -> Self {
        Self {
            expected_mime: expected_mime.into(),
        }
    }

    pub fn expected_mime(&self) -> &str {
        &self.expected_mime
    }

    /// Split a selection into accepted seeds and rejections, in input order
    pub fn accept(&self, candidates: Vec<SourceFile>, registered: &HashSet<FileKey>) -> IngestionReport {
        let mut report = IngestionReport::default();
        let mut seen_in_batch: HashSet<FileKey> = HashSet::new();

        for file in candidates {
            if !file.mime.eq_ignore_ascii_case(&self.expected_mime) {
                debug!("Rejecting {}: type {} is not {}", file.name, file.mime, self.expected_mime);
                report.rejected_count += 1;
                continue;
            }

            let key = file.key();
            if registered.contains(&key) || seen_in_batch.contains(&key) {
                debug!("Rejecting duplicate {} ({} bytes)", file.name, file.size);
                report.rejected_count += 1;
                report.duplicate_names.push(file.name);
                continue;
            }

            seen_in_batch.insert(key);
            report.accepted.push(EntrySeed {
                id: EntryId::next(),
                file,
            });
        }

        report
    }
}
