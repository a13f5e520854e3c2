//! # Resource Ledger Module
//!
//! Registro delle risorse di anteprima (l'equivalente degli object URL).
//!
//! ## Responsabilità:
//! - Associa un payload binario a un handle revocabile (`blob:<uuid>`)
//! - Garantisce che ogni handle creato venga rilasciato una sola volta
//! - Permette di risolvere un handle nei byte originali (anteprima, download)
//!
//! ## Contratto:
//! - `acquire()` non fallisce mai e restituisce un handle unico tra quelli vivi
//! - `release()` va chiamato esattamente una volta per handle, prima che
//!   l'entry che lo referenzia venga scartata
//! - Un doppio rilascio è un bug del chiamante: viene loggato, non causa panic

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Revocable reference to locally held preview data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle(String);

impl PreviewHandle {
    fn generate() -> Self {
        Self(format!("blob:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owns every live preview resource of a session
#[derive(Debug, Default)]
pub struct ResourceLedger {
    live: HashMap<PreviewHandle, Bytes>,
    acquired: u64,
    released: u64,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload and hand out a fresh handle for it
    pub fn acquire(&mut self, payload: Bytes) -> PreviewHandle {
        let mut handle = PreviewHandle::generate();
        while self.live.contains_key(&handle) {
            handle = PreviewHandle::generate();
        }

        debug!("Acquired {} ({} bytes)", handle, payload.len());
        self.live.insert(handle.clone(), payload);
        self.acquired += 1;
        handle
    }

    /// Revoke a handle and drop the data it referenced
    pub fn release(&mut self, handle: &PreviewHandle) {
        if self.live.remove(handle).is_some() {
            self.released += 1;
            debug!("Released {}", handle);
        } else {
            warn!("Release of unknown or already released handle {}", handle);
        }
    }

    /// Bytes behind a live handle
    pub fn resolve(&self, handle: &PreviewHandle) -> Option<&Bytes> {
        self.live.get(handle)
    }

    pub fn is_live(&self, handle: &PreviewHandle) -> bool {
        self.live.contains_key(handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn acquired_count(&self) -> u64 {
        self.acquired
    }

    pub fn released_count(&self) -> u64 {
        self.released
    }
}
