//! # GIF Batch Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione del client e settings di compressione
//! - `error`: Errori a livello di batch
//! - `file_manager`: Lettura file, rilevamento tipo, scrittura download, formattazione dimensioni
//! - `ledger`: Handle revocabili per le anteprime in memoria
//! - `ingest`: Filtro di ingestione (tipo media, duplicati, identificativi)
//! - `store`: Collezione ordinata delle entry e loro macchina a stati
//! - `dispatch`: Richiesta batch al servizio e riconciliazione dei risultati
//! - `session`: Orchestratore che tiene insieme tutto, con fase esplicita
//! - `progress`: Spinner/progress bar e statistiche aggregate
//! - `json_output`: Messaggi JSON per l'uso programmatico
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use gif_batch_optimizer::{BatchSession, Config, FileManager};
//!
//! let config = Config::default();
//! let mut session = BatchSession::new(&config)?;
//! session.ingest(FileManager::load_candidates(&paths).await?);
//! let report = session.run_batch().await?;
//! println!("{}", session.stats().format_summary());
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod file_manager;
pub mod ingest;
pub mod json_output;
pub mod ledger;
pub mod progress;
pub mod session;
pub mod store;

pub use config::{Config, Settings};
pub use dispatch::{BatchReport, ConversionDispatcher, EntryOutcome};
pub use error::OptimizeError;
pub use file_manager::FileManager;
pub use ingest::{EntryId, IngestionFilter, SourceFile};
pub use ledger::{PreviewHandle, ResourceLedger};
pub use progress::AggregateStats;
pub use session::{BatchPhase, BatchSession, IngestSummary};
pub use store::{BatchEntryStore, ConversionOutcome, Entry, EntryStatus};
