//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore a livello di batch.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per gli errori che interrompono un batch
//! - Fornisce messaggi di errore leggibili dall'utente
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `NoFiles`: Batch richiesto senza file (nessuna chiamata di rete)
//! - `BatchInProgress`: Un batch è già in esecuzione
//! - `Transport`: Errore di rete, nessuna risposta dal servizio
//! - `Server`: Richiesta rifiutata dal servizio (status non-success)
//! - `MalformedResponse`: Risposta di successo con formato inatteso
//! - `Io`: Errori di I/O (lettura file, scrittura download)
//!
//! ## Errori per-file:
//! Gli errori di un singolo file (risultato mancante, errore del servizio,
//! base64 corrotto) NON sono rappresentati qui: restano confinati nello
//! stato `Failed(reason)` della singola entry e non interrompono mai il batch.
//!
//! ## Esempio:
//! ```rust,ignore
//! if store.is_empty() {
//!     return Err(OptimizeError::NoFiles);
//! }
//! ```

/// Batch-level errors
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("No files to optimize")]
    NoFiles,

    #[error("A batch is already running")]
    BatchInProgress,

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response from server: {0}")]
    MalformedResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for OptimizeError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            OptimizeError::Transport(format!("request timed out: {}", error))
        } else {
            OptimizeError::Transport(error.to_string())
        }
    }
}

impl OptimizeError {
    /// True when the service was never reached or its answer could not be used.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::MalformedResponse(_))
    }
}
