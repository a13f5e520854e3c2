//! # GIF Batch Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione (file + override da CLI)
//! - Lettura dei file, avvio del batch e scrittura dei risultati
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (file/directory, server, lossy, colors, etc.)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Carica la configurazione e applica gli override
//! 4. Legge i file e li passa al filtro di ingestione
//! 5. Esegue UN batch verso il servizio e scrive i file `optimized_*`
//!
//! ## Esempio di utilizzo:
//! ```bash
//! gif-optimizer ./animations --lossy 120 --colors 64 --output ./out --verbose
//! ```

use anyhow::Result;
use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gif_batch_optimizer::json_output::JsonMessage;
use gif_batch_optimizer::progress::ProgressManager;
use gif_batch_optimizer::{BatchSession, Config, EntryStatus, FileManager, IngestSummary};

/// Duplicate names listed before "and N more"
const DUPLICATE_NAMES_SHOWN: usize = 3;

#[derive(Parser)]
#[command(name = "gif-optimizer")]
#[command(about = "Optimize a batch of GIFs through a compression service")]
struct Args {
    /// Files or directories to optimize
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Batch endpoint of the compression service
    #[arg(short, long)]
    server: Option<String>,

    /// Lossy level (0-300, clamped)
    #[arg(short, long, allow_negative_numbers = true)]
    lossy: Option<i64>,

    /// Palette size (2-256, clamped)
    #[arg(short, long, allow_negative_numbers = true)]
    colors: Option<i64>,

    /// Output directory for optimized files (default: current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Configuration file (default: ~/.gif-optimizer/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output progress and results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout stays clean for JSON output
    let default_level = if args.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&args).await?;

    match run(&args.paths, &config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if config.json_output {
                JsonMessage::error(e.to_string(), e.chain().nth(1).map(|s| s.to_string())).emit();
            }
            Err(e)
        }
    }
}

async fn load_config(args: &Args) -> Result<Config> {
    let config_path = args.config.clone().or_else(Config::default_path);
    let mut config = match config_path {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };

    if let Some(ref server) = args.server {
        config.server_url = server.clone();
    }
    if let Some(lossy) = args.lossy {
        config.lossy = lossy;
    }
    if let Some(colors) = args.colors {
        config.colors = colors;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(ref output) = args.output {
        config.output_path = Some(output.clone());
    }
    config.json_output = config.json_output || args.json;

    config.validate()?;
    Ok(config)
}

async fn run(paths: &[PathBuf], config: &Config) -> Result<()> {
    let start_time = Instant::now();

    let files = FileManager::find_candidate_files(paths)?;
    let candidates = FileManager::load_candidates(&files).await?;

    let mut session = BatchSession::new(config)?;
    let summary = session.ingest(candidates);
    report_ingestion(config, &summary);

    let settings = session.settings();
    if config.json_output {
        JsonMessage::start(session.store().len(), &config.server_url, settings).emit();
    } else {
        info!(
            "Optimizing {} files (lossy: {}, colors: {})",
            session.store().len(),
            settings.lossy(),
            settings.color_count()
        );
    }

    let spinner = (!config.json_output)
        .then(|| ProgressManager::spinner(&format!("Optimizing {} files...", session.store().len())));
    let result = session.run_batch().await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    result?;

    let output_dir = config.output_path.clone().unwrap_or_else(|| PathBuf::from("."));
    let progress = (!config.json_output).then(|| ProgressManager::new(session.store().len() as u64));

    let mut taken = HashSet::new();
    for entry in session.store().entries() {
        let output = match session.download(entry.id()) {
            Some(mut download) => {
                download.file_name = FileManager::unique_name(&download.file_name, &taken);
                taken.insert(download.file_name.clone());
                Some(FileManager::save_download(&output_dir, &download).await?)
            }
            None => None,
        };

        if config.json_output {
            JsonMessage::file_complete(entry, output).emit();
            continue;
        }

        let message = match entry.status() {
            EntryStatus::Succeeded(result) => format!(
                "[OK] {}: {} -> {} ({:.1}% saved)",
                entry.name(),
                FileManager::format_size(entry.original_size()),
                FileManager::format_size(result.size),
                result.reduction_rate
            ),
            EntryStatus::Failed(reason) => {
                warn!("{}: {}", entry.name(), reason);
                format!("[ERROR] {}: {}", entry.name(), reason)
            }
            other => format!("[{}] {}", other.label(), entry.name()),
        };
        if let Some(ref progress) = progress {
            progress.update(&message);
        }
    }

    let stats = session.stats();
    if let Some(progress) = progress {
        progress.finish(&stats.format_summary());
    }

    if config.json_output {
        JsonMessage::complete(&stats, start_time.elapsed().as_secs_f64()).emit();
    } else {
        info!("{}", stats.format_summary());
        if stats.failed > 0 {
            error!("{} of {} files could not be optimized", stats.failed, stats.files);
        }
        info!("Results written to {}", output_dir.display());
    }

    Ok(())
}

fn report_ingestion(config: &Config, summary: &IngestSummary) {
    if config.json_output {
        JsonMessage::ingested(summary).emit();
        return;
    }

    if summary.rejected_count == 0 {
        return;
    }

    let mut message = format!(
        "{} files skipped (not {} or already added)",
        summary.rejected_count, config.expected_mime
    );
    if !summary.duplicate_names.is_empty() {
        let shown: Vec<&str> = summary
            .duplicate_names
            .iter()
            .take(DUPLICATE_NAMES_SHOWN)
            .map(String::as_str)
            .collect();
        message.push_str(&format!(". Duplicates: {}", shown.join(", ")));
        let hidden = summary.duplicate_names.len().saturating_sub(DUPLICATE_NAMES_SHOWN);
        if hidden > 0 {
            message.push_str(&format!(" and {} more", hidden));
        }
    }
    warn!("{}", message);
}
