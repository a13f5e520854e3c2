//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file locali.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva dei file candidati in directory
//! - Lettura dei file candidati e rilevamento del tipo media
//! - Scrittura sicura (atomica) dei file ottimizzati scaricati
//! - Formattazione human-readable delle dimensioni
//! - Calcolo percentuali di riduzione
//!
//! ## Rilevamento tipo media:
//! - Prima i magic bytes (`image::guess_format`)
//! - Poi l'estensione del file come fallback
//! - `application/octet-stream` se nessuno dei due è riconosciuto
//!
//! ## Esempio:
//! ```rust,ignore
//! let paths = FileManager::find_candidate_files(&inputs)?;
//! let candidates = FileManager::load_candidates(&paths).await?;
//! println!("{}", FileManager::format_size(1536)); // "1.50 KB"
//! ```

use crate::ingest::SourceFile;
use crate::store::Download;
use anyhow::Result;
use bytes::Bytes;
use image::ImageFormat;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

const UNITS: &[&str] = &["Bytes", "KB", "MB", "GB", "TB"];
const FALLBACK_MIME: &str = "application/octet-stream";

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Expand the given paths into a flat list of files.
    ///
    /// Files are kept as given, directories are walked recursively. Order is
    /// preserved so ingestion sees files in the order the user named them.
    pub fn find_candidate_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for input in inputs {
            if input.is_file() {
                files.push(input.clone());
            } else if input.is_dir() {
                let mut found: Vec<PathBuf> = WalkDir::new(input)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.path().to_path_buf())
                    .collect();
                found.sort();
                debug!("Found {} files under {}", found.len(), input.display());
                files.extend(found);
            } else {
                return Err(anyhow::anyhow!("Path does not exist: {}", input.display()));
            }
        }

        Ok(files)
    }

    /// Read one file into a candidate for ingestion
    pub async fn load_candidate(path: &Path) -> Result<SourceFile> {
        let data = fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?
            .to_string_lossy()
            .to_string();
        let mime = Self::detect_mime(path, &data);

        Ok(SourceFile::new(name, mime, Bytes::from(data)))
    }

    /// Read every path into a candidate, in order
    pub async fn load_candidates(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
        let mut candidates = Vec::with_capacity(paths.len());
        for path in paths {
            candidates.push(Self::load_candidate(path).await?);
        }
        Ok(candidates)
    }

    /// Determine the media type of a file from its content, then its extension
    pub fn detect_mime(path: &Path, content: &[u8]) -> String {
        let format = image::guess_format(content).ok().or_else(|| {
            path.extension()
                .and_then(|ext| ImageFormat::from_extension(ext))
        });

        format
            .and_then(Self::mime_for_format)
            .unwrap_or(FALLBACK_MIME)
            .to_string()
    }

    fn mime_for_format(format: ImageFormat) -> Option<&'static str> {
        match format {
            ImageFormat::Gif => Some("image/gif"),
            ImageFormat::Png => Some("image/png"),
            ImageFormat::Jpeg => Some("image/jpeg"),
            ImageFormat::WebP => Some("image/webp"),
            ImageFormat::Bmp => Some("image/bmp"),
            ImageFormat::Tiff => Some("image/tiff"),
            _ => None,
        }
    }

    /// Write a download into `dir`, atomically.
    ///
    /// The bytes go to a temporary file in the same directory first and are
    /// renamed into place, so an interrupted write never leaves a truncated
    /// `optimized_*` file behind.
    pub async fn save_download(dir: &Path, download: &Download) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create output directory {}: {}", dir.display(), e))?;

        let destination = dir.join(&download.file_name);
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(&download.data)?;
        temp.flush()?;
        temp.persist(&destination)
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", destination.display(), e.error))?;

        debug!("Saved {} ({})", destination.display(), Self::format_size(download.data.len() as u64));
        Ok(destination)
    }

    /// `name` itself, or `stem (n).ext` with the smallest `n` not in `taken`.
    ///
    /// Two entries may share a file name (same name, different folders), and
    /// their downloads would otherwise land on the same output path.
    pub fn unique_name(name: &str, taken: &HashSet<String>) -> String {
        if !taken.contains(name) {
            return name.to_string();
        }

        let path = Path::new(name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
        let extension = path.extension().and_then(|e| e.to_str());

        let mut n = 1;
        loop {
            let candidate = match extension {
                Some(ext) => format!("{} ({}).{}", stem, n, ext),
                None => format!("{} ({})", stem, n),
            };
            if !taken.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        if size == 0 {
            return "0 Bytes".to_string();
        }

        // Largest unit whose base is <= size, i.e. floor(log1024(size))
        let mut unit_index = 0;
        let mut threshold: u64 = 1024;
        while unit_index < UNITS.len() - 1 && size >= threshold {
            unit_index += 1;
            threshold = threshold.saturating_mul(1024);
        }

        let scaled = size as f64 / 1024f64.powi(unit_index as i32);
        format!("{:.2} {}", scaled, UNITS[unit_index])
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
