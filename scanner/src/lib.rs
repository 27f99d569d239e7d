//! Filesystem scanning for the gallery: retrying stat reads, recursive
//! directory walks, and shared progress counters.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How many handled files between progress log lines.
const PROGRESS_LOG_BATCH: u64 = 100;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Root Error: {0}")]
    Root(String),
}

/// Extensions treated as images when no custom set is configured.
pub fn default_image_extensions() -> HashSet<String> {
    ["jpg", "jpeg", "png", "gif", "bmp", "heic", "heif"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

/// Metadata for one filesystem entry, captured at scan time.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub name: String,
    pub extension: String,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub is_image: bool,
}

/// Point-in-time copy of the scan counters, safe to hand to serializers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub scanning_active: bool,
    pub total_files: u64,
    pub processed_files: u64,
    pub current_directory: String,
    pub error_count: u64,
}

/// Scan counters shared between the scanning worker and request handlers.
///
/// Every field is updated independently and atomically; readers take a
/// [`snapshot`](Self::snapshot) instead of holding any lock across fields.
#[derive(Debug, Default)]
pub struct ScanProgress {
    scanning_active: AtomicBool,
    total_files: AtomicU64,
    processed_files: AtomicU64,
    error_count: AtomicU64,
    current_directory: RwLock<String>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the active flag on, failing if a scan already holds it.
    ///
    /// Winning also zeroes the counters before this returns: a snapshot
    /// taken after an accepted begin reflects the new pass, never the
    /// previous pass's terminal numbers.
    pub fn try_begin(&self) -> bool {
        let begun = self
            .scanning_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if begun {
            self.reset();
        }
        begun
    }

    pub fn finish(&self) {
        self.scanning_active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.scanning_active.load(Ordering::SeqCst)
    }

    /// Zero the counters for a fresh pass. The active flag is left alone.
    pub fn reset(&self) {
        self.total_files.store(0, Ordering::Relaxed);
        self.processed_files.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.current_directory
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn set_total(&self, total: u64) {
        self.total_files.store(total, Ordering::Relaxed);
    }

    /// Count one handled file; returns the running total.
    pub fn record_processed(&self) -> u64 {
        self.processed_files.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_current_directory(&self, dir: &Path) {
        let mut current = self
            .current_directory
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = dir.display().to_string();
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let total_files = self.total_files.load(Ordering::Relaxed);
        // Files created between the counting and stat passes could push the
        // raw count past the total; keep the reported ratio bounded.
        let processed_files = self
            .processed_files
            .load(Ordering::Relaxed)
            .min(total_files);
        ProgressSnapshot {
            scanning_active: self.is_active(),
            total_files,
            processed_files,
            current_directory: self
                .current_directory
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }
}

/// Everything one full walk produced: the stat-ed files plus one message per
/// subtree that could not be enumerated.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub files: Vec<FileRecord>,
    pub errors: Vec<String>,
}

/// Walks a root directory and stats every file under it, retrying transient
/// failures. Built for network mounts that drop out for seconds at a time.
#[derive(Debug)]
pub struct FileScanner {
    root: PathBuf,
    retry_attempts: u32,
    retry_delay: Duration,
    image_extensions: HashSet<String>,
    progress: Arc<ScanProgress>,
}

impl FileScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileScanner {
            root: root.into(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            image_extensions: default_image_extensions(),
            progress: Arc::new(ScanProgress::new()),
        }
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    pub fn with_image_extensions(mut self, extensions: HashSet<String>) -> Self {
        self.image_extensions = extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared handle to the live counters; clone freely across tasks.
    pub fn progress(&self) -> Arc<ScanProgress> {
        Arc::clone(&self.progress)
    }

    /// Membership test against the configured image-extension set.
    /// Case-insensitive and tolerant of a leading dot.
    pub fn is_image(&self, extension: &str) -> bool {
        self.image_extensions
            .contains(&extension.trim_start_matches('.').to_lowercase())
    }

    /// Stat a single path, retrying transient failures.
    ///
    /// Returns `None` for missing paths and non-files without retrying, and
    /// for paths that stay unreadable after every attempt. Never errors
    /// outward; failures end up in the log.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub fn scan_file(&self, path: &Path) -> Option<FileRecord> {
        let metadata = self.stat_with_retry(path, |p| fs::metadata(p))?;
        if !metadata.is_file() {
            return None;
        }
        Some(self.record_from_metadata(path, &metadata))
    }

    fn stat_with_retry<F>(&self, path: &Path, mut stat: F) -> Option<fs::Metadata>
    where
        F: FnMut(&Path) -> io::Result<fs::Metadata>,
    {
        for attempt in 1..=self.retry_attempts {
            match stat(path) {
                Ok(metadata) => return Some(metadata),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!("Skipping {}: {}", path.display(), e);
                    return None;
                }
                Err(e) if attempt < self.retry_attempts => {
                    tracing::warn!(
                        "Retry {}/{} accessing {}: {}",
                        attempt,
                        self.retry_attempts,
                        path.display(),
                        e
                    );
                    thread::sleep(self.retry_delay);
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to access {} after {} attempts: {}",
                        path.display(),
                        self.retry_attempts,
                        e
                    );
                }
            }
        }
        None
    }

    fn record_from_metadata(&self, path: &Path, metadata: &fs::Metadata) -> FileRecord {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        // Not every filesystem reports a creation time.
        let created = metadata
            .created()
            .map(DateTime::<Utc>::from)
            .unwrap_or(modified);
        FileRecord {
            path: path.to_path_buf(),
            name,
            is_image: self.is_image(&extension),
            extension,
            size: metadata.len(),
            created,
            modified,
        }
    }

    /// Walk the whole tree under the root, stat-ing every file.
    ///
    /// Runs two passes: a counting pass so progress can report a percentage,
    /// then the stat pass. A subtree that cannot be enumerated contributes
    /// exactly one error entry and never aborts the walk; files the reader
    /// gives up on are skipped silently.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub fn scan_directory(&self) -> Result<ScanReport, ScanError> {
        if !self.root.is_dir() {
            return Err(ScanError::Root(format!(
                "{} does not exist or is not a directory",
                self.root.display()
            )));
        }

        self.progress.reset();
        tracing::info!("Starting scan of {}", self.root.display());

        let total = self.count_files();
        self.progress.set_total(total);
        tracing::info!("Found {} files under {}", total, self.root.display());

        let mut report = ScanReport::default();
        for entry in WalkDir::new(&self.root) {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_dir() {
                        self.progress.set_current_directory(entry.path());
                        continue;
                    }
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    if let Some(record) = self.scan_file(entry.path()) {
                        report.files.push(record);
                    }
                    let processed = self.progress.record_processed();
                    if processed % PROGRESS_LOG_BATCH == 0 {
                        tracing::info!("Processed {}/{} files", processed, total);
                    }
                }
                Err(e) => {
                    let message = match e.path() {
                        Some(path) => format!("Cannot access {}: {}", path.display(), e),
                        None => format!("Cannot enumerate entry: {}", e),
                    };
                    tracing::warn!("{}", message);
                    self.progress.record_error();
                    report.errors.push(message);
                }
            }
        }

        tracing::info!(
            "Scan of {} complete: {} files, {} errors",
            self.root.display(),
            report.files.len(),
            report.errors.len()
        );
        Ok(report)
    }

    fn count_files(&self) -> u64 {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .count() as u64
    }
}
