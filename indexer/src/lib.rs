//! Scan coordination: walks the tree, classifies images, groups faces, and
//! accumulates everything into the shared catalog from a single background
//! worker while request handlers read alongside.

use analyzer::ImageAnalyzer;
use catalog::{Catalog, CatalogError, GalleryEntry};
use face_grouping::{Detection, FaceGrouper};
use scanner::{FileScanner, ScanProgress};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Scan already in progress")]
    ScanInProgress,
    #[error("Scan Error: {0}")]
    Scan(String),
    #[error("Catalog Error: {0}")]
    Catalog(String),
}

impl From<CatalogError> for IndexerError {
    fn from(e: CatalogError) -> Self {
        IndexerError::Catalog(e.to_string())
    }
}

/// Progress notifications emitted while a scan runs.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Started,
    Walked { files: u64, errors: u64 },
    ImageAnalyzed(u64),
    Finished { files: u64, images: u64, groups: u64 },
    Failed(String),
}

/// What one completed pass produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub files: u64,
    pub images: u64,
    pub face_groups: u64,
    pub errors: u64,
}

fn emit(events: Option<&mpsc::UnboundedSender<ScanEvent>>, event: ScanEvent) {
    if let Some(tx) = events {
        if let Err(e) = tx.send(event) {
            tracing::debug!("Progress receiver dropped: {}", e);
        }
    }
}

/// Drives one scan pass at a time over a root directory.
///
/// Lifecycle is idle -> scanning -> idle; re-entering scanning re-runs the
/// whole pass at full cost and replaces the previous results. Only one pass
/// may be active at a time.
pub struct Indexer {
    scanner: FileScanner,
    analyzer: ImageAnalyzer,
    grouper: FaceGrouper,
    catalog: Arc<Catalog>,
}

impl Indexer {
    pub fn new(
        scanner: FileScanner,
        analyzer: ImageAnalyzer,
        grouper: FaceGrouper,
        catalog: Arc<Catalog>,
    ) -> Self {
        Indexer {
            scanner,
            analyzer,
            grouper,
            catalog,
        }
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    pub fn progress(&self) -> Arc<ScanProgress> {
        self.scanner.progress()
    }

    pub fn root(&self) -> &Path {
        self.scanner.root()
    }

    /// Run one full pass synchronously on the calling thread.
    ///
    /// Fails fast with [`IndexerError::ScanInProgress`] when a pass is
    /// already active.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self, events)))]
    pub fn process_directory(
        &self,
        events: Option<&mpsc::UnboundedSender<ScanEvent>>,
    ) -> Result<ScanSummary, IndexerError> {
        if !self.progress().try_begin() {
            return Err(IndexerError::ScanInProgress);
        }
        self.run_locked(events)
    }

    /// Run one full pass detached on the blocking thread pool.
    ///
    /// The worker logs and records failures instead of returning them; the
    /// handle is only good for awaiting completion.
    pub fn spawn_scan(
        self: &Arc<Self>,
        events: Option<mpsc::UnboundedSender<ScanEvent>>,
    ) -> Result<JoinHandle<()>, IndexerError> {
        if !self.progress().try_begin() {
            return Err(IndexerError::ScanInProgress);
        }
        let indexer = Arc::clone(self);
        Ok(task::spawn_blocking(move || {
            let _ = indexer.run_locked(events.as_ref());
        }))
    }

    /// Caller must hold the active flag, taken through `try_begin` (which
    /// zeroes the counters). The flag is always released here, after any
    /// failure has been recorded on the counters and the catalog.
    fn run_locked(
        &self,
        events: Option<&mpsc::UnboundedSender<ScanEvent>>,
    ) -> Result<ScanSummary, IndexerError> {
        let result = self.run_pass(events);

        match &result {
            Ok(summary) => {
                tracing::info!(
                    "Scan complete: {} files, {} images, {} face groups, {} errors",
                    summary.files,
                    summary.images,
                    summary.face_groups,
                    summary.errors
                );
            }
            Err(e) => {
                let message = format!("Scan failed: {}", e);
                tracing::error!("{}", message);
                self.progress().record_error();
                if let Err(record_err) = self.catalog.record_scan_error(message) {
                    tracing::error!("Failed to record scan failure: {}", record_err);
                }
                emit(events, ScanEvent::Failed(e.to_string()));
            }
        }
        self.progress().finish();
        result
    }

    fn run_pass(
        &self,
        events: Option<&mpsc::UnboundedSender<ScanEvent>>,
    ) -> Result<ScanSummary, IndexerError> {
        emit(events, ScanEvent::Started);
        self.catalog.reset()?;

        let report = self
            .scanner
            .scan_directory()
            .map_err(|e| IndexerError::Scan(e.to_string()))?;
        let walked = report.files.len() as u64;
        let walk_errors = report.errors.len() as u64;
        self.catalog.extend_scan_errors(report.errors)?;
        emit(
            events,
            ScanEvent::Walked {
                files: walked,
                errors: walk_errors,
            },
        );

        // Raw file list is visible before analysis starts; entries below
        // appear one by one so readers always see a valid partial catalog.
        self.catalog.set_files(report.files.clone())?;

        let mut analyzed = 0u64;
        let mut image_paths: Vec<PathBuf> = Vec::new();
        let mut detections: Vec<Detection> = Vec::new();
        for record in report.files.iter().filter(|record| record.is_image) {
            let analysis = self.analyzer.analyze(&record.path);
            let detection = self.grouper.detect(&record.path);
            let entry = GalleryEntry {
                relative_path: self.relative_path(&record.path),
                file: record.clone(),
                categories: analysis.categories,
                error: analysis.error,
                faces: detection.faces.len(),
                face_error: detection.error.clone(),
                face_group: None,
            };
            self.catalog.insert_image(entry)?;
            image_paths.push(record.path.clone());
            detections.push(detection);
            analyzed += 1;
            emit(events, ScanEvent::ImageAnalyzed(analyzed));
        }

        let groups: Vec<Vec<PathBuf>> = self
            .grouper
            .group(&detections)
            .into_iter()
            .map(|members| {
                members
                    .into_iter()
                    .map(|index| image_paths[index].clone())
                    .collect()
            })
            .collect();
        let group_count = groups.len() as u64;
        self.catalog.set_face_groups(groups)?;

        emit(
            events,
            ScanEvent::Finished {
                files: walked,
                images: analyzed,
                groups: group_count,
            },
        );
        Ok(ScanSummary {
            files: walked,
            images: analyzed,
            face_groups: group_count,
            errors: walk_errors,
        })
    }

    fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(self.scanner.root())
            .map(|relative| relative.display().to_string())
            .unwrap_or_else(|_| path.display().to_string())
    }
}
