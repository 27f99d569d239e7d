//! In-memory gallery state: everything the current scan pass has discovered,
//! safe for concurrent reads while the scanning worker keeps writing.
//!
//! Nothing here is persisted; the catalog is rebuilt from the filesystem on
//! every process start.

use analyzer::Category;
use scanner::FileRecord;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Lock Error: {0}")]
    Lock(String),
}

/// One image's accumulated record: file metadata plus whatever analysis and
/// face grouping produced for it.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryEntry {
    #[serde(flatten)]
    pub file: FileRecord,
    /// Path relative to the scan root, as used by the image-serving route.
    pub relative_path: String,
    pub categories: Vec<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub faces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_group: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceGroup {
    pub id: usize,
    pub images: Vec<PathBuf>,
}

/// Shared store for scan results. All mutation happens on the scanning
/// worker; request handlers only take snapshots.
#[derive(Debug, Default)]
pub struct Catalog {
    files: RwLock<Vec<FileRecord>>,
    images: RwLock<BTreeMap<PathBuf, GalleryEntry>>,
    face_groups: RwLock<Vec<Vec<PathBuf>>>,
    scan_errors: RwLock<Vec<String>>,
}

fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    what: &str,
) -> Result<RwLockReadGuard<'a, T>, CatalogError> {
    lock.read()
        .map_err(|_| CatalogError::Lock(format!("{} lock poisoned", what)))
}

fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    what: &str,
) -> Result<RwLockWriteGuard<'a, T>, CatalogError> {
    lock.write()
        .map_err(|_| CatalogError::Lock(format!("{} lock poisoned", what)))
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the previous pass's results. Called on entry to a new scan.
    pub fn reset(&self) -> Result<(), CatalogError> {
        write_lock(&self.files, "files")?.clear();
        write_lock(&self.images, "images")?.clear();
        write_lock(&self.face_groups, "face groups")?.clear();
        write_lock(&self.scan_errors, "scan errors")?.clear();
        tracing::debug!("Catalog cleared for a new scan pass");
        Ok(())
    }

    pub fn set_files(&self, files: Vec<FileRecord>) -> Result<(), CatalogError> {
        *write_lock(&self.files, "files")? = files;
        Ok(())
    }

    pub fn files(&self) -> Result<Vec<FileRecord>, CatalogError> {
        Ok(read_lock(&self.files, "files")?.clone())
    }

    pub fn file_count(&self) -> Result<usize, CatalogError> {
        Ok(read_lock(&self.files, "files")?.len())
    }

    pub fn insert_image(&self, entry: GalleryEntry) -> Result<(), CatalogError> {
        write_lock(&self.images, "images")?.insert(entry.file.path.clone(), entry);
        Ok(())
    }

    /// Snapshot of every accumulated image entry, in path order.
    pub fn images(&self) -> Result<Vec<GalleryEntry>, CatalogError> {
        Ok(read_lock(&self.images, "images")?.values().cloned().collect())
    }

    pub fn image(&self, path: &Path) -> Result<Option<GalleryEntry>, CatalogError> {
        Ok(read_lock(&self.images, "images")?.get(path).cloned())
    }

    pub fn image_count(&self) -> Result<usize, CatalogError> {
        Ok(read_lock(&self.images, "images")?.len())
    }

    pub fn images_by_category(&self, category: &str) -> Result<Vec<GalleryEntry>, CatalogError> {
        Ok(read_lock(&self.images, "images")?
            .values()
            .filter(|entry| entry.categories.iter().any(|c| c.label == category))
            .cloned()
            .collect())
    }

    /// How many images carry each label, most frequent first.
    pub fn category_summary(&self) -> Result<Vec<CategorySummary>, CatalogError> {
        let images = read_lock(&self.images, "images")?;
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for entry in images.values() {
            for category in &entry.categories {
                *counts.entry(category.label.as_str()).or_default() += 1;
            }
        }
        let mut summary: Vec<CategorySummary> = counts
            .into_iter()
            .map(|(category, count)| CategorySummary {
                category: category.to_string(),
                count,
            })
            .collect();
        summary.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        Ok(summary)
    }

    /// Replace the face groups and rewrite group membership on every entry.
    pub fn set_face_groups(&self, groups: Vec<Vec<PathBuf>>) -> Result<(), CatalogError> {
        let mut images = write_lock(&self.images, "images")?;
        for entry in images.values_mut() {
            entry.face_group = None;
        }
        for (id, members) in groups.iter().enumerate() {
            for path in members {
                if let Some(entry) = images.get_mut(path) {
                    entry.face_group = Some(id);
                }
            }
        }
        *write_lock(&self.face_groups, "face groups")? = groups;
        Ok(())
    }

    pub fn face_groups(&self) -> Result<Vec<FaceGroup>, CatalogError> {
        Ok(read_lock(&self.face_groups, "face groups")?
            .iter()
            .enumerate()
            .map(|(id, images)| FaceGroup {
                id,
                images: images.clone(),
            })
            .collect())
    }

    pub fn record_scan_error(&self, message: String) -> Result<(), CatalogError> {
        write_lock(&self.scan_errors, "scan errors")?.push(message);
        Ok(())
    }

    pub fn extend_scan_errors(&self, messages: Vec<String>) -> Result<(), CatalogError> {
        write_lock(&self.scan_errors, "scan errors")?.extend(messages);
        Ok(())
    }

    pub fn scan_errors(&self) -> Result<Vec<String>, CatalogError> {
        Ok(read_lock(&self.scan_errors, "scan errors")?.clone())
    }
}
