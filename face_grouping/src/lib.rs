//! Face detection seam and grouping of images by their dominant face.
//!
//! Grouping is a single greedy pass in image index order: the seed defines
//! the group and membership is decided against the seed alone, so results
//! are order-dependent and non-transitive. Keep it that way; the gallery
//! groups are defined by this exact pass.

use serde::Serialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_TOLERANCE: f32 = 0.6;

#[derive(Debug, Error)]
pub enum FaceError {
    #[error("Detection Error: {0}")]
    Detection(String),
}

/// One detected face: bounding box in pixel coordinates plus the embedding
/// used for similarity.
#[derive(Debug, Clone, Serialize)]
pub struct FaceEncoding {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
    pub embedding: Vec<f32>,
}

impl FaceEncoding {
    /// Pixel area of the bounding box; the largest face represents the image.
    pub fn area(&self) -> u64 {
        let height = u64::from(self.bottom.saturating_sub(self.top));
        let width = u64::from(self.right.saturating_sub(self.left));
        height * width
    }
}

/// The external face model: finds faces and measures embedding distance.
pub trait FaceEncoder: Send + Sync {
    fn encode_faces(&self, path: &Path) -> Result<Vec<FaceEncoding>, FaceError>;

    /// Embedding distance; lower is more similar. Euclidean by default, the
    /// metric the common face-embedding models are calibrated against.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        euclidean_distance(a, b)
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Stand-in encoder until a real face-embedding backend is wired up.
/// Finds no faces, so no image ever joins a group.
#[derive(Debug, Default)]
pub struct PlaceholderEncoder;

impl PlaceholderEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FaceEncoder for PlaceholderEncoder {
    fn encode_faces(&self, _path: &Path) -> Result<Vec<FaceEncoding>, FaceError> {
        // TODO: integrate a real face-embedding backend
        Ok(Vec::new())
    }
}

/// All faces found in one image, largest first, or the error that prevented
/// detection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Detection {
    pub faces: Vec<FaceEncoding>,
    pub error: Option<String>,
}

impl Detection {
    /// The largest face, if any; it represents the image during grouping.
    pub fn dominant(&self) -> Option<&FaceEncoding> {
        self.faces.first()
    }
}

/// Wraps a [`FaceEncoder`] and groups images by dominant-face similarity.
pub struct FaceGrouper {
    encoder: Box<dyn FaceEncoder>,
    tolerance: f32,
}

impl FaceGrouper {
    pub fn new(encoder: Box<dyn FaceEncoder>) -> Self {
        FaceGrouper {
            encoder,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Find every face in one image, sorted by descending pixel area.
    /// Failures are folded into the result, never raised.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub fn detect(&self, path: &Path) -> Detection {
        match self.encoder.encode_faces(path) {
            Ok(mut faces) => {
                faces.sort_by(|a, b| b.area().cmp(&a.area()));
                Detection { faces, error: None }
            }
            Err(e) => {
                tracing::warn!("Face detection failed for {}: {}", path.display(), e);
                Detection {
                    faces: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Group images by their dominant face, greedily, in index order.
    ///
    /// Each unassigned image in turn seeds a candidate group; every still
    /// unassigned image whose dominant embedding lies within the tolerance of
    /// the seed joins, and only joined images are marked assigned. A seed
    /// with no partner forms no group and stays available. Images without
    /// faces never appear in the output. Groups are disjoint.
    pub fn group(&self, images: &[Detection]) -> Vec<Vec<usize>> {
        let dominants: Vec<Option<&FaceEncoding>> =
            images.iter().map(|image| image.dominant()).collect();
        let mut assigned = vec![false; dominants.len()];
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for seed in 0..dominants.len() {
            if assigned[seed] {
                continue;
            }
            let seed_face = match dominants[seed] {
                Some(face) => face,
                None => continue,
            };

            let mut members = vec![seed];
            for candidate in 0..dominants.len() {
                if candidate == seed || assigned[candidate] {
                    continue;
                }
                let candidate_face = match dominants[candidate] {
                    Some(face) => face,
                    None => continue,
                };
                let distance = self
                    .encoder
                    .distance(&seed_face.embedding, &candidate_face.embedding);
                if distance <= self.tolerance {
                    members.push(candidate);
                }
            }

            if members.len() > 1 {
                for &index in &members {
                    assigned[index] = true;
                }
                groups.push(members);
            }
        }

        tracing::debug!(
            "Grouped {} images into {} face groups",
            images.len(),
            groups.len()
        );
        groups
    }
}
