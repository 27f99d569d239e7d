//! Image classification adapter: decodes and preprocesses images, then asks a
//! pluggable model for labels. Per-file failures become inline error strings,
//! never panics.

use image::imageops::FilterType;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Inference Error: {0}")]
    Inference(String),
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Decode Error: {0}")]
    Decode(String),
    #[error("Model Error: {0}")]
    Model(#[from] ModelError),
}

/// RGB pixels scaled to [-1, 1], interleaved row-major, the input layout the
/// classification models expect.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

/// One classification label with its confidence in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    #[serde(rename = "category")]
    pub label: String,
    pub confidence: f32,
}

/// The pretrained classification model behind the adapter.
pub trait ClassifierModel: Send + Sync {
    /// Width and height the adapter must resize inputs to.
    fn input_dimensions(&self) -> (u32, u32);

    /// How many raw predictions the model emits before filtering.
    fn top_k(&self) -> usize {
        5
    }

    fn predict(&self, input: &ImageTensor) -> Result<Vec<Category>, ModelError>;
}

/// Stand-in model until a real classification backend is wired up.
///
/// Keeps the whole pipeline runnable: every image decodes and preprocesses,
/// but carries no labels.
#[derive(Debug, Default)]
pub struct PlaceholderModel;

impl PlaceholderModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClassifierModel for PlaceholderModel {
    fn input_dimensions(&self) -> (u32, u32) {
        (224, 224)
    }

    fn predict(&self, _input: &ImageTensor) -> Result<Vec<Category>, ModelError> {
        // TODO: integrate a real classification backend
        Ok(Vec::new())
    }
}

/// What analysis produced for one image: the retained labels, or an error
/// message when decode or inference failed.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub categories: Vec<Category>,
    pub error: Option<String>,
}

impl Analysis {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Wraps a [`ClassifierModel`] behind a path-in, labels-out contract.
pub struct ImageAnalyzer {
    model: Box<dyn ClassifierModel>,
    confidence_threshold: f32,
}

impl ImageAnalyzer {
    pub fn new(model: Box<dyn ClassifierModel>) -> Self {
        ImageAnalyzer {
            model,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Classify one image. Decode and inference failures are folded into the
    /// result so a bad file can never take down a scan.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub fn analyze(&self, path: &Path) -> Analysis {
        match self.classify(path) {
            Ok(categories) => Analysis {
                categories,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Analysis failed for {}: {}", path.display(), e);
                Analysis {
                    categories: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Classify each path independently; one bad file never sinks the batch.
    pub fn batch_analyze(&self, paths: &[PathBuf]) -> HashMap<PathBuf, Analysis> {
        paths
            .iter()
            .map(|path| (path.clone(), self.analyze(path)))
            .collect()
    }

    fn classify(&self, path: &Path) -> Result<Vec<Category>, AnalyzerError> {
        let tensor = self.preprocess(path)?;
        let mut predictions = self.model.predict(&tensor)?;
        predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        predictions.truncate(self.model.top_k());
        predictions.retain(|category| category.confidence >= self.confidence_threshold);
        Ok(predictions)
    }

    /// Decode, force 3-channel RGB, resize to the model's input dimensions,
    /// and scale pixel values to [-1, 1].
    fn preprocess(&self, path: &Path) -> Result<ImageTensor, AnalyzerError> {
        let (width, height) = self.model.input_dimensions();
        let decoded = image::open(path)
            .map_err(|e| AnalyzerError::Decode(format!("{}: {}", path.display(), e)))?;
        let resized = decoded
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgb8();
        let pixels = resized
            .pixels()
            .flat_map(|pixel| pixel.0)
            .map(|channel| f32::from(channel) / 127.5 - 1.0)
            .collect();
        Ok(ImageTensor {
            width,
            height,
            pixels,
        })
    }
}
