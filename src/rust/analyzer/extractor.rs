use std::sync::Arc;

use image::imageops::{self, FilterType};
use log::debug;
use ndarray::Array4;

use super::embedding::{FeatureVector, ImageEmbedder};
use super::error::AnalysisError;
use super::decoder::Image;
use crate::models::InputLayout;

/// Default side length images are resized to before embedding.
pub const DEFAULT_TARGET_SIZE: u32 = 224;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Square resolution fed to the embedding function
    pub target_size: u32,
    /// Feature vector length the embedding function must produce, when known
    pub embedding_size: Option<usize>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            embedding_size: None,
        }
    }
}

/// Turns images into feature vectors with a shared embedding function.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    embedder: Arc<dyn ImageEmbedder>,
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(
        embedder: Arc<dyn ImageEmbedder>,
        config: ExtractorConfig,
    ) -> Result<Self, AnalysisError> {
        if config.target_size == 0 {
            return Err(AnalysisError::Validation("Target size must be positive".into()));
        }
        Ok(Self { embedder, config })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn ImageEmbedder> {
        &self.embedder
    }

    /// Resizes, normalizes and embeds one image.
    ///
    /// # Errors
    /// - `Embedding` if the embedding function fails or returns an invalid vector
    /// - `Embedding` if the vector length differs from `embedding_size`
    pub fn extract(&self, image: &Image) -> Result<FeatureVector, AnalysisError> {
        let tensor = preprocess(image, self.config.target_size, self.embedder.input_layout());
        let features = self.embedder.embed(tensor.view())?;
        if let Some(expected) = self.config.embedding_size {
            if features.len() != expected {
                return Err(AnalysisError::Embedding(format!(
                    "Expected {} features from {}, got {}",
                    expected,
                    self.embedder.describe(),
                    features.len()
                )));
            }
        }
        debug!(
            "Extracted {} features from {}x{} image",
            features.len(),
            image.width(),
            image.height()
        );
        Ok(features)
    }
}

/// Resizes to `size`x`size` RGB and scales channels into `[0, 1]`, batch of one.
pub fn preprocess(image: &Image, size: u32, layout: InputLayout) -> Array4<f32> {
    let rgb = image.to_rgb();
    let resized = imageops::resize(&*rgb, size, size, FilterType::CatmullRom);

    let side = size as usize;
    let mut tensor = match layout {
        InputLayout::Nchw => Array4::<f32>::zeros((1, 3, side, side)),
        InputLayout::Nhwc => Array4::<f32>::zeros((1, side, side, 3)),
    };
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for (c, &value) in pixel.0.iter().enumerate() {
            let scaled = value as f32 / 255.0;
            match layout {
                InputLayout::Nchw => tensor[[0, c, y, x]] = scaled,
                InputLayout::Nhwc => tensor[[0, y, x, c]] = scaled,
            }
        }
    }
    tensor
}
