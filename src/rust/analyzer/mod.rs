use serde::Serialize;

mod error;
mod decoder;
mod embedding;
mod extractor;
mod scores;
mod heatmap;
mod report;
mod cache;
mod pipeline;
pub mod builder;

pub use error::AnalysisError;
pub use decoder::{ColorMode, Image, SAMPLE_GRAY_LEVEL, SAMPLE_SIZE};
pub use embedding::{FeatureVector, ImageEmbedder, OnnxEmbedder};
pub use extractor::{preprocess, ExtractorConfig, FeatureExtractor, DEFAULT_TARGET_SIZE};
pub use scores::{ClassificationResult, DiagnosisLabel, ScoreSynthesizer};
pub use heatmap::{Heatmap, HeatmapConfig, HeatmapGenerator, HeatmapSummary};
pub use report::{
    Finding, Recommendation, Report, ReportComposer, DEFAULT_CONFIDENCE_THRESHOLD, DISCLAIMER,
    REPORT_FILE_NAME,
};
pub use cache::EmbeddingCache;
pub use pipeline::{Analysis, Analyzer};
pub use builder::AnalyzerBuilder;

use crate::models::InputLayout;

/// Information about the configuration of an analyzer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzerInfo {
    /// Description of the embedding function in use
    pub embedder: String,
    /// Tensor layout fed to the embedding function
    pub input_layout: InputLayout,
    /// Side length images are resized to before embedding
    pub target_size: u32,
    /// Gaussian kernel size used for the heatmap
    pub kernel_size: usize,
    /// Confidence at which the recommendation switches
    pub confidence_threshold: f64,
}
