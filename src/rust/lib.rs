//! A deterministic chest radiograph triage pipeline: image embeddings through
//! ONNX Runtime, synthetic diagnosis scores, an edge-response heatmap and a
//! plain-text report.
//!
//! The scores are not a trained classifier. They are drawn from a Dirichlet
//! distribution seeded by the image's feature vector, which makes them
//! reproducible and nothing more. Not for clinical use.
//!
//! # Basic Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use scanalyze::{Analyzer, BuiltinModel};
//!
//! let analyzer = Analyzer::builder()
//!     .with_model(BuiltinModel::DenseNet121)?
//!     .build()?;
//!
//! let bytes = std::fs::read("chest_xray.jpg")?;
//! let analysis = analyzer.analyze(&bytes)?;
//! println!("Primary finding: {}", analysis.report.top_label);
//! println!("{}", analysis.report.render_text());
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! The analyzer is thread-safe and can be shared across threads using `Arc`.
//! The embedding model is loaded once per process and shared by every
//! analyzer built for the same configuration:
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use scanalyze::{Analyzer, BuiltinModel, Image};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let analyzer = Arc::new(Analyzer::builder()
//!     .with_model(BuiltinModel::DenseNet121)?
//!     .build()?);
//!
//! let mut handles = vec![];
//! for _ in 0..3 {
//!     let analyzer = Arc::clone(&analyzer);
//!     handles.push(thread::spawn(move || {
//!         analyzer.analyze_image(&Image::sample()).unwrap();
//!     }));
//! }
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
mod runtime;
pub mod model_manager;
pub mod models;

pub use analyzer::{
    Analysis, AnalysisError, Analyzer, AnalyzerBuilder, AnalyzerInfo, ClassificationResult,
    ColorMode, DiagnosisLabel, EmbeddingCache, FeatureVector, Heatmap, HeatmapConfig,
    HeatmapSummary, Image, ImageEmbedder, Recommendation, Report, ReportComposer,
    ScoreSynthesizer,
};
pub use runtime::{RuntimeConfig, create_session_builder};
pub use model_manager::{ModelManager, ModelError};
pub use models::{BuiltinModel, InputLayout, ModelCharacteristics, ModelInfo};

pub fn init_logger() {
    env_logger::init();
}
