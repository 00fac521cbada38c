use std::path::Path;
use std::sync::Arc;

use log::{error, info};

use super::cache::EmbeddingCache;
use super::embedding::ImageEmbedder;
use super::error::AnalysisError;
use super::extractor::{ExtractorConfig, FeatureExtractor};
use super::heatmap::{HeatmapConfig, HeatmapGenerator};
use super::pipeline::Analyzer;
use super::report::ReportComposer;
use super::scores::ScoreSynthesizer;
use crate::models::{BuiltinModel, InputLayout};
use crate::runtime::RuntimeConfig;
use crate::ModelManager;

/// A builder for constructing an Analyzer with a fluent interface.
#[derive(Default, Debug)]
pub struct AnalyzerBuilder {
    embedder: Option<Arc<dyn ImageEmbedder>>,
    runtime_config: RuntimeConfig,
    extractor_config: ExtractorConfig,
    heatmap_config: HeatmapConfig,
    composer: ReportComposer,
}

impl AnalyzerBuilder {
    /// Creates a new empty AnalyzerBuilder instance with default configuration
    ///
    /// # Example
    /// ```
    /// use scanalyze::AnalyzerBuilder;
    ///
    /// let builder = AnalyzerBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime configuration for ONNX model execution.
    ///
    /// Only affects models selected after this call.
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Uses a built-in model from the local model cache.
    ///
    /// The model is loaded through the process-wide [`EmbeddingCache`], so
    /// repeated builders share one loaded instance.
    ///
    /// # Errors
    /// - `Validation` if a model was already set
    /// - `ModelUnavailable` if the model is not downloaded or fails to load
    ///
    /// # Example
    /// ```no_run
    /// use scanalyze::{AnalyzerBuilder, BuiltinModel};
    ///
    /// let builder = AnalyzerBuilder::new()
    ///     .with_model(BuiltinModel::DenseNet121);
    /// ```
    pub fn with_model(mut self, model: BuiltinModel) -> Result<Self, AnalysisError> {
        self.ensure_unset()?;

        let manager = ModelManager::new_default().map_err(|e| {
            AnalysisError::ModelUnavailable(format!("Failed to create model manager: {}", e))
        })?;
        let model_path = manager.require_model(model).map_err(|e| {
            error!("{}", e);
            AnalysisError::ModelUnavailable(format!(
                "{}. Please download it first using ModelManager::download_model()",
                e
            ))
        })?;

        let characteristics = model.characteristics();
        let embedder = EmbeddingCache::global().acquire(
            &model_path,
            characteristics.input_layout,
            &self.runtime_config,
        )?;
        info!("Using built-in model {:?}", model);

        self.extractor_config.target_size = characteristics.input_size;
        self.extractor_config.embedding_size = Some(characteristics.embedding_size);
        self.embedder = Some(embedder);
        Ok(self)
    }

    /// Uses an ONNX model file at `model_path` with the given input layout.
    ///
    /// # Errors
    /// - `Validation` if the path is empty or a model was already set
    /// - `ModelUnavailable` if the file is missing or fails to load
    pub fn with_custom_model(
        mut self,
        model_path: impl AsRef<Path>,
        layout: InputLayout,
    ) -> Result<Self, AnalysisError> {
        let model_path = model_path.as_ref();
        if model_path.as_os_str().is_empty() {
            return Err(AnalysisError::Validation("Model path cannot be empty".into()));
        }
        self.ensure_unset()?;

        let embedder = EmbeddingCache::global().acquire(model_path, layout, &self.runtime_config)?;
        self.embedder = Some(embedder);
        Ok(self)
    }

    /// Uses an embedder the caller already owns.
    pub fn with_embedder(
        mut self,
        embedder: Arc<dyn ImageEmbedder>,
    ) -> Result<Self, AnalysisError> {
        self.ensure_unset()?;
        self.embedder = Some(embedder);
        Ok(self)
    }

    pub fn with_target_size(mut self, target_size: u32) -> Self {
        self.extractor_config.target_size = target_size;
        self
    }

    /// Rejects embeddings whose length differs from `embedding_size`.
    pub fn with_embedding_size(mut self, embedding_size: usize) -> Self {
        self.extractor_config.embedding_size = Some(embedding_size);
        self
    }

    pub fn with_heatmap_config(mut self, config: HeatmapConfig) -> Self {
        self.heatmap_config = config;
        self
    }

    /// # Errors
    /// - `Validation` if `threshold` is outside `[0, 1]`
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Result<Self, AnalysisError> {
        self.composer = ReportComposer::with_threshold(threshold)?;
        Ok(self)
    }

    /// Builds and returns the final Analyzer instance
    ///
    /// # Errors
    /// - `ModelUnavailable` if no embedding model was configured
    /// - `Validation` if the extractor configuration is invalid
    pub fn build(self) -> Result<Analyzer, AnalysisError> {
        let embedder = self.embedder.ok_or_else(|| {
            AnalysisError::ModelUnavailable("No embedding model configured".into())
        })?;

        Ok(Analyzer {
            extractor: FeatureExtractor::new(embedder, self.extractor_config)?,
            synthesizer: ScoreSynthesizer::new()?,
            heatmap: HeatmapGenerator::new(self.heatmap_config),
            composer: self.composer,
        })
    }

    fn ensure_unset(&self) -> Result<(), AnalysisError> {
        if self.embedder.is_some() {
            return Err(AnalysisError::Validation("Embedding model already set".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::embedding::FeatureVector;
    use ndarray::ArrayView4;

    #[derive(Debug)]
    struct SumEmbedder;

    impl ImageEmbedder for SumEmbedder {
        fn input_layout(&self) -> InputLayout {
            InputLayout::Nchw
        }

        fn embed(&self, pixels: ArrayView4<'_, f32>) -> Result<FeatureVector, AnalysisError> {
            FeatureVector::new(vec![pixels.sum()])
        }
    }

    #[test]
    fn test_build_without_model() {
        let result = AnalyzerBuilder::new().build();
        assert!(matches!(result, Err(AnalysisError::ModelUnavailable(_))));
    }

    #[test]
    fn test_missing_custom_model() {
        let result = AnalyzerBuilder::new()
            .with_custom_model("/nonexistent/scanalyze.onnx", InputLayout::Nhwc);
        assert!(matches!(result, Err(AnalysisError::ModelUnavailable(_))));
    }

    #[test]
    fn test_empty_custom_model_path() {
        let result = AnalyzerBuilder::new().with_custom_model("", InputLayout::Nchw);
        assert!(matches!(result, Err(AnalysisError::Validation(_))));
    }

    #[test]
    fn test_embedder_set_twice() {
        let result = AnalyzerBuilder::new()
            .with_embedder(Arc::new(SumEmbedder))
            .and_then(|b| b.with_embedder(Arc::new(SumEmbedder)));
        assert!(matches!(result, Err(AnalysisError::Validation(_))));
    }

    #[test]
    fn test_configuration_reaches_analyzer() -> Result<(), AnalysisError> {
        let analyzer = AnalyzerBuilder::new()
            .with_embedder(Arc::new(SumEmbedder))?
            .with_target_size(64)
            .with_heatmap_config(HeatmapConfig::new(5, 1e-8)?)
            .with_confidence_threshold(0.6)?
            .build()?;

        let info = analyzer.info();
        assert_eq!(info.target_size, 64);
        assert_eq!(info.kernel_size, 5);
        assert_eq!(info.confidence_threshold, 0.6);
        assert_eq!(info.input_layout, InputLayout::Nchw);
        Ok(())
    }

    #[test]
    fn test_zero_target_size_rejected_at_build() {
        let result = AnalyzerBuilder::new()
            .with_embedder(Arc::new(SumEmbedder))
            .map(|b| b.with_target_size(0))
            .and_then(|b| b.build());
        assert!(matches!(result, Err(AnalysisError::Validation(_))));
    }
}
