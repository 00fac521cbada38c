use std::thread;
use std::time::Instant;

use log::{debug, info};

use super::decoder::Image;
use super::embedding::FeatureVector;
use super::error::AnalysisError;
use super::extractor::FeatureExtractor;
use super::heatmap::{Heatmap, HeatmapGenerator};
use super::report::{Report, ReportComposer};
use super::scores::{ClassificationResult, ScoreSynthesizer};
use super::AnalyzerInfo;

/// Everything one analysis produces: the report and the full heatmap grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub report: Report,
    pub classification: ClassificationResult,
    pub heatmap: Heatmap,
}

/// A thread-safe image analysis pipeline.
///
/// Each call runs Decode → (Extract ∥ Heatmap) → Synthesize → Compose. The two
/// middle branches only read the decoded image and are joined before the
/// report is composed. Nothing is retained between calls.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use scanalyze::{Analyzer, BuiltinModel};
///
/// let analyzer = Analyzer::builder()
///     .with_model(BuiltinModel::DenseNet121)?
///     .build()?;
///
/// let bytes = std::fs::read("chest_xray.png")?;
/// let analysis = analyzer.analyze(&bytes)?;
/// println!("{}", analysis.report.render_text());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Analyzer {
    pub(crate) extractor: FeatureExtractor,
    pub(crate) synthesizer: ScoreSynthesizer,
    pub(crate) heatmap: HeatmapGenerator,
    pub(crate) composer: ReportComposer,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Analyzer>();
    }
};

impl Analyzer {
    /// Creates a new AnalyzerBuilder for fluent construction
    pub fn builder() -> super::builder::AnalyzerBuilder {
        super::builder::AnalyzerBuilder::new()
    }

    pub fn info(&self) -> AnalyzerInfo {
        AnalyzerInfo {
            embedder: self.extractor.embedder().describe(),
            input_layout: self.extractor.embedder().input_layout(),
            target_size: self.extractor.config().target_size,
            kernel_size: self.heatmap.config().kernel_size(),
            confidence_threshold: self.composer.threshold(),
        }
    }

    /// The feature extraction stage this analyzer runs.
    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Decodes raw upload bytes and analyzes the image.
    ///
    /// # Errors
    /// - `Decode` if the bytes are not a supported image; no other stage runs
    /// - `Embedding` if feature extraction fails
    /// - `Pipeline` if a stage panics
    pub fn analyze(&self, bytes: &[u8]) -> Result<Analysis, AnalysisError> {
        let image = Image::decode(bytes)?;
        self.analyze_image(&image)
    }

    /// Analyzes an already decoded image, such as [`Image::sample`].
    pub fn analyze_image(&self, image: &Image) -> Result<Analysis, AnalysisError> {
        let start = Instant::now();
        let (features, heatmap) = self.run_branches(image)?;
        let features = features?;

        let classification = self.synthesizer.synthesize(&features);
        let report = self.composer.compose(&classification, Some(heatmap.summary()));
        info!(
            "Analyzed {}x{} image in {:.2?}: {} ({:.1}%)",
            image.width(),
            image.height(),
            start.elapsed(),
            report.top_label,
            report.top_confidence * 100.0
        );

        Ok(Analysis {
            report,
            classification,
            heatmap,
        })
    }

    /// Runs feature extraction and heatmap generation on two scoped threads.
    fn run_branches(
        &self,
        image: &Image,
    ) -> Result<(Result<FeatureVector, AnalysisError>, Heatmap), AnalysisError> {
        thread::scope(|scope| {
            let extraction = scope.spawn(|| self.extractor.extract(image));
            let heatmap = scope.spawn(|| self.heatmap.generate(image));

            let (heatmap, features) = (heatmap.join(), extraction.join());
            let heatmap = heatmap
                .map_err(|_| AnalysisError::Pipeline("Heatmap generation panicked".into()))?;
            let features = features
                .map_err(|_| AnalysisError::Pipeline("Feature extraction panicked".into()))?;
            debug!("Extraction and heatmap branches joined");
            Ok((features, heatmap))
        })
    }
}
