use std::fmt;

use serde::Serialize;

use super::error::AnalysisError;
use super::heatmap::HeatmapSummary;
use super::scores::{ClassificationResult, DiagnosisLabel};

/// Confidence at or above which a finding counts as high confidence.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// File name offered for the plain-text export.
pub const REPORT_FILE_NAME: &str = "medical_analysis_report.txt";

pub const DISCLAIMER: &str = "This is an AI-assisted analysis and should not replace \
professional medical diagnosis. Always consult with a qualified healthcare provider.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recommendation {
    #[serde(rename = "further evaluation recommended")]
    FurtherEvaluation,
    #[serde(rename = "high confidence, clinical correlation advised")]
    HighConfidence,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::FurtherEvaluation => "further evaluation recommended",
            Recommendation::HighConfidence => "high confidence, clinical correlation advised",
        }
    }

    /// The recommendation as a capitalized sentence.
    pub fn sentence(&self) -> String {
        let text = self.as_str();
        let mut chars = text.chars();
        match chars.next() {
            Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
            None => String::new(),
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub label: DiagnosisLabel,
    pub probability: f64,
}

/// The composed, immutable outcome of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub top_label: DiagnosisLabel,
    pub top_confidence: f64,
    /// Every label, descending by probability
    pub ranked: Vec<Finding>,
    pub recommendation: Recommendation,
    pub heatmap: Option<HeatmapSummary>,
}

impl Report {
    /// Plain-text rendering for export.
    pub fn render_text(&self) -> String {
        let differentials: Vec<String> = self
            .ranked
            .iter()
            .map(|f| format!("- {}: {:.1}%", f.label, f.probability * 100.0))
            .collect();

        format!(
            "Patient Image Analysis Report\n\
             \n\
             Primary Finding: {}\n\
             Confidence Level: {:.1}%\n\
             \n\
             Differential Diagnoses:\n\
             {}\n\
             \n\
             Recommendation:\n\
             {}\n\
             \n\
             Disclaimer: {}\n",
            self.top_label,
            self.top_confidence * 100.0,
            differentials.join("\n"),
            self.recommendation.sentence(),
            DISCLAIMER,
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_text())
    }
}

/// Turns a classification into a report with a recommendation.
#[derive(Debug, Clone)]
pub struct ReportComposer {
    threshold: f64,
}

impl Default for ReportComposer {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl ReportComposer {
    /// # Errors
    /// - `Validation` if `threshold` is outside `[0, 1]`
    pub fn with_threshold(threshold: f64) -> Result<Self, AnalysisError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AnalysisError::Validation(format!(
                "Confidence threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn recommend(&self, confidence: f64) -> Recommendation {
        if confidence < self.threshold {
            Recommendation::FurtherEvaluation
        } else {
            Recommendation::HighConfidence
        }
    }

    /// The top finding is the first entry of the stable descending ranking,
    /// so ties go to the label declared first.
    pub fn compose(
        &self,
        classification: &ClassificationResult,
        heatmap: Option<HeatmapSummary>,
    ) -> Report {
        let ordered = classification.ranked();
        let [(top_label, top_confidence), ..] = ordered;
        let ranked: Vec<Finding> = ordered
            .into_iter()
            .map(|(label, probability)| Finding { label, probability })
            .collect();

        Report {
            top_label,
            top_confidence,
            recommendation: self.recommend(top_confidence),
            ranked,
            heatmap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DiagnosisLabel::*;

    fn classification(pairs: &[(DiagnosisLabel, f64)]) -> ClassificationResult {
        ClassificationResult::from_pairs(pairs).unwrap()
    }

    #[test]
    fn test_recommendation_boundary() {
        let composer = ReportComposer::default();
        assert_eq!(composer.recommend(0.79999), Recommendation::FurtherEvaluation);
        assert_eq!(composer.recommend(0.8), Recommendation::HighConfidence);
        assert_eq!(composer.recommend(0.95), Recommendation::HighConfidence);
    }

    #[test]
    fn test_top_label_is_maximum() {
        let result =
            classification(&[(Normal, 0.1), (Pneumonia, 0.2), (Covid19, 0.6), (Tuberculosis, 0.1)]);
        let report = ReportComposer::default().compose(&result, None);
        assert_eq!(report.top_label, Covid19);
        assert!((report.top_confidence - 0.6).abs() < 1e-12);
        assert_eq!(report.recommendation, Recommendation::FurtherEvaluation);
    }

    #[test]
    fn test_ties_resolve_to_first_label() {
        let result =
            classification(&[(Normal, 0.1), (Pneumonia, 0.4), (Covid19, 0.1), (Tuberculosis, 0.4)]);
        let report = ReportComposer::default().compose(&result, None);
        assert_eq!(report.top_label, Pneumonia);
        assert_eq!(report.ranked[1].label, Tuberculosis);
    }

    #[test]
    fn test_ranked_descending() {
        let result = classification(&[
            (Normal, 0.05),
            (Pneumonia, 0.85),
            (Covid19, 0.04),
            (Tuberculosis, 0.06),
        ]);
        let report = ReportComposer::default().compose(&result, None);
        let labels: Vec<DiagnosisLabel> = report.ranked.iter().map(|f| f.label).collect();
        assert_eq!(labels, vec![Pneumonia, Tuberculosis, Normal, Covid19]);
        assert_eq!(report.recommendation, Recommendation::HighConfidence);
    }

    #[test]
    fn test_custom_threshold() {
        assert!(ReportComposer::with_threshold(1.5).is_err());
        let composer = ReportComposer::with_threshold(0.5).unwrap();
        assert_eq!(composer.recommend(0.5), Recommendation::HighConfidence);
    }

    #[test]
    fn test_sentences() {
        assert_eq!(Recommendation::FurtherEvaluation.sentence(), "Further evaluation recommended.");
        assert_eq!(
            Recommendation::HighConfidence.sentence(),
            "High confidence, clinical correlation advised."
        );
    }
}
