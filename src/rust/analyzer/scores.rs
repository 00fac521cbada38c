use std::cmp::Ordering;
use std::fmt;

use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Dirichlet, Distribution};
use serde::Serialize;

use super::embedding::FeatureVector;
use super::error::AnalysisError;

/// Dirichlet concentration applied to every class.
pub const CONCENTRATION: f64 = 2.0;

/// Seeds are reduced into `0..SEED_MODULUS`.
pub const SEED_MODULUS: i64 = 1000;

/// Number of diagnostic categories.
pub const LABEL_COUNT: usize = 4;

/// Tolerance when checking that probabilities sum to one.
const SUM_TOLERANCE: f64 = 1e-6;

/// The fixed, ordered set of diagnostic categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosisLabel {
    Normal,
    Pneumonia,
    #[serde(rename = "COVID-19")]
    Covid19,
    Tuberculosis,
}

impl DiagnosisLabel {
    /// All labels in declaration order.
    pub const ALL: [DiagnosisLabel; LABEL_COUNT] = [
        DiagnosisLabel::Normal,
        DiagnosisLabel::Pneumonia,
        DiagnosisLabel::Covid19,
        DiagnosisLabel::Tuberculosis,
    ];

    /// Position in declaration order.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosisLabel::Normal => "Normal",
            DiagnosisLabel::Pneumonia => "Pneumonia",
            DiagnosisLabel::Covid19 => "COVID-19",
            DiagnosisLabel::Tuberculosis => "Tuberculosis",
        }
    }
}

impl fmt::Display for DiagnosisLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A probability for every label, kept in label declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    scores: [(DiagnosisLabel, f64); LABEL_COUNT],
}

impl ClassificationResult {
    /// Builds a result from label/probability pairs in any order.
    ///
    /// # Errors
    /// - `Validation` if a label is missing or repeated
    /// - `Validation` if a probability lies outside `[0, 1]`
    /// - `Validation` if the probabilities do not sum to 1 (within 1e-6)
    pub fn from_pairs(pairs: &[(DiagnosisLabel, f64)]) -> Result<Self, AnalysisError> {
        let mut scores = DiagnosisLabel::ALL.map(|label| (label, 0.0));
        for (label, slot) in DiagnosisLabel::ALL.into_iter().zip(scores.iter_mut()) {
            let mut matching = pairs.iter().filter(|(l, _)| *l == label);
            let probability = match (matching.next(), matching.next()) {
                (Some(&(_, p)), None) => p,
                (None, _) => {
                    return Err(AnalysisError::Validation(format!(
                        "Missing probability for {}",
                        label
                    )))
                }
                (Some(_), Some(_)) => {
                    return Err(AnalysisError::Validation(format!(
                        "Duplicate probability for {}",
                        label
                    )))
                }
            };
            if !(0.0..=1.0).contains(&probability) {
                return Err(AnalysisError::Validation(format!(
                    "Probability for {} out of range: {}",
                    label, probability
                )));
            }
            slot.1 = probability;
        }
        if pairs.len() != scores.len() {
            return Err(AnalysisError::Validation("Unexpected extra probabilities".into()));
        }

        let total: f64 = scores.iter().map(|(_, p)| p).sum();
        if (total - 1.0).abs() > SUM_TOLERANCE {
            return Err(AnalysisError::Validation(format!(
                "Probabilities sum to {}, expected 1",
                total
            )));
        }
        Ok(Self { scores })
    }

    pub fn probability(&self, label: DiagnosisLabel) -> f64 {
        self.scores[label.index()].1
    }

    /// Pairs in label declaration order.
    pub fn scores(&self) -> &[(DiagnosisLabel, f64)] {
        &self.scores
    }

    /// Pairs sorted by descending probability; equal values keep label order.
    pub fn ranked(&self) -> [(DiagnosisLabel, f64); LABEL_COUNT] {
        let mut ranked = self.scores;
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked
    }

    pub fn total(&self) -> f64 {
        self.scores.iter().map(|(_, p)| p).sum()
    }
}

/// Derives a synthetic, seeded probability distribution from a feature vector.
///
/// This is not a trained classifier. The feature sum only selects a seed; the
/// Dirichlet draw is sorted in descending order and handed out to the labels
/// in declaration order, so `Normal` always receives the largest share and
/// `Tuberculosis` the smallest. The values carry no diagnostic meaning.
#[derive(Debug, Clone)]
pub struct ScoreSynthesizer {
    dirichlet: Dirichlet<f64>,
}

impl ScoreSynthesizer {
    /// # Errors
    /// - `Validation` if the Dirichlet parameters are rejected
    pub fn new() -> Result<Self, AnalysisError> {
        let dirichlet = Dirichlet::new(&[CONCENTRATION; LABEL_COUNT]).map_err(|e| {
            AnalysisError::Validation(format!("Invalid Dirichlet parameters: {}", e))
        })?;
        Ok(Self { dirichlet })
    }

    /// `trunc(sum * 1000)` reduced into `0..1000`.
    ///
    /// The float-to-integer cast saturates, so huge sums clamp to the `i64`
    /// range before the reduction.
    pub fn seed_for(features: &FeatureVector) -> u64 {
        let scaled = (features.sum() * 1000.0).trunc() as i64;
        scaled.rem_euclid(SEED_MODULUS) as u64
    }

    pub fn synthesize(&self, features: &FeatureVector) -> ClassificationResult {
        let seed = Self::seed_for(features);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut probabilities = self.dirichlet.sample(&mut rng);
        probabilities.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        debug!("Synthesized scores {:?} from seed {}", probabilities, seed);

        let mut scores = DiagnosisLabel::ALL.map(|label| (label, 0.0));
        // The draw has one component per concentration parameter
        for (slot, probability) in scores.iter_mut().zip(probabilities) {
            slot.1 = probability;
        }
        ClassificationResult { scores }
    }
}
