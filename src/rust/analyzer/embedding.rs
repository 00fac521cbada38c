use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::info;
use ndarray::{Array1, ArrayView4, ArrayViewD, Axis, Ix4};
use ort::session::Session;
use ort::value::Tensor;
use serde::Serialize;

use super::error::AnalysisError;
use crate::models::InputLayout;
use crate::runtime::{create_session_builder, RuntimeConfig};

/// Fixed-length embedding of one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Wraps raw embedding values.
    ///
    /// # Errors
    /// - `Embedding` if the vector is empty or holds a NaN or infinite value
    pub fn new(values: Vec<f32>) -> Result<Self, AnalysisError> {
        if values.is_empty() {
            return Err(AnalysisError::Embedding("Embedding output is empty".into()));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(AnalysisError::Embedding(format!(
                "Embedding value {} is not finite ({})",
                pos, values[pos]
            )));
        }
        Ok(Self(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Sum of all values, accumulated in f64 in index order.
    pub fn sum(&self) -> f64 {
        self.0.iter().map(|&v| v as f64).sum()
    }
}

impl From<FeatureVector> for Array1<f32> {
    fn from(vector: FeatureVector) -> Self {
        Array1::from(vector.0)
    }
}

/// A pretrained function mapping a preprocessed image tensor to a feature vector.
///
/// Implementations must be deterministic and safe to call from several
/// threads at once. The tensor handed to [`embed`](ImageEmbedder::embed) has
/// batch size 1, three channels with values in `[0, 1]`, and follows
/// [`input_layout`](ImageEmbedder::input_layout).
pub trait ImageEmbedder: Send + Sync + fmt::Debug {
    /// Tensor layout the embedder expects
    fn input_layout(&self) -> InputLayout;

    /// Runs the embedding function on one preprocessed image
    fn embed(&self, pixels: ArrayView4<'_, f32>) -> Result<FeatureVector, AnalysisError>;

    /// Human-readable identification, used in logs and analyzer info
    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

/// Embedding function backed by an ONNX Runtime session.
///
/// The model is expected to:
/// - Accept one image input of shape `[1, 3, H, W]` or `[1, H, W, 3]`
/// - Output either a pooled `[1, L]` vector or a `[1, C, h, w]` / `[1, h, w, C]`
///   feature map, which is global-average-pooled to length `C`
pub struct OnnxEmbedder {
    model_path: PathBuf,
    input_name: String,
    layout: InputLayout,
    session: Session,
}

impl fmt::Debug for OnnxEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxEmbedder")
            .field("model_path", &self.model_path)
            .field("input_name", &self.input_name)
            .field("layout", &self.layout)
            .finish()
    }
}

impl OnnxEmbedder {
    /// Loads an ONNX model from disk.
    ///
    /// # Errors
    /// - `ModelUnavailable` if the file does not exist
    /// - `ModelUnavailable` if ONNX Runtime cannot be initialized or the model cannot be loaded
    /// - `ModelUnavailable` if the model has no inputs or no outputs
    pub fn load(
        model_path: &Path,
        layout: InputLayout,
        runtime_config: &RuntimeConfig,
    ) -> Result<Self, AnalysisError> {
        if !model_path.exists() {
            return Err(AnalysisError::ModelUnavailable(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        let session = create_session_builder(runtime_config)?
            .commit_from_file(model_path)
            .map_err(|e| {
                log::error!("Failed to load model {}: {}", model_path.display(), e);
                AnalysisError::ModelUnavailable(format!("Failed to load model: {}", e))
            })?;

        Self::validate_model(&session)?;
        let input_name = session.inputs[0].name.clone();
        info!("Loaded embedding model {} (input '{}')", model_path.display(), input_name);

        Ok(Self {
            model_path: model_path.to_path_buf(),
            input_name,
            layout,
            session,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Validates that the model has at least one input and one output
    fn validate_model(session: &Session) -> Result<(), AnalysisError> {
        if session.inputs.is_empty() {
            return Err(AnalysisError::ModelUnavailable(
                "Model must have an image input".to_string(),
            ));
        }
        if session.outputs.is_empty() {
            return Err(AnalysisError::ModelUnavailable(
                "Model must have at least 1 output for embeddings".to_string(),
            ));
        }
        Ok(())
    }
}

impl ImageEmbedder for OnnxEmbedder {
    fn input_layout(&self) -> InputLayout {
        self.layout
    }

    fn embed(&self, pixels: ArrayView4<'_, f32>) -> Result<FeatureVector, AnalysisError> {
        let input_dyn = pixels.into_dyn();
        let input = input_dyn.as_standard_layout();

        let mut input_tensors = HashMap::new();
        input_tensors.insert(
            self.input_name.as_str(),
            Tensor::from_array(&input).map_err(|e| {
                AnalysisError::Embedding(format!("Failed to create input tensor: {}", e))
            })?,
        );

        let outputs = self
            .session
            .run(input_tensors)
            .map_err(|e| AnalysisError::Embedding(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0].try_extract_tensor::<f32>().map_err(|e| {
            AnalysisError::Embedding(format!("Failed to extract output tensor: {}", e))
        })?;

        FeatureVector::new(pool_output(output_tensor, self.layout)?)
    }

    fn describe(&self) -> String {
        format!("onnx:{}", self.model_path.display())
    }
}

/// Reduces a model output to one vector per image.
///
/// Rank 1 and `[1, L]` outputs pass through; rank 4 feature maps are averaged
/// over their spatial axes.
pub(crate) fn pool_output(
    output: ArrayViewD<'_, f32>,
    layout: InputLayout,
) -> Result<Vec<f32>, AnalysisError> {
    match output.ndim() {
        1 => Ok(output.iter().copied().collect()),
        2 if output.shape()[0] == 1 => Ok(output.iter().copied().collect()),
        4 if output.shape()[0] == 1 => {
            let map = output
                .into_dimensionality::<Ix4>()
                .map_err(|e| AnalysisError::Embedding(e.to_string()))?;
            let map = map.index_axis_move(Axis(0), 0);
            // Remaining axes: CHW or HWC
            let (channel_axis, spatial) = match layout {
                InputLayout::Nchw => (Axis(0), map.shape()[1] * map.shape()[2]),
                InputLayout::Nhwc => (Axis(2), map.shape()[0] * map.shape()[1]),
            };
            if spatial == 0 {
                return Err(AnalysisError::Embedding("Feature map has no spatial extent".into()));
            }
            Ok(map
                .axis_iter(channel_axis)
                .map(|plane| plane.sum() / spatial as f32)
                .collect())
        }
        _ => Err(AnalysisError::Embedding(format!(
            "Unexpected embedding output shape {:?}",
            output.shape()
        ))),
    }
}
