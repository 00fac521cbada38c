use serde::Serialize;

/// Memory layout of the 4-D image tensor an embedding model expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InputLayout {
    /// `[batch, channels, height, width]`
    Nchw,
    /// `[batch, height, width, channels]`
    Nhwc,
}

const DENSENET121_URL: &str = "https://github.com/onnx/models/raw/main/validated/vision/\
classification/densenet-121/model/densenet-12.onnx";

/// Built-in image embedding models that can be downloaded on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinModel {
    /// DenseNet-121 trained on ImageNet, exported to ONNX (opset 12).
    ///
    /// This export keeps the 1000-class head, so the embedding is the
    /// 1000-wide logit vector rather than the 1024-wide pooled backbone output.
    DenseNet121,
}

/// Static properties of an embedding model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelCharacteristics {
    /// Length of the feature vector produced per image
    pub embedding_size: usize,
    /// Side length of the square input image
    pub input_size: u32,
    /// Tensor layout of the model input
    pub input_layout: InputLayout,
    /// Approximate size of the model file
    pub model_size_mb: usize,
}

/// Where to fetch a model from and how to verify it.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub model_url: String,
    /// Published SHA-256 of the model file. When unset, the digest recorded at
    /// the first download is used instead.
    pub model_hash: Option<String>,
}

impl BuiltinModel {
    pub fn characteristics(&self) -> ModelCharacteristics {
        match self {
            BuiltinModel::DenseNet121 => ModelCharacteristics {
                embedding_size: 1000,
                input_size: 224,
                input_layout: InputLayout::Nchw,
                model_size_mb: 32,
            },
        }
    }

    pub fn get_model_info(&self) -> ModelInfo {
        match self {
            BuiltinModel::DenseNet121 => ModelInfo {
                name: "densenet121".to_string(),
                model_url: DENSENET121_URL.to_string(),
                model_hash: None,
            },
        }
    }
}
