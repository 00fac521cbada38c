use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use std::sync::OnceLock;

use crate::analyzer::AnalysisError;

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

#[derive(Debug)]
pub struct RuntimeConfig {
    pub inter_threads: usize,
    pub intra_threads: usize,
    pub optimization_level: GraphOptimizationLevel,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            inter_threads: 0, // Let ONNX Runtime decide
            intra_threads: 0, // Let ONNX Runtime decide
            optimization_level: GraphOptimizationLevel::Level3,
        }
    }
}

impl Clone for RuntimeConfig {
    fn clone(&self) -> Self {
        Self {
            inter_threads: self.inter_threads,
            intra_threads: self.intra_threads,
            optimization_level: copy_level(&self.optimization_level),
        }
    }
}

impl RuntimeConfig {
    /// Stable textual form, used to key cached sessions.
    pub(crate) fn cache_key(&self) -> String {
        let level = match self.optimization_level {
            GraphOptimizationLevel::Disable => 0,
            GraphOptimizationLevel::Level1 => 1,
            GraphOptimizationLevel::Level2 => 2,
            GraphOptimizationLevel::Level3 => 3,
        };
        format!("inter={};intra={};opt={}", self.inter_threads, self.intra_threads, level)
    }
}

fn copy_level(level: &GraphOptimizationLevel) -> GraphOptimizationLevel {
    match level {
        GraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
        GraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
        GraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
        GraphOptimizationLevel::Disable => GraphOptimizationLevel::Disable,
    }
}

fn init_onnx_environment() -> Result<(), String> {
    ort::init()
        .with_name("scanalyze")
        .commit()
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Initializes the ONNX Runtime environment once per process.
///
/// The outcome of the first attempt is remembered; a failed initialization is
/// reported on every later call.
pub fn ensure_initialized() -> Result<(), AnalysisError> {
    INIT.get_or_init(|| {
        let result = init_onnx_environment();
        match &result {
            Ok(()) => log::info!("ONNX Runtime environment initialized"),
            Err(e) => log::error!("Failed to initialize ONNX Runtime environment: {}", e),
        }
        result
    })
    .clone()
    .map_err(|e| AnalysisError::ModelUnavailable(format!("ONNX Runtime unavailable: {}", e)))
}

pub fn create_session_builder(config: &RuntimeConfig) -> Result<SessionBuilder, AnalysisError> {
    ensure_initialized()?;
    let mut builder = Session::builder()?;

    // Configure threading
    if config.inter_threads > 0 {
        builder = builder.with_inter_threads(config.inter_threads)?;
    }
    if config.intra_threads > 0 {
        builder = builder.with_intra_threads(config.intra_threads)?;
    }

    builder = builder.with_optimization_level(copy_level(&config.optimization_level))?;

    Ok(builder)
}
