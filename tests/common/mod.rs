#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use env_logger::{Builder, Env};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::{s, ArrayView4};
use scanalyze::{AnalysisError, Analyzer, FeatureVector, ImageEmbedder, InputLayout};

pub const GRID: usize = 4;

// Initialize test logger
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn")).try_init();
}

/// Averages each channel over a 4x4 grid of blocks: 48 deterministic features.
#[derive(Debug, Default)]
pub struct BlockMeanEmbedder {
    pub calls: AtomicUsize,
}

impl ImageEmbedder for BlockMeanEmbedder {
    fn input_layout(&self) -> InputLayout {
        InputLayout::Nchw
    }

    fn embed(&self, pixels: ArrayView4<'_, f32>) -> Result<FeatureVector, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (channels, height, width) = (pixels.shape()[1], pixels.shape()[2], pixels.shape()[3]);
        let (bh, bw) = (height / GRID, width / GRID);
        let mut features = Vec::with_capacity(channels * GRID * GRID);
        for c in 0..channels {
            for gy in 0..GRID {
                for gx in 0..GRID {
                    let (rows, cols) = (gy * bh..(gy + 1) * bh, gx * bw..(gx + 1) * bw);
                    let block = pixels.slice(s![0, c, rows, cols]);
                    features.push(block.mean().unwrap_or(0.0));
                }
            }
        }
        FeatureVector::new(features)
    }
}

/// Always fails at inference time.
#[derive(Debug)]
pub struct BrokenEmbedder;

impl ImageEmbedder for BrokenEmbedder {
    fn input_layout(&self) -> InputLayout {
        InputLayout::Nhwc
    }

    fn embed(&self, _pixels: ArrayView4<'_, f32>) -> Result<FeatureVector, AnalysisError> {
        Err(AnalysisError::Embedding("inference backend crashed".into()))
    }
}

/// Panics inside the extraction branch.
#[derive(Debug)]
pub struct PanickingEmbedder;

impl ImageEmbedder for PanickingEmbedder {
    fn input_layout(&self) -> InputLayout {
        InputLayout::Nchw
    }

    fn embed(&self, _pixels: ArrayView4<'_, f32>) -> Result<FeatureVector, AnalysisError> {
        panic!("embedding backend aborted");
    }
}

pub fn analyzer_with(embedder: Arc<dyn ImageEmbedder>) -> Analyzer {
    Analyzer::builder()
        .with_embedder(embedder)
        .and_then(|builder| builder.build())
        .expect("Failed to create analyzer")
}

pub fn test_analyzer() -> Analyzer {
    analyzer_with(Arc::new(BlockMeanEmbedder::default()))
}

/// A synthetic radiograph: dark background, brighter "lung" ellipses, a rib-like stripe pattern.
pub fn radiograph(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let (fx, fy) = (x as f32 / width as f32, y as f32 / height as f32);
        let in_lung = |cx: f32| ((fx - cx) / 0.18).powi(2) + ((fy - 0.5) / 0.35).powi(2) < 1.0;
        let mut level = 30.0;
        if in_lung(0.3) || in_lung(0.7) {
            level = 150.0;
            if (y / 12) % 2 == 0 {
                level += 40.0;
            }
        }
        let v = level as u8;
        Rgb([v, v, v])
    })
}

pub fn encode(image: RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("Failed to encode test image");
    bytes
}
