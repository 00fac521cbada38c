use image::{GrayImage, Rgb, RgbImage};
use log::debug;
use ndarray::Array2;
use serde::Serialize;

use super::error::AnalysisError;
use super::decoder::Image;

pub const DEFAULT_KERNEL_SIZE: usize = 21;
pub const DEFAULT_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapConfig {
    kernel_size: usize,
    epsilon: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            kernel_size: DEFAULT_KERNEL_SIZE,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl HeatmapConfig {
    /// # Errors
    /// - `Validation` if `kernel_size` is even or zero
    /// - `Validation` if `epsilon` is not a positive finite number
    pub fn new(kernel_size: usize, epsilon: f64) -> Result<Self, AnalysisError> {
        if kernel_size == 0 || kernel_size % 2 == 0 {
            return Err(AnalysisError::Validation(format!(
                "Gaussian kernel size must be odd and positive, got {}",
                kernel_size
            )));
        }
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(AnalysisError::Validation(format!(
                "Normalization epsilon must be positive, got {}",
                epsilon
            )));
        }
        Ok(Self { kernel_size, epsilon })
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Standard deviation implied by the kernel size when none is given.
    pub fn sigma(&self) -> f64 {
        0.3 * ((self.kernel_size as f64 - 1.0) * 0.5 - 1.0) + 0.8
    }
}

/// Per-pixel saliency intensities in `[0, 1]`, indexed `[row, column]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    values: Array2<f64>,
}

/// Compact description of a heatmap for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapSummary {
    pub width: u32,
    pub height: u32,
    pub mean_intensity: f64,
    /// `(x, y)` of the first maximal cell in row-major order
    pub peak: (u32, u32),
}

impl Heatmap {
    pub fn width(&self) -> u32 {
        self.values.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.values.nrows() as u32
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f64> {
        self.values.get((y as usize, x as usize)).copied()
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn summary(&self) -> HeatmapSummary {
        let mut peak = (0, 0);
        let mut peak_value = f64::NEG_INFINITY;
        for ((row, col), &value) in self.values.indexed_iter() {
            if value > peak_value {
                peak_value = value;
                peak = (col as u32, row as u32);
            }
        }
        HeatmapSummary {
            width: self.width(),
            height: self.height(),
            mean_intensity: self.values.mean().unwrap_or(0.0),
            peak,
        }
    }

    /// Renders with the "Hot" colour scale: black, red, yellow, white.
    pub fn to_rgb_image(&self) -> RgbImage {
        let mut image = RgbImage::new(self.width(), self.height());
        for ((row, col), &value) in self.values.indexed_iter() {
            image.put_pixel(col as u32, row as u32, hot_colour(value));
        }
        image
    }
}

const HOT_ANCHORS: [(f64, [f64; 3]); 4] = [
    (0.0, [0.0, 0.0, 0.0]),
    (0.3, [230.0, 0.0, 0.0]),
    (0.6, [255.0, 210.0, 0.0]),
    (1.0, [255.0, 255.0, 255.0]),
];

fn hot_colour(value: f64) -> Rgb<u8> {
    let v = value.clamp(0.0, 1.0);
    for pair in HOT_ANCHORS.windows(2) {
        let (lo, lo_rgb) = pair[0];
        let (hi, hi_rgb) = pair[1];
        if v <= hi {
            let t = (v - lo) / (hi - lo);
            let channel = |c: usize| (lo_rgb[c] + t * (hi_rgb[c] - lo_rgb[c])).round() as u8;
            return Rgb([channel(0), channel(1), channel(2)]);
        }
    }
    Rgb([255, 255, 255])
}

/// Edge-response saliency map, independent of any model.
#[derive(Debug, Clone, Default)]
pub struct HeatmapGenerator {
    config: HeatmapConfig,
}

impl HeatmapGenerator {
    pub fn new(config: HeatmapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HeatmapConfig {
        &self.config
    }

    /// Grayscale, Gaussian blur, absolute Laplacian, then min-max normalization.
    ///
    /// A uniform image has a zero Laplacian everywhere and yields all zeros.
    pub fn generate(&self, image: &Image) -> Heatmap {
        let gray = image.to_gray();
        let kernel = gaussian_kernel(self.config.kernel_size, self.config.sigma());
        let blurred = gaussian_blur(&gray, &kernel);
        let response = laplacian(&blurred).mapv(f64::abs);

        let min = response.iter().copied().fold(f64::INFINITY, f64::min);
        let max = response.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min + self.config.epsilon;
        debug!(
            "Heatmap {}x{} raw response range [{}, {}]",
            gray.width(),
            gray.height(),
            min,
            max
        );

        Heatmap {
            values: response.mapv(|v| (v - min) / range),
        }
    }
}

/// Normalized 1-D Gaussian weights of length `size`.
fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f64> {
    let center = (size as f64 - 1.0) / 2.0;
    let scale = -0.5 / (sigma * sigma);
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (scale * d * d).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Reflect-101 border handling: `dcb|abcd|cba`.
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = index;
    while i < 0 || i > last {
        i = if i < 0 { -i } else { 2 * last - i };
    }
    i as usize
}

/// Separable blur; the result is rounded and saturated back to 8-bit levels.
fn gaussian_blur(gray: &GrayImage, kernel: &[f64]) -> Array2<f64> {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let radius = (kernel.len() / 2) as isize;
    let source = Array2::from_shape_fn((height, width), |(y, x)| {
        gray.get_pixel(x as u32, y as u32).0[0] as f64
    });

    let horizontal = Array2::from_shape_fn((height, width), |(y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * source[[y, reflect_101(x as isize + k as isize - radius, width)]])
            .sum::<f64>()
    });

    Array2::from_shape_fn((height, width), |(y, x)| {
        let value: f64 = kernel
            .iter()
            .enumerate()
            .map(|(k, w)| {
                w * horizontal[[reflect_101(y as isize + k as isize - radius, height), x]]
            })
            .sum();
        value.round().clamp(0.0, 255.0)
    })
}

/// 4-neighbour Laplacian `[0,1,0; 1,-4,1; 0,1,0]` with reflect-101 borders.
fn laplacian(source: &Array2<f64>) -> Array2<f64> {
    let (height, width) = source.dim();
    Array2::from_shape_fn((height, width), |(y, x)| {
        let (yi, xi) = (y as isize, x as isize);
        let up = source[[reflect_101(yi - 1, height), x]];
        let down = source[[reflect_101(yi + 1, height), x]];
        let left = source[[y, reflect_101(xi - 1, width)]];
        let right = source[[y, reflect_101(xi + 1, width)]];
        up + down + left + right - 4.0 * source[[y, x]]
    })
}
