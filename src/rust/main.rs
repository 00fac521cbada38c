use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use log::info;
use scanalyze::analyzer::REPORT_FILE_NAME;
use scanalyze::{Analyzer, BuiltinModel, Image, InputLayout, ModelManager};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Layout {
    Nchw,
    Nhwc,
}

impl From<Layout> for InputLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Nchw => InputLayout::Nchw,
            Layout::Nhwc => InputLayout::Nhwc,
        }
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chest X-ray image to analyze (PNG or JPEG)
    #[arg(short, long, conflicts_with = "sample", required_unless_present = "sample")]
    image: Option<PathBuf>,

    /// Analyze a synthetic uniform gray 512x512 image instead of a file
    #[arg(long)]
    sample: bool,

    /// Custom ONNX embedding model instead of the built-in DenseNet-121
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// Input tensor layout of the custom model
    #[arg(long, value_enum, default_value = "nchw", requires = "model_path")]
    layout: Layout,

    /// Force a fresh download of the built-in model
    #[arg(short, long, conflicts_with = "model_path")]
    fresh: bool,

    /// Write the text report to this file
    #[arg(long, num_args = 0..=1, default_missing_value = REPORT_FILE_NAME)]
    report: Option<PathBuf>,

    /// Write the rendered heatmap to this PNG file
    #[arg(long)]
    heatmap: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

async fn ensure_model_downloaded(fresh: bool) -> anyhow::Result<()> {
    let manager = ModelManager::new_default()?;
    let model = BuiltinModel::DenseNet121;

    if fresh {
        info!("Fresh download requested - removing any existing model files...");
        manager.remove_download(model)?;
    }

    manager.ensure_model_downloaded(model).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let start_time = Instant::now();
    let analyzer = match &args.model_path {
        Some(path) => Analyzer::builder()
            .with_custom_model(path, args.layout.into())?
            .build()?,
        None => {
            ensure_model_downloaded(args.fresh).await?;
            Analyzer::builder()
                .with_model(BuiltinModel::DenseNet121)?
                .build()?
        }
    };
    info!("Analyzer ready (took {:.2?}): {:?}", start_time.elapsed(), analyzer.info());

    let analysis = match (&args.image, args.sample) {
        (_, true) => {
            info!("Using synthetic sample image");
            analyzer.analyze_image(&Image::sample())?
        }
        (Some(path), false) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            analyzer.analyze(&bytes)?
        }
        (None, false) => bail!("Either --image or --sample is required"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&analysis.report)?);
    } else {
        println!("{}", analysis.report.render_text());
    }

    if let Some(path) = &args.report {
        std::fs::write(path, analysis.report.render_text())
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    if let Some(path) = &args.heatmap {
        analysis
            .heatmap
            .to_rgb_image()
            .save(path)
            .with_context(|| format!("Failed to write heatmap to {}", path.display()))?;
        info!("Heatmap written to {}", path.display());
    }

    Ok(())
}
