use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use scrim_core::{
    BackendPreference, BlurConfig, BlurError, BlurOrchestrator, BlurResult, CaptureSource,
    ExclusionBands, PixelBuffer, PixelFormat, TaskOutcome,
};

/// Produce a modal-style blurred backdrop from an image file.
#[derive(Parser)]
#[command(name = "scrim")]
struct Cli {
    /// Input image file.
    input: PathBuf,

    /// Output image file.
    output: PathBuf,

    /// Blur window radius (0 or negative skips the blur).
    #[arg(long, default_value = "8")]
    radius: i32,

    /// Linear downscale factor applied before blurring.
    #[arg(long, default_value = "4.0")]
    downscale: f32,

    /// Pixels excluded from the top edge before sampling.
    #[arg(long, default_value = "0")]
    band_top: u32,

    /// Pixels excluded from the bottom edge before sampling.
    #[arg(long, default_value = "0")]
    band_bottom: u32,

    /// Pixels excluded from the left edge before sampling.
    #[arg(long, default_value = "0")]
    band_left: u32,

    /// Pixels excluded from the right edge before sampling.
    #[arg(long, default_value = "0")]
    band_right: u32,

    /// Blur backend: cpu or accelerated.
    #[arg(long, default_value = "cpu")]
    backend: String,

    /// Report per-task timing and buffer sizes.
    #[arg(long)]
    instrument: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = BlurConfig::builder()
        .radius(cli.radius)
        .downscale_factor(cli.downscale)
        .bands(ExclusionBands::new(
            cli.band_top,
            cli.band_bottom,
            cli.band_left,
            cli.band_right,
        ))
        .backend(parse_backend(&cli.backend))
        .instrumentation(cli.instrument)
        .build();

    let mut orchestrator = BlurOrchestrator::new();
    let mut source = ImageFileSource { path: cli.input };
    let handle = orchestrator.start_task(config, &mut source);
    let result = match handle.wait_outcome() {
        TaskOutcome::Done(result) => result,
        TaskOutcome::Cancelled => return Err("blur task was cancelled".into()),
        TaskOutcome::Failed(err) => return Err(err.into()),
    };

    if cli.instrument {
        let m = &result.metrics;
        eprintln!(
            "{}x{} backdrop in {:?} on {:?} backend ({} -> {} bytes{})",
            result.buffer.width(),
            result.buffer.height(),
            m.elapsed,
            m.backend,
            m.capture_bytes,
            m.downscale_bytes,
            if m.fell_back { ", fell back" } else { "" },
        );
    }

    save(result, &cli.output)?;
    log::info!("Output written to {}", cli.output.display());
    Ok(())
}

/// Reads the "surface" to blur from an image file.
struct ImageFileSource {
    path: PathBuf,
}

impl CaptureSource for ImageFileSource {
    fn capture(&mut self) -> Result<PixelBuffer, BlurError> {
        let image = match image::open(&self.path) {
            Ok(image) => image.to_rgb8(),
            Err(err) => {
                log::warn!("could not read {}: {err}", self.path.display());
                return Err(BlurError::NoSnapshotAvailable);
            }
        };
        let (width, height) = image.dimensions();
        PixelBuffer::from_bytes(image.into_raw(), width, height, PixelFormat::Rgb)
    }
}

fn save(result: BlurResult, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let width = result.buffer.width();
    let height = result.buffer.height();
    let bytes = result.buffer.into_bytes()?;
    let image = image::RgbImage::from_raw(width, height, bytes)
        .ok_or("blurred buffer does not match its dimensions")?;
    image.save(output)?;
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    if cli.backend != "cpu" && cli.backend != "accelerated" {
        return Err(format!(
            "Backend must be 'cpu' or 'accelerated', got '{}'",
            cli.backend
        )
        .into());
    }
    if !cli.downscale.is_finite() || cli.downscale < 1.0 {
        return Err(format!(
            "Downscale factor must be at least 1.0, got {}",
            cli.downscale
        )
        .into());
    }
    Ok(())
}

fn parse_backend(backend: &str) -> BackendPreference {
    if backend == "accelerated" {
        BackendPreference::Accelerated
    } else {
        BackendPreference::Cpu
    }
}
