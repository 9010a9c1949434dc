//! Blurred backdrop pipeline: capture a host surface, downscale it, blur
//! it, and hand the result back for presentation behind a modal overlay.
//!
//! The host supplies the two edges of the pipeline as traits
//! ([`CaptureSource`] and [`PresentationSink`]); everything in between runs
//! on a [`BlurOrchestrator`] worker thread with cooperative cancellation.

pub mod blurring;
pub mod pipeline;
pub mod sampling;
pub mod shared;

pub use blurring::domain::blur_backend::{BackendKind, BlurBackend};
pub use pipeline::capture::{CaptureSource, PresentationSink};
pub use pipeline::orchestrator::BlurOrchestrator;
pub use pipeline::task::{BlurMetrics, BlurResult, TaskHandle, TaskOutcome, TaskState};
pub use sampling::downscale_sampler::DownscaleSampler;
pub use shared::blur_config::{BackendPreference, BlurConfig};
pub use shared::error::BlurError;
pub use shared::exclusion_bands::ExclusionBands;
pub use shared::pixel_buffer::{PixelBuffer, PixelFormat};
