use std::sync::atomic::AtomicBool;

use thiserror::Error;

use crate::shared::error::BlurError;
use crate::shared::pixel_buffer::{PixelBuffer, PixelFormat};

/// A concrete blur implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Cpu,
    Accelerated,
}

/// Failures internal to the blurring layer.
///
/// Everything except `Cancelled` and `Buffer` is recoverable: the pipeline
/// substitutes the CPU stack blur and continues, so these variants never
/// reach a caller as a task error.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("blur cancelled")]
    Cancelled,

    #[error("accelerated backend unavailable on this host")]
    Unavailable,

    #[error("pixel format {0:?} unsupported by the accelerated path")]
    UnsupportedFormat(PixelFormat),

    #[error("accelerated backend execution failed: {0}")]
    Execution(String),

    #[error(transparent)]
    Buffer(#[from] BlurError),
}

/// Domain interface for blurring a whole buffer in place.
///
/// Contract shared by every implementation:
/// - radius 0 leaves the buffer bit-identical;
/// - a failing call leaves the buffer untouched, so a fallback backend can
///   rerun on the same data (a cancelled call may leave it partially
///   blurred; the owning task releases it without looking);
/// - `cancelled` is polled often enough that cancellation latency is bounded
///   by one row's work, and a cancelled call returns `BackendError::Cancelled`
///   without finishing.
///
/// On success the implementation reports which backend actually produced the
/// pixels, which matters once fallback is in play.
pub trait BlurBackend: Send {
    fn kind(&self) -> BackendKind;

    fn blur(
        &self,
        buffer: &mut PixelBuffer,
        radius: u32,
        cancelled: &AtomicBool,
    ) -> Result<BackendKind, BackendError>;
}
