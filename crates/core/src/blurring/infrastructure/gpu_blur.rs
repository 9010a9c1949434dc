use std::sync::atomic::{AtomicBool, Ordering};

use crate::blurring::domain::blur_backend::{BackendError, BackendKind, BlurBackend};
use crate::shared::pixel_buffer::{PixelBuffer, PixelFormat};

use super::gpu_context::GpuContext;

/// Optional hardware-assisted blur with the same external contract as the
/// stack blur: same shapes in and out, visually similar result, not
/// required to be bit-identical.
///
/// Both failure points (no usable adapter at probe time, a device error at
/// run time) stay inside the blurring layer: the pipeline substitutes the
/// stack blur and only instrumentation ever sees the failure.
pub struct AcceleratedBlurBackend {
    context: GpuContext,
}

impl AcceleratedBlurBackend {
    /// Probe for a usable GPU. `None` means the host has no accelerated
    /// path and the caller should use [`StackBlurFilter`] instead.
    ///
    /// [`StackBlurFilter`]: super::stack_blur::StackBlurFilter
    pub fn probe() -> Option<Self> {
        GpuContext::new().map(|context| Self { context })
    }
}

impl BlurBackend for AcceleratedBlurBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Accelerated
    }

    fn blur(
        &self,
        buffer: &mut PixelBuffer,
        radius: u32,
        cancelled: &AtomicBool,
    ) -> Result<BackendKind, BackendError> {
        if radius == 0 {
            return Ok(BackendKind::Accelerated);
        }
        if cancelled.load(Ordering::Relaxed) {
            return Err(BackendError::Cancelled);
        }

        // The shader works on packed RGBA words; both pixel formats convert
        // losslessly.
        let format = buffer.format();
        let width = buffer.width();
        let height = buffer.height();
        let packed = pack_pixels(buffer.data()?, format);

        let blurred = self
            .context
            .run_separable(&packed, width, height, radius, cancelled)?;

        unpack_pixels(&blurred, buffer.data_mut()?, format);
        Ok(BackendKind::Accelerated)
    }
}

/// Pack interleaved bytes into one RGBA word per pixel (R in the low byte).
/// Rgb input gets an opaque alpha that is stripped again on unpack.
fn pack_pixels(data: &[u8], format: PixelFormat) -> Vec<u32> {
    match format {
        PixelFormat::Rgb => data
            .chunks_exact(3)
            .map(|px| {
                px[0] as u32 | (px[1] as u32) << 8 | (px[2] as u32) << 16 | 0xff00_0000
            })
            .collect(),
        PixelFormat::Argb => data
            .chunks_exact(4)
            .map(|px| {
                px[1] as u32 | (px[2] as u32) << 8 | (px[3] as u32) << 16 | (px[0] as u32) << 24
            })
            .collect(),
    }
}

fn unpack_pixels(packed: &[u32], out: &mut [u8], format: PixelFormat) {
    match format {
        PixelFormat::Rgb => {
            for (px, word) in out.chunks_exact_mut(3).zip(packed) {
                px[0] = (word & 0xff) as u8;
                px[1] = (word >> 8 & 0xff) as u8;
                px[2] = (word >> 16 & 0xff) as u8;
            }
        }
        PixelFormat::Argb => {
            for (px, word) in out.chunks_exact_mut(4).zip(packed) {
                px[0] = (word >> 24 & 0xff) as u8;
                px[1] = (word & 0xff) as u8;
                px[2] = (word >> 8 & 0xff) as u8;
                px[3] = (word >> 16 & 0xff) as u8;
            }
        }
    }
}
