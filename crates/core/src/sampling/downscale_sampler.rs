use crate::shared::error::BlurError;
use crate::shared::exclusion_bands::ExclusionBands;
use crate::shared::pixel_buffer::PixelBuffer;

/// Reduces a buffer's resolution by a linear factor, skipping the exclusion
/// bands.
///
/// Sampling is area-average: each output pixel is the rounded mean of its
/// source block. Nearest-neighbor would be cheaper but produces visible
/// moiré once the blur runs over it, so it is deliberately not offered.
#[derive(Debug, Default)]
pub struct DownscaleSampler;

impl DownscaleSampler {
    pub fn new() -> Self {
        Self
    }

    /// Produce a new buffer of `floor(effective / factor)` pixels per axis,
    /// minimum 1x1, where the effective rectangle is the source minus
    /// `bands`. The source is left untouched.
    ///
    /// Fails with [`BlurError::DegenerateRegion`] when the bands consume the
    /// whole source.
    pub fn downscale(
        &self,
        source: &PixelBuffer,
        factor: f32,
        bands: ExclusionBands,
    ) -> Result<PixelBuffer, BlurError> {
        let width = source.width();
        let height = source.height();
        let (rect_x, rect_y, rect_w, rect_h) = bands
            .effective_rect(width, height)
            .ok_or(BlurError::DegenerateRegion { width, height })?;

        // Config clamps the factor already; guard against direct callers.
        let factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };

        if factor == 1.0 && bands.is_empty() {
            return source.duplicate();
        }

        let out_w = (((rect_w as f64) / factor as f64).floor() as u32).max(1);
        let out_h = (((rect_h as f64) / factor as f64).floor() as u32).max(1);

        let channels = source.format().bytes_per_pixel();
        let src = source.as_ndarray()?;

        let mut out = vec![0u8; out_w as usize * out_h as usize * channels];
        let out_stride = out_w as usize * channels;

        for oy in 0..out_h as usize {
            let (sy0, sy1) = block_range(oy, factor, rect_h);
            for ox in 0..out_w as usize {
                let (sx0, sx1) = block_range(ox, factor, rect_w);
                let count = ((sy1 - sy0) * (sx1 - sx0)) as u64;

                let mut sums = [0u64; 4];
                for sy in sy0..sy1 {
                    let y = rect_y as usize + sy;
                    for sx in sx0..sx1 {
                        let x = rect_x as usize + sx;
                        for (c, sum) in sums.iter_mut().enumerate().take(channels) {
                            *sum += src[[y, x, c]] as u64;
                        }
                    }
                }

                let dst = oy * out_stride + ox * channels;
                for (c, sum) in sums.iter().enumerate().take(channels) {
                    out[dst + c] = ((sum + count / 2) / count) as u8;
                }
            }
        }

        PixelBuffer::from_bytes(out, out_w, out_h, source.format())
    }
}

/// Source index range `[start, end)` of the block feeding one output pixel,
/// clamped to the effective extent. Blocks tile the source without overlap.
fn block_range(out_index: usize, factor: f32, extent: u32) -> (usize, usize) {
    let start = (out_index as f64 * factor as f64) as usize;
    let end = ((out_index as f64 + 1.0) * factor as f64) as usize;
    let start = start.min(extent as usize - 1);
    let end = end.clamp(start + 1, extent as usize);
    (start, end)
}
