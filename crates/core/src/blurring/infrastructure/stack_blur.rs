use std::sync::atomic::{AtomicBool, Ordering};

use crate::blurring::domain::blur_backend::{BackendError, BackendKind, BlurBackend};
use crate::shared::pixel_buffer::PixelBuffer;

/// Largest radius the fixed-point tables cover.
pub const MAX_RADIUS: u32 = 254;

/// Multiplication factors replacing the per-pixel division, indexed by
/// radius. Paired with [`STACK_BLUR_SHR`].
#[rustfmt::skip]
const STACK_BLUR_MUL: [u32; 255] = [
    512,512,456,512,328,456,335,512,405,328,271,456,388,335,292,512,
    454,405,364,328,298,271,496,456,420,388,360,335,312,292,273,512,
    482,454,428,405,383,364,345,328,312,298,284,271,259,496,475,456,
    437,420,404,388,374,360,347,335,323,312,302,292,282,273,265,512,
    497,482,468,454,441,428,417,405,394,383,373,364,354,345,337,328,
    320,312,305,298,291,284,278,271,265,259,507,496,485,475,465,456,
    446,437,428,420,412,404,396,388,381,374,367,360,354,347,341,335,
    329,323,318,312,307,302,297,292,287,282,278,273,269,265,261,512,
    505,497,489,482,475,468,461,454,447,441,435,428,422,417,411,405,
    399,394,389,383,378,373,368,364,359,354,350,345,341,337,332,328,
    324,320,316,312,309,305,301,298,294,291,287,284,281,278,274,271,
    268,265,262,259,257,507,501,496,491,485,480,475,470,465,460,456,
    451,446,442,437,433,428,424,420,416,412,408,404,400,396,392,388,
    385,381,377,374,370,367,363,360,357,354,350,347,344,341,338,335,
    332,329,326,323,320,318,315,312,310,307,304,302,299,297,294,292,
    289,287,285,282,280,278,275,273,271,269,267,265,263,261,259,
];

/// Right-shift amounts paired with [`STACK_BLUR_MUL`], indexed by radius.
#[rustfmt::skip]
const STACK_BLUR_SHR: [u32; 255] = [
     9, 11, 12, 13, 13, 14, 14, 15, 15, 15, 15, 16, 16, 16, 16, 17,
    17, 17, 17, 17, 17, 17, 18, 18, 18, 18, 18, 18, 18, 18, 18, 19,
    19, 19, 19, 19, 19, 19, 19, 19, 19, 19, 19, 19, 19, 20, 20, 20,
    20, 20, 20, 20, 20, 20, 20, 20, 20, 20, 20, 20, 20, 20, 20, 21,
    21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21,
    21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 22, 22, 22, 22, 22, 22,
    22, 22, 22, 22, 22, 22, 22, 22, 22, 22, 22, 22, 22, 22, 22, 22,
    22, 22, 22, 22, 22, 22, 22, 22, 22, 22, 22, 22, 22, 22, 22, 23,
    23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23,
    23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23,
    23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23, 23,
    23, 23, 23, 23, 23, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24,
    24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24,
    24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24,
    24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24,
    24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24, 24,
];

/// The mandatory CPU blur backend: separable approximate Gaussian via the
/// running-sum "stack" technique.
///
/// One horizontal pass then one vertical pass; each pass slides a window of
/// `2 * radius + 1` pixels along a line, updating three running sums
/// incrementally, so the cost is O(width * height) regardless of radius.
/// Edges clamp (the border pixel repeats); radius 0 is the bit-exact
/// identity. Output depends only on the input bytes and the radius.
#[derive(Debug, Default)]
pub struct StackBlurFilter;

impl StackBlurFilter {
    pub fn new() -> Self {
        Self
    }

    /// Blur into a fresh buffer, leaving `source` intact.
    pub fn blurred_copy(
        &self,
        source: &PixelBuffer,
        radius: u32,
        cancelled: &AtomicBool,
    ) -> Result<PixelBuffer, BackendError> {
        let mut copy = source.duplicate()?;
        self.blur(&mut copy, radius, cancelled)?;
        Ok(copy)
    }
}

impl BlurBackend for StackBlurFilter {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn blur(
        &self,
        buffer: &mut PixelBuffer,
        radius: u32,
        cancelled: &AtomicBool,
    ) -> Result<BackendKind, BackendError> {
        if radius == 0 {
            return Ok(BackendKind::Cpu);
        }
        let radius = radius.min(MAX_RADIUS) as usize;
        let width = buffer.width() as usize;
        let height = buffer.height() as usize;
        let channels = buffer.format().bytes_per_pixel();
        let data = buffer.data_mut()?;

        blur_pass(data, width, height, channels, radius, false, cancelled)?;
        blur_pass(data, width, height, channels, radius, true, cancelled)?;
        Ok(BackendKind::Cpu)
    }
}

/// One separable pass over every line of the image.
///
/// A "line" is a row for the horizontal pass and a column for the vertical
/// pass; the cancellation flag is polled once per line, so cancellation
/// latency is bounded by a single line's work.
fn blur_pass(
    data: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    radius: usize,
    vertical: bool,
    cancelled: &AtomicBool,
) -> Result<(), BackendError> {
    let (lines, line_len, line_stride, pixel_stride) = if vertical {
        (width, height, channels, width * channels)
    } else {
        (height, width, width * channels, channels)
    };
    if line_len == 0 {
        return Ok(());
    }

    let div = 2 * radius + 1;
    let mul = STACK_BLUR_MUL[radius] as u64;
    let shr = STACK_BLUR_SHR[radius];
    let last = line_len - 1;
    let mut stack = vec![[0u8; 4]; div];

    for line in 0..lines {
        if cancelled.load(Ordering::Relaxed) {
            return Err(BackendError::Cancelled);
        }
        let base = line * line_stride;

        let mut sum = [0u32; 4];
        let mut sum_in = [0u32; 4];
        let mut sum_out = [0u32; 4];

        // Prime the stack with the clamped window around the first pixel.
        for i in 0..div {
            let pos = (i as isize - radius as isize).clamp(0, last as isize) as usize;
            let off = base + pos * pixel_stride;
            let mut px = [0u8; 4];
            px[..channels].copy_from_slice(&data[off..off + channels]);
            stack[i] = px;

            let weight = (radius + 1 - radius.abs_diff(i)) as u32;
            for c in 0..channels {
                sum[c] += px[c] as u32 * weight;
                if i <= radius {
                    sum_out[c] += px[c] as u32;
                } else {
                    sum_in[c] += px[c] as u32;
                }
            }
        }

        let mut stack_ptr = radius;
        for x in 0..line_len {
            let off = base + x * pixel_stride;
            for c in 0..channels {
                data[off + c] = ((sum[c] as u64 * mul) >> shr) as u8;
                sum[c] -= sum_out[c];
            }

            // The slot leaving the window is refilled with the pixel
            // entering it; reads stay strictly ahead of the write cursor,
            // which makes the in-place pass safe.
            let start = (stack_ptr + div - radius) % div;
            let incoming = base + (x + radius + 1).min(last) * pixel_stride;
            for c in 0..channels {
                sum_out[c] -= stack[start][c] as u32;
                stack[start][c] = data[incoming + c];
                sum_in[c] += stack[start][c] as u32;
                sum[c] += sum_in[c];
            }

            stack_ptr = (stack_ptr + 1) % div;
            for c in 0..channels {
                sum_out[c] += stack[stack_ptr][c] as u32;
                sum_in[c] -= stack[stack_ptr][c] as u32;
            }
        }
    }

    Ok(())
}
