use crate::pipeline::task::BlurResult;
use crate::shared::error::BlurError;
use crate::shared::pixel_buffer::PixelBuffer;

/// Snapshot capability supplied by the host.
///
/// Invoked synchronously on the thread that starts the task, never on the
/// worker: the surface being captured lives on the caller's side and must
/// be read there. A source with nothing to show returns
/// [`BlurError::NoSnapshotAvailable`].
pub trait CaptureSource {
    fn capture(&mut self) -> Result<PixelBuffer, BlurError>;
}

/// Presentation capability supplied by the host.
///
/// Receives the finished backdrop at most once per task, and only for a
/// task that ran to completion; cancelled and failed tasks never reach the
/// sink.
pub trait PresentationSink {
    fn accept(&mut self, result: BlurResult);
}
