use thiserror::Error;

/// Terminal pipeline failures reported through a task's terminal state.
///
/// None of these are retried by the core; retry policy, if any, belongs
/// to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlurError {
    /// A pixel buffer was requested with a zero dimension, or the supplied
    /// byte store does not match the stated dimensions.
    #[error("invalid pixel buffer dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// An operation was attempted on a buffer whose store was released.
    #[error("pixel buffer used after release")]
    UseAfterRelease,

    /// The capture source produced no buffer (e.g. zero-sized surface).
    #[error("no snapshot available from the capture source")]
    NoSnapshotAvailable,

    /// The exclusion bands consume the entire source rectangle.
    #[error("exclusion bands leave no pixels in a {width}x{height} source")]
    DegenerateRegion { width: u32, height: u32 },
}
