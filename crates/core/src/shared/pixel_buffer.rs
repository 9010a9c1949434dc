use ndarray::{ArrayView3, ArrayViewMut3};

use crate::shared::error::BlurError;

/// Interleaved channel layout of a [`PixelBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Three bytes per pixel: R, G, B.
    Rgb,
    /// Four bytes per pixel: A, R, G, B.
    Argb,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Argb => 4,
        }
    }
}

/// Fixed-size rectangular pixel store, the unit of data flow through the
/// capture → downscale → blur pipeline.
///
/// The backing store is released explicitly via [`release`](Self::release);
/// every operation on a released buffer fails with
/// [`BlurError::UseAfterRelease`]. There are no implicit copies; a consumer
/// that needs to retain the original must call
/// [`duplicate`](Self::duplicate).
#[derive(Debug)]
pub struct PixelBuffer {
    store: Option<Vec<u8>>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl PixelBuffer {
    /// Create a zero-filled buffer. Fails if either dimension is zero.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, BlurError> {
        if width == 0 || height == 0 {
            return Err(BlurError::InvalidDimensions { width, height });
        }
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Ok(Self {
            store: Some(vec![0u8; len]),
            width,
            height,
            format,
        })
    }

    /// Wrap an existing byte store. Fails if a dimension is zero or the
    /// store length does not equal `width * height * bytes_per_pixel`.
    pub fn from_bytes(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, BlurError> {
        if width == 0 || height == 0 {
            return Err(BlurError::InvalidDimensions { width, height });
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(BlurError::InvalidDimensions { width, height });
        }
        Ok(Self {
            store: Some(data),
            width,
            height,
            format,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> Result<&[u8], BlurError> {
        self.store.as_deref().ok_or(BlurError::UseAfterRelease)
    }

    pub fn data_mut(&mut self) -> Result<&mut [u8], BlurError> {
        self.store.as_deref_mut().ok_or(BlurError::UseAfterRelease)
    }

    /// The only way to copy a buffer.
    pub fn duplicate(&self) -> Result<Self, BlurError> {
        let data = self.data()?.to_vec();
        Ok(Self {
            store: Some(data),
            width: self.width,
            height: self.height,
            format: self.format,
        })
    }

    /// Free the backing store. Idempotent.
    pub fn release(&mut self) {
        self.store = None;
    }

    pub fn is_released(&self) -> bool {
        self.store.is_none()
    }

    /// Bytes currently held by the backing store; zero once released.
    pub fn allocated_bytes(&self) -> usize {
        self.store.as_ref().map_or(0, Vec::len)
    }

    /// Consume the buffer, handing its bytes to the caller.
    pub fn into_bytes(mut self) -> Result<Vec<u8>, BlurError> {
        self.store.take().ok_or(BlurError::UseAfterRelease)
    }

    /// View the store as a `(height, width, channels)` array.
    pub fn as_ndarray(&self) -> Result<ArrayView3<'_, u8>, BlurError> {
        let shape = self.shape();
        let data = self.data()?;
        ArrayView3::from_shape(shape, data).map_err(|_| BlurError::InvalidDimensions {
            width: self.width,
            height: self.height,
        })
    }

    pub fn as_ndarray_mut(&mut self) -> Result<ArrayViewMut3<'_, u8>, BlurError> {
        let shape = self.shape();
        let width = self.width;
        let height = self.height;
        let data = self.data_mut()?;
        ArrayViewMut3::from_shape(shape, data)
            .map_err(|_| BlurError::InvalidDimensions { width, height })
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.format.bytes_per_pixel(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_accessors() {
        let buffer = PixelBuffer::new(4, 2, PixelFormat::Rgb).unwrap();
        assert_eq!(buffer.width(), 4);
        assert_eq!(buffer.height(), 2);
        assert_eq!(buffer.format(), PixelFormat::Rgb);
        assert_eq!(buffer.data().unwrap().len(), 24);
        assert_eq!(buffer.allocated_bytes(), 24);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = PixelBuffer::new(0, 10, PixelFormat::Argb).unwrap_err();
        assert_eq!(err, BlurError::InvalidDimensions { width: 0, height: 10 });
        let err = PixelBuffer::new(10, 0, PixelFormat::Argb).unwrap_err();
        assert_eq!(err, BlurError::InvalidDimensions { width: 10, height: 0 });
    }

    #[test]
    fn test_from_bytes_length_mismatch_rejected() {
        let err = PixelBuffer::from_bytes(vec![0u8; 10], 2, 2, PixelFormat::Rgb).unwrap_err();
        assert_eq!(err, BlurError::InvalidDimensions { width: 2, height: 2 });
    }

    #[test]
    fn test_duplicate_is_independent() {
        let mut buffer = PixelBuffer::from_bytes(vec![100u8; 12], 2, 2, PixelFormat::Rgb).unwrap();
        let copy = buffer.duplicate().unwrap();
        buffer.data_mut().unwrap()[0] = 0;
        assert_eq!(copy.data().unwrap()[0], 100);
        assert_eq!(buffer.data().unwrap()[0], 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut buffer = PixelBuffer::new(2, 2, PixelFormat::Argb).unwrap();
        buffer.release();
        assert!(buffer.is_released());
        buffer.release();
        assert!(buffer.is_released());
        assert_eq!(buffer.allocated_bytes(), 0);
    }

    #[test]
    fn test_use_after_release_fails() {
        let mut buffer = PixelBuffer::new(2, 2, PixelFormat::Rgb).unwrap();
        buffer.release();
        assert_eq!(buffer.data().unwrap_err(), BlurError::UseAfterRelease);
        assert_eq!(buffer.data_mut().unwrap_err(), BlurError::UseAfterRelease);
        assert_eq!(buffer.duplicate().unwrap_err(), BlurError::UseAfterRelease);
        assert_eq!(buffer.into_bytes().unwrap_err(), BlurError::UseAfterRelease);
    }

    #[test]
    fn test_as_ndarray_shape_and_pixel_access() {
        let mut data = vec![0u8; 2 * 2 * 4];
        // pixel (row=1, col=0): A=255, R=128
        data[(2 + 0) * 4] = 255;
        data[(2 + 0) * 4 + 1] = 128;
        let buffer = PixelBuffer::from_bytes(data, 2, 2, PixelFormat::Argb).unwrap();
        let arr = buffer.as_ndarray().unwrap();
        assert_eq!(arr.shape(), &[2, 2, 4]);
        assert_eq!(arr[[1, 0, 0]], 255);
        assert_eq!(arr[[1, 0, 1]], 128);
    }

    #[test]
    fn test_as_ndarray_mut_modification() {
        let mut buffer = PixelBuffer::new(2, 2, PixelFormat::Rgb).unwrap();
        {
            let mut arr = buffer.as_ndarray_mut().unwrap();
            arr[[0, 1, 2]] = 77;
        }
        assert_eq!(buffer.as_ndarray().unwrap()[[0, 1, 2]], 77);
    }

    #[test]
    fn test_into_bytes_hands_over_store() {
        let buffer = PixelBuffer::from_bytes(vec![9u8; 12], 2, 2, PixelFormat::Rgb).unwrap();
        let bytes = buffer.into_bytes().unwrap();
        assert_eq!(bytes, vec![9u8; 12]);
    }
}
