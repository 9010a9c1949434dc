pub mod blur_config;
pub mod error;
pub mod exclusion_bands;
pub mod pixel_buffer;
