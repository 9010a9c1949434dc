pub mod blur_backend;
