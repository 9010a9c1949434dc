pub mod downscale_sampler;
