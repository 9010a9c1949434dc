pub mod backend_factory;
pub mod gpu_blur;
pub mod gpu_context;
pub mod stack_blur;
