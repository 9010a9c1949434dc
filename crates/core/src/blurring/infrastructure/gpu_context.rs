use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use crate::blurring::domain::blur_backend::BackendError;

/// Shared GPU state for the accelerated blur path.
///
/// Holds the wgpu device, queue, and compute pipeline so they are created
/// once per worker and reused across tasks.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

/// Packed params matching the WGSL uniform layout (16 bytes, 4 x u32).
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuBlurParams {
    width: u32,
    height: u32,
    radius: u32,
    direction: u32,
}

impl GpuContext {
    /// Capability probe. Returns `None` when no suitable adapter exists or
    /// the device cannot be created, in which case the CPU path is used.
    pub fn new() -> Option<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("scrim-blur-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .ok()?;

        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("separable-blur-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/separable_blur.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blur-bind-group-layout"),
            entries: &[
                // params uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // source storage (read)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // destination storage (read-write)
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blur-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("blur-pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Some(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
        })
    }

    /// Run the two-pass separable blur on packed RGBA words.
    ///
    /// The cancellation flag is polled between passes. Any device error
    /// raised during submission surfaces as `BackendError::Execution`; the
    /// caller's pixel data is replaced only on full success.
    pub fn run_separable(
        &self,
        pixels: &[u32],
        width: u32,
        height: u32,
        radius: u32,
        cancelled: &AtomicBool,
    ) -> Result<Vec<u32>, BackendError> {
        let buf_size = (pixels.len() * 4) as u64;

        let ping = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("blur-ping"),
            size: buf_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let pong = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("blur-pong"),
            size: buf_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("blur-staging"),
            size: buf_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        self.queue
            .write_buffer(&ping, 0, bytemuck::cast_slice(pixels));

        // Pass 0: horizontal, ping -> pong.
        self.dispatch_pass(&ping, &pong, width, height, radius, 0);

        if cancelled.load(Ordering::Relaxed) {
            let _ = pollster::block_on(self.device.pop_error_scope());
            let _ = pollster::block_on(self.device.pop_error_scope());
            return Err(BackendError::Cancelled);
        }

        // Pass 1: vertical, pong -> ping, then out through staging.
        self.dispatch_pass(&pong, &ping, width, height, radius, 1);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("blur-readback"),
            });
        encoder.copy_buffer_to_buffer(&ping, 0, &staging, 0, buf_size);
        self.queue.submit(Some(encoder.finish()));

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            let _ = pollster::block_on(self.device.pop_error_scope());
            return Err(BackendError::Execution(err.to_string()));
        }
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::Execution(err.to_string()));
        }

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(BackendError::Execution(e.to_string())),
            Err(_) => {
                return Err(BackendError::Execution(
                    "device dropped the readback callback".into(),
                ))
            }
        }

        let mapped = slice.get_mapped_range();
        let result: Vec<u32> = bytemuck::cast_slice(&mapped).to_vec();
        drop(mapped);
        staging.unmap();

        Ok(result)
    }

    fn dispatch_pass(
        &self,
        src: &wgpu::Buffer,
        dst: &wgpu::Buffer,
        width: u32,
        height: u32,
        radius: u32,
        direction: u32,
    ) {
        let params = GpuBlurParams {
            width,
            height,
            radius,
            direction,
        };
        let params_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("blur-params"),
            size: std::mem::size_of::<GpuBlurParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&params_buf, 0, bytemuck::bytes_of(&params));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blur-bind-group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: src.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: dst.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("blur-pass"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("separable-blur"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(width.div_ceil(16), height.div_ceil(16), 1);
        }
        self.queue.submit(Some(encoder.finish()));
    }
}
