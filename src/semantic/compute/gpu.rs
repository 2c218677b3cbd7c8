//! wgpu compute backend.
//!
//! The device, bind group layout and pipeline are created once by
//! [`GpuBackend::probe`]; every dispatch allocates its own buffers inside
//! error scopes so validation or out-of-memory errors come back as
//! `BackendError` instead of hitting the uncaptured-error handler.

use futures::executor::block_on;
use wgpu::util::DeviceExt;

use super::{BackendError, ComputeBackend};

const SHADER: &str = include_str!("cosine.wgsl");

/// Largest work-group count per dispatch dimension guaranteed by wgpu.
const MAX_WORKGROUPS: usize = 65_535;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    count: u32,
    dims: u32,
    pad0: u32,
    pad1: u32,
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    width: usize,
}

impl GpuBackend {
    /// Request an adapter and device and compile the kernel.
    pub fn probe(width: usize) -> Result<Self, BackendError> {
        block_on(Self::probe_async(width))
    }

    async fn probe_async(width: usize) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::Unavailable("no compatible adapter".to_string()))?;

        let adapter_name = adapter.get_info().name;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("semex-compute"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|err| {
            log::error!("uncaptured gpu error: {err}");
        }));

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let source = SHADER.replace("{{WORKGROUP_SIZE}}", &width.to_string());
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cosine"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cosine-layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cosine-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("cosine-pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "main",
        });

        if let Some(err) = device.pop_error_scope().await {
            return Err(BackendError::Pipeline(err.to_string()));
        }

        log::info!("gpu adapter '{adapter_name}' selected");

        Ok(Self {
            device,
            queue,
            layout,
            pipeline,
            width,
        })
    }

    fn run(&self, query: &[f32], matrix: &[f32], count: usize) -> Result<Vec<f32>, BackendError> {
        let groups = count.div_ceil(self.width);
        if groups > MAX_WORKGROUPS {
            return Err(BackendError::Dispatch(format!(
                "{count} candidates need {groups} work-groups, limit is {MAX_WORKGROUPS}"
            )));
        }

        let params = Params {
            count: count as u32,
            dims: query.len() as u32,
            pad0: 0,
            pad1: 0,
        };
        let output_size = (count * std::mem::size_of::<f32>()) as wgpu::BufferAddress;

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let query_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("query"),
            contents: bytemuck::cast_slice(query),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let matrix_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("candidates"),
            contents: bytemuck::cast_slice(matrix),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let params_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let output_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cosine-bind-group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: query_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: matrix_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params_buf.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("cosine-encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("cosine-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups as u32, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&output_buf, 0, &readback_buf, 0, output_size);
        self.queue.submit(Some(encoder.finish()));

        let validation = block_on(self.device.pop_error_scope());
        let out_of_memory = block_on(self.device.pop_error_scope());
        if let Some(err) = out_of_memory {
            return Err(BackendError::Allocation(err.to_string()));
        }
        if let Some(err) = validation {
            return Err(BackendError::Dispatch(err.to_string()));
        }

        let slice = readback_buf.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        block_on(rx)
            .map_err(|_| BackendError::Readback("map callback dropped".to_string()))?
            .map_err(|e| BackendError::Readback(e.to_string()))?;

        let output = {
            let mapped = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, f32>(&mapped).to_vec()
        };
        readback_buf.unmap();

        Ok(output)
    }
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn preferred_width(&self) -> usize {
        self.width
    }

    fn dispatch(
        &self,
        query: &[f32],
        matrix: &[f32],
        count: usize,
    ) -> Result<Vec<f32>, BackendError> {
        if query.is_empty() || count == 0 {
            return Ok(vec![0.0; count]);
        }
        if matrix.len() != query.len() * count {
            return Err(BackendError::Allocation(format!(
                "matrix holds {} values, expected {count} rows of {}",
                matrix.len(),
                query.len()
            )));
        }
        self.run(query, matrix, count)
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
