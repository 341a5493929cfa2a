//! wgpu compute backend for the layout kernel
//!
//! Owns the device, the pipeline, and the storage buffers. Buffers are
//! (re)allocated when the graph outgrows them and rewritten every dispatch,
//! since topology and external position updates can change between ticks.

use std::sync::Arc;

use tracing::{debug, info};

use super::shaders::layout_shader;
use crate::error::{CapabilityError, ExecutorError};
use crate::executor::kernel::{
    ComputeBackend, KernelBuffers, KernelNeighbor, KernelNode, KernelSpan, WORKGROUP_SIZE,
};
use crate::params::SimulationParameters;

/// Smallest buffer allocation (wgpu rejects zero-sized bindings)
const MIN_BUFFER_SIZE: u64 = 16;

/// Storage buffers sized for a particular graph
struct DeviceBuffers {
    nodes_in: wgpu::Buffer,
    nodes_out: wgpu::Buffer,
    spans: wgpu::Buffer,
    neighbors: wgpu::Buffer,
    staging: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    node_capacity: usize,
    neighbor_capacity: usize,
}

/// Kernel backend dispatching the WGSL layout shader
pub struct GpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    buffers: Option<DeviceBuffers>,
}

impl GpuBackend {
    /// Acquire an adapter and device and build the pipeline
    pub fn new() -> Result<Self, CapabilityError> {
        let (device, queue) = pollster::block_on(Self::create_device())?;
        Self::with_device(Arc::new(device), Arc::new(queue))
    }

    /// Build the pipeline on an existing device and queue
    pub fn with_device(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
    ) -> Result<Self, CapabilityError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Layout Kernel Shader"),
            source: wgpu::ShaderSource::Wgsl(layout_shader().into()),
        });

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Layout Kernel Bind Group Layout"),
            entries: &[
                storage(0, true),
                storage(1, false),
                storage(2, true),
                storage(3, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
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
            label: Some("Layout Kernel Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Layout Kernel Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("layout_step"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Layout Uniform Buffer"),
            size: std::mem::size_of::<crate::executor::KernelUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(CapabilityError::ParallelUnavailable(format!(
                "shader pipeline rejected: {err}"
            )));
        }

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            uniform_buffer,
            buffers: None,
        })
    }

    async fn create_device() -> Result<(wgpu::Device, wgpu::Queue), CapabilityError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                CapabilityError::ParallelUnavailable("no suitable GPU adapter".to_string())
            })?;

        info!(adapter = %adapter.get_info().name, "selected GPU adapter");

        adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Layout Kernel Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None, // trace path
            )
            .await
            .map_err(|e| CapabilityError::ParallelUnavailable(e.to_string()))
    }

    /// Make sure device buffers can hold `nodes` nodes and `neighbors` neighbor entries
    fn ensure_capacity(&mut self, nodes: usize, neighbors: usize) {
        let fits = match &self.buffers {
            Some(b) => b.node_capacity >= nodes && b.neighbor_capacity >= neighbors,
            None => false,
        };

        if !fits {
            let node_capacity = nodes.next_power_of_two().max(1);
            let neighbor_capacity = neighbors.next_power_of_two().max(1);
            debug!(node_capacity, neighbor_capacity, "growing device buffers");
            self.buffers = Some(self.allocate(node_capacity, neighbor_capacity));
        }
    }

    fn allocate(&self, node_capacity: usize, neighbor_capacity: usize) -> DeviceBuffers {
        let node_bytes =
            ((node_capacity * std::mem::size_of::<KernelNode>()) as u64).max(MIN_BUFFER_SIZE);
        let span_bytes =
            ((node_capacity * std::mem::size_of::<KernelSpan>()) as u64).max(MIN_BUFFER_SIZE);
        let neighbor_bytes = ((neighbor_capacity * std::mem::size_of::<KernelNeighbor>()) as u64)
            .max(MIN_BUFFER_SIZE);

        let buffer = |label: &str, size: u64, usage: wgpu::BufferUsages| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        };

        let nodes_in = buffer(
            "Nodes In Buffer",
            node_bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let nodes_out = buffer(
            "Nodes Out Buffer",
            node_bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );
        let spans = buffer(
            "Span Buffer",
            span_bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let neighbors = buffer(
            "Neighbor Buffer",
            neighbor_bytes,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let staging = buffer(
            "Staging Buffer",
            node_bytes,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Layout Kernel Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: nodes_in.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: nodes_out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: spans.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: neighbors.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        DeviceBuffers {
            nodes_in,
            nodes_out,
            spans,
            neighbors,
            staging,
            bind_group,
            node_capacity,
            neighbor_capacity,
        }
    }
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn dispatch(
        &mut self,
        buffers: &mut KernelBuffers,
        _params: &SimulationParameters,
        _dt: f32,
    ) -> Result<(), ExecutorError> {
        let node_count = buffers.nodes.len();
        if node_count == 0 {
            return Ok(());
        }

        self.ensure_capacity(node_count, buffers.neighbors.len());
        let Some(gpu) = self.buffers.as_ref() else {
            return Err(ExecutorError::Dispatch("buffers not allocated".to_string()));
        };
        let (device, queue) = (&self.device, &self.queue);

        let uniforms = bytemuck::bytes_of(&buffers.uniforms);
        queue.write_buffer(&self.uniform_buffer, 0, uniforms);
        queue.write_buffer(&gpu.nodes_in, 0, bytemuck::cast_slice(&buffers.nodes));
        queue.write_buffer(&gpu.spans, 0, bytemuck::cast_slice(&buffers.spans));
        if !buffers.neighbors.is_empty() {
            queue.write_buffer(&gpu.neighbors, 0, bytemuck::cast_slice(&buffers.neighbors));
        }

        let node_bytes = (node_count * std::mem::size_of::<KernelNode>()) as u64;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Layout Kernel Encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Layout Kernel Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &gpu.bind_group, &[]);
            pass.dispatch_workgroups((node_count as u32).div_ceil(WORKGROUP_SIZE).max(1), 1, 1);
        }
        encoder.copy_buffer_to_buffer(&gpu.nodes_out, 0, &gpu.staging, 0, node_bytes);
        queue.submit(std::iter::once(encoder.finish()));

        let slice = gpu.staging.slice(..node_bytes);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| ExecutorError::Readback(e.to_string()))?
            .map_err(|e| ExecutorError::Readback(e.to_string()))?;

        {
            let data = slice.get_mapped_range();
            buffers.nodes.clear();
            buffers.nodes.extend_from_slice(bytemuck::cast_slice(&data));
        }
        gpu.staging.unmap();

        Ok(())
    }
}
