//! Buffers, bindings and readback of one job.

use futures::channel::oneshot;
use futures::executor::block_on;
use subgroup_cts::device::{BufferSpec, BufferUsage, DeviceError};
use wgpu::util::DeviceExt;

/// Buffers of a job, bound to group 0 at their own binding numbers.
pub(crate) struct Bindings {
    pub buffers: Vec<wgpu::Buffer>,
    pub layout: wgpu::BindGroupLayout,
    pub group: wgpu::BindGroup,
}

impl Bindings {
    pub fn new(
        device: &wgpu::Device,
        specs: &[BufferSpec],
        visibility: impl Fn(&BufferSpec) -> wgpu::ShaderStages,
    ) -> Self {
        let buffers: Vec<_> = specs.iter().map(|spec| create_buffer(device, spec)).collect();
        let layout_entries: Vec<_> = specs
            .iter()
            .map(|spec| wgpu::BindGroupLayoutEntry {
                binding: spec.binding,
                visibility: visibility(spec),
                ty: wgpu::BindingType::Buffer {
                    ty: match spec.usage {
                        BufferUsage::Storage => wgpu::BufferBindingType::Storage { read_only: false },
                        BufferUsage::StorageReadOnly => {
                            wgpu::BufferBindingType::Storage { read_only: true }
                        }
                        BufferUsage::Uniform => wgpu::BufferBindingType::Uniform,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Case Bind Group Layout"),
            entries: &layout_entries,
        });
        let group_entries: Vec<_> = specs
            .iter()
            .zip(&buffers)
            .map(|(spec, buffer)| wgpu::BindGroupEntry {
                binding: spec.binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Case Bind Group"),
            layout: &layout,
            entries: &group_entries,
        });
        Self {
            buffers,
            layout,
            group,
        }
    }

    pub fn pipeline_layout(&self, device: &wgpu::Device) -> wgpu::PipelineLayout {
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Case Pipeline Layout"),
            bind_group_layouts: &[&self.layout],
            push_constant_ranges: &[],
        })
    }
}

fn create_buffer(device: &wgpu::Device, spec: &BufferSpec) -> wgpu::Buffer {
    let usage = match spec.usage {
        BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
        BufferUsage::Storage | BufferUsage::StorageReadOnly => wgpu::BufferUsages::STORAGE,
    } | wgpu::BufferUsages::COPY_SRC;
    match &spec.contents {
        Some(contents) => device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Input Buffer"),
            contents,
            usage,
        }),
        // wgpu zero-initializes new buffers.
        None => device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Buffer"),
            size: spec.size,
            usage,
            mapped_at_creation: false,
        }),
    }
}

/// Staging copies recorded into the job's encoder, mapped once the queue is
/// idle.
#[derive(Default)]
pub(crate) struct Staging {
    buffers: Vec<wgpu::Buffer>,
}

impl Staging {
    fn staging_buffer(&mut self, device: &wgpu::Device, size: u64) -> &wgpu::Buffer {
        self.buffers.push(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        &self.buffers[self.buffers.len() - 1]
    }

    pub fn copy_buffer(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Buffer,
    ) {
        let size = source.size();
        let staging = self.staging_buffer(device, size);
        encoder.copy_buffer_to_buffer(source, 0, staging, 0, size);
    }

    /// Copies a single-row texture; rows are padded to the copy alignment.
    pub fn copy_row(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        bytes_per_pixel: u32,
    ) {
        let unpadded = texture.width() * bytes_per_pixel;
        let padded = unpadded.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let staging = self.staging_buffer(device, u64::from(padded));
        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: None,
                },
            },
            texture.size(),
        );
    }

    /// Submits `encoder`, waits for the device to go idle and returns the
    /// contents of every staging buffer in the order they were recorded.
    pub fn finish(
        self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: wgpu::CommandEncoder,
    ) -> Result<Vec<Vec<u8>>, DeviceError> {
        queue.submit(Some(encoder.finish()));
        let receivers: Vec<_> = self
            .buffers
            .iter()
            .map(|buffer| {
                let (sender, receiver) = oneshot::channel();
                buffer.slice(..).map_async(wgpu::MapMode::Read, move |res| {
                    let _ = sender.send(res);
                });
                receiver
            })
            .collect();
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| DeviceError::Lost(format!("waiting for the queue: {err}")))?;
        self.buffers
            .iter()
            .zip(receivers)
            .map(|(buffer, receiver)| {
                block_on(receiver)
                    .map_err(|_| DeviceError::Execution("mapping canceled".into()))?
                    .map_err(|err| DeviceError::Execution(format!("mapping failed: {err}")))?;
                let data = buffer.slice(..).get_mapped_range().to_vec();
                buffer.unmap();
                Ok(data)
            })
            .collect()
    }
}
