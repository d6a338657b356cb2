//! Point-list draws into a one-row `R32Uint` attachment.

use crate::WgpuDevice;
use crate::compile;
use crate::resources::{Bindings, Staging};
use subgroup_cts::device::{BufferUsage, DeviceError, GraphicsJob, GraphicsReadback, Topology};
use subgroup_cts::ShaderStage;
use tracing::trace;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;

pub(crate) fn draw(device: &WgpuDevice, job: &GraphicsJob<'_>) -> Result<GraphicsReadback, DeviceError> {
    if let Topology::Patches { .. } = job.topology {
        return Err(DeviceError::Unsupported("wgpu has no tessellation stages".into()));
    }
    if let Some(stage) = job
        .programs
        .stages()
        .stages()
        .find(|stage| !matches!(stage, ShaderStage::Vertex | ShaderStage::Fragment))
    {
        return Err(DeviceError::Unsupported(format!("wgpu has no {stage} stage")));
    }
    let program = |stage| {
        job.programs
            .get(stage)
            .ok_or_else(|| DeviceError::Execution(format!("draw without a {stage} shader")))
    };
    let vertex_source = program(ShaderStage::Vertex)?;
    let fragment_source = program(ShaderStage::Fragment)?;
    let capabilities = device.naga_capabilities();
    let vertex = compile::create_module(&device.device, vertex_source, capabilities)?;
    let fragment = compile::create_module(&device.device, fragment_source, capabilities)?;

    let vertex_storage = device.caps.can_write_storage(ShaderStage::Vertex);
    let (bindings, error) = device.scoped(|| {
        Bindings::new(&device.device, &job.buffers, |spec| match spec.usage {
            BufferUsage::Storage if !vertex_storage => wgpu::ShaderStages::FRAGMENT,
            _ => wgpu::ShaderStages::VERTEX_FRAGMENT,
        })
    });
    if let Some(err) = error {
        return Err(DeviceError::Execution(err.to_string()));
    }

    let (pipeline, error) = device.scoped(|| {
        device
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Render Pipeline"),
                layout: Some(&bindings.pipeline_layout(&device.device)),
                vertex: wgpu::VertexState {
                    module: &vertex,
                    entry_point: Some(vertex_source.entry_point),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::PointList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment,
                    entry_point: Some(fragment_source.entry_point),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
    });
    if let Some(err) = error {
        let stage = job
            .programs
            .iter()
            .find(|source| source.subgroup_code)
            .map_or(ShaderStage::Fragment, |source| source.stage);
        return Err(DeviceError::Compile {
            stage,
            diagnostic: err.to_string(),
        });
    }

    let target = device.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Result Attachment"),
        size: wgpu::Extent3d {
            width: job.framebuffer_width,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    trace!("drawing {} points", job.vertex_count);
    let (outputs, error) = device.scoped(|| {
        let mut encoder = device
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bindings.group, &[]);
            pass.draw(0..job.vertex_count, 0..1);
        }
        let mut staging = Staging::default();
        for buffer in &bindings.buffers {
            staging.copy_buffer(&device.device, &mut encoder, buffer);
        }
        staging.copy_row(&device.device, &mut encoder, &target, 4);
        staging.finish(&device.device, &device.queue, encoder)
    });
    if let Some(err) = error {
        return Err(DeviceError::Execution(err.to_string()));
    }
    let mut buffers = outputs?;
    let row = buffers.pop().unwrap_or_default();
    let pixels = job.framebuffer_width as usize * 4;
    Ok(GraphicsReadback {
        buffers,
        framebuffer: bytemuck::pod_collect_to_vec(&row[..pixels.min(row.len())]),
    })
}
