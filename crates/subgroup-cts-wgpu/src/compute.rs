use crate::WgpuDevice;
use crate::compile;
use crate::resources::{Bindings, Staging};
use subgroup_cts::ShaderStage;
use subgroup_cts::device::{ComputeJob, DeviceError};
use tracing::trace;

pub(crate) fn dispatch(
    device: &WgpuDevice,
    job: &ComputeJob<'_>,
) -> Result<Vec<Vec<u8>>, DeviceError> {
    let source = job
        .programs
        .get(ShaderStage::Compute)
        .ok_or_else(|| DeviceError::Execution("compute job without a compute shader".into()))?;
    let module = compile::create_module(&device.device, source, device.naga_capabilities())?;

    let (bindings, error) = device.scoped(|| {
        Bindings::new(&device.device, &job.buffers, |_| wgpu::ShaderStages::COMPUTE)
    });
    if let Some(err) = error {
        return Err(DeviceError::Execution(err.to_string()));
    }
    let (pipeline, error) = device.scoped(|| {
        device
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Compute Pipeline"),
                layout: Some(&bindings.pipeline_layout(&device.device)),
                module: &module,
                entry_point: Some(source.entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
    });
    if let Some(err) = error {
        return Err(DeviceError::Compile {
            stage: ShaderStage::Compute,
            diagnostic: err.to_string(),
        });
    }

    let [x, y, z] = job.workgroups;
    trace!("dispatching {x}x{y}x{z} workgroups");
    let (outputs, error) = device.scoped(|| {
        let mut encoder = device
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Compute Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Compute Pass"),
                timestamp_writes: Default::default(),
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bindings.group, &[]);
            pass.dispatch_workgroups(x, y, z);
        }
        let mut staging = Staging::default();
        for buffer in &bindings.buffers {
            staging.copy_buffer(&device.device, &mut encoder, buffer);
        }
        staging.finish(&device.device, &device.queue, encoder)
    });
    if let Some(err) = error {
        return Err(DeviceError::Execution(err.to_string()));
    }
    outputs
}
