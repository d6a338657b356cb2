//! WGSL front end: every generated source goes through naga before wgpu sees
//! it, so failures come back as readable diagnostics instead of a validation
//! panic deep inside pipeline creation.

use naga::valid::{Capabilities, ShaderStages, SubgroupOperationSet, ValidationFlags, Validator};
use std::borrow::Cow;
use subgroup_cts::codegen::ShaderSource;
use subgroup_cts::device::DeviceError;
use tracing::trace;

/// naga capabilities granted by the enabled device features.
pub fn capabilities(features: wgpu::Features) -> Capabilities {
    let mut capabilities = Capabilities::empty();
    if features.contains(wgpu::Features::SUBGROUP) {
        capabilities |= Capabilities::SUBGROUP;
    }
    if features.contains(wgpu::Features::SUBGROUP_VERTEX) {
        capabilities |= Capabilities::SUBGROUP_VERTEX_STAGE;
    }
    if features.contains(wgpu::Features::SHADER_F64) {
        capabilities |= Capabilities::FLOAT64;
    }
    if features.contains(wgpu::Features::SHADER_INT64) {
        capabilities |= Capabilities::SHADER_INT64;
    }
    capabilities
}

/// Parses and validates one generated source.
///
/// Errors are rendered against the source text, with line and column.
pub fn validate(source: &ShaderSource, capabilities: Capabilities) -> Result<naga::Module, DeviceError> {
    let stage = source.stage;
    let text = &source.text;
    let module = naga::front::wgsl::parse_str(text).map_err(|err| DeviceError::Compile {
        stage,
        diagnostic: err.emit_to_string(text),
    })?;
    let mut subgroup_stages = ShaderStages::COMPUTE | ShaderStages::FRAGMENT;
    if capabilities.contains(Capabilities::SUBGROUP_VERTEX_STAGE) {
        subgroup_stages |= ShaderStages::VERTEX;
    }
    Validator::new(ValidationFlags::all(), capabilities)
        .subgroup_stages(subgroup_stages)
        .subgroup_operations(SubgroupOperationSet::all())
        .validate(&module)
        .map_err(|err| DeviceError::Compile {
            stage,
            diagnostic: err.emit_to_string(text),
        })?;
    Ok(module)
}

pub(crate) fn create_module(
    device: &wgpu::Device,
    source: &ShaderSource,
    capabilities: Capabilities,
) -> Result<wgpu::ShaderModule, DeviceError> {
    validate(source, capabilities)?;
    trace!("{} shader passed validation", source.stage);
    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(source.stage.name()),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&source.text)),
    }))
}
