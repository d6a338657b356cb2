//! [`Device`] implementation on top of `wgpu`.
//!
//! wgpu takes WGSL, so cases are generated in that dialect and validated with
//! `naga` first. WGSL exposes subgroups in compute and fragment shaders only,
//! without clustered, partitioned or quad operations, and wgpu has no tessellation
//! or geometry stages: everything outside that set is reported as not
//! supported by the orchestrator before a job is ever built.

// BEGIN - Embark standard lints v0.4
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.4
// crate-specific exceptions:
#![allow(clippy::map_err_ignore)]

mod compile;
mod compute;
mod graphics;
mod resources;

pub use self::compile::{capabilities as naga_capabilities, validate};

use anyhow::Context;
use futures::executor::block_on;
use std::sync::{Arc, Mutex};
use subgroup_cts::MAX_SUBGROUP_SIZE;
use subgroup_cts::codegen::Dialect;
use subgroup_cts::device::{ComputeJob, Device, DeviceError, GraphicsJob, GraphicsReadback};
use subgroup_cts::{DeviceCapabilities, ShaderStages, SubgroupFeatures};
use tracing::{debug, error, info, warn};

/// Features requested whenever the adapter has them.
fn wanted_features() -> wgpu::Features {
    wgpu::Features::SUBGROUP
        | wgpu::Features::SUBGROUP_VERTEX
        | wgpu::Features::SHADER_F64
        | wgpu::Features::SHADER_INT64
        | wgpu::Features::VERTEX_WRITABLE_STORAGE
}

/// Smallest subgroup size WGSL guarantees when the adapter does not say.
const MIN_WGSL_SUBGROUP_SIZE: u32 = 4;

/// A wgpu adapter and its queue.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    features: wgpu::Features,
    caps: DeviceCapabilities,
    lost: Arc<Mutex<Option<String>>>,
}

impl WgpuDevice {
    /// Opens the first high-performance adapter.
    pub fn new() -> anyhow::Result<Self> {
        block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                #[cfg(target_os = "linux")]
                backends: wgpu::Backends::VULKAN,
                #[cfg(not(target_os = "linux"))]
                backends: wgpu::Backends::PRIMARY,
                flags: Default::default(),
                backend_options: Default::default(),
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .context("Failed to find a suitable GPU adapter")?;
            let info = adapter.get_info();
            let features = adapter.features() & wanted_features();
            let limits = adapter.limits();
            debug!("adapter {} ({:?}), features {features:?}", info.name, info.backend);
            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("wgpu Device"),
                    required_features: features,
                    required_limits: limits.clone(),
                    memory_hints: Default::default(),
                    trace: Default::default(),
                })
                .await
                .context("Failed to create device")?;

            let lost = Arc::new(Mutex::new(None));
            let flag = Arc::clone(&lost);
            device.set_device_lost_callback(move |reason, message| {
                warn!("device lost ({reason:?}): {message}");
                if let Ok(mut lost) = flag.lock() {
                    *lost = Some(message);
                }
            });

            device.on_uncaptured_error(Box::new(|err| error!("uncaptured wgpu error: {err}")));

            let caps = capabilities(features, &limits);
            info!(
                "running on {} with subgroup size {}",
                info.name, caps.subgroup_size
            );
            Ok(Self {
                device,
                queue,
                info,
                features,
                caps,
                lost,
            })
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    fn check_alive(&self) -> Result<(), DeviceError> {
        match self.lost.lock().map(|lost| lost.clone()) {
            Ok(None) => Ok(()),
            Ok(Some(message)) => Err(DeviceError::Lost(message)),
            Err(_) => Err(DeviceError::Lost("device-lost state poisoned".into())),
        }
    }

    /// Runs `f` inside a validation error scope.
    fn scoped<T>(&self, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let error = block_on(self.device.pop_error_scope());
        (value, error)
    }

    fn naga_capabilities(&self) -> naga::valid::Capabilities {
        compile::capabilities(self.features)
    }
}

/// What the enabled features and the adapter limits mean for the harness.
pub fn capabilities(features: wgpu::Features, limits: &wgpu::Limits) -> DeviceCapabilities {
    let subgroups = features.contains(wgpu::Features::SUBGROUP);
    let mut subgroup_stages = ShaderStages::empty();
    let mut storage_write_stages = ShaderStages::COMPUTE | ShaderStages::FRAGMENT;
    if subgroups {
        subgroup_stages |= ShaderStages::COMPUTE | ShaderStages::FRAGMENT;
        if features.contains(wgpu::Features::SUBGROUP_VERTEX) {
            subgroup_stages |= ShaderStages::VERTEX;
        }
    }
    if features.contains(wgpu::Features::VERTEX_WRITABLE_STORAGE) {
        storage_write_stages |= ShaderStages::VERTEX;
    }
    // The smallest size the adapter may pick, so shuffle indices and cluster
    // checks stay in range whatever size a pipeline ends up with.
    let subgroup_size = match (subgroups, limits.min_subgroup_size) {
        (false, _) => 0,
        (true, 0) => MIN_WGSL_SUBGROUP_SIZE,
        (true, size) => size.min(MAX_SUBGROUP_SIZE),
    };
    DeviceCapabilities {
        subgroup_size,
        pipeline_stages: ShaderStages::COMPUTE | ShaderStages::VERTEX | ShaderStages::FRAGMENT,
        subgroup_stages,
        subgroup_features: if subgroups {
            SubgroupFeatures::BASIC
                | SubgroupFeatures::VOTE
                | SubgroupFeatures::ARITHMETIC
                | SubgroupFeatures::BALLOT
                | SubgroupFeatures::SHUFFLE
                | SubgroupFeatures::SHUFFLE_RELATIVE
        } else {
            SubgroupFeatures::empty()
        },
        quad_operations_in_all_stages: false,
        storage_write_stages,
        shader_float64: features.contains(wgpu::Features::SHADER_F64),
        shader_int64: features.contains(wgpu::Features::SHADER_INT64),
        subgroup_extended_types: false,
        max_compute_workgroup_size: [
            limits.max_compute_workgroup_size_x,
            limits.max_compute_workgroup_size_y,
            limits.max_compute_workgroup_size_z,
        ],
        max_compute_invocations: limits.max_compute_invocations_per_workgroup,
    }
}

impl Device for WgpuDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    fn dialect(&self) -> Dialect {
        Dialect::Wgsl
    }

    fn dispatch(&self, job: &ComputeJob<'_>) -> Result<Vec<Vec<u8>>, DeviceError> {
        self.check_alive()?;
        compute::dispatch(self, job)
    }

    fn draw(&self, job: &GraphicsJob<'_>) -> Result<GraphicsReadback, DeviceError> {
        self.check_alive()?;
        graphics::draw(self, job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use subgroup_cts::ShaderStage;

    #[test]
    fn no_subgroup_feature_means_no_subgroups() {
        let caps = capabilities(wgpu::Features::SHADER_F64, &wgpu::Limits::default());
        assert!(!caps.has_subgroups());
        assert!(caps.shader_float64);
        assert!(caps.subgroup_features.is_empty());
    }

    #[test]
    fn subgroup_limits_are_clamped() {
        let limits = wgpu::Limits {
            min_subgroup_size: 256,
            max_subgroup_size: 256,
            ..wgpu::Limits::default()
        };
        let caps = capabilities(wgpu::Features::SUBGROUP, &limits);
        assert_eq!(caps.subgroup_size, MAX_SUBGROUP_SIZE);
        assert!(caps.subgroups_in(ShaderStage::Compute));
        assert!(caps.subgroups_in(ShaderStage::Fragment));
        assert!(!caps.subgroups_in(ShaderStage::Vertex));
        assert!(!caps.supports_stage(ShaderStage::Geometry));
        assert!(!caps.subgroup_features.contains(SubgroupFeatures::CLUSTERED));
        assert!(!caps.subgroup_features.contains(SubgroupFeatures::QUAD));

        let caps = capabilities(wgpu::Features::SUBGROUP, &wgpu::Limits::default());
        assert_eq!(caps.subgroup_size, MIN_WGSL_SUBGROUP_SIZE);
    }

    #[test]
    fn workgroup_limits_come_from_the_adapter() {
        let limits = wgpu::Limits::downlevel_defaults();
        let caps = capabilities(wgpu::Features::empty(), &limits);
        assert_eq!(
            caps.max_compute_workgroup_size,
            [
                limits.max_compute_workgroup_size_x,
                limits.max_compute_workgroup_size_y,
                limits.max_compute_workgroup_size_z
            ]
        );
        assert!(caps.fits_workgroup([1, 1, 1]));
    }
}
