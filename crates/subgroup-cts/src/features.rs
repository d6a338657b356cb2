//! What a device claims to support.

use crate::stage::{ShaderStage, ShaderStages};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Families of subgroup operations a device may advertise.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SubgroupFeatures: u32 {
        const BASIC = 1 << 0;
        const VOTE = 1 << 1;
        const ARITHMETIC = 1 << 2;
        const BALLOT = 1 << 3;
        const SHUFFLE = 1 << 4;
        const SHUFFLE_RELATIVE = 1 << 5;
        const CLUSTERED = 1 << 6;
        const QUAD = 1 << 7;
        const PARTITIONED = 1 << 8;
    }
}

impl SubgroupFeatures {
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

/// Capabilities reported by a [`Device`](crate::Device).
///
/// A `subgroup_size` of zero means the device has no subgroup support at all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub subgroup_size: u32,
    /// Stages the device can run at all.
    pub pipeline_stages: ShaderStages,
    /// Stages in which subgroup operations may be used.
    pub subgroup_stages: ShaderStages,
    pub subgroup_features: SubgroupFeatures,
    /// Quad operations are usable outside compute and fragment.
    pub quad_operations_in_all_stages: bool,
    /// Stages that can write storage buffers; the others report through the
    /// framebuffer.
    pub storage_write_stages: ShaderStages,
    pub shader_float64: bool,
    pub shader_int64: bool,
    /// 64-bit component types are accepted by subgroup operations.
    pub subgroup_extended_types: bool,
    pub max_compute_workgroup_size: [u32; 3],
    pub max_compute_invocations: u32,
}

impl DeviceCapabilities {
    pub fn has_subgroups(&self) -> bool {
        self.subgroup_size > 0
    }

    pub fn supports_stage(&self, stage: ShaderStage) -> bool {
        self.pipeline_stages.contains(stage.flag())
    }

    pub fn subgroups_in(&self, stage: ShaderStage) -> bool {
        self.has_subgroups() && self.subgroup_stages.contains(stage.flag())
    }

    pub fn can_write_storage(&self, stage: ShaderStage) -> bool {
        self.storage_write_stages.contains(stage.flag())
    }

    /// Whether `[x, y, z]` fits the compute limits.
    pub fn fits_workgroup(&self, size: [u32; 3]) -> bool {
        let invocations = size.iter().try_fold(1u32, |acc, &n| acc.checked_mul(n));
        size.iter()
            .zip(self.max_compute_workgroup_size)
            .all(|(&n, max)| n >= 1 && n <= max)
            && invocations.is_some_and(|n| n <= self.max_compute_invocations)
    }
}

impl Default for DeviceCapabilities {
    /// A device without subgroup support.
    fn default() -> Self {
        Self {
            subgroup_size: 0,
            pipeline_stages: ShaderStages::COMPUTE | ShaderStages::VERTEX | ShaderStages::FRAGMENT,
            subgroup_stages: ShaderStages::empty(),
            subgroup_features: SubgroupFeatures::empty(),
            quad_operations_in_all_stages: false,
            storage_write_stages: ShaderStages::COMPUTE | ShaderStages::FRAGMENT,
            shader_float64: false,
            shader_int64: false,
            subgroup_extended_types: false,
            max_compute_workgroup_size: [256, 256, 64],
            max_compute_invocations: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroup_limits() {
        let caps = DeviceCapabilities::default();
        assert!(caps.fits_workgroup([32, 4, 1]));
        assert!(caps.fits_workgroup([1, 1, 64]));
        assert!(!caps.fits_workgroup([1, 1, 65]));
        assert!(!caps.fits_workgroup([128, 4, 1]));
        assert!(!caps.fits_workgroup([0, 1, 1]));
    }

    #[test]
    fn feature_names() {
        let features = SubgroupFeatures::BASIC | SubgroupFeatures::QUAD;
        assert_eq!(features.names(), ["BASIC", "QUAD"]);
    }
}
