//! Shader generation.
//!
//! A [`CaseDefinition`] plus a [`PipelineKind`] is lowered to one
//! [`ir::ShaderModule`] per pipeline stage, which a [`Dialect`] backend then
//! spells out as source text.

pub mod checks;
mod glsl;
pub mod ir;
mod stage;
mod wgsl;

use crate::case::CaseDefinition;
use crate::config::Tolerance;
use crate::device::Topology;
use crate::input::{InitPolicy, InputKind};
use crate::op::{Operation, ReduceOp};
use crate::stage::{ShaderStage, ShaderStages};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub use self::stage::{StageCodegen, stage_codegen};

/// Binding numbers shared by the generators and the orchestrator.
pub mod binding {
    /// Compute: one result word, or one raw value, per invocation.
    pub const COMPUTE_RESULT: u32 = 0;
    pub const COMPUTE_DATA: u32 = 1;
    pub const COMPUTE_AUX: u32 = 2;
    /// Compute value mode: one `(subgroup, lane, size, written)` record per
    /// invocation.
    pub const COMPUTE_RECORDS: u32 = 3;
    /// Graphics inputs follow the four per-stage result buffers.
    pub const GRAPHICS_DATA: u32 = 4;
    pub const GRAPHICS_AUX: u32 = 5;
}

/// Source language profile for GLSL output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GlslProfile {
    /// `#version 450` with Vulkan descriptor sets.
    Vulkan,
    /// `#version 450` for OpenGL.
    Desktop,
    /// `#version 320 es`.
    Es,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dialect {
    Glsl(GlslProfile),
    Wgsl,
}

impl Dialect {
    /// File extension of dumped shaders.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Glsl(_) => "glsl",
            Self::Wgsl => "wgsl",
        }
    }

    /// Workgroup shape a generated compute shader declares for `local_size`.
    ///
    /// WGSL has subgroup builtins only in one-dimensional workgroups, so the
    /// same invocation count is laid out along `x`.
    pub fn declared_local_size(self, local_size: [u32; 3]) -> [u32; 3] {
        match self {
            Self::Glsl(_) => local_size,
            Self::Wgsl => {
                let [x, y, z] = local_size;
                [x.saturating_mul(y).saturating_mul(z), 1, 1]
            }
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Glsl(GlslProfile::Vulkan) => f.write_str("GLSL (Vulkan)"),
            Self::Glsl(GlslProfile::Desktop) => f.write_str("GLSL (OpenGL)"),
            Self::Glsl(GlslProfile::Es) => f.write_str("GLSL ES"),
            Self::Wgsl => f.write_str("WGSL"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CodegenError {
    /// The dialect cannot express the case; reported as not supported.
    #[error("{0}")]
    Unsupported(String),
    /// The generator produced something inconsistent.
    #[error("internal codegen error: {0}")]
    Internal(String),
}

/// Generated source for one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSource {
    pub stage: ShaderStage,
    pub entry_point: &'static str,
    pub text: String,
    /// Whether the stage contains subgroup operations, as opposed to a
    /// pass-through companion.
    pub subgroup_code: bool,
}

/// Every stage of one pipeline, keyed in pipeline order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderProgramSet {
    programs: BTreeMap<ShaderStage, ShaderSource>,
}

impl ShaderProgramSet {
    pub fn insert(&mut self, source: ShaderSource) {
        self.programs.insert(source.stage, source);
    }

    pub fn get(&self, stage: ShaderStage) -> Option<&ShaderSource> {
        self.programs.get(&stage)
    }

    pub fn stages(&self) -> ShaderStages {
        self.programs
            .keys()
            .fold(ShaderStages::empty(), |acc, s| acc | s.flag())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShaderSource> {
        self.programs.values()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// The shape of one pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineKind {
    Compute {
        local_size: [u32; 3],
    },
    /// One draw of `width` points in which every stage of `tested` runs the
    /// check and writes its own result buffer; the other stages needed to
    /// reach them pass data through.
    Stages {
        tested: ShaderStages,
        width: u32,
    },
    /// `width` points whose fragment shader runs the check and writes the
    /// color attachment.
    Fragment {
        width: u32,
    },
    /// `stage` runs the check and hands its result word down to a
    /// pass-through fragment shader.
    Framebuffer {
        stage: ShaderStage,
        width: u32,
    },
}

impl PipelineKind {
    fn uses_tessellation(self) -> bool {
        match self {
            Self::Stages { tested, .. } => tested.intersects(ShaderStages::TESSELLATION),
            Self::Framebuffer { stage, .. } => {
                matches!(stage, ShaderStage::TessControl | ShaderStage::TessEval)
            }
            Self::Compute { .. } | Self::Fragment { .. } => false,
        }
    }

    pub fn topology(self) -> Topology {
        if self.uses_tessellation() {
            Topology::Patches { control_points: 1 }
        } else {
            Topology::Points
        }
    }

    /// Vertices drawn; zero for compute.
    pub fn vertex_count(self) -> u32 {
        match self {
            Self::Compute { .. } => 0,
            Self::Stages { width, .. } | Self::Fragment { width } | Self::Framebuffer { width, .. } => {
                width
            }
        }
    }

    /// Width of the `R32Uint` color attachment.
    pub fn framebuffer_width(self) -> u32 {
        match self {
            Self::Compute { .. } => 0,
            // Point-mode tessellation emits both ends of every isoline.
            Self::Framebuffer {
                stage: ShaderStage::TessControl | ShaderStage::TessEval,
                width,
            } => 2 * width,
            Self::Stages { width, .. } | Self::Fragment { width } | Self::Framebuffer { width, .. } => {
                width
            }
        }
    }

    /// Result words a tested stage writes in one draw.
    pub fn result_count(self, stage: ShaderStage) -> u32 {
        match (self, stage) {
            (Self::Compute { .. }, _) => 0,
            (_, ShaderStage::TessEval) => 2 * self.vertex_count(),
            _ => self.vertex_count(),
        }
    }

    /// Attachment pixels that carry a result; the others are skipped.
    pub fn result_pixels(self) -> impl Iterator<Item = usize> {
        let step = match self {
            Self::Framebuffer {
                stage: ShaderStage::TessControl,
                ..
            } => 2,
            _ => 1,
        };
        (0..self.framebuffer_width() as usize).step_by(step)
    }

    /// Whether the inputs live in uniform or storage buffers.
    pub fn input_kind(self, dialect: Dialect) -> InputKind {
        match (self, dialect) {
            (Self::Compute { .. }, _) | (_, Dialect::Wgsl) => InputKind::Buffer,
            (_, Dialect::Glsl(_)) => InputKind::Uniform,
        }
    }

    pub fn data_binding(self) -> u32 {
        match self {
            Self::Compute { .. } => binding::COMPUTE_DATA,
            _ => binding::GRAPHICS_DATA,
        }
    }

    pub fn aux_binding(self) -> u32 {
        match self {
            Self::Compute { .. } => binding::COMPUTE_AUX,
            _ => binding::GRAPHICS_AUX,
        }
    }
}

/// Whether `dialect` can express `case` in a `kind` pipeline; the error is
/// the not-supported reason.
pub fn supports(case: &CaseDefinition, kind: PipelineKind, dialect: Dialect) -> Result<(), String> {
    match dialect {
        Dialect::Glsl(profile) => glsl::supports(case, profile),
        Dialect::Wgsl => wgsl::supports(case, kind),
    }
}

/// How the data input is filled. Float min and max see NaNs where the
/// dialect can test for them.
pub fn data_policy(case: &CaseDefinition, dialect: Dialect) -> InitPolicy {
    let op = match case.operation() {
        Operation::Arithmetic { op, .. }
        | Operation::Clustered { op, .. }
        | Operation::Partitioned { op, .. } => Some(op),
        _ => None,
    };
    let nan_aware = matches!(dialect, Dialect::Glsl(_));
    match op {
        Some(ReduceOp::Min | ReduceOp::Max) if nan_aware && case.format().scalar().is_float() => {
            InitPolicy::NonZeroWithSpecials
        }
        _ => InitPolicy::NonZero,
    }
}

/// Generates every shader of a `kind` pipeline running `case`.
pub fn generate(
    case: &CaseDefinition,
    kind: PipelineKind,
    dialect: Dialect,
    tolerance: &Tolerance,
) -> Result<ShaderProgramSet, CodegenError> {
    supports(case, kind, dialect).map_err(CodegenError::Unsupported)?;
    let modules = stage::build_pipeline(case, kind, dialect, tolerance)?;
    let mut set = ShaderProgramSet::default();
    for module in modules {
        let text = match dialect {
            Dialect::Glsl(profile) => glsl::emit(&module, profile)?,
            Dialect::Wgsl => wgsl::emit(&module)?,
        };
        set.insert(ShaderSource {
            stage: module.stage,
            entry_point: "main",
            text,
            subgroup_code: module.uses_subgroups(),
        });
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{ResultMode, StageTarget};
    use crate::format::{Format, ScalarType};
    use crate::op::{QuadOp, ScanOrder, ShuffleOp};

    fn case(operation: Operation, format: Format, target: StageTarget) -> CaseDefinition {
        CaseDefinition::new(operation, format, target, ResultMode::CheckMask).unwrap()
    }

    fn vulkan(case: &CaseDefinition, kind: PipelineKind) -> ShaderProgramSet {
        generate(case, kind, Dialect::Glsl(GlslProfile::Vulkan), &Tolerance::default()).unwrap()
    }

    #[test]
    fn compute_is_a_single_stage() {
        let case = case(
            Operation::Arithmetic { op: ReduceOp::Add, order: ScanOrder::Inclusive },
            Format::u32(),
            StageTarget::Compute,
        );
        let set = vulkan(&case, PipelineKind::Compute { local_size: [32, 4, 1] });
        assert_eq!(set.stages(), ShaderStages::COMPUTE);
        let source = set.get(ShaderStage::Compute).unwrap();
        assert!(source.subgroup_code);
        assert!(source.text.contains("local_size_x = 32"));
        assert!(source.text.contains("subgroupInclusiveAdd("));
    }

    #[test]
    fn tessellation_brings_its_partner() {
        let case = case(
            Operation::Quad(QuadOp::SwapDiagonal),
            Format::u32(),
            StageTarget::Framebuffer(ShaderStage::TessEval),
        );
        let kind = PipelineKind::Framebuffer { stage: ShaderStage::TessEval, width: 4 };
        let set = vulkan(&case, kind);
        assert_eq!(
            set.stages(),
            ShaderStages::VERTEX | ShaderStages::TESSELLATION | ShaderStages::FRAGMENT
        );
        assert!(!set.get(ShaderStage::TessControl).unwrap().subgroup_code);
        assert!(set.get(ShaderStage::TessEval).unwrap().subgroup_code);
        assert_eq!(kind.topology(), Topology::Patches { control_points: 1 });
        assert_eq!(kind.framebuffer_width(), 8);
        assert_eq!(kind.result_pixels().count(), 8);
    }

    #[test]
    fn tess_control_results_sit_on_even_pixels() {
        let kind = PipelineKind::Framebuffer { stage: ShaderStage::TessControl, width: 3 };
        assert_eq!(kind.result_pixels().collect::<Vec<_>>(), [0, 2, 4]);
    }

    #[test]
    fn wgsl_rejects_64_bit_formats() {
        let case = case(
            Operation::Shuffle(ShuffleOp::Xor),
            Format::new(ScalarType::U64, 1),
            StageTarget::Compute,
        );
        let err = generate(
            &case,
            PipelineKind::Compute { local_size: [1, 1, 1] },
            Dialect::Wgsl,
            &Tolerance::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CodegenError::Unsupported(_)));
    }

    #[test]
    fn wgsl_flattens_compute_workgroups() {
        let case = case(
            Operation::Arithmetic { op: ReduceOp::Add, order: ScanOrder::Reduce },
            Format::u32(),
            StageTarget::Compute,
        );
        assert_eq!(Dialect::Wgsl.declared_local_size([3, 5, 7]), [105, 1, 1]);
        let glsl = Dialect::Glsl(GlslProfile::Vulkan);
        assert_eq!(glsl.declared_local_size([3, 5, 7]), [3, 5, 7]);
        let set = generate(
            &case,
            PipelineKind::Compute { local_size: [32, 4, 1] },
            Dialect::Wgsl,
            &Tolerance::default(),
        )
        .unwrap();
        let text = &set.get(ShaderStage::Compute).unwrap().text;
        assert!(text.contains("@workgroup_size(128, 1, 1)"), "{text}");
        assert!(text.contains("num_workgroups.x * 128u"), "{text}");
    }

    #[test]
    fn nans_only_for_float_min_max() {
        let min = Operation::Arithmetic { op: ReduceOp::Min, order: ScanOrder::Reduce };
        let float = case(min, Format::new(ScalarType::F32, 1), StageTarget::Compute);
        let glsl = Dialect::Glsl(GlslProfile::Vulkan);
        assert_eq!(data_policy(&float, glsl), InitPolicy::NonZeroWithSpecials);
        assert_eq!(data_policy(&float, Dialect::Wgsl), InitPolicy::NonZero);
        let int = case(min, Format::u32(), StageTarget::Compute);
        assert_eq!(data_policy(&int, glsl), InitPolicy::NonZero);
    }
}
