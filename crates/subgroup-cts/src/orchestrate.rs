//! Drives one case through a [`Device`]: capability checks, one job per
//! iteration, comparison and the per-stage verdicts.

use crate::MAX_SUBGROUP_SIZE;
use crate::case::{CaseDefinition, ResultMode, StageTarget};
use crate::codegen::{self, CodegenError, PipelineKind, ShaderProgramSet, binding, checks};
use crate::compare::{self, CheckLayout, Comparison, Exactness, Mismatch};
use crate::config::{HarnessConfig, Tolerance};
use crate::device::{BufferSpec, BufferUsage, ComputeJob, Device, DeviceError, GraphicsJob};
use crate::error::{Error, Result};
use crate::features::DeviceCapabilities;
use crate::format::{Format, Layout, ScalarType};
use crate::input::{InitPolicy, InputData, InputKind};
use crate::op::Operation;
use crate::reference::{self, Ballot, Subgroup};
use crate::stage::{ShaderStage, ShaderStages};
use crate::status::{CaseOutcome, StageOutcome, TestStatus};
use crate::value::Value;
use itertools::Itertools;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::fs;
use tracing::{debug, info, trace, warn};

/// Whether a device can run a case at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Support {
    Supported,
    NotSupported(String),
    /// The device advertises subgroups but misses something every such
    /// device must have.
    Broken(String),
}

/// Runs cases against one device, one synchronous job at a time.
pub struct Orchestrator<'d, D: Device + ?Sized> {
    device: &'d D,
    config: &'d HarnessConfig,
}

/// Graphics stages of an [`StageTarget::AllGraphics`] case, by how they
/// report.
#[derive(Debug, Default)]
struct GraphicsPlan {
    /// Stages sharing one draw, each writing its own storage buffer.
    buffer: ShaderStages,
    /// Stages that cannot write storage buffers and report through the color
    /// attachment instead, one pipeline each.
    framebuffer: Vec<ShaderStage>,
    fragment: bool,
    skipped: Vec<StageOutcome>,
}

impl GraphicsPlan {
    fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.framebuffer.is_empty() && !self.fragment
    }
}

const DATA: &str = "data";
const AUX: &str = "aux";

/// Input buffers of one job, plus what the host needs to evaluate results.
#[derive(Default)]
struct Uploaded {
    buffers: Vec<BufferSpec>,
    data: Vec<Value>,
    aux: Vec<u32>,
}

impl<'d, D: Device + ?Sized> Orchestrator<'d, D> {
    pub fn new(device: &'d D, config: &'d HarnessConfig) -> Self {
        Self { device, config }
    }

    fn caps(&self) -> &DeviceCapabilities {
        self.device.capabilities()
    }

    /// Capability checks for `case`, without touching the device.
    pub fn support(&self, case: &CaseDefinition) -> Support {
        let caps = self.caps();
        let operation = case.operation();
        if !caps.has_subgroups() {
            return Support::NotSupported("device has no subgroup support".into());
        }
        let missing = operation.required_features().difference(caps.subgroup_features);
        if !missing.is_empty() {
            return Support::NotSupported(format!(
                "missing subgroup features: {}",
                missing.names().join(", ")
            ));
        }
        let scalar = case.format().scalar();
        match scalar {
            ScalarType::F64 if !caps.shader_float64 => {
                return Support::NotSupported("device has no 64-bit floats".into());
            }
            ScalarType::I64 | ScalarType::U64 if !caps.shader_int64 => {
                return Support::NotSupported("device has no 64-bit integers".into());
            }
            _ if scalar.is_64bit() && !caps.subgroup_extended_types => {
                return Support::NotSupported(format!(
                    "subgroup operations do not accept {}",
                    scalar.name()
                ));
            }
            _ => {}
        }
        if let Operation::Clustered { cluster_size, .. } = operation {
            if cluster_size > caps.subgroup_size {
                return Support::NotSupported(format!(
                    "cluster size {cluster_size} exceeds the subgroup size {}",
                    caps.subgroup_size
                ));
            }
        }
        let dialect = self.device.dialect();
        match case.target() {
            StageTarget::Compute => {
                if !caps.subgroups_in(ShaderStage::Compute) {
                    return Support::Broken(
                        "compute shaders must support subgroup operations".into(),
                    );
                }
                let kind = PipelineKind::Compute { local_size: [1, 1, 1] };
                match codegen::supports(case, kind, dialect) {
                    Ok(()) => Support::Supported,
                    Err(reason) => Support::NotSupported(reason),
                }
            }
            StageTarget::Framebuffer(stage) => {
                let kind = PipelineKind::Framebuffer { stage, width: 1 };
                match self
                    .stage_support(case, stage)
                    .and_then(|()| codegen::supports(case, kind, dialect))
                {
                    Ok(()) => Support::Supported,
                    Err(reason) => Support::NotSupported(reason),
                }
            }
            StageTarget::AllGraphics => {
                let plan = self.graphics_plan(case);
                if plan.is_empty() {
                    let reasons = plan
                        .skipped
                        .iter()
                        .map(|s| format!("{}: {}", s.stage, s.status))
                        .join("; ");
                    Support::NotSupported(format!("no graphics stage can run: {reasons}"))
                } else {
                    Support::Supported
                }
            }
        }
    }

    /// Device-side requirements of running `case` in `stage`.
    fn stage_support(&self, case: &CaseDefinition, stage: ShaderStage) -> Result<(), String> {
        let caps = self.caps();
        if !caps.supports_stage(stage) {
            return Err(format!("device has no {stage} stage"));
        }
        let missing = stage.required_stages().difference(caps.pipeline_stages);
        if !missing.is_empty() {
            return Err(format!(
                "{stage} needs the {} stages",
                missing.stages().map(ShaderStage::name).join(", ")
            ));
        }
        if !caps.subgroups_in(stage) {
            return Err(format!("no subgroup operations in {stage} shaders"));
        }
        let quad_stage = matches!(stage, ShaderStage::Compute | ShaderStage::Fragment);
        if matches!(case.operation(), Operation::Quad(_))
            && !quad_stage
            && !caps.quad_operations_in_all_stages
        {
            return Err(format!("no quad operations in {stage} shaders"));
        }
        Ok(())
    }

    fn graphics_plan(&self, case: &CaseDefinition) -> GraphicsPlan {
        let caps = self.caps();
        let dialect = self.device.dialect();
        let mut plan = GraphicsPlan::default();
        for stage in ShaderStages::ALL_GRAPHICS.stages() {
            let kind = match stage {
                ShaderStage::Fragment => PipelineKind::Fragment { width: 1 },
                _ if caps.can_write_storage(stage) => PipelineKind::Stages {
                    tested: stage.flag(),
                    width: 1,
                },
                _ => PipelineKind::Framebuffer { stage, width: 1 },
            };
            let verdict = self
                .stage_support(case, stage)
                .and_then(|()| codegen::supports(case, kind, dialect));
            match (verdict, kind) {
                (Err(reason), _) => plan.skipped.push(StageOutcome {
                    stage,
                    status: TestStatus::NotSupported(reason),
                }),
                (Ok(()), PipelineKind::Fragment { .. }) => plan.fragment = true,
                (Ok(()), PipelineKind::Stages { .. }) => plan.buffer |= stage.flag(),
                (Ok(()), _) => plan.framebuffer.push(stage),
            }
        }
        plan
    }

    /// Runs every iteration of `case` and folds the results into one outcome.
    ///
    /// Only harness failures and a lost device are errors; everything the
    /// device gets wrong or cannot do ends up in the outcome.
    pub fn run(&self, case: &CaseDefinition) -> Result<CaseOutcome> {
        let name = case.name();
        match self.support(case) {
            Support::Supported => {}
            Support::NotSupported(reason) => {
                debug!("{name}: not supported: {reason}");
                return Ok(CaseOutcome::not_supported(name, reason));
            }
            Support::Broken(reason) => {
                warn!("{name}: {reason}");
                return Ok(CaseOutcome::failed(name, reason));
            }
        }
        let mut rng = StdRng::seed_from_u64(case_seed(self.config.seed, &name));
        let mut tally = Comparison::default();
        let stages = match case.target() {
            StageTarget::Compute => vec![StageOutcome {
                stage: ShaderStage::Compute,
                status: self.run_compute(case, &mut rng, &mut tally)?,
            }],
            StageTarget::Framebuffer(stage) => vec![StageOutcome {
                stage,
                status: self.run_attachment(
                    case,
                    |width| PipelineKind::Framebuffer { stage, width },
                    &mut rng,
                    &mut tally,
                )?,
            }],
            StageTarget::AllGraphics => self.run_graphics(case, &mut rng, &mut tally)?,
        };
        let outcome = CaseOutcome::from_stages(name, stages, tally.total, tally.unverified);
        info!("{}: {}, {}", outcome.name, tally.summary(), outcome.status);
        Ok(outcome)
    }

    fn run_compute(
        &self,
        case: &CaseDefinition,
        rng: &mut StdRng,
        tally: &mut Comparison,
    ) -> Result<TestStatus> {
        let caps = self.caps();
        let dialect = self.device.dialect();
        let workgroups = self.config.workgroups;
        let sizes: Vec<_> = self
            .config
            .resolved_local_sizes(caps.subgroup_size)
            .into_iter()
            .filter_map(|size| {
                let invocations = self.config.dispatch_invocations(size);
                let fits = caps.fits_workgroup(dialect.declared_local_size(size));
                if !fits || invocations.is_none() {
                    debug!("skipping local size {size:?}, beyond the device limits");
                    return None;
                }
                invocations.map(|n| (size, n as usize))
            })
            .collect();
        if sizes.is_empty() {
            return Ok(TestStatus::NotSupported(
                "no configured local size fits the device limits".into(),
            ));
        }
        let layout = checks::layout(&case.operation());
        let values_mode = case.mode() == ResultMode::Values;
        for (local_size, invocations) in sizes {
            let [x, y, z] = local_size;
            let context = format!("local size {x}x{y}x{z}");
            let kind = PipelineKind::Compute { local_size };
            let programs = match self.generate(case, kind)? {
                Ok(programs) => programs,
                Err(status) => return Ok(status),
            };
            let uploaded = self.upload(case, kind, rng);
            let element = if values_mode {
                case.format().size(Layout::Std430)
            } else {
                4
            };
            let mut buffers = vec![BufferSpec::output(
                binding::COMPUTE_RESULT,
                (invocations * element) as u64,
            )];
            buffers.extend(uploaded.buffers.iter().cloned());
            if values_mode {
                buffers.push(BufferSpec::output(
                    binding::COMPUTE_RECORDS,
                    (invocations * 16) as u64,
                ));
            }
            let job = ComputeJob {
                programs: &programs,
                workgroups,
                buffers,
            };
            trace!("{context}: dispatching {invocations} invocations");
            let outputs = match self.device.dispatch(&job) {
                Ok(outputs) => outputs,
                Err(err) => return device_failure(err, &context),
            };
            let results = outputs.first().map_or(&[][..], Vec::as_slice);
            let comparison = if values_mode {
                let records = outputs.last().map_or(&[][..], Vec::as_slice);
                check_values(
                    case,
                    &self.config.tolerance,
                    &uploaded,
                    results,
                    records,
                    invocations,
                )?
            } else {
                compare_words(&layout, results, invocations)
            };
            let status = conclude(&context, comparison, tally);
            if !status.is_pass() {
                return Ok(status);
            }
        }
        Ok(TestStatus::Pass)
    }

    fn run_graphics(
        &self,
        case: &CaseDefinition,
        rng: &mut StdRng,
        tally: &mut Comparison,
    ) -> Result<Vec<StageOutcome>> {
        let plan = self.graphics_plan(case);
        for skipped in &plan.skipped {
            debug!("{}: {}", skipped.stage, skipped.status);
        }
        let mut outcomes = plan.skipped;
        if !plan.buffer.is_empty() {
            outcomes.extend(self.run_buffer_pass(case, plan.buffer, rng, tally)?);
        }
        for stage in plan.framebuffer {
            let status = self.run_attachment(
                case,
                |width| PipelineKind::Framebuffer { stage, width },
                rng,
                tally,
            )?;
            outcomes.push(StageOutcome { stage, status });
        }
        if plan.fragment {
            let status =
                self.run_attachment(case, |width| PipelineKind::Fragment { width }, rng, tally)?;
            outcomes.push(StageOutcome {
                stage: ShaderStage::Fragment,
                status,
            });
        }
        outcomes.sort_by_key(|outcome| outcome.stage);
        Ok(outcomes)
    }

    /// One draw per width in which every stage of `tested` writes its own
    /// result buffer. The first failing width ends the pass.
    fn run_buffer_pass(
        &self,
        case: &CaseDefinition,
        tested: ShaderStages,
        rng: &mut StdRng,
        tally: &mut Comparison,
    ) -> Result<Vec<StageOutcome>> {
        let layout = checks::layout(&case.operation());
        let stages: Vec<_> = tested.stages().collect();
        let mut statuses: BTreeMap<_, _> = stages.iter().map(|&s| (s, TestStatus::Pass)).collect();
        for width in self.config.widths() {
            let context = format!("width {width}");
            let kind = PipelineKind::Stages { tested, width };
            let readback = match self.generate(case, kind)? {
                Ok(programs) => {
                    let uploaded = self.upload(case, kind, rng);
                    let mut buffers: Vec<_> = stages
                        .iter()
                        .map(|&s| {
                            BufferSpec::output(s.result_binding(), u64::from(kind.result_count(s)) * 4)
                        })
                        .collect();
                    buffers.extend(uploaded.buffers);
                    let job = GraphicsJob {
                        programs: &programs,
                        vertex_count: kind.vertex_count(),
                        topology: kind.topology(),
                        buffers,
                        framebuffer_width: kind.framebuffer_width(),
                    };
                    match self.device.draw(&job) {
                        Ok(readback) => Ok(readback),
                        Err(err) => Err(device_failure(err, &context)?),
                    }
                }
                Err(status) => Err(status),
            };
            let readback = match readback {
                Ok(readback) => readback,
                Err(status) => {
                    statuses.values_mut().for_each(|s| *s = status.clone());
                    break;
                }
            };
            let mut failed = false;
            for (index, &stage) in stages.iter().enumerate() {
                let count = kind.result_count(stage) as usize;
                let bytes = readback.buffers.get(index).map_or(&[][..], Vec::as_slice);
                let comparison = compare_words(&layout, bytes, count);
                let status = conclude(&context, comparison, tally);
                if !status.is_pass() {
                    failed = true;
                    statuses.insert(stage, status);
                }
            }
            if failed {
                break;
            }
        }
        Ok(statuses
            .into_iter()
            .map(|(stage, status)| StageOutcome { stage, status })
            .collect())
    }

    /// One draw per width whose result words land in the color attachment.
    fn run_attachment(
        &self,
        case: &CaseDefinition,
        kind_for: impl Fn(u32) -> PipelineKind,
        rng: &mut StdRng,
        tally: &mut Comparison,
    ) -> Result<TestStatus> {
        let layout = checks::layout(&case.operation());
        for width in self.config.widths() {
            let context = format!("width {width}");
            let kind = kind_for(width);
            let programs = match self.generate(case, kind)? {
                Ok(programs) => programs,
                Err(status) => return Ok(status),
            };
            let uploaded = self.upload(case, kind, rng);
            let job = GraphicsJob {
                programs: &programs,
                vertex_count: kind.vertex_count(),
                topology: kind.topology(),
                buffers: uploaded.buffers,
                framebuffer_width: kind.framebuffer_width(),
            };
            let readback = match self.device.draw(&job) {
                Ok(readback) => readback,
                Err(err) => return device_failure(err, &context),
            };
            let pixels: Option<Vec<u32>> = kind
                .result_pixels()
                .map(|pixel| readback.framebuffer.get(pixel).copied())
                .collect();
            let comparison = match pixels {
                Some(words) => compare::compare_masks(&layout, &words),
                None => short_readback(
                    kind.result_pixels().count(),
                    format!("{} pixels", readback.framebuffer.len()),
                ),
            };
            let status = conclude(&context, comparison, tally);
            if !status.is_pass() {
                return Ok(status);
            }
        }
        Ok(TestStatus::Pass)
    }

    /// Shader sources for one iteration, or the status ending the case when
    /// the dialect cannot express it.
    fn generate(
        &self,
        case: &CaseDefinition,
        kind: PipelineKind,
    ) -> Result<Result<ShaderProgramSet, TestStatus>> {
        match codegen::generate(case, kind, self.device.dialect(), &self.config.tolerance) {
            Ok(programs) => {
                self.dump(case, kind, &programs)?;
                Ok(Ok(programs))
            }
            Err(CodegenError::Unsupported(reason)) => Ok(Err(TestStatus::NotSupported(reason))),
            Err(CodegenError::Internal(reason)) => Err(Error::Internal(reason)),
        }
    }

    fn dump(&self, case: &CaseDefinition, kind: PipelineKind, programs: &ShaderProgramSet) -> Result<()> {
        let Some(root) = &self.config.dump_shaders else {
            return Ok(());
        };
        let dir = root.join(case.name().replace('/', "."));
        fs::create_dir_all(&dir)?;
        let extension = self.device.dialect().extension();
        for source in programs.iter() {
            let path = dir.join(format!("{}.{}.{extension}", kind_label(kind), source.stage));
            fs::write(&path, &source.text)?;
            trace!("wrote {}", path.display());
        }
        Ok(())
    }

    fn inputs(&self, case: &CaseDefinition, kind: PipelineKind) -> Vec<InputData> {
        let dialect = self.device.dialect();
        let stages = match kind {
            PipelineKind::Compute { .. } => ShaderStages::COMPUTE,
            _ => ShaderStages::ALL_GRAPHICS,
        };
        let input_kind = kind.input_kind(dialect);
        let mut inputs = vec![InputData {
            name: DATA,
            format: case.format(),
            count: MAX_SUBGROUP_SIZE as usize,
            init: codegen::data_policy(case, dialect),
            binding: kind.data_binding(),
            stages,
            kind: input_kind,
        }];
        if checks::uses_aux(&case.operation()) {
            inputs.push(InputData {
                name: AUX,
                format: Format::u32(),
                count: MAX_SUBGROUP_SIZE as usize,
                init: InitPolicy::Indices {
                    modulus: self.caps().subgroup_size,
                },
                binding: kind.aux_binding(),
                stages,
                kind: input_kind,
            });
        }
        inputs
    }

    /// Fresh input contents for one iteration.
    fn upload(&self, case: &CaseDefinition, kind: PipelineKind, rng: &mut StdRng) -> Uploaded {
        let mut uploaded = Uploaded::default();
        for input in self.inputs(case, kind) {
            let bytes = input.initialize(rng);
            let values = input.values(&bytes);
            if input.name == AUX {
                uploaded.aux = values
                    .iter()
                    .map(|v| v.components()[0].to_bits() as u32)
                    .collect();
            } else {
                uploaded.data = values;
            }
            let usage = match input.kind {
                InputKind::Buffer => BufferUsage::StorageReadOnly,
                InputKind::Uniform => BufferUsage::Uniform,
            };
            uploaded
                .buffers
                .push(BufferSpec::input(input.binding, usage, bytes));
        }
        uploaded
    }
}

/// The configured seed mixed with an FNV-1a hash of the case name, so every
/// case sees the same data no matter which cases ran before it.
fn case_seed(seed: u64, name: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let hash = name
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME));
    hash ^ seed
}

fn kind_label(kind: PipelineKind) -> String {
    match kind {
        PipelineKind::Compute { local_size: [x, y, z] } => format!("compute_{x}x{y}x{z}"),
        PipelineKind::Stages { width, .. } => format!("stages_w{width}"),
        PipelineKind::Fragment { width } => format!("fragment_w{width}"),
        PipelineKind::Framebuffer { stage, width } => format!("framebuffer_{stage}_w{width}"),
    }
}

/// Logs an iteration and adds it to the case tally.
fn conclude(context: &str, comparison: Comparison, tally: &mut Comparison) -> TestStatus {
    debug!("{context}: {}", comparison.summary());
    let status = comparison.status(context);
    tally.merge(comparison);
    status
}

/// Only a lost device aborts the run; compile and execution errors fail the
/// case with the diagnostic.
fn device_failure(err: DeviceError, context: &str) -> Result<TestStatus> {
    match err {
        DeviceError::Lost(reason) => Err(Error::DeviceLost(reason)),
        DeviceError::Unsupported(reason) => Ok(TestStatus::NotSupported(reason)),
        err @ (DeviceError::Compile { .. } | DeviceError::Execution(_)) => {
            warn!("{context}: {err}");
            Ok(TestStatus::Fail(format!("{context}: {err}")))
        }
    }
}

fn short_readback(expected: usize, actual: String) -> Comparison {
    Comparison {
        total: expected,
        mismatches: vec![Mismatch {
            invocation: 0,
            expected: format!("{expected} results"),
            actual,
            missing: Vec::new(),
        }],
        ..Default::default()
    }
}

/// Mask comparison of the first `count` words of a result buffer.
fn compare_words(layout: &CheckLayout, bytes: &[u8], count: usize) -> Comparison {
    match bytes.get(..count * 4) {
        Some(bytes) => compare::compare_masks(layout, &bytemuck::pod_collect_to_vec(bytes)),
        None => short_readback(count, format!("{} bytes", bytes.len())),
    }
}

/// Value-mode check: groups the invocations by their `(subgroup, lane,
/// size, written)` record and evaluates the reference model per subgroup.
fn check_values(
    case: &CaseDefinition,
    tolerance: &Tolerance,
    uploaded: &Uploaded,
    values: &[u8],
    records: &[u8],
    invocations: usize,
) -> Result<Comparison> {
    let format = case.format();
    let element = format.size(Layout::Std430);
    let (Some(values), Some(records)) = (
        values.get(..invocations * element),
        records.get(..invocations * 16),
    ) else {
        return Ok(short_readback(
            invocations,
            format!("{} value and {} record bytes", values.len(), records.len()),
        ));
    };
    let values = format.decode_all(values, Layout::Std430);
    let records: Vec<[u32; 4]> = bytemuck::pod_collect_to_vec(records);

    let mut comparison = Comparison::default();
    let mut subgroups: BTreeMap<u32, Vec<(usize, u32, u32)>> = BTreeMap::new();
    for (invocation, &[key, lane, size, written]) in records.iter().enumerate() {
        if written != 1 || size == 0 || size > MAX_SUBGROUP_SIZE || lane >= size {
            comparison.total += 1;
            comparison.mismatches.push(Mismatch {
                invocation,
                expected: "a record (subgroup, lane < size, size, 1)".into(),
                actual: format!("({key}, {lane}, {size}, {written})"),
                missing: Vec::new(),
            });
        } else {
            subgroups.entry(key).or_default().push((invocation, lane, size));
        }
    }

    let operation = case.operation();
    let exactness = Exactness::for_case(&operation, format, tolerance);
    for (key, members) in subgroups {
        let size = members[0].2;
        let mut active = Ballot::empty();
        let mut invocation_of = BTreeMap::new();
        let mut actual = Vec::with_capacity(members.len());
        for (invocation, lane, member_size) in members {
            if member_size != size || active.contains(lane) {
                comparison.total += 1;
                comparison.mismatches.push(Mismatch {
                    invocation,
                    expected: format!("a unique lane of subgroup {key} with size {size}"),
                    actual: format!("lane {lane} with size {member_size}"),
                    missing: Vec::new(),
                });
                continue;
            }
            active.insert(lane);
            invocation_of.insert(lane as usize, invocation);
            actual.push((lane as usize, values[invocation].clone()));
        }
        let subgroup = Subgroup {
            size,
            active,
            data: &uploaded.data,
            aux: &uploaded.aux,
        };
        let expected = reference::evaluate(&operation, format, &subgroup)?;
        let mut result = compare::compare_values(exactness, &expected, &actual);
        for mismatch in &mut result.mismatches {
            if let Some(&invocation) = invocation_of.get(&mismatch.invocation) {
                mismatch.invocation = invocation;
            }
        }
        comparison.merge(result);
    }
    Ok(comparison)
}
