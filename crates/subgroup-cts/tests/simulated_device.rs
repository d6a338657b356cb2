//! End-to-end runs against a device that answers from the reference model.

use std::cell::Cell;
use subgroup_cts::codegen::{Dialect, GlslProfile, binding, checks};
use subgroup_cts::device::{ComputeJob, GraphicsJob, GraphicsReadback};
use subgroup_cts::op::{BroadcastOp, ReduceOp, ScanOrder, ShuffleOp};
use subgroup_cts::reference::{self, Ballot, Expected, Subgroup};
use subgroup_cts::{
    CaseDefinition, Device, DeviceCapabilities, DeviceError, Format, HarnessConfig, Layout,
    Operation, Orchestrator, ResultMode, Scalar, ScalarType, ShaderStage, ShaderStages,
    StageTarget, SubgroupFeatures, Support, TestStatus, Value, registry,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Fault {
    None,
    /// Invocation 5 returns a wrong value.
    CorruptValue,
    /// Invocation 3 misses its first check bit.
    DropCheck,
    Compile,
    Lost,
}

struct Simulated {
    caps: DeviceCapabilities,
    case: CaseDefinition,
    fault: Fault,
    jobs: Cell<usize>,
}

impl Simulated {
    fn new(case: CaseDefinition, fault: Fault) -> Self {
        Self {
            caps: capable(),
            case,
            fault,
            jobs: Cell::new(0),
        }
    }

    fn start(&self) -> Result<(), DeviceError> {
        self.jobs.set(self.jobs.get() + 1);
        match self.fault {
            Fault::Compile => Err(DeviceError::Compile {
                stage: ShaderStage::Compute,
                diagnostic: "0:12: 'subgroupAdd' : no matching overloaded function".into(),
            }),
            Fault::Lost => Err(DeviceError::Lost("VK_ERROR_DEVICE_LOST".into())),
            _ => Ok(()),
        }
    }

    fn masks(&self, count: usize) -> Vec<u8> {
        let mask = checks::layout(&self.case.operation()).expected_mask();
        let words: Vec<u32> = (0..count)
            .map(|i| {
                if self.fault == Fault::DropCheck && i == 3 {
                    mask & !1
                } else {
                    mask
                }
            })
            .collect();
        bytemuck::cast_slice(&words).to_vec()
    }

    /// Packs invocations into subgroups in order, the last one partial.
    fn values(&self, count: usize, data: &[Value], aux: &[u32]) -> (Vec<u8>, Vec<u8>) {
        let format = self.case.format();
        let size = self.caps.subgroup_size as usize;
        let mut values = Vec::new();
        let mut records = Vec::new();
        for (key, first) in (0..count).step_by(size).enumerate() {
            let lanes = size.min(count - first);
            let subgroup = Subgroup {
                size: size as u32,
                active: Ballot::first(lanes as u32),
                data,
                aux,
            };
            let expected = reference::evaluate(&self.case.operation(), format, &subgroup).unwrap();
            for lane in 0..lanes {
                let mut value = match &expected[lane] {
                    Some(Expected::Value(value)) => value.clone(),
                    _ => data[lane].clone(),
                };
                if self.fault == Fault::CorruptValue && first + lane == 5 {
                    value = Value::new(
                        value
                            .components()
                            .iter()
                            .map(|c| Scalar::from_bits(c.scalar_type(), c.to_bits() ^ 1))
                            .collect(),
                    );
                }
                format.encode(&value, Layout::Std430, &mut values);
                records.extend_from_slice(bytemuck::bytes_of(&[key as u32, lane as u32, size as u32, 1]));
            }
        }
        (values, records)
    }
}

fn input<'a>(buffers: &'a [subgroup_cts::device::BufferSpec], binding: u32) -> Option<&'a [u8]> {
    buffers
        .iter()
        .find(|b| b.binding == binding)
        .and_then(|b| b.contents.as_deref())
}

impl Device for Simulated {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    fn dialect(&self) -> Dialect {
        Dialect::Glsl(GlslProfile::Vulkan)
    }

    fn dispatch(&self, job: &ComputeJob<'_>) -> Result<Vec<Vec<u8>>, DeviceError> {
        self.start()?;
        assert!(job.programs.get(ShaderStage::Compute).is_some());
        let format = self.case.format();
        let data = input(&job.buffers, binding::COMPUTE_DATA)
            .map(|bytes| format.decode_all(bytes, Layout::Std430))
            .unwrap_or_default();
        let aux: Vec<u32> = input(&job.buffers, binding::COMPUTE_AUX)
            .map(bytemuck::pod_collect_to_vec)
            .unwrap_or_default();
        let element = match self.case.mode() {
            ResultMode::CheckMask => 4,
            ResultMode::Values => format.size(Layout::Std430),
        };
        let invocations = job
            .buffers
            .iter()
            .find(|b| b.binding == binding::COMPUTE_RESULT)
            .map_or(0, |b| b.size as usize / element);
        let (values, records) = match self.case.mode() {
            ResultMode::CheckMask => (Vec::new(), Vec::new()),
            ResultMode::Values => self.values(invocations, &data, &aux),
        };
        Ok(job
            .buffers
            .iter()
            .map(|spec| match (&spec.contents, spec.binding) {
                (Some(contents), _) => contents.clone(),
                (None, binding::COMPUTE_RECORDS) => records.clone(),
                (None, _) if self.case.mode() == ResultMode::Values => values.clone(),
                (None, _) => self.masks(invocations),
            })
            .collect())
    }

    fn draw(&self, job: &GraphicsJob<'_>) -> Result<GraphicsReadback, DeviceError> {
        self.start()?;
        let mask = checks::layout(&self.case.operation()).expected_mask();
        Ok(GraphicsReadback {
            buffers: job
                .buffers
                .iter()
                .map(|spec| match &spec.contents {
                    Some(contents) => contents.clone(),
                    None => self.masks(spec.size as usize / 4),
                })
                .collect(),
            framebuffer: vec![mask; job.framebuffer_width as usize],
        })
    }
}

fn capable() -> DeviceCapabilities {
    DeviceCapabilities {
        subgroup_size: 4,
        pipeline_stages: ShaderStages::all(),
        subgroup_stages: ShaderStages::all() - ShaderStages::GEOMETRY,
        subgroup_features: SubgroupFeatures::all(),
        storage_write_stages: ShaderStages::VERTEX | ShaderStages::COMPUTE | ShaderStages::FRAGMENT,
        ..DeviceCapabilities::default()
    }
}

fn small_config() -> HarnessConfig {
    HarnessConfig {
        workgroups: [2, 1, 1],
        local_sizes: vec![[8, 1, 1], [0, 1, 1]],
        max_width: 4,
        ..HarnessConfig::default()
    }
}

fn inclusive_add_values() -> CaseDefinition {
    CaseDefinition::new(
        Operation::Arithmetic {
            op: ReduceOp::Add,
            order: ScanOrder::Inclusive,
        },
        Format::new(ScalarType::U32, 2),
        StageTarget::Compute,
        ResultMode::Values,
    )
    .unwrap()
}

#[test]
fn values_pass_on_a_faithful_device() {
    let device = Simulated::new(inclusive_add_values(), Fault::None);
    let config = small_config();
    let outcome = Orchestrator::new(&device, &config).run(&device.case).unwrap();
    assert_eq!(outcome.status, TestStatus::Pass);
    // 8x1x1 and 4x1x1, two workgroups each.
    assert_eq!(outcome.checked, 24);
    assert_eq!(device.jobs.get(), 2);
}

#[test]
fn a_wrong_value_names_the_invocation() {
    let device = Simulated::new(inclusive_add_values(), Fault::CorruptValue);
    let config = small_config();
    let outcome = Orchestrator::new(&device, &config).run(&device.case).unwrap();
    let TestStatus::Fail(reason) = &outcome.status else {
        panic!("expected a failure, got {}", outcome.status);
    };
    assert!(reason.contains("local size 8x1x1"), "{reason}");
    assert!(reason.contains("invocation 5"), "{reason}");
    // The first failing local size ends the case.
    assert_eq!(device.jobs.get(), 1);
}

fn broadcast_masks() -> CaseDefinition {
    CaseDefinition::new(
        Operation::Broadcast(BroadcastOp::First),
        Format::u32(),
        StageTarget::Compute,
        ResultMode::CheckMask,
    )
    .unwrap()
}

#[test]
fn full_masks_pass() {
    let device = Simulated::new(broadcast_masks(), Fault::None);
    let config = small_config();
    let outcome = Orchestrator::new(&device, &config).run(&device.case).unwrap();
    assert_eq!(outcome.status, TestStatus::Pass);
    assert_eq!(outcome.stages.len(), 1);
    assert_eq!(outcome.stages[0].stage, ShaderStage::Compute);
}

#[test]
fn missing_check_bits_are_named() {
    let case = broadcast_masks();
    let first = checks::layout(&case.operation()).bits()[0].name;
    let device = Simulated::new(case, Fault::DropCheck);
    let config = small_config();
    let outcome = Orchestrator::new(&device, &config).run(&device.case).unwrap();
    let TestStatus::Fail(reason) = &outcome.status else {
        panic!("expected a failure, got {}", outcome.status);
    };
    assert!(reason.contains("invocation 3"), "{reason}");
    assert!(reason.contains(first), "{reason}");
}

#[test]
fn graphics_stages_report_separately() {
    let case = CaseDefinition::new(
        Operation::Shuffle(ShuffleOp::Xor),
        Format::u32(),
        StageTarget::AllGraphics,
        ResultMode::CheckMask,
    )
    .unwrap();
    let device = Simulated::new(case, Fault::None);
    let config = small_config();
    let outcome = Orchestrator::new(&device, &config).run(&device.case).unwrap();
    assert_eq!(outcome.status, TestStatus::Pass);
    let stages: Vec<_> = outcome.stages.iter().map(|s| s.stage).collect();
    assert_eq!(stages, ShaderStage::GRAPHICS);
    let geometry = &outcome.stages[3];
    assert!(geometry.status.is_not_supported(), "{}", geometry.status);
    assert!(outcome.stages.iter().filter(|s| s.stage != ShaderStage::Geometry).all(|s| s.status.is_pass()));
    // Widths 1..=3: one vertex draw, a framebuffer draw per tessellation
    // stage and one fragment draw each.
    assert_eq!(device.jobs.get(), 12);
}

#[test]
fn compile_errors_keep_the_diagnostic() {
    let device = Simulated::new(broadcast_masks(), Fault::Compile);
    let config = small_config();
    let outcome = Orchestrator::new(&device, &config).run(&device.case).unwrap();
    let TestStatus::Fail(reason) = &outcome.status else {
        panic!("expected a failure, got {}", outcome.status);
    };
    assert!(reason.contains("no matching overloaded function"), "{reason}");
}

#[test]
fn a_lost_device_is_fatal() {
    let device = Simulated::new(broadcast_masks(), Fault::Lost);
    let config = small_config();
    let err = Orchestrator::new(&device, &config).run(&device.case).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn shaders_are_dumped_for_triage() {
    let dir = tempfile::tempdir().unwrap();
    let device = Simulated::new(broadcast_masks(), Fault::None);
    let config = HarnessConfig {
        local_sizes: vec![[4, 1, 1]],
        dump_shaders: Some(dir.path().to_owned()),
        ..small_config()
    };
    Orchestrator::new(&device, &config).run(&device.case).unwrap();
    let path = dir
        .path()
        .join(device.case.name().replace('/', "."))
        .join("compute_4x1x1.comp.glsl");
    let source = std::fs::read_to_string(&path).unwrap();
    assert!(source.starts_with("#version 450"), "{source}");
}

#[test]
fn nothing_runs_without_subgroups() {
    let config = HarnessConfig::default();
    for case in registry::all_cases().into_iter().step_by(97) {
        let device = Simulated {
            caps: DeviceCapabilities::default(),
            ..Simulated::new(case, Fault::None)
        };
        let orchestrator = Orchestrator::new(&device, &config);
        assert!(matches!(orchestrator.support(&device.case), Support::NotSupported(_)));
        assert!(orchestrator.run(&device.case).unwrap().status.is_not_supported());
        assert_eq!(device.jobs.get(), 0);
    }
}
