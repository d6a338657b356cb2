//! Runs a couple of cases on whatever adapter the machine has; skipped when
//! there is none.

use subgroup_cts::op::{ReduceOp, ScanOrder, VoteOp};
use subgroup_cts::{
    CaseDefinition, Device, Format, HarnessConfig, Operation, Orchestrator, ResultMode,
    ScalarType, StageTarget,
};
use subgroup_cts_wgpu::WgpuDevice;

fn device() -> Option<WgpuDevice> {
    match WgpuDevice::new() {
        Ok(device) => Some(device),
        Err(err) => {
            eprintln!("skipping, no usable adapter: {err:#}");
            None
        }
    }
}

#[test]
fn small_cases_do_not_fail() {
    let Some(device) = device() else {
        return;
    };
    let config = HarnessConfig {
        local_sizes: vec![[1, 1, 1], [0, 1, 1], [3, 5, 7]],
        max_width: 8,
        ..HarnessConfig::default()
    };
    let cases = [
        CaseDefinition::new(
            Operation::Arithmetic {
                op: ReduceOp::Add,
                order: ScanOrder::Reduce,
            },
            Format::u32(),
            StageTarget::Compute,
            ResultMode::CheckMask,
        ),
        CaseDefinition::new(
            Operation::Arithmetic {
                op: ReduceOp::Max,
                order: ScanOrder::Reduce,
            },
            Format::new(ScalarType::I32, 4),
            StageTarget::Compute,
            ResultMode::Values,
        ),
        CaseDefinition::new(
            Operation::Vote(VoteOp::Any),
            Format::new(ScalarType::Bool, 1),
            StageTarget::AllGraphics,
            ResultMode::CheckMask,
        ),
    ];
    let orchestrator = Orchestrator::new(&device, &config);
    for case in cases {
        let case = case.unwrap();
        let outcome = orchestrator.run(&case).unwrap();
        assert!(!outcome.status.is_fail(), "{}: {}", outcome.name, outcome.status);
        if device.capabilities().has_subgroups() {
            assert!(outcome.status.is_pass(), "{}: {}", outcome.name, outcome.status);
        }
    }
}
