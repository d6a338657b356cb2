//! Every case WGSL can express must come out as a valid naga module.

use naga::valid::Capabilities;
use subgroup_cts::codegen::{self, Dialect, PipelineKind};
use subgroup_cts::config::Tolerance;
use subgroup_cts::{HarnessConfig, StageTarget, registry};
use std::collections::BTreeSet;
use subgroup_cts_wgpu::validate;

#[test]
fn generated_shaders_validate() {
    let tolerance = Tolerance::default();
    let mut checked = 0;
    let mut failures = Vec::new();
    for case in registry::all_cases() {
        let kind = match case.target() {
            StageTarget::Compute => PipelineKind::Compute {
                local_size: [8, 2, 1],
            },
            StageTarget::AllGraphics => PipelineKind::Fragment { width: 16 },
            StageTarget::Framebuffer(_) => continue,
        };
        if codegen::supports(&case, kind, Dialect::Wgsl).is_err() {
            continue;
        }
        let programs = match codegen::generate(&case, kind, Dialect::Wgsl, &tolerance) {
            Ok(programs) => programs,
            Err(err) => {
                failures.push(format!("{}: {err}", case.name()));
                continue;
            }
        };
        for source in programs.iter() {
            checked += 1;
            if let Err(err) = validate(source, Capabilities::all()) {
                failures.push(format!("{} ({}): {err}\n{}", case.name(), source.stage, source.text));
            }
        }
    }
    assert!(checked > 0);
    assert!(failures.is_empty(), "{}", failures.join("\n\n"));
}

#[test]
fn every_default_local_size_validates() {
    let tolerance = Tolerance::default();
    let local_sizes = HarnessConfig::default().resolved_local_sizes(32);
    let mut families = BTreeSet::new();
    let mut failures = Vec::new();
    for case in registry::all_cases() {
        if case.target() != StageTarget::Compute || families.contains(case.operation().family()) {
            continue;
        }
        let single = PipelineKind::Compute { local_size: [1, 1, 1] };
        if codegen::supports(&case, single, Dialect::Wgsl).is_err() {
            continue;
        }
        families.insert(case.operation().family());
        for &local_size in &local_sizes {
            let kind = PipelineKind::Compute { local_size };
            let programs = codegen::generate(&case, kind, Dialect::Wgsl, &tolerance).unwrap();
            for source in programs.iter() {
                if let Err(err) = validate(source, Capabilities::all()) {
                    failures.push(format!("{} {local_size:?}: {err}", case.name()));
                }
            }
        }
    }
    assert!(families.contains("arithmetic"), "{families:?}");
    assert!(failures.is_empty(), "{}", failures.join("\n\n"));
}
