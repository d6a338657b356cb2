use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use subgroup_cts::{CaseOutcome, TestStatus};
use thiserror::Error;

/// Failures listed in the summary table before the rest are counted.
const MAX_LISTED: usize = 20;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("writing report {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub not_supported: usize,
    pub checked: usize,
    pub unverified: usize,
}

impl Summary {
    pub fn of(outcomes: &[CaseOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut summary, outcome| {
            match outcome.status {
                TestStatus::Pass => summary.passed += 1,
                TestStatus::Fail(_) => summary.failed += 1,
                TestStatus::NotSupported(_) => summary.not_supported += 1,
            }
            summary.checked += outcome.checked;
            summary.unverified += outcome.unverified;
            summary
        })
    }
}

/// What a run writes to `report_path`.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub adapter: String,
    pub backend: String,
    pub dialect: String,
    pub seed: u64,
    pub summary: Summary,
    pub cases: &'a [CaseOutcome],
}

impl Report<'_> {
    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.to_owned(),
            source,
        })
    }
}

/// Table of failed cases, one row per failing stage; `None` when nothing
/// failed.
pub fn failure_table(outcomes: &[CaseOutcome]) -> Option<String> {
    use tabled::settings::{Alignment, Modify, Style, object::Rows};

    let failures: Vec<[String; 3]> = outcomes
        .iter()
        .flat_map(|outcome| {
            let stages: Vec<_> = outcome
                .stages
                .iter()
                .filter_map(|stage| match &stage.status {
                    TestStatus::Fail(reason) => Some([
                        outcome.name.clone(),
                        stage.stage.name().to_owned(),
                        first_line(reason),
                    ]),
                    _ => None,
                })
                .collect();
            match &outcome.status {
                // Failures raised before any stage ran.
                TestStatus::Fail(reason) if stages.is_empty() => {
                    vec![[outcome.name.clone(), "-".to_owned(), first_line(reason)]]
                }
                _ => stages,
            }
        })
        .collect();
    if failures.is_empty() {
        return None;
    }

    let mut builder = tabled::builder::Builder::default();
    builder.push_record(["Case", "Stage", "Reason"]);
    for row in failures.iter().take(MAX_LISTED) {
        builder.push_record(row.clone());
    }
    let mut table = builder.build();
    table
        .with(Style::modern())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    let mut result = table.to_string();
    if failures.len() > MAX_LISTED {
        result.push_str(&format!("\n... {} more failures", failures.len() - MAX_LISTED));
    }
    Some(result)
}

fn first_line(reason: &str) -> String {
    reason.lines().next().unwrap_or_default().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use subgroup_cts::{ShaderStage, StageOutcome};

    fn outcomes() -> Vec<CaseOutcome> {
        vec![
            CaseOutcome {
                name: "arithmetic/reduce_add/u32/compute".into(),
                status: TestStatus::Pass,
                stages: vec![StageOutcome {
                    stage: ShaderStage::Compute,
                    status: TestStatus::Pass,
                }],
                checked: 640,
                unverified: 0,
            },
            CaseOutcome::from_stages(
                "shuffle/xor/u32/graphics".into(),
                vec![
                    StageOutcome {
                        stage: ShaderStage::Vertex,
                        status: TestStatus::Fail("width 3: 2 / 3 values passed\n  invocation 1".into()),
                    },
                    StageOutcome {
                        stage: ShaderStage::Fragment,
                        status: TestStatus::Pass,
                    },
                ],
                12,
                3,
            ),
            CaseOutcome::not_supported("clustered/max_8/f64/compute".into(), "no 64-bit floats".into()),
            CaseOutcome::failed("quad/swap_horizontal/u32/compute".into(), "compute shaders must support subgroup operations".into()),
        ]
    }

    #[test]
    fn summary_counts_every_status() {
        assert_eq!(
            Summary::of(&outcomes()),
            Summary {
                passed: 1,
                failed: 2,
                not_supported: 1,
                checked: 652,
                unverified: 3,
            }
        );
    }

    #[test]
    fn failures_are_tabulated_per_stage() {
        let table = failure_table(&outcomes()).unwrap();
        assert!(table.contains("shuffle/xor/u32/graphics"), "{table}");
        assert!(table.contains("width 3: 2 / 3 values passed"), "{table}");
        assert!(!table.contains("invocation 1"), "{table}");
        assert!(table.contains("compute shaders must support subgroup operations"), "{table}");
        assert!(!table.contains("reduce_add"), "{table}");
        assert!(failure_table(&outcomes()[..1]).is_none());
    }

    #[test]
    fn report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let cases = outcomes();
        Report {
            adapter: "llvmpipe".into(),
            backend: "Vulkan".into(),
            dialect: "WGSL".into(),
            seed: 7,
            summary: Summary::of(&cases),
            cases: &cases,
        }
        .write(&path)
        .unwrap();
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["summary"]["failed"], 2);
        assert_eq!(json["cases"][1]["stages"][0]["stage"], "vertex");
        assert_eq!(json["cases"].as_array().unwrap().len(), 4);
    }
}
