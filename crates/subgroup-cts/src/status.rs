use crate::stage::ShaderStage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final verdict of a case, or of one stage within it.
///
/// "Not supported" is an ordinary outcome, not an error: a device must never
/// fail for lacking an optional capability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TestStatus {
    Pass,
    Fail(String),
    NotSupported(String),
}

impl TestStatus {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported(_))
    }

    /// Folds per-stage verdicts: any failure fails the case, otherwise one
    /// passing stage is enough; the case is not supported only when no stage
    /// ran.
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Fail(a), Self::Fail(b)) => Self::Fail(format!("{a}; {b}")),
            (fail @ Self::Fail(_), _) | (_, fail @ Self::Fail(_)) => fail,
            (Self::Pass, _) | (_, Self::Pass) => Self::Pass,
            (Self::NotSupported(a), Self::NotSupported(_)) => Self::NotSupported(a),
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Fail(reason) => write!(f, "fail: {reason}"),
            Self::NotSupported(reason) => write!(f, "not supported: {reason}"),
        }
    }
}

/// Verdict for one stage of a case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: ShaderStage,
    pub status: TestStatus,
}

/// Everything the reporting sink needs to know about one case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub name: String,
    pub status: TestStatus,
    pub stages: Vec<StageOutcome>,
    /// Results checked over all iterations.
    pub checked: usize,
    /// Results accepted because their source invocation was inactive.
    pub unverified: usize,
}

impl CaseOutcome {
    pub fn not_supported(name: String, reason: String) -> Self {
        Self {
            name,
            status: TestStatus::NotSupported(reason),
            stages: Vec::new(),
            checked: 0,
            unverified: 0,
        }
    }

    pub fn failed(name: String, reason: String) -> Self {
        Self {
            status: TestStatus::Fail(reason),
            ..Self::not_supported(name, String::new())
        }
    }

    /// Builds the case verdict from per-stage verdicts.
    pub fn from_stages(name: String, stages: Vec<StageOutcome>, checked: usize, unverified: usize) -> Self {
        let status = stages
            .iter()
            .map(|s| match &s.status {
                TestStatus::Fail(reason) => TestStatus::Fail(format!("{}: {reason}", s.stage)),
                other => other.clone(),
            })
            .reduce(TestStatus::merge)
            .unwrap_or_else(|| TestStatus::NotSupported("no stage could run this case".into()));
        Self {
            name,
            status,
            stages,
            checked,
            unverified,
        }
    }
}
