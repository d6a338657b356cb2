//! Turns raw device output into a verdict.

use crate::config::Tolerance;
use crate::format::{Format, ScalarType};
use crate::op::{Operation, ReduceOp};
use crate::reference::Expected;
use crate::status::TestStatus;
use crate::value::Value;
use std::fmt;

/// Result bit `i + UNVERIFIABLE_SHIFT` marks check `i` as unverifiable.
pub const UNVERIFIABLE_SHIFT: u32 = 16;

/// Failures listed in a verdict before the rest are summarized.
const MAX_REPORTED: usize = 8;

/// One sub-check packed into a result word.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CheckBit {
    pub name: &'static str,
    /// Reads another invocation's value, so it may legitimately come back
    /// unverifiable.
    pub cross_invocation: bool,
}

impl CheckBit {
    pub const fn local(name: &'static str) -> Self {
        Self {
            name,
            cross_invocation: false,
        }
    }

    pub const fn cross(name: &'static str) -> Self {
        Self {
            name,
            cross_invocation: true,
        }
    }
}

/// Ordered sub-checks of an operation; check `i` is bit `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckLayout {
    bits: Vec<CheckBit>,
}

impl CheckLayout {
    pub fn new(bits: Vec<CheckBit>) -> Self {
        assert!(
            bits.len() <= UNVERIFIABLE_SHIFT as usize,
            "at most {UNVERIFIABLE_SHIFT} checks fit a result word"
        );
        Self { bits }
    }

    pub fn bits(&self) -> &[CheckBit] {
        &self.bits
    }

    /// Word written by an invocation whose checks all passed.
    pub fn expected_mask(&self) -> u32 {
        (1u32 << self.bits.len()) - 1
    }

    /// Markers that may stand in for their check bit.
    pub fn unverifiable_mask(&self) -> u32 {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, b)| b.cross_invocation)
            .fold(0, |mask, (i, _)| mask | (1 << (i as u32 + UNVERIFIABLE_SHIFT)))
    }

    /// Classifies one result word.
    pub fn classify(&self, word: u32) -> WordVerdict {
        let mut missing = Vec::new();
        let mut unverified = 0;
        for (i, bit) in self.bits.iter().enumerate() {
            let passed = word & (1 << i) != 0;
            let marker = word & (1 << (i as u32 + UNVERIFIABLE_SHIFT)) != 0;
            match (passed, marker) {
                (true, false) => {}
                (false, true) if bit.cross_invocation => unverified += 1,
                _ => missing.push(bit.name),
            }
        }
        let known = self.expected_mask() | self.unverifiable_mask();
        if missing.is_empty() && word & !known != 0 {
            return WordVerdict::Mismatch {
                missing: vec!["unexpected bits"],
            };
        }
        if missing.is_empty() {
            WordVerdict::Pass { unverified }
        } else {
            WordVerdict::Mismatch { missing }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WordVerdict {
    /// All checks passed; `unverified` of them only because their source
    /// invocation was inactive.
    Pass { unverified: usize },
    Mismatch { missing: Vec<&'static str> },
}

/// A result that did not match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub invocation: usize,
    pub expected: String,
    pub actual: String,
    /// Names of the failed sub-checks; empty in value mode.
    pub missing: Vec<&'static str>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invocation {}: expected {}, got {}",
            self.invocation, self.expected, self.actual
        )?;
        if !self.missing.is_empty() {
            write!(f, " (failed: {})", self.missing.join(", "))?;
        }
        Ok(())
    }
}

/// Tally of one or more iterations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Comparison {
    pub total: usize,
    pub passed: usize,
    /// Results accepted without verification; included in `passed`.
    pub unverified: usize,
    pub mismatches: Vec<Mismatch>,
}

impl Comparison {
    pub fn is_pass(&self) -> bool {
        self.mismatches.is_empty() && self.passed == self.total
    }

    pub fn merge(&mut self, other: Self) {
        self.total += other.total;
        self.passed += other.passed;
        self.unverified += other.unverified;
        self.mismatches.extend(other.mismatches);
    }

    /// `passed / total values passed`, the log line of every iteration.
    pub fn summary(&self) -> String {
        format!("{} / {} values passed", self.passed, self.total)
    }

    /// Verdict, with `context` (e.g. the local size) prefixed to failures.
    pub fn status(&self, context: &str) -> TestStatus {
        if self.is_pass() {
            return TestStatus::Pass;
        }
        let mut reason = format!("{context}: {}", self.summary());
        for mismatch in self.mismatches.iter().take(MAX_REPORTED) {
            reason.push_str("\n  ");
            reason.push_str(&mismatch.to_string());
        }
        if self.mismatches.len() > MAX_REPORTED {
            reason.push_str(&format!(
                "\n  ... {} more mismatches",
                self.mismatches.len() - MAX_REPORTED
            ));
        }
        TestStatus::Fail(reason)
    }
}

/// Checks that every invocation wrote the complete mask of `layout`.
pub fn compare_masks(layout: &CheckLayout, words: &[u32]) -> Comparison {
    let mut comparison = Comparison {
        total: words.len(),
        ..Default::default()
    };
    for (invocation, &word) in words.iter().enumerate() {
        match layout.classify(word) {
            WordVerdict::Pass { unverified } => {
                comparison.passed += 1;
                comparison.unverified += usize::from(unverified > 0);
            }
            WordVerdict::Mismatch { missing } => comparison.mismatches.push(Mismatch {
                invocation,
                expected: format!("{:#x}", layout.expected_mask()),
                actual: format!("{word:#x}"),
                missing,
            }),
        }
    }
    comparison
}

/// How two values of `format` must agree for `operation`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Exactness {
    /// Same value; NaN matches NaN.
    Exact,
    /// Within the float tolerance, per component.
    Approximate(crate::config::Epsilon),
}

impl Exactness {
    /// Float sums and products depend on evaluation order; everything else,
    /// including NaN-aware min and max and all data movement, is exact.
    pub fn for_case(operation: &Operation, format: Format, tolerance: &Tolerance) -> Self {
        let op = match *operation {
            Operation::Arithmetic { op, .. }
            | Operation::Clustered { op, .. }
            | Operation::Partitioned { op, .. } => op,
            _ => return Self::Exact,
        };
        match (op, format.scalar()) {
            (ReduceOp::Add | ReduceOp::Mul, ScalarType::F32) => Self::Approximate(tolerance.f32),
            (ReduceOp::Add | ReduceOp::Mul, ScalarType::F64) => Self::Approximate(tolerance.f64),
            _ => Self::Exact,
        }
    }

    pub fn matches(self, expected: &Value, actual: &Value) -> bool {
        match self {
            Self::Exact => expected.same(actual),
            Self::Approximate(eps) => {
                expected.components().len() == actual.components().len()
                    && expected
                        .components()
                        .iter()
                        .zip(actual.components())
                        .all(|(e, a)| e.same(*a) || eps.accepts(e.as_f64(), a.as_f64()))
            }
        }
    }
}

/// Compares raw values against the reference model. `Undefined` results are
/// accepted explicitly and counted as unverified; invocations without an
/// expectation (`None`) must not appear in `actual`.
pub fn compare_values(
    exactness: Exactness,
    expected: &[Option<Expected>],
    actual: &[(usize, Value)],
) -> Comparison {
    let mut comparison = Comparison {
        total: actual.len(),
        ..Default::default()
    };
    for (invocation, value) in actual {
        let mismatch = |expected: String| Mismatch {
            invocation: *invocation,
            expected,
            actual: value.to_string(),
            missing: Vec::new(),
        };
        match expected.get(*invocation) {
            Some(Some(Expected::Value(reference))) => {
                if exactness.matches(reference, value) {
                    comparison.passed += 1;
                } else {
                    comparison.mismatches.push(mismatch(reference.to_string()));
                }
            }
            Some(Some(Expected::Undefined { .. })) => {
                comparison.passed += 1;
                comparison.unverified += 1;
            }
            Some(None) | None => comparison
                .mismatches
                .push(mismatch("no result from an inactive invocation".into())),
        }
    }
    comparison
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scalar;
    use pretty_assertions::assert_eq;

    fn layout() -> CheckLayout {
        CheckLayout::new(vec![CheckBit::cross("value"), CheckBit::local("round trip")])
    }

    #[test]
    fn full_mask_passes() {
        assert_eq!(layout().classify(0b11), WordVerdict::Pass { unverified: 0 });
    }

    #[test]
    fn unverifiable_marker_only_for_cross_checks() {
        assert_eq!(
            layout().classify(0b10 | (1 << 16)),
            WordVerdict::Pass { unverified: 1 }
        );
        assert_eq!(
            layout().classify(0b01 | (1 << 17)),
            WordVerdict::Mismatch {
                missing: vec!["round trip"]
            }
        );
    }

    #[test]
    fn marker_and_pass_together_is_a_mismatch() {
        assert!(matches!(
            layout().classify(0b11 | (1 << 16)),
            WordVerdict::Mismatch { .. }
        ));
    }

    #[test]
    fn missing_bits_are_named() {
        let comparison = compare_masks(&layout(), &[0b11, 0b01, 0]);
        assert_eq!(comparison.total, 3);
        assert_eq!(comparison.passed, 1);
        assert_eq!(comparison.mismatches[0].invocation, 1);
        assert_eq!(comparison.mismatches[0].missing, ["round trip"]);
        assert_eq!(comparison.mismatches[1].missing, ["value", "round trip"]);
        let TestStatus::Fail(reason) = comparison.status("local size [1, 1, 1]") else {
            panic!("expected a failure");
        };
        assert!(reason.starts_with("local size [1, 1, 1]: 1 / 3 values passed"));
        assert!(reason.contains("invocation 1: expected 0x3, got 0x1 (failed: round trip)"));
    }

    #[test]
    fn comparing_twice_gives_the_same_verdict() {
        let words = [0b11, 0b10 | (1 << 16), 0b01];
        assert_eq!(compare_masks(&layout(), &words), compare_masks(&layout(), &words));
    }

    #[test]
    fn undefined_values_are_counted() {
        let expected = vec![
            Some(Expected::Value(Value::from(Scalar::U32(1)))),
            Some(Expected::Undefined { source: Some(5) }),
            None,
        ];
        let actual = vec![
            (0, Value::from(Scalar::U32(1))),
            (1, Value::from(Scalar::U32(12345))),
        ];
        let comparison = compare_values(Exactness::Exact, &expected, &actual);
        assert!(comparison.is_pass());
        assert_eq!(comparison.unverified, 1);

        let stray = vec![(2, Value::from(Scalar::U32(0)))];
        assert!(!compare_values(Exactness::Exact, &expected, &stray).is_pass());
    }

    #[test]
    fn float_sums_are_approximate() {
        let tolerance = Tolerance::default();
        let format = Format::new(ScalarType::F32, 1);
        let add = Operation::Arithmetic {
            op: ReduceOp::Add,
            order: crate::op::ScanOrder::Reduce,
        };
        let exactness = Exactness::for_case(&add, format, &tolerance);
        assert!(exactness.matches(
            &Value::from(Scalar::F32(32.0)),
            &Value::from(Scalar::F32(32.0001))
        ));
        let min = Operation::Arithmetic {
            op: ReduceOp::Min,
            order: crate::op::ScanOrder::Reduce,
        };
        let exactness = Exactness::for_case(&min, format, &tolerance);
        assert!(!exactness.matches(
            &Value::from(Scalar::F32(32.0)),
            &Value::from(Scalar::F32(32.0001))
        ));
        assert!(exactness.matches(
            &Value::from(Scalar::F32(f32::NAN)),
            &Value::from(Scalar::F32(f32::NAN))
        ));
    }
}
