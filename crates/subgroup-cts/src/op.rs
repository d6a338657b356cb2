//! The operations under test.

use crate::features::SubgroupFeatures;
use crate::format::Format;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operator folded over a set of invocations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceOp {
    Add,
    Mul,
    Min,
    Max,
    And,
    Or,
    Xor,
}

impl ReduceOp {
    pub const ALL: [Self; 7] = [
        Self::Add,
        Self::Mul,
        Self::Min,
        Self::Max,
        Self::And,
        Self::Or,
        Self::Xor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Mul => "mul",
            Self::Min => "min",
            Self::Max => "max",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
        }
    }

    /// Capitalized name as it appears inside subgroup builtin names.
    pub fn builtin_suffix(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Mul => "Mul",
            Self::Min => "Min",
            Self::Max => "Max",
            Self::And => "And",
            Self::Or => "Or",
            Self::Xor => "Xor",
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Xor)
    }

    pub fn supports(self, format: Format) -> Result<(), String> {
        let scalar = format.scalar();
        if self.is_bitwise() && scalar.is_float() {
            return Err(format!("bitwise `{}` is not defined on {format}", self.name()));
        }
        if matches!(self, Self::Add | Self::Mul) && scalar.is_bool() {
            return Err(format!("arithmetic `{}` is not defined on {format}", self.name()));
        }
        Ok(())
    }
}

/// Which invocations contribute to an invocation's result.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOrder {
    /// Every active invocation.
    Reduce,
    /// Active invocations with an id less than or equal to the own id.
    Inclusive,
    /// Active invocations with a strictly smaller id.
    Exclusive,
}

impl ScanOrder {
    pub const ALL: [Self; 3] = [Self::Reduce, Self::Inclusive, Self::Exclusive];

    pub fn name(self) -> &'static str {
        match self {
            Self::Reduce => "reduce",
            Self::Inclusive => "inclusive",
            Self::Exclusive => "exclusive",
        }
    }

    /// Whether the invocation at `index` contributes to `lane`'s result.
    pub fn includes(self, index: u32, lane: u32) -> bool {
        match self {
            Self::Reduce => true,
            Self::Inclusive => index <= lane,
            Self::Exclusive => index < lane,
        }
    }

    pub(crate) fn builtin_infix(self) -> &'static str {
        match self {
            Self::Reduce => "",
            Self::Inclusive => "Inclusive",
            Self::Exclusive => "Exclusive",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuadOp {
    /// Every invocation of a quad reads the value of quad lane `0..=3`.
    Broadcast(u8),
    SwapHorizontal,
    SwapVertical,
    SwapDiagonal,
}

impl QuadOp {
    pub const ALL: [Self; 7] = [
        Self::Broadcast(0),
        Self::Broadcast(1),
        Self::Broadcast(2),
        Self::Broadcast(3),
        Self::SwapHorizontal,
        Self::SwapVertical,
        Self::SwapDiagonal,
    ];

    /// Quad lane that `quad_lane` reads from.
    pub fn source(self, quad_lane: u32) -> u32 {
        match self {
            Self::Broadcast(lane) => u32::from(lane),
            Self::SwapHorizontal => quad_lane ^ 1,
            Self::SwapVertical => quad_lane ^ 2,
            Self::SwapDiagonal => quad_lane ^ 3,
        }
    }

    pub fn is_swap(self) -> bool {
        !matches!(self, Self::Broadcast(_))
    }

    pub fn name(self) -> String {
        match self {
            Self::Broadcast(lane) => format!("broadcast{lane}"),
            Self::SwapHorizontal => "swap_horizontal".into(),
            Self::SwapVertical => "swap_vertical".into(),
            Self::SwapDiagonal => "swap_diagonal".into(),
        }
    }
}

/// Data movement relative to another invocation; the argument comes from an
/// auxiliary buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleOp {
    /// Read from an arbitrary invocation id.
    Shuffle,
    /// Read from `id ^ mask`.
    Xor,
    /// Read from `id - delta`.
    Up,
    /// Read from `id + delta`.
    Down,
}

impl ShuffleOp {
    pub const ALL: [Self; 4] = [Self::Shuffle, Self::Xor, Self::Up, Self::Down];

    pub fn name(self) -> &'static str {
        match self {
            Self::Shuffle => "shuffle",
            Self::Xor => "shuffle_xor",
            Self::Up => "shuffle_up",
            Self::Down => "shuffle_down",
        }
    }

    /// Source invocation for `lane` given the auxiliary argument; `None`
    /// when it falls outside the id range.
    pub fn source(self, lane: u32, arg: u32) -> Option<u32> {
        match self {
            Self::Shuffle => Some(arg),
            Self::Xor => Some(lane ^ arg),
            Self::Up => lane.checked_sub(arg),
            Self::Down => lane.checked_add(arg),
        }
    }

    /// The relative variants take a subgroup-uniform argument.
    pub fn uniform_argument(self) -> bool {
        !matches!(self, Self::Shuffle)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastOp {
    /// Read from a compile-time constant invocation id.
    Lane(u32),
    /// Read from the lowest active invocation.
    First,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOp {
    All,
    Any,
    AllEqual,
}

impl VoteOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
            Self::AllEqual => "all_equal",
        }
    }
}

/// How partitioned operations split a subgroup: invocation `i` belongs to
/// partition `hash(i) % groups`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionScheme {
    pub groups: u32,
}

impl PartitionScheme {
    pub const MULTIPLIER: u32 = 0x9e37_79b1;
    pub const SHIFT: u32 = 7;

    pub const DEFAULT: Self = Self { groups: 3 };

    pub fn label(self, lane: u32) -> u32 {
        (lane.wrapping_mul(Self::MULTIPLIER) >> Self::SHIFT) % self.groups
    }
}

/// A subgroup operation, fully parameterized.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Arithmetic {
        op: ReduceOp,
        order: ScanOrder,
    },
    Clustered {
        op: ReduceOp,
        cluster_size: u32,
    },
    Partitioned {
        op: ReduceOp,
        order: ScanOrder,
        scheme: PartitionScheme,
    },
    Quad(QuadOp),
    Shuffle(ShuffleOp),
    Broadcast(BroadcastOp),
    Elect,
    Vote(VoteOp),
}

impl Operation {
    pub fn required_feature(&self) -> SubgroupFeatures {
        match self {
            Self::Arithmetic { .. } => SubgroupFeatures::ARITHMETIC,
            Self::Clustered { .. } => SubgroupFeatures::CLUSTERED,
            Self::Partitioned { .. } => SubgroupFeatures::PARTITIONED,
            Self::Quad(_) => SubgroupFeatures::QUAD,
            Self::Shuffle(ShuffleOp::Shuffle | ShuffleOp::Xor) => SubgroupFeatures::SHUFFLE,
            Self::Shuffle(_) => SubgroupFeatures::SHUFFLE_RELATIVE,
            Self::Broadcast(_) => SubgroupFeatures::BALLOT,
            Self::Elect => SubgroupFeatures::BASIC,
            Self::Vote(_) => SubgroupFeatures::VOTE,
        }
    }

    /// The in-shader checks find the active set with ballots, so every case
    /// also needs `BASIC` and `BALLOT`.
    pub fn required_features(&self) -> SubgroupFeatures {
        self.required_feature() | SubgroupFeatures::BASIC | SubgroupFeatures::BALLOT
    }

    /// Family name, the first component of a test path.
    pub fn family(&self) -> &'static str {
        match self {
            Self::Arithmetic { .. } => "arithmetic",
            Self::Clustered { .. } => "clustered",
            Self::Partitioned { .. } => "partitioned",
            Self::Quad(_) => "quad",
            Self::Shuffle(ShuffleOp::Shuffle | ShuffleOp::Xor) => "shuffle",
            Self::Shuffle(_) => "shuffle_relative",
            Self::Broadcast(_) => "ballot_broadcast",
            Self::Elect => "basic",
            Self::Vote(_) => "vote",
        }
    }

    /// Whether the result depends on the value held by another invocation
    /// that may be inactive.
    pub fn reads_other_invocation(&self) -> bool {
        matches!(self, Self::Quad(_) | Self::Shuffle(_) | Self::Broadcast(_))
    }

    /// Whether the operation returns a value of the case format, so its raw
    /// result can be checked against the host reference model.
    pub fn produces_value(&self) -> bool {
        !matches!(self, Self::Elect | Self::Vote(_))
    }

    pub fn supports(&self, format: Format) -> Result<(), String> {
        match *self {
            Self::Partitioned { scheme, .. }
                if scheme.groups == 0 || scheme.groups > crate::MAX_SUBGROUP_SIZE =>
            {
                Err(format!(
                    "partition count {} is not between 1 and {}",
                    scheme.groups,
                    crate::MAX_SUBGROUP_SIZE
                ))
            }
            Self::Arithmetic { op, .. } | Self::Partitioned { op, .. } => op.supports(format),
            Self::Clustered { op, cluster_size } => {
                if !cluster_size.is_power_of_two() || cluster_size > crate::MAX_SUBGROUP_SIZE {
                    return Err(format!(
                        "cluster size {cluster_size} is not a power of two up to {}",
                        crate::MAX_SUBGROUP_SIZE
                    ));
                }
                op.supports(format)
            }
            Self::Quad(QuadOp::Broadcast(lane)) if lane > 3 => {
                Err(format!("quad lane {lane} is out of range"))
            }
            Self::Broadcast(BroadcastOp::Lane(lane)) if lane >= crate::MAX_SUBGROUP_SIZE => {
                Err(format!("broadcast lane {lane} is out of range"))
            }
            Self::Vote(VoteOp::All | VoteOp::Any)
                if format.scalar() != crate::format::ScalarType::Bool || format.is_vector() =>
            {
                Err(format!("vote predicates must be scalar bool, not {format}"))
            }
            Self::Elect if format != Format::u32() => {
                Err("elect takes no data; use the u32 format".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Operation part of a test path, e.g. `inclusive_add` or `cluster8_max`.
    pub fn name(&self) -> String {
        match *self {
            Self::Arithmetic { op, order } | Self::Partitioned { op, order, .. } => {
                format!("{}_{}", order.name(), op.name())
            }
            Self::Clustered { op, cluster_size } => format!("cluster{cluster_size}_{}", op.name()),
            Self::Quad(op) => op.name(),
            Self::Shuffle(op) => op.name().to_string(),
            Self::Broadcast(BroadcastOp::Lane(lane)) => format!("broadcast{lane}"),
            Self::Broadcast(BroadcastOp::First) => "broadcast_first".to_string(),
            Self::Elect => "elect".to_string(),
            Self::Vote(op) => op.name().to_string(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ScalarType;

    #[test]
    fn quad_swaps_are_involutions() {
        for op in [QuadOp::SwapHorizontal, QuadOp::SwapVertical, QuadOp::SwapDiagonal] {
            for lane in 0..4 {
                assert_eq!(op.source(op.source(lane)), lane, "{op:?} lane {lane}");
            }
        }
    }

    #[test]
    fn relative_shuffles_fall_off_the_ends() {
        assert_eq!(ShuffleOp::Up.source(1, 2), None);
        assert_eq!(ShuffleOp::Down.source(1, 2), Some(3));
        assert_eq!(ShuffleOp::Xor.source(5, 1), Some(4));
    }

    #[test]
    fn format_restrictions() {
        let f32 = Format::new(ScalarType::F32, 1);
        let boolean = Format::new(ScalarType::Bool, 2);
        assert!(ReduceOp::Xor.supports(f32).is_err());
        assert!(ReduceOp::Add.supports(boolean).is_err());
        assert!(ReduceOp::Min.supports(boolean).is_ok());
        assert!(Operation::Vote(VoteOp::All).supports(boolean).is_err());
        assert!(
            Operation::Clustered { op: ReduceOp::Add, cluster_size: 3 }
                .supports(Format::u32())
                .is_err()
        );
    }

    #[test]
    fn partition_labels_are_in_range() {
        let scheme = PartitionScheme::DEFAULT;
        let labels: Vec<_> = (0..128).map(|lane| scheme.label(lane)).collect();
        assert!(labels.iter().all(|&l| l < scheme.groups));
        for group in 0..scheme.groups {
            assert!(labels.contains(&group), "group {group} is never used");
        }
    }

    #[test]
    fn partition_counts_are_bounded() {
        let partitioned = |groups| Operation::Partitioned {
            op: ReduceOp::Add,
            order: ScanOrder::Reduce,
            scheme: PartitionScheme { groups },
        };
        assert!(partitioned(0).supports(Format::u32()).is_err());
        assert!(partitioned(crate::MAX_SUBGROUP_SIZE + 1).supports(Format::u32()).is_err());
        assert!(partitioned(1).supports(Format::u32()).is_ok());
        assert!(partitioned(crate::MAX_SUBGROUP_SIZE).supports(Format::u32()).is_ok());
    }

    #[test]
    fn names() {
        let op = Operation::Clustered { op: ReduceOp::Max, cluster_size: 8 };
        assert_eq!(op.to_string(), "clustered/cluster8_max");
        let op = Operation::Arithmetic { op: ReduceOp::Add, order: ScanOrder::Exclusive };
        assert_eq!(op.to_string(), "arithmetic/exclusive_add");
    }
}
