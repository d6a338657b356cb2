//! Host-side model of subgroup operations.
//!
//! Everything in here is pure: the same inputs always produce the same
//! outputs, and nothing touches a device.

mod ballot;

pub use self::ballot::Ballot;

use crate::error::{Error, Result};
use crate::format::{Format, ScalarType};
use crate::op::{BroadcastOp, Operation, ReduceOp, ScanOrder};
use crate::value::{Scalar, Value};

/// Expected result of one invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum Expected {
    Value(Value),
    /// The value was read from invocation `source`, which was inactive or out
    /// of range, so any result is allowed.
    Undefined { source: Option<u32> },
}

/// The element that leaves `op` unchanged when folded in.
///
/// `min` starts from the greatest value of the format and `max` from the
/// least, so folding an empty set is a no-op; for floats these are the
/// infinities. Booleans treat `min` as `and` and `max` as `or`.
pub fn identity(op: ReduceOp, format: Format) -> Value {
    use ScalarType as T;
    let scalar = match (op, format.scalar()) {
        (ReduceOp::Add | ReduceOp::Or | ReduceOp::Xor, ty) if ty != T::Bool => Scalar::from_bits(ty, 0),
        (ReduceOp::Mul, T::F32) => Scalar::F32(1.0),
        (ReduceOp::Mul, T::F64) => Scalar::F64(1.0),
        (ReduceOp::Mul, ty) if ty.is_integer() => Scalar::from_bits(ty, 1),
        (ReduceOp::And, ty) if ty.is_integer() => Scalar::from_bits(ty, u64::MAX),
        (ReduceOp::Min, T::I32) => Scalar::I32(i32::MAX),
        (ReduceOp::Min, T::U32) => Scalar::U32(u32::MAX),
        (ReduceOp::Min, T::I64) => Scalar::I64(i64::MAX),
        (ReduceOp::Min, T::U64) => Scalar::U64(u64::MAX),
        (ReduceOp::Min, T::F32) => Scalar::F32(f32::INFINITY),
        (ReduceOp::Min, T::F64) => Scalar::F64(f64::INFINITY),
        (ReduceOp::Max, T::I32) => Scalar::I32(i32::MIN),
        (ReduceOp::Max, T::U32) => Scalar::U32(0),
        (ReduceOp::Max, T::I64) => Scalar::I64(i64::MIN),
        (ReduceOp::Max, T::U64) => Scalar::U64(0),
        (ReduceOp::Max, T::F32) => Scalar::F32(f32::NEG_INFINITY),
        (ReduceOp::Max, T::F64) => Scalar::F64(f64::NEG_INFINITY),
        (ReduceOp::And | ReduceOp::Min, T::Bool) => Scalar::Bool(true),
        (ReduceOp::Or | ReduceOp::Xor | ReduceOp::Max, T::Bool) => Scalar::Bool(false),
        (op, ty) => unreachable!("`{}` has no identity on {}", op.name(), ty.name()),
    };
    Value::splat(scalar, format)
}

fn combine_scalar(op: ReduceOp, a: Scalar, b: Scalar) -> Scalar {
    use Scalar as S;
    macro_rules! int_op {
        ($a:expr, $b:expr) => {
            match op {
                ReduceOp::Add => $a.wrapping_add($b),
                ReduceOp::Mul => $a.wrapping_mul($b),
                ReduceOp::Min => $a.min($b),
                ReduceOp::Max => $a.max($b),
                ReduceOp::And => $a & $b,
                ReduceOp::Or => $a | $b,
                ReduceOp::Xor => $a ^ $b,
            }
        };
    }
    // `f32::min` and `f32::max` already return the other operand when one is
    // NaN, and NaN only when both are.
    macro_rules! float_op {
        ($a:expr, $b:expr) => {
            match op {
                ReduceOp::Add => $a + $b,
                ReduceOp::Mul => $a * $b,
                ReduceOp::Min => $a.min($b),
                ReduceOp::Max => $a.max($b),
                _ => unreachable!("bitwise `{}` on a float", op.name()),
            }
        };
    }
    match (a, b) {
        (S::I32(a), S::I32(b)) => S::I32(int_op!(a, b)),
        (S::U32(a), S::U32(b)) => S::U32(int_op!(a, b)),
        (S::I64(a), S::I64(b)) => S::I64(int_op!(a, b)),
        (S::U64(a), S::U64(b)) => S::U64(int_op!(a, b)),
        (S::F32(a), S::F32(b)) => S::F32(float_op!(a, b)),
        (S::F64(a), S::F64(b)) => S::F64(float_op!(a, b)),
        (S::Bool(a), S::Bool(b)) => S::Bool(match op {
            ReduceOp::And | ReduceOp::Min => a && b,
            ReduceOp::Or | ReduceOp::Max => a || b,
            ReduceOp::Xor => a != b,
            ReduceOp::Add | ReduceOp::Mul => unreachable!("arithmetic `{}` on a bool", op.name()),
        }),
        (a, b) => unreachable!("mixed component types {a:?} and {b:?}"),
    }
}

/// `a op b`, componentwise.
pub fn combine(op: ReduceOp, a: &Value, b: &Value) -> Value {
    a.zip_with(b, |a, b| combine_scalar(op, a, b))
}

/// Folds `values` in order, starting from the identity.
pub fn reduce<'a>(op: ReduceOp, format: Format, values: impl IntoIterator<Item = &'a Value>) -> Value {
    values
        .into_iter()
        .fold(identity(op, format), |acc, v| combine(op, &acc, v))
}

pub fn inclusive_scan(op: ReduceOp, format: Format, values: &[Value]) -> Vec<Value> {
    let mut acc = identity(op, format);
    values
        .iter()
        .map(|v| {
            acc = combine(op, &acc, v);
            acc.clone()
        })
        .collect()
}

pub fn exclusive_scan(op: ReduceOp, format: Format, values: &[Value]) -> Vec<Value> {
    let mut acc = identity(op, format);
    values
        .iter()
        .map(|v| {
            let before = acc.clone();
            acc = combine(op, &acc, v);
            before
        })
        .collect()
}

/// Reduces each contiguous `cluster_size` window independently; every
/// element of a window receives that window's result.
pub fn clustered(op: ReduceOp, format: Format, values: &[Value], cluster_size: usize) -> Vec<Value> {
    assert!(cluster_size.is_power_of_two(), "cluster size must be a power of two");
    values
        .chunks(cluster_size)
        .flat_map(|window| {
            let result = reduce(op, format, window);
            std::iter::repeat_n(result, window.len())
        })
        .collect()
}

/// Scans within each partition, where element `i` belongs to partition
/// `labels[i]`; partitions need not be contiguous.
pub fn partitioned(
    op: ReduceOp,
    order: ScanOrder,
    format: Format,
    values: &[Value],
    labels: &[u32],
) -> Vec<Value> {
    assert_eq!(values.len(), labels.len());
    (0..values.len())
        .map(|lane| {
            reduce(
                op,
                format,
                (0..values.len())
                    .filter(|&i| labels[i] == labels[lane] && order.includes(i as u32, lane as u32))
                    .map(|i| &values[i]),
            )
        })
        .collect()
}

/// One subgroup as observed on the device.
#[derive(Clone, Copy, Debug)]
pub struct Subgroup<'a> {
    pub size: u32,
    pub active: Ballot,
    /// Input values indexed by subgroup invocation id.
    pub data: &'a [Value],
    /// Auxiliary arguments indexed by subgroup invocation id.
    pub aux: &'a [u32],
}

impl Subgroup<'_> {
    fn value(&self, source: u32) -> Expected {
        if source < self.size && self.active.contains(source) {
            Expected::Value(self.data[source as usize].clone())
        } else {
            Expected::Undefined { source: Some(source) }
        }
    }

    fn fold(&self, op: ReduceOp, format: Format, mut include: impl FnMut(u32) -> bool) -> Expected {
        Expected::Value(reduce(
            op,
            format,
            self.active
                .iter()
                .filter(|&i| include(i))
                .map(|i| &self.data[i as usize]),
        ))
    }
}

/// Expected result of `operation` for every invocation of `subgroup`,
/// indexed by invocation id; `None` for inactive invocations.
pub fn evaluate(operation: &Operation, format: Format, subgroup: &Subgroup<'_>) -> Result<Vec<Option<Expected>>> {
    let needed = subgroup.active.iter().last().map_or(0, |l| l as usize + 1);
    if subgroup.data.len() < needed {
        return Err(Error::Internal(format!(
            "{} inputs for a subgroup using invocation {}",
            subgroup.data.len(),
            needed - 1
        )));
    }
    let arg = |lane: u32, uniform: bool| {
        let index = if uniform { 0 } else { lane as usize };
        subgroup.aux.get(index).copied().ok_or_else(|| {
            Error::Internal(format!("no auxiliary argument for invocation {lane}"))
        })
    };
    (0..subgroup.size)
        .map(|lane| {
            if !subgroup.active.contains(lane) {
                return Ok(None);
            }
            let expected = match *operation {
                Operation::Arithmetic { op, order } => {
                    subgroup.fold(op, format, |i| order.includes(i, lane))
                }
                Operation::Clustered { op, cluster_size } => {
                    let base = lane & !(cluster_size - 1);
                    subgroup.fold(op, format, |i| (base..base + cluster_size).contains(&i))
                }
                Operation::Partitioned { op, order, scheme } => {
                    let own = scheme.label(lane);
                    subgroup.fold(op, format, |i| scheme.label(i) == own && order.includes(i, lane))
                }
                Operation::Quad(quad) => subgroup.value((lane & !3) | quad.source(lane & 3)),
                Operation::Shuffle(shuffle) => {
                    match shuffle.source(lane, arg(lane, shuffle.uniform_argument())?) {
                        Some(source) => subgroup.value(source),
                        None => Expected::Undefined { source: None },
                    }
                }
                Operation::Broadcast(BroadcastOp::Lane(source)) => subgroup.value(source),
                Operation::Broadcast(BroadcastOp::First) => match subgroup.active.lowest() {
                    Some(source) => subgroup.value(source),
                    None => Expected::Undefined { source: None },
                },
                Operation::Elect | Operation::Vote(_) => {
                    return Err(Error::Internal(format!(
                        "{operation} has no value reference model"
                    )));
                }
            };
            Ok(Some(expected))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn u32s(values: &[u32]) -> Vec<Value> {
        values.iter().map(|&v| Value::from(Scalar::U32(v))).collect()
    }

    #[test]
    fn integer_arithmetic_wraps() {
        let a = Value::from(Scalar::U32(u32::MAX));
        let b = Value::from(Scalar::U32(2));
        assert_eq!(combine(ReduceOp::Add, &a, &b), Value::from(Scalar::U32(1)));
        let a = Value::from(Scalar::I32(i32::MIN));
        assert_eq!(
            combine(ReduceOp::Mul, &a, &Value::from(Scalar::I32(-1))),
            Value::from(Scalar::I32(i32::MIN))
        );
    }

    #[test]
    fn signedness_matters_for_min() {
        let signed = combine(
            ReduceOp::Min,
            &Value::from(Scalar::I32(-1)),
            &Value::from(Scalar::I32(1)),
        );
        assert_eq!(signed, Value::from(Scalar::I32(-1)));
        let unsigned = combine(
            ReduceOp::Min,
            &Value::from(Scalar::U32(u32::MAX)),
            &Value::from(Scalar::U32(1)),
        );
        assert_eq!(unsigned, Value::from(Scalar::U32(1)));
    }

    #[test]
    fn boolean_min_max_are_logical() {
        let format = Format::new(ScalarType::Bool, 2);
        let a = Value::new(vec![Scalar::Bool(true), Scalar::Bool(false)]);
        let b = Value::new(vec![Scalar::Bool(true), Scalar::Bool(true)]);
        assert_eq!(combine(ReduceOp::Min, &a, &b), a);
        assert_eq!(combine(ReduceOp::Max, &a, &b), b);
        assert_eq!(identity(ReduceOp::Min, format), Value::splat(Scalar::Bool(true), format));
    }

    #[test]
    fn exclusive_scan_starts_at_identity() {
        let format = Format::u32();
        assert_eq!(
            exclusive_scan(ReduceOp::Add, format, &u32s(&[1, 2, 3, 4])),
            u32s(&[0, 1, 3, 6])
        );
    }

    #[test]
    fn partitions_reduce_independently() {
        let format = Format::u32();
        let values = u32s(&[1, 2, 4, 8, 16]);
        let labels = [0, 1, 0, 1, 0];
        assert_eq!(
            partitioned(ReduceOp::Add, ScanOrder::Reduce, format, &values, &labels),
            u32s(&[21, 10, 21, 10, 21])
        );
        assert_eq!(
            partitioned(ReduceOp::Add, ScanOrder::Exclusive, format, &values, &labels),
            u32s(&[0, 0, 1, 2, 5])
        );
    }

    #[test]
    fn evaluate_skips_inactive_invocations() {
        let data = u32s(&[1, 2, 3, 4]);
        let subgroup = Subgroup {
            size: 4,
            active: [0, 2, 3].into_iter().collect(),
            data: &data,
            aux: &[],
        };
        let op = Operation::Arithmetic { op: ReduceOp::Add, order: ScanOrder::Inclusive };
        let expected = evaluate(&op, Format::u32(), &subgroup).unwrap();
        assert_eq!(
            expected,
            vec![
                Some(Expected::Value(Value::from(Scalar::U32(1)))),
                None,
                Some(Expected::Value(Value::from(Scalar::U32(4)))),
                Some(Expected::Value(Value::from(Scalar::U32(8)))),
            ]
        );
    }

    #[test]
    fn quad_reads_from_inactive_partner_are_undefined() {
        let data = u32s(&[10, 11, 12, 13]);
        let subgroup = Subgroup {
            size: 4,
            active: [0, 2, 3].into_iter().collect(),
            data: &data,
            aux: &[],
        };
        let op = Operation::Quad(crate::op::QuadOp::SwapHorizontal);
        let expected = evaluate(&op, Format::u32(), &subgroup).unwrap();
        assert_eq!(expected[0], Some(Expected::Undefined { source: Some(1) }));
        assert_eq!(expected[2], Some(Expected::Value(Value::from(Scalar::U32(13)))));
    }

    #[test]
    fn shuffle_up_off_the_end_is_undefined() {
        let data = u32s(&[10, 11, 12, 13]);
        let subgroup = Subgroup {
            size: 4,
            active: Ballot::first(4),
            data: &data,
            aux: &[2, 0, 0, 0],
        };
        let op = Operation::Shuffle(crate::op::ShuffleOp::Up);
        let expected = evaluate(&op, Format::u32(), &subgroup).unwrap();
        assert_eq!(expected[1], Some(Expected::Undefined { source: None }));
        assert_eq!(expected[3], Some(Expected::Value(Value::from(Scalar::U32(11)))));
    }

    #[test]
    fn votes_have_no_value_model() {
        let data = u32s(&[1]);
        let subgroup = Subgroup {
            size: 1,
            active: Ballot::first(1),
            data: &data,
            aux: &[],
        };
        let op = Operation::Vote(crate::op::VoteOp::AllEqual);
        assert!(matches!(
            evaluate(&op, Format::u32(), &subgroup),
            Err(Error::Internal(_))
        ));
    }
}
