//! Operation semantics as shader IR.
//!
//! In check-mask mode every invocation recomputes the expected result from
//! the input buffer, indexed by subgroup invocation id, and packs one bit
//! per sub-check into the local [`RESULT`]. Bit `i + 16` replaces bit `i`
//! when the check read an inactive invocation and cannot be verified.

use super::ir::{BinOp, Call, Expr, Stmt, Ty};
use crate::compare::{CheckBit, CheckLayout, UNVERIFIABLE_SHIFT};
use crate::config::{Epsilon, Tolerance};
use crate::format::{Format, ScalarType};
use crate::op::{BroadcastOp, Operation, PartitionScheme, QuadOp, ReduceOp, ScanOrder, ShuffleOp, VoteOp};

/// Local holding the packed check bits.
pub const RESULT: &str = "tempRes";
/// Local holding the raw operation result in value mode.
pub const ACTUAL: &str = "actual";

const MASK: &str = "mask";
const EXPECTED: &str = "expected";
const INDEX: &str = "index";
const OTHER: &str = "other";
const ARG: &str = "arg";
const LABEL: &str = "label";
const PARTITION: &str = "partitionBallot";
const ACC: &str = "acc";

/// The sub-checks an operation packs into its result word.
pub fn layout(operation: &Operation) -> CheckLayout {
    let bits: &[CheckBit] = match operation {
        Operation::Arithmetic { .. } | Operation::Clustered { .. } => &[
            CheckBit::local("all active invocations"),
            CheckBit::local("odd invocations only"),
        ],
        Operation::Partitioned { .. } => &[
            CheckBit::local("label partitions"),
            CheckBit::local("single-invocation partition"),
        ],
        Operation::Quad(op) if op.is_swap() => &[
            CheckBit::cross("swapped value"),
            CheckBit::cross("swap applied twice"),
        ],
        Operation::Quad(_) => &[CheckBit::cross("quad broadcast value")],
        Operation::Shuffle(_) => &[CheckBit::cross("shuffled value")],
        Operation::Broadcast(BroadcastOp::Lane(_)) => &[CheckBit::cross("broadcast value")],
        Operation::Broadcast(BroadcastOp::First) => &[CheckBit::local("broadcast from first active")],
        Operation::Elect => &[
            CheckBit::local("exactly one elected"),
            CheckBit::local("lowest active elected"),
        ],
        Operation::Vote(_) => &[
            CheckBit::local("uniform predicate"),
            CheckBit::local("data predicate"),
        ],
    };
    CheckLayout::new(bits.to_vec())
}

/// Whether the shader reads shuffle arguments from the auxiliary input.
pub fn uses_aux(operation: &Operation) -> bool {
    matches!(operation, Operation::Shuffle(_))
}

fn epsilon(op: ReduceOp, format: Format, tolerance: &Tolerance) -> Option<Epsilon> {
    match (op, format.scalar()) {
        (ReduceOp::Add | ReduceOp::Mul, ScalarType::F32) => Some(tolerance.f32),
        (ReduceOp::Add | ReduceOp::Mul, ScalarType::F64) => Some(tolerance.f64),
        _ => None,
    }
}

fn own(format: Format) -> Expr {
    Expr::data(format, Expr::lane())
}

fn index() -> Expr {
    Expr::local(INDEX)
}

fn active(lane: Expr) -> Expr {
    Expr::ballot_bit(Expr::local(MASK), lane)
}

fn mask() -> Stmt {
    Stmt::let_(MASK, Ty::Ballot, Expr::ballot(Expr::Bool(true)))
}

fn order_includes(order: ScanOrder, index: Expr, lane: Expr) -> Option<Expr> {
    match order {
        ScanOrder::Reduce => None,
        ScanOrder::Inclusive => Some(Expr::binary(BinOp::Le, index, lane)),
        ScanOrder::Exclusive => Some(index.less_than(lane)),
    }
}

fn partition_label(scheme: PartitionScheme, lane: Expr) -> Expr {
    let hashed = Expr::binary(
        BinOp::Shr,
        Expr::binary(BinOp::Mul, lane, Expr::U32(PartitionScheme::MULTIPLIER)),
        Expr::U32(PartitionScheme::SHIFT),
    );
    Expr::binary(BinOp::Rem, hashed, Expr::U32(scheme.groups))
}

/// Folds `op` over the active invocations accepted by `include` into the
/// local `expected`.
fn fold_active(op: ReduceOp, format: Format, include: Option<Expr>) -> Vec<Stmt> {
    let cond = match include {
        Some(include) => active(index()).and_also(include),
        None => active(index()),
    };
    let step = Expr::Combine(
        op,
        format,
        Box::new(Expr::local(EXPECTED)),
        Box::new(Expr::data(format, index())),
    );
    vec![
        Stmt::let_(EXPECTED, Ty::Data(format), Expr::Identity(op, format)),
        Stmt::For {
            index: INDEX,
            end: Expr::subgroup_size(),
            body: vec![Stmt::if_else(cond, vec![Stmt::assign(EXPECTED, step)], vec![])],
        },
    ]
}

/// Compares a device fold against the emulated one for the invocations
/// currently active, setting `bit` on success.
fn fold_check(
    op: ReduceOp,
    format: Format,
    eps: Option<Epsilon>,
    include: impl Fn() -> Option<Expr>,
    device: &Expr,
    bit: u32,
) -> Vec<Stmt> {
    let mut body = vec![mask()];
    body.extend(fold_active(op, format, include()));
    body.push(Stmt::let_(ACTUAL, Ty::Data(format), device.clone()));
    body.push(Stmt::or_assign(
        RESULT,
        Expr::flag(
            Expr::equal(format, Expr::local(EXPECTED), Expr::local(ACTUAL), eps),
            bit,
        ),
    ));
    body
}

/// Runs the fold check once with every invocation active and once with only
/// the odd invocations active.
fn with_odd_subset(
    op: ReduceOp,
    format: Format,
    eps: Option<Epsilon>,
    include: impl Fn() -> Option<Expr>,
    device: &Expr,
) -> Vec<Stmt> {
    let odd = Expr::binary(BinOp::BitAnd, Expr::lane(), Expr::U32(1)).equals(Expr::U32(1));
    let mut body = vec![Stmt::let_(RESULT, Ty::U32, Expr::U32(0))];
    body.extend(fold_check(op, format, eps, &include, device, 0x1));
    body.push(Stmt::if_else(
        odd,
        fold_check(op, format, eps, &include, device, 0x2),
        vec![Stmt::or_assign(RESULT, Expr::U32(0x2))],
    ));
    body
}

/// `if (source is active) result |= check ? bit : 0; else result |= bit << 16;`
fn cross_check(source_active: Expr, check: Expr, bit: u32) -> Stmt {
    Stmt::if_else(
        source_active,
        vec![Stmt::or_assign(RESULT, Expr::flag(check, bit))],
        vec![Stmt::or_assign(RESULT, Expr::U32(bit << UNVERIFIABLE_SHIFT))],
    )
}

/// The device-side call under test, applied to the invocation's own value.
fn device_call(operation: &Operation, format: Format) -> Expr {
    let value = Box::new(own(format));
    Expr::call(match *operation {
        Operation::Arithmetic { op, order } => Call::Reduce { op, order, value },
        Operation::Clustered { op, cluster_size } => Call::Clustered {
            op,
            value,
            cluster_size,
        },
        Operation::Partitioned { op, order, .. } => Call::Partitioned {
            op,
            order,
            value,
            ballot: Box::new(Expr::local(PARTITION)),
        },
        Operation::Quad(op) => Call::Quad { op, value },
        Operation::Shuffle(op) => Call::Shuffle {
            op,
            value,
            arg: Box::new(Expr::local(ARG)),
        },
        Operation::Broadcast(BroadcastOp::Lane(lane)) => Call::Broadcast { value, lane },
        Operation::Broadcast(BroadcastOp::First) => Call::BroadcastFirst(value),
        Operation::Elect => Call::Elect,
        Operation::Vote(VoteOp::All) => Call::All(value),
        Operation::Vote(VoteOp::Any) => Call::Any(value),
        Operation::Vote(VoteOp::AllEqual) => Call::AllEqual(value),
    })
}

/// Locals the device call depends on.
fn preamble(operation: &Operation) -> Vec<Stmt> {
    match *operation {
        Operation::Partitioned { scheme, .. } => vec![
            Stmt::let_(LABEL, Ty::U32, partition_label(scheme, Expr::lane())),
            Stmt::let_(
                PARTITION,
                Ty::Ballot,
                Expr::call(Call::Partition(Box::new(Expr::local(LABEL)))),
            ),
        ],
        Operation::Shuffle(op) => {
            let arg = if op.uniform_argument() {
                Expr::aux(Expr::U32(0))
            } else {
                Expr::aux(Expr::lane())
            };
            vec![Stmt::let_(ARG, Ty::U32, arg)]
        }
        _ => Vec::new(),
    }
}

/// Body computing the packed check word into [`RESULT`].
pub fn check_mask(operation: &Operation, format: Format, tolerance: &Tolerance) -> Vec<Stmt> {
    let device = device_call(operation, format);
    let mut body = preamble(operation);
    match *operation {
        Operation::Arithmetic { op, order } => {
            let eps = epsilon(op, format, tolerance);
            body.extend(with_odd_subset(
                op,
                format,
                eps,
                || order_includes(order, index(), Expr::lane()),
                &device,
            ));
        }
        Operation::Clustered { op, cluster_size } => {
            let eps = epsilon(op, format, tolerance);
            let base = || Expr::binary(BinOp::BitAnd, Expr::lane(), Expr::U32(!(cluster_size - 1)));
            body.extend(with_odd_subset(
                op,
                format,
                eps,
                || {
                    let lower = Expr::binary(BinOp::Le, base(), index());
                    let upper = index().less_than(Expr::binary(
                        BinOp::Add,
                        base(),
                        Expr::U32(cluster_size),
                    ));
                    Some(lower.and_also(upper))
                },
                &device,
            ));
        }
        Operation::Partitioned { op, order, scheme } => {
            let eps = epsilon(op, format, tolerance);
            body.push(Stmt::let_(RESULT, Ty::U32, Expr::U32(0)));
            let same_label = partition_label(scheme, index()).equals(Expr::local(LABEL));
            let include = match order_includes(order, index(), Expr::lane()) {
                Some(order) => same_label.and_also(order),
                None => same_label,
            };
            body.push(mask());
            body.extend(fold_active(op, format, Some(include)));
            body.push(Stmt::let_(ACTUAL, Ty::Data(format), device));
            body.push(Stmt::or_assign(
                RESULT,
                Expr::flag(
                    Expr::equal(format, Expr::local(EXPECTED), Expr::local(ACTUAL), eps),
                    0x1,
                ),
            ));
            let alone = Expr::call(Call::Partitioned {
                op,
                order,
                value: Box::new(own(format)),
                ballot: Box::new(Expr::LaneBallot(Box::new(Expr::lane()))),
            });
            let expected_alone = match order {
                ScanOrder::Exclusive => Expr::Identity(op, format),
                ScanOrder::Reduce | ScanOrder::Inclusive => own(format),
            };
            body.push(Stmt::or_assign(
                RESULT,
                Expr::flag(Expr::equal(format, alone, expected_alone, eps), 0x2),
            ));
        }
        Operation::Quad(op) => {
            let other = match op {
                QuadOp::Broadcast(lane) => Expr::binary(
                    BinOp::BitOr,
                    Expr::binary(BinOp::BitAnd, Expr::lane(), Expr::U32(!3)),
                    Expr::U32(u32::from(lane)),
                ),
                _ => Expr::binary(BinOp::BitXor, Expr::lane(), Expr::U32(op.source(0))),
            };
            body.extend([
                Stmt::let_(RESULT, Ty::U32, Expr::U32(0)),
                mask(),
                Stmt::let_(OTHER, Ty::U32, other),
                Stmt::let_(ACTUAL, Ty::Data(format), device),
                cross_check(
                    active(Expr::local(OTHER)),
                    Expr::equal(
                        format,
                        Expr::local(ACTUAL),
                        Expr::data(format, Expr::local(OTHER)),
                        None,
                    ),
                    0x1,
                ),
            ]);
            if op.is_swap() {
                let back = Expr::call(Call::Quad {
                    op,
                    value: Box::new(Expr::local(ACTUAL)),
                });
                body.push(cross_check(
                    active(Expr::local(OTHER)),
                    Expr::equal(format, back, own(format), None),
                    0x2,
                ));
            }
        }
        Operation::Shuffle(op) => {
            let lane = Expr::lane;
            let arg = || Expr::local(ARG);
            let other = match op {
                ShuffleOp::Shuffle => arg(),
                ShuffleOp::Xor => Expr::binary(BinOp::BitXor, lane(), arg()),
                ShuffleOp::Up => Expr::binary(BinOp::Sub, lane(), arg()),
                ShuffleOp::Down => Expr::binary(BinOp::Add, lane(), arg()),
            };
            body.extend(source_check(format, other, device));
        }
        Operation::Broadcast(BroadcastOp::Lane(lane)) => {
            body.extend(source_check(format, Expr::U32(lane), device));
        }
        Operation::Broadcast(BroadcastOp::First) => {
            let first = Expr::data(format, Expr::BallotLowest(Box::new(Expr::local(MASK))));
            body.extend([
                Stmt::let_(RESULT, Ty::U32, Expr::U32(0)),
                mask(),
                Stmt::or_assign(RESULT, Expr::flag(Expr::equal(format, device, first, None), 0x1)),
            ]);
        }
        Operation::Elect => {
            const ELECTED: &str = "elected";
            let count = Expr::BallotCount(Box::new(Expr::ballot(Expr::local(ELECTED))));
            let lowest = Expr::lane().equals(Expr::BallotLowest(Box::new(Expr::local(MASK))));
            body.extend([
                Stmt::let_(ELECTED, Ty::Bool, device),
                mask(),
                Stmt::let_(RESULT, Ty::U32, Expr::flag(count.equals(Expr::U32(1)), 0x1)),
                Stmt::or_assign(RESULT, Expr::flag(Expr::local(ELECTED).equals(lowest), 0x2)),
            ]);
        }
        Operation::Vote(op) => body.extend(vote(op, format, device)),
    }
    body
}

/// Single-value check of a read from invocation `other`.
fn source_check(format: Format, other: Expr, device: Expr) -> Vec<Stmt> {
    let in_range = Expr::local(OTHER).less_than(Expr::subgroup_size());
    vec![
        Stmt::let_(RESULT, Ty::U32, Expr::U32(0)),
        mask(),
        Stmt::let_(OTHER, Ty::U32, other),
        Stmt::let_(ACTUAL, Ty::Data(format), device),
        cross_check(
            in_range.and_also(active(Expr::local(OTHER))),
            Expr::equal(
                format,
                Expr::local(ACTUAL),
                Expr::data(format, Expr::local(OTHER)),
                None,
            ),
            0x1,
        ),
    ]
}

fn vote(op: VoteOp, format: Format, device: Expr) -> Vec<Stmt> {
    let (uniform, start, step) = match op {
        VoteOp::All => (
            Expr::call(Call::All(Box::new(Expr::Bool(true)))),
            Expr::Bool(true),
            Expr::local(ACC).and_also(Expr::data(format, index())),
        ),
        VoteOp::Any => (
            Expr::Not(Box::new(Expr::call(Call::Any(Box::new(Expr::Bool(false)))))),
            Expr::Bool(false),
            Expr::binary(BinOp::Or, Expr::local(ACC), Expr::data(format, index())),
        ),
        VoteOp::AllEqual => (
            Expr::call(Call::AllEqual(Box::new(Expr::data(format, Expr::U32(0))))),
            Expr::Bool(true),
            Expr::local(ACC).and_also(Expr::equal(
                format,
                Expr::data(format, index()),
                Expr::local(EXPECTED),
                None,
            )),
        ),
    };
    let mut body = vec![
        Stmt::let_(RESULT, Ty::U32, Expr::flag(uniform, 0x1)),
        mask(),
    ];
    if op == VoteOp::AllEqual {
        body.push(Stmt::let_(
            EXPECTED,
            Ty::Data(format),
            Expr::data(format, Expr::BallotLowest(Box::new(Expr::local(MASK)))),
        ));
    }
    body.extend([
        Stmt::let_(ACC, Ty::Bool, start),
        Stmt::For {
            index: INDEX,
            end: Expr::subgroup_size(),
            body: vec![Stmt::if_else(
                active(index()),
                vec![Stmt::assign(ACC, step)],
                vec![],
            )],
        },
        Stmt::or_assign(RESULT, Expr::flag(device.equals(Expr::local(ACC)), 0x2)),
    ]);
    body
}

/// Body leaving the raw result of the operation in [`ACTUAL`].
///
/// Only operations that produce a value of the case format have one.
pub fn value(operation: &Operation, format: Format) -> Option<Vec<Stmt>> {
    if !operation.produces_value() {
        return None;
    }
    let mut body = preamble(operation);
    body.push(Stmt::let_(ACTUAL, Ty::Data(format), device_call(operation, format)));
    Some(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains_call(body: &[Stmt], pred: &dyn Fn(&Call) -> bool) -> bool {
        fn walk(e: &Expr, pred: &dyn Fn(&Call) -> bool) -> bool {
            match e {
                Expr::Subgroup(call) => pred(call),
                Expr::Binary(_, a, b) | Expr::Combine(_, _, a, b) => walk(a, pred) || walk(b, pred),
                Expr::Equal { lhs, rhs, .. } => walk(lhs, pred) || walk(rhs, pred),
                Expr::Select { cond, .. } => walk(cond, pred),
                Expr::Not(a) => walk(a, pred),
                _ => false,
            }
        }
        body.iter().any(|s| match s {
            Stmt::Let { value, .. } | Stmt::Assign { value, .. } => walk(value, pred),
            Stmt::If { then, otherwise, .. } => {
                contains_call(then, pred) || contains_call(otherwise, pred)
            }
            _ => false,
        })
    }

    #[test]
    fn arithmetic_checks_both_subsets() {
        let op = Operation::Arithmetic { op: ReduceOp::Add, order: ScanOrder::Exclusive };
        let body = check_mask(&op, Format::u32(), &Tolerance::default());
        assert!(matches!(body.last(), Some(Stmt::If { .. })));
        assert!(contains_call(&body, &|c| matches!(
            c,
            Call::Reduce { order: ScanOrder::Exclusive, .. }
        )));
        assert_eq!(layout(&op).expected_mask(), 0b11);
    }

    #[test]
    fn only_float_sums_get_a_tolerance() {
        let tolerance = Tolerance::default();
        let f32 = Format::new(ScalarType::F32, 2);
        assert!(epsilon(ReduceOp::Add, f32, &tolerance).is_some());
        assert!(epsilon(ReduceOp::Min, f32, &tolerance).is_none());
        assert!(epsilon(ReduceOp::Add, Format::u32(), &tolerance).is_none());
    }

    #[test]
    fn swaps_check_the_round_trip() {
        let swap = layout(&Operation::Quad(QuadOp::SwapVertical));
        assert_eq!(swap.expected_mask(), 0b11);
        assert_eq!(swap.unverifiable_mask(), 0b11 << 16);
        let broadcast = layout(&Operation::Quad(QuadOp::Broadcast(2)));
        assert_eq!(broadcast.expected_mask(), 0b1);
    }

    #[test]
    fn shuffles_read_their_argument() {
        let body = check_mask(
            &Operation::Shuffle(ShuffleOp::Down),
            Format::u32(),
            &Tolerance::default(),
        );
        assert_eq!(
            body[0],
            Stmt::let_(ARG, Ty::U32, Expr::aux(Expr::U32(0)))
        );
    }

    #[test]
    fn votes_have_no_value_body() {
        assert!(value(&Operation::Vote(VoteOp::AllEqual), Format::u32()).is_none());
        assert!(value(&Operation::Quad(QuadOp::SwapDiagonal), Format::u32()).is_some());
    }
}
