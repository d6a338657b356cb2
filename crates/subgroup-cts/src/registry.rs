//! The test tree: every case the suite registers.

use crate::case::{CaseDefinition, ResultMode, StageTarget};
use crate::format::Format;
use crate::op::{
    BroadcastOp, Operation, PartitionScheme, QuadOp, ReduceOp, ScanOrder, ShuffleOp, VoteOp,
};
use itertools::iproduct;

/// Invocation ids used by the constant-lane broadcast cases.
pub const BROADCAST_LANES: [u32; 4] = [0, 1, 3, 31];

/// Every operation variant, before pairing with formats.
pub fn operations() -> Vec<Operation> {
    let mut ops = Vec::new();
    ops.extend(
        iproduct!(ReduceOp::ALL, ScanOrder::ALL).map(|(op, order)| Operation::Arithmetic { op, order }),
    );
    ops.extend(
        iproduct!(ReduceOp::ALL, (0..=7).map(|shift| 1u32 << shift))
            .map(|(op, cluster_size)| Operation::Clustered { op, cluster_size }),
    );
    ops.extend(
        iproduct!(ReduceOp::ALL, ScanOrder::ALL).map(|(op, order)| Operation::Partitioned {
            op,
            order,
            scheme: PartitionScheme::DEFAULT,
        }),
    );
    ops.extend(QuadOp::ALL.map(Operation::Quad));
    ops.extend(ShuffleOp::ALL.map(Operation::Shuffle));
    ops.extend(BROADCAST_LANES.map(|lane| Operation::Broadcast(BroadcastOp::Lane(lane))));
    ops.push(Operation::Broadcast(BroadcastOp::First));
    ops.push(Operation::Elect);
    ops.extend([VoteOp::All, VoteOp::Any, VoteOp::AllEqual].map(Operation::Vote));
    ops
}

/// Every valid case, in a stable order. Invalid pairings (bitwise float
/// operations and the like) are skipped here rather than registered.
pub fn all_cases() -> Vec<CaseDefinition> {
    let ops = operations();
    let check_masks = iproduct!(ops.iter().copied(), Format::all(), StageTarget::ALL)
        .filter_map(|(op, format, target)| {
            CaseDefinition::new(op, format, target, ResultMode::CheckMask).ok()
        });
    let values = iproduct!(ops.iter().copied(), Format::all()).filter_map(|(op, format)| {
        CaseDefinition::new(op, format, StageTarget::Compute, ResultMode::Values).ok()
    });
    check_masks.chain(values).collect()
}
