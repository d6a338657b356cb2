//! Dialect-neutral shader IR.
//!
//! Checks are built as trees of [`Stmt`] and [`Expr`]; the GLSL and WGSL
//! serializers decide how each node is spelled.

use crate::config::Epsilon;
use crate::features::SubgroupFeatures;
use crate::format::Format;
use crate::input::InputKind;
use crate::op::{QuadOp, ReduceOp, ScanOrder, ShuffleOp};
use crate::stage::ShaderStage;

/// Types of locals.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ty {
    /// A value in the case format; booleans are real booleans here.
    Data(Format),
    U32,
    Bool,
    /// Four words of invocation bits.
    Ballot,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Builtin {
    SubgroupSize,
    SubgroupInvocationId,
    SubgroupId,
    NumSubgroups,
    /// Row-major index of the invocation in the whole compute dispatch.
    LinearInvocationIndex,
    /// Row-major index of the workgroup in the dispatch.
    LinearWorkgroupIndex,
    VertexIndex,
    PrimitiveId,
    /// `gl_InvocationID` of a tessellation control shader.
    InvocationId,
    /// Which end of an isoline segment a tessellation evaluation invocation
    /// sits on, 0 or 1.
    TessCoordEnd,
    /// Pixel column of the fragment.
    FragCoordX,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Rem,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Le,
    Eq,
    And,
    Or,
}

/// Read-only inputs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Case-format data indexed by subgroup invocation id.
    Data,
    /// `u32` arguments for shuffles.
    Aux,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Elect,
    Ballot(Box<Expr>),
    All(Box<Expr>),
    Any(Box<Expr>),
    AllEqual(Box<Expr>),
    Reduce {
        op: ReduceOp,
        order: ScanOrder,
        value: Box<Expr>,
    },
    Clustered {
        op: ReduceOp,
        value: Box<Expr>,
        cluster_size: u32,
    },
    /// Ballot of the active invocations sharing the label.
    Partition(Box<Expr>),
    Partitioned {
        op: ReduceOp,
        order: ScanOrder,
        value: Box<Expr>,
        ballot: Box<Expr>,
    },
    Quad {
        op: QuadOp,
        value: Box<Expr>,
    },
    Shuffle {
        op: ShuffleOp,
        value: Box<Expr>,
        arg: Box<Expr>,
    },
    Broadcast {
        value: Box<Expr>,
        lane: u32,
    },
    BroadcastFirst(Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    U32(u32),
    Bool(bool),
    Local(&'static str),
    Builtin(Builtin),
    /// Element of an input buffer, converted to the operation type.
    Load {
        input: Input,
        format: Format,
        index: Box<Expr>,
    },
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Select {
        cond: Box<Expr>,
        accept: Box<Expr>,
        reject: Box<Expr>,
    },
    Identity(ReduceOp, Format),
    Combine(ReduceOp, Format, Box<Expr>, Box<Expr>),
    /// Whole-value equality, or closeness when `epsilon` is set.
    Equal {
        format: Format,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        epsilon: Option<Epsilon>,
    },
    Subgroup(Call),
    BallotBit {
        ballot: Box<Expr>,
        index: Box<Expr>,
    },
    BallotCount(Box<Expr>),
    BallotLowest(Box<Expr>),
    /// A ballot holding only the given invocation.
    LaneBallot(Box<Expr>),
    /// Four `u32`s packed into one record.
    Record([Box<Expr>; 4]),
}

impl Expr {
    pub fn local(name: &'static str) -> Self {
        Self::Local(name)
    }

    pub fn lane() -> Self {
        Self::Builtin(Builtin::SubgroupInvocationId)
    }

    pub fn subgroup_size() -> Self {
        Self::Builtin(Builtin::SubgroupSize)
    }

    pub fn data(format: Format, index: Self) -> Self {
        Self::Load {
            input: Input::Data,
            format,
            index: Box::new(index),
        }
    }

    pub fn aux(index: Self) -> Self {
        Self::Load {
            input: Input::Aux,
            format: Format::u32(),
            index: Box::new(index),
        }
    }

    pub fn binary(op: BinOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn and_also(self, rhs: Self) -> Self {
        Self::binary(BinOp::And, self, rhs)
    }

    pub fn equals(self, rhs: Self) -> Self {
        Self::binary(BinOp::Eq, self, rhs)
    }

    pub fn less_than(self, rhs: Self) -> Self {
        Self::binary(BinOp::Lt, self, rhs)
    }

    /// `cond ? bits : 0`.
    pub fn flag(cond: Self, bits: u32) -> Self {
        Self::Select {
            cond: Box::new(cond),
            accept: Box::new(Self::U32(bits)),
            reject: Box::new(Self::U32(0)),
        }
    }

    pub fn call(call: Call) -> Self {
        Self::Subgroup(call)
    }

    pub fn ballot(predicate: Self) -> Self {
        Self::Subgroup(Call::Ballot(Box::new(predicate)))
    }

    pub fn ballot_bit(ballot: Self, index: Self) -> Self {
        Self::BallotBit {
            ballot: Box::new(ballot),
            index: Box::new(index),
        }
    }

    pub fn equal(format: Format, lhs: Self, rhs: Self, epsilon: Option<Epsilon>) -> Self {
        Self::Equal {
            format,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            epsilon,
        }
    }
}

/// Where a stage leaves its per-invocation result word.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResultSink {
    Buffer { binding: u32 },
    /// A flat `u32` varying read by a later stage.
    Varying,
    /// The `R32Uint` color attachment.
    Attachment,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    /// Declares a mutable local.
    Let {
        name: &'static str,
        ty: Ty,
        value: Expr,
    },
    Assign {
        name: &'static str,
        value: Expr,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    /// `for (index = 0; index < end; index++)`.
    For {
        index: &'static str,
        end: Expr,
        body: Vec<Stmt>,
    },
    /// Writes the result word; `index` is ignored by non-buffer sinks.
    StoreResult {
        sink: ResultSink,
        index: Expr,
        value: Expr,
    },
    /// Writes a raw operation result of the case format.
    StoreValue {
        format: Format,
        index: Expr,
        value: Expr,
    },
    StoreRecord {
        index: Expr,
        value: Expr,
    },
    /// Copies the incoming varying to the outgoing one, or to the attachment
    /// in a fragment shader; zero when nothing comes in.
    ForwardVarying,
    /// Places a point on pixel `pixel` of a `width` x 1 target.
    PointPosition {
        pixel: Expr,
        width: u32,
    },
    PointSize,
    /// Copies the position of the first incoming vertex.
    ForwardPosition,
    /// Outer levels of a single-segment isoline patch.
    TessLevels,
    EmitVertex,
    EndPrimitive,
}

impl Stmt {
    pub fn let_(name: &'static str, ty: Ty, value: Expr) -> Self {
        Self::Let { name, ty, value }
    }

    pub fn assign(name: &'static str, value: Expr) -> Self {
        Self::Assign { name, value }
    }

    /// `name |= value`.
    pub fn or_assign(name: &'static str, value: Expr) -> Self {
        Self::Assign {
            name,
            value: Expr::binary(BinOp::BitOr, Expr::Local(name), value),
        }
    }

    pub fn if_else(cond: Expr, then: Vec<Self>, otherwise: Vec<Self>) -> Self {
        Self::If {
            cond,
            then,
            otherwise,
        }
    }
}

/// A varying crossing a stage boundary.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Varying {
    /// Per-vertex flat `u32`.
    Flat,
    /// Per-patch `u32`, out of tessellation control.
    Patch,
}

/// Stage-level declarations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageIo {
    Compute {
        local_size: [u32; 3],
    },
    Vertex,
    TessControl,
    TessEval {
        /// Emit one point per tessellated vertex instead of lines.
        point_mode: bool,
    },
    Geometry {
        /// Input primitives are isoline segments rather than points.
        lines_in: bool,
    },
    Fragment,
}

/// An input buffer declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InputDecl {
    pub input: Input,
    pub binding: u32,
    pub format: Format,
    pub kind: InputKind,
    /// Element count of uniform arrays; storage arrays are unsized.
    pub len: u32,
}

/// An output buffer of raw values plus a record per invocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ValueOutputs {
    pub format: Format,
    pub values_binding: u32,
    pub records_binding: u32,
}

/// One complete shader stage.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderModule {
    pub stage: ShaderStage,
    pub io: StageIo,
    /// Subgroup operation families used; empty for pass-through stages.
    pub features: SubgroupFeatures,
    /// Case format when the stage touches case data.
    pub format: Option<Format>,
    pub inputs: Vec<InputDecl>,
    pub sink: Option<ResultSink>,
    pub value_outputs: Option<ValueOutputs>,
    pub varying_in: Option<Varying>,
    pub varying_out: Option<Varying>,
    pub body: Vec<Stmt>,
}

impl ShaderModule {
    pub fn uses_subgroups(&self) -> bool {
        !self.features.is_empty()
    }

    /// Visits every expression in the body.
    pub fn any_expr(&self, mut f: impl FnMut(&Expr) -> bool) -> bool {
        fn walk_expr(e: &Expr, f: &mut dyn FnMut(&Expr) -> bool) -> bool {
            if f(e) {
                return true;
            }
            match e {
                Expr::U32(_) | Expr::Bool(_) | Expr::Local(_) | Expr::Builtin(_) | Expr::Identity(..) => {
                    false
                }
                Expr::Load { index, .. } => walk_expr(index, f),
                Expr::Not(a)
                | Expr::BallotCount(a)
                | Expr::BallotLowest(a)
                | Expr::LaneBallot(a) => walk_expr(a, f),
                Expr::Binary(_, a, b)
                | Expr::Combine(_, _, a, b)
                | Expr::Equal { lhs: a, rhs: b, .. }
                | Expr::BallotBit { ballot: a, index: b } => walk_expr(a, f) || walk_expr(b, f),
                Expr::Select {
                    cond,
                    accept,
                    reject,
                } => walk_expr(cond, f) || walk_expr(accept, f) || walk_expr(reject, f),
                Expr::Record(parts) => parts.iter().any(|p| walk_expr(p, f)),
                Expr::Subgroup(call) => match call {
                    Call::Elect => false,
                    Call::Ballot(a)
                    | Call::All(a)
                    | Call::Any(a)
                    | Call::AllEqual(a)
                    | Call::Partition(a)
                    | Call::BroadcastFirst(a) => walk_expr(a, f),
                    Call::Reduce { value, .. }
                    | Call::Clustered { value, .. }
                    | Call::Quad { value, .. }
                    | Call::Broadcast { value, .. } => walk_expr(value, f),
                    Call::Partitioned { value, ballot, .. } => {
                        walk_expr(value, f) || walk_expr(ballot, f)
                    }
                    Call::Shuffle { value, arg, .. } => walk_expr(value, f) || walk_expr(arg, f),
                },
            }
        }
        fn walk_stmt(s: &Stmt, f: &mut dyn FnMut(&Expr) -> bool) -> bool {
            match s {
                Stmt::Let { value, .. } | Stmt::Assign { value, .. } => walk_expr(value, f),
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    walk_expr(cond, f)
                        || then.iter().any(|s| walk_stmt(s, f))
                        || otherwise.iter().any(|s| walk_stmt(s, f))
                }
                Stmt::For { end, body, .. } => walk_expr(end, f) || body.iter().any(|s| walk_stmt(s, f)),
                Stmt::StoreResult { index, value, .. }
                | Stmt::StoreValue { index, value, .. }
                | Stmt::StoreRecord { index, value } => walk_expr(index, f) || walk_expr(value, f),
                Stmt::PointPosition { pixel, .. } => walk_expr(pixel, f),
                Stmt::ForwardVarying
                | Stmt::PointSize
                | Stmt::ForwardPosition
                | Stmt::TessLevels
                | Stmt::EmitVertex
                | Stmt::EndPrimitive => false,
            }
        }
        self.body.iter().any(|s| walk_stmt(s, &mut f))
    }
}
