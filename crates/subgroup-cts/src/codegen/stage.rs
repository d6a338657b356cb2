//! Per-stage plumbing around the checks.

use super::checks::{self, ACTUAL, RESULT};
use super::ir::{
    BinOp, Builtin, Expr, Input, InputDecl, ResultSink, ShaderModule, StageIo, Stmt, ValueOutputs,
    Varying,
};
use super::{CodegenError, Dialect, PipelineKind, binding};
use crate::MAX_SUBGROUP_SIZE;
use crate::case::{CaseDefinition, ResultMode};
use crate::config::Tolerance;
use crate::features::SubgroupFeatures;
use crate::format::Format;
use crate::stage::{ShaderStage, ShaderStages};

/// What a stage does in a pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    /// Runs the check and leaves the result in `sink`.
    Test(ResultSink),
    /// Forwards positions and varyings only.
    PassThrough,
}

/// A stage's place in its pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub kind: PipelineKind,
    pub role: Role,
    pub varying_in: Option<Varying>,
    pub varying_out: Option<Varying>,
}

impl Frame {
    fn test(kind: PipelineKind, sink: ResultSink) -> Self {
        Self {
            kind,
            role: Role::Test(sink),
            varying_in: None,
            varying_out: (sink == ResultSink::Varying).then_some(Varying::Flat),
        }
    }

    fn pass_through(kind: PipelineKind) -> Self {
        Self {
            kind,
            role: Role::PassThrough,
            varying_in: None,
            varying_out: None,
        }
    }

    fn with_varyings(mut self, varying_in: Option<Varying>, varying_out: Option<Varying>) -> Self {
        self.varying_in = varying_in;
        self.varying_out = varying_out;
        self
    }

    fn is_test(&self) -> bool {
        matches!(self.role, Role::Test(_))
    }
}

/// Stage-specific parts of a generated module.
pub trait StageCodegen {
    fn stage(&self) -> ShaderStage;

    fn io(&self, frame: &Frame) -> StageIo;

    /// Slot of this invocation's word in a result buffer.
    fn result_index(&self) -> Expr;

    /// Wraps `check`, the statements computing the result word, with
    /// whatever the stage must do to keep the pipeline going.
    fn body(&self, frame: &Frame, check: Vec<Stmt>) -> Vec<Stmt>;

    fn module(&self, frame: &Frame, check: Vec<Stmt>) -> ShaderModule {
        ShaderModule {
            stage: self.stage(),
            io: self.io(frame),
            features: SubgroupFeatures::empty(),
            format: None,
            inputs: Vec::new(),
            sink: match frame.role {
                Role::Test(sink) => Some(sink),
                Role::PassThrough => None,
            },
            value_outputs: None,
            varying_in: frame.varying_in,
            varying_out: frame.varying_out,
            body: self.body(frame, check),
        }
    }
}

/// Test statements followed by the store of the result word.
fn store(frame: &Frame, index: Expr, mut check: Vec<Stmt>) -> Vec<Stmt> {
    if let Role::Test(sink) = frame.role {
        check.push(Stmt::StoreResult {
            sink,
            index,
            value: Expr::local(RESULT),
        });
    } else if frame.varying_out.is_some() {
        check.push(Stmt::ForwardVarying);
    }
    check
}

fn builtin(builtin: Builtin) -> Expr {
    Expr::Builtin(builtin)
}

/// `primitive * 2 + end`: the pixel of one isoline end in point mode.
fn isoline_end() -> Expr {
    Expr::binary(
        BinOp::Add,
        Expr::binary(BinOp::Mul, builtin(Builtin::PrimitiveId), Expr::U32(2)),
        builtin(Builtin::TessCoordEnd),
    )
}

struct Vertex;
struct TessControl;
struct TessEval;
struct Geometry;
struct Fragment;
struct Compute;

impl StageCodegen for Vertex {
    fn stage(&self) -> ShaderStage {
        ShaderStage::Vertex
    }

    fn io(&self, _: &Frame) -> StageIo {
        StageIo::Vertex
    }

    fn result_index(&self) -> Expr {
        builtin(Builtin::VertexIndex)
    }

    fn body(&self, frame: &Frame, check: Vec<Stmt>) -> Vec<Stmt> {
        let mut body = store(frame, self.result_index(), check);
        body.push(Stmt::PointPosition {
            pixel: builtin(Builtin::VertexIndex),
            width: frame.kind.framebuffer_width(),
        });
        body.push(Stmt::PointSize);
        body
    }
}

impl StageCodegen for TessControl {
    fn stage(&self) -> ShaderStage {
        ShaderStage::TessControl
    }

    fn io(&self, _: &Frame) -> StageIo {
        StageIo::TessControl
    }

    fn result_index(&self) -> Expr {
        builtin(Builtin::PrimitiveId)
    }

    fn body(&self, frame: &Frame, check: Vec<Stmt>) -> Vec<Stmt> {
        let mut body = vec![Stmt::TessLevels, Stmt::ForwardPosition];
        body.extend(store(frame, self.result_index(), check));
        body
    }
}

impl StageCodegen for TessEval {
    fn stage(&self) -> ShaderStage {
        ShaderStage::TessEval
    }

    fn io(&self, frame: &Frame) -> StageIo {
        StageIo::TessEval {
            point_mode: matches!(frame.kind, PipelineKind::Framebuffer { .. }),
        }
    }

    fn result_index(&self) -> Expr {
        isoline_end()
    }

    fn body(&self, frame: &Frame, check: Vec<Stmt>) -> Vec<Stmt> {
        let mut body = store(frame, self.result_index(), check);
        body.push(match self.io(frame) {
            StageIo::TessEval { point_mode: true } => Stmt::PointPosition {
                pixel: isoline_end(),
                width: frame.kind.framebuffer_width(),
            },
            _ => Stmt::ForwardPosition,
        });
        body
    }
}

impl StageCodegen for Geometry {
    fn stage(&self) -> ShaderStage {
        ShaderStage::Geometry
    }

    fn io(&self, frame: &Frame) -> StageIo {
        StageIo::Geometry {
            lines_in: frame.kind.topology() != crate::device::Topology::Points,
        }
    }

    fn result_index(&self) -> Expr {
        builtin(Builtin::PrimitiveId)
    }

    fn body(&self, frame: &Frame, check: Vec<Stmt>) -> Vec<Stmt> {
        let mut body = vec![Stmt::ForwardPosition];
        body.extend(store(frame, self.result_index(), check));
        body.extend([Stmt::EmitVertex, Stmt::EndPrimitive]);
        body
    }
}

impl StageCodegen for Fragment {
    fn stage(&self) -> ShaderStage {
        ShaderStage::Fragment
    }

    fn io(&self, _: &Frame) -> StageIo {
        StageIo::Fragment
    }

    fn result_index(&self) -> Expr {
        builtin(Builtin::FragCoordX)
    }

    fn body(&self, frame: &Frame, check: Vec<Stmt>) -> Vec<Stmt> {
        if frame.is_test() {
            store(frame, self.result_index(), check)
        } else {
            vec![Stmt::ForwardVarying]
        }
    }
}

impl StageCodegen for Compute {
    fn stage(&self) -> ShaderStage {
        ShaderStage::Compute
    }

    fn io(&self, frame: &Frame) -> StageIo {
        match frame.kind {
            PipelineKind::Compute { local_size } => StageIo::Compute { local_size },
            _ => StageIo::Compute { local_size: [1, 1, 1] },
        }
    }

    fn result_index(&self) -> Expr {
        builtin(Builtin::LinearInvocationIndex)
    }

    fn body(&self, frame: &Frame, check: Vec<Stmt>) -> Vec<Stmt> {
        store(frame, self.result_index(), check)
    }
}

pub fn stage_codegen(stage: ShaderStage) -> &'static dyn StageCodegen {
    match stage {
        ShaderStage::Vertex => &Vertex,
        ShaderStage::TessControl => &TessControl,
        ShaderStage::TessEval => &TessEval,
        ShaderStage::Geometry => &Geometry,
        ShaderStage::Fragment => &Fragment,
        ShaderStage::Compute => &Compute,
    }
}

/// Stages of a `kind` pipeline in order, with their frames.
fn plan(kind: PipelineKind) -> Result<Vec<(ShaderStage, Frame)>, CodegenError> {
    let pass = Frame::pass_through(kind);
    let flat = Some(Varying::Flat);
    Ok(match kind {
        PipelineKind::Compute { .. } => vec![(
            ShaderStage::Compute,
            Frame::test(
                kind,
                ResultSink::Buffer {
                    binding: binding::COMPUTE_RESULT,
                },
            ),
        )],
        PipelineKind::Stages { tested, .. } => {
            if tested.is_empty() || tested.intersects(ShaderStages::FRAGMENT | ShaderStages::COMPUTE) {
                return Err(CodegenError::Internal(format!(
                    "stages {tested:?} cannot share a buffer pass"
                )));
            }
            let frame = |stage: ShaderStage| {
                if tested.contains(stage.flag()) {
                    Frame::test(
                        kind,
                        ResultSink::Buffer {
                            binding: stage.result_binding(),
                        },
                    )
                } else {
                    pass
                }
            };
            let mut stages = vec![(ShaderStage::Vertex, frame(ShaderStage::Vertex))];
            if tested.intersects(ShaderStages::TESSELLATION) {
                stages.push((ShaderStage::TessControl, frame(ShaderStage::TessControl)));
                stages.push((ShaderStage::TessEval, frame(ShaderStage::TessEval)));
            }
            if tested.contains(ShaderStages::GEOMETRY) {
                stages.push((ShaderStage::Geometry, frame(ShaderStage::Geometry)));
            }
            stages.push((ShaderStage::Fragment, pass));
            stages
        }
        PipelineKind::Fragment { .. } => vec![
            (ShaderStage::Vertex, pass),
            (ShaderStage::Fragment, Frame::test(kind, ResultSink::Attachment)),
        ],
        PipelineKind::Framebuffer { stage, .. } => {
            let test = Frame::test(kind, ResultSink::Varying);
            let sink = pass.with_varyings(flat, None);
            match stage {
                ShaderStage::Vertex => vec![(ShaderStage::Vertex, test), (ShaderStage::Fragment, sink)],
                ShaderStage::TessControl => vec![
                    (ShaderStage::Vertex, pass),
                    (
                        ShaderStage::TessControl,
                        test.with_varyings(None, Some(Varying::Patch)),
                    ),
                    (
                        ShaderStage::TessEval,
                        pass.with_varyings(Some(Varying::Patch), flat),
                    ),
                    (ShaderStage::Fragment, sink),
                ],
                ShaderStage::TessEval => vec![
                    (ShaderStage::Vertex, pass),
                    (ShaderStage::TessControl, pass),
                    (ShaderStage::TessEval, test),
                    (ShaderStage::Fragment, sink),
                ],
                ShaderStage::Geometry => vec![
                    (ShaderStage::Vertex, pass),
                    (ShaderStage::Geometry, test),
                    (ShaderStage::Fragment, sink),
                ],
                ShaderStage::Fragment | ShaderStage::Compute => {
                    return Err(CodegenError::Internal(format!(
                        "{stage} has no framebuffer pipeline"
                    )));
                }
            }
        }
    })
}

fn inputs(case: &CaseDefinition, kind: PipelineKind, dialect: Dialect) -> Vec<InputDecl> {
    let input_kind = kind.input_kind(dialect);
    let mut inputs = vec![InputDecl {
        input: Input::Data,
        binding: kind.data_binding(),
        format: case.format(),
        kind: input_kind,
        len: MAX_SUBGROUP_SIZE,
    }];
    if checks::uses_aux(&case.operation()) {
        inputs.push(InputDecl {
            input: Input::Aux,
            binding: kind.aux_binding(),
            format: Format::u32(),
            kind: input_kind,
            len: MAX_SUBGROUP_SIZE,
        });
    }
    inputs
}

/// Value-mode compute body: the raw result plus the record locating the
/// invocation in its subgroup.
fn value_body(case: &CaseDefinition) -> Result<Vec<Stmt>, CodegenError> {
    let format = case.format();
    let mut body = checks::value(&case.operation(), format).ok_or_else(|| {
        CodegenError::Internal(format!("{} produces no value", case.operation()))
    })?;
    let index = builtin(Builtin::LinearInvocationIndex);
    let subgroup_key = Expr::binary(
        BinOp::Add,
        Expr::binary(
            BinOp::Mul,
            builtin(Builtin::LinearWorkgroupIndex),
            builtin(Builtin::NumSubgroups),
        ),
        builtin(Builtin::SubgroupId),
    );
    body.push(Stmt::StoreValue {
        format,
        index: index.clone(),
        value: Expr::local(ACTUAL),
    });
    body.push(Stmt::StoreRecord {
        index,
        value: Expr::Record([
            Box::new(subgroup_key),
            Box::new(Expr::lane()),
            Box::new(Expr::subgroup_size()),
            Box::new(Expr::U32(1)),
        ]),
    });
    Ok(body)
}

/// Lowers `case` to the modules of a `kind` pipeline.
pub(super) fn build_pipeline(
    case: &CaseDefinition,
    kind: PipelineKind,
    dialect: Dialect,
    tolerance: &Tolerance,
) -> Result<Vec<ShaderModule>, CodegenError> {
    let operation = case.operation();
    let values = case.mode() == ResultMode::Values;
    if values && !matches!(kind, PipelineKind::Compute { .. }) {
        return Err(CodegenError::Internal(
            "value mode needs a compute pipeline".into(),
        ));
    }
    plan(kind)?
        .into_iter()
        .map(|(stage, frame)| {
            let codegen = stage_codegen(stage);
            if !frame.is_test() {
                return Ok(codegen.module(&frame, Vec::new()));
            }
            let mut module = if values {
                let module = codegen.module(&Frame::pass_through(kind), value_body(case)?);
                ShaderModule {
                    value_outputs: Some(ValueOutputs {
                        format: case.format(),
                        values_binding: binding::COMPUTE_RESULT,
                        records_binding: binding::COMPUTE_RECORDS,
                    }),
                    ..module
                }
            } else {
                codegen.module(
                    &frame,
                    checks::check_mask(&operation, case.format(), tolerance),
                )
            };
            module.features = operation.required_features();
            module.format = Some(case.format());
            module.inputs = inputs(case, kind, dialect);
            Ok(module)
        })
        .collect()
}
