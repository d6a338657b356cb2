//! WGSL backend.
//!
//! WGSL exposes a smaller subgroup surface than GLSL: no 64-bit types, no
//! boolean operands apart from votes, no clustered, partitioned or quad
//! operations, only `add`/`mul` scans, and subgroup builtins only in compute
//! and fragment shaders.

use super::ir::{
    BinOp, Builtin, Call, Expr, Input, InputDecl, ResultSink, ShaderModule, StageIo, Stmt, Ty,
};
use super::{CodegenError, Dialect, PipelineKind};
use crate::case::CaseDefinition;
use crate::config::Epsilon;
use crate::format::{Format, ScalarType};
use crate::op::{Operation, ReduceOp, ScanOrder, ShuffleOp, VoteOp};
use crate::reference;
use crate::stage::ShaderStage;
use crate::value::Scalar;

pub(super) fn supports(case: &CaseDefinition, kind: PipelineKind) -> Result<(), String> {
    let format = case.format();
    let operation = case.operation();
    match kind {
        PipelineKind::Compute { .. } | PipelineKind::Fragment { .. } => {}
        PipelineKind::Stages { .. } | PipelineKind::Framebuffer { .. } => {
            return Err("WGSL has subgroup operations only in compute and fragment shaders".into());
        }
    }
    if format.scalar().is_64bit() {
        return Err(format!("WGSL has no {} type", format.scalar().name()));
    }
    let boolean_vote = matches!(operation, Operation::Vote(VoteOp::All | VoteOp::Any));
    if format.scalar().is_bool() && !boolean_vote {
        return Err("WGSL subgroup operations take no boolean operands".into());
    }
    match operation {
        Operation::Clustered { .. } => Err("WGSL has no clustered operations".into()),
        Operation::Partitioned { .. } => Err("WGSL has no partitioned operations".into()),
        // naga 25 does not parse quadBroadcast or the quadSwap builtins.
        Operation::Quad(_) => Err("WGSL quad operations are not available".into()),
        Operation::Elect => Err("WGSL has no subgroupElect".into()),
        Operation::Vote(VoteOp::AllEqual) => Err("WGSL has no subgroupAllEqual".into()),
        Operation::Arithmetic { op, order }
            if order != ScanOrder::Reduce && !matches!(op, ReduceOp::Add | ReduceOp::Mul) =>
        {
            Err(format!("WGSL has no {} {} scan", order.name(), op.name()))
        }
        _ => Ok(()),
    }
}

pub(super) fn emit(module: &ShaderModule) -> Result<String, CodegenError> {
    let mut writer = Writer {
        module,
        out: String::new(),
        indent: 0,
    };
    writer.declarations()?;
    writer.helpers()?;
    writer.entry_point()?;
    Ok(writer.out)
}

fn unsupported(what: impl std::fmt::Display) -> CodegenError {
    CodegenError::Unsupported(format!("WGSL cannot express {what}"))
}

fn data_type(format: Format) -> Result<String, CodegenError> {
    format.wgsl_type().ok_or_else(|| unsupported(format))
}

/// Buffer element type; booleans are stored as `u32`.
fn storage_type(format: Format) -> Result<String, CodegenError> {
    if format.scalar().is_bool() {
        data_type(format.with_scalar(ScalarType::U32))
    } else {
        data_type(format)
    }
}

fn literal(scalar: Scalar) -> Result<String, CodegenError> {
    Ok(match scalar {
        Scalar::I32(i32::MIN) => "bitcast<i32>(0x80000000u)".into(),
        Scalar::I32(v) if v < 0 => format!("({v}i)"),
        Scalar::I32(v) => format!("{v}i"),
        Scalar::U32(v) => format!("{v}u"),
        Scalar::F32(v) if v.is_nan() => return Err(unsupported("NaN constants")),
        // No infinite constants either; inputs are finite, so the largest
        // finite float is still an identity for min and max.
        Scalar::F32(v) if v.is_infinite() => literal(Scalar::F32(f32::MAX.copysign(v)))?,
        Scalar::F32(v) if v < 0.0 => format!("({v:?}f)"),
        Scalar::F32(v) => format!("{v:?}f"),
        Scalar::Bool(v) => v.to_string(),
        Scalar::I64(_) | Scalar::U64(_) | Scalar::F64(_) => {
            return Err(unsupported(scalar.scalar_type().name()));
        }
    })
}

fn ty(ty: Ty) -> Result<String, CodegenError> {
    match ty {
        Ty::Data(format) => data_type(format),
        Ty::U32 => Ok("u32".into()),
        Ty::Bool => Ok("bool".into()),
        Ty::Ballot => Ok("vec4<u32>".into()),
    }
}

fn binop(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Rem => "%",
        BinOp::Shr => ">>",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Eq => "==",
        BinOp::And => "&&",
        BinOp::Or => "||",
    }
}

fn combine(op: ReduceOp, format: Format, a: &str, b: &str) -> String {
    let boolean = format.scalar().is_bool();
    match op {
        ReduceOp::Add => format!("({a} + {b})"),
        ReduceOp::Mul => format!("({a} * {b})"),
        ReduceOp::Min if boolean => format!("({a} & {b})"),
        ReduceOp::Max if boolean => format!("({a} | {b})"),
        ReduceOp::Min => format!("min({a}, {b})"),
        ReduceOp::Max => format!("max({a}, {b})"),
        ReduceOp::And => format!("({a} & {b})"),
        ReduceOp::Or => format!("({a} | {b})"),
        ReduceOp::Xor if boolean => format!("({a} != {b})"),
        ReduceOp::Xor => format!("({a} ^ {b})"),
    }
}

const HELPERS: &str = "\
fn ballot_bit(ballot: vec4<u32>, lane: u32) -> bool {
    return ((ballot[lane / 32u] >> (lane % 32u)) & 1u) != 0u;
}

fn ballot_count(ballot: vec4<u32>) -> u32 {
    return countOneBits(ballot.x) + countOneBits(ballot.y) + countOneBits(ballot.z) + countOneBits(ballot.w);
}

fn ballot_lowest(ballot: vec4<u32>) -> u32 {
    for (var word = 0u; word < 4u; word++) {
        if (ballot[word] != 0u) {
            return word * 32u + firstTrailingBit(ballot[word]);
        }
    }
    return 0xffffffffu;
}
";

struct Writer<'m> {
    module: &'m ShaderModule,
    out: String,
    indent: usize,
}

impl Writer<'_> {
    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn stage(&self) -> ShaderStage {
        self.module.stage
    }

    fn input(&mut self, decl: &InputDecl) -> Result<(), CodegenError> {
        let (name, ty) = match decl.input {
            Input::Data => ("data", storage_type(decl.format)?),
            Input::Aux => ("aux", "u32".to_string()),
        };
        self.line(format!(
            "@group(0) @binding({}) var<storage, read> {name}: array<{ty}>;",
            decl.binding
        ));
        Ok(())
    }

    fn declarations(&mut self) -> Result<(), CodegenError> {
        let module = self.module;
        for decl in &module.inputs {
            self.input(decl)?;
        }
        if let Some(ResultSink::Buffer { binding }) = module.sink {
            self.line(format!(
                "@group(0) @binding({binding}) var<storage, read_write> results: array<u32>;"
            ));
        }
        if let Some(outputs) = module.value_outputs {
            self.line(format!(
                "@group(0) @binding({}) var<storage, read_write> values: array<{}>;",
                outputs.values_binding,
                storage_type(outputs.format)?
            ));
            self.line(format!(
                "@group(0) @binding({}) var<storage, read_write> records: array<vec4<u32>>;",
                outputs.records_binding
            ));
        }
        if self.stage() == ShaderStage::Vertex {
            self.line("struct VertexOutput {");
            self.line("    @builtin(position) position: vec4<f32>,");
            if module.varying_out.is_some() {
                self.line("    @location(0) @interpolate(flat) result: u32,");
            }
            self.line("}");
        }
        Ok(())
    }

    fn helpers(&mut self) -> Result<(), CodegenError> {
        let module = self.module;
        if module.uses_subgroups() {
            self.out.push_str(HELPERS);
        }
        let Some(format) = module.format.filter(|f| f.scalar().is_float()) else {
            return Ok(());
        };
        let mut epsilon = None;
        module.any_expr(|e| {
            if let Expr::Equal { epsilon: Some(eps), .. } = e {
                epsilon = Some(*eps);
            }
            false
        });
        if let Some(Epsilon { absolute, relative }) = epsilon {
            let t = data_type(format)?;
            let abs = literal(Scalar::F32(absolute as f32))?;
            let rel = literal(Scalar::F32(relative as f32))?;
            let close = format!("abs(a - b) <= max({t}({abs}), {rel} * max(abs(a), abs(b)))");
            self.line(format!("fn close_value(a: {t}, b: {t}) -> bool {{"));
            if format.is_vector() {
                self.line(format!("    return all({close});"));
            } else {
                self.line(format!("    return {close};"));
            }
            self.line("}");
        }
        Ok(())
    }

    fn entry_point(&mut self) -> Result<(), CodegenError> {
        let module = self.module;
        let subgroup_builtins = [
            "@builtin(subgroup_invocation_id) subgroup_invocation_id: u32",
            "@builtin(subgroup_size) subgroup_size: u32",
        ];
        match module.io {
            StageIo::Compute { local_size } => {
                let [x, y, z] = Dialect::Wgsl.declared_local_size(local_size);
                self.line(format!("@compute @workgroup_size({x}, {y}, {z})"));
                self.line("fn main(");
                for param in [
                    "@builtin(global_invocation_id) global_id: vec3<u32>",
                    "@builtin(num_workgroups) num_workgroups: vec3<u32>",
                    "@builtin(workgroup_id) workgroup_id: vec3<u32>",
                    "@builtin(subgroup_id) subgroup_id: u32",
                    "@builtin(num_subgroups) num_subgroups: u32",
                ]
                .into_iter()
                .chain(subgroup_builtins)
                {
                    self.line(format!("    {param},"));
                }
                self.line(") {");
                self.indent += 1;
                self.stmts(&module.body)?;
                self.indent -= 1;
                self.line("}");
            }
            StageIo::Fragment => {
                let mut params = vec!["@builtin(position) position: vec4<f32>"];
                if module.uses_subgroups() {
                    params.extend(subgroup_builtins);
                }
                if module.varying_in.is_some() {
                    params.push("@location(0) @interpolate(flat) in_result: u32");
                }
                self.line("@fragment");
                self.line(format!("fn main({}) -> @location(0) u32 {{", params.join(", ")));
                self.indent += 1;
                self.line("var out_color: u32 = 0u;");
                self.stmts(&module.body)?;
                self.line("return out_color;");
                self.indent -= 1;
                self.line("}");
            }
            StageIo::Vertex if !module.uses_subgroups() => {
                self.line("@vertex");
                self.line("fn main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {");
                self.indent += 1;
                self.line("var vertex_out: VertexOutput;");
                self.stmts(&module.body)?;
                self.line("return vertex_out;");
                self.indent -= 1;
                self.line("}");
            }
            _ => return Err(unsupported(format!("subgroup operations in {}", self.stage()))),
        }
        Ok(())
    }

    fn builtin(&self, builtin: Builtin) -> Result<String, CodegenError> {
        Ok(match (builtin, &self.module.io) {
            (Builtin::SubgroupSize, _) => "subgroup_size".into(),
            (Builtin::SubgroupInvocationId, _) => "subgroup_invocation_id".into(),
            (Builtin::SubgroupId, _) => "subgroup_id".into(),
            (Builtin::NumSubgroups, _) => "num_subgroups".into(),
            (Builtin::LinearInvocationIndex, StageIo::Compute { local_size }) => {
                let [x, y, _] = Dialect::Wgsl.declared_local_size(*local_size);
                format!(
                    "(global_id.x + global_id.y * num_workgroups.x * {x}u \
                     + global_id.z * num_workgroups.x * {x}u * num_workgroups.y * {y}u)"
                )
            }
            (Builtin::LinearWorkgroupIndex, StageIo::Compute { .. }) => {
                "(workgroup_id.x + workgroup_id.y * num_workgroups.x \
                 + workgroup_id.z * num_workgroups.x * num_workgroups.y)"
                    .into()
            }
            (Builtin::VertexIndex, _) => "vertex_index".into(),
            (Builtin::FragCoordX, _) => "u32(position.x)".into(),
            (builtin, _) => return Err(unsupported(format!("{builtin:?} in {}", self.stage()))),
        })
    }

    fn call(&self, call: &Call) -> Result<String, CodegenError> {
        Ok(match call {
            Call::Ballot(p) => format!("subgroupBallot({})", self.expr(p)?),
            Call::All(p) => format!("subgroupAll({})", self.expr(p)?),
            Call::Any(p) => format!("subgroupAny({})", self.expr(p)?),
            Call::Reduce { op, order, value }
                if *order == ScanOrder::Reduce || matches!(op, ReduceOp::Add | ReduceOp::Mul) =>
            {
                format!(
                    "subgroup{}{}({})",
                    order.builtin_infix(),
                    op.builtin_suffix(),
                    self.expr(value)?
                )
            }
            Call::Shuffle { op, value, arg } => {
                let name = match op {
                    ShuffleOp::Shuffle => "subgroupShuffle",
                    ShuffleOp::Xor => "subgroupShuffleXor",
                    ShuffleOp::Up => "subgroupShuffleUp",
                    ShuffleOp::Down => "subgroupShuffleDown",
                };
                format!("{name}({}, {})", self.expr(value)?, self.expr(arg)?)
            }
            Call::Broadcast { value, lane } => {
                format!("subgroupBroadcast({}, {lane}u)", self.expr(value)?)
            }
            Call::BroadcastFirst(value) => format!("subgroupBroadcastFirst({})", self.expr(value)?),
            Call::Elect
            | Call::AllEqual(_)
            | Call::Reduce { .. }
            | Call::Quad { .. }
            | Call::Clustered { .. }
            | Call::Partition(_)
            | Call::Partitioned { .. } => return Err(unsupported(format!("{call:?}"))),
        })
    }

    fn expr(&self, expr: &Expr) -> Result<String, CodegenError> {
        Ok(match expr {
            Expr::U32(v) => format!("{v}u"),
            Expr::Bool(v) => v.to_string(),
            Expr::Local(name) => (*name).to_string(),
            Expr::Builtin(b) => self.builtin(*b)?,
            Expr::Load {
                input: Input::Aux,
                index,
                ..
            } => format!("aux[{}]", self.expr(index)?),
            Expr::Load {
                input: Input::Data,
                format,
                index,
            } => {
                let raw = format!("data[{}]", self.expr(index)?);
                match (format.scalar(), format.components()) {
                    (ScalarType::Bool, 1) => format!("({raw} != 0u)"),
                    (ScalarType::Bool, n) => format!("({raw} != vec{n}<u32>(0u))"),
                    _ => raw,
                }
            }
            Expr::Binary(op, a, b) => format!("({} {} {})", self.expr(a)?, binop(*op), self.expr(b)?),
            Expr::Not(a) => format!("(!{})", self.expr(a)?),
            Expr::Select {
                cond,
                accept,
                reject,
            } => format!(
                "select({}, {}, {})",
                self.expr(reject)?,
                self.expr(accept)?,
                self.expr(cond)?
            ),
            Expr::Identity(op, format) => {
                let value = reference::identity(*op, *format);
                let component = literal(value.components()[0])?;
                if format.is_vector() {
                    format!("{}({component})", data_type(*format)?)
                } else {
                    component
                }
            }
            Expr::Combine(op, format, a, b) => combine(*op, *format, &self.expr(a)?, &self.expr(b)?),
            Expr::Equal {
                format,
                lhs,
                rhs,
                epsilon,
            } => {
                let (a, b) = (self.expr(lhs)?, self.expr(rhs)?);
                match epsilon {
                    Some(_) => format!("close_value({a}, {b})"),
                    None if format.is_vector() => format!("all({a} == {b})"),
                    None => format!("({a} == {b})"),
                }
            }
            Expr::Subgroup(call) => self.call(call)?,
            Expr::BallotBit { ballot, index } => {
                format!("ballot_bit({}, {})", self.expr(ballot)?, self.expr(index)?)
            }
            Expr::BallotCount(b) => format!("ballot_count({})", self.expr(b)?),
            Expr::BallotLowest(b) => format!("ballot_lowest({})", self.expr(b)?),
            Expr::LaneBallot(_) => return Err(unsupported("single-invocation ballots")),
            Expr::Record(parts) => {
                let parts = parts
                    .iter()
                    .map(|p| self.expr(p))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("vec4<u32>({})", parts.join(", "))
            }
        })
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> Result<(), CodegenError> {
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn block(&mut self, head: String, body: &[Stmt]) -> Result<(), CodegenError> {
        self.line(head);
        self.indent += 1;
        self.stmts(body)?;
        self.indent -= 1;
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Let { name, ty: t, value } => {
                let line = format!("var {name}: {} = {};", ty(*t)?, self.expr(value)?);
                self.line(line);
            }
            Stmt::Assign { name, value } => {
                let line = format!("{name} = {};", self.expr(value)?);
                self.line(line);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let head = format!("if ({}) {{", self.expr(cond)?);
                self.block(head, then)?;
                if !otherwise.is_empty() {
                    self.block("} else {".into(), otherwise)?;
                }
                self.line("}");
            }
            Stmt::For { index, end, body } => {
                let head = format!(
                    "for (var {index}: u32 = 0u; {index} < {}; {index}++) {{",
                    self.expr(end)?
                );
                self.block(head, body)?;
                self.line("}");
            }
            Stmt::StoreResult { sink, index, value } => {
                let value = self.expr(value)?;
                let line = match sink {
                    ResultSink::Buffer { .. } => format!("results[{}] = {value};", self.expr(index)?),
                    ResultSink::Attachment => format!("out_color = {value};"),
                    ResultSink::Varying => format!("vertex_out.result = {value};"),
                };
                self.line(line);
            }
            Stmt::StoreValue {
                format,
                index,
                value,
            } => {
                let value = self.expr(value)?;
                let stored = match (format.scalar(), format.components()) {
                    (ScalarType::Bool, 1) => format!("select(0u, 1u, {value})"),
                    (ScalarType::Bool, n) => {
                        format!("select(vec{n}<u32>(0u), vec{n}<u32>(1u), {value})")
                    }
                    _ => value,
                };
                let line = format!("values[{}] = {stored};", self.expr(index)?);
                self.line(line);
            }
            Stmt::StoreRecord { index, value } => {
                let line = format!("records[{}] = {};", self.expr(index)?, self.expr(value)?);
                self.line(line);
            }
            Stmt::ForwardVarying => {
                let source = if self.module.varying_in.is_some() {
                    "in_result"
                } else {
                    "0u"
                };
                let line = match self.stage() {
                    ShaderStage::Fragment => format!("out_color = {source};"),
                    _ => format!("vertex_out.result = {source};"),
                };
                self.line(line);
            }
            Stmt::PointPosition { pixel, width } => {
                let line = format!(
                    "vertex_out.position = vec4<f32>((f32({}) + 0.5) / {width}.0 * 2.0 - 1.0, 0.0, 0.0, 1.0);",
                    self.expr(pixel)?
                );
                self.line(line);
            }
            // Points always cover a single pixel.
            Stmt::PointSize => {}
            Stmt::ForwardPosition | Stmt::TessLevels | Stmt::EmitVertex | Stmt::EndPrimitive => {
                return Err(unsupported(format!("{stmt:?}")));
            }
        }
        Ok(())
    }
}
