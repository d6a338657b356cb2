//! GLSL backend, using the `GL_KHR_shader_subgroup_*` extensions.

use super::ir::{
    BinOp, Builtin, Call, Expr, Input, InputDecl, ResultSink, ShaderModule, StageIo, Stmt, Ty,
    Varying,
};
use super::{CodegenError, GlslProfile};
use crate::case::CaseDefinition;
use crate::config::Epsilon;
use crate::features::SubgroupFeatures;
use crate::format::{Format, ScalarType};
use crate::input::InputKind;
use crate::op::{QuadOp, ReduceOp, ShuffleOp};
use crate::reference;
use crate::stage::ShaderStage;
use crate::value::Scalar;

pub(super) fn supports(case: &CaseDefinition, profile: GlslProfile) -> Result<(), String> {
    if profile == GlslProfile::Es && case.format().scalar() == ScalarType::F64 {
        return Err("GLSL ES has no double precision".into());
    }
    Ok(())
}

pub(super) fn emit(module: &ShaderModule, profile: GlslProfile) -> Result<String, CodegenError> {
    let mut writer = Writer {
        module,
        profile,
        out: String::new(),
        indent: 0,
    };
    writer.header();
    writer.declarations();
    writer.helpers()?;
    writer.line("void main() {");
    writer.indent += 1;
    writer.stmts(&module.body)?;
    writer.indent -= 1;
    writer.line("}");
    Ok(writer.out)
}

fn extension(feature: SubgroupFeatures) -> &'static str {
    match feature {
        SubgroupFeatures::BASIC => "GL_KHR_shader_subgroup_basic",
        SubgroupFeatures::VOTE => "GL_KHR_shader_subgroup_vote",
        SubgroupFeatures::ARITHMETIC => "GL_KHR_shader_subgroup_arithmetic",
        SubgroupFeatures::BALLOT => "GL_KHR_shader_subgroup_ballot",
        SubgroupFeatures::SHUFFLE => "GL_KHR_shader_subgroup_shuffle",
        SubgroupFeatures::SHUFFLE_RELATIVE => "GL_KHR_shader_subgroup_shuffle_relative",
        SubgroupFeatures::CLUSTERED => "GL_KHR_shader_subgroup_clustered",
        SubgroupFeatures::QUAD => "GL_KHR_shader_subgroup_quad",
        SubgroupFeatures::PARTITIONED => "GL_NV_shader_subgroup_partitioned",
        _ => unreachable!("not a single feature: {feature:?}"),
    }
}

/// Source literal for one component.
fn literal(scalar: Scalar) -> String {
    match scalar {
        Scalar::I32(i32::MIN) => "int(0x80000000u)".into(),
        Scalar::I32(v) if v < 0 => format!("({v})"),
        Scalar::I32(v) => v.to_string(),
        Scalar::U32(v) => format!("{v}u"),
        Scalar::I64(i64::MIN) => "(-9223372036854775807l - 1l)".into(),
        Scalar::I64(v) if v < 0 => format!("({v}l)"),
        Scalar::I64(v) => format!("{v}l"),
        Scalar::U64(v) => format!("{v}ul"),
        Scalar::F32(v) if v.is_nan() => "uintBitsToFloat(0x7fc00000u)".into(),
        Scalar::F32(v) if v.is_infinite() => {
            format!("uintBitsToFloat({:#x}u)", v.to_bits())
        }
        Scalar::F32(v) if v < 0.0 => format!("({v:?})"),
        Scalar::F32(v) => format!("{v:?}"),
        Scalar::F64(v) if v.is_nan() || v.is_infinite() => {
            let bits = v.to_bits();
            format!(
                "packDouble2x32(uvec2({:#x}u, {:#x}u))",
                bits as u32,
                (bits >> 32) as u32
            )
        }
        Scalar::F64(v) if v < 0.0 => format!("({v:?}lf)"),
        Scalar::F64(v) => format!("{v:?}lf"),
        Scalar::Bool(v) => v.to_string(),
    }
}

fn ty(ty: Ty) -> String {
    match ty {
        Ty::Data(format) => format.glsl_type(),
        Ty::U32 => "uint".into(),
        Ty::Bool => "bool".into(),
        Ty::Ballot => "uvec4".into(),
    }
}

/// `bvecN(uvecN(a) OP uvecN(b))`, componentwise logic on boolean vectors.
fn bool_vector_op(format: Format, op: &str, a: &str, b: &str) -> String {
    let n = format.components();
    format!("bvec{n}(uvec{n}({a}) {op} uvec{n}({b}))")
}

/// Booleans have no min or max builtins; on them min is `and` and max `or`.
fn effective_op(op: ReduceOp, format: Format) -> ReduceOp {
    match op {
        ReduceOp::Min if format.scalar().is_bool() => ReduceOp::And,
        ReduceOp::Max if format.scalar().is_bool() => ReduceOp::Or,
        op => op,
    }
}

fn combine(op: ReduceOp, format: Format, a: &str, b: &str) -> String {
    let scalar = format.scalar();
    match effective_op(op, format) {
        ReduceOp::Add => format!("({a} + {b})"),
        ReduceOp::Mul => format!("({a} * {b})"),
        // min and max leave NaN handling undefined; a NaN operand yields the
        // other one.
        ReduceOp::Min if scalar.is_float() => {
            format!("mix(mix(min({a}, {b}), {a}, isnan({b})), {b}, isnan({a}))")
        }
        ReduceOp::Max if scalar.is_float() => {
            format!("mix(mix(max({a}, {b}), {a}, isnan({b})), {b}, isnan({a}))")
        }
        ReduceOp::Min => format!("min({a}, {b})"),
        ReduceOp::Max => format!("max({a}, {b})"),
        ReduceOp::And if scalar.is_bool() && format.is_vector() => bool_vector_op(format, "&", a, b),
        ReduceOp::And if scalar.is_bool() => format!("({a} && {b})"),
        ReduceOp::Or if scalar.is_bool() && format.is_vector() => bool_vector_op(format, "|", a, b),
        ReduceOp::Or if scalar.is_bool() => format!("({a} || {b})"),
        ReduceOp::Xor if scalar.is_bool() && format.is_vector() => format!("notEqual({a}, {b})"),
        ReduceOp::Xor if scalar.is_bool() => format!("({a} ^^ {b})"),
        ReduceOp::And => format!("({a} & {b})"),
        ReduceOp::Or => format!("({a} | {b})"),
        ReduceOp::Xor => format!("({a} ^ {b})"),
    }
}

fn identity(op: ReduceOp, format: Format) -> String {
    let value = reference::identity(op, format);
    let component = literal(value.components()[0]);
    if format.is_vector() {
        format!("{}({component})", format.glsl_type())
    } else {
        component
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

struct Writer<'m> {
    module: &'m ShaderModule,
    profile: GlslProfile,
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

    /// `layout(` qualifier prefix for a resource at `binding`.
    fn binding(&self, binding: u32, packing: &str) -> String {
        match self.profile {
            GlslProfile::Vulkan => format!("layout(set = 0, binding = {binding}, {packing})"),
            GlslProfile::Desktop | GlslProfile::Es => {
                format!("layout(binding = {binding}, {packing})")
            }
        }
    }

    fn header(&mut self) {
        match self.profile {
            GlslProfile::Vulkan | GlslProfile::Desktop => self.line("#version 450"),
            GlslProfile::Es => self.line("#version 320 es"),
        }
        for feature in self.module.features.iter() {
            self.line(format!("#extension {} : enable", extension(feature)));
        }
        let int64 = self
            .module
            .format
            .is_some_and(|f| matches!(f.scalar(), ScalarType::I64 | ScalarType::U64));
        if int64 {
            self.line("#extension GL_EXT_shader_explicit_arithmetic_types_int64 : enable");
            if self.module.uses_subgroups() {
                self.line("#extension GL_EXT_shader_subgroup_extended_types_int64 : enable");
            }
        }
        if self.profile == GlslProfile::Es {
            self.line("precision highp float;");
            self.line("precision highp int;");
        }
        match self.module.io {
            StageIo::Compute { local_size: [x, y, z] } => self.line(format!(
                "layout(local_size_x = {x}, local_size_y = {y}, local_size_z = {z}) in;"
            )),
            StageIo::TessControl => self.line("layout(vertices = 1) out;"),
            StageIo::TessEval { point_mode } => self.line(if point_mode {
                "layout(isolines, equal_spacing, point_mode) in;"
            } else {
                "layout(isolines, equal_spacing) in;"
            }),
            StageIo::Geometry { lines_in } => {
                self.line(if lines_in {
                    "layout(lines) in;"
                } else {
                    "layout(points) in;"
                });
                self.line("layout(points, max_vertices = 1) out;");
            }
            StageIo::Fragment => self.line("layout(location = 0) out uint outColor;"),
            StageIo::Vertex => {}
        }
    }

    fn input(&mut self, decl: &InputDecl) {
        let (block, member, ty) = match decl.input {
            Input::Data => ("Data", "data", decl.format.glsl_storage_type()),
            Input::Aux => ("Aux", "aux", "uint".to_string()),
        };
        let line = match decl.kind {
            InputKind::Buffer => format!(
                "{} readonly buffer {block} {{ {ty} {member}[]; }} {member}Block;",
                self.binding(decl.binding, "std430")
            ),
            InputKind::Uniform => format!(
                "{} uniform {block} {{ {ty} {member}[{}]; }} {member}Block;",
                self.binding(decl.binding, "std140"),
                decl.len
            ),
        };
        self.line(line);
    }

    fn declarations(&mut self) {
        let module = self.module;
        for decl in &module.inputs {
            self.input(decl);
        }
        if let Some(ResultSink::Buffer { binding }) = module.sink {
            let qualifier = self.binding(binding, "std430");
            self.line(format!(
                "{qualifier} buffer Result{binding} {{ uint results[]; }} result{binding};"
            ));
        }
        if let Some(outputs) = module.value_outputs {
            let values = self.binding(outputs.values_binding, "std430");
            let records = self.binding(outputs.records_binding, "std430");
            self.line(format!(
                "{values} buffer Values {{ {} values[]; }} valuesBlock;",
                outputs.format.glsl_storage_type()
            ));
            self.line(format!(
                "{records} buffer Records {{ uvec4 records[]; }} recordsBlock;"
            ));
        }
        if let Some(varying) = module.varying_in {
            self.line(match (self.stage(), varying) {
                (_, Varying::Patch) => "layout(location = 0) patch in uint inResult;",
                (ShaderStage::Fragment, Varying::Flat) => "layout(location = 0) flat in uint inResult;",
                (_, Varying::Flat) => "layout(location = 0) in uint inResult[];",
            });
        }
        if let Some(varying) = module.varying_out {
            self.line(match (self.stage(), varying) {
                (_, Varying::Patch) => "layout(location = 0) patch out uint outResult;",
                (ShaderStage::TessControl, Varying::Flat) => "layout(location = 0) out uint outResult[];",
                (_, Varying::Flat) => "layout(location = 0) flat out uint outResult;",
            });
        }
    }

    fn helpers(&mut self) -> Result<(), CodegenError> {
        let module = self.module;
        if module.any_expr(|e| matches!(e, Expr::LaneBallot(_))) {
            self.line("uvec4 laneBallot(uint lane) {");
            self.line("    uvec4 ballot = uvec4(0u);");
            self.line("    ballot[lane / 32u] = 1u << (lane % 32u);");
            self.line("    return ballot;");
            self.line("}");
        }
        let Some(format) = module.format.filter(|f| f.scalar().is_float()) else {
            return Ok(());
        };
        let mut epsilon = None;
        let mut foreign = None;
        module.any_expr(|e| {
            if let Expr::Equal { format: f, epsilon: eps, .. } = e {
                if *f != format {
                    foreign = Some(*f);
                }
                epsilon = epsilon.or(*eps);
            }
            false
        });
        if let Some(f) = foreign {
            return Err(CodegenError::Internal(format!(
                "{f} comparison in a {format} module"
            )));
        }
        let t = format.glsl_type();
        let n = format.components();
        let both_nan = if format.is_vector() {
            format!("(uvec{n}(isnan(a)) & uvec{n}(isnan(b)))")
        } else {
            "(isnan(a) && isnan(b))".to_string()
        };
        self.line(format!("bool sameValue({t} a, {t} b) {{"));
        self.line(if format.is_vector() {
            format!("    return all(bvec{n}(uvec{n}(equal(a, b)) | {both_nan}));")
        } else {
            format!("    return a == b || {both_nan};")
        });
        self.line("}");
        if let Some(Epsilon { absolute, relative }) = epsilon {
            let (abs, rel) = match format.scalar() {
                ScalarType::F64 => (literal(Scalar::F64(absolute)), literal(Scalar::F64(relative))),
                _ => (
                    literal(Scalar::F32(absolute as f32)),
                    literal(Scalar::F32(relative as f32)),
                ),
            };
            let bound = format!("max({t}({abs}), {rel} * max(abs(a), abs(b)))");
            self.line(format!("bool closeValue({t} a, {t} b) {{"));
            self.line(if format.is_vector() {
                format!(
                    "    return all(bvec{n}(uvec{n}(lessThanEqual(abs(a - b), {bound})) | {both_nan}));"
                )
            } else {
                format!("    return abs(a - b) <= {bound} || {both_nan};")
            });
            self.line("}");
        }
        Ok(())
    }

    fn builtin(&self, builtin: Builtin) -> &'static str {
        match builtin {
            Builtin::SubgroupSize => "gl_SubgroupSize",
            Builtin::SubgroupInvocationId => "gl_SubgroupInvocationID",
            Builtin::SubgroupId => "gl_SubgroupID",
            Builtin::NumSubgroups => "gl_NumSubgroups",
            Builtin::LinearInvocationIndex => {
                "(gl_GlobalInvocationID.x \
                 + gl_GlobalInvocationID.y * gl_NumWorkGroups.x * gl_WorkGroupSize.x \
                 + gl_GlobalInvocationID.z * gl_NumWorkGroups.x * gl_WorkGroupSize.x \
                 * gl_NumWorkGroups.y * gl_WorkGroupSize.y)"
            }
            Builtin::LinearWorkgroupIndex => {
                "(gl_WorkGroupID.x + gl_WorkGroupID.y * gl_NumWorkGroups.x \
                 + gl_WorkGroupID.z * gl_NumWorkGroups.x * gl_NumWorkGroups.y)"
            }
            Builtin::VertexIndex => match self.profile {
                GlslProfile::Vulkan => "uint(gl_VertexIndex)",
                GlslProfile::Desktop | GlslProfile::Es => "uint(gl_VertexID)",
            },
            Builtin::PrimitiveId if self.stage() == ShaderStage::Geometry => "uint(gl_PrimitiveIDIn)",
            Builtin::PrimitiveId => "uint(gl_PrimitiveID)",
            Builtin::InvocationId => "uint(gl_InvocationID)",
            Builtin::TessCoordEnd => "uint(gl_TessCoord.x + 0.5)",
            Builtin::FragCoordX => "uint(gl_FragCoord.x)",
        }
    }

    fn call(&self, call: &Call) -> Result<String, CodegenError> {
        let format = self.module.format.unwrap_or(Format::u32());
        Ok(match call {
            Call::Elect => "subgroupElect()".into(),
            Call::Ballot(p) => format!("subgroupBallot({})", self.expr(p)?),
            Call::All(p) => format!("subgroupAll({})", self.expr(p)?),
            Call::Any(p) => format!("subgroupAny({})", self.expr(p)?),
            Call::AllEqual(v) => format!("subgroupAllEqual({})", self.expr(v)?),
            Call::Reduce { op, order, value } => format!(
                "subgroup{}{}({})",
                order.builtin_infix(),
                effective_op(*op, format).builtin_suffix(),
                self.expr(value)?
            ),
            Call::Clustered {
                op,
                value,
                cluster_size,
            } => format!(
                "subgroupClustered{}({}, {cluster_size}u)",
                effective_op(*op, format).builtin_suffix(),
                self.expr(value)?
            ),
            Call::Partition(label) => format!("subgroupPartitionNV({})", self.expr(label)?),
            Call::Partitioned {
                op,
                order,
                value,
                ballot,
            } => format!(
                "subgroupPartitioned{}{}NV({}, {})",
                order.builtin_infix(),
                effective_op(*op, format).builtin_suffix(),
                self.expr(value)?,
                self.expr(ballot)?
            ),
            Call::Quad { op, value } => {
                let value = self.expr(value)?;
                match op {
                    QuadOp::Broadcast(lane) => format!("subgroupQuadBroadcast({value}, {lane}u)"),
                    QuadOp::SwapHorizontal => format!("subgroupQuadSwapHorizontal({value})"),
                    QuadOp::SwapVertical => format!("subgroupQuadSwapVertical({value})"),
                    QuadOp::SwapDiagonal => format!("subgroupQuadSwapDiagonal({value})"),
                }
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
        })
    }

    fn expr(&self, expr: &Expr) -> Result<String, CodegenError> {
        Ok(match expr {
            Expr::U32(v) => format!("{v}u"),
            Expr::Bool(v) => v.to_string(),
            Expr::Local(name) => (*name).to_string(),
            Expr::Builtin(b) => self.builtin(*b).to_string(),
            Expr::Load {
                input: Input::Aux,
                index,
                ..
            } => format!("auxBlock.aux[{}]", self.expr(index)?),
            Expr::Load {
                input: Input::Data,
                format,
                index,
            } => {
                let raw = format!("dataBlock.data[{}]", self.expr(index)?);
                match (format.scalar(), format.components()) {
                    (ScalarType::Bool, 1) => format!("bool({raw})"),
                    (ScalarType::Bool, n) => format!("bvec{n}({raw})"),
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
                "({} ? {} : {})",
                self.expr(cond)?,
                self.expr(accept)?,
                self.expr(reject)?
            ),
            Expr::Identity(op, format) => identity(effective_op(*op, *format), *format),
            Expr::Combine(op, format, a, b) => combine(*op, *format, &self.expr(a)?, &self.expr(b)?),
            Expr::Equal {
                format,
                lhs,
                rhs,
                epsilon,
            } => {
                let (a, b) = (self.expr(lhs)?, self.expr(rhs)?);
                match (format.scalar().is_float(), epsilon) {
                    (true, Some(_)) => format!("closeValue({a}, {b})"),
                    (true, None) => format!("sameValue({a}, {b})"),
                    (false, _) => format!("({a} == {b})"),
                }
            }
            Expr::Subgroup(call) => self.call(call)?,
            Expr::BallotBit { ballot, index } => format!(
                "subgroupBallotBitExtract({}, {})",
                self.expr(ballot)?,
                self.expr(index)?
            ),
            Expr::BallotCount(b) => format!("subgroupBallotBitCount({})", self.expr(b)?),
            Expr::BallotLowest(b) => format!("subgroupBallotFindLSB({})", self.expr(b)?),
            Expr::LaneBallot(lane) => format!("laneBallot({})", self.expr(lane)?),
            Expr::Record(parts) => {
                let parts = parts
                    .iter()
                    .map(|p| self.expr(p))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("uvec4({})", parts.join(", "))
            }
        })
    }

    fn varying_in(&self) -> &'static str {
        match (self.stage(), self.module.varying_in) {
            (_, None) => "0u",
            (ShaderStage::TessControl, _) => "inResult[gl_InvocationID]",
            (_, Some(Varying::Patch)) | (ShaderStage::Fragment, _) => "inResult",
            (_, Some(Varying::Flat)) => "inResult[0]",
        }
    }

    fn varying_out(&self) -> &'static str {
        match (self.stage(), self.module.varying_out) {
            (ShaderStage::TessControl, Some(Varying::Flat)) => "outResult[gl_InvocationID]",
            _ => "outResult",
        }
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
                let line = format!("{} {name} = {};", ty(*t), self.expr(value)?);
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
                if otherwise.is_empty() {
                    self.line("}");
                } else {
                    self.block("} else {".into(), otherwise)?;
                    self.line("}");
                }
            }
            Stmt::For { index, end, body } => {
                let head = format!(
                    "for (uint {index} = 0u; {index} < {}; {index}++) {{",
                    self.expr(end)?
                );
                self.block(head, body)?;
                self.line("}");
            }
            Stmt::StoreResult { sink, index, value } => {
                let value = self.expr(value)?;
                let line = match sink {
                    ResultSink::Buffer { binding } => {
                        format!("result{binding}.results[{}] = {value};", self.expr(index)?)
                    }
                    ResultSink::Varying => format!("{} = {value};", self.varying_out()),
                    ResultSink::Attachment => format!("outColor = {value};"),
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
                    (ScalarType::Bool, 1) => format!("uint({value})"),
                    (ScalarType::Bool, n) => format!("uvec{n}({value})"),
                    _ => value,
                };
                let line = format!("valuesBlock.values[{}] = {stored};", self.expr(index)?);
                self.line(line);
            }
            Stmt::StoreRecord { index, value } => {
                let line = format!(
                    "recordsBlock.records[{}] = {};",
                    self.expr(index)?,
                    self.expr(value)?
                );
                self.line(line);
            }
            Stmt::ForwardVarying => {
                let target = if self.stage() == ShaderStage::Fragment {
                    "outColor"
                } else {
                    self.varying_out()
                };
                let line = format!("{target} = {};", self.varying_in());
                self.line(line);
            }
            Stmt::PointPosition { pixel, width } => {
                let line = format!(
                    "gl_Position = vec4((float({}) + 0.5) / {width}.0 * 2.0 - 1.0, 0.0, 0.0, 1.0);",
                    self.expr(pixel)?
                );
                self.line(line);
            }
            Stmt::PointSize => self.line("gl_PointSize = 1.0;"),
            Stmt::ForwardPosition => {
                if self.stage() == ShaderStage::TessControl {
                    self.line(
                        "gl_out[gl_InvocationID].gl_Position = gl_in[gl_InvocationID].gl_Position;",
                    );
                } else {
                    self.line("gl_Position = gl_in[0].gl_Position;");
                }
            }
            Stmt::TessLevels => {
                self.line("gl_TessLevelOuter[0] = 1.0;");
                self.line("gl_TessLevelOuter[1] = 1.0;");
            }
            Stmt::EmitVertex => self.line("EmitVertex();"),
            Stmt::EndPrimitive => self.line("EndPrimitive();"),
        }
        Ok(())
    }
}
