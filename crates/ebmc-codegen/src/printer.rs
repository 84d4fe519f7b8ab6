//! Pseudo-code printer: the default code-generation visitor.
//!
//! Renders a module as readable text: declarations with resolved names,
//! nested blocks with indentation, I/O statements with size and endian
//! annotations. Declaration references print as names, so the walk stays on
//! the ownership-like spine and never cycles through back-references.

use ebmc_core::{
    BinaryOp, Endian, ExprOp, IoData, Module, SizeUnit, SizeValue, StatementBody, StatementRef,
    TypeBody, UnaryOp,
};

use crate::context::{ExpressionCtx, Phase, StatementCtx, TypeCtx};
use crate::dispatch::{visit_expression, visit_statement, visit_type};
use crate::error::{VisitError, VisitResult};
use crate::visitor::Visitor;

#[derive(Default)]
pub struct Printer {
    indent: usize,
}

/// Renders the whole module starting at its entry point.
pub fn dump_code(module: &Module) -> VisitResult<String> {
    let entry = module
        .entry_point()
        .ok_or(VisitError::Missing { what: "entry point", at: ebmc_core::ENTRY_ID })?;
    let mut printer = Printer::default();
    visit_statement(&mut printer, module, entry.id)
}

fn binary_op_str(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Equal => "==",
        BinaryOp::NotEqual => "!=",
        BinaryOp::Less => "<",
        BinaryOp::LessOrEq => "<=",
        BinaryOp::Greater => ">",
        BinaryOp::GreaterOrEq => ">=",
        BinaryOp::LogicalAnd => "&&",
        BinaryOp::LogicalOr => "||",
        BinaryOp::LeftShift => "<<",
        BinaryOp::RightShift => ">>",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
    }
}

fn endian_str(endian: Endian) -> &'static str {
    match endian {
        Endian::Unspec => "unspec",
        Endian::Little => "le",
        Endian::Big => "be",
        Endian::Native => "native",
        Endian::Dynamic => "dynamic",
    }
}

impl Printer {
    fn pad(&self) -> String {
        "  ".repeat(self.indent)
    }

    /// The display name of a declaration statement.
    fn decl_name(&self, module: &Module, decl: StatementRef) -> String {
        let ident = match module.get_statement(decl).map(|e| &e.body) {
            Some(StatementBody::VariableDecl(d)) => d.name,
            Some(StatementBody::ParameterDecl(d)) => d.name,
            Some(StatementBody::FieldDecl(d)) => d.name,
            Some(StatementBody::CompositeFieldDecl(d)) => d.name,
            Some(StatementBody::StructDecl(d)) => d.name,
            Some(StatementBody::EnumDecl(d)) => d.name,
            Some(StatementBody::EnumMemberDecl(d)) => d.name,
            Some(StatementBody::FunctionDecl(d)) => d.name,
            Some(StatementBody::PropertyDecl(d)) => d.name,
            _ => return format!("stmt{decl}"),
        };
        module.identifier_or(ident, decl.into(), "tmp")
    }

    fn expr(&mut self, module: &Module, r: ebmc_core::ExpressionRef) -> VisitResult<String> {
        if r.is_nil() {
            return Ok(String::new());
        }
        visit_expression(self, module, r)
    }

    fn stmt(&mut self, module: &Module, r: StatementRef) -> VisitResult<String> {
        if r.is_nil() {
            return Ok(String::new());
        }
        visit_statement(self, module, r)
    }

    fn ty(&mut self, module: &Module, r: ebmc_core::TypeRef) -> VisitResult<String> {
        if r.is_nil() {
            return Ok("_".into());
        }
        visit_type(self, module, r)
    }

    fn nested(&mut self, module: &Module, r: StatementRef) -> VisitResult<String> {
        self.indent += 1;
        let out = self.stmt(module, r);
        self.indent -= 1;
        out
    }

    fn io_summary(&mut self, module: &Module, io: &IoData, verb: &str) -> VisitResult<String> {
        let target = self.expr(module, io.target)?;
        let ty = self.ty(module, io.data_type)?;
        let size = match (&io.size.value, io.size.unit) {
            (SizeValue::Fixed { size }, unit) => format!("{size} {unit:?}"),
            (SizeValue::Dynamic { size_expr }, unit) => {
                format!("{} {unit:?}", self.expr(module, *size_expr)?)
            }
            (SizeValue::None, SizeUnit::Dynamic) => "dynamic".into(),
            (SizeValue::None, unit) => format!("{unit:?}"),
        };
        let verb = if io.attribute.peek { format!("peek-{verb}") } else { verb.to_string() };
        let mut line = format!(
            "{}{verb} {target}: {ty} [{size}, {}]\n",
            self.pad(),
            endian_str(io.attribute.endian)
        );
        if !io.lowered_statement.is_nil() {
            line.push_str(&format!("{}lowered:\n", self.pad()));
            line.push_str(&self.nested(module, io.lowered_statement)?);
        }
        Ok(line)
    }
}

impl Visitor for Printer {
    type Output = String;

    fn merge(&mut self, acc: &mut String, item: String) {
        acc.push_str(&item);
    }

    fn statement_hook(
        &mut self,
        phase: Phase,
        ctx: &StatementCtx<'_>,
    ) -> VisitResult<String> {
        if phase != Phase::Main {
            return Err(VisitError::Pass);
        }
        let module = ctx.module;
        let out = match ctx.body {
            StatementBody::ProgramDecl { container } => {
                let mut out = String::new();
                for child in container {
                    out.push_str(&self.stmt(module, *child)?);
                }
                out
            }
            StatementBody::Block { container } => {
                let mut out = format!("{}{{\n", self.pad());
                self.indent += 1;
                for child in container {
                    let piece = self.stmt(module, *child)?;
                    out.push_str(&piece);
                }
                self.indent -= 1;
                out.push_str(&format!("{}}}\n", self.pad()));
                out
            }
            StatementBody::IfStatement { condition, then_block, else_block } => {
                let cond = self.expr(module, *condition)?;
                let mut out = format!("{}if {cond}\n", self.pad());
                out.push_str(&self.nested(module, *then_block)?);
                if !else_block.is_nil() {
                    out.push_str(&format!("{}else\n", self.pad()));
                    out.push_str(&self.nested(module, *else_block)?);
                }
                out
            }
            StatementBody::LoopStatement(l) => {
                let mut head = match l.loop_kind {
                    ebmc_core::LoopKind::Infinite => format!("{}loop\n", self.pad()),
                    ebmc_core::LoopKind::While => {
                        format!("{}while {}\n", self.pad(), self.expr(module, l.condition)?)
                    }
                    ebmc_core::LoopKind::For => format!(
                        "{}for [init; {}; step]\n",
                        self.pad(),
                        self.expr(module, l.condition)?
                    ),
                    ebmc_core::LoopKind::ForEach => format!(
                        "{}for {} in {}\n",
                        self.pad(),
                        self.decl_name(module, l.item_var),
                        self.expr(module, l.collection)?
                    ),
                };
                head.push_str(&self.nested(module, l.body)?);
                if !l.lowered_statement.is_nil() {
                    head.push_str(&format!("{}lowered:\n", self.pad()));
                    head.push_str(&self.nested(module, l.lowered_statement)?);
                }
                head
            }
            StatementBody::MatchStatement(m) => {
                let target = self.expr(module, m.target)?;
                let mut out = format!("{}match {target}\n", self.pad());
                self.indent += 1;
                for branch in &m.branches {
                    out.push_str(&self.stmt(module, *branch)?);
                }
                self.indent -= 1;
                out
            }
            StatementBody::MatchBranch(b) => {
                let cond = self.expr(module, b.condition)?;
                let mut out = format!("{}case {cond}:\n", self.pad());
                out.push_str(&self.nested(module, b.body)?);
                out
            }
            StatementBody::Break { .. } => format!("{}break\n", self.pad()),
            StatementBody::Continue { .. } => format!("{}continue\n", self.pad()),
            StatementBody::Return { value, .. } => {
                if value.is_nil() {
                    format!("{}return\n", self.pad())
                } else {
                    format!("{}return {}\n", self.pad(), self.expr(module, *value)?)
                }
            }
            StatementBody::Assignment { target, value } => format!(
                "{}{} = {}\n",
                self.pad(),
                self.expr(module, *target)?,
                self.expr(module, *value)?
            ),
            StatementBody::VariableDecl(d) => {
                let keyword = if d.constant { "const" } else { "let" };
                let name = ctx.name_of(d.name);
                let ty = self.ty(module, d.var_type)?;
                if d.initial_value.is_nil() {
                    format!("{}{keyword} {name}: {ty}\n", self.pad())
                } else {
                    let init = self.expr(module, d.initial_value)?;
                    format!("{}{keyword} {name}: {ty} = {init}\n", self.pad())
                }
            }
            StatementBody::ParameterDecl(d) => {
                let ty = self.ty(module, d.param_type)?;
                format!("{}: {ty}", ctx.name_of(d.name))
            }
            StatementBody::FieldDecl(d) => {
                let ty = self.ty(module, d.field_type)?;
                let marker = if d.state_variable { " (state)" } else { "" };
                format!("{}{}: {ty}{marker}\n", self.pad(), ctx.name_of(d.name))
            }
            StatementBody::CompositeFieldDecl(d) => {
                let ty = self.ty(module, d.composite_type)?;
                let names: Vec<String> =
                    d.fields.iter().map(|f| self.decl_name(module, *f)).collect();
                format!(
                    "{}composite {}: {ty} [{}]\n",
                    self.pad(),
                    ctx.name_of(d.name),
                    names.join(", ")
                )
            }
            StatementBody::StructDecl(d) => {
                let mut out = format!("{}format {}\n", self.pad(), ctx.name_of(d.name));
                self.indent += 1;
                for field in &d.fields {
                    out.push_str(&self.stmt(module, *field)?);
                }
                for accessor in &d.properties {
                    out.push_str(&self.stmt(module, *accessor)?);
                }
                if !d.encode_fn.is_nil() {
                    out.push_str(&self.stmt(module, d.encode_fn)?);
                }
                if !d.decode_fn.is_nil() {
                    out.push_str(&self.stmt(module, d.decode_fn)?);
                }
                self.indent -= 1;
                out
            }
            StatementBody::EnumDecl(d) => {
                let mut out = format!("{}enum {}\n", self.pad(), ctx.name_of(d.name));
                self.indent += 1;
                for member in &d.members {
                    out.push_str(&self.stmt(module, *member)?);
                }
                self.indent -= 1;
                out
            }
            StatementBody::EnumMemberDecl(d) => {
                if d.value.is_nil() {
                    format!("{}{}\n", self.pad(), ctx.name_of(d.name))
                } else {
                    format!("{}{} = {}\n", self.pad(), ctx.name_of(d.name), self.expr(module, d.value)?)
                }
            }
            StatementBody::FunctionDecl(d) => {
                let mut params = Vec::with_capacity(d.params.len());
                for param in &d.params {
                    params.push(match module.get_statement(*param).map(|e| &e.body) {
                        Some(StatementBody::ParameterDecl(_)) => self.stmt(module, *param)?,
                        _ => self.decl_name(module, *param),
                    });
                }
                let ret = self.ty(module, d.return_type)?;
                let mut out = format!(
                    "{}fn {}({}) -> {ret} [{:?}]\n",
                    self.pad(),
                    ctx.name_of(d.name),
                    params.join(", "),
                    d.kind
                );
                out.push_str(&self.nested(module, d.body)?);
                out
            }
            StatementBody::PropertyDecl(d) => {
                let ty = self.ty(module, d.property_type)?;
                let mut out = format!(
                    "{}property {}: {ty} [{:?}]\n",
                    self.pad(),
                    ctx.name_of(d.name),
                    d.merge_mode
                );
                self.indent += 1;
                for member in &d.members {
                    out.push_str(&self.stmt(module, *member)?);
                }
                if !d.getter_function.is_nil() {
                    out.push_str(&self.stmt(module, d.getter_function)?);
                }
                if !d.setter_function.is_nil() {
                    out.push_str(&self.stmt(module, d.setter_function)?);
                }
                self.indent -= 1;
                out
            }
            StatementBody::PropertyMemberDecl(d) => {
                let cond = self.expr(module, d.getter_condition)?;
                if d.field.is_nil() {
                    format!("{}when {cond}: <no field>\n", self.pad())
                } else {
                    format!("{}when {cond}: {}\n", self.pad(), self.decl_name(module, d.field))
                }
            }
            StatementBody::ReadData(io) => self.io_summary(module, io, "read")?,
            StatementBody::WriteData(io) => self.io_summary(module, io, "write")?,
            StatementBody::Assert { condition, .. } => {
                format!("{}assert {}\n", self.pad(), self.expr(module, *condition)?)
            }
            StatementBody::LengthCheck { actual, limit, .. } => format!(
                "{}length_check {} <= {}\n",
                self.pad(),
                self.expr(module, *actual)?,
                self.expr(module, *limit)?
            ),
            StatementBody::ErrorReport { message, arguments } => {
                let text = module
                    .get_string(*message)
                    .map(|s| String::from_utf8_lossy(&s.data).into_owned())
                    .unwrap_or_default();
                let mut args = Vec::with_capacity(arguments.len());
                for arg in arguments {
                    args.push(self.expr(module, *arg)?);
                }
                format!("{}error \"{text}\"({})\n", self.pad(), args.join(", "))
            }
            StatementBody::ErrorReturn { value } => {
                format!("{}return error({})\n", self.pad(), self.expr(module, *value)?)
            }
            StatementBody::LoweredStatements { alternatives } => {
                let mut out = String::new();
                for alt in alternatives {
                    out.push_str(&format!("{}[{:?}]\n", self.pad(), alt.lowering_kind));
                    out.push_str(&self.nested(module, alt.block)?);
                }
                out
            }
            StatementBody::Expression { expression } => {
                format!("{}{}\n", self.pad(), self.expr(module, *expression)?)
            }
            StatementBody::Metadata { name, values } => {
                let mut args = Vec::with_capacity(values.len());
                for value in values {
                    args.push(self.expr(module, *value)?);
                }
                format!(
                    "{}@{}({})\n",
                    self.pad(),
                    module.identifier_or(*name, ctx.id.into(), "meta"),
                    args.join(", ")
                )
            }
            StatementBody::ImportModule { module_name } => format!(
                "{}import {}\n",
                self.pad(),
                module.identifier_or(*module_name, ctx.id.into(), "module")
            ),
            StatementBody::PhiNode(p) => {
                format!("{}phi {}\n", self.pad(), self.decl_name(module, p.target))
            }
        };
        Ok(out)
    }

    fn expression_hook(
        &mut self,
        phase: Phase,
        ctx: &ExpressionCtx<'_>,
    ) -> VisitResult<String> {
        if phase != Phase::Main {
            return Err(VisitError::Pass);
        }
        let module = ctx.module;
        let out = match &ctx.body.op {
            ExprOp::LiteralInt { value } => format!("{value}"),
            ExprOp::LiteralBool { value } => format!("{value}"),
            ExprOp::LiteralString { value } => {
                let text = module
                    .get_string(*value)
                    .map(|s| String::from_utf8_lossy(&s.data).into_owned())
                    .unwrap_or_default();
                format!("\"{text}\"")
            }
            ExprOp::LiteralType { type_ref } => self.ty(module, *type_ref)?,
            ExprOp::Identifier { decl } => self.decl_name(module, *decl),
            ExprOp::BinaryOp { op, left, right } => format!(
                "({} {} {})",
                self.expr(module, *left)?,
                binary_op_str(*op),
                self.expr(module, *right)?
            ),
            ExprOp::UnaryOp { op, operand } => {
                let symbol = match op {
                    UnaryOp::LogicalNot => "!",
                    UnaryOp::MinusSign => "-",
                    UnaryOp::BitNot => "~",
                };
                format!("{symbol}{}", self.expr(module, *operand)?)
            }
            ExprOp::IndexAccess { base, index } => {
                format!("{}[{}]", self.expr(module, *base)?, self.expr(module, *index)?)
            }
            ExprOp::MemberAccess { base, member } => {
                format!("{}.{}", self.expr(module, *base)?, self.expr(module, *member)?)
            }
            ExprOp::TypeCast { source, .. } => {
                let ty = self.ty(module, ctx.body.ty)?;
                format!("{ty}({})", self.expr(module, *source)?)
            }
            ExprOp::Range { start, end } => {
                format!("{}..{}", self.expr(module, *start)?, self.expr(module, *end)?)
            }
            ExprOp::Call(call) => {
                let mut args = Vec::with_capacity(call.arguments.len());
                for arg in &call.arguments {
                    args.push(self.expr(module, *arg)?);
                }
                format!("{}({})", self.expr(module, call.callee)?, args.join(", "))
            }
            ExprOp::ArraySize { array } => format!("len({})", self.expr(module, *array)?),
            ExprOp::MaxValue { .. } => {
                format!("max({})", self.ty(module, ctx.body.ty)?)
            }
            ExprOp::DefaultValue => "default".into(),
            ExprOp::IsLittleEndian { .. } => "is_little_endian".into(),
            ExprOp::IsError { target } => format!("is_error({})", self.expr(module, *target)?),
            ExprOp::GetStreamOffset { stream, unit } => {
                format!("offset({stream:?}, {unit:?})")
            }
            ExprOp::GetRemainingBytes { stream } => format!("remaining({stream:?})"),
            ExprOp::CanReadStream { stream, size } => {
                let amount = match &size.value {
                    SizeValue::Fixed { size } => format!("{size}"),
                    SizeValue::Dynamic { size_expr } => self.expr(module, *size_expr)?,
                    SizeValue::None => String::new(),
                };
                format!("can_read({stream:?}, {amount})")
            }
            ExprOp::NewObject => format!("new {}", self.ty(module, ctx.body.ty)?),
            ExprOp::ReadData { target_decl, .. } => {
                format!("read->{}", self.decl_name(module, *target_decl))
            }
            ExprOp::WriteData { target, .. } => {
                format!("write<-{}", self.expr(module, *target)?)
            }
            ExprOp::ConditionalStatement { target_decl, .. } => {
                format!("eval->{}", self.decl_name(module, *target_decl))
            }
            ExprOp::Addressof { target } => format!("&{}", self.expr(module, *target)?),
            ExprOp::Optionalof { target } => format!("some({})", self.expr(module, *target)?),
            ExprOp::SetterStatus { status } => format!("{status:?}"),
            ExprOp::OrCond { conditions } => {
                let mut parts = Vec::with_capacity(conditions.len());
                for cond in conditions {
                    parts.push(self.expr(module, *cond)?);
                }
                format!("({})", parts.join(" || "))
            }
        };
        Ok(out)
    }

    fn type_hook(&mut self, phase: Phase, ctx: &TypeCtx<'_>) -> VisitResult<String> {
        if phase != Phase::Main {
            return Err(VisitError::Pass);
        }
        let module = ctx.module;
        let out = match ctx.body {
            TypeBody::Int { size } => format!("s{size}"),
            TypeBody::Uint { size } => format!("u{size}"),
            TypeBody::Usize => "usize".into(),
            TypeBody::Float { size } => format!("f{size}"),
            TypeBody::Bool => "bool".into(),
            TypeBody::Void => "void".into(),
            TypeBody::Meta => "meta".into(),
            TypeBody::Enum { decl, .. } => self.decl_name(module, *decl),
            TypeBody::Struct { decl } | TypeBody::RecursiveStruct { decl } => {
                self.decl_name(module, *decl)
            }
            TypeBody::Array { element, length } => {
                format!("[{}; {length}]", self.ty(module, *element)?)
            }
            TypeBody::Vector { element } => format!("vec<{}>", self.ty(module, *element)?),
            TypeBody::Variant(v) => {
                let mut members = Vec::with_capacity(v.members.len());
                for member in &v.members {
                    members.push(self.ty(module, *member)?);
                }
                format!("variant<{}>", members.join(" | "))
            }
            TypeBody::Range { base_type } => format!("range<{}>", self.ty(module, *base_type)?),
            TypeBody::Function { params, return_type } => {
                let mut parts = Vec::with_capacity(params.len());
                for param in params {
                    parts.push(self.ty(module, *param)?);
                }
                format!("fn({}) -> {}", parts.join(", "), self.ty(module, *return_type)?)
            }
            TypeBody::EncoderInput => "encoder_input".into(),
            TypeBody::DecoderInput => "decoder_input".into(),
            TypeBody::EncoderReturn => "encoder_return".into(),
            TypeBody::DecoderReturn => "decoder_return".into(),
            TypeBody::PropertySetterReturn => "setter_return".into(),
            TypeBody::Optional { inner } => format!("opt<{}>", self.ty(module, *inner)?),
            TypeBody::Ptr { pointee } => format!("ptr<{}>", self.ty(module, *pointee)?),
        };
        Ok(out)
    }
}
