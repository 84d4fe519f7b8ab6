//! AST statement -> EBM statement conversion.
//!
//! A visited map keyed by `(node, mode class)` guarantees one EBM statement
//! per AST node per generate direction. Self-referential declarations
//! reserve their id first, register it in the map, then fill the body with
//! `add_with_id`.

use ebmc_ast::{decode_base64, AstBinaryOp, Node, NodeId};
use ebmc_core::{
    BinaryOp, EnumDecl, EnumMemberDecl, ExpressionRef, FieldDecl, FunctionDecl, FunctionKind,
    LoopKind, LoopStatement, MatchBranch, MatchStatement, ParameterDecl, StatementBody,
    StatementRef, StructDecl, TypeBody, TypeRef, VariableDecl,
};

use crate::build::Build;
use crate::context::{CoderInfo, Converter, GenerateMode, StateVar};
use crate::error::{ConvertError, Result};
use crate::expr::convert_binary_op;

impl Converter<'_> {
    /// The visited-map class of the current mode: encode/decode walks key
    /// their own statements, everything else shares the Normal class.
    fn cache_mode(&self) -> GenerateMode {
        match self.mode {
            GenerateMode::Encode | GenerateMode::Decode => self.mode,
            _ => GenerateMode::Normal,
        }
    }

    /// Converts a statement node, reusing the cached ref when this node was
    /// already converted under the current mode class.
    pub fn convert_statement(&mut self, node_id: NodeId) -> Result<StatementRef> {
        let key = (node_id, self.cache_mode());
        if let Some(found) = self.visited.get(&key) {
            return Ok(*found);
        }
        let reserved = self.module.reserve_statement_id()?;
        self.visited.insert(key, reserved);
        self.convert_statement_with_id(reserved, node_id)
    }

    /// Converts a declaration reference: declarations always live in the
    /// Normal class regardless of the active generate mode.
    pub fn convert_decl(&mut self, node_id: NodeId) -> Result<StatementRef> {
        self.with_mode(GenerateMode::Normal, |c| c.convert_statement(node_id))
    }

    /// Fills the reserved id with the converted body.
    pub(crate) fn convert_statement_with_id(
        &mut self,
        id: StatementRef,
        node_id: NodeId,
    ) -> Result<StatementRef> {
        let body = self.convert_statement_impl(id, node_id)?;
        Ok(self.module.statements.add_with_id(id, body)?)
    }

    fn convert_statement_impl(
        &mut self,
        id: StatementRef,
        node_id: NodeId,
    ) -> Result<StatementBody> {
        match self.node(node_id).clone() {
            Node::Program { elements } => {
                let mut container = Vec::with_capacity(elements.len());
                for element in elements {
                    container.push(self.convert_statement(element)?);
                }
                Ok(StatementBody::ProgramDecl { container })
            }
            Node::IndentBlock { elements, .. } => {
                let mut container = Vec::with_capacity(elements.len());
                for element in elements {
                    container.push(self.convert_statement(element)?);
                }
                Ok(StatementBody::Block { container })
            }
            Node::ScopedStatement { statement } => self.convert_statement_impl(id, statement),
            Node::If { cond, then, els } => {
                let condition = self.convert_expr(cond)?;
                let then_block = self.convert_statement(then)?;
                let else_block = match els {
                    Some(els) => self.convert_statement(els)?,
                    None => StatementRef::NIL,
                };
                Ok(StatementBody::IfStatement { condition, then_block, else_block })
            }
            Node::Loop { .. } => self.convert_loop_body(id, node_id),
            Node::Match { cond, branch, exhaustive } => {
                let target = self.convert_expr(cond)?;
                let mut branches = Vec::with_capacity(branch.len());
                for b in branch {
                    branches.push(self.convert_statement(b)?);
                }
                Ok(StatementBody::MatchStatement(MatchStatement {
                    target,
                    exhaustive,
                    branches,
                    lowered_statement: StatementRef::NIL,
                }))
            }
            Node::MatchBranch { cond, then } => {
                let condition = self.convert_expr(cond)?;
                let body = match then {
                    Some(then) => self.convert_statement(then)?,
                    None => StatementRef::NIL,
                };
                Ok(StatementBody::MatchBranch(MatchBranch { condition, body }))
            }
            Node::Return { expr } => {
                let value = match expr {
                    Some(expr) => self.convert_expr(expr)?,
                    None => ExpressionRef::NIL,
                };
                Ok(StatementBody::Return { value, related_function: self.current_function })
            }
            Node::Break {} => {
                let related_loop = self.innermost_loop()?;
                Ok(StatementBody::Break { related_loop })
            }
            Node::Continue {} => {
                let related_loop = self.innermost_loop()?;
                Ok(StatementBody::Continue { related_loop })
            }
            Node::Assert { cond } => {
                let condition = self.convert_expr(cond)?;
                self.assert_stmt_body(condition)
            }
            Node::ExplicitError { message, arguments } => {
                let data = match self.node(message) {
                    Node::StrLiteral { value, .. } => decode_base64(value)?,
                    other => {
                        return Err(ConvertError::unsupported(format!(
                            "error message of kind {}",
                            other.name()
                        )))
                    }
                };
                let message = self.module.add_string(data)?;
                let mut args = Vec::with_capacity(arguments.len());
                for arg in arguments {
                    args.push(self.convert_expr(arg)?);
                }
                Ok(StatementBody::ErrorReport { message, arguments: args })
            }
            Node::Metadata { name, values } => {
                let name = self.module.add_identifier(name)?;
                let mut converted = Vec::with_capacity(values.len());
                for value in values {
                    converted.push(self.convert_expr(value)?);
                }
                Ok(StatementBody::Metadata { name, values: converted })
            }
            Node::Import { path } => {
                let module_name = self.module.add_identifier(path)?;
                Ok(StatementBody::ImportModule { module_name })
            }
            Node::ImplicitYield { expr } => {
                let expression = self.convert_expr(expr)?;
                Ok(StatementBody::Expression { expression })
            }
            Node::Binary { op, left, right, .. } => {
                self.convert_assignment_like(op, left, right, node_id)
            }
            Node::Format { .. } => self.convert_format(id, node_id),
            Node::State { ident, body } => {
                let name = self.module.add_identifier(ident)?;
                let elements = match self.node(body) {
                    Node::IndentBlock { elements, .. } => elements.clone(),
                    _ => vec![body],
                };
                let mut fields = Vec::with_capacity(elements.len());
                for element in elements {
                    fields.push(self.convert_statement(element)?);
                }
                Ok(StatementBody::StructDecl(StructDecl {
                    name,
                    fields,
                    ..StructDecl::default()
                }))
            }
            Node::Enum { ident, base_type, members } => {
                let name = self.module.add_identifier(ident)?;
                let base_type = match base_type {
                    Some(bt) => self.convert_type(bt, None)?,
                    None => TypeRef::NIL,
                };
                let mut converted = Vec::with_capacity(members.len());
                for member in members {
                    converted.push(self.convert_statement(member)?);
                }
                Ok(StatementBody::EnumDecl(EnumDecl { name, base_type, members: converted }))
            }
            Node::EnumMember { ident, value, str_literal } => {
                let name = self.module.add_identifier(ident)?;
                let value = match value {
                    Some(v) => self.convert_expr(v)?,
                    None => ExpressionRef::NIL,
                };
                let string_repr = match str_literal {
                    Some(lit) => match self.node(lit) {
                        Node::StrLiteral { value, .. } => {
                            let data = decode_base64(value)?;
                            self.module.add_string(data)?
                        }
                        _ => ebmc_core::StringRef::NIL,
                    },
                    None => ebmc_core::StringRef::NIL,
                };
                Ok(StatementBody::EnumMemberDecl(EnumMemberDecl { name, value, string_repr }))
            }
            Node::Function { .. } => {
                let decl = self.convert_function_decl(node_id, id, None)?;
                Ok(StatementBody::FunctionDecl(decl))
            }
            Node::Field { .. } => self.convert_field(id, node_id),
            other if other.is_expression() => {
                let expression = self.convert_expr(node_id)?;
                Ok(StatementBody::Expression { expression })
            }
            other => Err(ConvertError::unsupported(format!(
                "statement conversion of {}",
                other.name()
            ))),
        }
    }

    fn innermost_loop(&self) -> Result<StatementRef> {
        self.loop_stack
            .last()
            .copied()
            .ok_or_else(|| ConvertError::unsupported("break/continue outside of a loop"))
    }

    // -- assignments ---------------------------------------------------------

    fn convert_assignment_like(
        &mut self,
        op: AstBinaryOp,
        left: NodeId,
        right: NodeId,
        node_id: NodeId,
    ) -> Result<StatementBody> {
        match op {
            AstBinaryOp::Assign => {
                let target = self.convert_expr(left)?;
                let value = self.convert_expr(right)?;
                Ok(StatementBody::Assignment { target, value })
            }
            AstBinaryOp::DefineAssign | AstBinaryOp::ConstAssign => {
                let Node::Ident { ident, expr_type, .. } = self.node(left).clone() else {
                    return Err(ConvertError::unsupported(
                        "definition target is not an identifier",
                    ));
                };
                let name = self.module.add_identifier(ident)?;
                let var_type = self.convert_type(expr_type, None)?;
                let initial_value = self.convert_expr(right)?;
                Ok(StatementBody::VariableDecl(VariableDecl {
                    name,
                    var_type,
                    initial_value,
                    constant: op == AstBinaryOp::ConstAssign,
                    reference: false,
                }))
            }
            compound if compound.compound_base().is_some() => {
                // `a += b` keeps the combined computation as the value
                let value = self.convert_compound_value(compound, left, right)?;
                let target = self.convert_expr(left)?;
                Ok(StatementBody::Assignment { target, value })
            }
            _ => {
                let expression = self.convert_expr(node_id)?;
                Ok(StatementBody::Expression { expression })
            }
        }
    }

    fn convert_compound_value(
        &mut self,
        op: AstBinaryOp,
        left: NodeId,
        right: NodeId,
    ) -> Result<ExpressionRef> {
        let base = op
            .compound_base()
            .ok_or_else(|| ConvertError::internal("not a compound assignment".to_string()))?;
        let ty_node = self
            .ast
            .expr_type_of(left)
            .ok_or_else(|| ConvertError::internal("assignment target untyped".to_string()))?;
        let ty = self.convert_type(ty_node, None)?;
        let left = self.convert_expr(left)?;
        let right = self.convert_expr(right)?;
        self.binary(convert_binary_op(base)?, ty, left, right)
    }

    // -- loops ---------------------------------------------------------------

    /// Detects the loop shape and lowers `for .. in ..` forms to counter
    /// loops; see the per-shape arms.
    fn convert_loop_body(&mut self, id: StatementRef, node_id: NodeId) -> Result<StatementBody> {
        let Node::Loop { init, cond, step, body } = self.node(node_id).clone() else {
            return Err(ConvertError::internal("loop body on non-loop".to_string()));
        };

        if let Some(init_id) = init {
            if let Node::Binary { op: AstBinaryOp::InAssign, left, right, .. } =
                self.node(init_id).clone()
            {
                return self.convert_for_each(id, init_id, left, right, body);
            }
        }

        let mut stmt = LoopStatement::default();
        let init_ref = match init {
            Some(init) => Some(self.convert_statement(init)?),
            None => None,
        };
        let cond_ref = match cond {
            Some(cond) => Some(self.convert_expr(cond)?),
            None => None,
        };
        let step_ref = match step {
            Some(step) => Some(self.convert_statement(step)?),
            None => None,
        };
        stmt.body = self.with_loop(id, |c| c.convert_statement(body))?;
        if init_ref.is_some() || step_ref.is_some() {
            stmt.loop_kind = LoopKind::For;
            stmt.init = init_ref.unwrap_or(StatementRef::NIL);
            stmt.condition = cond_ref.unwrap_or(ExpressionRef::NIL);
            stmt.increment = step_ref.unwrap_or(StatementRef::NIL);
        } else if let Some(cond) = cond_ref {
            stmt.loop_kind = LoopKind::While;
            stmt.condition = cond;
        } else {
            stmt.loop_kind = LoopKind::Infinite;
        }
        Ok(StatementBody::LoopStatement(stmt))
    }

    /// `for item in collection`: all shapes lower to a counter loop kept in
    /// `lowered_statement`, with the FOR_EACH form preserved for targets
    /// that have native iteration.
    fn convert_for_each(
        &mut self,
        id: StatementRef,
        init_node: NodeId,
        item: NodeId,
        collection: NodeId,
        body: NodeId,
    ) -> Result<StatementBody> {
        let Node::Ident { ident, .. } = self.node(item).clone() else {
            return Err(ConvertError::unsupported("loop binder is not an identifier"));
        };
        let item_name = self.module.add_identifier(ident)?;
        let collection_type = self.ast.resolve_type(
            self.ast
                .expr_type_of(collection)
                .ok_or_else(|| ConvertError::internal("untyped loop collection".to_string()))?,
        );

        let mut stmt = LoopStatement { loop_kind: LoopKind::ForEach, ..LoopStatement::default() };
        let target = self.convert_expr(collection)?;
        stmt.collection = target;

        match self.node(collection_type).clone() {
            // counter loop i in [0, N)
            Node::IntType { .. } | Node::IntLiteralType { .. } => {
                let item_type_node = self
                    .ast
                    .expr_type_of(item)
                    .ok_or_else(|| ConvertError::internal("untyped loop binder".to_string()))?;
                let item_type = self.convert_type(item_type_node, None)?;
                let (counter, counter_def) = self.counter_loop_start_typed(item_type)?;
                let (_, item_def) =
                    self.define_var(item_name, item_type, counter, true, false)?;
                self.visited.insert((init_node, self.cache_mode()), item_def);
                let inner = self.with_loop(id, |c| c.convert_statement(body))?;
                let loop_stmt = self.counter_loop_end(counter, target, inner)?;
                let lowered = self.block(vec![counter_def, loop_stmt])?;
                stmt.item_var = item_def;
                stmt.lowered_statement = lowered;
            }
            // counter loop with the range's comparator and base type
            Node::RangeType { base_type, range } => {
                let base_type = base_type.ok_or(ConvertError::MissingInput {
                    node: "range_type",
                    field: "base_type",
                })?;
                let Node::Range { start, end, inclusive, .. } = self.node(range).clone() else {
                    return Err(ConvertError::internal("range type without range".to_string()));
                };
                let base_ty = self.convert_type(base_type, None)?;
                let start = match start {
                    Some(s) => self.convert_expr(s)?,
                    None => self.default_value(base_ty)?,
                };
                let end = match end {
                    Some(e) => self.convert_expr(e)?,
                    None => self.max_value_expr(base_ty)?,
                };
                let counter_type = self.counter_type()?;
                let start = self.cast(counter_type, base_ty, start)?;
                let end = self.cast(counter_type, base_ty, end)?;
                let (iter, iter_def) = self.define_anon_var(counter_type, start)?;
                let bool_type = self.bool_type()?;
                let cmp_op = if inclusive { BinaryOp::LessOrEq } else { BinaryOp::Less };
                let cond = self.binary(cmp_op, bool_type, iter, end)?;
                let (_, item_def) = self.define_var(item_name, counter_type, iter, true, false)?;
                self.visited.insert((init_node, self.cache_mode()), item_def);
                let inner = self.with_loop(id, |c| c.convert_statement(body))?;
                let inc = self.increment(iter, counter_type)?;
                let loop_body = self.block(vec![inner, inc])?;
                let while_loop = self.while_loop(cond, loop_body)?;
                let lowered = self.block(vec![iter_def, while_loop])?;
                stmt.item_var = item_def;
                stmt.lowered_statement = lowered;
            }
            // counter loop over the runtime size, element bound per pass
            Node::ArrayType { .. } => {
                let size = self.array_size(target)?;
                let element_type_node = self
                    .ast
                    .expr_type_of(item)
                    .ok_or_else(|| ConvertError::internal("untyped loop binder".to_string()))?;
                let element_type = self.convert_type(element_type_node, None)?;
                let (counter, counter_def) = self.counter_loop_start()?;
                let indexed = self.index(element_type, target, counter)?;
                let (_, item_def) =
                    self.define_var(item_name, element_type, indexed, false, true)?;
                self.visited.insert((init_node, self.cache_mode()), item_def);
                let inner = self.with_loop(id, |c| c.convert_statement(body))?;
                let loop_stmt = self.counter_loop_end(counter, size, inner)?;
                let lowered = self.block(vec![counter_def, loop_stmt])?;
                stmt.item_var = item_def;
                stmt.lowered_statement = lowered;
            }
            // the literal's bytes are materialized into a buffer first
            Node::StrLiteralType { base, .. } => {
                let bytes = match self.node(base) {
                    Node::StrLiteral { value, .. } => decode_base64(value)?,
                    _ => {
                        return Err(ConvertError::MissingInput {
                            node: "str_literal_type",
                            field: "base",
                        })
                    }
                };
                let u8t = self.uint_type(8)?;
                let buffer_type = self.u8_array_type(bytes.len() as u64)?;
                let init = self.default_value(buffer_type)?;
                let (buffer, buffer_def) = self.define_anon_var(buffer_type, init)?;
                let mut container = vec![buffer_def];
                self.construct_string_array(&mut container, buffer, &bytes)?;
                let (counter, counter_def) = self.counter_loop_start()?;
                container.push(counter_def);
                let indexed = self.index(u8t, buffer, counter)?;
                let (_, item_def) = self.define_var(item_name, u8t, indexed, true, true)?;
                self.visited.insert((init_node, self.cache_mode()), item_def);
                let inner = self.with_loop(id, |c| c.convert_statement(body))?;
                let len = self.int_literal(bytes.len() as u64)?;
                let loop_stmt = self.counter_loop_end(counter, len, inner)?;
                container.push(loop_stmt);
                let lowered = self.block(container)?;
                stmt.item_var = item_def;
                stmt.lowered_statement = lowered;
            }
            other => {
                return Err(ConvertError::unsupported(format!(
                    "iteration over {}",
                    other.name()
                )))
            }
        }
        Ok(StatementBody::LoopStatement(stmt))
    }

    /// One assignment per literal byte into `buffer`.
    pub(crate) fn construct_string_array(
        &mut self,
        container: &mut Vec<StatementRef>,
        buffer: ExpressionRef,
        bytes: &[u8],
    ) -> Result<()> {
        let u8t = self.uint_type(8)?;
        for (i, byte) in bytes.iter().enumerate() {
            let index = self.int_literal(i as u64)?;
            let value = self.int_literal(u64::from(*byte))?;
            let slot = self.index(u8t, buffer, index)?;
            container.push(self.assign(slot, value)?);
        }
        Ok(())
    }

    // -- functions and formats ------------------------------------------------

    /// Converts a user function declaration. `coder_input` is the stream
    /// parameter when the function serves as a custom encoder/decoder.
    pub(crate) fn convert_function_decl(
        &mut self,
        node_id: NodeId,
        id: StatementRef,
        coder_input: Option<StatementRef>,
    ) -> Result<FunctionDecl> {
        let Node::Function { ident, belong, parameters, return_type, body } =
            self.node(node_id).clone()
        else {
            return Err(ConvertError::internal("not a function node".to_string()));
        };
        let mut decl = FunctionDecl {
            name: self.module.add_identifier(ident)?,
            ..FunctionDecl::default()
        };
        if let Some(parent) = belong {
            decl.parent_format = self.convert_decl(parent)?;
        }
        match self.mode {
            GenerateMode::Encode => {
                decl.kind = FunctionKind::Encoder;
                decl.return_type = self.intern_type(TypeBody::EncoderReturn)?;
            }
            GenerateMode::Decode => {
                decl.kind = FunctionKind::Decoder;
                decl.return_type = self.intern_type(TypeBody::DecoderReturn)?;
            }
            _ => {
                // `cast` is the conventional name for conversion methods;
                // the cast-resolution pass looks them up by kind
                let name = self
                    .module
                    .get_identifier(decl.name)
                    .map(|i| i.name.clone())
                    .unwrap_or_default();
                decl.kind =
                    if name == "cast" { FunctionKind::Cast } else { FunctionKind::Normal };
                decl.return_type = match return_type {
                    Some(rt) => self.convert_type(rt, None)?,
                    None => self.void_type()?,
                };
            }
        }
        if let Some(input) = coder_input {
            decl.params.push(input);
        }
        for param in parameters {
            let Node::Field { ident, field_type, .. } = self.node(param).clone() else {
                return Err(ConvertError::unsupported("non-field function parameter"));
            };
            let name = match ident {
                Some(name) => self.module.add_identifier(name)?,
                None => self.module.add_anonymous_identifier()?,
            };
            let param_type = self.convert_type(field_type, None)?;
            let param_decl = self.add_stmt(StatementBody::ParameterDecl(ParameterDecl {
                name,
                param_type,
            }))?;
            self.visited.insert((param, GenerateMode::Normal), param_decl);
            decl.params.push(param_decl);
        }
        decl.body = self.with_function(id, |c| c.convert_statement(body))?;
        Ok(decl)
    }

    /// Converts a format: the struct declaration plus eagerly synthesized
    /// encoder and decoder functions, converted under their own modes.
    fn convert_format(&mut self, id: StatementRef, node_id: NodeId) -> Result<StatementBody> {
        let Node::Format { ident, body, encode_fn, decode_fn } = self.node(node_id).clone()
        else {
            return Err(ConvertError::internal("not a format node".to_string()));
        };
        let name = self.module.add_identifier(ident)?;

        let encoder_input_t = self.intern_type(TypeBody::EncoderInput)?;
        let decoder_input_t = self.intern_type(TypeBody::DecoderInput)?;
        let encoder_return_t = self.intern_type(TypeBody::EncoderReturn)?;
        let decoder_return_t = self.intern_type(TypeBody::DecoderReturn)?;

        let enc_id = self.module.reserve_statement_id()?;
        let dec_id = self.module.reserve_statement_id()?;
        let enc_fn_t = self.intern_type(TypeBody::Function {
            params: vec![encoder_input_t],
            return_type: encoder_return_t,
        })?;
        let dec_fn_t = self.intern_type(TypeBody::Function {
            params: vec![decoder_input_t],
            return_type: decoder_return_t,
        })?;
        let encode_fn_expr = self.identifier_expr(enc_id, enc_fn_t)?;
        let decode_fn_expr = self.identifier_expr(dec_id, dec_fn_t)?;

        let (encoder_input_expr, encoder_input) =
            self.define_anon_var(encoder_input_t, ExpressionRef::NIL)?;
        let (decoder_input_expr, decoder_input) =
            self.define_anon_var(decoder_input_t, ExpressionRef::NIL)?;

        // struct members under Normal mode
        let field_nodes = self.format_field_nodes(body);
        let mut struct_decl = StructDecl {
            name,
            encode_fn: enc_id,
            decode_fn: dec_id,
            ..StructDecl::default()
        };
        let mut state_vars = Vec::new();
        for field_node in &field_nodes {
            let field_ref = self.convert_decl(*field_node)?;
            struct_decl.fields.push(field_ref);
            if let Node::Field { is_state_variable: true, field_type, .. } =
                self.node(*field_node)
            {
                let field_type = *field_type;
                let ty = self.convert_type(field_type, Some(*field_node))?;
                let expr = self.identifier_expr(field_ref, ty)?;
                state_vars.push(StateVar { field_node: *field_node, decl: field_ref, expr });
            }
        }

        // registered before body conversion so nested formats can call us
        self.register_coder(
            node_id,
            CoderInfo {
                encode_fn: enc_id,
                decode_fn: dec_id,
                encode_fn_expr,
                decode_fn_expr,
                encoder_input,
                decoder_input,
                encoder_input_expr,
                decoder_input_expr,
                state_vars: state_vars.clone(),
            },
        );

        self.with_format(node_id, |c| {
            c.synthesize_coder(id, node_id, GenerateMode::Encode, enc_id, encoder_input, body, encode_fn)?;
            c.synthesize_coder(id, node_id, GenerateMode::Decode, dec_id, decoder_input, body, decode_fn)
        })?;

        Ok(StatementBody::StructDecl(struct_decl))
    }

    #[allow(clippy::too_many_arguments)]
    fn synthesize_coder(
        &mut self,
        format_ref: StatementRef,
        format_node: NodeId,
        mode: GenerateMode,
        fn_id: StatementRef,
        input_decl: StatementRef,
        body: NodeId,
        custom_fn: Option<NodeId>,
    ) -> Result<()> {
        let decl = self.with_mode(mode, |c| -> Result<FunctionDecl> {
            if let Some(custom) = custom_fn {
                let mut decl = c.convert_function_decl(custom, fn_id, Some(input_decl))?;
                decl.parent_format = format_ref;
                return Ok(decl);
            }
            let is_encode = mode == GenerateMode::Encode;
            let mut decl = FunctionDecl {
                kind: if is_encode { FunctionKind::Encoder } else { FunctionKind::Decoder },
                name: c.module.add_identifier(if is_encode { "encode" } else { "decode" })?,
                parent_format: format_ref,
                return_type: c.intern_type(if is_encode {
                    TypeBody::EncoderReturn
                } else {
                    TypeBody::DecoderReturn
                })?,
                ..FunctionDecl::default()
            };
            decl.params.push(input_decl);
            let state_vars = c.coder(format_node)?.state_vars.clone();
            for state in state_vars {
                decl.params.push(state.decl);
            }
            decl.body = c.with_function(fn_id, |c| c.convert_statement(body))?;
            Ok(decl)
        })?;
        self.module
            .statements
            .add_with_id(fn_id, StatementBody::FunctionDecl(decl))?;
        Ok(())
    }

    /// Field member nodes of a format body, from the struct type when the
    /// parser attached one, otherwise from the block elements.
    fn format_field_nodes(&self, body: NodeId) -> Vec<NodeId> {
        let elements = match self.node(body) {
            Node::IndentBlock { elements, struct_type } => match struct_type {
                Some(st) => match self.node(*st) {
                    Node::StructType { fields, .. } if !fields.is_empty() => fields.clone(),
                    _ => elements.clone(),
                },
                None => elements.clone(),
            },
            _ => vec![body],
        };
        elements
            .into_iter()
            .filter(|e| matches!(self.node(*e), Node::Field { .. }))
            .collect()
    }

    // -- fields ----------------------------------------------------------------

    /// A field converts three ways: union fields derive a property, fields
    /// under an encode/decode walk become I/O statements, everything else is
    /// a plain declaration.
    fn convert_field(&mut self, id: StatementRef, node_id: NodeId) -> Result<StatementBody> {
        let Node::Field { ident, field_type, belong, is_state_variable, .. } =
            self.node(node_id).clone()
        else {
            return Err(ConvertError::internal("not a field node".to_string()));
        };
        let resolved = self.ast.resolve_type(field_type);
        if matches!(self.node(resolved), Node::UnionType { .. }) {
            if matches!(self.mode, GenerateMode::Encode | GenerateMode::Decode) {
                // the union's I/O happens through the branch structs; the
                // property itself has no direct wire presence
                self.convert_decl(node_id)?;
                return Ok(StatementBody::Block { container: vec![] });
            }
            return self.convert_property_decl(id, node_id, resolved);
        }
        match self.mode {
            GenerateMode::Encode if !is_state_variable => {
                let decl = self.convert_decl(node_id)?;
                let decl_type = self.field_decl_type(decl)?;
                let target = self.identifier_expr(decl, decl_type)?;
                self.encode_field_type(field_type, target, Some(node_id))
            }
            GenerateMode::Decode if !is_state_variable => {
                let decl = self.convert_decl(node_id)?;
                let decl_type = self.field_decl_type(decl)?;
                let target = self.identifier_expr(decl, decl_type)?;
                self.decode_field_type(field_type, target, Some(node_id))
            }
            _ => {
                let name = match ident {
                    Some(name) => self.module.add_identifier(name)?,
                    None => self.module.add_anonymous_identifier()?,
                };
                let ty = self.convert_type(field_type, Some(node_id))?;
                let parent_struct = match belong {
                    Some(parent) => self.convert_decl(parent)?,
                    None => StatementRef::NIL,
                };
                Ok(StatementBody::FieldDecl(FieldDecl {
                    name,
                    field_type: ty,
                    parent_struct,
                    state_variable: is_state_variable,
                    composite_field: StatementRef::NIL,
                }))
            }
        }
    }

    pub(crate) fn field_decl_type(&mut self, decl: StatementRef) -> Result<TypeRef> {
        match &self
            .module
            .get_statement(decl)
            .ok_or_else(|| ConvertError::internal(format!("unresolved field decl {decl}")))?
            .body
        {
            StatementBody::FieldDecl(f) => Ok(f.field_type),
            StatementBody::PropertyDecl(p) => Ok(p.property_type),
            other => Err(ConvertError::internal(format!(
                "field reference resolves to {:?}",
                other.kind()
            ))),
        }
    }
}
