//! The MSL rendering walk.
//!
//! Metal has no module-scope resources: entry points receive buffers,
//! textures, and samplers as attributed parameters, and workgroup /
//! private variables are re-declared at body scope. Helper functions
//! therefore cannot reach module-scope variables; such programs are
//! rejected with an [`EmitError`] rather than silently miscompiled.

use shade_backend_core::{BackendOptions, EmitError, IndentedWriter};
use shade_diag::Span;
use shade_ir::{
    AddressSpace, ArraySize, Builtin, Handle, Scalar, ScalarKind, Stage, StorageAccess, Type,
    TypeInner,
};
use shade_parser::ast::{
    AssignTarget, AttributeKind, BinaryOp, Block, Declaration, ExprId, ExpressionKind, Literal,
    Statement, StatementKind, UnaryOp,
};
use shade_resolver::{CallTarget, DeclInfo, Program, SymbolBinding};

pub(crate) fn emit_program(
    program: &Program,
    _options: &BackendOptions,
) -> Result<String, EmitError> {
    let mut emitter = Emitter {
        program,
        w: IndentedWriter::new(2),
        in_entry: false,
    };
    emitter.module()?;
    Ok(emitter.w.finish())
}

fn unsupported(span: Span, message: impl Into<String>) -> EmitError {
    EmitError::Unsupported {
        location: span.start,
        message: message.into(),
    }
}

/// MSL keywords and stdlib names a WGSL identifier may collide with.
/// `main` is reserved for the host-visible entry symbol.
const RESERVED: &[&str] = &[
    "main", "kernel", "vertex", "fragment", "device", "constant", "thread", "threadgroup",
    "sampler", "texture", "half", "char", "short", "long", "signed", "unsigned", "template",
    "class", "union", "namespace", "using", "new", "delete", "operator", "private", "public",
    "protected", "virtual", "metal", "auto", "static", "this", "sizeof", "typedef", "enum",
];

fn safe_name(name: &str) -> String {
    if RESERVED.contains(&name) {
        format!("{name}_")
    } else {
        name.to_string()
    }
}

struct Emitter<'a> {
    program: &'a Program,
    w: IndentedWriter,
    /// Module-scope variables are only reachable from entry points,
    /// where they were turned into parameters and body declarations.
    in_entry: bool,
}

impl Emitter<'_> {
    fn module(&mut self) -> Result<(), EmitError> {
        self.w.line("#include <metal_stdlib>");
        self.w.blank();
        self.w.line("using namespace metal;");
        for (index, decl) in self.program.ast().declarations.iter().enumerate() {
            // Module-scope vars surface as entry-point parameters and
            // body declarations instead.
            if matches!(
                decl,
                Declaration::Var(_) | Declaration::Alias(_) | Declaration::ConstAssert(_)
            ) {
                continue;
            }
            self.w.blank();
            self.declaration(index, decl)?;
        }
        Ok(())
    }

    // ----- declarations -------------------------------------------------

    fn declaration(&mut self, index: usize, decl: &Declaration) -> Result<(), EmitError> {
        match decl {
            Declaration::Struct(s) => {
                let DeclInfo::Struct(handle) = self.program.decl_info(index) else {
                    return Ok(());
                };
                let TypeInner::Struct { members, .. } = self.program.types()[*handle].inner.clone()
                else {
                    return Ok(());
                };
                self.w
                    .line(format!("struct {} {{", safe_name(&s.name.name)));
                self.w.indent();
                for member in &members {
                    let declarator =
                        self.declarator(member.ty, &safe_name(&member.name), s.name.span)?;
                    self.w.line(format!("{declarator};"));
                }
                self.w.dedent();
                self.w.line("};");
                Ok(())
            }
            Declaration::Const(c) => {
                let DeclInfo::Const(info) = self.program.decl_info(index) else {
                    return Ok(());
                };
                let declarator =
                    self.declarator(info.ty, &safe_name(&c.name.name), c.name.span)?;
                let init = self.expr(c.init)?;
                self.w.line(format!("constant {declarator} = {init};"));
                Ok(())
            }
            Declaration::Function(f) => self.function(index, f),
            Declaration::Var(_) | Declaration::Alias(_) | Declaration::ConstAssert(_) => Ok(()),
        }
    }

    fn function(&mut self, index: usize, f: &shade_parser::ast::Function) -> Result<(), EmitError> {
        let info = self
            .program
            .function_info(index)
            .expect("declaration is a function");
        let name = safe_name(&f.name.name);
        let span = f.name.span;

        let Some(stage) = info.stage else {
            // Helper function: plain C++ signature.
            let return_ty = match info.return_ty {
                Some(ty) => self.ty(ty, span)?,
                None => "void".to_string(),
            };
            let mut params = Vec::new();
            for (param, &ty) in f.params.iter().zip(&info.param_types) {
                let ty = self.ty(ty, param.name.span)?;
                params.push(format!("{ty} {}", safe_name(&param.name.name)));
            }
            self.in_entry = false;
            self.w
                .line(format!("{return_ty} {name}({}) {{", params.join(", ")));
            self.block_body(&f.body)?;
            self.w.line("}");
            return Ok(());
        };

        let keyword = match stage {
            Stage::Compute => "kernel",
            Stage::Fragment => "fragment",
            Stage::Vertex => "vertex",
        };
        let return_ty = match (stage, info.return_ty) {
            (Stage::Compute, _) | (_, None) => "void".to_string(),
            (_, Some(ty)) => {
                self.check_entry_result(&f.return_attributes)?;
                self.ty(ty, span)?
            }
        };

        let mut params = Vec::new();
        for (param, &ty) in f.params.iter().zip(&info.param_types) {
            let ty = self.ty(ty, param.name.span)?;
            let attr = self.stage_in_attribute(stage, &param.attributes, param.name.span)?;
            params.push(format!("{ty} {} [[{attr}]]", safe_name(&param.name.name)));
        }
        params.extend(self.resource_params()?);

        self.in_entry = true;
        self.w.line(format!(
            "{keyword} {return_ty} {name}({}) {{",
            params.join(", ")
        ));
        self.w.indent();
        self.body_scope_globals()?;
        for stmt in &f.body.statements {
            self.statement(stmt)?;
        }
        self.w.dedent();
        self.w.line("}");
        self.in_entry = false;
        Ok(())
    }

    /// Metal attributes a return value can only carry through an output
    /// struct; a bare vec4 return is implicitly position (vertex) or
    /// color 0 (fragment).
    fn check_entry_result(
        &self,
        attributes: &[shade_parser::ast::Attribute],
    ) -> Result<(), EmitError> {
        for attr in attributes {
            if let AttributeKind::Builtin(name) = &attr.kind {
                match name.name.as_str() {
                    "position" => {}
                    other => {
                        return Err(unsupported(
                            attr.span,
                            format!("return builtin '{other}' is not supported by the MSL backend"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn stage_in_attribute(
        &self,
        stage: Stage,
        attributes: &[shade_parser::ast::Attribute],
        span: Span,
    ) -> Result<String, EmitError> {
        for attr in attributes {
            match &attr.kind {
                AttributeKind::Builtin(name) => {
                    let attr_name = match name.name.as_str() {
                        "global_invocation_id" => "thread_position_in_grid",
                        "local_invocation_id" => "thread_position_in_threadgroup",
                        "local_invocation_index" => "thread_index_in_threadgroup",
                        "workgroup_id" => "threadgroup_position_in_grid",
                        "num_workgroups" => "threadgroups_per_grid",
                        "position" => "position",
                        "vertex_index" => "vertex_id",
                        "instance_index" => "instance_id",
                        "front_facing" => "front_facing",
                        "sample_index" => "sample_id",
                        "sample_mask" => "sample_mask",
                        other => {
                            return Err(unsupported(
                                attr.span,
                                format!("MSL has no attribute for builtin '{other}'"),
                            ));
                        }
                    };
                    return Ok(attr_name.to_string());
                }
                AttributeKind::Location(expr) => {
                    let location = self.program.const_u32(*expr).unwrap_or(0);
                    return Ok(match stage {
                        Stage::Vertex => format!("attribute({location})"),
                        _ => format!("user(locn{location})"),
                    });
                }
                _ => {}
            }
        }
        Err(unsupported(span, "missing entry point IO attribute"))
    }

    /// Module-scope resources rendered as entry-point parameters, in
    /// declaration order.
    fn resource_params(&self) -> Result<Vec<String>, EmitError> {
        let mut params = Vec::new();
        for (index, decl) in self.program.ast().declarations.iter().enumerate() {
            let Declaration::Var(v) = decl else { continue };
            let DeclInfo::Var(info) = self.program.decl_info(index) else {
                continue;
            };
            let name = safe_name(&v.name.name);
            let binding = info.binding.map(|b| b.binding).unwrap_or(0);
            match info.space {
                AddressSpace::Uniform => {
                    let ty = self.ty(info.ty, v.name.span)?;
                    params.push(format!("constant {ty}& {name} [[buffer({binding})]]"));
                }
                AddressSpace::Storage { access } => {
                    let qualifier = if access.contains(StorageAccess::STORE) {
                        "device"
                    } else {
                        "device const"
                    };
                    match self.program.types()[info.ty].inner {
                        TypeInner::Array { base, .. } => {
                            let element = self.ty(base, v.name.span)?;
                            params.push(format!(
                                "{qualifier} {element}* {name} [[buffer({binding})]]"
                            ));
                        }
                        _ => {
                            let ty = self.ty(info.ty, v.name.span)?;
                            params
                                .push(format!("{qualifier} {ty}& {name} [[buffer({binding})]]"));
                        }
                    }
                }
                AddressSpace::Handle => match self.program.types()[info.ty].inner {
                    TypeInner::Sampler => {
                        params.push(format!("sampler {name} [[sampler({binding})]]"));
                    }
                    TypeInner::SampledTexture2d { scalar } => {
                        let component = scalar_name(scalar, v.name.span)?;
                        params.push(format!(
                            "texture2d<{component}> {name} [[texture({binding})]]"
                        ));
                    }
                    _ => {
                        return Err(unsupported(
                            v.name.span,
                            "external textures must be expanded before MSL emission",
                        ));
                    }
                },
                AddressSpace::Private | AddressSpace::Workgroup => {}
                AddressSpace::Function => {}
            }
        }
        Ok(params)
    }

    /// Workgroup and private module-scope variables re-declared at the
    /// top of the entry-point body.
    fn body_scope_globals(&mut self) -> Result<(), EmitError> {
        for (index, decl) in self.program.ast().declarations.iter().enumerate() {
            let Declaration::Var(v) = decl else { continue };
            let DeclInfo::Var(info) = self.program.decl_info(index) else {
                continue;
            };
            match info.space {
                AddressSpace::Workgroup => {
                    let declarator =
                        self.declarator(info.ty, &safe_name(&v.name.name), v.name.span)?;
                    self.w.line(format!("threadgroup {declarator};"));
                }
                AddressSpace::Private => {
                    let declarator =
                        self.declarator(info.ty, &safe_name(&v.name.name), v.name.span)?;
                    match v.init {
                        Some(init) => {
                            let init = self.expr(init)?;
                            self.w.line(format!("thread {declarator} = {init};"));
                        }
                        None => self.w.line(format!("thread {declarator};")),
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ----- types --------------------------------------------------------

    fn ty(&self, handle: Handle<Type>, span: Span) -> Result<String, EmitError> {
        let inner = &self.program.types()[handle].inner;
        Ok(match inner {
            TypeInner::Void => "void".into(),
            TypeInner::Scalar(s) => scalar_name(*s, span)?.into(),
            TypeInner::Atomic(s) => match s.kind {
                ScalarKind::Sint => "atomic_int".into(),
                ScalarKind::Uint => "atomic_uint".into(),
                _ => {
                    return Err(unsupported(span, "atomics require i32 or u32"));
                }
            },
            TypeInner::Vector { size, scalar } => {
                format!("{}{}", scalar_name(*scalar, span)?, *size as u32)
            }
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } => format!(
                "{}{}x{}",
                scalar_name(*scalar, span)?,
                *columns as u32,
                *rows as u32
            ),
            TypeInner::Struct { .. } => safe_name(
                self.program.types()[handle]
                    .name
                    .as_deref()
                    .unwrap_or("anonymous"),
            ),
            TypeInner::Array { .. } => {
                return Err(unsupported(span, "array type outside a declarator"));
            }
            TypeInner::Sampler => "sampler".into(),
            TypeInner::SampledTexture2d { scalar } => {
                format!("texture2d<{}>", scalar_name(*scalar, span)?)
            }
            TypeInner::TextureExternal => {
                return Err(unsupported(
                    span,
                    "external textures must be expanded before MSL emission",
                ));
            }
            TypeInner::Pointer { base, space } => {
                let qualifier = match space {
                    AddressSpace::Function | AddressSpace::Private => "thread",
                    AddressSpace::Workgroup => "threadgroup",
                    AddressSpace::Uniform => "constant",
                    AddressSpace::Storage { .. } => "device",
                    AddressSpace::Handle => {
                        return Err(unsupported(span, "pointers to resource handles"));
                    }
                };
                format!("{qualifier} {}*", self.ty(*base, span)?)
            }
        })
    }

    /// A `type name[dims]` declarator, peeling array layers into
    /// suffixes.
    fn declarator(
        &self,
        mut handle: Handle<Type>,
        name: &str,
        span: Span,
    ) -> Result<String, EmitError> {
        let mut suffix = String::new();
        while let TypeInner::Array { base, size, .. } = self.program.types()[handle].inner {
            match size {
                ArraySize::Constant(n) => suffix.push_str(&format!("[{n}]")),
                ArraySize::Dynamic => {
                    return Err(unsupported(
                        span,
                        "runtime-sized arrays are only valid as storage buffers",
                    ));
                }
            }
            handle = base;
        }
        Ok(format!("{} {name}{suffix}", self.ty(handle, span)?))
    }

    // ----- statements ---------------------------------------------------

    fn block_body(&mut self, block: &Block) -> Result<(), EmitError> {
        self.w.indent();
        for stmt in &block.statements {
            self.statement(stmt)?;
        }
        self.w.dedent();
        Ok(())
    }

    fn statement(&mut self, stmt: &Statement) -> Result<(), EmitError> {
        match &stmt.kind {
            StatementKind::Decl(decl) => {
                let ty = self
                    .program
                    .local_symbol(decl.name.span)
                    .map(|symbol| match self.program.symbol_binding(symbol) {
                        SymbolBinding::Local(local) => local.ty,
                        _ => unreachable!("local symbol bound elsewhere"),
                    })
                    .expect("local declaration has a symbol");
                let declarator =
                    self.declarator(ty, &safe_name(&decl.name.name), decl.name.span)?;
                match decl.init {
                    Some(init) => {
                        let init = self.expr(init)?;
                        self.w.line(format!("{declarator} = {init};"));
                    }
                    None => self.w.line(format!("{declarator};")),
                }
            }
            StatementKind::Assign { target, op, value } => {
                let value_text = self.expr(*value)?;
                match target {
                    AssignTarget::Phony(_) => {
                        self.w.line(format!("(void)({value_text});"));
                    }
                    AssignTarget::Expr(target) => {
                        let target = self.expr(*target)?;
                        let operator = match op {
                            Some(op) => format!("{}=", binary_op_str(*op)),
                            None => "=".to_string(),
                        };
                        self.w.line(format!("{target} {operator} {value_text};"));
                    }
                }
            }
            StatementKind::Increment(target) => {
                let target = self.expr(*target)?;
                self.w.line(format!("{target}++;"));
            }
            StatementKind::Decrement(target) => {
                let target = self.expr(*target)?;
                self.w.line(format!("{target}--;"));
            }
            StatementKind::If { .. } => self.if_chain(stmt, "if")?,
            StatementKind::Loop {
                body,
                continuing,
                break_if,
            } => {
                self.w.line("while (true) {");
                self.w.indent();
                for stmt in &body.statements {
                    self.statement(stmt)?;
                }
                if let Some(continuing) = continuing {
                    for stmt in &continuing.statements {
                        self.statement(stmt)?;
                    }
                }
                if let Some(break_if) = break_if {
                    let cond = self.expr(*break_if)?;
                    self.w.line(format!("if ({cond}) {{ break; }}"));
                }
                self.w.dedent();
                self.w.line("}");
            }
            StatementKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let init = match init.as_deref() {
                    Some(stmt) => self.simple_statement_text(stmt)?,
                    None => String::new(),
                };
                let condition = match condition {
                    Some(c) => self.expr(*c)?,
                    None => String::new(),
                };
                let update = match update.as_deref() {
                    Some(stmt) => self.simple_statement_text(stmt)?,
                    None => String::new(),
                };
                self.w
                    .line(format!("for ({init}; {condition}; {update}) {{"));
                self.block_body(body)?;
                self.w.line("}");
            }
            StatementKind::While { condition, body } => {
                let cond = self.expr(*condition)?;
                self.w.line(format!("while ({cond}) {{"));
                self.block_body(body)?;
                self.w.line("}");
            }
            StatementKind::Switch { selector, cases } => {
                let selector = self.expr(*selector)?;
                self.w.line(format!("switch ({selector}) {{"));
                self.w.indent();
                for case in cases {
                    if case.selectors.is_empty() {
                        self.w.line("default: {");
                    } else {
                        let mut selectors = Vec::new();
                        for &sel in &case.selectors {
                            selectors.push(format!("case {}:", self.expr(sel)?));
                        }
                        let last = selectors.pop().unwrap_or_default();
                        for label in selectors {
                            self.w.line(label);
                        }
                        self.w.line(format!("{last} {{"));
                    }
                    self.w.indent();
                    for stmt in &case.body.statements {
                        self.statement(stmt)?;
                    }
                    self.w.line("break;");
                    self.w.dedent();
                    self.w.line("}");
                }
                self.w.dedent();
                self.w.line("}");
            }
            StatementKind::Break => self.w.line("break;"),
            StatementKind::Continue => self.w.line("continue;"),
            StatementKind::Return { value } => match value {
                Some(value) => {
                    let value = self.expr(*value)?;
                    self.w.line(format!("return {value};"));
                }
                None => self.w.line("return;"),
            },
            StatementKind::Discard => self.w.line("discard_fragment();"),
            StatementKind::ConstAssert(_) => {}
            StatementKind::Call(expr) => {
                let call = self.expr(*expr)?;
                self.w.line(format!("{call};"));
            }
            StatementKind::Block(block) => {
                self.w.line("{");
                self.block_body(block)?;
                self.w.line("}");
            }
        }
        Ok(())
    }

    fn simple_statement_text(&mut self, stmt: &Statement) -> Result<String, EmitError> {
        Ok(match &stmt.kind {
            StatementKind::Decl(decl) => {
                let ty = self
                    .program
                    .local_symbol(decl.name.span)
                    .map(|symbol| match self.program.symbol_binding(symbol) {
                        SymbolBinding::Local(local) => local.ty,
                        _ => unreachable!("local symbol bound elsewhere"),
                    })
                    .expect("local declaration has a symbol");
                let declarator =
                    self.declarator(ty, &safe_name(&decl.name.name), decl.name.span)?;
                match decl.init {
                    Some(init) => format!("{declarator} = {}", self.expr(init)?),
                    None => declarator,
                }
            }
            StatementKind::Assign { target, op, value } => {
                let value_text = self.expr(*value)?;
                match target {
                    AssignTarget::Phony(_) => format!("(void)({value_text})"),
                    AssignTarget::Expr(target) => {
                        let target = self.expr(*target)?;
                        let operator = match op {
                            Some(op) => format!("{}=", binary_op_str(*op)),
                            None => "=".to_string(),
                        };
                        format!("{target} {operator} {value_text}")
                    }
                }
            }
            StatementKind::Increment(target) => format!("{}++", self.expr(*target)?),
            StatementKind::Decrement(target) => format!("{}--", self.expr(*target)?),
            StatementKind::Call(expr) => self.expr(*expr)?,
            _ => String::new(),
        })
    }

    fn if_chain(&mut self, stmt: &Statement, keyword: &str) -> Result<(), EmitError> {
        let StatementKind::If {
            condition,
            then_block,
            else_statement,
        } = &stmt.kind
        else {
            unreachable!("if_chain on a non-if statement");
        };
        let cond = self.expr(*condition)?;
        self.w.line(format!("{keyword} ({cond}) {{"));
        self.block_body(then_block)?;
        match else_statement.as_deref() {
            None => self.w.line("}"),
            Some(else_stmt) => match &else_stmt.kind {
                StatementKind::If { .. } => self.if_chain(else_stmt, "} else if")?,
                StatementKind::Block(block) => {
                    self.w.line("} else {");
                    self.block_body(block)?;
                    self.w.line("}");
                }
                _ => unreachable!("else holds an if or a block"),
            },
        }
        Ok(())
    }

    // ----- expressions --------------------------------------------------

    fn expr(&self, id: ExprId) -> Result<String, EmitError> {
        let expr = &self.program.ast().exprs[id];
        Ok(match &expr.kind {
            ExpressionKind::Literal(lit) => self.literal(id, *lit),
            ExpressionKind::Ident(ident) => {
                if !self.in_entry {
                    if let Some(symbol) = self.program.expr_info(id).symbol {
                        if matches!(
                            self.program.symbol_binding(symbol),
                            SymbolBinding::GlobalVar(_)
                        ) {
                            return Err(unsupported(
                                expr.span,
                                "module-scope variables in helper functions are not supported by the MSL backend",
                            ));
                        }
                    }
                }
                safe_name(&ident.name)
            }
            ExpressionKind::Unary { op, expr: operand } => match op {
                UnaryOp::AddressOf => format!("&{}", self.operand(*operand)?),
                UnaryOp::Deref => format!("*{}", self.operand(*operand)?),
                UnaryOp::Negate => format!("-{}", self.operand(*operand)?),
                UnaryOp::LogicalNot => format!("!{}", self.operand(*operand)?),
                UnaryOp::BitwiseNot => format!("~{}", self.operand(*operand)?),
            },
            ExpressionKind::Binary { op, left, right } => format!(
                "{} {} {}",
                self.operand(*left)?,
                binary_op_str(*op),
                self.operand(*right)?
            ),
            ExpressionKind::Call { args, .. } => self.call(id, args, expr.span)?,
            ExpressionKind::Index { base, index } => {
                format!("{}[{}]", self.operand(*base)?, self.expr(*index)?)
            }
            ExpressionKind::Member { base, member } => {
                let base = self.operand(*base)?;
                match self.program.expr_info(id).member {
                    // Swizzle letters are never renamed; fields follow
                    // their declaration.
                    Some(shade_resolver::MemberAccess::Swizzle(_)) | None => {
                        format!("{base}.{}", member.name)
                    }
                    Some(shade_resolver::MemberAccess::Field(_)) => {
                        format!("{base}.{}", safe_name(&member.name))
                    }
                }
            }
        })
    }

    fn operand(&self, id: ExprId) -> Result<String, EmitError> {
        let text = self.expr(id)?;
        Ok(match &self.program.ast().exprs[id].kind {
            ExpressionKind::Binary { .. } => format!("({text})"),
            _ => text,
        })
    }

    fn literal(&self, id: ExprId, lit: Literal) -> String {
        let scalar = self.program.types()[self.program.expr_type(id)]
            .inner
            .scalar()
            .unwrap_or(Scalar::F32);
        let value = match lit {
            Literal::Bool(v) => return v.to_string(),
            Literal::AbstractInt(v) => v as f64,
            Literal::I32(v) => f64::from(v),
            Literal::U32(v) => f64::from(v),
            Literal::AbstractFloat(v) => v,
            Literal::F32(v) => f64::from(v),
            Literal::F16(v) => f64::from(v),
        };
        match scalar.kind {
            ScalarKind::Bool => (value != 0.0).to_string(),
            ScalarKind::Uint => format!("{}u", value as u64),
            ScalarKind::Sint | ScalarKind::AbstractInt => format!("{}", value as i64),
            ScalarKind::Float | ScalarKind::AbstractFloat => {
                if scalar.width == 2 {
                    format!("{value:?}h")
                } else {
                    format!("{value:?}f")
                }
            }
        }
    }

    fn call(&self, id: ExprId, args: &[ExprId], span: Span) -> Result<String, EmitError> {
        let info = self.program.expr_info(id);
        let mut rendered = Vec::with_capacity(args.len());
        for &arg in args {
            rendered.push(self.expr(arg)?);
        }
        match info.call_target {
            Some(CallTarget::Construct(target)) => match self.program.types()[target].inner {
                TypeInner::Struct { .. } | TypeInner::Array { .. } => {
                    if rendered.is_empty() {
                        Ok("{}".to_string())
                    } else {
                        Ok(format!("{{ {} }}", rendered.join(", ")))
                    }
                }
                _ => {
                    let ty = self.ty(target, span)?;
                    Ok(format!("{ty}({})", rendered.join(", ")))
                }
            },
            Some(CallTarget::Function(index)) => {
                let Declaration::Function(f) = &self.program.ast().declarations[index] else {
                    unreachable!("call target is a function");
                };
                Ok(format!(
                    "{}({})",
                    safe_name(&f.name.name),
                    rendered.join(", ")
                ))
            }
            Some(CallTarget::Builtin(fun)) => self.builtin_call(fun, &rendered, span),
            None => unreachable!("unresolved call in a valid program"),
        }
    }

    fn builtin_call(
        &self,
        fun: Builtin,
        args: &[String],
        span: Span,
    ) -> Result<String, EmitError> {
        use Builtin as B;
        let name = match fun {
            B::ArrayLength => {
                return Err(unsupported(
                    span,
                    "arrayLength is not supported by the MSL backend",
                ));
            }
            B::TextureSample => {
                return Ok(format!("{}.sample({}, {})", args[0], args[1], args[2]));
            }
            B::TextureLoad => {
                return Ok(format!(
                    "{}.read(uint2({}), uint({}))",
                    args[0], args[1], args[2]
                ));
            }
            B::TextureDimensions => {
                return Ok(format!(
                    "uint2({0}.get_width(), {0}.get_height())",
                    args[0]
                ));
            }
            B::InverseSqrt => "rsqrt",
            B::Dpdx => "dfdx",
            B::Dpdy => "dfdy",
            B::WorkgroupBarrier => {
                return Ok("threadgroup_barrier(mem_flags::mem_threadgroup)".into());
            }
            B::StorageBarrier => {
                return Ok("threadgroup_barrier(mem_flags::mem_device)".into());
            }
            B::AtomicLoad => {
                return Ok(format!(
                    "atomic_load_explicit({}, memory_order_relaxed)",
                    args[0]
                ));
            }
            B::AtomicStore => {
                return Ok(format!(
                    "atomic_store_explicit({}, {}, memory_order_relaxed)",
                    args[0], args[1]
                ));
            }
            B::AtomicExchange => {
                return Ok(format!(
                    "atomic_exchange_explicit({}, {}, memory_order_relaxed)",
                    args[0], args[1]
                ));
            }
            B::AtomicAdd | B::AtomicSub | B::AtomicAnd | B::AtomicOr | B::AtomicXor
            | B::AtomicMin | B::AtomicMax => {
                let op = match fun {
                    B::AtomicAdd => "add",
                    B::AtomicSub => "sub",
                    B::AtomicAnd => "and",
                    B::AtomicOr => "or",
                    B::AtomicXor => "xor",
                    B::AtomicMin => "min",
                    _ => "max",
                };
                return Ok(format!(
                    "atomic_fetch_{op}_explicit({}, {}, memory_order_relaxed)",
                    args[0], args[1]
                ));
            }
            other => other.wgsl_name(),
        };
        Ok(format!("{name}({})", args.join(", ")))
    }
}

fn scalar_name(scalar: Scalar, _span: Span) -> Result<&'static str, EmitError> {
    Ok(match (scalar.kind, scalar.width) {
        (ScalarKind::Bool, _) => "bool",
        (ScalarKind::Sint | ScalarKind::AbstractInt, _) => "int",
        (ScalarKind::Uint, _) => "uint",
        (ScalarKind::Float, 2) => "half",
        (ScalarKind::Float | ScalarKind::AbstractFloat, _) => "float",
    })
}

fn binary_op_str(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Modulo => "%",
        BinaryOp::Equal => "==",
        BinaryOp::NotEqual => "!=",
        BinaryOp::Less => "<",
        BinaryOp::LessEqual => "<=",
        BinaryOp::Greater => ">",
        BinaryOp::GreaterEqual => ">=",
        BinaryOp::LogicalAnd => "&&",
        BinaryOp::LogicalOr => "||",
        BinaryOp::BitwiseAnd => "&",
        BinaryOp::BitwiseOr => "|",
        BinaryOp::BitwiseXor => "^",
        BinaryOp::ShiftLeft => "<<",
        BinaryOp::ShiftRight => ">>",
    }
}
