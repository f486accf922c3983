//! The GLSL rendering walk.
//!
//! Buffer-backed globals become named interface blocks whose single
//! member is reached as `name.inner`; entry-point parameters map onto
//! `gl_*` builtins or `in` globals, and the entry point itself is
//! rendered as `void main()`. GLSL keeps real module-scope globals, so
//! helper functions need no special casing.

use std::collections::HashMap;

use shade_backend_core::{BackendOptions, EmitError, GlslVersion, IndentedWriter};
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
    options: &BackendOptions,
) -> Result<String, EmitError> {
    let mut emitter = Emitter {
        program,
        w: IndentedWriter::new(2),
        version: options.glsl_version,
        builtin_params: HashMap::new(),
        return_sink: None,
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

/// GLSL keywords and builtins a WGSL identifier may collide with.
/// `main` is taken by the entry point.
const RESERVED: &[&str] = &[
    "main", "input", "output", "buffer", "uniform", "shared", "sample", "texture", "in", "out",
    "inout", "flat", "attribute", "varying", "layout", "precision", "lowp", "mediump", "highp",
    "active", "common", "filter", "partition", "superp",
];

fn safe_name(name: &str) -> String {
    if RESERVED.contains(&name) {
        format!("{name}_1")
    } else {
        name.to_string()
    }
}

/// Where an entry point's return value lands.
#[derive(Clone)]
enum ReturnSink {
    /// A `layout(location = N) out` global.
    OutVar(String),
    /// `gl_Position`.
    Position,
    /// `gl_FragDepth`.
    FragDepth,
}

struct Emitter<'a> {
    program: &'a Program,
    w: IndentedWriter,
    version: GlslVersion,
    /// Entry-point builtin parameters, rewritten to `gl_*` spellings in
    /// the body. Cleared per function.
    builtin_params: HashMap<String, String>,
    /// Set while emitting an entry point with a return value.
    return_sink: Option<ReturnSink>,
}

impl Emitter<'_> {
    fn module(&mut self) -> Result<(), EmitError> {
        self.w.line(format!("#version {}", self.version));
        if matches!(self.version, GlslVersion::Es(_)) {
            self.w.blank();
            self.w.line("precision highp float;");
            self.w.line("precision highp int;");
        }

        let mut entry_seen = false;
        for (index, decl) in self.program.ast().declarations.iter().enumerate() {
            if let Declaration::Function(f) = decl {
                let is_entry = self
                    .program
                    .function_info(index)
                    .is_some_and(|info| info.stage.is_some());
                if is_entry && entry_seen {
                    return Err(unsupported(
                        f.name.span,
                        "GLSL output supports a single entry point per module",
                    ));
                }
                entry_seen |= is_entry;
            }
        }

        for (index, decl) in self.program.ast().declarations.iter().enumerate() {
            if matches!(decl, Declaration::Alias(_) | Declaration::ConstAssert(_)) {
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
                        self.declarator(member.ty, &safe_name(&member.name), s.name.span, false)?;
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
                    self.declarator(info.ty, &safe_name(&c.name.name), c.name.span, false)?;
                let init = self.expr(c.init)?;
                self.w.line(format!("const {declarator} = {init};"));
                Ok(())
            }
            Declaration::Var(v) => self.global_var(index, v),
            Declaration::Function(f) => self.function(index, f),
            Declaration::Alias(_) | Declaration::ConstAssert(_) => Ok(()),
        }
    }

    fn global_var(
        &mut self,
        index: usize,
        v: &shade_parser::ast::GlobalVar,
    ) -> Result<(), EmitError> {
        let DeclInfo::Var(info) = self.program.decl_info(index) else {
            return Ok(());
        };
        let name = safe_name(&v.name.name);
        let span = v.name.span;
        let binding = info.binding.map(|b| b.binding).unwrap_or(0);
        match info.space {
            AddressSpace::Uniform => {
                let member = self.declarator(info.ty, "inner", span, false)?;
                self.w.line(format!(
                    "layout(binding = {binding}, std140) uniform {}_block_ubo {{",
                    v.name.name
                ));
                self.w.indent();
                self.w.line(format!("{member};"));
                self.w.dedent();
                self.w.line(format!("}} {name};"));
            }
            AddressSpace::Storage { access } => {
                let qualifier = if access.contains(StorageAccess::STORE) {
                    ""
                } else {
                    "readonly "
                };
                let member = self.declarator(info.ty, "inner", span, true)?;
                self.w.line(format!(
                    "layout(binding = {binding}, std430) {qualifier}buffer {}_block_ssbo {{",
                    v.name.name
                ));
                self.w.indent();
                self.w.line(format!("{member};"));
                self.w.dedent();
                self.w.line(format!("}} {name};"));
            }
            AddressSpace::Handle => match self.program.types()[info.ty].inner {
                // Samplers fold into the combined sampler2D declared for
                // the texture they sample with.
                TypeInner::Sampler => {}
                TypeInner::SampledTexture2d { scalar } => {
                    let prefix = match scalar.kind {
                        ScalarKind::Sint => "i",
                        ScalarKind::Uint => "u",
                        _ => "",
                    };
                    self.w.line(format!(
                        "layout(binding = {binding}) uniform {prefix}sampler2D {name};"
                    ));
                }
                _ => {
                    return Err(unsupported(
                        span,
                        "external textures must be expanded before GLSL emission",
                    ));
                }
            },
            AddressSpace::Private => {
                let declarator = self.declarator(info.ty, &name, span, false)?;
                match v.init {
                    Some(init) => {
                        let init = self.expr(init)?;
                        self.w.line(format!("{declarator} = {init};"));
                    }
                    None => self.w.line(format!("{declarator};")),
                }
            }
            AddressSpace::Workgroup => {
                let declarator = self.declarator(info.ty, &name, span, false)?;
                self.w.line(format!("shared {declarator};"));
            }
            AddressSpace::Function => {}
        }
        Ok(())
    }

    fn function(&mut self, index: usize, f: &shade_parser::ast::Function) -> Result<(), EmitError> {
        let info = self
            .program
            .function_info(index)
            .expect("declaration is a function");
        let span = f.name.span;
        self.builtin_params.clear();
        self.return_sink = None;

        let Some(stage) = info.stage else {
            let return_ty = match info.return_ty {
                Some(ty) => self.ty(ty, span)?,
                None => "void".to_string(),
            };
            let mut params = Vec::new();
            for (param, &ty) in f.params.iter().zip(&info.param_types) {
                let ty = self.ty(ty, param.name.span)?;
                params.push(format!("{ty} {}", safe_name(&param.name.name)));
            }
            self.w.line(format!(
                "{return_ty} {}({}) {{",
                safe_name(&f.name.name),
                params.join(", ")
            ));
            self.block_body(&f.body)?;
            self.w.line("}");
            return Ok(());
        };

        // Entry-point IO becomes module-scope `in`/`out` globals; builtin
        // parameters are rewritten to their gl_* spellings in the body.
        for (param, &param_ty) in f.params.iter().zip(&info.param_types) {
            for attr in &param.attributes {
                match &attr.kind {
                    AttributeKind::Builtin(name) => {
                        let gl = builtin_input(&name.name)
                            .ok_or_else(|| {
                                unsupported(
                                    attr.span,
                                    format!("GLSL has no input for builtin '{}'", name.name),
                                )
                            })?
                            .to_string();
                        self.builtin_params.insert(param.name.name.clone(), gl);
                    }
                    AttributeKind::Location(expr) => {
                        let location = self.program.const_u32(*expr).unwrap_or(0);
                        let ty = self.ty(param_ty, param.name.span)?;
                        self.w.line(format!(
                            "layout(location = {location}) in {ty} {};",
                            safe_name(&param.name.name)
                        ));
                    }
                    _ => {}
                }
            }
        }

        if let Some(return_ty) = info.return_ty {
            let mut sink = None;
            for attr in &f.return_attributes {
                match &attr.kind {
                    AttributeKind::Builtin(name) => {
                        sink = Some(match name.name.as_str() {
                            "position" => ReturnSink::Position,
                            "frag_depth" => ReturnSink::FragDepth,
                            other => {
                                return Err(unsupported(
                                    attr.span,
                                    format!("GLSL has no output for builtin '{other}'"),
                                ));
                            }
                        });
                    }
                    AttributeKind::Location(expr) => {
                        let location = self.program.const_u32(*expr).unwrap_or(0);
                        let ty = self.ty(return_ty, span)?;
                        let out_name = format!("{}_out", f.name.name);
                        self.w.line(format!(
                            "layout(location = {location}) out {ty} {out_name};"
                        ));
                        sink = Some(ReturnSink::OutVar(out_name));
                    }
                    _ => {}
                }
            }
            self.return_sink = Some(sink.ok_or_else(|| {
                unsupported(span, "entry point return value has no IO attribute")
            })?);
        }

        if stage == Stage::Compute {
            let [x, y, z] = info.workgroup_size.unwrap_or([1, 1, 1]);
            self.w.blank();
            self.w.line(format!(
                "layout(local_size_x = {x}, local_size_y = {y}, local_size_z = {z}) in;"
            ));
        }

        self.w.line("void main() {");
        self.block_body(&f.body)?;
        self.w.line("}");
        self.builtin_params.clear();
        self.return_sink = None;
        Ok(())
    }

    // ----- types --------------------------------------------------------

    fn ty(&self, handle: Handle<Type>, span: Span) -> Result<String, EmitError> {
        let inner = &self.program.types()[handle].inner;
        Ok(match inner {
            TypeInner::Void => "void".into(),
            TypeInner::Scalar(s) | TypeInner::Atomic(s) => scalar_name(*s, span)?.into(),
            TypeInner::Vector { size, scalar } => {
                let prefix = match scalar.kind {
                    ScalarKind::Bool => "b",
                    ScalarKind::Sint => "i",
                    ScalarKind::Uint => "u",
                    _ => "",
                };
                format!("{prefix}vec{}", *size as u32)
            }
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } => {
                if scalar.width == 2 {
                    return Err(unsupported(span, "f16 matrices are not representable in GLSL"));
                }
                format!("mat{}x{}", *columns as u32, *rows as u32)
            }
            TypeInner::Struct { .. } => safe_name(
                self.program.types()[handle]
                    .name
                    .as_deref()
                    .unwrap_or("anonymous"),
            ),
            TypeInner::Array { .. } => {
                return Err(unsupported(span, "array type outside a declarator"));
            }
            TypeInner::Sampler => {
                return Err(unsupported(span, "free-standing samplers have no GLSL type"));
            }
            TypeInner::SampledTexture2d { scalar } => {
                let prefix = match scalar.kind {
                    ScalarKind::Sint => "i",
                    ScalarKind::Uint => "u",
                    _ => "",
                };
                format!("{prefix}sampler2D")
            }
            TypeInner::TextureExternal => {
                return Err(unsupported(
                    span,
                    "external textures must be expanded before GLSL emission",
                ));
            }
            TypeInner::Pointer { .. } => {
                return Err(unsupported(span, "pointers are not representable in GLSL"));
            }
        })
    }

    /// A `type name[dims]` declarator. Runtime-sized arrays render as
    /// `[]` and are only valid as the last member of a storage block.
    fn declarator(
        &self,
        mut handle: Handle<Type>,
        name: &str,
        span: Span,
        allow_runtime: bool,
    ) -> Result<String, EmitError> {
        let mut suffix = String::new();
        while let TypeInner::Array { base, size, .. } = self.program.types()[handle].inner {
            match size {
                ArraySize::Constant(n) => suffix.push_str(&format!("[{n}]")),
                ArraySize::Dynamic => {
                    if !allow_runtime {
                        return Err(unsupported(
                            span,
                            "runtime-sized arrays are only valid as storage buffers",
                        ));
                    }
                    suffix.push_str("[]");
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
                    self.declarator(ty, &safe_name(&decl.name.name), decl.name.span, false)?;
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
                        self.w.line(format!("{value_text};"));
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
            StatementKind::Return { value } => match (value, self.return_sink.clone()) {
                (Some(value), Some(sink)) => {
                    let value = self.expr(*value)?;
                    let target = match sink {
                        ReturnSink::OutVar(name) => name,
                        ReturnSink::Position => "gl_Position".to_string(),
                        ReturnSink::FragDepth => "gl_FragDepth".to_string(),
                    };
                    self.w.line(format!("{target} = {value};"));
                    self.w.line("return;");
                }
                (Some(value), None) => {
                    let value = self.expr(*value)?;
                    self.w.line(format!("return {value};"));
                }
                (None, _) => self.w.line("return;"),
            },
            StatementKind::Discard => self.w.line("discard;"),
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
                    self.declarator(ty, &safe_name(&decl.name.name), decl.name.span, false)?;
                match decl.init {
                    Some(init) => format!("{declarator} = {}", self.expr(init)?),
                    None => declarator,
                }
            }
            StatementKind::Assign { target, op, value } => {
                let value_text = self.expr(*value)?;
                match target {
                    AssignTarget::Phony(_) => value_text,
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
            ExpressionKind::Ident(ident) => self.ident(id, &ident.name),
            ExpressionKind::Unary { op, expr: operand } => match op {
                // GLSL has no pointers; address-of and deref erase.
                UnaryOp::AddressOf | UnaryOp::Deref => self.expr(*operand)?,
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
                    Some(shade_resolver::MemberAccess::Field(_)) => {
                        format!("{base}.{}", safe_name(&member.name))
                    }
                    _ => format!("{base}.{}", member.name),
                }
            }
        })
    }

    /// Identifier spelling: entry builtin params map to `gl_*`,
    /// buffer-backed globals are reached through their block instance.
    fn ident(&self, id: ExprId, name: &str) -> String {
        if let Some(gl) = self.builtin_params.get(name) {
            return gl.clone();
        }
        if let Some(symbol) = self.program.expr_info(id).symbol {
            if let SymbolBinding::GlobalVar(index) = self.program.symbol_binding(symbol) {
                if let DeclInfo::Var(info) = self.program.decl_info(*index) {
                    if matches!(
                        info.space,
                        AddressSpace::Uniform | AddressSpace::Storage { .. }
                    ) {
                        return format!("{}.inner", safe_name(name));
                    }
                }
            }
        }
        safe_name(name)
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
            ScalarKind::Float | ScalarKind::AbstractFloat => format!("{value:?}"),
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
                TypeInner::Array { base, size, .. } => {
                    let element = self.ty(base, span)?;
                    let count = match size {
                        ArraySize::Constant(n) => n,
                        ArraySize::Dynamic => {
                            return Err(unsupported(
                                span,
                                "runtime-sized arrays cannot be constructed",
                            ));
                        }
                    };
                    Ok(format!("{element}[{count}]({})", rendered.join(", ")))
                }
                _ => {
                    let ty = self.ty(target, span)?;
                    if rendered.is_empty() {
                        Ok(format!("{ty}(0)"))
                    } else {
                        Ok(format!("{ty}({})", rendered.join(", ")))
                    }
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
            Some(CallTarget::Builtin(fun)) => self.builtin_call(fun, &rendered),
            None => unreachable!("unresolved call in a valid program"),
        }
    }

    fn builtin_call(&self, fun: Builtin, args: &[String]) -> Result<String, EmitError> {
        use Builtin as B;
        let name = match fun {
            B::Select => {
                return Ok(format!("({} ? {} : {})", args[2], args[1], args[0]));
            }
            B::ArrayLength => {
                return Ok(format!("uint({}.length())", args[0]));
            }
            B::Saturate => {
                return Ok(format!("clamp({}, 0.0, 1.0)", args[0]));
            }
            B::Atan2 => "atan",
            B::InverseSqrt => "inversesqrt",
            B::Dpdx => "dFdx",
            B::Dpdy => "dFdy",
            B::WorkgroupBarrier => return Ok("barrier()".into()),
            B::StorageBarrier => return Ok("memoryBarrierBuffer()".into()),
            B::AtomicLoad => return Ok(args[0].clone()),
            B::AtomicStore => return Ok(format!("{} = {}", args[0], args[1])),
            B::AtomicSub => {
                return Ok(format!("atomicAdd({}, -({}))", args[0], args[1]));
            }
            B::AtomicAdd => "atomicAdd",
            B::AtomicAnd => "atomicAnd",
            B::AtomicOr => "atomicOr",
            B::AtomicXor => "atomicXor",
            B::AtomicMin => "atomicMin",
            B::AtomicMax => "atomicMax",
            B::AtomicExchange => "atomicExchange",
            B::TextureSample => {
                return Ok(format!("texture({}, {})", args[0], args[2]));
            }
            B::TextureLoad => {
                return Ok(format!(
                    "texelFetch({}, ivec2({}), int({}))",
                    args[0], args[1], args[2]
                ));
            }
            B::TextureDimensions => {
                return Ok(format!("uvec2(textureSize({}, 0))", args[0]));
            }
            other => other.wgsl_name(),
        };
        Ok(format!("{name}({})", args.join(", ")))
    }
}

fn builtin_input(name: &str) -> Option<&'static str> {
    Some(match name {
        "global_invocation_id" => "gl_GlobalInvocationID",
        "local_invocation_id" => "gl_LocalInvocationID",
        "local_invocation_index" => "gl_LocalInvocationIndex",
        "workgroup_id" => "gl_WorkGroupID",
        "num_workgroups" => "gl_NumWorkGroups",
        "position" => "gl_FragCoord",
        "vertex_index" => "uint(gl_VertexID)",
        "instance_index" => "uint(gl_InstanceID)",
        "front_facing" => "gl_FrontFacing",
        "sample_index" => "uint(gl_SampleID)",
        "sample_mask" => "uint(gl_SampleMaskIn[0])",
        _ => return None,
    })
}

fn scalar_name(scalar: Scalar, span: Span) -> Result<&'static str, EmitError> {
    match (scalar.kind, scalar.width) {
        (ScalarKind::Bool, _) => Ok("bool"),
        (ScalarKind::Sint | ScalarKind::AbstractInt, _) => Ok("int"),
        (ScalarKind::Uint, _) => Ok("uint"),
        (ScalarKind::Float, 2) => Err(unsupported(span, "f16 is not representable in GLSL")),
        (ScalarKind::Float | ScalarKind::AbstractFloat, _) => Ok("float"),
    }
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
