//! The HLSL rendering walk.

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

struct Emitter<'a> {
    program: &'a Program,
    w: IndentedWriter,
}

impl Emitter<'_> {
    fn module(&mut self) -> Result<(), EmitError> {
        let mut first = true;
        for (index, decl) in self.program.ast().declarations.iter().enumerate() {
            if matches!(decl, Declaration::Alias(_) | Declaration::ConstAssert(_)) {
                continue;
            }
            if !first {
                self.w.blank();
            }
            first = false;
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
                self.w.line(format!("struct {} {{", s.name.name));
                self.w.indent();
                for member in &members {
                    let declarator = self.declarator(member.ty, &member.name, s.name.span)?;
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
                let declarator = self.declarator(info.ty, &c.name.name, c.name.span)?;
                let init = self.expr(c.init)?;
                self.w.line(format!("static const {declarator} = {init};"));
                Ok(())
            }
            Declaration::Var(v) => self.global_var(index, decl, v),
            Declaration::Function(f) => self.function(index, f),
            Declaration::Alias(_) | Declaration::ConstAssert(_) => Ok(()),
        }
    }

    fn global_var(
        &mut self,
        index: usize,
        _decl: &Declaration,
        v: &shade_parser::ast::GlobalVar,
    ) -> Result<(), EmitError> {
        let DeclInfo::Var(info) = self.program.decl_info(index) else {
            return Ok(());
        };
        let name = &v.name.name;
        let span = v.name.span;
        let (group, binding) = info
            .binding
            .map(|b| (b.group, b.binding))
            .unwrap_or((0, 0));
        match info.space {
            AddressSpace::Uniform => {
                let ty = self.ty(info.ty, span)?;
                self.w.line(format!(
                    "cbuffer cbuffer_{name} : register(b{binding}, space{group}) {{"
                ));
                self.w.indent();
                self.w.line(format!("{ty} {name};"));
                self.w.dedent();
                self.w.line("};");
            }
            AddressSpace::Storage { access } => {
                let element = match self.program.types()[info.ty].inner {
                    TypeInner::Array { base, .. } => base,
                    _ => info.ty,
                };
                let element = self.ty(element, span)?;
                let writable = access.contains(StorageAccess::STORE);
                let (prefix, register) = if writable { ("RW", 'u') } else { ("", 't') };
                self.w.line(format!(
                    "{prefix}StructuredBuffer<{element}> {name} : register({register}{binding}, space{group});"
                ));
            }
            AddressSpace::Handle => match self.program.types()[info.ty].inner {
                TypeInner::Sampler => {
                    self.w.line(format!(
                        "SamplerState {name} : register(s{binding}, space{group});"
                    ));
                }
                TypeInner::SampledTexture2d { scalar } => {
                    let component = scalar_name(scalar, span)?;
                    self.w.line(format!(
                        "Texture2D<{component}4> {name} : register(t{binding}, space{group});"
                    ));
                }
                _ => {
                    return Err(unsupported(
                        span,
                        "external textures must be expanded before HLSL emission",
                    ));
                }
            },
            AddressSpace::Private => {
                let declarator = self.declarator(info.ty, name, span)?;
                match v.init {
                    Some(init) => {
                        let init = self.expr(init)?;
                        self.w.line(format!("static {declarator} = {init};"));
                    }
                    None => self.w.line(format!("static {declarator};")),
                }
            }
            AddressSpace::Workgroup => {
                let declarator = self.declarator(info.ty, name, span)?;
                self.w.line(format!("groupshared {declarator};"));
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

        if let (Some(Stage::Compute), Some([x, y, z])) = (info.stage, info.workgroup_size) {
            self.w.line(format!("[numthreads({x}, {y}, {z})]"));
        }

        let return_ty = match info.return_ty {
            Some(ty) => self.ty(ty, f.name.span)?,
            None => "void".to_string(),
        };
        let return_semantic = match info.stage {
            Some(Stage::Vertex) | Some(Stage::Fragment) => {
                format!(" : {}", self.io_semantic(&f.return_attributes, f.name.span)?)
            }
            _ => String::new(),
        };

        let mut params = Vec::new();
        for (param, &ty) in f.params.iter().zip(&info.param_types) {
            let ty = self.ty(ty, param.name.span)?;
            let semantic = if info.stage.is_some() {
                format!(" : {}", self.io_semantic(&param.attributes, param.name.span)?)
            } else {
                String::new()
            };
            params.push(format!("{ty} {}{semantic}", param.name.name));
        }

        self.w.line(format!(
            "{return_ty} {}({}){return_semantic} {{",
            f.name.name,
            params.join(", ")
        ));
        self.block_body(&f.body)?;
        self.w.line("}");
        Ok(())
    }

    fn io_semantic(
        &self,
        attributes: &[shade_parser::ast::Attribute],
        span: Span,
    ) -> Result<String, EmitError> {
        for attr in attributes {
            match &attr.kind {
                AttributeKind::Builtin(name) => {
                    let semantic = match name.name.as_str() {
                        "global_invocation_id" => "SV_DispatchThreadID",
                        "local_invocation_id" => "SV_GroupThreadID",
                        "local_invocation_index" => "SV_GroupIndex",
                        "workgroup_id" => "SV_GroupID",
                        "position" => "SV_Position",
                        "vertex_index" => "SV_VertexID",
                        "instance_index" => "SV_InstanceID",
                        "front_facing" => "SV_IsFrontFace",
                        "frag_depth" => "SV_Depth",
                        "sample_index" => "SV_SampleIndex",
                        "sample_mask" => "SV_Coverage",
                        other => {
                            return Err(unsupported(
                                attr.span,
                                format!("HLSL has no semantic for builtin '{other}'"),
                            ));
                        }
                    };
                    return Ok(semantic.to_string());
                }
                AttributeKind::Location(expr) => {
                    let location = self.program.const_u32(*expr).unwrap_or(0);
                    return Ok(format!("SV_Target{location}"));
                }
                _ => {}
            }
        }
        Err(unsupported(span, "missing entry point IO attribute"))
    }

    // ----- types --------------------------------------------------------

    fn ty(&self, handle: Handle<Type>, span: Span) -> Result<String, EmitError> {
        let inner = &self.program.types()[handle].inner;
        Ok(match inner {
            TypeInner::Void => "void".into(),
            TypeInner::Scalar(s) | TypeInner::Atomic(s) => scalar_name(*s, span)?.into(),
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
            TypeInner::Struct { .. } => self.program.types()[handle]
                .name
                .clone()
                .unwrap_or_else(|| "anonymous".into()),
            TypeInner::Array { .. } => {
                return Err(unsupported(span, "array type outside a declarator"));
            }
            TypeInner::Sampler => "SamplerState".into(),
            TypeInner::SampledTexture2d { scalar } => {
                format!("Texture2D<{}4>", scalar_name(*scalar, span)?)
            }
            TypeInner::TextureExternal => {
                return Err(unsupported(
                    span,
                    "external textures must be expanded before HLSL emission",
                ));
            }
            TypeInner::Pointer { .. } => {
                return Err(unsupported(span, "pointers are not representable in HLSL"));
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
        loop {
            match self.program.types()[handle].inner {
                TypeInner::Array { base, size, .. } => {
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
                _ => break,
            }
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
                let declarator = self.declarator(ty, &decl.name.name, decl.name.span)?;
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
                let declarator = self.declarator(ty, &decl.name.name, decl.name.span)?;
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
            ExpressionKind::Ident(ident) => ident.name.clone(),
            ExpressionKind::Unary { op, expr: operand } => match op {
                // HLSL has no pointers; address-of and deref erase.
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
                format!("{}.{}", self.operand(*base)?, member.name)
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
            Some(CallTarget::Construct(target)) => {
                match self.program.types()[target].inner {
                    TypeInner::Struct { .. } | TypeInner::Array { .. } => {
                        if rendered.is_empty() {
                            let ty = self.ty(target, span).unwrap_or_else(|_| "0".into());
                            Ok(format!("({ty})0"))
                        } else {
                            Ok(format!("{{ {} }}", rendered.join(", ")))
                        }
                    }
                    _ => {
                        let ty = self.ty(target, span)?;
                        if rendered.is_empty() {
                            Ok(format!("({ty})0"))
                        } else {
                            Ok(format!("{ty}({})", rendered.join(", ")))
                        }
                    }
                }
            }
            Some(CallTarget::Function(index)) => {
                let Declaration::Function(f) = &self.program.ast().declarations[index] else {
                    unreachable!("call target is a function");
                };
                Ok(format!("{}({})", f.name.name, rendered.join(", ")))
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
            B::Select => {
                return Ok(format!("({} ? {} : {})", args[2], args[1], args[0]));
            }
            B::ArrayLength => {
                return Err(unsupported(
                    span,
                    "arrayLength is not supported by the HLSL backend",
                ));
            }
            B::TextureSample => {
                return Ok(format!("{}.Sample({}, {})", args[0], args[1], args[2]));
            }
            B::TextureLoad => {
                return Ok(format!(
                    "{}.Load(int3({}, int({})))",
                    args[0], args[1], args[2]
                ));
            }
            B::TextureDimensions => {
                return Err(unsupported(
                    span,
                    "textureDimensions is not supported by the HLSL backend",
                ));
            }
            B::InverseSqrt => "rsqrt",
            B::Fract => "frac",
            B::Mix => "lerp",
            B::Dpdx => "ddx",
            B::Dpdy => "ddy",
            B::WorkgroupBarrier => "GroupMemoryBarrierWithGroupSync",
            B::StorageBarrier => "DeviceMemoryBarrierWithGroupSync",
            B::AtomicLoad => return Ok(args[0].clone()),
            B::AtomicAdd => "InterlockedAdd",
            B::AtomicSub => return Ok(format!("InterlockedAdd({}, -({}))", args[0], args[1])),
            B::AtomicAnd => "InterlockedAnd",
            B::AtomicOr => "InterlockedOr",
            B::AtomicXor => "InterlockedXor",
            B::AtomicMin => "InterlockedMin",
            B::AtomicMax => "InterlockedMax",
            B::AtomicExchange => "InterlockedExchange",
            B::AtomicStore => return Ok(format!("{} = {}", args[0], args[1])),
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
