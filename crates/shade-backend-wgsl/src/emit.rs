//! The WGSL rendering walk: one rule per declaration, statement, and
//! expression kind.

use shade_backend_core::IndentedWriter;
use shade_parser::ast::{
    AssignTarget, Attribute, AttributeKind, BinaryOp, Block, Declaration, DirectiveKind, ExprId,
    ExpressionKind, Literal, LocalDeclKind, Module, Statement, StatementKind, TypeExpr,
    TypeExprKind, UnaryOp,
};
use shade_resolver::Program;

pub(crate) fn emit_program(program: &Program) -> String {
    let mut emitter = Emitter {
        ast: program.ast(),
        w: IndentedWriter::new(2),
    };
    emitter.module();
    emitter.w.finish()
}

struct Emitter<'a> {
    ast: &'a Module,
    w: IndentedWriter,
}

impl Emitter<'_> {
    fn module(&mut self) {
        for directive in &self.ast.directives {
            match &directive.kind {
                DirectiveKind::Enable(ext) => self.w.line(format!("enable {};", ext.name())),
                DirectiveKind::Requires(name) => self.w.line(format!("requires {name};")),
                DirectiveKind::Diagnostic(control) => self.w.line(format!(
                    "diagnostic({}, {});",
                    control.severity.name, control.rule.name
                )),
            }
        }
        if !self.ast.directives.is_empty() {
            self.w.blank();
        }
        let mut first = true;
        for decl in &self.ast.declarations {
            if !first {
                self.w.blank();
            }
            first = false;
            self.declaration(decl);
        }
    }

    // ----- declarations -------------------------------------------------

    fn declaration(&mut self, decl: &Declaration) {
        match decl {
            Declaration::Function(f) => {
                for attr in &f.attributes {
                    let text = self.attribute(attr);
                    self.w.line(text);
                }
                let params: Vec<String> = f
                    .params
                    .iter()
                    .map(|p| {
                        format!(
                            "{}{}: {}",
                            self.attributes_inline(&p.attributes),
                            p.name.name,
                            self.type_expr(&p.ty)
                        )
                    })
                    .collect();
                let ret = match &f.return_type {
                    Some(ty) => format!(
                        " -> {}{}",
                        self.attributes_inline(&f.return_attributes),
                        self.type_expr(ty)
                    ),
                    None => String::new(),
                };
                self.w.line(format!(
                    "fn {}({}){ret} {{",
                    f.name.name,
                    params.join(", ")
                ));
                self.block_body(&f.body);
                self.w.line("}");
            }
            Declaration::Var(v) => {
                let attrs = self.attributes_inline(&v.attributes);
                let template = match (&v.space, &v.access) {
                    (Some(space), Some(access)) => {
                        format!("<{}, {}>", space.name, access.name)
                    }
                    (Some(space), None) => format!("<{}>", space.name),
                    _ => String::new(),
                };
                let ty = match &v.ty {
                    Some(ty) => format!(": {}", self.type_expr(ty)),
                    None => String::new(),
                };
                let init = match v.init {
                    Some(init) => format!(" = {}", self.expr(init)),
                    None => String::new(),
                };
                self.w
                    .line(format!("{attrs}var{template} {}{ty}{init};", v.name.name));
            }
            Declaration::Const(c) => {
                let ty = match &c.ty {
                    Some(ty) => format!(": {}", self.type_expr(ty)),
                    None => String::new(),
                };
                self.w.line(format!(
                    "const {}{ty} = {};",
                    c.name.name,
                    self.expr(c.init)
                ));
            }
            Declaration::Struct(s) => {
                self.w.line(format!("struct {} {{", s.name.name));
                self.w.indent();
                for member in &s.members {
                    self.w.line(format!(
                        "{}{}: {},",
                        self.attributes_inline(&member.attributes),
                        member.name.name,
                        self.type_expr(&member.ty)
                    ));
                }
                self.w.dedent();
                self.w.line("}");
            }
            Declaration::Alias(a) => {
                self.w.line(format!(
                    "alias {} = {};",
                    a.name.name,
                    self.type_expr(&a.ty)
                ));
            }
            Declaration::ConstAssert(assert) => {
                self.w
                    .line(format!("const_assert {};", self.expr(assert.condition)));
            }
        }
    }

    fn attribute(&self, attr: &Attribute) -> String {
        match &attr.kind {
            AttributeKind::Align(e) => format!("@align({})", self.expr(*e)),
            AttributeKind::Binding(e) => format!("@binding({})", self.expr(*e)),
            AttributeKind::Builtin(name) => format!("@builtin({})", name.name),
            AttributeKind::Compute => "@compute".into(),
            AttributeKind::Const => "@const".into(),
            AttributeKind::Diagnostic(control) => format!(
                "@diagnostic({}, {})",
                control.severity.name, control.rule.name
            ),
            AttributeKind::Fragment => "@fragment".into(),
            AttributeKind::Group(e) => format!("@group({})", self.expr(*e)),
            AttributeKind::Id(e) => format!("@id({})", self.expr(*e)),
            AttributeKind::Invariant => "@invariant".into(),
            AttributeKind::Location(e) => format!("@location({})", self.expr(*e)),
            AttributeKind::Size(e) => format!("@size({})", self.expr(*e)),
            AttributeKind::Stride(e) => format!("@stride({})", self.expr(*e)),
            AttributeKind::Vertex => "@vertex".into(),
            AttributeKind::WorkgroupSize { x, y, z } => {
                let mut args = vec![self.expr(*x)];
                if let Some(y) = y {
                    args.push(self.expr(*y));
                }
                if let Some(z) = z {
                    args.push(self.expr(*z));
                }
                format!("@workgroup_size({})", args.join(", "))
            }
        }
    }

    /// Attributes rendered on one line, each followed by a space.
    fn attributes_inline(&self, attrs: &[Attribute]) -> String {
        attrs
            .iter()
            .map(|a| format!("{} ", self.attribute(a)))
            .collect()
    }

    // ----- types --------------------------------------------------------

    fn type_expr(&self, ty: &TypeExpr) -> String {
        match &ty.kind {
            TypeExprKind::Named(name) => name.name.clone(),
            TypeExprKind::Vector { size, component } => {
                format!("vec{}<{}>", *size as u32, self.type_expr(component))
            }
            TypeExprKind::Matrix {
                columns,
                rows,
                component,
            } => format!(
                "mat{}x{}<{}>",
                *columns as u32,
                *rows as u32,
                self.type_expr(component)
            ),
            TypeExprKind::Array { element, count } => match count {
                Some(count) => {
                    format!("array<{}, {}>", self.type_expr(element), self.expr(*count))
                }
                None => format!("array<{}>", self.type_expr(element)),
            },
            TypeExprKind::Atomic(component) => {
                format!("atomic<{}>", self.type_expr(component))
            }
            TypeExprKind::Pointer { space, ty, access } => match access {
                Some(access) => format!(
                    "ptr<{}, {}, {}>",
                    space.name,
                    self.type_expr(ty),
                    access.name
                ),
                None => format!("ptr<{}, {}>", space.name, self.type_expr(ty)),
            },
            TypeExprKind::Sampler => "sampler".into(),
            TypeExprKind::SampledTexture2d(component) => {
                format!("texture_2d<{}>", self.type_expr(component))
            }
            TypeExprKind::TextureExternal => "texture_external".into(),
        }
    }

    // ----- statements ---------------------------------------------------

    fn block_body(&mut self, block: &Block) {
        self.w.indent();
        for stmt in &block.statements {
            self.statement(stmt);
        }
        self.w.dedent();
    }

    fn statement(&mut self, stmt: &Statement) {
        match &stmt.kind {
            StatementKind::Decl(decl) => {
                let keyword = match decl.kind {
                    LocalDeclKind::Var => "var",
                    LocalDeclKind::Let => "let",
                    LocalDeclKind::Const => "const",
                };
                let ty = match &decl.ty {
                    Some(ty) => format!(": {}", self.type_expr(ty)),
                    None => String::new(),
                };
                let init = match decl.init {
                    Some(init) => format!(" = {}", self.expr(init)),
                    None => String::new(),
                };
                self.w
                    .line(format!("{keyword} {}{ty}{init};", decl.name.name));
            }
            StatementKind::Assign { target, op, value } => {
                let text = self.assign_text(target, *op, *value);
                self.w.line(format!("{text};"));
            }
            StatementKind::Increment(target) => {
                let target = self.expr(*target);
                self.w.line(format!("{target}++;"));
            }
            StatementKind::Decrement(target) => {
                let target = self.expr(*target);
                self.w.line(format!("{target}--;"));
            }
            StatementKind::If { .. } => self.if_chain(stmt, "if"),
            StatementKind::Loop {
                body,
                continuing,
                break_if,
            } => {
                self.w.line("loop {");
                self.w.indent();
                for stmt in &body.statements {
                    self.statement(stmt);
                }
                if continuing.is_some() || break_if.is_some() {
                    self.w.line("continuing {");
                    self.w.indent();
                    if let Some(continuing) = continuing {
                        for stmt in &continuing.statements {
                            self.statement(stmt);
                        }
                    }
                    if let Some(break_if) = break_if {
                        let cond = self.expr(*break_if);
                        self.w.line(format!("break if {cond};"));
                    }
                    self.w.dedent();
                    self.w.line("}");
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
                let init = init
                    .as_deref()
                    .map(|s| self.simple_statement_text(s))
                    .unwrap_or_default();
                let condition = condition.map(|c| self.expr(c)).unwrap_or_default();
                let update = update
                    .as_deref()
                    .map(|s| self.simple_statement_text(s))
                    .unwrap_or_default();
                self.w
                    .line(format!("for ({init}; {condition}; {update}) {{"));
                self.block_body(body);
                self.w.line("}");
            }
            StatementKind::While { condition, body } => {
                let cond = self.expr(*condition);
                self.w.line(format!("while {cond} {{"));
                self.block_body(body);
                self.w.line("}");
            }
            StatementKind::Switch { selector, cases } => {
                let selector = self.expr(*selector);
                self.w.line(format!("switch {selector} {{"));
                self.w.indent();
                for case in cases {
                    if case.selectors.is_empty() {
                        self.w.line("default: {");
                    } else {
                        let selectors: Vec<String> =
                            case.selectors.iter().map(|&s| self.expr(s)).collect();
                        self.w.line(format!("case {}: {{", selectors.join(", ")));
                    }
                    self.block_body(&case.body);
                    self.w.line("}");
                }
                self.w.dedent();
                self.w.line("}");
            }
            StatementKind::Break => self.w.line("break;"),
            StatementKind::Continue => self.w.line("continue;"),
            StatementKind::Return { value } => match value {
                Some(value) => {
                    let value = self.expr(*value);
                    self.w.line(format!("return {value};"));
                }
                None => self.w.line("return;"),
            },
            StatementKind::Discard => self.w.line("discard;"),
            StatementKind::ConstAssert(assert) => {
                let cond = self.expr(assert.condition);
                self.w.line(format!("const_assert {cond};"));
            }
            StatementKind::Call(expr) => {
                let call = self.expr(*expr);
                self.w.line(format!("{call};"));
            }
            StatementKind::Block(block) => {
                self.w.line("{");
                self.block_body(block);
                self.w.line("}");
            }
        }
    }

    /// A statement rendered without its trailing semicolon, for `for`
    /// headers.
    fn simple_statement_text(&self, stmt: &Statement) -> String {
        match &stmt.kind {
            StatementKind::Decl(decl) => {
                let keyword = match decl.kind {
                    LocalDeclKind::Var => "var",
                    LocalDeclKind::Let => "let",
                    LocalDeclKind::Const => "const",
                };
                let ty = match &decl.ty {
                    Some(ty) => format!(": {}", self.type_expr(ty)),
                    None => String::new(),
                };
                let init = match decl.init {
                    Some(init) => format!(" = {}", self.expr(init)),
                    None => String::new(),
                };
                format!("{keyword} {}{ty}{init}", decl.name.name)
            }
            StatementKind::Assign { target, op, value } => self.assign_text(target, *op, *value),
            StatementKind::Increment(target) => format!("{}++", self.expr(*target)),
            StatementKind::Decrement(target) => format!("{}--", self.expr(*target)),
            StatementKind::Call(expr) => self.expr(*expr),
            _ => String::new(),
        }
    }

    fn assign_text(&self, target: &AssignTarget, op: Option<BinaryOp>, value: ExprId) -> String {
        let target = match target {
            AssignTarget::Phony(_) => "_".to_string(),
            AssignTarget::Expr(expr) => self.expr(*expr),
        };
        let operator = match op {
            Some(op) => format!("{}=", binary_op_str(op)),
            None => "=".to_string(),
        };
        format!("{target} {operator} {}", self.expr(value))
    }

    fn if_chain(&mut self, stmt: &Statement, keyword: &str) {
        let StatementKind::If {
            condition,
            then_block,
            else_statement,
        } = &stmt.kind
        else {
            unreachable!("if_chain on a non-if statement");
        };
        let cond = self.expr(*condition);
        self.w.line(format!("{keyword} {cond} {{"));
        self.block_body(then_block);
        match else_statement.as_deref() {
            None => self.w.line("}"),
            Some(else_stmt) => match &else_stmt.kind {
                StatementKind::If { .. } => self.if_chain(else_stmt, "} else if"),
                StatementKind::Block(block) => {
                    self.w.line("} else {");
                    self.block_body(block);
                    self.w.line("}");
                }
                _ => unreachable!("else holds an if or a block"),
            },
        }
    }

    // ----- expressions --------------------------------------------------

    fn expr(&self, id: ExprId) -> String {
        let expr = &self.ast.exprs[id];
        match &expr.kind {
            ExpressionKind::Literal(lit) => literal_str(*lit),
            ExpressionKind::Ident(ident) => ident.name.clone(),
            ExpressionKind::Unary { op, expr } => {
                let operand = self.operand(*expr);
                format!("{}{operand}", unary_op_str(*op))
            }
            ExpressionKind::Binary { op, left, right } => {
                format!(
                    "{} {} {}",
                    self.operand(*left),
                    binary_op_str(*op),
                    self.operand(*right)
                )
            }
            ExpressionKind::Call {
                callee,
                template,
                args,
            } => {
                let args: Vec<String> = args.iter().map(|&a| self.expr(a)).collect();
                let callee = match template {
                    Some(template) => self.type_expr(template),
                    None => callee.name.clone(),
                };
                format!("{callee}({})", args.join(", "))
            }
            ExpressionKind::Index { base, index } => {
                format!("{}[{}]", self.operand(*base), self.expr(*index))
            }
            ExpressionKind::Member { base, member } => {
                format!("{}.{}", self.operand(*base), member.name)
            }
        }
    }

    /// An operand, parenthesized when it is itself an operator
    /// expression, so emitted text re-parses with the same shape.
    fn operand(&self, id: ExprId) -> String {
        let text = self.expr(id);
        match &self.ast.exprs[id].kind {
            ExpressionKind::Binary { .. } => format!("({text})"),
            _ => text,
        }
    }
}

fn literal_str(lit: Literal) -> String {
    match lit {
        Literal::Bool(v) => v.to_string(),
        Literal::AbstractInt(v) => v.to_string(),
        Literal::I32(v) => format!("{v}i"),
        Literal::U32(v) => format!("{v}u"),
        Literal::AbstractFloat(v) => format!("{v:?}"),
        Literal::F32(v) => format!("{v:?}f"),
        Literal::F16(v) => format!("{v:?}h"),
    }
}

fn unary_op_str(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Negate => "-",
        UnaryOp::LogicalNot => "!",
        UnaryOp::BitwiseNot => "~",
        UnaryOp::AddressOf => "&",
        UnaryOp::Deref => "*",
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
