//! Recursive-descent WGSL parser.
//!
//! One function per grammar production. On a malformed construct the
//! parser records a diagnostic at the offending token, skips ahead to a
//! synchronization point (statement or declaration boundary, tracking
//! bracket depth), and continues, so one pass surfaces every independent
//! error. Output is deterministic for identical input.

use shade_diag::{DiagnosticList, SourceFile, Span};

use crate::ast::{
    AliasDecl, AssignTarget, Attribute, AttributeKind, BinaryOp, Block, ConstAssert, Declaration,
    DiagnosticControl, Directive, DirectiveKind, ExprId, Expression, ExpressionKind, Extension,
    Function, GlobalConst, GlobalVar, Ident, Literal, LocalDecl, LocalDeclKind, Module, Parameter,
    Statement, StatementKind, StructDecl, StructMember, SwitchCase, TypeExpr, TypeExprKind,
    UnaryOp, VectorSize,
};
use crate::lexer;
use crate::token::{FloatSuffix, IntSuffix, Keyword, Token, TokenKind};

/// Parses a source file into an AST module plus any diagnostics from the
/// lexer and parser. An empty file yields an empty module with no
/// diagnostics.
pub fn parse(file: &SourceFile) -> (Module, DiagnosticList) {
    let (tokens, mut diagnostics) = lexer::tokenize(file);
    let mut parser = Parser {
        tokens,
        pos: 0,
        module: Module::default(),
        diagnostics: DiagnosticList::new(),
        recovering: false,
    };
    parser.parse_module();
    diagnostics.extend(parser.diagnostics);
    (parser.module, diagnostics)
}

/// Type-generator names that begin a type expression, used to
/// disambiguate `vec3<f32>(...)` from a less-than comparison.
const TYPE_GENERATORS: &[&str] = &[
    "vec2", "vec3", "vec4", "mat2x2", "mat2x3", "mat2x4", "mat3x2", "mat3x3", "mat3x4", "mat4x2",
    "mat4x3", "mat4x4", "array", "atomic", "ptr", "texture_2d",
];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    module: Module,
    diagnostics: DiagnosticList,
    recovering: bool,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn peek_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek(), TokenKind::Keyword(k) if *k == kw)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> Option<Span> {
        if self.at(kind) {
            Some(self.advance().span)
        } else {
            None
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> Option<Span> {
        if self.at_keyword(kw) {
            Some(self.advance().span)
        } else {
            None
        }
    }

    /// Records an error unless already recovering from a previous one,
    /// to avoid cascades between two synchronization points.
    fn error(&mut self, span: Span, message: impl Into<String>) {
        if !self.recovering {
            self.diagnostics.add_error(span, message);
            self.recovering = true;
        }
    }

    fn expect(&mut self, kind: &TokenKind, context: &str) -> Option<Span> {
        if let Some(span) = self.eat(kind) {
            return Some(span);
        }
        let found = self.peek().describe();
        let span = self.peek_span();
        self.error(
            span,
            format!("expected {} for {context}, found {found}", kind.describe()),
        );
        None
    }

    fn expect_ident(&mut self, context: &str) -> Option<Ident> {
        if let TokenKind::Ident(name) = self.peek() {
            let name = name.clone();
            let span = self.advance().span;
            return Some(Ident { name, span });
        }
        let found = self.peek().describe();
        let span = self.peek_span();
        self.error(span, format!("expected {context}, found {found}"));
        None
    }

    fn add_expr(&mut self, kind: ExpressionKind, span: Span) -> ExprId {
        self.module.exprs.append(Expression { kind, span })
    }

    /// Skips ahead to the next declaration boundary: past a `;` or `}`
    /// at bracket depth zero, or to a token that can begin a declaration.
    fn synchronize_declaration(&mut self) {
        let mut depth = 0i32;
        while !self.at_eof() {
            match self.peek() {
                TokenKind::BraceLeft | TokenKind::ParenLeft | TokenKind::BracketLeft => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::BraceRight | TokenKind::ParenRight | TokenKind::BracketRight => {
                    depth -= 1;
                    self.advance();
                    if depth <= 0 && matches!(self.tokens[self.pos - 1].kind, TokenKind::BraceRight)
                    {
                        break;
                    }
                }
                TokenKind::Semicolon if depth <= 0 => {
                    self.advance();
                    break;
                }
                TokenKind::At if depth <= 0 => break,
                TokenKind::Keyword(
                    Keyword::Fn
                    | Keyword::Var
                    | Keyword::Const
                    | Keyword::Struct
                    | Keyword::Alias
                    | Keyword::ConstAssert,
                ) if depth <= 0 => break,
                _ => {
                    self.advance();
                }
            }
        }
        self.recovering = false;
    }

    /// Skips ahead to the next statement boundary: past a `;`, or to a
    /// `}` (not consumed), at bracket depth zero.
    fn synchronize_statement(&mut self) {
        let mut depth = 0i32;
        while !self.at_eof() {
            match self.peek() {
                TokenKind::BraceLeft | TokenKind::ParenLeft | TokenKind::BracketLeft => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::BraceRight if depth == 0 => break,
                TokenKind::BraceRight | TokenKind::ParenRight | TokenKind::BracketRight => {
                    depth -= 1;
                    self.advance();
                }
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }
        self.recovering = false;
    }

    // ----- module ---------------------------------------------------------

    fn parse_module(&mut self) {
        self.parse_directives();
        while !self.at_eof() {
            let before = self.pos;
            self.parse_global_declaration();
            if self.pos == before {
                // No progress; consume one token so parsing terminates.
                let tok = self.advance();
                self.error(tok.span, format!("unexpected {}", tok.kind.describe()));
                self.synchronize_declaration();
            }
        }
    }

    fn parse_directives(&mut self) {
        loop {
            if let Some(start) = self.eat_keyword(Keyword::Enable) {
                let Some(name) = self.expect_ident("extension name") else {
                    self.synchronize_declaration();
                    continue;
                };
                let end = self
                    .expect(&TokenKind::Semicolon, "enable directive")
                    .unwrap_or(name.span);
                self.module.directives.push(Directive {
                    kind: DirectiveKind::Enable(Extension::parse(&name.name)),
                    span: start.to(end),
                });
            } else if let Some(start) = self.eat_keyword(Keyword::Requires) {
                let Some(name) = self.expect_ident("language feature name") else {
                    self.synchronize_declaration();
                    continue;
                };
                let end = self
                    .expect(&TokenKind::Semicolon, "requires directive")
                    .unwrap_or(name.span);
                self.module.directives.push(Directive {
                    kind: DirectiveKind::Requires(name.name),
                    span: start.to(end),
                });
            } else if self.at_keyword(Keyword::Diagnostic)
                && matches!(self.peek_at(1), TokenKind::ParenLeft)
            {
                let start = self.advance().span;
                let Some(control) = self.parse_diagnostic_control() else {
                    self.synchronize_declaration();
                    continue;
                };
                let end = self
                    .expect(&TokenKind::Semicolon, "diagnostic directive")
                    .unwrap_or(start);
                self.module.directives.push(Directive {
                    kind: DirectiveKind::Diagnostic(control),
                    span: start.to(end),
                });
            } else {
                break;
            }
        }
    }

    fn parse_diagnostic_control(&mut self) -> Option<DiagnosticControl> {
        self.expect(&TokenKind::ParenLeft, "diagnostic control")?;
        let severity = self.expect_ident("severity control")?;
        self.expect(&TokenKind::Comma, "diagnostic control")?;
        let rule = self.expect_ident("diagnostic rule name")?;
        self.eat(&TokenKind::Comma);
        self.expect(&TokenKind::ParenRight, "diagnostic control")?;
        Some(DiagnosticControl { severity, rule })
    }

    fn parse_global_declaration(&mut self) {
        if self.eat(&TokenKind::Semicolon).is_some() {
            return;
        }
        let attributes = self.parse_attributes();

        match self.peek().clone() {
            TokenKind::Keyword(Keyword::Fn) => {
                if let Some(func) = self.parse_function(attributes) {
                    self.module.declarations.push(Declaration::Function(func));
                } else {
                    self.synchronize_declaration();
                }
            }
            TokenKind::Keyword(Keyword::Var) => {
                if let Some(var) = self.parse_global_var(attributes) {
                    self.module.declarations.push(Declaration::Var(var));
                } else {
                    self.synchronize_declaration();
                }
            }
            TokenKind::Keyword(Keyword::Const) => {
                self.reject_attributes(&attributes, "const declaration");
                if let Some(c) = self.parse_global_const() {
                    self.module.declarations.push(Declaration::Const(c));
                } else {
                    self.synchronize_declaration();
                }
            }
            TokenKind::Keyword(Keyword::Struct) => {
                self.reject_attributes(&attributes, "struct declaration");
                if let Some(s) = self.parse_struct() {
                    self.module.declarations.push(Declaration::Struct(s));
                } else {
                    self.synchronize_declaration();
                }
            }
            TokenKind::Keyword(Keyword::Alias) => {
                self.reject_attributes(&attributes, "alias declaration");
                if let Some(a) = self.parse_alias() {
                    self.module.declarations.push(Declaration::Alias(a));
                } else {
                    self.synchronize_declaration();
                }
            }
            TokenKind::Keyword(Keyword::ConstAssert) => {
                self.reject_attributes(&attributes, "const assertion");
                if let Some(c) = self.parse_const_assert() {
                    self.module.declarations.push(Declaration::ConstAssert(c));
                } else {
                    self.synchronize_declaration();
                }
            }
            other => {
                let span = self.peek_span();
                self.error(
                    span,
                    format!("expected declaration, found {}", other.describe()),
                );
                self.synchronize_declaration();
            }
        }
    }

    fn reject_attributes(&mut self, attributes: &[Attribute], what: &str) {
        if let Some(attr) = attributes.first() {
            let span = attr.span;
            let name = attr.kind.name().to_string();
            self.error(span, format!("attribute '@{name}' is not valid for a {what}"));
        }
    }

    // ----- attributes -----------------------------------------------------

    fn parse_attributes(&mut self) -> Vec<Attribute> {
        let mut attributes = Vec::new();
        while let Some(at_span) = self.eat(&TokenKind::At) {
            let name = match self.peek().clone() {
                TokenKind::Ident(name) => {
                    self.advance();
                    name
                }
                TokenKind::Keyword(Keyword::Diagnostic) => {
                    self.advance();
                    "diagnostic".to_string()
                }
                TokenKind::Keyword(Keyword::Const) => {
                    self.advance();
                    "const".to_string()
                }
                other => {
                    let span = self.peek_span();
                    self.error(
                        span,
                        format!("expected attribute name, found {}", other.describe()),
                    );
                    break;
                }
            };
            let Some(attr) = self.parse_attribute(at_span, &name) else {
                continue;
            };
            attributes.push(attr);
        }
        attributes
    }

    fn parse_attribute(&mut self, at_span: Span, name: &str) -> Option<Attribute> {
        let kind = match name {
            "compute" => AttributeKind::Compute,
            "fragment" => AttributeKind::Fragment,
            "vertex" => AttributeKind::Vertex,
            "invariant" => AttributeKind::Invariant,
            "const" => AttributeKind::Const,
            "align" => AttributeKind::Align(self.attribute_arg("align")?),
            "binding" => AttributeKind::Binding(self.attribute_arg("binding")?),
            "group" => AttributeKind::Group(self.attribute_arg("group")?),
            "id" => AttributeKind::Id(self.attribute_arg("id")?),
            "location" => AttributeKind::Location(self.attribute_arg("location")?),
            "size" => AttributeKind::Size(self.attribute_arg("size")?),
            "stride" => AttributeKind::Stride(self.attribute_arg("stride")?),
            "builtin" => {
                self.expect(&TokenKind::ParenLeft, "builtin attribute")?;
                let value = self.expect_ident("builtin value name")?;
                self.eat(&TokenKind::Comma);
                self.expect(&TokenKind::ParenRight, "builtin attribute")?;
                AttributeKind::Builtin(value)
            }
            "diagnostic" => AttributeKind::Diagnostic(self.parse_diagnostic_control()?),
            "workgroup_size" => {
                self.expect(&TokenKind::ParenLeft, "workgroup_size attribute")?;
                let x = self.parse_expression()?;
                let mut y = None;
                let mut z = None;
                if self.eat(&TokenKind::Comma).is_some() && !self.at(&TokenKind::ParenRight) {
                    y = Some(self.parse_expression()?);
                    if self.eat(&TokenKind::Comma).is_some() && !self.at(&TokenKind::ParenRight) {
                        z = Some(self.parse_expression()?);
                        self.eat(&TokenKind::Comma);
                    }
                }
                self.expect(&TokenKind::ParenRight, "workgroup_size attribute")?;
                AttributeKind::WorkgroupSize { x, y, z }
            }
            unknown => {
                self.error(at_span, format!("unknown attribute '{unknown}'"));
                // Skip a parenthesized argument list if one follows.
                if self.eat(&TokenKind::ParenLeft).is_some() {
                    let mut depth = 1;
                    while depth > 0 && !self.at_eof() {
                        match self.advance().kind {
                            TokenKind::ParenLeft => depth += 1,
                            TokenKind::ParenRight => depth -= 1,
                            _ => {}
                        }
                    }
                }
                return None;
            }
        };
        let end = self.tokens[self.pos.saturating_sub(1)].span;
        Some(Attribute {
            kind,
            span: at_span.to(end),
        })
    }

    fn attribute_arg(&mut self, name: &str) -> Option<ExprId> {
        self.expect(&TokenKind::ParenLeft, &format!("{name} attribute"))?;
        let expr = self.parse_expression()?;
        self.eat(&TokenKind::Comma);
        self.expect(&TokenKind::ParenRight, &format!("{name} attribute"))?;
        Some(expr)
    }

    // ----- declarations ---------------------------------------------------

    fn parse_function(&mut self, attributes: Vec<Attribute>) -> Option<Function> {
        let start = self.eat_keyword(Keyword::Fn)?;
        let name = self.expect_ident("function name")?;

        self.expect(&TokenKind::ParenLeft, "function declaration")?;
        let mut params = Vec::new();
        while !self.at(&TokenKind::ParenRight) && !self.at_eof() {
            let param_attrs = self.parse_attributes();
            let pname = self.expect_ident("parameter name")?;
            self.expect(&TokenKind::Colon, "parameter declaration")?;
            let ty = self.parse_type_expr("parameter type")?;
            let span = pname.span.to(ty.span);
            params.push(Parameter {
                name: pname,
                ty,
                attributes: param_attrs,
                span,
            });
            if self.eat(&TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(&TokenKind::ParenRight, "function declaration")?;

        let mut return_type = None;
        let mut return_attributes = Vec::new();
        if self.eat(&TokenKind::Arrow).is_some() {
            return_attributes = self.parse_attributes();
            return_type = Some(self.parse_type_expr("return type")?);
        }

        let body = self.parse_block()?;
        let span = start.to(body.span);
        Some(Function {
            name,
            params,
            return_type,
            return_attributes,
            attributes,
            body,
            span,
        })
    }

    fn parse_global_var(&mut self, attributes: Vec<Attribute>) -> Option<GlobalVar> {
        let start = self.eat_keyword(Keyword::Var)?;
        let (space, access) = self.parse_var_template()?;
        let name = self.expect_ident("variable name")?;
        let ty = if self.eat(&TokenKind::Colon).is_some() {
            Some(self.parse_type_expr("variable type")?)
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Equal).is_some() {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let end = self.expect(&TokenKind::Semicolon, "variable declaration")?;
        Some(GlobalVar {
            name,
            space,
            access,
            ty,
            init,
            attributes,
            span: start.to(end),
        })
    }

    /// Parses the optional `<space[, access]>` template on `var`.
    fn parse_var_template(&mut self) -> Option<(Option<Ident>, Option<Ident>)> {
        if self.eat(&TokenKind::Less).is_none() {
            return Some((None, None));
        }
        let space = self.expect_ident("address space")?;
        let access = if self.eat(&TokenKind::Comma).is_some() {
            Some(self.expect_ident("access mode")?)
        } else {
            None
        };
        if !self.expect_template_close("var template") {
            return None;
        }
        Some((Some(space), access))
    }

    fn parse_global_const(&mut self) -> Option<GlobalConst> {
        let start = self.eat_keyword(Keyword::Const)?;
        let name = self.expect_ident("constant name")?;
        let ty = if self.eat(&TokenKind::Colon).is_some() {
            Some(self.parse_type_expr("constant type")?)
        } else {
            None
        };
        self.expect(&TokenKind::Equal, "constant declaration")?;
        let init = self.parse_expression()?;
        let end = self.expect(&TokenKind::Semicolon, "constant declaration")?;
        Some(GlobalConst {
            name,
            ty,
            init,
            span: start.to(end),
        })
    }

    fn parse_struct(&mut self) -> Option<StructDecl> {
        let start = self.eat_keyword(Keyword::Struct)?;
        let name = self.expect_ident("struct name")?;
        self.expect(&TokenKind::BraceLeft, "struct declaration")?;
        let mut members = Vec::new();
        while !self.at(&TokenKind::BraceRight) && !self.at_eof() {
            let attributes = self.parse_attributes();
            let mname = self.expect_ident("member name")?;
            self.expect(&TokenKind::Colon, "struct member")?;
            let ty = self.parse_type_expr("member type")?;
            let span = mname.span.to(ty.span);
            members.push(StructMember {
                name: mname,
                ty,
                attributes,
                span,
            });
            if self.eat(&TokenKind::Comma).is_none() {
                break;
            }
        }
        let end = self.expect(&TokenKind::BraceRight, "struct declaration")?;
        Some(StructDecl {
            name,
            members,
            span: start.to(end),
        })
    }

    fn parse_alias(&mut self) -> Option<AliasDecl> {
        let start = self.eat_keyword(Keyword::Alias)?;
        let name = self.expect_ident("alias name")?;
        self.expect(&TokenKind::Equal, "alias declaration")?;
        let ty = self.parse_type_expr("aliased type")?;
        let end = self.expect(&TokenKind::Semicolon, "alias declaration")?;
        Some(AliasDecl {
            name,
            ty,
            span: start.to(end),
        })
    }

    fn parse_const_assert(&mut self) -> Option<ConstAssert> {
        let start = self.eat_keyword(Keyword::ConstAssert)?;
        let condition = self.parse_expression()?;
        let end = self.expect(&TokenKind::Semicolon, "const assertion")?;
        Some(ConstAssert {
            condition,
            span: start.to(end),
        })
    }

    // ----- types ----------------------------------------------------------

    fn parse_type_expr(&mut self, context: &str) -> Option<TypeExpr> {
        let TokenKind::Ident(name) = self.peek().clone() else {
            let found = self.peek().describe();
            let span = self.peek_span();
            self.error(span, format!("expected {context}, found {found}"));
            return None;
        };
        let ident_span = self.advance().span;

        let kind = match name.as_str() {
            "vec2" | "vec3" | "vec4" => {
                let size = vector_size(&name);
                let component = Box::new(self.template_type(&name)?);
                TypeExprKind::Vector { size, component }
            }
            "mat2x2" | "mat2x3" | "mat2x4" | "mat3x2" | "mat3x3" | "mat3x4" | "mat4x2"
            | "mat4x3" | "mat4x4" => {
                let columns = matrix_dim(name.as_bytes()[3]);
                let rows = matrix_dim(name.as_bytes()[5]);
                let component = Box::new(self.template_type(&name)?);
                TypeExprKind::Matrix {
                    columns,
                    rows,
                    component,
                }
            }
            "array" => {
                self.expect(&TokenKind::Less, "array type")?;
                let element = Box::new(self.parse_type_expr("array element type")?);
                let count = if self.eat(&TokenKind::Comma).is_some() {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                if !self.expect_template_close("array type") {
                    return None;
                }
                TypeExprKind::Array { element, count }
            }
            "atomic" => TypeExprKind::Atomic(Box::new(self.template_type(&name)?)),
            "ptr" => {
                self.expect(&TokenKind::Less, "ptr type")?;
                let space = self.expect_ident("address space")?;
                self.expect(&TokenKind::Comma, "ptr type")?;
                let ty = Box::new(self.parse_type_expr("pointee type")?);
                let access = if self.eat(&TokenKind::Comma).is_some() {
                    Some(self.expect_ident("access mode")?)
                } else {
                    None
                };
                if !self.expect_template_close("ptr type") {
                    return None;
                }
                TypeExprKind::Pointer { space, ty, access }
            }
            "sampler" => TypeExprKind::Sampler,
            "texture_2d" => TypeExprKind::SampledTexture2d(Box::new(self.template_type(&name)?)),
            "texture_external" => TypeExprKind::TextureExternal,
            _ => TypeExprKind::Named(Ident {
                name,
                span: ident_span,
            }),
        };
        let end = self.tokens[self.pos.saturating_sub(1)].span;
        Some(TypeExpr {
            kind,
            span: ident_span.to(end),
        })
    }

    fn template_type(&mut self, generator: &str) -> Option<TypeExpr> {
        self.expect(&TokenKind::Less, &format!("{generator} type"))?;
        let ty = self.parse_type_expr("template type")?;
        if !self.expect_template_close(&format!("{generator} type")) {
            return None;
        }
        Some(ty)
    }

    /// Consumes a closing `>`, splitting `>>`, `>=`, and `>>=` tokens so
    /// nested templates like `array<vec3<f32>>` close correctly.
    fn expect_template_close(&mut self, context: &str) -> bool {
        match self.peek().clone() {
            TokenKind::Greater => {
                self.advance();
                true
            }
            TokenKind::ShiftRight => {
                self.split_token(TokenKind::Greater);
                true
            }
            TokenKind::GreaterEqual => {
                self.split_token(TokenKind::Equal);
                true
            }
            TokenKind::ShiftRightEqual => {
                self.split_token(TokenKind::GreaterEqual);
                true
            }
            other => {
                let span = self.peek_span();
                self.error(
                    span,
                    format!("expected '>' for {context}, found {}", other.describe()),
                );
                false
            }
        }
    }

    /// Replaces the current token with `remainder`, consuming one leading
    /// character's worth of it.
    fn split_token(&mut self, remainder: TokenKind) {
        let token = &mut self.tokens[self.pos];
        let mut span = token.span;
        span.start.column += 1;
        *token = Token {
            kind: remainder,
            span,
        };
    }

    // ----- statements -----------------------------------------------------

    fn parse_block(&mut self) -> Option<Block> {
        let start = self.expect(&TokenKind::BraceLeft, "block")?;
        let mut statements = Vec::new();
        while !self.at(&TokenKind::BraceRight) && !self.at_eof() {
            let before = self.pos;
            match self.parse_statement() {
                Some(stmt) => statements.push(stmt),
                None if self.recovering => self.synchronize_statement(),
                None => {}
            }
            if self.pos == before {
                let tok = self.advance();
                self.error(tok.span, format!("unexpected {}", tok.kind.describe()));
                self.synchronize_statement();
            }
        }
        let end = self.expect(&TokenKind::BraceRight, "block")?;
        Some(Block {
            statements,
            span: start.to(end),
        })
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        match self.peek().clone() {
            TokenKind::Semicolon => {
                self.advance();
                None
            }
            TokenKind::BraceLeft => {
                let block = self.parse_block()?;
                let span = block.span;
                Some(Statement {
                    kind: StatementKind::Block(block),
                    span,
                })
            }
            TokenKind::Keyword(Keyword::Var) => self.finish_decl_statement(LocalDeclKind::Var),
            TokenKind::Keyword(Keyword::Let) => self.finish_decl_statement(LocalDeclKind::Let),
            TokenKind::Keyword(Keyword::Const) => self.finish_decl_statement(LocalDeclKind::Const),
            TokenKind::Keyword(Keyword::ConstAssert) => {
                let assert = self.parse_const_assert().or_else(|| {
                    self.synchronize_statement();
                    None
                })?;
                let span = assert.span;
                Some(Statement {
                    kind: StatementKind::ConstAssert(assert),
                    span,
                })
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::Loop) => self.parse_loop(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(),
            TokenKind::Keyword(Keyword::Break) => {
                let start = self.advance().span;
                let end = self.expect(&TokenKind::Semicolon, "break statement")?;
                Some(Statement {
                    kind: StatementKind::Break,
                    span: start.to(end),
                })
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let start = self.advance().span;
                let end = self.expect(&TokenKind::Semicolon, "continue statement")?;
                Some(Statement {
                    kind: StatementKind::Continue,
                    span: start.to(end),
                })
            }
            TokenKind::Keyword(Keyword::Return) => {
                let start = self.advance().span;
                let value = if self.at(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                let end = self.expect(&TokenKind::Semicolon, "return statement")?;
                Some(Statement {
                    kind: StatementKind::Return { value },
                    span: start.to(end),
                })
            }
            TokenKind::Keyword(Keyword::Discard) => {
                let start = self.advance().span;
                let end = self.expect(&TokenKind::Semicolon, "discard statement")?;
                Some(Statement {
                    kind: StatementKind::Discard,
                    span: start.to(end),
                })
            }
            _ => {
                let stmt = self.parse_simple_statement()?;
                let end = self.expect(&TokenKind::Semicolon, "statement")?;
                Some(Statement {
                    span: stmt.span.to(end),
                    ..stmt
                })
            }
        }
    }

    fn finish_decl_statement(&mut self, kind: LocalDeclKind) -> Option<Statement> {
        let decl = self.parse_local_decl(kind)?;
        let end = self.expect(&TokenKind::Semicolon, "variable declaration")?;
        let span = decl.span.to(end);
        Some(Statement {
            kind: StatementKind::Decl(decl),
            span,
        })
    }

    fn parse_local_decl(&mut self, kind: LocalDeclKind) -> Option<LocalDecl> {
        let start = self.advance().span;
        if kind == LocalDeclKind::Var {
            // A local var may carry a (redundant) `<function>` template.
            self.parse_var_template()?;
        }
        let name = self.expect_ident("variable name")?;
        let ty = if self.eat(&TokenKind::Colon).is_some() {
            Some(self.parse_type_expr("variable type")?)
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Equal).is_some() {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let end = self.tokens[self.pos.saturating_sub(1)].span;
        Some(LocalDecl {
            kind,
            name,
            ty,
            init,
            span: start.to(end),
        })
    }

    /// Parses assignment, increment/decrement, or call statements,
    /// without the trailing semicolon (shared with `for` headers).
    fn parse_simple_statement(&mut self) -> Option<Statement> {
        if self.at(&TokenKind::Underscore) {
            let start = self.advance().span;
            self.expect(&TokenKind::Equal, "phony assignment")?;
            let value = self.parse_expression()?;
            let end = self.module.exprs[value].span;
            return Some(Statement {
                kind: StatementKind::Assign {
                    target: AssignTarget::Phony(start),
                    op: None,
                    value,
                },
                span: start.to(end),
            });
        }

        let lhs = self.parse_expression()?;
        let lhs_span = self.module.exprs[lhs].span;

        let compound: Option<Option<BinaryOp>> = match self.peek() {
            TokenKind::Equal => Some(None),
            TokenKind::PlusEqual => Some(Some(BinaryOp::Add)),
            TokenKind::MinusEqual => Some(Some(BinaryOp::Subtract)),
            TokenKind::StarEqual => Some(Some(BinaryOp::Multiply)),
            TokenKind::SlashEqual => Some(Some(BinaryOp::Divide)),
            TokenKind::PercentEqual => Some(Some(BinaryOp::Modulo)),
            TokenKind::AmpEqual => Some(Some(BinaryOp::BitwiseAnd)),
            TokenKind::PipeEqual => Some(Some(BinaryOp::BitwiseOr)),
            TokenKind::XorEqual => Some(Some(BinaryOp::BitwiseXor)),
            TokenKind::ShiftLeftEqual => Some(Some(BinaryOp::ShiftLeft)),
            TokenKind::ShiftRightEqual => Some(Some(BinaryOp::ShiftRight)),
            _ => None,
        };
        let Some(op) = compound else {
            return self.finish_non_assign_statement(lhs, lhs_span);
        };
        self.advance();
        let value = self.parse_expression()?;
        let end = self.module.exprs[value].span;
        Some(Statement {
            kind: StatementKind::Assign {
                target: AssignTarget::Expr(lhs),
                op,
                value,
            },
            span: lhs_span.to(end),
        })
    }

    fn finish_non_assign_statement(&mut self, lhs: ExprId, lhs_span: Span) -> Option<Statement> {
        if self.eat(&TokenKind::PlusPlus).is_some() {
            return Some(Statement {
                kind: StatementKind::Increment(lhs),
                span: lhs_span,
            });
        }
        if self.eat(&TokenKind::MinusMinus).is_some() {
            return Some(Statement {
                kind: StatementKind::Decrement(lhs),
                span: lhs_span,
            });
        }
        if matches!(self.module.exprs[lhs].kind, ExpressionKind::Call { .. }) {
            return Some(Statement {
                kind: StatementKind::Call(lhs),
                span: lhs_span,
            });
        }
        self.error(lhs_span, "expected an assignment or a function call statement");
        None
    }

    fn parse_if(&mut self) -> Option<Statement> {
        let start = self.advance().span;
        let condition = self.parse_expression()?;
        let then_block = self.parse_block()?;
        let mut span = start.to(then_block.span);

        let else_statement = if self.eat_keyword(Keyword::Else).is_some() {
            let stmt = if self.at_keyword(Keyword::If) {
                self.parse_if()?
            } else {
                let block = self.parse_block()?;
                let bspan = block.span;
                Statement {
                    kind: StatementKind::Block(block),
                    span: bspan,
                }
            };
            span = span.to(stmt.span);
            Some(Box::new(stmt))
        } else {
            None
        };

        Some(Statement {
            kind: StatementKind::If {
                condition,
                then_block,
                else_statement,
            },
            span,
        })
    }

    fn parse_loop(&mut self) -> Option<Statement> {
        let start = self.advance().span;
        self.expect(&TokenKind::BraceLeft, "loop body")?;
        let mut statements = Vec::new();
        let mut continuing = None;
        let mut break_if = None;

        while !self.at(&TokenKind::BraceRight) && !self.at_eof() {
            if self.eat_keyword(Keyword::Continuing).is_some() {
                let (block, brk) = self.parse_continuing()?;
                continuing = Some(block);
                break_if = brk;
                break;
            }
            let before = self.pos;
            match self.parse_statement() {
                Some(stmt) => statements.push(stmt),
                None if self.recovering => self.synchronize_statement(),
                None => {}
            }
            if self.pos == before {
                let tok = self.advance();
                self.error(tok.span, format!("unexpected {}", tok.kind.describe()));
                self.synchronize_statement();
            }
        }
        let end = self.expect(&TokenKind::BraceRight, "loop")?;
        let span = start.to(end);
        Some(Statement {
            kind: StatementKind::Loop {
                body: Block {
                    statements,
                    span,
                },
                continuing,
                break_if,
            },
            span,
        })
    }

    fn parse_continuing(&mut self) -> Option<(Block, Option<ExprId>)> {
        let start = self.expect(&TokenKind::BraceLeft, "continuing block")?;
        let mut statements = Vec::new();
        let mut break_if = None;
        while !self.at(&TokenKind::BraceRight) && !self.at_eof() {
            if self.at_keyword(Keyword::Break) && matches!(self.peek_at(1), TokenKind::Keyword(Keyword::If))
            {
                self.advance();
                self.advance();
                break_if = Some(self.parse_expression()?);
                self.expect(&TokenKind::Semicolon, "break-if")?;
                break;
            }
            let before = self.pos;
            match self.parse_statement() {
                Some(stmt) => statements.push(stmt),
                None if self.recovering => self.synchronize_statement(),
                None => {}
            }
            if self.pos == before {
                let tok = self.advance();
                self.error(tok.span, format!("unexpected {}", tok.kind.describe()));
                self.synchronize_statement();
            }
        }
        let end = self.expect(&TokenKind::BraceRight, "continuing block")?;
        Some((
            Block {
                statements,
                span: start.to(end),
            },
            break_if,
        ))
    }

    fn parse_for(&mut self) -> Option<Statement> {
        let start = self.advance().span;
        self.expect(&TokenKind::ParenLeft, "for loop")?;

        let init = if self.at(&TokenKind::Semicolon) {
            None
        } else {
            let stmt = match self.peek().clone() {
                TokenKind::Keyword(Keyword::Var) => {
                    let decl = self.parse_local_decl(LocalDeclKind::Var)?;
                    let span = decl.span;
                    Statement {
                        kind: StatementKind::Decl(decl),
                        span,
                    }
                }
                TokenKind::Keyword(Keyword::Let) => {
                    let decl = self.parse_local_decl(LocalDeclKind::Let)?;
                    let span = decl.span;
                    Statement {
                        kind: StatementKind::Decl(decl),
                        span,
                    }
                }
                _ => self.parse_simple_statement()?,
            };
            Some(Box::new(stmt))
        };
        self.expect(&TokenKind::Semicolon, "for loop initializer")?;

        let condition = if self.at(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon, "for loop condition")?;

        let update = if self.at(&TokenKind::ParenRight) {
            None
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };
        self.expect(&TokenKind::ParenRight, "for loop")?;

        let body = self.parse_block()?;
        let span = start.to(body.span);
        Some(Statement {
            kind: StatementKind::For {
                init,
                condition,
                update,
                body,
            },
            span,
        })
    }

    fn parse_while(&mut self) -> Option<Statement> {
        let start = self.advance().span;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        let span = start.to(body.span);
        Some(Statement {
            kind: StatementKind::While { condition, body },
            span,
        })
    }

    fn parse_switch(&mut self) -> Option<Statement> {
        let start = self.advance().span;
        let selector = self.parse_expression()?;
        self.expect(&TokenKind::BraceLeft, "switch body")?;

        let mut cases = Vec::new();
        while !self.at(&TokenKind::BraceRight) && !self.at_eof() {
            if let Some(case_start) = self.eat_keyword(Keyword::Case) {
                let mut selectors = Vec::new();
                loop {
                    selectors.push(self.parse_expression()?);
                    if self.eat(&TokenKind::Comma).is_none() {
                        break;
                    }
                    if self.at(&TokenKind::Colon) || self.at(&TokenKind::BraceLeft) {
                        break;
                    }
                }
                self.eat(&TokenKind::Colon);
                let body = self.parse_block()?;
                let span = case_start.to(body.span);
                cases.push(SwitchCase {
                    selectors,
                    body,
                    span,
                });
            } else if let Some(case_start) = self.eat_keyword(Keyword::Default) {
                self.eat(&TokenKind::Colon);
                let body = self.parse_block()?;
                let span = case_start.to(body.span);
                cases.push(SwitchCase {
                    selectors: Vec::new(),
                    body,
                    span,
                });
            } else {
                let span = self.peek_span();
                let found = self.peek().describe();
                self.error(span, format!("expected 'case' or 'default', found {found}"));
                self.synchronize_statement();
            }
        }
        let end = self.expect(&TokenKind::BraceRight, "switch body")?;
        Some(Statement {
            kind: StatementKind::Switch { selector, cases },
            span: start.to(end),
        })
    }

    // ----- expressions ----------------------------------------------------

    fn parse_expression(&mut self) -> Option<ExprId> {
        self.binary_expression(0)
    }

    /// Standard precedence climbing; level 0 is the loosest.
    fn binary_expression(&mut self, level: usize) -> Option<ExprId> {
        const TIGHTEST: usize = 10;
        if level >= TIGHTEST {
            return self.unary_expression();
        }
        let mut left = self.binary_expression(level + 1)?;
        while let Some(op) = self.binary_op_at(level) {
            self.advance();
            let right = self.binary_expression(level + 1)?;
            let span = self.module.exprs[left].span.to(self.module.exprs[right].span);
            left = self.add_expr(ExpressionKind::Binary { op, left, right }, span);
        }
        Some(left)
    }

    fn binary_op_at(&self, level: usize) -> Option<BinaryOp> {
        use TokenKind as T;
        Some(match (level, self.peek()) {
            (0, T::PipePipe) => BinaryOp::LogicalOr,
            (1, T::AmpAmp) => BinaryOp::LogicalAnd,
            (2, T::Pipe) => BinaryOp::BitwiseOr,
            (3, T::Xor) => BinaryOp::BitwiseXor,
            (4, T::Amp) => BinaryOp::BitwiseAnd,
            (5, T::EqualEqual) => BinaryOp::Equal,
            (5, T::NotEqual) => BinaryOp::NotEqual,
            (6, T::Less) => BinaryOp::Less,
            (6, T::LessEqual) => BinaryOp::LessEqual,
            (6, T::Greater) => BinaryOp::Greater,
            (6, T::GreaterEqual) => BinaryOp::GreaterEqual,
            (7, T::ShiftLeft) => BinaryOp::ShiftLeft,
            (7, T::ShiftRight) => BinaryOp::ShiftRight,
            (8, T::Plus) => BinaryOp::Add,
            (8, T::Minus) => BinaryOp::Subtract,
            (9, T::Star) => BinaryOp::Multiply,
            (9, T::Slash) => BinaryOp::Divide,
            (9, T::Percent) => BinaryOp::Modulo,
            _ => return None,
        })
    }

    fn unary_expression(&mut self) -> Option<ExprId> {
        let op = match self.peek() {
            TokenKind::Minus => Some(UnaryOp::Negate),
            TokenKind::Bang => Some(UnaryOp::LogicalNot),
            TokenKind::Tilde => Some(UnaryOp::BitwiseNot),
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::Amp => Some(UnaryOp::AddressOf),
            _ => None,
        };
        let Some(op) = op else {
            return self.postfix_expression();
        };
        let start = self.advance().span;
        let expr = self.unary_expression()?;
        let span = start.to(self.module.exprs[expr].span);
        Some(self.add_expr(ExpressionKind::Unary { op, expr }, span))
    }

    fn postfix_expression(&mut self) -> Option<ExprId> {
        let mut expr = self.primary_expression()?;
        loop {
            if self.eat(&TokenKind::BracketLeft).is_some() {
                let index = self.parse_expression()?;
                let end = self.expect(&TokenKind::BracketRight, "index expression")?;
                let span = self.module.exprs[expr].span.to(end);
                expr = self.add_expr(ExpressionKind::Index { base: expr, index }, span);
            } else if self.eat(&TokenKind::Period).is_some() {
                let member = self.expect_ident("member name")?;
                let span = self.module.exprs[expr].span.to(member.span);
                expr = self.add_expr(ExpressionKind::Member { base: expr, member }, span);
            } else {
                return Some(expr);
            }
        }
    }

    fn primary_expression(&mut self) -> Option<ExprId> {
        match self.peek().clone() {
            TokenKind::IntLiteral { value, suffix } => {
                let span = self.advance().span;
                let literal = match suffix {
                    Some(IntSuffix::I) => Literal::I32(value as i32),
                    Some(IntSuffix::U) => Literal::U32(value as u32),
                    None => Literal::AbstractInt(value),
                };
                Some(self.add_expr(ExpressionKind::Literal(literal), span))
            }
            TokenKind::FloatLiteral { value, suffix } => {
                let span = self.advance().span;
                let literal = match suffix {
                    Some(FloatSuffix::F) => Literal::F32(value as f32),
                    Some(FloatSuffix::H) => Literal::F16(value as f32),
                    None => Literal::AbstractFloat(value),
                };
                Some(self.add_expr(ExpressionKind::Literal(literal), span))
            }
            TokenKind::Keyword(Keyword::True) => {
                let span = self.advance().span;
                Some(self.add_expr(ExpressionKind::Literal(Literal::Bool(true)), span))
            }
            TokenKind::Keyword(Keyword::False) => {
                let span = self.advance().span;
                Some(self.add_expr(ExpressionKind::Literal(Literal::Bool(false)), span))
            }
            TokenKind::ParenLeft => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::ParenRight, "parenthesized expression")?;
                Some(inner)
            }
            TokenKind::Ident(name) => {
                // `vec3<f32>(...)`: a type-generator name followed by `<`
                // begins a constructor, never a comparison.
                if TYPE_GENERATORS.contains(&name.as_str()) && matches!(self.peek_at(1), TokenKind::Less)
                {
                    let ident_span = self.peek_span();
                    let template = self.parse_type_expr("constructor type")?;
                    let callee = Ident {
                        name,
                        span: ident_span,
                    };
                    return self.call_expression(callee, Some(template));
                }
                let span = self.advance().span;
                let ident = Ident { name, span };
                if self.at(&TokenKind::ParenLeft) {
                    return self.call_expression(ident, None);
                }
                Some(self.add_expr(ExpressionKind::Ident(ident.clone()), ident.span))
            }
            other => {
                let span = self.peek_span();
                self.error(span, format!("expected expression, found {}", other.describe()));
                None
            }
        }
    }

    fn call_expression(&mut self, callee: Ident, template: Option<TypeExpr>) -> Option<ExprId> {
        self.expect(&TokenKind::ParenLeft, "call expression")?;
        let mut args = Vec::new();
        while !self.at(&TokenKind::ParenRight) && !self.at_eof() {
            args.push(self.parse_expression()?);
            if self.eat(&TokenKind::Comma).is_none() {
                break;
            }
        }
        let end = self.expect(&TokenKind::ParenRight, "call expression")?;
        let span = callee.span.to(end);
        Some(self.add_expr(
            ExpressionKind::Call {
                callee,
                template,
                args,
            },
            span,
        ))
    }
}

fn vector_size(name: &str) -> VectorSize {
    match name {
        "vec2" => VectorSize::Bi,
        "vec3" => VectorSize::Tri,
        _ => VectorSize::Quad,
    }
}

fn matrix_dim(digit: u8) -> VectorSize {
    match digit {
        b'2' => VectorSize::Bi,
        b'3' => VectorSize::Tri,
        _ => VectorSize::Quad,
    }
}
