//! Declaration and statement resolution.

use std::collections::HashMap;

use shade_diag::{DiagnosticList, SourceFile, Span};
use shade_ir::{
    AddressSpace, ArraySize, BuiltinValue, Handle, ResourceBinding, Scalar, Stage, StorageAccess,
    StructMember, Type, TypeInner, UniqueArena,
};
use shade_parser::ast::{
    self, Attribute, AttributeKind, ConstAssert, Declaration, DirectiveKind, ExprId, Function,
    GlobalConst, GlobalVar, LocalDecl, LocalDeclKind, Statement, StatementKind, StructDecl,
    TypeExpr,
};

use crate::{
    ConstValue, DeclInfo, EvalStage, ExprInfo, FunctionInfo, GlobalConstInfo, GlobalVarInfo,
    LocalBinding, LocalKind, Program, ResolveOptions, SymbolBinding, SymbolTable,
};

/// Per-function context while resolving a body.
pub(crate) struct CurrentFunction {
    pub(crate) decl_index: usize,
    pub(crate) return_ty: Option<Handle<Type>>,
    pub(crate) stage: Option<Stage>,
}

pub(crate) struct Resolver {
    pub(crate) ast: ast::Module,
    pub(crate) types: UniqueArena<Type>,
    pub(crate) symbols: SymbolTable,
    pub(crate) bindings: Vec<SymbolBinding>,
    pub(crate) expr_info: Vec<ExprInfo>,
    pub(crate) decl_info: Vec<DeclInfo>,
    pub(crate) decl_symbols: HashMap<Span, crate::Symbol>,
    pub(crate) extensions: Vec<(ast::Extension, Span)>,
    pub(crate) diagnostics: DiagnosticList,
    /// Poison type handle, used where resolution already failed.
    pub(crate) error_ty: Handle<Type>,
    pub(crate) current: Option<CurrentFunction>,
    pub(crate) loop_depth: u32,
    pub(crate) switch_depth: u32,
}

impl Resolver {
    pub(crate) fn run(file: &SourceFile, ast: ast::Module, options: &ResolveOptions) -> Program {
        let mut types = UniqueArena::new();
        let error_ty = types.insert(Type {
            name: None,
            inner: TypeInner::Void,
        });
        let expr_count = ast.exprs.len();
        let mut resolver = Resolver {
            ast,
            types,
            symbols: SymbolTable::new(),
            bindings: Vec::new(),
            expr_info: Vec::new(),
            decl_info: Vec::new(),
            decl_symbols: HashMap::new(),
            extensions: Vec::new(),
            diagnostics: DiagnosticList::new(),
            error_ty,
            current: None,
            loop_depth: 0,
            switch_depth: 0,
        };
        resolver.expr_info = vec![
            ExprInfo {
                ty: error_ty,
                stage: EvalStage::Runtime,
                value: None,
                symbol: None,
                call_target: None,
                member: None,
            };
            expr_count
        ];

        resolver.resolve_directives();

        // Declarations own their statements, so take them out of the AST
        // while walking; the expression arena stays in place.
        let declarations = std::mem::take(&mut resolver.ast.declarations);
        for (index, decl) in declarations.iter().enumerate() {
            resolver.resolve_declaration(index, decl);
        }

        let disable = options.disable_uniformity
            || resolver
                .extensions
                .iter()
                .any(|(e, _)| *e == ast::Extension::DisableUniformityAnalysis);
        if disable {
            log::debug!("uniformity analysis skipped (waived)");
        } else if !resolver.diagnostics.has_errors() {
            crate::uniformity::analyze(&mut resolver, &declarations);
        }

        resolver.ast.declarations = declarations;
        Program {
            file: file.clone(),
            ast: resolver.ast,
            symbols: resolver.symbols,
            types: resolver.types,
            expr_info: resolver.expr_info,
            decl_info: resolver.decl_info,
            bindings: resolver.bindings,
            decl_symbols: resolver.decl_symbols,
            extensions: resolver.extensions,
            diagnostics: resolver.diagnostics,
        }
    }

    fn resolve_directives(&mut self) {
        let directives = std::mem::take(&mut self.ast.directives);
        for directive in &directives {
            match &directive.kind {
                DirectiveKind::Enable(ext) => {
                    if let ast::Extension::Undefined(name) = ext {
                        // Backends own the final supported-extension
                        // decision, so an unknown name is only a warning
                        // here.
                        self.diagnostics.add_warning(
                            directive.span,
                            format!("unrecognized extension '{name}'"),
                        );
                    }
                    self.extensions.push((ext.clone(), directive.span));
                }
                DirectiveKind::Requires(_) | DirectiveKind::Diagnostic(_) => {}
            }
        }
        self.ast.directives = directives;
    }

    // ----- declarations ---------------------------------------------------

    fn resolve_declaration(&mut self, index: usize, decl: &Declaration) {
        let info = match decl {
            Declaration::Struct(s) => self.resolve_struct(s),
            Declaration::Alias(a) => {
                let ty = self.resolve_type_expr(&a.ty);
                let named = self.types.insert(Type {
                    name: Some(a.name.name.clone()),
                    inner: self.types[ty].inner.clone(),
                });
                self.declare(&a.name, SymbolBinding::Type(named));
                DeclInfo::Alias(named)
            }
            Declaration::Var(v) => self.resolve_global_var(index, v),
            Declaration::Const(c) => self.resolve_global_const(index, c),
            Declaration::ConstAssert(assert) => {
                self.resolve_const_assert(assert);
                DeclInfo::ConstAssert
            }
            Declaration::Function(f) => self.resolve_function(index, f),
        };
        self.decl_info.push(info);
    }

    /// Declares a module- or function-scope name, diagnosing same-scope
    /// redeclaration.
    pub(crate) fn declare(&mut self, name: &ast::Ident, binding: SymbolBinding) -> crate::Symbol {
        match self.symbols.declare(&name.name) {
            Ok(symbol) => {
                debug_assert_eq!(symbol.index(), self.bindings.len());
                self.bindings.push(binding);
                symbol
            }
            Err(existing) => {
                self.diagnostics.add_error(
                    name.span,
                    format!("redeclaration of '{}'", name.name),
                );
                existing
            }
        }
    }

    fn resolve_struct(&mut self, s: &StructDecl) -> DeclInfo {
        let mut members = Vec::new();
        let mut offset = 0u32;
        let mut max_align = 1u32;
        for member in &s.members {
            let ty = self.resolve_type_expr(&member.ty);
            let mut align = self.align_of(ty).max(1);
            let mut size = self.size_of(ty);
            for attr in &member.attributes {
                match &attr.kind {
                    AttributeKind::Align(expr) => {
                        if let Some(v) = self.attr_arg_u32(*expr, "align") {
                            align = v.max(1);
                        }
                    }
                    AttributeKind::Size(expr) => {
                        if let Some(v) = self.attr_arg_u32(*expr, "size") {
                            if v < size {
                                self.diagnostics.add_error(
                                    attr.span,
                                    format!(
                                        "@size({v}) is smaller than the type size ({size})"
                                    ),
                                );
                            } else {
                                size = v;
                            }
                        }
                    }
                    // IO struct members carry their stage bindings.
                    AttributeKind::Location(expr) => {
                        self.attr_arg_u32(*expr, "location");
                    }
                    AttributeKind::Builtin(name) => {
                        self.check_builtin_value(name);
                    }
                    AttributeKind::Stride(expr) => {
                        self.attr_arg_u32(*expr, "stride");
                    }
                    other => {
                        self.diagnostics.add_error(
                            attr.span,
                            format!(
                                "attribute '@{}' is not valid for structure members",
                                other.name()
                            ),
                        );
                    }
                }
            }
            if members
                .iter()
                .any(|m: &StructMember| m.name == member.name.name)
            {
                self.diagnostics.add_error(
                    member.name.span,
                    format!("duplicate member '{}' in struct '{}'", member.name.name, s.name.name),
                );
            }
            offset = round_up(offset, align);
            members.push(StructMember {
                name: member.name.name.clone(),
                ty,
                offset,
            });
            offset = offset.saturating_add(size);
            max_align = max_align.max(align);
        }
        let span = round_up(offset, max_align);
        let ty = self.types.insert(Type {
            name: Some(s.name.name.clone()),
            inner: TypeInner::Struct { members, span },
        });
        self.declare(&s.name, SymbolBinding::Type(ty));
        DeclInfo::Struct(ty)
    }

    fn resolve_global_var(&mut self, index: usize, v: &GlobalVar) -> DeclInfo {
        let mut group = None;
        let mut binding = None;
        for attr in &v.attributes {
            match &attr.kind {
                AttributeKind::Group(expr) => group = self.attr_arg_u32(*expr, "group"),
                AttributeKind::Binding(expr) => binding = self.attr_arg_u32(*expr, "binding"),
                other => {
                    self.diagnostics.add_error(
                        attr.span,
                        format!(
                            "attribute '@{}' is not valid for module-scope 'var'",
                            other.name()
                        ),
                    );
                }
            }
        }

        let declared_ty = v.ty.as_ref().map(|ty| self.resolve_type_expr(ty));
        let init_ty = v.init.map(|init| {
            let inferred = self.infer_expr(init);
            match declared_ty {
                Some(want) => self.reconcile(init, want),
                None => self.concretize_expr(init, inferred),
            }
        });
        let ty = match declared_ty.or(init_ty) {
            Some(ty) => ty,
            None => {
                self.diagnostics.add_error(
                    v.span,
                    "module-scope 'var' requires a type or an initializer",
                );
                self.error_ty
            }
        };

        let is_handle = self.types[ty].inner.is_handle();
        let space = match (&v.space, is_handle) {
            (_, true) => {
                if v.space.is_some() {
                    self.diagnostics.add_error(
                        v.span,
                        "resource handles must not declare an address space",
                    );
                }
                AddressSpace::Handle
            }
            (Some(space), false) => match space.name.as_str() {
                "private" => AddressSpace::Private,
                "workgroup" => AddressSpace::Workgroup,
                "uniform" => AddressSpace::Uniform,
                "storage" => {
                    let access = match v.access.as_ref().map(|a| a.name.as_str()) {
                        None | Some("read") => StorageAccess::LOAD,
                        Some("read_write") => StorageAccess::LOAD | StorageAccess::STORE,
                        Some("write") => StorageAccess::STORE,
                        Some(other) => {
                            self.diagnostics.add_error(
                                v.access.as_ref().map(|a| a.span).unwrap_or(v.span),
                                format!("invalid access mode '{other}'"),
                            );
                            StorageAccess::LOAD
                        }
                    };
                    AddressSpace::Storage { access }
                }
                other => {
                    self.diagnostics.add_error(
                        space.span,
                        format!("invalid address space '{other}' for module-scope 'var'"),
                    );
                    AddressSpace::Private
                }
            },
            (None, false) => {
                self.diagnostics.add_error(
                    v.span,
                    "module-scope 'var' declaration must specify an address space",
                );
                AddressSpace::Private
            }
        };

        let is_resource = is_handle
            || matches!(space, AddressSpace::Uniform | AddressSpace::Storage { .. });
        let resource = match (is_resource, group, binding) {
            (true, Some(group), Some(binding)) => Some(ResourceBinding { group, binding }),
            (true, _, _) => {
                self.diagnostics.add_error(
                    v.name.span,
                    format!(
                        "resource variable '{}' requires both @group and @binding",
                        v.name.name
                    ),
                );
                None
            }
            (false, None, None) => None,
            (false, _, _) => {
                self.diagnostics.add_error(
                    v.name.span,
                    "@group and @binding are only valid for resource variables",
                );
                None
            }
        };

        if v.init.is_some() && !matches!(space, AddressSpace::Private) {
            self.diagnostics.add_error(
                v.span,
                format!("variables in the '{space}' address space must not have initializers"),
            );
        }

        self.declare(&v.name, SymbolBinding::GlobalVar(index));
        DeclInfo::Var(GlobalVarInfo {
            ty,
            space,
            binding: resource,
        })
    }

    fn resolve_global_const(&mut self, index: usize, c: &GlobalConst) -> DeclInfo {
        let declared_ty = c.ty.as_ref().map(|ty| self.resolve_type_expr(ty));
        let inferred = self.infer_expr(c.init);
        // An untyped const keeps its abstract type; each referencing
        // identifier materializes independently at its own use site.
        let ty = match declared_ty {
            Some(want) => self.reconcile(c.init, want),
            None => inferred,
        };
        if self.expr_info[c.init.index()].stage != EvalStage::Constant {
            self.diagnostics.add_error(
                self.ast.exprs[c.init].span,
                "const initializer must be a constant expression",
            );
        }
        let value = self.expr_info[c.init.index()].value;
        self.declare(&c.name, SymbolBinding::GlobalConst(index));
        DeclInfo::Const(GlobalConstInfo { ty, value })
    }

    pub(crate) fn resolve_const_assert(&mut self, assert: &ConstAssert) {
        let ty = self.infer_expr(assert.condition);
        let span = self.ast.exprs[assert.condition].span;
        if !matches!(self.types[ty].inner, TypeInner::Scalar(Scalar::BOOL)) {
            if ty != self.error_ty {
                self.diagnostics.add_error(
                    span,
                    format!(
                        "const assertion condition must be 'bool', found '{}'",
                        self.type_name(ty)
                    ),
                );
            }
            return;
        }
        match self.expr_info[assert.condition.index()].value {
            Some(ConstValue::Bool(true)) => {}
            Some(ConstValue::Bool(false)) => {
                self.diagnostics.add_error(assert.span, "const assertion failed");
            }
            _ => {
                self.diagnostics.add_error(
                    span,
                    "const assertion condition must be a constant expression",
                );
            }
        }
    }

    // ----- functions ------------------------------------------------------

    fn resolve_function(&mut self, index: usize, f: &Function) -> DeclInfo {
        let mut stage = None;
        let mut workgroup_size_attr = None;
        for attr in &f.attributes {
            match &attr.kind {
                AttributeKind::Compute => self.set_stage(&mut stage, Stage::Compute, attr.span),
                AttributeKind::Fragment => self.set_stage(&mut stage, Stage::Fragment, attr.span),
                AttributeKind::Vertex => self.set_stage(&mut stage, Stage::Vertex, attr.span),
                AttributeKind::WorkgroupSize { x, y, z } => {
                    workgroup_size_attr = Some((attr.span, *x, *y, *z));
                }
                AttributeKind::Diagnostic(_) => {}
                other => {
                    self.diagnostics.add_error(
                        attr.span,
                        format!("attribute '@{}' is not valid for functions", other.name()),
                    );
                }
            }
        }

        let workgroup_size = match (stage, workgroup_size_attr) {
            (Some(Stage::Compute), Some((_, x, y, z))) => {
                let x = self.workgroup_dim(x);
                let y = y.map_or(1, |e| self.workgroup_dim(e));
                let z = z.map_or(1, |e| self.workgroup_dim(e));
                Some([x, y, z])
            }
            (Some(Stage::Compute), None) => {
                self.diagnostics.add_error(
                    f.name.span,
                    "a compute shader must include 'workgroup_size' in its attributes",
                );
                Some([1, 1, 1])
            }
            (_, Some((span, ..))) => {
                self.diagnostics.add_error(
                    span,
                    "@workgroup_size is only valid for compute stages",
                );
                None
            }
            (_, None) => None,
        };

        self.declare(&f.name, SymbolBinding::Function(index));

        self.symbols.push_scope();
        let mut param_types = Vec::new();
        for param in &f.params {
            let ty = self.resolve_type_expr(&param.ty);
            self.check_io_attributes(&param.attributes, stage.is_some(), "function parameters");
            let symbol = self.declare(
                &param.name,
                SymbolBinding::Local(LocalBinding {
                    kind: LocalKind::Param,
                    ty,
                    value: None,
                }),
            );
            self.decl_symbols.insert(param.name.span, symbol);
            param_types.push(ty);
        }

        let return_ty = f.return_type.as_ref().map(|ty| self.resolve_type_expr(ty));
        self.check_io_attributes(&f.return_attributes, stage.is_some(), "return types");
        match stage {
            Some(Stage::Compute) if return_ty.is_some() => {
                self.diagnostics.add_error(
                    f.name.span,
                    "compute shaders must not have a return type",
                );
            }
            Some(Stage::Vertex) => {
                let returns_position = f.return_attributes.iter().any(|a| {
                    matches!(&a.kind, AttributeKind::Builtin(b) if b.name == "position")
                });
                let returns_struct = matches!(
                    return_ty.map(|ty| &self.types[ty].inner),
                    Some(TypeInner::Struct { .. })
                );
                if !returns_position && !returns_struct {
                    self.diagnostics.add_error(
                        f.name.span,
                        "a vertex shader must include the 'position' builtin in its return type",
                    );
                }
            }
            _ => {}
        }

        self.current = Some(CurrentFunction {
            decl_index: index,
            return_ty,
            stage,
        });
        for stmt in &f.body.statements {
            self.resolve_statement(stmt);
        }
        self.current = None;
        self.symbols.pop_scope();

        DeclInfo::Function(FunctionInfo {
            stage,
            workgroup_size,
            return_ty,
            param_types,
            requires_uniformity: false,
        })
    }

    fn set_stage(&mut self, stage: &mut Option<Stage>, new: Stage, span: Span) {
        if stage.is_some() {
            self.diagnostics
                .add_error(span, "multiple shader stages on one function");
        } else {
            *stage = Some(new);
        }
    }

    fn workgroup_dim(&mut self, expr: ExprId) -> u32 {
        self.infer_expr(expr);
        let span = self.ast.exprs[expr].span;
        match self.expr_info[expr.index()].value {
            Some(ConstValue::Int(v)) if v >= 1 && v <= i64::from(u32::MAX) => v as u32,
            Some(_) => {
                self.diagnostics
                    .add_error(span, "workgroup_size dimension must be at least 1");
                1
            }
            None => {
                self.diagnostics.add_error(
                    span,
                    "workgroup_size argument must be a constant expression",
                );
                1
            }
        }
    }

    /// Validates `@builtin`/`@location`/`@invariant` placement on entry
    /// point IO. Non-entry functions may not carry IO attributes at all.
    fn check_io_attributes(&mut self, attributes: &[Attribute], is_entry: bool, what: &str) {
        for attr in attributes {
            match &attr.kind {
                AttributeKind::Builtin(name) if is_entry => {
                    self.check_builtin_value(name);
                }
                AttributeKind::Location(expr) if is_entry => {
                    self.attr_arg_u32(*expr, "location");
                }
                AttributeKind::Invariant if is_entry => {}
                AttributeKind::Builtin(_) | AttributeKind::Location(_) | AttributeKind::Invariant => {
                    self.diagnostics.add_error(
                        attr.span,
                        format!(
                            "attribute '@{}' is only valid on entry point IO",
                            attr.kind.name()
                        ),
                    );
                }
                other => {
                    self.diagnostics.add_error(
                        attr.span,
                        format!("attribute '@{}' is not valid for {what}", other.name()),
                    );
                }
            }
        }
    }

    pub(crate) fn check_builtin_value(&mut self, name: &ast::Ident) -> Option<BuiltinValue> {
        match BuiltinValue::from_str(&name.name) {
            Some(b) => Some(b),
            None => {
                self.diagnostics.add_error(
                    name.span,
                    format!("unknown builtin value '{}'", name.name),
                );
                None
            }
        }
    }

    pub(crate) fn attr_arg_u32(&mut self, expr: ExprId, attr: &str) -> Option<u32> {
        self.infer_expr(expr);
        let span = self.ast.exprs[expr].span;
        match self.expr_info[expr.index()].value {
            Some(ConstValue::Int(v)) if v >= 0 && v <= i64::from(u32::MAX) => Some(v as u32),
            Some(_) => {
                self.diagnostics.add_error(
                    span,
                    format!("@{attr} argument must be a non-negative integer"),
                );
                None
            }
            None => {
                self.diagnostics.add_error(
                    span,
                    format!("@{attr} argument must be a constant expression"),
                );
                None
            }
        }
    }

    // ----- statements -----------------------------------------------------

    fn resolve_block(&mut self, block: &ast::Block) {
        self.symbols.push_scope();
        for stmt in &block.statements {
            self.resolve_statement(stmt);
        }
        self.symbols.pop_scope();
    }

    fn resolve_statement(&mut self, stmt: &Statement) {
        match &stmt.kind {
            StatementKind::Decl(decl) => self.resolve_local_decl(decl),
            StatementKind::Assign { target, op, value } => {
                self.resolve_assignment(target, *op, *value, stmt.span)
            }
            StatementKind::Increment(target) | StatementKind::Decrement(target) => {
                let ty = self.infer_expr(*target);
                self.check_place(*target);
                let scalar = self.types[ty].inner.scalar();
                if ty != self.error_ty && !scalar.is_some_and(Scalar::is_integer) {
                    self.diagnostics.add_error(
                        self.ast.exprs[*target].span,
                        format!(
                            "increment and decrement require an integer, found '{}'",
                            self.type_name(ty)
                        ),
                    );
                }
            }
            StatementKind::If {
                condition,
                then_block,
                else_statement,
            } => {
                self.require_bool(*condition, "if condition");
                self.resolve_block(then_block);
                if let Some(else_stmt) = else_statement {
                    self.resolve_statement(else_stmt);
                }
            }
            StatementKind::Loop {
                body,
                continuing,
                break_if,
            } => {
                self.loop_depth += 1;
                self.resolve_block(body);
                if let Some(continuing) = continuing {
                    self.resolve_block(continuing);
                }
                if let Some(break_if) = break_if {
                    self.require_bool(*break_if, "break-if condition");
                }
                self.loop_depth -= 1;
            }
            StatementKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.symbols.push_scope();
                if let Some(init) = init {
                    self.resolve_statement(init);
                }
                if let Some(condition) = condition {
                    self.require_bool(*condition, "for-loop condition");
                }
                self.loop_depth += 1;
                if let Some(update) = update {
                    self.resolve_statement(update);
                }
                self.resolve_block(body);
                self.loop_depth -= 1;
                self.symbols.pop_scope();
            }
            StatementKind::While { condition, body } => {
                self.require_bool(*condition, "while condition");
                self.loop_depth += 1;
                self.resolve_block(body);
                self.loop_depth -= 1;
            }
            StatementKind::Switch { selector, cases } => {
                self.resolve_switch(*selector, cases)
            }
            StatementKind::Break => {
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    self.diagnostics.add_error(
                        stmt.span,
                        "break statement must be in a loop or switch case",
                    );
                }
            }
            StatementKind::Continue => {
                if self.loop_depth == 0 {
                    self.diagnostics
                        .add_error(stmt.span, "continue statement must be in a loop");
                }
            }
            StatementKind::Return { value } => self.resolve_return(*value, stmt.span),
            StatementKind::Discard => {}
            StatementKind::ConstAssert(assert) => self.resolve_const_assert(assert),
            StatementKind::Call(expr) => {
                self.infer_expr(*expr);
            }
            StatementKind::Block(block) => self.resolve_block(block),
        }
    }

    fn resolve_local_decl(&mut self, decl: &LocalDecl) {
        let declared_ty = decl.ty.as_ref().map(|ty| self.resolve_type_expr(ty));
        let init_ty = decl.init.map(|init| {
            let inferred = self.infer_expr(init);
            match declared_ty {
                Some(want) => self.reconcile(init, want),
                None => match decl.kind {
                    // `const` keeps its abstract type; `var`/`let`
                    // concretize at declaration.
                    LocalDeclKind::Const => inferred,
                    _ => self.concretize_expr(init, inferred),
                },
            }
        });
        let ty = match declared_ty.or(init_ty) {
            Some(ty) => ty,
            None => {
                self.diagnostics.add_error(
                    decl.span,
                    format!("'{}' declaration requires a type or initializer", decl_keyword(decl.kind)),
                );
                self.error_ty
            }
        };
        if decl.init.is_none() && decl.kind != LocalDeclKind::Var {
            self.diagnostics.add_error(
                decl.span,
                format!("'{}' declaration requires an initializer", decl_keyword(decl.kind)),
            );
        }

        let mut value = None;
        if decl.kind == LocalDeclKind::Const {
            match decl.init {
                Some(init) if self.expr_info[init.index()].stage == EvalStage::Constant => {
                    value = self.expr_info[init.index()].value;
                }
                Some(init) => {
                    self.diagnostics.add_error(
                        self.ast.exprs[init].span,
                        "const initializer must be a constant expression",
                    );
                }
                None => {}
            }
        }

        let kind = match decl.kind {
            LocalDeclKind::Var => LocalKind::Var,
            LocalDeclKind::Let => LocalKind::Let,
            LocalDeclKind::Const => LocalKind::Const,
        };
        let symbol = self.declare(
            &decl.name,
            SymbolBinding::Local(LocalBinding { kind, ty, value }),
        );
        self.decl_symbols.insert(decl.name.span, symbol);
    }

    fn resolve_assignment(
        &mut self,
        target: &ast::AssignTarget,
        op: Option<ast::BinaryOp>,
        value: ExprId,
        span: Span,
    ) {
        let value_ty = self.infer_expr(value);
        match target {
            ast::AssignTarget::Phony(_) => {
                self.concretize_expr(value, value_ty);
            }
            ast::AssignTarget::Expr(target) => {
                let target_ty = self.infer_expr(*target);
                self.check_place(*target);
                if let Some(op) = op {
                    // The compound form `a op= b` types as `a = a op b`.
                    let result = self.binary_type(op, *target, value, span);
                    if result != target_ty
                        && result != self.error_ty
                        && target_ty != self.error_ty
                    {
                        self.diagnostics.add_error(
                            span,
                            format!(
                                "type mismatch: expected '{}', found '{}'",
                                self.type_name(target_ty),
                                self.type_name(result)
                            ),
                        );
                    }
                } else {
                    self.reconcile(value, target_ty);
                }
            }
        }
    }

    /// Checks that an assignment target is a mutable place: a chain of
    /// index/member accesses rooted at a `var` (or a dereferenced
    /// pointer).
    fn check_place(&mut self, expr: ExprId) {
        let span = self.ast.exprs[expr].span;
        let mut current = expr;
        loop {
            match &self.ast.exprs[current].kind {
                ast::ExpressionKind::Ident(ident) => {
                    let Some(symbol) = self.expr_info[current.index()].symbol else {
                        return; // unresolved; already diagnosed
                    };
                    match &self.bindings[symbol.index()] {
                        SymbolBinding::Local(local) if local.kind == LocalKind::Var => {}
                        SymbolBinding::GlobalVar(index) => {
                            if let DeclInfo::Var(info) = &self.decl_info[*index] {
                                let writable = match info.space {
                                    AddressSpace::Private
                                    | AddressSpace::Workgroup
                                    | AddressSpace::Function => true,
                                    AddressSpace::Storage { access } => {
                                        access.contains(StorageAccess::STORE)
                                    }
                                    AddressSpace::Uniform | AddressSpace::Handle => false,
                                };
                                if !writable {
                                    self.diagnostics.add_error(
                                        span,
                                        format!(
                                            "cannot assign to '{}': it is not writable",
                                            ident.name
                                        ),
                                    );
                                }
                            }
                        }
                        _ => {
                            self.diagnostics.add_error(
                                span,
                                format!("cannot assign to immutable binding '{}'", ident.name),
                            );
                        }
                    }
                    return;
                }
                ast::ExpressionKind::Index { base, .. }
                | ast::ExpressionKind::Member { base, .. } => current = *base,
                ast::ExpressionKind::Unary {
                    op: ast::UnaryOp::Deref,
                    expr,
                } => current = *expr,
                _ => {
                    self.diagnostics.add_error(span, "invalid assignment target");
                    return;
                }
            }
        }
    }

    fn resolve_switch(&mut self, selector: ExprId, cases: &[ast::SwitchCase]) {
        let raw = self.infer_expr(selector);
        let selector_ty = self.concretize_expr(selector, raw);
        let scalar = self.types[selector_ty].inner.scalar();
        if selector_ty != self.error_ty && !scalar.is_some_and(Scalar::is_integer) {
            self.diagnostics.add_error(
                self.ast.exprs[selector].span,
                format!(
                    "switch selector must be an integer, found '{}'",
                    self.type_name(selector_ty)
                ),
            );
        }

        let mut default_count = 0usize;
        let mut seen = Vec::new();
        self.switch_depth += 1;
        for case in cases {
            if case.selectors.is_empty() {
                default_count += 1;
            }
            for &sel in &case.selectors {
                self.infer_expr(sel);
                self.reconcile(sel, selector_ty);
                let span = self.ast.exprs[sel].span;
                match self.expr_info[sel.index()].value {
                    Some(ConstValue::Int(v)) => {
                        if seen.contains(&v) {
                            self.diagnostics.add_error(
                                span,
                                format!("duplicate switch case value {v}"),
                            );
                        }
                        seen.push(v);
                    }
                    _ => {
                        self.diagnostics.add_error(
                            span,
                            "switch case selector must be a constant expression",
                        );
                    }
                }
            }
            self.resolve_block(&case.body);
        }
        self.switch_depth -= 1;
        if default_count != 1 {
            let span = self.ast.exprs[selector].span;
            self.diagnostics.add_error(
                span,
                "switch statement must have exactly one default clause",
            );
        }
    }

    fn resolve_return(&mut self, value: Option<ExprId>, span: Span) {
        let return_ty = self.current.as_ref().and_then(|c| c.return_ty);
        match (value, return_ty) {
            (Some(value), Some(want)) => {
                self.infer_expr(value);
                self.reconcile(value, want);
            }
            (Some(value), None) => {
                self.infer_expr(value);
                self.diagnostics.add_error(
                    span,
                    "return statement with a value, in a function with no return type",
                );
            }
            (None, Some(_)) => {
                self.diagnostics.add_error(span, "missing return value");
            }
            (None, None) => {}
        }
    }

    pub(crate) fn require_bool(&mut self, expr: ExprId, what: &str) {
        let ty = self.infer_expr(expr);
        if ty != self.error_ty
            && !matches!(self.types[ty].inner, TypeInner::Scalar(Scalar::BOOL))
        {
            self.diagnostics.add_error(
                self.ast.exprs[expr].span,
                format!("{what} must be 'bool', found '{}'", self.type_name(ty)),
            );
        }
    }
}

fn decl_keyword(kind: LocalDeclKind) -> &'static str {
    match kind {
        LocalDeclKind::Var => "var",
        LocalDeclKind::Let => "let",
        LocalDeclKind::Const => "const",
    }
}

pub(crate) fn round_up(value: u32, align: u32) -> u32 {
    debug_assert!(align > 0);
    value.div_ceil(align) * align
}

/// Resolves a `TypeExpr` against the symbol table: named scalars, user
/// structs/aliases, and the built-in generators.
impl Resolver {
    pub(crate) fn resolve_type_expr(&mut self, ty: &TypeExpr) -> Handle<Type> {
        use shade_parser::ast::TypeExprKind;
        let inner = match &ty.kind {
            TypeExprKind::Named(ident) => {
                return self.resolve_named_type(ident);
            }
            TypeExprKind::Vector { size, component } => {
                let component = self.resolve_type_expr(component);
                match self.scalar_of(component, ty.span) {
                    Some(scalar) => TypeInner::Vector {
                        size: vector_size(*size),
                        scalar,
                    },
                    None => return self.error_ty,
                }
            }
            TypeExprKind::Matrix {
                columns,
                rows,
                component,
            } => {
                let component = self.resolve_type_expr(component);
                match self.scalar_of(component, ty.span) {
                    Some(scalar) if scalar.is_float() => TypeInner::Matrix {
                        columns: vector_size(*columns),
                        rows: vector_size(*rows),
                        scalar,
                    },
                    Some(_) => {
                        self.diagnostics.add_error(
                            ty.span,
                            "matrix components must be floating point",
                        );
                        return self.error_ty;
                    }
                    None => return self.error_ty,
                }
            }
            TypeExprKind::Array { element, count } => {
                let base = self.resolve_type_expr(element);
                let stride = round_up(self.size_of(base), self.align_of(base).max(1));
                let size = match count {
                    Some(count) => {
                        self.infer_expr(*count);
                        match self.expr_info[count.index()].value {
                            Some(ConstValue::Int(v)) if v >= 1 && v <= i64::from(u32::MAX) => {
                                ArraySize::Constant(v as u32)
                            }
                            _ => {
                                self.diagnostics.add_error(
                                    self.ast.exprs[*count].span,
                                    "array size must be a constant expression of at least 1",
                                );
                                ArraySize::Constant(1)
                            }
                        }
                    }
                    None => ArraySize::Dynamic,
                };
                TypeInner::Array { base, size, stride }
            }
            TypeExprKind::Atomic(component) => {
                let component = self.resolve_type_expr(component);
                match self.scalar_of(component, ty.span) {
                    Some(scalar)
                        if matches!(scalar, Scalar::I32 | Scalar::U32) =>
                    {
                        TypeInner::Atomic(scalar)
                    }
                    Some(_) => {
                        self.diagnostics.add_error(
                            ty.span,
                            "atomic component type must be 'i32' or 'u32'",
                        );
                        return self.error_ty;
                    }
                    None => return self.error_ty,
                }
            }
            TypeExprKind::Pointer { space, ty: base, access } => {
                let base = self.resolve_type_expr(base);
                let space = match space.name.as_str() {
                    "function" => AddressSpace::Function,
                    "private" => AddressSpace::Private,
                    "workgroup" => AddressSpace::Workgroup,
                    "uniform" => AddressSpace::Uniform,
                    "storage" => {
                        let access = match access.as_ref().map(|a| a.name.as_str()) {
                            None | Some("read") => StorageAccess::LOAD,
                            Some("read_write") => StorageAccess::LOAD | StorageAccess::STORE,
                            Some("write") => StorageAccess::STORE,
                            Some(other) => {
                                self.diagnostics.add_error(
                                    ty.span,
                                    format!("invalid access mode '{other}'"),
                                );
                                StorageAccess::LOAD
                            }
                        };
                        AddressSpace::Storage { access }
                    }
                    other => {
                        self.diagnostics
                            .add_error(space.span, format!("invalid address space '{other}'"));
                        AddressSpace::Function
                    }
                };
                TypeInner::Pointer { base, space }
            }
            TypeExprKind::Sampler => TypeInner::Sampler,
            TypeExprKind::SampledTexture2d(component) => {
                let component = self.resolve_type_expr(component);
                match self.scalar_of(component, ty.span) {
                    Some(scalar) if !scalar.is_abstract() && scalar != Scalar::BOOL => {
                        TypeInner::SampledTexture2d { scalar }
                    }
                    Some(_) => {
                        self.diagnostics.add_error(
                            ty.span,
                            "texture component type must be a concrete numeric scalar",
                        );
                        return self.error_ty;
                    }
                    None => return self.error_ty,
                }
            }
            TypeExprKind::TextureExternal => TypeInner::TextureExternal,
        };
        self.types.insert(Type { name: None, inner })
    }

    fn resolve_named_type(&mut self, ident: &ast::Ident) -> Handle<Type> {
        let inner = match ident.name.as_str() {
            "bool" => Some(TypeInner::Scalar(Scalar::BOOL)),
            "i32" => Some(TypeInner::Scalar(Scalar::I32)),
            "u32" => Some(TypeInner::Scalar(Scalar::U32)),
            "f32" => Some(TypeInner::Scalar(Scalar::F32)),
            "f16" => {
                if !self
                    .extensions
                    .iter()
                    .any(|(e, _)| *e == ast::Extension::F16)
                {
                    self.diagnostics.add_error(
                        ident.span,
                        "'f16' requires the 'f16' extension to be enabled",
                    );
                }
                Some(TypeInner::Scalar(Scalar::F16))
            }
            _ => None,
        };
        if let Some(inner) = inner {
            return self.types.insert(Type { name: None, inner });
        }
        match self.symbols.lookup(&ident.name) {
            Some(symbol) => match &self.bindings[symbol.index()] {
                SymbolBinding::Type(ty) => *ty,
                _ => {
                    self.diagnostics.add_error(
                        ident.span,
                        format!("'{}' does not name a type", ident.name),
                    );
                    self.error_ty
                }
            },
            None => {
                self.diagnostics
                    .add_error(ident.span, format!("unknown type '{}'", ident.name));
                self.error_ty
            }
        }
    }

    fn scalar_of(&mut self, ty: Handle<Type>, span: Span) -> Option<Scalar> {
        match self.types[ty].inner {
            TypeInner::Scalar(s) => Some(s),
            _ if ty == self.error_ty => None,
            _ => {
                self.diagnostics.add_error(
                    span,
                    format!("expected a scalar type, found '{}'", self.type_name(ty)),
                );
                None
            }
        }
    }

    /// Byte size for layout purposes.
    pub(crate) fn size_of(&self, ty: Handle<Type>) -> u32 {
        match &self.types[ty].inner {
            TypeInner::Void => 0,
            TypeInner::Scalar(s) | TypeInner::Atomic(s) => u32::from(s.width),
            TypeInner::Vector { size, scalar } => (*size as u32) * u32::from(scalar.width),
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } => {
                let col = TypeInner::Vector {
                    size: *rows,
                    scalar: *scalar,
                };
                let col_size = match col {
                    TypeInner::Vector { size, scalar } => (size as u32) * u32::from(scalar.width),
                    _ => unreachable!(),
                };
                let col_align = vector_align(*rows, *scalar);
                (*columns as u32) * round_up(col_size, col_align)
            }
            TypeInner::Array { size, stride, .. } => match size {
                ArraySize::Constant(n) => n * stride,
                ArraySize::Dynamic => *stride,
            },
            TypeInner::Struct { span, .. } => *span,
            TypeInner::Pointer { .. }
            | TypeInner::Sampler
            | TypeInner::SampledTexture2d { .. }
            | TypeInner::TextureExternal => 0,
        }
    }

    /// Byte alignment for layout purposes.
    pub(crate) fn align_of(&self, ty: Handle<Type>) -> u32 {
        match &self.types[ty].inner {
            TypeInner::Void => 1,
            TypeInner::Scalar(s) | TypeInner::Atomic(s) => u32::from(s.width),
            TypeInner::Vector { size, scalar } => vector_align(*size, *scalar),
            TypeInner::Matrix { rows, scalar, .. } => vector_align(*rows, *scalar),
            TypeInner::Array { base, .. } => self.align_of(*base),
            TypeInner::Struct { members, .. } => members
                .iter()
                .map(|m| self.align_of(m.ty))
                .max()
                .unwrap_or(1),
            TypeInner::Pointer { .. }
            | TypeInner::Sampler
            | TypeInner::SampledTexture2d { .. }
            | TypeInner::TextureExternal => 1,
        }
    }

    pub(crate) fn type_name(&self, ty: Handle<Type>) -> String {
        shade_ir::format_type(&self.types, ty)
    }
}

/// Vector alignment: vec2 aligns to two components, vec3 and vec4 to
/// four.
fn vector_align(size: shade_ir::VectorSize, scalar: Scalar) -> u32 {
    let components = match size {
        shade_ir::VectorSize::Bi => 2,
        shade_ir::VectorSize::Tri | shade_ir::VectorSize::Quad => 4,
    };
    components * u32::from(scalar.width)
}

fn vector_size(size: ast::VectorSize) -> shade_ir::VectorSize {
    match size {
        ast::VectorSize::Bi => shade_ir::VectorSize::Bi,
        ast::VectorSize::Tri => shade_ir::VectorSize::Tri,
        ast::VectorSize::Quad => shade_ir::VectorSize::Quad,
    }
}

#[cfg(test)]
mod tests {
    use shade_diag::SourceFile;
    use shade_ir::TypeInner;

    use crate::{resolve, DeclInfo, Program};

    fn resolve_src(source: &str) -> Program {
        let file = SourceFile::new("test.wgsl", source);
        let (module, diags) = shade_parser::parse(&file);
        assert!(!diags.has_errors(), "parse failed: {diags:?}");
        resolve(&file, module)
    }

    fn error_messages(program: &Program) -> Vec<String> {
        program
            .diagnostics()
            .iter()
            .map(|d| format!("{}: {}", d.span.start, d.message))
            .collect()
    }

    #[test]
    fn valid_compute_shader_resolves_clean() {
        let program = resolve_src(
            r#"
@group(0) @binding(0) var<storage, read> input: array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    output[i] = input[i] * 2.0;
}
"#,
        );
        assert!(program.is_valid(), "{:?}", error_messages(&program));
        let info = program.function_info(2).unwrap();
        assert_eq!(info.stage, Some(shade_ir::Stage::Compute));
        assert_eq!(info.workgroup_size, Some([64, 1, 1]));
    }

    #[test]
    fn unknown_identifier_is_diagnosed() {
        let program = resolve_src("fn f() { let x = missing; }");
        assert!(!program.is_valid());
        assert!(error_messages(&program)
            .iter()
            .any(|m| m.contains("unknown identifier 'missing'")));
    }

    #[test]
    fn concrete_type_mismatch_is_a_hard_error() {
        let program = resolve_src("fn f() { var x: f32 = true; }");
        assert!(!program.is_valid());
        assert!(error_messages(&program)
            .iter()
            .any(|m| m.contains("type mismatch: expected 'f32', found 'bool'")));
    }

    #[test]
    fn abstract_literals_materialize_at_first_concrete_use() {
        let program = resolve_src(
            "fn f() { var a: f32 = 1; var b: u32 = 7; let c = 1 + 2; var d: f32 = 0.5 + 1; }",
        );
        assert!(program.is_valid(), "{:?}", error_messages(&program));
    }

    #[test]
    fn abstract_float_does_not_materialize_to_int() {
        let program = resolve_src("fn f() { var x: i32 = 1.5; }");
        assert!(!program.is_valid());
    }

    #[test]
    fn const_assert_evaluates() {
        let ok = resolve_src("const N = 4;\nconst_assert N > 0;\n");
        assert!(ok.is_valid(), "{:?}", error_messages(&ok));

        let bad = resolve_src("const N = 4;\nconst_assert N > 8;\n");
        assert!(!bad.is_valid());
        assert!(error_messages(&bad)
            .iter()
            .any(|m| m.contains("const assertion failed")));
    }

    #[test]
    fn io_attributes_rejected_on_helper_functions() {
        let program = resolve_src("fn helper(@builtin(vertex_index) i: u32) -> u32 { return i; }");
        assert!(!program.is_valid());
        assert!(error_messages(&program)
            .iter()
            .any(|m| m.contains("only valid on entry point IO")));
    }

    #[test]
    fn compute_requires_workgroup_size() {
        let program = resolve_src("@compute fn main() { }");
        assert!(!program.is_valid());
        assert!(error_messages(&program)
            .iter()
            .any(|m| m.contains("must include 'workgroup_size'")));
    }

    #[test]
    fn resource_vars_require_group_and_binding() {
        let program = resolve_src("var<storage> data: array<f32>;");
        assert!(!program.is_valid());
        assert!(error_messages(&program)
            .iter()
            .any(|m| m.contains("requires both @group and @binding")));
    }

    #[test]
    fn redeclaration_in_same_scope_is_diagnosed() {
        let program = resolve_src("fn f() { let x = 1; let x = 2; }");
        assert!(!program.is_valid());
        assert!(error_messages(&program)
            .iter()
            .any(|m| m.contains("redeclaration of 'x'")));
    }

    #[test]
    fn shadowing_in_nested_scope_is_permitted() {
        let program = resolve_src("fn f() { let x = 1; { let x = 2.0; let y = x * 2.0; } }");
        assert!(program.is_valid(), "{:?}", error_messages(&program));
    }

    #[test]
    fn struct_member_layout() {
        let program = resolve_src("struct S { a: u32, b: vec2<f32>, c: f32 }");
        assert!(program.is_valid(), "{:?}", error_messages(&program));
        let DeclInfo::Struct(ty) = program.decl_info(0) else {
            panic!("expected a struct");
        };
        let TypeInner::Struct { members, span } = &program.types()[*ty].inner else {
            panic!("expected a struct type");
        };
        // vec2<f32> aligns to 8: a at 0, b at 8, c at 16, span 24.
        assert_eq!(members[0].offset, 0);
        assert_eq!(members[1].offset, 8);
        assert_eq!(members[2].offset, 16);
        assert_eq!(*span, 24);
    }

    #[test]
    fn functions_must_be_declared_before_use() {
        let program = resolve_src("fn f() { g(); }\nfn g() { }");
        assert!(!program.is_valid());
        assert!(error_messages(&program)
            .iter()
            .any(|m| m.contains("unknown function 'g'")));
    }

    #[test]
    fn recursion_is_rejected() {
        let program = resolve_src("fn f() { f(); }");
        assert!(!program.is_valid());
        assert!(error_messages(&program)
            .iter()
            .any(|m| m.contains("recursion is not allowed")));
    }

    #[test]
    fn switch_requires_exactly_one_default() {
        let program = resolve_src("fn f(x: i32) { switch x { case 1: { } } }");
        assert!(!program.is_valid());
        assert!(error_messages(&program)
            .iter()
            .any(|m| m.contains("exactly one default clause")));
    }

    #[test]
    fn cannot_assign_to_let() {
        let program = resolve_src("fn f() { let x = 1; x = 2; }");
        assert!(!program.is_valid());
        assert!(error_messages(&program)
            .iter()
            .any(|m| m.contains("cannot assign to immutable binding 'x'")));
    }

    #[test]
    fn unknown_extension_is_a_warning_with_its_span_kept() {
        let program = resolve_src("enable undefined_ext;\n");
        assert!(program.is_valid());
        assert_eq!(program.diagnostics().len(), 1);
        assert_eq!(program.extensions().len(), 1);
        let (ext, span) = &program.extensions()[0];
        assert_eq!(ext.name(), "undefined_ext");
        assert_eq!(span.start.line, 1);
    }

    #[test]
    fn f16_requires_extension() {
        let bad = resolve_src("fn f() { var x: f16 = 1.0h; }");
        assert!(!bad.is_valid());

        let ok = resolve_src("enable f16;\nfn f() { var x: f16 = 1.0h; }");
        assert!(ok.is_valid(), "{:?}", error_messages(&ok));
    }

    #[test]
    fn swizzles_resolve() {
        let program = resolve_src(
            "fn f(v: vec4<f32>) -> f32 { let a = v.xyz; let b = a.zyx; return b.x + v.w; }",
        );
        assert!(program.is_valid(), "{:?}", error_messages(&program));
    }

    #[test]
    fn invalid_swizzle_is_diagnosed() {
        let program = resolve_src("fn f(v: vec2<f32>) -> f32 { return v.z; }");
        assert!(!program.is_valid());
        assert!(error_messages(&program)
            .iter()
            .any(|m| m.contains("invalid vector swizzle 'z'")));
    }

    #[test]
    fn resolution_is_deterministic() {
        let source = "fn f() { let x = missing + also_missing; }";
        let first = error_messages(&resolve_src(source));
        let second = error_messages(&resolve_src(source));
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn atomics_type_check() {
        let program = resolve_src(
            r#"
@group(0) @binding(0) var<storage, read_write> counter: atomic<u32>;

@compute @workgroup_size(1)
fn main() {
    let old = atomicAdd(&counter, 1u);
    let seen = atomicLoad(&counter);
    _ = old + seen;
}
"#,
        );
        assert!(program.is_valid(), "{:?}", error_messages(&program));
    }

    #[test]
    fn scalar_has_no_members() {
        let program = resolve_src("fn f() { let x = 1; let y = x.y; }");
        assert!(!program.is_valid());
    }
}
