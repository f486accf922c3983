//! Semantic analysis for the shade compiler.
//!
//! [`resolve`] walks a parsed [`ast::Module`], builds per-scope symbol
//! tables, infers and checks types (materializing abstract numeric
//! literals at first concrete use), validates attribute placement, runs
//! the uniformity analysis over GPU control flow, and produces a
//! [`Program`]. [`lower::build_module`] then lowers a valid program into
//! the basic-block IR.

mod expr;
pub mod lower;
mod resolver;
mod symbol;
mod uniformity;

use std::collections::HashMap;

use shade_diag::{DiagnosticList, SourceFile, Span};
use shade_ir::{Builtin, Handle, ResourceBinding, Stage, Type, UniqueArena};
use shade_parser::ast::{self, ExprId, Extension};

pub use symbol::{Symbol, SymbolTable};

/// Options controlling a single resolve.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResolveOptions {
    /// Skip the uniformity analysis, as if the module enabled the
    /// `disable_uniformity_analysis` extension.
    pub disable_uniformity: bool,
}

/// When an expression's value is available.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum EvalStage {
    /// Known at compile time.
    Constant,
    /// Computed per invocation at runtime.
    Runtime,
}

/// A compile-time scalar value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ConstValue {
    /// The value as a `u32`, if it is a non-negative integer in range.
    pub fn as_u32(self) -> Option<u32> {
        match self {
            Self::Int(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }

    /// The value as an `i64`, if it is an integer.
    pub fn as_int(self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    /// The value as a bool, if it is one.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }
}

/// What a call expression resolved to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CallTarget {
    /// A user function, by declaration index.
    Function(usize),
    /// A built-in function.
    Builtin(Builtin),
    /// A type constructor or conversion.
    Construct(Handle<Type>),
}

/// What a member access expression resolved to.
#[derive(Clone, Debug, PartialEq)]
pub enum MemberAccess {
    /// A struct field, by member index.
    Field(u32),
    /// A vector swizzle, one to four components.
    Swizzle(Vec<shade_ir::SwizzleComponent>),
}

/// Semantic information attached to one AST expression.
#[derive(Clone, Debug)]
pub struct ExprInfo {
    /// The resolved (possibly materialized) type.
    pub ty: Handle<Type>,
    /// Compile-time constant vs. runtime.
    pub stage: EvalStage,
    /// The value, when statically known and scalar.
    pub value: Option<ConstValue>,
    /// For identifier expressions: the symbol they resolved to.
    pub symbol: Option<Symbol>,
    /// For call expressions: the resolved target.
    pub call_target: Option<CallTarget>,
    /// For member expressions: field vs. swizzle.
    pub member: Option<MemberAccess>,
}

/// What a declared name refers to.
#[derive(Clone, Debug)]
pub enum SymbolBinding {
    /// A module-scope `var`, by declaration index.
    GlobalVar(usize),
    /// A module-scope `const`, by declaration index.
    GlobalConst(usize),
    /// A function, by declaration index.
    Function(usize),
    /// A struct or alias type.
    Type(Handle<Type>),
    /// A function-local binding.
    Local(LocalBinding),
}

/// A function-local `var`, `let`, `const`, or parameter.
#[derive(Clone, Debug)]
pub struct LocalBinding {
    pub kind: LocalKind,
    pub ty: Handle<Type>,
    /// Constant value for `const` locals.
    pub value: Option<ConstValue>,
}

/// The kind of a function-local binding.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum LocalKind {
    Var,
    Let,
    Const,
    Param,
}

/// Per-declaration semantic information, parallel to
/// `ast::Module::declarations`.
#[derive(Clone, Debug)]
pub enum DeclInfo {
    Function(FunctionInfo),
    Var(GlobalVarInfo),
    Const(GlobalConstInfo),
    Struct(Handle<Type>),
    Alias(Handle<Type>),
    ConstAssert,
    /// The declaration failed to resolve; its diagnostics are recorded.
    Poisoned,
}

/// Semantic information for a resolved function.
#[derive(Clone, Debug)]
pub struct FunctionInfo {
    /// Entry-point stage, if any.
    pub stage: Option<Stage>,
    /// Const-evaluated `@workgroup_size` for compute entry points.
    pub workgroup_size: Option<[u32; 3]>,
    /// Resolved return type, if declared.
    pub return_ty: Option<Handle<Type>>,
    /// Resolved parameter types, in order.
    pub param_types: Vec<Handle<Type>>,
    /// This function (transitively) calls a builtin that requires
    /// uniform control flow.
    pub requires_uniformity: bool,
}

/// Semantic information for a module-scope `var`.
#[derive(Clone, Debug)]
pub struct GlobalVarInfo {
    pub ty: Handle<Type>,
    pub space: shade_ir::AddressSpace,
    pub binding: Option<ResourceBinding>,
}

/// Semantic information for a module-scope `const`.
#[derive(Clone, Debug)]
pub struct GlobalConstInfo {
    pub ty: Handle<Type>,
    pub value: Option<ConstValue>,
}

/// A resolved program: the AST plus symbol, type, and constant
/// information, and every diagnostic produced on the way.
///
/// Check [`Program::is_valid`] before trusting any other output.
#[derive(Debug)]
pub struct Program {
    pub(crate) file: SourceFile,
    pub(crate) ast: ast::Module,
    pub(crate) symbols: SymbolTable,
    pub(crate) types: UniqueArena<Type>,
    pub(crate) expr_info: Vec<ExprInfo>,
    pub(crate) decl_info: Vec<DeclInfo>,
    pub(crate) bindings: Vec<SymbolBinding>,
    /// Symbol introduced by a local declaration or parameter, keyed by
    /// the span of its name.
    pub(crate) decl_symbols: HashMap<Span, Symbol>,
    pub(crate) extensions: Vec<(Extension, Span)>,
    pub(crate) diagnostics: DiagnosticList,
}

impl Program {
    /// The source file this program was resolved from, for diagnostic
    /// formatting.
    pub fn file(&self) -> &SourceFile {
        &self.file
    }

    /// The abstract syntax tree this program was resolved from.
    pub fn ast(&self) -> &ast::Module {
        &self.ast
    }

    /// Every diagnostic produced while resolving.
    pub fn diagnostics(&self) -> &DiagnosticList {
        &self.diagnostics
    }

    /// Returns `true` if the program resolved without errors. Output of
    /// downstream stages is undefined for invalid programs.
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.has_errors()
    }

    /// The interned type arena.
    pub fn types(&self) -> &UniqueArena<Type> {
        &self.types
    }

    /// Semantic info for an expression.
    pub fn expr_info(&self, expr: ExprId) -> &ExprInfo {
        &self.expr_info[expr.index()]
    }

    /// The resolved type of an expression.
    pub fn expr_type(&self, expr: ExprId) -> Handle<Type> {
        self.expr_info[expr.index()].ty
    }

    /// The constant value of an expression as a `u32`, if known.
    pub fn const_u32(&self, expr: ExprId) -> Option<u32> {
        self.expr_info[expr.index()].value.and_then(ConstValue::as_u32)
    }

    /// Semantic info for a declaration, parallel to the AST declaration
    /// list.
    pub fn decl_info(&self, index: usize) -> &DeclInfo {
        &self.decl_info[index]
    }

    /// Function info for a declaration index, if it is a function.
    pub fn function_info(&self, index: usize) -> Option<&FunctionInfo> {
        match &self.decl_info[index] {
            DeclInfo::Function(info) => Some(info),
            _ => None,
        }
    }

    /// Extensions enabled by `enable` directives, with their spans.
    pub fn extensions(&self) -> &[(Extension, Span)] {
        &self.extensions
    }

    /// Returns `true` if the module enables the given extension.
    pub fn has_extension(&self, extension: &Extension) -> bool {
        self.extensions.iter().any(|(e, _)| e == extension)
    }

    /// What a symbol refers to.
    ///
    /// # Panics
    ///
    /// Panics if the symbol belongs to a different program.
    pub fn symbol_binding(&self, symbol: Symbol) -> &SymbolBinding {
        // Ownership check; panics on cross-program use.
        let _ = self.symbols.name(symbol);
        &self.bindings[symbol.index()]
    }

    /// The name of a symbol.
    pub fn symbol_name(&self, symbol: Symbol) -> &str {
        self.symbols.name(symbol)
    }

    /// The symbol introduced by the local declaration or parameter whose
    /// name occupies `name_span`.
    pub fn local_symbol(&self, name_span: Span) -> Option<Symbol> {
        self.decl_symbols.get(&name_span).copied()
    }

    /// The address space of the variable a place expression is rooted
    /// in. Function-scope `var`s live in the `function` space.
    pub fn place_space(&self, expr: ExprId) -> Option<shade_ir::AddressSpace> {
        let mut current = expr;
        loop {
            match &self.ast.exprs[current].kind {
                ast::ExpressionKind::Ident(_) => {
                    let symbol = self.expr_info[current.index()].symbol?;
                    return match &self.bindings[symbol.index()] {
                        SymbolBinding::Local(local) if local.kind == LocalKind::Var => {
                            Some(shade_ir::AddressSpace::Function)
                        }
                        SymbolBinding::GlobalVar(index) => match &self.decl_info[*index] {
                            DeclInfo::Var(info) => Some(info.space),
                            _ => None,
                        },
                        _ => None,
                    };
                }
                ast::ExpressionKind::Index { base, .. }
                | ast::ExpressionKind::Member { base, .. } => current = *base,
                _ => return None,
            }
        }
    }
}

/// Resolves a parsed module with default options.
pub fn resolve(file: &SourceFile, module: ast::Module) -> Program {
    resolve_with(file, module, &ResolveOptions::default())
}

/// Resolves a parsed module.
///
/// Resolution never fails outright: a `Program` is always produced, and
/// its diagnostic list records every problem found. The analysis is
/// deterministic: resolving the same AST twice produces structurally
/// identical diagnostics and symbol assignments.
pub fn resolve_with(file: &SourceFile, module: ast::Module, options: &ResolveOptions) -> Program {
    resolver::Resolver::run(file, module, options)
}
