//! Uniformity analysis.
//!
//! Proves that builtins which synchronize or differentiate across the
//! invocation group (barriers, derivatives, implicit-derivative texture
//! sampling) are only reached under control flow that is uniform across
//! the group. Sources of non-uniformity are per-invocation builtin
//! inputs, entry-point IO locations, and variables assigned
//! non-uniform values (or assigned at all under divergent control
//! flow). A violating call is a hard error at the call site, with a
//! note citing the divergent condition.
//!
//! Loop bodies are walked twice so loop-carried non-uniformity reaches
//! the second pass; only the second pass records diagnostics.

use std::collections::HashMap;

use shade_diag::Span;
use shade_ir::BuiltinValue;
use shade_parser::ast::{
    AssignTarget, AttributeKind, Declaration, ExprId, ExpressionKind, Function, Statement,
    StatementKind,
};

use crate::resolver::Resolver;
use crate::{CallTarget, DeclInfo, Symbol};

pub(crate) fn analyze(resolver: &mut Resolver, declarations: &[Declaration]) {
    let mut summaries = vec![false; declarations.len()];
    for (index, decl) in declarations.iter().enumerate() {
        let Declaration::Function(function) = decl else {
            continue;
        };
        let requires = analyze_function(resolver, &summaries, index, function);
        summaries[index] = requires;
        if let DeclInfo::Function(info) = &mut resolver.decl_info[index] {
            info.requires_uniformity = requires;
        }
    }
}

fn analyze_function(
    resolver: &mut Resolver,
    summaries: &[bool],
    index: usize,
    function: &Function,
) -> bool {
    let is_entry = matches!(
        resolver.decl_info.get(index),
        Some(DeclInfo::Function(info)) if info.stage.is_some()
    );

    let mut env = HashMap::new();
    for param in &function.params {
        let uniform = param_uniform(param, is_entry);
        if let Some(symbol) = resolver.decl_symbols.get(&param.name.span) {
            env.insert(*symbol, uniform);
        }
    }

    let mut analysis = Analysis {
        resolver,
        summaries,
        env,
        divergent: None,
        escape_divergence: None,
        requires_uniform: false,
        record: true,
    };
    for stmt in &function.body.statements {
        analysis.walk_stmt(stmt);
    }
    analysis.requires_uniform
}

/// Non-entry parameters are assumed uniform; the call site accounts for
/// the callee's requirements via its summary.
fn param_uniform(param: &shade_parser::ast::Parameter, is_entry: bool) -> bool {
    if !is_entry {
        return true;
    }
    for attr in &param.attributes {
        match &attr.kind {
            AttributeKind::Builtin(name) => {
                return BuiltinValue::from_str(&name.name).is_some_and(BuiltinValue::is_uniform);
            }
            AttributeKind::Location(_) => return false,
            _ => {}
        }
    }
    false
}

struct Analysis<'a> {
    resolver: &'a mut Resolver,
    summaries: &'a [bool],
    /// Uniformity of each local (and private global) binding.
    env: HashMap<Symbol, bool>,
    /// Innermost divergent condition, when control flow is divergent.
    divergent: Option<Span>,
    /// Set when a break/continue/return escapes under divergent control
    /// flow inside the current loop; later iterations are then
    /// divergent.
    escape_divergence: Option<Span>,
    requires_uniform: bool,
    record: bool,
}

impl Analysis<'_> {
    // ----- expression uniformity (pure) --------------------------------

    fn expr_uniform(&self, id: ExprId) -> bool {
        match &self.resolver.ast.exprs[id].kind {
            ExpressionKind::Literal(_) => true,
            ExpressionKind::Ident(_) => self.ident_uniform(id),
            ExpressionKind::Unary { expr, .. } => self.expr_uniform(*expr),
            ExpressionKind::Binary { left, right, .. } => {
                self.expr_uniform(*left) && self.expr_uniform(*right)
            }
            ExpressionKind::Call { args, .. } => {
                args.iter().all(|&arg| self.expr_uniform(arg))
            }
            ExpressionKind::Index { base, index } => {
                self.expr_uniform(*base) && self.expr_uniform(*index)
            }
            ExpressionKind::Member { base, .. } => self.expr_uniform(*base),
        }
    }

    /// Shared and resource memory holds one value for the whole group,
    /// and private storage starts from its uniform initializer; the env
    /// overrides either once a non-uniform assignment is seen.
    fn ident_uniform(&self, id: ExprId) -> bool {
        let Some(symbol) = self.resolver.expr_info[id.index()].symbol else {
            return true;
        };
        self.env.get(&symbol).copied().unwrap_or(true)
    }

    /// The symbol at the root of a place expression.
    fn root_symbol(&self, id: ExprId) -> Option<Symbol> {
        let mut current = id;
        loop {
            match &self.resolver.ast.exprs[current].kind {
                ExpressionKind::Ident(_) => {
                    return self.resolver.expr_info[current.index()].symbol;
                }
                ExpressionKind::Index { base, .. } | ExpressionKind::Member { base, .. } => {
                    current = *base;
                }
                ExpressionKind::Unary { expr, .. } => current = *expr,
                _ => return None,
            }
        }
    }

    // ----- call checking -----------------------------------------------

    /// Recursively checks every call in an expression tree against the
    /// current control-flow context.
    fn check_expr(&mut self, id: ExprId) {
        match self.resolver.ast.exprs[id].kind.clone() {
            ExpressionKind::Literal(_) | ExpressionKind::Ident(_) => {}
            ExpressionKind::Unary { expr, .. } => self.check_expr(expr),
            ExpressionKind::Binary { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
            }
            ExpressionKind::Call { callee, args, .. } => {
                for arg in &args {
                    self.check_expr(*arg);
                }
                let requires = match self.resolver.expr_info[id.index()].call_target {
                    Some(CallTarget::Builtin(fun)) => fun.requires_uniformity(),
                    Some(CallTarget::Function(index)) => self.summaries[index],
                    _ => false,
                };
                if requires {
                    self.requires_uniform = true;
                    if let Some(condition) = self.divergent {
                        if self.record {
                            let span = self.resolver.ast.exprs[id].span;
                            self.resolver.diagnostics.add_error(
                                span,
                                format!(
                                    "'{}' must only be called from uniform control flow",
                                    callee.name
                                ),
                            );
                            self.resolver.diagnostics.add_note(
                                condition,
                                "control flow depends on possibly non-uniform value",
                            );
                        }
                    }
                }
            }
            ExpressionKind::Index { base, index } => {
                self.check_expr(base);
                self.check_expr(index);
            }
            ExpressionKind::Member { base, .. } => self.check_expr(base),
        }
    }

    // ----- statement walk ----------------------------------------------

    fn walk_block(&mut self, block: &shade_parser::ast::Block) {
        for stmt in &block.statements {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Statement) {
        match &stmt.kind {
            StatementKind::Decl(decl) => {
                if let Some(init) = decl.init {
                    self.check_expr(init);
                }
                let uniform = decl.init.map_or(true, |init| self.expr_uniform(init))
                    && self.divergent.is_none();
                if let Some(symbol) = self.resolver.decl_symbols.get(&decl.name.span) {
                    self.env.insert(*symbol, uniform);
                }
            }
            StatementKind::Assign { target, value, .. } => {
                self.check_expr(*value);
                match target {
                    AssignTarget::Phony(_) => {}
                    AssignTarget::Expr(target) => {
                        self.check_expr(*target);
                        let uniform = self.expr_uniform(*value) && self.divergent.is_none();
                        if let Some(symbol) = self.root_symbol(*target) {
                            self.env.insert(symbol, uniform);
                        }
                    }
                }
            }
            StatementKind::Increment(target) | StatementKind::Decrement(target) => {
                self.check_expr(*target);
                if let Some(symbol) = self.root_symbol(*target) {
                    let was = self.env.get(&symbol).copied().unwrap_or(true);
                    self.env.insert(symbol, was && self.divergent.is_none());
                }
            }
            StatementKind::If {
                condition,
                then_block,
                else_statement,
            } => {
                self.check_expr(*condition);
                let saved = self.divergent;
                if saved.is_none() && !self.expr_uniform(*condition) {
                    self.divergent = Some(self.resolver.ast.exprs[*condition].span);
                }
                self.walk_block(then_block);
                if let Some(else_stmt) = else_statement {
                    self.walk_stmt(else_stmt);
                }
                self.divergent = saved;
            }
            StatementKind::Loop {
                body,
                continuing,
                break_if,
            } => {
                let saved = self.divergent;
                self.in_loop(saved, |analysis, carried| {
                    analysis.divergent = saved.or(carried);
                    analysis.walk_block(body);
                    if let Some(continuing) = continuing {
                        analysis.walk_block(continuing);
                    }
                    if let Some(break_if) = break_if {
                        analysis.check_expr(*break_if);
                        if !analysis.expr_uniform(*break_if) {
                            analysis.note_escape(
                                analysis.resolver.ast.exprs[*break_if].span,
                            );
                        }
                    }
                });
            }
            StatementKind::While { condition, body } => {
                let saved = self.divergent;
                self.in_loop(saved, |analysis, carried| {
                    analysis.check_expr(*condition);
                    let divergent_cond = if analysis.expr_uniform(*condition) {
                        None
                    } else {
                        Some(analysis.resolver.ast.exprs[*condition].span)
                    };
                    analysis.divergent = saved.or(carried).or(divergent_cond);
                    analysis.walk_block(body);
                });
            }
            StatementKind::For {
                init,
                condition,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init);
                }
                let saved = self.divergent;
                self.in_loop(saved, |analysis, carried| {
                    let divergent_cond = condition.and_then(|condition| {
                        analysis.check_expr(condition);
                        if analysis.expr_uniform(condition) {
                            None
                        } else {
                            Some(analysis.resolver.ast.exprs[condition].span)
                        }
                    });
                    analysis.divergent = saved.or(carried).or(divergent_cond);
                    if let Some(update) = update {
                        analysis.walk_stmt(update);
                    }
                    analysis.walk_block(body);
                });
            }
            StatementKind::Switch { selector, cases } => {
                self.check_expr(*selector);
                let saved = self.divergent;
                if saved.is_none() && !self.expr_uniform(*selector) {
                    self.divergent = Some(self.resolver.ast.exprs[*selector].span);
                }
                for case in cases {
                    self.walk_block(&case.body);
                }
                self.divergent = saved;
            }
            StatementKind::Break | StatementKind::Continue => {
                if let Some(span) = self.divergent {
                    self.note_escape(span);
                }
            }
            StatementKind::Return { value } => {
                if let Some(value) = value {
                    self.check_expr(*value);
                }
                if let Some(span) = self.divergent {
                    self.note_escape(span);
                }
            }
            StatementKind::Discard => {
                if let Some(span) = self.divergent {
                    self.note_escape(span);
                }
            }
            StatementKind::ConstAssert(_) => {}
            StatementKind::Call(expr) => self.check_expr(*expr),
            StatementKind::Block(block) => self.walk_block(block),
        }
    }

    /// Records that control flow escaped (break/continue/return) under
    /// divergent control flow; the enclosing loop's later iterations are
    /// then divergent.
    fn note_escape(&mut self, span: Span) {
        if self.escape_divergence.is_none() {
            self.escape_divergence = Some(span);
        }
    }

    /// Walks a loop body twice: the first (silent) pass propagates
    /// loop-carried non-uniformity and divergent escapes, the second
    /// records diagnostics.
    fn in_loop(
        &mut self,
        saved: Option<Span>,
        mut body: impl FnMut(&mut Self, Option<Span>),
    ) {
        let saved_escape = self.escape_divergence;
        self.escape_divergence = None;

        let saved_record = self.record;
        self.record = false;
        body(self, None);
        self.record = saved_record;

        let carried = self.escape_divergence;
        body(self, carried);

        self.divergent = saved;
        self.escape_divergence = saved_escape.or(self.escape_divergence);
    }
}

#[cfg(test)]
mod tests {
    use shade_diag::{Severity, SourceFile};

    use crate::{resolve, resolve_with, Program, ResolveOptions};

    fn resolve_src(source: &str) -> Program {
        let file = SourceFile::new("test.wgsl", source);
        let (module, diags) = shade_parser::parse(&file);
        assert!(!diags.has_errors(), "parse failed: {diags:?}");
        resolve(&file, module)
    }

    const DIVERGENT_BARRIER: &str = r#"
@group(0) @binding(0) var<storage, read_write> data: array<u32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x == 0u {
        workgroupBarrier();
    }
    data[gid.x] = gid.x;
}
"#;

    #[test]
    fn barrier_under_uniform_condition_passes() {
        let program = resolve_src(
            r#"
@group(0) @binding(0) var<uniform> count: u32;

@compute @workgroup_size(64)
fn main(@builtin(workgroup_id) wid: vec3<u32>) {
    if count > 0u {
        workgroupBarrier();
    }
    if wid.x == 0u {
        storageBarrier();
    }
}
"#,
        );
        assert!(program.is_valid(), "{:?}", program.diagnostics());
    }

    #[test]
    fn barrier_under_divergent_condition_fails_with_one_error() {
        let program = resolve_src(DIVERGENT_BARRIER);
        assert!(!program.is_valid());
        assert_eq!(program.diagnostics().error_count(), 1);

        let diags: Vec<_> = program.diagnostics().iter().collect();
        assert_eq!(diags[0].severity, Severity::Error);
        assert_eq!(
            diags[0].message,
            "'workgroupBarrier' must only be called from uniform control flow"
        );
        // The error cites the call site; the note cites the condition.
        assert_eq!(diags[0].span.start.line, 7);
        assert_eq!(diags[1].severity, Severity::Note);
        assert_eq!(
            diags[1].message,
            "control flow depends on possibly non-uniform value"
        );
        assert_eq!(diags[1].span.start.line, 6);
    }

    #[test]
    fn waiving_the_analysis_by_extension_suppresses_the_error() {
        let source = format!("enable disable_uniformity_analysis;\n{DIVERGENT_BARRIER}");
        let file = SourceFile::new("test.wgsl", &source);
        let (module, diags) = shade_parser::parse(&file);
        assert!(!diags.has_errors());
        let program = resolve(&file, module);
        assert!(program.is_valid(), "{:?}", program.diagnostics());
    }

    #[test]
    fn waiving_the_analysis_by_option_suppresses_the_error() {
        let file = SourceFile::new("test.wgsl", DIVERGENT_BARRIER);
        let (module, diags) = shade_parser::parse(&file);
        assert!(!diags.has_errors());
        let program = resolve_with(
            &file,
            module,
            &ResolveOptions {
                disable_uniformity: true,
            },
        );
        assert!(program.is_valid(), "{:?}", program.diagnostics());
    }

    #[test]
    fn derivative_under_divergent_condition_fails() {
        let program = resolve_src(
            r#"
@fragment
fn main(@builtin(front_facing) facing: bool) -> @location(0) vec4<f32> {
    var v = 0.0;
    if facing {
        v = dpdx(v);
    }
    return vec4<f32>(v, 0.0, 0.0, 1.0);
}
"#,
        );
        assert!(!program.is_valid());
        assert_eq!(program.diagnostics().error_count(), 1);
    }

    #[test]
    fn helper_containing_barrier_propagates_the_requirement() {
        let program = resolve_src(
            r#"
fn sync() {
    workgroupBarrier();
}

@compute @workgroup_size(64)
fn main(@builtin(local_invocation_index) lid: u32) {
    if lid == 0u {
        sync();
    }
}
"#,
        );
        assert!(!program.is_valid());
        let diags: Vec<_> = program.diagnostics().iter().collect();
        assert!(diags[0].message.contains("'sync' must only be called"));
        assert!(program.function_info(0).unwrap().requires_uniformity);
    }

    #[test]
    fn variable_assigned_divergently_taints_later_conditions() {
        let program = resolve_src(
            r#"
@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    var flag = false;
    if gid.x > 31u {
        flag = true;
    }
    if flag {
        workgroupBarrier();
    }
}
"#,
        );
        assert!(!program.is_valid());
        assert_eq!(program.diagnostics().error_count(), 1);
    }

    #[test]
    fn texture_sample_requires_uniform_control_flow() {
        let program = resolve_src(
            r#"
@group(0) @binding(0) var t: texture_2d<f32>;
@group(0) @binding(1) var s: sampler;

@fragment
fn main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    if uv.x > 0.5 {
        return textureSample(t, s, uv);
    }
    return vec4<f32>(0.0, 0.0, 0.0, 1.0);
}
"#,
        );
        assert!(!program.is_valid());
        assert_eq!(program.diagnostics().error_count(), 1);
    }
}
