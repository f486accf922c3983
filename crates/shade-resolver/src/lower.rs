//! Lowers a resolved [`Program`] into the basic-block IR.
//!
//! Structured control flow (if/loop/for/while/switch) becomes explicit
//! blocks with branch terminators; `for` and `while` desugar through the
//! loop form (header, body, continuing, merge). Every IR value records
//! the source span of the expression it came from.

use std::collections::HashMap;

use shade_diag::Span;
use shade_ir::{
    AddressSpace, Binding, Block, BuiltinValue, Function, FunctionParam, FunctionResult,
    GlobalVariable, Handle, Instruction, Literal, LocalVariable, Module, NameKey, NameMap, Op,
    Scalar, ScalarKind, SwitchCase, SwizzleComponent, Terminator, Type, TypeInner, UniqueArena,
    Value, VectorSize,
};
use shade_parser::ast::{
    self, AssignTarget, AttributeKind, Declaration, ExprId, ExpressionKind, Statement,
    StatementKind,
};

use crate::{CallTarget, ConstValue, DeclInfo, MemberAccess, Program, SymbolBinding};

/// Lowers a valid program to an IR module.
///
/// # Panics
///
/// Panics if the program has errors; callers must check
/// [`Program::is_valid`] first. Handing an invalid program to the
/// lowering stage is a compiler bug, not a user error.
pub fn build_module(program: &Program) -> Module {
    assert!(
        program.is_valid(),
        "cannot lower an invalid program; check Program::is_valid first"
    );
    let mut module = Module {
        types: program.types().clone(),
        ..Module::default()
    };

    let mut global_map = HashMap::new();
    for (index, decl) in program.ast().declarations.iter().enumerate() {
        let Declaration::Var(v) = decl else { continue };
        let DeclInfo::Var(info) = program.decl_info(index) else {
            continue;
        };
        let init = v.init.and_then(|init| {
            let expr_info = program.expr_info(init);
            let scalar = module.types[expr_info.ty].inner.scalar()?;
            expr_info.value.map(|value| literal_for(value, scalar))
        });
        let handle = module.globals.append(GlobalVariable {
            name: Some(v.name.name.clone()),
            space: info.space,
            binding: info.binding,
            ty: info.ty,
            init,
        });
        module.names.set_name(NameKey::Global(handle), &v.name.name);
        global_map.insert(index, handle);
    }

    let mut function_map = HashMap::new();
    for (index, decl) in program.ast().declarations.iter().enumerate() {
        let Declaration::Function(f) = decl else {
            continue;
        };
        let handle = module.functions.next_handle();
        function_map.insert(index, handle);
        let function = lower_function(
            program,
            &mut module.types,
            &mut module.names,
            &global_map,
            &function_map,
            index,
            f,
            handle,
        );
        module.functions.append(function);
        module.names.set_name(NameKey::Function(handle), &f.name.name);
    }

    log::debug!(
        "lowered {} globals and {} functions",
        module.globals.len(),
        module.functions.len()
    );
    module
}

fn literal_for(value: ConstValue, scalar: Scalar) -> Literal {
    match (value, scalar.kind, scalar.width) {
        (ConstValue::Bool(v), ..) => Literal::Bool(v),
        (ConstValue::Int(v), ScalarKind::Uint, _) => Literal::U32(v as u32),
        (ConstValue::Int(v), ScalarKind::Float | ScalarKind::AbstractFloat, 2) => {
            Literal::F16(v as f32)
        }
        (ConstValue::Int(v), ScalarKind::Float | ScalarKind::AbstractFloat, _) => {
            Literal::F32(v as f32)
        }
        (ConstValue::Int(v), ..) => Literal::I32(v as i32),
        (ConstValue::Float(v), ScalarKind::Float | ScalarKind::AbstractFloat, 2) => {
            Literal::F16(v as f32)
        }
        (ConstValue::Float(v), ScalarKind::Sint, _) => Literal::I32(v as i32),
        (ConstValue::Float(v), ScalarKind::Uint, _) => Literal::U32(v as u32),
        (ConstValue::Float(v), ..) => Literal::F32(v as f32),
    }
}

fn io_binding(program: &Program, attributes: &[ast::Attribute]) -> (Option<Binding>, bool) {
    let mut binding = None;
    let mut invariant = false;
    for attr in attributes {
        match &attr.kind {
            AttributeKind::Builtin(name) => {
                binding = BuiltinValue::from_str(&name.name).map(Binding::BuiltIn);
            }
            AttributeKind::Location(expr) => {
                binding = program.const_u32(*expr).map(Binding::Location);
            }
            AttributeKind::Invariant => invariant = true,
            _ => {}
        }
    }
    (binding, invariant)
}

#[allow(clippy::too_many_arguments)]
fn lower_function(
    program: &Program,
    types: &mut UniqueArena<Type>,
    names: &mut NameMap,
    globals: &HashMap<usize, Handle<GlobalVariable>>,
    functions: &HashMap<usize, Handle<Function>>,
    decl_index: usize,
    f: &ast::Function,
    handle: Handle<Function>,
) -> Function {
    let info = program
        .function_info(decl_index)
        .expect("declaration is a function");

    let mut func = Function::new(f.name.name.clone());
    func.stage = info.stage;
    func.workgroup_size = info.workgroup_size;
    for (param, &ty) in f.params.iter().zip(&info.param_types) {
        let (binding, _) = io_binding(program, &param.attributes);
        func.params.push(FunctionParam {
            name: Some(param.name.name.clone()),
            ty,
            binding,
        });
    }
    if let Some(ty) = info.return_ty {
        let (binding, invariant) = io_binding(program, &f.return_attributes);
        func.result = Some(FunctionResult {
            ty,
            binding,
            invariant,
        });
    }

    let entry = func.entry;
    let mut ctx = BodyCtx {
        program,
        func,
        types,
        names,
        globals,
        functions,
        handle,
        scopes: vec![HashMap::new()],
        current: entry,
        terminated: false,
        break_targets: Vec::new(),
        continue_targets: Vec::new(),
    };

    for (index, param) in f.params.iter().enumerate() {
        let ty = info.param_types[index];
        let value = ctx.emit(Op::Param(index as u32), ty, param.name.span);
        ctx.names
            .set_name(NameKey::Value(handle, value), &param.name.name);
        ctx.bind(&param.name.name, Slot::Val(value));
    }

    for stmt in &f.body.statements {
        if ctx.terminated {
            break;
        }
        ctx.lower_stmt(stmt);
    }
    if !ctx.terminated {
        let terminator = if ctx.func.result.is_some() {
            Terminator::Unreachable
        } else {
            Terminator::Return { value: None }
        };
        ctx.func.blocks[ctx.current].terminator = terminator;
    }
    ctx.func
}

#[derive(Clone, Copy)]
enum Slot {
    /// A pointer value; loads and stores go through it.
    Ptr(Handle<Value>),
    /// An immutable value (`let`, `const`, parameter).
    Val(Handle<Value>),
}

struct BodyCtx<'a> {
    program: &'a Program,
    func: Function,
    types: &'a mut UniqueArena<Type>,
    names: &'a mut NameMap,
    globals: &'a HashMap<usize, Handle<GlobalVariable>>,
    functions: &'a HashMap<usize, Handle<Function>>,
    handle: Handle<Function>,
    scopes: Vec<HashMap<String, Slot>>,
    current: Handle<Block>,
    terminated: bool,
    break_targets: Vec<Handle<Block>>,
    continue_targets: Vec<Handle<Block>>,
}

impl BodyCtx<'_> {
    fn bind(&mut self, name: &str, slot: Slot) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_string(), slot);
    }

    fn lookup(&self, name: &str) -> Option<Slot> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn emit(&mut self, op: Op, ty: Handle<Type>, span: Span) -> Handle<Value> {
        let value = self.func.add_value(ty, span);
        self.func.blocks[self.current].instructions.push(Instruction {
            result: Some(value),
            op,
        });
        value
    }

    fn emit_void(&mut self, op: Op) {
        self.func.blocks[self.current]
            .instructions
            .push(Instruction { result: None, op });
    }

    fn terminate(&mut self, terminator: Terminator) {
        if !self.terminated {
            self.func.blocks[self.current].terminator = terminator;
            self.terminated = true;
        }
    }

    /// Switches to `block` and resumes emitting there.
    fn resume_at(&mut self, block: Handle<Block>) {
        self.current = block;
        self.terminated = false;
    }

    fn pointer_ty(&mut self, base: Handle<Type>, space: AddressSpace) -> Handle<Type> {
        self.types.insert(Type {
            name: None,
            inner: TypeInner::Pointer { base, space },
        })
    }

    /// The concrete scalar for emitting a constant of `ty`.
    fn concrete_scalar(&self, ty: Handle<Type>) -> Option<Scalar> {
        let scalar = self.types[ty].inner.scalar()?;
        Some(match scalar.kind {
            ScalarKind::AbstractInt => Scalar::I32,
            ScalarKind::AbstractFloat => Scalar::F32,
            _ => scalar,
        })
    }

    // ----- expressions --------------------------------------------------

    fn lower_expr(&mut self, id: ExprId) -> Handle<Value> {
        let info = self.program.expr_info(id);
        let span = self.program.ast().exprs[id].span;

        // Constant folding: any expression with a known scalar value
        // collapses to one literal of its materialized type.
        if let Some(value) = info.value {
            if let Some(scalar) = self.concrete_scalar(info.ty) {
                let ty = self.scalar_ty(scalar);
                return self.emit(Op::Literal(literal_for(value, scalar)), ty, span);
            }
        }

        match self.program.ast().exprs[id].kind.clone() {
            ExpressionKind::Literal(_) => {
                // Non-scalar literals do not exist; a literal without a
                // folded value above means its info was poisoned.
                let ty = info.ty;
                self.emit(Op::Literal(Literal::U32(0)), ty, span)
            }
            ExpressionKind::Ident(ident) => self.lower_ident(id, &ident, span),
            ExpressionKind::Unary { op, expr } => match op {
                ast::UnaryOp::AddressOf => self.lower_place(expr),
                ast::UnaryOp::Deref => {
                    let pointer = self.lower_expr(expr);
                    self.emit(Op::Load { pointer }, info.ty, span)
                }
                _ => {
                    let value = self.lower_expr(expr);
                    let op = match op {
                        ast::UnaryOp::Negate => shade_ir::UnaryOp::Negate,
                        ast::UnaryOp::LogicalNot => shade_ir::UnaryOp::LogicalNot,
                        _ => shade_ir::UnaryOp::BitwiseNot,
                    };
                    let ty = self.program.expr_type(id);
                    self.emit(Op::Unary { op, value }, ty, span)
                }
            },
            ExpressionKind::Binary { op, left, right } => {
                let left = self.lower_expr(left);
                let right = self.lower_expr(right);
                let ty = self.program.expr_type(id);
                self.emit(
                    Op::Binary {
                        op: binary_op(op),
                        left,
                        right,
                    },
                    ty,
                    span,
                )
            }
            ExpressionKind::Call { args, .. } => self.lower_call(id, &args, span),
            ExpressionKind::Index { base, index } => {
                if self.is_place(id) {
                    let pointer = self.lower_place(id);
                    self.emit(Op::Load { pointer }, info.ty, span)
                } else {
                    let base = self.lower_expr(base);
                    let index = self.lower_expr(index);
                    self.emit(Op::Access { base, index }, info.ty, span)
                }
            }
            ExpressionKind::Member { base, .. } => {
                if self.is_place(id) {
                    let pointer = self.lower_place(id);
                    self.emit(Op::Load { pointer }, info.ty, span)
                } else {
                    let base_value = self.lower_expr(base);
                    self.lower_member_of_value(id, base_value, span)
                }
            }
        }
    }

    fn scalar_ty(&mut self, scalar: Scalar) -> Handle<Type> {
        self.types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(scalar),
        })
    }

    fn lower_ident(&mut self, id: ExprId, ident: &ast::Ident, span: Span) -> Handle<Value> {
        let info = self.program.expr_info(id);
        if let Some(slot) = self.lookup(&ident.name) {
            return match slot {
                Slot::Val(value) => value,
                Slot::Ptr(pointer) => self.emit(Op::Load { pointer }, info.ty, span),
            };
        }
        let Some(symbol) = info.symbol else {
            // Unresolved identifiers never survive a valid program.
            unreachable!("unresolved identifier in a valid program");
        };
        match self.program.symbol_binding(symbol).clone() {
            SymbolBinding::GlobalVar(index) => {
                let global = self.globals[&index];
                let DeclInfo::Var(var_info) = self.program.decl_info(index) else {
                    unreachable!("global var declaration mismatch");
                };
                if self.types[var_info.ty].inner.is_handle() {
                    // Textures and samplers are used by handle, not loaded.
                    self.emit(Op::GlobalRef(global), info.ty, span)
                } else {
                    let ptr_ty = self.pointer_ty(var_info.ty, var_info.space);
                    let pointer = self.emit(Op::GlobalRef(global), ptr_ty, span);
                    self.emit(Op::Load { pointer }, info.ty, span)
                }
            }
            SymbolBinding::GlobalConst(index) => {
                // Composite constants inline their initializer.
                let Declaration::Const(c) = &self.program.ast().declarations[index] else {
                    unreachable!("global const declaration mismatch");
                };
                self.lower_expr(c.init)
            }
            _ => unreachable!("identifier bound to a non-value"),
        }
    }

    fn lower_call(&mut self, id: ExprId, args: &[ExprId], span: Span) -> Handle<Value> {
        let info = self.program.expr_info(id);
        let ty = info.ty;
        match info.call_target {
            Some(CallTarget::Construct(target)) => {
                let components: Vec<_> = args.iter().map(|&a| self.lower_expr(a)).collect();
                // One-argument scalar constructors are conversions.
                if let (TypeInner::Scalar(scalar), [value]) =
                    (&self.types[target].inner, components.as_slice())
                {
                    let (kind, width) = (scalar.kind, scalar.width);
                    let value = *value;
                    return self.emit(Op::Convert { value, kind, width }, ty, span);
                }
                self.emit(
                    Op::Construct {
                        ty: target,
                        components,
                    },
                    ty,
                    span,
                )
            }
            Some(CallTarget::Function(index)) => {
                let arguments: Vec<_> = args.iter().map(|&a| self.lower_expr(a)).collect();
                let function = self.functions[&index];
                self.emit(
                    Op::Call {
                        function,
                        arguments,
                    },
                    ty,
                    span,
                )
            }
            Some(CallTarget::Builtin(fun)) => {
                let arguments: Vec<_> = args.iter().map(|&a| self.lower_expr(a)).collect();
                self.emit(Op::Builtin { fun, arguments }, ty, span)
            }
            None => unreachable!("unresolved call in a valid program"),
        }
    }

    fn lower_member_of_value(
        &mut self,
        id: ExprId,
        base: Handle<Value>,
        span: Span,
    ) -> Handle<Value> {
        let info = self.program.expr_info(id);
        let ty = info.ty;
        match info.member.clone() {
            Some(MemberAccess::Field(index)) => {
                self.emit(Op::AccessMember { base, member: index }, ty, span)
            }
            Some(MemberAccess::Swizzle(components)) => {
                if components.len() == 1 {
                    self.emit(
                        Op::AccessMember {
                            base,
                            member: components[0] as u32,
                        },
                        ty,
                        span,
                    )
                } else {
                    let size = match components.len() {
                        2 => VectorSize::Bi,
                        3 => VectorSize::Tri,
                        _ => VectorSize::Quad,
                    };
                    let mut pattern = [SwizzleComponent::X; 4];
                    for (slot, &component) in pattern.iter_mut().zip(&components) {
                        *slot = component;
                    }
                    self.emit(
                        Op::Swizzle {
                            vector: base,
                            size,
                            pattern,
                        },
                        ty,
                        span,
                    )
                }
            }
            None => unreachable!("unresolved member access in a valid program"),
        }
    }

    /// Returns `true` if an expression denotes a memory location.
    fn is_place(&self, id: ExprId) -> bool {
        match &self.program.ast().exprs[id].kind {
            ExpressionKind::Ident(ident) => {
                if let Some(slot) = self.lookup(&ident.name) {
                    return matches!(slot, Slot::Ptr(_));
                }
                let Some(symbol) = self.program.expr_info(id).symbol else {
                    return false;
                };
                match self.program.symbol_binding(symbol) {
                    SymbolBinding::GlobalVar(index) => match self.program.decl_info(*index) {
                        DeclInfo::Var(info) => !self.types[info.ty].inner.is_handle(),
                        _ => false,
                    },
                    _ => false,
                }
            }
            ExpressionKind::Index { base, .. } | ExpressionKind::Member { base, .. } => {
                self.is_place(*base)
            }
            ExpressionKind::Unary {
                op: ast::UnaryOp::Deref,
                ..
            } => true,
            _ => false,
        }
    }

    /// Lowers a place expression to a pointer value.
    fn lower_place(&mut self, id: ExprId) -> Handle<Value> {
        let span = self.program.ast().exprs[id].span;
        match self.program.ast().exprs[id].kind.clone() {
            ExpressionKind::Ident(ident) => {
                if let Some(Slot::Ptr(pointer)) = self.lookup(&ident.name) {
                    return pointer;
                }
                let symbol = self
                    .program
                    .expr_info(id)
                    .symbol
                    .expect("place identifier resolves");
                match self.program.symbol_binding(symbol) {
                    SymbolBinding::GlobalVar(index) => {
                        let index = *index;
                        let global = self.globals[&index];
                        let DeclInfo::Var(info) = self.program.decl_info(index) else {
                            unreachable!("global var declaration mismatch");
                        };
                        let (ty, space) = (info.ty, info.space);
                        let ptr_ty = self.pointer_ty(ty, space);
                        self.emit(Op::GlobalRef(global), ptr_ty, span)
                    }
                    _ => unreachable!("place rooted at a non-variable"),
                }
            }
            ExpressionKind::Index { base, index } => {
                let space = self
                    .program
                    .place_space(id)
                    .unwrap_or(AddressSpace::Function);
                let base = self.lower_place(base);
                let index = self.lower_expr(index);
                let value_ty = self.program.expr_type(id);
                let ptr_ty = self.pointer_ty(value_ty, space);
                self.emit(Op::Access { base, index }, ptr_ty, span)
            }
            ExpressionKind::Member { base, .. } => {
                let space = self
                    .program
                    .place_space(id)
                    .unwrap_or(AddressSpace::Function);
                let member = match self.program.expr_info(id).member.clone() {
                    Some(MemberAccess::Field(index)) => index,
                    Some(MemberAccess::Swizzle(components)) => components[0] as u32,
                    None => unreachable!("unresolved member access in a valid program"),
                };
                let base = self.lower_place(base);
                let value_ty = self.program.expr_type(id);
                let ptr_ty = self.pointer_ty(value_ty, space);
                self.emit(Op::AccessMember { base, member }, ptr_ty, span)
            }
            ExpressionKind::Unary {
                op: ast::UnaryOp::Deref,
                expr,
            } => self.lower_expr(expr),
            _ => unreachable!("not a place expression"),
        }
    }

    // ----- statements ---------------------------------------------------

    fn lower_block(&mut self, block: &ast::Block) {
        self.scopes.push(HashMap::new());
        for stmt in &block.statements {
            if self.terminated {
                break;
            }
            self.lower_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn lower_stmt(&mut self, stmt: &Statement) {
        match &stmt.kind {
            StatementKind::Decl(decl) => self.lower_local_decl(decl),
            StatementKind::Assign { target, op, value } => {
                match target {
                    AssignTarget::Phony(_) => {
                        self.lower_expr(*value);
                    }
                    AssignTarget::Expr(target) => {
                        let pointer = self.lower_place(*target);
                        let mut new_value = self.lower_expr(*value);
                        if let Some(op) = op {
                            let ty = self.program.expr_type(*target);
                            let span = self.program.ast().exprs[*target].span;
                            let loaded = self.emit(Op::Load { pointer }, ty, span);
                            new_value = self.emit(
                                Op::Binary {
                                    op: binary_op(*op),
                                    left: loaded,
                                    right: new_value,
                                },
                                ty,
                                span,
                            );
                        }
                        self.emit_void(Op::Store {
                            pointer,
                            value: new_value,
                        });
                    }
                }
            }
            StatementKind::Increment(target) | StatementKind::Decrement(target) => {
                let pointer = self.lower_place(*target);
                let ty = self.program.expr_type(*target);
                let span = self.program.ast().exprs[*target].span;
                let loaded = self.emit(Op::Load { pointer }, ty, span);
                let scalar = self.concrete_scalar(ty).unwrap_or(Scalar::I32);
                let one_ty = self.scalar_ty(scalar);
                let one = self.emit(
                    Op::Literal(literal_for(ConstValue::Int(1), scalar)),
                    one_ty,
                    span,
                );
                let op = if matches!(stmt.kind, StatementKind::Increment(_)) {
                    shade_ir::BinaryOp::Add
                } else {
                    shade_ir::BinaryOp::Subtract
                };
                let result = self.emit(
                    Op::Binary {
                        op,
                        left: loaded,
                        right: one,
                    },
                    ty,
                    span,
                );
                self.emit_void(Op::Store {
                    pointer,
                    value: result,
                });
            }
            StatementKind::If {
                condition,
                then_block,
                else_statement,
            } => {
                let condition = self.lower_expr(*condition);
                let then_b = self.func.add_block();
                let merge = self.func.add_block();
                let else_b = if else_statement.is_some() {
                    self.func.add_block()
                } else {
                    merge
                };
                self.terminate(Terminator::BranchIf {
                    condition,
                    then_block: then_b,
                    else_block: else_b,
                });

                self.resume_at(then_b);
                self.lower_block(then_block);
                self.terminate(Terminator::Branch { target: merge });

                if let Some(else_stmt) = else_statement {
                    self.resume_at(else_b);
                    self.scopes.push(HashMap::new());
                    self.lower_stmt(else_stmt);
                    self.scopes.pop();
                    self.terminate(Terminator::Branch { target: merge });
                }
                self.resume_at(merge);
            }
            StatementKind::Loop {
                body,
                continuing,
                break_if,
            } => {
                let header = self.func.add_block();
                let continuing_b = self.func.add_block();
                let merge = self.func.add_block();
                self.terminate(Terminator::Branch { target: header });

                self.break_targets.push(merge);
                self.continue_targets.push(continuing_b);
                self.resume_at(header);
                self.lower_block(body);
                self.terminate(Terminator::Branch {
                    target: continuing_b,
                });
                self.break_targets.pop();
                self.continue_targets.pop();

                self.resume_at(continuing_b);
                if let Some(continuing) = continuing {
                    self.lower_block(continuing);
                }
                match break_if {
                    Some(break_if) => {
                        let condition = self.lower_expr(*break_if);
                        self.terminate(Terminator::BranchIf {
                            condition,
                            then_block: merge,
                            else_block: header,
                        });
                    }
                    None => self.terminate(Terminator::Branch { target: header }),
                }
                self.resume_at(merge);
            }
            StatementKind::While { condition, body } => {
                let header = self.func.add_block();
                let body_b = self.func.add_block();
                let merge = self.func.add_block();
                self.terminate(Terminator::Branch { target: header });

                self.resume_at(header);
                let condition = self.lower_expr(*condition);
                self.terminate(Terminator::BranchIf {
                    condition,
                    then_block: body_b,
                    else_block: merge,
                });

                self.break_targets.push(merge);
                self.continue_targets.push(header);
                self.resume_at(body_b);
                self.lower_block(body);
                self.terminate(Terminator::Branch { target: header });
                self.break_targets.pop();
                self.continue_targets.pop();

                self.resume_at(merge);
            }
            StatementKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.scopes.push(HashMap::new());
                if let Some(init) = init {
                    self.lower_stmt(init);
                }
                let header = self.func.add_block();
                let body_b = self.func.add_block();
                let update_b = self.func.add_block();
                let merge = self.func.add_block();
                self.terminate(Terminator::Branch { target: header });

                self.resume_at(header);
                match condition {
                    Some(condition) => {
                        let condition = self.lower_expr(*condition);
                        self.terminate(Terminator::BranchIf {
                            condition,
                            then_block: body_b,
                            else_block: merge,
                        });
                    }
                    None => self.terminate(Terminator::Branch { target: body_b }),
                }

                self.break_targets.push(merge);
                self.continue_targets.push(update_b);
                self.resume_at(body_b);
                self.lower_block(body);
                self.terminate(Terminator::Branch { target: update_b });
                self.break_targets.pop();
                self.continue_targets.pop();

                self.resume_at(update_b);
                if let Some(update) = update {
                    self.lower_stmt(update);
                }
                self.terminate(Terminator::Branch { target: header });

                self.scopes.pop();
                self.resume_at(merge);
            }
            StatementKind::Switch { selector, cases } => {
                let selector = self.lower_expr(*selector);
                let merge = self.func.add_block();
                let mut arms = Vec::new();
                let mut default = merge;
                let mut bodies = Vec::new();
                for case in cases {
                    let block = self.func.add_block();
                    bodies.push((block, &case.body));
                    if case.selectors.is_empty() {
                        default = block;
                    } else {
                        for &sel in &case.selectors {
                            let value = self
                                .program
                                .expr_info(sel)
                                .value
                                .and_then(ConstValue::as_int)
                                .unwrap_or_default();
                            arms.push(SwitchCase {
                                selector: value,
                                block,
                            });
                        }
                    }
                }
                self.terminate(Terminator::Switch {
                    selector,
                    cases: arms,
                    default,
                });

                self.break_targets.push(merge);
                for (block, body) in bodies {
                    self.resume_at(block);
                    self.lower_block(body);
                    self.terminate(Terminator::Branch { target: merge });
                }
                self.break_targets.pop();
                self.resume_at(merge);
            }
            StatementKind::Break => {
                let target = *self.break_targets.last().expect("break inside a loop");
                self.terminate(Terminator::Branch { target });
            }
            StatementKind::Continue => {
                let target = *self
                    .continue_targets
                    .last()
                    .expect("continue inside a loop");
                self.terminate(Terminator::Branch { target });
            }
            StatementKind::Return { value } => {
                let value = value.map(|v| self.lower_expr(v));
                self.terminate(Terminator::Return { value });
            }
            StatementKind::Discard => self.terminate(Terminator::Discard),
            StatementKind::ConstAssert(_) => {}
            StatementKind::Call(expr) => {
                self.lower_expr(*expr);
            }
            StatementKind::Block(block) => self.lower_block(block),
        }
    }

    fn lower_local_decl(&mut self, decl: &ast::LocalDecl) {
        let name = &decl.name.name;
        let span = decl.name.span;
        match decl.kind {
            ast::LocalDeclKind::Var => {
                let ty = self.local_ty(decl);
                let local = self.func.locals.append(LocalVariable {
                    name: Some(name.clone()),
                    ty,
                });
                self.names
                    .set_name(NameKey::Local(self.handle, local), name);
                let ptr_ty = self.pointer_ty(ty, AddressSpace::Function);
                let pointer = self.emit(Op::LocalRef(local), ptr_ty, span);
                self.bind(name, Slot::Ptr(pointer));
                if let Some(init) = decl.init {
                    let value = self.lower_expr(init);
                    self.emit_void(Op::Store { pointer, value });
                }
            }
            ast::LocalDeclKind::Let | ast::LocalDeclKind::Const => {
                let init = decl.init.expect("let/const initializer checked by resolver");
                let value = self.lower_expr(init);
                self.names.set_name(NameKey::Value(self.handle, value), name);
                self.bind(name, Slot::Val(value));
            }
        }
    }

    /// The resolver already reconciled declared type and initializer;
    /// the symbol binding holds the final answer.
    fn local_ty(&mut self, decl: &ast::LocalDecl) -> Handle<Type> {
        let symbol = self
            .program
            .local_symbol(decl.name.span)
            .expect("local declaration has a symbol");
        match self.program.symbol_binding(symbol) {
            SymbolBinding::Local(local) => local.ty,
            _ => unreachable!("local symbol bound elsewhere"),
        }
    }
}

fn binary_op(op: ast::BinaryOp) -> shade_ir::BinaryOp {
    use ast::BinaryOp as A;
    use shade_ir::BinaryOp as B;
    match op {
        A::Add => B::Add,
        A::Subtract => B::Subtract,
        A::Multiply => B::Multiply,
        A::Divide => B::Divide,
        A::Modulo => B::Modulo,
        A::Equal => B::Equal,
        A::NotEqual => B::NotEqual,
        A::Less => B::Less,
        A::LessEqual => B::LessEqual,
        A::Greater => B::Greater,
        A::GreaterEqual => B::GreaterEqual,
        A::LogicalAnd => B::LogicalAnd,
        A::LogicalOr => B::LogicalOr,
        A::BitwiseAnd => B::BitwiseAnd,
        A::BitwiseOr => B::BitwiseOr,
        A::BitwiseXor => B::BitwiseXor,
        A::ShiftLeft => B::ShiftLeft,
        A::ShiftRight => B::ShiftRight,
    }
}

#[cfg(test)]
mod tests {
    use shade_diag::SourceFile;
    use shade_ir::{Module, NameKey, Op, Stage, Terminator};

    use super::build_module;

    fn lower_src(source: &str) -> Module {
        let file = SourceFile::new("test.wgsl", source);
        let (ast, diags) = shade_parser::parse(&file);
        assert!(!diags.has_errors(), "parse failed: {diags:?}");
        let program = crate::resolve(&file, ast);
        assert!(program.is_valid(), "resolve failed: {:?}", program.diagnostics());
        build_module(&program)
    }

    #[test]
    fn entry_point_metadata_survives_lowering() {
        let module = lower_src(
            r#"
@group(0) @binding(0) var<storage, read_write> data: array<f32>;

@compute @workgroup_size(8, 4)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    data[gid.x] = 1.0;
}
"#,
        );
        let entries: Vec<_> = module.entry_points().collect();
        assert_eq!(entries.len(), 1);
        let (handle, main) = entries[0];
        assert_eq!(main.stage, Some(Stage::Compute));
        assert_eq!(main.workgroup_size, Some([8, 4, 1]));
        assert_eq!(module.names.name_of(NameKey::Function(handle)), Some("main"));
        assert_eq!(module.globals.len(), 1);
        assert!(module.validate().is_ok());
    }

    #[test]
    fn if_lowers_to_branch_blocks() {
        let module = lower_src(
            r#"
fn pick(x: i32) -> i32 {
    if x > 0 {
        return 1;
    }
    return 0;
}
"#,
        );
        let (_, func) = module.functions.iter().next().unwrap();
        // entry, then, merge
        assert_eq!(func.blocks.len(), 3);
        assert!(matches!(
            func.blocks[func.entry].terminator,
            Terminator::BranchIf { .. }
        ));
        assert!(module.validate().is_ok());
    }

    #[test]
    fn while_desugars_through_the_loop_form() {
        let module = lower_src(
            r#"
fn spin(n: u32) {
    var i = 0u;
    while i < n {
        i = i + 1u;
    }
}
"#,
        );
        let (_, func) = module.functions.iter().next().unwrap();
        // entry, header, body, merge
        assert_eq!(func.blocks.len(), 4);
        assert!(module.validate().is_ok());
    }

    #[test]
    fn locals_get_stores_and_names() {
        let module = lower_src("fn f() { var total = 0; total = total + 1; }");
        let (handle, func) = module.functions.iter().next().unwrap();
        assert_eq!(func.locals.len(), 1);
        let local = func.locals.iter().next().unwrap().0;
        assert_eq!(
            module.names.name_of(NameKey::Local(handle, local)),
            Some("total")
        );
        let stores = func
            .blocks
            .iter()
            .flat_map(|(_, b)| &b.instructions)
            .filter(|i| matches!(i.op, Op::Store { .. }))
            .count();
        assert_eq!(stores, 2);
    }

    #[test]
    fn values_record_source_spans() {
        let module = lower_src("fn f() -> i32 { return 41 + 1; }");
        let (_, func) = module.functions.iter().next().unwrap();
        assert!(func
            .values
            .iter()
            .all(|(_, v)| v.span.is_valid()));
    }

    #[test]
    fn abstract_constants_fold_to_concrete_literals() {
        let module = lower_src("fn f() { var x: f32 = 1 + 2; }");
        let (_, func) = module.functions.iter().next().unwrap();
        let literal = func
            .blocks
            .iter()
            .flat_map(|(_, b)| &b.instructions)
            .find_map(|i| match i.op {
                Op::Literal(lit) => Some(lit),
                _ => None,
            })
            .expect("folded literal");
        assert_eq!(literal, shade_ir::Literal::F32(3.0));
    }

    #[test]
    #[should_panic(expected = "cannot lower an invalid program")]
    fn lowering_an_invalid_program_is_an_invariant_violation() {
        let file = SourceFile::new("test.wgsl", "fn f() { let x = missing; }");
        let (ast, _) = shade_parser::parse(&file);
        let program = crate::resolve(&file, ast);
        let _ = build_module(&program);
    }
}
