//! Expression typing, abstract-literal materialization, and constant
//! evaluation.

use shade_diag::Span;
use shade_ir::{
    AddressSpace, ArraySize, Builtin, Handle, Scalar, ScalarKind, SwizzleComponent, Type,
    TypeInner, VectorSize,
};
use shade_parser::ast::{self, BinaryOp, ExprId, ExpressionKind, UnaryOp};

use crate::resolver::Resolver;
use crate::{
    CallTarget, ConstValue, DeclInfo, EvalStage, LocalKind, MemberAccess, SymbolBinding,
};

impl Resolver {
    /// Infers the type of an expression, filling in its semantic info.
    pub(crate) fn infer_expr(&mut self, id: ExprId) -> Handle<Type> {
        let expr = self.ast.exprs[id].clone();
        let span = expr.span;
        match &expr.kind {
            ExpressionKind::Literal(lit) => self.infer_literal(id, *lit),
            ExpressionKind::Ident(ident) => self.infer_ident(id, ident),
            ExpressionKind::Unary { op, expr: operand } => {
                self.infer_unary(id, *op, *operand, span)
            }
            ExpressionKind::Binary { op, left, right } => {
                self.infer_expr(*left);
                self.infer_expr(*right);
                let (ty, value) = self.binary_result(*op, *left, *right, span);
                let stage = self.join_stages(&[*left, *right]);
                self.finish(id, ty, stage, value)
            }
            ExpressionKind::Call {
                callee,
                template,
                args,
            } => self.infer_call(id, callee, template.as_ref(), args, span),
            ExpressionKind::Index { base, index } => self.infer_index(id, *base, *index, span),
            ExpressionKind::Member { base, member } => self.infer_member(id, *base, member),
        }
    }

    fn finish(
        &mut self,
        id: ExprId,
        ty: Handle<Type>,
        stage: EvalStage,
        value: Option<ConstValue>,
    ) -> Handle<Type> {
        let info = &mut self.expr_info[id.index()];
        info.ty = ty;
        info.stage = stage;
        info.value = value;
        ty
    }

    fn join_stages(&self, exprs: &[ExprId]) -> EvalStage {
        if exprs
            .iter()
            .all(|e| self.expr_info[e.index()].stage == EvalStage::Constant)
        {
            EvalStage::Constant
        } else {
            EvalStage::Runtime
        }
    }

    fn scalar_ty(&mut self, scalar: Scalar) -> Handle<Type> {
        self.types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(scalar),
        })
    }

    fn vector_ty(&mut self, size: VectorSize, scalar: Scalar) -> Handle<Type> {
        self.types.insert(Type {
            name: None,
            inner: TypeInner::Vector { size, scalar },
        })
    }

    fn void_ty(&mut self) -> Handle<Type> {
        self.types.insert(Type {
            name: None,
            inner: TypeInner::Void,
        })
    }

    // ----- leaves ---------------------------------------------------------

    fn infer_literal(&mut self, id: ExprId, lit: ast::Literal) -> Handle<Type> {
        let (scalar, value) = match lit {
            ast::Literal::Bool(v) => (Scalar::BOOL, ConstValue::Bool(v)),
            ast::Literal::AbstractInt(v) => (Scalar::ABSTRACT_INT, ConstValue::Int(v)),
            ast::Literal::I32(v) => (Scalar::I32, ConstValue::Int(i64::from(v))),
            ast::Literal::U32(v) => (Scalar::U32, ConstValue::Int(i64::from(v))),
            ast::Literal::AbstractFloat(v) => (Scalar::ABSTRACT_FLOAT, ConstValue::Float(v)),
            ast::Literal::F32(v) => (Scalar::F32, ConstValue::Float(f64::from(v))),
            ast::Literal::F16(v) => (Scalar::F16, ConstValue::Float(f64::from(v))),
        };
        let ty = self.scalar_ty(scalar);
        self.finish(id, ty, EvalStage::Constant, Some(value))
    }

    fn infer_ident(&mut self, id: ExprId, ident: &ast::Ident) -> Handle<Type> {
        let Some(symbol) = self.symbols.lookup(&ident.name) else {
            self.diagnostics.add_error(
                ident.span,
                format!("unknown identifier '{}'", ident.name),
            );
            return self.finish(id, self.error_ty, EvalStage::Runtime, None);
        };
        self.expr_info[id.index()].symbol = Some(symbol);
        let (ty, stage, value) = match &self.bindings[symbol.index()] {
            SymbolBinding::GlobalVar(index) => match &self.decl_info[*index] {
                DeclInfo::Var(info) => (info.ty, EvalStage::Runtime, None),
                _ => (self.error_ty, EvalStage::Runtime, None),
            },
            SymbolBinding::GlobalConst(index) => match &self.decl_info[*index] {
                DeclInfo::Const(info) => (info.ty, EvalStage::Constant, info.value),
                _ => (self.error_ty, EvalStage::Runtime, None),
            },
            SymbolBinding::Function(_) => {
                self.diagnostics.add_error(
                    ident.span,
                    format!("cannot use function '{}' as a value", ident.name),
                );
                (self.error_ty, EvalStage::Runtime, None)
            }
            SymbolBinding::Type(_) => {
                self.diagnostics.add_error(
                    ident.span,
                    format!("cannot use type '{}' as a value", ident.name),
                );
                (self.error_ty, EvalStage::Runtime, None)
            }
            SymbolBinding::Local(local) => {
                let stage = if local.kind == LocalKind::Const {
                    EvalStage::Constant
                } else {
                    EvalStage::Runtime
                };
                (local.ty, stage, local.value)
            }
        };
        self.finish(id, ty, stage, value)
    }

    // ----- operators ------------------------------------------------------

    fn infer_unary(&mut self, id: ExprId, op: UnaryOp, operand: ExprId, span: Span) -> Handle<Type> {
        let operand_ty = self.infer_expr(operand);
        if operand_ty == self.error_ty {
            return self.finish(id, self.error_ty, EvalStage::Runtime, None);
        }
        let value = self.expr_info[operand.index()].value;
        let stage = self.join_stages(&[operand]);
        match op {
            UnaryOp::Negate => {
                let scalar = self.types[operand_ty].inner.scalar();
                match scalar {
                    Some(s) if s.kind == ScalarKind::Uint => {
                        self.diagnostics.add_error(
                            span,
                            format!("cannot negate a value of type '{}'", self.type_name(operand_ty)),
                        );
                        self.finish(id, self.error_ty, EvalStage::Runtime, None)
                    }
                    Some(s) if s.is_integer() || s.is_float() => {
                        let value = match value {
                            Some(ConstValue::Int(v)) => v.checked_neg().map(ConstValue::Int),
                            Some(ConstValue::Float(v)) => Some(ConstValue::Float(-v)),
                            _ => None,
                        };
                        self.finish(id, operand_ty, stage, value)
                    }
                    _ => {
                        self.diagnostics.add_error(
                            span,
                            format!("cannot negate a value of type '{}'", self.type_name(operand_ty)),
                        );
                        self.finish(id, self.error_ty, EvalStage::Runtime, None)
                    }
                }
            }
            UnaryOp::LogicalNot => {
                let ok = matches!(
                    self.types[operand_ty].inner,
                    TypeInner::Scalar(Scalar::BOOL)
                        | TypeInner::Vector {
                            scalar: Scalar::BOOL,
                            ..
                        }
                );
                if !ok {
                    self.diagnostics.add_error(
                        span,
                        format!("'!' requires 'bool', found '{}'", self.type_name(operand_ty)),
                    );
                    return self.finish(id, self.error_ty, EvalStage::Runtime, None);
                }
                let value = match value {
                    Some(ConstValue::Bool(v)) => Some(ConstValue::Bool(!v)),
                    _ => None,
                };
                self.finish(id, operand_ty, stage, value)
            }
            UnaryOp::BitwiseNot => {
                let scalar = self.types[operand_ty].inner.scalar();
                if !scalar.is_some_and(Scalar::is_integer) {
                    self.diagnostics.add_error(
                        span,
                        format!("'~' requires an integer, found '{}'", self.type_name(operand_ty)),
                    );
                    return self.finish(id, self.error_ty, EvalStage::Runtime, None);
                }
                let value = match value {
                    Some(ConstValue::Int(v)) => Some(ConstValue::Int(!v)),
                    _ => None,
                };
                self.finish(id, operand_ty, stage, value)
            }
            UnaryOp::AddressOf => {
                let Some(space) = self.place_space(operand) else {
                    self.diagnostics.add_error(
                        span,
                        "cannot take the address of this expression",
                    );
                    return self.finish(id, self.error_ty, EvalStage::Runtime, None);
                };
                let ty = self.types.insert(Type {
                    name: None,
                    inner: TypeInner::Pointer {
                        base: operand_ty,
                        space,
                    },
                });
                self.finish(id, ty, EvalStage::Runtime, None)
            }
            UnaryOp::Deref => match self.types[operand_ty].inner {
                TypeInner::Pointer { base, .. } => {
                    self.finish(id, base, EvalStage::Runtime, None)
                }
                _ => {
                    self.diagnostics.add_error(
                        span,
                        format!("cannot dereference a value of type '{}'", self.type_name(operand_ty)),
                    );
                    self.finish(id, self.error_ty, EvalStage::Runtime, None)
                }
            },
        }
    }

    /// The address space of the variable a place expression is rooted in.
    pub(crate) fn place_space(&self, expr: ExprId) -> Option<AddressSpace> {
        let mut current = expr;
        loop {
            match &self.ast.exprs[current].kind {
                ExpressionKind::Ident(_) => {
                    let symbol = self.expr_info[current.index()].symbol?;
                    return match &self.bindings[symbol.index()] {
                        SymbolBinding::Local(local) if local.kind == LocalKind::Var => {
                            Some(AddressSpace::Function)
                        }
                        SymbolBinding::GlobalVar(index) => match &self.decl_info[*index] {
                            DeclInfo::Var(info) => Some(info.space),
                            _ => None,
                        },
                        _ => None,
                    };
                }
                ExpressionKind::Index { base, .. } | ExpressionKind::Member { base, .. } => {
                    current = *base;
                }
                _ => return None,
            }
        }
    }

    pub(crate) fn binary_result(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    ) -> (Handle<Type>, Option<ConstValue>) {
        let lt = self.expr_info[lhs.index()].ty;
        let rt = self.expr_info[rhs.index()].ty;
        if lt == self.error_ty || rt == self.error_ty {
            return (self.error_ty, None);
        }

        use BinaryOp as B;
        match op {
            B::LogicalAnd | B::LogicalOr => {
                let bool_ty = self.scalar_ty(Scalar::BOOL);
                for &e in &[lhs, rhs] {
                    let ty = self.expr_info[e.index()].ty;
                    if !matches!(self.types[ty].inner, TypeInner::Scalar(Scalar::BOOL)) {
                        self.diagnostics.add_error(
                            self.ast.exprs[e].span,
                            format!("'{}' requires 'bool' operands, found '{}'", op_str(op), self.type_name(ty)),
                        );
                        return (self.error_ty, None);
                    }
                }
                let value = self.eval_binary(op, lhs, rhs, Scalar::BOOL, span);
                (bool_ty, value)
            }
            B::Equal | B::NotEqual | B::Less | B::LessEqual | B::Greater | B::GreaterEqual => {
                let comparable_bools = matches!(op, B::Equal | B::NotEqual);
                let Some(unified) = self.unify_operands(lhs, rhs, comparable_bools, span) else {
                    return (self.error_ty, None);
                };
                let result = match self.types[unified].inner {
                    TypeInner::Vector { size, .. } => self.vector_ty(size, Scalar::BOOL),
                    _ => self.scalar_ty(Scalar::BOOL),
                };
                let scalar = self.types[unified].inner.scalar().unwrap_or(Scalar::BOOL);
                let value = self.eval_binary(op, lhs, rhs, scalar, span);
                (result, value)
            }
            B::ShiftLeft | B::ShiftRight => {
                let l_scalar = self.types[lt].inner.scalar();
                if !l_scalar.is_some_and(Scalar::is_integer) {
                    self.diagnostics.add_error(
                        span,
                        format!("'{}' requires an integer, found '{}'", op_str(op), self.type_name(lt)),
                    );
                    return (self.error_ty, None);
                }
                let shift_ty = match self.types[lt].inner {
                    TypeInner::Vector { size, .. } => self.vector_ty(size, Scalar::U32),
                    _ => self.scalar_ty(Scalar::U32),
                };
                self.reconcile(rhs, shift_ty);
                let scalar = l_scalar.unwrap_or(Scalar::I32);
                let value = self.eval_binary(op, lhs, rhs, scalar, span);
                (lt, value)
            }
            B::BitwiseAnd | B::BitwiseOr | B::BitwiseXor => {
                let Some(unified) = self.unify_operands(lhs, rhs, false, span) else {
                    return (self.error_ty, None);
                };
                let scalar = self.types[unified].inner.scalar();
                if !scalar.is_some_and(Scalar::is_integer) {
                    self.diagnostics.add_error(
                        span,
                        format!("'{}' requires integer operands, found '{}'", op_str(op), self.type_name(unified)),
                    );
                    return (self.error_ty, None);
                }
                let value = self.eval_binary(op, lhs, rhs, scalar.unwrap_or(Scalar::I32), span);
                (unified, value)
            }
            B::Add | B::Subtract | B::Multiply | B::Divide | B::Modulo => {
                self.arithmetic_result(op, lhs, rhs, span)
            }
        }
    }

    fn arithmetic_result(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        span: Span,
    ) -> (Handle<Type>, Option<ConstValue>) {
        let lt = self.expr_info[lhs.index()].ty;
        let rt = self.expr_info[rhs.index()].ty;
        let l_inner = self.types[lt].inner.clone();
        let r_inner = self.types[rt].inner.clone();

        // Matrix algebra is only reachable through '*'.
        if op == BinaryOp::Multiply {
            if let Some(result) = self.matrix_multiply(&l_inner, &r_inner, span) {
                return (result, None);
            }
        }

        let mismatch = |r: &mut Self| {
            r.diagnostics.add_error(
                span,
                format!(
                    "type mismatch: '{}' {} '{}'",
                    r.type_name(lt),
                    op_str(op),
                    r.type_name(rt)
                ),
            );
            (r.error_ty, None)
        };

        match (&l_inner, &r_inner) {
            (TypeInner::Scalar(_), TypeInner::Scalar(_))
            | (TypeInner::Vector { .. }, TypeInner::Vector { .. }) => {
                let Some(unified) = self.unify_operands(lhs, rhs, false, span) else {
                    return (self.error_ty, None);
                };
                let Some(scalar) = self.types[unified].inner.scalar() else {
                    return mismatch(self);
                };
                if !scalar.is_integer() && !scalar.is_float() {
                    return mismatch(self);
                }
                let value = self.eval_binary(op, lhs, rhs, scalar, span);
                (unified, value)
            }
            // vector-scalar arithmetic splats the scalar operand.
            (TypeInner::Vector { size, scalar }, TypeInner::Scalar(s)) => {
                let (size, scalar, s) = (*size, *scalar, *s);
                let Some(common) = common_scalar(scalar, s) else {
                    return mismatch(self);
                };
                let scalar_side = self.scalar_ty(common);
                self.reconcile(rhs, scalar_side);
                let vec = self.vector_ty(size, common);
                self.reconcile(lhs, vec);
                (vec, None)
            }
            (TypeInner::Scalar(s), TypeInner::Vector { size, scalar }) => {
                let (size, scalar, s) = (*size, *scalar, *s);
                let Some(common) = common_scalar(scalar, s) else {
                    return mismatch(self);
                };
                let scalar_side = self.scalar_ty(common);
                self.reconcile(lhs, scalar_side);
                let vec = self.vector_ty(size, common);
                self.reconcile(rhs, vec);
                (vec, None)
            }
            _ => mismatch(self),
        }
    }

    fn matrix_multiply(
        &mut self,
        l: &TypeInner,
        r: &TypeInner,
        span: Span,
    ) -> Option<Handle<Type>> {
        let ty = match (l, r) {
            (TypeInner::Matrix { .. }, TypeInner::Scalar(s)) if s.is_float() => {
                Type { name: None, inner: l.clone() }
            }
            (TypeInner::Scalar(s), TypeInner::Matrix { .. }) if s.is_float() => {
                Type { name: None, inner: r.clone() }
            }
            (
                TypeInner::Matrix { columns, rows, scalar },
                TypeInner::Vector { size, .. },
            ) => {
                if size != columns {
                    self.diagnostics
                        .add_error(span, "matrix-vector dimension mismatch");
                    return Some(self.error_ty);
                }
                Type {
                    name: None,
                    inner: TypeInner::Vector {
                        size: *rows,
                        scalar: *scalar,
                    },
                }
            }
            (
                TypeInner::Vector { size, .. },
                TypeInner::Matrix { columns, rows, scalar },
            ) => {
                if size != rows {
                    self.diagnostics
                        .add_error(span, "vector-matrix dimension mismatch");
                    return Some(self.error_ty);
                }
                Type {
                    name: None,
                    inner: TypeInner::Vector {
                        size: *columns,
                        scalar: *scalar,
                    },
                }
            }
            (
                TypeInner::Matrix { columns: c1, rows: r1, scalar },
                TypeInner::Matrix { columns: c2, rows: r2, .. },
            ) => {
                if c1 != r2 {
                    self.diagnostics
                        .add_error(span, "matrix-matrix dimension mismatch");
                    return Some(self.error_ty);
                }
                Type {
                    name: None,
                    inner: TypeInner::Matrix {
                        columns: *c2,
                        rows: *r1,
                        scalar: *scalar,
                    },
                }
            }
            _ => return None,
        };
        Some(self.types.insert(ty))
    }

    /// Unifies two operand types, materializing whichever side is
    /// abstract. Returns the common type, or `None` after diagnosing.
    fn unify_operands(
        &mut self,
        lhs: ExprId,
        rhs: ExprId,
        allow_bool: bool,
        span: Span,
    ) -> Option<Handle<Type>> {
        let lt = self.expr_info[lhs.index()].ty;
        let rt = self.expr_info[rhs.index()].ty;
        if lt == rt {
            let scalar = self.types[lt].inner.scalar();
            if let Some(s) = scalar {
                if s == Scalar::BOOL && !allow_bool {
                    self.diagnostics.add_error(
                        span,
                        "operation not defined for 'bool'".to_string(),
                    );
                    return None;
                }
            }
            return Some(lt);
        }
        let (ls, rs, rebuild): (Scalar, Scalar, Option<VectorSize>) =
            match (&self.types[lt].inner, &self.types[rt].inner) {
                (TypeInner::Scalar(a), TypeInner::Scalar(b)) => (*a, *b, None),
                (
                    TypeInner::Vector { size: s1, scalar: a },
                    TypeInner::Vector { size: s2, scalar: b },
                ) if s1 == s2 => (*a, *b, Some(*s1)),
                _ => {
                    self.diagnostics.add_error(
                        span,
                        format!(
                            "type mismatch: expected '{}', found '{}'",
                            self.type_name(lt),
                            self.type_name(rt)
                        ),
                    );
                    return None;
                }
            };
        let Some(common) = common_scalar(ls, rs) else {
            self.diagnostics.add_error(
                span,
                format!(
                    "type mismatch: expected '{}', found '{}'",
                    self.type_name(lt),
                    self.type_name(rt)
                ),
            );
            return None;
        };
        let unified = match rebuild {
            Some(size) => self.vector_ty(size, common),
            None => self.scalar_ty(common),
        };
        self.reconcile(lhs, unified);
        self.reconcile(rhs, unified);
        Some(unified)
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        scalar: Scalar,
        span: Span,
    ) -> Option<ConstValue> {
        let a = self.expr_info[lhs.index()].value?;
        let b = self.expr_info[rhs.index()].value?;
        use BinaryOp as B;
        if scalar.is_float() {
            let (x, y) = (as_f64(a)?, as_f64(b)?);
            return Some(match op {
                B::Add => ConstValue::Float(x + y),
                B::Subtract => ConstValue::Float(x - y),
                B::Multiply => ConstValue::Float(x * y),
                B::Divide => ConstValue::Float(x / y),
                B::Modulo => ConstValue::Float(x % y),
                B::Equal => ConstValue::Bool(x == y),
                B::NotEqual => ConstValue::Bool(x != y),
                B::Less => ConstValue::Bool(x < y),
                B::LessEqual => ConstValue::Bool(x <= y),
                B::Greater => ConstValue::Bool(x > y),
                B::GreaterEqual => ConstValue::Bool(x >= y),
                _ => return None,
            });
        }
        if scalar == Scalar::BOOL {
            let (x, y) = (a.as_bool()?, b.as_bool()?);
            return Some(match op {
                B::LogicalAnd => ConstValue::Bool(x && y),
                B::LogicalOr => ConstValue::Bool(x || y),
                B::Equal => ConstValue::Bool(x == y),
                B::NotEqual => ConstValue::Bool(x != y),
                _ => return None,
            });
        }
        let (x, y) = (a.as_int()?, b.as_int()?);
        Some(match op {
            B::Add => ConstValue::Int(x.checked_add(y)?),
            B::Subtract => ConstValue::Int(x.checked_sub(y)?),
            B::Multiply => ConstValue::Int(x.checked_mul(y)?),
            B::Divide | B::Modulo if y == 0 => {
                self.diagnostics.add_error(span, "division by zero");
                return None;
            }
            B::Divide => ConstValue::Int(x / y),
            B::Modulo => ConstValue::Int(x % y),
            B::Equal => ConstValue::Bool(x == y),
            B::NotEqual => ConstValue::Bool(x != y),
            B::Less => ConstValue::Bool(x < y),
            B::LessEqual => ConstValue::Bool(x <= y),
            B::Greater => ConstValue::Bool(x > y),
            B::GreaterEqual => ConstValue::Bool(x >= y),
            B::BitwiseAnd => ConstValue::Int(x & y),
            B::BitwiseOr => ConstValue::Int(x | y),
            B::BitwiseXor => ConstValue::Int(x ^ y),
            B::ShiftLeft => ConstValue::Int(x.checked_shl(u32::try_from(y).ok()?)?),
            B::ShiftRight => ConstValue::Int(x.checked_shr(u32::try_from(y).ok()?)?),
            _ => return None,
        })
    }

    // ----- materialization ------------------------------------------------

    /// Converts an expression to `want`, materializing abstract numerics.
    /// Mismatched concrete types are a hard error. Returns `want` so
    /// callers can thread the result type.
    pub(crate) fn reconcile(&mut self, expr: ExprId, want: Handle<Type>) -> Handle<Type> {
        let have = self.expr_info[expr.index()].ty;
        if have == want || have == self.error_ty || want == self.error_ty {
            return want;
        }
        let ok = match (&self.types[have].inner, &self.types[want].inner) {
            (TypeInner::Scalar(a), TypeInner::Scalar(b)) => convertible(*a, *b),
            (
                TypeInner::Vector { size: s1, scalar: a },
                TypeInner::Vector { size: s2, scalar: b },
            ) => s1 == s2 && convertible(*a, *b),
            (
                TypeInner::Matrix { columns: c1, rows: r1, scalar: a },
                TypeInner::Matrix { columns: c2, rows: r2, scalar: b },
            ) => c1 == c2 && r1 == r2 && convertible(*a, *b),
            (
                TypeInner::Array { base: b1, size: s1, .. },
                TypeInner::Array { base: b2, size: s2, .. },
            ) => s1 == s2 && self.array_base_convertible(*b1, *b2),
            _ => false,
        };
        if ok {
            self.expr_info[expr.index()].ty = want;
        } else {
            self.diagnostics.add_error(
                self.ast.exprs[expr].span,
                format!(
                    "type mismatch: expected '{}', found '{}'",
                    self.type_name(want),
                    self.type_name(have)
                ),
            );
        }
        want
    }

    fn array_base_convertible(&self, have: Handle<Type>, want: Handle<Type>) -> bool {
        if have == want {
            return true;
        }
        match (&self.types[have].inner, &self.types[want].inner) {
            (TypeInner::Scalar(a), TypeInner::Scalar(b)) => convertible(*a, *b),
            (
                TypeInner::Vector { size: s1, scalar: a },
                TypeInner::Vector { size: s2, scalar: b },
            ) => s1 == s2 && convertible(*a, *b),
            _ => false,
        }
    }

    /// Concretizes a still-abstract expression type to its default
    /// (`i32` / `f32`).
    pub(crate) fn concretize_expr(&mut self, expr: ExprId, ty: Handle<Type>) -> Handle<Type> {
        let concrete = self.concretize_type(ty);
        if concrete != ty {
            self.reconcile(expr, concrete)
        } else {
            ty
        }
    }

    pub(crate) fn concretize_type(&mut self, ty: Handle<Type>) -> Handle<Type> {
        let inner = match &self.types[ty].inner {
            TypeInner::Scalar(s) if s.is_abstract() => TypeInner::Scalar(concrete_default(*s)),
            TypeInner::Vector { size, scalar } if scalar.is_abstract() => TypeInner::Vector {
                size: *size,
                scalar: concrete_default(*scalar),
            },
            TypeInner::Matrix { columns, rows, scalar } if scalar.is_abstract() => {
                TypeInner::Matrix {
                    columns: *columns,
                    rows: *rows,
                    scalar: concrete_default(*scalar),
                }
            }
            TypeInner::Array { base, size, .. } => {
                let concrete_base = self.concretize_type(*base);
                if concrete_base == *base {
                    return ty;
                }
                let stride = crate::resolver::round_up(
                    self.size_of(concrete_base),
                    self.align_of(concrete_base).max(1),
                );
                TypeInner::Array {
                    base: concrete_base,
                    size: *size,
                    stride,
                }
            }
            _ => return ty,
        };
        self.types.insert(Type { name: None, inner })
    }

    // ----- calls ----------------------------------------------------------

    fn infer_call(
        &mut self,
        id: ExprId,
        callee: &ast::Ident,
        template: Option<&ast::TypeExpr>,
        args: &[ExprId],
        span: Span,
    ) -> Handle<Type> {
        for &arg in args {
            self.infer_expr(arg);
        }

        // User declarations shadow nothing here: WGSL keeps builtin
        // functions and type generators out of the module namespace.
        if template.is_none() {
            if let Some(symbol) = self.symbols.lookup(&callee.name) {
                match self.bindings[symbol.index()].clone() {
                    SymbolBinding::Function(index) => {
                        return self.user_call(id, callee, index, args, span);
                    }
                    SymbolBinding::Type(ty) => {
                        return self.construct_call(id, ty, args, span);
                    }
                    _ => {
                        self.diagnostics.add_error(
                            callee.span,
                            format!("'{}' is not callable", callee.name),
                        );
                        return self.finish(id, self.error_ty, EvalStage::Runtime, None);
                    }
                }
            }
        }

        if let Some(template) = template {
            let ty = self.resolve_type_expr(template);
            return self.construct_call(id, ty, args, span);
        }
        if let Some(ty) = self.inferred_constructor(callee, args, span) {
            return self.construct_call(id, ty, args, span);
        }
        if let Some(fun) = Builtin::from_str(&callee.name) {
            self.expr_info[id.index()].call_target = Some(CallTarget::Builtin(fun));
            let ty = self.builtin_call(fun, args, span);
            let stage = EvalStage::Runtime;
            let info = &mut self.expr_info[id.index()];
            info.ty = ty;
            info.stage = stage;
            return ty;
        }
        self.diagnostics.add_error(
            callee.span,
            format!("unknown function '{}'", callee.name),
        );
        self.finish(id, self.error_ty, EvalStage::Runtime, None)
    }

    fn user_call(
        &mut self,
        id: ExprId,
        callee: &ast::Ident,
        index: usize,
        args: &[ExprId],
        span: Span,
    ) -> Handle<Type> {
        if self
            .current
            .as_ref()
            .is_some_and(|current| current.decl_index == index)
        {
            self.diagnostics.add_error(
                callee.span,
                format!("recursion is not allowed: '{}' calls itself", callee.name),
            );
        }
        let DeclInfo::Function(info) = self.decl_info[index].clone() else {
            return self.finish(id, self.error_ty, EvalStage::Runtime, None);
        };
        if info.stage.is_some() {
            self.diagnostics.add_error(
                callee.span,
                format!("entry point '{}' cannot be called", callee.name),
            );
        }
        if args.len() != info.param_types.len() {
            self.diagnostics.add_error(
                span,
                format!(
                    "wrong number of arguments to '{}': expected {}, found {}",
                    callee.name,
                    info.param_types.len(),
                    args.len()
                ),
            );
        } else {
            for (&arg, &want) in args.iter().zip(&info.param_types) {
                self.reconcile(arg, want);
            }
        }
        self.expr_info[id.index()].call_target = Some(CallTarget::Function(index));
        let ty = match info.return_ty {
            Some(ty) => ty,
            None => self.void_ty(),
        };
        self.finish(id, ty, EvalStage::Runtime, None)
    }

    /// Resolves a template-less constructor name (`vec3(…)`, `f32(…)`,
    /// `array(…)`) by inferring the target type from the arguments.
    fn inferred_constructor(
        &mut self,
        callee: &ast::Ident,
        args: &[ExprId],
        span: Span,
    ) -> Option<Handle<Type>> {
        let name = callee.name.as_str();
        let scalar = match name {
            "bool" => Some(Scalar::BOOL),
            "i32" => Some(Scalar::I32),
            "u32" => Some(Scalar::U32),
            "f32" => Some(Scalar::F32),
            "f16" => Some(Scalar::F16),
            _ => None,
        };
        if let Some(scalar) = scalar {
            return Some(self.scalar_ty(scalar));
        }
        let vec_size = match name {
            "vec2" => Some(VectorSize::Bi),
            "vec3" => Some(VectorSize::Tri),
            "vec4" => Some(VectorSize::Quad),
            _ => None,
        };
        if let Some(size) = vec_size {
            let scalar = self.common_arg_scalar(args).unwrap_or(Scalar::F32);
            return Some(self.vector_ty(size, scalar));
        }
        if name == "array" {
            let base_scalar = self.common_arg_scalar(args);
            let base = match (base_scalar, args.first()) {
                (Some(scalar), _) => self.scalar_ty(scalar),
                (None, Some(&first)) => self.expr_info[first.index()].ty,
                (None, None) => {
                    self.diagnostics
                        .add_error(span, "cannot infer the type of an empty 'array(…)'");
                    return Some(self.error_ty);
                }
            };
            let stride = crate::resolver::round_up(
                self.size_of(base),
                self.align_of(base).max(1),
            );
            let len = u32::try_from(args.len()).unwrap_or(1);
            return Some(self.types.insert(Type {
                name: None,
                inner: TypeInner::Array {
                    base,
                    size: ArraySize::Constant(len.max(1)),
                    stride,
                },
            }));
        }
        None
    }

    /// The common scalar of scalar-typed arguments, if they unify.
    fn common_arg_scalar(&mut self, args: &[ExprId]) -> Option<Scalar> {
        let mut common: Option<Scalar> = None;
        for &arg in args {
            let ty = self.expr_info[arg.index()].ty;
            let scalar = match self.types[ty].inner {
                TypeInner::Scalar(s) => s,
                TypeInner::Vector { scalar, .. } => scalar,
                _ => return None,
            };
            common = Some(match common {
                None => scalar,
                Some(current) => common_scalar(current, scalar)?,
            });
        }
        common.map(|s| if s.is_abstract() { concrete_default(s) } else { s })
    }

    fn construct_call(
        &mut self,
        id: ExprId,
        target: Handle<Type>,
        args: &[ExprId],
        span: Span,
    ) -> Handle<Type> {
        self.expr_info[id.index()].call_target = Some(CallTarget::Construct(target));
        let stage = self.join_stages(args);
        if target == self.error_ty {
            return self.finish(id, self.error_ty, EvalStage::Runtime, None);
        }

        let mut value = None;
        match self.types[target].inner.clone() {
            TypeInner::Scalar(scalar) => match args {
                [] => {
                    value = Some(zero_value(scalar));
                }
                [arg] => {
                    let arg_ty = self.expr_info[arg.index()].ty;
                    let arg_scalar = self.types[arg_ty].inner.scalar();
                    if arg_ty != self.error_ty && arg_scalar.is_none() {
                        self.diagnostics.add_error(
                            span,
                            format!(
                                "cannot convert '{}' to '{}'",
                                self.type_name(arg_ty),
                                scalar.wgsl_name()
                            ),
                        );
                    }
                    value = self.expr_info[arg.index()]
                        .value
                        .and_then(|v| convert_value(v, scalar));
                }
                _ => {
                    self.diagnostics.add_error(
                        span,
                        format!(
                            "'{}' constructor takes at most one argument",
                            scalar.wgsl_name()
                        ),
                    );
                }
            },
            TypeInner::Vector { size, scalar } => {
                let want_scalar = self.scalar_ty(scalar);
                let mut components = 0u32;
                for &arg in args {
                    let arg_ty = self.expr_info[arg.index()].ty;
                    match self.types[arg_ty].inner {
                        TypeInner::Vector { size: arg_size, .. } => {
                            let want = self.vector_ty(arg_size, scalar);
                            self.reconcile(arg, want);
                            components += arg_size as u32;
                        }
                        _ => {
                            self.reconcile(arg, want_scalar);
                            components += 1;
                        }
                    }
                }
                // Zero args zero-initializes; one scalar splats.
                let valid = components == 0
                    || components == size as u32
                    || (args.len() == 1 && components == 1);
                if !valid {
                    self.diagnostics.add_error(
                        span,
                        format!(
                            "vec{} constructor requires {} components, found {components}",
                            size as u32, size as u32
                        ),
                    );
                }
            }
            TypeInner::Matrix { columns, rows, scalar } => {
                let column = self.vector_ty(rows, scalar);
                if !args.is_empty() {
                    if args.len() != columns as usize {
                        self.diagnostics.add_error(
                            span,
                            format!(
                                "matrix constructor requires {} column vectors, found {}",
                                columns as u32,
                                args.len()
                            ),
                        );
                    }
                    for &arg in args {
                        self.reconcile(arg, column);
                    }
                }
            }
            TypeInner::Array { base, size, .. } => {
                if let ArraySize::Constant(n) = size {
                    if !args.is_empty() && args.len() != n as usize {
                        self.diagnostics.add_error(
                            span,
                            format!(
                                "array constructor requires {n} elements, found {}",
                                args.len()
                            ),
                        );
                    }
                } else if !args.is_empty() {
                    self.diagnostics.add_error(
                        span,
                        "runtime-sized arrays cannot be constructed",
                    );
                }
                for &arg in args {
                    self.reconcile(arg, base);
                }
            }
            TypeInner::Struct { members, .. } => {
                if !args.is_empty() {
                    if args.len() != members.len() {
                        self.diagnostics.add_error(
                            span,
                            format!(
                                "'{}' constructor requires {} members, found {}",
                                self.type_name(target),
                                members.len(),
                                args.len()
                            ),
                        );
                    }
                    for (&arg, member) in args.iter().zip(&members) {
                        self.reconcile(arg, member.ty);
                    }
                }
            }
            _ => {
                self.diagnostics.add_error(
                    span,
                    format!("type '{}' cannot be constructed", self.type_name(target)),
                );
                return self.finish(id, self.error_ty, EvalStage::Runtime, None);
            }
        }
        self.finish(id, target, stage, value)
    }

    // ----- builtin calls --------------------------------------------------

    fn builtin_call(&mut self, fun: Builtin, args: &[ExprId], span: Span) -> Handle<Type> {
        use Builtin as B;
        match fun {
            // One float argument, same type out.
            B::Sin | B::Cos | B::Tan | B::Asin | B::Acos | B::Atan | B::Sinh | B::Cosh
            | B::Tanh | B::Sqrt | B::InverseSqrt | B::Log | B::Log2 | B::Exp | B::Exp2
            | B::Floor | B::Ceil | B::Round | B::Fract | B::Trunc | B::Saturate
            | B::Normalize | B::Dpdx | B::Dpdy | B::Fwidth => {
                if !self.expect_args(fun, args, 1, span) {
                    return self.error_ty;
                }
                self.require_float_arg(fun, args[0])
            }
            // One numeric argument, same type out.
            B::Abs | B::Sign => {
                if !self.expect_args(fun, args, 1, span) {
                    return self.error_ty;
                }
                self.require_numeric_arg(fun, args[0])
            }
            // Two arguments unified.
            B::Min | B::Max => {
                if !self.expect_args(fun, args, 2, span) {
                    return self.error_ty;
                }
                self.unify_numeric_args(fun, args, span)
            }
            B::Atan2 | B::Pow | B::Step => {
                if !self.expect_args(fun, args, 2, span) {
                    return self.error_ty;
                }
                self.unify_float_args(fun, args, span)
            }
            B::Distance => {
                if !self.expect_args(fun, args, 2, span) {
                    return self.error_ty;
                }
                let ty = self.unify_float_args(fun, args, span);
                self.scalar_of_ty(ty)
            }
            // Three arguments unified.
            B::Clamp => {
                if !self.expect_args(fun, args, 3, span) {
                    return self.error_ty;
                }
                self.unify_numeric_args(fun, args, span)
            }
            B::Mix | B::SmoothStep | B::Fma => {
                if !self.expect_args(fun, args, 3, span) {
                    return self.error_ty;
                }
                self.unify_float_args(fun, args, span)
            }
            B::Dot => {
                if !self.expect_args(fun, args, 2, span) {
                    return self.error_ty;
                }
                let ty = self.unify_float_args(fun, args, span);
                match self.types[ty].inner {
                    TypeInner::Vector { scalar, .. } => self.scalar_ty(scalar),
                    _ => {
                        self.wrong_arg(fun, ty, span);
                        self.error_ty
                    }
                }
            }
            B::Cross => {
                if !self.expect_args(fun, args, 2, span) {
                    return self.error_ty;
                }
                let ty = self.unify_float_args(fun, args, span);
                match self.types[ty].inner {
                    TypeInner::Vector {
                        size: VectorSize::Tri,
                        ..
                    } => ty,
                    _ => {
                        self.wrong_arg(fun, ty, span);
                        self.error_ty
                    }
                }
            }
            B::Length => {
                if !self.expect_args(fun, args, 1, span) {
                    return self.error_ty;
                }
                let ty = self.require_float_arg(fun, args[0]);
                self.scalar_of_ty(ty)
            }
            B::Select => {
                if !self.expect_args(fun, args, 3, span) {
                    return self.error_ty;
                }
                let ty = self.unify_pair(args[0], args[1], span);
                self.require_bool(args[2], "select condition");
                ty
            }
            B::ArrayLength => {
                if !self.expect_args(fun, args, 1, span) {
                    return self.error_ty;
                }
                let arg_ty = self.expr_info[args[0].index()].ty;
                let ok = matches!(
                    self.types[arg_ty].inner,
                    TypeInner::Pointer { base, .. }
                        if matches!(
                            self.types[base].inner,
                            TypeInner::Array { size: ArraySize::Dynamic, .. }
                        )
                );
                if !ok && arg_ty != self.error_ty {
                    self.diagnostics.add_error(
                        span,
                        "arrayLength requires a pointer to a runtime-sized array",
                    );
                }
                self.scalar_ty(Scalar::U32)
            }
            B::WorkgroupBarrier | B::StorageBarrier => {
                self.expect_args(fun, args, 0, span);
                self.void_ty()
            }
            B::AtomicLoad
            | B::AtomicStore
            | B::AtomicAdd
            | B::AtomicSub
            | B::AtomicAnd
            | B::AtomicOr
            | B::AtomicXor
            | B::AtomicMin
            | B::AtomicMax
            | B::AtomicExchange => self.atomic_call(fun, args, span),
            B::TextureSample => {
                if !self.expect_args(fun, args, 3, span) {
                    return self.error_ty;
                }
                let tex_ty = self.expr_info[args[0].index()].ty;
                let tex_ok = matches!(
                    self.types[tex_ty].inner,
                    TypeInner::SampledTexture2d { scalar: Scalar::F32 } | TypeInner::TextureExternal
                );
                if !tex_ok && tex_ty != self.error_ty {
                    self.wrong_arg(fun, tex_ty, span);
                }
                let sampler_ty = self.expr_info[args[1].index()].ty;
                if !matches!(self.types[sampler_ty].inner, TypeInner::Sampler)
                    && sampler_ty != self.error_ty
                {
                    self.wrong_arg(fun, sampler_ty, span);
                }
                let coords = self.vector_ty(VectorSize::Bi, Scalar::F32);
                self.reconcile(args[2], coords);
                self.vector_ty(VectorSize::Quad, Scalar::F32)
            }
            B::TextureLoad => {
                if args.is_empty() {
                    self.expect_args(fun, args, 2, span);
                    return self.error_ty;
                }
                let tex_ty = self.expr_info[args[0].index()].ty;
                let (scalar, wants_level) = match self.types[tex_ty].inner {
                    TypeInner::SampledTexture2d { scalar } => (scalar, true),
                    TypeInner::TextureExternal => (Scalar::F32, false),
                    _ => {
                        if tex_ty != self.error_ty {
                            self.wrong_arg(fun, tex_ty, span);
                        }
                        return self.error_ty;
                    }
                };
                let expected = if wants_level { 3 } else { 2 };
                if !self.expect_args(fun, args, expected, span) {
                    return self.error_ty;
                }
                let coords = self.vector_ty(VectorSize::Bi, Scalar::U32);
                self.reconcile_integerish(args[1], coords);
                if wants_level {
                    let u32_ty = self.scalar_ty(Scalar::U32);
                    self.reconcile_integerish(args[2], u32_ty);
                }
                self.vector_ty(VectorSize::Quad, scalar)
            }
            B::TextureDimensions => {
                if !self.expect_args(fun, args, 1, span) {
                    return self.error_ty;
                }
                let tex_ty = self.expr_info[args[0].index()].ty;
                let ok = matches!(
                    self.types[tex_ty].inner,
                    TypeInner::SampledTexture2d { .. } | TypeInner::TextureExternal
                );
                if !ok && tex_ty != self.error_ty {
                    self.wrong_arg(fun, tex_ty, span);
                }
                self.vector_ty(VectorSize::Bi, Scalar::U32)
            }
        }
    }

    fn atomic_call(&mut self, fun: Builtin, args: &[ExprId], span: Span) -> Handle<Type> {
        let expected = if fun == Builtin::AtomicLoad { 1 } else { 2 };
        if !self.expect_args(fun, args, expected, span) {
            return self.error_ty;
        }
        let ptr_ty = self.expr_info[args[0].index()].ty;
        let scalar = match self.types[ptr_ty].inner {
            TypeInner::Pointer { base, .. } => match self.types[base].inner {
                TypeInner::Atomic(scalar) => Some(scalar),
                _ => None,
            },
            _ => None,
        };
        let Some(scalar) = scalar else {
            if ptr_ty != self.error_ty {
                self.diagnostics.add_error(
                    span,
                    format!(
                        "'{}' requires a pointer to an atomic, found '{}'",
                        fun.wgsl_name(),
                        self.type_name(ptr_ty)
                    ),
                );
            }
            return self.error_ty;
        };
        let value_ty = self.scalar_ty(scalar);
        if expected == 2 {
            self.reconcile(args[1], value_ty);
        }
        if fun == Builtin::AtomicStore {
            self.void_ty()
        } else {
            value_ty
        }
    }

    fn expect_args(&mut self, fun: Builtin, args: &[ExprId], n: usize, span: Span) -> bool {
        if args.len() == n {
            return true;
        }
        self.diagnostics.add_error(
            span,
            format!(
                "wrong number of arguments to '{}': expected {n}, found {}",
                fun.wgsl_name(),
                args.len()
            ),
        );
        false
    }

    fn wrong_arg(&mut self, fun: Builtin, ty: Handle<Type>, span: Span) {
        if ty != self.error_ty {
            self.diagnostics.add_error(
                span,
                format!(
                    "no matching overload of '{}' for '{}'",
                    fun.wgsl_name(),
                    self.type_name(ty)
                ),
            );
        }
    }

    /// Materializes an argument to a float type, defaulting abstracts to
    /// `f32`.
    fn require_float_arg(&mut self, fun: Builtin, arg: ExprId) -> Handle<Type> {
        let ty = self.expr_info[arg.index()].ty;
        let span = self.ast.exprs[arg].span;
        let materialized = match &self.types[ty].inner {
            TypeInner::Scalar(s) if s.is_abstract() => {
                let want = self.scalar_ty(Scalar::F32);
                self.reconcile(arg, want)
            }
            TypeInner::Vector { size, scalar } if scalar.is_abstract() => {
                let want = self.vector_ty(*size, Scalar::F32);
                self.reconcile(arg, want)
            }
            _ => ty,
        };
        self.require_float_ty(fun, materialized, span)
    }

    fn require_float_ty(&mut self, fun: Builtin, ty: Handle<Type>, span: Span) -> Handle<Type> {
        if ty == self.error_ty {
            return ty;
        }
        let ok = self.types[ty]
            .inner
            .scalar()
            .is_some_and(|s| s.is_float() && !s.is_abstract());
        if ok {
            ty
        } else if self.types[ty].inner.scalar().is_some_and(Scalar::is_abstract) {
            // AbstractInt arguments materialize to f32.
            match self.types[ty].inner {
                TypeInner::Vector { size, .. } => self.vector_ty(size, Scalar::F32),
                _ => self.scalar_ty(Scalar::F32),
            }
        } else {
            self.wrong_arg(fun, ty, span);
            self.error_ty
        }
    }

    fn require_numeric_arg(&mut self, fun: Builtin, arg: ExprId) -> Handle<Type> {
        let ty = self.expr_info[arg.index()].ty;
        let span = self.ast.exprs[arg].span;
        if ty == self.error_ty {
            return ty;
        }
        let scalar = self.types[ty].inner.scalar();
        match scalar {
            Some(s) if s.is_integer() || s.is_float() => self.concretize_expr(arg, ty),
            _ => {
                self.wrong_arg(fun, ty, span);
                self.error_ty
            }
        }
    }

    fn unify_numeric_args(&mut self, fun: Builtin, args: &[ExprId], span: Span) -> Handle<Type> {
        let Some(ty) = self.unify_arg_types(args, span) else {
            return self.error_ty;
        };
        // Re-materialize every argument to the final unified type.
        let ty = self.concretize_type(ty);
        for &arg in args {
            self.reconcile(arg, ty);
        }
        let scalar = self.types[ty].inner.scalar();
        if !scalar.is_some_and(|s| s.is_integer() || s.is_float()) {
            self.wrong_arg(fun, ty, span);
            return self.error_ty;
        }
        ty
    }

    /// Like [`unify_numeric_args`](Self::unify_numeric_args), but abstract
    /// arguments (integers included) materialize to `f32`, and the result
    /// must be floating point.
    fn unify_float_args(&mut self, fun: Builtin, args: &[ExprId], span: Span) -> Handle<Type> {
        let Some(ty) = self.unify_arg_types(args, span) else {
            return self.error_ty;
        };
        let scalar = self.types[ty].inner.scalar();
        let ty = match scalar {
            Some(s) if s.is_abstract() => match self.types[ty].inner {
                TypeInner::Vector { size, .. } => self.vector_ty(size, Scalar::F32),
                _ => self.scalar_ty(Scalar::F32),
            },
            Some(s) if s.is_float() => ty,
            _ => {
                self.wrong_arg(fun, ty, span);
                return self.error_ty;
            }
        };
        for &arg in args {
            self.reconcile(arg, ty);
        }
        ty
    }

    fn unify_arg_types(&mut self, args: &[ExprId], span: Span) -> Option<Handle<Type>> {
        let mut ty = self.expr_info[args[0].index()].ty;
        for &arg in &args[1..] {
            ty = self.unify_pair_inner(ty, arg, span)?;
        }
        Some(ty)
    }

    /// The scalar component type of a scalar or vector result.
    fn scalar_of_ty(&mut self, ty: Handle<Type>) -> Handle<Type> {
        match self.types[ty].inner.scalar() {
            Some(scalar) => self.scalar_ty(scalar),
            None => ty,
        }
    }

    fn unify_pair(&mut self, a: ExprId, b: ExprId, span: Span) -> Handle<Type> {
        let at = self.expr_info[a.index()].ty;
        match self.unify_pair_inner(at, b, span) {
            Some(ty) => {
                let ty = self.concretize_type(ty);
                self.reconcile(a, ty);
                self.reconcile(b, ty);
                ty
            }
            None => self.error_ty,
        }
    }

    fn unify_pair_inner(
        &mut self,
        at: Handle<Type>,
        b: ExprId,
        span: Span,
    ) -> Option<Handle<Type>> {
        let bt = self.expr_info[b.index()].ty;
        if at == self.error_ty || bt == self.error_ty {
            return None;
        }
        if at == bt {
            return Some(at);
        }
        match (&self.types[at].inner, &self.types[bt].inner) {
            (TypeInner::Scalar(x), TypeInner::Scalar(y)) => {
                let common = common_scalar(*x, *y)?;
                Some(self.scalar_ty(common))
            }
            (
                TypeInner::Vector { size: s1, scalar: x },
                TypeInner::Vector { size: s2, scalar: y },
            ) if s1 == s2 => {
                let size = *s1;
                let common = common_scalar(*x, *y)?;
                Some(self.vector_ty(size, common))
            }
            // vector-scalar: the scalar operand splats.
            (TypeInner::Vector { size, scalar: x }, TypeInner::Scalar(y)) => {
                let size = *size;
                let common = common_scalar(*x, *y)?;
                Some(self.vector_ty(size, common))
            }
            (TypeInner::Scalar(x), TypeInner::Vector { size, scalar: y }) => {
                let size = *size;
                let common = common_scalar(*x, *y)?;
                Some(self.vector_ty(size, common))
            }
            _ => {
                self.diagnostics.add_error(
                    span,
                    format!(
                        "type mismatch: expected '{}', found '{}'",
                        self.type_name(at),
                        self.type_name(bt)
                    ),
                );
                None
            }
        }
    }

    /// Reconciles an index-like argument that may be `i32` or `u32`.
    fn reconcile_integerish(&mut self, arg: ExprId, want: Handle<Type>) {
        let ty = self.expr_info[arg.index()].ty;
        let have_scalar = self.types[ty].inner.scalar();
        // A concrete signed index is accepted as-is.
        if have_scalar.is_some_and(|s| !s.is_abstract() && s.is_integer()) {
            return;
        }
        self.reconcile(arg, want);
    }

    // ----- composite access -----------------------------------------------

    fn infer_index(&mut self, id: ExprId, base: ExprId, index: ExprId, span: Span) -> Handle<Type> {
        let base_ty = self.infer_expr(base);
        let raw_index = self.infer_expr(index);
        let i32_ty = self.scalar_ty(Scalar::I32);
        self.reconcile_integerish(index, i32_ty);
        let index_ty = self.expr_info[index.index()].ty;
        let index_scalar = self.types[index_ty].inner.scalar();
        if index_ty != self.error_ty && !index_scalar.is_some_and(Scalar::is_integer) {
            self.diagnostics.add_error(
                self.ast.exprs[index].span,
                format!("index must be an integer, found '{}'", self.type_name(raw_index)),
            );
        }

        let ty = match self.types[base_ty].inner {
            TypeInner::Array { base, .. } => base,
            TypeInner::Vector { scalar, .. } => self.scalar_ty(scalar),
            TypeInner::Matrix { rows, scalar, .. } => self.vector_ty(rows, scalar),
            _ => {
                if base_ty != self.error_ty {
                    self.diagnostics.add_error(
                        span,
                        format!("type '{}' cannot be indexed", self.type_name(base_ty)),
                    );
                }
                self.error_ty
            }
        };
        let stage = self.join_stages(&[base, index]);
        self.finish(id, ty, stage, None)
    }

    fn infer_member(&mut self, id: ExprId, base: ExprId, member: &ast::Ident) -> Handle<Type> {
        let base_ty = self.infer_expr(base);
        let (ty, access) = match self.types[base_ty].inner.clone() {
            TypeInner::Struct { members, .. } => {
                match members.iter().position(|m| m.name == member.name) {
                    Some(index) => (
                        members[index].ty,
                        Some(MemberAccess::Field(index as u32)),
                    ),
                    None => {
                        self.diagnostics.add_error(
                            member.span,
                            format!(
                                "no member named '{}' in '{}'",
                                member.name,
                                self.type_name(base_ty)
                            ),
                        );
                        (self.error_ty, None)
                    }
                }
            }
            TypeInner::Vector { size, scalar } => {
                match parse_swizzle(&member.name, size) {
                    Some(components) => {
                        let ty = if components.len() == 1 {
                            self.scalar_ty(scalar)
                        } else {
                            let size = match components.len() {
                                2 => VectorSize::Bi,
                                3 => VectorSize::Tri,
                                _ => VectorSize::Quad,
                            };
                            self.vector_ty(size, scalar)
                        };
                        (ty, Some(MemberAccess::Swizzle(components)))
                    }
                    None => {
                        self.diagnostics.add_error(
                            member.span,
                            format!("invalid vector swizzle '{}'", member.name),
                        );
                        (self.error_ty, None)
                    }
                }
            }
            _ => {
                if base_ty != self.error_ty {
                    self.diagnostics.add_error(
                        member.span,
                        format!("type '{}' has no members", self.type_name(base_ty)),
                    );
                }
                (self.error_ty, None)
            }
        };
        let stage = self.join_stages(&[base]);
        self.expr_info[id.index()].member = access;
        self.finish(id, ty, stage, None)
    }
}

fn op_str(op: BinaryOp) -> &'static str {
    use BinaryOp as B;
    match op {
        B::Add => "+",
        B::Subtract => "-",
        B::Multiply => "*",
        B::Divide => "/",
        B::Modulo => "%",
        B::Equal => "==",
        B::NotEqual => "!=",
        B::Less => "<",
        B::LessEqual => "<=",
        B::Greater => ">",
        B::GreaterEqual => ">=",
        B::LogicalAnd => "&&",
        B::LogicalOr => "||",
        B::BitwiseAnd => "&",
        B::BitwiseOr => "|",
        B::BitwiseXor => "^",
        B::ShiftLeft => "<<",
        B::ShiftRight => ">>",
    }
}

fn as_f64(v: ConstValue) -> Option<f64> {
    match v {
        ConstValue::Int(v) => Some(v as f64),
        ConstValue::Float(v) => Some(v),
        ConstValue::Bool(_) => None,
    }
}

/// Implicit conversion: abstract-int widens to anything numeric,
/// abstract-float only to concrete floats. Concrete types never convert.
fn convertible(from: Scalar, to: Scalar) -> bool {
    if from == to {
        return true;
    }
    match from.kind {
        ScalarKind::AbstractInt => matches!(
            to.kind,
            ScalarKind::Sint | ScalarKind::Uint | ScalarKind::Float | ScalarKind::AbstractFloat
        ),
        ScalarKind::AbstractFloat => to.kind == ScalarKind::Float,
        _ => false,
    }
}

fn common_scalar(a: Scalar, b: Scalar) -> Option<Scalar> {
    if a == b {
        Some(a)
    } else if convertible(a, b) {
        Some(b)
    } else if convertible(b, a) {
        Some(a)
    } else {
        None
    }
}

fn concrete_default(s: Scalar) -> Scalar {
    match s.kind {
        ScalarKind::AbstractInt => Scalar::I32,
        ScalarKind::AbstractFloat => Scalar::F32,
        _ => s,
    }
}

fn zero_value(scalar: Scalar) -> ConstValue {
    match scalar.kind {
        ScalarKind::Bool => ConstValue::Bool(false),
        ScalarKind::Float | ScalarKind::AbstractFloat => ConstValue::Float(0.0),
        _ => ConstValue::Int(0),
    }
}

fn convert_value(v: ConstValue, to: Scalar) -> Option<ConstValue> {
    Some(match (v, to.kind) {
        (ConstValue::Bool(b), ScalarKind::Bool) => ConstValue::Bool(b),
        (ConstValue::Bool(b), ScalarKind::Sint | ScalarKind::Uint) => {
            ConstValue::Int(i64::from(b))
        }
        (ConstValue::Bool(b), ScalarKind::Float) => ConstValue::Float(f64::from(u8::from(b))),
        (ConstValue::Int(v), ScalarKind::Bool) => ConstValue::Bool(v != 0),
        (ConstValue::Int(v), ScalarKind::Sint | ScalarKind::Uint | ScalarKind::AbstractInt) => {
            ConstValue::Int(v)
        }
        (ConstValue::Int(v), ScalarKind::Float | ScalarKind::AbstractFloat) => {
            ConstValue::Float(v as f64)
        }
        (ConstValue::Float(v), ScalarKind::Bool) => ConstValue::Bool(v != 0.0),
        (ConstValue::Float(v), ScalarKind::Sint | ScalarKind::Uint | ScalarKind::AbstractInt) => {
            ConstValue::Int(v as i64)
        }
        (ConstValue::Float(v), ScalarKind::Float | ScalarKind::AbstractFloat) => {
            ConstValue::Float(v)
        }
    })
}

fn parse_swizzle(name: &str, size: VectorSize) -> Option<Vec<SwizzleComponent>> {
    if name.is_empty() || name.len() > 4 {
        return None;
    }
    let xyzw = name.chars().all(|c| "xyzw".contains(c));
    let rgba = name.chars().all(|c| "rgba".contains(c));
    if !xyzw && !rgba {
        return None;
    }
    let mut components = Vec::with_capacity(name.len());
    for c in name.chars() {
        let component = SwizzleComponent::from_char(c)?;
        if (component as u32) >= size as u32 {
            return None;
        }
        components.push(component);
    }
    Some(components)
}
