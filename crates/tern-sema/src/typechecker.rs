//! Type checking and inference.
//!
//! A single recursive walk computes a type for every expression and records
//! it in the side tables; variable declarations without an annotation take
//! the initializer's type. Function declaration signatures are collected in
//! a pre-pass so forward calls check against the real signature.

use std::collections::HashMap;

use tern_syntax::ast::*;
use tern_syntax::error::Result;
use tern_syntax::token::TokenKind;
use tern_syntax::types::Type;

use crate::{err_at, internal};

type Types = HashMap<NodeId, Option<Type>>;
type DeclTypes = HashMap<NodeId, Type>;

pub(crate) fn check(
    prog: &Program,
    refs: &HashMap<NodeId, Entity>,
) -> Result<(Types, DeclTypes)> {
    let mut t = Typechecker {
        refs,
        types: HashMap::new(),
        decl_types: HashMap::new(),
    };
    t.seed_signatures(&prog.stmts);
    for stmt in &prog.stmts {
        t.check_stmt(stmt)?;
    }
    Ok((t.types, t.decl_types))
}

struct Typechecker<'a> {
    refs: &'a HashMap<NodeId, Entity>,
    types: Types,
    decl_types: DeclTypes,
}

fn signature(params: &[VarDecl], ret: &Option<Type>) -> Type {
    Type::Func {
        params: params
            .iter()
            .map(|p| p.ty.clone().expect("parameter types are annotated"))
            .collect(),
        ret: ret.clone().map(Box::new),
    }
}

// Renders an optional type in diagnostics; void prints as "nothing".
fn tname(ty: Option<&Type>) -> String {
    match ty {
        Some(t) => t.to_string(),
        None => "nothing".to_string(),
    }
}

impl Typechecker<'_> {
    // Function declarations are callable before their point of declaration;
    // record every signature up front.
    fn seed_signatures(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.seed_stmt(stmt);
        }
    }

    fn seed_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Func(decl) => {
                self.decl_types
                    .insert(decl.id, signature(&decl.params, &decl.ret));
                self.seed_signatures(&decl.body.stmts);
            }
            Stmt::Block(block) => self.seed_signatures(&block.stmts),
            Stmt::If(stmt) => {
                self.seed_signatures(&stmt.body.stmts);
                if let Some(alt) = &stmt.alt {
                    self.seed_stmt(alt);
                }
            }
            Stmt::While(stmt) => self.seed_signatures(&stmt.body.stmts),
            Stmt::For(stmt) => self.seed_signatures(&stmt.body.stmts),
            _ => {}
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Block(block) => {
                for stmt in &block.stmts {
                    self.check_stmt(stmt)?;
                }
                Ok(())
            }
            Stmt::Var(var) => {
                for decl in &var.decls {
                    self.check_var_decl(decl)?;
                }
                Ok(())
            }
            Stmt::Func(decl) => self.check_func_body(&decl.params, &decl.body),
            Stmt::If(stmt) => self.check_if_stmt(stmt),
            Stmt::While(stmt) => self.check_while_stmt(stmt),
            Stmt::For(stmt) => self.check_for_stmt(stmt),
            Stmt::Return(stmt) => self.check_return_stmt(stmt),
            Stmt::Assign(stmt) => self.check_assign_stmt(stmt),
            Stmt::Expr(stmt) => self.check_expr(&stmt.expr),
            Stmt::Continue(_) | Stmt::Break(_) => Ok(()),
        }
    }

    fn check_var_decl(&mut self, decl: &VarDecl) -> Result<()> {
        // A function-literal initializer binds the variable's type from the
        // signature before the body is checked, so the body may call the
        // variable recursively.
        if let Some(Expr::Func(lit)) = &decl.value {
            let sig = signature(&lit.params, &lit.ret);
            self.types.insert(lit.id, Some(sig.clone()));
            if let Some(annot) = &decl.ty {
                if *annot != sig {
                    return err_at(
                        lit.pos,
                        format!("Expected {} value for {}, but got {}", annot, decl.name, sig),
                    );
                }
            }
            self.decl_types.insert(decl.id, sig);
            return self.check_func_body(&lit.params, &lit.body);
        }

        let value = decl.value.as_ref().expect("var declarations are initialized");
        self.check_expr(value)?;
        let got = self.expr_type(value);
        match (&decl.ty, got) {
            (None, Some(ty)) => {
                self.decl_types.insert(decl.id, ty);
                Ok(())
            }
            (None, None) => err_at(
                value.pos(),
                format!("Unexpected void initializer for {}", decl.name),
            ),
            (Some(annot), got) => {
                if got.as_ref() != Some(annot) {
                    return err_at(
                        value.pos(),
                        format!(
                            "Expected {} value for {}, but got {}",
                            annot,
                            decl.name,
                            tname(got.as_ref())
                        ),
                    );
                }
                self.decl_types.insert(decl.id, annot.clone());
                Ok(())
            }
        }
    }

    fn check_func_body(&mut self, params: &[VarDecl], body: &BlockStmt) -> Result<()> {
        for param in params {
            let ty = param.ty.clone().expect("parameter types are annotated");
            self.decl_types.insert(param.id, ty);
        }
        for stmt in &body.stmts {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    fn check_cond(&mut self, cond: &Expr) -> Result<()> {
        self.check_expr(cond)?;
        let ty = self.expr_type(cond);
        if ty != Some(Type::Bool) {
            return err_at(
                cond.pos(),
                format!("Expected bool condition, but got {}", tname(ty.as_ref())),
            );
        }
        Ok(())
    }

    fn check_if_stmt(&mut self, stmt: &IfStmt) -> Result<()> {
        self.check_cond(&stmt.cond)?;
        for s in &stmt.body.stmts {
            self.check_stmt(s)?;
        }
        if let Some(alt) = &stmt.alt {
            self.check_stmt(alt)?;
        }
        Ok(())
    }

    fn check_while_stmt(&mut self, stmt: &WhileStmt) -> Result<()> {
        self.check_cond(&stmt.cond)?;
        for s in &stmt.body.stmts {
            self.check_stmt(s)?;
        }
        Ok(())
    }

    // The element type follows the iterable: int over a range, the array's
    // element type over an array. The index is always int.
    fn check_for_stmt(&mut self, stmt: &ForStmt) -> Result<()> {
        let value = stmt.iter.value.as_ref().expect("loop iterables are parsed");
        self.check_expr(value)?;
        let iter_ty = self.expr_type(value);
        let elem_ty = match &iter_ty {
            Some(Type::Range) => Type::Int,
            Some(Type::Array { elem, .. }) => (**elem).clone(),
            other => {
                return err_at(
                    value.pos(),
                    format!("Expected range or array, but got {}", tname(other.as_ref())),
                );
            }
        };
        self.decl_types
            .insert(stmt.iter.id, iter_ty.expect("checked above"));
        self.decl_types.insert(stmt.elem.id, elem_ty);
        self.decl_types.insert(stmt.index.id, Type::Int);
        for s in &stmt.body.stmts {
            self.check_stmt(s)?;
        }
        Ok(())
    }

    fn check_return_stmt(&mut self, stmt: &ReturnStmt) -> Result<()> {
        let ret = self.enclosing_return_type(stmt.id)?;
        match &stmt.value {
            None => {
                if let Some(want) = ret {
                    return err_at(
                        stmt.pos,
                        format!("Expected {} return, but got nothing", want),
                    );
                }
                Ok(())
            }
            Some(value) => {
                self.check_expr(value)?;
                let got = self.expr_type(value);
                match ret {
                    None => err_at(
                        value.pos(),
                        format!("Expected no return value, but got {}", tname(got.as_ref())),
                    ),
                    Some(want) => {
                        if got.as_ref() != Some(&want) {
                            return err_at(
                                value.pos(),
                                format!(
                                    "Expected {} return, but got {}",
                                    want,
                                    tname(got.as_ref())
                                ),
                            );
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    fn enclosing_return_type(&self, id: NodeId) -> Result<Option<Type>> {
        let sig = match self.refs.get(&id) {
            Some(Entity::Func(decl)) => self.decl_types.get(decl).cloned(),
            Some(Entity::Lit(lit)) => self.types.get(lit).cloned().flatten(),
            _ => None,
        };
        match sig {
            Some(Type::Func { ret, .. }) => Ok(ret.map(|b| *b)),
            _ => internal("internal: return statement without an enclosing function"),
        }
    }

    fn check_assign_stmt(&mut self, stmt: &AssignStmt) -> Result<()> {
        self.check_expr(&stmt.target)?;
        self.check_expr(&stmt.value)?;
        let target = self.expr_type(&stmt.target);
        let value = self.expr_type(&stmt.value);
        if stmt.op == TokenKind::Assign {
            if target.is_none() || target != value {
                return err_at(
                    stmt.value.pos(),
                    format!(
                        "Expected {} value, but got {}",
                        tname(target.as_ref()),
                        tname(value.as_ref())
                    ),
                );
            }
            return Ok(());
        }
        // += -= *= /= %=
        if target != Some(Type::Int) {
            return err_at(
                stmt.target.pos(),
                format!("Expected int target, but got {}", tname(target.as_ref())),
            );
        }
        if value != Some(Type::Int) {
            return err_at(
                stmt.value.pos(),
                format!("Expected int value, but got {}", tname(value.as_ref())),
            );
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // Expr

    fn check_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Prefix(e) => self.check_prefix_expr(e),
            Expr::Infix(e) => self.check_infix_expr(e),
            Expr::Index(e) => self.check_index_expr(e),
            Expr::Call(e) => self.check_call_expr(e),
            Expr::LibCall(e) => {
                // Library calls are unchecked and void.
                for arg in &e.args {
                    self.check_expr(arg)?;
                }
                self.types.insert(e.id, None);
                Ok(())
            }
            Expr::Ident(e) => self.check_ident(e),
            Expr::Int(e) => {
                self.types.insert(e.id, Some(Type::Int));
                Ok(())
            }
            Expr::Bool(e) => {
                self.types.insert(e.id, Some(Type::Bool));
                Ok(())
            }
            Expr::Str(e) => {
                self.types.insert(e.id, Some(Type::Str));
                Ok(())
            }
            Expr::Range(e) => self.check_range_lit(e),
            Expr::Array(e) => self.check_array_lit(e),
            Expr::ArrayShort(e) => self.check_array_short_lit(e),
            Expr::Func(lit) => {
                let sig = signature(&lit.params, &lit.ret);
                self.types.insert(lit.id, Some(sig));
                self.check_func_body(&lit.params, &lit.body)
            }
        }
    }

    fn want_int(&self, operand: &Expr) -> Result<()> {
        let ty = self.types.get(&operand.id()).cloned().flatten();
        if ty != Some(Type::Int) {
            return err_at(
                operand.pos(),
                format!("Expected int operand, but got {}", tname(ty.as_ref())),
            );
        }
        Ok(())
    }

    fn want_bool(&self, operand: &Expr) -> Result<()> {
        let ty = self.types.get(&operand.id()).cloned().flatten();
        if ty != Some(Type::Bool) {
            return err_at(
                operand.pos(),
                format!("Expected bool operand, but got {}", tname(ty.as_ref())),
            );
        }
        Ok(())
    }

    fn check_prefix_expr(&mut self, e: &PrefixExpr) -> Result<()> {
        self.check_expr(&e.right)?;
        let ty = match e.op {
            TokenKind::Bang => {
                self.want_bool(&e.right)?;
                Type::Bool
            }
            TokenKind::Minus => {
                self.want_int(&e.right)?;
                Type::Int
            }
            _ => return internal("internal: unknown prefix operator"),
        };
        self.types.insert(e.id, Some(ty));
        Ok(())
    }

    fn check_infix_expr(&mut self, e: &InfixExpr) -> Result<()> {
        self.check_expr(&e.left)?;
        self.check_expr(&e.right)?;
        for operand in [&e.left, &e.right] {
            if self.expr_type(operand).is_none() {
                return err_at(operand.pos(), "Unexpected void value");
            }
        }
        let ty = match e.op {
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Percent => {
                self.want_int(&e.left)?;
                self.want_int(&e.right)?;
                Type::Int
            }
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => {
                self.want_int(&e.left)?;
                self.want_int(&e.right)?;
                Type::Bool
            }
            TokenKind::Eq | TokenKind::Ne => {
                let left = self.expr_type(&e.left);
                let right = self.expr_type(&e.right);
                if left != right {
                    return err_at(
                        e.right.pos(),
                        format!(
                            "Expected {} operand, but got {}",
                            tname(left.as_ref()),
                            tname(right.as_ref())
                        ),
                    );
                }
                Type::Bool
            }
            TokenKind::AndAnd | TokenKind::OrOr => {
                self.want_bool(&e.left)?;
                self.want_bool(&e.right)?;
                Type::Bool
            }
            TokenKind::In => {
                match self.expr_type(&e.right) {
                    Some(Type::Range) => self.want_int(&e.left)?,
                    Some(Type::Array { elem, .. }) => {
                        let left = self.expr_type(&e.left);
                        if left.as_ref() != Some(elem.as_ref()) {
                            return err_at(
                                e.left.pos(),
                                format!(
                                    "Expected {} operand, but got {}",
                                    elem,
                                    tname(left.as_ref())
                                ),
                            );
                        }
                    }
                    other => {
                        return err_at(
                            e.right.pos(),
                            format!(
                                "Expected range or array, but got {}",
                                tname(other.as_ref())
                            ),
                        );
                    }
                }
                Type::Bool
            }
            _ => return internal("internal: unknown infix operator"),
        };
        self.types.insert(e.id, Some(ty));
        Ok(())
    }

    fn check_index_expr(&mut self, e: &IndexExpr) -> Result<()> {
        self.check_expr(&e.base)?;
        let elem = match self.expr_type(&e.base) {
            Some(Type::Array { elem, .. }) => *elem,
            other => {
                return err_at(
                    e.base.pos(),
                    format!("Expected array, but got {}", tname(other.as_ref())),
                );
            }
        };
        self.check_expr(&e.index)?;
        let index = self.expr_type(&e.index);
        if index != Some(Type::Int) {
            return err_at(
                e.index.pos(),
                format!("Expected int index, but got {}", tname(index.as_ref())),
            );
        }
        self.types.insert(e.id, Some(elem));
        Ok(())
    }

    fn check_call_expr(&mut self, e: &CallExpr) -> Result<()> {
        self.check_expr(&e.callee)?;
        let (params, ret) = match self.expr_type(&e.callee) {
            Some(Type::Func { params, ret }) => (params, ret),
            other => {
                return err_at(
                    e.callee.pos(),
                    format!("Expected function, but got {}", tname(other.as_ref())),
                );
            }
        };
        if e.args.len() != params.len() {
            return err_at(
                e.pos,
                format!(
                    "Wrong number of arguments (expected {}, got {})",
                    params.len(),
                    e.args.len()
                ),
            );
        }
        for (arg, want) in e.args.iter().zip(&params) {
            self.check_expr(arg)?;
            let got = self.expr_type(arg);
            if got.as_ref() != Some(want) {
                return err_at(
                    arg.pos(),
                    format!("Expected {} argument, but got {}", want, tname(got.as_ref())),
                );
            }
        }
        self.types.insert(e.id, ret.map(|b| *b));
        Ok(())
    }

    fn check_ident(&mut self, e: &Ident) -> Result<()> {
        let ty = match self.refs.get(&e.id) {
            Some(Entity::Var(decl)) | Some(Entity::Func(decl)) => {
                self.decl_types.get(decl).cloned()
            }
            _ => None,
        };
        match ty {
            Some(ty) => {
                self.types.insert(e.id, Some(ty));
                Ok(())
            }
            None => internal(format!("internal: {} has no resolved type", e.name)),
        }
    }

    fn check_range_lit(&mut self, e: &RangeLit) -> Result<()> {
        for bound in [&e.lower, &e.upper] {
            self.check_expr(bound)?;
            let ty = self.expr_type(bound);
            if ty != Some(Type::Int) {
                return err_at(
                    bound.pos(),
                    format!("Expected int boundary, but got {}", tname(ty.as_ref())),
                );
            }
        }
        self.types.insert(e.id, Some(Type::Range));
        Ok(())
    }

    fn check_array_lit(&mut self, e: &ArrayLit) -> Result<()> {
        self.check_expr(&e.elems[0])?;
        let elem_ty = match self.expr_type(&e.elems[0]) {
            Some(ty) => ty,
            None => return err_at(e.elems[0].pos(), "Unexpected void value"),
        };
        for elem in &e.elems[1..] {
            self.check_expr(elem)?;
            if self.expr_type(elem).as_ref() != Some(&elem_ty) {
                return err_at(e.pos, "Array elements have different types");
            }
        }
        self.types.insert(
            e.id,
            Some(Type::Array {
                len: e.elems.len(),
                elem: Box::new(elem_ty),
            }),
        );
        Ok(())
    }

    fn check_array_short_lit(&mut self, e: &ArrayShortLit) -> Result<()> {
        if let Some(value) = &e.value {
            self.check_expr(value)?;
            let got = self.expr_type(value);
            if got.as_ref() != Some(&e.elem_ty) {
                return err_at(
                    value.pos(),
                    format!(
                        "Expected {} element, but got {}",
                        e.elem_ty,
                        tname(got.as_ref())
                    ),
                );
            }
        }
        self.types.insert(
            e.id,
            Some(Type::Array {
                len: e.len,
                elem: Box::new(e.elem_ty.clone()),
            }),
        );
        Ok(())
    }

    fn expr_type(&self, expr: &Expr) -> Option<Type> {
        self.types.get(&expr.id()).cloned().flatten()
    }
}
