//! Name resolution: binds every identifier use to its declaration and
//! validates the scope rules.
//!
//! Function declarations in a block are registered before the block's
//! statements are visited, so forward references and mutual recursion work.
//! A variable initialized with a function literal registers its own name
//! before the literal's body is resolved, which is what makes
//! `var f := (n: int) -> int { .. f(n - 1) .. };` legal at the top level.

use std::collections::HashMap;

use tern_syntax::ast::*;
use tern_syntax::error::Result;
use tern_syntax::token::Pos;

use crate::env::{Env, BREAK_KEY, CONTINUE_KEY, RETURN_KEY};
use crate::err_at;

pub(crate) fn resolve(prog: &Program) -> Result<HashMap<NodeId, Entity>> {
    let mut r = Resolver {
        refs: HashMap::new(),
        env: Env::new(),
    };
    r.resolve_stmts(&prog.stmts)?;
    Ok(r.refs)
}

struct Resolver {
    refs: HashMap<NodeId, Entity>,
    env: Env,
}

impl Resolver {
    // Shared by the program body and every block: function declarations are
    // pre-registered so later statements can call them before their point of
    // declaration.
    fn resolve_stmts(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            if let Stmt::Func(decl) = stmt {
                if !self.env.set(&decl.name, Entity::Func(decl.id)) {
                    return err_at(decl.pos, format!("{} has already been declared", decl.name));
                }
            }
        }
        for stmt in stmts {
            self.resolve_stmt(stmt)?;
        }
        Ok(())
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Block(block) => {
                self.env.push();
                let res = self.resolve_stmts(&block.stmts);
                self.env.pop();
                res
            }
            Stmt::Var(var) => {
                for decl in &var.decls {
                    self.resolve_var_decl(decl)?;
                }
                Ok(())
            }
            Stmt::Func(decl) => self.resolve_func_decl(decl),
            Stmt::If(stmt) => self.resolve_if_stmt(stmt),
            Stmt::While(stmt) => self.resolve_while_stmt(stmt),
            Stmt::For(stmt) => self.resolve_for_stmt(stmt),
            Stmt::Continue(stmt) => self.resolve_loop_ref(stmt.id, stmt.pos, CONTINUE_KEY),
            Stmt::Break(stmt) => self.resolve_loop_ref(stmt.id, stmt.pos, BREAK_KEY),
            Stmt::Return(stmt) => self.resolve_return_stmt(stmt),
            Stmt::Assign(stmt) => self.resolve_assign_stmt(stmt),
            Stmt::Expr(stmt) => self.resolve_expr(&stmt.expr),
        }
    }

    fn resolve_var_decl(&mut self, decl: &VarDecl) -> Result<()> {
        // A function-literal initializer sees its own variable, enabling
        // recursion through the name. Any other initializer is resolved
        // before the name exists, so `var x := x;` is an error.
        if let Some(Expr::Func(lit)) = &decl.value {
            self.declare(decl)?;
            return self.resolve_func_lit(lit);
        }
        if let Some(value) = &decl.value {
            self.resolve_expr(value)?;
        }
        self.declare(decl)
    }

    fn declare(&mut self, decl: &VarDecl) -> Result<()> {
        if !self.env.set(&decl.name, Entity::Var(decl.id)) {
            return err_at(decl.pos, format!("{} has already been declared", decl.name));
        }
        Ok(())
    }

    fn resolve_func_decl(&mut self, decl: &FuncDecl) -> Result<()> {
        // The name itself was pre-registered by the enclosing block.
        if self.env.get_sentinel(RETURN_KEY).is_some() {
            return err_at(decl.pos, "Function declarations cannot be nested");
        }
        if decl.ret.is_some() && !returnable_block(&decl.body) {
            return err_at(decl.pos, format!("Missing return at end of {}", decl.name));
        }
        self.env.push_boundary();
        self.env.set(RETURN_KEY, Entity::Func(decl.id));
        let res = self.resolve_func_scope(&decl.params, &decl.body);
        self.env.pop();
        res
    }

    fn resolve_func_lit(&mut self, lit: &FuncLit) -> Result<()> {
        if self.env.get_sentinel(RETURN_KEY).is_some() {
            return err_at(lit.pos, "Function literals cannot be nested in functions");
        }
        if lit.ret.is_some() && !returnable_block(&lit.body) {
            return err_at(lit.pos, "Missing return at end of function literal");
        }
        self.env.push_boundary();
        self.env.set(RETURN_KEY, Entity::Lit(lit.id));
        let res = self.resolve_func_scope(&lit.params, &lit.body);
        self.env.pop();
        res
    }

    // Parameters share the function body's scope.
    fn resolve_func_scope(&mut self, params: &[VarDecl], body: &BlockStmt) -> Result<()> {
        for param in params {
            self.declare(param)?;
        }
        self.resolve_stmts(&body.stmts)
    }

    fn resolve_if_stmt(&mut self, stmt: &IfStmt) -> Result<()> {
        self.resolve_expr(&stmt.cond)?;
        self.env.push();
        let res = self.resolve_stmts(&stmt.body.stmts);
        self.env.pop();
        res?;
        if let Some(alt) = &stmt.alt {
            self.resolve_stmt(alt)?;
        }
        Ok(())
    }

    fn resolve_while_stmt(&mut self, stmt: &WhileStmt) -> Result<()> {
        self.resolve_expr(&stmt.cond)?;
        self.env.push();
        self.env.set(CONTINUE_KEY, Entity::While(stmt.id));
        self.env.set(BREAK_KEY, Entity::While(stmt.id));
        let res = self.resolve_stmts(&stmt.body.stmts);
        self.env.pop();
        res
    }

    fn resolve_for_stmt(&mut self, stmt: &ForStmt) -> Result<()> {
        if let Some(value) = &stmt.iter.value {
            self.resolve_expr(value)?;
        }
        self.env.push();
        self.env.set(CONTINUE_KEY, Entity::For(stmt.id));
        self.env.set(BREAK_KEY, Entity::For(stmt.id));
        let res = (|| {
            self.declare(&stmt.elem)?;
            if !stmt.index.name.is_empty() {
                self.declare(&stmt.index)?;
            }
            self.resolve_stmts(&stmt.body.stmts)
        })();
        self.env.pop();
        res
    }

    fn resolve_loop_ref(&mut self, id: NodeId, pos: Pos, key: &str) -> Result<()> {
        match self.env.get_sentinel(key) {
            Some(target) => {
                self.refs.insert(id, target);
                Ok(())
            }
            None => err_at(pos, format!("Illegal use of {}", key)),
        }
    }

    fn resolve_return_stmt(&mut self, stmt: &ReturnStmt) -> Result<()> {
        if let Some(value) = &stmt.value {
            self.resolve_expr(value)?;
        }
        match self.env.get_sentinel(RETURN_KEY) {
            Some(target) => {
                self.refs.insert(stmt.id, target);
                Ok(())
            }
            None => err_at(stmt.pos, "Illegal use of return"),
        }
    }

    fn resolve_assign_stmt(&mut self, stmt: &AssignStmt) -> Result<()> {
        self.resolve_expr(&stmt.value)?;
        self.resolve_expr(&stmt.target)?;
        // Functions are not variables.
        if let Expr::Ident(ident) = &stmt.target {
            if let Some(Entity::Func(_)) = self.refs.get(&ident.id) {
                return err_at(ident.pos, format!("{} is not a variable", ident.name));
            }
        }
        Ok(())
    }

    fn resolve_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Prefix(e) => self.resolve_expr(&e.right),
            Expr::Infix(e) => {
                self.resolve_expr(&e.left)?;
                self.resolve_expr(&e.right)
            }
            Expr::Index(e) => {
                self.resolve_expr(&e.base)?;
                self.resolve_expr(&e.index)
            }
            Expr::Call(e) => {
                self.resolve_expr(&e.callee)?;
                for arg in &e.args {
                    self.resolve_expr(arg)?;
                }
                Ok(())
            }
            Expr::LibCall(e) => {
                for arg in &e.args {
                    self.resolve_expr(arg)?;
                }
                Ok(())
            }
            Expr::Ident(ident) => match self.env.get(&ident.name) {
                Some(target) => {
                    self.refs.insert(ident.id, target);
                    Ok(())
                }
                None => err_at(ident.pos, format!("{} is not declared", ident.name)),
            },
            Expr::Range(e) => {
                self.resolve_expr(&e.lower)?;
                self.resolve_expr(&e.upper)
            }
            Expr::Array(e) => {
                for elem in &e.elems {
                    self.resolve_expr(elem)?;
                }
                Ok(())
            }
            Expr::ArrayShort(e) => {
                if let Some(value) = &e.value {
                    self.resolve_expr(value)?;
                }
                Ok(())
            }
            Expr::Func(lit) => self.resolve_func_lit(lit),
            Expr::Int(_) | Expr::Bool(_) | Expr::Str(_) => Ok(()),
        }
    }
}

/// Whether control is guaranteed to leave `stmt` through a `return`.
pub(crate) fn returnable(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return(_) => true,
        Stmt::Block(block) => returnable_block(block),
        Stmt::If(stmt) => match &stmt.alt {
            // Without an else, the body may be skipped entirely.
            None => false,
            Some(alt) => returnable_block(&stmt.body) && returnable(alt),
        },
        _ => false,
    }
}

pub(crate) fn returnable_block(block: &BlockStmt) -> bool {
    block.stmts.iter().any(returnable)
}
