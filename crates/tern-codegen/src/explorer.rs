//! Explore pass: a depth-first walk allocating storage and jump labels for
//! everything the emitter will need, without emitting a single instruction.
//!
//! Globals get counter-indexed BSS labels, locals get frame offsets aligned
//! to their natural alignment, and every control-flow site gets its bundle of
//! branch labels. The maps are keyed by node id and ordered, so the emitter
//! sees objects in source order.

use std::collections::BTreeMap;

use tern_syntax::ast::*;
use tern_syntax::error::Result;
use tern_syntax::token::TokenKind;
use tern_syntax::types::Type;

use crate::err;
use crate::object::*;

/// Everything the explore pass allocated.
#[derive(Debug, Default)]
pub(crate) struct Layout {
    pub gvars: BTreeMap<NodeId, Gvar>,
    pub lvars: BTreeMap<NodeId, Lvar>,
    pub garrs: BTreeMap<NodeId, Garr>,
    pub larrs: BTreeMap<NodeId, Larr>,
    pub grngs: BTreeMap<NodeId, Grng>,
    pub lrngs: BTreeMap<NodeId, Lrng>,
    pub strs: BTreeMap<NodeId, StrLit>,
    pub fns: BTreeMap<NodeId, Fun>,
    pub branches: BTreeMap<NodeId, Branch>,
}

pub(crate) fn explore(prog: &Program, meta: &Meta) -> Result<Layout> {
    let mut x = Explorer {
        meta,
        layout: Layout::default(),
        n_gvar: 0,
        n_str: 0,
        n_grng: 0,
        n_garr: 0,
        n_fn: 0,
        n_branch: 0,
        local: false,
        offset: 0,
    };
    for stmt in &prog.stmts {
        x.explore_stmt(stmt)?;
    }
    Ok(x.layout)
}

struct Explorer<'a> {
    meta: &'a Meta,
    layout: Layout,

    n_gvar: usize,
    n_str: usize,
    n_grng: usize,
    n_garr: usize,
    n_fn: usize,
    n_branch: usize,

    // Set while inside a function body; the offset counter accumulates that
    // function's frame.
    local: bool,
    offset: usize,
}

impl Explorer<'_> {
    fn branch_label(&mut self) -> String {
        let label = format!(".L{}", self.n_branch);
        self.n_branch += 1;
        label
    }

    fn decl_type(&self, id: NodeId) -> Result<&Type> {
        match self.meta.decl_types.get(&id) {
            Some(ty) => Ok(ty),
            None => err("internal: declaration without a type"),
        }
    }

    fn expr_type(&self, id: NodeId) -> Result<&Type> {
        match self.meta.expr_type(id) {
            Some(ty) => Ok(ty),
            None => err("internal: expression without a type"),
        }
    }

    fn explore_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Block(block) => self.explore_block(block),
            Stmt::Var(var) => {
                for decl in &var.decls {
                    self.explore_var_decl(decl)?;
                }
                Ok(())
            }
            Stmt::Func(decl) => {
                self.explore_func(decl.id, Some(decl.name.as_str()), &decl.params, &decl.body)
            }
            Stmt::If(stmt) => self.explore_if_stmt(stmt),
            Stmt::While(stmt) => self.explore_while_stmt(stmt),
            Stmt::For(stmt) => self.explore_for_stmt(stmt),
            Stmt::Return(stmt) => {
                if let Some(value) = &stmt.value {
                    self.explore_expr(value)?;
                }
                Ok(())
            }
            Stmt::Assign(stmt) => {
                self.explore_expr(&stmt.target)?;
                self.explore_expr(&stmt.value)
            }
            Stmt::Expr(stmt) => self.explore_expr(&stmt.expr),
            Stmt::Continue(_) | Stmt::Break(_) => Ok(()),
        }
    }

    fn explore_block(&mut self, block: &BlockStmt) -> Result<()> {
        for stmt in &block.stmts {
            self.explore_stmt(stmt)?;
        }
        Ok(())
    }

    fn explore_if_stmt(&mut self, stmt: &IfStmt) -> Result<()> {
        self.explore_expr(&stmt.cond)?;
        self.explore_block(&stmt.body)?;
        let labels = match &stmt.alt {
            None => vec![self.branch_label()],
            Some(alt) => {
                let alt_label = self.branch_label();
                self.explore_stmt(alt)?;
                vec![alt_label, self.branch_label()]
            }
        };
        self.layout.branches.insert(stmt.id, Branch { labels });
        Ok(())
    }

    fn explore_while_stmt(&mut self, stmt: &WhileStmt) -> Result<()> {
        let begin = self.branch_label();
        self.explore_expr(&stmt.cond)?;
        self.explore_block(&stmt.body)?;
        let end = self.branch_label();
        self.layout.branches.insert(
            stmt.id,
            Branch {
                labels: vec![begin, end],
            },
        );
        Ok(())
    }

    fn explore_for_stmt(&mut self, stmt: &ForStmt) -> Result<()> {
        self.explore_var_decl(&stmt.elem)?;
        self.explore_var_decl(&stmt.index)?;
        self.explore_var_decl(&stmt.iter)?;
        let begin = self.branch_label();
        self.explore_block(&stmt.body)?;
        let cont = self.branch_label();
        let end = self.branch_label();
        self.layout.branches.insert(
            stmt.id,
            Branch {
                labels: vec![begin, cont, end],
            },
        );
        Ok(())
    }

    fn explore_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Prefix(e) => self.explore_expr(&e.right),
            Expr::Infix(e) => self.explore_infix_expr(e),
            Expr::Index(e) => {
                self.explore_expr(&e.base)?;
                self.explore_expr(&e.index)
            }
            Expr::Call(e) => {
                self.explore_expr(&e.callee)?;
                for arg in &e.args {
                    self.explore_expr(arg)?;
                }
                Ok(())
            }
            Expr::LibCall(e) => {
                for arg in &e.args {
                    self.explore_expr(arg)?;
                }
                Ok(())
            }
            Expr::Str(e) => {
                let label = format!("str{}", self.n_str);
                self.n_str += 1;
                self.layout.strs.insert(
                    e.id,
                    StrLit {
                        label,
                        value: e.value.clone(),
                    },
                );
                Ok(())
            }
            Expr::Range(e) => self.explore_range_lit(e),
            Expr::Array(e) => self.explore_array_lit(e),
            Expr::ArrayShort(e) => self.explore_array_short_lit(e),
            Expr::Func(lit) => self.explore_func(lit.id, None, &lit.params, &lit.body),
            Expr::Ident(_) | Expr::Int(_) | Expr::Bool(_) => Ok(()),
        }
    }

    fn explore_infix_expr(&mut self, e: &InfixExpr) -> Result<()> {
        match e.op {
            TokenKind::AndAnd | TokenKind::OrOr => {
                self.explore_expr(&e.left)?;
                self.explore_expr(&e.right)?;
                let end = self.branch_label();
                self.layout
                    .branches
                    .insert(e.id, Branch { labels: vec![end] });
                Ok(())
            }
            TokenKind::In => {
                // Operand order matches the emitter: right first, then left.
                self.explore_expr(&e.right)?;
                self.explore_expr(&e.left)?;
                let right_ty = self.expr_type(e.right.id())?.clone();
                let labels = match right_ty {
                    Type::Range => {
                        let no = self.branch_label();
                        let end = self.branch_label();
                        vec![no, end]
                    }
                    Type::Array { .. } => {
                        let begin = self.branch_label();
                        let no = self.branch_label();
                        let end = self.branch_label();
                        vec![begin, no, end]
                    }
                    _ => return err("internal: in over a non-iterable"),
                };
                self.layout.branches.insert(e.id, Branch { labels });
                Ok(())
            }
            _ => {
                self.explore_expr(&e.right)?;
                self.explore_expr(&e.left)
            }
        }
    }

    fn explore_range_lit(&mut self, e: &RangeLit) -> Result<()> {
        self.explore_expr(&e.lower)?;
        self.explore_expr(&e.upper)?;
        if self.local {
            self.offset = align(self.offset + 16, 8);
            self.layout.lrngs.insert(
                e.id,
                Lrng {
                    offset: self.offset,
                },
            );
        } else {
            let label = format!("grng{}", self.n_grng);
            self.n_grng += 1;
            self.layout.grngs.insert(e.id, Grng { label });
        }
        Ok(())
    }

    fn explore_array_lit(&mut self, e: &ArrayLit) -> Result<()> {
        for elem in &e.elems {
            self.explore_expr(elem)?;
        }
        let (len, elem_size) = match self.expr_type(e.id)? {
            Type::Array { len, elem } => (*len, size_of(elem)),
            _ => return err("internal: array literal without array type"),
        };
        self.alloc_array(e.id, len, elem_size);
        Ok(())
    }

    fn explore_array_short_lit(&mut self, e: &ArrayShortLit) -> Result<()> {
        if let Some(value) = &e.value {
            self.explore_expr(value)?;
        }
        self.alloc_array(e.id, e.len, size_of(&e.elem_ty));
        Ok(())
    }

    fn alloc_array(&mut self, id: NodeId, len: usize, elem_size: usize) {
        if self.local {
            self.offset = align(self.offset + len * elem_size, elem_size);
            self.layout.larrs.insert(
                id,
                Larr {
                    offset: self.offset,
                    len,
                    elem_size,
                },
            );
        } else {
            let label = format!("garr{}", self.n_garr);
            self.n_garr += 1;
            self.layout.garrs.insert(
                id,
                Garr {
                    label,
                    len,
                    elem_size,
                },
            );
        }
    }

    fn explore_func(
        &mut self,
        id: NodeId,
        name: Option<&str>,
        params: &[VarDecl],
        body: &BlockStmt,
    ) -> Result<()> {
        let saved_local = self.local;
        let saved_offset = self.offset;
        self.local = true;
        self.offset = 0;

        for param in params {
            self.explore_var_decl(param)?;
        }
        self.explore_block(body)?;
        let end = self.branch_label();

        let local_area = align(self.offset, 16);
        self.local = saved_local;
        self.offset = saved_offset;

        let label = match name {
            Some(name) => format!("fn{}_{}", self.n_fn, name),
            None => format!("fn{}", self.n_fn),
        };
        self.n_fn += 1;
        self.layout.fns.insert(id, Fun { label, local_area });
        self.layout
            .branches
            .insert(id, Branch { labels: vec![end] });
        Ok(())
    }

    fn explore_var_decl(&mut self, decl: &VarDecl) -> Result<()> {
        if let Some(value) = &decl.value {
            self.explore_expr(value)?;
        }
        let size = size_of(self.decl_type(decl.id)?);
        if self.local {
            self.offset = align(self.offset + size, size);
            self.layout.lvars.insert(
                decl.id,
                Lvar {
                    offset: self.offset,
                    size,
                },
            );
        } else {
            let label = format!("gvar{}_{}", self.n_gvar, decl.name);
            self.n_gvar += 1;
            self.layout.gvars.insert(decl.id, Gvar { label, size });
        }
        Ok(())
    }
}
