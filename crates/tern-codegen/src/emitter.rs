//! Emit pass: writes Intel-syntax x86-64 assembly for the explored program.
//!
//! Every expression leaves its value in `rax`; the machine stack is the
//! operand stack. Binary operators evaluate the right operand first, push it,
//! evaluate the left operand, then pop the right into `rcx`. Reads of bool
//! storage zero-extend through `movzx`; writes use the matching width.

use tern_syntax::ast::*;
use tern_syntax::error::Result;
use tern_syntax::token::TokenKind;
use tern_syntax::types::Type;

use crate::err;
use crate::explorer::Layout;
use crate::object::{size_of, Branch, Fun};

// System V AMD64 integer argument registers, with the byte aliases used to
// spill bool parameters.
const ARG_REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];
const ARG_REGS_BYTE: [&str; 6] = ["dil", "sil", "dl", "cl", "r8b", "r9b"];

fn setcc(op: TokenKind) -> &'static str {
    match op {
        TokenKind::Eq => "sete",
        TokenKind::Ne => "setne",
        TokenKind::Lt => "setl",
        TokenKind::Le => "setle",
        TokenKind::Gt => "setg",
        TokenKind::Ge => "setge",
        _ => unreachable!("not a comparison operator"),
    }
}

pub(crate) fn emit(prog: &Program, meta: &Meta, layout: &Layout) -> Result<String> {
    let mut e = Emitter {
        meta,
        layout,
        out: String::new(),
    };
    e.emit_program(prog)?;
    Ok(e.out)
}

// A function body to be emitted as its own labeled block: either a
// declaration or a literal.
enum FnNode<'a> {
    Decl(&'a FuncDecl),
    Lit(&'a FuncLit),
}

struct Emitter<'a> {
    meta: &'a Meta,
    layout: &'a Layout,
    out: String,
}

impl Emitter<'_> {
    fn emit(&mut self, line: impl AsRef<str>) {
        self.out.push('\t');
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    fn label(&mut self, label: &str) {
        self.out.push_str(label);
        self.out.push_str(":\n");
    }

    fn branch(&self, id: NodeId) -> Result<&Branch> {
        match self.layout.branches.get(&id) {
            Some(br) => Ok(br),
            None => err("internal: missing branch labels"),
        }
    }

    fn fun(&self, id: NodeId) -> Result<&Fun> {
        match self.layout.fns.get(&id) {
            Some(f) => Ok(f),
            None => err("internal: missing function object"),
        }
    }

    fn expr_type(&self, id: NodeId) -> Result<&Type> {
        match self.meta.expr_type(id) {
            Some(ty) => Ok(ty),
            None => err("internal: expression without a type"),
        }
    }

    // ----------------------------------------------------------------
    // Program

    fn emit_program(&mut self, prog: &Program) -> Result<()> {
        self.emit(".intel_syntax noprefix");

        if !self.layout.strs.is_empty() {
            self.emit(".section .rodata");
        }
        for s in self.layout.strs.values() {
            self.out.push_str(&format!("{}:\n", s.label));
            let escaped = escape_asm(&s.value);
            self.emit(format!(".string \"{}\"", escaped));
        }

        self.emit(".text");

        for v in self.layout.gvars.values() {
            self.emit(format!(".comm {},{},{}", v.label, v.size, v.size));
        }
        for r in self.layout.grngs.values() {
            self.emit(format!(".comm {},16,8", r.label));
        }
        for a in self.layout.garrs.values() {
            self.emit(format!(
                ".comm {},{},{}",
                a.label,
                a.len * a.elem_size,
                a.elem_size
            ));
        }

        let mut fns = Vec::new();
        collect_fns_stmts(&prog.stmts, &mut fns);
        for node in &fns {
            self.emit_func(node)?;
        }

        self.emit(".globl main");
        self.label("main");
        self.emit("push rbp");
        self.emit("mov rbp, rsp");
        for stmt in &prog.stmts {
            self.emit_stmt(stmt)?;
        }
        // Exit status 0 regardless of the last statement's value.
        self.emit("mov rax, 0");
        self.emit("leave");
        self.emit("ret");
        Ok(())
    }

    fn emit_func(&mut self, node: &FnNode) -> Result<()> {
        let (id, params, body) = match node {
            FnNode::Decl(decl) => (decl.id, &decl.params, &decl.body),
            FnNode::Lit(lit) => (lit.id, &lit.params, &lit.body),
        };
        if params.len() > ARG_REGS.len() {
            return err("More than 6 parameters are not supported");
        }
        let label = self.fun(id)?.label.clone();
        let local_area = self.fun(id)?.local_area;
        let end = self.branch(id)?.labels[0].clone();

        self.label(&label);
        self.emit("push rbp");
        self.emit("mov rbp, rsp");
        if local_area > 0 {
            self.emit(format!("sub rsp, {}", local_area));
        }
        for (i, param) in params.iter().enumerate() {
            let lvar = match self.layout.lvars.get(&param.id) {
                Some(v) => v,
                None => return err("internal: parameter without a stack slot"),
            };
            let line = match lvar.size {
                1 => format!("mov byte ptr [rbp-{}], {}", lvar.offset, ARG_REGS_BYTE[i]),
                _ => format!("mov qword ptr [rbp-{}], {}", lvar.offset, ARG_REGS[i]),
            };
            self.emit(line);
        }
        for stmt in &body.stmts {
            self.emit_stmt(stmt)?;
        }
        self.label(&end);
        self.emit("leave");
        self.emit("ret");
        Ok(())
    }

    // ----------------------------------------------------------------
    // Stmt

    fn emit_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Block(block) => {
                for stmt in &block.stmts {
                    self.emit_stmt(stmt)?;
                }
                Ok(())
            }
            Stmt::Var(var) => {
                for decl in &var.decls {
                    if let Some(value) = &decl.value {
                        self.emit_expr(value)?;
                        self.store_decl(decl.id)?;
                    }
                }
                Ok(())
            }
            // Function bodies were emitted ahead of main.
            Stmt::Func(_) => Ok(()),
            Stmt::If(stmt) => self.emit_if_stmt(stmt),
            Stmt::While(stmt) => self.emit_while_stmt(stmt),
            Stmt::For(stmt) => self.emit_for_stmt(stmt),
            Stmt::Continue(stmt) => self.emit_loop_jump(stmt.id, false),
            Stmt::Break(stmt) => self.emit_loop_jump(stmt.id, true),
            Stmt::Return(stmt) => self.emit_return_stmt(stmt),
            Stmt::Assign(stmt) => self.emit_assign_stmt(stmt),
            Stmt::Expr(stmt) => self.emit_expr(&stmt.expr),
        }
    }

    fn emit_if_stmt(&mut self, stmt: &IfStmt) -> Result<()> {
        let labels = self.branch(stmt.id)?.labels.clone();
        self.emit_expr(&stmt.cond)?;
        self.emit("cmp rax, 0");
        match &stmt.alt {
            None => {
                let end = &labels[0];
                self.emit(format!("je {}", end));
                for s in &stmt.body.stmts {
                    self.emit_stmt(s)?;
                }
                self.label(end);
            }
            Some(alt) => {
                let (alt_label, end) = (&labels[0], &labels[1]);
                self.emit(format!("je {}", alt_label));
                for s in &stmt.body.stmts {
                    self.emit_stmt(s)?;
                }
                self.emit(format!("jmp {}", end));
                self.label(alt_label);
                self.emit_stmt(alt)?;
                self.label(end);
            }
        }
        Ok(())
    }

    fn emit_while_stmt(&mut self, stmt: &WhileStmt) -> Result<()> {
        let labels = self.branch(stmt.id)?.labels.clone();
        let (begin, end) = (&labels[0], &labels[1]);
        self.label(begin);
        self.emit_expr(&stmt.cond)?;
        self.emit("cmp rax, 0");
        self.emit(format!("je {}", end));
        for s in &stmt.body.stmts {
            self.emit_stmt(s)?;
        }
        self.emit(format!("jmp {}", begin));
        self.label(end);
        Ok(())
    }

    fn emit_for_stmt(&mut self, stmt: &ForStmt) -> Result<()> {
        let iter_ty = match self.meta.decl_types.get(&stmt.iter.id) {
            Some(ty) => ty.clone(),
            None => return err("internal: loop iterable without a type"),
        };
        match iter_ty {
            Type::Range => self.emit_for_range(stmt),
            Type::Array { len, elem } => self.emit_for_array(stmt, len, size_of(&elem)),
            _ => err("internal: loop over a non-iterable"),
        }
    }

    // Range loop: the element starts at the lower bound and the loop exits
    // once it passes the upper bound, so both endpoints are produced.
    fn emit_for_range(&mut self, stmt: &ForStmt) -> Result<()> {
        let labels = self.branch(stmt.id)?.labels.clone();
        let (begin, cont, end) = (&labels[0], &labels[1], &labels[2]);
        let elem = self.qword_slot(stmt.elem.id)?;
        let index = self.qword_slot(stmt.index.id)?;

        let value = stmt.iter.value.as_ref().expect("loop iterables are parsed");
        self.emit_expr(value)?;
        self.store_decl(stmt.iter.id)?;
        self.emit("mov rcx, qword ptr [rax]");
        self.emit(format!("mov {}, rcx", elem));
        self.emit(format!("mov {}, 0", index));

        self.label(begin);
        self.load_decl(stmt.iter.id)?;
        self.emit("mov rcx, qword ptr [rax+8]");
        self.emit(format!("mov rax, {}", elem));
        self.emit("cmp rax, rcx");
        self.emit(format!("jg {}", end));
        for s in &stmt.body.stmts {
            self.emit_stmt(s)?;
        }
        self.label(cont);
        self.emit(format!("add {}, 1", elem));
        self.emit(format!("add {}, 1", index));
        self.emit(format!("jmp {}", begin));
        self.label(end);
        Ok(())
    }

    fn emit_for_array(&mut self, stmt: &ForStmt, len: usize, elem_size: usize) -> Result<()> {
        let labels = self.branch(stmt.id)?.labels.clone();
        let (begin, cont, end) = (&labels[0], &labels[1], &labels[2]);
        let index = self.qword_slot(stmt.index.id)?;
        let iter = self.qword_slot(stmt.iter.id)?;

        let value = stmt.iter.value.as_ref().expect("loop iterables are parsed");
        self.emit_expr(value)?;
        self.store_decl(stmt.iter.id)?;
        self.emit(format!("mov {}, 0", index));

        self.label(begin);
        self.emit(format!("mov rax, {}", index));
        self.emit(format!("cmp rax, {}", len));
        self.emit(format!("je {}", end));
        self.emit(format!("mov rcx, {}", iter));
        match elem_size {
            1 => self.emit("movzx rax, byte ptr [rcx+rax]"),
            _ => self.emit("mov rax, qword ptr [rcx+rax*8]"),
        }
        self.store_decl(stmt.elem.id)?;
        for s in &stmt.body.stmts {
            self.emit_stmt(s)?;
        }
        self.label(cont);
        self.emit(format!("add {}, 1", index));
        self.emit(format!("jmp {}", begin));
        self.label(end);
        Ok(())
    }

    // `continue` goes to a while loop's begin label or a for loop's continue
    // label; `break` goes to the loop's end label.
    fn emit_loop_jump(&mut self, id: NodeId, is_break: bool) -> Result<()> {
        let target = match self.meta.refs.get(&id) {
            Some(Entity::While(w)) => {
                let labels = &self.branch(*w)?.labels;
                if is_break { &labels[1] } else { &labels[0] }
            }
            Some(Entity::For(f)) => {
                let labels = &self.branch(*f)?.labels;
                if is_break { &labels[2] } else { &labels[1] }
            }
            _ => return err("internal: loop jump outside a loop"),
        };
        let target = target.clone();
        self.emit(format!("jmp {}", target));
        Ok(())
    }

    fn emit_return_stmt(&mut self, stmt: &ReturnStmt) -> Result<()> {
        let end = match self.meta.refs.get(&stmt.id) {
            Some(Entity::Func(f)) | Some(Entity::Lit(f)) => self.branch(*f)?.labels[0].clone(),
            _ => return err("internal: return outside a function"),
        };
        if let Some(value) = &stmt.value {
            self.emit_expr(value)?;
        }
        self.emit(format!("jmp {}", end));
        Ok(())
    }

    fn emit_assign_stmt(&mut self, stmt: &AssignStmt) -> Result<()> {
        if stmt.op == TokenKind::Assign {
            self.emit_expr(&stmt.value)?;
            return self.emit_store(&stmt.target);
        }
        // Compound assignment reads the target, applies the operator, and
        // stores back through the same lvalue path.
        self.emit_expr(&stmt.value)?;
        self.emit("push rax");
        self.emit_expr(&stmt.target)?;
        self.emit("pop rcx");
        match stmt.op {
            TokenKind::AddAssign => self.emit("add rax, rcx"),
            TokenKind::SubAssign => self.emit("sub rax, rcx"),
            TokenKind::MulAssign => self.emit("imul rax, rcx"),
            TokenKind::DivAssign => {
                self.emit("cqo");
                self.emit("idiv rcx");
            }
            TokenKind::ModAssign => {
                self.emit("cqo");
                self.emit("idiv rcx");
                self.emit("mov rax, rdx");
            }
            _ => return err("internal: unknown assignment operator"),
        }
        self.emit_store(&stmt.target)
    }

    // Stores rax through an assignment target.
    fn emit_store(&mut self, target: &Expr) -> Result<()> {
        match target {
            Expr::Ident(ident) => match self.meta.refs.get(&ident.id) {
                Some(Entity::Var(decl)) => self.store_decl(*decl),
                _ => err("internal: assignment to a non-variable"),
            },
            Expr::Index(idx) => {
                let size = size_of(self.expr_type(idx.id)?);
                self.emit("push rax");
                self.emit_expr(&idx.index)?;
                self.emit("push rax");
                self.emit_expr(&idx.base)?;
                self.emit("pop rcx");
                self.emit("pop rdx");
                match size {
                    1 => self.emit("mov byte ptr [rax+rcx], dl"),
                    _ => self.emit("mov qword ptr [rax+rcx*8], rdx"),
                }
                Ok(())
            }
            _ => err("internal: invalid assignment target"),
        }
    }

    // ----------------------------------------------------------------
    // Expr

    fn emit_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Prefix(e) => {
                self.emit_expr(&e.right)?;
                match e.op {
                    TokenKind::Bang => self.emit("xor rax, 1"),
                    TokenKind::Minus => self.emit("neg rax"),
                    _ => return err("internal: unknown prefix operator"),
                }
                Ok(())
            }
            Expr::Infix(e) => self.emit_infix_expr(e),
            Expr::Index(e) => {
                let size = size_of(self.expr_type(e.id)?);
                self.emit_expr(&e.index)?;
                self.emit("push rax");
                self.emit_expr(&e.base)?;
                self.emit("pop rcx");
                match size {
                    1 => self.emit("movzx rax, byte ptr [rax+rcx]"),
                    _ => self.emit("mov rax, qword ptr [rax+rcx*8]"),
                }
                Ok(())
            }
            Expr::Call(e) => self.emit_call_expr(e),
            Expr::LibCall(e) => self.emit_lib_call_expr(e),
            Expr::Ident(e) => self.emit_ident(e),
            Expr::Int(e) => {
                self.emit(format!("mov rax, {}", e.value));
                Ok(())
            }
            Expr::Bool(e) => {
                self.emit(format!("mov rax, {}", if e.value { 1 } else { 0 }));
                Ok(())
            }
            Expr::Str(e) => {
                let label = match self.layout.strs.get(&e.id) {
                    Some(s) => s.label.clone(),
                    None => return err("internal: string without a label"),
                };
                self.emit(format!("mov rax, offset flat:{}", label));
                Ok(())
            }
            Expr::Range(e) => self.emit_range_lit(e),
            Expr::Array(e) => self.emit_array_lit(e),
            Expr::ArrayShort(e) => self.emit_array_short_lit(e),
            Expr::Func(lit) => {
                let label = self.fun(lit.id)?.label.clone();
                self.emit(format!("mov rax, offset flat:{}", label));
                Ok(())
            }
        }
    }

    fn emit_infix_expr(&mut self, e: &InfixExpr) -> Result<()> {
        match e.op {
            // Short circuit: the left operand alone may decide the result.
            TokenKind::AndAnd | TokenKind::OrOr => {
                let end = self.branch(e.id)?.labels[0].clone();
                self.emit_expr(&e.left)?;
                self.emit("cmp rax, 0");
                match e.op {
                    TokenKind::AndAnd => self.emit(format!("je {}", end)),
                    _ => self.emit(format!("jne {}", end)),
                }
                self.emit_expr(&e.right)?;
                self.label(&end);
                Ok(())
            }
            TokenKind::In => self.emit_in_expr(e),
            _ => {
                self.emit_expr(&e.right)?;
                self.emit("push rax");
                self.emit_expr(&e.left)?;
                self.emit("pop rcx");
                match e.op {
                    TokenKind::Plus => self.emit("add rax, rcx"),
                    TokenKind::Minus => self.emit("sub rax, rcx"),
                    TokenKind::Star => self.emit("imul rax, rcx"),
                    TokenKind::Slash => {
                        self.emit("cqo");
                        self.emit("idiv rcx");
                    }
                    TokenKind::Percent => {
                        self.emit("cqo");
                        self.emit("idiv rcx");
                        self.emit("mov rax, rdx");
                    }
                    TokenKind::Eq
                    | TokenKind::Ne
                    | TokenKind::Lt
                    | TokenKind::Le
                    | TokenKind::Gt
                    | TokenKind::Ge => {
                        self.emit("cmp rax, rcx");
                        self.emit(format!("{} al", setcc(e.op)));
                        self.emit("movzx rax, al");
                    }
                    _ => return err("internal: unknown infix operator"),
                }
                Ok(())
            }
        }
    }

    // Membership test. Over a range: compare against both bounds. Over an
    // array: scan every element with the preallocated labels.
    fn emit_in_expr(&mut self, e: &InfixExpr) -> Result<()> {
        let labels = self.branch(e.id)?.labels.clone();
        self.emit_expr(&e.right)?;
        self.emit("push rax");
        self.emit_expr(&e.left)?;
        self.emit("pop rcx");
        let right_ty = self.expr_type(e.right.id())?.clone();
        match right_ty {
            Type::Range => {
                let (no, end) = (&labels[0], &labels[1]);
                self.emit("cmp rax, qword ptr [rcx]");
                self.emit(format!("jl {}", no));
                self.emit("cmp rax, qword ptr [rcx+8]");
                self.emit(format!("jg {}", no));
                self.emit("mov rax, 1");
                self.emit(format!("jmp {}", end));
                self.label(no);
                self.emit("mov rax, 0");
                self.label(end);
            }
            Type::Array { len, elem } => {
                let elem_size = size_of(&elem);
                let (begin, no, end) = (&labels[0], &labels[1], &labels[2]);
                self.emit("mov rdx, 0");
                self.label(begin);
                self.emit(format!("cmp rdx, {}", len));
                self.emit(format!("je {}", no));
                self.emit("add rdx, 1");
                match elem_size {
                    1 => self.emit("cmp byte ptr [rcx+rdx-1], al"),
                    _ => self.emit("cmp qword ptr [rcx+rdx*8-8], rax"),
                }
                self.emit(format!("jne {}", begin));
                self.emit("mov rax, 1");
                self.emit(format!("jmp {}", end));
                self.label(no);
                self.emit("mov rax, 0");
                self.label(end);
            }
            _ => return err("internal: in over a non-iterable"),
        }
        Ok(())
    }

    // Arguments are evaluated left to right onto the stack, then popped into
    // the argument registers in reverse.
    fn emit_args(&mut self, args: &[Expr]) -> Result<()> {
        if args.len() > ARG_REGS.len() {
            return err("More than 6 arguments are not supported");
        }
        for arg in args {
            self.emit_expr(arg)?;
            self.emit("push rax");
        }
        for i in (0..args.len()).rev() {
            self.emit(format!("pop {}", ARG_REGS[i]));
        }
        Ok(())
    }

    fn emit_call_expr(&mut self, e: &CallExpr) -> Result<()> {
        self.emit_args(&e.args)?;
        // A call through a name that resolves to a function declaration is
        // direct; anything else goes through rax.
        if let Expr::Ident(ident) = e.callee.as_ref() {
            if let Some(Entity::Func(decl)) = self.meta.refs.get(&ident.id) {
                let label = self.fun(*decl)?.label.clone();
                self.emit(format!("call {}", label));
                return Ok(());
            }
        }
        self.emit_expr(&e.callee)?;
        self.emit("call rax");
        Ok(())
    }

    fn emit_lib_call_expr(&mut self, e: &LibCallExpr) -> Result<()> {
        self.emit_args(&e.args)?;
        // printf is variadic; al bounds the number of vector registers used.
        self.emit("mov al, 0");
        self.emit(format!("call {}", e.name));
        Ok(())
    }

    fn emit_ident(&mut self, e: &Ident) -> Result<()> {
        match self.meta.refs.get(&e.id) {
            Some(Entity::Var(decl)) => self.load_decl(*decl),
            Some(Entity::Func(decl)) => {
                let label = self.fun(*decl)?.label.clone();
                self.emit(format!("mov rax, offset flat:{}", label));
                Ok(())
            }
            _ => err("internal: unresolved identifier"),
        }
    }

    // A range literal stores its evaluated bounds into the preallocated
    // 16-byte record and yields the record's address.
    fn emit_range_lit(&mut self, e: &RangeLit) -> Result<()> {
        self.emit_expr(&e.upper)?;
        self.emit("push rax");
        self.emit_expr(&e.lower)?;
        self.emit("pop rcx");
        if let Some(lrng) = self.layout.lrngs.get(&e.id) {
            let offset = lrng.offset;
            self.emit(format!("mov qword ptr [rbp-{}], rax", offset));
            self.emit(format!("mov qword ptr [rbp-{}], rcx", offset - 8));
            self.emit(format!("lea rax, [rbp-{}]", offset));
        } else if let Some(grng) = self.layout.grngs.get(&e.id) {
            let label = grng.label.clone();
            self.emit(format!("mov qword ptr {}[rip], rax", label));
            self.emit(format!("mov qword ptr {}[rip+8], rcx", label));
            self.emit(format!("mov rax, offset flat:{}", label));
        } else {
            return err("internal: range without storage");
        }
        Ok(())
    }

    fn emit_array_lit(&mut self, e: &ArrayLit) -> Result<()> {
        if let Some(larr) = self.layout.larrs.get(&e.id) {
            let (offset, elem_size) = (larr.offset, larr.elem_size);
            for (i, elem) in e.elems.iter().enumerate() {
                self.emit_expr(elem)?;
                let at = offset - i * elem_size;
                match elem_size {
                    1 => self.emit(format!("mov byte ptr [rbp-{}], al", at)),
                    _ => self.emit(format!("mov qword ptr [rbp-{}], rax", at)),
                }
            }
            self.emit(format!("lea rax, [rbp-{}]", offset));
        } else if let Some(garr) = self.layout.garrs.get(&e.id) {
            let (label, elem_size) = (garr.label.clone(), garr.elem_size);
            for (i, elem) in e.elems.iter().enumerate() {
                self.emit_expr(elem)?;
                let at = i * elem_size;
                match elem_size {
                    1 => self.emit(format!("mov byte ptr {}[rip+{}], al", label, at)),
                    _ => self.emit(format!("mov qword ptr {}[rip+{}], rax", label, at)),
                }
            }
            self.emit(format!("mov rax, offset flat:{}", label));
        } else {
            return err("internal: array without storage");
        }
        Ok(())
    }

    // The short form evaluates its fill value once and copies it into every
    // slot; with no value the storage is left as is.
    fn emit_array_short_lit(&mut self, e: &ArrayShortLit) -> Result<()> {
        if let Some(larr) = self.layout.larrs.get(&e.id) {
            let (offset, len, elem_size) = (larr.offset, larr.len, larr.elem_size);
            if let Some(value) = &e.value {
                self.emit_expr(value)?;
                for i in 0..len {
                    let at = offset - i * elem_size;
                    match elem_size {
                        1 => self.emit(format!("mov byte ptr [rbp-{}], al", at)),
                        _ => self.emit(format!("mov qword ptr [rbp-{}], rax", at)),
                    }
                }
            }
            self.emit(format!("lea rax, [rbp-{}]", offset));
        } else if let Some(garr) = self.layout.garrs.get(&e.id) {
            let (label, len, elem_size) = (garr.label.clone(), garr.len, garr.elem_size);
            if let Some(value) = &e.value {
                self.emit_expr(value)?;
                for i in 0..len {
                    let at = i * elem_size;
                    match elem_size {
                        1 => self.emit(format!("mov byte ptr {}[rip+{}], al", label, at)),
                        _ => self.emit(format!("mov qword ptr {}[rip+{}], rax", label, at)),
                    }
                }
            }
            self.emit(format!("mov rax, offset flat:{}", label));
        } else {
            return err("internal: array without storage");
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // Variable access

    fn store_decl(&mut self, id: NodeId) -> Result<()> {
        if let Some(lvar) = self.layout.lvars.get(&id) {
            let line = match lvar.size {
                1 => format!("mov byte ptr [rbp-{}], al", lvar.offset),
                _ => format!("mov qword ptr [rbp-{}], rax", lvar.offset),
            };
            self.emit(line);
            Ok(())
        } else if let Some(gvar) = self.layout.gvars.get(&id) {
            let line = match gvar.size {
                1 => format!("mov byte ptr {}[rip], al", gvar.label),
                _ => format!("mov qword ptr {}[rip], rax", gvar.label),
            };
            self.emit(line);
            Ok(())
        } else {
            err("internal: variable without storage")
        }
    }

    fn load_decl(&mut self, id: NodeId) -> Result<()> {
        if let Some(lvar) = self.layout.lvars.get(&id) {
            let line = match lvar.size {
                1 => format!("movzx rax, byte ptr [rbp-{}]", lvar.offset),
                _ => format!("mov rax, qword ptr [rbp-{}]", lvar.offset),
            };
            self.emit(line);
            Ok(())
        } else if let Some(gvar) = self.layout.gvars.get(&id) {
            let line = match gvar.size {
                1 => format!("movzx rax, byte ptr {}[rip]", gvar.label),
                _ => format!("mov rax, qword ptr {}[rip]", gvar.label),
            };
            self.emit(line);
            Ok(())
        } else {
            err("internal: variable without storage")
        }
    }

    // Memory operand for an 8-byte variable slot, usable directly in
    // add/cmp/mov.
    fn qword_slot(&self, id: NodeId) -> Result<String> {
        if let Some(lvar) = self.layout.lvars.get(&id) {
            Ok(format!("qword ptr [rbp-{}]", lvar.offset))
        } else if let Some(gvar) = self.layout.gvars.get(&id) {
            Ok(format!("qword ptr {}[rip]", gvar.label))
        } else {
            err("internal: variable without storage")
        }
    }
}

fn collect_fns_stmts<'a>(stmts: &'a [Stmt], out: &mut Vec<FnNode<'a>>) {
    for stmt in stmts {
        collect_fns_stmt(stmt, out);
    }
}

fn collect_fns_stmt<'a>(stmt: &'a Stmt, out: &mut Vec<FnNode<'a>>) {
    match stmt {
        Stmt::Block(block) => collect_fns_stmts(&block.stmts, out),
        Stmt::Var(var) => {
            for decl in &var.decls {
                if let Some(value) = &decl.value {
                    collect_fns_expr(value, out);
                }
            }
        }
        Stmt::Func(decl) => {
            out.push(FnNode::Decl(decl));
            collect_fns_stmts(&decl.body.stmts, out);
        }
        Stmt::If(stmt) => {
            collect_fns_expr(&stmt.cond, out);
            collect_fns_stmts(&stmt.body.stmts, out);
            if let Some(alt) = &stmt.alt {
                collect_fns_stmt(alt, out);
            }
        }
        Stmt::While(stmt) => {
            collect_fns_expr(&stmt.cond, out);
            collect_fns_stmts(&stmt.body.stmts, out);
        }
        Stmt::For(stmt) => {
            if let Some(value) = &stmt.iter.value {
                collect_fns_expr(value, out);
            }
            collect_fns_stmts(&stmt.body.stmts, out);
        }
        Stmt::Return(stmt) => {
            if let Some(value) = &stmt.value {
                collect_fns_expr(value, out);
            }
        }
        Stmt::Assign(stmt) => {
            collect_fns_expr(&stmt.target, out);
            collect_fns_expr(&stmt.value, out);
        }
        Stmt::Expr(stmt) => collect_fns_expr(&stmt.expr, out),
        Stmt::Continue(_) | Stmt::Break(_) => {}
    }
}

fn collect_fns_expr<'a>(expr: &'a Expr, out: &mut Vec<FnNode<'a>>) {
    match expr {
        Expr::Prefix(e) => collect_fns_expr(&e.right, out),
        Expr::Infix(e) => {
            collect_fns_expr(&e.left, out);
            collect_fns_expr(&e.right, out);
        }
        Expr::Index(e) => {
            collect_fns_expr(&e.base, out);
            collect_fns_expr(&e.index, out);
        }
        Expr::Call(e) => {
            collect_fns_expr(&e.callee, out);
            for arg in &e.args {
                collect_fns_expr(arg, out);
            }
        }
        Expr::LibCall(e) => {
            for arg in &e.args {
                collect_fns_expr(arg, out);
            }
        }
        Expr::Range(e) => {
            collect_fns_expr(&e.lower, out);
            collect_fns_expr(&e.upper, out);
        }
        Expr::Array(e) => {
            for elem in &e.elems {
                collect_fns_expr(elem, out);
            }
        }
        Expr::ArrayShort(e) => {
            if let Some(value) = &e.value {
                collect_fns_expr(value, out);
            }
        }
        Expr::Func(lit) => {
            out.push(FnNode::Lit(lit));
            collect_fns_stmts(&lit.body.stmts, out);
        }
        Expr::Ident(_) | Expr::Int(_) | Expr::Bool(_) | Expr::Str(_) => {}
    }
}

// C-style escaping for `.string` directives. Printable ASCII passes through;
// the common escapes keep their mnemonic form and other control bytes become
// octal.
fn escape_asm(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}
