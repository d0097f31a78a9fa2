//! Recursive-descent Pratt parser over the scanner's output.

use tern_syntax::ast::*;
use tern_syntax::error::{Error, Result, Stage};
use tern_syntax::token::{Pos, Token, TokenKind};
use tern_syntax::types::Type;

fn err_at<T>(pos: Pos, msg: impl Into<String>) -> Result<T> {
    Err(Error::at(Stage::Parse, pos, msg))
}

// Precedence ladder, low to high.
const LOWEST: u8 = 0;
const OR: u8 = 1;
const AND: u8 = 2;
const EQUAL: u8 = 3;
const LESSGREATER: u8 = 4;
const SUM: u8 = 5;
const PRODUCT: u8 = 6;
const IN: u8 = 7;
const BETWEEN: u8 = 8;
const PREFIX: u8 = 9;
const SUFFIX: u8 = 10;

fn prec_of(kind: TokenKind) -> u8 {
    match kind {
        TokenKind::OrOr => OR,
        TokenKind::AndAnd => AND,
        TokenKind::Eq | TokenKind::Ne => EQUAL,
        TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => LESSGREATER,
        TokenKind::Plus | TokenKind::Minus => SUM,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => PRODUCT,
        TokenKind::In => IN,
        TokenKind::DotDot => BETWEEN,
        TokenKind::LBrack | TokenKind::LParen => SUFFIX,
        _ => LOWEST,
    }
}

fn is_assign_op(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Assign
            | TokenKind::AddAssign
            | TokenKind::SubAssign
            | TokenKind::MulAssign
            | TokenKind::DivAssign
            | TokenKind::ModAssign
    )
}

fn begins_type(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Int
            | TokenKind::Bool
            | TokenKind::Str
            | TokenKind::Range
            | TokenKind::LBrack
            | TokenKind::LParen
    )
}

/// Names callable only as privileged C library functions.
pub const LIB_FUNCS: [&str; 3] = ["puts", "printf", "sleep"];

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_id: NodeId,
}

impl Parser {
    /// Creates a parser over a token vector ending with `Eof`.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            next_id: 0,
        }
    }

    fn id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn tk(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn next(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn peek_tk(&self) -> Result<&Token> {
        if self.tk().kind == TokenKind::Eof {
            return err_at(self.tk().pos, "Unexpected EOF");
        }
        Ok(&self.tokens[self.pos + 1])
    }

    fn look_prec(&self) -> u8 {
        prec_of(self.tk().kind)
    }

    fn expect(&self, kind: TokenKind) -> Result<()> {
        if self.tk().kind != kind {
            return self.unexpected(&format!("Expected {}, but got {}", kind, self.tk().kind));
        }
        Ok(())
    }

    fn consume(&mut self, kind: TokenKind) -> Result<()> {
        self.expect(kind)?;
        self.next();
        Ok(())
    }

    // Accepts `,` or the list terminator.
    fn consume_comma(&mut self, terminator: TokenKind) -> Result<()> {
        match self.tk().kind {
            TokenKind::Comma => {
                self.next();
                Ok(())
            }
            k if k == terminator => Ok(()),
            got => self.unexpected(&format!("Expected , or {}, but got {}", terminator, got)),
        }
    }

    fn unexpected<T>(&self, msg: &str) -> Result<T> {
        err_at(self.tk().pos, msg)
    }

    // ----------------------------------------------------------------
    // Program

    pub fn parse_program(&mut self) -> Result<Program> {
        let mut stmts = Vec::new();
        while self.tk().kind != TokenKind::Eof {
            stmts.push(self.parse_stmt()?);
        }
        Ok(Program { stmts })
    }

    // ----------------------------------------------------------------
    // Stmt

    fn parse_stmt(&mut self) -> Result<Stmt> {
        match self.tk().kind {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block_stmt()?)),
            TokenKind::Var => self.parse_var_stmt(),
            TokenKind::Func => {
                self.next();
                Ok(Stmt::Func(self.parse_func_decl()?))
            }
            TokenKind::If => Ok(Stmt::If(self.parse_if_stmt()?)),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::Continue => self.parse_continue_stmt(),
            TokenKind::Break => self.parse_break_stmt(),
            TokenKind::Return => self.parse_return_stmt(),
            _ => self.parse_assign_or_expr_stmt(),
        }
    }

    fn parse_block_stmt(&mut self) -> Result<BlockStmt> {
        let id = self.id();
        let pos = self.tk().pos;
        self.consume(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while self.tk().kind != TokenKind::RBrace {
            if self.tk().kind == TokenKind::Eof {
                return self.unexpected("Expected }, but got EOF");
            }
            stmts.push(self.parse_stmt()?);
        }
        self.next();
        Ok(BlockStmt { id, pos, stmts })
    }

    fn parse_var_stmt(&mut self) -> Result<Stmt> {
        let id = self.id();
        let pos = self.tk().pos;
        self.next();
        let mut decls = Vec::new();
        while self.tk().kind != TokenKind::Semicolon {
            let decl = self.parse_var_decl()?;
            if decl.value.is_none() {
                return err_at(decl.pos, format!("{} has no initial value", decl.name));
            }
            decls.push(decl);
            self.consume_comma(TokenKind::Semicolon)?;
        }
        self.next();
        Ok(Stmt::Var(VarStmt { id, pos, decls }))
    }

    fn parse_if_stmt(&mut self) -> Result<IfStmt> {
        let id = self.id();
        let pos = self.tk().pos;
        self.next();
        let cond = self.parse_expr_prec(LOWEST)?;
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block_stmt()?;
        if self.tk().kind != TokenKind::Else {
            return Ok(IfStmt {
                id,
                pos,
                cond,
                body,
                alt: None,
            });
        }
        self.next();
        let alt = match self.tk().kind {
            TokenKind::LBrace => Stmt::Block(self.parse_block_stmt()?),
            TokenKind::If => Stmt::If(self.parse_if_stmt()?),
            got => return self.unexpected(&format!("Expected {{ or if, but got {}", got)),
        };
        Ok(IfStmt {
            id,
            pos,
            cond,
            body,
            alt: Some(Box::new(alt)),
        })
    }

    fn parse_while_stmt(&mut self) -> Result<Stmt> {
        let id = self.id();
        let pos = self.tk().pos;
        self.next();
        let cond = self.parse_expr_prec(LOWEST)?;
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block_stmt()?;
        Ok(Stmt::While(WhileStmt {
            id,
            pos,
            cond,
            body,
        }))
    }

    fn parse_for_stmt(&mut self) -> Result<Stmt> {
        let id = self.id();
        let pos = self.tk().pos;
        self.next();
        self.expect(TokenKind::Ident)?;
        let elem = VarDecl {
            id: self.id(),
            pos: self.tk().pos,
            name: self.tk().literal.clone(),
            ty: None,
            value: None,
        };
        self.next();
        // The `, i` index slot is an implicit unnamed variable when absent.
        let index = if self.tk().kind == TokenKind::Comma {
            self.next();
            self.expect(TokenKind::Ident)?;
            let decl = VarDecl {
                id: self.id(),
                pos: self.tk().pos,
                name: self.tk().literal.clone(),
                ty: None,
                value: None,
            };
            self.next();
            decl
        } else {
            VarDecl {
                id: self.id(),
                pos: elem.pos,
                name: String::new(),
                ty: None,
                value: None,
            }
        };
        self.consume(TokenKind::In)?;
        let iter_id = self.id();
        let iter_pos = self.tk().pos;
        let iter = VarDecl {
            id: iter_id,
            pos: iter_pos,
            name: String::new(),
            ty: None,
            value: Some(self.parse_expr_prec(LOWEST)?),
        };
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_block_stmt()?;
        Ok(Stmt::For(ForStmt {
            id,
            pos,
            elem,
            index,
            iter,
            body,
        }))
    }

    fn parse_continue_stmt(&mut self) -> Result<Stmt> {
        let id = self.id();
        let pos = self.tk().pos;
        self.next();
        self.consume(TokenKind::Semicolon)?;
        Ok(Stmt::Continue(ContinueStmt { id, pos }))
    }

    fn parse_break_stmt(&mut self) -> Result<Stmt> {
        let id = self.id();
        let pos = self.tk().pos;
        self.next();
        self.consume(TokenKind::Semicolon)?;
        Ok(Stmt::Break(BreakStmt { id, pos }))
    }

    fn parse_return_stmt(&mut self) -> Result<Stmt> {
        let id = self.id();
        let pos = self.tk().pos;
        self.next();
        if self.tk().kind == TokenKind::Semicolon {
            self.next();
            return Ok(Stmt::Return(ReturnStmt {
                id,
                pos,
                value: None,
            }));
        }
        let value = self.parse_expr_prec(LOWEST)?;
        self.consume(TokenKind::Semicolon)?;
        Ok(Stmt::Return(ReturnStmt {
            id,
            pos,
            value: Some(value),
        }))
    }

    fn parse_assign_or_expr_stmt(&mut self) -> Result<Stmt> {
        let id = self.id();
        let pos = self.tk().pos;
        let expr = self.parse_expr_prec(LOWEST)?;
        if is_assign_op(self.tk().kind) {
            match expr {
                Expr::Ident(_) | Expr::Index(_) => {}
                _ => return err_at(expr.pos(), "Invalid target in assignment"),
            }
            let op = self.tk().kind;
            self.next();
            let value = self.parse_expr_prec(LOWEST)?;
            self.consume(TokenKind::Semicolon)?;
            return Ok(Stmt::Assign(AssignStmt {
                id,
                pos,
                op,
                target: expr,
                value,
            }));
        }
        self.consume(TokenKind::Semicolon)?;
        Ok(Stmt::Expr(ExprStmt { id, pos, expr }))
    }

    // ----------------------------------------------------------------
    // Expr

    /// Parses a single expression (used by tests and the debug dump).
    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_expr_prec(LOWEST)
    }

    fn parse_expr_prec(&mut self, prec: u8) -> Result<Expr> {
        let mut expr = match self.tk().kind {
            TokenKind::Bang | TokenKind::Minus => self.parse_prefix_expr()?,
            TokenKind::Ident => self.parse_ident()?,
            TokenKind::Number => self.parse_int_lit()?,
            TokenKind::True | TokenKind::False => self.parse_bool_lit()?,
            TokenKind::Quoted => self.parse_string_lit()?,
            TokenKind::LBrack => self.parse_array_lit_or_short()?,
            TokenKind::LParen => self.parse_func_lit_or_grouped()?,
            got => return self.unexpected(&format!("Unexpected {}", got)),
        };
        while self.look_prec() > prec {
            expr = match self.tk().kind {
                TokenKind::LBrack => self.parse_index_expr(expr)?,
                TokenKind::LParen => self.parse_call_expr(expr)?,
                TokenKind::DotDot => self.parse_range_lit(expr)?,
                _ => self.parse_infix_expr(expr)?,
            };
        }
        Ok(expr)
    }

    fn parse_prefix_expr(&mut self) -> Result<Expr> {
        let id = self.id();
        let pos = self.tk().pos;
        let op = self.tk().kind;
        self.next();
        let right = self.parse_expr_prec(PREFIX)?;
        Ok(Expr::Prefix(PrefixExpr {
            id,
            pos,
            op,
            right: Box::new(right),
        }))
    }

    fn parse_infix_expr(&mut self, left: Expr) -> Result<Expr> {
        let id = self.id();
        let pos = self.tk().pos;
        let op = self.tk().kind;
        let prec = self.look_prec();
        self.next();
        let right = self.parse_expr_prec(prec)?;
        Ok(Expr::Infix(InfixExpr {
            id,
            pos,
            op,
            left: Box::new(left),
            right: Box::new(right),
        }))
    }

    fn parse_index_expr(&mut self, left: Expr) -> Result<Expr> {
        let id = self.id();
        let pos = self.tk().pos;
        self.next();
        let index = self.parse_expr_prec(LOWEST)?;
        self.consume(TokenKind::RBrack)?;
        Ok(Expr::Index(IndexExpr {
            id,
            pos,
            base: Box::new(left),
            index: Box::new(index),
        }))
    }

    // `ident(..)` names either a library function or an ordinary callee.
    fn parse_call_expr(&mut self, left: Expr) -> Result<Expr> {
        let id = self.id();
        let pos = self.tk().pos;
        self.next();
        let mut args = Vec::new();
        while self.tk().kind != TokenKind::RParen {
            args.push(self.parse_expr_prec(LOWEST)?);
            self.consume_comma(TokenKind::RParen)?;
        }
        self.next();
        if let Expr::Ident(ident) = &left {
            if LIB_FUNCS.contains(&ident.name.as_str()) {
                return Ok(Expr::LibCall(LibCallExpr {
                    id,
                    pos,
                    name: ident.name.clone(),
                    args,
                }));
            }
        }
        Ok(Expr::Call(CallExpr {
            id,
            pos,
            callee: Box::new(left),
            args,
        }))
    }

    fn parse_ident(&mut self) -> Result<Expr> {
        let id = self.id();
        let pos = self.tk().pos;
        let name = self.tk().literal.clone();
        self.next();
        Ok(Expr::Ident(Ident { id, pos, name }))
    }

    fn parse_int_lit(&mut self) -> Result<Expr> {
        let id = self.id();
        let pos = self.tk().pos;
        let value = match self.tk().literal.parse::<i64>() {
            Ok(v) => v,
            Err(_) => {
                return self.unexpected(&format!(
                    "Cannot parse {} as integer",
                    self.tk().literal
                ));
            }
        };
        self.next();
        Ok(Expr::Int(IntLit { id, pos, value }))
    }

    fn parse_bool_lit(&mut self) -> Result<Expr> {
        let id = self.id();
        let pos = self.tk().pos;
        let value = self.tk().kind == TokenKind::True;
        self.next();
        Ok(Expr::Bool(BoolLit { id, pos, value }))
    }

    fn parse_string_lit(&mut self) -> Result<Expr> {
        let id = self.id();
        let pos = self.tk().pos;
        let value = dequote(&self.tk().literal, pos)?;
        self.next();
        Ok(Expr::Str(StringLit { id, pos, value }))
    }

    fn parse_range_lit(&mut self, lower: Expr) -> Result<Expr> {
        let id = self.id();
        let pos = self.tk().pos;
        self.next();
        let upper = self.parse_expr_prec(BETWEEN)?;
        Ok(Expr::Range(RangeLit {
            id,
            pos,
            lower: Box::new(lower),
            upper: Box::new(upper),
        }))
    }

    // `[` opens either an element list or the `[len]Elem(value?)` short
    // form. One parsed expression plus two tokens of lookahead decide.
    fn parse_array_lit_or_short(&mut self) -> Result<Expr> {
        let id = self.id();
        let pos = self.tk().pos;
        self.next();
        if self.tk().kind == TokenKind::RBrack {
            return self.unexpected("Empty array literal (use [0]T() for an empty array)");
        }
        let first = self.parse_expr_prec(LOWEST)?;
        if self.tk().kind == TokenKind::RBrack && begins_type(self.peek_tk()?.kind) {
            let len = match &first {
                Expr::Int(lit) if lit.value >= 0 => lit.value as usize,
                _ => return err_at(first.pos(), "Array length must be non-negative number"),
            };
            self.next();
            let elem_ty = self.parse_type()?;
            self.consume(TokenKind::LParen)?;
            let value = if self.tk().kind != TokenKind::RParen {
                let v = self.parse_expr_prec(LOWEST)?;
                self.expect(TokenKind::RParen)?;
                Some(Box::new(v))
            } else {
                None
            };
            self.next();
            return Ok(Expr::ArrayShort(ArrayShortLit {
                id,
                pos,
                len,
                elem_ty,
                value,
            }));
        }
        let mut elems = vec![first];
        self.consume_comma(TokenKind::RBrack)?;
        while self.tk().kind != TokenKind::RBrack {
            elems.push(self.parse_expr_prec(LOWEST)?);
            self.consume_comma(TokenKind::RBrack)?;
        }
        self.next();
        Ok(Expr::Array(ArrayLit { id, pos, elems }))
    }

    // `(` opens a function literal when the next token closes it right away
    // or when `ident :` follows; otherwise it is a grouped expression.
    fn parse_func_lit_or_grouped(&mut self) -> Result<Expr> {
        let id = self.id();
        let pos = self.tk().pos;
        self.next();
        if self.tk().kind != TokenKind::RParen && self.peek_tk()?.kind != TokenKind::Colon {
            let expr = self.parse_expr_prec(LOWEST)?;
            self.consume(TokenKind::RParen)?;
            return Ok(expr);
        }
        let params = self.parse_params(TokenKind::RParen)?;
        self.next();
        self.consume(TokenKind::Arrow)?;
        let ret = if self.tk().kind != TokenKind::LBrace {
            let ty = self.parse_type()?;
            self.expect(TokenKind::LBrace)?;
            Some(ty)
        } else {
            None
        };
        let body = self.parse_block_stmt()?;
        Ok(Expr::Func(FuncLit {
            id,
            pos,
            params,
            ret,
            body,
        }))
    }

    // ----------------------------------------------------------------
    // Decl

    fn parse_var_decl(&mut self) -> Result<VarDecl> {
        self.expect(TokenKind::Ident)?;
        let id = self.id();
        let pos = self.tk().pos;
        let name = self.tk().literal.clone();
        self.next();
        if self.tk().kind != TokenKind::Colon && self.tk().kind != TokenKind::Assign {
            return self.unexpected(&format!("Unexpected {}", self.tk().kind));
        }
        // `x := v` declares with inference; `x: T = v` annotates.
        let ty = if self.tk().kind == TokenKind::Colon {
            self.next();
            if self.tk().kind != TokenKind::Assign {
                Some(self.parse_type()?)
            } else {
                None
            }
        } else {
            None
        };
        let value = if self.tk().kind == TokenKind::Assign {
            self.next();
            Some(self.parse_expr_prec(LOWEST)?)
        } else {
            None
        };
        Ok(VarDecl {
            id,
            pos,
            name,
            ty,
            value,
        })
    }

    fn parse_func_decl(&mut self) -> Result<FuncDecl> {
        self.expect(TokenKind::Ident)?;
        let id = self.id();
        let pos = self.tk().pos;
        let name = self.tk().literal.clone();
        self.next();
        self.consume(TokenKind::LParen)?;
        let params = self.parse_params(TokenKind::RParen)?;
        self.next();
        self.consume(TokenKind::Arrow)?;
        let ret = if self.tk().kind != TokenKind::LBrace {
            let ty = self.parse_type()?;
            self.expect(TokenKind::LBrace)?;
            Some(ty)
        } else {
            None
        };
        let body = self.parse_block_stmt()?;
        Ok(FuncDecl {
            id,
            pos,
            name,
            params,
            ret,
            body,
        })
    }

    // Parameters are var declarations with a mandatory annotation and no
    // initializer.
    fn parse_params(&mut self, terminator: TokenKind) -> Result<Vec<VarDecl>> {
        let mut params = Vec::new();
        while self.tk().kind != terminator {
            let param = self.parse_var_decl()?;
            if param.ty.is_none() {
                return err_at(param.pos, format!("Type of {} must be annotated", param.name));
            }
            if param.value.is_some() {
                return err_at(
                    param.pos,
                    format!("{} cannot have initial value", param.name),
                );
            }
            params.push(param);
            self.consume_comma(terminator)?;
        }
        Ok(params)
    }

    // ----------------------------------------------------------------
    // Type

    fn parse_type(&mut self) -> Result<Type> {
        match self.tk().kind {
            TokenKind::Int => {
                self.next();
                Ok(Type::Int)
            }
            TokenKind::Bool => {
                self.next();
                Ok(Type::Bool)
            }
            TokenKind::Str => {
                self.next();
                Ok(Type::Str)
            }
            TokenKind::Range => {
                self.next();
                Ok(Type::Range)
            }
            TokenKind::LBrack => self.parse_array_type(),
            TokenKind::LParen => self.parse_func_type(),
            got => self.unexpected(&format!("Unexpected {}", got)),
        }
    }

    fn parse_array_type(&mut self) -> Result<Type> {
        self.next();
        self.expect(TokenKind::Number)?;
        let len = match self.tk().literal.parse::<i64>() {
            Ok(v) if v >= 0 => v as usize,
            Ok(_) => return self.unexpected("Array length must be non-negative number"),
            Err(_) => {
                return self.unexpected(&format!(
                    "Cannot parse {} as integer",
                    self.tk().literal
                ));
            }
        };
        self.next();
        self.consume(TokenKind::RBrack)?;
        let elem = self.parse_type()?;
        Ok(Type::Array {
            len,
            elem: Box::new(elem),
        })
    }

    // A void return in a function type is written `-> {}`.
    fn parse_func_type(&mut self) -> Result<Type> {
        self.next();
        let mut params = Vec::new();
        while self.tk().kind != TokenKind::RParen {
            params.push(self.parse_type()?);
            self.consume_comma(TokenKind::RParen)?;
        }
        self.next();
        self.consume(TokenKind::Arrow)?;
        let ret = if self.tk().kind == TokenKind::LBrace {
            self.next();
            self.consume(TokenKind::RBrace)?;
            None
        } else {
            Some(Box::new(self.parse_type()?))
        };
        Ok(Type::Func { params, ret })
    }
}

// Recognized escapes: \a \b \f \n \r \t \v \" \\ — anything else is an
// error.
fn dequote(raw: &str, pos: Pos) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\x0b'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                return err_at(pos, format!("Unknown escape sequence \\{}", other));
            }
            None => return err_at(pos, "Unknown escape sequence \\"),
        }
    }
    Ok(out)
}
