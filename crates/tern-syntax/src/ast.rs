//! AST node definitions and compilation metadata.
//!
//! Nodes own their subtrees; cross-references between nodes (identifier use
//! to declaration, `break`/`continue` to enclosing loop, `return` to
//! enclosing function) are recorded out-of-band in [`Meta`], keyed by the
//! [`NodeId`] the parser assigns to every node. Ids increase in parse order,
//! so iterating an id-ordered map visits nodes in source order.

use std::collections::HashMap;

use crate::token::{Pos, TokenKind};
use crate::types::Type;

/// Stable identity of an AST node, assigned by the parser.
pub type NodeId = u32;

/// Entire program: a sequence of top-level statements.
#[derive(Debug, Clone)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

/// Statements.
#[derive(Debug, Clone)]
pub enum Stmt {
    Block(BlockStmt),
    Var(VarStmt),
    Func(FuncDecl),
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    Continue(ContinueStmt),
    Break(BreakStmt),
    Return(ReturnStmt),
    Assign(AssignStmt),
    Expr(ExprStmt),
}

#[derive(Debug, Clone)]
pub struct BlockStmt {
    pub id: NodeId,
    pub pos: Pos,
    pub stmts: Vec<Stmt>,
}

/// `var a := 1, b: bool = true;`
#[derive(Debug, Clone)]
pub struct VarStmt {
    pub id: NodeId,
    pub pos: Pos,
    pub decls: Vec<VarDecl>,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub id: NodeId,
    pub pos: Pos,
    pub cond: Expr,
    pub body: BlockStmt,
    /// `else { .. }` or a chained `else if`.
    pub alt: Option<Box<Stmt>>,
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub id: NodeId,
    pub pos: Pos,
    pub cond: Expr,
    pub body: BlockStmt,
}

/// `for elem[, index] in iter { .. }`.
///
/// `index` is an implicit unnamed declaration when the `, index` form is
/// absent; `iter` is always an implicit declaration holding the iterated
/// range or array.
#[derive(Debug, Clone)]
pub struct ForStmt {
    pub id: NodeId,
    pub pos: Pos,
    pub elem: VarDecl,
    pub index: VarDecl,
    pub iter: VarDecl,
    pub body: BlockStmt,
}

#[derive(Debug, Clone)]
pub struct ContinueStmt {
    pub id: NodeId,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct BreakStmt {
    pub id: NodeId,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub id: NodeId,
    pub pos: Pos,
    pub value: Option<Expr>,
}

/// `target = value;` or a compound form (`+=` `-=` `*=` `/=` `%=`).
#[derive(Debug, Clone)]
pub struct AssignStmt {
    pub id: NodeId,
    pub pos: Pos,
    pub op: TokenKind,
    pub target: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct ExprStmt {
    pub id: NodeId,
    pub pos: Pos,
    pub expr: Expr,
}

/// Expressions.
#[derive(Debug, Clone)]
pub enum Expr {
    Prefix(PrefixExpr),
    Infix(InfixExpr),
    Index(IndexExpr),
    Call(CallExpr),
    LibCall(LibCallExpr),
    Ident(Ident),
    Int(IntLit),
    Bool(BoolLit),
    Str(StringLit),
    Range(RangeLit),
    Array(ArrayLit),
    ArrayShort(ArrayShortLit),
    Func(FuncLit),
}

impl Expr {
    pub fn id(&self) -> NodeId {
        match self {
            Expr::Prefix(e) => e.id,
            Expr::Infix(e) => e.id,
            Expr::Index(e) => e.id,
            Expr::Call(e) => e.id,
            Expr::LibCall(e) => e.id,
            Expr::Ident(e) => e.id,
            Expr::Int(e) => e.id,
            Expr::Bool(e) => e.id,
            Expr::Str(e) => e.id,
            Expr::Range(e) => e.id,
            Expr::Array(e) => e.id,
            Expr::ArrayShort(e) => e.id,
            Expr::Func(e) => e.id,
        }
    }

    pub fn pos(&self) -> Pos {
        match self {
            Expr::Prefix(e) => e.pos,
            Expr::Infix(e) => e.pos,
            Expr::Index(e) => e.pos,
            Expr::Call(e) => e.pos,
            Expr::LibCall(e) => e.pos,
            Expr::Ident(e) => e.pos,
            Expr::Int(e) => e.pos,
            Expr::Bool(e) => e.pos,
            Expr::Str(e) => e.pos,
            Expr::Range(e) => e.pos,
            Expr::Array(e) => e.pos,
            Expr::ArrayShort(e) => e.pos,
            Expr::Func(e) => e.pos,
        }
    }
}

/// `!e` or `-e`.
#[derive(Debug, Clone)]
pub struct PrefixExpr {
    pub id: NodeId,
    pub pos: Pos,
    pub op: TokenKind,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct InfixExpr {
    pub id: NodeId,
    pub pos: Pos,
    pub op: TokenKind,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct IndexExpr {
    pub id: NodeId,
    pub pos: Pos,
    pub base: Box<Expr>,
    pub index: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub id: NodeId,
    pub pos: Pos,
    pub callee: Box<Expr>,
    pub args: Vec<Expr>,
}

/// A call to one of the privileged C library functions.
#[derive(Debug, Clone)]
pub struct LibCallExpr {
    pub id: NodeId,
    pub pos: Pos,
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct Ident {
    pub id: NodeId,
    pub pos: Pos,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct IntLit {
    pub id: NodeId,
    pub pos: Pos,
    pub value: i64,
}

#[derive(Debug, Clone)]
pub struct BoolLit {
    pub id: NodeId,
    pub pos: Pos,
    pub value: bool,
}

/// A dequoted string literal.
#[derive(Debug, Clone)]
pub struct StringLit {
    pub id: NodeId,
    pub pos: Pos,
    pub value: String,
}

/// `lower..upper`.
#[derive(Debug, Clone)]
pub struct RangeLit {
    pub id: NodeId,
    pub pos: Pos,
    pub lower: Box<Expr>,
    pub upper: Box<Expr>,
}

/// `[e0, e1, ..]` — never empty.
#[derive(Debug, Clone)]
pub struct ArrayLit {
    pub id: NodeId,
    pub pos: Pos,
    pub elems: Vec<Expr>,
}

/// `[len]Elem(value?)` — `len` elements, all initialized to `value` when
/// present.
#[derive(Debug, Clone)]
pub struct ArrayShortLit {
    pub id: NodeId,
    pub pos: Pos,
    pub len: usize,
    pub elem_ty: Type,
    pub value: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub struct FuncLit {
    pub id: NodeId,
    pub pos: Pos,
    pub params: Vec<VarDecl>,
    pub ret: Option<Type>,
    pub body: BlockStmt,
}

/// A variable declaration. Parameters carry a type and no value; loop
/// element/index/iter slots are synthesized by the parser (the index may be
/// unnamed).
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub id: NodeId,
    pub pos: Pos,
    pub name: String,
    pub ty: Option<Type>,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub id: NodeId,
    pub pos: Pos,
    pub name: String,
    pub params: Vec<VarDecl>,
    pub ret: Option<Type>,
    pub body: BlockStmt,
}

/// What a use site resolved to. The id is the declaration (or loop) node the
/// reference points at; the tag records which kind of node that is, so later
/// stages never have to re-discover it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Var(NodeId),
    Func(NodeId),
    Lit(NodeId),
    While(NodeId),
    For(NodeId),
}

/// Side tables filled by semantic analysis and read by code generation.
///
/// The AST itself is never mutated after parsing: resolution writes `refs`,
/// type checking writes `types` and `decl_types`, and the code generator only
/// reads.
#[derive(Debug, Default)]
pub struct Meta {
    /// Use site -> resolved declaration (identifiers, `break`, `continue`,
    /// `return`).
    pub refs: HashMap<NodeId, Entity>,
    /// Expression -> inferred type; `None` is void (library calls and calls
    /// to void functions).
    pub types: HashMap<NodeId, Option<Type>>,
    /// Declaration -> annotated or inferred type. Function declarations map
    /// to their full signature.
    pub decl_types: HashMap<NodeId, Type>,
}

impl Meta {
    /// The non-void type of an expression, if one was recorded.
    pub fn expr_type(&self, id: NodeId) -> Option<&Type> {
        self.types.get(&id).and_then(|t| t.as_ref())
    }
}
