//! tern semantic analysis: name resolution and type checking.
//!
//! [`analyze`] runs both passes over a parsed program and returns the
//! [`Meta`] side tables the code generator consumes. The AST itself is never
//! mutated.

mod env;
mod resolver;
mod typechecker;

use tern_syntax::ast::{Meta, Program};
use tern_syntax::error::{Error, Result, Stage};
use tern_syntax::token::Pos;

pub(crate) fn err_at<T>(pos: Pos, msg: impl Into<String>) -> Result<T> {
    Err(Error::at(Stage::Check, pos, msg))
}

pub(crate) fn internal<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::new(Stage::Check, msg))
}

/// Checks that the program is well formed and returns its metadata.
pub fn analyze(prog: &Program) -> Result<Meta> {
    let refs = resolver::resolve(prog)?;
    let (types, decl_types) = typechecker::check(prog, &refs)?;
    Ok(Meta {
        refs,
        types,
        decl_types,
    })
}
