//! tern language syntax definitions.
//!
//! This crate holds the foundational types every other tern crate builds on:
//! tokens, AST nodes, the structural type sum, compilation metadata, and the
//! shared error machinery.

/// Token kinds, literals and source positions.
pub mod token;

/// AST node definitions and the metadata side tables.
pub mod ast;

/// The language's type sum with structural equality.
pub mod types;

/// Error and result types shared across the toolchain.
pub mod error;

pub use ast::*;
pub use error::{Error, Result, Stage};
pub use token::{Pos, Token, TokenKind};
pub use types::Type;
