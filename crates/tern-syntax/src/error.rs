//! Error type shared by every stage of the tern pipeline.
//!
//! All compiler errors are fatal: each stage returns [`Result`] and the
//! driver stops at the first failure. An error knows which [`Stage`] raised
//! it, so diagnostics carry their own prefix, and points at the offending
//! construct when one exists; internal invariant failures have no position.

use std::fmt;

use crate::token::Pos;

/// The pipeline stage an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lex,
    Parse,
    Check,
    Codegen,
}

// The diagnostic prefix printed by the driver.
impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Lex => "Lex error",
            Stage::Parse => "Parse error",
            Stage::Check => "Check error",
            Stage::Codegen => "Codegen error",
        })
    }
}

/// A fatal compilation error.
#[derive(Debug, Clone)]
pub struct Error {
    /// Stage that rejected the program.
    pub stage: Stage,
    /// Human-readable description.
    pub msg: String,
    /// Position of the offending construct, when the error points at source
    /// text.
    pub at: Option<Pos>,
}

impl Error {
    /// An error with no source position (internal invariant failures and
    /// backend limits).
    pub fn new(stage: Stage, msg: impl Into<String>) -> Self {
        Self {
            stage,
            msg: msg.into(),
            at: None,
        }
    }

    /// An error anchored at a source position.
    pub fn at(stage: Stage, pos: Pos, msg: impl Into<String>) -> Self {
        Self {
            stage,
            msg: msg.into(),
            at: Some(pos),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.msg)?;
        if let Some(pos) = self.at {
            write!(f, " at {}", pos)?;
        }
        Ok(())
    }
}

/// A specialized `Result` used throughout the tern crates.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_stage_and_position() {
        let err = Error::at(Stage::Parse, Pos { line: 3, col: 7 }, "Expected ;, but got }");
        assert_eq!(err.to_string(), "Parse error: Expected ;, but got } at 3:7");

        let err = Error::new(Stage::Codegen, "internal: missing branch labels");
        assert_eq!(
            err.to_string(),
            "Codegen error: internal: missing branch labels"
        );
        assert!(err.at.is_none());
    }
}
