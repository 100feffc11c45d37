//! Shared error utilities used across the compilation pipeline.
//!
//! There are exactly two kinds of failure: syntax errors from the tokenizer
//! and parser, and semantic errors from resolution (with the lowerer as a
//! backstop). Both are fatal at the point of detection and carry the source
//! position the parser was tracking when they were raised.

use snafu::Snafu;
use std::fmt;

pub type CompileResult<T> = Result<T, CompileError>;

/// Statement-granular source location: the line within the enclosing
/// function, counted by terminating semicolons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Position {
  pub line: u32,
  pub function: String,
}

impl Position {
  pub fn new(line: u32, function: impl Into<String>) -> Self {
    Self {
      line,
      function: function.into(),
    }
  }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.function.is_empty() {
      write!(f, "line {}", self.line)
    } else {
      write!(f, "line {} in '{}'", self.line, self.function)
    }
  }
}

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("syntax error: {message} ({position})"))]
  SyntaxError { message: String, position: Position },

  #[snafu(display("semantic error: {message} ({position})"))]
  SemanticError { message: String, position: Position },
}

impl CompileError {
  /// Construct a syntax error anchored at the parser's current position.
  pub fn syntax(message: impl Into<String>, position: &Position) -> Self {
    Self::SyntaxError {
      message: message.into(),
      position: position.clone(),
    }
  }

  /// Construct a semantic error anchored at the offending node's position.
  pub fn semantic(message: impl Into<String>, position: &Position) -> Self {
    Self::SemanticError {
      message: message.into(),
      position: position.clone(),
    }
  }
}
