//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the program AST.
//! - `resolver` renames variables into scope-qualified form and binds
//!   `break`/`continue` to their loops, rejecting semantic violations.
//! - `tac` lowers the resolved AST into a linear three-address IR.
//! - `codegen` renders the IR as x86-64 AT&T assembly.
//! - `error` centralises reporting utilities shared by the other stages.

pub mod error;
pub mod parser;
pub mod resolver;
pub mod tac;
pub mod tokenizer;

mod codegen;

pub use error::{CompileError, CompileResult, Position};

/// Compile a source string into AT&T x86-64 assembly.
pub fn compile(source: &str) -> CompileResult<String> {
  let tokens = tokenizer::tokenize(source);
  tracing::trace!(tokens = tokens.len(), "lexed translation unit");
  let mut program = parser::parse(tokens)?;
  resolver::resolve(&mut program)?;
  let body = tac::lower(&program)?;
  tracing::debug!(
    function = %body.name,
    instructions = body.instructions.len(),
    slots = body.variable_count,
    "lowered to three-address code"
  );
  Ok(codegen::generate(&body))
}
