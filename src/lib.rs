//! Crate root: wires together the compilation pipeline.
//!
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the statement list.
//! - `codegen` lowers the statements into x86-64 AT&T assembly.
//! - `error` centralises the diagnostics shared by the other modules.
//!
//! Each stage runs to completion before the next one starts, and the first
//! error aborts the whole compilation.

pub mod codegen;
pub mod error;
pub mod parser;
pub mod tokenizer;

use tracing::{debug, trace};

pub use error::{CompileError, CompileResult};

/// Compile a source string into AT&T assembly.
pub fn generate_assembly(expr: &str) -> CompileResult<String> {
  let tokens = tokenizer::tokenize(expr)?;
  debug!(count = tokens.len(), "tokenized input");
  trace!(?tokens);

  let program = parser::parse(tokens, expr)?;
  debug!(statements = program.len(), "parsed program");

  let asm = codegen::generate(&program)?;
  debug!(bytes = asm.len(), "emitted assembly");
  Ok(asm)
}
