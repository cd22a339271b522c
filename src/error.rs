//! Diagnostics shared by every stage of the pipeline.
//!
//! Lexer and parser failures point back into the source with a caret under
//! the offending byte. Code generation only ever fails on a semantic check, so
//! its errors carry a plain message.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  /// The tokenizer hit a character it cannot start a token with.
  #[snafu(display("{expr_line}\n{marker} {message}"))]
  Lex {
    expr_line: String,
    marker: String,
    message: String,
    loc: usize,
  },

  /// The token stream does not match the grammar.
  #[snafu(display("{expr_line}\n{marker} {message}"))]
  Parse {
    expr_line: String,
    marker: String,
    message: String,
    loc: usize,
  },

  #[snafu(display("{message}"))]
  Codegen { message: String },
}

impl CompileError {
  /// Construct a lexical error anchored at a byte offset in the source.
  pub fn lex_at(expr: &str, loc: usize, message: impl Into<String>) -> Self {
    let (expr_line, marker, loc) = locate(expr, loc);
    Self::Lex {
      expr_line,
      marker,
      message: message.into(),
      loc,
    }
  }

  /// Construct a syntax error anchored at a byte offset in the source.
  pub fn parse_at(expr: &str, loc: usize, message: impl Into<String>) -> Self {
    let (expr_line, marker, loc) = locate(expr, loc);
    Self::Parse {
      expr_line,
      marker,
      message: message.into(),
      loc,
    }
  }

  pub fn codegen(message: impl Into<String>) -> Self {
    Self::Codegen {
      message: message.into(),
    }
  }

  /// Byte offset the error points at, if it has one.
  pub fn offset(&self) -> Option<usize> {
    match self {
      Self::Lex { loc, .. } | Self::Parse { loc, .. } => Some(*loc),
      Self::Codegen { .. } => None,
    }
  }
}

/// Render the quoted source line and a caret under `loc`.
fn locate(expr: &str, loc: usize) -> (String, String, usize) {
  let expr_line = format!("'{expr}'");
  let mut safe_loc = loc.min(expr.len());
  while !expr.is_char_boundary(safe_loc) {
    safe_loc -= 1;
  }
  let char_offset = expr[..safe_loc].chars().count() + 1; // account for opening quote
  let marker = format!("{}^", " ".repeat(char_offset));
  (expr_line, marker, safe_loc)
}
