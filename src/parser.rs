//! Recursive-descent parser producing a statement list and expression AST.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! program    = stmt*
//! stmt       = "return" expr ";" | expr ";"
//! expr       = assign
//! assign     = equality ("=" assign)?
//! equality   = relational ("==" relational | "!=" relational)*
//! relational = add ("<" add | "<=" add | ">" add | ">=" add)*
//! add        = mul ("+" mul | "-" mul)*
//! mul        = unary ("*" unary | "/" unary)*
//! unary      = ("+" | "-")? primary
//! primary    = num | ident | "(" expr ")"
//! ```
//!
//! `a > b` is stored as `b < a` and `a >= b` as `b <= a`, and `-x` becomes
//! `0 - x`, so later stages only ever see the reduced operator set.

use tracing::trace;

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind, describe_token, token_text};

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
}

/// Expression tree produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
  Num {
    value: i64,
  },
  Var {
    name: char,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<AstNode>,
    rhs: Box<AstNode>,
  },
  /// `lhs` is whatever the parser saw left of `=`; codegen rejects non-variables.
  Assign {
    lhs: Box<AstNode>,
    rhs: Box<AstNode>,
  },
}

impl AstNode {
  pub fn number(value: i64) -> Self {
    Self::Num { value }
  }

  pub fn var(name: char) -> Self {
    Self::Var { name }
  }

  pub fn binary(op: BinaryOp, lhs: AstNode, rhs: AstNode) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn assign(lhs: AstNode, rhs: AstNode) -> Self {
    Self::Assign {
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }
}

/// A top-level statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  /// Evaluated for its side effects; the value is dropped.
  Expr(AstNode),
  Return(AstNode),
}

/// The whole translation unit: statements in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
  pub body: Vec<Stmt>,
}

impl Program {
  pub fn iter(&self) -> std::slice::Iter<'_, Stmt> {
    self.body.iter()
  }

  pub fn len(&self) -> usize {
    self.body.len()
  }

  pub fn is_empty(&self) -> bool {
    self.body.is_empty()
  }
}

impl<'a> IntoIterator for &'a Program {
  type Item = &'a Stmt;
  type IntoIter = std::slice::Iter<'a, Stmt>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

/// Parse a sequence of statements from the token stream.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens, source);
  let mut body = Vec::new();

  while !stream.is_eof() {
    let stmt = parse_stmt(&mut stream)?;
    trace!(?stmt, "parsed statement");
    body.push(stmt);
  }

  Ok(Program { body })
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  if stream.equal("return") {
    let expr = parse_expr(stream)?;
    stream.skip(";")?;
    return Ok(Stmt::Return(expr));
  }

  let expr = parse_expr(stream)?;
  stream.skip(";")?;
  Ok(Stmt::Expr(expr))
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<AstNode> {
  parse_assign(stream)
}

fn parse_assign(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let node = parse_equality(stream)?;

  if stream.equal("=") {
    let rhs = parse_assign(stream)?;
    return Ok(AstNode::assign(node, rhs));
  }

  Ok(node)
}

fn parse_equality(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let mut node = parse_relational(stream)?;

  loop {
    if stream.equal("==") {
      let rhs = parse_relational(stream)?;
      node = AstNode::binary(BinaryOp::Eq, node, rhs);
    } else if stream.equal("!=") {
      let rhs = parse_relational(stream)?;
      node = AstNode::binary(BinaryOp::Ne, node, rhs);
    } else {
      return Ok(node);
    }
  }
}

fn parse_relational(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let mut node = parse_add(stream)?;

  loop {
    if stream.equal("<") {
      let rhs = parse_add(stream)?;
      node = AstNode::binary(BinaryOp::Lt, node, rhs);
    } else if stream.equal("<=") {
      let rhs = parse_add(stream)?;
      node = AstNode::binary(BinaryOp::Le, node, rhs);
    } else if stream.equal(">") {
      // Flip the operands so only `<` and `<=` reach codegen.
      let rhs = parse_add(stream)?;
      node = AstNode::binary(BinaryOp::Lt, rhs, node);
    } else if stream.equal(">=") {
      let rhs = parse_add(stream)?;
      node = AstNode::binary(BinaryOp::Le, rhs, node);
    } else {
      return Ok(node);
    }
  }
}

fn parse_add(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let mut node = parse_mul(stream)?;

  loop {
    if stream.equal("+") {
      let rhs = parse_mul(stream)?;
      node = AstNode::binary(BinaryOp::Add, node, rhs);
    } else if stream.equal("-") {
      let rhs = parse_mul(stream)?;
      node = AstNode::binary(BinaryOp::Sub, node, rhs);
    } else {
      return Ok(node);
    }
  }
}

fn parse_mul(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let mut node = parse_unary(stream)?;

  loop {
    if stream.equal("*") {
      let rhs = parse_unary(stream)?;
      node = AstNode::binary(BinaryOp::Mul, node, rhs);
    } else if stream.equal("/") {
      let rhs = parse_unary(stream)?;
      node = AstNode::binary(BinaryOp::Div, node, rhs);
    } else {
      return Ok(node);
    }
  }
}

fn parse_unary(stream: &mut TokenStream) -> CompileResult<AstNode> {
  if stream.equal("+") {
    return parse_primary(stream);
  }

  if stream.equal("-") {
    let operand = parse_primary(stream)?;
    return Ok(AstNode::binary(BinaryOp::Sub, AstNode::number(0), operand));
  }

  parse_primary(stream)
}

fn parse_primary(stream: &mut TokenStream) -> CompileResult<AstNode> {
  if stream.equal("(") {
    let node = parse_expr(stream)?;
    stream.skip(")")?;
    return Ok(node);
  }

  match stream.peek().map(|token| token.kind) {
    Some(TokenKind::Ident) => {
      let name = stream.get_ident()?;
      Ok(AstNode::var(name))
    }
    Some(TokenKind::Num) => {
      let value = stream.get_number()?;
      Ok(AstNode::number(value))
    }
    _ => Err(stream.error_here("expected an expression")),
  }
}

/// Cursor over the token vector. Consumption only ever moves `pos` forward.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  /// True if the current token is the punctuator or keyword `op`; never consumes.
  fn peek_is(&self, op: &str) -> bool {
    self.peek().is_some_and(|token| {
      token.kind == TokenKind::Punctuator
        && token.len == op.len()
        && token_text(token, self.source) == op
    })
  }

  /// Consume the current token if it matches the provided punctuator.
  fn equal(&mut self, op: &str) -> bool {
    if self.peek_is(op) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, s: &str) -> CompileResult<()> {
    if self.equal(s) {
      Ok(())
    } else {
      Err(self.error_here(format!("expected \"{s}\"")))
    }
  }

  /// Syntax error at the current token, naming what was found there.
  fn error_here(&self, expected: impl AsRef<str>) -> CompileError {
    let (loc, got) = match self.peek() {
      Some(token) => (token.loc, describe_token(Some(token), self.source)),
      None => (self.source.len(), "EOF".to_string()),
    };
    CompileError::parse_at(
      self.source,
      loc,
      format!("{}, but got \"{got}\"", expected.as_ref()),
    )
  }

  /// Parse the current token as an integer literal.
  fn get_number(&mut self) -> CompileResult<i64> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Num
    {
      let value = token.value.ok_or_else(|| {
        CompileError::parse_at(
          self.source,
          token.loc,
          "internal error: numeric token missing value",
        )
      })?;
      self.pos += 1;
      return Ok(value);
    }

    Err(self.error_here("expected a number"))
  }

  /// Parse the current token as an identifier.
  fn get_ident(&mut self) -> CompileResult<char> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Ident
    {
      let Some(ident) = token_text(token, self.source).chars().next() else {
        return Err(CompileError::parse_at(
          self.source,
          token.loc,
          "identifier is missing characters",
        ));
      };
      self.pos += 1;
      return Ok(ident);
    }

    Err(self.error_here("expected an identifier"))
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek().map(|token| token.kind), Some(TokenKind::Eof) | None)
  }
}
