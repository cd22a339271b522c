//! Code generation: lower the parsed program into AT&T x86-64 assembly.
//!
//! The emitter is a stack machine: every expression leaves exactly one value
//! on the stack and consumes the values its operands pushed. Each of the 26
//! one-letter variables owns a fixed 8-byte slot below `%rbp`, so the frame
//! is the same size for every program.

use crate::error::{CompileError, CompileResult};
use crate::parser::{AstNode, BinaryOp, Program, Stmt};

const WORD_SIZE: usize = 8;
const VARIABLE_COUNT: usize = 26;

/// Bytes reserved below `%rbp` for locals.
pub const FRAME_SIZE: usize = VARIABLE_COUNT * WORD_SIZE;

/// Label every `return` jumps to.
pub const RETURN_LABEL: &str = ".Lreturn";

/// Distance below `%rbp` of the slot owned by `name`.
pub fn slot_offset(name: char) -> Option<usize> {
  name
    .is_ascii_lowercase()
    .then(|| (name as usize - 'a' as usize + 1) * WORD_SIZE)
}

/// Emit assembly for a whole program.
pub fn generate(program: &Program) -> CompileResult<String> {
  let mut asm = String::new();
  asm.push_str(".att_syntax\n");
  asm.push_str(".global main\n");
  asm.push_str("main:\n");
  asm.push_str("    push %rbp\n");
  asm.push_str("    mov %rsp, %rbp\n");
  asm.push_str(&format!("    sub ${FRAME_SIZE}, %rsp\n"));
  // A program with no statements returns 0.
  asm.push_str("    mov $0, %rax\n");

  for stmt in program {
    emit_stmt(stmt, &mut asm)?;
  }

  asm.push_str(&format!("{RETURN_LABEL}:\n"));
  asm.push_str("    mov %rbp, %rsp\n");
  asm.push_str("    pop %rbp\n");
  asm.push_str("    ret\n");

  Ok(asm)
}

fn emit_stmt(stmt: &Stmt, asm: &mut String) -> CompileResult<()> {
  match stmt {
    Stmt::Expr(expr) => {
      emit_expr(expr, asm)?;
      // Dropping into %rax leaves the last statement's value as the result
      // when control falls through to the epilogue.
      asm.push_str("    pop %rax\n");
    }
    Stmt::Return(expr) => {
      emit_expr(expr, asm)?;
      asm.push_str("    pop %rax\n");
      asm.push_str(&format!("    jmp {RETURN_LABEL}\n"));
    }
  }
  Ok(())
}

/// Emit stack-based code for a single expression node.
fn emit_expr(node: &AstNode, asm: &mut String) -> CompileResult<()> {
  match node {
    AstNode::Num { value } => {
      asm.push_str(&format!("    mov ${value}, %rax\n"));
      asm.push_str("    push %rax\n");
    }
    AstNode::Var { .. } => {
      emit_addr(node, asm)?;
      load(asm);
    }
    AstNode::Assign { lhs, rhs } => {
      emit_addr(lhs, asm)?;
      emit_expr(rhs, asm)?;
      store(asm);
    }
    AstNode::Binary { op, lhs, rhs } => {
      emit_expr(lhs, asm)?;
      emit_expr(rhs, asm)?;
      asm.push_str("    pop %rdi\n");
      asm.push_str("    pop %rax\n");
      match op {
        BinaryOp::Add => asm.push_str("    add %rdi, %rax\n"),
        BinaryOp::Sub => asm.push_str("    sub %rdi, %rax\n"),
        BinaryOp::Mul => asm.push_str("    imul %rdi, %rax\n"),
        BinaryOp::Div => {
          asm.push_str("    cqo\n");
          asm.push_str("    idiv %rdi\n");
        }
        BinaryOp::Eq => compare("sete", asm),
        BinaryOp::Ne => compare("setne", asm),
        BinaryOp::Lt => compare("setl", asm),
        BinaryOp::Le => compare("setle", asm),
      }
      asm.push_str("    push %rax\n");
    }
  }
  Ok(())
}

fn compare(set: &str, asm: &mut String) {
  asm.push_str("    cmp %rdi, %rax\n");
  asm.push_str(&format!("    {set} %al\n"));
  asm.push_str("    movzbl %al, %eax\n");
}

/// Push the address of an lvalue.
fn emit_addr(node: &AstNode, asm: &mut String) -> CompileResult<()> {
  match node {
    AstNode::Var { name } => {
      let offset = slot_offset(*name)
        .ok_or_else(|| CompileError::codegen(format!("invalid variable name '{name}'")))?;
      asm.push_str(&format!("    lea -{offset}(%rbp), %rax\n"));
      asm.push_str("    push %rax\n");
      Ok(())
    }
    _ => Err(CompileError::codegen("not an lvalue")),
  }
}

/// Replace the address on top of the stack with the value it points at.
fn load(asm: &mut String) {
  asm.push_str("    pop %rax\n");
  asm.push_str("    mov (%rax), %rax\n");
  asm.push_str("    push %rax\n");
}

/// Pop a value and an address, store, and push the value back.
fn store(asm: &mut String) {
  asm.push_str("    pop %rdi\n");
  asm.push_str("    pop %rax\n");
  asm.push_str("    mov %rdi, (%rax)\n");
  asm.push_str("    push %rdi\n");
}
