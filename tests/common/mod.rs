//! A small interpreter for the x86-64 AT&T subset the code generator emits.
//!
//! It lets the end-to-end tests check what a compiled program evaluates to
//! without a host assembler or linker.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, bail};

const STACK_TOP: i64 = 0x10_0000;
const RETURN_SENTINEL: i64 = -1;

#[derive(Debug, Clone, Copy)]
enum Operand {
  Imm(i64),
  Reg(&'static str),
  Mem { base: &'static str, disp: i64 },
}

fn register(name: &str) -> Result<&'static str> {
  Ok(match name {
    "rax" => "rax",
    "rdi" => "rdi",
    "rdx" => "rdx",
    "rbp" => "rbp",
    "rsp" => "rsp",
    "al" => "al",
    "eax" => "eax",
    other => bail!("unsupported register %{other}"),
  })
}

fn operand(text: &str) -> Result<Operand> {
  let text = text.trim();
  if let Some(imm) = text.strip_prefix('$') {
    return Ok(Operand::Imm(imm.parse()?));
  }
  if let Some(reg) = text.strip_prefix('%') {
    return Ok(Operand::Reg(register(reg)?));
  }
  let (disp, rest) = text
    .split_once('(')
    .ok_or_else(|| anyhow!("unsupported operand {text}"))?;
  let base = rest
    .strip_prefix('%')
    .and_then(|r| r.strip_suffix(')'))
    .ok_or_else(|| anyhow!("unsupported memory operand {text}"))?;
  let disp = if disp.is_empty() { 0 } else { disp.parse()? };
  Ok(Operand::Mem {
    base: register(base)?,
    disp,
  })
}

#[derive(Default)]
struct Machine {
  regs: HashMap<&'static str, i64>,
  memory: HashMap<i64, i64>,
  flags: (i64, i64),
}

impl Machine {
  fn reg(&self, name: &str) -> i64 {
    match name {
      "al" => self.reg("rax") & 0xff,
      "eax" => self.reg("rax") & 0xffff_ffff,
      _ => self.regs.get(name).copied().unwrap_or(0),
    }
  }

  fn set_reg(&mut self, name: &'static str, value: i64) {
    match name {
      "al" => {
        let rax = self.reg("rax");
        self.regs.insert("rax", (rax & !0xff) | (value & 0xff));
      }
      // Writing a 32-bit register zero-extends into the full register.
      "eax" => {
        self.regs.insert("rax", value & 0xffff_ffff);
      }
      _ => {
        self.regs.insert(name, value);
      }
    }
  }

  fn read(&self, op: Operand) -> Result<i64> {
    match op {
      Operand::Imm(v) => Ok(v),
      Operand::Reg(r) => Ok(self.reg(r)),
      Operand::Mem { base, disp } => {
        let addr = self.reg(base) + disp;
        self
          .memory
          .get(&addr)
          .copied()
          .ok_or_else(|| anyhow!("read of uninitialised memory at {addr:#x}"))
      }
    }
  }

  fn write(&mut self, op: Operand, value: i64) -> Result<()> {
    match op {
      Operand::Imm(_) => bail!("cannot write to an immediate"),
      Operand::Reg(r) => self.set_reg(r, value),
      Operand::Mem { base, disp } => {
        let addr = self.reg(base) + disp;
        self.memory.insert(addr, value);
      }
    }
    Ok(())
  }

  fn push(&mut self, value: i64) {
    let rsp = self.reg("rsp") - 8;
    self.set_reg("rsp", rsp);
    self.memory.insert(rsp, value);
  }

  fn pop(&mut self) -> Result<i64> {
    let rsp = self.reg("rsp");
    if rsp >= STACK_TOP {
      bail!("stack underflow");
    }
    let value = self
      .memory
      .get(&rsp)
      .copied()
      .ok_or_else(|| anyhow!("pop of uninitialised stack slot"))?;
    self.set_reg("rsp", rsp + 8);
    Ok(value)
  }
}

/// Run the `main` function in `asm` and return `%rax` at `ret`.
pub fn run(asm: &str) -> Result<i64> {
  let lines: Vec<&str> = asm.lines().map(str::trim).collect();
  let labels: HashMap<&str, usize> = lines
    .iter()
    .enumerate()
    .filter_map(|(i, l)| l.strip_suffix(':').map(|name| (name, i)))
    .collect();
  let mut pc = *labels.get("main").context("no main label")?;

  let mut machine = Machine::default();
  machine.set_reg("rsp", STACK_TOP);
  machine.push(RETURN_SENTINEL);
  let mut steps = 0;

  loop {
    steps += 1;
    if steps > 100_000 {
      bail!("program did not terminate");
    }
    let line = *lines.get(pc).context("fell off the end of the program")?;
    pc += 1;
    if line.is_empty() || line.ends_with(':') || line.starts_with('.') {
      continue;
    }

    let (mnemonic, rest) = line.split_once(' ').unwrap_or((line, ""));
    let ops: Vec<Operand> = if rest.is_empty() || mnemonic == "jmp" {
      Vec::new()
    } else {
      rest.split(", ").map(operand).collect::<Result<_>>()?
    };

    match (mnemonic, ops.as_slice()) {
      ("push", [src]) => {
        let v = machine.read(*src)?;
        machine.push(v);
      }
      ("pop", [dst]) => {
        let v = machine.pop()?;
        machine.write(*dst, v)?;
      }
      ("mov", [src, dst]) | ("movzbl", [src, dst]) => {
        let v = machine.read(*src)?;
        machine.write(*dst, v)?;
      }
      ("lea", [Operand::Mem { base, disp }, dst]) => {
        let addr = machine.reg(base) + disp;
        machine.write(*dst, addr)?;
      }
      ("add", [src, dst]) => {
        let v = machine.read(*dst)?.wrapping_add(machine.read(*src)?);
        machine.write(*dst, v)?;
      }
      ("sub", [src, dst]) => {
        let v = machine.read(*dst)?.wrapping_sub(machine.read(*src)?);
        machine.write(*dst, v)?;
      }
      ("imul", [src, dst]) => {
        let v = machine.read(*dst)?.wrapping_mul(machine.read(*src)?);
        machine.write(*dst, v)?;
      }
      ("cqo", []) => {
        let sign = if machine.reg("rax") < 0 { -1 } else { 0 };
        machine.set_reg("rdx", sign);
      }
      ("idiv", [divisor]) => {
        let d = machine.read(*divisor)?;
        if d == 0 {
          bail!("division by zero");
        }
        let n = machine.reg("rax");
        machine.set_reg("rax", n.wrapping_div(d));
        machine.set_reg("rdx", n.wrapping_rem(d));
      }
      ("cmp", [src, dst]) => {
        machine.flags = (machine.read(*dst)?, machine.read(*src)?);
      }
      (set @ ("sete" | "setne" | "setl" | "setle"), [dst]) => {
        let (l, r) = machine.flags;
        let holds = match set {
          "sete" => l == r,
          "setne" => l != r,
          "setl" => l < r,
          _ => l <= r,
        };
        machine.write(*dst, holds as i64)?;
      }
      ("jmp", []) => {
        pc = *labels
          .get(rest.trim())
          .with_context(|| format!("unknown label {rest}"))?;
      }
      ("ret", []) => {
        let target = machine.pop()?;
        if target != RETURN_SENTINEL {
          bail!("returned to {target:#x} instead of the caller");
        }
        if machine.reg("rsp") != STACK_TOP {
          bail!("stack not balanced on return");
        }
        return Ok(machine.reg("rax"));
      }
      _ => bail!("unsupported instruction: {line}"),
    }
  }
}

/// Compile `source` and run it.
pub fn eval(source: &str) -> Result<i64> {
  let asm = stackcc::generate_assembly(source).map_err(|e| anyhow!("{e}"))?;
  run(&asm)
}
