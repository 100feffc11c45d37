//! Code generation: render the TAC stream as AT&T x86-64 assembly.
//!
//! Every pseudo-register is a frame slot, so almost every instruction
//! stages through a scratch register to avoid memory-to-memory operands.
//! `%r10d`/`%r11d` are reserved for that staging, `%ecx` for shift counts
//! and divisors, `%edx` for comparison staging (it is also clobbered by
//! `cdq`). No value lives in a scratch register across TAC instructions.

use crate::tac::{FunctionBody, Instruction, Operand};
use crate::tokenizer::{BinaryOp, UnaryOp};

/// Emit assembly for a lowered function.
pub(crate) fn generate(body: &FunctionBody) -> String {
  let mut asm = String::new();
  for instruction in &body.instructions {
    emit_instruction(instruction, body, &mut asm);
  }
  asm
}

fn emit_instruction(instruction: &Instruction, body: &FunctionBody, asm: &mut String) {
  match instruction {
    Instruction::Function { name } => {
      asm.push_str(&format!(".global {name}\n"));
      asm.push_str(&format!("{name}:\n"));
      asm.push_str("    pushq %rbp\n");
      asm.push_str("    movq %rsp, %rbp\n");
    }
    Instruction::AllocateStack => {
      asm.push_str(&format!("    subq ${}, %rsp\n", 4 * body.variable_count));
    }
    Instruction::Unary { dest, op, src } => match op {
      UnaryOp::Negate => {
        asm.push_str(&format!("    movl {src}, %r10d\n"));
        asm.push_str(&format!("    movl %r10d, {dest}\n"));
        asm.push_str(&format!("    negl {dest}\n"));
      }
      UnaryOp::BitwiseNot => {
        asm.push_str(&format!("    movl {src}, %r10d\n"));
        asm.push_str(&format!("    movl %r10d, {dest}\n"));
        asm.push_str(&format!("    notl {dest}\n"));
      }
      UnaryOp::LogicalNot => {
        // Clear the whole slot before `sete` writes its low byte.
        asm.push_str(&format!("    movl {src}, %r10d\n"));
        asm.push_str("    cmpl $0, %r10d\n");
        asm.push_str(&format!("    movl $0, {dest}\n"));
        asm.push_str(&format!("    sete {dest}\n"));
      }
      UnaryOp::UnaryAdd => unreachable!("unary plus is elided during lowering"),
    },
    Instruction::Binary {
      dest,
      op,
      left,
      right,
    } => emit_binary(asm, *op, left, right, &format!("{dest}")),
    Instruction::StoreValue { dest, src } => {
      if src.is_immediate() {
        asm.push_str(&format!("    movl {src}, {dest}\n"));
      } else {
        asm.push_str(&format!("    movl {src}, %r10d\n"));
        asm.push_str(&format!("    movl %r10d, {dest}\n"));
      }
    }
    Instruction::JumpIfZero { condition, target } => {
      asm.push_str(&format!("    movl {condition}, %edx\n"));
      asm.push_str("    cmpl $0, %edx\n");
      asm.push_str(&format!("    je {target}\n"));
    }
    Instruction::JumpIfNotZero { condition, target } => {
      asm.push_str(&format!("    movl {condition}, %edx\n"));
      asm.push_str("    cmpl $0, %edx\n");
      asm.push_str(&format!("    jne {target}\n"));
    }
    Instruction::Jump { target } => {
      asm.push_str(&format!("    jmp {target}\n"));
    }
    Instruction::Label { name } => {
      asm.push_str(&format!("{name}:\n"));
    }
    Instruction::Return { value } => {
      if !matches!(value, Operand::None) {
        asm.push_str(&format!("    movl {value}, %eax\n"));
      }
      asm.push_str("    movq %rbp, %rsp\n");
      asm.push_str("    popq %rbp\n");
      asm.push_str("    ret\n");
    }
  }
}

fn emit_binary(asm: &mut String, op: BinaryOp, left: &Operand, right: &Operand, dest: &str) {
  match op {
    BinaryOp::Add
    | BinaryOp::Subtract
    | BinaryOp::BitwiseAnd
    | BinaryOp::BitwiseOr
    | BinaryOp::BitwiseXor => {
      let opcode = match op {
        BinaryOp::Add => "addl",
        BinaryOp::Subtract => "subl",
        BinaryOp::BitwiseAnd => "andl",
        BinaryOp::BitwiseOr => "orl",
        BinaryOp::BitwiseXor => "xorl",
        _ => unreachable!(),
      };
      asm.push_str(&format!("    movl {left}, %r10d\n"));
      if right.is_immediate() {
        asm.push_str(&format!("    {opcode} {right}, %r10d\n"));
      } else {
        asm.push_str(&format!("    movl {right}, %r11d\n"));
        asm.push_str(&format!("    {opcode} %r11d, %r10d\n"));
      }
      asm.push_str(&format!("    movl %r10d, {dest}\n"));
    }
    BinaryOp::ShiftLeft | BinaryOp::ShiftRight => {
      let opcode = if op == BinaryOp::ShiftLeft {
        "shll"
      } else {
        "shrl"
      };
      asm.push_str(&format!("    movl {left}, %r10d\n"));
      if right.is_immediate() {
        asm.push_str(&format!("    {opcode} {right}, %r10d\n"));
      } else {
        asm.push_str(&format!("    movl {right}, %ecx\n"));
        asm.push_str(&format!("    {opcode} %cl, %r10d\n"));
      }
      asm.push_str(&format!("    movl %r10d, {dest}\n"));
    }
    BinaryOp::Multiply => {
      asm.push_str(&format!("    movl {left}, %r11d\n"));
      if right.is_immediate() {
        asm.push_str(&format!("    imull {right}, %r11d\n"));
      } else {
        asm.push_str(&format!("    movl {right}, %r10d\n"));
        asm.push_str("    imull %r10d, %r11d\n");
      }
      asm.push_str(&format!("    movl %r11d, {dest}\n"));
    }
    BinaryOp::Divide | BinaryOp::Modulo => {
      asm.push_str(&format!("    movl {left}, %eax\n"));
      asm.push_str("    cdq\n");
      asm.push_str(&format!("    movl {right}, %ecx\n"));
      asm.push_str("    idiv %ecx\n");
      let result = if op == BinaryOp::Divide { "%eax" } else { "%edx" };
      asm.push_str(&format!("    movl {result}, {dest}\n"));
    }
    BinaryOp::Equal
    | BinaryOp::NotEqual
    | BinaryOp::LessThan
    | BinaryOp::LessOrEqual
    | BinaryOp::GreaterThan
    | BinaryOp::GreaterOrEqual => {
      let opcode = match op {
        BinaryOp::Equal => "sete",
        BinaryOp::NotEqual => "setne",
        BinaryOp::LessThan => "setl",
        BinaryOp::LessOrEqual => "setle",
        BinaryOp::GreaterThan => "setg",
        BinaryOp::GreaterOrEqual => "setge",
        _ => unreachable!(),
      };
      asm.push_str(&format!("    movl {left}, %edx\n"));
      asm.push_str(&format!("    cmpl {right}, %edx\n"));
      asm.push_str(&format!("    movl $0, {dest}\n"));
      asm.push_str(&format!("    {opcode} {dest}\n"));
    }
    BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
      unreachable!("short-circuit operators lower to jumps and labels")
    }
  }
}
