//! Three-address intermediate representation and the AST-to-TAC lowering.
//!
//! Lowering walks the resolved AST and appends to a flat instruction list.
//! Expression lowering returns the operand holding the expression's value;
//! control flow is materialised as conditional jumps and labels. Every
//! temporary and every user variable gets its own pseudo-register, which
//! the emitter later pins to a frame-relative stack slot.

use crate::error::{CompileError, CompileResult};
use crate::parser::{
  Block, BlockItem, Declaration, Expr, ExprKind, ForInit, LoopId, Program, Stmt, StmtKind,
};
use crate::tokenizer::{BinaryOp, Number, UnaryOp};
use std::collections::HashMap;
use std::fmt;

/// A lowering-time stand-in for a storage location. Pseudo-register `i`
/// lives at `-4*i(%rbp)` in the emitted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoRegister {
  pub function: String,
  pub index: u32,
}

impl fmt::Display for PseudoRegister {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "-{}(%rbp)", 4 * self.index)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
  Immediate(Number),
  Register(PseudoRegister),
  None,
}

impl Operand {
  pub fn is_immediate(&self) -> bool {
    matches!(self, Operand::Immediate(_))
  }
}

impl fmt::Display for Operand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Operand::Immediate(value) => write!(f, "${value}"),
      Operand::Register(register) => register.fmt(f),
      Operand::None => Ok(()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
  /// Function entry; the emitter renders the symbol and prologue.
  Function { name: String },
  /// Reserves one 4-byte slot per pseudo-register. Sized at emission time,
  /// after lowering has settled `variable_count`.
  AllocateStack,
  Unary {
    dest: PseudoRegister,
    op: UnaryOp,
    src: Operand,
  },
  Binary {
    dest: PseudoRegister,
    op: BinaryOp,
    left: Operand,
    right: Operand,
  },
  StoreValue {
    dest: PseudoRegister,
    src: Operand,
  },
  JumpIfZero {
    condition: Operand,
    target: String,
  },
  JumpIfNotZero {
    condition: Operand,
    target: String,
  },
  Jump { target: String },
  Label { name: String },
  Return { value: Operand },
}

/// The lowered form of one function body.
#[derive(Debug)]
pub struct FunctionBody {
  pub name: String,
  /// Next free pseudo-register index: always one more than the highest
  /// index in use, and therefore the unit of stack allocation.
  pub variable_count: u32,
  pub label_count: u32,
  pub instructions: Vec<Instruction>,
  registers: HashMap<String, PseudoRegister>,
}

/// Lower a resolved program into a linear instruction stream.
pub fn lower(program: &Program) -> CompileResult<FunctionBody> {
  let function = &program.function;
  let mut body = FunctionBody {
    name: function.name.clone(),
    variable_count: 1,
    label_count: 0,
    instructions: Vec::new(),
    registers: HashMap::new(),
  };
  body.emit(Instruction::Function {
    name: function.name.clone(),
  });
  body.emit(Instruction::AllocateStack);
  body.lower_block(&function.body)?;
  if function.name == "main"
    && !matches!(body.instructions.last(), Some(Instruction::Return { .. }))
  {
    body.emit(Instruction::Return {
      value: Operand::Immediate(0),
    });
  }
  Ok(body)
}

impl FunctionBody {
  fn emit(&mut self, instruction: Instruction) {
    self.instructions.push(instruction);
  }

  fn fresh_register(&mut self) -> PseudoRegister {
    let register = PseudoRegister {
      function: self.name.clone(),
      index: self.variable_count,
    };
    self.variable_count += 1;
    register
  }

  /// Synthetic label for short-circuiting and conditionals. The shared
  /// counter makes every label unique within the function.
  fn fresh_label(&mut self, purpose: &str) -> String {
    let label = format!(".{}{}_{}", self.name, self.label_count, purpose);
    self.label_count += 1;
    label
  }

  /// Loop labels are keyed by the loop's parse-time id so `break` and
  /// `continue` can name them without threading state through the walk.
  fn loop_label(&self, label: LoopId, purpose: &str) -> String {
    format!(".{}{}_{}.loop", self.name, label, purpose)
  }

  fn lower_block(&mut self, block: &Block) -> CompileResult<()> {
    for item in &block.items {
      match item {
        BlockItem::Declaration(declaration) => self.lower_declaration(declaration)?,
        BlockItem::Statement(statement) => self.lower_statement(statement)?,
      }
    }
    Ok(())
  }

  fn lower_declaration(&mut self, declaration: &Declaration) -> CompileResult<()> {
    let register = self.fresh_register();
    self
      .registers
      .insert(declaration.name.clone(), register.clone());
    if let Some(init) = &declaration.init {
      let value = self.lower_expression(init)?;
      self.emit(Instruction::StoreValue {
        dest: register,
        src: value,
      });
    }
    Ok(())
  }

  fn lower_statement(&mut self, statement: &Stmt) -> CompileResult<()> {
    match &statement.kind {
      StmtKind::Return(expression) => {
        let value = match expression {
          Some(expression) => self.lower_expression(expression)?,
          None => Operand::None,
        };
        self.emit(Instruction::Return { value });
        Ok(())
      }
      StmtKind::Expression(expression) => {
        self.lower_expression(expression)?;
        Ok(())
      }
      StmtKind::If {
        condition,
        then_branch,
        else_branch,
      } => {
        let condition_op = self.lower_expression(condition)?;
        match else_branch {
          None => {
            let end_label = self.fresh_label("end");
            self.emit(Instruction::JumpIfZero {
              condition: condition_op,
              target: end_label.clone(),
            });
            self.lower_statement(then_branch)?;
            self.emit(Instruction::Label { name: end_label });
          }
          Some(else_branch) => {
            let else_label = self.fresh_label("else");
            let end_label = self.fresh_label("end");
            self.emit(Instruction::JumpIfZero {
              condition: condition_op,
              target: else_label.clone(),
            });
            self.lower_statement(then_branch)?;
            self.emit(Instruction::Jump {
              target: end_label.clone(),
            });
            self.emit(Instruction::Label { name: else_label });
            self.lower_statement(else_branch)?;
            self.emit(Instruction::Label { name: end_label });
          }
        }
        Ok(())
      }
      StmtKind::While {
        condition,
        body,
        label,
        is_do_while,
      } => {
        let start_label = self.loop_label(*label, "start");
        let end_label = self.loop_label(*label, "end");
        self.emit(Instruction::Label {
          name: start_label.clone(),
        });
        if *is_do_while {
          self.lower_statement(body)?;
          let condition_op = self.lower_expression(condition)?;
          self.emit(Instruction::JumpIfNotZero {
            condition: condition_op,
            target: start_label,
          });
        } else {
          let condition_op = self.lower_expression(condition)?;
          self.emit(Instruction::JumpIfZero {
            condition: condition_op,
            target: end_label.clone(),
          });
          self.lower_statement(body)?;
          self.emit(Instruction::Jump {
            target: start_label,
          });
        }
        self.emit(Instruction::Label { name: end_label });
        Ok(())
      }
      StmtKind::For {
        init,
        condition,
        increment,
        body,
        label,
      } => {
        let start_label = self.loop_label(*label, "start");
        let end_label = self.loop_label(*label, "end");
        let increment_label = self.loop_label(*label, "increment");
        match init {
          Some(ForInit::Declaration(declaration)) => self.lower_declaration(declaration)?,
          Some(ForInit::Expression(expression)) => {
            self.lower_expression(expression)?;
          }
          None => {}
        }
        self.emit(Instruction::Label {
          name: start_label.clone(),
        });
        if let Some(condition) = condition {
          let condition_op = self.lower_expression(condition)?;
          self.emit(Instruction::JumpIfZero {
            condition: condition_op,
            target: end_label.clone(),
          });
        }
        self.lower_statement(body)?;
        self.emit(Instruction::Label {
          name: increment_label,
        });
        if let Some(increment) = increment {
          self.lower_expression(increment)?;
        }
        self.emit(Instruction::Jump {
          target: start_label,
        });
        self.emit(Instruction::Label { name: end_label });
        Ok(())
      }
      StmtKind::Break { label } => match label {
        Some(label) => {
          let target = self.loop_label(*label, "end");
          self.emit(Instruction::Jump { target });
          Ok(())
        }
        None => Err(CompileError::semantic(
          "break outside of a loop",
          &statement.position,
        )),
      },
      StmtKind::Continue { label, is_for } => match label {
        Some(label) => {
          let purpose = if *is_for { "increment" } else { "start" };
          let target = self.loop_label(*label, purpose);
          self.emit(Instruction::Jump { target });
          Ok(())
        }
        None => Err(CompileError::semantic(
          "continue outside of a loop",
          &statement.position,
        )),
      },
      StmtKind::Compound(block) => self.lower_block(block),
      StmtKind::Null => Ok(()),
    }
  }

  fn lower_expression(&mut self, expression: &Expr) -> CompileResult<Operand> {
    match &expression.kind {
      ExprKind::Constant(value) => Ok(Operand::Immediate(*value)),
      ExprKind::Var(name) => match self.registers.get(name.as_str()) {
        Some(register) => Ok(Operand::Register(register.clone())),
        None => Err(CompileError::semantic(
          format!("variable '{name}' is not in scope"),
          &expression.position,
        )),
      },
      ExprKind::Unary { op, operand } => {
        let src = self.lower_expression(operand)?;
        // Unary plus is the identity and lowers to nothing.
        if *op == UnaryOp::UnaryAdd {
          return Ok(src);
        }
        let dest = self.fresh_register();
        self.emit(Instruction::Unary {
          dest: dest.clone(),
          op: *op,
          src,
        });
        Ok(Operand::Register(dest))
      }
      ExprKind::Binary { op, left, right } => match op {
        BinaryOp::LogicalAnd => self.lower_logical_and(left, right),
        BinaryOp::LogicalOr => self.lower_logical_or(left, right),
        _ => {
          let left = self.lower_expression(left)?;
          let right = self.lower_expression(right)?;
          let dest = self.fresh_register();
          self.emit(Instruction::Binary {
            dest: dest.clone(),
            op: *op,
            left,
            right,
          });
          Ok(Operand::Register(dest))
        }
      },
      ExprKind::Assignment { left, right } => {
        let src = self.lower_expression(right)?;
        let dest = self.lower_lvalue(left)?;
        self.emit(Instruction::StoreValue {
          dest: dest.clone(),
          src,
        });
        Ok(Operand::Register(dest))
      }
      ExprKind::Conditional {
        condition,
        if_true,
        if_false,
      } => {
        let dest = self.fresh_register();
        let condition_op = self.lower_expression(condition)?;
        let else_label = self.fresh_label("else");
        let end_label = self.fresh_label("end");
        self.emit(Instruction::JumpIfZero {
          condition: condition_op,
          target: else_label.clone(),
        });
        let true_value = self.lower_expression(if_true)?;
        self.emit(Instruction::StoreValue {
          dest: dest.clone(),
          src: true_value,
        });
        self.emit(Instruction::Jump {
          target: end_label.clone(),
        });
        self.emit(Instruction::Label { name: else_label });
        let false_value = self.lower_expression(if_false)?;
        self.emit(Instruction::StoreValue {
          dest: dest.clone(),
          src: false_value,
        });
        self.emit(Instruction::Label { name: end_label });
        Ok(Operand::Register(dest))
      }
      ExprKind::Prefix { op, target } => {
        let register = self.lower_lvalue(target)?;
        self.emit(Instruction::Binary {
          dest: register.clone(),
          op: *op,
          left: Operand::Register(register.clone()),
          right: Operand::Immediate(1),
        });
        Ok(Operand::Register(register))
      }
      ExprKind::Postfix { op, target } => {
        let register = self.lower_lvalue(target)?;
        let saved = self.fresh_register();
        self.emit(Instruction::StoreValue {
          dest: saved.clone(),
          src: Operand::Register(register.clone()),
        });
        let updated = self.fresh_register();
        self.emit(Instruction::Binary {
          dest: updated.clone(),
          op: *op,
          left: Operand::Register(register.clone()),
          right: Operand::Immediate(1),
        });
        self.emit(Instruction::StoreValue {
          dest: register,
          src: Operand::Register(updated),
        });
        Ok(Operand::Register(saved))
      }
    }
  }

  /// Lower an expression that must name a storage location. The resolver
  /// has already rejected structural violations; this is the lowerer's
  /// backstop.
  fn lower_lvalue(&mut self, expression: &Expr) -> CompileResult<PseudoRegister> {
    match self.lower_expression(expression)? {
      Operand::Register(register) => Ok(register),
      _ => Err(CompileError::semantic(
        "expected an lvalue",
        &expression.position,
      )),
    }
  }

  fn lower_logical_and(&mut self, left: &Expr, right: &Expr) -> CompileResult<Operand> {
    let false_label = self.fresh_label("false");
    let end_label = self.fresh_label("end");
    let left_op = self.lower_expression(left)?;
    self.emit(Instruction::JumpIfZero {
      condition: left_op,
      target: false_label.clone(),
    });
    let right_op = self.lower_expression(right)?;
    self.emit(Instruction::JumpIfZero {
      condition: right_op,
      target: false_label.clone(),
    });
    let dest = self.fresh_register();
    self.emit(Instruction::StoreValue {
      dest: dest.clone(),
      src: Operand::Immediate(1),
    });
    self.emit(Instruction::Jump {
      target: end_label.clone(),
    });
    self.emit(Instruction::Label { name: false_label });
    self.emit(Instruction::StoreValue {
      dest: dest.clone(),
      src: Operand::Immediate(0),
    });
    self.emit(Instruction::Label { name: end_label });
    Ok(Operand::Register(dest))
  }

  fn lower_logical_or(&mut self, left: &Expr, right: &Expr) -> CompileResult<Operand> {
    let true_label = self.fresh_label("true");
    let end_label = self.fresh_label("end");
    let left_op = self.lower_expression(left)?;
    self.emit(Instruction::JumpIfNotZero {
      condition: left_op,
      target: true_label.clone(),
    });
    let right_op = self.lower_expression(right)?;
    self.emit(Instruction::JumpIfNotZero {
      condition: right_op,
      target: true_label.clone(),
    });
    let dest = self.fresh_register();
    self.emit(Instruction::StoreValue {
      dest: dest.clone(),
      src: Operand::Immediate(0),
    });
    self.emit(Instruction::Jump {
      target: end_label.clone(),
    });
    self.emit(Instruction::Label { name: true_label });
    self.emit(Instruction::StoreValue {
      dest: dest.clone(),
      src: Operand::Immediate(1),
    });
    self.emit(Instruction::Label { name: end_label });
    Ok(Operand::Register(dest))
  }
}
