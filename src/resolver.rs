//! Semantic resolution: a single in-place walk over the parsed AST.
//!
//! Three concerns are handled together because they share the traversal:
//! variables are renamed to scope-qualified unique names, `break` and
//! `continue` are bound to their enclosing loop's label, and lvalue
//! positions get their final structural check. This pass is where
//! duplicate declarations, undeclared uses, and loop-less `break`/
//! `continue` are rejected.

use crate::error::{CompileError, CompileResult};
use crate::parser::{
  is_lvalue, Block, BlockItem, Declaration, Expr, ExprKind, ForInit, LoopId, Program, Stmt,
  StmtKind,
};
use std::collections::HashMap;

/// Resolve the program in place.
pub fn resolve(program: &mut Program) -> CompileResult<()> {
  let mut resolver = Resolver::new(program.function.name.clone());
  resolver.resolve_block(&mut program.function.body)
}

struct Resolver {
  function: String,
  /// Current scope depth; the function body is layer 1.
  layer: u32,
  /// Per-identifier stack of the layers that declared it. The top entry is
  /// the binding currently in scope.
  bindings: HashMap<String, Vec<u32>>,
  /// Innermost-last stack of enclosing loops, with `is_for` distinguishing
  /// where `continue` must jump.
  loops: Vec<(LoopId, bool)>,
}

impl Resolver {
  fn new(function: String) -> Self {
    Self {
      function,
      layer: 0,
      bindings: HashMap::new(),
      loops: Vec::new(),
    }
  }

  /// `{function}::{name}::{layer}` — unique along any lexical path, and
  /// stable so the lowerer can key its register map on it.
  fn qualified(&self, name: &str, layer: u32) -> String {
    format!("{}::{}::{}", self.function, name, layer)
  }

  /// Drop every binding introduced by the current layer.
  fn pop_layer(&mut self) {
    for stack in self.bindings.values_mut() {
      if stack.last() == Some(&self.layer) {
        stack.pop();
      }
    }
  }

  fn resolve_block(&mut self, block: &mut Block) -> CompileResult<()> {
    self.layer += 1;
    for item in &mut block.items {
      match item {
        BlockItem::Declaration(declaration) => self.resolve_declaration(declaration)?,
        BlockItem::Statement(statement) => self.resolve_statement(statement)?,
      }
    }
    self.pop_layer();
    self.layer -= 1;
    Ok(())
  }

  fn resolve_declaration(&mut self, declaration: &mut Declaration) -> CompileResult<()> {
    let stack = self.bindings.entry(declaration.name.clone()).or_default();
    if stack.last() == Some(&self.layer) {
      return Err(CompileError::semantic(
        format!("duplicate declaration of '{}'", declaration.name),
        &declaration.position,
      ));
    }
    stack.push(self.layer);
    declaration.name = self.qualified(&declaration.name, self.layer);
    // The initializer resolves after the binding exists, so it sees the
    // freshly declared variable rather than an outer one it shadows.
    if let Some(init) = &mut declaration.init {
      self.resolve_expression(init)?;
    }
    Ok(())
  }

  fn resolve_statement(&mut self, statement: &mut Stmt) -> CompileResult<()> {
    match &mut statement.kind {
      StmtKind::Return(expression) => {
        if let Some(expression) = expression {
          self.resolve_expression(expression)?;
        }
        Ok(())
      }
      StmtKind::Expression(expression) => self.resolve_expression(expression),
      StmtKind::If {
        condition,
        then_branch,
        else_branch,
      } => {
        self.resolve_expression(condition)?;
        self.resolve_statement(then_branch)?;
        if let Some(else_branch) = else_branch {
          self.resolve_statement(else_branch)?;
        }
        Ok(())
      }
      StmtKind::While {
        condition,
        body,
        label,
        ..
      } => {
        self.loops.push((*label, false));
        self.resolve_expression(condition)?;
        self.resolve_statement(body)?;
        self.loops.pop();
        Ok(())
      }
      StmtKind::For {
        init,
        condition,
        increment,
        body,
        label,
      } => {
        // A declaring init opens one extra scope wrapping the whole loop,
        // so the loop variable dies at the loop's end.
        let has_init_scope = matches!(init, Some(ForInit::Declaration(_)));
        if has_init_scope {
          self.layer += 1;
        }
        match init {
          Some(ForInit::Declaration(declaration)) => self.resolve_declaration(declaration)?,
          Some(ForInit::Expression(expression)) => self.resolve_expression(expression)?,
          None => {}
        }
        self.loops.push((*label, true));
        if let Some(condition) = condition {
          self.resolve_expression(condition)?;
        }
        if let Some(increment) = increment {
          self.resolve_expression(increment)?;
        }
        self.resolve_statement(body)?;
        self.loops.pop();
        if has_init_scope {
          self.pop_layer();
          self.layer -= 1;
        }
        Ok(())
      }
      StmtKind::Break { label } => match self.loops.last() {
        Some((loop_label, _)) => {
          *label = Some(*loop_label);
          Ok(())
        }
        None => Err(CompileError::semantic(
          "break outside of a loop",
          &statement.position,
        )),
      },
      StmtKind::Continue { label, is_for } => match self.loops.last() {
        Some((loop_label, loop_is_for)) => {
          *label = Some(*loop_label);
          *is_for = *loop_is_for;
          Ok(())
        }
        None => Err(CompileError::semantic(
          "continue outside of a loop",
          &statement.position,
        )),
      },
      StmtKind::Compound(block) => self.resolve_block(block),
      StmtKind::Null => Ok(()),
    }
  }

  fn resolve_expression(&mut self, expression: &mut Expr) -> CompileResult<()> {
    match &mut expression.kind {
      ExprKind::Constant(_) => Ok(()),
      ExprKind::Var(name) => {
        let layer = self
          .bindings
          .get(name.as_str())
          .and_then(|s| s.last().copied());
        match layer {
          Some(layer) => {
            *name = self.qualified(name, layer);
            Ok(())
          }
          None => Err(CompileError::semantic(
            format!("use of undeclared variable '{name}'"),
            &expression.position,
          )),
        }
      }
      ExprKind::Unary { operand, .. } => self.resolve_expression(operand),
      ExprKind::Binary { left, right, .. } => {
        self.resolve_expression(left)?;
        self.resolve_expression(right)
      }
      ExprKind::Assignment { left, right } => {
        if !is_lvalue(left) {
          return Err(CompileError::semantic(
            "invalid lvalue on the left of \"=\"",
            &expression.position,
          ));
        }
        self.resolve_expression(left)?;
        self.resolve_expression(right)
      }
      ExprKind::Conditional {
        condition,
        if_true,
        if_false,
      } => {
        self.resolve_expression(condition)?;
        self.resolve_expression(if_true)?;
        self.resolve_expression(if_false)
      }
      ExprKind::Prefix { target, .. } | ExprKind::Postfix { target, .. } => {
        if !is_lvalue(target) {
          return Err(CompileError::semantic(
            "invalid lvalue as the operand of an increment or decrement",
            &expression.position,
          ));
        }
        self.resolve_expression(target)
      }
    }
  }
}
