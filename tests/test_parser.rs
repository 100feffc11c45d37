use nanocc::error::CompileError;
use nanocc::parser::{
  parse, BlockItem, Expr, ExprKind, ForInit, Program, Stmt, StmtKind,
};
use nanocc::tokenizer::{tokenize, BinaryOp, UnaryOp};
use rstest::rstest;

fn parse_source(source: &str) -> Result<Program, CompileError> {
  parse(tokenize(source))
}

fn body_items(source: &str) -> Vec<BlockItem> {
  parse_source(source).expect("program should parse").function.body.items
}

/// The expression of the final `return` in a `int main() { ... }` body.
fn return_expr(source: &str) -> Expr {
  let items = body_items(source);
  match items.into_iter().last() {
    Some(BlockItem::Statement(Stmt {
      kind: StmtKind::Return(Some(expr)),
      ..
    })) => expr,
    other => panic!("expected a return statement, got {other:?}"),
  }
}

#[test]
fn multiplication_binds_tighter_than_addition() {
  let expr = return_expr("int main(){ return 1 + 2 * 3; }");
  match expr.kind {
    ExprKind::Binary {
      op: BinaryOp::Add,
      left,
      right,
    } => {
      assert!(matches!(left.kind, ExprKind::Constant(1)));
      assert!(matches!(
        right.kind,
        ExprKind::Binary {
          op: BinaryOp::Multiply,
          ..
        }
      ));
    }
    other => panic!("expected addition at the root, got {other:?}"),
  }
}

#[test]
fn shifts_bind_between_additive_and_relational() {
  // `1 << 2 + 3 < 4` parses as `(1 << (2 + 3)) < 4`.
  let expr = return_expr("int main(){ return 1 << 2 + 3 < 4; }");
  match expr.kind {
    ExprKind::Binary {
      op: BinaryOp::LessThan,
      left,
      ..
    } => match left.kind {
      ExprKind::Binary {
        op: BinaryOp::ShiftLeft,
        right,
        ..
      } => assert!(matches!(
        right.kind,
        ExprKind::Binary {
          op: BinaryOp::Add,
          ..
        }
      )),
      other => panic!("expected shift under the comparison, got {other:?}"),
    },
    other => panic!("expected comparison at the root, got {other:?}"),
  }
}

#[test]
fn binary_operators_are_left_associative() {
  // `1 - 2 - 3` parses as `(1 - 2) - 3`.
  let expr = return_expr("int main(){ return 1 - 2 - 3; }");
  match expr.kind {
    ExprKind::Binary {
      op: BinaryOp::Subtract,
      left,
      right,
    } => {
      assert!(matches!(
        left.kind,
        ExprKind::Binary {
          op: BinaryOp::Subtract,
          ..
        }
      ));
      assert!(matches!(right.kind, ExprKind::Constant(3)));
    }
    other => panic!("expected subtraction at the root, got {other:?}"),
  }
}

#[test]
fn assignment_is_right_associative() {
  let expr = return_expr("int main(){ return a = b = 1; }");
  match expr.kind {
    ExprKind::Assignment { left, right } => {
      assert!(matches!(left.kind, ExprKind::Var(ref n) if n == "a"));
      assert!(matches!(right.kind, ExprKind::Assignment { .. }));
    }
    other => panic!("expected assignment at the root, got {other:?}"),
  }
}

#[test]
fn compound_assignment_desugars_to_a_reread() {
  let expr = return_expr("int main(){ return a += 2; }");
  match expr.kind {
    ExprKind::Assignment { left, right } => {
      assert!(matches!(left.kind, ExprKind::Var(ref n) if n == "a"));
      match right.kind {
        ExprKind::Binary {
          op: BinaryOp::Add,
          left: reread,
          right: value,
        } => {
          assert!(matches!(reread.kind, ExprKind::Var(ref n) if n == "a"));
          assert!(matches!(value.kind, ExprKind::Constant(2)));
        }
        other => panic!("expected `a + 2` on the right, got {other:?}"),
      }
    }
    other => panic!("expected assignment at the root, got {other:?}"),
  }
}

#[test]
fn ternary_nests_to_the_right() {
  let expr = return_expr("int main(){ return a ? 1 : b ? 2 : 3; }");
  match expr.kind {
    ExprKind::Conditional { if_false, .. } => {
      assert!(matches!(if_false.kind, ExprKind::Conditional { .. }));
    }
    other => panic!("expected a conditional at the root, got {other:?}"),
  }
}

#[test]
fn prefix_and_postfix_map_to_add_and_subtract() {
  assert!(matches!(
    return_expr("int main(){ return ++a; }").kind,
    ExprKind::Prefix {
      op: BinaryOp::Add,
      ..
    }
  ));
  assert!(matches!(
    return_expr("int main(){ return a--; }").kind,
    ExprKind::Postfix {
      op: BinaryOp::Subtract,
      ..
    }
  ));
}

#[test]
fn unary_operators_nest() {
  let expr = return_expr("int main(){ return !~-+1; }");
  let mut ops = Vec::new();
  let mut cursor = expr;
  while let ExprKind::Unary { op, operand } = cursor.kind {
    ops.push(op);
    cursor = *operand;
  }
  assert_eq!(
    ops,
    vec![
      UnaryOp::LogicalNot,
      UnaryOp::BitwiseNot,
      UnaryOp::Negate,
      UnaryOp::UnaryAdd,
    ]
  );
  assert!(matches!(cursor.kind, ExprKind::Constant(1)));
}

#[test]
fn loops_get_distinct_parse_time_labels() {
  let items = body_items(
    "int main(){ while(1) break; while(1) break; do break; while(1); return 0; }",
  );
  let mut labels = Vec::new();
  for item in items {
    if let BlockItem::Statement(Stmt {
      kind: StmtKind::While { label, .. },
      ..
    }) = item
    {
      labels.push(label);
    }
  }
  assert_eq!(labels, vec![0, 1, 2]);
}

#[test]
fn do_while_sets_its_flag() {
  let items = body_items("int main(){ do ; while(1); return 0; }");
  assert!(matches!(
    items[0],
    BlockItem::Statement(Stmt {
      kind: StmtKind::While {
        is_do_while: true,
        ..
      },
      ..
    })
  ));
}

#[test]
fn for_parts_are_all_optional() {
  let items = body_items("int main(){ for(;;) break; return 0; }");
  match &items[0] {
    BlockItem::Statement(Stmt {
      kind:
        StmtKind::For {
          init,
          condition,
          increment,
          ..
        },
      ..
    }) => {
      assert!(init.is_none());
      assert!(condition.is_none());
      assert!(increment.is_none());
    }
    other => panic!("expected a for statement, got {other:?}"),
  }
}

#[test]
fn for_init_may_declare() {
  let items = body_items("int main(){ for(int i = 0; i < 3; i++) ; return 0; }");
  match &items[0] {
    BlockItem::Statement(Stmt {
      kind: StmtKind::For { init, .. },
      ..
    }) => {
      assert!(matches!(init, Some(ForInit::Declaration(d)) if d.name == "i"));
    }
    other => panic!("expected a for statement, got {other:?}"),
  }
}

#[test]
fn line_numbers_advance_on_semicolons() {
  let items = body_items("int main(){ int a = 1; a = 2; return a; }");
  match (&items[0], &items[1], &items[2]) {
    (
      BlockItem::Declaration(declaration),
      BlockItem::Statement(second),
      BlockItem::Statement(third),
    ) => {
      assert_eq!(declaration.position.line, 1);
      assert_eq!(declaration.position.function, "main");
      assert_eq!(second.position.line, 2);
      assert_eq!(third.position.line, 3);
    }
    other => panic!("unexpected block shape: {other:?}"),
  }
}

// ----- rejections -----

macro_rules! assert_syntax_error {
  ($source:expr) => {
    assert!(
      matches!(parse_source($source), Err(CompileError::SyntaxError { .. })),
      "expected a syntax error for {:?}",
      $source
    )
  };
}

macro_rules! assert_semantic_error {
  ($source:expr) => {
    assert!(
      matches!(parse_source($source), Err(CompileError::SemanticError { .. })),
      "expected a semantic error for {:?}",
      $source
    )
  };
}

#[rstest]
#[case("int main(){ return 0 }")]
#[case("int main(){ return 0;")]
#[case("int main() return 0; }")]
#[case("int (){ return 0; }")]
#[case("main(){ return 0; }")]
#[case("int main(){ return ; }")]
#[case("int main(){ return 1 +; }")]
#[case("int main(){ else; }")]
#[case("int main(){ if(1) int x; }")]
#[case("int main(){ do break; while(1) }")]
#[case("int main(){ return 0; } int")]
#[case("int main(){ return a ? 1 2; }")]
fn structural_violations_are_syntax_errors(#[case] source: &str) {
  assert_syntax_error!(source);
}

#[rstest]
#[case("int main(){ 5 = 1; }")]
#[case("int main(){ int a; -a = 1; return a; }")]
#[case("int main(){ (1 + 2) += 3; }")]
#[case("int main(){ ++5; }")]
#[case("int main(){ 5--; }")]
fn lvalue_violations_are_semantic_errors(#[case] source: &str) {
  assert_semantic_error!(source);
}

#[test]
fn unknown_tokens_are_rejected_by_offset() {
  let err = parse_source("int main(){ return $1; }").unwrap_err();
  match err {
    CompileError::SyntaxError { message, .. } => {
      assert!(message.contains("offset 19"), "message: {message}");
    }
    other => panic!("expected a syntax error, got {other:?}"),
  }
}

#[test]
fn diagnostics_name_expected_and_found_tokens() {
  let err = parse_source("int main(){ return 0 }").unwrap_err();
  let text = err.to_string();
  assert!(text.contains("\";\""), "diagnostic: {text}");
  assert!(text.contains("\"}\""), "diagnostic: {text}");
  assert!(text.contains("in 'main'"), "diagnostic: {text}");
}
