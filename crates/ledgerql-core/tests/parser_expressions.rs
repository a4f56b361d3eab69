//! Tests for expression parsing: precedence, operators, literals.

use ledgerql_core::ast::{
    BinaryOp, Expr, ExprKind, Literal, Placeholder, Quantifier, Statement, Targets, UnaryOp,
};
use ledgerql_core::parser::parse;

/// Parses `SELECT <input>` and returns the single target expression.
fn parse_expr(input: &str) -> Expr {
    let statement = parse(&format!("SELECT {input}")).expect(input);
    let Statement::Select(select) = statement else {
        panic!("expected SELECT");
    };
    let Targets::List(mut targets) = select.targets else {
        panic!("expected target list");
    };
    assert_eq!(targets.len(), 1, "more than one target: {input}");
    targets.remove(0).expression
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        Default::default(),
    )
}

fn integer(value: i64) -> Expr {
    Expr::new(ExprKind::Constant(Literal::Integer(value)), Default::default())
}

fn column(name: &str) -> Expr {
    Expr::new(ExprKind::Column(String::from(name)), Default::default())
}

#[test]
fn test_literals() {
    assert_eq!(parse_expr("42").kind, ExprKind::Constant(Literal::Integer(42)));
    assert_eq!(
        parse_expr("'hello'").kind,
        ExprKind::Constant(Literal::String(String::from("hello")))
    );
    assert_eq!(parse_expr("TRUE").kind, ExprKind::Constant(Literal::Boolean(true)));
    assert_eq!(parse_expr("NULL").kind, ExprKind::Constant(Literal::Null));
}

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    let expr = parse_expr("1 + 2 * 3");
    assert_eq!(
        expr,
        binary(
            BinaryOp::Add,
            integer(1),
            binary(BinaryOp::Mul, integer(2), integer(3)),
        )
    );
}

#[test]
fn test_left_associativity() {
    let expr = parse_expr("1 - 2 - 3");
    assert_eq!(
        expr,
        binary(
            BinaryOp::Sub,
            binary(BinaryOp::Sub, integer(1), integer(2)),
            integer(3),
        )
    );
}

#[test]
fn test_parenthesized_grouping() {
    let expr = parse_expr("(1 + 2) * 3");
    assert_eq!(
        expr,
        binary(
            BinaryOp::Mul,
            binary(BinaryOp::Add, integer(1), integer(2)),
            integer(3),
        )
    );
}

#[test]
fn test_unary_negation() {
    let expr = parse_expr("-x + 1");
    let ExprKind::Binary { op: BinaryOp::Add, left, .. } = expr.kind else {
        panic!("expected addition");
    };
    assert!(matches!(
        left.kind,
        ExprKind::Unary {
            op: UnaryOp::Neg,
            ..
        }
    ));
}

#[test]
fn test_not_binds_looser_than_comparison() {
    let expr = parse_expr("NOT x = 1");
    let ExprKind::Unary { op: UnaryOp::Not, operand } = expr.kind else {
        panic!("expected NOT");
    };
    assert!(matches!(
        operand.kind,
        ExprKind::Binary {
            op: BinaryOp::Eq,
            ..
        }
    ));
}

#[test]
fn test_and_or_collect_flat_argument_lists() {
    let expr = parse_expr("a AND b AND c OR d");
    let ExprKind::Or(args) = expr.kind else {
        panic!("expected OR");
    };
    assert_eq!(args.len(), 2);
    let ExprKind::And(args) = &args[0].kind else {
        panic!("expected AND");
    };
    assert_eq!(args.len(), 3);
}

#[test]
fn test_comparison_operators() {
    for (text, op) in [
        ("=", BinaryOp::Eq),
        ("!=", BinaryOp::NotEq),
        ("<", BinaryOp::Lt),
        ("<=", BinaryOp::LtEq),
        (">", BinaryOp::Gt),
        (">=", BinaryOp::GtEq),
        ("~", BinaryOp::Match),
        ("!~", BinaryOp::NotMatch),
        ("?~", BinaryOp::Matches),
    ] {
        let expr = parse_expr(&format!("a {text} b"));
        assert_eq!(expr, binary(op, column("a"), column("b")), "{text}");
    }
}

#[test]
fn test_is_null() {
    assert!(matches!(
        parse_expr("x IS NULL").kind,
        ExprKind::Unary {
            op: UnaryOp::IsNull,
            ..
        }
    ));
    assert!(matches!(
        parse_expr("x IS NOT NULL").kind,
        ExprKind::Unary {
            op: UnaryOp::IsNotNull,
            ..
        }
    ));
}

#[test]
fn test_between() {
    let expr = parse_expr("x BETWEEN 1 AND 10");
    let ExprKind::Between { lower, upper, .. } = expr.kind else {
        panic!("expected BETWEEN");
    };
    assert_eq!(*lower, integer(1));
    assert_eq!(*upper, integer(10));
}

#[test]
fn test_between_and_does_not_swallow_conjunction() {
    let expr = parse_expr("x BETWEEN 1 AND 10 AND y");
    assert!(matches!(expr.kind, ExprKind::And(_)));
}

#[test]
fn test_in_and_not_in() {
    assert!(matches!(
        parse_expr("x IN (1, 2)").kind,
        ExprKind::Binary {
            op: BinaryOp::In,
            ..
        }
    ));
    assert!(matches!(
        parse_expr("x NOT IN (1, 2)").kind,
        ExprKind::Binary {
            op: BinaryOp::NotIn,
            ..
        }
    ));
}

#[test]
fn test_single_element_list_requires_trailing_comma() {
    let expr = parse_expr("x IN (1,)");
    let ExprKind::Binary { right, .. } = expr.kind else {
        panic!("expected IN");
    };
    assert_eq!(
        right.kind,
        ExprKind::Constant(Literal::List(vec![Literal::Integer(1)]))
    );
}

#[test]
fn test_function_call() {
    let expr = parse_expr("maxwidth(narration, 80)");
    let ExprKind::Function { name, operands } = expr.kind else {
        panic!("expected function");
    };
    assert_eq!(name, "maxwidth");
    assert_eq!(operands.len(), 2);
}

#[test]
fn test_function_call_no_args() {
    let expr = parse_expr("today()");
    assert!(matches!(
        expr.kind,
        ExprKind::Function { ref name, ref operands } if name == "today" && operands.is_empty()
    ));
}

#[test]
fn test_count_star() {
    let expr = parse_expr("count(*)");
    let ExprKind::Function { name, operands } = expr.kind else {
        panic!("expected function");
    };
    assert_eq!(name, "count");
    assert_eq!(operands.len(), 1);
    assert_eq!(operands[0].kind, ExprKind::Asterisk);
}

#[test]
fn test_attribute_and_subscript() {
    let expr = parse_expr("entry.meta['key']");
    let ExprKind::Subscript { operand, key } = expr.kind else {
        panic!("expected subscript");
    };
    assert_eq!(key, "key");
    assert!(matches!(
        operand.kind,
        ExprKind::Attribute { ref name, .. } if name == "meta"
    ));
}

#[test]
fn test_placeholders() {
    assert_eq!(
        parse_expr("%s + %s").kind,
        ExprKind::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::new(
                ExprKind::Placeholder(Placeholder::Positional(0)),
                Default::default(),
            )),
            right: Box::new(Expr::new(
                ExprKind::Placeholder(Placeholder::Positional(1)),
                Default::default(),
            )),
        }
    );
    assert_eq!(
        parse_expr("%(foo)s").kind,
        ExprKind::Placeholder(Placeholder::Named(String::from("foo")))
    );
}

#[test]
fn test_quantified_comparison() {
    let expr = parse_expr("x = ANY(SELECT y FROM #test)");
    let ExprKind::Quantified { op, quantifier, .. } = expr.kind else {
        panic!("expected quantified comparison");
    };
    assert_eq!(op, BinaryOp::Eq);
    assert_eq!(quantifier, Quantifier::Any);

    let expr = parse_expr("x < ALL(SELECT y FROM #test)");
    assert!(matches!(
        expr.kind,
        ExprKind::Quantified {
            quantifier: Quantifier::All,
            ..
        }
    ));
}

#[test]
fn test_in_subselect() {
    let expr = parse_expr("x IN (SELECT y FROM #test)");
    let ExprKind::Binary { op: BinaryOp::In, right, .. } = expr.kind else {
        panic!("expected IN");
    };
    assert!(matches!(right.kind, ExprKind::Subselect(_)));
}

#[test]
fn test_expression_text_roundtrip() {
    // Re-parsing the source text of a node produces an equal node.
    for input in [
        "1 + 1",
        "a * (b + c)",
        "sum(cost(position))",
        "x BETWEEN 1 AND 10",
        "account ~ 'Expenses' AND year(date) = 2014",
    ] {
        let source = format!("SELECT {input}");
        let statement = parse(&source).unwrap();
        let Statement::Select(select) = &statement else {
            panic!()
        };
        let Targets::List(targets) = &select.targets else {
            panic!()
        };
        let text = targets[0].expression.text(&source);
        let reparsed = parse_expr(text);
        assert_eq!(reparsed, targets[0].expression, "{input}");
    }
}
