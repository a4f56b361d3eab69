//! Tests for SELECT statement clause parsing.

use chrono::NaiveDate;
use ledgerql_core::ast::{
    ByColumn, CloseSpec, Expr, ExprKind, FromClause, Literal, Ordering, PivotColumn, Statement,
    Targets,
};
use ledgerql_core::parser::parse;

fn parse_select(input: &str) -> ledgerql_core::ast::Select {
    match parse(input).expect(input) {
        Statement::Select(select) => select,
        other => panic!("expected SELECT, got {other:?}"),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_select_wildcard() {
    let select = parse_select("SELECT *");
    assert_eq!(select.targets, Targets::Wildcard);
    assert!(select.from_clause.is_none());
    assert!(!select.distinct);
}

#[test]
fn test_select_distinct() {
    let select = parse_select("SELECT DISTINCT account");
    assert!(select.distinct);
}

#[test]
fn test_select_targets_with_alias() {
    let select = parse_select("SELECT date, account AS acc");
    let Targets::List(targets) = &select.targets else {
        panic!()
    };
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0].name, None);
    assert_eq!(targets[1].name, Some(String::from("acc")));
    assert_eq!(
        targets[1].expression.kind,
        ExprKind::Column(String::from("account"))
    );
}

#[test]
fn test_select_from_table_ref() {
    let select = parse_select("SELECT x FROM #test");
    assert!(matches!(
        select.from_clause,
        Some(FromClause::Table { ref name, .. }) if name == "test"
    ));
}

#[test]
fn test_select_from_empty_table_ref() {
    let select = parse_select("SELECT 1 FROM #");
    assert!(matches!(
        select.from_clause,
        Some(FromClause::Table { ref name, .. }) if name.is_empty()
    ));
}

#[test]
fn test_select_from_subselect() {
    let select = parse_select("SELECT a FROM (SELECT a, b FROM #test)");
    let Some(FromClause::Subselect(inner)) = &select.from_clause else {
        panic!("expected subselect");
    };
    let Targets::List(targets) = &inner.targets else {
        panic!()
    };
    assert_eq!(targets.len(), 2);
}

#[test]
fn test_select_from_expression() {
    let select = parse_select("SELECT 1 FROM has_account('Assets')");
    let Some(FromClause::Window(from)) = &select.from_clause else {
        panic!("expected window");
    };
    assert!(from.expression.is_some());
    assert!(from.open.is_none());
    assert!(from.close.is_none());
    assert!(!from.clear);
}

#[test]
fn test_select_from_open_close_clear() {
    let select =
        parse_select("SELECT 1 FROM OPEN ON 2014-01-01 CLOSE ON 2015-01-01 CLEAR");
    let Some(FromClause::Window(from)) = &select.from_clause else {
        panic!("expected window");
    };
    assert!(from.expression.is_none());
    assert_eq!(from.open, Some(date(2014, 1, 1)));
    assert_eq!(from.close, Some(CloseSpec::On(date(2015, 1, 1))));
    assert!(from.clear);
}

#[test]
fn test_select_from_close_without_date() {
    let select = parse_select("SELECT 1 FROM year = 2014 CLOSE");
    let Some(FromClause::Window(from)) = &select.from_clause else {
        panic!("expected window");
    };
    assert!(from.expression.is_some());
    assert_eq!(from.close, Some(CloseSpec::Last));
}

#[test]
fn test_select_where() {
    let select = parse_select("SELECT x FROM #test WHERE x < 2");
    assert!(matches!(
        select.where_clause,
        Some(Expr {
            kind: ExprKind::Binary { .. },
            ..
        })
    ));
}

#[test]
fn test_group_by_indexes_and_expressions() {
    let select = parse_select("SELECT x, sum(y) GROUP BY 1, x % 2");
    let group_by = select.group_by.unwrap();
    assert_eq!(group_by.columns.len(), 2);
    assert_eq!(group_by.columns[0], ByColumn::Index(1));
    assert!(matches!(group_by.columns[1], ByColumn::Expr(_)));
    assert!(group_by.having.is_none());
}

#[test]
fn test_group_by_having() {
    let select = parse_select("SELECT account GROUP BY account HAVING sum(number) > 0");
    let group_by = select.group_by.unwrap();
    assert!(group_by.having.is_some());
}

#[test]
fn test_order_by_directions() {
    let select = parse_select("SELECT a, b ORDER BY 1 DESC, b, a ASC");
    assert_eq!(select.order_by.len(), 3);
    assert_eq!(select.order_by[0].column, ByColumn::Index(1));
    assert_eq!(select.order_by[0].ordering, Ordering::Desc);
    assert_eq!(select.order_by[1].ordering, Ordering::Asc);
    assert_eq!(select.order_by[2].ordering, Ordering::Asc);
}

#[test]
fn test_pivot_by() {
    let select = parse_select("SELECT a, b GROUP BY 1, 2 PIVOT BY 1, b");
    let pivot = select.pivot_by.unwrap();
    assert_eq!(pivot.columns[0], PivotColumn::Index(1));
    assert_eq!(pivot.columns[1], PivotColumn::Name(String::from("b")));
}

#[test]
fn test_limit() {
    let select = parse_select("SELECT x LIMIT 10");
    assert_eq!(select.limit, Some(10));
}

#[test]
fn test_trailing_semicolon() {
    parse_select("SELECT 1;");
}

#[test]
fn test_clause_ordering() {
    let select = parse_select(
        "SELECT account, sum(position) FROM #postings WHERE number > 0 \
         GROUP BY account HAVING count(*) > 1 ORDER BY account DESC LIMIT 5",
    );
    assert!(select.where_clause.is_some());
    assert!(select.group_by.is_some());
    assert_eq!(select.order_by.len(), 1);
    assert_eq!(select.limit, Some(5));
}

#[test]
fn test_balances_statement() {
    let Statement::Balances(balances) = parse("BALANCES AT cost FROM year = 2014").unwrap()
    else {
        panic!("expected BALANCES");
    };
    assert_eq!(balances.summary_func, Some(String::from("cost")));
    assert!(balances.from_clause.is_some());
}

#[test]
fn test_journal_statement() {
    let Statement::Journal(journal) = parse("JOURNAL 'Expenses' AT units").unwrap() else {
        panic!("expected JOURNAL");
    };
    assert_eq!(journal.account, Some(String::from("Expenses")));
    assert_eq!(journal.summary_func, Some(String::from("units")));
}

#[test]
fn test_print_statement() {
    let Statement::Print(print) = parse("PRINT FROM year = 2014").unwrap() else {
        panic!("expected PRINT");
    };
    assert!(print.from_clause.is_some());
}

#[test]
fn test_list_literal_in_projection() {
    let select = parse_select("SELECT 1 IN (2, 3, 4)");
    let Targets::List(targets) = &select.targets else {
        panic!()
    };
    let ExprKind::Binary { right, .. } = &targets[0].expression.kind else {
        panic!("expected IN expression");
    };
    assert_eq!(
        right.kind,
        ExprKind::Constant(Literal::List(vec![
            Literal::Integer(2),
            Literal::Integer(3),
            Literal::Integer(4),
        ]))
    );
}
