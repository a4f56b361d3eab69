//! Tests for parser error handling.

use ledgerql_core::parser::parse;

fn assert_syntax_error(input: &str) {
    let result = parse(input);
    assert!(result.is_err(), "expected syntax error: {input}");
}

#[test]
fn test_empty_input() {
    assert_syntax_error("");
}

#[test]
fn test_unknown_statement() {
    assert_syntax_error("EXPLAIN SELECT 1");
}

#[test]
fn test_chained_comparison_is_not_associative() {
    assert_syntax_error("SELECT 3 = 2 = 1");
    assert_syntax_error("SELECT 1 < 2 < 3");
}

#[test]
fn test_parenthesized_comparison_is_fine() {
    assert!(parse("SELECT (3 = 2) = 1").is_ok());
}

#[test]
fn test_unbalanced_parens() {
    assert_syntax_error("SELECT (1 + 2");
    assert_syntax_error("SELECT 1 + 2)");
}

#[test]
fn test_missing_target() {
    assert_syntax_error("SELECT FROM #test");
    assert_syntax_error("SELECT a, FROM #test");
}

#[test]
fn test_trailing_garbage() {
    assert_syntax_error("SELECT 1 2");
    assert_syntax_error("SELECT 1; SELECT 2");
}

#[test]
fn test_malformed_clauses() {
    assert_syntax_error("SELECT a GROUP account");
    assert_syntax_error("SELECT a ORDER BY");
    assert_syntax_error("SELECT a PIVOT BY 1");
    assert_syntax_error("SELECT a LIMIT b");
}

#[test]
fn test_open_requires_on_date() {
    assert_syntax_error("SELECT 1 FROM OPEN ON");
    assert_syntax_error("SELECT 1 FROM OPEN ON 'date'");
}

#[test]
fn test_is_requires_null() {
    assert_syntax_error("SELECT x IS 1");
    assert_syntax_error("SELECT x IS NOT 1");
}

#[test]
fn test_unterminated_string() {
    assert_syntax_error("SELECT 'oops");
}

#[test]
fn test_error_reports_position() {
    let err = parse("SELECT 1 +").unwrap_err();
    assert_eq!(err.to_string(), "syntax error");
    assert!(err.span.start >= 9);
    assert_eq!(err.span.line, 1);
}

#[test]
fn test_error_reports_line() {
    let err = parse("SELECT 1,\n  FROM #test").unwrap_err();
    assert_eq!(err.span.line, 2);
}
