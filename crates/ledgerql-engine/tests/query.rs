//! End-to-end tests: parse, compile and execute statements against small
//! in-process tables.

use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use rust_decimal::Decimal;

use ledgerql_engine::tables::{Column, Row, Table};
use ledgerql_engine::{Connection, DataType, Error, Params, Value};

/// A table with a single integer column `x` over 0..16.
struct RangeTable {
    columns: IndexMap<String, Column>,
}

impl RangeTable {
    fn new() -> Self {
        let mut columns = IndexMap::new();
        columns.insert(
            String::from("x"),
            Column::new(DataType::Int, |row: &Row| {
                row.downcast_ref::<i64>()
                    .copied()
                    .map_or(Value::Null, Value::Int)
            }),
        );
        Self { columns }
    }
}

impl Table for RangeTable {
    fn name(&self) -> &str {
        "test"
    }

    fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new((0i64..16).map(|value| Arc::new(value) as Row))
    }
}

/// A table of (tag, val) rows; `tag` is untyped and `val` may be NULL.
struct PairsTable {
    columns: IndexMap<String, Column>,
    rows: Vec<(Value, Value)>,
}

impl PairsTable {
    fn new(rows: Vec<(Value, Value)>) -> Self {
        let mut columns = IndexMap::new();
        columns.insert(
            String::from("tag"),
            Column::new(DataType::Object, |row: &Row| {
                row.downcast_ref::<(Value, Value)>()
                    .map_or(Value::Null, |(tag, _)| tag.clone())
            }),
        );
        columns.insert(
            String::from("val"),
            Column::new(DataType::Int, |row: &Row| {
                row.downcast_ref::<(Value, Value)>()
                    .map_or(Value::Null, |(_, val)| val.clone())
            }),
        );
        Self { columns, rows }
    }
}

impl Table for PairsTable {
    fn name(&self) -> &str {
        "pairs"
    }

    fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(self.rows.iter().map(|row| Arc::new(row.clone()) as Row))
    }
}

fn connection() -> Connection {
    let mut conn = Connection::new();
    conn.register_table("test", Arc::new(RangeTable::new()));
    conn.register_table(
        "pairs",
        Arc::new(PairsTable::new(vec![
            (Value::Str(String::from("2")), Value::Int(10)),
            (Value::Str(String::from("4")), Value::Null),
            (Value::Str(String::from("1")), Value::Int(30)),
        ])),
    );
    conn
}

fn run(statement: &str) -> Vec<Vec<Value>> {
    connection()
        .execute(statement, None)
        .expect(statement)
        .fetchall()
}

fn ints(rows: &[Vec<Value>]) -> Vec<Vec<i64>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|value| match value {
                    Value::Int(i) => *i,
                    other => panic!("expected an integer, got {other:?}"),
                })
                .collect()
        })
        .collect()
}

fn dec(s: &str) -> Value {
    Value::Decimal(Decimal::from_str(s).unwrap())
}

#[test]
fn test_constant_expression_on_null_table() {
    let conn = connection();
    let mut cursor = conn.execute("SELECT 1 + 1", None).unwrap();
    let description = cursor.description().unwrap().to_vec();
    assert_eq!(description.len(), 1);
    assert_eq!(description[0].name(), "1 + 1");
    assert_eq!(description[0].datatype(), DataType::Int);
    assert_eq!(cursor.fetchall(), vec![vec![Value::Int(2)]]);
}

#[test]
fn test_constant_folding_in_plan() {
    use ledgerql_engine::eval::{EvalNode, Plan};
    let conn = connection();
    let Plan::Query(query) = conn.compile("SELECT 1 + 1", None).unwrap() else {
        panic!("expected a plain query");
    };
    assert!(matches!(
        &query.targets[0].expr,
        EvalNode::Constant {
            value: Value::Int(2),
            dtype: DataType::Int,
        }
    ));
}

#[test]
fn test_where_filter() {
    assert_eq!(
        ints(&run("SELECT x FROM #test WHERE x < 2")),
        vec![vec![0], vec![1]]
    );
}

#[test]
fn test_membership() {
    assert_eq!(run("SELECT 3 IN (2, 3, 4)"), vec![vec![Value::Bool(true)]]);
    assert_eq!(
        run("SELECT 1 NOT IN (2, 3, 4)"),
        vec![vec![Value::Bool(true)]]
    );
}

#[test]
fn test_group_by_expression() {
    // Sums of the even and odd integers in 0..16.
    let mut rows = ints(&run(
        "SELECT sum(x) FROM #test GROUP BY x % 2 ORDER BY 1",
    ));
    rows.sort();
    assert_eq!(rows, vec![vec![56], vec![64]]);
}

#[test]
fn test_aggregate_only_query() {
    assert_eq!(
        ints(&run("SELECT count(*), sum(x) FROM #test")),
        vec![vec![16, 120]]
    );
}

#[test]
fn test_count_argument_skips_nulls() {
    assert_eq!(
        ints(&run("SELECT count(val) FROM #pairs")),
        vec![vec![2]]
    );
}

#[test]
fn test_implicit_group_by() {
    let mut rows = ints(&run(
        "SELECT x % 2 AS parity, count(*) FROM #test",
    ));
    rows.sort();
    assert_eq!(rows, vec![vec![0, 8], vec![1, 8]]);
}

#[test]
fn test_implicit_group_by_can_be_disabled() {
    let mut conn = connection();
    conn.options.implicit_group_by = false;
    let err = conn
        .execute("SELECT x % 2, count(*) FROM #test", None)
        .unwrap_err();
    assert!(matches!(err, Error::Compilation { .. }));
}

#[test]
fn test_having() {
    assert_eq!(
        ints(&run(
            "SELECT x % 4 AS g FROM #test GROUP BY g HAVING sum(x) > 28 ORDER BY g",
        )),
        vec![vec![2], vec![3]]
    );
}

#[test]
fn test_order_by_mixed_directions() {
    let rows = ints(&run(
        "SELECT x % 2 AS parity, x FROM #test WHERE x < 4 ORDER BY parity, x DESC",
    ));
    assert_eq!(rows, vec![vec![0, 2], vec![0, 0], vec![1, 3], vec![1, 1]]);
}

#[test]
fn test_order_by_null_sorts_first() {
    let rows = run("SELECT val FROM #pairs ORDER BY val");
    assert_eq!(
        rows,
        vec![vec![Value::Null], vec![Value::Int(10)], vec![Value::Int(30)]]
    );
}

#[test]
fn test_distinct_preserves_first_seen_order() {
    assert_eq!(
        ints(&run("SELECT DISTINCT x % 3 FROM #test WHERE x < 6")),
        vec![vec![0], vec![1], vec![2]]
    );
}

#[test]
fn test_limit() {
    assert_eq!(
        ints(&run("SELECT x FROM #test LIMIT 3")),
        vec![vec![0], vec![1], vec![2]]
    );
}

#[test]
fn test_subselect_in_from() {
    assert_eq!(
        ints(&run(
            "SELECT y FROM (SELECT x * 2 AS y FROM #test WHERE x < 3) WHERE y > 0",
        )),
        vec![vec![2], vec![4]]
    );
}

#[test]
fn test_in_subselect() {
    assert_eq!(
        ints(&run(
            "SELECT x FROM #test WHERE x IN (SELECT x FROM #test WHERE x < 2)",
        )),
        vec![vec![0], vec![1]]
    );
}

#[test]
fn test_quantified_comparisons() {
    assert_eq!(
        ints(&run(
            "SELECT x FROM #test WHERE x >= ALL(SELECT x FROM #test)",
        )),
        vec![vec![15]]
    );
    assert_eq!(
        ints(&run(
            "SELECT x FROM #test WHERE x < 3 AND x = ANY(SELECT x FROM #test WHERE x % 2 = 0)",
        )),
        vec![vec![0], vec![2]]
    );
}

#[test]
fn test_untyped_operand_promotes_through_decimal_cast() {
    // tag is untyped; mixing it with an integer promotes both sides to
    // decimal.
    let rows = run("SELECT tag + val FROM #pairs WHERE val = 10");
    assert_eq!(rows, vec![vec![dec("12")]]);

    use ledgerql_engine::eval::Plan;
    let Plan::Query(query) = connection().compile("SELECT tag + val FROM #pairs", None).unwrap()
    else {
        panic!("expected a plain query");
    };
    assert_eq!(query.targets[0].expr.dtype(), DataType::Decimal);
}

#[test]
fn test_division_semantics() {
    assert_eq!(run("SELECT 3 / 2"), vec![vec![dec("1.5")]]);
    assert_eq!(run("SELECT 1 / 0"), vec![vec![Value::Null]]);
}

#[test]
fn test_null_logic() {
    assert_eq!(run("SELECT NOT NULL"), vec![vec![Value::Bool(true)]]);
    assert_eq!(run("SELECT NULL IS NULL"), vec![vec![Value::Bool(true)]]);
    assert_eq!(run("SELECT 1 IS NOT NULL"), vec![vec![Value::Bool(true)]]);
}

#[test]
fn test_coalesce() {
    assert_eq!(
        ints(&run("SELECT coalesce(val, 0) FROM #pairs ORDER BY 1")),
        vec![vec![0], vec![10], vec![30]]
    );
}

#[test]
fn test_parameters_positional() {
    let conn = connection();
    let params = Params::Positional(vec![Value::Int(40), Value::Int(2)]);
    let mut cursor = conn.execute("SELECT %s + %s", Some(&params)).unwrap();
    assert_eq!(cursor.fetchall(), vec![vec![Value::Int(42)]]);
}

#[test]
fn test_parameters_named() {
    let conn = connection();
    let params = Params::Named(
        [(String::from("foo"), Value::Int(2))].into_iter().collect(),
    );
    let mut cursor = conn
        .execute("SELECT %(foo)s * %(foo)s", Some(&params))
        .unwrap();
    assert_eq!(cursor.fetchall(), vec![vec![Value::Int(4)]]);
}

#[test]
fn test_parameters_mixed_styles_is_an_error() {
    let conn = connection();
    let params = Params::Positional(vec![Value::Int(1)]);
    let err = conn
        .execute("SELECT %s + %(foo)s", Some(&params))
        .unwrap_err();
    assert!(matches!(err, Error::Parameter(_)));
}

#[test]
fn test_parameters_count_mismatch() {
    let conn = connection();
    let params = Params::Positional(vec![Value::Int(1)]);
    let err = conn.execute("SELECT %s + %s", Some(&params)).unwrap_err();
    assert!(matches!(err, Error::Parameter(_)));
}

#[test]
fn test_parameters_missing_named() {
    let conn = connection();
    let params = Params::Named(
        [(String::from("other"), Value::Int(1))].into_iter().collect(),
    );
    let err = conn.execute("SELECT %(foo)s", Some(&params)).unwrap_err();
    assert!(matches!(err, Error::Parameter(_)));
}

#[test]
fn test_chained_comparison_is_a_syntax_error() {
    let conn = connection();
    let err = conn.execute("SELECT 3 = 2 = 1", None).unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert_eq!(err.to_string(), "syntax error");
}

#[test]
fn test_compilation_errors() {
    let conn = connection();
    let cases = [
        "SELECT nope FROM #test",
        "SELECT x FROM #missing",
        "SELECT nosuchfunction(x) FROM #test",
        "SELECT year(x) FROM #test",
        "SELECT x + 'foo' FROM #test",
        "SELECT sum(x) FROM #test WHERE sum(x) > 0",
        "SELECT x + sum(x) FROM #test",
        "SELECT sum(sum(x)) FROM #test",
        "SELECT x FROM #test GROUP BY 7",
        "SELECT x FROM #test ORDER BY 7",
        "SELECT x FROM #test GROUP BY sum(x)",
        "SELECT x FROM #test GROUP BY x HAVING x > 0",
        "SELECT x, x FROM #test PIVOT BY 1, 1",
        "SELECT x, sum(x) FROM #test GROUP BY 1 PIVOT BY 1, 2",
        "SELECT coalesce(x, 'a') FROM #test",
        "SELECT x IN (SELECT x, x FROM #test) FROM #test",
        "SELECT 1 FROM OPEN ON 2015-01-01 CLOSE ON 2014-01-01",
    ];
    for statement in cases {
        let err = conn.execute(statement, None).unwrap_err();
        assert!(
            matches!(err, Error::Compilation { .. }),
            "expected compilation error for {statement}, got {err:?}"
        );
    }
}

#[test]
fn test_order_by_reconciles_existing_target() {
    use ledgerql_engine::eval::Plan;
    let conn = connection();
    let Plan::Query(query) = conn
        .compile("SELECT x % 2 FROM #test ORDER BY x % 2", None)
        .unwrap()
    else {
        panic!("expected a plain query");
    };
    // The ORDER BY expression matches the target; no invisible target is
    // added.
    assert_eq!(query.targets.len(), 1);
    assert_eq!(query.order_spec, Some(vec![(0, ledgerql_core::ast::Ordering::Asc)]));
}

#[test]
fn test_group_indexes_cover_non_aggregates() {
    use ledgerql_engine::eval::Plan;
    let conn = connection();
    let Plan::Query(query) = conn
        .compile("SELECT x % 2 AS a, x % 3 AS b, sum(x) FROM #test", None)
        .unwrap()
    else {
        panic!("expected a plain query");
    };
    assert_eq!(query.group_indexes, Some(vec![0, 1]));
}

#[test]
fn test_pivot_by() {
    let rows = run(
        "SELECT x % 2 AS a, x % 3 AS b, sum(x) AS total FROM #test \
         WHERE x < 6 GROUP BY a, b PIVOT BY a, b",
    );
    // Input rows: (a, b, total) for x in 0..6:
    //   (0,0,0+... ) evens: 0,2,4 -> (0,0)=0, (0,2)=2, (0,1)=4
    //   odds: 1,3,5 -> (1,1)=1, (1,0)=3, (1,2)=5
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(0), Value::Int(0), Value::Int(4), Value::Int(2)],
            vec![Value::Int(1), Value::Int(3), Value::Int(1), Value::Int(5)],
        ]
    );

    let conn = connection();
    let mut cursor = conn
        .execute(
            "SELECT x % 2 AS a, x % 3 AS b, sum(x) AS total FROM #test \
             WHERE x < 6 GROUP BY a, b PIVOT BY a, b",
            None,
        )
        .unwrap();
    let names: Vec<String> = cursor
        .description()
        .unwrap()
        .iter()
        .map(|column| column.name().to_owned())
        .collect();
    assert_eq!(names, vec!["a/b", "0", "1", "2"]);
    assert_eq!(cursor.fetchall().len(), 2);
}

#[test]
fn test_cursor_protocol() {
    let conn = connection();
    let mut cursor = conn.cursor();
    assert_eq!(cursor.rowcount(), -1);
    assert!(cursor.description().is_none());

    cursor.execute("SELECT x FROM #test LIMIT 4", None).unwrap();
    assert_eq!(cursor.rowcount(), 4);
    assert_eq!(cursor.fetchone(), Some(vec![Value::Int(0)]));
    assert_eq!(cursor.fetchmany(Some(2)).len(), 2);
    assert_eq!(cursor.rownumber(), 3);
    assert_eq!(cursor.fetchall(), vec![vec![Value::Int(3)]]);
    assert_eq!(cursor.fetchone(), None);

    assert!(cursor.setinputsizes(&[]).is_err());
    assert!(cursor.setinputsizes(&[Some(1)]).is_ok());
}

#[test]
fn test_cursor_iteration() {
    let conn = connection();
    let cursor = conn.execute("SELECT x FROM #test LIMIT 3", None).unwrap();
    let rows: Vec<Vec<Value>> = cursor.collect();
    assert_eq!(ints(&rows), vec![vec![0], vec![1], vec![2]]);
}

#[test]
fn test_plan_reexecution_gets_fresh_aggregator_state() {
    let conn = connection();
    let plan = conn.compile("SELECT sum(x) FROM #test", None).unwrap();
    let (_, first) = ledgerql_engine::execute_query(&plan).unwrap();
    let (_, second) = ledgerql_engine::execute_query(&plan).unwrap();
    assert_eq!(first, second);
    assert_eq!(ints(&first), vec![vec![120]]);
}

#[test]
fn test_non_aggregate_query_preserves_multiplicity() {
    let rows = run("SELECT x % 2 FROM #test");
    assert_eq!(rows.len(), 16);
}
