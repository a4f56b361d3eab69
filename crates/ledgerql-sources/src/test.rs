//! Test fixture source: an integer range table.
//!
//! `test:?name=…&start=…&stop=…&step=…` registers a table whose single
//! column `x` yields the integers of the range, 0 to 15 by default.

use std::sync::Arc;

use indexmap::IndexMap;

use ledgerql_engine::tables::{Column, Row, Table};
use ledgerql_engine::{Connection, DataType, Error, Result, Value};

use crate::{param, parse_uri};

/// A table yielding one integer row per range element.
pub struct TestTable {
    name: String,
    columns: IndexMap<String, Column>,
    start: i64,
    stop: i64,
    step: i64,
}

impl TestTable {
    /// Creates a range table with a single integer column `x`.
    #[must_use]
    pub fn new(name: impl Into<String>, start: i64, stop: i64, step: i64) -> Self {
        let mut columns = IndexMap::new();
        columns.insert(
            String::from("x"),
            Column::new(DataType::Int, |row: &Row| {
                row.downcast_ref::<i64>()
                    .copied()
                    .map_or(Value::Null, Value::Int)
            }),
        );
        Self {
            name: name.into(),
            columns,
            start,
            stop,
            step: step.max(1),
        }
    }
}

impl Table for TestTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        let step = self.step;
        Box::new(
            (self.start..self.stop)
                .step_by(usize::try_from(step).unwrap_or(1))
                .map(|value| Arc::new(value) as Row),
        )
    }
}

/// Attaches a range table described by the URI query parameters.
///
/// # Errors
///
/// Returns a source error for malformed parameters.
pub fn attach(conn: &mut Connection, uri: &str) -> Result<()> {
    let (_, params) = parse_uri(uri);
    let number = |key: &str, default: i64| -> Result<i64> {
        match param(&params, key) {
            Some(value) => value
                .parse()
                .map_err(|_| Error::Source(format!("invalid {key} parameter: {value}"))),
            None => Ok(default),
        }
    };
    let name = param(&params, "name").unwrap_or("test").to_owned();
    let table = TestTable::new(
        name.clone(),
        number("start", 0)?,
        number("stop", 16)?,
        number("step", 1)?,
    );
    conn.register_table(name, Arc::new(table));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range() {
        let mut conn = Connection::new();
        attach(&mut conn, "test:").unwrap();
        let table = conn.table("test").unwrap();
        assert_eq!(table.iter().count(), 16);
    }

    #[test]
    fn test_custom_range() {
        let mut conn = Connection::new();
        attach(&mut conn, "test:?name=seq&start=2&stop=8&step=2").unwrap();
        let table = conn.table("seq").unwrap();
        let column = table.columns()["x"].clone();
        let values: Vec<Value> = table.iter().map(|row| column.get(&row)).collect();
        assert_eq!(values, vec![Value::Int(2), Value::Int(4), Value::Int(6)]);
    }

    #[test]
    fn test_invalid_parameter() {
        let mut conn = Connection::new();
        assert!(attach(&mut conn, "test:?stop=many").is_err());
    }
}
