//! In-memory table builder.
//!
//! Rows are plain value vectors indexed positionally by the column
//! accessors; useful for tests and for programs assembling small result
//! tables by hand.

use std::sync::Arc;

use indexmap::IndexMap;

use ledgerql_engine::tables::{Column, Row, Table};
use ledgerql_engine::{Connection, DataType, Error, Result, Value};

/// An in-memory table with typed columns and explicitly inserted rows.
pub struct MemoryTable {
    name: String,
    columns: IndexMap<String, Column>,
    rows: Vec<Arc<Vec<Value>>>,
}

impl MemoryTable {
    /// Creates an empty table with the given column names and types.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: &[(&str, DataType)]) -> Self {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(index, (cname, dtype))| {
                let column = Column::new(*dtype, move |row: &Row| {
                    row.downcast_ref::<Vec<Value>>()
                        .and_then(|values| values.get(index))
                        .cloned()
                        .unwrap_or(Value::Null)
                });
                ((*cname).to_owned(), column)
            })
            .collect();
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// Returns a source error when the row width does not match the
    /// column count.
    pub fn insert(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::Source(format!(
                "row has {} values but table \"{}\" has {} columns",
                row.len(),
                self.name,
                self.columns.len()
            )));
        }
        self.rows.push(Arc::new(row));
        Ok(())
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(self.rows.iter().map(|row| row.clone() as Row))
    }
}

/// Builds a table and registers it on the connection.
///
/// # Errors
///
/// Returns a source error for rows of the wrong width.
pub fn create(
    conn: &mut Connection,
    name: &str,
    columns: &[(&str, DataType)],
    rows: Vec<Vec<Value>>,
) -> Result<()> {
    let mut table = MemoryTable::new(name, columns);
    for row in rows {
        table.insert(row)?;
    }
    conn.register_table(name, Arc::new(table));
    Ok(())
}
