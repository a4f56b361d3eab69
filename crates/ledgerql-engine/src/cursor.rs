//! DB-API style cursor over query results.

use std::collections::VecDeque;

use crate::compiler::{self, Params};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::eval::Plan;
use crate::execute;
use crate::types::DataType;
use crate::value::Value;

/// A result set column descriptor.
///
/// Of the seven DB-API description fields only the name and the type code
/// are meaningful; the rest are always absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    datatype: DataType,
}

impl Column {
    /// Creates a new column descriptor.
    #[must_use]
    pub const fn new(name: String, datatype: DataType) -> Self {
        Self { name, datatype }
    }

    /// The column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The column datatype.
    #[must_use]
    pub const fn datatype(&self) -> DataType {
        self.datatype
    }

    /// A stable numeric code identifying the datatype.
    #[must_use]
    pub const fn type_code(&self) -> u32 {
        match self.datatype {
            DataType::Bool => 1,
            DataType::Int => 2,
            DataType::Decimal => 3,
            DataType::Date => 4,
            DataType::Str => 5,
            DataType::Object => 6,
            DataType::List => 7,
            DataType::Set => 8,
            DataType::Map => 9,
            DataType::Amount => 10,
            DataType::Cost => 11,
            DataType::Position => 12,
            DataType::Inventory => 13,
            DataType::Asterisk => 14,
            DataType::Struct(_) => 15,
        }
    }

    /// The full seven-field DB-API description tuple.
    #[must_use]
    #[allow(clippy::type_complexity)]
    pub fn describe(
        &self,
    ) -> (
        &str,
        u32,
        Option<i64>,
        Option<i64>,
        Option<i64>,
        Option<i64>,
        Option<bool>,
    ) {
        (self.name(), self.type_code(), None, None, None, None, None)
    }
}

/// A cursor executing statements on a connection and iterating their
/// results.
pub struct Cursor<'conn> {
    connection: &'conn Connection,
    description: Option<Vec<Column>>,
    rows: Option<VecDeque<Vec<Value>>>,
    rowcount: i64,
    rownumber: usize,
    /// Default number of rows fetched by `fetchmany`.
    pub arraysize: usize,
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("description", &self.description)
            .field("rows", &self.rows)
            .field("rowcount", &self.rowcount)
            .field("rownumber", &self.rownumber)
            .field("arraysize", &self.arraysize)
            .finish()
    }
}

impl<'conn> Cursor<'conn> {
    pub(crate) fn new(connection: &'conn Connection) -> Self {
        Self {
            connection,
            description: None,
            rows: None,
            rowcount: -1,
            rownumber: 0,
            arraysize: 1,
        }
    }

    /// The connection this cursor belongs to.
    #[must_use]
    pub const fn connection(&self) -> &'conn Connection {
        self.connection
    }

    /// Parses, compiles and executes a statement, buffering its result
    /// rows.
    ///
    /// PRINT statements are executed through the connection's renderer
    /// and leave an empty result set.
    ///
    /// # Errors
    ///
    /// Returns parse, compilation and parameter errors.
    pub fn execute(&mut self, statement: &str, parameters: Option<&Params>) -> Result<&mut Self> {
        tracing::debug!(statement, "execute");
        let parsed = ledgerql_core::parse(statement)?;
        let plan = compiler::compile(self.connection, &parsed, statement, parameters)?;
        let (description, rows) = match &plan {
            Plan::Print(print) => {
                self.connection.render_print(print)?;
                (Vec::new(), Vec::new())
            }
            _ => execute::execute_query(&plan)?,
        };
        self.rowcount = i64::try_from(rows.len()).unwrap_or(i64::MAX);
        self.description = Some(description);
        self.rows = Some(rows.into());
        self.rownumber = 0;
        Ok(self)
    }

    /// Executes the statement once for every parameter set.
    ///
    /// # Errors
    ///
    /// Stops at the first failing execution.
    pub fn executemany(&mut self, statement: &str, parameters: &[Params]) -> Result<()> {
        for params in parameters {
            self.execute(statement, Some(params))?;
        }
        Ok(())
    }

    /// The result set description of the last executed statement.
    #[must_use]
    pub fn description(&self) -> Option<&[Column]> {
        self.description.as_deref()
    }

    /// The number of buffered rows at execution time, or -1 when no
    /// statement has been executed.
    #[must_use]
    pub const fn rowcount(&self) -> i64 {
        self.rowcount
    }

    /// The number of rows fetched so far.
    #[must_use]
    pub const fn rownumber(&self) -> usize {
        self.rownumber
    }

    /// Fetches the next result row.
    pub fn fetchone(&mut self) -> Option<Vec<Value>> {
        let row = self.rows.as_mut()?.pop_front()?;
        self.rownumber += 1;
        Some(row)
    }

    /// Fetches up to `size` rows, defaulting to [`Cursor::arraysize`].
    pub fn fetchmany(&mut self, size: Option<usize>) -> Vec<Vec<Value>> {
        let n = size.unwrap_or(self.arraysize);
        let mut fetched = Vec::with_capacity(n);
        for _ in 0..n {
            match self.fetchone() {
                Some(row) => fetched.push(row),
                None => break,
            }
        }
        fetched
    }

    /// Fetches all remaining rows.
    pub fn fetchall(&mut self) -> Vec<Vec<Value>> {
        let mut fetched = Vec::new();
        while let Some(row) = self.fetchone() {
            fetched.push(row);
        }
        fetched
    }

    /// Required by the DB-API; does nothing.
    pub fn close(&mut self) {}

    /// Predeclares parameter sizes. The sizes are not used, but the shape
    /// is validated.
    ///
    /// # Errors
    ///
    /// Returns an interface error when the shape is empty.
    pub fn setinputsizes(&mut self, sizes: &[Option<usize>]) -> Result<()> {
        if sizes.is_empty() {
            return Err(Error::Interface(String::from(
                "setinputsizes() requires at least one size",
            )));
        }
        Ok(())
    }

    /// Predeclares an output buffer size. The size is not used, but the
    /// column index is validated against the current description.
    ///
    /// # Errors
    ///
    /// Returns an interface error for an out-of-range column index.
    pub fn setoutputsize(&mut self, _size: usize, column: Option<usize>) -> Result<()> {
        if let (Some(column), Some(description)) = (column, &self.description) {
            if column >= description.len() {
                return Err(Error::Interface(format!(
                    "setoutputsize() column {column} out of range"
                )));
            }
        }
        Ok(())
    }
}

impl Iterator for Cursor<'_> {
    type Item = Vec<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetchone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_describe() {
        let column = Column::new(String::from("total"), DataType::Decimal);
        let (name, type_code, a, b, c, d, e) = column.describe();
        assert_eq!(name, "total");
        assert_eq!(type_code, 3);
        assert_eq!((a, b, c, d, e), (None, None, None, None, None));
    }
}
