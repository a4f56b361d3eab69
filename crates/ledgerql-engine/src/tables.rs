//! The table and column accessor contract.
//!
//! A table is any object that names itself, exposes typed column
//! accessors, and yields opaque row contexts. Row contexts are type-erased
//! ([`Row`]); each table's accessors know how to read values back out of
//! the rows that table produced.

use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;

use ledgerql_core::ast::CloseSpec;

use crate::eval::EvalQuery;
use crate::execute;
use crate::render::DisplayContext;
use crate::types::DataType;
use crate::value::Value;

/// An opaque row context yielded by a table iterator.
///
/// Rows live only for the iteration that produced them; column accessors
/// downcast to the concrete row type of their table.
pub type Row = Arc<dyn Any>;

/// A column accessor: a pure function from a row context to a value of a
/// declared datatype.
///
/// Accessor equality is identity of the accessor function.
#[derive(Clone)]
pub struct Column {
    dtype: DataType,
    func: Arc<dyn Fn(&Row) -> Value>,
}

impl Column {
    /// Creates a new column accessor.
    #[must_use]
    pub fn new(dtype: DataType, func: impl Fn(&Row) -> Value + 'static) -> Self {
        Self {
            dtype,
            func: Arc::new(func),
        }
    }

    /// The declared datatype of the column.
    #[must_use]
    pub const fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Reads the column value from a row context.
    #[must_use]
    pub fn get(&self, row: &Row) -> Value {
        (self.func)(row)
    }

    /// Returns true if both columns are the same accessor.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("dtype", &self.dtype)
            .finish_non_exhaustive()
    }
}

/// The contract implemented by every row source.
pub trait Table {
    /// The table name.
    fn name(&self) -> &str;

    /// The column catalog; iteration order defines the wildcard expansion
    /// order.
    fn columns(&self) -> &IndexMap<String, Column>;

    /// The columns `SELECT *` expands to.
    fn wildcard_columns(&self) -> Vec<String> {
        self.columns().keys().cloned().collect()
    }

    /// Returns a view of this table restricted to the given date window,
    /// or `None` if unsupported, in which case the caller keeps using the
    /// original table.
    fn update(
        &self,
        open: Option<chrono::NaiveDate>,
        close: Option<CloseSpec>,
        clear: bool,
    ) -> Option<Arc<dyn Table>> {
        let _ = (open, close, clear);
        None
    }

    /// Iterates the row contexts of this table.
    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_>;

    /// The display context forwarded to renderers, unchanged.
    fn dcontext(&self) -> DisplayContext {
        DisplayContext::default()
    }
}

/// A table with exactly one NULL row; the default FROM when none is
/// specified. It enables `SELECT 1 + 1` style queries.
#[derive(Debug, Default)]
pub struct NullTable {
    columns: IndexMap<String, Column>,
}

impl NullTable {
    /// Creates the null table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Table for NullTable {
    fn name(&self) -> &str {
        ""
    }

    fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(std::iter::once(Arc::new(()) as Row))
    }
}

/// A table wrapping a compiled subquery.
///
/// Its columns are the named targets of the inner query with their
/// inferred types; iteration executes the inner plan and yields its result
/// rows as contexts indexable by column position.
pub struct SubqueryTable {
    query: EvalQuery,
    columns: IndexMap<String, Column>,
}

impl SubqueryTable {
    /// Creates a table over the given compiled query.
    #[must_use]
    pub fn new(query: EvalQuery) -> Self {
        let mut columns = IndexMap::new();
        let named = query
            .targets
            .iter()
            .filter_map(|target| target.name.clone().map(|name| (name, target.expr.dtype())));
        for (index, (name, dtype)) in named.enumerate() {
            columns.insert(
                name,
                Column::new(dtype, move |row: &Row| {
                    row.downcast_ref::<Vec<Value>>()
                        .and_then(|values| values.get(index))
                        .cloned()
                        .unwrap_or(Value::Null)
                }),
            );
        }
        Self { query, columns }
    }
}

impl Table for SubqueryTable {
    fn name(&self) -> &str {
        "subquery"
    }

    fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        let (_, rows) = execute::execute_select(&self.query);
        Box::new(rows.into_iter().map(|row| Arc::new(row) as Row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_table_yields_one_row() {
        let table = NullTable::new();
        assert_eq!(table.iter().count(), 1);
        assert!(table.wildcard_columns().is_empty());
    }

    #[test]
    fn test_column_identity() {
        let a = Column::new(DataType::Int, |_| Value::Int(1));
        let b = Column::new(DataType::Int, |_| Value::Int(1));
        let c = a.clone();
        assert!(a.ptr_eq(&c));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_update_defaults_to_unsupported() {
        let table = NullTable::new();
        assert!(table.update(None, None, true).is_none());
    }
}
