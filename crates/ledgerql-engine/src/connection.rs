//! Connections own the catalog of tables, functions and operators.
//!
//! All registries are per-connection; built-ins are registered during
//! construction, and source drivers add tables through [`Connection::attach`].
//! A connection and its catalog are not safe for concurrent use.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::compiler::{self, Params};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::eval::{EvalPrint, Plan};
use crate::execute;
use crate::functions::FunctionRegistry;
use crate::operators::OperatorRegistry;
use crate::render::{EntryRenderer, NullRenderer};
use crate::tables::{NullTable, Table};
use crate::types::{self, DataType, StructLayout};

/// A function attaching tables from a URI to a connection.
pub type SourceDriver = fn(&mut Connection, &str) -> Result<()>;

/// Per-connection behavior switches.
#[derive(Debug, Clone)]
pub struct Options {
    /// Whether a target list mixing aggregate and non-aggregate targets
    /// without a GROUP BY clause implicitly groups on every non-aggregate
    /// target. Non-standard but convenient; on by default.
    pub implicit_group_by: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            implicit_group_by: true,
        }
    }
}

/// A connection: the statement lifecycle entry point and the owner of all
/// registries consulted during compilation.
pub struct Connection {
    tables: IndexMap<String, Arc<dyn Table>>,
    sources: HashMap<String, SourceDriver>,
    functions: FunctionRegistry,
    operators: OperatorRegistry,
    structs: HashMap<DataType, StructLayout>,
    renderer: RefCell<Box<dyn EntryRenderer>>,
    /// Behavior switches consulted by the compiler.
    pub options: Options,
    /// Errors accumulated by attached sources.
    pub errors: Vec<String>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// Creates a connection with the built-in environment and the null
    /// table registered under the empty name.
    #[must_use]
    pub fn new() -> Self {
        let mut tables: IndexMap<String, Arc<dyn Table>> = IndexMap::new();
        tables.insert(String::new(), Arc::new(NullTable::new()));
        Self {
            tables,
            sources: HashMap::new(),
            functions: FunctionRegistry::with_builtins(),
            operators: OperatorRegistry::with_builtins(),
            structs: types::builtin_layouts().into_iter().collect(),
            renderer: RefCell::new(Box::new(NullRenderer)),
            options: Options::default(),
            errors: Vec::new(),
        }
    }

    /// Attaches a data source by URI, dispatching on the scheme.
    ///
    /// # Errors
    ///
    /// Returns a source error for unknown schemes and propagates driver
    /// failures.
    pub fn attach(&mut self, uri: &str) -> Result<()> {
        let scheme = uri.split(':').next().unwrap_or_default().to_owned();
        tracing::debug!(uri, scheme = scheme.as_str(), "attach");
        let Some(driver) = self.sources.get(scheme.as_str()).copied() else {
            return Err(Error::Source(format!("unknown source scheme \"{scheme}\"")));
        };
        driver(self, uri)
    }

    /// Registers a source driver for a URI scheme.
    pub fn register_source(&mut self, scheme: impl Into<String>, driver: SourceDriver) {
        self.sources.insert(scheme.into(), driver);
    }

    /// Registers a table under its name.
    pub fn register_table(&mut self, name: impl Into<String>, table: Arc<dyn Table>) {
        self.tables.insert(name.into(), table);
    }

    /// Registers the layout of a structured type.
    pub fn register_struct(&mut self, dtype: DataType, layout: StructLayout) {
        self.structs.insert(dtype, layout);
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<Arc<dyn Table>> {
        self.tables.get(name).cloned()
    }

    /// The names of the registered tables, in registration order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// The table queried when a statement has no FROM clause: the
    /// postings table when a ledger is attached, the null table
    /// otherwise.
    #[must_use]
    pub fn default_table(&self) -> Arc<dyn Table> {
        self.table("postings")
            .or_else(|| self.table(""))
            .unwrap_or_else(|| Arc::new(NullTable::new()))
    }

    /// The function overload registry.
    #[must_use]
    pub const fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Mutable access to the function registry, for sources registering
    /// their own functions.
    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    /// The operator overload registry.
    #[must_use]
    pub const fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    /// The layout of a structured type, if registered.
    #[must_use]
    pub fn struct_layout(&self, dtype: DataType) -> Option<&StructLayout> {
        self.structs.get(&dtype)
    }

    /// Installs the renderer receiving PRINT output.
    pub fn set_renderer(&mut self, renderer: Box<dyn EntryRenderer>) {
        *self.renderer.borrow_mut() = renderer;
    }

    /// Runs a compiled PRINT statement through the installed renderer.
    pub(crate) fn render_print(&self, print: &EvalPrint) -> Result<()> {
        execute::execute_print(print, self.renderer.borrow_mut().as_mut())
    }

    /// Creates a cursor on this connection.
    #[must_use]
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }

    /// Parses a statement.
    ///
    /// # Errors
    ///
    /// Returns a parse error for invalid syntax.
    pub fn parse(&self, statement: &str) -> Result<ledgerql_core::ast::Statement> {
        Ok(ledgerql_core::parse(statement)?)
    }

    /// Compiles a statement against this connection's catalog.
    ///
    /// # Errors
    ///
    /// Returns parse, compilation and parameter errors.
    pub fn compile(&self, statement: &str, parameters: Option<&Params>) -> Result<Plan> {
        let parsed = ledgerql_core::parse(statement)?;
        compiler::compile(self, &parsed, statement, parameters)
    }

    /// Executes a statement and returns a cursor over its results.
    ///
    /// # Errors
    ///
    /// Returns parse, compilation and parameter errors.
    pub fn execute(&self, statement: &str, parameters: Option<&Params>) -> Result<Cursor<'_>> {
        let mut cursor = self.cursor();
        cursor.execute(statement, parameters)?;
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_connection_has_null_table() {
        let conn = Connection::new();
        assert!(conn.table("").is_some());
        assert!(conn.table("postings").is_none());
        assert_eq!(conn.default_table().name(), "");
    }

    #[test]
    fn test_attach_unknown_scheme() {
        let mut conn = Connection::new();
        let err = conn.attach("nope:whatever").unwrap_err();
        assert!(matches!(err, Error::Source(_)));
    }

    #[test]
    fn test_register_source() {
        fn driver(conn: &mut Connection, _uri: &str) -> Result<()> {
            conn.register_table("t", Arc::new(NullTable::new()));
            Ok(())
        }
        let mut conn = Connection::new();
        conn.register_source("demo", driver);
        conn.attach("demo:").unwrap();
        assert!(conn.table("t").is_some());
    }
}
