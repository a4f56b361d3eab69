//! # ledgerql-engine
//!
//! The BQL query engine: type system, table contract, compiler, executor
//! and the connection/cursor statement lifecycle.
//!
//! A statement string enters a [`Connection`], is parsed by
//! `ledgerql-core` into an AST, compiled against the connection's table
//! and function catalog into a typed [`eval::Plan`], and executed into a
//! result description and rows exposed row-by-row through a
//! [`cursor::Cursor`]:
//!
//! ```rust
//! use ledgerql_engine::Connection;
//!
//! let conn = Connection::new();
//! let mut cursor = conn.execute("SELECT 1 + 1", None).unwrap();
//! let rows = cursor.fetchall();
//! assert_eq!(rows.len(), 1);
//! ```
//!
//! Concrete row sources (ledger files, CSV, in-memory tables) live in the
//! `ledgerql-sources` crate and plug in behind the [`tables::Table`]
//! contract.

pub mod compiler;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod eval;
pub mod execute;
pub mod functions;
mod hashable;
pub mod operators;
pub mod render;
pub mod tables;
pub mod types;
pub mod value;

pub use compiler::{compile, Params};
pub use connection::{Connection, Options, SourceDriver};
pub use cursor::{Column, Cursor};
pub use error::{Error, Result};
pub use execute::{execute_print, execute_query};
pub use render::{DisplayContext, EntryRenderer};
pub use tables::{NullTable, Row, SubqueryTable, Table};
pub use types::{ArgType, DataType, Field, StructLayout};
pub use value::{Amount, Cost, Inventory, Position, Value};
