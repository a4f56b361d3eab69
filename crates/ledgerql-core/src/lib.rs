//! # ledgerql-core
//!
//! Lexer, AST and parser for BQL, an SQL-like query language over ledgers
//! of accounting entries.
//!
//! This crate turns statement strings into trees of immutable AST nodes
//! with source spans:
//!
//! ```rust
//! use ledgerql_core::ast::{Statement, Targets};
//! use ledgerql_core::parser::parse;
//!
//! let statement = parse("SELECT account, sum(position) GROUP BY account").unwrap();
//! let Statement::Select(select) = statement else { panic!() };
//! let Targets::List(targets) = &select.targets else { panic!() };
//! assert_eq!(targets.len(), 2);
//! ```
//!
//! Type resolution, compilation and execution live in the engine crate;
//! this crate has no knowledge of tables or functions beyond their names.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use lexer::{Lexer, Span, Token, TokenKind};
pub use parser::{parse, ParseError, Parser};
