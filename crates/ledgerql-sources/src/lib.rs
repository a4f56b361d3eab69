//! # ledgerql-sources
//!
//! Row source drivers for the BQL query engine. Each driver registers
//! tables on a [`Connection`] behind a URI scheme:
//!
//! - `ledger:<path>` — a ledger file; registers `entries`, `postings` and
//!   `accounts` tables.
//! - `csv:<path>?name=…&header=…` — a CSV file with column types inferred
//!   from the first data row.
//! - `test:?start=…&stop=…` — an integer fixture table.
//!
//! The in-memory builder in [`memory`] has no URI scheme; its tables are
//! constructed programmatically and registered directly.

use ledgerql_engine::{Connection, Result};

pub mod csv;
pub mod ledger;
pub mod memory;
pub mod test;

/// Registers the drivers of this crate on a connection.
pub fn register_default_sources(conn: &mut Connection) {
    conn.register_source("ledger", ledger::attach);
    conn.register_source("csv", csv::attach);
    conn.register_source("test", test::attach);
}

/// Creates a connection with the default drivers registered and the given
/// source attached.
///
/// # Errors
///
/// Propagates driver failures.
pub fn connect(uri: &str) -> Result<Connection> {
    let mut conn = Connection::new();
    register_default_sources(&mut conn);
    conn.attach(uri)?;
    Ok(conn)
}

/// Splits a source URI into its path and query parameters.
///
/// The accepted shape is `scheme:path?key=value&key=value`.
pub(crate) fn parse_uri(uri: &str) -> (&str, Vec<(&str, &str)>) {
    let rest = uri.split_once(':').map_or(uri, |(_, rest)| rest);
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    let params = query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| part.split_once('=').unwrap_or((part, "")))
        .collect();
    (path, params)
}

/// Returns a query parameter by key.
pub(crate) fn param<'a>(params: &[(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, value)| *value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        let (path, params) = parse_uri("csv:/tmp/data.csv?name=prices&header=1");
        assert_eq!(path, "/tmp/data.csv");
        assert_eq!(param(&params, "name"), Some("prices"));
        assert_eq!(param(&params, "header"), Some("1"));
        assert_eq!(param(&params, "missing"), None);
    }

    #[test]
    fn test_parse_uri_without_query() {
        let (path, params) = parse_uri("ledger:books/main.ledger");
        assert_eq!(path, "books/main.ledger");
        assert!(params.is_empty());
    }
}
