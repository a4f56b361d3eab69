//! CSV source driver.
//!
//! `csv:<path>?name=…` registers a table over a CSV file with a header
//! row. Column types are inferred from the first data row by running each
//! field through the lexer's literal productions (date, decimal, integer,
//! boolean); everything not recognized as something else is a string.
//! Field values are converted lazily by the column accessors; conversion
//! failures read as NULL.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use indexmap::IndexMap;
use rust_decimal::Decimal;

use ledgerql_core::lexer::{Keyword, Lexer, TokenKind};
use ledgerql_engine::tables::{Column, Row, Table};
use ledgerql_engine::{Connection, DataType, Error, Result, Value};

use crate::{param, parse_uri};

/// A table over the records of a CSV file.
pub struct CsvTable {
    name: String,
    columns: IndexMap<String, Column>,
    records: Vec<Arc<::csv::StringRecord>>,
}

impl CsvTable {
    /// Builds a table from a file with a header row, inferring column
    /// types from the first data record.
    ///
    /// # Errors
    ///
    /// Returns a source error when the file cannot be read.
    pub fn open(name: impl Into<String>, path: &Path) -> Result<Self> {
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(::csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(|err| Error::Source(format!("cannot read {}: {err}", path.display())))?;

        let mut records = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|err| Error::Source(format!("malformed CSV record: {err}")))?;
            records.push(Arc::new(record));
        }
        let Some(header) = records.first() else {
            return Err(Error::Source(format!("empty CSV file: {}", path.display())));
        };

        let mut columns = IndexMap::new();
        let first_data = records.get(1);
        for (index, cname) in header.iter().enumerate() {
            let dtype = first_data
                .and_then(|record| record.get(index))
                .map_or(DataType::Str, guess_type);
            columns.insert(cname.to_owned(), make_column(index, dtype));
        }
        let records = records.split_off(1);

        Ok(Self {
            name: name.into(),
            columns,
            records,
        })
    }

    /// Builds a table from a file with an explicit schema instead of
    /// inferring column types; the file is read without a header row.
    ///
    /// # Errors
    ///
    /// Returns a source error when the file cannot be read.
    pub fn open_with_schema(
        name: impl Into<String>,
        path: &Path,
        schema: &[(&str, DataType)],
    ) -> Result<Self> {
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(::csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(|err| Error::Source(format!("cannot read {}: {err}", path.display())))?;
        let mut records = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|err| Error::Source(format!("malformed CSV record: {err}")))?;
            records.push(Arc::new(record));
        }
        let columns = schema
            .iter()
            .enumerate()
            .map(|(index, (cname, dtype))| ((*cname).to_owned(), make_column(index, *dtype)))
            .collect();
        Ok(Self {
            name: name.into(),
            columns,
            records,
        })
    }
}

impl Table for CsvTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(self.records.iter().map(|record| record.clone() as Row))
    }
}

/// Guesses the datatype of a CSV field from the lexer's literal
/// productions.
fn guess_type(value: &str) -> DataType {
    let tokens = Lexer::new(value).tokenize();
    let [token, eof] = tokens.as_slice() else {
        return DataType::Str;
    };
    if !eof.is_eof() {
        return DataType::Str;
    }
    match &token.kind {
        TokenKind::Date(_) => DataType::Date,
        TokenKind::Decimal(_) => DataType::Decimal,
        TokenKind::Integer(_) => DataType::Int,
        TokenKind::String(_) => DataType::Str,
        TokenKind::Keyword(Keyword::True | Keyword::False) => DataType::Bool,
        _ => DataType::Str,
    }
}

/// Builds the accessor converting one CSV field to its column type.
fn make_column(index: usize, dtype: DataType) -> Column {
    Column::new(dtype, move |row: &Row| {
        let Some(field) = row
            .downcast_ref::<::csv::StringRecord>()
            .and_then(|record| record.get(index))
        else {
            return Value::Null;
        };
        convert(field, dtype)
    })
}

fn convert(field: &str, dtype: DataType) -> Value {
    match dtype {
        DataType::Date => NaiveDate::parse_from_str(field, "%Y-%m-%d")
            .map_or(Value::Null, Value::Date),
        DataType::Decimal => field
            .parse::<Decimal>()
            .map_or(Value::Null, Value::Decimal),
        DataType::Int => field.parse::<i64>().map_or(Value::Null, Value::Int),
        DataType::Bool => match field.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Value::Bool(true),
            "0" | "false" => Value::Bool(false),
            _ => Value::Null,
        },
        _ => Value::Str(field.to_owned()),
    }
}

/// Attaches a CSV file described by the URI.
///
/// The table name is taken from the `name` parameter, defaulting to the
/// file stem.
///
/// # Errors
///
/// Returns a source error when the file cannot be read or the encoding is
/// not UTF-8.
pub fn attach(conn: &mut Connection, uri: &str) -> Result<()> {
    let (path, params) = parse_uri(uri);
    if let Some(encoding) = param(&params, "encoding") {
        if !encoding.eq_ignore_ascii_case("utf-8") && !encoding.eq_ignore_ascii_case("utf8") {
            return Err(Error::Source(format!("unsupported encoding: {encoding}")));
        }
    }
    let path = Path::new(path);
    let name = param(&params, "name")
        .map(ToOwned::to_owned)
        .or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| String::from("csv"));
    let table = CsvTable::open(name.clone(), path)?;
    conn.register_table(name, Arc::new(table));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_csv(content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("ledgerql-csv-test-{}.csv", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_guess_type() {
        assert_eq!(guess_type("2014-01-01"), DataType::Date);
        assert_eq!(guess_type("10.20"), DataType::Decimal);
        assert_eq!(guess_type("42"), DataType::Int);
        assert_eq!(guess_type("TRUE"), DataType::Bool);
        assert_eq!(guess_type("'quoted'"), DataType::Str);
        assert_eq!(guess_type("plain text"), DataType::Str);
    }

    #[test]
    fn test_attach_and_query() {
        let path = write_csv("date,amount,payee\n2014-01-01,10.50,Cafe\n2014-01-02,3.00,Bakery\n");
        let mut conn = Connection::new();
        conn.register_source("csv", attach);
        conn.attach(&format!("csv:{}?name=expenses", path.display()))
            .unwrap();

        let table = conn.table("expenses").unwrap();
        assert_eq!(table.columns()["date"].dtype(), DataType::Date);
        assert_eq!(table.columns()["amount"].dtype(), DataType::Decimal);
        assert_eq!(table.columns()["payee"].dtype(), DataType::Str);

        let mut cursor = conn
            .execute("SELECT payee FROM #expenses WHERE amount > 5", None)
            .unwrap();
        assert_eq!(cursor.fetchall(), vec![vec![Value::Str(String::from("Cafe"))]]);
        std::fs::remove_file(path).ok();
    }
}
