//! Ledger file source driver.
//!
//! `ledger:<path>` loads a plain-text ledger and registers the `entries`,
//! `postings` and `accounts` tables. The reader accepts a minimal
//! line-oriented dialect:
//!
//! ```text
//! 2014-01-05 open Assets:Cash USD
//! 2014-01-09 * "Cafe" "Coffee" #food
//!   Expenses:Food:Coffee    4.50 USD
//!   Assets:Cash
//! 2014-12-31 close Assets:Cash
//! ```
//!
//! Transactions balance automatically: a single posting without an amount
//! absorbs the residual. Malformed entries are skipped and reported
//! through the connection's error list rather than failing the load.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use indexmap::IndexMap;
use rust_decimal::Decimal;

use ledgerql_core::ast::CloseSpec;
use ledgerql_engine::tables::{Column, Row, Table};
use ledgerql_engine::{
    Amount, Connection, Cost, DataType, DisplayContext, Error, Field, Inventory, Position,
    Result, StructLayout, Value,
};

use crate::parse_uri;

/// A transaction with its postings.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Transaction date.
    pub date: NaiveDate,
    /// Completion flag, `*` or `!`.
    pub flag: String,
    /// Optional payee.
    pub payee: Option<String>,
    /// Narration text.
    pub narration: String,
    /// Tags (`#tag`).
    pub tags: BTreeSet<String>,
    /// Links (`^link`).
    pub links: BTreeSet<String>,
    /// Transaction metadata.
    pub meta: BTreeMap<String, Value>,
    /// The legs of the transaction.
    pub postings: Vec<Posting>,
}

/// One leg of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    /// The posted account.
    pub account: String,
    /// The posted units.
    pub units: Amount,
    /// Cost basis, if any.
    pub cost: Option<Cost>,
    /// Price annotation (`@`), if any.
    pub price: Option<Amount>,
    /// Posting metadata.
    pub meta: BTreeMap<String, Value>,
}

impl Posting {
    /// The weight used for balancing: the cost value when a cost basis is
    /// attached, the price value when a price is attached, the units
    /// otherwise.
    #[must_use]
    pub fn weight(&self) -> Amount {
        if let Some(cost) = &self.cost {
            return Amount::new(self.units.number * cost.number, cost.currency.clone());
        }
        if let Some(price) = &self.price {
            return Amount::new(self.units.number * price.number, price.currency.clone());
        }
        self.units.clone()
    }
}

/// An account opening directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Open {
    /// Directive date.
    pub date: NaiveDate,
    /// The opened account.
    pub account: String,
    /// Currency constraints, if any.
    pub currencies: Vec<String>,
}

/// An account closing directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Close {
    /// Directive date.
    pub date: NaiveDate,
    /// The closed account.
    pub account: String,
}

/// A dated ledger directive.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// An account opening.
    Open(Open),
    /// An account closing.
    Close(Close),
    /// A transaction.
    Transaction(Arc<Transaction>),
}

impl Directive {
    /// The directive date.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Open(open) => open.date,
            Self::Close(close) => close.date,
            Self::Transaction(txn) => txn.date,
        }
    }
}

/// A loaded ledger: directives in date order plus load diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    /// The directives, sorted by date.
    pub entries: Vec<Directive>,
    /// Problems encountered while loading.
    pub errors: Vec<String>,
    /// Display options forwarded to renderers.
    pub dcontext: DisplayContext,
}

impl Ledger {
    /// Reads a ledger file.
    ///
    /// # Errors
    ///
    /// Returns a source error when the file cannot be read; malformed
    /// entries are reported in [`Ledger::errors`] instead.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::Source(format!("cannot read {}: {err}", path.display())))?;
        Ok(Self::parse(&text))
    }

    /// Parses ledger text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Reader::default().read(text)
    }
}

#[derive(Default)]
struct Reader {
    entries: Vec<Directive>,
    errors: Vec<String>,
}

impl Reader {
    fn read(mut self, text: &str) -> Ledger {
        let mut lines = text.lines().enumerate().peekable();
        while let Some((lineno, line)) = lines.next() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('*') {
                continue;
            }
            if line.starts_with(char::is_whitespace) {
                self.errors
                    .push(format!("line {}: unexpected indented line", lineno + 1));
                continue;
            }

            let Some((date, rest)) = split_date(trimmed) else {
                self.errors
                    .push(format!("line {}: expected a dated directive", lineno + 1));
                continue;
            };

            let mut words = rest.split_whitespace();
            match words.next() {
                Some("open") => {
                    let Some(account) = words.next() else {
                        self.errors
                            .push(format!("line {}: open without an account", lineno + 1));
                        continue;
                    };
                    let currencies = words
                        .flat_map(|word| word.split(','))
                        .filter(|currency| !currency.is_empty())
                        .map(ToOwned::to_owned)
                        .collect();
                    self.entries.push(Directive::Open(Open {
                        date,
                        account: account.to_owned(),
                        currencies,
                    }));
                }
                Some("close") => {
                    let Some(account) = words.next() else {
                        self.errors
                            .push(format!("line {}: close without an account", lineno + 1));
                        continue;
                    };
                    self.entries.push(Directive::Close(Close {
                        date,
                        account: account.to_owned(),
                    }));
                }
                Some(flag @ ("*" | "!" | "txn")) => {
                    let flag = if flag == "txn" { "*" } else { flag };
                    // Collect the indented continuation lines.
                    let mut body = Vec::new();
                    while let Some((_, next)) = lines.peek() {
                        if next.starts_with(char::is_whitespace) && !next.trim().is_empty() {
                            body.push(lines.next().map(|(_, line)| line).unwrap_or_default());
                        } else {
                            break;
                        }
                    }
                    match self.read_transaction(date, flag, rest, &body) {
                        Ok(txn) => {
                            self.entries.push(Directive::Transaction(Arc::new(txn)));
                        }
                        Err(message) => {
                            self.errors.push(format!("line {}: {message}", lineno + 1));
                        }
                    }
                }
                _ => {
                    self.errors
                        .push(format!("line {}: unknown directive", lineno + 1));
                }
            }
        }

        self.entries.sort_by_key(Directive::date);
        Ledger {
            entries: self.entries,
            errors: self.errors,
            dcontext: DisplayContext::default(),
        }
    }

    fn read_transaction(
        &mut self,
        date: NaiveDate,
        flag: &str,
        header: &str,
        body: &[&str],
    ) -> std::result::Result<Transaction, String> {
        let strings = quoted_strings(header);
        let (payee, narration) = match strings.as_slice() {
            [] => (None, String::new()),
            [narration] => (None, narration.clone()),
            [payee, narration, ..] => (Some(payee.clone()), narration.clone()),
        };
        let mut tags = BTreeSet::new();
        let mut links = BTreeSet::new();
        for word in header.split_whitespace() {
            if let Some(tag) = word.strip_prefix('#') {
                tags.insert(tag.to_owned());
            }
            if let Some(link) = word.strip_prefix('^') {
                links.insert(link.to_owned());
            }
        }

        let mut meta = BTreeMap::new();
        let mut postings: Vec<Posting> = Vec::new();
        let mut elided: Vec<String> = Vec::new();

        for line in body {
            let trimmed = line.trim();
            if trimmed.starts_with(';') {
                continue;
            }
            if let Some((key, value)) = metadata_line(trimmed) {
                match postings.last_mut() {
                    Some(posting) => posting.meta.insert(key, value),
                    None => meta.insert(key, value),
                };
                continue;
            }
            let (account, rest) = trimmed
                .split_once(char::is_whitespace)
                .map_or((trimmed, ""), |(account, rest)| (account, rest.trim()));
            if rest.is_empty() {
                elided.push(account.to_owned());
                continue;
            }
            let posting = read_posting(account, rest)?;
            postings.push(posting);
        }

        // Automatic balancing: one amountless posting absorbs the
        // residual weight.
        let mut residual = Inventory::new();
        for posting in &postings {
            residual.add_amount(&posting.weight());
        }
        match elided.as_slice() {
            [] => {
                if !residual.is_empty() {
                    return Err(format!("transaction does not balance: {residual}"));
                }
            }
            [account] => {
                for position in residual.neg().positions() {
                    postings.push(Posting {
                        account: account.clone(),
                        units: position.units,
                        cost: None,
                        price: None,
                        meta: BTreeMap::new(),
                    });
                }
            }
            _ => {
                return Err(String::from(
                    "only one posting may have its amount elided",
                ));
            }
        }

        Ok(Transaction {
            date,
            flag: flag.to_owned(),
            payee,
            narration,
            tags,
            links,
            meta,
            postings,
        })
    }
}

/// Splits a leading ISO date off a directive line.
fn split_date(line: &str) -> Option<(NaiveDate, &str)> {
    let (date, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(date, rest)| (date, rest.trim()));
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|date| (date, rest))
}

/// Extracts the double-quoted strings of a line, in order.
fn quoted_strings(line: &str) -> Vec<String> {
    let mut strings = Vec::new();
    let mut rest = line;
    while let Some(start) = rest.find('"') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('"') else {
            break;
        };
        strings.push(after[..end].to_owned());
        rest = &after[end + 1..];
    }
    strings
}

/// Recognizes a `key: value` metadata line; keys start lowercase, which
/// distinguishes them from capitalized account names.
fn metadata_line(line: &str) -> Option<(String, Value)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    let mut chars = key.chars();
    let first = chars.next()?;
    if !first.is_ascii_lowercase()
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return None;
    }
    Some((key.to_owned(), metadata_value(value.trim())))
}

fn metadata_value(value: &str) -> Value {
    if let Some(stripped) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        return Value::Str(stripped.to_owned());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Value::Date(date);
    }
    if let Ok(number) = value.parse::<i64>() {
        return Value::Int(number);
    }
    if let Ok(number) = value.parse::<Decimal>() {
        return Value::Decimal(number);
    }
    match value {
        "TRUE" => Value::Bool(true),
        "FALSE" => Value::Bool(false),
        _ => Value::Str(value.to_owned()),
    }
}

/// Parses `NUMBER CURRENCY`.
fn parse_amount(text: &str) -> std::result::Result<Amount, String> {
    let mut words = text.split_whitespace();
    let (Some(number), Some(currency), None) = (words.next(), words.next(), words.next()) else {
        return Err(format!("malformed amount: {text}"));
    };
    let number = number
        .parse::<Decimal>()
        .map_err(|_| format!("malformed number: {number}"))?;
    Ok(Amount::new(number, currency))
}

/// Parses the remainder of a posting line after the account name:
/// `NUMBER CURRENCY [{COST}] [@ PRICE]`.
fn read_posting(account: &str, rest: &str) -> std::result::Result<Posting, String> {
    let (rest, price) = match rest.split_once('@') {
        Some((head, price)) => (head.trim(), Some(parse_amount(price.trim())?)),
        None => (rest, None),
    };
    let (units, cost) = match rest.split_once('{') {
        Some((head, tail)) => {
            let spec = tail
                .strip_suffix('}')
                .ok_or_else(|| format!("unterminated cost: {rest}"))?;
            (head.trim(), Some(read_cost(spec)?))
        }
        None => (rest.trim(), None),
    };
    let units = parse_amount(units)?;
    let cost = match cost {
        Some((number, currency, date, label)) => Some(Cost {
            number,
            currency,
            date: date.unwrap_or_default(),
            label,
        }),
        None => None,
    };
    Ok(Posting {
        account: account.to_owned(),
        units,
        cost,
        price,
        meta: BTreeMap::new(),
    })
}

type CostSpec = (Decimal, String, Option<NaiveDate>, Option<String>);

/// Parses a cost specification: `NUMBER CURRENCY [, DATE] [, "LABEL"]`.
fn read_cost(spec: &str) -> std::result::Result<CostSpec, String> {
    let mut parts = spec.split(',').map(str::trim);
    let amount = parse_amount(parts.next().unwrap_or_default())?;
    let mut date = None;
    let mut label = None;
    for part in parts {
        if let Some(stripped) = part.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
            label = Some(stripped.to_owned());
        } else if let Ok(parsed) = NaiveDate::parse_from_str(part, "%Y-%m-%d") {
            date = Some(parsed);
        } else {
            return Err(format!("malformed cost component: {part}"));
        }
    }
    Ok((amount.number, amount.currency, date, label))
}

/// Restricts entries to a date window. CLEAR is accepted and ignored by
/// this source; summarization is left to full-featured loaders.
fn filter_entries(
    entries: &[Directive],
    open: Option<NaiveDate>,
    close: Option<CloseSpec>,
) -> Vec<Directive> {
    entries
        .iter()
        .filter(|entry| {
            let date = entry.date();
            if open.is_some_and(|open| date < open) {
                return false;
            }
            if let Some(CloseSpec::On(close)) = close {
                if date >= close {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect()
}

/// One row of the postings table: a transaction leg with the running
/// balance up to and including it.
#[derive(Debug, Clone)]
pub struct PostingRow {
    /// The owning transaction.
    pub entry: Arc<Transaction>,
    /// Index of the posting within the transaction.
    pub index: usize,
    /// Running balance over the whole journal.
    pub balance: Inventory,
}

impl PostingRow {
    fn posting(&self) -> &Posting {
        &self.entry.postings[self.index]
    }
}

fn string_set(values: &BTreeSet<String>) -> Value {
    Value::Set(values.iter().cloned().map(Value::Str).collect())
}

/// The transactions of the ledger, one row per directive.
pub struct EntriesTable {
    entries: Vec<Directive>,
    dcontext: DisplayContext,
    columns: IndexMap<String, Column>,
}

impl EntriesTable {
    fn new(entries: Vec<Directive>, dcontext: DisplayContext) -> Self {
        let mut columns = IndexMap::new();
        let with = |f: fn(&Directive) -> Value| f;

        let date = with(|entry| Value::Date(entry.date()));
        let flag = with(|entry| match entry {
            Directive::Transaction(txn) => Value::Str(txn.flag.clone()),
            _ => Value::Null,
        });
        let payee = with(|entry| match entry {
            Directive::Transaction(txn) => txn.payee.clone().map_or(Value::Null, Value::Str),
            _ => Value::Null,
        });
        let narration = with(|entry| match entry {
            Directive::Transaction(txn) => Value::Str(txn.narration.clone()),
            _ => Value::Null,
        });
        let account = with(|entry| match entry {
            Directive::Open(open) => Value::Str(open.account.clone()),
            Directive::Close(close) => Value::Str(close.account.clone()),
            Directive::Transaction(_) => Value::Null,
        });
        let tags = with(|entry| match entry {
            Directive::Transaction(txn) => string_set(&txn.tags),
            _ => Value::Null,
        });
        let links = with(|entry| match entry {
            Directive::Transaction(txn) => string_set(&txn.links),
            _ => Value::Null,
        });
        let meta = with(|entry| match entry {
            Directive::Transaction(txn) => Value::Map(txn.meta.clone()),
            _ => Value::Null,
        });

        let accessors: [(&str, DataType, fn(&Directive) -> Value); 8] = [
            ("date", DataType::Date, date),
            ("flag", DataType::Str, flag),
            ("payee", DataType::Str, payee),
            ("narration", DataType::Str, narration),
            ("account", DataType::Str, account),
            ("tags", DataType::Set, tags),
            ("links", DataType::Set, links),
            ("meta", DataType::Map, meta),
        ];
        for (name, dtype, accessor) in accessors {
            columns.insert(
                name.to_owned(),
                Column::new(dtype, move |row: &Row| {
                    row.downcast_ref::<Directive>()
                        .map_or(Value::Null, accessor)
                }),
            );
        }

        Self {
            entries,
            dcontext,
            columns,
        }
    }
}

impl Table for EntriesTable {
    fn name(&self) -> &str {
        "entries"
    }

    fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    fn wildcard_columns(&self) -> Vec<String> {
        self.columns
            .keys()
            .filter(|name| *name != "meta")
            .cloned()
            .collect()
    }

    fn update(
        &self,
        open: Option<NaiveDate>,
        close: Option<CloseSpec>,
        _clear: bool,
    ) -> Option<Arc<dyn Table>> {
        Some(Arc::new(Self::new(
            filter_entries(&self.entries, open, close),
            self.dcontext.clone(),
        )))
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(
            self.entries
                .iter()
                .map(|entry| Arc::new(entry.clone()) as Row),
        )
    }

    fn dcontext(&self) -> DisplayContext {
        self.dcontext.clone()
    }
}

/// The journal of postings, one row per transaction leg.
pub struct PostingsTable {
    entries: Vec<Directive>,
    rows: Vec<Arc<PostingRow>>,
    dcontext: DisplayContext,
    columns: IndexMap<String, Column>,
}

impl PostingsTable {
    fn new(entries: Vec<Directive>, dcontext: DisplayContext) -> Self {
        let mut rows = Vec::new();
        let mut balance = Inventory::new();
        for entry in &entries {
            if let Directive::Transaction(txn) = entry {
                for index in 0..txn.postings.len() {
                    balance.add_position(&Position::new(
                        txn.postings[index].units.clone(),
                        txn.postings[index].cost.clone(),
                    ));
                    rows.push(Arc::new(PostingRow {
                        entry: txn.clone(),
                        index,
                        balance: balance.clone(),
                    }));
                }
            }
        }

        let mut columns = IndexMap::new();
        let with = |f: fn(&PostingRow) -> Value| f;

        let date = with(|row| Value::Date(row.entry.date));
        let flag = with(|row| Value::Str(row.entry.flag.clone()));
        let payee = with(|row| row.entry.payee.clone().map_or(Value::Null, Value::Str));
        let narration = with(|row| Value::Str(row.entry.narration.clone()));
        let account = with(|row| Value::Str(row.posting().account.clone()));
        let number = with(|row| Value::Decimal(row.posting().units.number));
        let currency = with(|row| Value::Str(row.posting().units.currency.clone()));
        let position = with(|row| {
            Value::Position(Position::new(
                row.posting().units.clone(),
                row.posting().cost.clone(),
            ))
        });
        let price = with(|row| row.posting().price.clone().map_or(Value::Null, Value::Amount));
        let weight = with(|row| Value::Amount(row.posting().weight()));
        let balance = with(|row| Value::Inventory(row.balance.clone()));
        let tags = with(|row| string_set(&row.entry.tags));
        let links = with(|row| string_set(&row.entry.links));
        let meta = with(|row| Value::Map(row.posting().meta.clone()));
        let entry = with(|row| Value::Object(row.entry.clone()));

        let accessors: [(&str, DataType, fn(&PostingRow) -> Value); 15] = [
            ("date", DataType::Date, date),
            ("flag", DataType::Str, flag),
            ("payee", DataType::Str, payee),
            ("narration", DataType::Str, narration),
            ("account", DataType::Str, account),
            ("number", DataType::Decimal, number),
            ("currency", DataType::Str, currency),
            ("position", DataType::Position, position),
            ("price", DataType::Amount, price),
            ("weight", DataType::Amount, weight),
            ("balance", DataType::Inventory, balance),
            ("tags", DataType::Set, tags),
            ("links", DataType::Set, links),
            ("meta", DataType::Map, meta),
            ("entry", ENTRY_TYPE, entry),
        ];
        for (name, dtype, accessor) in accessors {
            columns.insert(
                name.to_owned(),
                Column::new(dtype, move |row: &Row| {
                    row.downcast_ref::<PostingRow>()
                        .map_or(Value::Null, accessor)
                }),
            );
        }

        Self {
            entries,
            rows,
            dcontext,
            columns,
        }
    }
}

impl Table for PostingsTable {
    fn name(&self) -> &str {
        "postings"
    }

    fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    fn wildcard_columns(&self) -> Vec<String> {
        self.columns
            .keys()
            .filter(|name| *name != "meta" && *name != "entry")
            .cloned()
            .collect()
    }

    fn update(
        &self,
        open: Option<NaiveDate>,
        close: Option<CloseSpec>,
        _clear: bool,
    ) -> Option<Arc<dyn Table>> {
        Some(Arc::new(Self::new(
            filter_entries(&self.entries, open, close),
            self.dcontext.clone(),
        )))
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(self.rows.iter().map(|row| row.clone() as Row))
    }

    fn dcontext(&self) -> DisplayContext {
        self.dcontext.clone()
    }
}

/// One row of the accounts table.
#[derive(Debug, Clone)]
struct AccountRow {
    account: String,
    open_date: Option<NaiveDate>,
    close_date: Option<NaiveDate>,
}

/// The accounts seen in open and close directives.
pub struct AccountsTable {
    rows: Vec<Arc<AccountRow>>,
    columns: IndexMap<String, Column>,
}

impl AccountsTable {
    fn new(entries: &[Directive]) -> Self {
        let mut accounts: IndexMap<String, AccountRow> = IndexMap::new();
        for entry in entries {
            match entry {
                Directive::Open(open) => {
                    accounts
                        .entry(open.account.clone())
                        .or_insert_with(|| AccountRow {
                            account: open.account.clone(),
                            open_date: None,
                            close_date: None,
                        })
                        .open_date = Some(open.date);
                }
                Directive::Close(close) => {
                    accounts
                        .entry(close.account.clone())
                        .or_insert_with(|| AccountRow {
                            account: close.account.clone(),
                            open_date: None,
                            close_date: None,
                        })
                        .close_date = Some(close.date);
                }
                Directive::Transaction(_) => {}
            }
        }

        let mut columns = IndexMap::new();
        let with = |f: fn(&AccountRow) -> Value| f;
        let account = with(|row| Value::Str(row.account.clone()));
        let open_date = with(|row| row.open_date.map_or(Value::Null, Value::Date));
        let close_date = with(|row| row.close_date.map_or(Value::Null, Value::Date));
        let accessors: [(&str, DataType, fn(&AccountRow) -> Value); 3] = [
            ("account", DataType::Str, account),
            ("open_date", DataType::Date, open_date),
            ("close_date", DataType::Date, close_date),
        ];
        for (name, dtype, accessor) in accessors {
            columns.insert(
                name.to_owned(),
                Column::new(dtype, move |row: &Row| {
                    row.downcast_ref::<AccountRow>()
                        .map_or(Value::Null, accessor)
                }),
            );
        }

        Self {
            rows: accounts.into_values().map(Arc::new).collect(),
            columns,
        }
    }
}

impl Table for AccountsTable {
    fn name(&self) -> &str {
        "accounts"
    }

    fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Row> + '_> {
        Box::new(self.rows.iter().map(|row| row.clone() as Row))
    }
}

/// The structured type of the postings table's `entry` column.
pub const ENTRY_TYPE: DataType = DataType::Struct("entry");

fn entry_layout() -> StructLayout {
    fn txn(value: &Value) -> Option<&Transaction> {
        match value {
            Value::Object(object) => object.downcast_ref::<Transaction>(),
            _ => None,
        }
    }
    StructLayout::new(vec![
        Field::new("date", DataType::Date, |v| {
            txn(v).map_or(Value::Null, |t| Value::Date(t.date))
        }),
        Field::new("flag", DataType::Str, |v| {
            txn(v).map_or(Value::Null, |t| Value::Str(t.flag.clone()))
        }),
        Field::new("payee", DataType::Str, |v| {
            txn(v).and_then(|t| t.payee.clone()).map_or(Value::Null, Value::Str)
        }),
        Field::new("narration", DataType::Str, |v| {
            txn(v).map_or(Value::Null, |t| Value::Str(t.narration.clone()))
        }),
        Field::new("tags", DataType::Set, |v| {
            txn(v).map_or(Value::Null, |t| string_set(&t.tags))
        }),
        Field::new("links", DataType::Set, |v| {
            txn(v).map_or(Value::Null, |t| string_set(&t.links))
        }),
        Field::new("meta", DataType::Map, |v| {
            txn(v).map_or(Value::Null, |t| Value::Map(t.meta.clone()))
        }),
    ])
}

/// Registers the ledger tables and the `entry` structured type on a
/// connection.
pub fn add_ledger_tables(conn: &mut Connection, ledger: &Ledger) {
    conn.register_struct(ENTRY_TYPE, entry_layout());
    conn.register_table(
        "entries",
        Arc::new(EntriesTable::new(
            ledger.entries.clone(),
            ledger.dcontext.clone(),
        )),
    );
    conn.register_table(
        "postings",
        Arc::new(PostingsTable::new(
            ledger.entries.clone(),
            ledger.dcontext.clone(),
        )),
    );
    conn.register_table("accounts", Arc::new(AccountsTable::new(&ledger.entries)));
    conn.errors.extend(ledger.errors.iter().cloned());
}

/// Attaches a ledger file.
///
/// # Errors
///
/// Returns a source error when the file cannot be read.
pub fn attach(conn: &mut Connection, uri: &str) -> Result<()> {
    let (path, _) = parse_uri(uri);
    let ledger = Ledger::load(Path::new(path))?;
    tracing::debug!(
        entries = ledger.entries.len(),
        errors = ledger.errors.len(),
        "ledger loaded"
    );
    add_ledger_tables(conn, &ledger);
    Ok(())
}
