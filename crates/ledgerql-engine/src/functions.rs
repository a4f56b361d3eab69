//! The function registry and the built-in function environment.
//!
//! Functions are registered as overloads in a flat table keyed by name and
//! input-type tuple; resolution scans the table in registration order and
//! the first matching signature wins. The registry is owned by the
//! connection, so different connections may expose different environments.

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::eval::{AggKind, ScalarFn};
use crate::types::ArgType::{self, Any, T};
use crate::types::{signature_matches, DataType as D, DataType};
use crate::value::{Amount, Value};

/// How an overload's output type is derived.
#[derive(Debug, Clone, Copy)]
pub enum OutType {
    /// A fixed output type.
    Fixed(DataType),
    /// The type of the first operand.
    SameAsFirst,
}

impl OutType {
    /// Resolves the output type for the given operand types.
    #[must_use]
    pub fn resolve(&self, operands: &[DataType]) -> DataType {
        match self {
            Self::Fixed(dtype) => *dtype,
            Self::SameAsFirst => operands.first().copied().unwrap_or(DataType::Object),
        }
    }
}

/// A scalar function overload.
#[derive(Debug, Clone, Copy)]
pub struct FuncDef {
    /// The function name, lowercased.
    pub name: &'static str,
    /// The declared input types.
    pub intypes: &'static [ArgType],
    /// The output type.
    pub out: OutType,
    /// Pure overloads are folded when every operand is constant.
    pub pure: bool,
    /// Whether the implementation handles NULL arguments itself.
    pub nullsafe: bool,
    /// The implementation.
    pub call: ScalarFn,
}

/// An aggregator overload.
#[derive(Debug, Clone, Copy)]
pub struct AggDef {
    /// The function name, lowercased.
    pub name: &'static str,
    /// The declared input types.
    pub intypes: &'static [ArgType],
    /// The output type.
    pub out: OutType,
    /// The aggregation behavior.
    pub kind: AggKind,
}

/// A registry entry: a scalar function or an aggregator.
#[derive(Debug, Clone, Copy)]
pub enum FuncEntry {
    /// A scalar overload.
    Scalar(&'static FuncDef),
    /// An aggregator overload.
    Aggregate(&'static AggDef),
}

impl FuncEntry {
    fn name(&self) -> &'static str {
        match self {
            Self::Scalar(def) => def.name,
            Self::Aggregate(def) => def.name,
        }
    }

    fn intypes(&self) -> &'static [ArgType] {
        match self {
            Self::Scalar(def) => def.intypes,
            Self::Aggregate(def) => def.intypes,
        }
    }
}

/// The overload table for functions and aggregators.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    entries: Vec<FuncEntry>,
}

impl FunctionRegistry {
    /// Creates a registry holding the built-in environment.
    #[must_use]
    pub fn with_builtins() -> Self {
        Self {
            entries: SCALARS
                .iter()
                .map(FuncEntry::Scalar)
                .chain(AGGREGATES.iter().map(FuncEntry::Aggregate))
                .collect(),
        }
    }

    /// Registers an additional overload; it is consulted after the
    /// existing ones.
    pub fn register(&mut self, entry: FuncEntry) {
        self.entries.push(entry);
    }

    /// Resolves an overload for the given name and operand types.
    #[must_use]
    pub fn lookup(&self, name: &str, operands: &[DataType]) -> Option<FuncEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name() == name && signature_matches(entry.intypes(), operands))
            .copied()
    }
}

// Conversion helpers shared by the implementations below. Arities are
// validated by signature matching before any of these run.

fn as_str(value: &Value) -> Option<&str> {
    match value {
        Value::Str(s) => Some(s),
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

fn as_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        _ => None,
    }
}

fn compile_regex(pattern: &str) -> Option<regex::Regex> {
    regex::Regex::new(pattern).ok()
}

// Type casts. Failures convert to NULL.

fn cast_bool(args: &[Value]) -> Value {
    Value::Bool(args[0].is_truthy())
}

fn cast_int(args: &[Value]) -> Value {
    match &args[0] {
        Value::Int(i) => Value::Int(*i),
        Value::Bool(b) => Value::Int(i64::from(*b)),
        Value::Decimal(d) => d.trunc().to_i64().map_or(Value::Null, Value::Int),
        Value::Str(s) => s.trim().parse().map_or(Value::Null, Value::Int),
        _ => Value::Null,
    }
}

fn cast_decimal(args: &[Value]) -> Value {
    match &args[0] {
        Value::Decimal(d) => Value::Decimal(*d),
        Value::Int(i) => Value::Decimal(Decimal::from(*i)),
        Value::Bool(b) => Value::Decimal(Decimal::from(i64::from(*b))),
        Value::Str(s) => s.trim().parse().map_or(Value::Null, Value::Decimal),
        _ => Value::Null,
    }
}

fn cast_str(args: &[Value]) -> Value {
    Value::Str(args[0].to_string())
}

fn cast_date(args: &[Value]) -> Value {
    match &args[0] {
        Value::Date(d) => Value::Date(*d),
        Value::Str(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map_or(Value::Null, Value::Date),
        _ => Value::Null,
    }
}

fn date_from_ymd(args: &[Value]) -> Value {
    match (as_int(&args[0]), as_int(&args[1]), as_int(&args[2])) {
        (Some(y), Some(m), Some(d)) => {
            let (Ok(y), Ok(m), Ok(d)) = (i32::try_from(y), u32::try_from(m), u32::try_from(d))
            else {
                return Value::Null;
            };
            NaiveDate::from_ymd_opt(y, m, d).map_or(Value::Null, Value::Date)
        }
        _ => Value::Null,
    }
}

// Numeric functions.

fn fn_abs(args: &[Value]) -> Value {
    match &args[0] {
        Value::Int(i) => Value::Int(i.abs()),
        Value::Decimal(d) => Value::Decimal(d.abs()),
        Value::Position(p) => Value::Position(crate::value::Position {
            units: p.units.abs(),
            cost: p.cost.clone(),
        }),
        Value::Inventory(inv) => Value::Inventory(inv.abs()),
        _ => Value::Null,
    }
}

fn fn_neg(args: &[Value]) -> Value {
    match &args[0] {
        Value::Decimal(d) => Value::Decimal(-d),
        Value::Amount(a) => Value::Amount(a.neg()),
        Value::Position(p) => Value::Position(p.neg()),
        Value::Inventory(inv) => Value::Inventory(inv.neg()),
        _ => Value::Null,
    }
}

fn fn_safediv(args: &[Value]) -> Value {
    let x = match &args[0] {
        Value::Decimal(d) => *d,
        _ => return Value::Null,
    };
    let y = match &args[1] {
        Value::Decimal(d) => *d,
        Value::Int(i) => Decimal::from(*i),
        _ => return Value::Null,
    };
    if y.is_zero() {
        return Value::Decimal(Decimal::ZERO);
    }
    x.checked_div(y).map_or(Value::Null, Value::Decimal)
}

fn fn_round(args: &[Value]) -> Value {
    let digits = args.get(1).and_then(as_int).unwrap_or(0);
    let Ok(digits) = u32::try_from(digits) else {
        return Value::Null;
    };
    match &args[0] {
        Value::Decimal(d) => Value::Decimal(d.round_dp(digits)),
        Value::Int(i) => Value::Int(*i),
        _ => Value::Null,
    }
}

// String functions.

fn fn_length(args: &[Value]) -> Value {
    let length = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Set(items) => items.len(),
        _ => return Value::Null,
    };
    i64::try_from(length).map_or(Value::Null, Value::Int)
}

/// Collapses whitespace runs, then truncates on word boundaries with a
/// placeholder when the text does not fit the width.
fn fn_maxwidth(args: &[Value]) -> Value {
    const PLACEHOLDER: &str = " [...]";
    let (Some(s), Some(n)) = (as_str(&args[0]), as_int(&args[1])) else {
        return Value::Null;
    };
    let Ok(width) = usize::try_from(n) else {
        return Value::Null;
    };
    let words: Vec<&str> = s.split_whitespace().collect();
    let text = words.join(" ");
    if text.chars().count() <= width {
        return Value::Str(text);
    }
    let Some(budget) = width.checked_sub(PLACEHOLDER.len()) else {
        return Value::Null;
    };
    let mut kept = String::new();
    let mut length = 0;
    for word in &words {
        let count = word.chars().count();
        let needed = if kept.is_empty() { count } else { count + 1 };
        if length + needed > budget {
            break;
        }
        if !kept.is_empty() {
            kept.push(' ');
        }
        kept.push_str(word);
        length += needed;
    }
    if kept.is_empty() {
        // Not even the first word fits: break it.
        kept = words
            .first()
            .map(|word| word.chars().take(budget).collect())
            .unwrap_or_default();
    }
    if kept.is_empty() {
        return Value::Str(PLACEHOLDER.trim_start().to_owned());
    }
    kept.push_str(PLACEHOLDER);
    Value::Str(kept)
}

fn fn_substr(args: &[Value]) -> Value {
    let (Some(s), Some(start), Some(end)) =
        (as_str(&args[0]), as_int(&args[1]), as_int(&args[2]))
    else {
        return Value::Null;
    };
    let chars: Vec<char> = s.chars().collect();
    let clamp = |i: i64| -> usize {
        if i < 0 {
            chars.len().saturating_sub(i.unsigned_abs() as usize)
        } else {
            (i as usize).min(chars.len())
        }
    };
    let (start, end) = (clamp(start), clamp(end));
    Value::Str(chars[start..end.max(start)].iter().collect())
}

fn fn_splitcomp(args: &[Value]) -> Value {
    let (Some(s), Some(delim), Some(index)) =
        (as_str(&args[0]), as_str(&args[1]), as_int(&args[2]))
    else {
        return Value::Null;
    };
    let parts: Vec<&str> = s.split(delim).collect();
    let index = if index < 0 {
        parts.len() as i64 + index
    } else {
        index
    };
    usize::try_from(index)
        .ok()
        .and_then(|i| parts.get(i))
        .map_or(Value::Null, |part| Value::Str((*part).to_owned()))
}

fn fn_upper(args: &[Value]) -> Value {
    as_str(&args[0]).map_or(Value::Null, |s| Value::Str(s.to_uppercase()))
}

fn fn_lower(args: &[Value]) -> Value {
    as_str(&args[0]).map_or(Value::Null, |s| Value::Str(s.to_lowercase()))
}

fn fn_grep(args: &[Value]) -> Value {
    let (Some(pattern), Some(s)) = (as_str(&args[0]), as_str(&args[1])) else {
        return Value::Null;
    };
    compile_regex(pattern)
        .and_then(|re| re.find(s).map(|m| Value::Str(m.as_str().to_owned())))
        .unwrap_or(Value::Null)
}

fn fn_grepn(args: &[Value]) -> Value {
    let (Some(pattern), Some(s), Some(n)) =
        (as_str(&args[0]), as_str(&args[1]), as_int(&args[2]))
    else {
        return Value::Null;
    };
    let Ok(group) = usize::try_from(n) else {
        return Value::Null;
    };
    compile_regex(pattern)
        .and_then(|re| {
            re.captures(s)
                .and_then(|caps| caps.get(group).map(|m| Value::Str(m.as_str().to_owned())))
        })
        .unwrap_or(Value::Null)
}

fn fn_subst(args: &[Value]) -> Value {
    let (Some(pattern), Some(repl), Some(s)) =
        (as_str(&args[0]), as_str(&args[1]), as_str(&args[2]))
    else {
        return Value::Null;
    };
    compile_regex(pattern).map_or(Value::Null, |re| {
        Value::Str(re.replace_all(s, repl).into_owned())
    })
}

fn fn_joinstr(args: &[Value]) -> Value {
    match &args[0] {
        Value::Set(items) => {
            let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
            Value::Str(parts.join(","))
        }
        _ => Value::Null,
    }
}

fn fn_findfirst(args: &[Value]) -> Value {
    let Some(pattern) = as_str(&args[0]) else {
        return Value::Null;
    };
    let Value::Set(items) = &args[1] else {
        return Value::Null;
    };
    let Some(re) = compile_regex(pattern) else {
        return Value::Null;
    };
    for item in items {
        if let Value::Str(s) = item {
            if re.is_match(s) {
                return item.clone();
            }
        }
    }
    Value::Null
}

// Date functions.

fn fn_year(args: &[Value]) -> Value {
    as_date(&args[0]).map_or(Value::Null, |d| Value::Int(i64::from(d.year())))
}

fn fn_month(args: &[Value]) -> Value {
    as_date(&args[0]).map_or(Value::Null, |d| Value::Int(i64::from(d.month())))
}

fn fn_day(args: &[Value]) -> Value {
    as_date(&args[0]).map_or(Value::Null, |d| Value::Int(i64::from(d.day())))
}

fn fn_yearmonth(args: &[Value]) -> Value {
    as_date(&args[0])
        .and_then(|d| NaiveDate::from_ymd_opt(d.year(), d.month(), 1))
        .map_or(Value::Null, Value::Date)
}

fn fn_quarter(args: &[Value]) -> Value {
    as_date(&args[0]).map_or(Value::Null, |d| {
        Value::Str(format!("{:04}-Q{}", d.year(), (d.month() - 1) / 3 + 1))
    })
}

fn fn_weekday(args: &[Value]) -> Value {
    as_date(&args[0]).map_or(Value::Null, |d| Value::Str(d.format("%a").to_string()))
}

fn fn_today(_args: &[Value]) -> Value {
    Value::Date(chrono::Local::now().date_naive())
}

fn fn_date_diff(args: &[Value]) -> Value {
    match (as_date(&args[0]), as_date(&args[1])) {
        (Some(x), Some(y)) => Value::Int(x.signed_duration_since(y).num_days()),
        _ => Value::Null,
    }
}

fn fn_date_add(args: &[Value]) -> Value {
    match (as_date(&args[0]), as_int(&args[1])) {
        (Some(x), Some(days)) => x
            .checked_add_signed(chrono::Duration::days(days))
            .map_or(Value::Null, Value::Date),
        _ => Value::Null,
    }
}

fn fn_date_part(args: &[Value]) -> Value {
    let (Some(field), Some(d)) = (as_str(&args[0]), as_date(&args[1])) else {
        return Value::Null;
    };
    let value = match field {
        "weekday" | "dow" => i64::from(d.weekday().num_days_from_monday()),
        "isoweekday" | "isodow" => i64::from(d.weekday().number_from_monday()),
        "week" => i64::from(d.iso_week().week()),
        "month" => i64::from(d.month()),
        "quarter" => i64::from((d.month() - 1) / 3 + 1),
        "year" => i64::from(d.year()),
        "isoyear" => i64::from(d.iso_week().year()),
        "decade" => i64::from(d.year() / 10),
        "century" => i64::from((d.year() - 1) / 100 + 1),
        "millennium" => i64::from((d.year() - 1) / 1000 + 1),
        "epoch" => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(d);
            d.signed_duration_since(epoch).num_seconds()
        }
        _ => return Value::Null,
    };
    Value::Int(value)
}

fn fn_date_trunc(args: &[Value]) -> Value {
    let (Some(field), Some(d)) = (as_str(&args[0]), as_date(&args[1])) else {
        return Value::Null;
    };
    let truncated = match field {
        "week" => {
            let days = i64::from(d.weekday().num_days_from_monday());
            d.checked_sub_signed(chrono::Duration::days(days))
        }
        "month" => NaiveDate::from_ymd_opt(d.year(), d.month(), 1),
        "quarter" => NaiveDate::from_ymd_opt(d.year(), d.month() - (d.month() - 1) % 3, 1),
        "year" => NaiveDate::from_ymd_opt(d.year(), 1, 1),
        "decade" => NaiveDate::from_ymd_opt(d.year() - d.year().rem_euclid(10), 1, 1),
        "century" => NaiveDate::from_ymd_opt(d.year() - (d.year() - 1).rem_euclid(100), 1, 1),
        "millennium" => NaiveDate::from_ymd_opt(d.year() - (d.year() - 1).rem_euclid(1000), 1, 1),
        _ => None,
    };
    truncated.map_or(Value::Null, Value::Date)
}

// Account name functions. Account components are separated by colons and
// the root component determines the sort order of the five account types.

fn fn_root(args: &[Value]) -> Value {
    let Some(account) = as_str(&args[0]) else {
        return Value::Null;
    };
    let n = args.get(1).and_then(as_int).unwrap_or(1).max(0) as usize;
    let parts: Vec<&str> = account.split(':').take(n).collect();
    Value::Str(parts.join(":"))
}

fn fn_parent(args: &[Value]) -> Value {
    let Some(account) = as_str(&args[0]) else {
        return Value::Null;
    };
    match account.rsplit_once(':') {
        Some((parent, _)) => Value::Str(parent.to_owned()),
        None => Value::Str(String::new()),
    }
}

fn fn_leaf(args: &[Value]) -> Value {
    let Some(account) = as_str(&args[0]) else {
        return Value::Null;
    };
    let leaf = account.rsplit_once(':').map_or(account, |(_, leaf)| leaf);
    Value::Str(leaf.to_owned())
}

fn fn_account_sortkey(args: &[Value]) -> Value {
    let Some(account) = as_str(&args[0]) else {
        return Value::Null;
    };
    let root = account.split(':').next().unwrap_or(account);
    let index = match root {
        "Assets" => 0,
        "Liabilities" => 1,
        "Equity" => 2,
        "Income" => 3,
        "Expenses" => 4,
        _ => 5,
    };
    Value::Str(format!("{index}-{account}"))
}

// Operations on amounts, positions and inventories.

fn fn_number(args: &[Value]) -> Value {
    match &args[0] {
        Value::Amount(a) => Value::Decimal(a.number),
        _ => Value::Null,
    }
}

fn fn_currency(args: &[Value]) -> Value {
    match &args[0] {
        Value::Amount(a) => Value::Str(a.currency.clone()),
        _ => Value::Null,
    }
}

fn fn_units(args: &[Value]) -> Value {
    match &args[0] {
        Value::Position(p) => Value::Amount(p.units.clone()),
        Value::Inventory(inv) => Value::Inventory(inv.units()),
        _ => Value::Null,
    }
}

fn fn_cost(args: &[Value]) -> Value {
    match &args[0] {
        Value::Position(p) => Value::Amount(p.cost_value()),
        Value::Inventory(inv) => Value::Inventory(inv.cost()),
        _ => Value::Null,
    }
}

fn fn_only(args: &[Value]) -> Value {
    let (Some(currency), Value::Inventory(inv)) = (as_str(&args[0]), &args[1]) else {
        return Value::Null;
    };
    Value::Amount(inv.currency_units(currency))
}

fn fn_empty(args: &[Value]) -> Value {
    match &args[0] {
        Value::Inventory(inv) => Value::Bool(inv.is_empty()),
        _ => Value::Null,
    }
}

fn fn_filter_currency(args: &[Value]) -> Value {
    let Some(currency) = as_str(&args[1]) else {
        return Value::Null;
    };
    match &args[0] {
        Value::Position(p) if p.units.currency == currency => Value::Position(p.clone()),
        Value::Position(_) => Value::Null,
        Value::Inventory(inv) => Value::Inventory(inv.filter_currency(currency)),
        _ => Value::Null,
    }
}

// Subscript access. The three-argument form takes a default and handles
// NULL arguments itself, so that a NULL default does not wipe a present
// value.

fn fn_getitem(args: &[Value]) -> Value {
    let Value::Map(map) = &args[0] else {
        return Value::Null;
    };
    let Some(key) = as_str(&args[1]) else {
        return Value::Null;
    };
    match map.get(key) {
        Some(value) => value.clone(),
        None => args.get(2).cloned().unwrap_or(Value::Null),
    }
}

/// Builds an amount; mainly useful with the memory and CSV sources where
/// numbers and currencies arrive in separate columns.
fn fn_amount(args: &[Value]) -> Value {
    match (&args[0], as_str(&args[1])) {
        (Value::Decimal(number), Some(currency)) => {
            Value::Amount(Amount::new(*number, currency))
        }
        (Value::Int(number), Some(currency)) => {
            Value::Amount(Amount::new(Decimal::from(*number), currency))
        }
        _ => Value::Null,
    }
}

const fn f(
    name: &'static str,
    intypes: &'static [ArgType],
    out: OutType,
    call: ScalarFn,
) -> FuncDef {
    FuncDef {
        name,
        intypes,
        out,
        pure: true,
        nullsafe: false,
        call,
    }
}

/// The built-in scalar overloads, in resolution order.
static SCALARS: &[FuncDef] = &[
    // Casts.
    f("bool", &[Any], OutType::Fixed(D::Bool), cast_bool),
    f("int", &[T(D::Int)], OutType::Fixed(D::Int), cast_int),
    f("int", &[T(D::Bool)], OutType::Fixed(D::Int), cast_int),
    f("int", &[T(D::Decimal)], OutType::Fixed(D::Int), cast_int),
    f("int", &[T(D::Str)], OutType::Fixed(D::Int), cast_int),
    f("int", &[T(D::Object)], OutType::Fixed(D::Int), cast_int),
    f("decimal", &[T(D::Decimal)], OutType::Fixed(D::Decimal), cast_decimal),
    f("decimal", &[T(D::Int)], OutType::Fixed(D::Decimal), cast_decimal),
    f("decimal", &[T(D::Bool)], OutType::Fixed(D::Decimal), cast_decimal),
    f("decimal", &[T(D::Str)], OutType::Fixed(D::Decimal), cast_decimal),
    f("decimal", &[T(D::Object)], OutType::Fixed(D::Decimal), cast_decimal),
    f("str", &[Any], OutType::Fixed(D::Str), cast_str),
    f("date", &[T(D::Date)], OutType::Fixed(D::Date), cast_date),
    f("date", &[T(D::Str)], OutType::Fixed(D::Date), cast_date),
    f("date", &[T(D::Object)], OutType::Fixed(D::Date), cast_date),
    f("date", &[T(D::Int), T(D::Int), T(D::Int)], OutType::Fixed(D::Date), date_from_ymd),
    // Numeric.
    f("abs", &[T(D::Int)], OutType::SameAsFirst, fn_abs),
    f("abs", &[T(D::Decimal)], OutType::SameAsFirst, fn_abs),
    f("abs", &[T(D::Position)], OutType::SameAsFirst, fn_abs),
    f("abs", &[T(D::Inventory)], OutType::SameAsFirst, fn_abs),
    f("neg", &[T(D::Decimal)], OutType::SameAsFirst, fn_neg),
    f("neg", &[T(D::Amount)], OutType::SameAsFirst, fn_neg),
    f("neg", &[T(D::Position)], OutType::SameAsFirst, fn_neg),
    f("neg", &[T(D::Inventory)], OutType::SameAsFirst, fn_neg),
    f("safediv", &[T(D::Decimal), T(D::Decimal)], OutType::Fixed(D::Decimal), fn_safediv),
    f("safediv", &[T(D::Decimal), T(D::Int)], OutType::Fixed(D::Decimal), fn_safediv),
    f("round", &[T(D::Decimal)], OutType::SameAsFirst, fn_round),
    f("round", &[T(D::Decimal), T(D::Int)], OutType::SameAsFirst, fn_round),
    f("round", &[T(D::Int)], OutType::SameAsFirst, fn_round),
    f("round", &[T(D::Int), T(D::Int)], OutType::SameAsFirst, fn_round),
    // Strings.
    f("length", &[T(D::List)], OutType::Fixed(D::Int), fn_length),
    f("length", &[T(D::Set)], OutType::Fixed(D::Int), fn_length),
    f("length", &[T(D::Str)], OutType::Fixed(D::Int), fn_length),
    f("maxwidth", &[T(D::Str), T(D::Int)], OutType::Fixed(D::Str), fn_maxwidth),
    f("substr", &[T(D::Str), T(D::Int), T(D::Int)], OutType::Fixed(D::Str), fn_substr),
    f("splitcomp", &[T(D::Str), T(D::Str), T(D::Int)], OutType::Fixed(D::Str), fn_splitcomp),
    f("upper", &[T(D::Str)], OutType::Fixed(D::Str), fn_upper),
    f("lower", &[T(D::Str)], OutType::Fixed(D::Str), fn_lower),
    f("grep", &[T(D::Str), T(D::Str)], OutType::Fixed(D::Str), fn_grep),
    f("grepn", &[T(D::Str), T(D::Str), T(D::Int)], OutType::Fixed(D::Str), fn_grepn),
    f("subst", &[T(D::Str), T(D::Str), T(D::Str)], OutType::Fixed(D::Str), fn_subst),
    f("joinstr", &[T(D::Set)], OutType::Fixed(D::Str), fn_joinstr),
    f("findfirst", &[T(D::Str), T(D::Set)], OutType::Fixed(D::Str), fn_findfirst),
    // Dates.
    f("year", &[T(D::Date)], OutType::Fixed(D::Int), fn_year),
    f("month", &[T(D::Date)], OutType::Fixed(D::Int), fn_month),
    f("day", &[T(D::Date)], OutType::Fixed(D::Int), fn_day),
    f("yearmonth", &[T(D::Date)], OutType::Fixed(D::Date), fn_yearmonth),
    f("quarter", &[T(D::Date)], OutType::Fixed(D::Str), fn_quarter),
    f("weekday", &[T(D::Date)], OutType::Fixed(D::Str), fn_weekday),
    f("today", &[], OutType::Fixed(D::Date), fn_today),
    f("date_diff", &[T(D::Date), T(D::Date)], OutType::Fixed(D::Int), fn_date_diff),
    f("date_add", &[T(D::Date), T(D::Int)], OutType::Fixed(D::Date), fn_date_add),
    f("date_part", &[T(D::Str), T(D::Date)], OutType::Fixed(D::Int), fn_date_part),
    f("date_trunc", &[T(D::Str), T(D::Date)], OutType::Fixed(D::Date), fn_date_trunc),
    // Accounts.
    f("root", &[T(D::Str)], OutType::Fixed(D::Str), fn_root),
    f("root", &[T(D::Str), T(D::Int)], OutType::Fixed(D::Str), fn_root),
    f("parent", &[T(D::Str)], OutType::Fixed(D::Str), fn_parent),
    f("leaf", &[T(D::Str)], OutType::Fixed(D::Str), fn_leaf),
    f("account_sortkey", &[T(D::Str)], OutType::Fixed(D::Str), fn_account_sortkey),
    // Amounts, positions, inventories.
    f("number", &[T(D::Amount)], OutType::Fixed(D::Decimal), fn_number),
    f("currency", &[T(D::Amount)], OutType::Fixed(D::Str), fn_currency),
    f("commodity", &[T(D::Amount)], OutType::Fixed(D::Str), fn_currency),
    f("units", &[T(D::Position)], OutType::Fixed(D::Amount), fn_units),
    f("units", &[T(D::Inventory)], OutType::Fixed(D::Inventory), fn_units),
    f("cost", &[T(D::Position)], OutType::Fixed(D::Amount), fn_cost),
    f("cost", &[T(D::Inventory)], OutType::Fixed(D::Inventory), fn_cost),
    f("only", &[T(D::Str), T(D::Inventory)], OutType::Fixed(D::Amount), fn_only),
    f("empty", &[T(D::Inventory)], OutType::Fixed(D::Bool), fn_empty),
    f("filter_currency", &[T(D::Position), T(D::Str)], OutType::SameAsFirst, fn_filter_currency),
    f("filter_currency", &[T(D::Inventory), T(D::Str)], OutType::SameAsFirst, fn_filter_currency),
    f("amount", &[T(D::Decimal), T(D::Str)], OutType::Fixed(D::Amount), fn_amount),
    f("amount", &[T(D::Int), T(D::Str)], OutType::Fixed(D::Amount), fn_amount),
    // Subscripting.
    FuncDef {
        name: "getitem",
        intypes: &[T(D::Map), T(D::Str)],
        out: OutType::Fixed(D::Object),
        pure: true,
        nullsafe: false,
        call: fn_getitem,
    },
    FuncDef {
        name: "getitem",
        intypes: &[T(D::Map), T(D::Str), Any],
        out: OutType::Fixed(D::Object),
        pure: true,
        nullsafe: true,
        call: fn_getitem,
    },
];

/// The built-in aggregator overloads, in resolution order.
static AGGREGATES: &[AggDef] = &[
    AggDef {
        name: "count",
        intypes: &[T(D::Asterisk)],
        out: OutType::Fixed(D::Int),
        kind: AggKind::Count,
    },
    AggDef {
        name: "count",
        intypes: &[Any],
        out: OutType::Fixed(D::Int),
        kind: AggKind::CountArg,
    },
    AggDef {
        name: "sum",
        intypes: &[T(D::Int)],
        out: OutType::SameAsFirst,
        kind: AggKind::SumInt,
    },
    AggDef {
        name: "sum",
        intypes: &[T(D::Decimal)],
        out: OutType::SameAsFirst,
        kind: AggKind::SumDecimal,
    },
    AggDef {
        name: "sum",
        intypes: &[T(D::Amount)],
        out: OutType::Fixed(D::Inventory),
        kind: AggKind::SumAmount,
    },
    AggDef {
        name: "sum",
        intypes: &[T(D::Position)],
        out: OutType::Fixed(D::Inventory),
        kind: AggKind::SumPosition,
    },
    AggDef {
        name: "sum",
        intypes: &[T(D::Inventory)],
        out: OutType::Fixed(D::Inventory),
        kind: AggKind::SumInventory,
    },
    AggDef {
        name: "first",
        intypes: &[Any],
        out: OutType::SameAsFirst,
        kind: AggKind::First,
    },
    AggDef {
        name: "last",
        intypes: &[Any],
        out: OutType::SameAsFirst,
        kind: AggKind::Last,
    },
    AggDef {
        name: "min",
        intypes: &[Any],
        out: OutType::SameAsFirst,
        kind: AggKind::Min,
    },
    AggDef {
        name: "max",
        intypes: &[Any],
        out: OutType::SameAsFirst,
        kind: AggKind::Max,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(registry: &'a FunctionRegistry, name: &str, types: &[DataType]) -> FuncEntry {
        registry.lookup(name, types).expect("overload not found")
    }

    #[test]
    fn test_lookup_picks_first_matching_overload() {
        let registry = FunctionRegistry::with_builtins();
        let entry = lookup(&registry, "count", &[D::Asterisk]);
        assert!(matches!(
            entry,
            FuncEntry::Aggregate(def) if def.kind == AggKind::Count
        ));
        let entry = lookup(&registry, "count", &[D::Str]);
        assert!(matches!(
            entry,
            FuncEntry::Aggregate(def) if def.kind == AggKind::CountArg
        ));
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let registry = FunctionRegistry::with_builtins();
        for _ in 0..3 {
            let entry = lookup(&registry, "sum", &[D::Position]);
            assert!(matches!(
                entry,
                FuncEntry::Aggregate(def) if def.kind == AggKind::SumPosition
            ));
        }
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry.lookup("no_such_fn", &[D::Int]).is_none());
        assert!(registry.lookup("year", &[D::Str]).is_none());
    }

    #[test]
    fn test_casts() {
        assert_eq!(cast_int(&[Value::Str(String::from("12"))]), Value::Int(12));
        assert_eq!(cast_int(&[Value::Str(String::from("nope"))]), Value::Null);
        assert_eq!(
            cast_str(&[Value::Bool(true)]),
            Value::Str(String::from("TRUE"))
        );
        assert_eq!(
            cast_date(&[Value::Str(String::from("2014-03-05"))]),
            Value::Date(NaiveDate::from_ymd_opt(2014, 3, 5).unwrap())
        );
        assert_eq!(cast_date(&[Value::Str(String::from("2014-13-05"))]), Value::Null);
        assert_eq!(
            date_from_ymd(&[Value::Int(2014), Value::Int(3), Value::Int(5)]),
            Value::Date(NaiveDate::from_ymd_opt(2014, 3, 5).unwrap())
        );
    }

    #[test]
    fn test_maxwidth() {
        let s = |v: &str| Value::Str(String::from(v));
        // Whitespace runs collapse even when the text already fits.
        assert_eq!(
            fn_maxwidth(&[s("hello    world"), Value::Int(20)]),
            s("hello world")
        );
        // Truncation breaks at word boundaries and appends the
        // placeholder within the width.
        assert_eq!(
            fn_maxwidth(&[s("the quick brown fox jumps"), Value::Int(18)]),
            s("the quick [...]")
        );
        // An oversized first word is broken to fit.
        assert_eq!(
            fn_maxwidth(&[s("unbreakablelongword"), Value::Int(10)]),
            s("unbr [...]")
        );
        assert_eq!(fn_maxwidth(&[s("text"), Value::Int(3)]), Value::Null);
    }

    #[test]
    fn test_account_functions() {
        let acc = Value::Str(String::from("Expenses:Food:Restaurant"));
        assert_eq!(fn_root(&[acc.clone()]), Value::Str(String::from("Expenses")));
        assert_eq!(
            fn_root(&[acc.clone(), Value::Int(2)]),
            Value::Str(String::from("Expenses:Food"))
        );
        assert_eq!(
            fn_parent(&[acc.clone()]),
            Value::Str(String::from("Expenses:Food"))
        );
        assert_eq!(fn_leaf(&[acc.clone()]), Value::Str(String::from("Restaurant")));
        assert_eq!(
            fn_account_sortkey(&[acc]),
            Value::Str(String::from("4-Expenses:Food:Restaurant"))
        );
    }

    #[test]
    fn test_date_functions() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2014, 11, 7).unwrap());
        assert_eq!(fn_year(&[d.clone()]), Value::Int(2014));
        assert_eq!(fn_quarter(&[d.clone()]), Value::Str(String::from("2014-Q4")));
        assert_eq!(
            fn_date_part(&[Value::Str(String::from("quarter")), d.clone()]),
            Value::Int(4)
        );
        assert_eq!(
            fn_date_trunc(&[Value::Str(String::from("month")), d]),
            Value::Date(NaiveDate::from_ymd_opt(2014, 11, 1).unwrap())
        );
    }

    #[test]
    fn test_getitem_with_default() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(String::from("a"), Value::Int(1));
        let map = Value::Map(map);
        let key = Value::Str(String::from("a"));
        let missing = Value::Str(String::from("b"));
        assert_eq!(fn_getitem(&[map.clone(), key]), Value::Int(1));
        assert_eq!(
            fn_getitem(&[map.clone(), missing.clone(), Value::Int(9)]),
            Value::Int(9)
        );
        assert_eq!(fn_getitem(&[map, missing]), Value::Null);
    }
}
