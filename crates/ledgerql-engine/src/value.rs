//! The runtime value domain.
//!
//! [`Value`] carries every datum flowing through the executor. NULL is a
//! first-class value and orders before every other value, which doubles as
//! the SQL NULL-low sort behavior. Integers and decimals compare equal
//! across variants when numerically equal.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::types::DataType;

/// A single-currency quantity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Amount {
    /// The number of units.
    pub number: Decimal,
    /// The commodity symbol.
    pub currency: String,
}

impl Amount {
    /// Creates a new amount.
    #[must_use]
    pub fn new(number: Decimal, currency: impl Into<String>) -> Self {
        Self {
            number,
            currency: currency.into(),
        }
    }

    /// Returns the negated amount.
    #[must_use]
    pub fn neg(&self) -> Self {
        Self {
            number: -self.number,
            currency: self.currency.clone(),
        }
    }

    /// Returns the amount with a non-negative number.
    #[must_use]
    pub fn abs(&self) -> Self {
        Self {
            number: self.number.abs(),
            currency: self.currency.clone(),
        }
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.number, self.currency)
    }
}

/// The acquisition cost attached to a position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cost {
    /// Cost per unit.
    pub number: Decimal,
    /// Cost commodity.
    pub currency: String,
    /// Acquisition date.
    pub date: NaiveDate,
    /// Optional lot label.
    pub label: Option<String>,
}

impl std::fmt::Display for Cost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}, {}", self.number, self.currency, self.date)?;
        if let Some(label) = &self.label {
            write!(f, ", \"{label}\"")?;
        }
        Ok(())
    }
}

/// An amount held at an optional cost.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    /// The held units.
    pub units: Amount,
    /// The cost basis, if any.
    pub cost: Option<Cost>,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(units: Amount, cost: Option<Cost>) -> Self {
        Self { units, cost }
    }

    /// Returns the negated position.
    #[must_use]
    pub fn neg(&self) -> Self {
        Self {
            units: self.units.neg(),
            cost: self.cost.clone(),
        }
    }

    /// Returns the position converted to its cost value, or its units when
    /// it has no cost basis.
    #[must_use]
    pub fn cost_value(&self) -> Amount {
        match &self.cost {
            Some(cost) => Amount::new(self.units.number * cost.number, cost.currency.clone()),
            None => self.units.clone(),
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.units)?;
        if let Some(cost) = &self.cost {
            write!(f, " {{{cost}}}")?;
        }
        Ok(())
    }
}

/// A collection of positions, merged by currency and cost basis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inventory {
    positions: BTreeMap<(String, Option<Cost>), Decimal>,
}

impl Inventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the inventory holds no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Adds an amount, held at no cost.
    pub fn add_amount(&mut self, amount: &Amount) {
        self.add(amount.currency.clone(), None, amount.number);
    }

    /// Adds a position.
    pub fn add_position(&mut self, position: &Position) {
        self.add(
            position.units.currency.clone(),
            position.cost.clone(),
            position.units.number,
        );
    }

    /// Adds every position of another inventory.
    pub fn add_inventory(&mut self, other: &Self) {
        for ((currency, cost), number) in &other.positions {
            self.add(currency.clone(), cost.clone(), *number);
        }
    }

    fn add(&mut self, currency: String, cost: Option<Cost>, number: Decimal) {
        let entry = self
            .positions
            .entry((currency, cost))
            .or_insert_with(Decimal::default);
        *entry += number;
        self.positions.retain(|_, number| !number.is_zero());
    }

    /// Returns the negated inventory.
    #[must_use]
    pub fn neg(&self) -> Self {
        Self {
            positions: self
                .positions
                .iter()
                .map(|(key, number)| (key.clone(), -number))
                .collect(),
        }
    }

    /// Returns the inventory with all numbers non-negative.
    #[must_use]
    pub fn abs(&self) -> Self {
        Self {
            positions: self
                .positions
                .iter()
                .map(|(key, number)| (key.clone(), number.abs()))
                .collect(),
        }
    }

    /// Reduces to units, stripping cost bases.
    #[must_use]
    pub fn units(&self) -> Self {
        let mut result = Self::new();
        for ((currency, _), number) in &self.positions {
            result.add(currency.clone(), None, *number);
        }
        result
    }

    /// Reduces every position to its cost value.
    #[must_use]
    pub fn cost(&self) -> Self {
        let mut result = Self::new();
        for ((currency, cost), number) in &self.positions {
            match cost {
                Some(cost) => result.add(cost.currency.clone(), None, number * cost.number),
                None => result.add(currency.clone(), None, *number),
            }
        }
        result
    }

    /// Returns the summed units of the given currency.
    #[must_use]
    pub fn currency_units(&self, currency: &str) -> Amount {
        let number = self
            .positions
            .iter()
            .filter(|((c, _), _)| c == currency)
            .map(|(_, number)| *number)
            .sum();
        Amount::new(number, currency)
    }

    /// Returns the positions held, in deterministic order.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.positions
            .iter()
            .map(|((currency, cost), number)| {
                Position::new(Amount::new(*number, currency.clone()), cost.clone())
            })
            .collect()
    }

    /// Keeps only the positions held in the given currency.
    #[must_use]
    pub fn filter_currency(&self, currency: &str) -> Self {
        Self {
            positions: self
                .positions
                .iter()
                .filter(|((c, _), _)| c == currency)
                .map(|(key, number)| (key.clone(), *number))
                .collect(),
        }
    }
}

impl std::fmt::Display for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for position in self.positions() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{position}")?;
            first = false;
        }
        Ok(())
    }
}

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    /// NULL, representable in every type.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Arbitrary-precision decimal.
    Decimal(Decimal),
    /// Calendar date.
    Date(NaiveDate),
    /// String.
    Str(String),
    /// Ordered list.
    List(Vec<Value>),
    /// Unordered set with deterministic iteration order.
    Set(BTreeSet<Value>),
    /// Mapping from strings to values.
    Map(BTreeMap<String, Value>),
    /// A single-currency quantity.
    Amount(Amount),
    /// A cost basis.
    Cost(Cost),
    /// An amount held at an optional cost.
    Position(Position),
    /// A collection of positions.
    Inventory(Inventory),
    /// An opaque source-defined object, compared by identity.
    Object(Arc<dyn Any>),
}

impl Value {
    /// Returns the datatype of this value.
    ///
    /// Opaque objects report [`DataType::Object`]; columns carrying them
    /// declare their structured type themselves.
    #[must_use]
    pub const fn datatype(&self) -> DataType {
        match self {
            Self::Null | Self::Object(_) => DataType::Object,
            Self::Bool(_) => DataType::Bool,
            Self::Int(_) => DataType::Int,
            Self::Decimal(_) => DataType::Decimal,
            Self::Date(_) => DataType::Date,
            Self::Str(_) => DataType::Str,
            Self::List(_) => DataType::List,
            Self::Set(_) => DataType::Set,
            Self::Map(_) => DataType::Map,
            Self::Amount(_) => DataType::Amount,
            Self::Cost(_) => DataType::Cost,
            Self::Position(_) => DataType::Position,
            Self::Inventory(_) => DataType::Inventory,
        }
    }

    /// Returns true if this is NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the truthiness of the value, with empty strings and
    /// containers, zero numbers and NULL all false.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Decimal(d) => !d.is_zero(),
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Set(items) => !items.is_empty(),
            Self::Map(items) => !items.is_empty(),
            Self::Inventory(inv) => !inv.is_empty(),
            Self::Date(_)
            | Self::Amount(_)
            | Self::Cost(_)
            | Self::Position(_)
            | Self::Object(_) => true,
        }
    }

    /// Ranks variants for the total order; integers and decimals share a
    /// rank so that they compare numerically.
    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Decimal(_) => 2,
            Self::Date(_) => 3,
            Self::Str(_) => 4,
            Self::List(_) => 5,
            Self::Set(_) => 6,
            Self::Map(_) => 7,
            Self::Amount(_) => 8,
            Self::Cost(_) => 9,
            Self::Position(_) => 10,
            Self::Inventory(_) => 11,
            Self::Object(_) => 12,
        }
    }

    fn object_address(object: &Arc<dyn Any>) -> usize {
        Arc::as_ptr(object).cast::<()>() as usize
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Decimal(v) => write!(f, "Decimal({v})"),
            Self::Date(v) => write!(f, "Date({v})"),
            Self::Str(v) => write!(f, "Str({v:?})"),
            Self::List(v) => f.debug_tuple("List").field(v).finish(),
            Self::Set(v) => f.debug_tuple("Set").field(v).finish(),
            Self::Map(v) => f.debug_tuple("Map").field(v).finish(),
            Self::Amount(v) => write!(f, "Amount({v})"),
            Self::Cost(v) => write!(f, "Cost({v})"),
            Self::Position(v) => write!(f, "Position({v})"),
            Self::Inventory(v) => write!(f, "Inventory({v})"),
            Self::Object(v) => write!(f, "Object({:#x})", Self::object_address(v)),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(true) => f.write_str("TRUE"),
            Self::Bool(false) => f.write_str("FALSE"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Self::Str(v) => f.write_str(v),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Self::Set(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
            Self::Map(items) => {
                f.write_str("{")?;
                for (i, (key, value)) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Self::Amount(v) => write!(f, "{v}"),
            Self::Cost(v) => write!(f, "{v}"),
            Self::Position(v) => write!(f, "{v}"),
            Self::Inventory(v) => write!(f, "{v}"),
            Self::Object(v) => write!(f, "<object {:#x}>", Self::object_address(v)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Decimal(b)) => Decimal::from(*a) == *b,
            (Self::Decimal(a), Self::Int(b)) => *a == Decimal::from(*b),
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Decimal(a), Self::Decimal(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Amount(a), Self::Amount(b)) => a == b,
            (Self::Cost(a), Self::Cost(b)) => a == b,
            (Self::Position(a), Self::Position(b)) => a == b,
            (Self::Inventory(a), Self::Inventory(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Decimal(b)) => Decimal::from(*a).cmp(b),
            (Self::Decimal(a), Self::Int(b)) => a.cmp(&Decimal::from(*b)),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Decimal(a), Self::Decimal(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) => a.cmp(b),
            (Self::Set(a), Self::Set(b)) => a.cmp(b),
            (Self::Map(a), Self::Map(b)) => a.cmp(b),
            (Self::Amount(a), Self::Amount(b)) => a.cmp(b),
            (Self::Cost(a), Self::Cost(b)) => a.cmp(b),
            (Self::Position(a), Self::Position(b)) => a.cmp(b),
            (Self::Inventory(a), Self::Inventory(b)) => a.cmp(b),
            (Self::Object(a), Self::Object(b)) => {
                Self::object_address(a).cmp(&Self::object_address(b))
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        use std::str::FromStr;
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_null_sorts_before_everything() {
        assert!(Value::Null < Value::Int(i64::MIN));
        assert!(Value::Null < Value::Bool(false));
        assert!(Value::Null < Value::Str(String::new()));
        assert_eq!(Value::Null.cmp(&Value::Null), Ordering::Equal);
    }

    #[test]
    fn test_numeric_cross_variant_equality() {
        assert_eq!(Value::Int(3), Value::Decimal(dec("3.00")));
        assert!(Value::Int(1) < Value::Decimal(dec("1.5")));
        assert!(Value::Decimal(dec("2.5")) > Value::Int(2));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Inventory(Inventory::new()).is_truthy());
    }

    #[test]
    fn test_inventory_merges_by_currency_and_cost() {
        let mut inv = Inventory::new();
        inv.add_amount(&Amount::new(dec("10"), "USD"));
        inv.add_amount(&Amount::new(dec("5"), "USD"));
        inv.add_amount(&Amount::new(dec("2"), "EUR"));
        assert_eq!(inv.currency_units("USD"), Amount::new(dec("15"), "USD"));
        assert_eq!(inv.positions().len(), 2);
    }

    #[test]
    fn test_inventory_drops_zero_positions() {
        let mut inv = Inventory::new();
        inv.add_amount(&Amount::new(dec("10"), "USD"));
        inv.add_amount(&Amount::new(dec("-10"), "USD"));
        assert!(inv.is_empty());
    }

    #[test]
    fn test_inventory_cost_reduction() {
        let mut inv = Inventory::new();
        let cost = Cost {
            number: dec("2"),
            currency: String::from("USD"),
            date: NaiveDate::from_ymd_opt(2014, 1, 1).unwrap(),
            label: None,
        };
        inv.add_position(&Position::new(Amount::new(dec("3"), "HOOL"), Some(cost)));
        assert_eq!(
            inv.cost().currency_units("USD"),
            Amount::new(dec("6"), "USD")
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Bool(true).to_string(), "TRUE");
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2014, 1, 5).unwrap()).to_string(),
            "2014-01-05"
        );
        assert_eq!(
            Value::Amount(Amount::new(dec("10.50"), "USD")).to_string(),
            "10.50 USD"
        );
    }
}
