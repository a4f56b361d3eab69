//! The engine's datatype lattice and structured-type layouts.
//!
//! Every column and every compiled expression node carries a [`DataType`].
//! Function and operator overloads declare their input types as
//! [`ArgType`] patterns, where [`ArgType::Any`] matches every type and
//! everything else matches exactly. The untyped [`DataType::Object`] is
//! deliberately not matched by concrete patterns; the compiler promotes
//! object operands by inserting cast functions instead.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::value::Value;

/// The datatype of a column or expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean.
    Bool,
    /// 64-bit integer.
    Int,
    /// Arbitrary-precision decimal.
    Decimal,
    /// Calendar date.
    Date,
    /// String.
    Str,
    /// Untyped value, e.g. a metadata entry.
    Object,
    /// Ordered list.
    List,
    /// Unordered set.
    Set,
    /// Mapping from string keys to values.
    Map,
    /// A single-currency quantity.
    Amount,
    /// The acquisition cost attached to a position.
    Cost,
    /// An amount held at an optional cost.
    Position,
    /// A collection of positions.
    Inventory,
    /// The `*` argument of `COUNT(*)`.
    Asterisk,
    /// A source-defined structured type, identified by name.
    Struct(&'static str),
}

impl DataType {
    /// Returns the BQL name of the type.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::Str => "str",
            Self::Object => "object",
            Self::List => "list",
            Self::Set => "set",
            Self::Map => "map",
            Self::Amount => "amount",
            Self::Cost => "cost",
            Self::Position => "position",
            Self::Inventory => "inventory",
            Self::Asterisk => "*",
            Self::Struct(name) => name,
        }
    }

    /// Returns true if values of this type may be used as grouping keys.
    ///
    /// Containers are excluded: their equality is defined over the whole
    /// content and they make poor group keys. See the `hashable` module
    /// for how the remaining types are reduced for hashing.
    #[must_use]
    pub const fn is_hashable(&self) -> bool {
        !matches!(self, Self::List | Self::Set | Self::Map)
    }

    /// Returns the name of the cast function converting to this type, if
    /// one exists.
    #[must_use]
    pub const fn cast_function(&self) -> Option<&'static str> {
        match self {
            Self::Bool => Some("bool"),
            Self::Int => Some("int"),
            Self::Decimal => Some("decimal"),
            Self::Str => Some("str"),
            Self::Date => Some("date"),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An input type pattern in a function or operator signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Matches exactly the given type.
    T(DataType),
    /// Matches every type.
    Any,
}

impl ArgType {
    /// Returns true if an operand of the given datatype matches.
    #[must_use]
    pub fn matches(&self, dtype: DataType) -> bool {
        match self {
            Self::Any => true,
            Self::T(t) => *t == dtype,
        }
    }
}

/// Returns true if the operand types match the declared signature.
#[must_use]
pub fn signature_matches(intypes: &[ArgType], operands: &[DataType]) -> bool {
    intypes.len() == operands.len()
        && intypes
            .iter()
            .zip(operands)
            .all(|(pattern, dtype)| pattern.matches(*dtype))
}

/// Formats a function name and operand types for error messages.
#[must_use]
pub fn signature_name(name: &str, operands: &[DataType]) -> String {
    let types: Vec<&str> = operands.iter().map(DataType::name).collect();
    format!("{}({})", name, types.join(", "))
}

/// A getter extracting a field from a structured value.
pub type Getter = Arc<dyn Fn(&Value) -> Value>;

/// A field of a structured type.
#[derive(Clone)]
pub struct Field {
    /// The field name.
    pub name: String,
    /// The field datatype.
    pub dtype: DataType,
    /// The accessor extracting the field from a value.
    pub getter: Getter,
}

impl Field {
    /// Creates a new field definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        dtype: DataType,
        getter: impl Fn(&Value) -> Value + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            dtype,
            getter: Arc::new(getter),
        }
    }

    /// Returns true if both fields share the same accessor.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.getter, &other.getter)
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("dtype", &self.dtype)
            .finish_non_exhaustive()
    }
}

/// The layout of a structured type: its named fields in declaration order.
#[derive(Debug, Clone, Default)]
pub struct StructLayout {
    fields: IndexMap<String, Field>,
}

impl StructLayout {
    /// Creates a layout from a list of fields.
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|field| (field.name.clone(), field))
                .collect(),
        }
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Iterates the fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }
}

/// Builds the layouts of the built-in structured types.
///
/// Sources may register further layouts on the connection (the ledger
/// source registers one for transaction entries).
#[must_use]
pub fn builtin_layouts() -> Vec<(DataType, StructLayout)> {
    use crate::value::Value as V;

    let date = StructLayout::new(vec![
        Field::new("year", DataType::Int, |v| match v {
            V::Date(d) => V::Int(i64::from(chrono::Datelike::year(d))),
            _ => V::Null,
        }),
        Field::new("month", DataType::Int, |v| match v {
            V::Date(d) => V::Int(i64::from(chrono::Datelike::month(d))),
            _ => V::Null,
        }),
        Field::new("day", DataType::Int, |v| match v {
            V::Date(d) => V::Int(i64::from(chrono::Datelike::day(d))),
            _ => V::Null,
        }),
    ]);

    let amount = StructLayout::new(vec![
        Field::new("number", DataType::Decimal, |v| match v {
            V::Amount(a) => V::Decimal(a.number),
            _ => V::Null,
        }),
        Field::new("currency", DataType::Str, |v| match v {
            V::Amount(a) => V::Str(a.currency.clone()),
            _ => V::Null,
        }),
    ]);

    let cost = StructLayout::new(vec![
        Field::new("number", DataType::Decimal, |v| match v {
            V::Cost(c) => V::Decimal(c.number),
            _ => V::Null,
        }),
        Field::new("currency", DataType::Str, |v| match v {
            V::Cost(c) => V::Str(c.currency.clone()),
            _ => V::Null,
        }),
        Field::new("date", DataType::Date, |v| match v {
            V::Cost(c) => V::Date(c.date),
            _ => V::Null,
        }),
        Field::new("label", DataType::Str, |v| match v {
            V::Cost(c) => c.label.clone().map_or(V::Null, V::Str),
            _ => V::Null,
        }),
    ]);

    let position = StructLayout::new(vec![
        Field::new("units", DataType::Amount, |v| match v {
            V::Position(p) => V::Amount(p.units.clone()),
            _ => V::Null,
        }),
        Field::new("cost", DataType::Cost, |v| match v {
            V::Position(p) => p.cost.clone().map_or(V::Null, V::Cost),
            _ => V::Null,
        }),
    ]);

    vec![
        (DataType::Date, date),
        (DataType::Amount, amount),
        (DataType::Cost, cost),
        (DataType::Position, position),
    ]
}
