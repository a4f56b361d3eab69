//! The operator registry and the built-in operator overloads.
//!
//! Operators resolve exactly like functions: a flat table keyed by the AST
//! operator tag and the operand type tuple, scanned in registration order.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use ledgerql_core::ast::{BinaryOp, UnaryOp};

use crate::eval::{BinaryFn, UnaryFn};
use crate::types::ArgType::{self, Any, T};
use crate::types::{DataType as D, DataType};
use crate::value::Value;

/// A unary operator overload.
#[derive(Debug, Clone, Copy)]
pub struct UnaryOpDef {
    /// The AST operator tag.
    pub op: UnaryOp,
    /// The declared operand type.
    pub intypes: [ArgType; 1],
    /// The output type.
    pub out: DataType,
    /// Whether the implementation handles NULL operands itself.
    pub nullsafe: bool,
    /// The implementation.
    pub call: UnaryFn,
}

/// A binary operator overload.
#[derive(Debug, Clone, Copy)]
pub struct BinaryOpDef {
    /// The AST operator tag.
    pub op: BinaryOp,
    /// The declared operand types.
    pub intypes: [ArgType; 2],
    /// The output type.
    pub out: DataType,
    /// Whether the implementation handles NULL operands itself.
    pub nullsafe: bool,
    /// The implementation.
    pub call: BinaryFn,
}

/// The overload table for unary and binary operators.
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    unary: Vec<UnaryOpDef>,
    binary: Vec<BinaryOpDef>,
}

impl OperatorRegistry {
    /// Creates a registry holding the built-in overloads.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            unary: Vec::new(),
            binary: Vec::new(),
        };
        registry.register_builtins();
        registry
    }

    /// Resolves a unary overload.
    #[must_use]
    pub fn lookup_unary(&self, op: UnaryOp, operand: DataType) -> Option<UnaryOpDef> {
        self.unary
            .iter()
            .find(|def| def.op == op && def.intypes[0].matches(operand))
            .copied()
    }

    /// Resolves a binary overload.
    #[must_use]
    pub fn lookup_binary(&self, op: BinaryOp, operands: [DataType; 2]) -> Option<BinaryOpDef> {
        self.binary
            .iter()
            .find(|def| {
                def.op == op
                    && def.intypes[0].matches(operands[0])
                    && def.intypes[1].matches(operands[1])
            })
            .copied()
    }

    fn unary_op(&mut self, op: UnaryOp, intype: ArgType, out: DataType, call: UnaryFn) {
        self.unary.push(UnaryOpDef {
            op,
            intypes: [intype],
            out,
            nullsafe: false,
            call,
        });
    }

    fn unary_op_nullsafe(&mut self, op: UnaryOp, intype: ArgType, out: DataType, call: UnaryFn) {
        self.unary.push(UnaryOpDef {
            op,
            intypes: [intype],
            out,
            nullsafe: true,
            call,
        });
    }

    fn binary_op(&mut self, op: BinaryOp, intypes: [ArgType; 2], out: DataType, call: BinaryFn) {
        self.binary.push(BinaryOpDef {
            op,
            intypes,
            out,
            nullsafe: false,
            call,
        });
    }

    fn register_builtins(&mut self) {
        self.unary_op_nullsafe(UnaryOp::Not, Any, D::Bool, op_not);
        self.unary_op_nullsafe(UnaryOp::IsNull, Any, D::Bool, op_is_null);
        self.unary_op_nullsafe(UnaryOp::IsNotNull, Any, D::Bool, op_is_not_null);
        self.unary_op(UnaryOp::Neg, T(D::Int), D::Int, op_neg);
        self.unary_op(UnaryOp::Neg, T(D::Decimal), D::Decimal, op_neg);

        // Arithmetic over the numeric type pairs; division always
        // produces a decimal, the others stay integer for integer
        // operands.
        let numeric = [
            (T(D::Int), T(D::Int), D::Int),
            (T(D::Decimal), T(D::Int), D::Decimal),
            (T(D::Int), T(D::Decimal), D::Decimal),
            (T(D::Decimal), T(D::Decimal), D::Decimal),
        ];
        for (left, right, out) in numeric {
            self.binary_op(BinaryOp::Add, [left, right], out, op_add);
            self.binary_op(BinaryOp::Sub, [left, right], out, op_sub);
            self.binary_op(BinaryOp::Mul, [left, right], out, op_mul);
            self.binary_op(BinaryOp::Div, [left, right], D::Decimal, op_div);
            self.binary_op(BinaryOp::Mod, [left, right], out, op_mod);
        }

        // Date arithmetic.
        self.binary_op(BinaryOp::Add, [T(D::Date), T(D::Int)], D::Date, op_add);
        self.binary_op(BinaryOp::Add, [T(D::Int), T(D::Date)], D::Date, op_add);
        self.binary_op(BinaryOp::Sub, [T(D::Date), T(D::Int)], D::Date, op_sub);
        self.binary_op(BinaryOp::Sub, [T(D::Date), T(D::Date)], D::Int, op_sub);

        // Comparisons over comparable type pairs.
        let comparable = [
            [T(D::Int), T(D::Int)],
            [T(D::Decimal), T(D::Int)],
            [T(D::Int), T(D::Decimal)],
            [T(D::Decimal), T(D::Decimal)],
            [T(D::Date), T(D::Date)],
            [T(D::Str), T(D::Str)],
        ];
        let comparisons: [(BinaryOp, BinaryFn); 6] = [
            (BinaryOp::Eq, op_eq),
            (BinaryOp::NotEq, op_not_eq),
            (BinaryOp::Lt, op_lt),
            (BinaryOp::LtEq, op_lt_eq),
            (BinaryOp::Gt, op_gt),
            (BinaryOp::GtEq, op_gt_eq),
        ];
        for (op, call) in comparisons {
            for intypes in comparable {
                self.binary_op(op, intypes, D::Bool, call);
            }
        }

        // Regular expression matching; the match is case-insensitive.
        // The conditional match handles NULL itself, collapsing it to a
        // concrete FALSE.
        self.binary_op(BinaryOp::Match, [T(D::Str), T(D::Str)], D::Bool, op_match);
        self.binary_op(
            BinaryOp::NotMatch,
            [T(D::Str), T(D::Str)],
            D::Bool,
            op_not_match,
        );
        self.binary.push(BinaryOpDef {
            op: BinaryOp::Matches,
            intypes: [T(D::Str), T(D::Str)],
            out: D::Bool,
            nullsafe: true,
            call: op_matches,
        });

        // Membership.
        for container in [T(D::Set), T(D::List), T(D::Map)] {
            self.binary_op(BinaryOp::In, [Any, container], D::Bool, op_in);
            self.binary_op(BinaryOp::NotIn, [Any, container], D::Bool, op_not_in);
        }
    }
}

/// Returns true if the three BETWEEN operand types can be compared with
/// each other.
#[must_use]
pub fn between_comparable(types: &[DataType; 3]) -> bool {
    let numeric = types
        .iter()
        .all(|t| matches!(t, DataType::Int | DataType::Decimal));
    numeric
        || types.iter().all(|t| *t == DataType::Date)
        || types.iter().all(|t| *t == DataType::Str)
}

fn op_not(value: &Value) -> Value {
    Value::Bool(!value.is_truthy())
}

fn op_is_null(value: &Value) -> Value {
    Value::Bool(value.is_null())
}

fn op_is_not_null(value: &Value) -> Value {
    Value::Bool(!value.is_null())
}

fn op_neg(value: &Value) -> Value {
    match value {
        Value::Int(i) => i.checked_neg().map_or(Value::Null, Value::Int),
        Value::Decimal(d) => Value::Decimal(-d),
        _ => Value::Null,
    }
}

fn decimal_pair(left: &Value, right: &Value) -> Option<(Decimal, Decimal)> {
    let as_decimal = |value: &Value| match value {
        Value::Int(i) => Some(Decimal::from(*i)),
        Value::Decimal(d) => Some(*d),
        _ => None,
    };
    Some((as_decimal(left)?, as_decimal(right)?))
}

fn date_plus_days(date: NaiveDate, days: i64) -> Value {
    date.checked_add_signed(chrono::Duration::days(days))
        .map_or(Value::Null, Value::Date)
}

fn op_add(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.checked_add(*b).map_or(Value::Null, Value::Int),
        (Value::Date(d), Value::Int(days)) => date_plus_days(*d, *days),
        (Value::Int(days), Value::Date(d)) => date_plus_days(*d, *days),
        _ => match decimal_pair(left, right) {
            Some((a, b)) => a.checked_add(b).map_or(Value::Null, Value::Decimal),
            None => Value::Null,
        },
    }
}

fn op_sub(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.checked_sub(*b).map_or(Value::Null, Value::Int),
        (Value::Date(d), Value::Int(days)) => date_plus_days(*d, -days),
        (Value::Date(a), Value::Date(b)) => {
            Value::Int(a.signed_duration_since(*b).num_days())
        }
        _ => match decimal_pair(left, right) {
            Some((a, b)) => a.checked_sub(b).map_or(Value::Null, Value::Decimal),
            None => Value::Null,
        },
    }
}

fn op_mul(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.checked_mul(*b).map_or(Value::Null, Value::Int),
        _ => match decimal_pair(left, right) {
            Some((a, b)) => a.checked_mul(b).map_or(Value::Null, Value::Decimal),
            None => Value::Null,
        },
    }
}

/// Division by zero yields NULL, not an error. Integer division promotes
/// to decimal.
fn op_div(left: &Value, right: &Value) -> Value {
    match decimal_pair(left, right) {
        Some((_, b)) if b.is_zero() => Value::Null,
        Some((a, b)) => a.checked_div(b).map_or(Value::Null, Value::Decimal),
        None => Value::Null,
    }
}

/// Integer modulo is floor-mod: a non-zero result takes the sign of the
/// divisor.
fn op_mod(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => match a.checked_rem(*b) {
            Some(r) if r != 0 && (r < 0) != (*b < 0) => Value::Int(r + b),
            Some(r) => Value::Int(r),
            None => Value::Null,
        },
        _ => match decimal_pair(left, right) {
            Some((_, b)) if b.is_zero() => Value::Null,
            Some((a, b)) => a.checked_rem(b).map_or(Value::Null, Value::Decimal),
            None => Value::Null,
        },
    }
}

fn op_eq(left: &Value, right: &Value) -> Value {
    Value::Bool(left == right)
}

fn op_not_eq(left: &Value, right: &Value) -> Value {
    Value::Bool(left != right)
}

fn op_lt(left: &Value, right: &Value) -> Value {
    Value::Bool(left < right)
}

fn op_lt_eq(left: &Value, right: &Value) -> Value {
    Value::Bool(left <= right)
}

fn op_gt(left: &Value, right: &Value) -> Value {
    Value::Bool(left > right)
}

fn op_gt_eq(left: &Value, right: &Value) -> Value {
    Value::Bool(left >= right)
}

fn regex_search(value: &Value, pattern: &Value) -> Option<bool> {
    let (Value::Str(s), Value::Str(pattern)) = (value, pattern) else {
        return None;
    };
    regex::RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .ok()
        .map(|re| re.is_match(s))
}

fn op_match(left: &Value, right: &Value) -> Value {
    regex_search(left, right).map_or(Value::Null, Value::Bool)
}

fn op_not_match(left: &Value, right: &Value) -> Value {
    regex_search(left, right).map_or(Value::Null, |matched| Value::Bool(!matched))
}

fn op_matches(left: &Value, right: &Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Bool(false);
    }
    Value::Bool(regex_search(left, right).unwrap_or(false))
}

fn contains(container: &Value, value: &Value) -> Option<bool> {
    match container {
        Value::Set(items) => Some(items.contains(value)),
        Value::List(items) => Some(items.contains(value)),
        Value::Map(items) => match value {
            Value::Str(key) => Some(items.contains_key(key)),
            _ => Some(false),
        },
        _ => None,
    }
}

fn op_in(left: &Value, right: &Value) -> Value {
    contains(right, left).map_or(Value::Null, Value::Bool)
}

fn op_not_in(left: &Value, right: &Value) -> Value {
    contains(right, left).map_or(Value::Null, |contained| Value::Bool(!contained))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Value {
        Value::Decimal(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_lookup_binary() {
        let registry = OperatorRegistry::with_builtins();
        let def = registry
            .lookup_binary(BinaryOp::Add, [D::Int, D::Int])
            .unwrap();
        assert_eq!(def.out, D::Int);
        let def = registry
            .lookup_binary(BinaryOp::Add, [D::Int, D::Decimal])
            .unwrap();
        assert_eq!(def.out, D::Decimal);
        assert!(registry
            .lookup_binary(BinaryOp::Add, [D::Str, D::Str])
            .is_none());
    }

    #[test]
    fn test_integer_division_promotes_to_decimal() {
        let registry = OperatorRegistry::with_builtins();
        let def = registry
            .lookup_binary(BinaryOp::Div, [D::Int, D::Int])
            .unwrap();
        assert_eq!(def.out, D::Decimal);
        assert_eq!(op_div(&Value::Int(3), &Value::Int(2)), dec("1.5"));
    }

    #[test]
    fn test_division_by_zero_yields_null() {
        assert_eq!(op_div(&Value::Int(1), &Value::Int(0)), Value::Null);
        assert_eq!(op_mod(&Value::Int(1), &Value::Int(0)), Value::Null);
        assert_eq!(op_mod(&dec("1"), &dec("0")), Value::Null);
    }

    #[test]
    fn test_integer_modulo_follows_divisor_sign() {
        assert_eq!(op_mod(&Value::Int(7), &Value::Int(2)), Value::Int(1));
        assert_eq!(op_mod(&Value::Int(7), &Value::Int(-2)), Value::Int(-1));
        assert_eq!(op_mod(&Value::Int(-7), &Value::Int(2)), Value::Int(1));
        assert_eq!(op_mod(&Value::Int(-7), &Value::Int(-2)), Value::Int(-1));
        assert_eq!(op_mod(&Value::Int(6), &Value::Int(-2)), Value::Int(0));
    }

    #[test]
    fn test_not_of_null_is_true() {
        assert_eq!(op_not(&Value::Null), Value::Bool(true));
    }

    #[test]
    fn test_date_arithmetic() {
        let date = Value::Date(NaiveDate::from_ymd_opt(2014, 1, 1).unwrap());
        let later = Value::Date(NaiveDate::from_ymd_opt(2014, 1, 11).unwrap());
        assert_eq!(op_add(&date, &Value::Int(10)), later);
        assert_eq!(op_sub(&later, &date), Value::Int(10));
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let s = Value::Str(String::from("Expenses:Food"));
        let pattern = Value::Str(String::from("expenses"));
        assert_eq!(op_match(&s, &pattern), Value::Bool(true));
        assert_eq!(op_not_match(&s, &pattern), Value::Bool(false));
    }

    #[test]
    fn test_conditional_match_collapses_null() {
        let pattern = Value::Str(String::from("a"));
        assert_eq!(op_matches(&Value::Null, &pattern), Value::Bool(false));
        assert_eq!(
            op_matches(&Value::Str(String::from("ab")), &pattern),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_membership() {
        let list = Value::List(vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(op_in(&Value::Int(3), &list), Value::Bool(true));
        assert_eq!(op_not_in(&Value::Int(1), &list), Value::Bool(true));
    }
}
