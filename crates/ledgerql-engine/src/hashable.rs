//! Hashing of runtime values for group keys and DISTINCT.
//!
//! Values whose natural identity is not directly hashable are reduced to a
//! deterministic representation first: mappings hash their entries, sets
//! and lists their elements, inventories their sorted positions, and
//! opaque objects their address. Integers hash through their decimal
//! representation so that hashing stays consistent with the cross-variant
//! numeric equality of [`Value`].

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::value::Value;

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => state.write_u8(0),
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            // Int and Decimal share a discriminant and a representation,
            // keeping hashing consistent with equality.
            Value::Int(i) => {
                state.write_u8(2);
                Decimal::from(*i).hash(state);
            }
            Value::Decimal(d) => {
                state.write_u8(2);
                d.hash(state);
            }
            Value::Date(d) => {
                state.write_u8(3);
                d.hash(state);
            }
            Value::Str(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            Value::List(items) => {
                state.write_u8(5);
                for item in items {
                    item.hash(state);
                }
            }
            Value::Set(items) => {
                state.write_u8(6);
                for item in items {
                    item.hash(state);
                }
            }
            Value::Map(items) => {
                state.write_u8(7);
                for (key, value) in items {
                    key.hash(state);
                    value.hash(state);
                }
            }
            Value::Amount(a) => {
                state.write_u8(8);
                a.hash(state);
            }
            Value::Cost(c) => {
                state.write_u8(9);
                c.hash(state);
            }
            Value::Position(p) => {
                state.write_u8(10);
                p.hash(state);
            }
            Value::Inventory(inv) => {
                state.write_u8(11);
                inv.hash(state);
            }
            Value::Object(object) => {
                state.write_u8(12);
                state.write_usize(Arc::as_ptr(object).cast::<()>() as usize);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashSet;

    use super::*;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_int_and_decimal_hash_alike() {
        use std::str::FromStr;
        let int = Value::Int(3);
        let dec = Value::Decimal(Decimal::from_str("3.00").unwrap());
        assert_eq!(int, dec);
        assert_eq!(hash_of(&int), hash_of(&dec));
    }

    #[test]
    fn test_group_keys_in_hash_set() {
        let mut seen = HashSet::new();
        assert!(seen.insert(vec![Value::Int(1), Value::Str(String::from("a"))]));
        assert!(!seen.insert(vec![Value::Int(1), Value::Str(String::from("a"))]));
        assert!(seen.insert(vec![Value::Null, Value::Str(String::from("a"))]));
    }
}
