//! Compiled expression trees and query plans.
//!
//! The compiler turns AST nodes into [`EvalNode`] trees whose datatypes
//! are fully resolved, wrapped in a top-level [`Plan`]. Plans are
//! immutable after compilation and may be re-executed; every execution
//! produces fresh aggregator state.

use std::sync::Arc;

use ledgerql_core::ast::Ordering;
use rust_decimal::Decimal;

use crate::tables::{Column, Row, Table};
use crate::types::{DataType, Field};
use crate::value::{Inventory, Value};

/// A unary operator implementation.
pub type UnaryFn = fn(&Value) -> Value;
/// A binary operator implementation.
pub type BinaryFn = fn(&Value, &Value) -> Value;
/// A scalar function implementation.
pub type ScalarFn = fn(&[Value]) -> Value;

/// The evaluation context handed to plan nodes.
///
/// `store` is present only while assembling the output rows of an
/// aggregate query; aggregator nodes read their finalized slots from it.
pub struct ExecContext<'a> {
    /// The current row context.
    pub row: &'a Row,
    /// Per-group aggregator storage, if any.
    pub store: Option<&'a [Value]>,
}

/// A compiled unary operation.
#[derive(Debug, Clone)]
pub struct UnaryEval {
    /// The operator implementation.
    pub call: UnaryFn,
    /// The operand.
    pub operand: Box<EvalNode>,
    /// The result type.
    pub dtype: DataType,
    /// Whether the implementation handles NULL operands itself.
    pub nullsafe: bool,
}

/// A compiled binary operation.
#[derive(Debug, Clone)]
pub struct BinaryEval {
    /// The operator implementation.
    pub call: BinaryFn,
    /// The left operand.
    pub left: Box<EvalNode>,
    /// The right operand.
    pub right: Box<EvalNode>,
    /// The result type.
    pub dtype: DataType,
    /// Whether the implementation handles NULL operands itself.
    pub nullsafe: bool,
}

/// A compiled scalar function call.
#[derive(Debug, Clone)]
pub struct FunctionEval {
    /// The resolved function name.
    pub name: &'static str,
    /// The function implementation.
    pub call: ScalarFn,
    /// The compiled arguments.
    pub operands: Vec<EvalNode>,
    /// The result type.
    pub dtype: DataType,
    /// Whether the implementation handles NULL arguments itself.
    pub nullsafe: bool,
}

/// The built-in aggregator behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    /// `COUNT(*)`: number of rows.
    Count,
    /// `COUNT(expr)`: number of non-NULL values.
    CountArg,
    /// `SUM` over integers.
    SumInt,
    /// `SUM` over decimals.
    SumDecimal,
    /// `SUM` over amounts, producing an inventory.
    SumAmount,
    /// `SUM` over positions, producing an inventory.
    SumPosition,
    /// `SUM` over inventories.
    SumInventory,
    /// First non-NULL value seen.
    First,
    /// Last value seen.
    Last,
    /// Minimum non-NULL value.
    Min,
    /// Maximum non-NULL value.
    Max,
}

/// A compiled aggregator.
///
/// Aggregator nodes are shared across groups and hold only their slot
/// index; all per-group state lives in the store vector owned by the
/// executor.
#[derive(Debug, Clone)]
pub struct AggregateEval {
    /// The aggregation behavior.
    pub kind: AggKind,
    /// The compiled arguments.
    pub operands: Vec<EvalNode>,
    /// The result type.
    pub dtype: DataType,
    /// The storage slot index, assigned at compile time.
    pub handle: usize,
}

impl AggregateEval {
    /// Reserves this aggregator's storage slot.
    pub fn allocate(&mut self, allocator: &mut crate::execute::Allocator) {
        self.handle = allocator.allocate();
    }

    /// Seeds this aggregator's slot with the zero value of its output.
    pub fn initialize(&self, store: &mut [Value]) {
        store[self.handle] = match self.kind {
            AggKind::Count | AggKind::CountArg => Value::Int(0),
            AggKind::SumInt => Value::Int(0),
            AggKind::SumDecimal => Value::Decimal(Decimal::ZERO),
            AggKind::SumAmount | AggKind::SumPosition | AggKind::SumInventory => {
                Value::Inventory(Inventory::new())
            }
            AggKind::First | AggKind::Last | AggKind::Min | AggKind::Max => Value::Null,
        };
    }

    /// Folds one accepted row into this aggregator's slot.
    pub fn update(&self, store: &mut [Value], row: &Row) {
        let ctx = ExecContext { row, store: None };
        let slot = self.handle;
        match self.kind {
            AggKind::Count => {
                if let Value::Int(n) = &mut store[slot] {
                    *n += 1;
                }
            }
            AggKind::CountArg => {
                if !self.operands[0].eval(&ctx).is_null() {
                    if let Value::Int(n) = &mut store[slot] {
                        *n += 1;
                    }
                }
            }
            AggKind::SumInt => {
                if let Value::Int(value) = self.operands[0].eval(&ctx) {
                    if let Value::Int(n) = &mut store[slot] {
                        *n = n.saturating_add(value);
                    }
                }
            }
            AggKind::SumDecimal => {
                if let Value::Decimal(value) = self.operands[0].eval(&ctx) {
                    if let Value::Decimal(n) = &mut store[slot] {
                        *n += value;
                    }
                }
            }
            AggKind::SumAmount => {
                if let Value::Amount(value) = self.operands[0].eval(&ctx) {
                    if let Value::Inventory(inv) = &mut store[slot] {
                        inv.add_amount(&value);
                    }
                }
            }
            AggKind::SumPosition => {
                if let Value::Position(value) = self.operands[0].eval(&ctx) {
                    if let Value::Inventory(inv) = &mut store[slot] {
                        inv.add_position(&value);
                    }
                }
            }
            AggKind::SumInventory => {
                if let Value::Inventory(value) = self.operands[0].eval(&ctx) {
                    if let Value::Inventory(inv) = &mut store[slot] {
                        inv.add_inventory(&value);
                    }
                }
            }
            AggKind::First => {
                if store[slot].is_null() {
                    store[slot] = self.operands[0].eval(&ctx);
                }
            }
            AggKind::Last => {
                store[slot] = self.operands[0].eval(&ctx);
            }
            AggKind::Min => {
                let value = self.operands[0].eval(&ctx);
                if !value.is_null() && (store[slot].is_null() || value < store[slot]) {
                    store[slot] = value;
                }
            }
            AggKind::Max => {
                let value = self.operands[0].eval(&ctx);
                if !value.is_null() && (store[slot].is_null() || value > store[slot]) {
                    store[slot] = value;
                }
            }
        }
    }

    /// Publishes the final value of this aggregator's slot.
    ///
    /// The built-in aggregators accumulate their result in place, so there
    /// is nothing left to compute; the slot is read back during output row
    /// assembly.
    pub fn finalize(&self, store: &mut [Value]) {
        let _ = store;
    }
}

impl PartialEq for AggregateEval {
    fn eq(&self, other: &Self) -> bool {
        // The handle is assigned after ORDER BY reconciliation and does
        // not take part in structural equality.
        self.kind == other.kind && self.dtype == other.dtype && self.operands == other.operands
    }
}

/// A compiled expression node.
#[derive(Debug, Clone)]
pub enum EvalNode {
    /// A constant value.
    Constant {
        /// The value.
        value: Value,
        /// The declared type, which may be wider than the value's.
        dtype: DataType,
    },

    /// A table column accessor.
    Column {
        /// The source column name.
        name: String,
        /// The accessor.
        column: Column,
    },

    /// A unary operation.
    Unary(UnaryEval),

    /// A binary operation.
    Binary(BinaryEval),

    /// A range check; NULL operands yield NULL.
    Between {
        /// The checked operand.
        operand: Box<EvalNode>,
        /// Lower bound (inclusive).
        lower: Box<EvalNode>,
        /// Upper bound (inclusive).
        upper: Box<EvalNode>,
    },

    /// Three-valued conjunction.
    And(Vec<EvalNode>),

    /// Three-valued disjunction.
    Or(Vec<EvalNode>),

    /// First non-NULL argument; all arguments share one type.
    Coalesce(Vec<EvalNode>),

    /// A scalar function call.
    Function(FunctionEval),

    /// Subscript access on a mapping; the result is untyped.
    GetItem {
        /// The mapping operand.
        operand: Box<EvalNode>,
        /// The literal key.
        key: String,
    },

    /// Attribute access on a structured value.
    Getter {
        /// The structured operand.
        operand: Box<EvalNode>,
        /// The accessed field.
        field: Field,
    },

    /// A quantified comparison over materialized subquery values.
    Quantified {
        /// The comparison implementation.
        call: BinaryFn,
        /// True for ALL, false for ANY.
        all: bool,
        /// The left operand.
        left: Box<EvalNode>,
        /// The materialized comparison values.
        values: Vec<Value>,
    },

    /// An aggregator.
    Aggregate(AggregateEval),
}

impl EvalNode {
    /// The resolved datatype of this node.
    #[must_use]
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Constant { dtype, .. } => *dtype,
            Self::Column { column, .. } => column.dtype(),
            Self::Unary(node) => node.dtype,
            Self::Binary(node) => node.dtype,
            Self::Between { .. } | Self::And(_) | Self::Or(_) | Self::Quantified { .. } => {
                DataType::Bool
            }
            Self::Coalesce(args) => args[0].dtype(),
            Self::Function(node) => node.dtype,
            Self::GetItem { .. } => DataType::Object,
            Self::Getter { field, .. } => field.dtype,
            Self::Aggregate(node) => node.dtype,
        }
    }

    /// Evaluates this node against a row context.
    #[must_use]
    pub fn eval(&self, ctx: &ExecContext<'_>) -> Value {
        match self {
            Self::Constant { value, .. } => value.clone(),
            Self::Column { column, .. } => column.get(ctx.row),
            Self::Unary(node) => {
                let operand = node.operand.eval(ctx);
                if operand.is_null() && !node.nullsafe {
                    return Value::Null;
                }
                (node.call)(&operand)
            }
            Self::Binary(node) => {
                let left = node.left.eval(ctx);
                if left.is_null() && !node.nullsafe {
                    return Value::Null;
                }
                let right = node.right.eval(ctx);
                if right.is_null() && !node.nullsafe {
                    return Value::Null;
                }
                (node.call)(&left, &right)
            }
            Self::Between {
                operand,
                lower,
                upper,
            } => {
                let operand = operand.eval(ctx);
                if operand.is_null() {
                    return Value::Null;
                }
                let lower = lower.eval(ctx);
                if lower.is_null() {
                    return Value::Null;
                }
                let upper = upper.eval(ctx);
                if upper.is_null() {
                    return Value::Null;
                }
                Value::Bool(lower <= operand && operand <= upper)
            }
            Self::And(args) => {
                let mut null = false;
                for arg in args {
                    let value = arg.eval(ctx);
                    if value.is_null() {
                        null = true;
                    } else if !value.is_truthy() {
                        return Value::Bool(false);
                    }
                }
                if null {
                    Value::Null
                } else {
                    Value::Bool(true)
                }
            }
            Self::Or(args) => {
                let mut null = false;
                for arg in args {
                    let value = arg.eval(ctx);
                    if value.is_null() {
                        null = true;
                    } else if value.is_truthy() {
                        return Value::Bool(true);
                    }
                }
                if null {
                    Value::Null
                } else {
                    Value::Bool(false)
                }
            }
            Self::Coalesce(args) => {
                for arg in args {
                    let value = arg.eval(ctx);
                    if !value.is_null() {
                        return value;
                    }
                }
                Value::Null
            }
            Self::Function(node) => {
                let mut args = Vec::with_capacity(node.operands.len());
                for operand in &node.operands {
                    let value = operand.eval(ctx);
                    if value.is_null() && !node.nullsafe {
                        return Value::Null;
                    }
                    args.push(value);
                }
                (node.call)(&args)
            }
            Self::GetItem { operand, key } => match operand.eval(ctx) {
                Value::Map(map) => map.get(key).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            },
            Self::Getter { operand, field } => {
                let operand = operand.eval(ctx);
                if operand.is_null() {
                    return Value::Null;
                }
                (field.getter)(&operand)
            }
            Self::Quantified {
                call,
                all,
                left,
                values,
            } => {
                let left = left.eval(ctx);
                if left.is_null() {
                    return Value::Null;
                }
                let mut null = false;
                for value in values {
                    match call(&left, value) {
                        Value::Null => null = true,
                        value if value.is_truthy() == !*all => {
                            // Short circuit: a hit decides ANY, a miss
                            // decides ALL.
                            return Value::Bool(!*all);
                        }
                        _ => {}
                    }
                }
                if null {
                    Value::Null
                } else {
                    Value::Bool(*all)
                }
            }
            Self::Aggregate(node) => ctx
                .store
                .map_or(Value::Null, |store| store[node.handle].clone()),
        }
    }

    /// Visits the direct children of this node.
    pub fn children<'a>(&'a self, f: &mut impl FnMut(&'a EvalNode)) {
        match self {
            Self::Constant { .. } | Self::Column { .. } => {}
            Self::Unary(node) => f(&node.operand),
            Self::Binary(node) => {
                f(&node.left);
                f(&node.right);
            }
            Self::Between {
                operand,
                lower,
                upper,
            } => {
                f(operand);
                f(lower);
                f(upper);
            }
            Self::And(args) | Self::Or(args) | Self::Coalesce(args) => {
                for arg in args {
                    f(arg);
                }
            }
            Self::Function(node) => {
                for operand in &node.operands {
                    f(operand);
                }
            }
            Self::GetItem { operand, .. } | Self::Getter { operand, .. } => f(operand),
            Self::Quantified { left, .. } => f(left),
            Self::Aggregate(node) => {
                for operand in &node.operands {
                    f(operand);
                }
            }
        }
    }

    /// Visits every aggregator in this tree, mutably.
    pub fn for_each_aggregate_mut(&mut self, f: &mut impl FnMut(&mut AggregateEval)) {
        match self {
            Self::Aggregate(node) => f(node),
            Self::Constant { .. } | Self::Column { .. } => {}
            Self::Unary(node) => node.operand.for_each_aggregate_mut(f),
            Self::Binary(node) => {
                node.left.for_each_aggregate_mut(f);
                node.right.for_each_aggregate_mut(f);
            }
            Self::Between {
                operand,
                lower,
                upper,
            } => {
                operand.for_each_aggregate_mut(f);
                lower.for_each_aggregate_mut(f);
                upper.for_each_aggregate_mut(f);
            }
            Self::And(args) | Self::Or(args) | Self::Coalesce(args) => {
                for arg in args {
                    arg.for_each_aggregate_mut(f);
                }
            }
            Self::Function(node) => {
                for operand in &mut node.operands {
                    operand.for_each_aggregate_mut(f);
                }
            }
            Self::GetItem { operand, .. } | Self::Getter { operand, .. } => {
                operand.for_each_aggregate_mut(f);
            }
            Self::Quantified { left, .. } => left.for_each_aggregate_mut(f),
        }
    }
}

impl PartialEq for EvalNode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Constant { value: a, dtype: ta },
                Self::Constant { value: b, dtype: tb },
            ) => a == b && ta == tb,
            (Self::Column { column: a, .. }, Self::Column { column: b, .. }) => a.ptr_eq(b),
            (Self::Unary(a), Self::Unary(b)) => {
                a.call == b.call && a.dtype == b.dtype && a.operand == b.operand
            }
            (Self::Binary(a), Self::Binary(b)) => {
                a.call == b.call && a.dtype == b.dtype && a.left == b.left && a.right == b.right
            }
            (
                Self::Between {
                    operand: a,
                    lower: al,
                    upper: au,
                },
                Self::Between {
                    operand: b,
                    lower: bl,
                    upper: bu,
                },
            ) => a == b && al == bl && au == bu,
            (Self::And(a), Self::And(b)) | (Self::Or(a), Self::Or(b)) => a == b,
            (Self::Coalesce(a), Self::Coalesce(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => {
                a.name == b.name
                    && a.call == b.call
                    && a.dtype == b.dtype
                    && a.operands == b.operands
            }
            (
                Self::GetItem { operand: a, key: ka },
                Self::GetItem { operand: b, key: kb },
            ) => a == b && ka == kb,
            (
                Self::Getter { operand: a, field: fa },
                Self::Getter { operand: b, field: fb },
            ) => a == b && fa.ptr_eq(fb),
            (Self::Aggregate(a), Self::Aggregate(b)) => a == b,
            _ => false,
        }
    }
}

/// Walks a tree collecting the columns and aggregators below it.
///
/// Nodes under aggregators are not visited, so a column inside an
/// aggregate argument does not count as a plain column reference.
pub fn get_columns_and_aggregates<'a>(
    node: &'a EvalNode,
    columns: &mut Vec<&'a EvalNode>,
    aggregates: &mut Vec<&'a EvalNode>,
) {
    match node {
        EvalNode::Aggregate(_) => aggregates.push(node),
        EvalNode::Column { .. } => columns.push(node),
        _ => node.children(&mut |child| {
            get_columns_and_aggregates(child, columns, aggregates);
        }),
    }
}

/// Returns true if the node contains an aggregator.
#[must_use]
pub fn is_aggregate(node: &EvalNode) -> bool {
    let mut columns = Vec::new();
    let mut aggregates = Vec::new();
    get_columns_and_aggregates(node, &mut columns, &mut aggregates);
    !aggregates.is_empty()
}

/// A compiled target.
#[derive(Debug, Clone)]
pub struct EvalTarget {
    /// The compiled expression.
    pub expr: EvalNode,
    /// The display name; `None` marks an invisible target that is
    /// evaluated but not part of the result set.
    pub name: Option<String>,
    /// True if the expression contains an aggregator.
    pub is_aggregate: bool,
}

/// A compiled query, ready for execution.
#[derive(Clone)]
pub struct EvalQuery {
    /// The row source.
    pub table: Arc<dyn Table>,
    /// All targets, visible and invisible.
    pub targets: Vec<EvalTarget>,
    /// The row filter, if any.
    pub where_clause: Option<EvalNode>,
    /// Indexes of the grouping targets; `None` for non-aggregate queries.
    /// Covers exactly the non-aggregate targets, and is empty for queries
    /// with only aggregate targets.
    pub group_indexes: Option<Vec<usize>>,
    /// Index of the invisible HAVING target, if any.
    pub having_index: Option<usize>,
    /// `(target index, direction)` sort terms, if any.
    pub order_spec: Option<Vec<(usize, Ordering)>>,
    /// Maximum number of result rows, if any.
    pub limit: Option<u64>,
    /// Whether to drop duplicate result rows.
    pub distinct: bool,
    /// Number of aggregator storage slots to allocate per group.
    pub store_size: usize,
}

impl std::fmt::Debug for EvalQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalQuery")
            .field("table", &self.table.name())
            .field("targets", &self.targets)
            .field("where_clause", &self.where_clause)
            .field("group_indexes", &self.group_indexes)
            .field("having_index", &self.having_index)
            .field("order_spec", &self.order_spec)
            .field("limit", &self.limit)
            .field("distinct", &self.distinct)
            .finish_non_exhaustive()
    }
}

/// A compiled query with a PIVOT BY clause.
#[derive(Debug, Clone)]
pub struct EvalPivot {
    /// The underlying query.
    pub query: EvalQuery,
    /// The two resolved pivot column indexes.
    pub pivots: (usize, usize),
}

/// A compiled PRINT statement.
#[derive(Clone)]
pub struct EvalPrint {
    /// The table to print.
    pub table: Arc<dyn Table>,
    /// The row filter, if any.
    pub where_clause: Option<EvalNode>,
}

impl std::fmt::Debug for EvalPrint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalPrint")
            .field("table", &self.table.name())
            .field("where_clause", &self.where_clause)
            .finish()
    }
}

/// A compiled statement.
#[derive(Debug, Clone)]
pub enum Plan {
    /// A SELECT (or rewritten BALANCES/JOURNAL) query.
    Query(EvalQuery),
    /// A pivoted query.
    Pivot(EvalPivot),
    /// A PRINT statement.
    Print(EvalPrint),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_row() -> Row {
        Arc::new(())
    }

    fn constant(value: Value) -> EvalNode {
        let dtype = value.datatype();
        EvalNode::Constant { value, dtype }
    }

    fn eval(node: &EvalNode) -> Value {
        let row = ctx_row();
        node.eval(&ExecContext {
            row: &row,
            store: None,
        })
    }

    #[test]
    fn test_three_valued_and() {
        let null = constant(Value::Null);
        let t = constant(Value::Bool(true));
        let f = constant(Value::Bool(false));
        // NULL AND FALSE = FALSE
        assert_eq!(
            eval(&EvalNode::And(vec![null.clone(), f.clone()])),
            Value::Bool(false)
        );
        // NULL AND TRUE = NULL
        assert_eq!(eval(&EvalNode::And(vec![null.clone(), t.clone()])), Value::Null);
        assert_eq!(eval(&EvalNode::And(vec![t.clone(), t.clone()])), Value::Bool(true));
        // Symmetric for OR.
        assert_eq!(
            eval(&EvalNode::Or(vec![null.clone(), t])),
            Value::Bool(true)
        );
        assert_eq!(eval(&EvalNode::Or(vec![null, f])), Value::Null);
    }

    #[test]
    fn test_coalesce_returns_first_non_null() {
        let node = EvalNode::Coalesce(vec![
            constant(Value::Null),
            constant(Value::Int(3)),
            constant(Value::Int(4)),
        ]);
        assert_eq!(eval(&node), Value::Int(3));
    }

    #[test]
    fn test_between_null_propagates() {
        let node = EvalNode::Between {
            operand: Box::new(constant(Value::Null)),
            lower: Box::new(constant(Value::Int(1))),
            upper: Box::new(constant(Value::Int(10))),
        };
        assert_eq!(eval(&node), Value::Null);
    }

    #[test]
    fn test_count_aggregator() {
        let agg = AggregateEval {
            kind: AggKind::Count,
            operands: vec![],
            dtype: DataType::Int,
            handle: 0,
        };
        let mut store = vec![Value::Null];
        agg.initialize(&mut store);
        let row = ctx_row();
        agg.update(&mut store, &row);
        agg.update(&mut store, &row);
        agg.finalize(&mut store);
        assert_eq!(store[0], Value::Int(2));
    }

    #[test]
    fn test_min_aggregator_skips_nulls() {
        let agg = AggregateEval {
            kind: AggKind::Min,
            operands: vec![constant(Value::Null)],
            dtype: DataType::Int,
            handle: 0,
        };
        let mut store = vec![Value::Null];
        agg.initialize(&mut store);
        let row = ctx_row();
        agg.update(&mut store, &row);
        assert_eq!(store[0], Value::Null);
    }
}
