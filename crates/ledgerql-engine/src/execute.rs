//! Execution of compiled plans over data rows.
//!
//! Execution runs to completion on the calling thread: scan, aggregate,
//! sort, project, de-duplicate, limit, pivot. Runtime data problems yield
//! NULL values rather than errors, consistent with SQL semantics.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use ledgerql_core::ast::Ordering;

use crate::cursor::Column;
use crate::error::{Error, Result};
use crate::eval::{
    AggregateEval, EvalNode, EvalPivot, EvalPrint, EvalQuery, ExecContext, Plan,
};
use crate::render::EntryRenderer;
use crate::tables::Row;
use crate::value::Value;

/// Counts slot allocations and hands out dense handles for aggregator
/// storage.
#[derive(Debug, Default)]
pub struct Allocator {
    size: usize,
}

impl Allocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new slot and returns its handle.
    pub fn allocate(&mut self) -> usize {
        let handle = self.size;
        self.size += 1;
        handle
    }

    /// The number of slots allocated so far.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Creates a store accommodating every allocated slot.
    #[must_use]
    pub fn create_store(&self) -> Vec<Value> {
        vec![Value::Null; self.size]
    }
}

/// Executes a compiled query plan.
///
/// # Errors
///
/// Returns an interface error for PRINT plans, which produce no result
/// set; execute those with [`execute_print`].
pub fn execute_query(plan: &Plan) -> Result<(Vec<Column>, Vec<Vec<Value>>)> {
    match plan {
        Plan::Query(query) => Ok(execute_select(query)),
        Plan::Pivot(pivot) => Ok(execute_pivot(pivot)),
        Plan::Print(_) => Err(Error::Interface(String::from(
            "PRINT does not produce a result set",
        ))),
    }
}

/// Returns true if the filter accepts the row; NULL does not match.
fn accept(filter: Option<&EvalNode>, ctx: &ExecContext<'_>) -> bool {
    filter.map_or(true, |expr| expr.eval(ctx).is_truthy())
}

/// Executes a compiled SELECT and returns the result description and
/// rows.
#[must_use]
pub fn execute_select(query: &EvalQuery) -> (Vec<Column>, Vec<Vec<Value>>) {
    // The result set description covers the visible targets only.
    let result_types: Vec<Column> = query
        .targets
        .iter()
        .filter_map(|target| {
            target
                .name
                .as_ref()
                .map(|name| Column::new(name.clone(), target.expr.dtype()))
        })
        .collect();
    let result_indexes: Vec<usize> = query
        .targets
        .iter()
        .enumerate()
        .filter(|(_, target)| target.name.is_some())
        .map(|(index, _)| index)
        .collect();

    let mut rows: Vec<Vec<Value>> = Vec::new();

    if let Some(group_indexes) = &query.group_indexes {
        // Aggregated query: fold rows into per-group accumulator stores.
        let group_set: HashSet<usize> = group_indexes.iter().copied().collect();
        let key_exprs: Vec<&EvalNode> = query
            .targets
            .iter()
            .enumerate()
            .filter(|(index, _)| group_set.contains(index))
            .map(|(_, target)| &target.expr)
            .collect();
        let mut aggregates: Vec<&AggregateEval> = Vec::new();
        for (index, target) in query.targets.iter().enumerate() {
            if !group_set.contains(&index) {
                collect_aggregates(&target.expr, &mut aggregates);
            }
        }

        let mut groups: IndexMap<Vec<Value>, Vec<Value>> = IndexMap::new();
        for row in query.table.iter() {
            let ctx = ExecContext {
                row: &row,
                store: None,
            };
            if !accept(query.where_clause.as_ref(), &ctx) {
                continue;
            }
            let key: Vec<Value> = key_exprs.iter().map(|expr| expr.eval(&ctx)).collect();
            let store = groups.entry(key).or_insert_with(|| {
                let mut store = vec![Value::Null; query.store_size];
                for aggregate in &aggregates {
                    aggregate.initialize(&mut store);
                }
                store
            });
            for aggregate in &aggregates {
                aggregate.update(store, &row);
            }
        }

        for (key, mut store) in groups {
            for aggregate in &aggregates {
                aggregate.finalize(&mut store);
            }
            let row: Row = Arc::new(());
            let ctx = ExecContext {
                row: &row,
                store: Some(store.as_slice()),
            };
            let mut key_iter = key.into_iter();
            let values: Vec<Value> = query
                .targets
                .iter()
                .enumerate()
                .map(|(index, target)| {
                    if group_set.contains(&index) {
                        key_iter.next().unwrap_or(Value::Null)
                    } else {
                        target.expr.eval(&ctx)
                    }
                })
                .collect();
            if let Some(having_index) = query.having_index {
                if !values[having_index].is_truthy() {
                    continue;
                }
            }
            rows.push(values);
        }
    } else {
        // Non-aggregated query: stream rows through the filter.
        for row in query.table.iter() {
            let ctx = ExecContext {
                row: &row,
                store: None,
            };
            if accept(query.where_clause.as_ref(), &ctx) {
                rows.push(
                    query
                        .targets
                        .iter()
                        .map(|target| target.expr.eval(&ctx))
                        .collect(),
                );
            }
        }
    }

    // Multi-key mixed-direction sort: one stable sort per run of terms
    // with the same direction, applied from the least significant run to
    // the most significant. NULL orders before every other value.
    if let Some(order_spec) = &query.order_spec {
        let mut terms = order_spec.iter().rev().peekable();
        while let Some(&(index, direction)) = terms.next() {
            let mut indexes = vec![index];
            while let Some(&&(next, d)) = terms.peek() {
                if d != direction {
                    break;
                }
                indexes.push(next);
                terms.next();
            }
            indexes.reverse();
            rows.sort_by(|a, b| {
                let ordering = indexes
                    .iter()
                    .map(|&i| a[i].cmp(&b[i]))
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal);
                match direction {
                    Ordering::Asc => ordering,
                    Ordering::Desc => ordering.reverse(),
                }
            });
        }
    }

    // Project to the visible targets.
    let mut rows: Vec<Vec<Value>> = rows
        .into_iter()
        .map(|row| result_indexes.iter().map(|&i| row[i].clone()).collect())
        .collect();

    if query.distinct {
        let mut seen = HashSet::new();
        rows.retain(|row| seen.insert(row.clone()));
    }

    if let Some(limit) = query.limit {
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }

    tracing::debug!(rows = rows.len(), table = query.table.name(), "query executed");
    (result_types, rows)
}

fn collect_aggregates<'a>(node: &'a EvalNode, aggregates: &mut Vec<&'a AggregateEval>) {
    if let EvalNode::Aggregate(aggregate) = node {
        aggregates.push(aggregate);
        return;
    }
    node.children(&mut |child| collect_aggregates(child, aggregates));
}

/// Executes a pivoted query.
///
/// The first output column carries the first pivot column; then, for each
/// distinct value of the second pivot column, one output column per
/// remaining visible column.
#[must_use]
pub fn execute_pivot(pivot: &EvalPivot) -> (Vec<Column>, Vec<Vec<Value>>) {
    let (columns, mut rows) = execute_select(&pivot.query);
    let (col1, col2) = pivot.pivots;
    if col1 >= columns.len() || col2 >= columns.len() {
        return (columns, rows);
    }

    let othercols: Vec<usize> = (0..columns.len())
        .filter(|&i| i != col1 && i != col2)
        .collect();
    let nother = othercols.len();
    let keys: Vec<Value> = rows
        .iter()
        .map(|row| row[col2].clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    // Output column names and types.
    let mut names = vec![format!("{}/{}", columns[col1].name(), columns[col2].name())];
    if nother > 1 {
        for key in &keys {
            for &other in &othercols {
                names.push(format!("{}/{}", key, columns[other].name()));
            }
        }
    } else {
        for key in &keys {
            names.push(key.to_string());
        }
    }
    let mut datatypes = vec![columns[col1].datatype()];
    for _ in &keys {
        for &other in &othercols {
            datatypes.push(columns[other].datatype());
        }
    }
    let columns: Vec<Column> = names
        .into_iter()
        .zip(datatypes)
        .map(|(name, datatype)| Column::new(name, datatype))
        .collect();

    // Group rows by the first pivot column and write the remaining
    // columns at the offset selected by the second pivot column's value.
    rows.sort_by(|a, b| a[col1].cmp(&b[col1]));
    let mut pivoted: Vec<Vec<Value>> = Vec::new();
    for row in rows {
        let new_group = pivoted
            .last()
            .map_or(true, |out: &Vec<Value>| out[0] != row[col1]);
        if new_group {
            let mut outrow = vec![Value::Null; 1 + keys.len() * nother];
            outrow[0] = row[col1].clone();
            pivoted.push(outrow);
        }
        if let (Some(outrow), Some(position)) = (
            pivoted.last_mut(),
            keys.iter().position(|key| *key == row[col2]),
        ) {
            let base = position * nother + 1;
            for (offset, &other) in othercols.iter().enumerate() {
                if base + offset < outrow.len() {
                    outrow[base + offset] = row[other].clone();
                }
            }
        }
    }

    (columns, pivoted)
}

/// Executes a compiled PRINT statement, handing the accepted entries and
/// the table's display context to the renderer.
///
/// # Errors
///
/// Propagates renderer failures.
pub fn execute_print(print: &EvalPrint, renderer: &mut dyn EntryRenderer) -> Result<()> {
    let mut entries = Vec::new();
    for row in print.table.iter() {
        let ctx = ExecContext {
            row: &row,
            store: None,
        };
        if accept(print.where_clause.as_ref(), &ctx) {
            entries.push(row);
        }
    }
    tracing::debug!(entries = entries.len(), "print executed");
    renderer.render(&entries, &print.table.dcontext())
}
