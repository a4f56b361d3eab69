//! The compiler: AST to typed plan.
//!
//! Compilation binds column and function names against the connection's
//! catalog, resolves operator overloads with numeric promotion, folds
//! constants, rewrites the JOURNAL and BALANCES shorthands into SELECT,
//! and validates the GROUP BY / ORDER BY / HAVING / PIVOT BY clauses.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use ledgerql_core::ast::{
    self, Balances, BinaryOp, ByColumn, Expr, ExprKind, FromClause, GroupBy, Journal, Literal,
    OrderBy, Ordering, PivotBy, PivotColumn, Placeholder, Print, Quantifier, Select, Statement,
    Targets, UnaryOp,
};
use ledgerql_core::parser::parse;
use ledgerql_core::Span;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::eval::{
    self, AggregateEval, BinaryEval, EvalNode, EvalPivot, EvalPrint, EvalQuery, EvalTarget,
    ExecContext, FunctionEval, Plan, UnaryEval,
};
use crate::execute::{self, Allocator};
use crate::functions::FuncEntry;
use crate::tables::{Row, SubqueryTable, Table};
use crate::types::DataType;
use crate::value::Value;

/// Query parameters bound to statement placeholders.
#[derive(Debug, Clone)]
pub enum Params {
    /// Values for `%s` placeholders, in order.
    Positional(Vec<Value>),
    /// Values for `%(name)s` placeholders.
    Named(HashMap<String, Value>),
}

/// Compiles a parsed statement into an executable plan.
///
/// # Errors
///
/// Returns a compilation error for semantic problems and a parameter
/// error when `parameters` do not match the statement placeholders.
pub fn compile(
    context: &Connection,
    statement: &Statement,
    text: &str,
    parameters: Option<&Params>,
) -> Result<Plan> {
    let mut compiler = Compiler {
        context,
        table: context.default_table(),
        text: text.to_owned(),
        parameters,
    };
    compiler.compile(statement)
}

struct Compiler<'a> {
    context: &'a Connection,
    table: Arc<dyn Table>,
    /// The text the current statement's spans refer to; replaced while
    /// compiling the rewritten JOURNAL and BALANCES statements.
    text: String,
    parameters: Option<&'a Params>,
}

impl Compiler<'_> {
    fn compile(&mut self, statement: &Statement) -> Result<Plan> {
        self.check_parameters(statement)?;
        match statement {
            Statement::Select(select) => {
                let (query, pivots) = self.compile_select(select)?;
                Ok(match pivots {
                    Some(pivots) => Plan::Pivot(EvalPivot { query, pivots }),
                    None => Plan::Query(query),
                })
            }
            Statement::Balances(balances) => {
                let (select, text) = transform_balances(balances)?;
                self.text = text;
                let (query, pivots) = self.compile_select(&select)?;
                debug_assert!(pivots.is_none());
                Ok(Plan::Query(query))
            }
            Statement::Journal(journal) => {
                let (select, text) = transform_journal(journal)?;
                self.text = text;
                let (query, pivots) = self.compile_select(&select)?;
                debug_assert!(pivots.is_none());
                Ok(Plan::Query(query))
            }
            Statement::Print(print) => self.compile_print(print),
        }
    }

    /// Validates the statement placeholders against the parameters.
    fn check_parameters(&self, statement: &Statement) -> Result<()> {
        let mut placeholders = Vec::new();
        statement.walk_exprs(&mut |expr| {
            if let ExprKind::Placeholder(placeholder) = &expr.kind {
                placeholders.push(placeholder.clone());
            }
        });
        if placeholders.is_empty() {
            return Ok(());
        }

        let names: BTreeSet<&String> = placeholders
            .iter()
            .filter_map(|p| match p {
                Placeholder::Named(name) => Some(name),
                Placeholder::Positional(_) => None,
            })
            .collect();
        let positional = placeholders
            .iter()
            .filter(|p| matches!(p, Placeholder::Positional(_)))
            .count();

        if !names.is_empty() && positional > 0 {
            return Err(Error::Parameter(String::from(
                "positional and named parameters cannot be mixed",
            )));
        }

        if !names.is_empty() {
            let Some(Params::Named(parameters)) = self.parameters else {
                return Err(Error::Parameter(String::from(
                    "query parameters should be a mapping when using named placeholders",
                )));
            };
            let missing: Vec<&str> = names
                .iter()
                .filter(|name| !parameters.contains_key(name.as_str()))
                .map(|name| name.as_str())
                .collect();
            if !missing.is_empty() {
                return Err(Error::Parameter(format!(
                    "query parameter missing: {}",
                    missing.join(", ")
                )));
            }
        } else {
            let Some(Params::Positional(parameters)) = self.parameters else {
                return Err(Error::Parameter(String::from(
                    "query parameters should be a sequence when using positional placeholders",
                )));
            };
            if positional != parameters.len() {
                return Err(Error::Parameter(format!(
                    "the query has {} placeholders but {} parameters were passed",
                    positional,
                    parameters.len()
                )));
            }
        }
        Ok(())
    }

    /// Compiles a SELECT, returning the query and the resolved pivot
    /// column indexes, if any.
    fn compile_select(&mut self, select: &Select) -> Result<(EvalQuery, Option<(usize, usize)>)> {
        let saved = self.table.clone();
        let result = self.compile_select_inner(select);
        self.table = saved;
        result
    }

    fn compile_select_inner(
        &mut self,
        select: &Select,
    ) -> Result<(EvalQuery, Option<(usize, usize)>)> {
        let from_expr = self.compile_from(select.from_clause.as_ref())?;

        let mut targets = self.compile_targets(&select.targets)?;

        let mut where_clause = select
            .where_clause
            .as_ref()
            .map(|expr| self.compile_expr(expr))
            .transpose()?;
        if let Some(c_where) = &where_clause {
            if eval::is_aggregate(c_where) {
                return Err(Error::compilation(
                    "aggregates are not allowed in WHERE clause",
                    select.where_clause.as_ref().map(|e| e.span),
                ));
            }
        }
        // Conjoin the FROM filtering expression with WHERE.
        where_clause = match (from_expr, where_clause) {
            (Some(from_expr), Some(c_where)) => Some(EvalNode::And(vec![from_expr, c_where])),
            (from_expr, c_where) => from_expr.or(c_where),
        };

        let (group_indexes, having_index) =
            self.compile_group_by(select.group_by.as_ref(), &mut targets)?;

        let order_spec = self.compile_order_by(&select.order_by, &mut targets)?;

        // In an aggregate query every non-aggregate target must be grouped
        // on; this holds by construction unless ORDER BY added new
        // non-aggregate expressions.
        if let Some(group_indexes) = &group_indexes {
            let grouped: HashSet<usize> = group_indexes.iter().copied().collect();
            let missing: Vec<String> = targets
                .iter()
                .enumerate()
                .filter(|(index, target)| !target.is_aggregate && !grouped.contains(index))
                .map(|(_, target)| format!("\"{}\"", target.name.as_deref().unwrap_or("")))
                .collect();
            if !missing.is_empty() {
                return Err(Error::compilation(
                    format!(
                        "all non-aggregates must be covered by GROUP-BY clause in aggregate \
                         query: the following targets are missing: {}",
                        missing.join(",")
                    ),
                    None,
                ));
            }
        }

        // Assign aggregator storage slots.
        let mut allocator = Allocator::new();
        for target in &mut targets {
            target
                .expr
                .for_each_aggregate_mut(&mut |aggregate: &mut AggregateEval| {
                    aggregate.allocate(&mut allocator);
                });
        }

        let query = EvalQuery {
            table: self.table.clone(),
            targets,
            where_clause,
            group_indexes,
            having_index,
            order_spec,
            limit: select.limit,
            distinct: select.distinct,
            store_size: allocator.size(),
        };

        let pivots = self.compile_pivot_by(select.pivot_by.as_ref(), &query)?;
        Ok((query, pivots))
    }

    fn compile_from(&mut self, from: Option<&FromClause>) -> Result<Option<EvalNode>> {
        match from {
            None => Ok(None),
            Some(FromClause::Table { name, span }) => {
                match self.context.table(name) {
                    Some(table) => {
                        self.table = table;
                        Ok(None)
                    }
                    None => Err(Error::compilation(
                        format!("table \"{name}\" does not exist"),
                        Some(*span),
                    )),
                }
            }
            Some(FromClause::Subselect(select)) => {
                let (query, pivots) = self.compile_select(select)?;
                if pivots.is_some() {
                    return Err(Error::compilation(
                        "subquery cannot have a PIVOT BY clause",
                        None,
                    ));
                }
                self.table = Arc::new(SubqueryTable::new(query));
                Ok(None)
            }
            Some(FromClause::Window(from)) => self.compile_from_window(from),
        }
    }

    fn compile_from_window(&mut self, from: &ast::From) -> Result<Option<EvalNode>> {
        let expression = from
            .expression
            .as_ref()
            .map(|expr| self.compile_expr(expr))
            .transpose()?;
        if let Some(c_expr) = &expression {
            if eval::is_aggregate(c_expr) {
                return Err(Error::compilation(
                    "aggregates are not allowed in FROM clause",
                    from.expression.as_ref().map(|e| e.span),
                ));
            }
        }
        if let (Some(open), Some(ast::CloseSpec::On(close))) = (from.open, from.close) {
            if open > close {
                return Err(Error::compilation("CLOSE date must follow OPEN date", None));
            }
        }
        if let Some(updated) = self.table.update(from.open, from.close, from.clear) {
            self.table = updated;
        }
        Ok(expression)
    }

    fn compile_print(&mut self, print: &Print) -> Result<Plan> {
        let Some(table) = self.context.table("entries") else {
            return Err(Error::compilation("table \"entries\" does not exist", None));
        };
        self.table = table;
        let where_clause = match &print.from_clause {
            Some(from) => self.compile_from_window(from)?,
            None => None,
        };
        Ok(Plan::Print(EvalPrint {
            table: self.table.clone(),
            where_clause,
        }))
    }

    fn compile_targets(&mut self, targets: &Targets) -> Result<Vec<EvalTarget>> {
        let mut c_targets = Vec::new();
        match targets {
            Targets::Wildcard => {
                for name in self.table.wildcard_columns() {
                    let expr = Expr::new(ExprKind::Column(name.clone()), Span::default());
                    let c_expr = self.compile_expr(&expr)?;
                    c_targets.push(EvalTarget {
                        expr: c_expr,
                        name: Some(name),
                        is_aggregate: false,
                    });
                }
            }
            Targets::List(targets) => {
                for target in targets {
                    let c_expr = self.compile_expr(&target.expression)?;

                    let mut columns = Vec::new();
                    let mut aggregates = Vec::new();
                    eval::get_columns_and_aggregates(&c_expr, &mut columns, &mut aggregates);
                    if !columns.is_empty() && !aggregates.is_empty() {
                        return Err(Error::compilation(
                            "mixed aggregates and non-aggregates are not allowed",
                            Some(target.expression.span),
                        ));
                    }
                    for aggregate in &aggregates {
                        let mut nested = false;
                        aggregate.children(&mut |child| nested |= eval::is_aggregate(child));
                        if nested {
                            return Err(Error::compilation(
                                "aggregates of aggregates are not allowed",
                                Some(target.expression.span),
                            ));
                        }
                    }

                    let name = target.name.clone().unwrap_or_else(|| {
                        match &target.expression.kind {
                            ExprKind::Column(name) => name.clone(),
                            _ => target.expression.text(&self.text).to_owned(),
                        }
                    });
                    let is_aggregate = !aggregates.is_empty();
                    c_targets.push(EvalTarget {
                        expr: c_expr,
                        name: Some(name),
                        is_aggregate,
                    });
                }
            }
        }
        Ok(c_targets)
    }

    /// Resolves the GROUP BY clause, appending invisible targets as
    /// needed, and derives the group indexes.
    #[allow(clippy::type_complexity)]
    fn compile_group_by(
        &mut self,
        group_by: Option<&GroupBy>,
        targets: &mut Vec<EvalTarget>,
    ) -> Result<(Option<Vec<usize>>, Option<usize>)> {
        let Some(group_by) = group_by else {
            // Without a GROUP BY clause, a mixed target list is either an
            // implicit grouping on every non-aggregate target or an
            // error, depending on configuration.
            let aggregate_count = targets.iter().filter(|t| t.is_aggregate).count();
            if aggregate_count == 0 {
                return Ok((None, None));
            }
            if aggregate_count == targets.len() {
                return Ok((Some(Vec::new()), None));
            }
            if !self.context.options.implicit_group_by {
                return Err(Error::compilation(
                    "aggregate query without a GROUP-BY should have only aggregates",
                    None,
                ));
            }
            let group_indexes = targets
                .iter()
                .enumerate()
                .filter(|(_, target)| !target.is_aggregate)
                .map(|(index, _)| index)
                .collect();
            return Ok((Some(group_indexes), None));
        };

        let n_targets = targets.len();
        let names = named_indexes(targets);
        let mut group_indexes = Vec::new();

        for column in &group_by.columns {
            let index = match column {
                ByColumn::Index(reference) => {
                    let index = reference.checked_sub(1).map(usize::try_from);
                    match index {
                        Some(Ok(index)) if index < n_targets => index,
                        _ => {
                            return Err(Error::compilation(
                                format!("invalid GROUP-BY column index {reference}"),
                                None,
                            ));
                        }
                    }
                }
                ByColumn::Expr(expr) => {
                    let named = match &expr.kind {
                        ExprKind::Column(name) => names.get(name).copied(),
                        _ => None,
                    };
                    match named {
                        Some(index) => index,
                        None => {
                            let c_expr = self.compile_expr(expr)?;
                            if eval::is_aggregate(&c_expr) {
                                return Err(Error::compilation(
                                    "GROUP-BY expressions may not be aggregates",
                                    Some(expr.span),
                                ));
                            }
                            self.reconcile_target(c_expr, targets)
                        }
                    }
                }
            };

            let target = &targets[index];
            if target.is_aggregate {
                return Err(Error::compilation(
                    "GROUP-BY expressions may not reference aggregates",
                    None,
                ));
            }
            if !target.expr.dtype().is_hashable() {
                return Err(Error::compilation(
                    "GROUP-BY a non-hashable type is not supported",
                    None,
                ));
            }
            group_indexes.push(index);
        }

        let having_index = match &group_by.having {
            Some(having) => {
                let c_expr = self.compile_expr(having)?;
                if !eval::is_aggregate(&c_expr) {
                    return Err(Error::compilation(
                        "the HAVING clause must be an aggregate expression",
                        Some(having.span),
                    ));
                }
                let index = targets.len();
                targets.push(EvalTarget {
                    expr: c_expr,
                    name: None,
                    is_aggregate: true,
                });
                Some(index)
            }
            None => None,
        };

        Ok((Some(group_indexes), having_index))
    }

    /// Resolves the ORDER BY terms, appending invisible targets as
    /// needed.
    fn compile_order_by(
        &mut self,
        order_by: &[OrderBy],
        targets: &mut Vec<EvalTarget>,
    ) -> Result<Option<Vec<(usize, Ordering)>>> {
        if order_by.is_empty() {
            return Ok(None);
        }

        // Only targets in the SELECT list can be referenced by index;
        // these are exactly the named ones at this point.
        let n_targets = targets.iter().filter(|t| t.name.is_some()).count();
        let names = named_indexes(targets);
        let mut order_spec = Vec::new();

        for spec in order_by {
            let index = match &spec.column {
                ByColumn::Index(reference) => {
                    let index = reference.checked_sub(1).map(usize::try_from);
                    match index {
                        Some(Ok(index)) if index < n_targets => index,
                        _ => {
                            return Err(Error::compilation(
                                format!("invalid ORDER-BY column index {reference}"),
                                None,
                            ));
                        }
                    }
                }
                ByColumn::Expr(expr) => {
                    let named = match &expr.kind {
                        ExprKind::Column(name) => names.get(name).copied(),
                        _ => None,
                    };
                    match named {
                        Some(index) => index,
                        None => {
                            let c_expr = self.compile_expr(expr)?;
                            self.reconcile_target(c_expr, targets)
                        }
                    }
                }
            };
            order_spec.push((index, spec.ordering));
        }

        Ok(Some(order_spec))
    }

    /// Finds a target evaluating the same expression, or appends a new
    /// invisible target.
    fn reconcile_target(&self, c_expr: EvalNode, targets: &mut Vec<EvalTarget>) -> usize {
        if let Some(index) = targets.iter().position(|target| target.expr == c_expr) {
            return index;
        }
        let is_aggregate = eval::is_aggregate(&c_expr);
        targets.push(EvalTarget {
            expr: c_expr,
            name: None,
            is_aggregate,
        });
        targets.len() - 1
    }

    fn compile_pivot_by(
        &self,
        pivot_by: Option<&PivotBy>,
        query: &EvalQuery,
    ) -> Result<Option<(usize, usize)>> {
        let Some(pivot_by) = pivot_by else {
            return Ok(None);
        };

        let names = named_indexes(&query.targets);
        let mut indexes = [0usize; 2];

        for (slot, column) in indexes.iter_mut().zip(&pivot_by.columns) {
            *slot = match column {
                PivotColumn::Index(reference) => {
                    let index = reference.checked_sub(1).map(usize::try_from);
                    match index {
                        Some(Ok(index)) if index < query.targets.len() => index,
                        _ => {
                            return Err(Error::compilation(
                                format!("invalid PIVOT BY column index {reference}"),
                                None,
                            ));
                        }
                    }
                }
                PivotColumn::Name(name) => match names.get(name) {
                    Some(index) => *index,
                    None => {
                        return Err(Error::compilation(
                            format!("PIVOT BY column \"{name}\" is not in the targets list"),
                            None,
                        ));
                    }
                },
            };
        }

        if indexes[0] == indexes[1] {
            return Err(Error::compilation(
                "the two PIVOT BY columns cannot be the same column",
                None,
            ));
        }
        let grouped = query
            .group_indexes
            .as_ref()
            .is_some_and(|group| group.contains(&indexes[1]));
        if !grouped {
            return Err(Error::compilation(
                "the second PIVOT BY column must be a GROUP BY column",
                None,
            ));
        }

        Ok(Some((indexes[0], indexes[1])))
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<EvalNode> {
        match &expr.kind {
            ExprKind::Constant(literal) => {
                let value = literal_value(literal);
                let dtype = literal_dtype(literal);
                Ok(EvalNode::Constant { value, dtype })
            }

            ExprKind::Column(name) => match self.table.columns().get(name) {
                Some(column) => Ok(EvalNode::Column {
                    name: name.clone(),
                    column: column.clone(),
                }),
                None => Err(Error::compilation(
                    format!("column \"{name}\" does not exist"),
                    Some(expr.span),
                )),
            },

            ExprKind::Placeholder(placeholder) => {
                let value = match (placeholder, self.parameters) {
                    (Placeholder::Positional(index), Some(Params::Positional(values))) => {
                        values.get(*index).cloned()
                    }
                    (Placeholder::Named(name), Some(Params::Named(values))) => {
                        values.get(name).cloned()
                    }
                    _ => None,
                };
                match value {
                    Some(value) => Ok(EvalNode::Constant {
                        dtype: value.datatype(),
                        value,
                    }),
                    None => Err(Error::Parameter(String::from("query parameter missing"))),
                }
            }

            ExprKind::Asterisk => Ok(EvalNode::Constant {
                value: Value::Null,
                dtype: DataType::Asterisk,
            }),

            ExprKind::Function { name, operands } => {
                self.compile_function(expr, name, operands)
            }

            ExprKind::Attribute { operand, name } => {
                let c_operand = self.compile_expr(operand)?;
                let Some(layout) = self.context.struct_layout(c_operand.dtype()) else {
                    return Err(Error::compilation(
                        "column type is not structured",
                        Some(expr.span),
                    ));
                };
                let Some(field) = layout.field(name) else {
                    return Err(Error::compilation(
                        format!("structured type has no attribute \"{name}\""),
                        Some(expr.span),
                    ));
                };
                Ok(EvalNode::Getter {
                    operand: Box::new(c_operand),
                    field: field.clone(),
                })
            }

            ExprKind::Subscript { operand, key } => {
                let c_operand = self.compile_expr(operand)?;
                if c_operand.dtype() != DataType::Map {
                    return Err(Error::compilation(
                        "column type is not subscriptable",
                        Some(expr.span),
                    ));
                }
                Ok(EvalNode::GetItem {
                    operand: Box::new(c_operand),
                    key: key.clone(),
                })
            }

            ExprKind::Unary { op, operand } => {
                let c_operand = self.compile_expr(operand)?;
                let dtype = c_operand.dtype();
                let Some(def) = self.context.operators().lookup_unary(*op, dtype) else {
                    return Err(Error::compilation(
                        format!("operator \"{}({})\" not supported", unary_op_name(*op), dtype),
                        Some(expr.span),
                    ));
                };
                let folded = matches!(c_operand, EvalNode::Constant { .. });
                let node = EvalNode::Unary(UnaryEval {
                    call: def.call,
                    operand: Box::new(c_operand),
                    dtype: def.out,
                    nullsafe: def.nullsafe,
                });
                if folded {
                    return Ok(fold_constant(node));
                }
                Ok(node)
            }

            ExprKind::Binary { op, left, right } => match op {
                BinaryOp::In | BinaryOp::NotIn => self.compile_membership(expr, *op, left, right),
                _ => self.compile_binary(expr, *op, left, right),
            },

            ExprKind::Between {
                operand,
                lower,
                upper,
            } => {
                let c_operand = self.compile_expr(operand)?;
                let c_lower = self.compile_expr(lower)?;
                let c_upper = self.compile_expr(upper)?;
                let types = [c_operand.dtype(), c_lower.dtype(), c_upper.dtype()];
                if !crate::operators::between_comparable(&types) {
                    return Err(Error::compilation(
                        format!(
                            "operator \"{} BETWEEN {} AND {}\" not supported",
                            types[0], types[1], types[2]
                        ),
                        Some(expr.span),
                    ));
                }
                Ok(EvalNode::Between {
                    operand: Box::new(c_operand),
                    lower: Box::new(c_lower),
                    upper: Box::new(c_upper),
                })
            }

            ExprKind::And(args) => {
                let args: Vec<EvalNode> = args
                    .iter()
                    .map(|arg| self.compile_expr(arg))
                    .collect::<Result<_>>()?;
                Ok(EvalNode::And(args))
            }

            ExprKind::Or(args) => {
                let args: Vec<EvalNode> = args
                    .iter()
                    .map(|arg| self.compile_expr(arg))
                    .collect::<Result<_>>()?;
                Ok(EvalNode::Or(args))
            }

            ExprKind::Quantified {
                op,
                quantifier,
                left,
                right,
            } => {
                let c_left = self.compile_expr(left)?;
                let (values, elem_dtype) = self.compile_subquery_values(right)?;
                let Some(def) = self
                    .context
                    .operators()
                    .lookup_binary(*op, [c_left.dtype(), elem_dtype])
                else {
                    return Err(Error::compilation(
                        format!(
                            "operator \"{}({}, {})\" not supported",
                            binary_op_name(*op),
                            c_left.dtype(),
                            elem_dtype
                        ),
                        Some(expr.span),
                    ));
                };
                Ok(EvalNode::Quantified {
                    call: def.call,
                    all: *quantifier == Quantifier::All,
                    left: Box::new(c_left),
                    values,
                })
            }

            ExprKind::Subselect(_) => Err(Error::compilation(
                "subquery is not allowed in this context",
                Some(expr.span),
            )),
        }
    }

    fn compile_function(
        &mut self,
        expr: &Expr,
        name: &str,
        operands: &[Expr],
    ) -> Result<EvalNode> {
        // ``coalesce()`` does not fit the overload model: it accepts any
        // number of arguments of one common type.
        if name == "coalesce" {
            let args: Vec<EvalNode> = operands
                .iter()
                .map(|operand| self.compile_expr(operand))
                .collect::<Result<_>>()?;
            let Some(first) = args.first() else {
                return Err(Error::compilation(
                    "coalesce() requires at least one argument",
                    Some(expr.span),
                ));
            };
            if args.iter().any(|arg| arg.dtype() != first.dtype()) {
                let types: Vec<&str> = args.iter().map(|arg| arg.dtype().name()).collect();
                return Err(Error::compilation(
                    format!(
                        "coalesce() function arguments must have uniform type, found: {}",
                        types.join(", ")
                    ),
                    Some(expr.span),
                ));
            }
            return Ok(EvalNode::Coalesce(args));
        }

        // Metadata access shorthands rewrite to getitem() before overload
        // resolution.
        if matches!(name, "meta" | "entry_meta" | "any_meta") && operands.len() == 1 {
            let key = operands[0].clone();
            let column = |name: &str| Expr::new(ExprKind::Column(name.to_owned()), expr.span);
            let attribute = |operand: Expr, name: &str| {
                Expr::new(
                    ExprKind::Attribute {
                        operand: Box::new(operand),
                        name: name.to_owned(),
                    },
                    expr.span,
                )
            };
            let getitem = |operands: Vec<Expr>| {
                Expr::new(
                    ExprKind::Function {
                        name: String::from("getitem"),
                        operands,
                    },
                    expr.span,
                )
            };
            match name {
                "meta" => {
                    return self.compile_expr(&getitem(vec![column("meta"), key]));
                }
                "entry_meta" => {
                    return self
                        .compile_expr(&getitem(vec![attribute(column("entry"), "meta"), key]));
                }
                "any_meta" => {
                    let fallback = getitem(vec![attribute(column("entry"), "meta"), key.clone()]);
                    return self
                        .compile_expr(&getitem(vec![column("meta"), key, fallback]));
                }
                _ => {}
            }
        }

        let args: Vec<EvalNode> = operands
            .iter()
            .map(|operand| self.compile_expr(operand))
            .collect::<Result<_>>()?;
        let dtypes: Vec<DataType> = args.iter().map(EvalNode::dtype).collect();

        match self.context.functions().lookup(name, &dtypes) {
            Some(FuncEntry::Scalar(def)) => {
                let folded = def.pure && args.iter().all(|arg| matches!(arg, EvalNode::Constant { .. }));
                let node = EvalNode::Function(FunctionEval {
                    name: def.name,
                    call: def.call,
                    dtype: def.out.resolve(&dtypes),
                    nullsafe: def.nullsafe,
                    operands: args,
                });
                if folded {
                    return Ok(fold_constant(node));
                }
                Ok(node)
            }
            Some(FuncEntry::Aggregate(def)) => Ok(EvalNode::Aggregate(AggregateEval {
                kind: def.kind,
                dtype: def.out.resolve(&dtypes),
                operands: args,
                handle: 0,
            })),
            None => Err(Error::compilation(
                format!(
                    "no function matches \"{}\" name and argument types",
                    crate::types::signature_name(name, &dtypes)
                ),
                Some(expr.span),
            )),
        }
    }

    /// Compiles a binary operator, with type inference for untyped
    /// operands and promotion of integers mixed with decimals.
    fn compile_binary(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<EvalNode> {
        let mut c_left = self.compile_expr(left)?;
        let mut c_right = self.compile_expr(right)?;

        loop {
            let types = [c_left.dtype(), c_right.dtype()];
            if let Some(def) = self.context.operators().lookup_binary(op, types) {
                let folded = matches!(c_left, EvalNode::Constant { .. })
                    && matches!(c_right, EvalNode::Constant { .. });
                let node = EvalNode::Binary(BinaryEval {
                    call: def.call,
                    left: Box::new(c_left),
                    right: Box::new(c_right),
                    dtype: def.out,
                    nullsafe: def.nullsafe,
                });
                if folded {
                    return Ok(fold_constant(node));
                }
                return Ok(node);
            }

            // Untyped operands are promoted to the other side's type,
            // with integer promoted to decimal since sources never carry
            // raw untyped integers. Integers mixed with decimals promote
            // likewise when no exact overload exists.
            let [lt, rt] = types;
            if lt == DataType::Object && rt != DataType::Object {
                match self.cast_operand(c_left.clone(), promotion_target(rt)) {
                    Some(cast) => {
                        c_left = cast;
                        continue;
                    }
                    None => break,
                }
            }
            if rt == DataType::Object && lt != DataType::Object {
                match self.cast_operand(c_right.clone(), promotion_target(lt)) {
                    Some(cast) => {
                        c_right = cast;
                        continue;
                    }
                    None => break,
                }
            }
            if lt == DataType::Int && rt == DataType::Decimal {
                match self.cast_operand(c_left.clone(), DataType::Decimal) {
                    Some(cast) => {
                        c_left = cast;
                        continue;
                    }
                    None => break,
                }
            }
            if rt == DataType::Int && lt == DataType::Decimal {
                match self.cast_operand(c_right.clone(), DataType::Decimal) {
                    Some(cast) => {
                        c_right = cast;
                        continue;
                    }
                    None => break,
                }
            }
            break;
        }

        Err(Error::compilation(
            format!(
                "operator \"{}({}, {})\" not supported",
                binary_op_name(op),
                c_left.dtype(),
                c_right.dtype()
            ),
            Some(expr.span),
        ))
    }

    /// Wraps an operand in the cast function converting to the target
    /// type, if one is registered.
    fn cast_operand(&self, operand: EvalNode, target: DataType) -> Option<EvalNode> {
        let name = target.cast_function()?;
        let dtypes = [operand.dtype()];
        match self.context.functions().lookup(name, &dtypes) {
            Some(FuncEntry::Scalar(def)) => Some(EvalNode::Function(FunctionEval {
                name: def.name,
                call: def.call,
                dtype: def.out.resolve(&dtypes),
                nullsafe: def.nullsafe,
                operands: vec![operand],
            })),
            _ => None,
        }
    }

    fn compile_membership(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<EvalNode> {
        let c_left = self.compile_expr(left)?;
        let c_right = match &right.kind {
            ExprKind::Subselect(select) => {
                // The subquery is materialized into a constant set at
                // compilation time.
                let (values, _) = self.compile_subquery_values(select)?;
                EvalNode::Constant {
                    value: Value::Set(values.into_iter().collect()),
                    dtype: DataType::Set,
                }
            }
            _ => self.compile_expr(right)?,
        };

        let types = [c_left.dtype(), c_right.dtype()];
        let Some(def) = self.context.operators().lookup_binary(op, types) else {
            return Err(Error::compilation(
                format!(
                    "operator \"{}({}, {})\" not supported",
                    binary_op_name(op),
                    types[0],
                    types[1]
                ),
                Some(expr.span),
            ));
        };
        Ok(EvalNode::Binary(BinaryEval {
            call: def.call,
            left: Box::new(c_left),
            right: Box::new(c_right),
            dtype: def.out,
            nullsafe: def.nullsafe,
        }))
    }

    /// Compiles and executes a single-column subquery, returning its
    /// values and their type.
    fn compile_subquery_values(&mut self, select: &Select) -> Result<(Vec<Value>, DataType)> {
        let (query, pivots) = self.compile_select(select)?;
        if pivots.is_some() {
            return Err(Error::compilation(
                "subquery cannot have a PIVOT BY clause",
                None,
            ));
        }
        let named: Vec<&EvalTarget> = query
            .targets
            .iter()
            .filter(|target| target.name.is_some())
            .collect();
        if named.len() != 1 {
            return Err(Error::compilation("subquery has too many columns", None));
        }
        let dtype = named[0].expr.dtype();
        let (_, rows) = execute::execute_select(&query);
        let values = rows
            .into_iter()
            .filter_map(|mut row| (!row.is_empty()).then(|| row.remove(0)))
            .collect();
        Ok((values, dtype))
    }
}

/// Evaluates a constant-operand node into a constant of the same type.
fn fold_constant(node: EvalNode) -> EvalNode {
    let row: Row = Arc::new(());
    let ctx = ExecContext {
        row: &row,
        store: None,
    };
    EvalNode::Constant {
        value: node.eval(&ctx),
        dtype: node.dtype(),
    }
}

/// Maps visible target names to their indexes; later duplicates win.
fn named_indexes(targets: &[EvalTarget]) -> HashMap<String, usize> {
    let mut names = HashMap::new();
    for (index, target) in targets.iter().enumerate() {
        if let Some(name) = &target.name {
            names.insert(name.clone(), index);
        }
    }
    names
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Integer(i) => Value::Int(*i),
        Literal::Decimal(d) => Value::Decimal(*d),
        Literal::Date(d) => Value::Date(*d),
        Literal::String(s) => Value::Str(s.clone()),
        Literal::List(items) => Value::List(items.iter().map(literal_value).collect()),
    }
}

fn literal_dtype(literal: &Literal) -> DataType {
    match literal {
        Literal::Null => DataType::Object,
        Literal::Boolean(_) => DataType::Bool,
        Literal::Integer(_) => DataType::Int,
        Literal::Decimal(_) => DataType::Decimal,
        Literal::Date(_) => DataType::Date,
        Literal::String(_) => DataType::Str,
        Literal::List(_) => DataType::List,
    }
}

fn promotion_target(dtype: DataType) -> DataType {
    if dtype == DataType::Int {
        DataType::Decimal
    } else {
        dtype
    }
}

const fn unary_op_name(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "neg",
        UnaryOp::Not => "not",
        UnaryOp::IsNull => "isnull",
        UnaryOp::IsNotNull => "isnotnull",
    }
}

const fn binary_op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Mod => "mod",
        BinaryOp::Eq => "equal",
        BinaryOp::NotEq => "notequal",
        BinaryOp::Lt => "less",
        BinaryOp::LtEq => "lesseq",
        BinaryOp::Gt => "greater",
        BinaryOp::GtEq => "greatereq",
        BinaryOp::Match => "match",
        BinaryOp::NotMatch => "notmatch",
        BinaryOp::Matches => "matches",
        BinaryOp::In => "in",
        BinaryOp::NotIn => "notin",
    }
}

/// Translates a BALANCES statement into an equivalent SELECT by
/// formatting and re-parsing the statement text, so that the synthesized
/// targets get proper display names.
fn transform_balances(balances: &Balances) -> Result<(Select, String)> {
    let summary = balances.summary_func.as_deref().unwrap_or_default();
    let text = format!(
        "SELECT account, SUM({summary}(position)) \
         GROUP BY account, ACCOUNT_SORTKEY(account) \
         ORDER BY ACCOUNT_SORTKEY(account)"
    );
    let Statement::Select(mut select) = parse(&text)? else {
        return Err(Error::compilation("invalid BALANCES rewrite", None));
    };
    select.from_clause = balances.from_clause.clone().map(FromClause::Window);
    select.where_clause.clone_from(&balances.where_clause);
    Ok((select, text))
}

/// Translates a JOURNAL statement into an equivalent SELECT over the
/// posting journal columns.
fn transform_journal(journal: &Journal) -> Result<(Select, String)> {
    let summary = journal.summary_func.as_deref().unwrap_or_default();
    let mut text = format!(
        "SELECT date, flag, MAXWIDTH(payee, 48), MAXWIDTH(narration, 80), account, \
         {summary}(position), {summary}(balance)"
    );
    if let Some(account) = &journal.account {
        text.push_str(&format!(" WHERE account ~ \"{account}\""));
    }
    let Statement::Select(mut select) = parse(&text)? else {
        return Err(Error::compilation("invalid JOURNAL rewrite", None));
    };
    select.from_clause = journal.from_clause.clone().map(FromClause::Window);
    Ok((select, text))
}
