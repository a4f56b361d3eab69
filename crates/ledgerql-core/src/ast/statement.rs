//! Statement AST types.

use chrono::NaiveDate;

use crate::lexer::Span;

use super::Expr;

/// A parsed BQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// A SELECT query.
    Select(Select),
    /// A BALANCES shorthand query.
    Balances(Balances),
    /// A JOURNAL shorthand query.
    Journal(Journal),
    /// A PRINT statement.
    Print(Print),
}

impl Statement {
    /// Walks every expression in the statement, depth-first.
    pub fn walk_exprs(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            Self::Select(select) => select.walk_exprs(f),
            Self::Balances(balances) => {
                if let Some(from) = &balances.from_clause {
                    from.walk_exprs(f);
                }
                if let Some(expr) = &balances.where_clause {
                    expr.walk(f);
                }
            }
            Self::Journal(journal) => {
                if let Some(from) = &journal.from_clause {
                    from.walk_exprs(f);
                }
            }
            Self::Print(print) => {
                if let Some(from) = &print.from_clause {
                    from.walk_exprs(f);
                }
            }
        }
    }
}

/// A SELECT query.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Whether DISTINCT was specified.
    pub distinct: bool,
    /// The target list, or the `*` wildcard.
    pub targets: Targets,
    /// FROM clause, or None if absent.
    pub from_clause: Option<FromClause>,
    /// WHERE expression, or None if absent.
    pub where_clause: Option<Expr>,
    /// GROUP BY clause, or None if absent.
    pub group_by: Option<GroupBy>,
    /// ORDER BY terms; empty if absent.
    pub order_by: Vec<OrderBy>,
    /// PIVOT BY clause, or None if absent.
    pub pivot_by: Option<PivotBy>,
    /// LIMIT row count, or None if absent.
    pub limit: Option<u64>,
}

impl Select {
    /// Walks every expression in the query, depth-first.
    pub fn walk_exprs(&self, f: &mut impl FnMut(&Expr)) {
        if let Targets::List(targets) = &self.targets {
            for target in targets {
                target.expression.walk(f);
            }
        }
        match &self.from_clause {
            Some(FromClause::Subselect(select)) => select.walk_exprs(f),
            Some(FromClause::Window(from)) => from.walk_exprs(f),
            Some(FromClause::Table { .. }) | None => {}
        }
        if let Some(expr) = &self.where_clause {
            expr.walk(f);
        }
        if let Some(group_by) = &self.group_by {
            for column in &group_by.columns {
                if let ByColumn::Expr(expr) = column {
                    expr.walk(f);
                }
            }
            if let Some(having) = &group_by.having {
                having.walk(f);
            }
        }
        for order in &self.order_by {
            if let ByColumn::Expr(expr) = &order.column {
                expr.walk(f);
            }
        }
    }
}

/// The SELECT target list.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// `SELECT *`
    Wildcard,
    /// An explicit list of targets.
    List(Vec<Target>),
}

/// A SELECT target.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// The expression to select.
    pub expression: Expr,
    /// The name given by `AS <name>`, or None.
    pub name: Option<String>,
}

/// The FROM clause of a SELECT.
#[derive(Debug, Clone)]
pub enum FromClause {
    /// A table reference (`#name`).
    Table {
        /// The table name; empty selects the default table.
        name: String,
        /// Source span of the reference.
        span: Span,
    },
    /// A parenthesized subselect.
    Subselect(Box<Select>),
    /// An entry filtering expression with an optional date window.
    Window(From),
}

impl PartialEq for FromClause {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Table { name: a, .. }, Self::Table { name: b, .. }) => a == b,
            (Self::Subselect(a), Self::Subselect(b)) => a == b,
            (Self::Window(a), Self::Window(b)) => a == b,
            _ => false,
        }
    }
}

impl FromClause {
    fn walk_exprs(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            Self::Subselect(select) => select.walk_exprs(f),
            Self::Window(from) => from.walk_exprs(f),
            Self::Table { .. } => {}
        }
    }
}

/// A FROM filtering expression with OPEN/CLOSE/CLEAR modifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct From {
    /// The filtering expression, or None.
    pub expression: Option<Expr>,
    /// `OPEN ON <date>`, or None if absent.
    pub open: Option<NaiveDate>,
    /// `CLOSE [ON <date>]`, or None if absent.
    pub close: Option<CloseSpec>,
    /// Whether CLEAR was specified.
    pub clear: bool,
}

impl From {
    fn walk_exprs(&self, f: &mut impl FnMut(&Expr)) {
        if let Some(expr) = &self.expression {
            expr.walk(f);
        }
    }
}

/// The CLOSE clause of a FROM date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseSpec {
    /// `CLOSE ON <date>`
    On(NaiveDate),
    /// `CLOSE` with no date: close at the last entry.
    Last,
}

/// A GROUP BY clause.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    /// The grouping columns.
    pub columns: Vec<ByColumn>,
    /// The HAVING expression, or None.
    pub having: Option<Expr>,
}

/// A GROUP BY or ORDER BY column reference.
#[derive(Debug, Clone, PartialEq)]
pub enum ByColumn {
    /// A 1-based reference to a target by index.
    Index(u64),
    /// An expression, possibly a simple column reference by name.
    Expr(Expr),
}

/// An ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// The ordering column.
    pub column: ByColumn,
    /// The sort direction.
    pub ordering: Ordering,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ordering {
    /// Ascending (the default).
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// A PIVOT BY clause, naming exactly two columns.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotBy {
    /// The two pivot columns.
    pub columns: [PivotColumn; 2],
}

/// A PIVOT BY column reference.
#[derive(Debug, Clone, PartialEq)]
pub enum PivotColumn {
    /// A 1-based reference to a target by index.
    Index(u64),
    /// A reference to a target by name.
    Name(String),
}

/// A BALANCES shorthand query.
///
/// Equivalent to `SELECT account, SUM(position) GROUP BY account`.
#[derive(Debug, Clone, PartialEq)]
pub struct Balances {
    /// Summary function applied to the position column (`AT <name>`).
    pub summary_func: Option<String>,
    /// FROM date window, or None.
    pub from_clause: Option<From>,
    /// WHERE expression, or None.
    pub where_clause: Option<Expr>,
}

/// A JOURNAL shorthand query.
///
/// Equivalent to a SELECT of the posting journal columns, optionally
/// restricted to accounts matching a pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Journal {
    /// Account regular expression to restrict to, or None.
    pub account: Option<String>,
    /// Summary function applied to position and balance (`AT <name>`).
    pub summary_func: Option<String>,
    /// FROM date window, or None.
    pub from_clause: Option<From>,
}

/// A PRINT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Print {
    /// FROM date window, or None.
    pub from_clause: Option<From>,
}
