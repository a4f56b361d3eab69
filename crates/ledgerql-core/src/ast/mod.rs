//! Abstract syntax tree for BQL statements.

mod expression;
mod statement;

pub use expression::{BinaryOp, Expr, ExprKind, Literal, Placeholder, Quantifier, UnaryOp};
pub use statement::{
    Balances, ByColumn, CloseSpec, From, FromClause, GroupBy, Journal, OrderBy, Ordering,
    PivotBy, PivotColumn, Print, Select, Statement, Target, Targets,
};
