//! Expression AST types.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::lexer::Span;

use super::Select;

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// NULL literal.
    Null,
    /// Boolean literal.
    Boolean(bool),
    /// Integer literal.
    Integer(i64),
    /// Decimal literal.
    Decimal(Decimal),
    /// Date literal.
    Date(NaiveDate),
    /// String literal.
    String(String),
    /// List literal, a parenthesized tuple of literals.
    List(Vec<Literal>),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Negation (-)
    Neg,
    /// Logical NOT
    Not,
    /// IS NULL
    IsNull,
    /// IS NOT NULL
    IsNotNull,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    // Regular expression match
    Match,
    NotMatch,
    Matches,

    // Membership
    In,
    NotIn,
}

impl BinaryOp {
    /// Returns the BQL representation of the operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Match => "~",
            Self::NotMatch => "!~",
            Self::Matches => "?~",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        }
    }
}

/// Quantifier for quantified comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// `op ANY(subselect)`
    Any,
    /// `op ALL(subselect)`
    All,
}

/// A parameter placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// `%s`, numbered left-to-right in source order.
    Positional(usize),
    /// `%(name)s`
    Named(String),
}

/// A BQL expression with its source span.
///
/// Equality ignores the span, so that re-parsing the source text of a node
/// produces an equal expression.
#[derive(Debug, Clone)]
pub struct Expr {
    /// The expression node.
    pub kind: ExprKind,
    /// Source span of the whole expression.
    pub span: Span,
}

impl Expr {
    /// Creates a new expression.
    #[must_use]
    pub const fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Returns the source text of this expression.
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source[self.span.start..self.span.end].trim()
    }

    /// Walks this expression tree depth-first, visiting every node.
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Constant(_)
            | ExprKind::Column(_)
            | ExprKind::Placeholder(_)
            | ExprKind::Asterisk => {}
            ExprKind::Function { operands, .. } => {
                for operand in operands {
                    operand.walk(f);
                }
            }
            ExprKind::Attribute { operand, .. } | ExprKind::Subscript { operand, .. } => {
                operand.walk(f);
            }
            ExprKind::Unary { operand, .. } => operand.walk(f),
            ExprKind::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            ExprKind::Between {
                operand,
                lower,
                upper,
            } => {
                operand.walk(f);
                lower.walk(f);
                upper.walk(f);
            }
            ExprKind::And(args) | ExprKind::Or(args) => {
                for arg in args {
                    arg.walk(f);
                }
            }
            ExprKind::Quantified { left, right, .. } => {
                left.walk(f);
                right.walk_exprs(f);
            }
            ExprKind::Subselect(select) => select.walk_exprs(f),
        }
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

/// The different kinds of expression nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A constant value.
    Constant(Literal),

    /// A reference to a column.
    Column(String),

    /// A function call.
    Function {
        /// The function name, lowercased.
        name: String,
        /// The arguments, possibly empty.
        operands: Vec<Expr>,
    },

    /// A parameter placeholder.
    Placeholder(Placeholder),

    /// Attribute access on a structured value (`x.field`).
    Attribute {
        /// The structured operand.
        operand: Box<Expr>,
        /// The field name.
        name: String,
    },

    /// Subscript access on a mapping (`x["key"]`).
    Subscript {
        /// The mapping operand.
        operand: Box<Expr>,
        /// The subscript key.
        key: String,
    },

    /// The `*` argument of `COUNT(*)`.
    Asterisk,

    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },

    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },

    /// A range check (`x BETWEEN a AND b`).
    Between {
        /// The checked operand.
        operand: Box<Expr>,
        /// Lower bound (inclusive).
        lower: Box<Expr>,
        /// Upper bound (inclusive).
        upper: Box<Expr>,
    },

    /// Conjunction; arguments are collected flat.
    And(Vec<Expr>),

    /// Disjunction; arguments are collected flat.
    Or(Vec<Expr>),

    /// A quantified comparison (`x op ANY(subselect)`).
    Quantified {
        /// Comparison operator.
        op: BinaryOp,
        /// ANY or ALL.
        quantifier: Quantifier,
        /// Left operand.
        left: Box<Expr>,
        /// The subselect providing the comparison values.
        right: Box<Select>,
    },

    /// A subselect in expression position (right-hand side of `IN`).
    Subselect(Box<Select>),
}
