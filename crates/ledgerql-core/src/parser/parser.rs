//! BQL parser implementation.
//!
//! A hand-written recursive descent parser with Pratt-style binding powers
//! for the expression grammar. Keywords that are only meaningful in
//! context (`OPEN`, `CLOSE`, `CLEAR`, `ON`, `AT`, `ANY`, `ALL`) are lexed
//! as identifiers and matched by text where the grammar expects them.

use super::error::ParseError;
use super::pratt::{
    infix_binding_power, is_quantifiable_op, token_to_binary_op, OpClass, NOT_BP, POSTFIX_BP,
    SUM_BP,
};
use crate::ast::{
    self, Balances, BinaryOp, ByColumn, CloseSpec, Expr, ExprKind, FromClause, GroupBy, Journal,
    Literal, OrderBy, Ordering, PivotBy, PivotColumn, Placeholder, Print, Quantifier, Select,
    Statement, Target, Targets, UnaryOp,
};
use crate::lexer::{Keyword, Lexer, Span, Token, TokenKind};

/// BQL parser.
pub struct Parser<'a> {
    /// The input, kept to resolve spans back to text.
    #[allow(dead_code)]
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    /// Counter assigning source-order indexes to `%s` placeholders.
    param_counter: usize,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given input.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            tokens: Lexer::new(text).tokenize(),
            pos: 0,
            param_counter: 0,
        }
    }

    /// Parses a single BQL statement, including the optional trailing
    /// semicolon.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the input is not a valid BQL statement.
    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let statement = match self.current().as_keyword() {
            Some(Keyword::Select) => Statement::Select(self.parse_select()?),
            Some(Keyword::Balances) => Statement::Balances(self.parse_balances()?),
            Some(Keyword::Journal) => Statement::Journal(self.parse_journal()?),
            Some(Keyword::Print) => Statement::Print(self.parse_print()?),
            _ => return Err(self.error()),
        };
        if self.check(&TokenKind::Semicolon) {
            self.advance();
        }
        if !self.current().is_eof() {
            return Err(self.error());
        }
        Ok(statement)
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek(&self, n: usize) -> &Token {
        let index = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// The span of the most recently consumed token.
    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn error(&self) -> ParseError {
        ParseError::new(self.current().span)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.current().as_keyword() == Some(keyword)
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        Err(self.error())
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            return Ok(());
        }
        Err(self.error())
    }

    fn check_word(&self, word: &str) -> bool {
        self.current().is_word(word)
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.check_word(word) {
            self.advance();
            return true;
        }
        false
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error()),
        }
    }

    fn expect_string(&mut self) -> Result<String, ParseError> {
        match &self.current().kind {
            TokenKind::String(value) => {
                let value = value.clone();
                self.advance();
                Ok(value)
            }
            _ => Err(self.error()),
        }
    }

    fn expect_date(&mut self) -> Result<chrono::NaiveDate, ParseError> {
        match &self.current().kind {
            TokenKind::Date(date) => {
                let date = *date;
                self.advance();
                Ok(date)
            }
            _ => Err(self.error()),
        }
    }

    fn expect_integer(&mut self) -> Result<i64, ParseError> {
        match &self.current().kind {
            TokenKind::Integer(value) => {
                let value = *value;
                self.advance();
                Ok(value)
            }
            _ => Err(self.error()),
        }
    }

    /// Parses a SELECT statement; the SELECT keyword is current.
    fn parse_select(&mut self) -> Result<Select, ParseError> {
        self.expect_keyword(Keyword::Select)?;
        let distinct = self.eat_keyword(Keyword::Distinct);

        let targets = if self.check(&TokenKind::Star) {
            self.advance();
            Targets::Wildcard
        } else {
            let mut list = vec![self.parse_target()?];
            while self.check(&TokenKind::Comma) {
                self.advance();
                list.push(self.parse_target()?);
            }
            Targets::List(list)
        };

        let from_clause = if self.eat_keyword(Keyword::From) {
            Some(self.parse_from_clause()?)
        } else {
            None
        };

        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_expression(0)?)
        } else {
            None
        };

        let group_by = if self.eat_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            Some(self.parse_group_by()?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.eat_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            loop {
                let column = self.parse_by_column()?;
                let ordering = if self.eat_keyword(Keyword::Desc) {
                    Ordering::Desc
                } else {
                    self.eat_keyword(Keyword::Asc);
                    Ordering::Asc
                };
                order_by.push(OrderBy { column, ordering });
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }

        let pivot_by = if self.eat_keyword(Keyword::Pivot) {
            self.expect_keyword(Keyword::By)?;
            let first = self.parse_pivot_column()?;
            self.expect(&TokenKind::Comma)?;
            let second = self.parse_pivot_column()?;
            Some(PivotBy {
                columns: [first, second],
            })
        } else {
            None
        };

        let limit = if self.eat_keyword(Keyword::Limit) {
            let span = self.current().span;
            let value = self.expect_integer()?;
            Some(u64::try_from(value).map_err(|_| ParseError::new(span))?)
        } else {
            None
        };

        Ok(Select {
            distinct,
            targets,
            from_clause,
            where_clause,
            group_by,
            order_by,
            pivot_by,
            limit,
        })
    }

    fn parse_target(&mut self) -> Result<Target, ParseError> {
        let expression = self.parse_expression(0)?;
        let name = if self.eat_keyword(Keyword::As) {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        Ok(Target { expression, name })
    }

    fn parse_from_clause(&mut self) -> Result<FromClause, ParseError> {
        if let TokenKind::TableRef(name) = &self.current().kind {
            let name = name.clone();
            let span = self.current().span;
            self.advance();
            return Ok(FromClause::Table { name, span });
        }
        if self.check(&TokenKind::LeftParen) && self.peek(1).as_keyword() == Some(Keyword::Select)
        {
            self.advance();
            let select = self.parse_select()?;
            self.expect(&TokenKind::RightParen)?;
            return Ok(FromClause::Subselect(Box::new(select)));
        }
        Ok(FromClause::Window(self.parse_from_window()?))
    }

    /// Parses a FROM filtering expression with its optional OPEN/CLOSE/CLEAR
    /// modifiers.
    fn parse_from_window(&mut self) -> Result<ast::From, ParseError> {
        let expression = if self.at_window_modifier() {
            None
        } else {
            Some(self.parse_expression(0)?)
        };

        let mut open = None;
        let mut close = None;
        let mut clear = false;

        if self.check_word("open") {
            self.advance();
            if !self.eat_word("on") {
                return Err(self.error());
            }
            open = Some(self.expect_date()?);
        }
        if self.check_word("close") {
            self.advance();
            if self.eat_word("on") {
                close = Some(CloseSpec::On(self.expect_date()?));
            } else {
                close = Some(CloseSpec::Last);
            }
        }
        if self.check_word("clear") {
            self.advance();
            clear = true;
        }

        if expression.is_none() && open.is_none() && close.is_none() && !clear {
            return Err(self.error());
        }
        Ok(ast::From {
            expression,
            open,
            close,
            clear,
        })
    }

    /// Returns true if the current token starts a date-window modifier
    /// rather than a filtering expression.
    fn at_window_modifier(&self) -> bool {
        if self.check_word("open") {
            return self.peek(1).is_word("on");
        }
        if self.check_word("close") {
            return self.peek(1).is_word("on")
                || self.peek(1).is_word("clear")
                || self.at_clause_boundary(1);
        }
        if self.check_word("clear") {
            return self.at_clause_boundary(1);
        }
        false
    }

    /// Returns true if the token `n` ahead terminates the enclosing clause.
    fn at_clause_boundary(&self, n: usize) -> bool {
        matches!(
            self.peek(n).kind,
            TokenKind::Keyword(
                Keyword::Where
                    | Keyword::Group
                    | Keyword::Having
                    | Keyword::Order
                    | Keyword::Pivot
                    | Keyword::Limit
                    | Keyword::Asc
                    | Keyword::Desc
            ) | TokenKind::Comma
                | TokenKind::Semicolon
                | TokenKind::RightParen
                | TokenKind::Eof
        )
    }

    fn parse_group_by(&mut self) -> Result<GroupBy, ParseError> {
        let mut columns = vec![self.parse_by_column()?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            columns.push(self.parse_by_column()?);
        }
        let having = if self.eat_keyword(Keyword::Having) {
            Some(self.parse_expression(0)?)
        } else {
            None
        };
        Ok(GroupBy { columns, having })
    }

    /// Parses a GROUP BY or ORDER BY column: a 1-based target index or an
    /// expression.
    fn parse_by_column(&mut self) -> Result<ByColumn, ParseError> {
        if let TokenKind::Integer(value) = self.current().kind {
            if self.at_clause_boundary(1) {
                let span = self.current().span;
                self.advance();
                let index = u64::try_from(value).map_err(|_| ParseError::new(span))?;
                return Ok(ByColumn::Index(index));
            }
        }
        Ok(ByColumn::Expr(self.parse_expression(0)?))
    }

    fn parse_pivot_column(&mut self) -> Result<PivotColumn, ParseError> {
        match &self.current().kind {
            TokenKind::Integer(value) => {
                let span = self.current().span;
                let index = u64::try_from(*value).map_err(|_| ParseError::new(span))?;
                self.advance();
                Ok(PivotColumn::Index(index))
            }
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(PivotColumn::Name(name))
            }
            _ => Err(self.error()),
        }
    }

    fn parse_balances(&mut self) -> Result<Balances, ParseError> {
        self.expect_keyword(Keyword::Balances)?;
        let summary_func = if self.eat_word("at") {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let from_clause = if self.eat_keyword(Keyword::From) {
            Some(self.parse_from_window()?)
        } else {
            None
        };
        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_expression(0)?)
        } else {
            None
        };
        Ok(Balances {
            summary_func,
            from_clause,
            where_clause,
        })
    }

    fn parse_journal(&mut self) -> Result<Journal, ParseError> {
        self.expect_keyword(Keyword::Journal)?;
        let account = if matches!(self.current().kind, TokenKind::String(_)) {
            Some(self.expect_string()?)
        } else {
            None
        };
        let summary_func = if self.eat_word("at") {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let from_clause = if self.eat_keyword(Keyword::From) {
            Some(self.parse_from_window()?)
        } else {
            None
        };
        Ok(Journal {
            account,
            summary_func,
            from_clause,
        })
    }

    fn parse_print(&mut self) -> Result<Print, ParseError> {
        self.expect_keyword(Keyword::Print)?;
        let from_clause = if self.eat_keyword(Keyword::From) {
            Some(self.parse_from_window()?)
        } else {
            None
        };
        Ok(Print { from_clause })
    }

    /// Parses an expression with the given minimum binding power.
    fn parse_expression(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_prefix()?;
        // Comparison operators are non-associative: chaining two of them
        // at the same level is a syntax error.
        let mut comparison_seen = false;

        loop {
            // Postfix attribute and subscript access.
            if POSTFIX_BP >= min_bp {
                if self.check(&TokenKind::Dot) {
                    self.advance();
                    let name = self.expect_identifier()?;
                    let span = lhs.span.merge(self.prev_span());
                    lhs = Expr::new(
                        ExprKind::Attribute {
                            operand: Box::new(lhs),
                            name,
                        },
                        span,
                    );
                    continue;
                }
                if self.check(&TokenKind::LeftBracket) {
                    self.advance();
                    let key = self.expect_string()?;
                    self.expect(&TokenKind::RightBracket)?;
                    let span = lhs.span.merge(self.prev_span());
                    lhs = Expr::new(
                        ExprKind::Subscript {
                            operand: Box::new(lhs),
                            key,
                        },
                        span,
                    );
                    continue;
                }
            }

            let Some((lbp, rbp, class)) = infix_binding_power(&self.current().kind) else {
                break;
            };
            if lbp < min_bp {
                break;
            }
            // NOT continues an expression only as part of NOT IN.
            if self.check_keyword(Keyword::Not) && self.peek(1).as_keyword() != Some(Keyword::In)
            {
                break;
            }
            if class == OpClass::Comparison {
                if comparison_seen {
                    return Err(self.error());
                }
                comparison_seen = true;
            }

            lhs = self.parse_infix(lhs, rbp)?;
        }

        Ok(lhs)
    }

    /// Parses one infix operation with `lhs` already consumed and the
    /// operator token current.
    fn parse_infix(&mut self, lhs: Expr, rbp: u8) -> Result<Expr, ParseError> {
        let token = self.current().clone();
        match &token.kind {
            TokenKind::Keyword(Keyword::And) => {
                self.advance();
                let rhs = self.parse_expression(rbp)?;
                let span = lhs.span.merge(rhs.span);
                let mut args = match lhs.kind {
                    ExprKind::And(args) => args,
                    _ => vec![lhs],
                };
                args.push(rhs);
                Ok(Expr::new(ExprKind::And(args), span))
            }
            TokenKind::Keyword(Keyword::Or) => {
                self.advance();
                let rhs = self.parse_expression(rbp)?;
                let span = lhs.span.merge(rhs.span);
                let mut args = match lhs.kind {
                    ExprKind::Or(args) => args,
                    _ => vec![lhs],
                };
                args.push(rhs);
                Ok(Expr::new(ExprKind::Or(args), span))
            }
            TokenKind::Keyword(Keyword::Is) => {
                self.advance();
                let negated = self.eat_keyword(Keyword::Not);
                self.expect_keyword(Keyword::Null)?;
                let span = lhs.span.merge(self.prev_span());
                let op = if negated {
                    UnaryOp::IsNotNull
                } else {
                    UnaryOp::IsNull
                };
                Ok(Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(lhs),
                    },
                    span,
                ))
            }
            TokenKind::Keyword(Keyword::Between) => {
                self.advance();
                let lower = self.parse_expression(SUM_BP)?;
                self.expect_keyword(Keyword::And)?;
                let upper = self.parse_expression(SUM_BP)?;
                let span = lhs.span.merge(upper.span);
                Ok(Expr::new(
                    ExprKind::Between {
                        operand: Box::new(lhs),
                        lower: Box::new(lower),
                        upper: Box::new(upper),
                    },
                    span,
                ))
            }
            TokenKind::Keyword(Keyword::In) => {
                self.advance();
                let rhs = self.parse_expression(rbp)?;
                let span = lhs.span.merge(rhs.span);
                Ok(Expr::new(
                    ExprKind::Binary {
                        op: BinaryOp::In,
                        left: Box::new(lhs),
                        right: Box::new(rhs),
                    },
                    span,
                ))
            }
            TokenKind::Keyword(Keyword::Not) => {
                self.advance();
                self.expect_keyword(Keyword::In)?;
                let rhs = self.parse_expression(rbp)?;
                let span = lhs.span.merge(rhs.span);
                Ok(Expr::new(
                    ExprKind::Binary {
                        op: BinaryOp::NotIn,
                        left: Box::new(lhs),
                        right: Box::new(rhs),
                    },
                    span,
                ))
            }
            kind => {
                let Some(op) = token_to_binary_op(kind) else {
                    return Err(self.error());
                };
                self.advance();
                // Quantified comparison: op ANY(subselect) / op ALL(subselect).
                if is_quantifiable_op(kind)
                    && (self.check_word("any") || self.check_word("all"))
                    && self.peek(1).kind == TokenKind::LeftParen
                {
                    let quantifier = if self.eat_word("any") {
                        Quantifier::Any
                    } else {
                        self.advance();
                        Quantifier::All
                    };
                    self.expect(&TokenKind::LeftParen)?;
                    let select = self.parse_select()?;
                    self.expect(&TokenKind::RightParen)?;
                    let span = lhs.span.merge(self.prev_span());
                    return Ok(Expr::new(
                        ExprKind::Quantified {
                            op,
                            quantifier,
                            left: Box::new(lhs),
                            right: Box::new(select),
                        },
                        span,
                    ));
                }
                let rhs = self.parse_expression(rbp)?;
                let span = lhs.span.merge(rhs.span);
                Ok(Expr::new(
                    ExprKind::Binary {
                        op,
                        left: Box::new(lhs),
                        right: Box::new(rhs),
                    },
                    span,
                ))
            }
        }
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        let start = self.current().span;
        match &self.current().kind {
            TokenKind::Keyword(Keyword::Not) => {
                self.advance();
                let operand = self.parse_expression(NOT_BP)?;
                let span = start.merge(operand.span);
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_expression(super::pratt::UNARY_BP)?;
                let span = start.merge(operand.span);
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Plus => {
                // Unary plus is a no-op.
                self.advance();
                self.parse_expression(super::pratt::UNARY_BP)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current().clone();
        let span = token.span;
        match token.kind {
            TokenKind::Integer(value) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Constant(Literal::Integer(value)),
                    span,
                ))
            }
            TokenKind::Decimal(value) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Constant(Literal::Decimal(value)),
                    span,
                ))
            }
            TokenKind::Date(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Constant(Literal::Date(value)), span))
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Constant(Literal::String(value)),
                    span,
                ))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Constant(Literal::Boolean(true)),
                    span,
                ))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Constant(Literal::Boolean(false)),
                    span,
                ))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::new(ExprKind::Constant(Literal::Null), span))
            }
            TokenKind::PositionalParam => {
                self.advance();
                let index = self.param_counter;
                self.param_counter += 1;
                Ok(Expr::new(
                    ExprKind::Placeholder(Placeholder::Positional(index)),
                    span,
                ))
            }
            TokenKind::NamedParam(name) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Placeholder(Placeholder::Named(name)),
                    span,
                ))
            }
            TokenKind::Identifier(name) => {
                if self.peek(1).kind == TokenKind::LeftParen {
                    self.advance();
                    self.advance();
                    let operands = self.parse_function_args()?;
                    self.expect(&TokenKind::RightParen)?;
                    let span = span.merge(self.prev_span());
                    return Ok(Expr::new(ExprKind::Function { name, operands }, span));
                }
                self.advance();
                Ok(Expr::new(ExprKind::Column(name), span))
            }
            TokenKind::LeftParen => {
                if self.peek(1).as_keyword() == Some(Keyword::Select) {
                    self.advance();
                    let select = self.parse_select()?;
                    self.expect(&TokenKind::RightParen)?;
                    let span = span.merge(self.prev_span());
                    return Ok(Expr::new(ExprKind::Subselect(Box::new(select)), span));
                }
                if self.peek(1).kind.is_literal() && self.peek(2).kind == TokenKind::Comma {
                    return self.parse_list();
                }
                self.advance();
                let inner = self.parse_expression(0)?;
                self.expect(&TokenKind::RightParen)?;
                // Widen the span over the parentheses so that enclosing
                // expressions cover balanced source text.
                let span = span.merge(self.prev_span());
                Ok(Expr::new(inner.kind, span))
            }
            _ => Err(self.error()),
        }
    }

    fn parse_function_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        if self.check(&TokenKind::RightParen) {
            return Ok(Vec::new());
        }
        if self.check(&TokenKind::Star) {
            let span = self.current().span;
            self.advance();
            return Ok(vec![Expr::new(ExprKind::Asterisk, span)]);
        }
        let mut args = vec![self.parse_expression(0)?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            args.push(self.parse_expression(0)?);
        }
        Ok(args)
    }

    /// Parses a parenthesized tuple of literals; the `(` is current.
    fn parse_list(&mut self) -> Result<Expr, ParseError> {
        let start = self.current().span;
        self.advance();
        let mut items = Vec::new();
        loop {
            let token = self.current().clone();
            let Some(literal) = literal_of(&token.kind) else {
                return Err(self.error());
            };
            self.advance();
            items.push(literal);
            if self.check(&TokenKind::Comma) {
                self.advance();
                if self.check(&TokenKind::RightParen) {
                    break;
                }
                continue;
            }
            break;
        }
        self.expect(&TokenKind::RightParen)?;
        let span = start.merge(self.prev_span());
        Ok(Expr::new(ExprKind::Constant(Literal::List(items)), span))
    }
}

/// Converts a literal token into a [`Literal`], if it is one.
fn literal_of(kind: &TokenKind) -> Option<Literal> {
    match kind {
        TokenKind::Integer(value) => Some(Literal::Integer(*value)),
        TokenKind::Decimal(value) => Some(Literal::Decimal(*value)),
        TokenKind::Date(value) => Some(Literal::Date(*value)),
        TokenKind::String(value) => Some(Literal::String(value.clone())),
        TokenKind::Keyword(Keyword::True) => Some(Literal::Boolean(true)),
        TokenKind::Keyword(Keyword::False) => Some(Literal::Boolean(false)),
        TokenKind::Keyword(Keyword::Null) => Some(Literal::Null),
        _ => None,
    }
}
