//! Binding powers for the BQL expression grammar.

use crate::ast::BinaryOp;
use crate::lexer::{Keyword, TokenKind};

/// Binding power of the NOT prefix operator.
pub(super) const NOT_BP: u8 = 5;

/// Binding power of the unary `+`/`-` prefix operators.
pub(super) const UNARY_BP: u8 = 13;

/// Binding power of attribute and subscript access.
pub(super) const POSTFIX_BP: u8 = 15;

/// Binding power the operands of BETWEEN are parsed at (the additive
/// level, so that the AND separating the bounds is not consumed).
pub(super) const SUM_BP: u8 = 9;

/// The grammatical class of an infix operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum OpClass {
    /// Logical OR.
    Or,
    /// Logical AND.
    And,
    /// Comparison-level operators; non-associative.
    Comparison,
    /// Additive and multiplicative arithmetic; left associative.
    Arithmetic,
}

/// Returns `(left_bp, right_bp, class)` for an infix token.
///
/// Higher binding power binds tighter. `NOT` is an infix lead-in only for
/// `NOT IN`, which the parser detects with one token of lookahead, so it is
/// reported as comparison-level here.
#[must_use]
pub(super) fn infix_binding_power(kind: &TokenKind) -> Option<(u8, u8, OpClass)> {
    match kind {
        TokenKind::Keyword(Keyword::Or) => Some((1, 2, OpClass::Or)),
        TokenKind::Keyword(Keyword::And) => Some((3, 4, OpClass::And)),

        TokenKind::Eq
        | TokenKind::NotEq
        | TokenKind::Lt
        | TokenKind::LtEq
        | TokenKind::Gt
        | TokenKind::GtEq
        | TokenKind::Tilde
        | TokenKind::NotTilde
        | TokenKind::QuestionTilde
        | TokenKind::Keyword(Keyword::In | Keyword::Is | Keyword::Between | Keyword::Not) => {
            Some((7, 8, OpClass::Comparison))
        }

        TokenKind::Plus | TokenKind::Minus => Some((9, 10, OpClass::Arithmetic)),
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => {
            Some((11, 12, OpClass::Arithmetic))
        }

        _ => None,
    }
}

/// Converts a token to a binary operator.
#[must_use]
pub(super) const fn token_to_binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Plus => Some(BinaryOp::Add),
        TokenKind::Minus => Some(BinaryOp::Sub),
        TokenKind::Star => Some(BinaryOp::Mul),
        TokenKind::Slash => Some(BinaryOp::Div),
        TokenKind::Percent => Some(BinaryOp::Mod),
        TokenKind::Eq => Some(BinaryOp::Eq),
        TokenKind::NotEq => Some(BinaryOp::NotEq),
        TokenKind::Lt => Some(BinaryOp::Lt),
        TokenKind::LtEq => Some(BinaryOp::LtEq),
        TokenKind::Gt => Some(BinaryOp::Gt),
        TokenKind::GtEq => Some(BinaryOp::GtEq),
        TokenKind::Tilde => Some(BinaryOp::Match),
        TokenKind::NotTilde => Some(BinaryOp::NotMatch),
        TokenKind::QuestionTilde => Some(BinaryOp::Matches),
        _ => None,
    }
}

/// Returns true for the comparison operator tokens that may be followed by
/// an `ANY(...)` or `ALL(...)` quantifier.
#[must_use]
pub(super) const fn is_quantifiable_op(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Eq
            | TokenKind::NotEq
            | TokenKind::Lt
            | TokenKind::LtEq
            | TokenKind::Gt
            | TokenKind::GtEq
            | TokenKind::Tilde
            | TokenKind::NotTilde
            | TokenKind::QuestionTilde
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_ordering() {
        let mul = infix_binding_power(&TokenKind::Star).unwrap();
        let add = infix_binding_power(&TokenKind::Plus).unwrap();
        let cmp = infix_binding_power(&TokenKind::Eq).unwrap();
        let and = infix_binding_power(&TokenKind::Keyword(Keyword::And)).unwrap();
        let or = infix_binding_power(&TokenKind::Keyword(Keyword::Or)).unwrap();
        assert!(mul.0 > add.0);
        assert!(add.0 > cmp.0);
        assert!(cmp.0 > NOT_BP);
        assert!(NOT_BP > and.0);
        assert!(and.0 > or.0);
    }

    #[test]
    fn test_left_associativity() {
        let (left, right, _) = infix_binding_power(&TokenKind::Plus).unwrap();
        assert!(left < right);
    }

    #[test]
    fn test_token_to_binary_op() {
        assert_eq!(token_to_binary_op(&TokenKind::Plus), Some(BinaryOp::Add));
        assert_eq!(token_to_binary_op(&TokenKind::Tilde), Some(BinaryOp::Match));
        assert_eq!(token_to_binary_op(&TokenKind::LeftParen), None);
    }
}
