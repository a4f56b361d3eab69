//! Token types for the BQL lexer.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::Span;

/// BQL keywords.
///
/// Only the words that are reserved in every position are listed here.
/// Context-sensitive words (`OPEN`, `CLOSE`, `CLEAR`, `ON`, `AT`, `ANY`,
/// `ALL`) are lexed as identifiers and recognized by the parser where the
/// grammar expects them, so that columns may use those names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Select,
    Distinct,
    From,
    Where,
    Group,
    Order,
    Pivot,
    By,
    Having,
    Limit,
    As,
    And,
    Or,
    Not,
    In,
    Is,
    Null,
    True,
    False,
    Between,
    Asc,
    Desc,
    Balances,
    Journal,
    Print,
}

impl Keyword {
    /// Attempts to parse a keyword from a string (case-insensitive).
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SELECT" => Some(Self::Select),
            "DISTINCT" => Some(Self::Distinct),
            "FROM" => Some(Self::From),
            "WHERE" => Some(Self::Where),
            "GROUP" => Some(Self::Group),
            "ORDER" => Some(Self::Order),
            "PIVOT" => Some(Self::Pivot),
            "BY" => Some(Self::By),
            "HAVING" => Some(Self::Having),
            "LIMIT" => Some(Self::Limit),
            "AS" => Some(Self::As),
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            "NOT" => Some(Self::Not),
            "IN" => Some(Self::In),
            "IS" => Some(Self::Is),
            "NULL" => Some(Self::Null),
            "TRUE" => Some(Self::True),
            "FALSE" => Some(Self::False),
            "BETWEEN" => Some(Self::Between),
            "ASC" => Some(Self::Asc),
            "DESC" => Some(Self::Desc),
            "BALANCES" => Some(Self::Balances),
            "JOURNAL" => Some(Self::Journal),
            "PRINT" => Some(Self::Print),
            _ => None,
        }
    }

    /// Returns the keyword as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Distinct => "DISTINCT",
            Self::From => "FROM",
            Self::Where => "WHERE",
            Self::Group => "GROUP",
            Self::Order => "ORDER",
            Self::Pivot => "PIVOT",
            Self::By => "BY",
            Self::Having => "HAVING",
            Self::Limit => "LIMIT",
            Self::As => "AS",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::In => "IN",
            Self::Is => "IS",
            Self::Null => "NULL",
            Self::True => "TRUE",
            Self::False => "FALSE",
            Self::Between => "BETWEEN",
            Self::Asc => "ASC",
            Self::Desc => "DESC",
            Self::Balances => "BALANCES",
            Self::Journal => "JOURNAL",
            Self::Print => "PRINT",
        }
    }
}

/// The kind of token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Integer literal (e.g., 42)
    Integer(i64),
    /// Decimal literal (e.g., 3.14)
    Decimal(Decimal),
    /// Unquoted ISO-8601 date literal (e.g., 2014-01-01)
    Date(NaiveDate),
    /// String literal, single- or double-quoted
    String(String),

    // Identifiers and keywords
    /// Identifier, lowercased (e.g., column_name)
    Identifier(String),
    /// Table reference (e.g., #postings); the name may be empty
    TableRef(String),
    /// BQL keyword
    Keyword(Keyword),

    // Parameter placeholders
    /// Positional placeholder `%s`
    PositionalParam,
    /// Named placeholder `%(name)s`
    NamedParam(String),

    // Operators
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// =
    Eq,
    /// !=
    NotEq,
    /// <
    Lt,
    /// <=
    LtEq,
    /// >
    Gt,
    /// >=
    GtEq,
    /// ~
    Tilde,
    /// !~
    NotTilde,
    /// ?~
    QuestionTilde,

    // Delimiters
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// ,
    Comma,
    /// ;
    Semicolon,
    /// .
    Dot,

    // Special
    /// End of input
    Eof,
    /// Invalid/unknown token
    Error(String),
}

impl TokenKind {
    /// Returns true if this token is one of the literal productions
    /// (date, decimal, integer, string, boolean, null).
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::Integer(_)
                | Self::Decimal(_)
                | Self::Date(_)
                | Self::String(_)
                | Self::Keyword(Keyword::Null | Keyword::True | Keyword::False)
        )
    }
}

/// A token with its span in the source code.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// The location in the source code.
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Returns true if this is an EOF token.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// Returns the keyword if this is a keyword token.
    #[must_use]
    pub const fn as_keyword(&self) -> Option<Keyword> {
        match &self.kind {
            TokenKind::Keyword(kw) => Some(*kw),
            _ => None,
        }
    }

    /// Returns true if this is the given context-sensitive word.
    ///
    /// Unquoted identifiers are lowercased by the lexer, so the comparison
    /// word must be given in lowercase.
    #[must_use]
    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Identifier(name) if name == word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_from_str() {
        assert_eq!(Keyword::from_str("SELECT"), Some(Keyword::Select));
        assert_eq!(Keyword::from_str("select"), Some(Keyword::Select));
        assert_eq!(Keyword::from_str("PiVoT"), Some(Keyword::Pivot));
        assert_eq!(Keyword::from_str("open"), None);
        assert_eq!(Keyword::from_str("not_a_keyword"), None);
    }

    #[test]
    fn test_token_is_word() {
        let open = Token::new(
            TokenKind::Identifier(String::from("open")),
            Span::new(0, 4, 1),
        );
        assert!(open.is_word("open"));
        assert!(!open.is_word("close"));
    }

    #[test]
    fn test_token_is_literal() {
        assert!(TokenKind::Integer(1).is_literal());
        assert!(TokenKind::Keyword(Keyword::Null).is_literal());
        assert!(!TokenKind::Keyword(Keyword::Select).is_literal());
        assert!(!TokenKind::Identifier(String::from("x")).is_literal());
    }
}
