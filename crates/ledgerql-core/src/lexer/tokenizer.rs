//! BQL tokenizer implementation.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{Keyword, Span, Token, TokenKind};

/// A lexer that tokenizes BQL input.
pub struct Lexer<'a> {
    /// The input source code.
    input: &'a str,
    /// The current byte position.
    pos: usize,
    /// The byte position of the start of the current token.
    start: usize,
    /// The 1-based line number at the current position.
    line: u32,
    /// The line number at the start of the current token.
    start_line: u32,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            start: 0,
            line: 1,
            start_line: 1,
        }
    }

    /// Returns the current character without advancing.
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    /// Returns the next character without advancing.
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    /// Advances to the next character and returns it.
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Skips whitespace and comments.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.advance();
            }

            // Single-line comments (-- ...)
            if self.peek() == Some('-') && self.peek_next() == Some('-') {
                self.advance();
                self.advance();
                while self.peek().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                continue;
            }

            // Multi-line comments (/* ... */)
            if self.peek() == Some('/') && self.peek_next() == Some('*') {
                self.advance();
                self.advance();
                loop {
                    match self.advance() {
                        Some('*') if self.peek() == Some('/') => {
                            self.advance();
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }
                continue;
            }

            break;
        }
    }

    /// Creates a token with the current span.
    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, Span::new(self.start, self.pos, self.start_line))
    }

    /// Scans an identifier or keyword.
    fn scan_identifier(&mut self) -> Token {
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let text = &self.input[self.start..self.pos];
        match Keyword::from_str(text) {
            Some(keyword) => self.make_token(TokenKind::Keyword(keyword)),
            None => self.make_token(TokenKind::Identifier(text.to_ascii_lowercase())),
        }
    }

    /// Scans a table reference (e.g., `#postings`). The name may be empty.
    fn scan_table_ref(&mut self) -> Token {
        self.advance();
        let name_start = self.pos;
        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                self.advance();
            }
        }
        let name = self.input[name_start..self.pos].to_owned();
        self.make_token(TokenKind::TableRef(name))
    }

    /// Returns true if the input at the current token start matches an
    /// ISO-8601 date literal (`\d{4}-\d{2}-\d{2}` with a digit boundary).
    fn at_date_literal(&self) -> bool {
        let rest = self.input[self.start..].as_bytes();
        if rest.len() < 10 {
            return false;
        }
        let shape = rest[..4].iter().all(u8::is_ascii_digit)
            && rest[4] == b'-'
            && rest[5..7].iter().all(u8::is_ascii_digit)
            && rest[7] == b'-'
            && rest[8..10].iter().all(u8::is_ascii_digit);
        shape && !rest.get(10).is_some_and(u8::is_ascii_digit)
    }

    /// Scans a date literal.
    fn scan_date(&mut self) -> Token {
        for _ in 0..10 {
            self.advance();
        }
        let text = &self.input[self.start..self.pos];
        match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            Ok(date) => self.make_token(TokenKind::Date(date)),
            Err(_) => self.make_token(TokenKind::Error(format!("invalid date: {text}"))),
        }
    }

    /// Scans a number (integer or decimal).
    fn scan_number(&mut self) -> Token {
        let mut is_decimal = false;

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') {
            is_decimal = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = &self.input[self.start..self.pos];
        if is_decimal {
            // Normalize ".5" and "10." shapes before parsing.
            let mut normalized = String::new();
            if text.starts_with('.') {
                normalized.push('0');
            }
            normalized.push_str(text);
            if normalized.ends_with('.') {
                normalized.push('0');
            }
            match Decimal::from_str(&normalized) {
                Ok(d) => self.make_token(TokenKind::Decimal(d)),
                Err(e) => self.make_token(TokenKind::Error(format!("invalid decimal: {e}"))),
            }
        } else {
            match text.parse::<i64>() {
                Ok(i) => self.make_token(TokenKind::Integer(i)),
                Err(e) => self.make_token(TokenKind::Error(format!("invalid integer: {e}"))),
            }
        }
    }

    /// Scans a string literal delimited by the given quote character.
    ///
    /// BQL strings have no escape sequences.
    fn scan_string(&mut self, quote: char) -> Token {
        self.advance();
        let content_start = self.pos;
        loop {
            match self.peek() {
                Some(c) if c == quote => break,
                Some(_) => {
                    self.advance();
                }
                None => {
                    return self
                        .make_token(TokenKind::Error(String::from("unterminated string")));
                }
            }
        }
        let content = self.input[content_start..self.pos].to_owned();
        self.advance();
        self.make_token(TokenKind::String(content))
    }

    /// Scans a parameter placeholder (`%s` or `%(name)s`) or the `%`
    /// operator.
    fn scan_percent(&mut self) -> Token {
        self.advance();
        match self.peek() {
            Some('s')
                if !self
                    .peek_next()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_') =>
            {
                self.advance();
                self.make_token(TokenKind::PositionalParam)
            }
            Some('(') => {
                self.advance();
                let name_start = self.pos;
                while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                    self.advance();
                }
                let name = self.input[name_start..self.pos].to_owned();
                if name.is_empty() || self.peek() != Some(')') {
                    return self
                        .make_token(TokenKind::Error(String::from("malformed placeholder")));
                }
                self.advance();
                if self.peek() != Some('s') {
                    return self
                        .make_token(TokenKind::Error(String::from("malformed placeholder")));
                }
                self.advance();
                self.make_token(TokenKind::NamedParam(name))
            }
            _ => self.make_token(TokenKind::Percent),
        }
    }

    /// Scans the next token.
    #[must_use]
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        self.start = self.pos;
        self.start_line = self.line;

        let c = match self.peek() {
            Some(c) => c,
            None => return self.make_token(TokenKind::Eof),
        };

        match c {
            '(' => self.single(TokenKind::LeftParen),
            ')' => self.single(TokenKind::RightParen),
            '[' => self.single(TokenKind::LeftBracket),
            ']' => self.single(TokenKind::RightBracket),
            ',' => self.single(TokenKind::Comma),
            ';' => self.single(TokenKind::Semicolon),
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '*' => self.single(TokenKind::Star),
            '/' => self.single(TokenKind::Slash),
            '~' => self.single(TokenKind::Tilde),
            '=' => self.single(TokenKind::Eq),
            '%' => self.scan_percent(),
            '#' => self.scan_table_ref(),
            '<' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    self.make_token(TokenKind::LtEq)
                } else {
                    self.make_token(TokenKind::Lt)
                }
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    self.make_token(TokenKind::GtEq)
                } else {
                    self.make_token(TokenKind::Gt)
                }
            }
            '!' => {
                self.advance();
                match self.peek() {
                    Some('=') => {
                        self.advance();
                        self.make_token(TokenKind::NotEq)
                    }
                    Some('~') => {
                        self.advance();
                        self.make_token(TokenKind::NotTilde)
                    }
                    _ => self.make_token(TokenKind::Error(String::from(
                        "unexpected character: !",
                    ))),
                }
            }
            '?' => {
                self.advance();
                if self.peek() == Some('~') {
                    self.advance();
                    self.make_token(TokenKind::QuestionTilde)
                } else {
                    self.make_token(TokenKind::Error(String::from("unexpected character: ?")))
                }
            }
            '.' => {
                if self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
                    self.scan_number()
                } else {
                    self.single(TokenKind::Dot)
                }
            }
            '\'' | '"' => self.scan_string(c),
            c if c.is_ascii_digit() => {
                if self.at_date_literal() {
                    self.scan_date()
                } else {
                    self.scan_number()
                }
            }
            c if c.is_alphabetic() || c == '_' => self.scan_identifier(),
            _ => {
                self.advance();
                self.make_token(TokenKind::Error(format!("unexpected character: {c}")))
            }
        }
    }

    /// Consumes one character and produces the given token kind.
    fn single(&mut self, kind: TokenKind) -> Token {
        self.advance();
        self.make_token(kind)
    }

    /// Tokenizes the entire input and returns all tokens.
    #[must_use]
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(token_kinds(""), vec![TokenKind::Eof]);
        assert_eq!(token_kinds("  \n\t "), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            token_kinds("SELECT -- comment\nFROM"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Keyword(Keyword::From),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            token_kinds("SELECT /* comment */ FROM"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Keyword(Keyword::From),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            token_kinds("select FROM wHeRe"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Keyword(Keyword::From),
                TokenKind::Keyword(Keyword::Where),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_identifiers_lowercased() {
        assert_eq!(
            token_kinds("Account foo_bar"),
            vec![
                TokenKind::Identifier(String::from("account")),
                TokenKind::Identifier(String::from("foo_bar")),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_soft_keywords_are_identifiers() {
        assert_eq!(
            token_kinds("open close clear on at any all"),
            vec![
                TokenKind::Identifier(String::from("open")),
                TokenKind::Identifier(String::from("close")),
                TokenKind::Identifier(String::from("clear")),
                TokenKind::Identifier(String::from("on")),
                TokenKind::Identifier(String::from("at")),
                TokenKind::Identifier(String::from("any")),
                TokenKind::Identifier(String::from("all")),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            token_kinds("42 3.14 .5 10."),
            vec![
                TokenKind::Integer(42),
                TokenKind::Decimal(Decimal::from_str("3.14").unwrap()),
                TokenKind::Decimal(Decimal::from_str("0.5").unwrap()),
                TokenKind::Decimal(Decimal::from_str("10").unwrap()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_date_literal() {
        assert_eq!(
            token_kinds("2014-01-05"),
            vec![
                TokenKind::Date(NaiveDate::from_ymd_opt(2014, 1, 5).unwrap()),
                TokenKind::Eof,
            ]
        );
        // Plain subtraction is not a date.
        assert_eq!(
            token_kinds("2014 - 01"),
            vec![
                TokenKind::Integer(2014),
                TokenKind::Minus,
                TokenKind::Integer(1),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            token_kinds("'hello' \"world\""),
            vec![
                TokenKind::String(String::from("hello")),
                TokenKind::String(String::from("world")),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            token_kinds("'oops").first(),
            Some(TokenKind::Error(_))
        ));
    }

    #[test]
    fn test_table_ref() {
        assert_eq!(
            token_kinds("#postings #"),
            vec![
                TokenKind::TableRef(String::from("postings")),
                TokenKind::TableRef(String::new()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            token_kinds("%s %(foo)s"),
            vec![
                TokenKind::PositionalParam,
                TokenKind::NamedParam(String::from("foo")),
                TokenKind::Eof,
            ]
        );
        // A bare % is the modulo operator.
        assert_eq!(
            token_kinds("x % 2"),
            vec![
                TokenKind::Identifier(String::from("x")),
                TokenKind::Percent,
                TokenKind::Integer(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            token_kinds("+ - * / % = != < <= > >= ~ !~ ?~"),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Eq,
                TokenKind::NotEq,
                TokenKind::Lt,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::GtEq,
                TokenKind::Tilde,
                TokenKind::NotTilde,
                TokenKind::QuestionTilde,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_span_tracking() {
        let tokens = Lexer::new("SELECT id").tokenize();
        assert_eq!(tokens[0].span, Span::new(0, 6, 1));
        assert_eq!(tokens[1].span, Span::new(7, 9, 1));
    }

    #[test]
    fn test_line_tracking() {
        let tokens = Lexer::new("SELECT\n  id").tokenize();
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[1].span.line, 2);
    }
}
