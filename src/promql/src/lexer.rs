//! Lexer for PromQL query text
//!
//! Produces a flat sequence of [`Token`]s. Classification is purely
//! character-level; anything that depends on grammatical context (for
//! instance `!=` as a label operator versus a comparison) is left to the
//! parser.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::LexError;
use crate::types::{DURATION_UNITS, is_identifier_char, is_identifier_start};

/// Token types produced by the lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Metric or label name
    Identifier,
    /// Identifier immediately followed by `(`
    FunctionName,
    /// `by` or `without`
    Grouping,
    /// `offset`
    Offset,
    Number,
    Duration,
    String,
    /// `=`, `=~`, `!~`
    LabelOp,
    /// `==`, `!=`, `>`, `<`, `>=`, `<=`, `and`, `or`, `unless`
    ComparisonOp,
    /// `+`, `-`, `*`, `/`, `%`, `^`
    ArithmeticOp,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Comma,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identifier => "identifier",
            Self::FunctionName => "function name",
            Self::Grouping => "grouping keyword",
            Self::Offset => "'offset'",
            Self::Number => "number",
            Self::Duration => "duration",
            Self::String => "string",
            Self::LabelOp => "label operator",
            Self::ComparisonOp => "comparison operator",
            Self::ArithmeticOp => "arithmetic operator",
            Self::LeftBrace => "'{'",
            Self::RightBrace => "'}'",
            Self::LeftBracket => "'['",
            Self::RightBracket => "']'",
            Self::LeftParen => "'('",
            Self::RightParen => "')'",
            Self::Comma => "','",
        };
        f.write_str(name)
    }
}

/// A single token with its source text and byte offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Token text; for strings this is the unquoted, unescaped value
    pub text: String,
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }

    /// The identifier text if this token can serve as a name.
    ///
    /// Keywords are valid label names (`{by="x"}`), so they count too.
    pub fn as_name(&self) -> Option<&str> {
        match self.kind {
            TokenKind::Identifier | TokenKind::Grouping | TokenKind::Offset => Some(&self.text),
            TokenKind::ComparisonOp if is_identifier_start(self.text.chars().next()?) => {
                Some(&self.text)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.text)
    }
}

/// Streaming lexer over a query string
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            failed: false,
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}
    }

    /// Byte offset of the next unread character
    fn offset(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(pos, _)| pos)
            .unwrap_or(self.input.len())
    }

    fn read_number(&mut self, start: usize) -> Token {
        let mut seen_dot = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.chars.next();
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                self.chars.next();
            } else {
                break;
            }
        }

        if self.peek_char().is_some_and(|c| DURATION_UNITS.contains(&c)) {
            self.chars.next();
            let end = self.offset();
            return Token::new(TokenKind::Duration, &self.input[start..end], start);
        }

        let end = self.offset();
        Token::new(TokenKind::Number, &self.input[start..end], start)
    }

    fn read_identifier(&mut self, start: usize) -> Token {
        while self.chars.next_if(|&(_, c)| is_identifier_char(c)).is_some() {}
        let end = self.offset();
        let text = &self.input[start..end];

        let kind = match text {
            "by" | "without" => TokenKind::Grouping,
            "offset" => TokenKind::Offset,
            "and" | "or" | "unless" => TokenKind::ComparisonOp,
            _ if self.peek_char() == Some('(') => TokenKind::FunctionName,
            _ => TokenKind::Identifier,
        };
        Token::new(kind, text, start)
    }

    fn read_string(&mut self, start: usize, quote: char) -> Result<Token, LexError> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => {
                    return Ok(Token::new(TokenKind::String, value, start));
                }
                // Only the quote and the backslash itself are unescaped;
                // regex escapes such as `\d` are kept as written.
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, escaped)) if escaped == quote || escaped == '\\' => {
                        value.push(escaped)
                    }
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => break,
                },
                Some((_, c)) => value.push(c),
                None => break,
            }
        }
        Err(LexError::UnterminatedString { position: start })
    }

    fn read_operator(&mut self, start: usize, first: char) -> Result<Token, LexError> {
        let second = self.peek_char();
        let (kind, text) = match (first, second) {
            ('=', Some('=')) => (TokenKind::ComparisonOp, "=="),
            ('=', Some('~')) => (TokenKind::LabelOp, "=~"),
            ('=', _) => (TokenKind::LabelOp, "="),
            ('!', Some('=')) => (TokenKind::ComparisonOp, "!="),
            ('!', Some('~')) => (TokenKind::LabelOp, "!~"),
            ('>', Some('=')) => (TokenKind::ComparisonOp, ">="),
            ('>', _) => (TokenKind::ComparisonOp, ">"),
            ('<', Some('=')) => (TokenKind::ComparisonOp, "<="),
            ('<', _) => (TokenKind::ComparisonOp, "<"),
            ('+', _) => (TokenKind::ArithmeticOp, "+"),
            ('-', _) => (TokenKind::ArithmeticOp, "-"),
            ('*', _) => (TokenKind::ArithmeticOp, "*"),
            ('/', _) => (TokenKind::ArithmeticOp, "/"),
            ('%', _) => (TokenKind::ArithmeticOp, "%"),
            ('^', _) => (TokenKind::ArithmeticOp, "^"),
            (character, _) => {
                return Err(LexError::UnexpectedCharacter {
                    character,
                    position: start,
                });
            }
        };
        if text.len() == 2 {
            self.chars.next();
        }
        Ok(Token::new(kind, text, start))
    }

    fn next_token(&mut self) -> Option<Result<Token, LexError>> {
        self.skip_whitespace();
        let (start, c) = self.chars.next()?;

        let structural = match c {
            '{' => Some(TokenKind::LeftBrace),
            '}' => Some(TokenKind::RightBrace),
            '[' => Some(TokenKind::LeftBracket),
            ']' => Some(TokenKind::RightBracket),
            '(' => Some(TokenKind::LeftParen),
            ')' => Some(TokenKind::RightParen),
            ',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = structural {
            return Some(Ok(Token::new(kind, c.to_string(), start)));
        }

        let token = match c {
            _ if c.is_ascii_digit() => Ok(self.read_number(start)),
            _ if is_identifier_start(c) => Ok(self.read_identifier(start)),
            '"' | '\'' => self.read_string(start, c),
            '=' | '!' | '<' | '>' | '+' | '-' | '*' | '/' | '%' | '^' => {
                self.read_operator(start, c)
            }
            character => Err(LexError::UnexpectedCharacter {
                character,
                position: start,
            }),
        };
        Some(token)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let token = self.next_token();
        if matches!(token, Some(Err(_))) {
            self.failed = true;
        }
        token
    }
}

/// Tokenize a complete query, failing on the first invalid character
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let tokens = Lexer::new(input).collect::<Result<Vec<_>, _>>()?;
    log::trace!("Tokenized {} bytes into {} tokens", input.len(), tokens.len());
    Ok(tokens)
}
