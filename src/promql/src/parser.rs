//! Recursive-descent parser for PromQL queries
//!
//! The parser works on the token stream produced by [`crate::lexer`] with a
//! single token of lookahead and never backtracks. Arithmetic operators bind
//! tighter than comparison and set operators; within each class operators
//! chain left to right without further precedence, so `a + b * c` reads as
//! `(a + b) * c`. Parenthesize anything else.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::lexer::{Token, TokenKind, tokenize};
use crate::types::{
    ArithmeticOp, ComparisonOp, Expr, Function, Grouping, LabelMatcher, MatcherOp,
    MetricSelector, is_valid_duration,
};

/// Limits applied while parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Longest accepted query, in bytes
    pub max_query_length: usize,
    /// Deepest accepted nesting of parentheses and function calls
    pub max_depth: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_query_length: 16 * 1024,
            max_depth: 128,
        }
    }
}

/// Parse a PromQL query string into an expression tree
///
/// # Examples
/// ```
/// use promql::parser::parse;
///
/// let expr = parse(r#"http_requests_total{job="api"}"#).unwrap();
/// assert_eq!(expr.to_string(), r#"http_requests_total{job="api"}"#);
///
/// let expr = parse("sum(rate(http_requests_total[5m])) by (job)").unwrap();
/// assert_eq!(expr.to_string(), "sum(rate(http_requests_total[5m])) by (job)");
/// ```
pub fn parse(query: &str) -> Result<Expr, ParseError> {
    parse_with(query, &ParserOptions::default())
}

/// Parse a query with explicit limits
pub fn parse_with(query: &str, options: &ParserOptions) -> Result<Expr, ParseError> {
    if query.len() > options.max_query_length {
        return Err(ParseError::QueryTooLong {
            length: query.len(),
            max: options.max_query_length,
        });
    }

    let tokens = tokenize(query)?;
    let mut parser = Parser::new(tokens, options.max_depth);
    let expr = parser.parse_expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Check if a query string is syntactically valid
pub fn validate(query: &str) -> Result<(), ParseError> {
    parse(query).map(|_| ())
}

/// Token-stream parser
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, max_depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().is_some_and(|t| t.kind == kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        let expected = expected.into();
        match self.current() {
            Some(token) => ParseError::UnexpectedToken {
                expected,
                found: token.to_string(),
                position: token.position,
            },
            None => ParseError::UnexpectedEof { expected },
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if !self.check(kind) {
            return Err(self.unexpected(kind.to_string()));
        }
        self.advance()
            .ok_or_else(|| self.unexpected(kind.to_string()))
    }

    /// Fail unless every token has been consumed
    pub fn expect_end(&self) -> Result<(), ParseError> {
        match self.current() {
            Some(_) => Err(self.unexpected("end of input")),
            None => Ok(()),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::NestingTooDeep {
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// `expr := term (comparisonOp term)*`
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let mut lhs = self.parse_term()?;
        while self.check(TokenKind::ComparisonOp) {
            let op = self.parse_operator::<ComparisonOp>("comparison operator")?;
            let rhs = self.parse_term()?;
            lhs = Expr::comparison(lhs, op, rhs);
        }
        self.leave();
        Ok(lhs)
    }

    /// `term := operand (arithOp operand)*`
    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_operand()?;
        while self.check(TokenKind::ArithmeticOp) {
            let op = self.parse_operator::<ArithmeticOp>("arithmetic operator")?;
            let rhs = self.parse_operand()?;
            lhs = Expr::arithmetic(lhs, op, rhs);
        }
        Ok(lhs)
    }

    fn parse_operator<T: std::str::FromStr>(&mut self, expected: &str) -> Result<T, ParseError> {
        let op = self
            .current()
            .and_then(|token| token.text.parse::<T>().ok())
            .ok_or_else(|| self.unexpected(expected))?;
        self.advance();
        Ok(op)
    }

    fn parse_operand(&mut self) -> Result<Expr, ParseError> {
        let Some(kind) = self.current().map(|t| t.kind) else {
            return Err(self.unexpected("expression"));
        };

        match kind {
            TokenKind::Number => self.parse_number().map(Expr::Number),
            // A leading minus only negates a number literal
            TokenKind::ArithmeticOp
                if self.current().is_some_and(|t| t.text == "-")
                    && self.peek().is_some_and(|t| t.kind == TokenKind::Number) =>
            {
                self.advance();
                self.parse_number().map(|value| Expr::Number(-value))
            }
            TokenKind::String => {
                let token = self.expect(TokenKind::String)?;
                Ok(Expr::String(token.text))
            }
            TokenKind::LeftParen => {
                self.expect(TokenKind::LeftParen)?;
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RightParen)?;
                Ok(Expr::paren(inner))
            }
            TokenKind::FunctionName => Ok(Expr::Function(self.parse_function()?)),
            TokenKind::Identifier => {
                let starts_call = self
                    .peek()
                    .is_some_and(|t| matches!(t.kind, TokenKind::LeftParen | TokenKind::Grouping));
                if starts_call {
                    Ok(Expr::Function(self.parse_function()?))
                } else {
                    Ok(Expr::Selector(self.parse_metric()?))
                }
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        let token = self.expect(TokenKind::Number)?;
        token
            .text
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidNumber {
                value: token.text.clone(),
                position: token.position,
            })
    }

    /// `name ( args ) grouping?` or the prefix form `name grouping ( args )`
    pub fn parse_function(&mut self) -> Result<Function, ParseError> {
        let name = match self.current() {
            Some(token) if matches!(token.kind, TokenKind::FunctionName | TokenKind::Identifier) => {
                token.text.clone()
            }
            _ => return Err(self.unexpected("function name")),
        };
        self.advance();
        self.enter()?;

        let mut grouping = None;
        if self.check(TokenKind::Grouping) {
            grouping = Some(self.parse_grouping()?);
        }

        self.expect(TokenKind::LeftParen)?;
        let args = self.parse_function_args()?;
        self.expect(TokenKind::RightParen)?;

        if grouping.is_none() && self.check(TokenKind::Grouping) {
            grouping = Some(self.parse_grouping()?);
        }

        self.leave();
        Ok(Function {
            name,
            args,
            grouping,
        })
    }

    fn parse_function_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.check(TokenKind::RightParen) {
            return Ok(args);
        }

        loop {
            args.push(self.parse_expression()?);
            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(args)
    }

    /// `('by'|'without') '(' name (',' name)* ')'`
    fn parse_grouping(&mut self) -> Result<Grouping, ParseError> {
        let keyword = self.expect(TokenKind::Grouping)?;
        self.expect(TokenKind::LeftParen)?;

        let mut labels = Vec::new();
        while !self.check(TokenKind::RightParen) {
            let name = self
                .current()
                .and_then(Token::as_name)
                .map(str::to_string)
                .ok_or_else(|| self.unexpected("label name"))?;
            self.advance();
            labels.push(name);

            if self.check(TokenKind::Comma) {
                self.advance();
            } else if !self.check(TokenKind::RightParen) {
                return Err(self.unexpected("',' or ')'"));
            }
        }
        self.expect(TokenKind::RightParen)?;

        Ok(match keyword.text.as_str() {
            "by" => Grouping::By(labels),
            _ => Grouping::Without(labels),
        })
    }

    /// `name ('{' matchers '}')? ('[' duration ']')? ('offset' duration)?`
    pub fn parse_metric(&mut self) -> Result<MetricSelector, ParseError> {
        let name = self.expect(TokenKind::Identifier)?.text;
        let mut selector = MetricSelector::new(&name);

        if self.check(TokenKind::LeftBrace) {
            self.advance();
            self.parse_label_matchers(&mut selector)?;
            self.expect(TokenKind::RightBrace)?;
        }

        if self.check(TokenKind::LeftBracket) {
            self.advance();
            selector.range_window = Some(self.parse_duration()?);
            self.expect(TokenKind::RightBracket)?;
        }

        if self.check(TokenKind::Offset) {
            self.advance();
            selector.offset = Some(self.parse_duration()?);
        }

        Ok(selector)
    }

    fn parse_label_matchers(&mut self, selector: &mut MetricSelector) -> Result<(), ParseError> {
        while !self.check(TokenKind::RightBrace) {
            let name = self
                .current()
                .and_then(Token::as_name)
                .map(str::to_string)
                .ok_or_else(|| self.unexpected("label name"))?;
            self.advance();

            let op = self.parse_label_op()?;
            let value = self.expect(TokenKind::String)?.text;
            selector.set_label(LabelMatcher {
                name,
                op,
                value,
            });

            if self.check(TokenKind::Comma) {
                self.advance();
            } else if !self.check(TokenKind::RightBrace) {
                return Err(self.unexpected("',' or '}'"));
            }
        }
        Ok(())
    }

    /// `!=` is lexed as a comparison operator; inside braces it matches labels
    fn parse_label_op(&mut self) -> Result<MatcherOp, ParseError> {
        let op = match self.current() {
            Some(token) if token.kind == TokenKind::LabelOp => token.text.parse().ok(),
            Some(token) if token.kind == TokenKind::ComparisonOp && token.text == "!=" => {
                Some(MatcherOp::NotEqual)
            }
            _ => None,
        };
        let op = op.ok_or_else(|| self.unexpected("label operator"))?;
        self.advance();
        Ok(op)
    }

    fn parse_duration(&mut self) -> Result<String, ParseError> {
        let token = self.expect(TokenKind::Duration)?;
        if !is_valid_duration(&token.text) {
            return Err(ParseError::InvalidDuration {
                value: token.text,
                position: token.position,
            });
        }
        Ok(token.text)
    }
}

/// Extract label matchers from a parsed expression
///
/// This is useful for understanding what labels a query is filtering on.
pub fn extract_matchers(expr: &Expr) -> Vec<LabelMatcher> {
    let mut result = Vec::new();
    collect_matchers_recursive(expr, &mut result);
    result
}

fn collect_matchers_recursive(expr: &Expr, result: &mut Vec<LabelMatcher>) {
    match expr {
        Expr::Selector(selector) => result.extend(selector.labels.iter().cloned()),
        Expr::Function(function) => {
            for arg in &function.args {
                collect_matchers_recursive(arg, result);
            }
        }
        Expr::Paren(inner) => collect_matchers_recursive(inner, result),
        Expr::Arithmetic { lhs, rhs, .. } | Expr::Comparison { lhs, rhs, .. } => {
            collect_matchers_recursive(lhs, result);
            collect_matchers_recursive(rhs, result);
        }
        Expr::Number(_) | Expr::String(_) | Expr::Placeholder => {}
    }
}

/// Extract all metric names referenced in an expression, in source order
pub fn extract_metric_names(expr: &Expr) -> Vec<String> {
    let mut names = Vec::new();
    collect_metric_names_recursive(expr, &mut names);
    names
}

fn collect_metric_names_recursive(expr: &Expr, names: &mut Vec<String>) {
    match expr {
        Expr::Selector(selector) => names.push(selector.name.clone()),
        Expr::Function(function) => {
            for arg in &function.args {
                collect_metric_names_recursive(arg, names);
            }
        }
        Expr::Paren(inner) => collect_metric_names_recursive(inner, names),
        Expr::Arithmetic { lhs, rhs, .. } | Expr::Comparison { lhs, rhs, .. } => {
            collect_metric_names_recursive(lhs, names);
            collect_metric_names_recursive(rhs, names);
        }
        Expr::Number(_) | Expr::String(_) | Expr::Placeholder => {}
    }
}

/// Check if an expression contains a selector with a range window
///
/// Range vectors are required for functions like rate(), irate(), etc.
pub fn has_range_vector(expr: &Expr) -> bool {
    match expr {
        Expr::Selector(selector) => selector.range_window.is_some(),
        Expr::Function(function) => function.args.iter().any(has_range_vector),
        Expr::Paren(inner) => has_range_vector(inner),
        Expr::Arithmetic { lhs, rhs, .. } | Expr::Comparison { lhs, rhs, .. } => {
            has_range_vector(lhs) || has_range_vector(rhs)
        }
        Expr::Number(_) | Expr::String(_) | Expr::Placeholder => false,
    }
}
