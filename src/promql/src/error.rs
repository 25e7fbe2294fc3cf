//! PromQL error types
//!
//! Each stage of the engine has its own error type so callers can match on
//! exactly what failed. [`PromQLError`] wraps all of them for code that mixes
//! parsing, mutation and rendering behind a single `?`.

use thiserror::Error;

/// Errors raised while turning query text into tokens
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("Invalid character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },

    #[error("Unterminated string starting at position {position}")]
    UnterminatedString { position: usize },
}

/// Errors raised while turning tokens into an expression tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("Expected {expected} at position {position}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: usize,
    },

    #[error("Expected {expected}, found end of input")]
    UnexpectedEof { expected: String },

    #[error("Invalid duration format '{value}' at position {position}")]
    InvalidDuration { value: String, position: usize },

    #[error("Invalid number literal '{value}' at position {position}")]
    InvalidNumber { value: String, position: usize },

    #[error("Could not determine a metric selector from the query")]
    NoMetric,

    #[error("Query is {length} bytes long, the limit is {max}")]
    QueryTooLong { length: usize, max: usize },

    #[error("Query nesting exceeds the maximum depth of {max}")]
    NestingTooDeep { max: usize },
}

/// Errors raised by builder mutators before any state is touched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid duration format: {0}")]
    InvalidDuration(String),

    #[error("Invalid label operator: {0}")]
    InvalidLabelOperator(String),

    #[error("Invalid comparison operator: {0}")]
    InvalidComparisonOperator(String),

    #[error("Invalid arithmetic operator: {0}")]
    InvalidArithmeticOperator(String),

    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("Number has no PromQL literal: {0}")]
    NonFiniteNumber(String),

    #[error("No metric selected")]
    NoMetric,
}

/// Errors raised when the builder cannot render its current state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("No metric selected")]
    NoMetric,
}

/// Any error the engine can produce
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromQLError {
    #[error("PromQL parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("PromQL validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("PromQL state error: {0}")]
    State(#[from] StateError),
}

impl From<LexError> for PromQLError {
    fn from(err: LexError) -> Self {
        Self::Parse(ParseError::Lex(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_error_display() {
        let err = LexError::UnexpectedCharacter {
            character: '@',
            position: 7,
        };
        assert_eq!(err.to_string(), "Invalid character '@' at position 7");
    }

    #[test]
    fn test_parse_error_wraps_lex_error_transparently() {
        let err: ParseError = LexError::UnterminatedString { position: 3 }.into();
        assert_eq!(err.to_string(), "Unterminated string starting at position 3");
    }

    #[test]
    fn test_umbrella_conversions() {
        let err: PromQLError = ValidationError::InvalidDuration("5x".into()).into();
        assert_eq!(
            err.to_string(),
            "PromQL validation error: Invalid duration format: 5x"
        );

        assert_eq!(
            ValidationError::NonFiniteNumber("NaN".into()).to_string(),
            "Number has no PromQL literal: NaN"
        );

        let err: PromQLError = StateError::NoMetric.into();
        assert!(matches!(err, PromQLError::State(StateError::NoMetric)));

        let err: PromQLError = LexError::UnterminatedString { position: 0 }.into();
        assert!(matches!(err, PromQLError::Parse(ParseError::Lex(_))));
    }
}
