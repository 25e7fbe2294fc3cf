//! Bidirectional PromQL query construction
//!
//! This crate parses PromQL (Prometheus Query Language) query text into a
//! structured, mutable representation and serializes that representation
//! back into query text.
//!
//! # Architecture
//!
//! ```text
//! PromQL String → Lexer → Parser → AST (Expr) → QueryBuilder → Serializer → PromQL String
//! ```
//!
//! # Modules
//!
//! - [`lexer`] - Tokenizes query text
//! - [`parser`] - Recursive-descent parser producing [`Expr`] trees
//! - [`types`] - Selectors, matchers, functions, operators and the expression tree
//! - [`builder`] - [`QueryBuilder`] for programmatic construction and modification
//! - [`info`] - Serializable inspection snapshots
//! - [`error`] - Error types for PromQL operations
//!
//! # Example
//!
//! ```
//! use promql::{QueryBuilder, parser};
//!
//! let expr = parser::parse("rate(http_requests_total[5m])")?;
//! assert_eq!(parser::extract_metric_names(&expr), vec!["http_requests_total"]);
//! assert!(parser::has_range_vector(&expr));
//!
//! let mut builder = QueryBuilder::parse(r#"http_requests_total{job="api"}"#)?;
//! builder.with_label("status", "500")?.with_binary_op(">", 0)?;
//! assert_eq!(
//!     builder.build()?,
//!     r#"(http_requests_total{job="api",status="500"} > 0)"#
//! );
//! # Ok::<(), promql::PromQLError>(())
//! ```
//!
//! # Supported Features
//!
//! ## Selectors
//! - Instant vector selectors: `metric_name{label="value"}`
//! - Range vector selectors: `metric_name[5m]`
//! - Label matchers: `=`, `!=`, `=~`, `!~`
//! - Offset modifier: `metric offset 5m`
//!
//! ## Functions and aggregations
//! - Any `name(args)` call, with `by (...)` / `without (...)` before or after the arguments
//! - Number and string literal arguments: `histogram_quantile(0.95, ...)`
//!
//! ## Operators
//! - Arithmetic: `+ - * / % ^`
//! - Comparison and set: `== != > < >= <= and or unless`
//!
//! Arithmetic binds tighter than comparison. Operators of the same class
//! chain left to right.

pub mod builder;
pub mod error;
pub mod info;
pub mod lexer;
pub mod parser;
pub mod types;

pub use builder::{BuilderOptions, QueryBuilder};
pub use error::{LexError, ParseError, PromQLError, StateError, ValidationError};
pub use parser::{ParserOptions, parse, validate};
pub use types::{
    ArithmeticOp, ArithmeticOperation, BinaryOperation, ComparisonOp, Expr, Function, Grouping,
    LabelMatcher, MatcherOp, MetricSelector,
};
