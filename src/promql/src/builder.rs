//! Programmatic PromQL construction and modification
//!
//! A [`QueryBuilder`] holds a query as structured state: one metric
//! selector wrapped by an ordered list of functions, then arithmetic
//! operations, then comparison operations. Builders are created empty and
//! filled through the `with_*` mutators, or decomposed from existing query
//! text with [`QueryBuilder::parse`].
//!
//! ```
//! use promql::builder::QueryBuilder;
//!
//! let mut builder = QueryBuilder::new();
//! builder
//!     .with_metric("http_requests_total")?
//!     .with_label("status", "500")?
//!     .with_rate("5m")?;
//! assert_eq!(
//!     builder.build()?,
//!     r#"rate(http_requests_total{status="500"}[5m])"#
//! );
//! # Ok::<(), promql::error::PromQLError>(())
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, StateError, ValidationError};
use crate::info::{FunctionInfo, LabelInfo, OperationInfo, QueryInfo};
use crate::parser::{ParserOptions, parse_with};
use crate::types::{
    ArithmeticOp, ArithmeticOperation, BinaryOperation, ComparisonOp, Expr, Function,
    LabelMatcher, MatcherOp, MetricSelector, validate_duration, validate_identifier,
    validate_name,
};

/// Behaviour switches for [`QueryBuilder`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderOptions {
    /// Range window used by [`QueryBuilder::with_default_rate`]
    pub default_rate_window: String,
    /// Return the parsed text verbatim from `build()` until the first mutation
    pub preserve_raw_text: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            default_rate_window: "5m".to_string(),
            preserve_raw_text: true,
        }
    }
}

/// Nesting layers a query is decomposed into, outermost last
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Layer {
    Function,
    Arithmetic,
    Comparison,
}

/// Structured, mutable representation of a single PromQL query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    metric: Option<MetricSelector>,
    functions: Vec<Function>,
    arithmetic_ops: Vec<ArithmeticOperation>,
    binary_ops: Vec<BinaryOperation>,
    raw_text: Option<String>,
    decomposed: bool,
    options: BuilderOptions,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::with_options(BuilderOptions::default())
    }
}

impl QueryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: BuilderOptions) -> Self {
        Self {
            metric: None,
            functions: Vec::new(),
            arithmetic_ops: Vec::new(),
            binary_ops: Vec::new(),
            raw_text: None,
            decomposed: true,
            options,
        }
    }

    /// Parse query text into a builder using default options
    pub fn parse(query: &str) -> Result<Self, ParseError> {
        Self::parse_with(query, &ParserOptions::default(), BuilderOptions::default())
    }

    /// Parse query text into a builder
    ///
    /// The query is decomposed from the outside in: comparisons, then
    /// arithmetic, then functions down to the metric selector. Queries that
    /// do not fit that shape are decomposed as far as possible and keep
    /// their original text for `build()`.
    #[tracing::instrument(skip_all, fields(query_len = query.len()))]
    pub fn parse_with(
        query: &str,
        parser_options: &ParserOptions,
        options: BuilderOptions,
    ) -> Result<Self, ParseError> {
        log::debug!("Parsing PromQL query: {query}");
        let expr = parse_with(query, parser_options)?;

        let mut builder = Self::with_options(options);
        builder.decompose(&expr)?;
        builder.raw_text = Some(query.to_string());

        if builder.decomposed {
            log::debug!(
                "Decomposed query into {} functions, {} arithmetic and {} binary operations",
                builder.functions.len(),
                builder.arithmetic_ops.len(),
                builder.binary_ops.len()
            );
        } else {
            log::warn!("Query could only be partially decomposed, keeping raw text: {query}");
        }

        Ok(builder)
    }

    fn decompose(&mut self, expr: &Expr) -> Result<(), ParseError> {
        let mut node = expr;
        let mut layer = Layer::Comparison;

        let metric = loop {
            match node {
                Expr::Paren(inner) => node = inner.as_ref(),
                Expr::Comparison { lhs, op, rhs } if layer == Layer::Comparison => {
                    self.binary_ops
                        .push(BinaryOperation::new(*op, rhs.unparen().clone()));
                    node = lhs.as_ref();
                }
                Expr::Arithmetic { lhs, op, rhs } if layer >= Layer::Arithmetic => {
                    self.arithmetic_ops
                        .push(ArithmeticOperation::new(*op, rhs.unparen().clone()));
                    layer = Layer::Arithmetic;
                    node = lhs.as_ref();
                }
                Expr::Function(function) => {
                    let Some(spine) = function.args.iter().position(Expr::contains_selector)
                    else {
                        self.decomposed = false;
                        break None;
                    };
                    let mut template = function.clone();
                    template.args[spine] = Expr::Placeholder;
                    self.functions.push(template);
                    layer = Layer::Function;
                    node = &function.args[spine];
                }
                Expr::Selector(selector) => break Some(selector.clone()),
                _ => {
                    self.decomposed = false;
                    break None;
                }
            }
        };

        self.metric = match metric {
            Some(selector) => Some(selector),
            None => node
                .first_selector()
                .or_else(|| expr.first_selector())
                .cloned(),
        };
        if self.metric.is_none() {
            return Err(ParseError::NoMetric);
        }

        self.functions.reverse();
        self.arithmetic_ops.reverse();
        self.binary_ops.reverse();
        Ok(())
    }

    fn touch(&mut self) {
        if self.raw_text.take().is_some() && !self.decomposed {
            log::warn!(
                "Modifying a partially decomposed query, parts outside the builder structure are dropped"
            );
        }
    }

    fn metric_mut(&mut self) -> Result<&mut MetricSelector, ValidationError> {
        self.metric.as_mut().ok_or(ValidationError::NoMetric)
    }

    /// Select a metric, replacing the current selector and its labels
    pub fn with_metric(&mut self, name: &str) -> Result<&mut Self, ValidationError> {
        validate_name(name)?;
        self.metric = Some(MetricSelector::new(name));
        self.touch();
        Ok(self)
    }

    /// Add an equality label matcher
    pub fn with_label(&mut self, name: &str, value: &str) -> Result<&mut Self, ValidationError> {
        self.with_label_matcher(LabelMatcher::equal(name, value))
    }

    /// Add a label matcher with an explicit operator (`=`, `!=`, `=~`, `!~`)
    pub fn with_label_op(
        &mut self,
        name: &str,
        value: &str,
        op: &str,
    ) -> Result<&mut Self, ValidationError> {
        let op: MatcherOp = op.parse()?;
        self.with_label_matcher(LabelMatcher::new(name, op, value))
    }

    /// Add a label matcher, replacing any matcher on the same label
    pub fn with_label_matcher(
        &mut self,
        matcher: LabelMatcher,
    ) -> Result<&mut Self, ValidationError> {
        validate_identifier(&matcher.name)?;
        self.metric_mut()?.set_label(matcher);
        self.touch();
        Ok(self)
    }

    /// Set the range window, e.g. `5m`
    pub fn with_range(&mut self, window: &str) -> Result<&mut Self, ValidationError> {
        validate_duration(window)?;
        self.metric_mut()?.range_window = Some(window.to_string());
        self.touch();
        Ok(self)
    }

    /// Set the offset modifier, e.g. `1h`
    pub fn with_offset(&mut self, offset: &str) -> Result<&mut Self, ValidationError> {
        validate_duration(offset)?;
        self.metric_mut()?.offset = Some(offset.to_string());
        self.touch();
        Ok(self)
    }

    /// Apply a function to the query
    ///
    /// `$expr` arguments stand for the query built so far. A function that
    /// is already applied is replaced in place, keeping its position.
    pub fn with_function(&mut self, function: Function) -> Result<&mut Self, ValidationError> {
        function.validate()?;

        match self.functions.iter_mut().find(|f| f.name == function.name) {
            Some(existing) => *existing = function,
            None => self.functions.push(function),
        }
        self.touch();
        Ok(self)
    }

    /// Set the range window and wrap the query in `rate()`
    pub fn with_rate(&mut self, window: &str) -> Result<&mut Self, ValidationError> {
        self.with_range(window)?;
        self.with_function(Function::new("rate").arg(Expr::Placeholder))
    }

    /// [`with_rate`](Self::with_rate) using the configured default window
    pub fn with_default_rate(&mut self) -> Result<&mut Self, ValidationError> {
        let window = self.options.default_rate_window.clone();
        self.with_rate(&window)
    }

    /// Append a comparison or set operation
    pub fn with_binary_op(
        &mut self,
        op: &str,
        value: impl Into<Expr>,
    ) -> Result<&mut Self, ValidationError> {
        let op: ComparisonOp = op.parse()?;
        let value = value.into();
        value.validate_literals()?;
        self.binary_ops.push(BinaryOperation::new(op, value));
        self.touch();
        Ok(self)
    }

    /// Append an arithmetic operation
    pub fn with_arithmetic_op(
        &mut self,
        op: &str,
        value: impl Into<Expr>,
    ) -> Result<&mut Self, ValidationError> {
        let op: ArithmeticOp = op.parse()?;
        let value = value.into();
        value.validate_literals()?;
        self.arithmetic_ops.push(ArithmeticOperation::new(op, value));
        self.touch();
        Ok(self)
    }

    pub fn remove_label(&mut self, name: &str) -> &mut Self {
        if let Some(metric) = self.metric.as_mut() {
            metric.remove_label(name);
        }
        self.touch();
        self
    }

    pub fn remove_function(&mut self, name: &str) -> &mut Self {
        self.functions.retain(|f| f.name != name);
        self.touch();
        self
    }

    /// Remove the most recently added binary operation
    pub fn remove_binary_op(&mut self) -> &mut Self {
        self.binary_ops.pop();
        self.touch();
        self
    }

    /// Remove the most recently added arithmetic operation
    pub fn remove_arithmetic_op(&mut self) -> &mut Self {
        self.arithmetic_ops.pop();
        self.touch();
        self
    }

    pub fn remove_range(&mut self) -> &mut Self {
        if let Some(metric) = self.metric.as_mut() {
            metric.range_window = None;
        }
        self.touch();
        self
    }

    pub fn remove_offset(&mut self) -> &mut Self {
        if let Some(metric) = self.metric.as_mut() {
            metric.offset = None;
        }
        self.touch();
        self
    }

    /// Compose the structured state into a single expression
    pub fn to_expr(&self) -> Result<Expr, StateError> {
        let metric = self.metric.as_ref().ok_or(StateError::NoMetric)?;
        let mut current = Expr::Selector(metric.clone());

        for function in &self.functions {
            current = if function.name == "rate" && metric.range_window.is_some() {
                Expr::Function(Function::new("rate").arg(current))
            } else {
                Expr::Function(function.clone()).substitute(&current)
            };
        }

        for operation in &self.arithmetic_ops {
            current = Expr::paren(Expr::arithmetic(
                current,
                operation.op,
                operation.value.clone(),
            ));
        }

        for operation in &self.binary_ops {
            current = Expr::paren(Expr::comparison(
                current,
                operation.op,
                operation.right.clone(),
            ));
        }

        Ok(current)
    }

    /// Render the structured state, ignoring any preserved raw text
    pub fn render(&self) -> Result<String, StateError> {
        self.to_expr().map(|expr| expr.to_string())
    }

    /// Produce the query text
    ///
    /// A freshly parsed, unmodified builder returns its input verbatim when
    /// `preserve_raw_text` is enabled.
    pub fn build(&self) -> Result<String, StateError> {
        if self.metric.is_none() {
            return Err(StateError::NoMetric);
        }
        match &self.raw_text {
            Some(raw) if self.options.preserve_raw_text => Ok(raw.clone()),
            _ => self.render(),
        }
    }

    pub fn metric_name(&self) -> Option<&str> {
        self.metric.as_ref().map(|m| m.name.as_str())
    }

    pub fn metric(&self) -> Option<&MetricSelector> {
        self.metric.as_ref()
    }

    pub fn labels(&self) -> &[LabelMatcher] {
        match &self.metric {
            Some(metric) => &metric.labels,
            None => &[],
        }
    }

    /// Label values by name, without their operators
    pub fn label_values(&self) -> BTreeMap<String, String> {
        self.labels()
            .iter()
            .map(|l| (l.name.clone(), l.value.clone()))
            .collect()
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn range_window(&self) -> Option<&str> {
        self.metric.as_ref()?.range_window.as_deref()
    }

    pub fn offset(&self) -> Option<&str> {
        self.metric.as_ref()?.offset.as_deref()
    }

    pub fn binary_ops(&self) -> &[BinaryOperation] {
        &self.binary_ops
    }

    pub fn arithmetic_ops(&self) -> &[ArithmeticOperation] {
        &self.arithmetic_ops
    }

    /// The parsed input, present until the first mutation
    pub fn raw_text(&self) -> Option<&str> {
        self.raw_text.as_deref()
    }

    /// Whether the structured state fully represented the parsed query
    ///
    /// Stays `false` after mutating a partially decomposed builder: the
    /// parts the structure could not hold are gone from the rendered query.
    pub fn is_decomposed(&self) -> bool {
        self.decomposed
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    /// Snapshot of the builder state for display or serialization
    pub fn info(&self) -> QueryInfo {
        QueryInfo {
            metric_name: self.metric_name().map(str::to_string),
            labels: self
                .labels()
                .iter()
                .map(|l| LabelInfo {
                    name: l.name.clone(),
                    value: l.value.clone(),
                    operator: l.op.to_string(),
                })
                .collect(),
            range_window: self.range_window().map(str::to_string),
            offset: self.offset().map(str::to_string),
            functions: self
                .functions
                .iter()
                .map(|f| FunctionInfo {
                    name: f.name.clone(),
                    args: f.args.iter().map(ToString::to_string).collect(),
                    group_by: f.by_labels().to_vec(),
                    without: f.without_labels().to_vec(),
                })
                .collect(),
            arithmetic_ops: self
                .arithmetic_ops
                .iter()
                .map(|o| OperationInfo {
                    operator: o.op.to_string(),
                    value: o.value.to_string(),
                })
                .collect(),
            binary_ops: self
                .binary_ops
                .iter()
                .map(|o| OperationInfo {
                    operator: o.op.to_string(),
                    value: o.right.to_string(),
                })
                .collect(),
            full_query: self.render().ok(),
            raw_text: self.raw_text.clone(),
            decomposed: self.decomposed,
        }
    }
}
