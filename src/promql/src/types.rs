//! PromQL expression types
//!
//! The value objects that make up a parsed or built query: label matchers,
//! metric selectors, function calls, and the [`Expr`] tree tying them
//! together. Every type renders back to query text through `Display`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Units accepted at the end of a duration literal
pub const DURATION_UNITS: [char; 6] = ['s', 'm', 'h', 'd', 'w', 'y'];

/// Check that a string is a duration of the form `<digits><unit>`, e.g. `5m`
pub fn is_valid_duration(duration: &str) -> bool {
    let Some(unit) = duration.chars().last() else {
        return false;
    };
    let digits = &duration[..duration.len() - unit.len_utf8()];
    DURATION_UNITS.contains(&unit)
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
}

/// Validate a duration, returning it unchanged on success
pub fn validate_duration(duration: &str) -> Result<&str, ValidationError> {
    if is_valid_duration(duration) {
        Ok(duration)
    } else {
        Err(ValidationError::InvalidDuration(duration.to_string()))
    }
}

pub(crate) fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

/// Check that a string is a metric, label or function name
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => is_identifier_start(first) && chars.all(is_identifier_char),
        None => false,
    }
}

/// Words the lexer turns into keyword tokens
pub const KEYWORDS: [&str; 6] = ["by", "without", "offset", "and", "or", "unless"];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Validate an identifier, returning it unchanged on success
///
/// Keywords pass: they are valid label names.
pub fn validate_identifier(name: &str) -> Result<&str, ValidationError> {
    if is_valid_identifier(name) {
        Ok(name)
    } else {
        Err(ValidationError::InvalidIdentifier(name.to_string()))
    }
}

/// Validate a metric or function name, which unlike a label name cannot be
/// a keyword
pub fn validate_name(name: &str) -> Result<&str, ValidationError> {
    if is_keyword(name) {
        return Err(ValidationError::InvalidIdentifier(name.to_string()));
    }
    validate_identifier(name)
}

/// Validate a number operand, rejecting values with no PromQL literal
pub fn validate_number(value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::NonFiniteNumber(value.to_string()))
    }
}

/// Write a string literal in double quotes, escaping what the lexer unescapes
fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in value.chars() {
        if c == '"' || c == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("\"")
}

/// Label matcher types matching Prometheus semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatcherOp {
    /// Exact string match (=)
    Equal,
    /// Not equal (!=)
    NotEqual,
    /// Regex match (=~)
    RegexMatch,
    /// Regex not match (!~)
    RegexNotMatch,
}

impl MatcherOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::RegexMatch => "=~",
            Self::RegexNotMatch => "!~",
        }
    }
}

impl fmt::Display for MatcherOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatcherOp {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            "=~" => Ok(Self::RegexMatch),
            "!~" => Ok(Self::RegexNotMatch),
            other => Err(ValidationError::InvalidLabelOperator(other.to_string())),
        }
    }
}

/// A single label matcher
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelMatcher {
    /// Label name
    pub name: String,
    /// Match operation
    pub op: MatcherOp,
    /// Value to match against
    pub value: String,
}

impl LabelMatcher {
    pub fn new(name: &str, op: MatcherOp, value: &str) -> Self {
        Self {
            name: name.to_string(),
            op,
            value: value.to_string(),
        }
    }

    /// Create a new equality matcher
    pub fn equal(name: &str, value: &str) -> Self {
        Self::new(name, MatcherOp::Equal, value)
    }

    /// Create a new not-equal matcher
    pub fn not_equal(name: &str, value: &str) -> Self {
        Self::new(name, MatcherOp::NotEqual, value)
    }

    /// Create a new regex matcher
    pub fn regex_match(name: &str, pattern: &str) -> Self {
        Self::new(name, MatcherOp::RegexMatch, pattern)
    }

    /// Create a new regex not-match matcher
    pub fn regex_not_match(name: &str, pattern: &str) -> Self {
        Self::new(name, MatcherOp::RegexNotMatch, pattern)
    }
}

impl fmt::Display for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.op)?;
        write_quoted(f, &self.value)
    }
}

/// A metric selector: name, label matchers, optional range window and offset
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricSelector {
    pub name: String,
    /// Matchers in insertion order, unique by label name
    pub labels: Vec<LabelMatcher>,
    pub range_window: Option<String>,
    pub offset: Option<String>,
}

impl MetricSelector {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            labels: Vec::new(),
            range_window: None,
            offset: None,
        }
    }

    /// Add a label matcher to this selector
    pub fn with_label(mut self, matcher: LabelMatcher) -> Self {
        self.set_label(matcher);
        self
    }

    /// Insert a matcher, replacing any existing matcher on the same label.
    /// The new matcher always ends up last.
    pub fn set_label(&mut self, matcher: LabelMatcher) {
        self.remove_label(&matcher.name);
        self.labels.push(matcher);
    }

    /// Remove the matcher on `name`, returning whether one was present
    pub fn remove_label(&mut self, name: &str) -> bool {
        let before = self.labels.len();
        self.labels.retain(|l| l.name != name);
        self.labels.len() != before
    }

    /// Get the matcher on a label by name
    pub fn label(&self, name: &str) -> Option<&LabelMatcher> {
        self.labels.iter().find(|l| l.name == name)
    }
}

impl fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.labels.is_empty() {
            f.write_str("{")?;
            for (i, label) in self.labels.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{label}")?;
            }
            f.write_str("}")?;
        }
        if let Some(range) = &self.range_window {
            write!(f, "[{range}]")?;
        }
        if let Some(offset) = &self.offset {
            write!(f, " offset {offset}")?;
        }
        Ok(())
    }
}

/// A `by (...)` or `without (...)` clause on an aggregation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Grouping {
    By(Vec<String>),
    Without(Vec<String>),
}

impl Grouping {
    pub fn by<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::By(labels.into_iter().map(Into::into).collect())
    }

    pub fn without<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Without(labels.into_iter().map(Into::into).collect())
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::By(_) => "by",
            Self::Without(_) => "without",
        }
    }

    pub fn labels(&self) -> &[String] {
        match self {
            Self::By(labels) | Self::Without(labels) => labels,
        }
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.keyword(), self.labels().join(", "))
    }
}

/// A function or aggregation call
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub args: Vec<Expr>,
    pub grouping: Option<Grouping>,
}

impl Function {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: Vec::new(),
            grouping: None,
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<Expr>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Expr>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Group by the given labels, replacing any previous grouping
    pub fn by<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grouping = Some(Grouping::by(labels));
        self
    }

    /// Aggregate away the given labels, replacing any previous grouping
    pub fn without<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grouping = Some(Grouping::without(labels));
        self
    }

    pub fn by_labels(&self) -> &[String] {
        match &self.grouping {
            Some(Grouping::By(labels)) => labels,
            _ => &[],
        }
    }

    pub fn without_labels(&self) -> &[String] {
        match &self.grouping {
            Some(Grouping::Without(labels)) => labels,
            _ => &[],
        }
    }

    /// Check the name, grouping labels and arguments
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        for label in self.grouping.iter().flat_map(Grouping::labels) {
            validate_identifier(label)?;
        }
        self.args.iter().try_for_each(Expr::validate_literals)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")?;
        if let Some(grouping) = &self.grouping {
            write!(f, " {grouping}")?;
        }
        Ok(())
    }
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl ArithmeticOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "^",
        }
    }
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArithmeticOp {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Self::Add),
            "-" => Ok(Self::Sub),
            "*" => Ok(Self::Mul),
            "/" => Ok(Self::Div),
            "%" => Ok(Self::Mod),
            "^" => Ok(Self::Pow),
            other => Err(ValidationError::InvalidArithmeticOperator(
                other.to_string(),
            )),
        }
    }
}

/// Comparison and set operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    And,
    Or,
    Unless,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
            Self::And => "and",
            Self::Or => "or",
            Self::Unless => "unless",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonOp {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            ">" => Ok(Self::Greater),
            "<" => Ok(Self::Less),
            ">=" => Ok(Self::GreaterEqual),
            "<=" => Ok(Self::LessEqual),
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            "unless" => Ok(Self::Unless),
            other => Err(ValidationError::InvalidComparisonOperator(
                other.to_string(),
            )),
        }
    }
}

/// An arithmetic operation applied to the accumulated builder expression
#[derive(Debug, Clone, PartialEq)]
pub struct ArithmeticOperation {
    pub op: ArithmeticOp,
    pub value: Expr,
}

impl ArithmeticOperation {
    pub fn new(op: ArithmeticOp, value: impl Into<Expr>) -> Self {
        Self {
            op,
            value: value.into(),
        }
    }

    /// Whether the right-hand side is a plain number
    pub fn is_scalar(&self) -> bool {
        self.value.is_scalar()
    }
}

impl fmt::Display for ArithmeticOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.value)
    }
}

/// A comparison or set operation applied to the accumulated builder expression
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOperation {
    pub op: ComparisonOp,
    pub right: Expr,
}

impl BinaryOperation {
    pub fn new(op: ComparisonOp, right: impl Into<Expr>) -> Self {
        Self {
            op,
            right: right.into(),
        }
    }
}

impl fmt::Display for BinaryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.right)
    }
}

/// A PromQL expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    /// `$expr`: stands for the expression accumulated so far while rendering
    Placeholder,
    Selector(MetricSelector),
    Function(Function),
    Paren(Box<Expr>),
    Arithmetic {
        lhs: Box<Expr>,
        op: ArithmeticOp,
        rhs: Box<Expr>,
    },
    Comparison {
        lhs: Box<Expr>,
        op: ComparisonOp,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Text used for the placeholder argument
    pub const PLACEHOLDER: &'static str = "$expr";

    pub fn paren(inner: Expr) -> Self {
        Self::Paren(Box::new(inner))
    }

    pub fn arithmetic(lhs: Expr, op: ArithmeticOp, rhs: Expr) -> Self {
        Self::Arithmetic {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    pub fn comparison(lhs: Expr, op: ComparisonOp, rhs: Expr) -> Self {
        Self::Comparison {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    fn is_binary(&self) -> bool {
        matches!(self, Self::Arithmetic { .. } | Self::Comparison { .. })
    }

    /// Strip any parentheses wrapping this expression
    pub fn unparen(&self) -> &Expr {
        let mut expr = self;
        while let Self::Paren(inner) = expr {
            expr = inner;
        }
        expr
    }

    /// Check that every number and name in the tree can be written as query
    /// text that parses back
    pub fn validate_literals(&self) -> Result<(), ValidationError> {
        match self {
            Self::Number(n) => validate_number(*n).map(|_| ()),
            Self::String(_) | Self::Placeholder => Ok(()),
            Self::Selector(selector) => {
                validate_name(&selector.name)?;
                for label in &selector.labels {
                    validate_identifier(&label.name)?;
                }
                Ok(())
            }
            Self::Function(function) => function.validate(),
            Self::Paren(inner) => inner.validate_literals(),
            Self::Arithmetic { lhs, rhs, .. } | Self::Comparison { lhs, rhs, .. } => {
                lhs.validate_literals()?;
                rhs.validate_literals()
            }
        }
    }

    /// Find the first metric selector, depth first, left to right
    pub fn first_selector(&self) -> Option<&MetricSelector> {
        match self {
            Self::Selector(selector) => Some(selector),
            Self::Function(function) => function.args.iter().find_map(Expr::first_selector),
            Self::Paren(inner) => inner.first_selector(),
            Self::Arithmetic { lhs, rhs, .. } | Self::Comparison { lhs, rhs, .. } => {
                lhs.first_selector().or_else(|| rhs.first_selector())
            }
            Self::Number(_) | Self::String(_) | Self::Placeholder => None,
        }
    }

    pub fn contains_selector(&self) -> bool {
        self.first_selector().is_some()
    }

    /// Return a copy of this tree with every placeholder replaced
    pub fn substitute(&self, replacement: &Expr) -> Expr {
        match self {
            Self::Placeholder => replacement.clone(),
            Self::Function(function) => Self::Function(Function {
                name: function.name.clone(),
                args: function
                    .args
                    .iter()
                    .map(|arg| arg.substitute(replacement))
                    .collect(),
                grouping: function.grouping.clone(),
            }),
            Self::Paren(inner) => Self::paren(inner.substitute(replacement)),
            Self::Arithmetic { lhs, op, rhs } => Self::arithmetic(
                lhs.substitute(replacement),
                *op,
                rhs.substitute(replacement),
            ),
            Self::Comparison { lhs, op, rhs } => Self::comparison(
                lhs.substitute(replacement),
                *op,
                rhs.substitute(replacement),
            ),
            Self::Number(_) | Self::String(_) | Self::Selector(_) => self.clone(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write_quoted(f, s),
            Self::Placeholder => f.write_str(Self::PLACEHOLDER),
            Self::Selector(selector) => write!(f, "{selector}"),
            Self::Function(function) => write!(f, "{function}"),
            Self::Paren(inner) => write!(f, "({inner})"),
            Self::Arithmetic { lhs, op, rhs } => {
                // Operators chain left to right, so only a comparison on the
                // left or any operation on the right needs explicit parentheses.
                if matches!(**lhs, Self::Comparison { .. }) {
                    write!(f, "({lhs})")?;
                } else {
                    write!(f, "{lhs}")?;
                }
                write!(f, " {op} ")?;
                write_operand(f, rhs)
            }
            Self::Comparison { lhs, op, rhs } => {
                // Arithmetic binds tighter, so only a nested comparison on the
                // right needs parentheses.
                if matches!(**rhs, Self::Comparison { .. }) {
                    write!(f, "{lhs} {op} ({rhs})")
                } else {
                    write!(f, "{lhs} {op} {rhs}")
                }
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Expr) -> fmt::Result {
    if operand.is_binary() {
        write!(f, "({operand})")
    } else {
        write!(f, "{operand}")
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Expr {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Expr {
    /// `"$expr"` becomes the placeholder, anything else a string literal
    fn from(s: &str) -> Self {
        if s == Self::PLACEHOLDER {
            Self::Placeholder
        } else {
            Self::String(s.to_string())
        }
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<MetricSelector> for Expr {
    fn from(selector: MetricSelector) -> Self {
        Self::Selector(selector)
    }
}

impl From<Function> for Expr {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_validation() {
        for valid in ["5m", "30s", "1h", "7d", "2w", "1y", "100s"] {
            assert!(is_valid_duration(valid), "{valid} should be valid");
        }
        for invalid in ["5x", "m", "", "5", "1.5m", "5mm", "-5m", "5 m"] {
            assert!(!is_valid_duration(invalid), "{invalid} should be invalid");
        }
        assert_eq!(
            validate_duration("5x"),
            Err(ValidationError::InvalidDuration("5x".to_string()))
        );
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("http_requests_total"));
        assert!(is_valid_identifier("job:rate5m:sum"));
        assert!(is_valid_identifier("_private"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("5xx"));
        assert!(!is_valid_identifier("has space"));
        assert!(!is_valid_identifier("dash-name"));
        assert!(is_keyword("unless"));
        assert!(!is_keyword("up"));
    }

    #[test]
    fn test_label_matcher_display() {
        assert_eq!(format!("{}", MatcherOp::Equal), "=");
        assert_eq!(format!("{}", MatcherOp::NotEqual), "!=");
        assert_eq!(format!("{}", MatcherOp::RegexMatch), "=~");
        assert_eq!(format!("{}", MatcherOp::RegexNotMatch), "!~");

        assert_eq!(
            LabelMatcher::regex_match("status", "5..").to_string(),
            r#"status=~"5..""#
        );
        assert_eq!(
            LabelMatcher::equal("path", r#"say "hi"\now"#).to_string(),
            r#"path="say \"hi\"\\now""#
        );
    }

    #[test]
    fn test_matcher_op_from_str() {
        assert_eq!("!~".parse::<MatcherOp>(), Ok(MatcherOp::RegexNotMatch));
        assert_eq!(
            "==".parse::<MatcherOp>(),
            Err(ValidationError::InvalidLabelOperator("==".to_string()))
        );
    }

    #[test]
    fn test_selector_label_dedup() {
        let selector = MetricSelector::new("up")
            .with_label(LabelMatcher::equal("job", "api"))
            .with_label(LabelMatcher::equal("env", "prod"))
            .with_label(LabelMatcher::not_equal("job", "web"));

        assert_eq!(selector.labels.len(), 2);
        assert_eq!(selector.labels[1], LabelMatcher::not_equal("job", "web"));
        assert_eq!(selector.to_string(), r#"up{env="prod",job!="web"}"#);
    }

    #[test]
    fn test_selector_display_order() {
        let mut selector = MetricSelector::new("http_requests_total")
            .with_label(LabelMatcher::equal("status", "500"));
        selector.range_window = Some("5m".to_string());
        selector.offset = Some("1h".to_string());
        assert_eq!(
            selector.to_string(),
            r#"http_requests_total{status="500"}[5m] offset 1h"#
        );
    }

    #[test]
    fn test_function_display_with_grouping() {
        let function = Function::new("sum")
            .arg(Expr::Placeholder)
            .by(["job", "instance"]);
        assert_eq!(function.to_string(), "sum($expr) by (job, instance)");
        assert_eq!(function.by_labels(), ["job", "instance"]);
        assert!(function.without_labels().is_empty());

        let function = function.without(["pod"]);
        assert!(function.by_labels().is_empty());
        assert_eq!(function.to_string(), "sum($expr) without (pod)");
    }

    #[test]
    fn test_operator_round_trip_through_from_str() {
        for op in ["+", "-", "*", "/", "%", "^"] {
            assert_eq!(op.parse::<ArithmeticOp>().unwrap().as_str(), op);
        }
        for op in ["==", "!=", ">", "<", ">=", "<=", "and", "or", "unless"] {
            assert_eq!(op.parse::<ComparisonOp>().unwrap().as_str(), op);
        }
        assert!("=".parse::<ComparisonOp>().is_err());
        assert!("**".parse::<ArithmeticOp>().is_err());
    }

    #[test]
    fn test_expr_display_parenthesizes_operands() {
        let x = Expr::Selector(MetricSelector::new("x"));
        let y = Expr::Selector(MetricSelector::new("y"));

        let chained = Expr::arithmetic(
            Expr::arithmetic(x.clone(), ArithmeticOp::Add, y.clone()),
            ArithmeticOp::Mul,
            Expr::Number(2.0),
        );
        assert_eq!(chained.to_string(), "x + y * 2");

        let nested_rhs = Expr::arithmetic(
            x.clone(),
            ArithmeticOp::Add,
            Expr::arithmetic(y, ArithmeticOp::Mul, Expr::Number(2.0)),
        );
        assert_eq!(nested_rhs.to_string(), "x + (y * 2)");

        let compared_then_scaled = Expr::arithmetic(
            Expr::comparison(x, ComparisonOp::Greater, Expr::Number(1.0)),
            ArithmeticOp::Mul,
            Expr::Number(0.5),
        );
        assert_eq!(compared_then_scaled.to_string(), "(x > 1) * 0.5");
    }

    #[test]
    fn test_comparison_keeps_arithmetic_operand_bare() {
        let x = Expr::Selector(MetricSelector::new("x"));
        let y = Expr::Selector(MetricSelector::new("y"));

        let expr = Expr::comparison(
            x.clone(),
            ComparisonOp::Greater,
            Expr::arithmetic(y.clone(), ArithmeticOp::Add, Expr::Number(1.0)),
        );
        assert_eq!(expr.to_string(), "x > y + 1");

        let nested = Expr::comparison(
            x,
            ComparisonOp::And,
            Expr::comparison(y, ComparisonOp::Less, Expr::Number(1.0)),
        );
        assert_eq!(nested.to_string(), "x and (y < 1)");
    }

    #[test]
    fn test_unparen_strips_all_layers() {
        let x = Expr::Selector(MetricSelector::new("x"));
        let wrapped = Expr::paren(Expr::paren(x.clone()));
        assert_eq!(wrapped.unparen(), &x);
        assert_eq!(x.unparen(), &x);
    }

    #[test]
    fn test_keywords_are_not_metric_names() {
        for keyword in KEYWORDS {
            assert!(validate_identifier(keyword).is_ok());
            assert_eq!(
                validate_name(keyword),
                Err(ValidationError::InvalidIdentifier(keyword.to_string()))
            );
        }
        assert_eq!(validate_name("android"), Ok("android"));
    }

    #[test]
    fn test_validate_literals() {
        assert!(Expr::Number(-1.0).validate_literals().is_ok());
        assert_eq!(
            Expr::Number(f64::NAN).validate_literals(),
            Err(ValidationError::NonFiniteNumber("NaN".to_string()))
        );
        assert!(
            Expr::arithmetic(
                Expr::Selector(MetricSelector::new("x")),
                ArithmeticOp::Mul,
                Expr::Number(f64::INFINITY),
            )
            .validate_literals()
            .is_err()
        );
        assert!(
            Expr::Function(Function::new("abs").arg(MetricSelector::new("or")))
                .validate_literals()
                .is_err()
        );
        assert!(
            Expr::Selector(MetricSelector::new("up").with_label(LabelMatcher::equal("by", "x")))
                .validate_literals()
                .is_ok()
        );
    }

    #[test]
    fn test_substitute_reaches_nested_arguments() {
        let template = Expr::Function(
            Function::new("histogram_quantile")
                .arg(0.95)
                .arg(Function::new("sum").arg("$expr").by(["le"])),
        );
        let inner = Expr::Selector(MetricSelector::new("latency_bucket"));
        assert_eq!(
            template.substitute(&inner).to_string(),
            "histogram_quantile(0.95, sum(latency_bucket) by (le))"
        );
    }

    #[test]
    fn test_first_selector_skips_literal_arguments() {
        let expr = Expr::arithmetic(
            Expr::Function(Function::new("vector").arg(1)),
            ArithmeticOp::Add,
            Expr::Selector(MetricSelector::new("b")),
        );
        assert_eq!(expr.first_selector().map(|s| s.name.as_str()), Some("b"));
        assert!(!Expr::Number(1.0).contains_selector());
    }

    #[test]
    fn test_placeholder_conversion() {
        assert_eq!(Expr::from("$expr"), Expr::Placeholder);
        assert_eq!(Expr::from("le"), Expr::String("le".to_string()));
        assert_eq!(Expr::from(5), Expr::Number(5.0));
        assert_eq!(Expr::from(5).to_string(), "5");
        assert_eq!(Expr::from(0.5).to_string(), "0.5");
    }
}
