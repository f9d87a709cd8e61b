//! XPath 1.0 values, conversions and errors.
//!
//! Conversions follow XPath 1.0 section 4: node-sets convert through the
//! string-value of their first node in document order, numbers format
//! without exponents, and string-to-number parsing accepts only the
//! `Number` production surrounded by whitespace.

use thiserror::Error;

use crate::tree::{NodeId, RawDocument};

/// Failures while compiling or evaluating an expression.
///
/// `Syntax` is the only compile-time variant; everything else is raised
/// while an expression runs against a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XPathError {
    #[error("XPath syntax error at offset {position}: {message}")]
    Syntax { message: String, position: usize },
    #[error("undefined namespace prefix '{0}'")]
    UnboundPrefix(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{function}' expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: &'static str,
        found: usize,
    },
    #[error("undefined variable '${0}'")]
    UndefinedVariable(String),
    #[error("{0} requires a node-set operand")]
    NotANodeSet(&'static str),
}

impl XPathError {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    /// Returns `true` for errors raised while compiling the expression.
    #[must_use]
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }
}

/// The result of evaluating an expression.
///
/// Node-sets hold engine handles in document order without duplicates.
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue {
    NodeSet(Vec<NodeId>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl XPathValue {
    /// The `boolean()` conversion.
    #[must_use]
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::NodeSet(nodes) => !nodes.is_empty(),
            Self::Boolean(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
        }
    }

    /// The `number()` conversion.
    #[must_use]
    pub fn to_number(&self, doc: &RawDocument) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Boolean(b) => f64::from(u8::from(*b)),
            Self::String(s) => parse_number(s),
            Self::NodeSet(_) => parse_number(&self.to_xpath_string(doc)),
        }
    }

    /// The `string()` conversion.
    #[must_use]
    pub fn to_xpath_string(&self, doc: &RawDocument) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::NodeSet(nodes) => nodes
                .first()
                .map(|&n| doc.string_value(n))
                .unwrap_or_default(),
        }
    }

    /// Name of the value's type, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NodeSet(_) => "node-set",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }
}

/// Formats a number the way `string()` does.
///
/// ```
/// use oxidom::xpath::types::format_number;
///
/// assert_eq!(format_number(3.0), "3");
/// assert_eq!(format_number(-0.0), "0");
/// assert_eq!(format_number(0.5), "0.5");
/// assert_eq!(format_number(f64::NAN), "NaN");
/// assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
/// ```
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        String::from(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        "0".to_string()
    } else {
        // f64's Display never switches to exponent notation.
        n.to_string()
    }
}

/// Parses a string the way `number()` does: optional whitespace, an
/// optional minus sign, digits with at most one decimal point. Anything
/// else is NaN.
///
/// ```
/// use oxidom::xpath::types::parse_number;
///
/// assert_eq!(parse_number(" 12.5 "), 12.5);
/// assert_eq!(parse_number("-.5"), -0.5);
/// assert!(parse_number("1e3").is_nan());
/// assert!(parse_number("").is_nan());
/// ```
#[must_use]
pub fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'));
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let mut seen_dot = false;
    let mut seen_digit = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return f64::NAN,
        }
    }
    if !seen_digit {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// XPath `round()`: halves round toward positive infinity, and values in
/// `[-0.5, 0)` round to negative zero.
#[must_use]
pub fn round_half_up(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() || n == 0.0 {
        return n;
    }
    if (-0.5..0.0).contains(&n) {
        return -0.0;
    }
    (n + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_boolean_conversion() {
        assert!(!XPathValue::Number(f64::NAN).to_boolean());
        assert!(!XPathValue::Number(0.0).to_boolean());
        assert!(XPathValue::Number(-2.0).to_boolean());
        assert!(!XPathValue::String(String::new()).to_boolean());
        assert!(XPathValue::String("false".into()).to_boolean());
        assert!(!XPathValue::NodeSet(Vec::new()).to_boolean());
    }

    #[test]
    fn test_number_conversion() {
        let doc = RawDocument::default();
        assert_eq!(XPathValue::Boolean(true).to_number(&doc), 1.0);
        assert_eq!(XPathValue::String("  42\n".into()).to_number(&doc), 42.0);
        assert!(XPathValue::NodeSet(Vec::new()).to_number(&doc).is_nan());
    }

    #[test]
    fn test_format_large_and_fractional() {
        assert_eq!(format_number(1e21), "1000000000000000000000");
        assert_eq!(format_number(-12.25), "-12.25");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn test_parse_rejects_non_numbers() {
        assert!(parse_number("+1").is_nan());
        assert!(parse_number("1.2.3").is_nan());
        assert!(parse_number(".").is_nan());
        assert!(parse_number("Infinity").is_nan());
        assert_eq!(parse_number("5."), 5.0);
    }

    #[test]
    fn test_round() {
        assert_eq!(round_half_up(2.5), 3.0);
        assert_eq!(round_half_up(-2.5), -2.0);
        assert_eq!(round_half_up(1.4), 1.0);
        let negative_zero = round_half_up(-0.25);
        assert_eq!(negative_zero, 0.0);
        assert!(negative_zero.is_sign_negative());
        assert!(round_half_up(f64::NAN).is_nan());
    }

    #[test]
    fn test_syntax_classification() {
        assert!(XPathError::syntax("x", 0).is_syntax());
        assert!(!XPathError::UnboundPrefix("p".into()).is_syntax());
    }
}
