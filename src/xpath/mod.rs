//! XPath 1.0 over the arena tree.
//!
//! [`parser::parse`] compiles an expression into an [`ast::Expr`];
//! [`Evaluator`] runs it against a [`RawDocument`] with a prefix map and
//! variable bindings. The DOM facade wraps both in `XPathExpression` and
//! `XPathContext`.
//!
//! ```
//! use oxidom::parser::parse_str;
//! use oxidom::xpath::{evaluate, XPathValue};
//!
//! let doc = parse_str("<root><a>1</a><a>2</a></root>").unwrap();
//! let value = evaluate(&doc, doc.root(), "sum(//a)").unwrap();
//! assert_eq!(value, XPathValue::Number(3.0));
//! ```

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod types;

use std::collections::HashMap;

pub use eval::Evaluator;
pub use types::{XPathError, XPathValue};

use crate::tree::{NodeId, RawDocument};

/// Compiles and evaluates `expression` with no prefix or variable bindings.
///
/// # Errors
///
/// Returns `XPathError` if the expression does not compile or fails to
/// evaluate.
pub fn evaluate(doc: &RawDocument, node: NodeId, expression: &str) -> Result<XPathValue, XPathError> {
    let expr = parser::parse(expression)?;
    let namespaces = HashMap::new();
    let variables = HashMap::new();
    Evaluator::new(doc, &namespaces, &variables).evaluate(&expr, node)
}
