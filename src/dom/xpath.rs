//! XPath contexts, compiled expressions and results.
//!
//! An [`XPathContext`] binds a context node plus prefix and variable
//! bindings; an [`XPathExpression`] is a compiled expression that can be
//! shared across contexts and threads; an [`XPathObject`] is one result.
//!
//! Node-set results hold engine handles borrowed from the document, not
//! copies: the nodes extracted from a result stay valid after the result is
//! freed, and become invalid when the document is.
//!
//! ```
//! use oxidom::dom::{Document, XPathContext, XPathObjectType};
//!
//! let doc = Document::parse_str("<r xmlns:p='urn:p'><p:i>1</p:i><p:i>2</p:i></r>").unwrap();
//! let mut ctx = XPathContext::new(&doc).unwrap();
//! ctx.register_ns("q", "urn:p").unwrap();
//!
//! let sum = ctx.evaluate("sum(//q:i)").unwrap();
//! assert_eq!(sum.object_type(), XPathObjectType::Number);
//! assert_eq!(sum.number_value().unwrap(), 3.0);
//! assert_eq!(ctx.evaluate("//q:i").unwrap().node_list().unwrap().len(), 2);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::rc::Weak;
use std::sync::Arc;

use tracing::{debug, trace};

use super::dispatch;
use super::document::DocumentCell;
use super::list::NodeList;
use super::node::{check_ncname, DomNode, NodeHandle};
use crate::error::{DomError, Result};
use crate::tree::NodeId;
use crate::xpath::ast::Expr;
use crate::xpath::eval::describe;
use crate::xpath::types::{format_number, parse_number};
use crate::xpath::{parser, Evaluator, XPathValue};

/// A compiled XPath expression.
#[derive(Debug, Clone)]
pub struct XPathExpression {
    source: String,
    expr: Arc<Expr>,
}

impl XPathExpression {
    /// # Errors
    ///
    /// Returns [`DomError::XPathSyntax`] for a malformed expression.
    pub fn compile(source: &str) -> Result<Self> {
        let expr = parser::parse(source)?;
        trace!(expression = source, "compiled xpath");
        Ok(Self {
            source: source.to_string(),
            expr: Arc::new(expr),
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for XPathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Evaluation state: the context node, registered prefixes and variables.
///
/// Prefix bindings apply to every later evaluation until overwritten.
/// Prefixes used in expressions resolve only through these bindings (and
/// the built-in `xml` prefix), never through declarations in the document.
#[derive(Debug)]
pub struct XPathContext {
    doc: Weak<DocumentCell>,
    node: NodeId,
    namespaces: HashMap<String, String>,
    variables: HashMap<String, XPathValue>,
    freed: bool,
}

impl XPathContext {
    /// Creates a context with `node` as the context node.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] if the owning document is released.
    pub fn new(node: &dyn DomNode) -> Result<Self> {
        Self::for_handle(node.handle())
    }

    pub(crate) fn for_handle(handle: &NodeHandle) -> Result<Self> {
        if !handle.is_alive() {
            return Err(DomError::UseAfterFree);
        }
        Ok(Self {
            doc: handle.document().clone(),
            node: handle.id(),
            namespaces: HashMap::new(),
            variables: HashMap::new(),
            freed: false,
        })
    }

    /// Moves the context to another node, possibly in another document.
    /// Variables holding node-sets of the previous document are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] if this context or the node's
    /// document is released.
    pub fn set_context_node(&mut self, node: &dyn DomNode) -> Result<()> {
        self.check_live()?;
        let handle = node.handle();
        if !handle.is_alive() {
            return Err(DomError::UseAfterFree);
        }
        if !Weak::ptr_eq(&self.doc, handle.document()) {
            self.variables
                .retain(|_, value| !matches!(value, XPathValue::NodeSet(_)));
            self.doc = handle.document().clone();
        }
        self.node = handle.id();
        Ok(())
    }

    /// Binds `prefix` to `uri` for later evaluations, replacing any
    /// previous binding. An empty `uri` removes the binding.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidArgument`] if `prefix` is not an NCName.
    pub fn register_ns(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.check_live()?;
        check_ncname(prefix).map_err(|_| DomError::invalid(format!("invalid prefix '{prefix}'")))?;
        if uri.is_empty() {
            self.namespaces.remove(prefix);
        } else {
            self.namespaces.insert(prefix.to_string(), uri.to_string());
        }
        Ok(())
    }

    /// The URI registered for `prefix`.
    #[must_use]
    pub fn lookup_namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    /// Binds `$name` to the value of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] if `value` was freed and
    /// [`DomError::InvalidArgument`] for a node-set from another document.
    pub fn set_variable(&mut self, name: &str, value: &XPathObject) -> Result<()> {
        self.check_live()?;
        let inner = value.value()?;
        if matches!(inner, XPathValue::NodeSet(_)) && !Weak::ptr_eq(&self.doc, &value.doc) {
            return Err(DomError::invalid("node-set belongs to another document"));
        }
        self.variables.insert(name.to_string(), inner.clone());
        Ok(())
    }

    /// Compiles and evaluates `expression`.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::XPathSyntax`] for a malformed expression,
    /// [`DomError::XPathEval`] when evaluation fails, and
    /// [`DomError::UseAfterFree`] if the context or document is released.
    pub fn evaluate(&self, expression: &str) -> Result<XPathObject> {
        self.check_live()?;
        self.evaluate_compiled(&XPathExpression::compile(expression)?)
    }

    /// Evaluates a compiled expression.
    ///
    /// # Errors
    ///
    /// As [`evaluate`](Self::evaluate), minus syntax errors.
    pub fn evaluate_compiled(&self, expression: &XPathExpression) -> Result<XPathObject> {
        self.check_live()?;
        let cell = self.doc.upgrade().ok_or(DomError::UseAfterFree)?;
        let value = cell.with_raw(|raw| {
            Evaluator::new(raw, &self.namespaces, &self.variables).evaluate(&expression.expr, self.node)
        })??;
        debug!(
            expression = expression.as_str(),
            result = %describe(&value),
            "evaluated xpath"
        );
        Ok(XPathObject {
            value: Some(value),
            doc: self.doc.clone(),
            force_literal: false,
        })
    }

    /// Drops all bindings. Later calls fail with [`DomError::UseAfterFree`].
    pub fn free(&mut self) {
        self.freed = true;
        self.namespaces.clear();
        self.variables.clear();
    }

    fn check_live(&self) -> Result<()> {
        if self.freed {
            Err(DomError::UseAfterFree)
        } else {
            Ok(())
        }
    }
}

/// Result type tags, numbered as in libxml2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum XPathObjectType {
    Undefined = 0,
    NodeSet = 1,
    Boolean = 2,
    Number = 3,
    String = 4,
    Point = 5,
    Range = 6,
    LocationSet = 7,
    Users = 8,
    XsltTree = 9,
}

/// The result of an evaluation.
#[derive(Debug, Clone)]
pub struct XPathObject {
    value: Option<XPathValue>,
    doc: Weak<DocumentCell>,
    /// When set, [`string_value`](Self::string_value) of a node-set joins
    /// the nodes' literal values instead of their markup.
    pub force_literal: bool,
}

impl XPathObject {
    /// `Undefined` once freed.
    #[must_use]
    pub fn object_type(&self) -> XPathObjectType {
        match &self.value {
            None => XPathObjectType::Undefined,
            Some(XPathValue::NodeSet(_)) => XPathObjectType::NodeSet,
            Some(XPathValue::Boolean(_)) => XPathObjectType::Boolean,
            Some(XPathValue::Number(_)) => XPathObjectType::Number,
            Some(XPathValue::String(_)) => XPathObjectType::String,
        }
    }

    /// The matched nodes in document order.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidArgument`] if the result is not a
    /// node-set and [`DomError::UseAfterFree`] if it or its document was
    /// released.
    pub fn node_list(&self) -> Result<NodeList> {
        match self.value()? {
            XPathValue::NodeSet(ids) => {
                let cell = self.doc.upgrade().ok_or(DomError::UseAfterFree)?;
                cell.with_raw(|raw| {
                    ids.iter()
                        .map(|&id| dispatch::wrap(&self.doc, raw, id))
                        .collect::<Result<NodeList>>()
                })?
            }
            other => Err(DomError::invalid(format!(
                "result is a {}, not a node-set",
                other.type_name()
            ))),
        }
    }

    /// The `boolean()` conversion of the result.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once freed.
    pub fn bool_value(&self) -> Result<bool> {
        Ok(self.value()?.to_boolean())
    }

    /// The `number()` conversion of the result.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once freed, or for a node-set
    /// whose document was released.
    pub fn number_value(&self) -> Result<f64> {
        match self.value()? {
            XPathValue::Number(n) => Ok(*n),
            XPathValue::Boolean(b) => Ok(f64::from(u8::from(*b))),
            XPathValue::String(s) => Ok(parse_number(s)),
            nodes @ XPathValue::NodeSet(_) => {
                let cell = self.doc.upgrade().ok_or(DomError::UseAfterFree)?;
                cell.with_raw(|raw| nodes.to_number(raw))
            }
        }
    }

    /// Text of the result. A node-set yields the concatenated markup of
    /// its nodes, or their literal values under
    /// [`force_literal`](Self::force_literal); scalars yield their XPath
    /// string form.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once freed, or for a node-set
    /// whose document was released.
    pub fn string_value(&self) -> Result<String> {
        match self.value()? {
            XPathValue::NodeSet(_) => {
                let nodes = self.node_list()?;
                if self.force_literal {
                    nodes.literal()
                } else {
                    nodes.to_xml()
                }
            }
            XPathValue::Boolean(b) => Ok(b.to_string()),
            XPathValue::Number(n) => Ok(format_number(*n)),
            XPathValue::String(s) => Ok(s.clone()),
        }
    }

    /// Releases the result. Nodes already extracted stay valid.
    pub fn free(&mut self) {
        self.value = None;
    }

    fn value(&self) -> Result<&XPathValue> {
        self.value.as_ref().ok_or(DomError::UseAfterFree)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use pretty_assertions::assert_eq;

    const XML: &str = "<a><b k='v'>x</b>c</a>";

    #[test]
    fn test_expression_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<XPathExpression>();
    }

    #[test]
    fn test_compile_errors_are_syntax_errors() {
        assert!(matches!(XPathExpression::compile("1 + "), Err(DomError::XPathSyntax(_))));
        assert!(matches!(XPathExpression::compile(""), Err(DomError::XPathSyntax(_))));
        let expr = XPathExpression::compile("//b").unwrap();
        assert_eq!(expr.to_string(), "//b");
    }

    #[test]
    fn test_compiled_expression_is_reusable() {
        let expr = XPathExpression::compile("count(*)").unwrap();
        let doc = Document::parse_str(XML).unwrap();
        let mut ctx = XPathContext::new(&doc).unwrap();
        assert_eq!(ctx.evaluate_compiled(&expr).unwrap().number_value().unwrap(), 1.0);
        let root = doc.document_element().unwrap();
        ctx.set_context_node(&root).unwrap();
        assert_eq!(ctx.evaluate_compiled(&expr).unwrap().number_value().unwrap(), 1.0);
        let other = Document::parse_str("<r><i/><i/></r>").unwrap();
        ctx.set_context_node(&other.document_element().unwrap()).unwrap();
        assert_eq!(ctx.evaluate_compiled(&expr).unwrap().number_value().unwrap(), 2.0);
    }

    #[test]
    fn test_unbound_prefix_is_eval_error() {
        let doc = Document::parse_str("<r xmlns:p='urn:p'><p:i/></r>").unwrap();
        let mut ctx = XPathContext::new(&doc).unwrap();
        assert!(matches!(ctx.evaluate("//p:i"), Err(DomError::XPathEval(_))));
        ctx.register_ns("p", "urn:p").unwrap();
        assert_eq!(ctx.lookup_namespace_uri("p"), Some("urn:p"));
        assert_eq!(ctx.evaluate("count(//p:i)").unwrap().number_value().unwrap(), 1.0);
        ctx.register_ns("p", "").unwrap();
        assert!(ctx.lookup_namespace_uri("p").is_none());
        assert!(matches!(ctx.register_ns("1p", "urn:x"), Err(DomError::InvalidArgument(_))));
    }

    #[test]
    fn test_object_types_and_accessors() {
        let doc = Document::parse_str(XML).unwrap();
        let ctx = XPathContext::new(&doc).unwrap();

        let boolean = ctx.evaluate("count(//b) = 1").unwrap();
        assert_eq!(boolean.object_type(), XPathObjectType::Boolean);
        assert!(boolean.bool_value().unwrap());
        assert!(matches!(boolean.node_list(), Err(DomError::InvalidArgument(_))));
        assert_eq!(boolean.string_value().unwrap(), "true");

        let string = ctx.evaluate("concat('4', '2')").unwrap();
        assert_eq!(string.object_type(), XPathObjectType::String);
        assert_eq!(string.number_value().unwrap(), 42.0);

        let nodes = ctx.evaluate("//b").unwrap();
        assert_eq!(nodes.object_type(), XPathObjectType::NodeSet);
        assert_eq!(nodes.number_value().unwrap().is_nan(), true);
    }

    #[test]
    fn test_force_literal_switches_string_value() {
        let doc = Document::parse_str(XML).unwrap();
        let ctx = XPathContext::new(&doc).unwrap();
        let mut attrs = ctx.evaluate("//@k").unwrap();
        assert_eq!(attrs.string_value().unwrap(), "k=\"v\"");
        attrs.force_literal = true;
        assert_eq!(attrs.string_value().unwrap(), "v");

        let mut elems = ctx.evaluate("//b").unwrap();
        assert_eq!(elems.string_value().unwrap(), "<b k=\"v\">x</b>");
        elems.force_literal = true;
        assert_eq!(elems.string_value().unwrap(), "x");
    }

    #[test]
    fn test_variables() {
        let doc = Document::parse_str(XML).unwrap();
        let mut ctx = XPathContext::new(&doc).unwrap();
        let b = ctx.evaluate("//b").unwrap();
        ctx.set_variable("nodes", &b).unwrap();
        let n = ctx.evaluate("3").unwrap();
        ctx.set_variable("n", &n).unwrap();
        assert_eq!(ctx.evaluate("string($nodes/@k)").unwrap().string_value().unwrap(), "v");
        assert_eq!(ctx.evaluate("$n * 2").unwrap().number_value().unwrap(), 6.0);
        assert!(matches!(ctx.evaluate("$missing"), Err(DomError::XPathEval(_))));

        let other = Document::parse_str("<z/>").unwrap();
        let foreign = XPathContext::new(&other).unwrap().evaluate("/z").unwrap();
        assert!(matches!(ctx.set_variable("z", &foreign), Err(DomError::InvalidArgument(_))));
    }

    #[test]
    fn test_freeing_result_keeps_extracted_nodes() {
        let doc = Document::parse_str(XML).unwrap();
        let ctx = XPathContext::new(&doc).unwrap();
        let mut result = ctx.evaluate("//b").unwrap();
        let nodes = result.node_list().unwrap();
        result.free();
        result.free();
        assert_eq!(result.object_type(), XPathObjectType::Undefined);
        assert!(matches!(result.node_list(), Err(DomError::UseAfterFree)));
        assert_eq!(nodes.literal().unwrap(), "x");

        doc.free();
        assert!(matches!(nodes.literal(), Err(DomError::UseAfterFree)));
    }

    #[test]
    fn test_freed_context_and_document() {
        let doc = Document::parse_str(XML).unwrap();
        let mut ctx = XPathContext::new(&doc).unwrap();
        ctx.free();
        ctx.free();
        assert!(matches!(ctx.evaluate("1"), Err(DomError::UseAfterFree)));

        let ctx = XPathContext::new(&doc).unwrap();
        doc.free();
        assert!(matches!(ctx.evaluate("1"), Err(DomError::UseAfterFree)));
        assert!(matches!(XPathContext::new(&doc), Err(DomError::UseAfterFree)));
    }
}
