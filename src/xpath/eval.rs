//! Evaluation of compiled expressions against a [`RawDocument`].
//!
//! Every step yields its nodes in axis order so that predicate positions
//! count backwards on reverse axes; the step result is then merged across
//! context nodes and sorted into document order. DTD nodes and their
//! declarations are invisible to every axis.

use std::collections::HashMap;

use super::ast::{Axis, BinaryOp, Expr, NodeTest, Step};
use super::types::{format_number, round_half_up, XPathError, XPathValue};
use crate::tree::{NodeId, NodeKind, NodeType, RawDocument};
use crate::util::qname::XML_NAMESPACE;

type EvalResult<T = XPathValue> = Result<T, XPathError>;

/// The context node with its position in the current node list.
#[derive(Debug, Clone, Copy)]
struct Focus {
    node: NodeId,
    position: usize,
    size: usize,
}

/// Evaluates expressions against one document.
///
/// Prefixes in name tests resolve only through `namespaces`; the `xml`
/// prefix is always bound.
pub struct Evaluator<'a> {
    doc: &'a RawDocument,
    namespaces: &'a HashMap<String, String>,
    variables: &'a HashMap<String, XPathValue>,
}

impl<'a> Evaluator<'a> {
    #[must_use]
    pub fn new(
        doc: &'a RawDocument,
        namespaces: &'a HashMap<String, String>,
        variables: &'a HashMap<String, XPathValue>,
    ) -> Self {
        Self {
            doc,
            namespaces,
            variables,
        }
    }

    /// Evaluates `expr` with `node` as the context node.
    ///
    /// # Errors
    ///
    /// Returns an evaluation `XPathError` for unbound prefixes, unknown
    /// functions or variables, wrong arities and non-node-set operands where
    /// a node-set is required.
    pub fn evaluate(&self, expr: &Expr, node: NodeId) -> EvalResult {
        self.eval(
            expr,
            Focus {
                node,
                position: 1,
                size: 1,
            },
        )
    }

    fn eval(&self, expr: &Expr, focus: Focus) -> EvalResult {
        match expr {
            Expr::Number(n) => Ok(XPathValue::Number(*n)),
            Expr::Literal(s) => Ok(XPathValue::String(s.clone())),
            Expr::Variable(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| XPathError::UndefinedVariable(name.clone())),
            Expr::Negate(inner) => Ok(XPathValue::Number(-self.number(inner, focus)?)),
            Expr::Binary { op, left, right } => self.binary(*op, left, right, focus),
            Expr::Call { name, args } => self.call(name, args, focus),
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    self.doc.root()
                } else {
                    focus.node
                };
                self.walk_steps(vec![start], steps).map(XPathValue::NodeSet)
            }
            Expr::Filter { base, predicates } => {
                let nodes = self.node_set(base, focus, "a predicate")?;
                let mut kept = nodes;
                for predicate in predicates {
                    kept = self.filter(kept, predicate)?;
                }
                Ok(XPathValue::NodeSet(kept))
            }
            Expr::Chain { base, steps } => {
                let nodes = self.node_set(base, focus, "a path step")?;
                self.walk_steps(nodes, steps).map(XPathValue::NodeSet)
            }
            Expr::Union(left, right) => {
                let mut nodes = self.node_set(left, focus, "'|'")?;
                nodes.extend(self.node_set(right, focus, "'|'")?);
                self.doc.sort_document_order(&mut nodes);
                Ok(XPathValue::NodeSet(nodes))
            }
        }
    }

    fn node_set(&self, expr: &Expr, focus: Focus, what: &'static str) -> EvalResult<Vec<NodeId>> {
        match self.eval(expr, focus)? {
            XPathValue::NodeSet(nodes) => Ok(nodes),
            _ => Err(XPathError::NotANodeSet(what)),
        }
    }

    fn number(&self, expr: &Expr, focus: Focus) -> EvalResult<f64> {
        Ok(self.eval(expr, focus)?.to_number(self.doc))
    }

    fn string(&self, expr: &Expr, focus: Focus) -> EvalResult<String> {
        Ok(self.eval(expr, focus)?.to_xpath_string(self.doc))
    }

    // --- Operators ---

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr, focus: Focus) -> EvalResult {
        match op {
            BinaryOp::Or => {
                let value = self.eval(left, focus)?.to_boolean()
                    || self.eval(right, focus)?.to_boolean();
                Ok(XPathValue::Boolean(value))
            }
            BinaryOp::And => {
                let value = self.eval(left, focus)?.to_boolean()
                    && self.eval(right, focus)?.to_boolean();
                Ok(XPathValue::Boolean(value))
            }
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let lhs = self.eval(left, focus)?;
                let rhs = self.eval(right, focus)?;
                Ok(XPathValue::Boolean(self.compare(op, &lhs, &rhs)))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let a = self.number(left, focus)?;
                let b = self.number(right, focus)?;
                let n = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                };
                Ok(XPathValue::Number(n))
            }
        }
    }

    /// Comparison with the existential semantics of XPath 1.0 section 3.4.
    fn compare(&self, op: BinaryOp, lhs: &XPathValue, rhs: &XPathValue) -> bool {
        match (lhs, rhs) {
            (XPathValue::NodeSet(a), XPathValue::NodeSet(b)) => {
                let right: Vec<XPathValue> = b
                    .iter()
                    .map(|&n| XPathValue::String(self.doc.string_value(n)))
                    .collect();
                a.iter().any(|&n| {
                    let left = XPathValue::String(self.doc.string_value(n));
                    right.iter().any(|r| self.compare_scalars(op, &left, r))
                })
            }
            (XPathValue::NodeSet(nodes), XPathValue::Boolean(_)) => {
                self.compare_scalars(op, &XPathValue::Boolean(!nodes.is_empty()), rhs)
            }
            (XPathValue::NodeSet(nodes), scalar) => nodes.iter().any(|&n| {
                self.compare_scalars(op, &XPathValue::String(self.doc.string_value(n)), scalar)
            }),
            (_, XPathValue::NodeSet(_)) => self.compare(op.mirrored(), rhs, lhs),
            _ => self.compare_scalars(op, lhs, rhs),
        }
    }

    fn compare_scalars(&self, op: BinaryOp, lhs: &XPathValue, rhs: &XPathValue) -> bool {
        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            let equal = match (lhs, rhs) {
                (XPathValue::Boolean(_), _) | (_, XPathValue::Boolean(_)) => {
                    lhs.to_boolean() == rhs.to_boolean()
                }
                (XPathValue::Number(_), _) | (_, XPathValue::Number(_)) => {
                    lhs.to_number(self.doc) == rhs.to_number(self.doc)
                }
                _ => lhs.to_xpath_string(self.doc) == rhs.to_xpath_string(self.doc),
            };
            return equal == (op == BinaryOp::Eq);
        }
        let a = lhs.to_number(self.doc);
        let b = rhs.to_number(self.doc);
        match op {
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            _ => a >= b,
        }
    }

    // --- Location paths ---

    fn walk_steps(&self, start: Vec<NodeId>, steps: &[Step]) -> EvalResult<Vec<NodeId>> {
        let mut current = start;
        for step in steps {
            let uri = match &step.test {
                NodeTest::Name { prefix: Some(p), .. } | NodeTest::AnyLocalName(p) => {
                    Some(self.resolve_prefix(p)?)
                }
                _ => None,
            };
            let mut next = Vec::new();
            for &node in &current {
                let mut selected = Vec::new();
                for candidate in self.axis(node, step.axis) {
                    if self.matches(candidate, &step.test, step.axis, uri) {
                        selected.push(candidate);
                    }
                }
                for predicate in &step.predicates {
                    selected = self.filter(selected, predicate)?;
                }
                next.extend(selected);
            }
            self.doc.sort_document_order(&mut next);
            current = next;
        }
        Ok(current)
    }

    /// Keeps the nodes for which `predicate` holds; a numeric predicate
    /// compares against the proximity position.
    fn filter(&self, nodes: Vec<NodeId>, predicate: &Expr) -> EvalResult<Vec<NodeId>> {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                node,
                position: i + 1,
                size,
            };
            let keep = match self.eval(predicate, focus)? {
                XPathValue::Number(n) => n == (i + 1) as f64,
                other => other.to_boolean(),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    /// Nodes addressable by XPath. DTD nodes and declarations are not.
    fn visible(&self, id: NodeId) -> bool {
        !matches!(
            self.doc.node_type(id),
            NodeType::Dtd
                | NodeType::DocumentType
                | NodeType::ElementDecl
                | NodeType::AttributeDecl
                | NodeType::EntityDecl
                | NodeType::Entity
                | NodeType::Notation
                | NodeType::XIncludeStart
                | NodeType::XIncludeEnd
        )
    }

    fn is_owned_leaf(&self, id: NodeId) -> bool {
        matches!(
            self.doc.node_type(id),
            NodeType::Attribute | NodeType::NamespaceDecl
        )
    }

    fn subtree(&self, root: NodeId, include_root: bool, out: &mut Vec<NodeId>) {
        if include_root {
            out.push(root);
        }
        out.extend(self.doc.descendants(root).filter(|&d| self.visible(d)));
    }

    /// Candidate nodes along an axis, in axis order.
    fn axis(&self, node: NodeId, axis: Axis) -> Vec<NodeId> {
        let doc = self.doc;
        let mut out = Vec::new();
        match axis {
            Axis::SelfAxis => out.push(node),
            Axis::Child => {
                if !self.is_owned_leaf(node) {
                    out.extend(doc.children(node).filter(|&c| self.visible(c)));
                }
            }
            Axis::Descendant | Axis::DescendantOrSelf => {
                let with_self = axis == Axis::DescendantOrSelf;
                if self.is_owned_leaf(node) {
                    if with_self {
                        out.push(node);
                    }
                } else {
                    self.subtree(node, with_self, &mut out);
                }
            }
            Axis::Parent => out.extend(doc.parent(node)),
            Axis::Ancestor => out.extend(doc.ancestors(node).skip(1)),
            Axis::AncestorOrSelf => out.extend(doc.ancestors(node)),
            Axis::FollowingSibling | Axis::PrecedingSibling => {
                if !self.is_owned_leaf(node) {
                    let forward = axis == Axis::FollowingSibling;
                    let mut cursor = node;
                    while let Some(sibling) = if forward {
                        doc.next_sibling(cursor)
                    } else {
                        doc.prev_sibling(cursor)
                    } {
                        if self.visible(sibling) {
                            out.push(sibling);
                        }
                        cursor = sibling;
                    }
                }
            }
            Axis::Following => {
                let mut anchor = node;
                if self.is_owned_leaf(node) {
                    if let Some(owner) = doc.parent(node) {
                        self.subtree(owner, false, &mut out);
                        anchor = owner;
                    }
                }
                for ancestor in doc.ancestors(anchor) {
                    let mut cursor = ancestor;
                    while let Some(sibling) = doc.next_sibling(cursor) {
                        if self.visible(sibling) {
                            self.subtree(sibling, true, &mut out);
                        }
                        cursor = sibling;
                    }
                }
            }
            Axis::Preceding => {
                let anchor = if self.is_owned_leaf(node) {
                    doc.parent(node).unwrap_or(node)
                } else {
                    node
                };
                for ancestor in doc.ancestors(anchor) {
                    let mut cursor = ancestor;
                    while let Some(sibling) = doc.prev_sibling(cursor) {
                        if self.visible(sibling) {
                            let mut block = Vec::new();
                            self.subtree(sibling, true, &mut block);
                            out.extend(block.into_iter().rev());
                        }
                        cursor = sibling;
                    }
                }
            }
            Axis::Attribute => out.extend_from_slice(doc.attributes(node)),
            Axis::Namespace => {
                if doc.node_type(node) == NodeType::Element {
                    out.extend(doc.in_scope_namespaces(node));
                }
            }
        }
        out
    }

    fn resolve_prefix(&self, prefix: &str) -> EvalResult<&str> {
        if prefix == "xml" {
            return Ok(XML_NAMESPACE);
        }
        self.namespaces
            .get(prefix)
            .map(String::as_str)
            .ok_or_else(|| XPathError::UnboundPrefix(prefix.to_string()))
    }

    fn principal_type(axis: Axis) -> NodeType {
        match axis {
            Axis::Attribute => NodeType::Attribute,
            Axis::Namespace => NodeType::NamespaceDecl,
            _ => NodeType::Element,
        }
    }

    /// Applies a node test; `uri` is the namespace its prefix resolved to.
    fn matches(&self, id: NodeId, test: &NodeTest, axis: Axis, uri: Option<&str>) -> bool {
        let ty = self.doc.node_type(id);
        match test {
            NodeTest::AnyNode => true,
            NodeTest::Text => matches!(ty, NodeType::Text | NodeType::CDataSection),
            NodeTest::Comment => ty == NodeType::Comment,
            NodeTest::ProcessingInstruction(target) => {
                ty == NodeType::ProcessingInstruction
                    && target
                        .as_deref()
                        .map_or(true, |t| self.doc.local_name(id) == Some(t))
            }
            NodeTest::AnyName => ty == Self::principal_type(axis),
            NodeTest::AnyLocalName(_) => {
                ty == Self::principal_type(axis) && self.doc.namespace_uri(id) == uri
            }
            NodeTest::Name { prefix, local } => {
                if ty != Self::principal_type(axis) {
                    return false;
                }
                if ty == NodeType::NamespaceDecl {
                    return prefix.is_none() && self.doc.local_name(id) == Some(local.as_str());
                }
                self.doc.local_name(id) == Some(local.as_str())
                    && self.doc.namespace_uri(id) == uri
            }
        }
    }

    // --- Function library ---

    fn arity(name: &str, args: &[Expr], min: usize, max: usize, expected: &'static str) -> EvalResult<()> {
        if (min..=max).contains(&args.len()) {
            Ok(())
        } else {
            Err(XPathError::Arity {
                function: name.to_string(),
                expected,
                found: args.len(),
            })
        }
    }

    /// The first node of an optional node-set argument, or the context node.
    fn subject(&self, args: &[Expr], focus: Focus) -> EvalResult<Option<NodeId>> {
        match args.first() {
            None => Ok(Some(focus.node)),
            Some(arg) => Ok(self.node_set(arg, focus, "this function")?.first().copied()),
        }
    }

    /// The string argument at `index`, defaulting to the context node's
    /// string-value when absent.
    fn string_arg(&self, args: &[Expr], index: usize, focus: Focus) -> EvalResult<String> {
        match args.get(index) {
            Some(arg) => self.string(arg, focus),
            None => Ok(self.doc.string_value(focus.node)),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn call(&self, name: &str, args: &[Expr], focus: Focus) -> EvalResult {
        use XPathValue::{Boolean, Number, String as Str};

        let value = match name {
            "last" => {
                Self::arity(name, args, 0, 0, "0")?;
                Number(focus.size as f64)
            }
            "position" => {
                Self::arity(name, args, 0, 0, "0")?;
                Number(focus.position as f64)
            }
            "count" => {
                Self::arity(name, args, 1, 1, "1")?;
                Number(self.node_set(&args[0], focus, "count()")?.len() as f64)
            }
            "id" => {
                Self::arity(name, args, 1, 1, "1")?;
                let tokens = match self.eval(&args[0], focus)? {
                    XPathValue::NodeSet(nodes) => nodes
                        .iter()
                        .map(|&n| self.doc.string_value(n))
                        .collect::<Vec<_>>()
                        .join(" "),
                    other => other.to_xpath_string(self.doc),
                };
                let mut found: Vec<NodeId> = tokens
                    .split_ascii_whitespace()
                    .filter_map(|t| self.doc.element_by_id(t))
                    .collect();
                self.doc.sort_document_order(&mut found);
                XPathValue::NodeSet(found)
            }
            "local-name" | "namespace-uri" | "name" => {
                Self::arity(name, args, 0, 1, "0 or 1")?;
                let text = self
                    .subject(args, focus)?
                    .map(|n| self.name_part(name, n))
                    .unwrap_or_default();
                Str(text)
            }
            "string" => {
                Self::arity(name, args, 0, 1, "0 or 1")?;
                Str(self.string_arg(args, 0, focus)?)
            }
            "concat" => {
                if args.len() < 2 {
                    return Err(XPathError::Arity {
                        function: name.to_string(),
                        expected: "2 or more",
                        found: args.len(),
                    });
                }
                let mut out = String::new();
                for arg in args {
                    out.push_str(&self.string(arg, focus)?);
                }
                Str(out)
            }
            "starts-with" | "contains" | "substring-before" | "substring-after" => {
                Self::arity(name, args, 2, 2, "2")?;
                let haystack = self.string(&args[0], focus)?;
                let needle = self.string(&args[1], focus)?;
                match name {
                    "starts-with" => Boolean(haystack.starts_with(&needle)),
                    "contains" => Boolean(haystack.contains(&needle)),
                    "substring-before" => Str(haystack
                        .find(&needle)
                        .map(|i| haystack[..i].to_string())
                        .unwrap_or_default()),
                    _ => Str(haystack
                        .find(&needle)
                        .map(|i| haystack[i + needle.len()..].to_string())
                        .unwrap_or_default()),
                }
            }
            "substring" => {
                Self::arity(name, args, 2, 3, "2 or 3")?;
                let text = self.string(&args[0], focus)?;
                let start = round_half_up(self.number(&args[1], focus)?);
                let end = match args.get(2) {
                    Some(len) => start + round_half_up(self.number(len, focus)?),
                    None => f64::INFINITY,
                };
                let picked = text
                    .chars()
                    .enumerate()
                    .filter(|&(i, _)| {
                        let p = (i + 1) as f64;
                        p >= start && p < end
                    })
                    .map(|(_, c)| c)
                    .collect();
                Str(picked)
            }
            "string-length" => {
                Self::arity(name, args, 0, 1, "0 or 1")?;
                Number(self.string_arg(args, 0, focus)?.chars().count() as f64)
            }
            "normalize-space" => {
                Self::arity(name, args, 0, 1, "0 or 1")?;
                let text = self.string_arg(args, 0, focus)?;
                let words: Vec<&str> = text
                    .split([' ', '\t', '\r', '\n'])
                    .filter(|w| !w.is_empty())
                    .collect();
                Str(words.join(" "))
            }
            "translate" => {
                Self::arity(name, args, 3, 3, "3")?;
                let text = self.string(&args[0], focus)?;
                let from: Vec<char> = self.string(&args[1], focus)?.chars().collect();
                let to: Vec<char> = self.string(&args[2], focus)?.chars().collect();
                let out = text
                    .chars()
                    .filter_map(|c| match from.iter().position(|&f| f == c) {
                        Some(i) => to.get(i).copied(),
                        None => Some(c),
                    })
                    .collect();
                Str(out)
            }
            "boolean" => {
                Self::arity(name, args, 1, 1, "1")?;
                Boolean(self.eval(&args[0], focus)?.to_boolean())
            }
            "not" => {
                Self::arity(name, args, 1, 1, "1")?;
                Boolean(!self.eval(&args[0], focus)?.to_boolean())
            }
            "true" | "false" => {
                Self::arity(name, args, 0, 0, "0")?;
                Boolean(name == "true")
            }
            "lang" => {
                Self::arity(name, args, 1, 1, "1")?;
                let wanted = self.string(&args[0], focus)?.to_ascii_lowercase();
                Boolean(self.lang_matches(focus.node, &wanted))
            }
            "number" => {
                Self::arity(name, args, 0, 1, "0 or 1")?;
                match args.first() {
                    Some(arg) => Number(self.number(arg, focus)?),
                    None => Number(XPathValue::NodeSet(vec![focus.node]).to_number(self.doc)),
                }
            }
            "sum" => {
                Self::arity(name, args, 1, 1, "1")?;
                let nodes = self.node_set(&args[0], focus, "sum()")?;
                Number(
                    nodes
                        .iter()
                        .map(|&n| XPathValue::String(self.doc.string_value(n)).to_number(self.doc))
                        .sum(),
                )
            }
            "floor" | "ceiling" | "round" => {
                Self::arity(name, args, 1, 1, "1")?;
                let n = self.number(&args[0], focus)?;
                Number(match name {
                    "floor" => n.floor(),
                    "ceiling" => n.ceil(),
                    _ => round_half_up(n),
                })
            }
            other => return Err(XPathError::UnknownFunction(other.to_string())),
        };
        Ok(value)
    }

    fn name_part(&self, function: &str, node: NodeId) -> String {
        let doc = self.doc;
        match (function, &doc.node(node).kind) {
            ("namespace-uri", NodeKind::Element { .. } | NodeKind::Attribute { .. }) => {
                doc.namespace_uri(node).unwrap_or_default().to_string()
            }
            ("name", NodeKind::Element { .. } | NodeKind::Attribute { .. }) => doc.node_name(node),
            (
                "local-name" | "name",
                NodeKind::Element { .. }
                | NodeKind::Attribute { .. }
                | NodeKind::ProcessingInstruction { .. }
                | NodeKind::NamespaceDecl { .. },
            ) => doc.local_name(node).unwrap_or_default().to_string(),
            _ => String::new(),
        }
    }

    fn lang_matches(&self, node: NodeId, wanted: &str) -> bool {
        let declared = self.doc.ancestors(node).find_map(|a| {
            self.doc
                .attribute_node_ns(a, "lang", Some(XML_NAMESPACE))
                .and_then(|attr| self.doc.content(attr))
        });
        declared.is_some_and(|lang| {
            let lang = lang.to_ascii_lowercase();
            lang == wanted
                || lang
                    .strip_prefix(wanted)
                    .is_some_and(|rest| rest.starts_with('-'))
        })
    }
}

/// Short summary of a value for log output.
#[must_use]
pub fn describe(value: &XPathValue) -> String {
    match value {
        XPathValue::NodeSet(nodes) => format!("node-set of {}", nodes.len()),
        XPathValue::Boolean(b) => b.to_string(),
        XPathValue::Number(n) => format_number(*n),
        XPathValue::String(s) => format!("{s:?}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use crate::xpath::parser::parse;
    use pretty_assertions::assert_eq;

    fn run_with(xml: &str, expr: &str, ns: &[(&str, &str)]) -> Result<(RawDocument, XPathValue), XPathError> {
        let doc = parse_str(xml).unwrap();
        let namespaces: HashMap<String, String> = ns
            .iter()
            .map(|(p, u)| ((*p).to_string(), (*u).to_string()))
            .collect();
        let variables = HashMap::new();
        let compiled = parse(expr)?;
        let value = Evaluator::new(&doc, &namespaces, &variables).evaluate(&compiled, doc.root())?;
        Ok((doc, value))
    }

    fn string_of(xml: &str, expr: &str) -> String {
        let (doc, value) = run_with(xml, expr, &[]).unwrap();
        value.to_xpath_string(&doc)
    }

    fn number_of(xml: &str, expr: &str) -> f64 {
        let (doc, value) = run_with(xml, expr, &[]).unwrap();
        value.to_number(&doc)
    }

    fn names_of(xml: &str, expr: &str) -> Vec<String> {
        let (doc, value) = run_with(xml, expr, &[]).unwrap();
        let XPathValue::NodeSet(nodes) = value else {
            panic!("expected a node-set");
        };
        nodes.iter().map(|&n| doc.node_name(n)).collect()
    }

    const BOOKS: &str = "<lib><book id='a' lang='en'><t>One</t><p>10</p></book>\
                         <book id='b'><t>Two</t><p>25</p></book><!--c--><?pi x?></lib>";

    #[test]
    fn test_arithmetic() {
        assert_eq!(number_of("<a/>", "1 + 2 * 3 - 4"), 3.0);
        assert_eq!(number_of("<a/>", "7 mod 3"), 1.0);
        assert_eq!(number_of("<a/>", "-7 mod 3"), -1.0);
        assert!(number_of("<a/>", "0 div 0").is_nan());
        assert_eq!(string_of("<a/>", "1 div 0"), "Infinity");
    }

    #[test]
    fn test_child_and_descendant_paths() {
        assert_eq!(names_of(BOOKS, "/lib/book/t"), vec!["t", "t"]);
        assert_eq!(names_of(BOOKS, "//p"), vec!["p", "p"]);
        assert_eq!(number_of(BOOKS, "count(//node())"), 13.0);
        assert_eq!(number_of(BOOKS, "count(/lib/*)"), 2.0);
    }

    #[test]
    fn test_predicates_and_positions() {
        assert_eq!(string_of(BOOKS, "//book[2]/t"), "Two");
        assert_eq!(string_of(BOOKS, "//book[last()]/@id"), "b");
        assert_eq!(string_of(BOOKS, "//book[p > 20]/t"), "Two");
        assert_eq!(string_of(BOOKS, "(//t)[1]"), "One");
        assert_eq!(names_of(BOOKS, "//book[@lang]"), vec!["book"]);
    }

    #[test]
    fn test_reverse_axis_positions() {
        assert_eq!(
            string_of(BOOKS, "//book[2]/preceding-sibling::book[1]/@id"),
            "a"
        );
        assert_eq!(
            names_of(BOOKS, "//t[1]/ancestor::*[1]"),
            vec!["book", "book"]
        );
        assert_eq!(string_of(BOOKS, "(//p)[2]/preceding::t[1]"), "Two");
    }

    #[test]
    fn test_following_and_preceding() {
        assert_eq!(number_of(BOOKS, "count(//book[1]/following::*)"), 3.0);
        assert_eq!(number_of(BOOKS, "count(//book[2]/preceding::*)"), 3.0);
        assert_eq!(names_of(BOOKS, "//book[1]/@id/following::t"), vec!["t", "t"]);
    }

    #[test]
    fn test_node_type_tests() {
        assert_eq!(string_of(BOOKS, "/lib/comment()"), "c");
        assert_eq!(string_of(BOOKS, "/lib/processing-instruction('pi')"), "x");
        assert_eq!(number_of(BOOKS, "count(//text())"), 4.0);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(string_of(BOOKS, "//p = 25"), "true");
        assert_eq!(string_of(BOOKS, "//p != 25"), "true");
        assert_eq!(string_of(BOOKS, "//p = '11'"), "false");
        assert_eq!(string_of(BOOKS, "30 > //p"), "true");
        assert_eq!(string_of(BOOKS, "//t = //t"), "true");
        assert_eq!(string_of("<a/>", "'abc' = 'abc' and 1 < 2"), "true");
        assert_eq!(string_of("<a/>", "true() = 'x'"), "true");
    }

    #[test]
    fn test_string_functions() {
        let xml = "<a>  hello   world </a>";
        assert_eq!(string_of(xml, "normalize-space(/a)"), "hello world");
        assert_eq!(string_of(xml, "substring('12345', 2, 3)"), "234");
        assert_eq!(string_of(xml, "substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(string_of(xml, "substring('12345', 0 div 0, 3)"), "");
        assert_eq!(string_of(xml, "substring-before('a=b', '=')"), "a");
        assert_eq!(string_of(xml, "substring-after('a=b', '=')"), "b");
        assert_eq!(string_of(xml, "translate('bar', 'abc', 'AB')"), "BAr");
        assert_eq!(string_of(xml, "concat('a', 1, true())"), "a1true");
        assert_eq!(number_of(xml, "string-length('h\u{e9}llo')"), 5.0);
        assert_eq!(string_of(xml, "starts-with('abc', 'ab')"), "true");
        assert_eq!(string_of(xml, "contains('abc', 'd')"), "false");
    }

    #[test]
    fn test_number_functions() {
        assert_eq!(number_of(BOOKS, "sum(//p)"), 35.0);
        assert_eq!(number_of("<a/>", "floor(-1.5)"), -2.0);
        assert_eq!(number_of("<a/>", "ceiling(1.2)"), 2.0);
        assert_eq!(number_of("<a/>", "round(2.5)"), 3.0);
        assert_eq!(number_of("<a>7</a>", "number(/a)"), 7.0);
    }

    #[test]
    fn test_name_functions() {
        let xml = "<r xmlns:x='urn:x'><x:e x:k='1'/></r>";
        let ns = [("p", "urn:x")];
        let (doc, value) = run_with(xml, "name(//p:e)", &ns).unwrap();
        assert_eq!(value.to_xpath_string(&doc), "x:e");
        let (doc, value) = run_with(xml, "local-name(//p:e/@p:k)", &ns).unwrap();
        assert_eq!(value.to_xpath_string(&doc), "k");
        let (doc, value) = run_with(xml, "namespace-uri(//p:e)", &ns).unwrap();
        assert_eq!(value.to_xpath_string(&doc), "urn:x");
        assert_eq!(string_of(xml, "name(//text())"), "");
    }

    #[test]
    fn test_unprefixed_names_skip_namespaced_elements() {
        let xml = "<r xmlns='urn:d'><c/></r>";
        assert_eq!(number_of(xml, "count(//c)"), 0.0);
        let (_, value) = run_with(xml, "count(//d:c)", &[("d", "urn:d")]).unwrap();
        assert_eq!(value, XPathValue::Number(1.0));
    }

    #[test]
    fn test_namespace_axis() {
        let xml = "<r xmlns:a='urn:a'><c xmlns:b='urn:b'/></r>";
        assert_eq!(number_of(xml, "count(//c/namespace::*)"), 3.0);
        assert_eq!(string_of(xml, "//c/namespace::a"), "urn:a");
    }

    #[test]
    fn test_id_and_lang() {
        let xml = "<r xml:lang='en-GB'><e xml:id='k1'>A</e><e xml:id='k2' xml:lang='de'>B</e></r>";
        assert_eq!(string_of(xml, "id('k2 k1')"), "A");
        assert_eq!(number_of(xml, "count(id('k1 k2 zz'))"), 2.0);
        assert_eq!(number_of(xml, "count(//e[lang('en')])"), 1.0);
        assert_eq!(number_of(xml, "count(//e[lang('DE')])"), 1.0);
    }

    #[test]
    fn test_union_sorts_and_dedupes() {
        assert_eq!(names_of(BOOKS, "//p | //t | //t"), vec!["t", "p", "t", "p"]);
    }

    #[test]
    fn test_evaluation_errors() {
        assert_eq!(
            run_with("<a/>", "//q:a", &[]).unwrap_err(),
            XPathError::UnboundPrefix("q".into())
        );
        for unmatched in ["/missing/p:x", "//@p:x", "//p:*", "/r/i/p:x"] {
            assert_eq!(
                run_with("<r><i/></r>", unmatched, &[]).unwrap_err(),
                XPathError::UnboundPrefix("p".into()),
                "{unmatched}"
            );
        }
        assert_eq!(
            run_with("<a/>", "frob()", &[]).unwrap_err(),
            XPathError::UnknownFunction("frob".into())
        );
        assert!(matches!(
            run_with("<a/>", "count()", &[]).unwrap_err(),
            XPathError::Arity { found: 0, .. }
        ));
        assert_eq!(
            run_with("<a/>", "$v", &[]).unwrap_err(),
            XPathError::UndefinedVariable("v".into())
        );
        assert!(matches!(
            run_with("<a/>", "1 | 2", &[]).unwrap_err(),
            XPathError::NotANodeSet(_)
        ));
    }

    #[test]
    fn test_doctype_is_invisible() {
        let xml = "<!DOCTYPE r [<!ELEMENT r ANY>]><r/>";
        assert_eq!(number_of(xml, "count(/node())"), 1.0);
        assert_eq!(number_of(xml, "count(//node())"), 1.0);
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&XPathValue::Number(2.0)), "2");
        assert_eq!(describe(&XPathValue::NodeSet(Vec::new())), "node-set of 0");
    }
}
