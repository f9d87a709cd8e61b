//! Canonical XML (C14N) serialization.
//!
//! Implements inclusive Canonical XML 1.0 per
//! <https://www.w3.org/TR/xml-c14n/>, for a whole document or for the
//! subtree rooted at one node.
//!
//! # Key C14N rules
//!
//! - No XML declaration and no DOCTYPE in output
//! - Namespace declarations sorted by prefix, attributes by namespace URI
//!   then local name
//! - Empty elements always use start-end tag pairs (`<a></a>`)
//! - CDATA sections become escaped text, entity references are expanded
//! - The apex element of a subtree carries every namespace in scope and
//!   the `xml:*` attributes it inherits
//!
//! ```
//! use oxidom::parser::parse_str;
//! use oxidom::serial::canonicalize;
//!
//! let doc = parse_str("<root b='2' a='1'><child/></root>").unwrap();
//! let c14n = canonicalize(&doc, doc.root(), true).unwrap();
//! assert_eq!(c14n, "<root a=\"1\" b=\"2\"><child></child></root>");
//! ```

use std::collections::BTreeMap;

use crate::tree::{NodeId, NodeKind, NodeType, RawDocument};
use crate::util::qname::XML_NAMESPACE;

use super::SerializeError;

/// Prefix (empty for the default namespace) to URI.
type NsBinding = BTreeMap<String, String>;

/// Canonicalizes the subtree rooted at `node`; passing the document node
/// canonicalizes the whole document.
///
/// # Errors
///
/// Returns `SerializeError` if the node is detached from its document, is of
/// a kind with no canonical form, or if the subtree uses a relative
/// namespace URI or an entity with no replacement text.
pub fn canonicalize(doc: &RawDocument, node: NodeId, with_comments: bool) -> Result<String, SerializeError> {
    let mut ctx = C14nContext {
        doc,
        with_comments,
        output: String::new(),
        rendered_ns_stack: vec![NsBinding::new()],
    };
    match doc.node_type(node) {
        t if t.is_document() => ctx.process_document()?,
        NodeType::Element
        | NodeType::Text
        | NodeType::CDataSection
        | NodeType::Comment
        | NodeType::ProcessingInstruction
        | NodeType::EntityRef => {
            if !doc.is_attached(node) {
                return Err(SerializeError::Detached);
            }
            ctx.process_subtree(node, true)?;
        }
        other => return Err(SerializeError::NotCanonicalizable(other)),
    }
    Ok(ctx.output)
}

enum Work {
    /// A node still to be written, flagged when it is the subtree apex.
    Node(NodeId, bool),
    /// The end tag of an element whose content has been written.
    Close(NodeId),
}

struct C14nContext<'a> {
    doc: &'a RawDocument,
    with_comments: bool,
    output: String,
    /// Namespace bindings rendered on each open element, outermost first.
    rendered_ns_stack: Vec<NsBinding>,
}

impl C14nContext<'_> {
    fn process_document(&mut self) -> Result<(), SerializeError> {
        let doc = self.doc;
        let mut seen_root = false;
        for child in doc.children(doc.root()) {
            match &doc.node(child).kind {
                NodeKind::Element { .. } => {
                    self.process_subtree(child, false)?;
                    seen_root = true;
                }
                NodeKind::Comment { content } if self.with_comments => {
                    self.around_root(seen_root, |out| write_c14n_comment(out, content));
                }
                NodeKind::ProcessingInstruction { target, data } => {
                    self.around_root(seen_root, |out| write_c14n_pi(out, target, data.as_deref()));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Top-level comments and PIs are separated from the document element
    /// by a line feed on the side facing it.
    fn around_root(&mut self, after_root: bool, write: impl FnOnce(&mut String)) {
        if after_root {
            self.output.push('\n');
            write(&mut self.output);
        } else {
            write(&mut self.output);
            self.output.push('\n');
        }
    }

    /// Writes `start` and its descendants. Open elements wait on the work
    /// list for their end tags, so deep trees do not grow the call stack.
    fn process_subtree(&mut self, start: NodeId, apex: bool) -> Result<(), SerializeError> {
        let doc = self.doc;
        let mut work = vec![Work::Node(start, apex)];
        while let Some(item) = work.pop() {
            let (id, apex) = match item {
                Work::Node(id, apex) => (id, apex),
                Work::Close(id) => {
                    self.output.push_str("</");
                    self.output.push_str(&doc.node_name(id));
                    self.output.push('>');
                    self.rendered_ns_stack.pop();
                    continue;
                }
            };
            match &doc.node(id).kind {
                NodeKind::Element { .. } => {
                    self.start_tag(id, apex)?;
                    work.push(Work::Close(id));
                    let children: Vec<NodeId> = doc.children(id).collect();
                    work.extend(children.into_iter().rev().map(|c| Work::Node(c, false)));
                }
                NodeKind::Text { content } | NodeKind::CData { content } => {
                    write_c14n_text(&mut self.output, content);
                }
                NodeKind::Comment { content } => {
                    if self.with_comments {
                        write_c14n_comment(&mut self.output, content);
                    }
                }
                NodeKind::ProcessingInstruction { target, data } => {
                    write_c14n_pi(&mut self.output, target, data.as_deref());
                }
                NodeKind::EntityRef { name, value } => match value {
                    Some(text) => write_c14n_text(&mut self.output, text),
                    None => return Err(SerializeError::UnresolvedEntity(name.clone())),
                },
                _ => {}
            }
        }
        Ok(())
    }

    fn start_tag(&mut self, id: NodeId, apex: bool) -> Result<(), SerializeError> {
        let qname = self.doc.node_name(id);
        let ns_to_output = self.compute_ns_declarations(id)?;

        self.output.push('<');
        self.output.push_str(&qname);
        for (prefix, uri) in &ns_to_output {
            if prefix.is_empty() {
                self.output.push_str(" xmlns=\"");
            } else {
                self.output.push_str(" xmlns:");
                self.output.push_str(prefix);
                self.output.push_str("=\"");
            }
            write_c14n_attr_value(&mut self.output, uri);
            self.output.push('"');
        }
        self.write_sorted_attributes(id, apex);
        self.output.push('>');
        Ok(())
    }

    /// Computes the namespace declarations an element must render, pushes
    /// its rendered scope, and returns them sorted by prefix.
    fn compute_ns_declarations(&mut self, id: NodeId) -> Result<Vec<(String, String)>, SerializeError> {
        let doc = self.doc;
        let parent_rendered = self.rendered_ns_stack.last().cloned().unwrap_or_default();
        let mut current = parent_rendered.clone();
        let mut ns_to_output = Vec::new();

        let mut has_default = false;
        for ns in doc.in_scope_namespaces(id) {
            if ns == doc.xml_namespace() {
                continue;
            }
            let NodeKind::NamespaceDecl { prefix, uri } = &doc.node(ns).kind else {
                continue;
            };
            let key = prefix.clone().unwrap_or_default();
            has_default |= key.is_empty();
            if parent_rendered.get(&key) != Some(uri) {
                if is_relative_uri(uri) {
                    return Err(SerializeError::RelativeNamespace(uri.clone()));
                }
                ns_to_output.push((key.clone(), uri.clone()));
                current.insert(key, uri.clone());
            }
        }

        if !has_default && parent_rendered.get("").is_some_and(|u| !u.is_empty()) {
            ns_to_output.push((String::new(), String::new()));
            current.insert(String::new(), String::new());
        }

        ns_to_output.sort();
        self.rendered_ns_stack.push(current);
        Ok(ns_to_output)
    }

    fn write_sorted_attributes(&mut self, id: NodeId, apex: bool) {
        let doc = self.doc;
        let mut attrs: Vec<NodeId> = doc.attributes(id).to_vec();

        if apex {
            // Inherited xml:* attributes, nearest ancestor first.
            for anc in doc.ancestors(id).skip(1) {
                for &a in doc.attributes(anc) {
                    if doc.namespace_uri(a) != Some(XML_NAMESPACE) {
                        continue;
                    }
                    let local = doc.local_name(a);
                    let present = attrs.iter().any(|&b| {
                        doc.namespace_uri(b) == Some(XML_NAMESPACE) && doc.local_name(b) == local
                    });
                    if !present {
                        attrs.push(a);
                    }
                }
            }
        }

        attrs.sort_by(|&a, &b| {
            let key = |n: NodeId| (doc.namespace_uri(n).unwrap_or(""), doc.local_name(n).unwrap_or(""));
            key(a).cmp(&key(b))
        });

        for attr in attrs {
            self.output.push(' ');
            self.output.push_str(&doc.node_name(attr));
            self.output.push_str("=\"");
            write_c14n_attr_value(&mut self.output, doc.content(attr).unwrap_or_default());
            self.output.push('"');
        }
    }
}

/// A namespace URI is relative when it has no scheme.
fn is_relative_uri(uri: &str) -> bool {
    if uri.is_empty() {
        return false;
    }
    match uri.find(':') {
        Some(colon) => {
            let scheme = &uri[..colon];
            scheme.is_empty()
                || !scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                || !scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => true,
    }
}

fn write_c14n_pi(out: &mut String, target: &str, data: Option<&str>) {
    out.push_str("<?");
    out.push_str(target);
    if let Some(d) = data {
        out.push(' ');
        out.push_str(d);
    }
    out.push_str("?>");
}

fn write_c14n_comment(out: &mut String, content: &str) {
    out.push_str("<!--");
    out.push_str(content);
    out.push_str("-->");
}

/// C14N text escaping: `&`, `<`, `>` and `\r`.
fn write_c14n_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
}

/// C14N attribute escaping: `&`, `<`, `"`, and the three whitespace
/// characters that attribute normalization would otherwise fold.
fn write_c14n_attr_value(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::{parse_str, parse_str_with_options, ParseOptions};
    use pretty_assertions::assert_eq;

    fn c14n(xml: &str) -> String {
        let doc = parse_str(xml).unwrap();
        canonicalize(&doc, doc.root(), true).unwrap()
    }

    fn c14n_no_comments(xml: &str) -> String {
        let doc = parse_str(xml).unwrap();
        canonicalize(&doc, doc.root(), false).unwrap()
    }

    #[test]
    fn test_c14n_empty_element_uses_start_end_tags() {
        assert_eq!(c14n("<root/>"), "<root></root>");
    }

    #[test]
    fn test_c14n_attribute_sorting() {
        assert_eq!(
            c14n("<r xmlns:b='urn:b' xmlns:a='urn:a' b:x='1' z='2' a:y='3' y='4'/>"),
            "<r xmlns:a=\"urn:a\" xmlns:b=\"urn:b\" y=\"4\" z=\"2\" a:y=\"3\" b:x=\"1\"></r>"
        );
    }

    #[test]
    fn test_c14n_escaping() {
        assert_eq!(
            c14n("<r a='&quot;&#9;&#10;&#13;&lt;&gt;'>&amp;&lt;&gt;&#13;</r>"),
            "<r a=\"&quot;&#x9;&#xA;&#xD;&lt;>\">&amp;&lt;&gt;&#xD;</r>"
        );
    }

    #[test]
    fn test_c14n_cdata_and_comments() {
        let input = "<!--a--><r><![CDATA[<x>]]><!--b--></r><?p d?>";
        assert_eq!(c14n(input), "<!--a-->\n<r>&lt;x&gt;<!--b--></r>\n<?p d?>");
        assert_eq!(c14n_no_comments(input), "<r>&lt;x&gt;</r>\n<?p d?>");
    }

    #[test]
    fn test_c14n_doctype_removed_entities_expanded() {
        let input = "<!DOCTYPE r [<!ENTITY e 'val'>]><r>&e;</r>";
        assert_eq!(c14n(input), "<r>val</r>");
    }

    #[test]
    fn test_c14n_redundant_namespace_not_redeclared() {
        assert_eq!(
            c14n("<r xmlns='urn:d'><c xmlns='urn:d'/><e xmlns=''/></r>"),
            "<r xmlns=\"urn:d\"><c></c><e xmlns=\"\"></e></r>"
        );
    }

    #[test]
    fn test_c14n_subtree_carries_scope() {
        let doc = parse_str("<r xmlns:p='urn:p' xml:lang='en'><p:c><d/></p:c></r>").unwrap();
        let c = doc.first_child(doc.root_element().unwrap()).unwrap();
        assert_eq!(
            canonicalize(&doc, c, true).unwrap(),
            "<p:c xmlns:p=\"urn:p\" xml:lang=\"en\"><d></d></p:c>"
        );
    }

    #[test]
    fn test_c14n_relative_namespace_fails() {
        let doc = parse_str("<r xmlns:p='rel/path'/>").unwrap();
        assert_eq!(
            canonicalize(&doc, doc.root(), true),
            Err(SerializeError::RelativeNamespace("rel/path".to_string()))
        );
    }

    #[test]
    fn test_c14n_detached_fails() {
        let mut doc = parse_str("<r><c/></r>").unwrap();
        let c = doc.first_child(doc.root_element().unwrap()).unwrap();
        doc.detach(c);
        assert_eq!(canonicalize(&doc, c, true), Err(SerializeError::Detached));
    }

    #[test]
    fn test_c14n_attribute_not_canonicalizable() {
        let doc = parse_str("<r a='1'/>").unwrap();
        let a = doc.attributes(doc.root_element().unwrap())[0];
        assert_eq!(
            canonicalize(&doc, a, true),
            Err(SerializeError::NotCanonicalizable(NodeType::Attribute))
        );
    }

    #[test]
    fn test_c14n_unexpanded_external_entity_fails() {
        let input = "<!DOCTYPE r [<!ENTITY e SYSTEM 'e.xml'>]><r>&e;</r>";
        let doc = parse_str_with_options(input, ParseOptions::default()).unwrap();
        assert_eq!(
            canonicalize(&doc, doc.root(), true),
            Err(SerializeError::UnresolvedEntity("e".to_string()))
        );
    }

    #[test]
    fn test_relative_uri_detection() {
        assert!(is_relative_uri("foo"));
        assert!(is_relative_uri("../a"));
        assert!(!is_relative_uri("urn:x"));
        assert!(!is_relative_uri("http://example.com/"));
        assert!(!is_relative_uri(""));
    }

    #[test]
    fn test_c14n_deep_tree() {
        let depth = 8_000;
        let mut doc = RawDocument::default();
        let mut top = doc.create_node(NodeKind::element("d"));
        for _ in 1..depth {
            let parent = doc.create_node(NodeKind::element("d"));
            doc.link_last(parent, top);
            top = parent;
        }
        let root = doc.root();
        doc.link_last(root, top);
        let c14n = canonicalize(&doc, root, false).unwrap();
        assert_eq!(c14n, format!("{}{}", "<d>".repeat(depth), "</d>".repeat(depth)));
    }
}
