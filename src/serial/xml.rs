//! XML serializer.
//!
//! Serializes a `RawDocument`, or any node within it, back to XML text in
//! libxml2's output conventions: `<b/>` for empty elements, namespace
//! declarations before attributes, and indentation only where an element
//! has element-only content.

use std::fmt::Write as _;

use crate::tree::{NodeId, NodeKind, RawDocument};

/// Options controlling XML serialization output.
///
/// ```
/// use oxidom::parser::parse_str;
/// use oxidom::serial::{serialize_with_options, SerializeOptions};
///
/// let doc = parse_str("<root><child>Hello</child></root>").unwrap();
/// let xml = serialize_with_options(&doc, &SerializeOptions::default().indent(true));
/// assert!(xml.contains("  <child>"));
/// ```
#[derive(Debug, Clone)]
pub struct SerializeOptions {
    /// Whether to produce indented (pretty-printed) output.
    pub indent: bool,
    /// The indentation string used for each level when `indent` is `true`.
    /// Defaults to two spaces.
    pub indent_str: String,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            indent: false,
            indent_str: "  ".to_string(),
        }
    }
}

impl SerializeOptions {
    /// Enables or disables indented output. Mixed-content elements are never
    /// indented.
    #[must_use]
    pub fn indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    /// Sets the indentation string used for each nesting level.
    #[must_use]
    pub fn indent_str(mut self, s: &str) -> Self {
        self.indent_str = s.to_string();
        self
    }
}

/// Serializes a document, XML declaration included.
#[must_use]
pub fn serialize(doc: &RawDocument) -> String {
    serialize_with_options(doc, &SerializeOptions::default())
}

/// Serializes a document with the given options.
#[must_use]
pub fn serialize_with_options(doc: &RawDocument, options: &SerializeOptions) -> String {
    let mut writer = Writer::new(doc, options);
    writer.run(doc.root(), 0);
    writer.out
}

/// Serializes a single node and its descendants.
///
/// `level` is the indentation level the node starts at and `format`
/// enables indentation. Attributes serialize as `name="value"`, namespace
/// declarations as `xmlns:p="uri"`, and a document node as the whole
/// document.
///
/// ```
/// use oxidom::parser::parse_str;
/// use oxidom::serial::serialize_node;
///
/// let doc = parse_str("<a><b/>c</a>").unwrap();
/// let a = doc.root_element().unwrap();
/// assert_eq!(serialize_node(&doc, a, 0, false), "<a><b/>c</a>");
/// ```
#[must_use]
pub fn serialize_node(doc: &RawDocument, id: NodeId, level: usize, format: bool) -> String {
    let options = SerializeOptions::default().indent(format);
    let mut writer = Writer::new(doc, &options);
    writer.run(id, level);
    writer.out
}

/// Pending output. Elements open and close as separate tasks so nesting
/// depth grows the task list, not the call stack.
enum Task {
    Node {
        id: NodeId,
        level: usize,
        in_element_only: bool,
    },
    EndTag {
        id: NodeId,
        level: usize,
        element_only: bool,
        pretty: bool,
    },
    Raw(&'static str),
}

struct Writer<'d, 'o> {
    doc: &'d RawDocument,
    out: String,
    options: &'o SerializeOptions,
    tasks: Vec<Task>,
}

impl<'d, 'o> Writer<'d, 'o> {
    fn new(doc: &'d RawDocument, options: &'o SerializeOptions) -> Self {
        Self {
            doc,
            out: String::new(),
            options,
            tasks: Vec::new(),
        }
    }

    fn run(&mut self, id: NodeId, level: usize) {
        self.tasks.push(Task::Node {
            id,
            level,
            in_element_only: false,
        });
        while let Some(task) = self.tasks.pop() {
            match task {
                Task::Node {
                    id,
                    level,
                    in_element_only,
                } => self.node(id, level, in_element_only),
                Task::EndTag {
                    id,
                    level,
                    element_only,
                    pretty,
                } => self.end_tag(id, level, element_only, pretty),
                Task::Raw(text) => self.out.push_str(text),
            }
        }
    }

    /// Queues `children` so they come off the task list in order, each
    /// followed by `separator` when one is given.
    fn queue_children(
        &mut self,
        children: Vec<NodeId>,
        level: usize,
        in_element_only: bool,
        separator: Option<&'static str>,
    ) {
        for child in children.into_iter().rev() {
            if let Some(sep) = separator {
                self.tasks.push(Task::Raw(sep));
            }
            self.tasks.push(Task::Node {
                id: child,
                level,
                in_element_only,
            });
        }
    }

    fn document(&mut self) {
        let doc = self.doc;
        self.out.push_str("<?xml version=\"");
        self.out.push_str(doc.version.as_deref().unwrap_or("1.0"));
        self.out.push('"');
        if let Some(encoding) = &doc.encoding {
            let _ = write!(self.out, " encoding=\"{encoding}\"");
        }
        if let Some(standalone) = doc.standalone {
            let _ = write!(self.out, " standalone=\"{}\"", if standalone { "yes" } else { "no" });
        }
        self.out.push_str("?>\n");
        let children = doc.children(doc.root()).collect();
        self.queue_children(children, 0, false, Some("\n"));
    }

    fn pad(&mut self, level: usize) {
        for _ in 0..level {
            self.out.push_str(&self.options.indent_str);
        }
    }

    /// Returns `true` if the element has element children and no
    /// significant character data.
    fn is_element_only(&self, id: NodeId) -> bool {
        let mut has_element = false;
        for child in self.doc.children(id) {
            match &self.doc.node(child).kind {
                NodeKind::Element { .. } => has_element = true,
                NodeKind::Text { content } if content.trim().is_empty() => {}
                NodeKind::Text { .. } | NodeKind::CData { .. } | NodeKind::EntityRef { .. } => {
                    return false;
                }
                _ => {}
            }
        }
        has_element
    }

    fn element(&mut self, id: NodeId, level: usize, pretty: bool) {
        let doc = self.doc;
        if pretty {
            self.pad(level);
        }
        self.out.push('<');
        self.out.push_str(&doc.node_name(id));
        for &ns in doc.ns_decls(id) {
            self.out.push(' ');
            self.node(ns, level, false);
        }
        for &attr in doc.attributes(id) {
            self.out.push(' ');
            self.node(attr, level, false);
        }
        if doc.first_child(id).is_none() {
            self.out.push_str("/>");
            if pretty {
                self.out.push('\n');
            }
            return;
        }
        self.out.push('>');
        let element_only = self.options.indent && self.is_element_only(id);
        if element_only {
            self.out.push('\n');
        }
        self.tasks.push(Task::EndTag {
            id,
            level,
            element_only,
            pretty,
        });
        let children = doc
            .children(id)
            .filter(|&c| !(element_only && matches!(doc.node(c).kind, NodeKind::Text { .. })))
            .collect();
        self.queue_children(children, level + 1, element_only, None);
    }

    fn end_tag(&mut self, id: NodeId, level: usize, element_only: bool, pretty: bool) {
        if element_only {
            self.pad(level);
        }
        self.out.push_str("</");
        self.out.push_str(&self.doc.node_name(id));
        self.out.push('>');
        if pretty {
            self.out.push('\n');
        }
    }

    fn node(&mut self, id: NodeId, level: usize, in_element_only: bool) {
        let doc = self.doc;
        let pretty = self.options.indent && in_element_only;
        match &doc.node(id).kind {
            NodeKind::Document(_) => self.document(),
            NodeKind::DocumentFragment => {
                let children = doc.children(id).collect();
                self.queue_children(children, level, false, None);
            }
            NodeKind::Element { .. } => self.element(id, level, pretty),
            NodeKind::Attribute { .. } => {
                self.out.push_str(&doc.node_name(id));
                self.out.push_str("=\"");
                escape_attr(&mut self.out, doc.content(id).unwrap_or_default());
                self.out.push('"');
            }
            NodeKind::NamespaceDecl { uri, .. } => {
                self.out.push_str(&doc.node_name(id));
                self.out.push_str("=\"");
                escape_attr(&mut self.out, uri);
                self.out.push('"');
            }
            NodeKind::Text { content } => escape_text(&mut self.out, content),
            NodeKind::CData { content } => {
                let _ = write!(self.out, "<![CDATA[{content}]]>");
            }
            NodeKind::Comment { content } => {
                if pretty {
                    self.pad(level);
                }
                let _ = write!(self.out, "<!--{content}-->");
                if pretty {
                    self.out.push('\n');
                }
            }
            NodeKind::ProcessingInstruction { target, data } => {
                if pretty {
                    self.pad(level);
                }
                match data {
                    Some(d) => {
                        let _ = write!(self.out, "<?{target} {d}?>");
                    }
                    None => {
                        let _ = write!(self.out, "<?{target}?>");
                    }
                }
                if pretty {
                    self.out.push('\n');
                }
            }
            NodeKind::EntityRef { name, .. } => {
                let _ = write!(self.out, "&{name};");
            }
            NodeKind::Entity { name, content } => {
                let _ = write!(self.out, "<!ENTITY {name} {}>", quote_literal(content));
            }
            NodeKind::DocumentType {
                name,
                public_id,
                system_id,
            } => {
                let _ = write!(self.out, "<!DOCTYPE {name}");
                self.external_id(public_id.as_deref(), system_id.as_deref());
                self.out.push('>');
            }
            NodeKind::Dtd {
                name,
                public_id,
                system_id,
            } => {
                let _ = write!(self.out, "<!DOCTYPE {name}");
                self.external_id(public_id.as_deref(), system_id.as_deref());
                if doc.first_child(id).is_some() {
                    self.out.push_str(" [\n");
                    self.tasks.push(Task::Raw("]>"));
                    let decls = doc.children(id).collect();
                    self.queue_children(decls, level, false, Some("\n"));
                } else {
                    self.out.push('>');
                }
            }
            NodeKind::Notation {
                name,
                public_id,
                system_id,
            } => {
                let _ = write!(self.out, "<!NOTATION {name}");
                self.external_id(public_id.as_deref(), system_id.as_deref());
                self.out.push('>');
            }
            NodeKind::ElementDecl { name, content } => {
                let _ = write!(self.out, "<!ELEMENT {name} {content}>");
            }
            NodeKind::AttributeDecl {
                element,
                name,
                attr_type,
                default,
            } => {
                let default = default
                    .as_deref()
                    .map_or_else(|| "#IMPLIED".to_string(), quote_literal);
                let _ = write!(self.out, "<!ATTLIST {element} {name} {attr_type} {default}>");
            }
            NodeKind::EntityDecl {
                name,
                parameter,
                value,
                public_id,
                system_id,
            } => {
                self.out.push_str("<!ENTITY ");
                if *parameter {
                    self.out.push_str("% ");
                }
                self.out.push_str(name);
                match value {
                    Some(v) => {
                        self.out.push(' ');
                        self.out.push_str(&quote_literal(v));
                    }
                    None => self.external_id(public_id.as_deref(), system_id.as_deref()),
                }
                self.out.push('>');
            }
            NodeKind::XIncludeStart | NodeKind::XIncludeEnd => {}
        }
    }

    fn external_id(&mut self, public_id: Option<&str>, system_id: Option<&str>) {
        match (public_id, system_id) {
            (Some(p), Some(s)) => {
                let _ = write!(self.out, " PUBLIC {} {}", quote_literal(p), quote_literal(s));
            }
            (Some(p), None) => {
                let _ = write!(self.out, " PUBLIC {}", quote_literal(p));
            }
            (None, Some(s)) => {
                let _ = write!(self.out, " SYSTEM {}", quote_literal(s));
            }
            (None, None) => {}
        }
    }
}

/// Quotes a DTD literal, switching to single quotes when the value holds
/// a double quote.
fn quote_literal(value: &str) -> String {
    if value.contains('"') {
        format!("'{value}'")
    } else {
        format!("\"{value}\"")
    }
}

/// Escapes character data: `&`, `<`, `>` and `\r`.
pub(crate) fn escape_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(ch),
        }
    }
}

/// Escapes an attribute value for a double-quoted attribute.
pub(crate) fn escape_attr(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::{parse_str, parse_str_with_options, ParseOptions};
    use crate::tree::NodeType;
    use pretty_assertions::assert_eq;

    /// A chain of `depth` nested `d` elements under the document node.
    fn deep_chain(depth: usize) -> RawDocument {
        let mut doc = RawDocument::default();
        let mut top = doc.create_node(NodeKind::element("d"));
        for _ in 1..depth {
            let parent = doc.create_node(NodeKind::element("d"));
            doc.link_last(parent, top);
            top = parent;
        }
        let root = doc.root();
        doc.link_last(root, top);
        doc
    }

    fn node_xml(input: &str) -> String {
        let doc = parse_str(input).unwrap();
        serialize_node(&doc, doc.root_element().unwrap(), 0, false)
    }

    #[test]
    fn test_empty_and_mixed_content() {
        assert_eq!(node_xml("<a><b/>c</a>"), "<a><b/>c</a>");
        assert_eq!(node_xml("<a></a>"), "<a/>");
    }

    #[test]
    fn test_namespaces_before_attributes() {
        assert_eq!(
            node_xml("<p:a k='1' xmlns:p='urn:p'/>"),
            "<p:a xmlns:p=\"urn:p\" k=\"1\"/>"
        );
    }

    #[test]
    fn test_attribute_alone() {
        let doc = parse_str("<a name='v'/>").unwrap();
        let attr = doc.attributes(doc.root_element().unwrap())[0];
        assert_eq!(serialize_node(&doc, attr, 0, false), "name=\"v\"");
    }

    #[test]
    fn test_escaping() {
        assert_eq!(
            node_xml("<a t='&quot;&lt;&#10;'>&amp;&lt;&gt;</a>"),
            "<a t=\"&quot;&lt;&#10;\">&amp;&lt;&gt;</a>"
        );
    }

    #[test]
    fn test_document_with_declaration() {
        let doc = parse_str("<?xml version='1.0' encoding='UTF-8'?><!--c--><r/>").unwrap();
        assert_eq!(
            serialize(&doc),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!--c-->\n<r/>\n"
        );
    }

    #[test]
    fn test_indented_output() {
        let doc = parse_str("<r><a><b/></a><c>t</c></r>").unwrap();
        let r = doc.root_element().unwrap();
        assert_eq!(
            serialize_node(&doc, r, 0, true),
            "<r>\n  <a>\n    <b/>\n  </a>\n  <c>t</c>\n</r>"
        );
    }

    #[test]
    fn test_dtd_round_trips() {
        let input = "<!DOCTYPE r [<!ENTITY co \"Acme\"><!ELEMENT r ANY>]><r>&co;</r>";
        let doc = parse_str(input).unwrap();
        let text = serialize(&doc);
        assert!(text.contains("<!DOCTYPE r [\n<!ENTITY co \"Acme\">\n<!ELEMENT r ANY>\n]>"));
        assert!(text.contains("<r>&co;</r>"));

        let again = parse_str(&text).unwrap();
        let r = again.root_element().unwrap();
        assert_eq!(again.node_type(again.first_child(r).unwrap()), NodeType::EntityRef);
    }

    #[test]
    fn test_cdata_and_pi() {
        let doc = parse_str_with_options("<r><?p d?><![CDATA[<&>]]></r>", ParseOptions::default())
            .unwrap();
        let r = doc.root_element().unwrap();
        assert_eq!(serialize_node(&doc, r, 0, false), "<r><?p d?><![CDATA[<&>]]></r>");
    }

    #[test]
    fn test_deep_tree_serializes() {
        let depth = 20_000;
        let doc = deep_chain(depth);
        let top = doc.root_element().unwrap();
        let expected = format!("{}<d/>{}", "<d>".repeat(depth - 1), "</d>".repeat(depth - 1));
        assert_eq!(serialize_node(&doc, top, 0, false), expected);
        assert!(serialize(&doc).ends_with("</d>\n"));

        let depth = 1_000;
        let doc = deep_chain(depth);
        let indented = serialize_node(&doc, doc.root_element().unwrap(), 0, true);
        assert_eq!(indented.lines().count(), 2 * depth - 1);
        let innermost = format!("{}<d/>", "  ".repeat(depth - 1));
        assert!(indented.lines().any(|line| line == innermost));
    }

    #[test]
    fn test_fragment_children_in_order() {
        let mut doc = RawDocument::default();
        let frag = doc.create_node(NodeKind::DocumentFragment);
        for name in ["x", "y"] {
            let e = doc.create_node(NodeKind::element(name));
            doc.link_last(frag, e);
        }
        assert_eq!(serialize_node(&doc, frag, 0, false), "<x/><y/>");
    }
}
