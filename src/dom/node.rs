//! Node handles and the capability set shared by every node type.
//!
//! A [`NodeHandle`] is an engine handle plus a weak reference to the
//! document that owns it. Nothing is cached: every accessor upgrades the
//! reference, borrows the arena and reads live state, so wrappers never go
//! stale after mutation and fail with [`DomError::UseAfterFree`] once the
//! document is gone.

use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use tracing::debug;

use super::dispatch::{
    self, Attribute, Element, Namespace, Node, ProcessingInstruction, Text,
};
use super::document::{Document, DocumentCell};
use super::list::NodeList;
use super::walk;
use super::xpath::{XPathContext, XPathObject};
use crate::error::{DomError, Result};
use crate::serial::{canonicalize, serialize_node};
use crate::tree::{NodeId, NodeKind, NodeType, RawDocument};
use crate::util::qname::{is_valid_ncname, validate_qname};

pub(crate) fn check_qname(name: &str) -> Result<(Option<&str>, &str)> {
    validate_qname(name).map_err(|_| DomError::InvalidNodeName(name.to_string()))
}

pub(crate) fn check_ncname(name: &str) -> Result<()> {
    if is_valid_ncname(name) {
        Ok(())
    } else {
        Err(DomError::InvalidNodeName(name.to_string()))
    }
}

/// An engine node handle tied to its owning document.
///
/// Two handles are equal when they name the same node of the same document.
#[derive(Clone)]
pub struct NodeHandle {
    doc: Weak<DocumentCell>,
    id: NodeId,
    node_type: NodeType,
}

impl NodeHandle {
    pub(crate) fn new(doc: Weak<DocumentCell>, id: NodeId, node_type: NodeType) -> Self {
        Self { doc, id, node_type }
    }

    /// The type recorded when the handle was dispatched.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// The raw engine handle.
    #[must_use]
    pub fn raw(&self) -> u32 {
        self.id.into_raw()
    }

    /// Whether the owning document is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.doc.upgrade().is_some_and(|cell| !cell.is_released())
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn document(&self) -> &Weak<DocumentCell> {
        &self.doc
    }

    pub(crate) fn cell(&self) -> Result<Rc<DocumentCell>> {
        self.doc.upgrade().ok_or(DomError::UseAfterFree)
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&RawDocument, NodeId) -> T) -> Result<T> {
        self.cell()?.with_raw(|raw| f(raw, self.id))
    }

    pub(crate) fn write<T>(&self, f: impl FnOnce(&mut RawDocument, NodeId) -> T) -> Result<T> {
        self.cell()?.with_raw_mut(|raw| f(raw, self.id))
    }

    /// A handle to another node of the same document.
    pub(crate) fn sibling(&self, id: NodeId, node_type: NodeType) -> Self {
        Self::new(self.doc.clone(), id, node_type)
    }

    pub(crate) fn same_document(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.doc, &other.doc)
    }

    /// Navigates with `step` and wraps the result.
    fn related(&self, step: impl FnOnce(&RawDocument, NodeId) -> Option<NodeId>) -> Result<Node> {
        self.read(|raw, id| step(raw, id).map(|other| dispatch::wrap(&self.doc, raw, other)))?
            .ok_or(DomError::NodeNotFound)?
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.same_document(other)
    }
}

impl Eq for NodeHandle {}

impl Hash for NodeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.doc.as_ptr().hash(state);
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id.into_raw())
            .field("node_type", &self.node_type)
            .finish()
    }
}

/// Operations available on every node.
///
/// Implementors only provide [`handle`](Self::handle); everything else is
/// computed from the engine on each call.
pub trait DomNode {
    fn handle(&self) -> &NodeHandle;

    /// Survives the release of the owning document.
    fn node_type(&self) -> NodeType {
        self.handle().node_type()
    }

    /// This node as the [`Node`] sum type.
    fn as_node(&self) -> Node {
        Node::from_handle(self.handle().clone())
    }

    /// Handle equality, not wrapper identity.
    fn is_same_node(&self, other: &dyn DomNode) -> bool {
        self.handle() == other.handle()
    }

    /// Another handle to the owning document.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn owner_document(&self) -> Result<Document> {
        let cell = self.handle().cell()?;
        Document::from_cell(cell)
    }

    // --- Navigation ---

    /// The parent, or the owning element for attributes and namespace
    /// declarations.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::NodeNotFound`] at the top of a tree.
    fn parent_node(&self) -> Result<Node> {
        self.handle().related(RawDocument::parent)
    }

    /// # Errors
    ///
    /// Returns [`DomError::NodeNotFound`] for a node without children.
    fn first_child(&self) -> Result<Node> {
        self.handle().related(RawDocument::first_child)
    }

    /// # Errors
    ///
    /// Returns [`DomError::NodeNotFound`] for a node without children.
    fn last_child(&self) -> Result<Node> {
        self.handle().related(RawDocument::last_child)
    }

    /// # Errors
    ///
    /// Returns [`DomError::NodeNotFound`] for the last child.
    fn next_sibling(&self) -> Result<Node> {
        self.handle().related(RawDocument::next_sibling)
    }

    /// # Errors
    ///
    /// Returns [`DomError::NodeNotFound`] for the first child.
    fn previous_sibling(&self) -> Result<Node> {
        self.handle().related(RawDocument::prev_sibling)
    }

    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn child_nodes(&self) -> Result<NodeList> {
        let handle = self.handle();
        handle.read(|raw, id| {
            raw.children(id)
                .map(|child| dispatch::wrap(handle.document(), raw, child))
                .collect::<Result<NodeList>>()
        })?
    }

    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn has_child_nodes(&self) -> Result<bool> {
        self.handle().read(|raw, id| raw.first_child(id).is_some())
    }

    // --- Names and values ---

    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn node_name(&self) -> Result<String> {
        self.handle().read(|raw, id| raw.node_name(id))
    }

    /// Renames an element, attribute, processing instruction or entity
    /// reference.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidNodeName`] for a malformed name and
    /// [`DomError::InvalidArgument`] for node types whose name is fixed.
    fn set_node_name(&self, name: &str) -> Result<()> {
        let (prefix, local) = match self.node_type() {
            NodeType::Element | NodeType::Attribute => check_qname(name)?,
            NodeType::ProcessingInstruction | NodeType::EntityRef => {
                check_ncname(name)?;
                (None, name)
            }
            other => {
                return Err(DomError::invalid(format!("cannot rename {other:?} nodes")));
            }
        };
        self.handle()
            .write(|raw, id| raw.rename(id, prefix, local))??;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn local_name(&self) -> Result<Option<String>> {
        self.handle()
            .read(|raw, id| raw.local_name(id).map(str::to_string))
    }

    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn namespace_uri(&self) -> Result<Option<String>> {
        self.handle()
            .read(|raw, id| raw.namespace_uri(id).map(str::to_string))
    }

    /// The prefix of an element or attribute name.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn namespace_prefix(&self) -> Result<Option<String>> {
        self.handle()
            .read(|raw, id| raw.prefix(id).map(str::to_string))
    }

    /// The stored value: `None` for elements, documents and fragments.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn node_value(&self) -> Result<Option<String>> {
        self.handle().read(|raw, id| match &raw.node(id).kind {
            NodeKind::Element { .. } | NodeKind::Document(_) | NodeKind::DocumentFragment => None,
            _ => raw.content(id).map(str::to_string),
        })
    }

    /// Replaces the stored value. On elements the children are replaced by
    /// a single text node.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidArgument`] for node types without a
    /// settable value.
    fn set_node_value(&self, value: &str) -> Result<()> {
        self.handle().write(|raw, id| raw.set_content(id, value))??;
        Ok(())
    }

    /// Concatenated character data of all descendants, or the stored value
    /// of a leaf.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn text_content(&self) -> Result<String> {
        self.handle().read(|raw, id| raw.string_value(id))
    }

    /// The semantic value: an attribute's value rather than `name="value"`,
    /// a comment's text rather than `<!--text-->`, an element's text.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn literal(&self) -> Result<String> {
        self.handle().read(|raw, id| match &raw.node(id).kind {
            NodeKind::Dtd { .. } | NodeKind::DocumentType { .. } | NodeKind::Notation { .. } => {
                String::new()
            }
            _ => raw.string_value(id),
        })
    }

    // --- Serialization ---

    /// Markup of this node and its descendants.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn to_xml(&self) -> Result<String> {
        self.to_xml_formatted(0, false)
    }

    /// Markup with explicit indentation: `level` is the starting depth and
    /// `format` turns on indentation of element-only content.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn to_xml_formatted(&self, level: usize, format: bool) -> Result<String> {
        self.handle()
            .read(|raw, id| serialize_node(raw, id, level, format))
    }

    /// Canonical XML 1.0 of this node's subtree.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::Serialization`] for detached nodes, node types
    /// that have no canonical form, and relative namespace URIs.
    fn to_c14n(&self, with_comments: bool) -> Result<String> {
        let handle = self.handle();
        handle
            .read(|raw, id| canonicalize(raw, id, with_comments))?
            .map_err(|err| {
                debug!(handle = handle.raw(), error = %err, "canonicalization failed");
                DomError::from(err)
            })
    }

    // --- Mutation ---

    /// Appends `child` with only the engine's structural checks; attributes
    /// and namespace declarations are attached to an element instead.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidArgument`] if the engine rejects the
    /// insertion or `child` belongs to another document.
    fn add_child(&self, child: &dyn DomNode) -> Result<()> {
        let parent = self.handle();
        let child = child.handle();
        if !parent.same_document(child) {
            return Err(DomError::invalid("node belongs to another document"));
        }
        let (p, c) = (parent.id(), child.id());
        parent.write(|raw, _| match raw.node_type(c) {
            NodeType::Attribute => raw.set_attribute_node(p, c),
            NodeType::NamespaceDecl => raw.add_ns_decl(p, c),
            _ => raw.append_child(p, c),
        })??;
        Ok(())
    }

    /// Appends `child` after validating that it can live in a child list.
    /// Under a document node a second root element and character data are
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidArgument`] for a child that is not
    /// child-capable, belongs to another document, would break the single
    /// root rule, or is refused by the engine.
    fn append_child(&self, child: &dyn DomNode) -> Result<()> {
        let parent = self.handle();
        let child = child.handle();
        if !parent.same_document(child) {
            return Err(DomError::invalid("node belongs to another document"));
        }
        let (p, c) = (parent.id(), child.id());
        parent.write(|raw, _| {
            let kind = &raw.node(c).kind;
            if !kind.is_child_capable() {
                return Err(DomError::invalid(format!(
                    "{:?} nodes cannot be appended as children",
                    kind.node_type()
                )));
            }
            if raw.node_type(p).is_document() {
                check_top_level(raw, c)?;
            }
            raw.append_child(p, c).map_err(DomError::from)
        })?
    }

    /// Detaches this node. It stays owned by the document and can be
    /// inserted again.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    fn remove(&self) -> Result<()> {
        self.handle().write(|raw, id| raw.detach(id))
    }

    // --- Queries ---

    /// Evaluates `expr` with this node as the context node.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::XPathSyntax`] or [`DomError::XPathEval`].
    fn find(&self, expr: &str) -> Result<XPathObject> {
        XPathContext::for_handle(self.handle())?.evaluate(expr)
    }

    /// Evaluates `expr` and returns the matched nodes.
    ///
    /// # Errors
    ///
    /// As [`find`](Self::find), plus [`DomError::InvalidArgument`] when the
    /// result is not a node-set.
    fn find_nodes(&self, expr: &str) -> Result<NodeList> {
        self.find(expr)?.node_list()
    }

    /// Evaluates `expr` and returns its text: the literal values of matched
    /// nodes, or the string form of a scalar.
    ///
    /// # Errors
    ///
    /// As [`find`](Self::find).
    fn find_value(&self, expr: &str) -> Result<String> {
        let mut result = self.find(expr)?;
        result.force_literal = true;
        result.string_value()
    }

    /// Depth-first pre-order traversal starting at this node. The first
    /// error returned by `visitor` stops the walk and is returned as is.
    ///
    /// # Errors
    ///
    /// Returns the visitor's error, or a navigation error converted into `E`.
    fn walk<E, F>(&self, visitor: F) -> std::result::Result<(), E>
    where
        Self: Sized,
        E: From<DomError>,
        F: FnMut(&Node) -> std::result::Result<(), E>,
    {
        walk::walk(&self.as_node(), visitor)
    }
}

/// Rules for children of a document node.
fn check_top_level(raw: &RawDocument, child: NodeId) -> Result<()> {
    let incoming: Vec<NodeId> = match raw.node_type(child) {
        NodeType::DocumentFragment => raw.children(child).collect(),
        _ => vec![child],
    };
    let mut elements = usize::from(raw.root_element().is_some_and(|r| r != child));
    for id in incoming {
        match raw.node_type(id) {
            NodeType::Element => elements += 1,
            NodeType::Comment | NodeType::ProcessingInstruction => {}
            other => {
                return Err(DomError::invalid(format!(
                    "{other:?} nodes are not allowed at document level"
                )));
            }
        }
    }
    if elements > 1 {
        return Err(DomError::invalid("document already has a root element"));
    }
    Ok(())
}

impl Element {
    /// Attribute nodes in document order.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    pub fn attributes(&self) -> Result<Vec<Attribute>> {
        let ids = self.0.read(|raw, id| raw.attributes(id).to_vec())?;
        Ok(ids
            .into_iter()
            .map(|a| Attribute(self.0.sibling(a, NodeType::Attribute)))
            .collect())
    }

    /// The value of the attribute with qualified name `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    pub fn get_attribute(&self, name: &str) -> Result<Option<String>> {
        self.0
            .read(|raw, id| raw.attribute(id, name).map(str::to_string))
    }

    /// # Errors
    ///
    /// Returns [`DomError::NodeNotFound`] if there is no such attribute.
    pub fn get_attribute_node(&self, name: &str) -> Result<Attribute> {
        let attr = self
            .0
            .read(|raw, id| raw.attribute_node(id, name))?
            .ok_or(DomError::NodeNotFound)?;
        Ok(Attribute(self.0.sibling(attr, NodeType::Attribute)))
    }

    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    pub fn has_attribute(&self, name: &str) -> Result<bool> {
        self.0.read(|raw, id| raw.attribute_node(id, name).is_some())
    }

    /// Sets an attribute, creating it if needed. A prefix is resolved
    /// against the declarations in scope.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidNodeName`] for a malformed name and
    /// [`DomError::InvalidArgument`] for `xmlns` names, which are set with
    /// [`set_namespace`](Self::set_namespace).
    pub fn set_attribute(&self, name: &str, value: &str) -> Result<Attribute> {
        let (prefix, local) = check_qname(name)?;
        if name == "xmlns" || prefix == Some("xmlns") {
            return Err(DomError::invalid("namespace declarations are set with set_namespace"));
        }
        let attr = self
            .0
            .write(|raw, id| raw.set_attribute(id, prefix, local, value))??;
        Ok(Attribute(self.0.sibling(attr, NodeType::Attribute)))
    }

    /// # Errors
    ///
    /// Returns [`DomError::NodeNotFound`] if there is no such attribute.
    pub fn remove_attribute(&self, name: &str) -> Result<()> {
        self.0.write(|raw, id| match raw.attribute_node(id, name) {
            Some(attr) => {
                raw.detach(attr);
                Ok(())
            }
            None => Err(DomError::NodeNotFound),
        })?
    }

    /// Namespace declarations carried by this element.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    pub fn namespaces(&self) -> Result<Vec<Namespace>> {
        let ids = self.0.read(|raw, id| raw.ns_decls(id).to_vec())?;
        Ok(ids
            .into_iter()
            .map(|n| Namespace(self.0.sibling(n, NodeType::NamespaceDecl)))
            .collect())
    }

    /// Declares `prefix` (or the default namespace) as `uri` on this
    /// element. With `activate` the element itself moves into `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidNodeName`] for a malformed prefix and
    /// [`DomError::InvalidArgument`] for the reserved `xml` and `xmlns`
    /// prefixes.
    pub fn set_namespace(&self, uri: &str, prefix: Option<&str>, activate: bool) -> Result<()> {
        if let Some(p) = prefix {
            check_ncname(p)?;
            if p == "xml" || p == "xmlns" {
                return Err(DomError::invalid(format!("prefix '{p}' is reserved")));
            }
        }
        self.0.write(|raw, id| {
            let decl = raw.create_node(NodeKind::NamespaceDecl {
                prefix: prefix.map(str::to_string),
                uri: uri.to_string(),
            });
            raw.add_ns_decl(id, decl)?;
            if activate {
                raw.set_element_namespace(id, prefix, (!uri.is_empty()).then_some(uri));
            }
            Ok::<_, crate::tree::TreeError>(())
        })??;
        Ok(())
    }

    /// The URI bound to `prefix` (`None` for the default namespace) here.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::NodeNotFound`] if the prefix is unbound.
    pub fn lookup_namespace_uri(&self, prefix: Option<&str>) -> Result<String> {
        self.0
            .read(|raw, id| raw.lookup_namespace(id, prefix).map(str::to_string))?
            .ok_or(DomError::NodeNotFound)
    }

    /// A prefix bound to `uri` here; `Ok(None)` when `uri` is the default
    /// namespace.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::NodeNotFound`] if no binding for `uri` is in scope.
    pub fn lookup_namespace_prefix(&self, uri: &str) -> Result<Option<String>> {
        self.0
            .read(|raw, id| {
                raw.lookup_prefix(id, uri)
                    .map(|p| p.map(str::to_string))
            })?
            .ok_or(DomError::NodeNotFound)
    }

    /// Appends a text node.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidArgument`] for a read-only document.
    pub fn append_text(&self, text: &str) -> Result<Text> {
        let id = self.0.write(|raw, id| {
            let t = raw.create_node(NodeKind::text(text));
            raw.append_child(id, t).map(|()| t)
        })??;
        Ok(Text(self.0.sibling(id, NodeType::Text)))
    }

    /// Descendant elements whose qualified name is `name`, or all of them
    /// for `*`, in document order.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    pub fn get_elements_by_tag_name(&self, name: &str) -> Result<NodeList> {
        let ids = self.0.read(|raw, id| {
            raw.descendants(id)
                .filter(|&d| {
                    raw.node_type(d) == NodeType::Element && (name == "*" || raw.node_name(d) == name)
                })
                .collect::<Vec<_>>()
        })?;
        Ok(ids
            .into_iter()
            .map(|e| Node::Element(Element(self.0.sibling(e, NodeType::Element))))
            .collect())
    }
}

impl Attribute {
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    pub fn value(&self) -> Result<String> {
        self.literal()
    }

    /// # Errors
    ///
    /// Returns [`DomError::InvalidArgument`] for a read-only document.
    pub fn set_value(&self, value: &str) -> Result<()> {
        self.set_node_value(value)
    }

    /// # Errors
    ///
    /// Returns [`DomError::NodeNotFound`] for a detached attribute.
    pub fn owner_element(&self) -> Result<Element> {
        Element::try_from(self.parent_node()?)
    }
}

impl Namespace {
    /// `None` for the default namespace.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    pub fn prefix(&self) -> Result<Option<String>> {
        self.0.read(|raw, id| match &raw.node(id).kind {
            NodeKind::NamespaceDecl { prefix, .. } => prefix.clone(),
            _ => None,
        })
    }

    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    pub fn uri(&self) -> Result<String> {
        self.literal()
    }
}

impl ProcessingInstruction {
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    pub fn target(&self) -> Result<String> {
        self.node_name()
    }

    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] once the document is released.
    pub fn data(&self) -> Result<String> {
        self.literal()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(xml: &str) -> Document {
        Document::parse_str(xml).unwrap()
    }

    #[test]
    fn test_navigation_is_live() {
        let d = doc("<a><b/>c</a>");
        let a = d.document_element().unwrap();
        let b = a.first_child().unwrap();
        assert_eq!(b.node_name().unwrap(), "b");
        assert_eq!(b.next_sibling().unwrap().literal().unwrap(), "c");
        assert!(matches!(b.previous_sibling(), Err(DomError::NodeNotFound)));

        let fresh = d.create_element("z").unwrap();
        a.append_child(&fresh).unwrap();
        assert!(a.last_child().unwrap().is_same_node(&fresh));
        assert_eq!(a.child_nodes().unwrap().len(), 3);
    }

    #[test]
    fn test_parent_of_attribute_is_owner() {
        let d = doc("<a k='v'/>");
        let a = d.document_element().unwrap();
        let k = a.get_attribute_node("k").unwrap();
        assert!(k.owner_element().unwrap().is_same_node(&a));
        assert!(!k.has_child_nodes().unwrap());
        assert_eq!(k.literal().unwrap(), "v");
        assert_eq!(k.to_xml().unwrap(), "k=\"v\"");
    }

    #[test]
    fn test_set_node_name_validates() {
        let d = doc("<a/>");
        let a = d.document_element().unwrap();
        assert!(matches!(a.set_node_name("9x"), Err(DomError::InvalidNodeName(_))));
        a.set_node_name("renamed").unwrap();
        assert_eq!(a.to_xml().unwrap(), "<renamed/>");
        let text = a.append_text("t").unwrap();
        assert!(matches!(text.set_node_name("x"), Err(DomError::InvalidArgument(_))));
    }

    #[test]
    fn test_node_values() {
        let d = doc("<a><!--note--><?go fast?></a>");
        let a = d.document_element().unwrap();
        assert_eq!(a.node_value().unwrap(), None);
        let comment = a.first_child().unwrap();
        assert_eq!(comment.node_value().unwrap().as_deref(), Some("note"));
        comment.set_node_value("changed").unwrap();
        assert_eq!(comment.to_xml().unwrap(), "<!--changed-->");
        let pi = ProcessingInstruction::try_from(a.last_child().unwrap()).unwrap();
        assert_eq!(pi.target().unwrap(), "go");
        assert_eq!(pi.data().unwrap(), "fast");
    }

    #[test]
    fn test_append_child_rejects_attributes_and_foreign_nodes() {
        let d = doc("<a/>");
        let a = d.document_element().unwrap();
        let attr = d.create_attribute("k", "v").unwrap();
        assert!(matches!(a.append_child(&attr), Err(DomError::InvalidArgument(_))));
        a.add_child(&attr).unwrap();
        assert_eq!(a.get_attribute("k").unwrap().as_deref(), Some("v"));

        let other = doc("<x/>");
        let x = other.document_element().unwrap();
        assert!(matches!(a.append_child(&x), Err(DomError::InvalidArgument(_))));
    }

    #[test]
    fn test_append_child_rejects_cycles() {
        let d = doc("<a><b/></a>");
        let a = d.document_element().unwrap();
        let b = a.first_child().unwrap();
        assert!(matches!(b.append_child(&a), Err(DomError::InvalidArgument(_))));
    }

    #[test]
    fn test_document_single_root() {
        let d = doc("<a/>");
        let second = d.create_element("b").unwrap();
        assert!(matches!(d.append_child(&second), Err(DomError::InvalidArgument(_))));
        let text = d.create_text_node("x").unwrap();
        assert!(matches!(d.append_child(&text), Err(DomError::InvalidArgument(_))));
        let comment = d.create_comment("ok").unwrap();
        d.append_child(&comment).unwrap();
        assert_eq!(d.to_xml().unwrap(), "<?xml version=\"1.0\"?>\n<a/>\n<!--ok-->\n");
    }

    #[test]
    fn test_remove_keeps_node_usable() {
        let d = doc("<a><b/></a>");
        let a = d.document_element().unwrap();
        let b = a.first_child().unwrap();
        b.remove().unwrap();
        assert!(!a.has_child_nodes().unwrap());
        assert!(matches!(b.parent_node(), Err(DomError::NodeNotFound)));
        a.append_child(&b).unwrap();
        assert_eq!(a.to_xml().unwrap(), "<a><b/></a>");
    }

    #[test]
    fn test_attribute_accessors() {
        let d = doc("<a x='1'/>");
        let a = d.document_element().unwrap();
        assert!(a.has_attribute("x").unwrap());
        a.set_attribute("y", "2").unwrap();
        assert_eq!(a.attributes().unwrap().len(), 2);
        a.remove_attribute("x").unwrap();
        assert!(matches!(a.remove_attribute("x"), Err(DomError::NodeNotFound)));
        assert!(matches!(a.get_attribute_node("x"), Err(DomError::NodeNotFound)));
        assert!(matches!(
            a.set_attribute("xmlns:p", "urn:p"),
            Err(DomError::InvalidArgument(_))
        ));
        let y = a.get_attribute_node("y").unwrap();
        y.set_value("3").unwrap();
        assert_eq!(a.to_xml().unwrap(), "<a y=\"3\"/>");
    }

    #[test]
    fn test_namespaces() {
        let d = doc("<r xmlns='urn:d' xmlns:p='urn:p'><p:c/></r>");
        let r = d.document_element().unwrap();
        let decls = r.namespaces().unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].prefix().unwrap().as_deref(), Some("p"));
        assert_eq!(decls[1].uri().unwrap(), "urn:p");
        let c = Element::try_from(r.first_child().unwrap()).unwrap();
        assert_eq!(c.lookup_namespace_uri(Some("p")).unwrap(), "urn:p");
        assert_eq!(c.lookup_namespace_uri(None).unwrap(), "urn:d");
        assert_eq!(c.lookup_namespace_prefix("urn:d").unwrap(), None);
        assert!(matches!(c.lookup_namespace_uri(Some("q")), Err(DomError::NodeNotFound)));

        c.set_namespace("urn:q", Some("q"), true).unwrap();
        assert_eq!(c.namespace_uri().unwrap().as_deref(), Some("urn:q"));
        assert_eq!(c.node_name().unwrap(), "q:c");
        assert!(matches!(
            c.set_namespace("urn:x", Some("xml"), false),
            Err(DomError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_elements_by_tag_name() {
        let d = doc("<r><i/><g><i/></g><j/></r>");
        let r = d.document_element().unwrap();
        assert_eq!(r.get_elements_by_tag_name("i").unwrap().len(), 2);
        assert_eq!(r.get_elements_by_tag_name("*").unwrap().len(), 4);
    }

    #[test]
    fn test_c14n_failures_are_serialization_errors() {
        let d = doc("<a k='v'/>");
        let a = d.document_element().unwrap();
        let detached = d.create_element("x").unwrap();
        assert!(matches!(detached.to_c14n(false), Err(DomError::Serialization(_))));
        let attr = a.get_attribute_node("k").unwrap();
        assert!(matches!(attr.to_c14n(false), Err(DomError::Serialization(_))));
        assert_eq!(a.to_c14n(false).unwrap(), "<a k=\"v\"></a>");
    }

    #[test]
    fn test_owner_document_shares_lifetime() {
        let d = doc("<a/>");
        let a = d.document_element().unwrap();
        let owner = a.owner_document().unwrap();
        owner.free();
        assert!(d.is_freed());
        assert!(!a.handle().is_alive());
        assert!(matches!(a.to_xml(), Err(DomError::UseAfterFree)));
    }
}
