//! Arena-based XML tree engine.
//!
//! All nodes of a document live in a contiguous `Vec<NodeData>` owned by the
//! `RawDocument` and are referenced by `NodeId`, a newtype over `NonZeroU32`.
//! A `NodeId` is the engine's node handle: it is cheap to copy, compares by
//! value, and never dangles while the owning `RawDocument` is alive.
//! Dropping the `RawDocument` releases every node at once.
//!
//! # Architecture
//!
//! Navigation links (parent, first\_child, last\_child, next\_sibling,
//! prev\_sibling) are arena indices. Attributes and namespace declarations
//! are arena nodes too, so they have handles of their own; they hang off
//! their element through `NodeKind::Element::{attributes, ns_decls}` and
//! point back at it through `parent`, but never appear in a child list.
//! Detached nodes stay allocated until the document is dropped.

mod node;

pub use node::{DocumentKind, NodeKind, NodeType};

use std::cmp::Ordering;
use std::collections::HashMap;
use std::num::NonZeroU32;

use thiserror::Error;

use crate::error::ParseDiagnostic;
use crate::util::qname::{join_qname, XML_NAMESPACE};

/// A typed index into the document's node arena.
///
/// `Option<NodeId>` has the same size as `NodeId` (niche optimization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    /// # Panics
    ///
    /// Panics if `index` is 0.
    #[allow(clippy::expect_used, clippy::cast_possible_truncation)]
    fn from_index(index: usize) -> Self {
        Self(NonZeroU32::new(index as u32).expect("NodeId index must be non-zero"))
    }

    fn as_index(self) -> usize {
        self.0.get() as usize
    }

    /// The raw handle value. Always non-zero.
    #[must_use]
    pub fn into_raw(self) -> u32 {
        self.0.get()
    }

    /// Rebuilds a handle from its raw value; `None` for 0.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }
}

/// Storage for a single node in the arena.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// Kind and payload.
    pub kind: NodeKind,
    /// Parent node. For attributes and namespace declarations this is the
    /// owning element.
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
            prev_sibling: None,
        }
    }
}

/// Structural errors reported by tree mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("a node cannot be inserted into its own subtree")]
    Cycle,
    #[error("{0:?} nodes cannot be placed in a child list")]
    NotChildCapable(NodeType),
    #[error("{0:?} nodes cannot have children")]
    NoChildren(NodeType),
    #[error("operation not supported on {0:?} nodes")]
    Unsupported(NodeType),
    #[error("node {0:?} does not belong to this document")]
    ForeignNode(u32),
}

/// A native XML document: the node arena plus document-level metadata.
#[derive(Debug)]
pub struct RawDocument {
    /// The node arena. Index 0 is a placeholder for `NonZeroU32`.
    nodes: Vec<NodeData>,
    /// The document node (not the root element).
    root: NodeId,
    /// Implicit declaration of the `xml` prefix, shared by every element.
    xml_ns: NodeId,
    /// `version` from the XML declaration.
    pub version: Option<String>,
    /// `encoding` from the XML declaration.
    pub encoding: Option<String>,
    /// `standalone` from the XML declaration.
    pub standalone: Option<bool>,
    /// Warnings and recovered errors collected by the parser.
    pub diagnostics: Vec<ParseDiagnostic>,
    /// ID value to element, filled from `xml:id` and DTD `ID` attributes.
    id_map: HashMap<String, NodeId>,
}

impl RawDocument {
    /// Creates an empty document whose document node has the given flavour.
    #[must_use]
    pub fn new(kind: DocumentKind) -> Self {
        let mut nodes = Vec::with_capacity(64);
        nodes.push(NodeData::new(NodeKind::DocumentFragment));
        nodes.push(NodeData::new(NodeKind::Document(kind)));
        nodes.push(NodeData::new(NodeKind::NamespaceDecl {
            prefix: Some("xml".to_string()),
            uri: XML_NAMESPACE.to_string(),
        }));
        Self {
            nodes,
            root: NodeId::from_index(1),
            xml_ns: NodeId::from_index(2),
            version: None,
            encoding: None,
            standalone: None,
            diagnostics: Vec::new(),
            id_map: HashMap::new(),
        }
    }

    /// The document node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The first element child of the document node.
    #[must_use]
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.root)
            .find(|&id| matches!(self.node(id).kind, NodeKind::Element { .. }))
    }

    /// Returns `true` if `id` is a handle into this arena.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        id.as_index() < self.nodes.len() && id.as_index() > 0
    }

    /// # Panics
    ///
    /// Panics if `id` does not refer to a node in this arena.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.as_index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.as_index()]
    }

    /// The node's type tag.
    #[must_use]
    pub fn node_type(&self, id: NodeId) -> NodeType {
        self.node(id).kind.node_type()
    }

    /// The node's raw numeric type tag.
    #[must_use]
    pub fn node_type_tag(&self, id: NodeId) -> i32 {
        self.node_type(id).tag()
    }

    /// Number of allocated nodes, excluding the placeholder and the
    /// implicit `xml` namespace declaration.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 2
    }

    // --- Names and values ---

    /// The DOM name of a node: the qualified name for elements and
    /// attributes, the target for PIs, `#text`-style names for the rest.
    #[must_use]
    pub fn node_name(&self, id: NodeId) -> String {
        match &self.node(id).kind {
            NodeKind::Element { name, prefix, .. } | NodeKind::Attribute { name, prefix, .. } => {
                join_qname(prefix.as_deref(), name)
            }
            NodeKind::ProcessingInstruction { target, .. } => target.clone(),
            NodeKind::EntityRef { name, .. }
            | NodeKind::Entity { name, .. }
            | NodeKind::DocumentType { name, .. }
            | NodeKind::Notation { name, .. }
            | NodeKind::Dtd { name, .. }
            | NodeKind::ElementDecl { name, .. }
            | NodeKind::AttributeDecl { name, .. }
            | NodeKind::EntityDecl { name, .. } => name.clone(),
            NodeKind::NamespaceDecl { prefix, .. } => {
                prefix.as_ref().map_or_else(|| "xmlns".to_string(), |p| format!("xmlns:{p}"))
            }
            NodeKind::Text { .. } => "#text".to_string(),
            NodeKind::CData { .. } => "#cdata-section".to_string(),
            NodeKind::Comment { .. } => "#comment".to_string(),
            NodeKind::Document(_) => "#document".to_string(),
            NodeKind::DocumentFragment => "#document-fragment".to_string(),
            NodeKind::XIncludeStart => "xinclude-start".to_string(),
            NodeKind::XIncludeEnd => "xinclude-end".to_string(),
        }
    }

    /// The local part of an element or attribute name.
    #[must_use]
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { name, .. }
            | NodeKind::Attribute { name, .. }
            | NodeKind::ProcessingInstruction { target: name, .. } => Some(name),
            NodeKind::NamespaceDecl { prefix, .. } => Some(prefix.as_deref().unwrap_or("")),
            _ => None,
        }
    }

    /// The namespace URI of an element or attribute.
    #[must_use]
    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { namespace, .. } | NodeKind::Attribute { namespace, .. } => {
                namespace.as_deref()
            }
            _ => None,
        }
    }

    /// The namespace prefix of an element or attribute.
    #[must_use]
    pub fn prefix(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { prefix, .. } | NodeKind::Attribute { prefix, .. } => {
                prefix.as_deref()
            }
            _ => None,
        }
    }

    /// The directly stored value of a leaf-like node: character data,
    /// comment text, PI data, attribute value, namespace URI, or the
    /// replacement text of an entity reference.
    #[must_use]
    pub fn content(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text { content }
            | NodeKind::CData { content }
            | NodeKind::Comment { content }
            | NodeKind::Entity { content, .. } => Some(content),
            NodeKind::Attribute { value, .. } => Some(value),
            NodeKind::NamespaceDecl { uri, .. } => Some(uri),
            NodeKind::ProcessingInstruction { data, .. } => Some(data.as_deref().unwrap_or("")),
            NodeKind::EntityRef { value, .. } | NodeKind::EntityDecl { value, .. } => {
                value.as_deref()
            }
            NodeKind::ElementDecl { content, .. } => Some(content),
            _ => None,
        }
    }

    /// The XPath string-value of a node: stored content for leaves, the
    /// concatenated character data of all descendants for containers.
    #[must_use]
    pub fn string_value(&self, id: NodeId) -> String {
        match &self.node(id).kind {
            NodeKind::Element { .. } | NodeKind::Document(_) | NodeKind::DocumentFragment => {
                let mut buf = String::new();
                for d in self.descendants(id) {
                    match &self.node(d).kind {
                        NodeKind::Text { content } | NodeKind::CData { content } => {
                            buf.push_str(content);
                        }
                        NodeKind::EntityRef {
                            value: Some(value), ..
                        } => buf.push_str(value),
                        _ => {}
                    }
                }
                buf
            }
            _ => self.content(id).unwrap_or_default().to_string(),
        }
    }

    /// Attribute nodes of an element, in order. Empty for other kinds.
    #[must_use]
    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Namespace declaration nodes carried by an element.
    #[must_use]
    pub fn ns_decls(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Element { ns_decls, .. } => ns_decls,
            _ => &[],
        }
    }

    /// Finds an attribute node by qualified name.
    #[must_use]
    pub fn attribute_node(&self, elem: NodeId, qname: &str) -> Option<NodeId> {
        self.attributes(elem)
            .iter()
            .copied()
            .find(|&a| self.node_name(a) == qname)
    }

    /// Finds an attribute node by local name and namespace URI.
    #[must_use]
    pub fn attribute_node_ns(
        &self,
        elem: NodeId,
        local: &str,
        namespace: Option<&str>,
    ) -> Option<NodeId> {
        self.attributes(elem).iter().copied().find(|&a| {
            self.local_name(a) == Some(local) && self.namespace_uri(a) == namespace
        })
    }

    /// The value of an attribute, looked up by qualified name.
    #[must_use]
    pub fn attribute(&self, elem: NodeId, qname: &str) -> Option<&str> {
        self.attribute_node(elem, qname)
            .and_then(|a| self.content(a))
    }

    // --- Namespaces ---

    /// The implicit `xml` namespace declaration node.
    #[must_use]
    pub fn xml_namespace(&self) -> NodeId {
        self.xml_ns
    }

    /// Namespace declaration nodes in scope at `elem`, nearest declaration
    /// first, each prefix at most once. Undeclarations (`xmlns=""`) hide the
    /// default namespace. The implicit `xml` binding comes last.
    #[must_use]
    pub fn in_scope_namespaces(&self, elem: NodeId) -> Vec<NodeId> {
        let mut seen: Vec<Option<&str>> = Vec::new();
        let mut result = Vec::new();
        for anc in self.ancestors(elem) {
            for &ns in self.ns_decls(anc) {
                if let NodeKind::NamespaceDecl { prefix, uri } = &self.node(ns).kind {
                    let key = prefix.as_deref();
                    if seen.contains(&key) {
                        continue;
                    }
                    seen.push(key);
                    if !uri.is_empty() {
                        result.push(ns);
                    }
                }
            }
        }
        result.push(self.xml_ns);
        result
    }

    /// Resolves a prefix (`None` for the default namespace) at `elem`.
    #[must_use]
    pub fn lookup_namespace(&self, elem: NodeId, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NAMESPACE);
        }
        for anc in self.ancestors(elem) {
            for &ns in self.ns_decls(anc) {
                if let NodeKind::NamespaceDecl { prefix: p, uri } = &self.node(ns).kind {
                    if p.as_deref() == prefix {
                        return if uri.is_empty() { None } else { Some(uri) };
                    }
                }
            }
        }
        None
    }

    /// Finds a prefix bound to `uri` at `elem`. The outer `Option` is the
    /// lookup result; the inner one is `None` for the default namespace.
    #[must_use]
    pub fn lookup_prefix(&self, elem: NodeId, uri: &str) -> Option<Option<&str>> {
        self.in_scope_namespaces(elem)
            .into_iter()
            .find_map(|ns| match &self.node(ns).kind {
                NodeKind::NamespaceDecl { prefix, uri: u } if u == uri => Some(prefix.as_deref()),
                _ => None,
            })
    }

    // --- ID lookup ---

    /// Associates an ID value with an element.
    pub fn set_id(&mut self, id: &str, node: NodeId) {
        self.id_map.insert(id.to_string(), node);
    }

    /// Looks up an element by ID value.
    #[must_use]
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.id_map.get(id).copied()
    }

    // --- Navigation ---

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    #[must_use]
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    #[must_use]
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next_sibling
    }

    #[must_use]
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev_sibling
    }

    /// Iterates over the children of a node.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            doc: self,
            next: self.node(id).first_child,
        }
    }

    /// Iterates over a node and its ancestors, walking up.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: Some(id),
        }
    }

    /// Iterates over all descendants of a node in document order.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            root: id,
            next: self.first_child(id),
        }
    }

    /// The topmost ancestor of a node (itself if it has no parent).
    #[must_use]
    pub fn top(&self, id: NodeId) -> NodeId {
        self.ancestors(id).last().unwrap_or(id)
    }

    /// Returns `true` if `id` is connected to the document node.
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.top(id) == self.root
    }

    /// Returns `true` if `ancestor` is `id` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    // --- Document order ---

    /// A sortable key locating a node in document order. Namespace nodes
    /// sort before attribute nodes, which sort before children.
    fn order_key(&self, id: NodeId) -> (u32, Vec<(u8, usize)>) {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            let step = match &self.node(current).kind {
                NodeKind::NamespaceDecl { .. } => {
                    (0, self.ns_decls(parent).iter().position(|&n| n == current).unwrap_or(0))
                }
                NodeKind::Attribute { .. } => (
                    1,
                    self.attributes(parent)
                        .iter()
                        .position(|&n| n == current)
                        .unwrap_or(0),
                ),
                _ => (2, self.children(parent).position(|n| n == current).unwrap_or(0)),
            };
            path.push(step);
            current = parent;
        }
        path.reverse();
        let top = if current == self.root { 0 } else { current.into_raw() };
        (top, path)
    }

    /// Compares two nodes by document order. Nodes in different detached
    /// subtrees are ordered by the handle of their topmost ancestor.
    #[must_use]
    pub fn compare_order(&self, a: NodeId, b: NodeId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        self.order_key(a).cmp(&self.order_key(b))
    }

    /// Sorts nodes into document order and removes duplicates.
    pub fn sort_document_order(&self, nodes: &mut Vec<NodeId>) {
        nodes.sort_by_cached_key(|&id| self.order_key(id));
        nodes.dedup();
    }

    // --- Mutation ---

    /// Allocates a new, unattached node.
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let index = self.nodes.len();
        self.nodes.push(NodeData::new(kind));
        NodeId::from_index(index)
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if !self.contains(parent) {
            return Err(TreeError::ForeignNode(parent.into_raw()));
        }
        if !self.contains(child) {
            return Err(TreeError::ForeignNode(child.into_raw()));
        }
        let child_kind = &self.node(child).kind;
        if !child_kind.is_child_capable() {
            return Err(TreeError::NotChildCapable(child_kind.node_type()));
        }
        let parent_kind = &self.node(parent).kind;
        if !parent_kind.accepts_children() {
            return Err(TreeError::NoChildren(parent_kind.node_type()));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(TreeError::Cycle);
        }
        Ok(())
    }

    /// Appends `child` to the end of `parent`'s child list, detaching it
    /// from any previous position first. Appending a document fragment
    /// moves the fragment's children instead.
    ///
    /// # Errors
    ///
    /// Returns `TreeError` if the kinds cannot be linked this way or if the
    /// insertion would create a cycle.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.check_insert(parent, child)?;
        if matches!(self.node(child).kind, NodeKind::DocumentFragment) {
            let moved: Vec<NodeId> = self.children(child).collect();
            for c in moved {
                self.detach(c);
                self.link_last(parent, c);
            }
            return Ok(());
        }
        self.detach(child);
        self.link_last(parent, child);
        Ok(())
    }

    pub(crate) fn link_last(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(child).parent = Some(parent);
        if let Some(last) = self.node(parent).last_child {
            self.node_mut(last).next_sibling = Some(child);
            self.node_mut(child).prev_sibling = Some(last);
            self.node_mut(parent).last_child = Some(child);
        } else {
            self.node_mut(parent).first_child = Some(child);
            self.node_mut(parent).last_child = Some(child);
        }
    }

    /// Inserts `new_child` before `reference` in the reference's parent.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::Unsupported` if `reference` has no parent, or the
    /// same errors as [`append_child`](Self::append_child).
    pub fn insert_before(&mut self, reference: NodeId, new_child: NodeId) -> Result<(), TreeError> {
        let parent = self
            .parent(reference)
            .filter(|&p| self.children(p).any(|c| c == reference))
            .ok_or(TreeError::Unsupported(self.node_type(reference)))?;
        self.check_insert(parent, new_child)?;
        if new_child == reference {
            return Ok(());
        }
        self.detach(new_child);
        self.node_mut(new_child).parent = Some(parent);
        if let Some(prev) = self.node(reference).prev_sibling {
            self.node_mut(prev).next_sibling = Some(new_child);
            self.node_mut(new_child).prev_sibling = Some(prev);
        } else {
            self.node_mut(parent).first_child = Some(new_child);
        }
        self.node_mut(new_child).next_sibling = Some(reference);
        self.node_mut(reference).prev_sibling = Some(new_child);
        Ok(())
    }

    /// Unlinks a node from its parent. Attributes and namespace
    /// declarations are removed from their element's lists. The node stays
    /// allocated and can be reinserted.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).parent else {
            return;
        };
        match self.node_type(id) {
            NodeType::Attribute => {
                if let NodeKind::Element { attributes, .. } = &mut self.node_mut(parent).kind {
                    attributes.retain(|&a| a != id);
                }
                self.node_mut(id).parent = None;
                return;
            }
            NodeType::NamespaceDecl => {
                if let NodeKind::Element { ns_decls, .. } = &mut self.node_mut(parent).kind {
                    ns_decls.retain(|&n| n != id);
                }
                self.node_mut(id).parent = None;
                return;
            }
            _ => {}
        }

        let prev = self.node(id).prev_sibling;
        let next = self.node(id).next_sibling;
        match prev {
            Some(p) => self.node_mut(p).next_sibling = next,
            None => self.node_mut(parent).first_child = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev_sibling = prev,
            None => self.node_mut(parent).last_child = prev,
        }
        self.node_mut(id).parent = None;
        self.node_mut(id).prev_sibling = None;
        self.node_mut(id).next_sibling = None;
    }

    /// Removes every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        while let Some(child) = self.first_child(id) {
            self.detach(child);
        }
    }

    /// Attaches an attribute node to an element, replacing any attribute
    /// with the same expanded name.
    ///
    /// # Errors
    ///
    /// Returns `TreeError` unless `elem` is an element and `attr` an attribute.
    pub fn set_attribute_node(&mut self, elem: NodeId, attr: NodeId) -> Result<(), TreeError> {
        if !self.contains(elem) || !self.contains(attr) {
            return Err(TreeError::ForeignNode(attr.into_raw()));
        }
        if !matches!(self.node(attr).kind, NodeKind::Attribute { .. }) {
            return Err(TreeError::Unsupported(self.node_type(attr)));
        }
        if !matches!(self.node(elem).kind, NodeKind::Element { .. }) {
            return Err(TreeError::NoChildren(self.node_type(elem)));
        }
        self.detach(attr);
        let local = self.local_name(attr).unwrap_or_default().to_string();
        let ns = self.namespace_uri(attr).map(str::to_string);
        let qname = self.node_name(attr);
        let existing = self.attributes(elem).iter().copied().position(|a| {
            if ns.is_some() {
                self.local_name(a) == Some(local.as_str()) && self.namespace_uri(a) == ns.as_deref()
            } else {
                self.node_name(a) == qname
            }
        });
        if let Some(pos) = existing {
            if let NodeKind::Element { attributes, .. } = &self.node(elem).kind {
                let old = attributes[pos];
                self.node_mut(old).parent = None;
            }
            if let NodeKind::Element { attributes, .. } = &mut self.node_mut(elem).kind {
                attributes[pos] = attr;
            }
        } else if let NodeKind::Element { attributes, .. } = &mut self.node_mut(elem).kind {
            attributes.push(attr);
        }
        self.node_mut(attr).parent = Some(elem);
        Ok(())
    }

    /// Sets (creating if needed) an attribute on an element by name.
    ///
    /// # Errors
    ///
    /// Returns `TreeError` if `elem` is not an element.
    pub fn set_attribute(
        &mut self,
        elem: NodeId,
        prefix: Option<&str>,
        name: &str,
        value: &str,
    ) -> Result<NodeId, TreeError> {
        let qname = join_qname(prefix, name);
        if let Some(existing) = self.attribute_node(elem, &qname) {
            if let NodeKind::Attribute { value: v, .. } = &mut self.node_mut(existing).kind {
                *v = value.to_string();
            }
            return Ok(existing);
        }
        let namespace = match prefix {
            Some(p) => self.lookup_namespace(elem, Some(p)).map(str::to_string),
            None => None,
        };
        let attr = self.create_node(NodeKind::Attribute {
            name: name.to_string(),
            prefix: prefix.map(str::to_string),
            namespace,
            value: value.to_string(),
        });
        self.set_attribute_node(elem, attr)?;
        Ok(attr)
    }

    /// Attaches a namespace declaration node to an element. An existing
    /// declaration of the same prefix on that element is replaced.
    ///
    /// # Errors
    ///
    /// Returns `TreeError` unless `elem` is an element and `ns` a namespace
    /// declaration.
    pub fn add_ns_decl(&mut self, elem: NodeId, ns: NodeId) -> Result<(), TreeError> {
        let prefix = match &self.node(ns).kind {
            NodeKind::NamespaceDecl { prefix, .. } => prefix.clone(),
            other => return Err(TreeError::Unsupported(other.node_type())),
        };
        if !matches!(self.node(elem).kind, NodeKind::Element { .. }) {
            return Err(TreeError::NoChildren(self.node_type(elem)));
        }
        if ns == self.xml_ns {
            return Err(TreeError::Unsupported(NodeType::NamespaceDecl));
        }
        self.detach(ns);
        let replaced = self.ns_decls(elem).iter().copied().find(|&n| {
            matches!(&self.node(n).kind, NodeKind::NamespaceDecl { prefix: p, .. } if *p == prefix)
        });
        if let Some(old) = replaced {
            self.detach(old);
        }
        if let NodeKind::Element { ns_decls, .. } = &mut self.node_mut(elem).kind {
            ns_decls.push(ns);
        }
        self.node_mut(ns).parent = Some(elem);
        Ok(())
    }

    /// Binds an element to a namespace URI and prefix.
    pub fn set_element_namespace(&mut self, elem: NodeId, prefix: Option<&str>, uri: Option<&str>) {
        if let NodeKind::Element {
            prefix: p,
            namespace,
            ..
        } = &mut self.node_mut(elem).kind
        {
            *p = prefix.map(str::to_string);
            *namespace = uri.map(str::to_string);
        }
    }

    /// Replaces the stored value of a node. For elements, documents and
    /// fragments the children are replaced by a single text node.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::Unsupported` for kinds without a settable value.
    pub fn set_content(&mut self, id: NodeId, text: &str) -> Result<(), TreeError> {
        match &mut self.node_mut(id).kind {
            NodeKind::Text { content }
            | NodeKind::CData { content }
            | NodeKind::Comment { content }
            | NodeKind::Entity { content, .. } => {
                *content = text.to_string();
                return Ok(());
            }
            NodeKind::Attribute { value, .. } => {
                *value = text.to_string();
                return Ok(());
            }
            NodeKind::ProcessingInstruction { data, .. } => {
                *data = (!text.is_empty()).then(|| text.to_string());
                return Ok(());
            }
            NodeKind::Element { .. } | NodeKind::DocumentFragment => {}
            other => return Err(TreeError::Unsupported(other.node_type())),
        }
        self.clear_children(id);
        if !text.is_empty() {
            let t = self.create_node(NodeKind::text(text));
            self.link_last(id, t);
        }
        Ok(())
    }

    /// Renames an element, attribute, PI or entity reference. The caller
    /// validates the name.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::Unsupported` for kinds whose name is fixed.
    pub fn rename(&mut self, id: NodeId, new_prefix: Option<&str>, local: &str) -> Result<(), TreeError> {
        let namespace = match new_prefix {
            Some(p) => {
                let scope = if self.node_type(id) == NodeType::Attribute {
                    self.parent(id)
                } else {
                    Some(id)
                };
                scope.and_then(|s| self.lookup_namespace(s, Some(p)).map(str::to_string))
            }
            None => None,
        };
        match &mut self.node_mut(id).kind {
            NodeKind::Element {
                name,
                prefix,
                namespace: ns,
                ..
            }
            | NodeKind::Attribute {
                name,
                prefix,
                namespace: ns,
                ..
            } => {
                *name = local.to_string();
                if new_prefix.is_some() || prefix.is_some() {
                    *prefix = new_prefix.map(str::to_string);
                    *ns = namespace;
                }
                Ok(())
            }
            NodeKind::ProcessingInstruction { target: name, .. }
            | NodeKind::EntityRef { name, .. } => {
                *name = local.to_string();
                Ok(())
            }
            other => Err(TreeError::Unsupported(other.node_type())),
        }
    }
}

impl Default for RawDocument {
    fn default() -> Self {
        Self::new(DocumentKind::Xml)
    }
}

// --- Iterators ---

/// Iterator over the children of a node.
pub struct Children<'a> {
    doc: &'a RawDocument,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).next_sibling;
        Some(current)
    }
}

/// Iterator over a node and its ancestors.
pub struct Ancestors<'a> {
    doc: &'a RawDocument,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.node(current).parent;
        Some(current)
    }
}

/// Depth-first iterator over all descendants of a node.
pub struct Descendants<'a> {
    doc: &'a RawDocument,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;

        if let Some(child) = self.doc.first_child(current) {
            self.next = Some(child);
            return Some(current);
        }
        if let Some(sibling) = self.doc.next_sibling(current) {
            self.next = Some(sibling);
            return Some(current);
        }

        let mut ancestor = self.doc.parent(current);
        while let Some(anc) = ancestor {
            if anc == self.root {
                break;
            }
            if let Some(sibling) = self.doc.next_sibling(anc) {
                self.next = Some(sibling);
                return Some(current);
            }
            ancestor = self.doc.parent(anc);
        }

        self.next = None;
        Some(current)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn elem(doc: &mut RawDocument, name: &str) -> NodeId {
        doc.create_node(NodeKind::element(name))
    }

    #[test]
    fn test_new_document_has_root() {
        let doc = RawDocument::default();
        assert_eq!(doc.node_type(doc.root()), NodeType::Document);
        assert_eq!(doc.node_count(), 1);
        assert_eq!(doc.root_element(), None);
    }

    #[test]
    fn test_append_and_navigate() {
        let mut doc = RawDocument::default();
        let root = doc.root();
        let a = elem(&mut doc, "a");
        let b = elem(&mut doc, "b");
        let c = doc.create_node(NodeKind::text("c"));
        doc.append_child(root, a).unwrap();
        doc.append_child(a, b).unwrap();
        doc.append_child(a, c).unwrap();

        assert_eq!(doc.root_element(), Some(a));
        assert_eq!(doc.first_child(a), Some(b));
        assert_eq!(doc.last_child(a), Some(c));
        assert_eq!(doc.next_sibling(b), Some(c));
        assert_eq!(doc.prev_sibling(c), Some(b));
        assert_eq!(doc.children(a).collect::<Vec<_>>(), vec![b, c]);
        assert_eq!(doc.string_value(a), "c");
    }

    #[test]
    fn test_append_moves_attached_child() {
        let mut doc = RawDocument::default();
        let a = elem(&mut doc, "a");
        let b = elem(&mut doc, "b");
        let x = elem(&mut doc, "x");
        doc.append_child(doc.root(), a).unwrap();
        doc.append_child(a, b).unwrap();
        doc.append_child(a, x).unwrap();
        doc.append_child(b, x).unwrap();
        assert_eq!(doc.children(a).collect::<Vec<_>>(), vec![b]);
        assert_eq!(doc.parent(x), Some(b));
    }

    #[test]
    fn test_append_rejects_cycle() {
        let mut doc = RawDocument::default();
        let a = elem(&mut doc, "a");
        let b = elem(&mut doc, "b");
        doc.append_child(a, b).unwrap();
        assert_eq!(doc.append_child(b, a), Err(TreeError::Cycle));
        assert_eq!(doc.append_child(a, a), Err(TreeError::Cycle));
    }

    #[test]
    fn test_append_rejects_attribute_child() {
        let mut doc = RawDocument::default();
        let a = elem(&mut doc, "a");
        let attr = doc.create_node(NodeKind::Attribute {
            name: "x".to_string(),
            prefix: None,
            namespace: None,
            value: "1".to_string(),
        });
        assert_eq!(
            doc.append_child(a, attr),
            Err(TreeError::NotChildCapable(NodeType::Attribute))
        );
    }

    #[test]
    fn test_fragment_children_move() {
        let mut doc = RawDocument::default();
        let a = elem(&mut doc, "a");
        let frag = doc.create_node(NodeKind::DocumentFragment);
        let x = elem(&mut doc, "x");
        let y = elem(&mut doc, "y");
        doc.append_child(frag, x).unwrap();
        doc.append_child(frag, y).unwrap();
        doc.append_child(a, frag).unwrap();
        assert_eq!(doc.children(a).collect::<Vec<_>>(), vec![x, y]);
        assert_eq!(doc.first_child(frag), None);
    }

    #[test]
    fn test_insert_before_and_detach() {
        let mut doc = RawDocument::default();
        let p = elem(&mut doc, "p");
        let a = elem(&mut doc, "a");
        let c = elem(&mut doc, "c");
        let b = elem(&mut doc, "b");
        doc.append_child(p, a).unwrap();
        doc.append_child(p, c).unwrap();
        doc.insert_before(c, b).unwrap();
        assert_eq!(doc.children(p).collect::<Vec<_>>(), vec![a, b, c]);

        doc.detach(a);
        assert_eq!(doc.first_child(p), Some(b));
        assert_eq!(doc.prev_sibling(b), None);
        doc.detach(c);
        assert_eq!(doc.last_child(p), Some(b));
        assert_eq!(doc.parent(c), None);
    }

    #[test]
    fn test_attributes_are_nodes() {
        let mut doc = RawDocument::default();
        let e = elem(&mut doc, "e");
        let id = doc.set_attribute(e, None, "id", "x1").unwrap();
        assert_eq!(doc.node_type(id), NodeType::Attribute);
        assert_eq!(doc.parent(id), Some(e));
        assert_eq!(doc.attribute(e, "id"), Some("x1"));
        assert_eq!(doc.first_child(e), None);

        let same = doc.set_attribute(e, None, "id", "x2").unwrap();
        assert_eq!(same, id);
        assert_eq!(doc.attribute(e, "id"), Some("x2"));

        doc.detach(id);
        assert_eq!(doc.attribute(e, "id"), None);
        assert_eq!(doc.parent(id), None);
    }

    #[test]
    fn test_namespace_lookup() {
        let mut doc = RawDocument::default();
        let outer = elem(&mut doc, "outer");
        let inner = elem(&mut doc, "inner");
        doc.append_child(outer, inner).unwrap();
        let ns = doc.create_node(NodeKind::NamespaceDecl {
            prefix: Some("p".to_string()),
            uri: "urn:p".to_string(),
        });
        doc.add_ns_decl(outer, ns).unwrap();

        assert_eq!(doc.lookup_namespace(inner, Some("p")), Some("urn:p"));
        assert_eq!(doc.lookup_namespace(inner, Some("q")), None);
        assert_eq!(
            doc.lookup_namespace(inner, Some("xml")),
            Some(XML_NAMESPACE)
        );
        assert_eq!(doc.lookup_prefix(inner, "urn:p"), Some(Some("p")));
        assert_eq!(doc.in_scope_namespaces(inner), vec![ns, doc.xml_namespace()]);
    }

    #[test]
    fn test_default_namespace_undeclaration() {
        let mut doc = RawDocument::default();
        let outer = elem(&mut doc, "outer");
        let inner = elem(&mut doc, "inner");
        doc.append_child(outer, inner).unwrap();
        let d = doc.create_node(NodeKind::NamespaceDecl {
            prefix: None,
            uri: "urn:d".to_string(),
        });
        let undo = doc.create_node(NodeKind::NamespaceDecl {
            prefix: None,
            uri: String::new(),
        });
        doc.add_ns_decl(outer, d).unwrap();
        doc.add_ns_decl(inner, undo).unwrap();
        assert_eq!(doc.lookup_namespace(outer, None), Some("urn:d"));
        assert_eq!(doc.lookup_namespace(inner, None), None);
        assert_eq!(doc.in_scope_namespaces(inner), vec![doc.xml_namespace()]);
    }

    #[test]
    fn test_document_order_with_attributes() {
        let mut doc = RawDocument::default();
        let a = elem(&mut doc, "a");
        let b = elem(&mut doc, "b");
        doc.append_child(doc.root(), a).unwrap();
        doc.append_child(a, b).unwrap();
        let attr = doc.set_attribute(a, None, "k", "v").unwrap();

        let mut nodes = vec![b, attr, a, b];
        doc.sort_document_order(&mut nodes);
        assert_eq!(nodes, vec![a, attr, b]);
        assert_eq!(doc.compare_order(attr, b), Ordering::Less);
    }

    #[test]
    fn test_document_order_after_insert_before() {
        let mut doc = RawDocument::default();
        let p = elem(&mut doc, "p");
        doc.append_child(doc.root(), p).unwrap();
        let late = elem(&mut doc, "late");
        doc.append_child(p, late).unwrap();
        let early = elem(&mut doc, "early");
        doc.insert_before(late, early).unwrap();
        let mut nodes = vec![late, early];
        doc.sort_document_order(&mut nodes);
        assert_eq!(nodes, vec![early, late]);
    }

    #[test]
    fn test_set_content_replaces_children() {
        let mut doc = RawDocument::default();
        let e = elem(&mut doc, "e");
        let child = elem(&mut doc, "child");
        doc.append_child(e, child).unwrap();
        doc.set_content(e, "hello").unwrap();
        assert_eq!(doc.string_value(e), "hello");
        assert_eq!(doc.parent(child), None);
        assert_eq!(
            doc.set_content(doc.root(), "x").err(),
            Some(TreeError::Unsupported(NodeType::Document))
        );
    }

    #[test]
    fn test_rename() {
        let mut doc = RawDocument::default();
        let e = elem(&mut doc, "old");
        doc.rename(e, None, "new").unwrap();
        assert_eq!(doc.node_name(e), "new");
        let t = doc.create_node(NodeKind::text("x"));
        assert!(doc.rename(t, None, "y").is_err());
    }

    #[test]
    fn test_node_names() {
        let mut doc = RawDocument::default();
        let t = doc.create_node(NodeKind::text("x"));
        let c = doc.create_node(NodeKind::Comment {
            content: "c".to_string(),
        });
        assert_eq!(doc.node_name(t), "#text");
        assert_eq!(doc.node_name(c), "#comment");
        assert_eq!(doc.node_name(doc.root()), "#document");
        assert_eq!(doc.node_name(doc.xml_namespace()), "xmlns:xml");
    }

    #[test]
    fn test_descendants_stop_at_subtree() {
        let mut doc = RawDocument::default();
        let a = elem(&mut doc, "a");
        let b = elem(&mut doc, "b");
        let c = elem(&mut doc, "c");
        let d = elem(&mut doc, "d");
        doc.append_child(doc.root(), a).unwrap();
        doc.append_child(a, b).unwrap();
        doc.append_child(b, c).unwrap();
        doc.append_child(a, d).unwrap();
        assert_eq!(doc.descendants(b).collect::<Vec<_>>(), vec![c]);
        assert_eq!(doc.descendants(a).collect::<Vec<_>>(), vec![b, c, d]);
    }

    #[test]
    fn test_is_attached() {
        let mut doc = RawDocument::default();
        let a = elem(&mut doc, "a");
        assert!(!doc.is_attached(a));
        doc.append_child(doc.root(), a).unwrap();
        assert!(doc.is_attached(a));
    }

    #[test]
    fn test_raw_handle_roundtrip() {
        let doc = RawDocument::default();
        let raw = doc.root().into_raw();
        assert_eq!(NodeId::from_raw(raw), Some(doc.root()));
        assert_eq!(NodeId::from_raw(0), None);
    }
}
