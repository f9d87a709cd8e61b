//! The owning side of the facade: [`Document`] and its shared cell.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::dispatch::{
    self, Attribute, CDataSection, Comment, DocumentFragment, Element, EntityReference, Node,
    ProcessingInstruction, Text,
};
use super::node::{check_ncname, check_qname, DomNode, NodeHandle};
use crate::error::{DomError, ParseDiagnostic, Result};
use crate::parser::{self, ParseOptions};
use crate::tree::{DocumentKind, NodeId, NodeKind, NodeType, RawDocument};
use crate::util::qname::XML_NAMESPACE;

/// The engine document behind every handle of one [`Document`].
///
/// Nodes hold a `Weak` reference to the cell; the arena itself sits in an
/// `Option` so that an explicit release drops it while handles still exist.
pub(crate) struct DocumentCell {
    raw: RefCell<Option<RawDocument>>,
    options: ParseOptions,
}

impl DocumentCell {
    fn new(raw: RawDocument, options: ParseOptions) -> Self {
        Self {
            raw: RefCell::new(Some(raw)),
            options,
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        self.raw.try_borrow().map_or(false, |raw| raw.is_none())
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.options.contains(ParseOptions::COMPACT)
    }

    /// Runs `f` against the live arena.
    pub(crate) fn with_raw<T>(&self, f: impl FnOnce(&RawDocument) -> T) -> Result<T> {
        let guard = self
            .raw
            .try_borrow()
            .map_err(|_| DomError::invalid("document is being mutated"))?;
        guard.as_ref().map(f).ok_or(DomError::UseAfterFree)
    }

    /// Runs `f` against the live arena with write access.
    pub(crate) fn with_raw_mut<T>(&self, f: impl FnOnce(&mut RawDocument) -> T) -> Result<T> {
        if self.is_read_only() {
            return Err(DomError::invalid("document was parsed read-only"));
        }
        let mut guard = self
            .raw
            .try_borrow_mut()
            .map_err(|_| DomError::invalid("document is already borrowed"))?;
        guard.as_mut().map(f).ok_or(DomError::UseAfterFree)
    }

    fn release(&self) -> bool {
        self.raw
            .try_borrow_mut()
            .map_or(false, |mut raw| raw.take().is_some())
    }
}

/// An XML document and the sole owner of its nodes.
///
/// Node wrappers obtained from a document borrow into it. Once the document
/// is released with [`free`](Self::free), or its last handle is dropped,
/// every operation on those wrappers fails with [`DomError::UseAfterFree`].
///
/// ```
/// use oxidom::dom::{Document, DomNode};
/// use oxidom::DomError;
///
/// let doc = Document::parse_str("<a><b/>c</a>").unwrap();
/// let root = doc.document_element().unwrap();
/// assert_eq!(root.to_xml().unwrap(), "<a><b/>c</a>");
///
/// doc.free();
/// assert!(matches!(root.node_name(), Err(DomError::UseAfterFree)));
/// ```
pub struct Document {
    cell: Rc<DocumentCell>,
    root: NodeHandle,
}

impl Document {
    /// Creates an empty XML document.
    #[must_use]
    pub fn new() -> Self {
        Self::from_raw(RawDocument::new(DocumentKind::Xml), ParseOptions::empty())
    }

    /// Creates an empty document whose document node is tagged as HTML.
    #[must_use]
    pub fn new_html() -> Self {
        Self::from_raw(RawDocument::new(DocumentKind::Html), ParseOptions::empty())
    }

    fn from_raw(raw: RawDocument, options: ParseOptions) -> Self {
        let root_id = raw.root();
        let root_type = raw.node_type(root_id);
        let cell = Rc::new(DocumentCell::new(raw, options));
        let root = NodeHandle::new(Rc::downgrade(&cell), root_id, root_type);
        Self { cell, root }
    }

    /// Another handle to the document behind `cell`.
    pub(crate) fn from_cell(cell: Rc<DocumentCell>) -> Result<Self> {
        let (root_id, root_type) = cell.with_raw(|raw| (raw.root(), raw.node_type(raw.root())))?;
        let root = NodeHandle::new(Rc::downgrade(&cell), root_id, root_type);
        Ok(Self { cell, root })
    }

    fn parsed(raw: RawDocument, options: ParseOptions) -> Self {
        debug!(
            options = options.bits(),
            nodes = raw.node_count(),
            diagnostics = raw.diagnostics.len(),
            "parsed document"
        );
        Self::from_raw(raw, options)
    }

    /// Parses a string with default options.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::Parse`] if the input is not well-formed.
    pub fn parse_str(input: &str) -> Result<Self> {
        Self::parse_str_with_options(input, ParseOptions::default())
    }

    /// Parses a string with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::Parse`] if the input is not well-formed and
    /// `RECOVER` is not set.
    pub fn parse_str_with_options(input: &str, options: ParseOptions) -> Result<Self> {
        let raw = parser::parse_str_with_options(input, options)?;
        Ok(Self::parsed(raw, options))
    }

    /// Parses bytes in any encoding `encoding_rs` knows, with default options.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::Parse`] if the bytes cannot be decoded or parsed.
    pub fn parse_bytes(input: &[u8]) -> Result<Self> {
        Self::parse_bytes_with_options(input, ParseOptions::default())
    }

    /// Parses bytes with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::Parse`] if the bytes cannot be decoded or parsed.
    pub fn parse_bytes_with_options(input: &[u8], options: ParseOptions) -> Result<Self> {
        let raw = parser::parse_bytes_with_options(input, options)?;
        Ok(Self::parsed(raw, options))
    }

    /// Releases the document's nodes. Calling it again is a no-op.
    pub fn free(&self) {
        if self.cell.release() {
            debug!(handle = self.root.raw(), "released document");
        }
    }

    #[must_use]
    pub fn is_freed(&self) -> bool {
        self.cell.is_released()
    }

    /// The options the document was parsed with; empty for built documents.
    #[must_use]
    pub fn parse_options(&self) -> ParseOptions {
        self.cell.options
    }

    /// Whether every mutation is rejected (`COMPACT` parsing).
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.cell.is_read_only()
    }

    /// The `version` of the XML declaration.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] after release.
    pub fn version(&self) -> Result<Option<String>> {
        self.cell.with_raw(|raw| raw.version.clone())
    }

    /// The `encoding` of the XML declaration.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] after release.
    pub fn encoding(&self) -> Result<Option<String>> {
        self.cell.with_raw(|raw| raw.encoding.clone())
    }

    /// Warnings and recovered errors reported while parsing.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`] after release.
    pub fn diagnostics(&self) -> Result<Vec<ParseDiagnostic>> {
        self.cell.with_raw(|raw| raw.diagnostics.clone())
    }

    /// The root element.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::NodeNotFound`] when the document has no element.
    pub fn document_element(&self) -> Result<Element> {
        let id = self
            .cell
            .with_raw(RawDocument::root_element)?
            .ok_or(DomError::NodeNotFound)?;
        Ok(Element(self.handle_for(id, NodeType::Element)))
    }

    /// Makes `elem` the root element, replacing any existing one in place.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidArgument`] for an element of another
    /// document or a read-only document.
    pub fn set_document_element(&self, elem: &Element) -> Result<()> {
        if !self.root.same_document(elem.handle()) {
            return Err(DomError::invalid("element belongs to another document"));
        }
        let root = self.root.id();
        let new_root = elem.handle().id();
        self.cell.with_raw_mut(|raw| match raw.root_element() {
            Some(old) if old == new_root => Ok(()),
            Some(old) => {
                raw.insert_before(old, new_root)?;
                raw.detach(old);
                Ok(())
            }
            None => raw.append_child(root, new_root),
        })??;
        Ok(())
    }

    /// Wraps an engine handle of this document. Wrapping the same handle
    /// twice yields equal wrappers.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidArgument`] for a handle outside the
    /// document and [`DomError::UnknownNodeType`] for an unrecognized tag.
    pub fn wrap_handle(&self, handle: u32) -> Result<Node> {
        let doc = Rc::downgrade(&self.cell);
        self.cell.with_raw(|raw| {
            let id = NodeId::from_raw(handle)
                .filter(|&id| raw.contains(id))
                .ok_or_else(|| DomError::invalid(format!("no node with handle {handle}")))?;
            dispatch::wrap(&doc, raw, id)
        })?
    }

    fn handle_for(&self, id: NodeId, node_type: NodeType) -> NodeHandle {
        NodeHandle::new(Rc::downgrade(&self.cell), id, node_type)
    }

    fn create(&self, kind: NodeKind) -> Result<NodeHandle> {
        let node_type = kind.node_type();
        let id = self.cell.with_raw_mut(|raw| raw.create_node(kind))?;
        Ok(self.handle_for(id, node_type))
    }

    // --- Factories ---

    /// Creates a detached element. A prefixed name stays unbound until the
    /// element is placed under a declaration of that prefix.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidNodeName`] for a malformed `QName`.
    pub fn create_element(&self, name: &str) -> Result<Element> {
        let (prefix, local) = check_qname(name)?;
        let namespace = (prefix == Some("xml")).then(|| XML_NAMESPACE.to_string());
        let handle = self.create(NodeKind::Element {
            name: local.to_string(),
            prefix: prefix.map(str::to_string),
            namespace,
            attributes: Vec::new(),
            ns_decls: Vec::new(),
        })?;
        Ok(Element(handle))
    }

    /// Creates a detached element in `uri`, declaring its prefix on itself.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidNodeName`] for a malformed `QName`.
    pub fn create_element_ns(&self, uri: &str, name: &str) -> Result<Element> {
        let (prefix, _) = check_qname(name)?;
        let elem = self.create_element(name)?;
        elem.set_namespace(uri, prefix, true)?;
        Ok(elem)
    }

    /// Creates a detached attribute.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidNodeName`] for a malformed `QName`.
    pub fn create_attribute(&self, name: &str, value: &str) -> Result<Attribute> {
        let (prefix, local) = check_qname(name)?;
        let namespace = (prefix == Some("xml")).then(|| XML_NAMESPACE.to_string());
        let handle = self.create(NodeKind::Attribute {
            name: local.to_string(),
            prefix: prefix.map(str::to_string),
            namespace,
            value: value.to_string(),
        })?;
        Ok(Attribute(handle))
    }

    /// # Errors
    ///
    /// Fails only for a released or read-only document.
    pub fn create_text_node(&self, text: &str) -> Result<Text> {
        self.create(NodeKind::text(text)).map(Text)
    }

    /// # Errors
    ///
    /// Returns [`DomError::InvalidArgument`] if `text` contains `]]>`.
    pub fn create_cdata_section(&self, text: &str) -> Result<CDataSection> {
        if text.contains("]]>") {
            return Err(DomError::invalid("CDATA content cannot contain ']]>'"));
        }
        self.create(NodeKind::CData {
            content: text.to_string(),
        })
        .map(CDataSection)
    }

    /// # Errors
    ///
    /// Returns [`DomError::InvalidArgument`] if `text` contains `--` or
    /// ends with `-`.
    pub fn create_comment(&self, text: &str) -> Result<Comment> {
        if text.contains("--") || text.ends_with('-') {
            return Err(DomError::invalid("comment text cannot contain '--' or end with '-'"));
        }
        self.create(NodeKind::Comment {
            content: text.to_string(),
        })
        .map(Comment)
    }

    /// # Errors
    ///
    /// Returns [`DomError::InvalidNodeName`] for a target that is not an
    /// `NCName` or is `xml` in any case.
    pub fn create_processing_instruction(
        &self,
        target: &str,
        data: &str,
    ) -> Result<ProcessingInstruction> {
        check_ncname(target)?;
        if target.eq_ignore_ascii_case("xml") {
            return Err(DomError::InvalidNodeName(target.to_string()));
        }
        if data.contains("?>") {
            return Err(DomError::invalid("processing instruction data cannot contain '?>'"));
        }
        self.create(NodeKind::ProcessingInstruction {
            target: target.to_string(),
            data: (!data.is_empty()).then(|| data.to_string()),
        })
        .map(ProcessingInstruction)
    }

    /// # Errors
    ///
    /// Fails only for a released or read-only document.
    pub fn create_document_fragment(&self) -> Result<DocumentFragment> {
        self.create(NodeKind::DocumentFragment).map(DocumentFragment)
    }

    /// Creates a reference to `name`, carrying the replacement text of an
    /// entity of that name declared in the internal subset.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::InvalidNodeName`] if `name` is not an `NCName`.
    pub fn create_entity_reference(&self, name: &str) -> Result<EntityReference> {
        check_ncname(name)?;
        let value = self.cell.with_raw(|raw| {
            raw.descendants(raw.root()).find_map(|id| match &raw.node(id).kind {
                NodeKind::EntityDecl {
                    name: n,
                    parameter: false,
                    value,
                    ..
                } if n == name => value.clone(),
                _ => None,
            })
        })?;
        self.create(NodeKind::EntityRef {
            name: name.to_string(),
            value,
        })
        .map(EntityReference)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl DomNode for Document {
    fn handle(&self) -> &NodeHandle {
        &self.root
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("options", &self.cell.options)
            .field("freed", &self.is_freed())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_free_is_idempotent() {
        let doc = Document::parse_str("<a/>").unwrap();
        assert!(!doc.is_freed());
        doc.free();
        doc.free();
        assert!(doc.is_freed());
        assert!(matches!(doc.version(), Err(DomError::UseAfterFree)));
        assert!(matches!(doc.document_element(), Err(DomError::UseAfterFree)));
    }

    #[test]
    fn test_dropping_document_invalidates_nodes() {
        let root = {
            let doc = Document::parse_str("<a/>").unwrap();
            doc.document_element().unwrap()
        };
        assert!(matches!(root.node_name(), Err(DomError::UseAfterFree)));
        assert_eq!(root.node_type(), NodeType::Element);
    }

    #[test]
    fn test_compact_documents_are_read_only() {
        let doc = Document::parse_str_with_options("<a/>", ParseOptions::COMPACT).unwrap();
        assert!(doc.is_read_only());
        assert!(matches!(
            doc.create_element("b"),
            Err(DomError::InvalidArgument(_))
        ));
        let root = doc.document_element().unwrap();
        assert!(matches!(
            root.set_attribute("k", "v"),
            Err(DomError::InvalidArgument(_))
        ));
        assert_eq!(root.to_xml().unwrap(), "<a/>");
    }

    #[test]
    fn test_declaration_metadata() {
        let doc =
            Document::parse_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>").unwrap();
        assert_eq!(doc.version().unwrap().as_deref(), Some("1.0"));
        assert_eq!(doc.encoding().unwrap().as_deref(), Some("UTF-8"));
        assert_eq!(doc.parse_options(), ParseOptions::default());
    }

    #[test]
    fn test_document_element_missing() {
        let doc = Document::new();
        assert!(matches!(doc.document_element(), Err(DomError::NodeNotFound)));
        assert_eq!(doc.node_type(), NodeType::Document);
        assert_eq!(Document::new_html().node_type(), NodeType::HtmlDocument);
    }

    #[test]
    fn test_set_document_element_replaces_root() {
        let doc = Document::parse_str("<!--c--><old/>").unwrap();
        let fresh = doc.create_element("new").unwrap();
        doc.set_document_element(&fresh).unwrap();
        assert_eq!(doc.document_element().unwrap().node_name().unwrap(), "new");
        assert_eq!(doc.child_nodes().unwrap().len(), 2);
    }

    #[test]
    fn test_factories_validate() {
        let doc = Document::new();
        assert!(matches!(
            doc.create_element("1bad"),
            Err(DomError::InvalidNodeName(_))
        ));
        assert!(matches!(
            doc.create_processing_instruction("XML", "x"),
            Err(DomError::InvalidNodeName(_))
        ));
        assert!(matches!(
            doc.create_comment("a--b"),
            Err(DomError::InvalidArgument(_))
        ));
        let el = doc.create_element_ns("urn:x", "x:item").unwrap();
        assert_eq!(el.namespace_uri().unwrap().as_deref(), Some("urn:x"));
        assert_eq!(el.to_xml().unwrap(), "<x:item xmlns:x=\"urn:x\"/>");
    }

    #[test]
    fn test_entity_reference_takes_declared_value() {
        let doc = Document::parse_str("<!DOCTYPE r [<!ENTITY e \"val\">]><r/>").unwrap();
        let eref = doc.create_entity_reference("e").unwrap();
        assert_eq!(eref.literal().unwrap(), "val");
        assert_eq!(eref.to_xml().unwrap(), "&e;");
    }

    #[test]
    fn test_wrap_handle() {
        let doc = Document::parse_str("<a><b/></a>").unwrap();
        let root = doc.document_element().unwrap();
        let raw = root.handle().raw();
        let again = doc.wrap_handle(raw).unwrap();
        assert!(root.is_same_node(&again));
        assert!(matches!(doc.wrap_handle(0), Err(DomError::InvalidArgument(_))));
        assert!(matches!(
            doc.wrap_handle(10_000),
            Err(DomError::InvalidArgument(_))
        ));
    }
}
