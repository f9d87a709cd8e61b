//! Node kinds and their numeric type tags.
//!
//! `NodeKind` carries the per-kind payload. `NodeType` is the bare tag with
//! libxml2's `xmlElementType` numbering, which is what the facade dispatches on.

/// The numeric type tag of a tree node.
///
/// The discriminants are part of the engine's external contract and follow
/// libxml2's `xmlElementType` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum NodeType {
    Element = 1,
    Attribute = 2,
    Text = 3,
    CDataSection = 4,
    EntityRef = 5,
    Entity = 6,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    DocumentFragment = 11,
    Notation = 12,
    HtmlDocument = 13,
    Dtd = 14,
    ElementDecl = 15,
    AttributeDecl = 16,
    EntityDecl = 17,
    NamespaceDecl = 18,
    XIncludeStart = 19,
    XIncludeEnd = 20,
    DocbDocument = 21,
}

impl NodeType {
    /// Every tag the engine can produce, in numeric order.
    pub const ALL: [NodeType; 21] = [
        Self::Element,
        Self::Attribute,
        Self::Text,
        Self::CDataSection,
        Self::EntityRef,
        Self::Entity,
        Self::ProcessingInstruction,
        Self::Comment,
        Self::Document,
        Self::DocumentType,
        Self::DocumentFragment,
        Self::Notation,
        Self::HtmlDocument,
        Self::Dtd,
        Self::ElementDecl,
        Self::AttributeDecl,
        Self::EntityDecl,
        Self::NamespaceDecl,
        Self::XIncludeStart,
        Self::XIncludeEnd,
        Self::DocbDocument,
    ];

    /// Maps a raw tag back to a `NodeType`, or `None` outside `1..=21`.
    #[must_use]
    pub fn from_tag(tag: i32) -> Option<Self> {
        usize::try_from(tag)
            .ok()
            .and_then(|t| t.checked_sub(1))
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// The raw tag value.
    #[must_use]
    pub fn tag(self) -> i32 {
        self as i32
    }

    /// Returns `true` for the three document-node tags.
    #[must_use]
    pub fn is_document(self) -> bool {
        matches!(
            self,
            Self::Document | Self::HtmlDocument | Self::DocbDocument
        )
    }
}

/// The flavour of a document node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Xml,
    Html,
    Docb,
}

/// The kind of a node and its payload.
///
/// Navigation links live in `NodeData`, not here.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The document node. There is exactly one per `RawDocument`.
    Document(DocumentKind),

    /// An element, e.g. `<svg:rect x="1">`.
    Element {
        /// Local name.
        name: String,
        /// Namespace prefix, if the element name was prefixed.
        prefix: Option<String>,
        /// Namespace URI the element is bound to, if any.
        namespace: Option<String>,
        /// Attribute nodes, in document order.
        attributes: Vec<super::NodeId>,
        /// Namespace declaration nodes (`xmlns`, `xmlns:p`) on this element.
        ns_decls: Vec<super::NodeId>,
    },

    /// An attribute. Its parent link points at the owning element.
    Attribute {
        name: String,
        prefix: Option<String>,
        namespace: Option<String>,
        value: String,
    },

    /// Character data.
    Text { content: String },

    /// A CDATA section.
    CData { content: String },

    /// An unexpanded entity reference such as `&company;`.
    EntityRef {
        name: String,
        /// Replacement text of the referenced entity, if it was declared.
        value: Option<String>,
    },

    /// An entity node (as opposed to its declaration in a DTD).
    Entity { name: String, content: String },

    /// `<?target data?>`.
    ProcessingInstruction { target: String, data: Option<String> },

    /// `<!-- content -->`.
    Comment { content: String },

    /// A DOM-level document type node.
    DocumentType {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },

    /// A parentless container whose children move on insertion.
    DocumentFragment,

    /// `<!NOTATION name PUBLIC "..." "...">`.
    Notation {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },

    /// The DTD node produced for `<!DOCTYPE ...>`. Its children are the
    /// declarations of the internal subset.
    Dtd {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },

    /// `<!ELEMENT name content>`, content model kept verbatim.
    ElementDecl { name: String, content: String },

    /// `<!ATTLIST element name type default>` for a single attribute.
    AttributeDecl {
        element: String,
        name: String,
        attr_type: String,
        default: Option<String>,
    },

    /// `<!ENTITY name ...>`.
    EntityDecl {
        name: String,
        parameter: bool,
        value: Option<String>,
        public_id: Option<String>,
        system_id: Option<String>,
    },

    /// A namespace declaration. `prefix` is `None` for the default namespace.
    NamespaceDecl { prefix: Option<String>, uri: String },

    XIncludeStart,
    XIncludeEnd,
}

impl NodeKind {
    /// The numeric tag for this kind.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Document(DocumentKind::Xml) => NodeType::Document,
            Self::Document(DocumentKind::Html) => NodeType::HtmlDocument,
            Self::Document(DocumentKind::Docb) => NodeType::DocbDocument,
            Self::Element { .. } => NodeType::Element,
            Self::Attribute { .. } => NodeType::Attribute,
            Self::Text { .. } => NodeType::Text,
            Self::CData { .. } => NodeType::CDataSection,
            Self::EntityRef { .. } => NodeType::EntityRef,
            Self::Entity { .. } => NodeType::Entity,
            Self::ProcessingInstruction { .. } => NodeType::ProcessingInstruction,
            Self::Comment { .. } => NodeType::Comment,
            Self::DocumentType { .. } => NodeType::DocumentType,
            Self::DocumentFragment => NodeType::DocumentFragment,
            Self::Notation { .. } => NodeType::Notation,
            Self::Dtd { .. } => NodeType::Dtd,
            Self::ElementDecl { .. } => NodeType::ElementDecl,
            Self::AttributeDecl { .. } => NodeType::AttributeDecl,
            Self::EntityDecl { .. } => NodeType::EntityDecl,
            Self::NamespaceDecl { .. } => NodeType::NamespaceDecl,
            Self::XIncludeStart => NodeType::XIncludeStart,
            Self::XIncludeEnd => NodeType::XIncludeEnd,
        }
    }

    /// Creates an element payload with no attributes and no namespace.
    #[must_use]
    pub fn element(name: &str) -> Self {
        Self::Element {
            name: name.to_string(),
            prefix: None,
            namespace: None,
            attributes: Vec::new(),
            ns_decls: Vec::new(),
        }
    }

    /// Creates a text payload.
    #[must_use]
    pub fn text(content: &str) -> Self {
        Self::Text {
            content: content.to_string(),
        }
    }

    /// Whether a node of this kind may appear in a child list.
    #[must_use]
    pub fn is_child_capable(&self) -> bool {
        matches!(
            self,
            Self::Element { .. }
                | Self::Text { .. }
                | Self::CData { .. }
                | Self::EntityRef { .. }
                | Self::ProcessingInstruction { .. }
                | Self::Comment { .. }
                | Self::DocumentFragment
                | Self::XIncludeStart
                | Self::XIncludeEnd
        )
    }

    /// Whether nodes of this kind may have element-content children.
    #[must_use]
    pub fn accepts_children(&self) -> bool {
        matches!(
            self,
            Self::Document(_) | Self::Element { .. } | Self::DocumentFragment
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_tag_covers_all() {
        for (i, ty) in NodeType::ALL.iter().enumerate() {
            let tag = i32::try_from(i + 1).unwrap_or_default();
            assert_eq!(ty.tag(), tag);
            assert_eq!(NodeType::from_tag(tag), Some(*ty));
        }
    }

    #[test]
    fn test_from_tag_rejects_out_of_range() {
        assert_eq!(NodeType::from_tag(0), None);
        assert_eq!(NodeType::from_tag(22), None);
        assert_eq!(NodeType::from_tag(-1), None);
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(NodeKind::element("a").node_type(), NodeType::Element);
        assert_eq!(
            NodeKind::Document(DocumentKind::Html).node_type(),
            NodeType::HtmlDocument
        );
        assert_eq!(
            NodeKind::NamespaceDecl {
                prefix: None,
                uri: "urn:x".to_string()
            }
            .node_type()
            .tag(),
            18
        );
    }
}
