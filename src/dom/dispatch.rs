//! Handle dispatch: engine type tag to typed wrapper.
//!
//! One wrapper struct exists per engine node type, and [`Node`] is the sum
//! of all of them. The mapping is generated from a single table so that
//! every tag the engine can report has exactly one variant; the `match` in
//! [`Node::from_handle`] is exhaustive over [`NodeType`], so adding a type
//! without a wrapper does not compile.

use std::fmt;
use std::rc::Weak;

use super::document::DocumentCell;
use super::node::{DomNode, NodeHandle};
use crate::error::{DomError, Result};
use crate::tree::{NodeId, NodeType, RawDocument};

macro_rules! node_wrappers {
    ($(
        $(#[$meta:meta])*
        $variant:ident => $node_type:ident, $as_fn:ident;
    )+) => {
        $(
            $(#[$meta])*
            #[derive(Clone, PartialEq, Eq, Hash)]
            pub struct $variant(pub(crate) NodeHandle);

            impl DomNode for $variant {
                fn handle(&self) -> &NodeHandle {
                    &self.0
                }
            }

            impl fmt::Debug for $variant {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.debug_tuple(stringify!($variant)).field(&self.0.raw()).finish()
                }
            }

            impl From<$variant> for Node {
                fn from(node: $variant) -> Self {
                    Self::$variant(node)
                }
            }

            impl TryFrom<Node> for $variant {
                type Error = DomError;

                fn try_from(node: Node) -> Result<Self> {
                    match node {
                        Node::$variant(inner) => Ok(inner),
                        other => Err(DomError::invalid(format!(
                            "expected {} node, found {:?}",
                            stringify!($variant),
                            other.node_type()
                        ))),
                    }
                }
            }
        )+

        /// A node of any type.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum Node {
            $($variant($variant),)+
        }

        impl Node {
            pub(crate) fn from_handle(handle: NodeHandle) -> Self {
                match handle.node_type() {
                    $(NodeType::$node_type => Self::$variant($variant(handle)),)+
                }
            }

            $(
                #[must_use]
                pub fn $as_fn(&self) -> Option<&$variant> {
                    match self {
                        Self::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            )+
        }

        impl DomNode for Node {
            fn handle(&self) -> &NodeHandle {
                match self {
                    $(Self::$variant(inner) => &inner.0,)+
                }
            }
        }
    };
}

node_wrappers! {
    /// An element.
    Element => Element, as_element;
    /// An attribute; its parent is the owning element.
    Attribute => Attribute, as_attribute;
    Text => Text, as_text;
    CDataSection => CDataSection, as_cdata_section;
    /// An unexpanded entity reference.
    EntityReference => EntityRef, as_entity_reference;
    Entity => Entity, as_entity;
    ProcessingInstruction => ProcessingInstruction, as_processing_instruction;
    Comment => Comment, as_comment;
    /// The document node of an XML document.
    DocumentNode => Document, as_document;
    DocumentType => DocumentType, as_document_type;
    DocumentFragment => DocumentFragment, as_document_fragment;
    Notation => Notation, as_notation;
    /// The document node of an HTML document.
    HtmlDocumentNode => HtmlDocument, as_html_document;
    /// The `<!DOCTYPE>` node; its children are the internal subset.
    Dtd => Dtd, as_dtd;
    ElementDecl => ElementDecl, as_element_decl;
    AttributeDecl => AttributeDecl, as_attribute_decl;
    EntityDecl => EntityDecl, as_entity_decl;
    /// A namespace declaration, as found on the `namespace` axis.
    Namespace => NamespaceDecl, as_namespace;
    XIncludeStart => XIncludeStart, as_xinclude_start;
    XIncludeEnd => XIncludeEnd, as_xinclude_end;
    DocbDocumentNode => DocbDocument, as_docb_document;
}

/// Resolves an engine type tag.
///
/// # Errors
///
/// Returns [`DomError::UnknownNodeType`] for tags outside `1..=21`.
///
/// ```
/// use oxidom::dom::node_type_for_tag;
/// use oxidom::{DomError, NodeType};
///
/// assert_eq!(node_type_for_tag(1).unwrap(), NodeType::Element);
/// assert!(matches!(node_type_for_tag(42), Err(DomError::UnknownNodeType(42))));
/// ```
pub fn node_type_for_tag(tag: i32) -> Result<NodeType> {
    NodeType::from_tag(tag).ok_or(DomError::UnknownNodeType(tag))
}

/// Wraps `id` by reading its type tag from the engine.
pub(crate) fn wrap(doc: &Weak<DocumentCell>, raw: &RawDocument, id: NodeId) -> Result<Node> {
    let node_type = node_type_for_tag(raw.node_type_tag(id))?;
    Ok(Node::from_handle(NodeHandle::new(doc.clone(), id, node_type)))
}
