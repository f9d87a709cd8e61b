//! The DOM facade.
//!
//! A [`Document`] owns the arena tree. Every other node is reached through
//! a wrapper that holds an engine handle and a weak reference to the
//! document; wrappers are dispatched from the engine's type tag into the
//! [`Node`] sum type, one variant per node type. The shared operations live
//! on the [`DomNode`] trait. Once a document is freed or dropped, every
//! wrapper derived from it fails with [`DomError::UseAfterFree`].
//!
//! ```
//! use oxidom::dom::{Document, DomNode};
//!
//! let doc = Document::parse_str("<a><b/>c</a>").unwrap();
//! let a = doc.document_element().unwrap();
//! assert_eq!(a.first_child().unwrap().node_name().unwrap(), "b");
//! assert_eq!(a.text_content().unwrap(), "c");
//! assert_eq!(a.find_nodes("//b").unwrap().len(), 1);
//!
//! doc.free();
//! assert!(matches!(a.to_xml(), Err(oxidom::DomError::UseAfterFree)));
//! ```
//!
//! [`DomError::UseAfterFree`]: crate::DomError::UseAfterFree

mod dispatch;
mod document;
mod list;
mod node;
mod walk;
mod xpath;

pub use dispatch::{
    node_type_for_tag, Attribute, AttributeDecl, CDataSection, Comment, DocbDocumentNode,
    DocumentFragment, DocumentNode, DocumentType, Dtd, Element, ElementDecl, Entity, EntityDecl,
    EntityReference, HtmlDocumentNode, Namespace, Node, Notation, ProcessingInstruction, Text,
    XIncludeEnd, XIncludeStart,
};
pub use document::Document;
pub use list::NodeList;
pub use node::{DomNode, NodeHandle};
pub use walk::walk;
pub use xpath::{XPathContext, XPathExpression, XPathObject, XPathObjectType};
