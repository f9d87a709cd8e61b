//! # oxidom
//!
//! A DOM and XPath facade over an arena-backed XML tree engine.
//!
//! The engine (`tree`, `parser`, `serial`, `xpath`) stores a document as a
//! flat arena addressed by [`tree::NodeId`] handles. The [`dom`] module
//! layers typed node wrappers, a document lifecycle with use-after-free
//! detection, and XPath contexts on top of it.
//!
//! Only the facade types are re-exported here. The arena itself stays behind
//! its module path, since engine handles carry no liveness check:
//!
//! ```compile_fail
//! use oxidom::RawDocument;
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use oxidom::{Document, DomNode};
//!
//! let doc = Document::parse_str("<root><child>Hello</child></root>").unwrap();
//! let root = doc.document_element().unwrap();
//! assert_eq!(root.node_name().unwrap(), "root");
//! assert_eq!(doc.find_value("/root/child").unwrap(), "Hello");
//! ```

pub mod dom;
pub mod encoding;
pub mod error;
pub mod parser;
pub mod serial;
pub mod tree;
pub mod util;
pub mod xpath;

// Re-export primary types at the crate root for convenience.
pub use dom::{Document, DomNode, Element, Node, NodeList, XPathContext, XPathExpression, XPathObject};
pub use error::{DomError, ParseError, Result};
pub use parser::ParseOptions;
pub use tree::NodeType;
