//! XML serialization.
//!
//! Serializes a `RawDocument` tree, or one node of it, back to XML text, and
//! produces Canonical XML (C14N 1.0) for deterministic comparison and
//! signing.

pub mod c14n;
pub mod xml;

use thiserror::Error;

use crate::tree::NodeType;

pub use c14n::canonicalize;
pub use xml::{serialize, serialize_node, serialize_with_options, SerializeOptions};

/// Failures of canonical serialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    /// The node is not connected to its document.
    #[error("node is not attached to the document")]
    Detached,
    /// The node kind has no canonical form.
    #[error("{0:?} nodes cannot be canonicalized")]
    NotCanonicalizable(NodeType),
    /// C14N 1.0 rejects relative namespace URIs.
    #[error("relative namespace URI is invalid here: {0}")]
    RelativeNamespace(String),
    /// An entity reference has no replacement text to expand.
    #[error("entity '{0}' cannot be expanded")]
    UnresolvedEntity(String),
}
