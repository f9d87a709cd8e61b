//! Shared helpers: XML name rules and qualified-name handling.

pub mod qname;
