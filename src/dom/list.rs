//! Ordered node collections returned by navigation and XPath.

use super::dispatch::Node;
use super::node::DomNode;
use crate::error::Result;

/// An ordered list of nodes. For XPath results the order is document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeList(Vec<Node>);

impl NodeList {
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Node> {
        self.0.get(index)
    }

    #[must_use]
    pub fn first(&self) -> Option<&Node> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.0.iter()
    }

    /// Concatenated literal values of all nodes.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`](crate::DomError::UseAfterFree) once
    /// the owning document is released.
    pub fn literal(&self) -> Result<String> {
        self.0.iter().map(|node| node.literal()).collect()
    }

    /// Concatenated markup of all nodes.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::UseAfterFree`](crate::DomError::UseAfterFree) once
    /// the owning document is released.
    pub fn to_xml(&self) -> Result<String> {
        self.0.iter().map(|node| node.to_xml()).collect()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Node> {
        self.0
    }
}

impl FromIterator<Node> for NodeList {
    fn from_iter<I: IntoIterator<Item = Node>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for NodeList {
    type Item = Node;
    type IntoIter = std::vec::IntoIter<Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a NodeList {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_literal_and_markup_concatenate() {
        let doc = Document::parse_str("<r><i>a</i><i>b</i></r>").unwrap();
        let root = doc.document_element().unwrap();
        let items = root.child_nodes().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items.literal().unwrap(), "ab");
        assert_eq!(items.to_xml().unwrap(), "<i>a</i><i>b</i>");
        assert_eq!((&items).into_iter().count(), 2);
        assert!(items.get(2).is_none());
    }

    #[test]
    fn test_empty_list() {
        let list = NodeList::default();
        assert!(list.is_empty());
        assert!(list.first().is_none());
        assert_eq!(list.literal().unwrap(), "");
    }
}
