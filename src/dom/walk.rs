//! Depth-first traversal over the node capability set.

use super::dispatch::Node;
use super::node::DomNode;
use crate::error::DomError;

/// Visits `start` and its descendants in pre-order, children in sibling
/// order. A node's children are read after the node is visited, so changes
/// the visitor makes below the current node are seen by the walk.
///
/// The first error returned by `visitor` stops the traversal and is
/// returned unchanged.
///
/// # Errors
///
/// Returns the visitor's error, or a [`DomError`] (converted into `E`) if
/// the document is released during the walk.
///
/// ```
/// use oxidom::dom::{walk, Document, DomNode};
///
/// let doc = Document::parse_str("<a><b/><c/></a>").unwrap();
/// let root = doc.document_element().unwrap();
/// let mut names = Vec::new();
/// walk(&root.as_node(), |node| {
///     names.push(node.node_name()?);
///     Ok::<_, oxidom::DomError>(())
/// })
/// .unwrap();
/// assert_eq!(names, ["a", "b", "c"]);
/// ```
pub fn walk<E, F>(start: &Node, mut visitor: F) -> Result<(), E>
where
    E: From<DomError>,
    F: FnMut(&Node) -> Result<(), E>,
{
    let mut stack = vec![start.clone()];
    while let Some(node) = stack.pop() {
        visitor(&node)?;
        let children = node.child_nodes()?;
        stack.extend(children.into_iter().rev());
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    enum Stop {
        At(String),
        Dom(DomError),
    }

    impl From<DomError> for Stop {
        fn from(err: DomError) -> Self {
            Self::Dom(err)
        }
    }

    #[test]
    fn test_pre_order_includes_text() {
        let doc = Document::parse_str("<r><a>x</a><b><c/></b></r>").unwrap();
        let mut seen = Vec::new();
        doc.walk(|node| {
            seen.push(node.node_name()?);
            Ok::<_, DomError>(())
        })
        .unwrap();
        assert_eq!(seen, ["#document", "r", "a", "#text", "b", "c"]);
    }

    #[test]
    fn test_visitor_error_stops_walk() {
        let doc = Document::parse_str("<a><b/><c/></a>").unwrap();
        let root = doc.document_element().unwrap();
        let mut seen = Vec::new();
        let result = root.walk(|node| {
            let name = node.node_name()?;
            seen.push(name.clone());
            if name == "b" {
                return Err(Stop::At(name));
            }
            Ok(())
        });
        assert!(matches!(result, Err(Stop::At(ref n)) if n == "b"));
        assert_eq!(seen, ["a", "b"]);
    }

    #[test]
    fn test_children_added_during_visit_are_walked() {
        let doc = Document::parse_str("<a/>").unwrap();
        let root = doc.document_element().unwrap();
        let mut count = 0;
        root.walk(|node| {
            count += 1;
            if let Some(elem) = node.as_element() {
                if elem.node_name()? == "a" {
                    elem.append_child(&doc.create_element("added")?)?;
                }
            }
            Ok::<_, DomError>(())
        })
        .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_walk_after_free_fails() {
        let doc = Document::parse_str("<a/>").unwrap();
        let root = doc.document_element().unwrap();
        doc.free();
        let result = root.walk(|_| Ok::<_, Stop>(()));
        assert!(matches!(result, Err(Stop::Dom(DomError::UseAfterFree))));
    }
}
