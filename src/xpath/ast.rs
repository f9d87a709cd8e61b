//! Syntax tree for compiled XPath 1.0 expressions.
//!
//! The tree is immutable once built and holds no engine handles, so a
//! compiled expression can be shared between threads and evaluated against
//! any document.

use std::fmt;

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Literal(String),
    /// `$name`, stored without the dollar sign.
    Variable(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// A location path. `absolute` paths start at the document node.
    Path {
        absolute: bool,
        steps: Vec<Step>,
    },
    /// A primary expression filtered by predicates, e.g. `$set[2]`.
    Filter {
        base: Box<Expr>,
        predicates: Vec<Expr>,
    },
    /// A filter expression continued by a relative path, e.g. `(a|b)/c`.
    Chain {
        base: Box<Expr>,
        steps: Vec<Step>,
    },
    Union(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// The operator with its operands swapped: `a < b` is `b > a`.
    #[must_use]
    pub fn mirrored(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
            other => other,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "div",
            Self::Mod => "mod",
        })
    }
}

/// One location step: `axis::test[predicate]...`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    /// The step `//` abbreviates.
    #[must_use]
    pub fn descendant_or_self() -> Self {
        Self {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::AnyNode,
            predicates: Vec::new(),
        }
    }
}

/// The thirteen XPath axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    SelfAxis,
}

impl Axis {
    const NAMES: [(&'static str, Self); 13] = [
        ("ancestor", Self::Ancestor),
        ("ancestor-or-self", Self::AncestorOrSelf),
        ("attribute", Self::Attribute),
        ("child", Self::Child),
        ("descendant", Self::Descendant),
        ("descendant-or-self", Self::DescendantOrSelf),
        ("following", Self::Following),
        ("following-sibling", Self::FollowingSibling),
        ("namespace", Self::Namespace),
        ("parent", Self::Parent),
        ("preceding", Self::Preceding),
        ("preceding-sibling", Self::PrecedingSibling),
        ("self", Self::SelfAxis),
    ];

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(_, axis)| axis)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, a)| *a == self)
            .map_or("", |&(n, _)| n)
    }

    /// Reverse axes number their nodes in reverse document order.
    #[must_use]
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Self::Ancestor | Self::AncestorOrSelf | Self::Preceding | Self::PrecedingSibling
        )
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a step keeps from its axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `name` or `prefix:name`, matched against the axis' principal node kind.
    Name {
        prefix: Option<String>,
        local: String,
    },
    /// `*`
    AnyName,
    /// `prefix:*`
    AnyLocalName(String),
    /// `node()`
    AnyNode,
    Text,
    Comment,
    /// `processing-instruction()` with an optional target literal.
    ProcessingInstruction(Option<String>),
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name {
                prefix: Some(p),
                local,
            } => write!(f, "{p}:{local}"),
            Self::Name { prefix: None, local } => f.write_str(local),
            Self::AnyName => f.write_str("*"),
            Self::AnyLocalName(p) => write!(f, "{p}:*"),
            Self::AnyNode => f.write_str("node()"),
            Self::Text => f.write_str("text()"),
            Self::Comment => f.write_str("comment()"),
            Self::ProcessingInstruction(None) => f.write_str("processing-instruction()"),
            Self::ProcessingInstruction(Some(t)) => write!(f, "processing-instruction('{t}')"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_axis_names_round_trip() {
        for (name, axis) in Axis::NAMES {
            assert_eq!(Axis::from_name(name), Some(axis));
            assert_eq!(axis.to_string(), name);
        }
        assert_eq!(Axis::from_name("sibling"), None);
    }

    #[test]
    fn test_mirrored_ops() {
        assert_eq!(BinaryOp::Lt.mirrored(), BinaryOp::Gt);
        assert_eq!(BinaryOp::Ge.mirrored(), BinaryOp::Le);
        assert_eq!(BinaryOp::Eq.mirrored(), BinaryOp::Eq);
    }

    #[test]
    fn test_node_test_display() {
        let test = NodeTest::Name {
            prefix: Some("svg".into()),
            local: "rect".into(),
        };
        assert_eq!(test.to_string(), "svg:rect");
        assert_eq!(
            NodeTest::ProcessingInstruction(Some("php".into())).to_string(),
            "processing-instruction('php')"
        );
    }
}
