//! The document collaborator: anything that can select nodes for a rendered path.

use crate::engine::runtime::{Environment, Error};
use crate::model::{NodeKind, QName};
use crate::xdm::Value;
use core::cmp::Ordering;
use core::hash::{Hash, Hasher};

/// A queryable document.
///
/// `query` receives a path expression rendered by the evaluator (for example
/// `//item[@type = 'a']/price`) and returns the selected nodes in document
/// order. Namespace prefixes in the path are resolved by the implementation.
pub trait Document: Send + Sync {
    fn query(&self, path: &str) -> Result<Vec<NodeHandle>, Error>;

    /// Query on behalf of an evaluation. Relative paths start at the context
    /// node of `env` when there is one. Predicates left in `path` may refer
    /// to variables and functions of `env`; documents that evaluate them
    /// should do so in `env`.
    ///
    /// The default answers absolute paths and paths without a context node
    /// through [`Document::query`].
    fn query_with(&self, path: &str, env: Environment<'_>) -> Result<Vec<NodeHandle>, Error> {
        match env.context_node() {
            Some(node) if !path.starts_with('/') => Err(Error::Unsupported(format!(
                "relative path `{path}` from node {}",
                node.order()
            ))),
            _ => self.query(path),
        }
    }
}

/// Opaque handle to a node selected by a [`Document`].
///
/// `order` is the node's position in document order; identity and ordering of
/// handles are defined by it alone.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    order: usize,
    kind: NodeKind,
    name: Option<QName>,
    text: Option<String>,
}

impl NodeHandle {
    pub fn new(order: usize, kind: NodeKind, name: Option<QName>, text: Option<String>) -> Self {
        Self { order, kind, name, text }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> Option<&QName> {
        self.name.as_ref()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Text content cast to `Integer` when it parses as one, otherwise kept as `String`.
    pub fn typed_value(&self) -> Value {
        let text = self.text.as_deref().unwrap_or_default();
        match text.trim().parse::<i64>() {
            Ok(number) => Value::Integer(number),
            Err(_) => Value::String(text.to_string()),
        }
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for NodeHandle {}

impl Hash for NodeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.order.hash(state);
    }
}

impl PartialOrd for NodeHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.cmp(&other.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn element(order: usize, text: &str) -> NodeHandle {
        NodeHandle::new(order, NodeKind::Element, Some(QName::local("e")), Some(text.to_string()))
    }

    #[rstest]
    #[case::integer("40000", Value::Integer(40000))]
    #[case::padded(" 12 ", Value::Integer(12))]
    #[case::decimal("1.5", Value::from("1.5"))]
    #[case::word("abc", Value::from("abc"))]
    fn typed_value_casts_integral_text(#[case] text: &str, #[case] expected: Value) {
        assert_eq!(element(0, text).typed_value(), expected);
    }

    #[rstest]
    fn identity_and_order_follow_document_position() {
        assert_eq!(element(3, "a"), element(3, "b"));
        assert!(element(1, "x") < element(2, "x"));
    }
}
