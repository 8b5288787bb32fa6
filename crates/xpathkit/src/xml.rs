//! [`Document`] implementation over an XML text, backed by `roxmltree`.
//!
//! The parsed tree is copied into an owned arena in document order: each
//! element is followed by its attributes and then by its subtree, so the arena
//! index doubles as the node's document-order position. Queries re-parse the
//! rendered path and walk the axes over that arena. Step predicates run in the
//! caller's environment with the tested node as the context item.

use crate::consts::{FN_PREFIX, XML_NS, XML_PREFIX};
use crate::document::{Document, NodeHandle};
use crate::engine::evaluator::{predicate_holds, resolve_nodes};
use crate::engine::runtime::{Environment, Error, EvaluationOptions, FunctionRegistry, Result, Variables};
use crate::xdm::Value;
use crate::model::{NodeKind, QName};
use crate::parser::ast::{
    Axis, AxisStep, Expression, KindTest, NameTest, NodeTest, PathExpr, PathStart, Scalar,
    WildcardName,
};
use crate::parser::parse;
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct Slot {
    kind: NodeKind,
    name: Option<QName>,
    /// String value.
    text: String,
    parent: Option<usize>,
    children: Vec<usize>,
    attributes: Vec<usize>,
    /// Highest index inside this node's subtree, attributes included.
    last_descendant: usize,
}

/// An XML document that answers path queries.
pub struct XmlDocument {
    slots: Vec<Slot>,
    namespaces: HashMap<String, String>,
    /// Functions for predicates when the document is queried directly.
    functions: Arc<FunctionRegistry>,
}

impl core::fmt::Debug for XmlDocument {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("XmlDocument")
            .field("nodes", &self.slots.len())
            .field("namespaces", &self.namespaces)
            .finish_non_exhaustive()
    }
}

impl XmlDocument {
    /// Parse `xml`; the prefixes declared on the root element are available to queries.
    pub fn parse(xml: &str) -> Result<Self> {
        let tree = roxmltree::Document::parse(xml).map_err(|e| Error::Document(e.to_string()))?;
        let mut slots = Vec::new();
        copy_node(tree.root(), None, &mut slots);

        let mut namespaces = HashMap::from([(XML_PREFIX.to_string(), XML_NS.to_string())]);
        for ns in tree.root_element().namespaces() {
            if let Some(prefix) = ns.name() {
                namespaces.insert(prefix.to_string(), ns.uri().to_string());
            }
        }
        tracing::debug!(nodes = slots.len(), prefixes = namespaces.len(), "loaded XML document");
        Ok(Self {
            slots,
            namespaces,
            functions: Arc::new(FunctionRegistry::with_builtins()),
        })
    }

    /// Bind `prefix` for name tests, replacing any declaration from the document.
    #[must_use]
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    /// Functions available to step predicates of direct queries. Queries made
    /// during an evaluation use the evaluation's functions.
    #[must_use]
    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }

    pub fn root(&self) -> NodeHandle {
        self.handle(0)
    }

    /// Evaluate `path` with `origin` as the start of relative paths.
    pub fn query_from(&self, origin: &NodeHandle, path: &str) -> Result<Vec<NodeHandle>> {
        let item = Value::Node(origin.clone());
        self.with_own_environment(|env| self.query_with(path, env.with_context(&item, None)))
    }

    /// Run `query` in an environment without variables, using this
    /// document's functions and the default options.
    fn with_own_environment<R>(&self, query: impl FnOnce(Environment<'_>) -> Result<R>) -> Result<R> {
        let variables = Variables::new();
        let options = EvaluationOptions::default();
        query(Environment::new(&variables, Some(self), &self.functions, &options, FN_PREFIX))
    }

    fn index_of(&self, node: &NodeHandle) -> Result<usize> {
        if node.order() >= self.slots.len() {
            return Err(Error::Document(format!("node {} is not part of this document", node.order())));
        }
        Ok(node.order())
    }

    fn handle(&self, index: usize) -> NodeHandle {
        let slot = &self.slots[index];
        NodeHandle::new(index, slot.kind, slot.name.clone(), Some(slot.text.clone()))
    }

    fn select(&self, origin: usize, path: &str, env: Environment<'_>) -> Result<Vec<NodeHandle>> {
        let indices = match parse(path)? {
            Expression::Path(path) => self.walk(origin, &path, env)?,
            Expression::Literal(Scalar::String(root)) if root == "/" => vec![0],
            chained @ Expression::PathStep { .. } => {
                return resolve_nodes(&chained, env.with_document(self));
            }
            other => {
                return Err(Error::Document(format!("`{other}` does not select nodes")));
            }
        };
        Ok(indices.into_iter().map(|index| self.handle(index)).collect())
    }

    fn walk(&self, origin: usize, path: &PathExpr, env: Environment<'_>) -> Result<Vec<usize>> {
        let mut current = vec![match path.start {
            PathStart::Root => 0,
            PathStart::Relative => origin,
        }];
        for step in &path.steps {
            let mut next = Vec::new();
            for &node in &current {
                next.extend(self.apply_step(node, step, env)?);
            }
            current = next.into_iter().sorted_unstable().dedup().collect();
        }
        Ok(current)
    }

    fn apply_step(&self, node: usize, step: &AxisStep, env: Environment<'_>) -> Result<Vec<usize>> {
        let mut selected = Vec::new();
        for candidate in self.axis(node, step.axis)? {
            if self.matches(candidate, step.axis, &step.node_test)? {
                selected.push(candidate);
            }
        }
        for predicate in &step.predicates {
            selected = self.filter(selected, predicate, env)?;
        }
        Ok(selected)
    }

    fn filter(&self, nodes: Vec<usize>, predicate: &Expression, env: Environment<'_>) -> Result<Vec<usize>> {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (index, node) in nodes.into_iter().enumerate() {
            let item = Value::Node(self.handle(node));
            let scope = env.with_document(self).with_context(&item, Some((index + 1, size)));
            if predicate_holds(predicate, scope, index + 1)? {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn is_attribute(&self, index: usize) -> bool {
        self.slots[index].kind == NodeKind::Attribute
    }

    fn is_ancestor(&self, ancestor: usize, node: usize) -> bool {
        ancestor < node && self.slots[ancestor].last_descendant >= node
    }

    /// Nodes on `axis` from `node`; reverse axes yield the nearest node first.
    fn axis(&self, node: usize, axis: Axis) -> Result<Vec<usize>> {
        let slot = &self.slots[node];
        let siblings: &[usize] = match slot.parent {
            Some(parent) if slot.kind != NodeKind::Attribute => &self.slots[parent].children,
            _ => &[],
        };
        let ancestors = || {
            let mut out = Vec::new();
            let mut cursor = slot.parent;
            while let Some(parent) = cursor {
                out.push(parent);
                cursor = self.slots[parent].parent;
            }
            out
        };
        Ok(match axis {
            Axis::Child => slot.children.clone(),
            Axis::Attribute => slot.attributes.clone(),
            Axis::SelfAxis => vec![node],
            Axis::Descendant | Axis::DescendantOrSelf => {
                let start = if axis == Axis::Descendant { node + 1 } else { node };
                (start..=slot.last_descendant).filter(|&i| i == node || !self.is_attribute(i)).collect()
            }
            Axis::Parent => slot.parent.into_iter().collect(),
            Axis::Ancestor => ancestors(),
            Axis::AncestorOrSelf => core::iter::once(node).chain(ancestors()).collect(),
            Axis::FollowingSibling => {
                siblings.iter().copied().filter(|&sibling| sibling > node).collect()
            }
            Axis::PrecedingSibling => {
                siblings.iter().rev().copied().filter(|&sibling| sibling < node).collect()
            }
            Axis::Following => (slot.last_descendant + 1..self.slots.len())
                .filter(|&i| !self.is_attribute(i))
                .collect(),
            Axis::Preceding => (0..node)
                .rev()
                .filter(|&i| !self.is_attribute(i) && !self.is_ancestor(i, node))
                .collect(),
            Axis::Namespace => return Err(Error::Unsupported("namespace axis".to_string())),
        })
    }

    fn matches(&self, index: usize, axis: Axis, test: &NodeTest) -> Result<bool> {
        let slot = &self.slots[index];
        match test {
            NodeTest::Name(name_test) => {
                let principal = if axis == Axis::Attribute { NodeKind::Attribute } else { NodeKind::Element };
                Ok(slot.kind == principal && self.name_matches(name_test, slot.name.as_ref())?)
            }
            NodeTest::Kind(kind_test) => self.kind_matches(index, kind_test),
        }
    }

    fn kind_matches(&self, index: usize, test: &KindTest) -> Result<bool> {
        let slot = &self.slots[index];
        Ok(match test {
            KindTest::AnyKind => true,
            KindTest::Text => slot.kind == NodeKind::Text,
            KindTest::Comment => slot.kind == NodeKind::Comment,
            KindTest::ProcessingInstruction(target) => {
                slot.kind == NodeKind::ProcessingInstruction
                    && target.as_ref().is_none_or(|t| slot.name.as_ref().is_some_and(|n| &n.local_name == t))
            }
            KindTest::Element(name) | KindTest::Attribute(name) => {
                let kind = if matches!(test, KindTest::Element(_)) {
                    NodeKind::Element
                } else {
                    NodeKind::Attribute
                };
                slot.kind == kind
                    && match name {
                        Some(name) => {
                            self.name_matches(&NameTest::QName(name.clone()), slot.name.as_ref())?
                        }
                        None => true,
                    }
            }
            KindTest::Document(inner) => {
                if slot.kind != NodeKind::Document {
                    return Ok(false);
                }
                match inner {
                    None => true,
                    Some(inner) => {
                        let mut found = false;
                        for &child in &slot.children {
                            if self.slots[child].kind == NodeKind::Element && self.kind_matches(child, inner)? {
                                found = true;
                                break;
                            }
                        }
                        found
                    }
                }
            }
            KindTest::SchemaElement(_) | KindTest::SchemaAttribute(_) => {
                return Err(Error::Unsupported("schema kind tests".to_string()));
            }
        })
    }

    fn namespace_uri(&self, prefix: &str) -> Result<&str> {
        self.namespaces
            .get(prefix)
            .map(String::as_str)
            .ok_or_else(|| Error::Document(format!("undeclared namespace prefix `{prefix}`")))
    }

    /// Unprefixed names only match nodes without a namespace.
    fn name_matches(&self, test: &NameTest, name: Option<&QName>) -> Result<bool> {
        let Some(name) = name else {
            return Ok(false);
        };
        let node_uri = name.namespace.as_deref();
        Ok(match test {
            NameTest::Wildcard(WildcardName::Any) => true,
            NameTest::Wildcard(WildcardName::LocalWildcard(local)) => &name.local_name == local,
            NameTest::Wildcard(WildcardName::NsWildcard(prefix)) => {
                node_uri == Some(self.namespace_uri(prefix)?)
            }
            NameTest::QName(test) => {
                let expected = match &test.prefix {
                    Some(prefix) => Some(self.namespace_uri(prefix)?),
                    None => None,
                };
                test.local_name == name.local_name && expected == node_uri
            }
        })
    }
}

impl Document for XmlDocument {
    fn query(&self, path: &str) -> Result<Vec<NodeHandle>> {
        self.with_own_environment(|env| self.query_with(path, env))
    }

    fn query_with(&self, path: &str, env: Environment<'_>) -> Result<Vec<NodeHandle>> {
        let origin = match env.context_node() {
            Some(node) => self.index_of(node)?,
            None => 0,
        };
        self.select(origin, path, env)
    }
}

fn qualified(node: roxmltree::Node<'_, '_>, local: &str, uri: Option<&str>) -> QName {
    let prefix = uri.and_then(|uri| node.lookup_prefix(uri));
    let name = QName::new(prefix, local);
    match uri {
        Some(uri) => name.with_namespace(uri),
        None => name,
    }
}

fn copy_node(node: roxmltree::Node<'_, '_>, parent: Option<usize>, slots: &mut Vec<Slot>) -> usize {
    let index = slots.len();
    let (kind, name, text) = if node.is_root() {
        (NodeKind::Document, None, string_value(node))
    } else if node.is_element() {
        let tag = node.tag_name();
        (NodeKind::Element, Some(qualified(node, tag.name(), tag.namespace())), string_value(node))
    } else if node.is_text() {
        (NodeKind::Text, None, node.text().unwrap_or_default().to_string())
    } else if node.is_comment() {
        (NodeKind::Comment, None, node.text().unwrap_or_default().to_string())
    } else {
        let (target, value) = node.pi().map_or(("", ""), |pi| (pi.target, pi.value.unwrap_or_default()));
        (NodeKind::ProcessingInstruction, Some(QName::local(target)), value.to_string())
    };
    slots.push(Slot {
        kind,
        name,
        text,
        parent,
        children: Vec::new(),
        attributes: Vec::new(),
        last_descendant: index,
    });

    for attribute in node.attributes() {
        let attr_index = slots.len();
        slots.push(Slot {
            kind: NodeKind::Attribute,
            name: Some(qualified(node, attribute.name(), attribute.namespace())),
            text: attribute.value().to_string(),
            parent: Some(index),
            children: Vec::new(),
            attributes: Vec::new(),
            last_descendant: attr_index,
        });
        slots[index].attributes.push(attr_index);
    }
    for child in node.children() {
        let child_index = copy_node(child, Some(index), slots);
        slots[index].children.push(child_index);
    }
    slots[index].last_descendant = slots.len() - 1;
    index
}

fn string_value(node: roxmltree::Node<'_, '_>) -> String {
    node.descendants().filter(|n| n.is_text()).filter_map(|n| n.text()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    const CATALOG: &str = r#"<?xml version="1.0"?>
<catalog xmlns:p="urn:parts">
  <item type="a"><price>10</price></item>
  <item type="b"><price>20</price><!-- note --></item>
  <item type="a"><price>30</price></item>
  <p:part id="x1">bolt</p:part>
</catalog>"#;

    #[fixture]
    fn catalog() -> XmlDocument {
        XmlDocument::parse(CATALOG).unwrap()
    }

    fn texts(nodes: &[NodeHandle]) -> Vec<&str> {
        nodes.iter().map(|n| n.text().unwrap_or_default()).collect()
    }

    #[rstest]
    #[case::descendants("//price", vec!["10", "20", "30"])]
    #[case::attribute_predicate("//item[@type = \"a\"]/price", vec!["10", "30"])]
    #[case::positional("//item[2]/price", vec!["20"])]
    #[case::last("//item[position() = last()]/price", vec!["30"])]
    #[case::attribute_values("/catalog/item/@type", vec!["a", "b", "a"])]
    #[case::prefixed("//p:part", vec!["bolt"])]
    #[case::parent("//price[. = 20]/../@type", vec!["b"])]
    #[case::preceding_sibling("//item[3]/preceding-sibling::item[1]/price", vec!["20"])]
    #[case::comment("//comment()", vec![" note "])]
    fn queries(catalog: XmlDocument, #[case] path: &str, #[case] expected: Vec<&str>) {
        let nodes = catalog.query(path).unwrap();
        assert_eq!(texts(&nodes), expected);
    }

    #[rstest]
    fn results_are_in_document_order(catalog: XmlDocument) {
        let nodes = catalog.query("//item/ancestor-or-self::*").unwrap();
        assert!(nodes.windows(2).all(|w| w[0].order() < w[1].order()));
        assert_eq!(nodes.len(), 4);
    }

    #[rstest]
    fn relative_query_from_a_node(catalog: XmlDocument) {
        let second = catalog.query("//item[2]").unwrap().remove(0);
        let prices = catalog.query_from(&second, "price").unwrap();
        assert_eq!(texts(&prices), vec!["20"]);
    }

    #[rstest]
    fn unprefixed_names_ignore_namespaced_elements(catalog: XmlDocument) {
        assert!(catalog.query("//part").unwrap().is_empty());
    }

    #[rstest]
    fn undeclared_prefix_is_a_document_error(catalog: XmlDocument) {
        assert!(matches!(catalog.query("//q:part"), Err(Error::Document(_))));
        let bound = catalog.with_namespace("q", "urn:parts");
        assert_eq!(bound.query("//q:part").unwrap().len(), 1);
    }

    #[rstest]
    fn malformed_xml() {
        assert!(matches!(XmlDocument::parse("<a><b></a>"), Err(Error::Document(_))));
    }
}
