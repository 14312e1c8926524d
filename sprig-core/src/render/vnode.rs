//! Tree Descriptions
//!
//! A [`VNode`] describes one node of the desired output tree. Render
//! functions build fresh trees; the renderer fills in the host references
//! while mounting and carries them over from the old tree while patching.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::component::{Component, ComponentInstance};
use super::handle::NodeHandle;
use crate::reactive::Value;

/// Properties of an element or component node, in declaration order.
pub type Props = IndexMap<String, Value>;

/// Build [`Props`] from key/value pairs.
pub fn props<K, V, I>(pairs: I) -> Props
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// Stable identity of a node among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(Arc<str>),
}

impl Key {
    /// Interpret a property value as a key. Integral numbers and strings
    /// qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(Key::Str(Arc::clone(s))),
            other => other.as_i64().map(Key::Int),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(i64::from(value))
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Int(value as i64)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(Arc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(Arc::from(value))
    }
}

/// Children of an element.
#[derive(Debug, Default)]
pub enum Children {
    #[default]
    None,
    Text(String),
    List(Vec<VNode>),
}

impl Children {
    pub fn is_none(&self) -> bool {
        matches!(self, Children::None)
    }
}

impl From<&str> for Children {
    fn from(text: &str) -> Self {
        Children::Text(text.to_string())
    }
}

impl From<String> for Children {
    fn from(text: String) -> Self {
        Children::Text(text)
    }
}

impl From<Vec<VNode>> for Children {
    fn from(nodes: Vec<VNode>) -> Self {
        Children::List(nodes)
    }
}

impl From<VNode> for Children {
    fn from(node: VNode) -> Self {
        Children::List(vec![node])
    }
}

impl From<()> for Children {
    fn from(_: ()) -> Self {
        Children::None
    }
}

impl Clone for Children {
    fn clone(&self) -> Self {
        match self {
            Children::None => Children::None,
            Children::Text(text) => Children::Text(text.clone()),
            Children::List(nodes) => Children::List(nodes.clone()),
        }
    }
}

/// The closed set of node kinds.
#[derive(Debug)]
pub enum VNodeKind {
    Text(String),
    Comment(String),
    /// Several siblings without a wrapping element.
    Fragment(Vec<VNode>),
    Element {
        tag: String,
        props: Props,
        children: Children,
    },
    Component {
        component: Component,
        props: Props,
    },
}

impl Clone for VNodeKind {
    fn clone(&self) -> Self {
        match self {
            VNodeKind::Text(text) => VNodeKind::Text(text.clone()),
            VNodeKind::Comment(text) => VNodeKind::Comment(text.clone()),
            VNodeKind::Fragment(children) => VNodeKind::Fragment(children.clone()),
            VNodeKind::Element {
                tag,
                props,
                children,
            } => VNodeKind::Element {
                tag: tag.clone(),
                props: props.clone(),
                children: children.clone(),
            },
            VNodeKind::Component { component, props } => VNodeKind::Component {
                component: component.clone(),
                props: props.clone(),
            },
        }
    }
}

/// A node of a tree description.
///
/// Cloning copies the description only. The clone is unmounted: it has no
/// host references and no component instance.
#[derive(Debug)]
pub struct VNode {
    pub kind: VNodeKind,
    pub key: Option<Key>,
    /// Host node produced by the last mount or patch. For fragments, the
    /// start anchor.
    pub(crate) el: Option<NodeHandle>,
    /// End anchor of a fragment.
    pub(crate) anchor: Option<NodeHandle>,
    pub(crate) component: Option<Arc<ComponentInstance>>,
}

impl VNode {
    pub fn new(kind: VNodeKind) -> Self {
        Self {
            kind,
            key: None,
            el: None,
            anchor: None,
            component: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(VNodeKind::Text(text.into()))
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(VNodeKind::Comment(text.into()))
    }

    pub fn fragment(children: Vec<VNode>) -> Self {
        Self::new(VNodeKind::Fragment(children))
    }

    /// An element node. A `"key"` property becomes the node key.
    pub fn element(tag: impl Into<String>, props: Props, children: impl Into<Children>) -> Self {
        let (key, props) = lift_key(props);
        Self {
            key,
            ..Self::new(VNodeKind::Element {
                tag: tag.into(),
                props,
                children: children.into(),
            })
        }
    }

    /// A component node. A `"key"` property becomes the node key.
    pub fn component(component: &Component, props: Props) -> Self {
        let (key, props) = lift_key(props);
        Self {
            key,
            ..Self::new(VNodeKind::Component {
                component: component.clone(),
                props,
            })
        }
    }

    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Whether `self` can be patched into `other` in place: same kind, same
    /// tag or component, same key.
    pub fn is_same_type(&self, other: &VNode) -> bool {
        if self.key != other.key {
            return false;
        }
        match (&self.kind, &other.kind) {
            (VNodeKind::Text(_), VNodeKind::Text(_)) => true,
            (VNodeKind::Comment(_), VNodeKind::Comment(_)) => true,
            (VNodeKind::Fragment(_), VNodeKind::Fragment(_)) => true,
            (VNodeKind::Element { tag: a, .. }, VNodeKind::Element { tag: b, .. }) => a == b,
            (
                VNodeKind::Component { component: a, .. },
                VNodeKind::Component { component: b, .. },
            ) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// The host node this vnode produced, if mounted. Component nodes have
    /// none of their own; see [`super::Renderer::host_node`].
    pub fn el(&self) -> Option<NodeHandle> {
        self.el
    }

    /// End anchor of a mounted fragment.
    pub fn fragment_end(&self) -> Option<NodeHandle> {
        self.anchor
    }

    /// The component instance behind a mounted component node.
    pub fn component_instance(&self) -> Option<&Arc<ComponentInstance>> {
        self.component.as_ref()
    }

    /// Child nodes of an element or fragment.
    pub fn child_nodes(&self) -> &[VNode] {
        match &self.kind {
            VNodeKind::Fragment(children)
            | VNodeKind::Element {
                children: Children::List(children),
                ..
            } => children,
            _ => &[],
        }
    }
}

impl Clone for VNode {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            ..Self::new(self.kind.clone())
        }
    }
}

impl From<&str> for VNode {
    fn from(text: &str) -> Self {
        VNode::text(text)
    }
}

impl From<String> for VNode {
    fn from(text: String) -> Self {
        VNode::text(text)
    }
}

fn lift_key(mut props: Props) -> (Option<Key>, Props) {
    let key = props.shift_remove("key").and_then(|value| Key::from_value(&value));
    (key, props)
}

/// Build an element node.
///
/// # Example
///
/// ```rust,ignore
/// let list = h("ul", Props::new(), vec![
///     h("li", props([("key", 1)]), "one"),
///     h("li", props([("key", 2)]), "two"),
/// ]);
/// ```
pub fn h(tag: &str, props: Props, children: impl Into<Children>) -> VNode {
    VNode::element(tag, props, children)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_prop_is_lifted() {
        let node = h("li", props([("key", Value::from("a")), ("id", Value::from(1))]), "x");

        assert_eq!(node.key, Some(Key::from("a")));
        let VNodeKind::Element { props, children, .. } = &node.kind else {
            panic!("expected element");
        };
        assert!(!props.contains_key("key"));
        assert!(props.contains_key("id"));
        assert!(matches!(children, Children::Text(t) if t == "x"));
    }

    #[test]
    fn same_type_requires_tag_and_key() {
        let a = h("li", props([("key", 1)]), ());
        let b = h("li", props([("key", 1)]), "different children");
        let c = h("li", props([("key", 2)]), ());
        let d = h("p", props([("key", 1)]), ());

        assert!(a.is_same_type(&b));
        assert!(!a.is_same_type(&c));
        assert!(!a.is_same_type(&d));
        assert!(!VNode::text("x").is_same_type(&VNode::comment("x")));
        assert!(VNode::from("x").is_same_type(&VNode::text("y")));
    }

    #[test]
    fn clone_is_unmounted() {
        let mut node = VNode::text("hello").with_key("k");
        node.el = Some(NodeHandle::new());

        let copy = node.clone();
        assert_eq!(copy.key, node.key);
        assert!(copy.el().is_none());
    }

    #[test]
    fn key_from_value() {
        assert_eq!(Key::from_value(&Value::from(3)), Some(Key::Int(3)));
        assert_eq!(Key::from_value(&Value::from(1.5)), None);
        assert_eq!(Key::from_value(&Value::Null), None);
        assert_eq!(Key::from("x").to_string(), "x");
    }
}
