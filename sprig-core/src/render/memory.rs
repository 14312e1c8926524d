//! In-memory Host
//!
//! [`MemoryHost`] implements [`HostAdapter`] over an arena of nodes and
//! records every operation it receives. It is what the tests render into,
//! and it is usable as a headless host in its own right.

use std::collections::HashMap;
use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use super::handle::NodeHandle;
use super::host::HostAdapter;
use crate::reactive::Value;

/// What a host node is.
#[derive(Debug, Clone)]
pub enum HostNodeKind {
    Element {
        tag: String,
        props: IndexMap<String, Value>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct HostNode {
    kind: HostNodeKind,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
}

impl HostNode {
    fn new(kind: HostNodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// One recorded host operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    CreateElement { node: NodeHandle, tag: String },
    CreateText { node: NodeHandle, text: String },
    CreateComment { node: NodeHandle, text: String },
    SetText { node: NodeHandle, text: String },
    SetElementText { node: NodeHandle, text: String },
    Insert {
        node: NodeHandle,
        parent: NodeHandle,
        anchor: Option<NodeHandle>,
        /// The node was attached before, so this insert is a move.
        relocated: bool,
    },
    Remove { node: NodeHandle },
    PatchProperty { node: NodeHandle, key: String },
}

/// Operation counts, by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpStats {
    pub created: usize,
    /// Inserts of freshly created nodes.
    pub inserted: usize,
    /// Inserts of nodes that were already attached.
    pub moved: usize,
    pub removed: usize,
    pub text_updates: usize,
    pub property_patches: usize,
}

impl OpStats {
    /// Total number of mutations of the host tree.
    pub fn mutations(&self) -> usize {
        self.created
            + self.inserted
            + self.moved
            + self.removed
            + self.text_updates
            + self.property_patches
    }
}

/// A host tree held in memory, with an operation log.
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: HashMap<NodeHandle, HostNode>,
    ops: Vec<HostOp>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached element to render into. Not logged.
    pub fn create_root(&mut self, tag: &str) -> NodeHandle {
        let node = NodeHandle::new();
        self.nodes.insert(
            node,
            HostNode::new(HostNodeKind::Element {
                tag: tag.to_string(),
                props: IndexMap::new(),
            }),
        );
        node
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Take the log, leaving it empty.
    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Counts of the logged operations.
    pub fn stats(&self) -> OpStats {
        let mut stats = OpStats::default();
        for op in &self.ops {
            match op {
                HostOp::CreateElement { .. }
                | HostOp::CreateText { .. }
                | HostOp::CreateComment { .. } => stats.created += 1,
                HostOp::Insert { relocated, .. } => {
                    if *relocated {
                        stats.moved += 1;
                    } else {
                        stats.inserted += 1;
                    }
                }
                HostOp::Remove { .. } => stats.removed += 1,
                HostOp::SetText { .. } | HostOp::SetElementText { .. } => {
                    stats.text_updates += 1
                }
                HostOp::PatchProperty { .. } => stats.property_patches += 1,
            }
        }
        stats
    }

    /// Number of live nodes, roots included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn kind(&self, node: NodeHandle) -> Option<&HostNodeKind> {
        self.nodes.get(&node).map(|n| &n.kind)
    }

    pub fn children(&self, node: NodeHandle) -> &[NodeHandle] {
        self.nodes
            .get(&node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// A property of an element, if set.
    pub fn property(&self, node: NodeHandle, key: &str) -> Option<&Value> {
        match &self.nodes.get(&node)?.kind {
            HostNodeKind::Element { props, .. } => props.get(key),
            _ => None,
        }
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(&self, node: NodeHandle) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeHandle, out: &mut String) {
        let Some(host) = self.nodes.get(&node) else {
            return;
        };
        match &host.kind {
            HostNodeKind::Text(text) => out.push_str(text),
            HostNodeKind::Comment(_) => {}
            HostNodeKind::Element { .. } => {
                for child in &host.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Serialize the children of `node` as markup.
    pub fn inner_html(&self, node: NodeHandle) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_html(*child, &mut out);
        }
        out
    }

    /// Serialize `node` and its descendants as markup.
    pub fn to_html(&self, node: NodeHandle) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, node: NodeHandle, out: &mut String) {
        let Some(host) = self.nodes.get(&node) else {
            return;
        };
        match &host.kind {
            HostNodeKind::Text(text) => out.push_str(&escape(text)),
            HostNodeKind::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
            HostNodeKind::Element { tag, props } => {
                let _ = write!(out, "<{tag}");
                for (key, value) in props {
                    let _ = write!(out, " {key}=\"{}\"", escape(&value.to_display_string()));
                }
                out.push('>');
                for child in &host.children {
                    self.write_html(*child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn add(&mut self, kind: HostNodeKind) -> NodeHandle {
        let node = NodeHandle::new();
        self.nodes.insert(node, HostNode::new(kind));
        node
    }

    fn detach(&mut self, node: NodeHandle) -> bool {
        let Some(parent) = self.nodes.get_mut(&node).and_then(|n| n.parent.take()) else {
            return false;
        };
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|child| *child != node);
        }
        true
    }

    fn drop_subtree(&mut self, node: NodeHandle) {
        let mut stack = vec![node];
        while let Some(next) = stack.pop() {
            if let Some(removed) = self.nodes.remove(&next) {
                stack.extend(removed.children);
            }
        }
    }
}

impl HostAdapter for MemoryHost {
    fn create_element(&mut self, tag: &str) -> NodeHandle {
        let node = self.add(HostNodeKind::Element {
            tag: tag.to_string(),
            props: IndexMap::new(),
        });
        self.ops.push(HostOp::CreateElement {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_text(&mut self, text: &str) -> NodeHandle {
        let node = self.add(HostNodeKind::Text(text.to_string()));
        self.ops.push(HostOp::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn create_comment(&mut self, text: &str) -> NodeHandle {
        let node = self.add(HostNodeKind::Comment(text.to_string()));
        self.ops.push(HostOp::CreateComment {
            node,
            text: text.to_string(),
        });
        node
    }

    fn set_text(&mut self, node: NodeHandle, text: &str) {
        match self.nodes.get_mut(&node).map(|n| &mut n.kind) {
            Some(HostNodeKind::Text(content)) | Some(HostNodeKind::Comment(content)) => {
                *content = text.to_string();
            }
            _ => {
                warn!(%node, "set_text on a node that is not text");
                return;
            }
        }
        self.ops.push(HostOp::SetText {
            node,
            text: text.to_string(),
        });
    }

    fn set_element_text(&mut self, node: NodeHandle, text: &str) {
        let Some(children) = self.nodes.get_mut(&node).map(|n| std::mem::take(&mut n.children))
        else {
            warn!(%node, "set_element_text on an unknown node");
            return;
        };
        for child in children {
            self.drop_subtree(child);
        }
        if !text.is_empty() {
            let child = self.add(HostNodeKind::Text(text.to_string()));
            if let Some(host) = self.nodes.get_mut(&child) {
                host.parent = Some(node);
            }
            if let Some(host) = self.nodes.get_mut(&node) {
                host.children.push(child);
            }
        }
        self.ops.push(HostOp::SetElementText {
            node,
            text: text.to_string(),
        });
    }

    fn insert(&mut self, node: NodeHandle, parent: NodeHandle, anchor: Option<NodeHandle>) {
        if !self.nodes.contains_key(&node) || !self.nodes.contains_key(&parent) {
            warn!(%node, %parent, "insert with an unknown node");
            return;
        }
        let relocated = self.detach(node);

        if let Some(host) = self.nodes.get_mut(&node) {
            host.parent = Some(parent);
        }
        if let Some(host) = self.nodes.get_mut(&parent) {
            let position = anchor
                .and_then(|anchor| host.children.iter().position(|child| *child == anchor))
                .unwrap_or(host.children.len());
            host.children.insert(position, node);
        }
        self.ops.push(HostOp::Insert {
            node,
            parent,
            anchor,
            relocated,
        });
    }

    fn remove(&mut self, node: NodeHandle) {
        self.detach(node);
        self.drop_subtree(node);
        self.ops.push(HostOp::Remove { node });
    }

    fn patch_property(
        &mut self,
        node: NodeHandle,
        key: &str,
        _old: Option<&Value>,
        new: Option<&Value>,
    ) {
        let Some(HostNodeKind::Element { props, .. }) = self.nodes.get_mut(&node).map(|n| &mut n.kind)
        else {
            warn!(%node, key, "patch_property on a node that is not an element");
            return;
        };
        match new {
            Some(value) => {
                props.insert(key.to_string(), value.clone());
            }
            None => {
                props.shift_remove(key);
            }
        }
        self.ops.push(HostOp::PatchProperty {
            node,
            key: key.to_string(),
        });
    }

    fn parent_node(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(&node)?.parent
    }

    fn next_sibling(&self, node: NodeHandle) -> Option<NodeHandle> {
        let parent = self.parent_node(node)?;
        let siblings = &self.nodes.get(&parent)?.children;
        let position = siblings.iter().position(|child| *child == node)?;
        siblings.get(position + 1).copied()
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_serialize() {
        let mut host = MemoryHost::new();
        let root = host.create_root("div");
        let span = host.create_element("span");
        let text = host.create_text("a < b");
        host.insert(text, span, None);
        host.insert(span, root, None);
        host.patch_property(span, "id", None, Some(&Value::from("x")));

        assert_eq!(host.inner_html(root), "<span id=\"x\">a &lt; b</span>");
        assert_eq!(host.text_content(root), "a < b");
    }

    #[test]
    fn insert_before_anchor_and_move() {
        let mut host = MemoryHost::new();
        let root = host.create_root("ul");
        let a = host.create_text("a");
        let b = host.create_text("b");
        host.insert(a, root, None);
        host.insert(b, root, Some(a));
        assert_eq!(host.children(root), &[b, a]);
        assert_eq!(host.next_sibling(b), Some(a));

        host.insert(b, root, None);
        assert_eq!(host.children(root), &[a, b]);

        let stats = host.stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.moved, 1);
    }

    #[test]
    fn remove_drops_subtree() {
        let mut host = MemoryHost::new();
        let root = host.create_root("div");
        let p = host.create_element("p");
        let text = host.create_text("gone");
        host.insert(text, p, None);
        host.insert(p, root, None);

        host.remove(p);
        assert!(!host.contains(p));
        assert!(!host.contains(text));
        assert_eq!(host.node_count(), 1);
    }

    #[test]
    fn element_text_replaces_children() {
        let mut host = MemoryHost::new();
        let root = host.create_root("div");
        let child = host.create_element("b");
        host.insert(child, root, None);

        host.set_element_text(root, "plain");
        assert_eq!(host.inner_html(root), "plain");
        assert!(!host.contains(child));

        host.set_element_text(root, "");
        assert!(host.children(root).is_empty());
    }

    #[test]
    fn property_removal() {
        let mut host = MemoryHost::new();
        let el = host.create_element("input");
        host.patch_property(el, "value", None, Some(&Value::from(3)));
        assert_eq!(host.property(el, "value").and_then(Value::as_i64), Some(3));

        host.patch_property(el, "value", Some(&Value::from(3)), None);
        assert!(host.property(el, "value").is_none());
    }

    #[test]
    fn ops_serialize_as_tagged_json() {
        let mut host = MemoryHost::new();
        let node = host.create_text("hi");
        let json = serde_json::to_value(&host.ops()[0]).unwrap();
        assert_eq!(json["op"], "create_text");
        assert_eq!(json["node"], node.raw());
    }
}
