//! The host adapter: the capability set the reconciler drives.

use super::handle::NodeHandle;
use crate::reactive::Value;

/// Primitive operations on a host tree (a document, a terminal buffer, an
/// in-memory tree in tests).
///
/// The reconciler calls these and nothing else. Implementations decide what
/// an element, a property or a text node means for their host.
pub trait HostAdapter {
    fn create_element(&mut self, tag: &str) -> NodeHandle;

    fn create_text(&mut self, text: &str) -> NodeHandle;

    fn create_comment(&mut self, text: &str) -> NodeHandle;

    /// Replace the content of a text or comment node.
    fn set_text(&mut self, node: NodeHandle, text: &str);

    /// Replace every child of an element with `text`.
    fn set_element_text(&mut self, node: NodeHandle, text: &str);

    /// Insert `node` into `parent` before `anchor`, or at the end if there is
    /// no anchor. A node that is already attached somewhere is moved.
    fn insert(&mut self, node: NodeHandle, parent: NodeHandle, anchor: Option<NodeHandle>);

    /// Detach `node` from its parent.
    fn remove(&mut self, node: NodeHandle);

    /// Apply a property change. `old` is `None` when the property is being
    /// added, `new` is `None` when it is being removed.
    fn patch_property(
        &mut self,
        node: NodeHandle,
        key: &str,
        old: Option<&Value>,
        new: Option<&Value>,
    );

    fn parent_node(&self, node: NodeHandle) -> Option<NodeHandle>;

    fn next_sibling(&self, node: NodeHandle) -> Option<NodeHandle>;
}
