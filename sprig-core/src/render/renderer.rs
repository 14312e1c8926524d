//! Reconciler
//!
//! [`Renderer`] turns tree descriptions into host operations. Mounting walks
//! a new tree and creates host nodes; patching walks an old and a new tree
//! side by side and issues only the operations needed to turn one into the
//! other.
//!
//! # Patch Rules
//!
//! - Nodes that are not the same type (kind, tag or component, key) are
//!   never patched into each other: the old subtree is unmounted and the new
//!   one mounted in its place.
//! - Text and comment nodes update their content if it changed.
//! - Elements diff their properties and then their children.
//! - Fragments diff their children between their start and end anchors.
//! - Component nodes hand new props to the existing instance; the instance
//!   re-renders itself through the scheduler if a prop it read changed.
//!
//! Host locks are taken per operation, never across a render function or a
//! nested mount.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use super::component::{ComponentInstance, LifecycleHook};
use super::handle::NodeHandle;
use super::host::HostAdapter;
use super::vnode::{Children, Props, VNode, VNodeKind};
use crate::config::RendererConfig;
use crate::reactive::{untracked, ReactiveEffect};
use crate::scheduler::{queue_job, Job};

/// Drives a [`HostAdapter`] from tree descriptions.
///
/// Cloning yields another handle to the same renderer.
pub struct Renderer<H> {
    inner: Arc<RendererInner<H>>,
}

struct RendererInner<H> {
    host: Mutex<H>,
    /// Mounted root tree per container.
    roots: Mutex<HashMap<NodeHandle, VNode>>,
    config: RendererConfig,
}

impl<H> Clone for Renderer<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H> Renderer<H>
where
    H: HostAdapter + Send + 'static,
{
    pub fn new(host: H) -> Self {
        Self::with_config(host, RendererConfig::default())
    }

    pub fn with_config(host: H, config: RendererConfig) -> Self {
        Self {
            inner: Arc::new(RendererInner {
                host: Mutex::new(host),
                roots: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.inner.config
    }

    /// Run `f` with exclusive access to the host.
    ///
    /// `f` must not call back into the renderer.
    pub fn with_host<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.inner.host.lock())
    }

    /// Mount, patch or unmount the root tree of `container`.
    ///
    /// `Some(tree)` mounts the tree, or patches the tree already mounted
    /// there. `None` unmounts whatever is mounted there.
    pub fn render(&self, vnode: Option<VNode>, container: NodeHandle) {
        let previous = self.inner.roots.lock().remove(&container);

        match (previous, vnode) {
            (previous, Some(mut next)) => {
                let mut previous = previous;
                self.patch(previous.as_mut(), &mut next, container, None);
                self.inner.roots.lock().insert(container, next);
            }
            (Some(mut previous), None) => self.unmount(&mut previous, true),
            (None, None) => {}
        }
    }

    /// Whether `container` has a mounted root.
    pub fn has_root(&self, container: NodeHandle) -> bool {
        self.inner.roots.lock().contains_key(&container)
    }

    /// The component instance mounted at the root of `container`, if the
    /// root is a component.
    pub fn root_instance(&self, container: NodeHandle) -> Option<Arc<ComponentInstance>> {
        self.inner
            .roots
            .lock()
            .get(&container)
            .and_then(|root| root.component.clone())
    }

    /// Patch `old` into `new`, or mount `new` if there is no `old`.
    ///
    /// `anchor` is where newly mounted nodes go: before it, or at the end of
    /// `container` if `None`.
    pub fn patch(
        &self,
        old: Option<&mut VNode>,
        new: &mut VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) {
        let mut anchor = anchor;
        let old = match old {
            Some(old) if !old.is_same_type(new) => {
                anchor = self.next_host_node(old);
                self.unmount(old, true);
                None
            }
            old => old,
        };

        match new.kind {
            VNodeKind::Text(_) => self.process_text(old, new, container, anchor),
            VNodeKind::Comment(_) => self.process_comment(old, new, container, anchor),
            VNodeKind::Fragment(_) => self.process_fragment(old, new, container, anchor),
            VNodeKind::Element { .. } => match old {
                Some(old) => self.patch_element(old, new),
                None => self.mount_element(new, container, anchor),
            },
            VNodeKind::Component { .. } => match old {
                Some(old) => self.update_component_node(old, new),
                None => self.mount_component(new, container, anchor),
            },
        }
    }

    /// Tear down `vnode`: stop component effects, run unmount hooks, and if
    /// `do_remove` is set, detach its host nodes.
    pub fn unmount(&self, vnode: &mut VNode, do_remove: bool) {
        if let Some(instance) = vnode.component.take() {
            self.unmount_component(&instance, do_remove);
        }

        let el = vnode.el.take();
        let end = vnode.anchor.take();
        match &mut vnode.kind {
            VNodeKind::Component { .. } => {}
            VNodeKind::Fragment(children) => {
                for child in children.iter_mut() {
                    self.unmount(child, do_remove);
                }
                if do_remove {
                    self.remove_host_nodes([el, end]);
                }
            }
            VNodeKind::Element { children, .. } => {
                // Descendants leave the host tree together with the element.
                if let Children::List(list) = children {
                    for child in list.iter_mut() {
                        self.unmount(child, false);
                    }
                }
                if do_remove {
                    self.remove_host_nodes([el, None]);
                }
            }
            VNodeKind::Text(_) | VNodeKind::Comment(_) => {
                if do_remove {
                    self.remove_host_nodes([el, None]);
                }
            }
        }
    }

    /// First host node of `vnode`: its own node, the start anchor of a
    /// fragment, or the first host node a component rendered.
    pub fn host_node(&self, vnode: &VNode) -> Option<NodeHandle> {
        match vnode.kind {
            VNodeKind::Component { .. } => vnode.component.as_ref().and_then(|instance| {
                instance
                    .sub_tree
                    .lock()
                    .as_ref()
                    .and_then(|tree| self.host_node(tree))
            }),
            _ => vnode.el,
        }
    }

    /// The host node right after everything `vnode` produced.
    pub(super) fn next_host_node(&self, vnode: &VNode) -> Option<NodeHandle> {
        match vnode.kind {
            VNodeKind::Component { .. } => vnode.component.as_ref().and_then(|instance| {
                instance
                    .sub_tree
                    .lock()
                    .as_ref()
                    .and_then(|tree| self.next_host_node(tree))
            }),
            VNodeKind::Fragment(_) => vnode
                .anchor
                .and_then(|end| self.with_host(|host| host.next_sibling(end))),
            _ => vnode
                .el
                .and_then(|el| self.with_host(|host| host.next_sibling(el))),
        }
    }

    /// Move every host node of a mounted `vnode` before `anchor`.
    pub(super) fn move_node(&self, vnode: &VNode, container: NodeHandle, anchor: Option<NodeHandle>) {
        match &vnode.kind {
            VNodeKind::Component { .. } => {
                if let Some(instance) = &vnode.component {
                    if let Some(tree) = instance.sub_tree.lock().as_ref() {
                        self.move_node(tree, container, anchor);
                    }
                }
            }
            VNodeKind::Fragment(children) => {
                if let Some(start) = vnode.el {
                    self.with_host(|host| host.insert(start, container, anchor));
                }
                for child in children {
                    self.move_node(child, container, anchor);
                }
                if let Some(end) = vnode.anchor {
                    self.with_host(|host| host.insert(end, container, anchor));
                }
            }
            _ => {
                if let Some(el) = vnode.el {
                    trace!(node = %el, "move");
                    self.with_host(|host| host.insert(el, container, anchor));
                }
            }
        }
    }

    pub(super) fn mount_children(
        &self,
        children: &mut [VNode],
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) {
        for child in children.iter_mut() {
            self.patch(None, child, container, anchor);
        }
    }

    fn unmount_children(&self, children: &mut [VNode]) {
        for child in children.iter_mut() {
            self.unmount(child, true);
        }
    }

    fn remove_host_nodes(&self, nodes: [Option<NodeHandle>; 2]) {
        self.with_host(|host| {
            for node in nodes.into_iter().flatten() {
                host.remove(node);
            }
        });
    }

    fn process_text(
        &self,
        old: Option<&mut VNode>,
        new: &mut VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) {
        let VNodeKind::Text(text) = &new.kind else {
            return;
        };
        match old {
            None => {
                let el = self.with_host(|host| {
                    let el = host.create_text(text);
                    host.insert(el, container, anchor);
                    el
                });
                new.el = Some(el);
            }
            Some(old) => {
                new.el = old.el;
                if let (Some(el), VNodeKind::Text(previous)) = (old.el, &old.kind) {
                    if previous != text {
                        self.with_host(|host| host.set_text(el, text));
                    }
                }
            }
        }
    }

    fn process_comment(
        &self,
        old: Option<&mut VNode>,
        new: &mut VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) {
        let VNodeKind::Comment(text) = &new.kind else {
            return;
        };
        match old {
            None => {
                let el = self.with_host(|host| {
                    let el = host.create_comment(text);
                    host.insert(el, container, anchor);
                    el
                });
                new.el = Some(el);
            }
            Some(old) => {
                new.el = old.el;
                if let (Some(el), VNodeKind::Comment(previous)) = (old.el, &old.kind) {
                    if previous != text {
                        self.with_host(|host| host.set_text(el, text));
                    }
                }
            }
        }
    }

    fn process_fragment(
        &self,
        old: Option<&mut VNode>,
        new: &mut VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) {
        match old {
            None => {
                let (start, end) = self.with_host(|host| {
                    let start = host.create_text("");
                    let end = host.create_text("");
                    host.insert(start, container, anchor);
                    host.insert(end, container, anchor);
                    (start, end)
                });
                new.el = Some(start);
                new.anchor = Some(end);
                if let VNodeKind::Fragment(children) = &mut new.kind {
                    self.mount_children(children, container, Some(end));
                }
            }
            Some(old) => {
                new.el = old.el;
                new.anchor = old.anchor;
                let end = new.anchor;
                if let (VNodeKind::Fragment(previous), VNodeKind::Fragment(next)) =
                    (&mut old.kind, &mut new.kind)
                {
                    self.patch_keyed_children(previous, next, container, end);
                }
            }
        }
    }

    fn mount_element(&self, vnode: &mut VNode, container: NodeHandle, anchor: Option<NodeHandle>) {
        let VNodeKind::Element {
            tag,
            props,
            children,
        } = &mut vnode.kind
        else {
            return;
        };

        let el = self.with_host(|host| host.create_element(tag));
        trace!(node = %el, tag = tag.as_str(), "mount element");

        match children {
            Children::Text(text) => self.with_host(|host| host.set_element_text(el, text)),
            Children::List(list) => self.mount_children(list, el, None),
            Children::None => {}
        }
        self.with_host(|host| {
            for (key, value) in props.iter() {
                host.patch_property(el, key, None, Some(value));
            }
            host.insert(el, container, anchor);
        });
        vnode.el = Some(el);
    }

    fn patch_element(&self, old: &mut VNode, new: &mut VNode) {
        new.el = old.el;
        let Some(el) = old.el else {
            return;
        };
        let (
            VNodeKind::Element {
                props: old_props,
                children: old_children,
                ..
            },
            VNodeKind::Element {
                props: new_props,
                children: new_children,
                ..
            },
        ) = (&mut old.kind, &mut new.kind)
        else {
            return;
        };

        self.patch_children(old_children, new_children, el);
        self.patch_props(el, old_props, new_props);
    }

    fn patch_children(&self, old: &mut Children, new: &mut Children, el: NodeHandle) {
        match (old, new) {
            (Children::List(previous), Children::Text(text)) => {
                self.unmount_children(previous);
                self.with_host(|host| host.set_element_text(el, text));
            }
            (Children::Text(previous), Children::Text(text)) => {
                if previous != text {
                    self.with_host(|host| host.set_element_text(el, text));
                }
            }
            (Children::None, Children::Text(text)) => {
                self.with_host(|host| host.set_element_text(el, text));
            }
            (Children::List(previous), Children::List(next)) => {
                self.patch_keyed_children(previous, next, el, None);
            }
            (Children::Text(_), Children::List(next)) => {
                self.with_host(|host| host.set_element_text(el, ""));
                self.mount_children(next, el, None);
            }
            (Children::None, Children::List(next)) => self.mount_children(next, el, None),
            (Children::List(previous), Children::None) => self.unmount_children(previous),
            (Children::Text(_), Children::None) => {
                self.with_host(|host| host.set_element_text(el, ""));
            }
            (Children::None, Children::None) => {}
        }
    }

    fn patch_props(&self, el: NodeHandle, old: &Props, new: &Props) {
        self.with_host(|host| {
            for (key, next) in new {
                let previous = old.get(key);
                if previous.map_or(true, |previous| !previous.same(next)) {
                    host.patch_property(el, key, previous, Some(next));
                }
            }
            for (key, previous) in old {
                if !new.contains_key(key) {
                    host.patch_property(el, key, Some(previous), None);
                }
            }
        });
    }

    fn mount_component(&self, vnode: &mut VNode, container: NodeHandle, anchor: Option<NodeHandle>) {
        let VNodeKind::Component { component, props } = &vnode.kind else {
            return;
        };

        let instance = ComponentInstance::new(component, props);
        *instance.container.lock() = Some((container, anchor));
        vnode.component = Some(Arc::clone(&instance));
        debug!(component = instance.name(), uid = instance.uid(), "mount component");

        self.setup_render_effect(&instance);
    }

    fn update_component_node(&self, old: &mut VNode, new: &mut VNode) {
        let instance = old.component.take();
        if let (Some(instance), VNodeKind::Component { props, .. }) = (&instance, &new.kind) {
            instance.update_props(props);
        }
        new.component = instance;
    }

    fn setup_render_effect(&self, instance: &Arc<ComponentInstance>) {
        let renderer = Arc::downgrade(&self.inner);
        let target = Arc::downgrade(instance);

        let effect = ReactiveEffect::with_scheduler(
            move || {
                let (Some(inner), Some(instance)) = (renderer.upgrade(), target.upgrade()) else {
                    return;
                };
                Renderer { inner }.update_component(&instance);
            },
            |effect: &ReactiveEffect| queue_job(Job::for_effect(effect)),
        );
        instance.set_effect(effect.clone());
        effect.run();
    }

    /// Body of a component's render effect: first mount or re-render.
    fn update_component(&self, instance: &Arc<ComponentInstance>) {
        if !instance.is_mounted() {
            instance.call_hook(LifecycleHook::BeforeMount);
            let mut tree = match instance.invoke_render() {
                Ok(tree) => tree,
                Err(err) => {
                    error!(component = instance.name(), error = %err, "render failed; mounting placeholder");
                    VNode::comment(self.inner.config.error_placeholder.clone())
                }
            };
            let Some((container, anchor)) = *instance.container.lock() else {
                return;
            };

            untracked(|| self.patch(None, &mut tree, container, anchor));
            *instance.sub_tree.lock() = Some(tree);
            instance.set_mounted(true);
            instance.call_hook(LifecycleHook::Mounted);
            return;
        }

        let mut tree = match instance.invoke_render() {
            Ok(tree) => tree,
            Err(err) => {
                error!(component = instance.name(), error = %err, "render failed; keeping previous tree");
                return;
            }
        };
        let Some(mut previous) = instance.sub_tree.lock().take() else {
            return;
        };

        let parent = self
            .host_node(&previous)
            .and_then(|node| self.with_host(|host| host.parent_node(node)))
            .or_else(|| (*instance.container.lock()).map(|(container, _)| container));
        let Some(container) = parent else {
            *instance.sub_tree.lock() = Some(previous);
            return;
        };
        let anchor = self.next_host_node(&previous);

        trace!(component = instance.name(), uid = instance.uid(), "re-render");
        untracked(|| self.patch(Some(&mut previous), &mut tree, container, anchor));
        *instance.sub_tree.lock() = Some(tree);
    }

    fn unmount_component(&self, instance: &Arc<ComponentInstance>, do_remove: bool) {
        instance.call_hook(LifecycleHook::BeforeUnmount);
        if let Some(effect) = instance.effect() {
            effect.stop();
        }

        let tree = instance.sub_tree.lock().take();
        if let Some(mut tree) = tree {
            self.unmount(&mut tree, do_remove);
        }
        instance.set_mounted(false);
        instance.call_hook(LifecycleHook::Unmounted);
        debug!(component = instance.name(), uid = instance.uid(), "unmount component");
    }
}

impl<H> std::fmt::Debug for Renderer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("roots", &self.inner.roots.lock().len())
            .field("config", &self.inner.config)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
