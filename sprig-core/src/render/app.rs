//! Application root.

use std::sync::Arc;

use tracing::debug;

use super::component::{Component, ComponentInstance};
use super::handle::NodeHandle;
use super::host::HostAdapter;
use super::renderer::Renderer;
use super::vnode::{Props, VNode};

/// A root component bound to a renderer.
///
/// # Example
///
/// ```rust,ignore
/// let mut app = create_app(&renderer, root_component);
/// app.mount(container);
/// // ...
/// app.unmount();
/// ```
pub struct App<H> {
    renderer: Renderer<H>,
    root: Component,
    props: Props,
    container: Option<NodeHandle>,
}

/// Create an application for `root`.
pub fn create_app<H>(renderer: &Renderer<H>, root: Component) -> App<H>
where
    H: HostAdapter + Send + 'static,
{
    App {
        renderer: renderer.clone(),
        root,
        props: Props::new(),
        container: None,
    }
}

impl<H> App<H>
where
    H: HostAdapter + Send + 'static,
{
    /// Props passed to the root component.
    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// Mount the root component into `container`. Mounting again moves the
    /// app to the new container.
    pub fn mount(&mut self, container: NodeHandle) {
        if let Some(previous) = self.container.take() {
            self.renderer.render(None, previous);
        }
        debug!(component = self.root.name(), %container, "mount app");
        let vnode = VNode::component(&self.root, self.props.clone());
        self.renderer.render(Some(vnode), container);
        self.container = Some(container);
    }

    /// Unmount the app. A no-op if it is not mounted.
    pub fn unmount(&mut self) {
        if let Some(container) = self.container.take() {
            debug!(component = self.root.name(), %container, "unmount app");
            self.renderer.render(None, container);
        }
    }

    pub fn container(&self) -> Option<NodeHandle> {
        self.container
    }

    /// The instance of the root component, while mounted.
    pub fn root_instance(&self) -> Option<Arc<ComponentInstance>> {
        self.container
            .and_then(|container| self.renderer.root_instance(container))
    }

    pub fn renderer(&self) -> &Renderer<H> {
        &self.renderer
    }
}
