//! Components
//!
//! A [`Component`] is a reusable definition: a name, a data factory, a
//! render function and lifecycle hooks. Mounting a component node creates a
//! [`ComponentInstance`] that owns reactive data, reactive props, the
//! effect that re-renders it, and the subtree it last rendered.
//!
//! # Lifecycle
//!
//! 1. `before_create` runs with empty data, then the data factory fills the
//!    data object, then `created` runs.
//!
//! 2. The render effect runs for the first time: `before_mount`, render,
//!    mount the subtree, `mounted`.
//!
//! 3. Whenever something the render function read changes, the effect
//!    queues a job; the flush re-renders and patches the subtree.
//!
//! 4. Unmounting runs `before_unmount`, stops the effect, unmounts the
//!    subtree and runs `unmounted`.
//!
//! Hooks run untracked, so reads inside a hook never subscribe the render
//! effect.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::handle::NodeHandle;
use super::vnode::{Props, VNode};
use crate::error::RenderError;
use crate::reactive::{reactive, untracked, RawObject, ReactiveEffect, ReactiveObject, Value};

/// Render function of a component.
pub type RenderFn = Arc<dyn Fn(&RenderContext) -> Result<VNode, RenderError> + Send + Sync>;

/// Lifecycle hook callback.
pub type HookFn = Arc<dyn Fn(&RenderContext) + Send + Sync>;

type DataFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Lifecycle points a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    BeforeCreate,
    Created,
    BeforeMount,
    Mounted,
    BeforeUnmount,
    Unmounted,
}

/// What render functions and hooks see of their instance.
#[derive(Debug, Clone)]
pub struct RenderContext {
    data: ReactiveObject,
    props: ReactiveObject,
}

impl RenderContext {
    /// The instance's reactive data.
    pub fn data(&self) -> &ReactiveObject {
        &self.data
    }

    /// The props passed by the parent, as a reactive object.
    pub fn props(&self) -> &ReactiveObject {
        &self.props
    }
}

#[derive(Default)]
struct Hooks {
    before_create: Vec<HookFn>,
    created: Vec<HookFn>,
    before_mount: Vec<HookFn>,
    mounted: Vec<HookFn>,
    before_unmount: Vec<HookFn>,
    unmounted: Vec<HookFn>,
}

impl Hooks {
    fn slot(&mut self, hook: LifecycleHook) -> &mut Vec<HookFn> {
        match hook {
            LifecycleHook::BeforeCreate => &mut self.before_create,
            LifecycleHook::Created => &mut self.created,
            LifecycleHook::BeforeMount => &mut self.before_mount,
            LifecycleHook::Mounted => &mut self.mounted,
            LifecycleHook::BeforeUnmount => &mut self.before_unmount,
            LifecycleHook::Unmounted => &mut self.unmounted,
        }
    }

    fn get(&self, hook: LifecycleHook) -> &[HookFn] {
        match hook {
            LifecycleHook::BeforeCreate => &self.before_create,
            LifecycleHook::Created => &self.created,
            LifecycleHook::BeforeMount => &self.before_mount,
            LifecycleHook::Mounted => &self.mounted,
            LifecycleHook::BeforeUnmount => &self.before_unmount,
            LifecycleHook::Unmounted => &self.unmounted,
        }
    }
}

struct ComponentDef {
    name: String,
    data: Option<DataFn>,
    render: RenderFn,
    hooks: Hooks,
}

/// A component definition. Cheap to clone; clones are the same component.
#[derive(Clone)]
pub struct Component {
    def: Arc<ComponentDef>,
}

impl Component {
    /// A component with no data and no hooks.
    pub fn new<F>(name: impl Into<String>, render: F) -> Self
    where
        F: Fn(&RenderContext) -> Result<VNode, RenderError> + Send + Sync + 'static,
    {
        Self::builder(name).render(render)
    }

    pub fn builder(name: impl Into<String>) -> ComponentBuilder {
        ComponentBuilder {
            name: name.into(),
            data: None,
            hooks: Hooks::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.def, &other.def)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component").field("name", &self.def.name).finish()
    }
}

/// Builder for [`Component`]. Finished by [`ComponentBuilder::render`].
///
/// # Example
///
/// ```rust,ignore
/// let counter = Component::builder("Counter")
///     .data_json(json!({ "count": 0 }))
///     .on(LifecycleHook::Mounted, |ctx| println!("mounted with {:?}", ctx.data()))
///     .render(|ctx| Ok(h("span", Props::new(), ctx.data().get("count").to_display_string())));
/// ```
pub struct ComponentBuilder {
    name: String,
    data: Option<DataFn>,
    hooks: Hooks,
}

impl ComponentBuilder {
    /// Factory for each instance's data. Should return an object; anything
    /// else yields empty data.
    pub fn data<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.data = Some(Arc::new(factory));
        self
    }

    /// Data from a JSON literal. Every instance gets its own copy.
    pub fn data_json(self, data: serde_json::Value) -> Self {
        self.data(move || Value::from(data.clone()))
    }

    pub fn on<F>(mut self, hook: LifecycleHook, callback: F) -> Self
    where
        F: Fn(&RenderContext) + Send + Sync + 'static,
    {
        self.hooks.slot(hook).push(Arc::new(callback));
        self
    }

    pub fn render<F>(self, render: F) -> Component
    where
        F: Fn(&RenderContext) -> Result<VNode, RenderError> + Send + Sync + 'static,
    {
        Component {
            def: Arc::new(ComponentDef {
                name: self.name,
                data: self.data,
                render: Arc::new(render),
                hooks: self.hooks,
            }),
        }
    }
}

/// A mounted component.
pub struct ComponentInstance {
    uid: u64,
    component: Component,
    context: RenderContext,
    /// The tree from the last successful render. Taken out while patching.
    pub(crate) sub_tree: Mutex<Option<VNode>>,
    effect: OnceLock<ReactiveEffect>,
    is_mounted: AtomicBool,
    /// Where the first render goes.
    pub(crate) container: Mutex<Option<(NodeHandle, Option<NodeHandle>)>>,
    last_error: Mutex<Option<RenderError>>,
}

impl ComponentInstance {
    /// Create an instance: run `before_create`, build data, run `created`.
    pub(crate) fn new(component: &Component, props: &Props) -> Arc<Self> {
        static UID: AtomicU64 = AtomicU64::new(0);

        let props = RawObject::from_pairs(props.iter().map(|(key, value)| (key.clone(), value.clone())));
        let data = RawObject::new();
        let instance = Arc::new(Self {
            uid: UID.fetch_add(1, Ordering::Relaxed),
            component: component.clone(),
            context: RenderContext {
                data: reactive(&data),
                props: reactive(&props),
            },
            sub_tree: Mutex::new(None),
            effect: OnceLock::new(),
            is_mounted: AtomicBool::new(false),
            container: Mutex::new(None),
            last_error: Mutex::new(None),
        });

        instance.call_hook(LifecycleHook::BeforeCreate);
        if let Some(factory) = &component.def.data {
            let initial = untracked(|| factory());
            match initial.as_raw_object() {
                Some(source) => {
                    for (key, value) in source.entries() {
                        data.insert(key, value);
                    }
                }
                None => tracing::warn!(
                    component = component.name(),
                    "data factory did not return an object"
                ),
            }
        }
        instance.call_hook(LifecycleHook::Created);
        instance
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }

    pub fn data(&self) -> &ReactiveObject {
        &self.context.data
    }

    pub fn props(&self) -> &ReactiveObject {
        &self.context.props
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn is_mounted(&self) -> bool {
        self.is_mounted.load(Ordering::SeqCst)
    }

    pub(crate) fn set_mounted(&self, mounted: bool) {
        self.is_mounted.store(mounted, Ordering::SeqCst);
    }

    /// The effect driving re-renders, once set up.
    pub fn effect(&self) -> Option<&ReactiveEffect> {
        self.effect.get()
    }

    pub(crate) fn set_effect(&self, effect: ReactiveEffect) {
        if self.effect.set(effect).is_err() {
            tracing::warn!(uid = self.uid, "render effect installed twice");
        }
    }

    /// The error of the most recent failed render, cleared by a successful one.
    pub fn last_error(&self) -> Option<RenderError> {
        self.last_error.lock().clone()
    }

    /// Run the render function, catching errors and panics.
    pub(crate) fn invoke_render(&self) -> Result<VNode, RenderError> {
        let render = Arc::clone(&self.component.def.render);
        let context = &self.context;
        let result = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| render(context))) {
            Ok(result) => result,
            Err(payload) => Err(RenderError::Panicked {
                component: self.name().to_string(),
                message: crate::error::panic_message(payload.as_ref()),
            }),
        };

        *self.last_error.lock() = result.as_ref().err().cloned();
        result
    }

    pub(crate) fn call_hook(&self, hook: LifecycleHook) {
        for callback in self.component.def.hooks.get(hook) {
            untracked(|| callback(&self.context));
        }
    }

    /// Apply props from a parent re-render. Only changed props are written,
    /// so unchanged props do not re-render the child.
    pub(crate) fn update_props(&self, next: &Props) {
        let raw = self.context.props.to_raw();
        for (key, value) in next {
            let candidate = value.clone().into_raw();
            if !raw.contains_key(key) || !raw.get(key).same(&candidate) {
                self.context.props.set(key, candidate);
            }
        }
        for key in raw.keys() {
            if !next.contains_key(&key) {
                self.context.props.remove(&key);
            }
        }
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("uid", &self.uid)
            .field("name", &self.name())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}
