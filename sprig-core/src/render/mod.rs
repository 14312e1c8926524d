//! Rendering
//!
//! Tree descriptions ([`VNode`]), the host adapter they are rendered
//! through ([`HostAdapter`]), components, and the reconciler that keeps a
//! host tree in sync with the latest description ([`Renderer`]).
//!
//! # Tracing
//!
//! Host operations and keyed diffs are traced at `trace` level, component
//! mounts and unmounts at `debug`. Duplicate keys are reported at `warn`
//! and failed renders at `error`.

mod app;
mod component;
mod handle;
mod host;
mod keyed;
mod memory;
mod renderer;
mod vnode;

pub use app::{create_app, App};
pub use component::{
    Component, ComponentBuilder, ComponentInstance, HookFn, LifecycleHook, RenderContext,
    RenderFn,
};
pub use handle::NodeHandle;
pub use host::HostAdapter;
pub use keyed::longest_increasing_subsequence;
pub use memory::{HostNodeKind, HostOp, MemoryHost, OpStats};
pub use renderer::Renderer;
pub use vnode::{h, props, Children, Key, Props, VNode, VNodeKind};
