//! Sprig Core
//!
//! This crate provides the core runtime for the Sprig reactive rendering
//! framework. It implements:
//!
//! - Reactive primitives (reactive objects, refs, computed cells, effects)
//! - Watchers over reactive sources
//! - A deduplicating job scheduler that batches updates per turn
//! - Tree descriptions, components, and a reconciler with a keyed diff
//!
//! # Architecture
//!
//! - `reactive`: dependency tracking and the reactive primitives
//! - `scheduler`: deferred, deduplicated job execution
//! - `render`: vnodes, host adapters, components and the renderer
//! - `config`: runtime settings
//! - `error`: error types shared by the modules above
//!
//! # Example
//!
//! ```rust,ignore
//! use sprig_core::prelude::*;
//!
//! let mut host = MemoryHost::new();
//! let body = host.create_root("body");
//! let renderer = Renderer::new(host);
//!
//! let counter = Component::builder("Counter")
//!     .data_json(serde_json::json!({ "count": 0 }))
//!     .render(|ctx| {
//!         Ok(h("span", Props::new(), ctx.data().get("count").to_display_string()))
//!     });
//!
//! let mut app = create_app(&renderer, counter);
//! app.mount(body);
//!
//! if let Some(instance) = app.root_instance() {
//!     instance.data().set("count", 1);
//! }
//! flush_jobs();
//! // body now holds <span>1</span>
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod render;
pub mod scheduler;

/// The types most programs need.
pub mod prelude {
    pub use crate::config::RuntimeConfig;
    pub use crate::reactive::{
        computed, effect, reactive, watch, Computed, RawObject, ReactiveEffect, ReactiveObject,
        Ref, Value, WatchOptions,
    };
    pub use crate::render::{
        create_app, h, props, Component, HostAdapter, MemoryHost, NodeHandle, Props, Renderer,
        VNode,
    };
    pub use crate::scheduler::{flush_jobs, next_tick, queue_job, Job};
}
