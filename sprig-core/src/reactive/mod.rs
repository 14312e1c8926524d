//! Reactive Primitives
//!
//! This module implements the reactivity engine: reactive objects, refs,
//! computed cells, effects and watchers, all built on one dependency store.
//!
//! # Concepts
//!
//! ## Reactive Objects
//!
//! A [`ReactiveObject`] wraps a plain [`RawObject`]. Reading a property
//! inside a running effect registers that effect as a dependent of the
//! property; writing the property notifies every dependent.
//!
//! ## Refs and Computed Cells
//!
//! A [`Ref`] is a single reactive value. A [`Computed`] is a derived value
//! that caches its result and recomputes lazily, on the first read after one
//! of its dependencies changed.
//!
//! ## Effects
//!
//! A [`ReactiveEffect`] is a computation that re-runs whenever something it
//! read changes, either synchronously or, if it has a scheduler, through
//! the job queue in [`crate::scheduler`].
//!
//! # Implementation Notes
//!
//! Dependencies are discovered automatically: a thread-local stack records
//! which effect is running, and every tracked read consults it. Each run
//! starts from an empty dependency set, so conditional reads are tracked
//! exactly.

mod computed;
mod context;
pub mod deps;
mod effect;
mod object;
mod refs;
mod value;
mod watch;

pub use computed::{computed, Computed};
pub use context::{untracked, ReactiveContext};
pub use deps::{
    has_entries, subscriber_count, track, track_effects, trigger, trigger_effects, Dep, DepKey,
};
pub use effect::{
    effect, effect_with, EffectFn, EffectId, EffectOptions, EffectScheduler, ReactiveEffect,
};
pub use object::{reactive, reactive_from_json, to_reactive, ReactiveObject};
pub use refs::Ref;
pub use value::{RawObject, TargetId, Value};
pub use watch::{traverse, watch, WatchHandle, WatchOptions, WatchSource};
