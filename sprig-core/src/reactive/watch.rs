//! Watchers
//!
//! [`watch`] runs a callback with `(old, new)` whenever a source changes.
//! Unlike a plain effect, the callback is not re-run synchronously: the
//! watcher's effect queues a job, so several changes within one turn reach
//! the callback once, at the next flush.
//!
//! A reactive object source is always watched deeply: the getter visits
//! every property so that any nested write re-fires the callback.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::computed::Computed;
use super::context::untracked;
use super::effect::ReactiveEffect;
use super::object::{reactive, ReactiveObject};
use super::refs::Ref;
use super::value::{RawObject, TargetId, Value};
use crate::scheduler::{queue_job, Job};

type SourceGetter = Arc<dyn Fn() -> Value + Send + Sync>;
type WatchCallback = Box<dyn FnMut(&Value, &Value) + Send>;

/// What a watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    Reactive(ReactiveObject),
    Ref(Ref),
    Getter(SourceGetter),
}

impl WatchSource {
    pub fn getter<F>(getter: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        WatchSource::Getter(Arc::new(getter))
    }

    fn into_getter(self) -> SourceGetter {
        match self {
            WatchSource::Reactive(object) => Arc::new(move || Value::Reactive(object.clone())),
            WatchSource::Ref(cell) => Arc::new(move || cell.get()),
            WatchSource::Getter(getter) => getter,
        }
    }
}

impl From<ReactiveObject> for WatchSource {
    fn from(object: ReactiveObject) -> Self {
        WatchSource::Reactive(object)
    }
}

impl From<&ReactiveObject> for WatchSource {
    fn from(object: &ReactiveObject) -> Self {
        WatchSource::Reactive(object.clone())
    }
}

impl From<Ref> for WatchSource {
    fn from(cell: Ref) -> Self {
        WatchSource::Ref(cell)
    }
}

impl From<&Ref> for WatchSource {
    fn from(cell: &Ref) -> Self {
        WatchSource::Ref(cell.clone())
    }
}

impl From<Computed<Value>> for WatchSource {
    fn from(cell: Computed<Value>) -> Self {
        WatchSource::getter(move || cell.get())
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Reactive(object) => f.debug_tuple("Reactive").field(object).finish(),
            WatchSource::Ref(cell) => f.debug_tuple("Ref").field(cell).finish(),
            WatchSource::Getter(_) => f.write_str("Getter(..)"),
        }
    }
}

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Call the callback once right away, with an empty object as the old
    /// value.
    pub immediate: bool,
    /// Track every nested property, and call the callback on every change
    /// even if the source value is identical.
    pub deep: bool,
}

impl WatchOptions {
    pub fn immediate() -> Self {
        Self {
            immediate: true,
            deep: false,
        }
    }

    pub fn deep() -> Self {
        Self {
            immediate: false,
            deep: true,
        }
    }
}

struct WatchState {
    getter: SourceGetter,
    callback: Mutex<WatchCallback>,
    old: Mutex<Value>,
    deep: bool,
}

impl WatchState {
    fn run_job(&self, effect: &ReactiveEffect) {
        let getter = Arc::clone(&self.getter);
        let new = effect.run_with(|| getter());
        let old = self.old.lock().clone();

        if self.deep || !old.same(&new) {
            untracked(|| (self.callback.lock())(&old, &new));
            let previous = std::mem::replace(&mut *self.old.lock(), new);
            drop(previous);
        }
    }
}

/// Handle returned by [`watch`]. Dropping every clone of it ends the watch.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    effect: ReactiveEffect,
}

impl WatchHandle {
    /// Stop watching. Idempotent; a callback already queued is dropped.
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.effect.is_stopped()
    }

    /// The effect that tracks the source.
    pub fn effect(&self) -> &ReactiveEffect {
        &self.effect
    }
}

/// Watch `source`, calling `callback(old, new)` after it changes.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
/// let handle = watch(&count, |old, new| println!("{old:?} -> {new:?}"), WatchOptions::default());
///
/// count.set(1);
/// flush_jobs(); // Prints: "Number(0) -> Number(1)"
/// handle.stop();
/// ```
pub fn watch<S, F>(source: S, callback: F, options: WatchOptions) -> WatchHandle
where
    S: Into<WatchSource>,
    F: FnMut(&Value, &Value) + Send + 'static,
{
    let source = source.into();
    let deep = options.deep || matches!(source, WatchSource::Reactive(_));

    let base = source.into_getter();
    let getter: SourceGetter = if deep {
        Arc::new(move || traverse(base()))
    } else {
        base
    };

    let state = Arc::new(WatchState {
        getter: Arc::clone(&getter),
        callback: Mutex::new(Box::new(callback)),
        old: Mutex::new(Value::Object(RawObject::new())),
        deep,
    });

    let effect = {
        let state = Arc::clone(&state);
        ReactiveEffect::with_scheduler(
            move || {
                getter();
            },
            move |effect: &ReactiveEffect| {
                let state = Arc::clone(&state);
                let target = effect.clone();
                queue_job(Job::for_effect_with(effect, move || state.run_job(&target)));
            },
        )
    };

    if options.immediate {
        state.run_job(&effect);
    } else {
        let getter = Arc::clone(&state.getter);
        let initial = effect.run_with(|| getter());
        *state.old.lock() = initial;
    }

    WatchHandle { effect }
}

/// Read every nested property of `value` so the running effect tracks all
/// of them. Returns `value`.
pub fn traverse(value: Value) -> Value {
    let mut seen = HashSet::new();
    traverse_inner(&value, &mut seen);
    value
}

fn traverse_inner(value: &Value, seen: &mut HashSet<TargetId>) {
    match value {
        Value::Reactive(object) => {
            if !seen.insert(object.id()) {
                return;
            }
            for key in object.keys() {
                traverse_inner(&object.get(&key), seen);
            }
        }
        Value::Object(object) => {
            // Reads of nested plain objects only track once wrapped.
            traverse_inner(&Value::Reactive(reactive(object)), seen);
        }
        Value::List(items) => {
            for item in items.iter() {
                traverse_inner(item, seen);
            }
        }
        _ => {}
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::computed;
    use crate::scheduler::flush_jobs;
    use serde_json::json;

    type Calls = Arc<Mutex<Vec<(Value, Value)>>>;

    fn recorder() -> (Calls, impl FnMut(&Value, &Value) + Send + 'static) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        (calls, move |old: &Value, new: &Value| {
            sink.lock().push((old.clone(), new.clone()))
        })
    }

    #[test]
    fn ref_change_fires_on_flush() {
        let count = Ref::new(1);
        let (calls, callback) = recorder();
        let _handle = watch(&count, callback, WatchOptions::default());

        count.set(2);
        assert!(calls.lock().is_empty());

        flush_jobs();
        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.as_i64(), Some(1));
        assert_eq!(calls[0].1.as_i64(), Some(2));
    }

    #[test]
    fn changes_in_one_turn_coalesce() {
        let count = Ref::new(0);
        let (calls, callback) = recorder();
        let _handle = watch(&count, callback, WatchOptions::default());

        count.set(1);
        count.set(2);
        count.set(3);
        flush_jobs();

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.as_i64(), Some(0));
        assert_eq!(calls[0].1.as_i64(), Some(3));
    }

    #[test]
    fn immediate_fires_synchronously_with_sentinel() {
        let count = Ref::new(5);
        let (calls, callback) = recorder();
        let _handle = watch(&count, callback, WatchOptions::immediate());

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        let (old, new) = &calls[0];
        assert!(old.as_raw_object().is_some_and(|object| object.is_empty()));
        assert_eq!(new.as_i64(), Some(5));
    }

    #[test]
    fn identical_value_skips_callback() {
        let count = Ref::new(1);
        let (calls, callback) = recorder();
        let _handle = watch(&count, callback, WatchOptions::default());

        count.set(2);
        count.set(1);
        flush_jobs();

        assert!(calls.lock().is_empty());
    }

    #[test]
    fn reactive_source_is_deep() {
        let state = reactive_from_json_literal();
        let (calls, callback) = recorder();
        let _handle = watch(&state, callback, WatchOptions::default());

        let Value::Reactive(user) = state.get("user") else {
            panic!("user should be an object");
        };
        user.set("name", "grace");
        flush_jobs();

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        // Same object on both sides
        assert!(calls[0].0.same(&calls[0].1));
    }

    fn reactive_from_json_literal() -> ReactiveObject {
        crate::reactive::reactive_from_json(json!({ "user": { "name": "ada" } }))
    }

    #[test]
    fn getter_source_tracks_what_it_reads() {
        let a = Ref::new(1);
        let b = Ref::new(2);
        let (calls, callback) = recorder();
        let _handle = watch(
            WatchSource::getter({
                let a = a.clone();
                let b = b.clone();
                move || Value::from(a.get().as_i64().unwrap_or(0) + b.get().as_i64().unwrap_or(0))
            }),
            callback,
            WatchOptions::default(),
        );

        b.set(10);
        flush_jobs();
        assert_eq!(calls.lock()[0].1.as_i64(), Some(11));
    }

    #[test]
    fn computed_source() {
        let base = Ref::new(2);
        let squared = computed({
            let base = base.clone();
            move || {
                let n = base.get().as_i64().unwrap_or(0);
                Value::from(n * n)
            }
        });
        let (calls, callback) = recorder();
        let _handle = watch(squared, callback, WatchOptions::default());

        base.set(3);
        flush_jobs();

        let calls = calls.lock();
        assert_eq!(calls[0].0.as_i64(), Some(4));
        assert_eq!(calls[0].1.as_i64(), Some(9));
    }

    #[test]
    fn stop_drops_queued_callback() {
        let count = Ref::new(0);
        let (calls, callback) = recorder();
        let handle = watch(&count, callback, WatchOptions::default());

        count.set(1);
        handle.stop();
        handle.stop();
        flush_jobs();

        assert!(calls.lock().is_empty());
        assert!(handle.is_stopped());
        assert_eq!(count.subscriber_count(), 0);
    }

    #[test]
    fn traverse_handles_cycles() {
        let object = RawObject::new();
        object.insert("me", object.clone());
        let value = traverse(Value::Object(object.clone()));
        assert!(value.same(&Value::Object(object.clone())));
        // Break the cycle so the object can drop.
        object.remove("me");
    }
}
