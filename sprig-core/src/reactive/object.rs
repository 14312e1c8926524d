//! Reactive Objects
//!
//! [`reactive`] wraps a [`RawObject`] in an interception layer: reads record
//! a dependency, writes notify dependents.
//!
//! There is at most one wrapper per raw object. A process-wide cache keyed by
//! object identity holds weak references to live wrappers, so wrapping the
//! same object twice yields the same wrapper, and a wrapper nobody holds is
//! free to go.
//!
//! Wrapping is lazy: an object stored inside a reactive object is wrapped
//! when it is read, not when its parent is wrapped.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use super::deps::{self, DepKey};
use super::value::{RawObject, TargetId, Value};

struct ReactiveInner {
    target: RawObject,
}

impl Drop for ReactiveInner {
    fn drop(&mut self) {
        let id = self.target.id();
        match reactive_cache().try_lock() {
            Some(mut cache) => {
                if cache.get(&id).is_some_and(|weak| weak.strong_count() == 0) {
                    cache.remove(&id);
                }
            }
            None => retired_wrappers().lock().push(id),
        }
    }
}

type ReactiveCache = HashMap<TargetId, Weak<ReactiveInner>>;

static REACTIVE_CACHE: OnceLock<Mutex<ReactiveCache>> = OnceLock::new();
// Wrappers dropped while the cache was busy; swept on the next `reactive`.
static RETIRED_WRAPPERS: OnceLock<Mutex<Vec<TargetId>>> = OnceLock::new();

fn reactive_cache() -> &'static Mutex<ReactiveCache> {
    REACTIVE_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn retired_wrappers() -> &'static Mutex<Vec<TargetId>> {
    RETIRED_WRAPPERS.get_or_init(|| Mutex::new(Vec::new()))
}

fn sweep_retired(cache: &mut ReactiveCache) {
    let retired = std::mem::take(&mut *retired_wrappers().lock());
    for id in retired {
        if cache.get(&id).is_some_and(|weak| weak.strong_count() == 0) {
            cache.remove(&id);
        }
    }
}

/// The tracked view of a raw object.
#[derive(Clone)]
pub struct ReactiveObject {
    inner: Arc<ReactiveInner>,
}

/// Wrap `target`, returning the cached wrapper if one is alive.
pub fn reactive(target: &RawObject) -> ReactiveObject {
    let mut cache = reactive_cache().lock();
    sweep_retired(&mut cache);
    if let Some(existing) = cache.get(&target.id()).and_then(Weak::upgrade) {
        return ReactiveObject { inner: existing };
    }

    let inner = Arc::new(ReactiveInner {
        target: target.clone(),
    });
    cache.insert(target.id(), Arc::downgrade(&inner));
    ReactiveObject { inner }
}

/// Wrap object values; pass every other value through unchanged.
pub fn to_reactive(value: Value) -> Value {
    match value {
        Value::Object(object) => Value::Reactive(reactive(&object)),
        other => other,
    }
}

/// Build a reactive object from a JSON literal. Non-object JSON yields an
/// empty object.
pub fn reactive_from_json(source: serde_json::Value) -> ReactiveObject {
    match Value::from(source) {
        Value::Object(object) => reactive(&object),
        _ => reactive(&RawObject::new()),
    }
}

impl ReactiveObject {
    pub fn id(&self) -> TargetId {
        self.inner.target.id()
    }

    /// The wrapped object. Reads and writes through it are untracked.
    pub fn to_raw(&self) -> RawObject {
        self.inner.target.clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a property, tracking it. Object values come back wrapped.
    pub fn get(&self, key: &str) -> Value {
        deps::track(self.id(), DepKey::prop(key));
        to_reactive(self.inner.target.get(key))
    }

    /// Write a property, then notify readers of it.
    ///
    /// Adding a property that did not exist also notifies readers of the
    /// key set.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let previous = self.inner.target.insert(key, value);
        let added = previous.is_none();
        drop(previous);

        deps::trigger(self.id(), &DepKey::prop(key));
        if added {
            deps::trigger(self.id(), &DepKey::Iterate);
        }
    }

    /// Remove a property, notifying readers of it and of the key set.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.inner.target.remove(key)?;
        deps::trigger(self.id(), &DepKey::prop(key));
        deps::trigger(self.id(), &DepKey::Iterate);
        Some(removed)
    }

    /// Whether the property exists. Tracks the property.
    pub fn contains_key(&self, key: &str) -> bool {
        deps::track(self.id(), DepKey::prop(key));
        self.inner.target.contains_key(key)
    }

    /// Property names in insertion order. Tracks the key set.
    pub fn keys(&self) -> Vec<String> {
        deps::track(self.id(), DepKey::Iterate);
        self.inner.target.keys()
    }

    /// Number of properties. Tracks the key set.
    pub fn len(&self) -> usize {
        deps::track(self.id(), DepKey::Iterate);
        self.inner.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveObject")
            .field("target", &self.inner.target)
            .finish()
    }
}
