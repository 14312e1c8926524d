//! Ref Implementation
//!
//! A [`Ref`] is a single boxed reactive value, for state that is not
//! naturally an object with properties.
//!
//! # How Refs Work
//!
//! 1. Reading `get()` inside a running effect registers the effect in the
//!    ref's own Dependency Entry.
//!
//! 2. `set()` compares the new value with the stored one by identity
//!    ([`Value::same`]). An identical value is a no-op; anything else is
//!    stored and every dependent is notified.
//!
//! 3. Object values are wrapped reactively on the way in, unless the ref
//!    is shallow.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::deps::{track_effects, trigger_effects, Dep};
use super::object::to_reactive;
use super::value::Value;

/// A reactive cell holding one [`Value`].
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies dependents)
/// count.set(5);
/// ```
#[derive(Clone)]
pub struct Ref {
    inner: Arc<RefInner>,
}

struct RefInner {
    /// The value as given, wrappers stripped. Used for change detection.
    raw: RwLock<Value>,
    /// The value handed out by `get`.
    value: RwLock<Value>,
    dep: Dep,
    shallow: bool,
}

impl Ref {
    /// Create a ref. Object values are wrapped reactively.
    pub fn new(value: impl Into<Value>) -> Self {
        Self::build(value.into(), false)
    }

    /// Create a ref that stores object values as-is.
    pub fn shallow(value: impl Into<Value>) -> Self {
        Self::build(value.into(), true)
    }

    fn build(value: Value, shallow: bool) -> Self {
        let raw = value.clone().into_raw();
        let value = if shallow { value } else { to_reactive(raw.clone()) };
        Self {
            inner: Arc::new(RefInner {
                raw: RwLock::new(raw),
                value: RwLock::new(value),
                dep: Dep::new(),
                shallow,
            }),
        }
    }

    /// Get the current value, tracking the read.
    pub fn get(&self) -> Value {
        if let Some(effect) = ReactiveContext::current_effect() {
            track_effects(&self.inner.dep, &effect);
        }
        self.inner.value.read().clone()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> Value {
        self.inner.value.read().clone()
    }

    /// Store a new value and notify dependents, unless it is identical to the
    /// current one.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        let raw = value.clone().into_raw();
        if self.inner.raw.read().same(&raw) {
            return;
        }

        let stored = if self.inner.shallow { value } else { to_reactive(raw.clone()) };
        let previous_raw = std::mem::replace(&mut *self.inner.raw.write(), raw);
        let previous = std::mem::replace(&mut *self.inner.value.write(), stored);
        drop((previous_raw, previous));

        trigger_effects(&self.inner.dep);
    }

    /// Update the value using a function of the current (untracked) value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = f(&self.get_untracked());
        self.set(next);
    }

    /// Notify dependents without changing the value.
    pub fn trigger(&self) {
        trigger_effects(&self.inner.dep);
    }

    /// Number of effects depending on this ref.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.len()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ref")
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, RawObject};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn ref_get_and_set() {
        let count = Ref::new(0);
        assert_eq!(count.get().as_i64(), Some(0));

        count.set(42);
        assert_eq!(count.get().as_i64(), Some(42));
    }

    #[test]
    fn ref_update() {
        let count = Ref::new(10);
        count.update(|v| Value::from(v.as_i64().unwrap_or(0) + 5));
        assert_eq!(count.get().as_i64(), Some(15));
    }

    #[test]
    fn ref_notifies_dependents() {
        let count = Ref::new(0);
        let call_count = Arc::new(AtomicI32::new(0));

        let _handle = effect({
            let count = count.clone();
            let call_count = call_count.clone();
            move || {
                count.get();
                call_count.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        count.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        count.set(2);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn identical_write_is_silent() {
        let count = Ref::new(5);
        let call_count = Arc::new(AtomicI32::new(0));

        let _handle = effect({
            let count = count.clone();
            let call_count = call_count.clone();
            move || {
                count.get();
                call_count.fetch_add(1, Ordering::SeqCst);
            }
        });

        count.set(5);
        count.set(5.0);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        let object = RawObject::new();
        count.set(object.clone());
        count.set(object.clone());
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        // Same wrapper as the stored object: still identical
        count.set(crate::reactive::reactive(&object));
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn object_values_are_wrapped() {
        let object = RawObject::from_pairs([("n", 1)]);
        let deep = Ref::new(object.clone());
        let shallow = Ref::shallow(object);

        assert!(matches!(deep.get(), Value::Reactive(_)));
        assert!(matches!(shallow.get(), Value::Object(_)));
    }

    #[test]
    fn ref_clone_shares_state() {
        let ref1 = Ref::new(0);
        let ref2 = ref1.clone();

        ref1.set(42);
        assert_eq!(ref2.get().as_i64(), Some(42));
        assert!(ref1.ptr_eq(&ref2));
    }

    #[test]
    fn ref_read_by_effect_is_freed_with_its_handles() {
        let count = Ref::new(0);
        let weak = Arc::downgrade(&count.inner);

        let handle = effect({
            let count = count.clone();
            move || {
                count.get();
            }
        });
        assert_eq!(count.subscriber_count(), 1);

        drop(count);
        assert!(weak.upgrade().is_some());

        drop(handle);
        assert!(weak.upgrade().is_none());
    }
}
