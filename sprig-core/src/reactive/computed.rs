//! Computed Implementation
//!
//! A [`Computed`] is a cached derived value that recomputes lazily.
//!
//! # How Computed Cells Work
//!
//! 1. The cell starts dirty. The first read runs the getter inside the
//!    cell's own effect, caches the result, and clears the dirty flag.
//!
//! 2. When something the getter read changes, the effect's scheduler marks
//!    the cell dirty and notifies the cell's own dependents. It does not
//!    recompute.
//!
//! 3. The next read recomputes. Any number of changes between two reads
//!    costs exactly one getter run.
//!
//! This keeps unread cells free: a source with ten derived cells only pays
//! for the cells that are actually read.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::context::ReactiveContext;
use super::deps::{track_effects, trigger_effects, Dep};
use super::effect::ReactiveEffect;

type Getter<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// A lazily computed, cached value.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(2);
/// let doubled = computed({
///     let count = count.clone();
///     move || count.get().as_i64().unwrap_or(0) * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    getter: Getter<T>,
    /// The cached value (None if never computed).
    value: Mutex<Option<T>>,
    dirty: AtomicBool,
    /// Effects that read this cell.
    dep: Dep,
    effect: ReactiveEffect,
}

impl<T> ComputedInner<T> {
    fn invalidate(&self) {
        if !self.dirty.swap(true, Ordering::SeqCst) {
            trigger_effects(&self.dep);
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
    }
}

/// Restores the dirty flag if the getter panics.
struct DirtyOnUnwind<'a>(&'a AtomicBool);

impl Drop for DirtyOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.store(true, Ordering::SeqCst);
        }
    }
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a computed cell. The getter does not run until first read.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let getter: Getter<T> = Arc::new(getter);

        let inner = Arc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let run = Arc::clone(&getter);
            let weak = weak.clone();
            let effect = ReactiveEffect::for_computed(
                Arc::new(move || {
                    run();
                }),
                Arc::new(move |_: &ReactiveEffect| {
                    if let Some(inner) = weak.upgrade() {
                        inner.invalidate();
                    }
                }),
            );

            ComputedInner {
                getter,
                value: Mutex::new(None),
                dirty: AtomicBool::new(true),
                dep: Dep::new(),
                effect,
            }
        });

        Self { inner }
    }

    /// Get the value, recomputing first if the cell is dirty.
    pub fn get(&self) -> T {
        if let Some(effect) = ReactiveContext::current_effect() {
            track_effects(&self.inner.dep, &effect);
        }

        if !self.inner.dirty.load(Ordering::SeqCst) {
            if let Some(value) = self.inner.value.lock().clone() {
                return value;
            }
        }
        self.recompute()
    }

    fn recompute(&self) -> T {
        // Cleared first, so a change during the getter run leaves the cell dirty.
        self.inner.dirty.store(false, Ordering::SeqCst);
        let _guard = DirtyOnUnwind(&self.inner.dirty);

        let getter = Arc::clone(&self.inner.getter);
        let value = self.inner.effect.run_with(|| getter());

        let previous = self.inner.value.lock().replace(value.clone());
        drop(previous);
        value
    }

    /// Whether the next read will run the getter.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Check if the cell has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.lock().is_some()
    }

    /// The effect that runs the getter.
    pub fn effect(&self) -> &ReactiveEffect {
        &self.inner.effect
    }

    /// Number of effects depending on this cell.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.len()
    }

    /// Stop tracking sources. The cached value is kept; further reads run
    /// the getter untracked.
    pub fn stop(&self) {
        self.inner.effect.stop();
        self.inner.dirty.store(true, Ordering::SeqCst);
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("dirty", &self.is_dirty())
            .field("value", &*self.inner.value.lock())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Create a computed cell.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(getter)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
