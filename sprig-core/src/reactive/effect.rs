//! Effect Implementation
//!
//! An effect is a re-runnable computation. Its dependencies are whatever
//! reactive slots it reads while running.
//!
//! # How Effects Work
//!
//! 1. Running an effect first removes it from every Dependency Entry it was
//!    in, then executes its function inside a [`ReactiveContext`], so the
//!    dependency set always reflects the latest run.
//!
//! 2. When a dependency changes, the effect either re-runs synchronously or,
//!    if it has a scheduler, hands itself to the scheduler instead. Computed
//!    cells and component renders use schedulers; plain effects do not.
//!
//! 3. Stopping an effect removes it from every Dependency Entry and sets a
//!    flag that is checked before any synchronous re-run and again when a
//!    queued job for it is flushed.
//!
//! # Ownership
//!
//! Dependency Entries hold effects weakly. An effect lives as long as some
//! handle to it does: the value returned by [`effect`], a computed cell, a
//! watch handle, or a component instance. Dropping the last handle removes
//! the effect from every entry and releases everything its function
//! captured.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::debug;

use super::context::{untracked, ReactiveContext};
use super::deps::WeakDep;

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Function run by an effect.
pub type EffectFn = Arc<dyn Fn() + Send + Sync>;

/// Alternate notification path. Receives the effect that was triggered.
pub type EffectScheduler = Arc<dyn Fn(&ReactiveEffect) + Send + Sync>;

/// Options for [`effect_with`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Do not run the effect on creation.
    pub lazy: bool,
    pub scheduler: Option<EffectScheduler>,
}

impl EffectOptions {
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            scheduler: None,
        }
    }

    pub fn with_scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&ReactiveEffect) + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }
}

/// A re-runnable computation that tracks what it reads.
///
/// Cloning yields another handle to the same effect.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(&RawObject::from_pairs([("count", 0)]));
///
/// let handle = effect({
///     let state = state.clone();
///     move || println!("count is {:?}", state.get("count"))
/// });
///
/// state.set("count", 5);  // Prints: "count is Number(5)"
/// handle.stop();
/// ```
#[derive(Clone)]
pub struct ReactiveEffect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    id: EffectId,
    run: EffectFn,
    scheduler: Option<EffectScheduler>,
    /// Owned by a computed cell; notified ahead of plain effects.
    computed: bool,
    /// Entries this effect is registered in.
    deps: Mutex<SmallVec<[WeakDep; 4]>>,
    stopped: AtomicBool,
    run_count: AtomicUsize,
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        for dep in self.deps.get_mut().drain(..).filter_map(|dep| dep.upgrade()) {
            dep.remove(self.id);
        }
    }
}

/// Non-owning handle to an effect, held by Dependency Entries.
#[derive(Clone)]
pub(crate) struct WeakEffect(Weak<EffectInner>);

impl WeakEffect {
    pub(crate) fn upgrade(&self) -> Option<ReactiveEffect> {
        self.0.upgrade().map(|inner| ReactiveEffect { inner })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl ReactiveEffect {
    /// Create an effect without running it.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(Arc::new(run), None, false)
    }

    /// Create an effect with a scheduler, without running it.
    pub fn with_scheduler<F, S>(run: F, scheduler: S) -> Self
    where
        F: Fn() + Send + Sync + 'static,
        S: Fn(&ReactiveEffect) + Send + Sync + 'static,
    {
        Self::build(Arc::new(run), Some(Arc::new(scheduler)), false)
    }

    pub(crate) fn for_computed(run: EffectFn, scheduler: EffectScheduler) -> Self {
        Self::build(run, Some(scheduler), true)
    }

    fn build(run: EffectFn, scheduler: Option<EffectScheduler>, computed: bool) -> Self {
        Self {
            inner: Arc::new(EffectInner {
                id: EffectId::next(),
                run,
                scheduler,
                computed,
                deps: Mutex::new(SmallVec::new()),
                stopped: AtomicBool::new(false),
                run_count: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn scheduler(&self) -> Option<&EffectScheduler> {
        self.inner.scheduler.as_ref()
    }

    pub(crate) fn is_computed(&self) -> bool {
        self.inner.computed
    }

    pub(crate) fn downgrade(&self) -> WeakEffect {
        WeakEffect(Arc::downgrade(&self.inner))
    }

    /// Run the effect's own function, re-collecting its dependencies.
    pub fn run(&self) {
        let run = Arc::clone(&self.inner.run);
        self.run_with(|| run());
    }

    /// Run `f` as this effect: reads inside `f` become this effect's
    /// dependencies, replacing the ones from the previous run.
    ///
    /// A stopped effect runs `f` untracked.
    pub fn run_with<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.is_stopped() {
            return untracked(f);
        }

        self.cleanup();
        let _ctx = ReactiveContext::enter(self);
        let result = f();
        self.inner.run_count.fetch_add(1, Ordering::Relaxed);
        result
    }

    /// Stop the effect. Idempotent.
    ///
    /// After this the effect is in no Dependency Entry, ignores triggers, and
    /// any job already queued for it is skipped at flush time.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cleanup();
        debug!(effect = self.id().raw(), "effect stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Number of Dependency Entries the effect is registered in.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .deps
            .lock()
            .iter()
            .filter_map(WeakDep::upgrade)
            .filter(|dep| dep.contains(self.id()))
            .count()
    }

    pub(crate) fn record_dep(&self, dep: WeakDep) {
        self.inner.deps.lock().push(dep);
    }

    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.inner.deps.lock());
        for dep in deps.iter().filter_map(WeakDep::upgrade) {
            dep.remove(self.id());
        }
    }
}

impl std::fmt::Debug for ReactiveEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Create an effect and run it immediately. The effect stays subscribed
/// while the returned handle (or a clone of it) is alive.
pub fn effect<F>(run: F) -> ReactiveEffect
where
    F: Fn() + Send + Sync + 'static,
{
    effect_with(run, EffectOptions::default())
}

/// Create an effect with options. Runs immediately unless `lazy` is set.
pub fn effect_with<F>(run: F, options: EffectOptions) -> ReactiveEffect
where
    F: Fn() + Send + Sync + 'static,
{
    let effect = ReactiveEffect::build(Arc::new(run), options.scheduler, false);
    if !options.lazy {
        effect.run();
    }
    effect
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
