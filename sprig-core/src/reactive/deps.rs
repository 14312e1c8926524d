//! Dependency Store
//!
//! The store maps `(object, property)` pairs to the set of effects that read
//! them during their last run. It is the only shared mutable structure of
//! the reactive system.
//!
//! # How It Works
//!
//! 1. When a reactive property is read inside a running effect, [`track`]
//!    records the effect in the [`Dep`] for that pair, and the effect keeps a
//!    weak back-reference to the `Dep` so it can leave it again.
//!
//! 2. When a reactive property is written, [`trigger`] looks up the `Dep` and
//!    notifies a snapshot of its effects: scheduled effects get their
//!    scheduler called, plain effects re-run synchronously.
//!
//! 3. When a raw object is dropped, its entries are retired. The store never
//!    keeps an object alive: entries hold effects weakly, so an effect whose
//!    function captures the object does not pin it either.
//!
//! # Locking
//!
//! Locks are held only while the maps are touched. Effects are never run and
//! evicted entries are never dropped while a lock is held, because either can
//! re-enter the store.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::context::ReactiveContext;
use super::effect::{EffectId, ReactiveEffect, WeakEffect};
use super::value::TargetId;

/// Which part of an object a dependency is on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A single named property.
    Prop(String),
    /// The set of property names (iteration, `keys()`).
    Iterate,
}

impl DepKey {
    pub fn prop(key: impl Into<String>) -> Self {
        DepKey::Prop(key.into())
    }
}

/// A Dependency Entry: the ordered set of effects that read one reactive slot.
///
/// Effects are held weakly; entries for dropped effects are pruned when the
/// entry is next notified.
#[derive(Clone, Default)]
pub struct Dep {
    inner: Arc<DepInner>,
}

#[derive(Default)]
struct DepInner {
    effects: Mutex<IndexMap<EffectId, WeakEffect>>,
}

/// Weak handle to a [`Dep`], held by the effects registered in it.
#[derive(Clone)]
pub(crate) struct WeakDep(Weak<DepInner>);

impl WeakDep {
    pub(crate) fn upgrade(&self) -> Option<Dep> {
        self.0.upgrade().map(|inner| Dep { inner })
    }
}

impl Dep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live effects currently registered.
    pub fn len(&self) -> usize {
        self.inner
            .effects
            .lock()
            .values()
            .filter(|effect| effect.is_alive())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: EffectId) -> bool {
        self.inner.effects.lock().contains_key(&id)
    }

    /// Register an effect. Returns `false` if it was already registered.
    fn add(&self, effect: &ReactiveEffect) -> bool {
        let mut effects = self.inner.effects.lock();
        if effects.contains_key(&effect.id()) {
            return false;
        }
        effects.insert(effect.id(), effect.downgrade());
        true
    }

    /// Unregister an effect. Returns whether it was registered.
    pub(crate) fn remove(&self, id: EffectId) -> bool {
        self.inner.effects.lock().shift_remove(&id).is_some()
    }

    /// Live effects in registration order. Dead entries are pruned.
    fn snapshot(&self) -> Vec<ReactiveEffect> {
        let mut effects = self.inner.effects.lock();
        effects.retain(|_, effect| effect.is_alive());
        effects.values().filter_map(WeakEffect::upgrade).collect()
    }

    pub(crate) fn downgrade(&self) -> WeakDep {
        WeakDep(Arc::downgrade(&self.inner))
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep").field("effects", &self.len()).finish()
    }
}

type TargetMap = HashMap<TargetId, HashMap<DepKey, Dep>>;

static TARGET_MAP: OnceLock<Mutex<TargetMap>> = OnceLock::new();
// Targets dropped while the map was busy; swept on the next track.
static RETIRED: OnceLock<Mutex<Vec<TargetId>>> = OnceLock::new();

fn target_map() -> &'static Mutex<TargetMap> {
    TARGET_MAP.get_or_init(|| Mutex::new(HashMap::new()))
}

fn retired() -> &'static Mutex<Vec<TargetId>> {
    RETIRED.get_or_init(|| Mutex::new(Vec::new()))
}

/// Record that the running effect (if any) read `key` of `target`.
pub fn track(target: TargetId, key: DepKey) {
    let Some(effect) = ReactiveContext::current_effect() else {
        return;
    };

    let retired_ids = std::mem::take(&mut *retired().lock());
    let mut evicted = Vec::new();
    let dep = {
        let mut map = target_map().lock();
        for id in retired_ids {
            if let Some(entries) = map.remove(&id) {
                evicted.push(entries);
            }
        }
        map.entry(target)
            .or_default()
            .entry(key)
            .or_default()
            .clone()
    };
    drop(evicted);

    trace!(target_id = %target, effect = effect.id().raw(), "track");
    track_effects(&dep, &effect);
}

/// Notify every effect that read `key` of `target`.
///
/// Writes to slots nobody has read are a no-op.
pub fn trigger(target: TargetId, key: &DepKey) {
    let dep = target_map()
        .lock()
        .get(&target)
        .and_then(|entries| entries.get(key))
        .cloned();

    if let Some(dep) = dep {
        trace!(target_id = %target, ?key, effects = dep.len(), "trigger");
        trigger_effects(&dep);
    }
}

/// Register `effect` in `dep` and remember the `dep` on the effect.
pub fn track_effects(dep: &Dep, effect: &ReactiveEffect) {
    if effect.is_stopped() {
        return;
    }
    if dep.add(effect) {
        effect.record_dep(dep.downgrade());
    }
}

/// Notify a snapshot of the effects in `dep`.
///
/// The snapshot makes it safe for an effect to add or remove registrations
/// while running. Computed cells are invalidated before plain effects run, so
/// an effect that reads both a source and a computed of that source never
/// sees a stale cache.
pub fn trigger_effects(dep: &Dep) {
    let effects = dep.snapshot();

    for effect in effects.iter().filter(|effect| effect.is_computed()) {
        trigger_effect(effect);
    }
    for effect in effects.iter().filter(|effect| !effect.is_computed()) {
        trigger_effect(effect);
    }
}

fn trigger_effect(effect: &ReactiveEffect) {
    if effect.is_stopped() {
        return;
    }
    // An effect writing state it also reads must not re-enter itself.
    if ReactiveContext::is_current(effect.id()) {
        return;
    }
    match effect.scheduler() {
        Some(scheduler) => scheduler(effect),
        None => effect.run(),
    }
}

/// Drop all entries for an object that no longer exists.
pub(crate) fn retire_target(id: TargetId) {
    match target_map().try_lock() {
        Some(mut map) => {
            let evicted = map.remove(&id);
            drop(map);
            drop(evicted);
        }
        None => retired().lock().push(id),
    }
}

/// Number of effects registered for `key` of `target`.
pub fn subscriber_count(target: TargetId, key: &DepKey) -> usize {
    target_map()
        .lock()
        .get(&target)
        .and_then(|entries| entries.get(key))
        .map(Dep::len)
        .unwrap_or(0)
}

/// Whether the store holds any entry for `target`.
pub fn has_entries(target: TargetId) -> bool {
    target_map().lock().contains_key(&target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::value::RawObject;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn track_outside_effect_is_noop() {
        let object = RawObject::new();
        track(object.id(), DepKey::prop("x"));

        assert!(!has_entries(object.id()));
    }

    #[test]
    fn trigger_untracked_is_noop() {
        let object = RawObject::new();
        trigger(object.id(), &DepKey::prop("x"));

        assert_eq!(subscriber_count(object.id(), &DepKey::prop("x")), 0);
    }

    #[test]
    fn track_then_trigger_reruns_effect() {
        let object = RawObject::new();
        let id = object.id();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let _effect = crate::reactive::effect(move || {
            track(id, DepKey::prop("x"));
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(subscriber_count(id, &DepKey::prop("x")), 1);

        trigger(id, &DepKey::prop("x"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // A different key has no subscribers
        trigger(id, &DepKey::prop("y"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_object_retires_entries() {
        let object = RawObject::new();
        let id = object.id();

        let effect = crate::reactive::effect(move || track(id, DepKey::prop("x")));
        assert!(has_entries(id));

        effect.stop();
        drop(object);

        // Retirement may be deferred if the map was busy; the next track sweeps.
        let probe = RawObject::new();
        let probe_id = probe.id();
        let sweeper = crate::reactive::effect(move || track(probe_id, DepKey::Iterate));
        sweeper.stop();

        assert!(!has_entries(id));
    }

    #[test]
    fn dropped_effect_does_not_pin_object() {
        let raw = RawObject::from_pairs([("x", 1)]);
        let id = raw.id();
        let captured = Arc::new(());

        let handle = {
            let state = crate::reactive::reactive(&raw);
            let captured = captured.clone();
            crate::reactive::effect(move || {
                let _ = &captured;
                state.get("x");
            })
        };
        assert!(has_entries(id));

        drop(handle);
        drop(raw);
        assert_eq!(Arc::strong_count(&captured), 1);

        // Retirement may be deferred if the map was busy; the next track sweeps.
        let other = RawObject::new();
        let other_id = other.id();
        let sweeper = crate::reactive::effect(move || track(other_id, DepKey::Iterate));
        sweeper.stop();

        assert!(!has_entries(id));
    }

    #[test]
    fn trigger_prunes_dropped_effects() {
        let object = RawObject::new();
        let id = object.id();

        let kept = crate::reactive::effect(move || track(id, DepKey::prop("x")));
        let dropped = crate::reactive::effect(move || track(id, DepKey::prop("x")));
        assert_eq!(subscriber_count(id, &DepKey::prop("x")), 2);

        drop(dropped);
        assert_eq!(subscriber_count(id, &DepKey::prop("x")), 1);

        trigger(id, &DepKey::prop("x"));
        assert_eq!(kept.run_count(), 2);
    }
}
