//! Reactive Context
//!
//! The reactive context tracks which effect is currently running, so that a
//! reactive read can register that effect as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running an effect pushes it; the returned
//! guard pops it on drop, restoring the previous effect. This keeps nested
//! effects (a component render that mounts a child component, a computed
//! read inside an effect) attributing reads to the innermost computation,
//! and it unwinds correctly if the computation panics.
//!
//! [`untracked`] pushes an empty frame: reads inside it register nothing.

use std::cell::RefCell;

use super::effect::{EffectId, ReactiveEffect};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<ReactiveEffect>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    effect_id: Option<EffectId>,
}

impl ReactiveContext {
    /// Enter a context in which reads are attributed to `effect`.
    pub fn enter(effect: &ReactiveEffect) -> Self {
        Self::push(Some(effect.clone()))
    }

    /// Enter a context in which reads are not tracked at all.
    pub fn enter_untracked() -> Self {
        Self::push(None)
    }

    fn push(frame: Option<ReactiveEffect>) -> Self {
        let effect_id = frame.as_ref().map(ReactiveEffect::id);
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(frame));
        Self { effect_id }
    }

    /// Check if reads are currently being attributed to an effect.
    pub fn is_active() -> bool {
        Self::current_effect().is_some()
    }

    /// The effect reads are currently attributed to, if any.
    pub fn current_effect() -> Option<ReactiveEffect> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Whether `id` is the innermost running effect.
    pub fn is_current(id: EffectId) -> bool {
        CONTEXT_STACK.with(|stack| {
            matches!(stack.borrow().last(), Some(Some(effect)) if effect.id() == id)
        })
    }

    /// Number of frames on this thread's stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());
        if let Some(frame) = &popped {
            debug_assert_eq!(
                frame.as_ref().map(ReactiveEffect::id),
                self.effect_id,
                "ReactiveContext mismatch"
            );
        }
        // `popped` holds an effect handle; release it outside the stack borrow.
        drop(popped);
    }
}

/// Run `f` without tracking any reads it performs.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter_untracked();
    f()
}
