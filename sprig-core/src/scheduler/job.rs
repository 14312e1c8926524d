//! Scheduled jobs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::reactive::{EffectId, ReactiveEffect};

/// Identity used to deduplicate jobs within a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobId {
    /// The job re-runs one effect. All jobs for an effect share this id.
    Effect(EffectId),
    /// A standalone job.
    Task(u64),
}

impl JobId {
    fn next_task() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        JobId::Task(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Effect(id) => write!(f, "effect-{}", id.raw()),
            JobId::Task(id) => write!(f, "task-{id}"),
        }
    }
}

/// A unit of deferred work.
///
/// Cloning keeps the id, so queueing clones of one job runs it once per flush.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    /// Skip the job if this effect was stopped before the flush.
    owner: Option<ReactiveEffect>,
    run: Arc<dyn Fn() + Send + Sync>,
}

impl Job {
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id: JobId::next_task(),
            owner: None,
            run: Arc::new(run),
        }
    }

    /// A job that re-runs `effect`.
    pub fn for_effect(effect: &ReactiveEffect) -> Self {
        let target = effect.clone();
        Self {
            id: JobId::Effect(effect.id()),
            owner: Some(effect.clone()),
            run: Arc::new(move || target.run()),
        }
    }

    /// A job for `effect` that runs `run` instead of the effect's own
    /// function. Shares the effect's id, so it dedupes with other jobs for
    /// the same effect.
    pub fn for_effect_with<F>(effect: &ReactiveEffect, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id: JobId::Effect(effect.id()),
            owner: Some(effect.clone()),
            run: Arc::new(run),
        }
    }

    /// Tie the job to `effect`: once the effect stops, the job is skipped.
    pub fn owned_by(mut self, effect: &ReactiveEffect) -> Self {
        self.owner = Some(effect.clone());
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.owner.as_ref().is_some_and(ReactiveEffect::is_stopped)
    }

    pub(crate) fn run(&self) {
        (self.run)();
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
