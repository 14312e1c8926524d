//! The per-thread pending-jobs queue.

use std::cell::RefCell;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, error, warn};

use super::job::Job;
use crate::config::SchedulerConfig;
use crate::error::{panic_message, SchedulerError};

type FlushRequester = Rc<dyn Fn()>;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Job>,
    flush_pending: bool,
    flushing: bool,
    config: SchedulerConfig,
    requester: Option<FlushRequester>,
    /// A job was queued with no requester installed; reported once.
    reported_manual_flush: bool,
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// Outcome of one [`flush_jobs`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Jobs that ran to completion.
    pub executed: usize,
    /// Jobs skipped because their effect was stopped.
    pub skipped: usize,
    /// Queue drains performed.
    pub rounds: usize,
    pub failures: Vec<SchedulerError>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Replace this thread's scheduler configuration.
pub fn configure(config: SchedulerConfig) {
    STATE.with(|state| state.borrow_mut().config = config);
}

/// Install a callback invoked when the first job of a turn is queued. It
/// should arrange for [`flush_jobs`] to run after the current call stack.
pub fn set_flush_requester<F>(requester: F)
where
    F: Fn() + 'static,
{
    STATE.with(|state| state.borrow_mut().requester = Some(Rc::new(requester)));
}

pub fn clear_flush_requester() {
    STATE.with(|state| state.borrow_mut().requester = None);
}

/// Spawn flushes on the current `tokio::task::LocalSet`.
///
/// Jobs must then only be queued from inside that `LocalSet`.
pub fn install_local_flush() {
    set_flush_requester(|| {
        tokio::task::spawn_local(async {
            flush_jobs();
        });
    });
}

/// Yield to the executor once, then flush whatever is pending.
pub async fn next_tick() -> FlushReport {
    tokio::task::yield_now().await;
    flush_jobs()
}

/// Queue `job` for the next flush.
pub fn queue_job(job: Job) {
    let requester = STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.queue.push(job);
        if state.flush_pending {
            return None;
        }
        state.flush_pending = true;
        if state.requester.is_none() && !state.reported_manual_flush {
            state.reported_manual_flush = true;
            debug!(
                "jobs queued with no flush requester installed; \
                 they run only when `flush_jobs` is called"
            );
        }
        state.requester.clone()
    });

    if let Some(requester) = requester {
        requester();
    }
}

/// Number of queued jobs, duplicates included.
pub fn pending_jobs() -> usize {
    STATE.with(|state| state.borrow().queue.len())
}

pub fn is_flush_pending() -> bool {
    STATE.with(|state| state.borrow().flush_pending)
}

/// Run every queued job once.
///
/// Calling this from inside a job is a no-op; the running flush picks up
/// anything queued in the meantime.
pub fn flush_jobs() -> FlushReport {
    let max_rounds = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.flushing {
            return None;
        }
        state.flushing = true;
        state.flush_pending = false;
        Some(state.config.max_flush_rounds)
    });
    let Some(max_rounds) = max_rounds else {
        return FlushReport::default();
    };

    let mut report = FlushReport::default();
    loop {
        let batch = STATE.with(|state| std::mem::take(&mut state.borrow_mut().queue));
        if batch.is_empty() {
            break;
        }
        if report.rounds == max_rounds {
            error!(
                limit = max_rounds,
                dropped = batch.len(),
                "flush exceeded round limit; possible recursive updates"
            );
            report
                .failures
                .push(SchedulerError::RecursionLimit { limit: max_rounds });
            break;
        }
        report.rounds += 1;
        run_batch(batch, &mut report);
    }

    STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.flushing = false;
        state.flush_pending = !state.queue.is_empty();
    });

    debug!(
        executed = report.executed,
        skipped = report.skipped,
        rounds = report.rounds,
        failures = report.failures.len(),
        "flushed jobs"
    );
    report
}

fn run_batch(mut batch: Vec<Job>, report: &mut FlushReport) {
    let mut seen = HashSet::with_capacity(batch.len());
    batch.retain(|job| seen.insert(job.id()));

    for job in batch {
        if job.is_cancelled() {
            report.skipped += 1;
            continue;
        }
        match catch_unwind(AssertUnwindSafe(|| job.run())) {
            Ok(()) => report.executed += 1,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(job = %job.id(), %message, "job panicked");
                report.failures.push(SchedulerError::JobPanicked {
                    job: job.id(),
                    message,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ReactiveEffect;
    use crate::scheduler::JobId;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn counter_job(counter: &Arc<AtomicI32>) -> Job {
        let counter = counter.clone();
        Job::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn queued_job_waits_for_flush() {
        let runs = Arc::new(AtomicI32::new(0));
        queue_job(counter_job(&runs));

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(is_flush_pending());

        let report = flush_jobs();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(report.executed, 1);
        assert!(!is_flush_pending());
    }

    #[test]
    fn repeated_job_runs_once_per_flush() {
        let runs = Arc::new(AtomicI32::new(0));
        let job = counter_job(&runs);
        for _ in 0..5 {
            queue_job(job.clone());
        }
        assert_eq!(pending_jobs(), 5);

        let report = flush_jobs();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(report.executed, 1);
    }

    #[test]
    fn jobs_run_in_enqueue_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let first = {
            let order = order.clone();
            Job::new(move || order.lock().push("first"))
        };
        let second = {
            let order = order.clone();
            Job::new(move || order.lock().push("second"))
        };

        queue_job(first.clone());
        queue_job(second);
        queue_job(first);
        flush_jobs();

        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn missing_requester_is_reported_once() {
        clear_flush_requester();
        flush_jobs();
        STATE.with(|state| state.borrow_mut().reported_manual_flush = false);

        queue_job(Job::new(|| {}));
        assert!(STATE.with(|state| state.borrow().reported_manual_flush));
        flush_jobs();

        set_flush_requester(|| {});
        STATE.with(|state| state.borrow_mut().reported_manual_flush = false);
        queue_job(Job::new(|| {}));
        assert!(!STATE.with(|state| state.borrow().reported_manual_flush));

        clear_flush_requester();
        flush_jobs();
    }

    #[test]
    fn stopped_effect_job_is_skipped() {
        let effect = ReactiveEffect::new(|| {});
        queue_job(Job::for_effect(&effect));
        effect.stop();

        let report = flush_jobs();
        assert_eq!(report.skipped, 1);
        assert_eq!(effect.run_count(), 0);
    }

    #[test]
    fn panicking_job_does_not_block_others() {
        let runs = Arc::new(AtomicI32::new(0));
        let bad = Job::new(|| panic!("job failed"));
        let bad_id = bad.id();

        queue_job(counter_job(&runs));
        queue_job(bad);
        queue_job(counter_job(&runs));

        let report = flush_jobs();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(
            report.failures,
            vec![SchedulerError::JobPanicked {
                job: bad_id,
                message: "job failed".to_string()
            }]
        );
        assert!(!is_flush_pending());
    }

    #[test]
    fn jobs_queued_during_flush_run_in_later_round() {
        let runs = Arc::new(AtomicI32::new(0));
        let follow_up = counter_job(&runs);
        let first = Job::new(move || queue_job(follow_up.clone()));

        queue_job(first);
        let report = flush_jobs();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(report.rounds, 2);
    }

    #[test]
    fn self_requeueing_job_hits_round_limit() {
        configure(SchedulerConfig {
            max_flush_rounds: 3,
        });

        fn requeue(id_holder: Arc<parking_lot::Mutex<Option<Job>>>) {
            if let Some(job) = id_holder.lock().clone() {
                queue_job(job);
            }
        }
        let holder = Arc::new(parking_lot::Mutex::new(None));
        let job = {
            let holder = holder.clone();
            Job::new(move || requeue(holder.clone()))
        };
        *holder.lock() = Some(job.clone());

        queue_job(job);
        let report = flush_jobs();

        assert_eq!(report.rounds, 3);
        assert_eq!(
            report.failures,
            vec![SchedulerError::RecursionLimit { limit: 3 }]
        );
        assert_eq!(pending_jobs(), 0);
        configure(SchedulerConfig::default());
        holder.lock().take();
    }

    #[test]
    fn requester_is_called_once_per_turn() {
        let requests = Arc::new(AtomicI32::new(0));
        {
            let requests = requests.clone();
            set_flush_requester(move || {
                requests.fetch_add(1, Ordering::SeqCst);
            });
        }

        queue_job(Job::new(|| {}));
        queue_job(Job::new(|| {}));
        assert_eq!(requests.load(Ordering::SeqCst), 1);

        flush_jobs();
        queue_job(Job::new(|| {}));
        assert_eq!(requests.load(Ordering::SeqCst), 2);

        clear_flush_requester();
        flush_jobs();
    }

    #[test]
    fn effect_job_ids_dedupe_across_instances() {
        let effect = ReactiveEffect::new(|| {});
        queue_job(Job::for_effect(&effect));
        queue_job(Job::for_effect(&effect));

        let report = flush_jobs();
        assert_eq!(report.executed, 1);
        assert_eq!(effect.run_count(), 1);
        assert!(matches!(Job::for_effect(&effect).id(), JobId::Effect(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn local_flush_runs_after_current_task() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                install_local_flush();
                let runs = Arc::new(AtomicI32::new(0));

                queue_job(counter_job(&runs));
                queue_job(counter_job(&runs));
                assert_eq!(runs.load(Ordering::SeqCst), 0);

                for _ in 0..10 {
                    if runs.load(Ordering::SeqCst) == 2 {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
                assert_eq!(runs.load(Ordering::SeqCst), 2);
                clear_flush_requester();
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn next_tick_flushes_pending_jobs() {
        let runs = Arc::new(AtomicI32::new(0));
        queue_job(counter_job(&runs));

        let report = next_tick().await;
        assert_eq!(report.executed, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
