//! Job Scheduler
//!
//! The scheduler coalesces notifications that happen within one synchronous
//! turn into a single deferred flush.
//!
//! # Algorithm
//!
//! 1. [`queue_job`] appends a job to this thread's queue. The first job of a
//!    turn marks a flush as pending and asks the installed flush requester
//!    to run [`flush_jobs`] once the current call stack has unwound. A job is
//!    never run inside the call that queued it.
//!
//! 2. [`flush_jobs`] takes the queue, drops repeated jobs (same [`JobId`]),
//!    and runs each remaining job once, in enqueue order. Jobs whose owning
//!    effect was stopped in the meantime are skipped.
//!
//! 3. Jobs queued while flushing are drained in further rounds of the same
//!    flush, up to [`SchedulerConfig::max_flush_rounds`].
//!
//! Each job runs isolated: a panicking job is logged and reported, and the
//! rest of the flush proceeds.
//!
//! # Turn Boundaries
//!
//! Rust has no built-in microtask queue, so "after the current turn" is
//! whatever the host loop says it is. Either call [`flush_jobs`] at the end
//! of each turn, await [`next_tick`], or call [`install_local_flush`] inside
//! a `tokio::task::LocalSet` to have flushes spawned automatically.
//!
//! [`SchedulerConfig::max_flush_rounds`]: crate::config::SchedulerConfig::max_flush_rounds

mod job;
mod queue;

pub use job::{Job, JobId};
pub use queue::{
    clear_flush_requester, configure, flush_jobs, install_local_flush, is_flush_pending,
    next_tick, pending_jobs, queue_job, set_flush_requester, FlushReport,
};
