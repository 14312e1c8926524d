//! Error types.
//!
//! Errors in Sprig never abort a render pass or a scheduler flush. They are
//! caught at the boundary that owns the failing piece of work (the render
//! invocation, the flushed job), logged through `tracing`, and reported back
//! where a caller can inspect them.

use thiserror::Error;

use crate::render::Key;
use crate::scheduler::JobId;

/// Failure while producing or reconciling a tree description.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// A component's render function returned an error.
    #[error("render function of `{component}` failed: {message}")]
    Failed { component: String, message: String },

    /// A component's render function panicked.
    #[error("render function of `{component}` panicked: {message}")]
    Panicked { component: String, message: String },

    /// Two siblings in the same children list share a key.
    ///
    /// Non-fatal: the diff proceeds with best-effort correspondence.
    #[error("duplicate key `{key}` in children list")]
    DuplicateKey { key: Key },
}

impl RenderError {
    /// Convenience constructor for render functions.
    pub fn failed(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failure reported by a scheduler flush.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// A job panicked. The remaining jobs of the flush still ran.
    #[error("job {job} panicked: {message}")]
    JobPanicked { job: JobId, message: String },

    /// Jobs kept enqueueing jobs past the configured number of rounds.
    #[error("flush exceeded {limit} rounds; remaining jobs were dropped")]
    RecursionLimit { limit: usize },
}

/// Failure while loading runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_error_display() {
        let err = RenderError::failed("Counter", "missing field");
        assert_eq!(
            err.to_string(),
            "render function of `Counter` failed: missing field"
        );
    }

    #[test]
    fn panic_message_from_payloads() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
