//! Metrics hooks for diary operations.
//!
//! Implement [`DiaryMetrics`] to feed a monitoring system. Every method has
//! a default body that logs through the `log` crate, so an empty impl block
//! is already useful:
//!
//! ```
//! use diary_kit::observability::DiaryMetrics;
//!
//! struct LogMetrics;
//! impl DiaryMetrics for LogMetrics {}
//! ```
//!
//! [`NoOpMetrics`] discards everything and is what a service uses unless
//! told otherwise.

use crate::entity::EntityRef;
use crate::status::StatusTransition;
use std::time::Duration;

/// Trait for diary metrics collection.
pub trait DiaryMetrics: Send + Sync {
    /// Record a committed form submission.
    fn record_commit(&self, target: &EntityRef, created: bool, duration: Duration) {
        debug!(
            "Diary COMMIT {} ({}) took {:?}",
            target,
            if created { "create" } else { "update" },
            duration
        );
    }

    /// Record a delete and how many records it removed.
    fn record_delete(&self, target: &EntityRef, removed: usize) {
        debug!("Diary DELETE {} removed {} records", target, removed);
    }

    /// Record a ticket status mutation.
    fn record_status_change(&self, ticket: &EntityRef, transition: &StatusTransition) {
        debug!(
            "Diary STATUS {} {} -> {}",
            ticket,
            transition.from.as_str(),
            transition.to.as_str()
        );
    }

    /// Record a list view recomputation.
    fn record_view(&self, view: &str, items: usize, duration: Duration) {
        debug!("Diary VIEW {} -> {} items in {:?}", view, items, duration);
    }

    /// Record an error.
    fn record_error(&self, operation: &str, error: &str) {
        warn!("Diary ERROR during {}: {}", operation, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl DiaryMetrics for NoOpMetrics {
    fn record_commit(&self, _target: &EntityRef, _created: bool, _duration: Duration) {}
    fn record_delete(&self, _target: &EntityRef, _removed: usize) {}
    fn record_status_change(&self, _ticket: &EntityRef, _transition: &StatusTransition) {}
    fn record_view(&self, _view: &str, _items: usize, _duration: Duration) {}
    fn record_error(&self, _operation: &str, _error: &str) {}
}
