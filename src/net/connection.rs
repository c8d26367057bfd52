//! In-flight request tracking.
//!
//! # Responsibilities
//! - Count requests currently being handled
//! - Notice requests abandoned by the client
//! - Carry the request's `x-request-id` into cancellation logs
//!
//! A handler holds an `InFlightGuard` for its whole lifetime. When the client
//! disconnects, hyper drops the handler future, the guard is dropped without
//! having been completed, and the cancellation is logged at debug level.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Shared counts of requests in flight and requests abandoned by clients.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    active: Arc<AtomicU64>,
    cancelled: Arc<AtomicU64>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request. The returned guard decrements on drop.
    pub fn track(&self, request_id: impl Into<String>) -> InFlightGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        metrics::record_in_flight(1.0);
        InFlightGuard {
            active: Arc::clone(&self.active),
            cancelled: Arc::clone(&self.cancelled),
            request_id: request_id.into(),
            completed: false,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Requests dropped before a response was produced.
    pub fn cancelled_count(&self) -> u64 {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Tracks one request's lifetime.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicU64>,
    cancelled: Arc<AtomicU64>,
    request_id: String,
    completed: bool,
}

impl InFlightGuard {
    /// The `x-request-id` the request was stamped with.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Mark the request as answered.
    pub fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        metrics::record_in_flight(-1.0);
        if !self.completed {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            metrics::record_cancelled();
            tracing::debug!(request_id = %self.request_id, "Request cancelled before completion");
        }
    }
}
