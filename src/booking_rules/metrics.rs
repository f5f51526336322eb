// Performance Metrics for the Booking Rules Core
//
// Counts and times availability checks, quotes, loyalty operations and
// notification attempts, and flags slow operations.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

/// Performance threshold for slow operations (100ms)
const SLOW_OPERATION_THRESHOLD_MS: u64 = 100;

/// Kind of operation being timed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Availability,
    Quote,
    Loyalty,
    Notification,
}

impl OperationType {
    fn label(&self) -> &'static str {
        match self {
            OperationType::Availability => "availability check",
            OperationType::Quote => "price quote",
            OperationType::Loyalty => "loyalty operation",
            OperationType::Notification => "notification attempt",
        }
    }
}

#[derive(Debug, Default)]
struct OperationCounters {
    count: AtomicU64,
    total_time_us: AtomicU64,
    slow: AtomicU64,
}

impl OperationCounters {
    fn record(&self, duration: Duration) -> bool {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        let slow = duration.as_millis() as u64 > SLOW_OPERATION_THRESHOLD_MS;
        if slow {
            self.slow.fetch_add(1, Ordering::Relaxed);
        }
        slow
    }

    fn snapshot(&self) -> OperationStats {
        let count = self.count.load(Ordering::Relaxed);
        let total_us = self.total_time_us.load(Ordering::Relaxed);
        OperationStats {
            count,
            avg_time_ms: if count == 0 {
                0.0
            } else {
                (total_us as f64 / count as f64) / 1000.0
            },
            slow: self.slow.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct MetricsInner {
    availability: OperationCounters,
    quotes: OperationCounters,
    loyalty: OperationCounters,
    notifications: OperationCounters,

    bookings_created: AtomicU64,
    bookings_rejected: AtomicU64,
}

/// Performance metrics for the booking rules core
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    inner: Arc<MetricsInner>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing an operation; recorded when the timer drops
    pub fn start(&self, operation: OperationType) -> OperationTimer {
        OperationTimer {
            start: Instant::now(),
            operation,
            metrics: self.clone(),
        }
    }

    pub fn record_booking_created(&self) {
        self.inner.bookings_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_booking_rejected(&self) {
        self.inner.bookings_rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, operation: OperationType, duration: Duration) {
        let counters = match operation {
            OperationType::Availability => &self.inner.availability,
            OperationType::Quote => &self.inner.quotes,
            OperationType::Loyalty => &self.inner.loyalty,
            OperationType::Notification => &self.inner.notifications,
        };

        if counters.record(duration) {
            tracing::warn!("Slow {}: {}ms", operation.label(), duration.as_millis());
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            availability: self.inner.availability.snapshot(),
            quotes: self.inner.quotes.snapshot(),
            loyalty: self.inner.loyalty.snapshot(),
            notifications: self.inner.notifications.snapshot(),
            bookings_created: self.inner.bookings_created.load(Ordering::Relaxed),
            bookings_rejected: self.inner.bookings_rejected.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        tracing::info!(
            "Booking Rules Performance Metrics:\n\
             Availability: {} checks, avg {:.2}ms, {} slow\n\
             Quotes: {} quotes, avg {:.2}ms, {} slow\n\
             Loyalty: {} operations, avg {:.2}ms, {} slow\n\
             Notifications: {} attempts, avg {:.2}ms, {} slow\n\
             Bookings: {} created, {} rejected",
            summary.availability.count,
            summary.availability.avg_time_ms,
            summary.availability.slow,
            summary.quotes.count,
            summary.quotes.avg_time_ms,
            summary.quotes.slow,
            summary.loyalty.count,
            summary.loyalty.avg_time_ms,
            summary.loyalty.slow,
            summary.notifications.count,
            summary.notifications.avg_time_ms,
            summary.notifications.slow,
            summary.bookings_created,
            summary.bookings_rejected,
        );
    }
}

/// Timer for tracking operation duration
pub struct OperationTimer {
    start: Instant,
    operation: OperationType,
    metrics: PerformanceMetrics,
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.metrics.record(self.operation, self.start.elapsed());
    }
}

/// Count and timing of one kind of operation
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OperationStats {
    pub count: u64,
    pub avg_time_ms: f64,
    pub slow: u64,
}

/// Summary of performance metrics
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MetricsSummary {
    pub availability: OperationStats,
    pub quotes: OperationStats,
    pub loyalty: OperationStats,
    pub notifications: OperationStats,
    pub bookings_created: u64,
    pub bookings_rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let summary = PerformanceMetrics::new().summary();
        assert_eq!(summary.availability.count, 0);
        assert_eq!(summary.quotes.avg_time_ms, 0.0);
    }

    #[test]
    fn test_operation_timer() {
        let metrics = PerformanceMetrics::new();

        {
            let _timer = metrics.start(OperationType::Availability);
            thread::sleep(Duration::from_millis(10));
        }

        let summary = metrics.summary();
        assert_eq!(summary.availability.count, 1);
        assert!(summary.availability.avg_time_ms >= 10.0);
        assert_eq!(summary.quotes.count, 0);
    }

    #[test]
    fn test_slow_operation_detection() {
        let metrics = PerformanceMetrics::new();

        {
            let _timer = metrics.start(OperationType::Quote);
            thread::sleep(Duration::from_millis(150));
        }

        assert_eq!(metrics.summary().quotes.slow, 1);
    }

    #[test]
    fn test_booking_counters_shared_across_clones() {
        let metrics = PerformanceMetrics::new();
        let clone = metrics.clone();

        metrics.record_booking_created();
        clone.record_booking_rejected();
        clone.record_booking_rejected();

        let summary = metrics.summary();
        assert_eq!(summary.bookings_created, 1);
        assert_eq!(summary.bookings_rejected, 2);
    }
}
