//! Execution counters aggregated by the core thread.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::queue::PlaybackStats;

/// Atomic counter block updated by the worker, read from any thread.
#[derive(Default)]
pub(crate) struct CoreMetrics {
    pub(crate) batches: AtomicU64,
    pub(crate) commands: AtomicU64,
    pub(crate) auto_resolved: AtomicU64,
    pub(crate) panicked: AtomicU64,
    pub(crate) notifications: AtomicU64,
}

impl CoreMetrics {
    pub(crate) fn record_playback(&self, stats: &PlaybackStats) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.commands
            .fetch_add(stats.executed as u64, Ordering::Relaxed);
        self.auto_resolved
            .fetch_add(stats.auto_resolved as u64, Ordering::Relaxed);
        self.panicked
            .fetch_add(stats.panicked as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_played: self.batches.load(Ordering::Relaxed),
            commands_executed: self.commands.load(Ordering::Relaxed),
            auto_resolved_results: self.auto_resolved.load(Ordering::Relaxed),
            panicked_commands: self.panicked.load(Ordering::Relaxed),
            notifications_delivered: self.notifications.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the core thread's execution counters.
///
/// Counters are cumulative since [`CoreThread::start`](crate::CoreThread::start).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Batches drained from the internal queue.
    pub batches_played: u64,
    /// Commands executed, including panicked ones.
    pub commands_executed: u64,
    /// Value-producing commands that forgot to resolve their result and
    /// were resolved to the empty sentinel (warned once each).
    pub auto_resolved_results: u64,
    /// Commands whose body panicked (contained; playback continued).
    pub panicked_commands: u64,
    /// Completion notifications delivered to blocked issuers.
    pub notifications_delivered: u64,
}
