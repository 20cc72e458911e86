use std::sync::Mutex;

use serde::Serialize;

use crate::acquisition::ReaderStats;

/// Counters shared between the producer and consumer sessions.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_completed: u64,
    pub frames_dropped: u64,
    pub rows_skipped: u64,
    pub frames_processed: u64,
    pub drift_updates: u64,
    pub frames_published: u64,
    pub active_consumers: u64,
    pub device_errors: u64,
    pub reconnects: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }

    /// Mirrors the frame reader's running totals.
    pub fn record_reader(&self, stats: ReaderStats) {
        self.update(|m| {
            m.frames_completed = stats.frames_completed;
            m.frames_dropped = stats.frames_dropped;
            m.rows_skipped = stats.rows_skipped;
        });
    }

    pub fn record_processed(&self, drift_applied: bool) {
        self.update(|m| {
            m.frames_processed += 1;
            if drift_applied {
                m.drift_updates += 1;
            }
        });
    }

    pub fn record_published(&self) {
        self.update(|m| m.frames_published += 1);
    }

    pub fn consumer_connected(&self) {
        self.update(|m| m.active_consumers += 1);
    }

    pub fn consumer_disconnected(&self) {
        self.update(|m| m.active_consumers = m.active_consumers.saturating_sub(1));
    }

    pub fn record_device_error(&self) {
        self.update(|m| m.device_errors += 1);
    }

    pub fn record_reconnect(&self) {
        self.update(|m| m.reconnects += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|m| *m).unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
