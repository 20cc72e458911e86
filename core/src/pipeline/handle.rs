use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array2;
use serde::Serialize;
use tokio::sync::watch;

use crate::telemetry::MetricsRecorder;

/// Immutable hand-off of the producer's cross-frame state.
#[derive(Debug, Clone)]
pub struct MapSnapshot {
    /// Monotonic per-pipeline counter of processed frames.
    pub sequence: u64,
    pub captured_at: Instant,
    pub filtered: Array2<f32>,
    pub baseline: Array2<f32>,
    pub contact_peak: f32,
    pub drift_applied: bool,
}

/// Lifecycle of the producer as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineStatus {
    Calibrating { collected: usize, required: usize },
    Streaming,
    Reconnecting { attempt: u32 },
    Stopped,
}

pub type SnapshotSlot = Option<Arc<MapSnapshot>>;

/// Producer side of the hand-off. Held only by the pipeline.
pub(crate) struct SnapshotHub {
    snapshots: watch::Sender<SnapshotSlot>,
    status: watch::Sender<PipelineStatus>,
    recalibrate: Arc<AtomicBool>,
    metrics: Arc<MetricsRecorder>,
}

impl SnapshotHub {
    pub(crate) fn new(initial: PipelineStatus, metrics: Arc<MetricsRecorder>) -> Self {
        let (snapshots, _) = watch::channel(None);
        let (status, _) = watch::channel(initial);
        Self {
            snapshots,
            status,
            recalibrate: Arc::new(AtomicBool::new(false)),
            metrics,
        }
    }

    /// Replaces the published snapshot; readers see either the old or the new one.
    pub(crate) fn publish(&self, snapshot: MapSnapshot) {
        self.snapshots.send_replace(Some(Arc::new(snapshot)));
    }

    /// Withdraws the published snapshot until the next [`publish`](Self::publish).
    pub(crate) fn clear(&self) {
        self.snapshots.send_replace(None);
    }

    pub(crate) fn set_status(&self, status: PipelineStatus) {
        self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    pub(crate) fn take_recalibration_request(&self) -> bool {
        self.recalibrate.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            snapshots: self.snapshots.subscribe(),
            status: self.status.subscribe(),
            recalibrate: self.recalibrate.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Read-only accessor handed to consumers. Cheap to clone.
#[derive(Clone)]
pub struct PipelineHandle {
    snapshots: watch::Receiver<SnapshotSlot>,
    status: watch::Receiver<PipelineStatus>,
    recalibrate: Arc<AtomicBool>,
    metrics: Arc<MetricsRecorder>,
}

impl PipelineHandle {
    /// Most recent snapshot, if calibration has completed.
    pub fn latest(&self) -> SnapshotSlot {
        self.snapshots.borrow().clone()
    }

    pub fn status(&self) -> PipelineStatus {
        *self.status.borrow()
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Asks the producer to rebuild the baseline at its next cycle.
    pub fn request_recalibration(&self) {
        self.recalibrate.store(true, Ordering::Release);
    }

    /// Resolves once the first map is published; `None` if the producer
    /// went away before that.
    pub async fn wait_ready(&self) -> Option<Arc<MapSnapshot>> {
        let mut snapshots = self.snapshots.clone();
        let ready = snapshots.wait_for(|slot| slot.is_some()).await.ok()?;
        ready.clone()
    }

    /// Resolves once the producer has stopped or gone away.
    pub async fn stopped(&self) {
        let mut status = self.status.clone();
        let _ = status.wait_for(|s| *s == PipelineStatus::Stopped).await;
    }

    pub(crate) fn subscribe_snapshots(&self) -> watch::Receiver<SnapshotSlot> {
        self.snapshots.clone()
    }
}
