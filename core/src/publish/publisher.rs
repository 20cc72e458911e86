//! Consumer side of the pipeline: enhancement, rendering and pacing.
//!
//! Every session owns a [`FrameSubscriber`] with its own rate limiter, so a
//! slow client never throttles another. Encoded frames are shared through a
//! one-slot cache keyed by snapshot sequence.

use std::sync::{Arc, Mutex};

use log::debug;
use tokio::sync::watch;
use tokio::time::{self, Instant};

use crate::config::PipelineConfig;
use crate::pipeline::{MapSnapshot, PipelineHandle, SnapshotSlot};
use crate::prelude::StageResult;
use crate::processing::SpatialEnhancer;
use crate::publish::rate::RateLimiter;
use crate::publish::render::FrameRenderer;
use crate::telemetry::MetricsRecorder;

/// One encoded image, ready to be written to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFrame {
    pub sequence: u64,
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub struct FramePublisher {
    handle: PipelineHandle,
    enhancer: SpatialEnhancer,
    renderer: FrameRenderer,
    target_fps: f32,
    cache: Mutex<Option<Arc<OutputFrame>>>,
}

impl FramePublisher {
    pub fn new(handle: PipelineHandle, config: &PipelineConfig) -> Self {
        Self {
            handle,
            enhancer: SpatialEnhancer::new(&config.enhancement),
            renderer: FrameRenderer::new(&config.output),
            target_fps: config.output.target_fps,
            cache: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> &PipelineHandle {
        &self.handle
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        self.handle.metrics()
    }

    /// Renders the most recent snapshot without pacing.
    pub fn latest_frame(&self) -> StageResult<Option<Arc<OutputFrame>>> {
        match self.handle.latest() {
            Some(snapshot) => self.frame_for(&snapshot).map(Some),
            None => Ok(None),
        }
    }

    /// Opens a paced stream of frames for one consumer.
    pub fn subscribe(self: &Arc<Self>) -> FrameSubscriber {
        self.metrics().consumer_connected();
        FrameSubscriber {
            publisher: Arc::clone(self),
            snapshots: self.handle.subscribe_snapshots(),
            limiter: RateLimiter::new(self.target_fps),
            last_sequence: None,
        }
    }

    fn cached(&self, sequence: u64) -> Option<Arc<OutputFrame>> {
        let cache = self.cache.lock().ok()?;
        cache
            .as_ref()
            .filter(|frame| frame.sequence == sequence)
            .cloned()
    }

    fn frame_for(&self, snapshot: &MapSnapshot) -> StageResult<Arc<OutputFrame>> {
        if let Some(frame) = self.cached(snapshot.sequence) {
            return Ok(frame);
        }

        // Encoding happens outside the lock; concurrent misses may encode twice.
        let enhanced = self.enhancer.enhance(snapshot.filtered.view());
        let image = self.renderer.raster(enhanced.view())?;
        let frame = Arc::new(OutputFrame {
            sequence: snapshot.sequence,
            jpeg: self.renderer.encode(&image)?,
            width: image.width(),
            height: image.height(),
        });

        if let Ok(mut cache) = self.cache.lock() {
            let newer = cache
                .as_ref()
                .map_or(true, |cached| cached.sequence < frame.sequence);
            if newer {
                *cache = Some(Arc::clone(&frame));
            }
        }
        Ok(frame)
    }
}

/// A single consumer's view of the published maps.
pub struct FrameSubscriber {
    publisher: Arc<FramePublisher>,
    snapshots: watch::Receiver<SnapshotSlot>,
    limiter: RateLimiter,
    last_sequence: Option<u64>,
}

impl FrameSubscriber {
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Waits for a snapshot newer than the last one sent, no sooner than the
    /// rate limit allows, and renders it. Snapshots published in between
    /// are skipped. `None` once the producer is gone and nothing new remains.
    pub async fn next_frame(&mut self) -> StageResult<Option<Arc<OutputFrame>>> {
        loop {
            let last = self.last_sequence;
            let fresh = move |slot: &SnapshotSlot| {
                slot.as_ref()
                    .is_some_and(|snapshot| last.map_or(true, |seen| snapshot.sequence > seen))
            };
            let closed = self.snapshots.wait_for(fresh).await.is_err();
            if closed {
                return Ok(None);
            }

            if let Some(at) = self.limiter.next_eligible() {
                time::sleep_until(at).await;
            }

            let latest = self.snapshots.borrow_and_update().clone();
            let Some(snapshot) = latest else {
                continue;
            };
            if !self.limiter.try_acquire(Instant::now()) {
                continue;
            }

            if let Some(seen) = last {
                let skipped = snapshot.sequence - seen - 1;
                if skipped > 0 {
                    debug!("consumer skipped {} stale maps", skipped);
                }
            }
            // A map that fails to render is not retried.
            self.last_sequence = Some(snapshot.sequence);
            let frame = self.publisher.frame_for(&snapshot)?;
            self.publisher.metrics().record_published();
            return Ok(Some(frame));
        }
    }
}

impl Drop for FrameSubscriber {
    fn drop(&mut self) {
        self.publisher.metrics().consumer_disconnected();
    }
}
