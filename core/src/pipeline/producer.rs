use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::acquisition::{LineSource, SourceError};
use crate::config::BackoffConfig;
use crate::pipeline::{Pipeline, PipelineHandle, PipelineStatus};
use crate::prelude::{StageError, StageResult};

/// Granularity of shutdown checks while backing off.
const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

/// Drives a [`Pipeline`] from a device, reopening it after I/O failures.
///
/// Baseline and filtered map survive reconnects; only the partial row
/// accumulation is discarded.
pub struct Producer {
    pipeline: Pipeline,
    backoff: BackoffConfig,
    shutdown: Arc<AtomicBool>,
}

impl Producer {
    pub fn new(pipeline: Pipeline, shutdown: Arc<AtomicBool>) -> Self {
        let backoff = pipeline.config().reconnect.clone();
        Self {
            pipeline,
            backoff,
            shutdown,
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.pipeline.handle()
    }

    /// Runs until shutdown or until the reconnect budget is exhausted.
    ///
    /// `open` is called for every session, including the first.
    pub fn run<F>(mut self, mut open: F) -> StageResult<()>
    where
        F: FnMut() -> Result<Box<dyn LineSource>, SourceError>,
    {
        let mut failures: u32 = 0;
        let result = loop {
            if self.stopping() {
                break Ok(());
            }

            let session = open().and_then(|mut source| {
                failures = 0;
                self.pipeline.run_session(source.as_mut(), &self.shutdown)
            });

            let err = match session {
                Ok(()) => break Ok(()),
                Err(err) => err,
            };

            failures += 1;
            self.pipeline.metrics().record_device_error();
            warn!("device session ended: {}", err);

            if self
                .backoff
                .max_attempts
                .is_some_and(|max| failures > max)
            {
                warn!("giving up after {} failed attempts", failures);
                break Err(StageError::Source(err));
            }

            self.pipeline
                .set_status(PipelineStatus::Reconnecting { attempt: failures });
            let delay = Duration::from_millis(self.backoff.delay_ms(failures));
            info!("reconnecting in {} ms (attempt {})", delay.as_millis(), failures);
            self.sleep(delay);
            self.pipeline.metrics().record_reconnect();
        };

        self.pipeline.set_status(PipelineStatus::Stopped);
        result
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn sleep(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        while !self.stopping() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(SHUTDOWN_POLL));
        }
    }
}
