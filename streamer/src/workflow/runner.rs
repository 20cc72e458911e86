use crate::http_bridge::bridge::HttpBridge;
use crate::workflow::config::StreamerConfig;
use anyhow::{anyhow, Context};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tactilecore::telemetry::MetricsRecorder;
use tactilecore::{FramePublisher, Pipeline, PipelineHandle, Producer};
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;

/// Wires the device, the producer thread and the HTTP bridge together.
pub struct Runner {
    config: StreamerConfig,
}

impl Runner {
    pub fn new(config: StreamerConfig) -> Self {
        Self { config }
    }

    /// Starts the producer on its own thread and returns its join handle.
    fn spawn_producer(
        &self,
        shutdown: Arc<AtomicBool>,
    ) -> anyhow::Result<(PipelineHandle, thread::JoinHandle<tactilecore::StageResult<()>>)> {
        let metrics = Arc::new(MetricsRecorder::new());
        let pipeline = Pipeline::new(self.config.pipeline.clone(), metrics)
            .context("building pipeline")?;
        let producer = Producer::new(pipeline, shutdown);
        let handle = producer.handle();

        let device = self.config.device.clone();
        let shape = self.config.pipeline.shape();
        info!("Opening {}", device.describe());
        let join = thread::Builder::new()
            .name("producer".into())
            .spawn(move || producer.run(|| device.open(shape)))
            .context("spawning producer thread")?;
        Ok((handle, join))
    }

    pub fn execute(&self) -> anyhow::Result<()> {
        self.config.validate()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let (handle, producer) = self.spawn_producer(shutdown.clone())?;
        let publisher = Arc::new(FramePublisher::new(handle.clone(), &self.config.pipeline));

        let runtime = TokioBuilder::new_multi_thread()
            .enable_all()
            .build()
            .context("creating runtime for HTTP bridge")?;
        let served = runtime.block_on(async {
            let stopped = handle.clone();
            let until = async move {
                tokio::select! {
                    result = signal::ctrl_c() => {
                        if let Err(err) = result {
                            warn!("awaiting Ctrl+C failed: {}", err);
                        }
                        info!("Ctrl+C received; shutting down");
                    }
                    _ = stopped.stopped() => info!("Producer stopped; shutting down"),
                }
            };
            HttpBridge::new(publisher)
                .serve(self.config.http.bind, until)
                .await
        });

        shutdown.store(true, Ordering::Release);
        let produced = producer
            .join()
            .map_err(|_| anyhow!("producer thread panicked"))?;
        let metrics = handle.metrics().snapshot();
        info!(
            "Processed {} frames ({} dropped, {} reconnects)",
            metrics.frames_processed, metrics.frames_dropped, metrics.reconnects
        );
        served?;
        produced.context("producer gave up")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceConfig;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn producer_thread_replays_capture_to_the_end() {
        let mut capture = NamedTempFile::new().unwrap();
        capture.write_all(b"0 0\n\n0 0\n\n5 60\n\n").unwrap();

        let mut config = StreamerConfig::default();
        config.device = DeviceConfig::Replay {
            path: capture.path().to_path_buf(),
            line_delay_ms: 0,
        };
        config.pipeline.sensor.rows = 1;
        config.pipeline.sensor.cols = 2;
        config.pipeline.calibration.frames = 2;
        config.pipeline.reconnect.initial_ms = 1;
        config.pipeline.reconnect.max_ms = 1;
        config.pipeline.reconnect.max_attempts = Some(0);

        let runner = Runner::new(config);
        let (handle, join) = runner
            .spawn_producer(Arc::new(AtomicBool::new(false)))
            .unwrap();
        assert!(join.join().unwrap().is_err());

        let latest = handle.latest().unwrap();
        assert_eq!(latest.sequence, 1);
        assert_eq!(handle.metrics().snapshot().device_errors, 1);
    }
}
