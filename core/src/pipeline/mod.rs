//! Producer-owned processing chain.
//!
//! `Pipeline` is the single writer of the baseline and the filtered map. It
//! hands each cycle's result to consumers as an immutable [`MapSnapshot`]
//! through a [`PipelineHandle`]; no lock is held across the per-frame work.

pub mod handle;
pub mod producer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{info, trace, warn};
use ndarray::Array2;

use crate::acquisition::{Frame, FrameReader, LineSource, SourceError};
use crate::config::PipelineConfig;
use crate::math::stats::StatsHelper;
use crate::prelude::{ProcessingStage, SensorShape, StageError, StageInput, StageResult};
use crate::processing::{
    Calibrator, ContactProcessor, ForceEstimator, Normalizer, TemporalFilter,
};
use crate::telemetry::{LogManager, MetricsRecorder};

pub use handle::{MapSnapshot, PipelineHandle, PipelineStatus, SnapshotSlot};
pub use producer::Producer;

use handle::SnapshotHub;

/// What a single processed frame did to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Calibrating { collected: usize, required: usize },
    Calibrated,
    Published { sequence: u64 },
}

pub struct Pipeline {
    shape: SensorShape,
    config: PipelineConfig,
    reader: FrameReader,
    calibrator: Calibrator,
    contact: Option<ContactProcessor>,
    normalizer: Normalizer,
    temporal: TemporalFilter,
    force: Option<ForceEstimator>,
    logger: LogManager,
    metrics: Arc<MetricsRecorder>,
    hub: SnapshotHub,
    sequence: u64,
}

impl Pipeline {
    /// Validates `config` and builds an uncalibrated pipeline.
    pub fn new(config: PipelineConfig, metrics: Arc<MetricsRecorder>) -> StageResult<Self> {
        config.validate()?;
        let shape = config.shape();

        let mut normalizer = Normalizer::new(&config.normalization, config.contact.threshold);
        normalizer.initialize(&shape)?;
        let mut temporal = TemporalFilter::new(config.temporal.alpha);
        temporal.initialize(&shape)?;

        let calibrator = Calibrator::new(shape, config.calibration.frames);
        let hub = SnapshotHub::new(
            PipelineStatus::Calibrating {
                collected: 0,
                required: calibrator.required(),
            },
            metrics.clone(),
        );

        Ok(Self {
            shape,
            reader: FrameReader::new(&config.sensor),
            calibrator,
            contact: None,
            normalizer,
            temporal,
            force: config.telemetry.force.as_ref().map(ForceEstimator::new),
            logger: LogManager::from_config(&config.telemetry),
            metrics,
            hub,
            sequence: 0,
            config,
        })
    }

    pub fn handle(&self) -> PipelineHandle {
        self.hub.handle()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_calibrated(&self) -> bool {
        self.contact.is_some()
    }

    pub fn baseline(&self) -> Option<&Array2<f32>> {
        self.contact.as_ref().map(ContactProcessor::baseline)
    }

    pub fn filtered(&self) -> Option<&Array2<f32>> {
        self.temporal.state()
    }

    /// Drops the baseline, the temporal prior and the published snapshot;
    /// the next frames recalibrate.
    pub fn recalibrate(&mut self) -> StageResult<()> {
        info!("Recalibration requested; collecting {} frames", self.calibrator.required());
        self.contact = None;
        self.calibrator.reset();
        self.temporal.initialize(&self.shape)?;
        self.hub.clear();
        self.hub.set_status(self.calibrating_status());
        Ok(())
    }

    fn calibrating_status(&self) -> PipelineStatus {
        PipelineStatus::Calibrating {
            collected: self.calibrator.collected(),
            required: self.calibrator.required(),
        }
    }

    /// Feeds one raw device line through the reader and, when it completes a
    /// frame, through the rest of the chain.
    pub fn ingest_line(&mut self, line: &str) -> StageResult<Option<CycleOutcome>> {
        let frame = self.reader.push_line(line);
        self.metrics.record_reader(self.reader.stats());
        frame.map(|frame| self.process_frame(&frame)).transpose()
    }

    /// Runs one frame through calibration or the steady-state chain.
    ///
    /// A frame of the wrong shape is rejected before any state is touched.
    pub fn process_frame(&mut self, frame: &Frame) -> StageResult<CycleOutcome> {
        if frame.shape() != self.shape {
            return Err(StageError::InvalidInput(format!(
                "frame is {}x{}, pipeline expects {}x{}",
                frame.shape().rows,
                frame.shape().cols,
                self.shape.rows,
                self.shape.cols
            )));
        }

        if self.contact.is_none() {
            return self.calibrate(frame);
        }
        let contact = self.contact.as_mut().ok_or(StageError::NotCalibrated)?;

        let output = contact.process(frame)?;
        let baseline = contact.baseline().clone();
        let sequence = self.sequence + 1;

        let normalized = self.normalizer.execute(StageInput {
            map: output.contact.clone(),
            sequence,
        })?;
        let filtered = self.temporal.execute(StageInput {
            map: normalized.map.clone(),
            sequence,
        })?;
        for metadata in [&normalized.metadata, &filtered.metadata] {
            trace!(
                "frame {}: {} (peak {:.3})",
                sequence,
                metadata.notes.join(", "),
                metadata.peak.unwrap_or_default()
            );
        }
        let contact_peak = StatsHelper::peak(&output.contact);

        self.sequence = sequence;
        self.metrics.record_processed(output.drift_applied);
        if self.logger.wants_report(sequence) {
            let force = self.force.as_ref().map(|f| f.estimate(&output.contact));
            self.logger
                .report_frame(sequence, contact_peak, &normalized.map, force.as_ref());
        }

        self.hub.publish(MapSnapshot {
            sequence,
            captured_at: Instant::now(),
            filtered: filtered.map,
            baseline,
            contact_peak,
            drift_applied: output.drift_applied,
        });
        Ok(CycleOutcome::Published { sequence })
    }

    fn calibrate(&mut self, frame: &Frame) -> StageResult<CycleOutcome> {
        match self.calibrator.push(frame)? {
            Some(baseline) => {
                self.contact = Some(ContactProcessor::new(baseline, &self.config.contact));
                self.hub.set_status(PipelineStatus::Streaming);
                self.logger.record("Baseline ready; streaming frames");
                Ok(CycleOutcome::Calibrated)
            }
            None => {
                let status = self.calibrating_status();
                self.hub.set_status(status);
                Ok(CycleOutcome::Calibrating {
                    collected: self.calibrator.collected(),
                    required: self.calibrator.required(),
                })
            }
        }
    }

    /// Pulls lines from `source` until it fails or `shutdown` is raised.
    ///
    /// Per-frame processing errors are logged and skipped; only transport
    /// failures end the session.
    pub fn run_session(
        &mut self,
        source: &mut dyn LineSource,
        shutdown: &AtomicBool,
    ) -> Result<(), SourceError> {
        self.reader.reset();
        self.hub.set_status(if self.is_calibrated() {
            PipelineStatus::Streaming
        } else {
            self.calibrating_status()
        });

        while !shutdown.load(Ordering::Acquire) {
            if self.hub.take_recalibration_request() {
                if let Err(err) = self.recalibrate() {
                    warn!("recalibration failed: {}", err);
                }
            }
            let frame = self.reader.poll(source)?;
            self.metrics.record_reader(self.reader.stats());
            if let Some(frame) = frame {
                if let Err(err) = self.process_frame(&frame) {
                    warn!("frame skipped: {}", err);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn set_status(&self, status: PipelineStatus) {
        self.hub.set_status(status);
    }

    pub(crate) fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::LineRead;
    use crate::config::NormalizationPolicy;
    use std::collections::VecDeque;

    fn config(rows: usize, cols: usize, frames: usize) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.sensor.rows = rows;
        config.sensor.cols = cols;
        config.sensor.idle_sleep_ms = 0;
        config.calibration.frames = frames;
        config
    }

    fn calibrated(config: PipelineConfig) -> Pipeline {
        let shape = config.shape();
        let frames = config.calibration.frames;
        let mut pipeline = Pipeline::new(config, Arc::new(MetricsRecorder::new())).unwrap();
        let zeros = Frame::filled(&shape, 0);
        for _ in 0..frames {
            pipeline.process_frame(&zeros).unwrap();
        }
        assert!(pipeline.is_calibrated());
        pipeline
    }

    #[test]
    fn nothing_is_published_before_calibration() {
        let cfg = config(2, 2, 3);
        let shape = cfg.shape();
        let mut pipeline = Pipeline::new(cfg, Arc::new(MetricsRecorder::new())).unwrap();
        let handle = pipeline.handle();

        let outcome = pipeline.process_frame(&Frame::filled(&shape, 5)).unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Calibrating {
                collected: 1,
                required: 3
            }
        );
        assert!(handle.latest().is_none());
        assert_eq!(
            handle.status(),
            PipelineStatus::Calibrating {
                collected: 1,
                required: 3
            }
        );

        pipeline.process_frame(&Frame::filled(&shape, 5)).unwrap();
        let outcome = pipeline.process_frame(&Frame::filled(&shape, 5)).unwrap();
        assert_eq!(outcome, CycleOutcome::Calibrated);
        assert!(handle.latest().is_none());
        assert_eq!(handle.status(), PipelineStatus::Streaming);

        pipeline.process_frame(&Frame::filled(&shape, 5)).unwrap();
        assert_eq!(handle.latest().unwrap().sequence, 1);
    }

    #[test]
    fn single_press_normalizes_to_expected_value() {
        let mut cfg = config(16, 16, 30);
        cfg.contact.threshold = 12.0;
        cfg.normalization = NormalizationPolicy::FixedScale { abs_max: 100.0 };
        let shape = cfg.shape();
        let mut pipeline = calibrated(cfg);

        let mut rows = vec![vec![0u32; 16]; 16];
        rows[5][9] = 50;
        let frame = Frame::from_rows(&shape, &rows).unwrap();

        let output = pipeline
            .contact
            .as_mut()
            .unwrap()
            .process(&frame)
            .unwrap();
        let normalized = pipeline.normalizer.normalize(&output.contact);
        let nonzero: Vec<_> = normalized.indexed_iter().filter(|(_, v)| **v != 0.0).collect();
        assert_eq!(nonzero.len(), 1);
        assert_eq!(nonzero[0].0, (5, 9));
        assert!((nonzero[0].1 - 0.38).abs() < 1e-6);
    }

    #[test]
    fn filtered_map_is_temporally_smoothed_in_snapshot() {
        let mut cfg = config(1, 1, 1);
        cfg.contact.threshold = 0.0;
        cfg.normalization = NormalizationPolicy::FixedScale { abs_max: 10.0 };
        cfg.temporal.alpha = 0.2;
        let shape = cfg.shape();
        let mut pipeline = calibrated(cfg);
        let handle = pipeline.handle();

        pipeline.process_frame(&Frame::filled(&shape, 10)).unwrap();
        assert!((handle.latest().unwrap().filtered[[0, 0]] - 0.2).abs() < 1e-6);
        pipeline.process_frame(&Frame::filled(&shape, 10)).unwrap();
        assert!((handle.latest().unwrap().filtered[[0, 0]] - 0.36).abs() < 1e-6);
    }

    #[test]
    fn invalid_frame_leaves_state_unchanged() {
        let mut cfg = config(2, 2, 1);
        cfg.contact.drift_beta = 0.5;
        let mut pipeline = calibrated(cfg);
        pipeline.process_frame(&Frame::filled(&SensorShape::new(2, 2), 3)).unwrap();
        let baseline = pipeline.baseline().unwrap().clone();
        let filtered = pipeline.filtered().unwrap().clone();

        let wrong = Frame::filled(&SensorShape::new(3, 2), 100);
        assert!(pipeline.process_frame(&wrong).is_err());
        assert_eq!(pipeline.baseline().unwrap(), &baseline);
        assert_eq!(pipeline.filtered().unwrap(), &filtered);
    }

    #[test]
    fn idle_drift_updates_published_baseline() {
        let mut cfg = config(1, 2, 1);
        cfg.contact.threshold = 10.0;
        cfg.contact.drift_beta = 0.2;
        let shape = cfg.shape();
        let mut pipeline = calibrated(cfg);
        let handle = pipeline.handle();

        pipeline.process_frame(&Frame::filled(&shape, 10)).unwrap();
        let snapshot = handle.latest().unwrap();
        assert!(snapshot.drift_applied);
        assert!(snapshot.baseline.iter().all(|b| (b - 2.0).abs() < 1e-6));
        assert_eq!(pipeline.metrics().snapshot().drift_updates, 1);
    }

    #[test]
    fn ingest_line_drives_reader_and_chain() {
        let cfg = config(2, 2, 1);
        let mut pipeline = Pipeline::new(cfg, Arc::new(MetricsRecorder::new())).unwrap();
        assert_eq!(pipeline.ingest_line("1 1").unwrap(), None);
        assert_eq!(pipeline.ingest_line("oops").unwrap(), None);
        assert_eq!(pipeline.ingest_line("1 1").unwrap(), None);
        assert_eq!(
            pipeline.ingest_line("").unwrap(),
            Some(CycleOutcome::Calibrated)
        );
        assert_eq!(pipeline.metrics().snapshot().rows_skipped, 1);
    }

    #[test]
    fn recalibration_resets_baseline_and_prior() {
        let cfg = config(1, 1, 2);
        let shape = cfg.shape();
        let mut pipeline = calibrated(cfg);
        let handle = pipeline.handle();
        pipeline.process_frame(&Frame::filled(&shape, 200)).unwrap();
        assert!(handle.latest().is_some());

        handle.request_recalibration();
        assert!(pipeline.hub.take_recalibration_request());
        pipeline.recalibrate().unwrap();
        assert!(!pipeline.is_calibrated());
        assert_eq!(pipeline.filtered().unwrap(), &shape.zeros());
        assert!(handle.latest().is_none());
        assert_eq!(
            handle.status(),
            PipelineStatus::Calibrating {
                collected: 0,
                required: 2
            }
        );

        pipeline.process_frame(&Frame::filled(&shape, 200)).unwrap();
        pipeline.process_frame(&Frame::filled(&shape, 200)).unwrap();
        assert_eq!(pipeline.baseline().unwrap()[[0, 0]], 200.0);
        assert!(handle.latest().is_none());

        pipeline.process_frame(&Frame::filled(&shape, 200)).unwrap();
        assert_eq!(handle.latest().unwrap().sequence, 2);
    }

    struct ScriptedSource {
        lines: VecDeque<&'static str>,
    }

    impl LineSource for ScriptedSource {
        fn read_line(&mut self) -> Result<LineRead, SourceError> {
            match self.lines.pop_front() {
                Some(line) => Ok(LineRead::Line(line.to_string())),
                None => Err(SourceError::Closed),
            }
        }
    }

    #[test]
    fn run_session_processes_until_source_closes() {
        let cfg = config(1, 2, 1);
        let mut pipeline = Pipeline::new(cfg, Arc::new(MetricsRecorder::new())).unwrap();
        let handle = pipeline.handle();
        let mut source = ScriptedSource {
            lines: VecDeque::from(vec!["0 0", "", "0 90", "", "5 x", ""]),
        };
        let shutdown = AtomicBool::new(false);

        let result = pipeline.run_session(&mut source, &shutdown);
        assert!(matches!(result, Err(SourceError::Closed)));
        assert_eq!(handle.latest().unwrap().sequence, 1);
        let metrics = handle.metrics().snapshot();
        assert_eq!(metrics.frames_completed, 2);
        assert_eq!(metrics.frames_dropped, 0);
        assert_eq!(metrics.rows_skipped, 1);
    }
}
