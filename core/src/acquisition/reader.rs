use std::thread;
use std::time::Duration;

use log::{debug, trace};

use crate::acquisition::frame::Frame;
use crate::acquisition::source::{LineRead, LineSource, SourceError};
use crate::config::SensorConfig;
use crate::prelude::SensorShape;

/// Running totals for the resynchronizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub frames_completed: u64,
    pub frames_dropped: u64,
    pub rows_skipped: u64,
}

/// Resynchronizes a raw line stream into fixed-shape frames.
///
/// Rows accumulate until a short line arrives. At that boundary the
/// accumulation is either emitted as a frame (exactly `rows` rows) or
/// dropped, and always cleared. A row beyond `rows` drops the frame at once
/// and further rows are ignored until the next boundary.
pub struct FrameReader {
    shape: SensorShape,
    min_row_chars: usize,
    idle_sleep: Duration,
    rows: Vec<Vec<u32>>,
    overflowed: bool,
    stats: ReaderStats,
}

impl FrameReader {
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            shape: config.shape(),
            min_row_chars: config.min_row_chars,
            idle_sleep: Duration::from_millis(config.idle_sleep_ms),
            rows: Vec::with_capacity(config.rows),
            overflowed: false,
            stats: ReaderStats::default(),
        }
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Rows collected since the last boundary.
    pub fn pending_rows(&self) -> usize {
        self.rows.len()
    }

    /// Forgets any partial accumulation, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.overflowed = false;
    }

    /// Feeds one trimmed line; returns a frame when a boundary completes one.
    pub fn push_line(&mut self, line: &str) -> Option<Frame> {
        let line = line.trim();
        if line.chars().count() < self.min_row_chars {
            return self.close_frame();
        }

        if self.overflowed {
            return None;
        }

        match parse_row(line, self.shape.cols) {
            Some(_) if self.rows.len() == self.shape.rows => {
                self.stats.frames_dropped += 1;
                self.overflowed = true;
                self.rows.clear();
                debug!(
                    "dropping frame with more than {} rows; waiting for boundary",
                    self.shape.rows
                );
            }
            Some(row) => self.rows.push(row),
            None => {
                self.stats.rows_skipped += 1;
                trace!("skipping malformed row: {:?}", line);
            }
        }
        None
    }

    /// Performs one short read; sleeps briefly when the source is idle.
    pub fn poll(&mut self, source: &mut dyn LineSource) -> Result<Option<Frame>, SourceError> {
        match source.read_line()? {
            LineRead::Line(line) => Ok(self.push_line(&line)),
            LineRead::Idle => {
                thread::sleep(self.idle_sleep);
                Ok(None)
            }
        }
    }

    fn close_frame(&mut self) -> Option<Frame> {
        if std::mem::take(&mut self.overflowed) {
            return None;
        }
        let rows = std::mem::take(&mut self.rows);
        self.rows.reserve(self.shape.rows);

        if rows.len() != self.shape.rows {
            if !rows.is_empty() {
                self.stats.frames_dropped += 1;
                debug!(
                    "dropping frame with {} rows (expected {})",
                    rows.len(),
                    self.shape.rows
                );
            }
            return None;
        }

        match Frame::from_rows(&self.shape, &rows) {
            Ok(frame) => {
                self.stats.frames_completed += 1;
                Some(frame)
            }
            Err(err) => {
                self.stats.frames_dropped += 1;
                debug!("dropping frame: {}", err);
                None
            }
        }
    }
}

fn parse_row(line: &str, cols: usize) -> Option<Vec<u32>> {
    let mut row = Vec::with_capacity(cols);
    for token in line.split_whitespace() {
        if row.len() == cols {
            return None;
        }
        row.push(token.parse::<u32>().ok()?);
    }
    (row.len() == cols).then_some(row)
}
