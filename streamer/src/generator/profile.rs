use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::thread;
use std::time::Duration;
use tactilecore::acquisition::{LineRead, LineSource, SourceError};
use tactilecore::SensorShape;

/// Configuration for the synthetic tactile device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Resting counts of an unloaded taxel.
    pub rest_level: u32,
    /// Uniform jitter added to every taxel, in counts.
    pub noise: u32,
    /// Counts added at the centre of the press.
    pub press_peak: f32,
    /// Gaussian radius of the press, in taxels.
    pub press_radius: f32,
    /// Frames for the press to complete one orbit.
    pub orbit_frames: u32,
    /// Leading frames without any press, so calibration sees a quiet sensor.
    pub warmup_frames: u64,
    /// Corrupt one row every N frames.
    pub malformed_every: Option<u64>,
    pub frame_interval_ms: u64,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            rest_level: 20,
            noise: 3,
            press_peak: 80.0,
            press_radius: 1.5,
            orbit_frames: 180,
            warmup_frames: 60,
            malformed_every: None,
            frame_interval_ms: 10,
            seed: 0,
        }
    }
}

/// Emits the device line protocol for a moving press on a noisy sensor.
pub struct SyntheticSensor {
    config: GeneratorConfig,
    shape: SensorShape,
    rng: StdRng,
    frame_index: u64,
    pending: VecDeque<String>,
}

impl SyntheticSensor {
    pub fn new(config: GeneratorConfig, shape: SensorShape) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            shape,
            rng,
            frame_index: 0,
            pending: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub fn frames_emitted(&self) -> u64 {
        self.frame_index
    }

    fn press_center(&self) -> Option<(f32, f32)> {
        if self.frame_index < self.config.warmup_frames {
            return None;
        }
        let phase = (self.frame_index - self.config.warmup_frames) as f32
            / self.config.orbit_frames.max(1) as f32;
        let angle = 2.0 * PI * phase;
        let orbit = self.shape.rows.min(self.shape.cols) as f32 / 4.0;
        let row = (self.shape.rows as f32 - 1.0) / 2.0 + orbit * angle.sin();
        let col = (self.shape.cols as f32 - 1.0) / 2.0 + orbit * angle.cos();
        Some((row, col))
    }

    fn taxel(&mut self, row: usize, col: usize, center: Option<(f32, f32)>) -> u32 {
        let jitter = if self.config.noise > 0 {
            self.rng.gen_range(0..=self.config.noise)
        } else {
            0
        };
        let load = center.map_or(0.0, |(r, c)| {
            let d2 = (row as f32 - r).powi(2) + (col as f32 - c).powi(2);
            let sigma = self.config.press_radius.max(0.1);
            self.config.press_peak * (-d2 / (2.0 * sigma * sigma)).exp()
        });
        self.config.rest_level + jitter + load.round() as u32
    }

    /// Queues the rows of the next frame followed by the frame separator.
    fn queue_frame(&mut self) {
        let center = self.press_center();
        let corrupt_row = self
            .config
            .malformed_every
            .filter(|every| *every > 0 && self.frame_index % every == every - 1)
            .map(|_| self.rng.gen_range(0..self.shape.rows));

        for row in 0..self.shape.rows {
            let mut values: Vec<String> = (0..self.shape.cols)
                .map(|col| self.taxel(row, col, center).to_string())
                .collect();
            if corrupt_row == Some(row) {
                values.pop();
            }
            self.pending.push_back(values.join(" "));
        }
        self.pending.push_back(String::new());
        self.frame_index += 1;
    }
}

impl LineSource for SyntheticSensor {
    fn read_line(&mut self) -> Result<LineRead, SourceError> {
        if self.pending.is_empty() {
            if self.frame_index > 0 && self.config.frame_interval_ms > 0 {
                thread::sleep(Duration::from_millis(self.config.frame_interval_ms));
            }
            self.queue_frame();
        }
        Ok(self
            .pending
            .pop_front()
            .map_or(LineRead::Idle, LineRead::Line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tactilecore::acquisition::FrameReader;
    use tactilecore::config::SensorConfig;

    fn quiet(seed: u64) -> GeneratorConfig {
        GeneratorConfig {
            frame_interval_ms: 0,
            seed,
            ..Default::default()
        }
    }

    fn collect_frames(sensor: &mut SyntheticSensor, reader: &mut FrameReader, n: usize) -> usize {
        let mut frames = 0;
        for _ in 0..n * 20 {
            if let Ok(LineRead::Line(line)) = sensor.read_line() {
                if reader.push_line(&line).is_some() {
                    frames += 1;
                }
            }
            if frames == n {
                break;
            }
        }
        frames
    }

    #[test]
    fn emits_frames_the_reader_accepts() {
        let config = SensorConfig {
            idle_sleep_ms: 0,
            ..Default::default()
        };
        let mut sensor = SyntheticSensor::new(quiet(3), config.shape());
        let mut reader = FrameReader::new(&config);
        assert_eq!(collect_frames(&mut sensor, &mut reader, 5), 5);
        assert_eq!(reader.stats().frames_dropped, 0);
    }

    #[test]
    fn warmup_frames_stay_near_rest() {
        let config = SensorConfig::default();
        let generator = quiet(1);
        let ceiling = generator.rest_level + generator.noise;
        let mut sensor = SyntheticSensor::new(generator, config.shape());
        for _ in 0..config.rows {
            match sensor.read_line().unwrap() {
                LineRead::Line(line) => assert!(line
                    .split_whitespace()
                    .all(|v| v.parse::<u32>().unwrap() <= ceiling)),
                LineRead::Idle => panic!("synthetic sensor never idles"),
            }
        }
    }

    #[test]
    fn same_seed_yields_same_lines() {
        let shape = SensorShape::new(4, 4);
        let mut a = SyntheticSensor::new(quiet(9), shape);
        let mut b = SyntheticSensor::new(quiet(9), shape);
        for _ in 0..20 {
            assert_eq!(a.read_line().unwrap(), b.read_line().unwrap());
        }
    }

    #[test]
    fn injected_rows_are_dropped_by_reader() {
        let config = SensorConfig {
            rows: 4,
            cols: 4,
            idle_sleep_ms: 0,
            ..Default::default()
        };
        let generator = GeneratorConfig {
            malformed_every: Some(2),
            ..quiet(5)
        };
        let mut sensor = SyntheticSensor::new(generator, config.shape());
        let mut reader = FrameReader::new(&config);
        for _ in 0..(config.rows + 1) * 4 {
            if let Ok(LineRead::Line(line)) = sensor.read_line() {
                reader.push_line(&line);
            }
        }
        assert_eq!(sensor.frames_emitted(), 4);
        assert_eq!(reader.stats().frames_completed, 2);
        assert_eq!(reader.stats().frames_dropped, 2);
        assert_eq!(reader.stats().rows_skipped, 2);
    }
}
