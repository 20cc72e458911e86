//! Line sources the producer can open, selected by configuration.

pub mod replay;
pub mod serial;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tactilecore::acquisition::{LineSource, SourceError};
use tactilecore::SensorShape;

use crate::generator::profile::{GeneratorConfig, SyntheticSensor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceConfig {
    Serial {
        port: String,
        #[serde(default = "default_baud")]
        baud: u32,
        #[serde(default = "default_read_timeout_ms")]
        read_timeout_ms: u64,
    },
    Replay {
        path: PathBuf,
        /// Pause after every line, approximating the device's pacing.
        #[serde(default)]
        line_delay_ms: u64,
    },
    Synthetic(GeneratorConfig),
}

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

pub(crate) fn default_baud() -> u32 {
    2_000_000
}

pub(crate) fn default_read_timeout_ms() -> u64 {
    100
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig::Serial {
            port: DEFAULT_SERIAL_PORT.into(),
            baud: default_baud(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl DeviceConfig {
    pub fn describe(&self) -> String {
        match self {
            DeviceConfig::Serial { port, baud, .. } => format!("serial {} @ {} baud", port, baud),
            DeviceConfig::Replay { path, .. } => format!("replay {}", path.display()),
            DeviceConfig::Synthetic(config) => format!("synthetic (seed {})", config.seed),
        }
    }

    /// Opens a fresh session on the configured device.
    pub fn open(&self, shape: SensorShape) -> Result<Box<dyn LineSource>, SourceError> {
        match self {
            DeviceConfig::Serial {
                port,
                baud,
                read_timeout_ms,
            } => Ok(Box::new(serial::open(port, *baud, *read_timeout_ms)?)),
            DeviceConfig::Replay {
                path,
                line_delay_ms,
            } => Ok(Box::new(replay::ReplaySource::open(path, *line_delay_ms)?)),
            DeviceConfig::Synthetic(config) => {
                Ok(Box::new(SyntheticSensor::new(config.clone(), shape)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_fields_default_when_omitted() {
        let config: DeviceConfig =
            serde_yaml::from_str("kind: serial\nport: /dev/ttyACM0\n").unwrap();
        assert_eq!(
            config,
            DeviceConfig::Serial {
                port: "/dev/ttyACM0".into(),
                baud: 2_000_000,
                read_timeout_ms: 100,
            }
        );
    }

    #[test]
    fn synthetic_device_opens_without_hardware() {
        let config: DeviceConfig = serde_yaml::from_str("kind: synthetic\nseed: 4\n").unwrap();
        assert!(config.describe().contains("seed 4"));
        assert!(config.open(SensorShape::new(2, 2)).is_ok());
    }

    #[test]
    fn missing_replay_file_is_an_io_error() {
        let config = DeviceConfig::Replay {
            path: PathBuf::from("/nonexistent/capture.log"),
            line_delay_ms: 0,
        };
        assert!(matches!(
            config.open(SensorShape::new(2, 2)),
            Err(SourceError::Io(_))
        ));
    }
}
