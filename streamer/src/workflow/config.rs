use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tactilecore::PipelineConfig;

use crate::device::{default_baud, default_read_timeout_ms, DeviceConfig, DEFAULT_SERIAL_PORT};
use crate::generator::profile::GeneratorConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 6900)),
        }
    }
}

/// Everything the streamer needs: where frames come from, where they go,
/// and how they are processed in between.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    pub device: DeviceConfig,
    pub http: HttpConfig,
    pub pipeline: PipelineConfig,
}

/// Command-line overrides applied on top of the file (or the defaults).
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub port: Option<String>,
    pub baud: Option<u32>,
    pub replay: Option<PathBuf>,
    pub synthetic: bool,
    pub bind: Option<SocketAddr>,
    pub fps: Option<f32>,
}

impl StreamerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading streamer config {}", path_ref.display()))?;
        let config: StreamerConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing streamer config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if overrides.synthetic {
            if !matches!(self.device, DeviceConfig::Synthetic(_)) {
                self.device = DeviceConfig::Synthetic(GeneratorConfig::default());
            }
        } else if let Some(path) = overrides.replay {
            self.device = DeviceConfig::Replay {
                path,
                line_delay_ms: 0,
            };
        } else if overrides.port.is_some() || overrides.baud.is_some() {
            let (port, baud, read_timeout_ms) = match &self.device {
                DeviceConfig::Serial {
                    port,
                    baud,
                    read_timeout_ms,
                } => (port.clone(), *baud, *read_timeout_ms),
                _ => (
                    DEFAULT_SERIAL_PORT.to_string(),
                    default_baud(),
                    default_read_timeout_ms(),
                ),
            };
            self.device = DeviceConfig::Serial {
                port: overrides.port.unwrap_or(port),
                baud: overrides.baud.unwrap_or(baud),
                read_timeout_ms,
            };
        }

        if let Some(bind) = overrides.bind {
            self.http.bind = bind;
        }
        if let Some(fps) = overrides.fps {
            self.pipeline.output.target_fps = fps;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.pipeline
            .validate()
            .context("validating pipeline configuration")
    }
}
