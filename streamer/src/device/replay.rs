use log::info;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tactilecore::acquisition::{BufLineSource, LineRead, LineSource, SourceError};

/// Replays a captured device log. End of file reads as a detached device.
pub struct ReplaySource {
    inner: BufLineSource<BufReader<File>>,
    line_delay: Duration,
}

impl ReplaySource {
    pub fn open(path: &Path, line_delay_ms: u64) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        info!("Replaying {}", path.display());
        Ok(Self {
            inner: BufLineSource::new(BufReader::new(file)),
            line_delay: Duration::from_millis(line_delay_ms),
        })
    }
}

impl LineSource for ReplaySource {
    fn read_line(&mut self) -> Result<LineRead, SourceError> {
        let line = self.inner.read_line()?;
        if !self.line_delay.is_zero() {
            thread::sleep(self.line_delay);
        }
        Ok(line)
    }
}
