use log::info;
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, BufReader};
use std::time::Duration;
use tactilecore::acquisition::{BufLineSource, SourceError};

pub type SerialLineSource = BufLineSource<BufReader<Box<dyn SerialPort>>>;

/// Opens the sensor's serial port with a short read timeout.
///
/// Stale input from before the open is discarded so the first frame
/// boundary is a real one.
pub fn open(port: &str, baud: u32, read_timeout_ms: u64) -> Result<SerialLineSource, SourceError> {
    let serial = serialport::new(port, baud)
        .timeout(Duration::from_millis(read_timeout_ms))
        .open()
        .map_err(io::Error::from)?;
    serial.clear(ClearBuffer::Input).map_err(io::Error::from)?;
    info!("Serial device opened on {} @ {} baud", port, baud);
    Ok(BufLineSource::new(BufReader::new(serial)))
}
