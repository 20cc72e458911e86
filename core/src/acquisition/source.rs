use std::io::{self, BufRead};

/// Failure of the underlying transport.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("source closed")]
    Closed,
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of a single short-timeout read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line with surrounding whitespace trimmed.
    Line(String),
    /// Nothing arrived before the read timeout.
    Idle,
}

/// Raw line transport. Implementations must return within their read timeout.
pub trait LineSource: Send {
    fn read_line(&mut self) -> Result<LineRead, SourceError>;
}

/// Adapts any buffered reader (serial port, file, socket) into a [`LineSource`].
///
/// Partial lines survive read timeouts: bytes read before a timeout are kept
/// and completed by the next call.
pub struct BufLineSource<R> {
    reader: R,
    pending: Vec<u8>,
    eof: bool,
}

impl<R: BufRead + Send> BufLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::with_capacity(256),
            eof: false,
        }
    }

    fn take_line(&mut self) -> LineRead {
        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        LineRead::Line(line)
    }
}

impl<R: BufRead + Send> LineSource for BufLineSource<R> {
    fn read_line(&mut self) -> Result<LineRead, SourceError> {
        if self.eof {
            return Err(SourceError::Closed);
        }
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => {
                self.eof = true;
                if self.pending.is_empty() {
                    Err(SourceError::Closed)
                } else {
                    Ok(self.take_line())
                }
            }
            Ok(_) if self.pending.ends_with(b"\n") => Ok(self.take_line()),
            Ok(_) => {
                // Final unterminated line; the next call reports the close.
                self.eof = true;
                Ok(self.take_line())
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(LineRead::Idle)
            }
            Err(err) => Err(SourceError::Io(err)),
        }
    }
}
