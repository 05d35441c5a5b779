//! Live transport over a serial port.

use super::{LineDecoder, Transport, TransportError};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const READ_POLL: Duration = Duration::from_millis(100);

pub struct SerialTransport {
    writer: Box<dyn Write + Send>,
    lines: mpsc::UnboundedReceiver<String>,
    connected: bool,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32) -> serialport::Result<Self> {
        let port = serialport::new(path, baud_rate).timeout(READ_POLL).open()?;
        let reader = port.try_clone()?;
        debug!(path, baud_rate, "serial port open");
        Ok(Self::from_parts(reader, port))
    }

    /// Build a transport from any byte source and sink. A background thread
    /// decodes `reader` into lines until it reaches end of stream.
    pub fn from_parts<R, W>(reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (tx, lines) = mpsc::unbounded_channel();
        thread::spawn(move || read_lines(reader, tx));
        Self {
            writer: Box::new(writer),
            lines,
            connected: true,
        }
    }
}

fn read_lines<R: Read>(mut reader: R, tx: mpsc::UnboundedSender<String>) {
    let mut decoder = LineDecoder::default();
    let mut buf = [0u8; 256];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                for line in decoder.push(&buf[..n]) {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
            }
            Err(err) if matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {}
            Err(err) => {
                warn!(%err, "serial read failed");
                break;
            }
        }
    }
    if let Some(line) = decoder.finish() {
        let _ = tx.send(line);
    }
}

impl Transport for SerialTransport {
    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let result = self
            .writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush());
        result.map_err(|err| {
            if err.kind() == io::ErrorKind::BrokenPipe {
                self.connected = false;
            }
            TransportError::WriteError(err.to_string())
        })
    }

    async fn read_line(&mut self) -> Option<String> {
        let line = self.lines.recv().await;
        if line.is_none() {
            self.connected = false;
        }
        line
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
