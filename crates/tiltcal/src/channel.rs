//! Bounded-timeout exchanges with the motion device.
//!
//! [`CommandChannel`] owns the transport and the authoritative
//! [`PositionTracker`]. Every line the device sends goes through one response
//! path regardless of whether it came from a serial port or the simulator.

use std::time::Duration;
use thiserror::Error;
use tiltcal_core::{Position, PositionTracker};
use tiltcal_gcode::Code;
use tiltcal_gcode::telemetry::looks_like_position_report;
use tokio::sync::watch;
use tracing::{debug, info, warn};

mod decoder;
pub mod serial;
pub mod simulator;

pub use decoder::LineDecoder;

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
pub const POSITION_TIMEOUT: Duration = Duration::from_secs(10);
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device is not connected")]
    NotConnected,

    #[error("failed to write to device: {0}")]
    WriteError(String),

    #[error("timed out after {waited:?} waiting for {waiting_for}")]
    Timeout {
        waited: Duration,
        waiting_for: &'static str,
    },
}

/// Byte-level link to a device, reduced to whole lines.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn write_line(&mut self, line: &str) -> Result<(), TransportError>;

    /// Next line received from the device, or `None` once the link is gone.
    /// Must be cancel-safe: dropping the future may not lose a line.
    async fn read_line(&mut self) -> Option<String>;

    fn is_connected(&self) -> bool;
}

/// Timeouts applied to the three kinds of exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeouts {
    pub command: Duration,
    pub position: Duration,
    pub settle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command: COMMAND_TIMEOUT,
            position: POSITION_TIMEOUT,
            settle: SETTLE_TIMEOUT,
        }
    }
}

/// Lines received while a command was outstanding, acknowledgments excluded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandResult {
    pub response_lines: Vec<String>,
}

enum Response {
    Ack,
    Position(Position),
    Info,
    /// Belongs to an exchange that already timed out.
    Stale,
}

pub struct CommandChannel<T> {
    transport: T,
    tracker: PositionTracker,
    pending_acks: usize,
    /// Acks still owed for exchanges that timed out. Every line up to the
    /// last of them is a late reply and is dropped.
    stale_acks: usize,
    position_tx: watch::Sender<Position>,
}

impl<T: Transport> CommandChannel<T> {
    pub fn new(transport: T, initial: Position) -> Self {
        let (position_tx, _) = watch::channel(initial);
        Self {
            transport,
            tracker: PositionTracker::new(initial),
            pending_acks: 0,
            stale_acks: 0,
            position_tx,
        }
    }

    pub fn position(&self) -> Position {
        self.tracker.position()
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn subscribe(&self) -> watch::Receiver<Position> {
        self.position_tx.subscribe()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Transmit one or more newline-separated directives and wait until each
    /// has been acknowledged.
    pub async fn send(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult, TransportError> {
        if !self.transport.is_connected() {
            return Err(TransportError::NotConnected);
        }

        for line in command.lines().map(str::trim).filter(|l| !l.is_empty()) {
            debug!("> {line}");
            self.transport.write_line(line).await?;
            self.pending_acks += 1;
            if let Err(err) = self.tracker.apply_directive(line) {
                warn!(%err, line, "sent directive the tracker could not follow");
            }
            self.publish();
        }

        let mut result = CommandResult::default();
        let wait = async {
            while self.pending_acks > 0 {
                let line = self
                    .transport
                    .read_line()
                    .await
                    .ok_or(TransportError::NotConnected)?;
                match self.handle_line(&line) {
                    Response::Ack | Response::Stale => {}
                    Response::Position(_) | Response::Info => result.response_lines.push(line),
                }
            }
            Ok::<(), TransportError>(())
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(outcome) => outcome.map(|()| result),
            Err(_) => {
                self.abandon_pending();
                Err(TransportError::Timeout {
                    waited: timeout,
                    waiting_for: "acknowledgment",
                })
            }
        }
    }

    /// Ask the device where it is. Resolves on the first report that parses;
    /// its trailing `ok` is consumed by the next exchange.
    pub async fn request_position(&mut self, timeout: Duration) -> Result<Position, TransportError> {
        if !self.transport.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let command = Code::REPORT_POSITION.to_string();
        debug!("> {command}");
        self.transport.write_line(&command).await?;
        self.pending_acks += 1;

        let wait = async {
            loop {
                let line = self
                    .transport
                    .read_line()
                    .await
                    .ok_or(TransportError::NotConnected)?;
                if let Response::Position(position) = self.handle_line(&line) {
                    return Ok::<Position, TransportError>(position);
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.abandon_pending();
                Err(TransportError::Timeout {
                    waited: timeout,
                    waiting_for: "position report",
                })
            }
        }
    }

    /// Probe down to the bed and report the contact position.
    pub async fn probe(&mut self, timeout: Duration) -> Result<Position, TransportError> {
        self.send(&Code::PROBE.to_string(), timeout).await?;
        self.request_position(timeout).await
    }

    fn handle_line(&mut self, line: &str) -> Response {
        let line = line.trim();
        debug!("< {line}");
        let is_ack = line == "ok" || line.starts_with("ok ");

        if self.stale_acks > 0 {
            if is_ack {
                self.stale_acks -= 1;
            }
            debug!(line, "dropping late reply");
            return Response::Stale;
        }

        if is_ack {
            self.pending_acks = self.pending_acks.saturating_sub(1);
            return Response::Ack;
        }

        if looks_like_position_report(line) {
            match PositionTracker::parse_telemetry(line) {
                Ok(report) => {
                    self.tracker.apply_telemetry(&report);
                    self.publish();
                    return Response::Position(self.tracker.position());
                }
                Err(err) => {
                    warn!(%err, "ignoring malformed position report");
                    return Response::Info;
                }
            }
        }

        if line.to_ascii_lowercase().contains("error") {
            warn!(line, "device reported an error");
        } else {
            info!(target: "device", "{line}");
        }
        Response::Info
    }

    /// Give up on the acks still expected; their replies will arrive late.
    fn abandon_pending(&mut self) {
        self.stale_acks += self.pending_acks;
        self.pending_acks = 0;
    }

    fn publish(&self) {
        self.position_tx.send_replace(self.tracker.position());
    }
}
