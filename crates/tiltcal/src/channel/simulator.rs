//! Deterministic stand-in for a Marlin-style device.
//!
//! Directives are applied to a simulated device the moment they are written.
//! Replies are queued with a fixed delay on the tokio clock and handed out by
//! [`Transport::read_line`], so they take the same path as live traffic.

use super::{Transport, TransportError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tiltcal_core::{Position, PositionTracker};
use tiltcal_gcode::telemetry::format_position_report;
use tiltcal_gcode::{Code, Statement};
use tokio::time::Instant;

pub const DEFAULT_RESPONSE_DELAY: Duration = Duration::from_millis(100);

/// Height of the bed surface in machine coordinates.
const BED_Z: f64 = 0.0;

/// How far the simulated probe contact deviates from the bed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeErrorProfile {
    /// Contact exactly at the bed.
    #[default]
    Exact,
    /// Angle-dependent error resembling a slightly misaligned head.
    Mechanical,
}

impl ProbeErrorProfile {
    pub fn deviation(self, a: f64, b: f64) -> f64 {
        match self {
            ProbeErrorProfile::Exact => 0.0,
            ProbeErrorProfile::Mechanical => {
                let a = a.to_radians();
                let b = b.to_radians();
                0.3 * a.sin() + 0.1 * (2.0 * a).cos() - 0.1 + 0.2 * (1.5 * b).sin()
            }
        }
    }
}

pub struct SimulatedTransport {
    device: PositionTracker,
    outbox: VecDeque<(Instant, String)>,
    response_delay: Duration,
    probe_errors: ProbeErrorProfile,
    responsive: bool,
    /// Lines written while stalled, answered once the device responds again.
    held: Vec<String>,
    connected: bool,
    written: Vec<String>,
}

impl SimulatedTransport {
    pub fn new(start: Position) -> Self {
        Self {
            device: PositionTracker::new(start),
            outbox: VecDeque::new(),
            response_delay: DEFAULT_RESPONSE_DELAY,
            probe_errors: ProbeErrorProfile::Exact,
            responsive: true,
            held: Vec::new(),
            connected: true,
            written: Vec::new(),
        }
    }

    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    pub fn with_probe_errors(mut self, profile: ProbeErrorProfile) -> Self {
        self.probe_errors = profile;
        self
    }

    /// Stall the device. Lines written meanwhile are neither applied nor
    /// answered until it is re-enabled, then handled in order.
    pub fn set_unresponsive(&mut self, unresponsive: bool) {
        self.responsive = !unresponsive;
        if self.responsive {
            for line in std::mem::take(&mut self.held) {
                self.respond(&line);
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
        self.outbox.clear();
        self.held.clear();
    }

    /// Every line written so far, in order.
    pub fn written(&self) -> &[String] {
        &self.written
    }

    pub fn device_position(&self) -> Position {
        self.device.position()
    }

    fn queue(&mut self, line: String) {
        let due = Instant::now() + self.response_delay;
        let due = match self.outbox.back() {
            Some((last, _)) => due.max(*last),
            None => due,
        };
        self.outbox.push_back((due, line));
    }

    fn respond(&mut self, line: &str) {
        let code = tiltcal_gcode::parse(line)
            .ok()
            .and_then(|statements| statements.first().and_then(Statement::code));

        match code {
            Some(Code::REPORT_POSITION) => {
                let p = self.device.position();
                self.queue(format_position_report(p.x, p.y, p.z, p.a, p.b));
            }
            Some(Code::PROBE) => {
                let mut p = self.device.position();
                p.z = BED_Z + self.probe_errors.deviation(p.a, p.b);
                self.device.set_position(p);
                self.queue(format!("Bed X: {:.2} Y: {:.2} Z: {:.2}", p.x, p.y, p.z));
            }
            _ => {
                if self.device.apply_directive(line).is_err() {
                    self.queue(format!("echo:Unknown command: \"{line}\""));
                }
            }
        }
        self.queue("ok".to_string());
    }
}

impl Transport for SimulatedTransport {
    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.written.push(line.to_string());
        if self.responsive {
            self.respond(line);
        } else {
            self.held.push(line.to_string());
        }
        Ok(())
    }

    async fn read_line(&mut self) -> Option<String> {
        if !self.connected {
            return None;
        }
        let Some(&(due, _)) = self.outbox.front() else {
            return std::future::pending().await;
        };
        tokio::time::sleep_until(due).await;
        self.outbox.pop_front().map(|(_, line)| line)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mechanical_profile_is_zero_at_neutral() {
        assert_eq!(ProbeErrorProfile::Mechanical.deviation(0.0, 0.0), 0.0);
        let at_30 = ProbeErrorProfile::Mechanical.deviation(30.0, 0.0);
        assert!((at_30 - 0.1).abs() < 1e-9);
        assert_eq!(ProbeErrorProfile::Exact.deviation(30.0, 45.0), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn replies_arrive_after_delay() {
        let mut sim = SimulatedTransport::new(Position::default());
        sim.write_line("G0 X5").await.unwrap();
        assert_eq!(sim.device_position().x, 5.0);

        let start = Instant::now();
        assert_eq!(sim.read_line().await.as_deref(), Some("ok"));
        assert_eq!(start.elapsed(), DEFAULT_RESPONSE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn report_precedes_ok() {
        let mut sim = SimulatedTransport::new(Position::new(1.0, 2.0, 3.0, 30.0, -15.0));
        sim.write_line("M114").await.unwrap();
        assert_eq!(
            sim.read_line().await.as_deref(),
            Some("X:1.00 Y:2.00 Z:3.00 A:30.00 B:-15.00 Count X:0 Y:0 Z:0")
        );
        assert_eq!(sim.read_line().await.as_deref(), Some("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_directive_is_echoed() {
        let mut sim = SimulatedTransport::new(Position::default());
        sim.write_line("G0 X-").await.unwrap();
        assert_eq!(
            sim.read_line().await.as_deref(),
            Some("echo:Unknown command: \"G0 X-\"")
        );
        assert_eq!(sim.read_line().await.as_deref(), Some("ok"));
        assert_eq!(sim.written(), ["G0 X-".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_device_answers_once_resumed() {
        let mut sim = SimulatedTransport::new(Position::default());
        sim.set_unresponsive(true);
        sim.write_line("G0 X5").await.unwrap();
        assert_eq!(sim.device_position().x, 0.0);

        sim.set_unresponsive(false);
        assert_eq!(sim.device_position().x, 5.0);
        assert_eq!(sim.read_line().await.as_deref(), Some("ok"));
    }
}
