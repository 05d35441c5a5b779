// Bookkeeping of the device position from outgoing directives and telemetry

use crate::position::{AxisLetter, PartialPosition, Position};
use thiserror::Error;
use tiltcal_gcode::telemetry::{self, TelemetryError};
use tiltcal_gcode::{Code, ParseError, Statement};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("unparseable directive: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    position: Position,
    relative: bool,
}

impl PositionTracker {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            relative: false,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn is_relative(&self) -> bool {
        self.relative
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Apply one or more newline-separated directives. Either every line is
    /// applied or, on a parse error, none is.
    pub fn apply_directive(&mut self, text: &str) -> Result<(), TrackerError> {
        let statements = tiltcal_gcode::parse(text)?;
        let mut next = self.clone();
        for statement in &statements {
            next.apply_statement(statement);
        }
        *self = next;
        Ok(())
    }

    fn apply_statement(&mut self, statement: &Statement) {
        let Some(code) = statement.code() else {
            return;
        };

        match code {
            Code::ABSOLUTE => self.relative = false,
            Code::RELATIVE => self.relative = true,
            Code::RAPID_MOVE | Code::LINEAR_MOVE => {
                for axis in AxisLetter::ALL {
                    let Some(value) = statement.value(axis.letter()) else {
                        continue;
                    };
                    let slot = axis.get_mut(&mut self.position);
                    if self.relative {
                        *slot += value;
                    } else {
                        *slot = value;
                    }
                }
            }
            Code::HOME => {
                let named: Vec<AxisLetter> = AxisLetter::ALL
                    .into_iter()
                    .filter(|axis| statement.mentions(axis.letter()))
                    .collect();
                let axes = if named.is_empty() {
                    AxisLetter::ALL.to_vec()
                } else {
                    named
                };
                for axis in axes {
                    *axis.get_mut(&mut self.position) = 0.0;
                }
            }
            Code::SET_POSITION => {
                for axis in AxisLetter::ALL {
                    if let Some(value) = statement.value(axis.letter()) {
                        *axis.get_mut(&mut self.position) = value;
                    }
                }
            }
            _ => {}
        }
    }

    /// Decode a position report without touching tracked state.
    pub fn parse_telemetry(line: &str) -> Result<PartialPosition, TelemetryError> {
        let report = telemetry::parse_position_report(line)?;
        Ok(PartialPosition {
            x: Some(report.x),
            y: Some(report.y),
            z: Some(report.z),
            a: report.a,
            b: report.b,
        })
    }

    pub fn apply_telemetry(&mut self, report: &PartialPosition) {
        self.position = report.apply_to(self.position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_then_relative_moves() {
        let mut tracker = PositionTracker::default();
        tracker.apply_directive("G0 X10 Y20").unwrap();
        assert_eq!(tracker.position(), Position::new(10.0, 20.0, 0.0, 0.0, 0.0));

        tracker.apply_directive("G91\nG0 X5").unwrap();
        assert!(tracker.is_relative());
        assert_eq!(tracker.position(), Position::new(15.0, 20.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn feedrate_and_comments_are_ignored() {
        let mut tracker = PositionTracker::default();
        tracker
            .apply_directive("G1 X1 A30 F3000 ; sweep\nG1 (slow) B-15")
            .unwrap();
        assert_eq!(tracker.position(), Position::new(1.0, 0.0, 0.0, 30.0, -15.0));
    }

    #[test]
    fn home_zeroes_named_axes_only() {
        let mut tracker = PositionTracker::new(Position::new(1.0, 2.0, 3.0, 4.0, 5.0));
        tracker.apply_directive("G28 Z").unwrap();
        assert_eq!(tracker.position(), Position::new(1.0, 2.0, 0.0, 4.0, 5.0));

        tracker.apply_directive("G28").unwrap();
        assert_eq!(tracker.position(), Position::default());
    }

    #[test]
    fn set_position_and_unknown_directives() {
        let mut tracker = PositionTracker::new(Position::new(1.0, 2.0, 3.0, 0.0, 0.0));
        tracker.apply_directive("G92 Z10").unwrap();
        tracker.apply_directive("M400\nM114\nok").unwrap();
        assert_eq!(tracker.position(), Position::new(1.0, 2.0, 10.0, 0.0, 0.0));
    }

    #[test]
    fn parse_error_leaves_state_untouched() {
        let mut tracker = PositionTracker::default();
        assert!(tracker.apply_directive("G0 X10\nG0 Y-").is_err());
        assert_eq!(tracker.position(), Position::default());
    }

    #[test]
    fn telemetry_keeps_untracked_axes() {
        let mut tracker = PositionTracker::new(Position::new(0.0, 0.0, 0.0, 45.0, 10.0));
        let report = PositionTracker::parse_telemetry("X:12.50 Y:8.00 Z:1.00").unwrap();
        assert_eq!(report.a, None);
        assert_eq!(report.b, None);
        tracker.apply_telemetry(&report);
        assert_eq!(tracker.position(), Position::new(12.5, 8.0, 1.0, 45.0, 10.0));
    }

    #[test]
    fn malformed_telemetry_is_rejected() {
        assert!(PositionTracker::parse_telemetry("X:1.00 Y:2.00").is_err());
    }
}
