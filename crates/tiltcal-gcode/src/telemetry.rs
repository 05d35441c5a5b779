//! Position reports sent back by the device.
//!
//! A report looks like `X:10.00 Y:20.00 Z:5.00 A:0.0 B:0.0 Count X:800 Y:1600 Z:2000`.
//! Everything from `Count` onward describes stepper counts and is ignored,
//! as is any field that is not one of the five tracked axes.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct PositionReport {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: Option<f64>,
    pub b: Option<f64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum TelemetryError {
    #[error("position report is missing {axis}: {line:?}")]
    MissingAxis { axis: char, line: String },

    #[error("invalid value {raw:?} for {axis} in position report")]
    InvalidValue { axis: char, raw: String },
}

/// Cheap check used to route a line to [`parse_position_report`] rather
/// than treating it as informational output. A line carrying any linear
/// axis is routed, so an incomplete report surfaces as malformed.
pub fn looks_like_position_report(line: &str) -> bool {
    ["X:", "Y:", "Z:"].iter().any(|axis| line.contains(axis))
}

pub fn parse_position_report(line: &str) -> Result<PositionReport, TelemetryError> {
    let body = match line.find("Count") {
        Some(idx) => &line[..idx],
        None => line,
    };

    let mut fields: [Option<f64>; 5] = [None; 5];
    let bytes = body.as_bytes();
    let mut idx = 0;
    while idx + 1 < bytes.len() {
        let letter = bytes[idx] as char;
        let slot = "XYZAB".find(letter);
        let starts_field = idx == 0 || !bytes[idx - 1].is_ascii_alphanumeric();
        if let Some(slot) = slot
            && starts_field
            && bytes[idx + 1] == b':'
        {
            let rest = body[idx + 2..].trim_start();
            let len = rest
                .find(|c: char| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.')))
                .unwrap_or(rest.len());
            let raw = &rest[..len];
            if fields[slot].is_none() {
                let value = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| TelemetryError::InvalidValue {
                        axis: letter,
                        raw: raw.to_string(),
                    })?;
                fields[slot] = Some(value);
            }
            idx = body.len() - rest.len() + len;
            continue;
        }
        idx += 1;
    }

    let required = |slot: usize, axis: char| {
        fields[slot].ok_or_else(|| TelemetryError::MissingAxis {
            axis,
            line: line.to_string(),
        })
    };

    Ok(PositionReport {
        x: required(0, 'X')?,
        y: required(1, 'Y')?,
        z: required(2, 'Z')?,
        a: fields[3],
        b: fields[4],
    })
}

/// Render a report the way the simulator's firmware does.
pub fn format_position_report(x: f64, y: f64, z: f64, a: f64, b: f64) -> String {
    format!("X:{x:.2} Y:{y:.2} Z:{z:.2} A:{a:.2} B:{b:.2} Count X:0 Y:0 Z:0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_report_without_rotary_axes() {
        let report = parse_position_report("X:12.50 Y:8.00 Z:1.00").unwrap();
        assert_eq!(
            report,
            PositionReport {
                x: 12.5,
                y: 8.0,
                z: 1.0,
                a: None,
                b: None,
            }
        );
    }

    #[test]
    fn stepper_counts_are_ignored() {
        let report =
            parse_position_report("X:1.00 Y:2.00 Z:3.00 E:0.00 Count X:800 Y:1600 Z:9999").unwrap();
        assert_eq!((report.x, report.y, report.z), (1.0, 2.0, 3.0));
    }

    #[test]
    fn missing_z_is_malformed() {
        let err = parse_position_report("X:1.00 Y:2.00 A:3.0").unwrap_err();
        assert!(matches!(err, TelemetryError::MissingAxis { axis: 'Z', .. }));
    }

    #[test]
    fn tolerates_space_after_colon() {
        let report = parse_position_report("Bed X: 10.00 Y: 20.00 Z: -0.12").unwrap();
        assert_eq!((report.x, report.y, report.z), (10.0, 20.0, -0.12));
    }

    #[test]
    fn rejects_garbage_values() {
        let err = parse_position_report("X:abc Y:1 Z:2").unwrap_err();
        assert_eq!(
            err,
            TelemetryError::InvalidValue {
                axis: 'X',
                raw: String::new(),
            }
        );
    }

    #[test]
    fn formatted_report_parses_back() {
        let line = format_position_report(100.0, 99.5, 50.0, 30.0, -15.0);
        let report = parse_position_report(&line).unwrap();
        assert_eq!(report.a, Some(30.0));
        assert_eq!(report.b, Some(-15.0));
    }

    #[test]
    fn partial_reports_are_routed() {
        assert!(looks_like_position_report("X:1.00 Y:2.00"));
        assert!(looks_like_position_report("Z:1.00"));
        assert!(looks_like_position_report("Bed X: 10.00 Y: 20.00 Z: -0.12"));
        assert!(!looks_like_position_report("echo:busy: processing"));
        assert!(!looks_like_position_report("echo:Unknown command: \"G0 X-\""));
    }
}
