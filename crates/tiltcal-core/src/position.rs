// Machine coordinates: mm for X/Y/Z, degrees for the A/B rotary axes

use serde::{Deserialize, Serialize};
use std::fmt;

/// A full snapshot of the five tracked axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub b: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64, a: f64, b: f64) -> Self {
        Self { x, y, z, a, b }
    }

    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.z, self.a, self.b]
            .iter()
            .all(|v| v.is_finite())
    }

    /// The X/Y/Z components only, as a partial snapshot.
    pub fn xyz(&self) -> PartialPosition {
        PartialPosition {
            x: Some(self.x),
            y: Some(self.y),
            z: Some(self.z),
            ..PartialPosition::default()
        }
    }

    pub fn xy(&self) -> PartialPosition {
        PartialPosition {
            x: Some(self.x),
            y: Some(self.y),
            ..PartialPosition::default()
        }
    }

    pub fn z_only(&self) -> PartialPosition {
        PartialPosition {
            z: Some(self.z),
            ..PartialPosition::default()
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X:{:.2} Y:{:.2} Z:{:.2} A:{:.2} B:{:.2}",
            self.x, self.y, self.z, self.a, self.b
        )
    }
}

/// A subset of axes; absent fields are distinct from zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialPosition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
}

impl PartialPosition {
    pub fn get(&self, letter: AxisLetter) -> Option<f64> {
        match letter {
            AxisLetter::X => self.x,
            AxisLetter::Y => self.y,
            AxisLetter::Z => self.z,
            AxisLetter::A => self.a,
            AxisLetter::B => self.b,
        }
    }

    /// Overwrite the fields of `base` that are present here.
    pub fn apply_to(&self, base: Position) -> Position {
        Position {
            x: self.x.unwrap_or(base.x),
            y: self.y.unwrap_or(base.y),
            z: self.z.unwrap_or(base.z),
            a: self.a.unwrap_or(base.a),
            b: self.b.unwrap_or(base.b),
        }
    }
}

/// Rotary axis of the print head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    A,
    B,
}

impl Axis {
    /// Parse axis from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "a" => Some(Axis::A),
            "b" => Some(Axis::B),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Axis::A => 'A',
            Axis::B => 'B',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Any of the five tracked axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisLetter {
    X,
    Y,
    Z,
    A,
    B,
}

impl AxisLetter {
    pub const ALL: [AxisLetter; 5] = [
        AxisLetter::X,
        AxisLetter::Y,
        AxisLetter::Z,
        AxisLetter::A,
        AxisLetter::B,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        let letter = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        Self::from_char(letter)
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'X' => Some(AxisLetter::X),
            'Y' => Some(AxisLetter::Y),
            'Z' => Some(AxisLetter::Z),
            'A' => Some(AxisLetter::A),
            'B' => Some(AxisLetter::B),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            AxisLetter::X => 'X',
            AxisLetter::Y => 'Y',
            AxisLetter::Z => 'Z',
            AxisLetter::A => 'A',
            AxisLetter::B => 'B',
        }
    }

    pub fn get(self, position: &Position) -> f64 {
        match self {
            AxisLetter::X => position.x,
            AxisLetter::Y => position.y,
            AxisLetter::Z => position.z,
            AxisLetter::A => position.a,
            AxisLetter::B => position.b,
        }
    }

    pub fn get_mut(self, position: &mut Position) -> &mut f64 {
        match self {
            AxisLetter::X => &mut position.x,
            AxisLetter::Y => &mut position.y,
            AxisLetter::Z => &mut position.z,
            AxisLetter::A => &mut position.a,
            AxisLetter::B => &mut position.b,
        }
    }
}
