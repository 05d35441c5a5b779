use crate::channel::Timeouts;
use crate::channel::simulator::ProbeErrorProfile;
use crate::session::SessionSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use tiltcal_core::Position;

/// Main configuration for the calibration runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Serial connection to the device
    #[serde(default)]
    pub device: DeviceConfig,

    /// Exchange timeouts
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Motion offsets used while calibrating
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Simulated device used with `--simulate`
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Key-value file holding la/lb
    #[serde(default = "default_params_file")]
    pub params_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            timeouts: TimeoutsConfig::default(),
            calibration: CalibrationConfig::default(),
            simulator: SimulatorConfig::default(),
            params_file: default_params_file(),
        }
    }
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Serial port path, e.g. /dev/ttyUSB0 or COM3
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
        }
    }
}

/// Timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_command_secs")]
    pub command_secs: u64,

    #[serde(default = "default_position_secs")]
    pub position_secs: u64,

    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            command_secs: default_command_secs(),
            position_secs: default_position_secs(),
            settle_secs: default_settle_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Clearance above the cone tip on approach (mm)
    #[serde(default = "default_cone_z_offset")]
    pub cone_z_offset: f64,

    /// Height between automated probes (mm)
    #[serde(default = "default_probe_safe_height")]
    pub probe_safe_height: f64,

    /// Parking height before the B-axis Z reference (mm)
    #[serde(default = "default_b_reference_height")]
    pub b_reference_height: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            cone_z_offset: default_cone_z_offset(),
            probe_safe_height: default_probe_safe_height(),
            b_reference_height: default_b_reference_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_start")]
    pub start: Position,

    #[serde(default = "default_response_delay_ms")]
    pub response_delay_ms: u64,

    /// Apply an angle-dependent probe error instead of exact contact
    #[serde(default = "default_probe_errors")]
    pub probe_errors: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            start: default_start(),
            response_delay_ms: default_response_delay_ms(),
            probe_errors: default_probe_errors(),
        }
    }
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_command_secs() -> u64 {
    30
}

fn default_position_secs() -> u64 {
    10
}

fn default_settle_secs() -> u64 {
    20
}

fn default_cone_z_offset() -> f64 {
    5.0
}

fn default_probe_safe_height() -> f64 {
    10.0
}

fn default_b_reference_height() -> f64 {
    45.0
}

fn default_start() -> Position {
    Position::new(100.0, 100.0, 50.0, 0.0, 0.0)
}

fn default_response_delay_ms() -> u64 {
    100
}

fn default_probe_errors() -> bool {
    true
}

fn default_params_file() -> String {
    "tiltcal-params.toml".to_string()
}

impl Config {
    /// Load configuration from a file, auto-detecting TOML or JSON format
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let extension = path.extension().and_then(|s| s.to_str());

        match extension {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            _ => {
                // Try TOML first (preferred), fall back to JSON
                Self::from_toml(&content).or_else(|_| Self::from_json(&content))
            }
        }
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse config as TOML")
    }

    /// Parse configuration from JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("failed to parse config as JSON")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.device.port.trim().is_empty() {
            anyhow::bail!("device.port cannot be empty");
        }
        if self.device.baud_rate == 0 {
            anyhow::bail!("device.baud_rate must be positive");
        }

        for (name, secs) in [
            ("command_secs", self.timeouts.command_secs),
            ("position_secs", self.timeouts.position_secs),
            ("settle_secs", self.timeouts.settle_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("timeouts.{name} must be at least one second");
            }
        }

        for (name, value) in [
            ("cone_z_offset", self.calibration.cone_z_offset),
            ("probe_safe_height", self.calibration.probe_safe_height),
            ("b_reference_height", self.calibration.b_reference_height),
        ] {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("calibration.{name} must be a non-negative number");
            }
        }

        if !self.simulator.start.is_finite() {
            anyhow::bail!("simulator.start must be finite");
        }

        if self.params_file.trim().is_empty() {
            anyhow::bail!("params_file cannot be empty");
        }

        Ok(())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            command: Duration::from_secs(self.timeouts.command_secs),
            position: Duration::from_secs(self.timeouts.position_secs),
            settle: Duration::from_secs(self.timeouts.settle_secs),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            timeouts: self.timeouts(),
            cone_z_offset: self.calibration.cone_z_offset,
            probe_safe_height: self.calibration.probe_safe_height,
            b_reference_height: self.calibration.b_reference_height,
        }
    }

    pub fn probe_error_profile(&self) -> ProbeErrorProfile {
        if self.simulator.probe_errors {
            ProbeErrorProfile::Mechanical
        } else {
            ProbeErrorProfile::Exact
        }
    }
}
