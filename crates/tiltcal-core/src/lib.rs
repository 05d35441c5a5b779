//! Calibration model shared by the tiltcal runtime.
//!
//! Everything here is pure: no transport, no clock, no logging.

pub mod dataset;
pub mod kinematics;
pub mod link_length;
pub mod position;
pub mod sequence;
pub mod stats;
pub mod tracker;

pub use dataset::{CalibrationDataset, CalibrationPoint, DatasetError, ErrorVector};
pub use kinematics::{
    ComputationError, KinematicParams, KinematicsMode, ParamsError, SAFE_POSITION,
    expected_position, reverse_kinematics,
};
pub use position::{Axis, PartialPosition, Position};
pub use sequence::CalibrationMode;
pub use stats::{AxisStatistics, SessionStatistics, compute_statistics, merge_datasets};
pub use tracker::{PositionTracker, TrackerError};
