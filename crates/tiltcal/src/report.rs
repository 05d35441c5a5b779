//! Result document handed to whoever stores or displays a finished run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tiltcal_core::{
    CalibrationDataset, CalibrationMode, CalibrationPoint, KinematicParams, Position,
    SessionStatistics, compute_statistics, merge_datasets,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointTotals {
    pub a_axis: usize,
    pub b_axis: usize,
    pub skipped: usize,
    pub flagged: usize,
}

impl PointTotals {
    fn count(a_axis: &[CalibrationPoint], b_axis: &[CalibrationPoint]) -> Self {
        let all = || a_axis.iter().chain(b_axis);
        Self {
            a_axis: a_axis.len(),
            b_axis: b_axis.len(),
            skipped: all().filter(|p| p.skipped).count(),
            flagged: all().filter(|p| p.flagged).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    /// RFC 3339 time the report was produced.
    pub timestamp: String,
    pub mode: CalibrationMode,
    /// Mode of the run merged into this one, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_with: Option<CalibrationMode>,
    pub kinematic_params: KinematicParams,
    pub reference: Option<Position>,
    pub a_axis_errors: Vec<CalibrationPoint>,
    pub b_axis_errors: Vec<CalibrationPoint>,
    pub statistics: SessionStatistics,
    pub totals: PointTotals,
}

impl SessionReport {
    pub fn from_dataset(
        mode: CalibrationMode,
        dataset: &CalibrationDataset,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp: timestamp.to_rfc3339(),
            mode,
            merged_with: None,
            kinematic_params: dataset.kinematic_params,
            reference: dataset.reference,
            a_axis_errors: dataset.a_axis_points.clone(),
            b_axis_errors: dataset.b_axis_points.clone(),
            statistics: SessionStatistics::from_dataset(dataset),
            totals: PointTotals::count(&dataset.a_axis_points, &dataset.b_axis_points),
        }
    }

    /// Combine this report with one of another mode, e.g. an XY run with a
    /// Z-probe run. The Z-probe report supplies Z and the other one X/Y, so
    /// argument order does not matter. Statistics are recomputed over the
    /// merged points.
    pub fn merge(&self, other: &SessionReport, timestamp: DateTime<Utc>) -> Self {
        let (xy, z) = if self.mode == CalibrationMode::ZProbe && other.mode != CalibrationMode::ZProbe {
            (other, self)
        } else {
            (self, other)
        };
        let a_axis_errors = merge_datasets(&xy.a_axis_errors, &z.a_axis_errors);
        let b_axis_errors = merge_datasets(&xy.b_axis_errors, &z.b_axis_errors);
        Self {
            timestamp: timestamp.to_rfc3339(),
            mode: xy.mode,
            merged_with: Some(z.mode),
            kinematic_params: xy.kinematic_params,
            reference: xy.reference,
            statistics: SessionStatistics {
                a_axis: compute_statistics(&a_axis_errors),
                b_axis: compute_statistics(&b_axis_errors),
            },
            totals: PointTotals::count(&a_axis_errors, &b_axis_errors),
            a_axis_errors,
            b_axis_errors,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to render report as JSON")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read report {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse report {}", path.display()))
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json_pretty()?)
            .with_context(|| format!("failed to write report {}", path.display()))
    }

    /// File name derived from the mode and time, e.g.
    /// `tiltcal-xy-20250101-120000.json`.
    pub fn suggested_file_name(&self) -> String {
        let stamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|t| t.format("%Y%m%d-%H%M%S").to_string())
            .unwrap_or_else(|_| "undated".to_string());
        format!("tiltcal-{}-{stamp}.json", self.mode)
    }
}
