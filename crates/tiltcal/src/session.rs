//! Calibration state machine.
//!
//! A [`Session`] owns the command channel and drives the device through the
//! reference capture and the per-axis angle sweeps of one calibration mode.
//! Front ends call the small command API (`start`, `confirm`, `skip`,
//! `cancel`) and observe progress through `watch` receivers.

use crate::channel::{CommandChannel, CommandResult, Timeouts, Transport, TransportError};
use crate::report::SessionReport;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tiltcal_core::position::AxisLetter;
use tiltcal_core::sequence::is_reference_angle;
use tiltcal_core::{
    Axis, CalibrationDataset, CalibrationMode, CalibrationPoint, DatasetError, KinematicParams,
    KinematicsMode, ParamsError, PartialPosition, Position, SAFE_POSITION, expected_position,
};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum SessionState {
    Idle,
    ReferenceCapture,
    /// Waiting for the operator to confirm the Z reference of an axis sweep.
    AxisReference { axis: Axis },
    AxisSweep { axis: Axis, step: usize },
    Complete,
    Cancelled,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            SessionState::Idle | SessionState::Complete | SessionState::Cancelled
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::ReferenceCapture => write!(f, "capturing the reference"),
            SessionState::AxisReference { axis } => write!(f, "capturing the {axis} axis Z reference"),
            SessionState::AxisSweep { axis, step } => write!(f, "sweeping {axis} (step {step})"),
            SessionState::Complete => write!(f, "complete"),
            SessionState::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid kinematic parameters: {0}")]
    Configuration(#[from] ParamsError),

    #[error("a calibration run is already active")]
    AlreadyRunning,

    #[error("no calibration run is active")]
    NotRunning,

    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    #[error("calibration run was cancelled")]
    Cancelled,

    #[error("results can only be exported after a completed run")]
    ExportUnavailable,

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Cooperative cancellation flag, checked after every device exchange.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub timeouts: Timeouts,
    /// Extra height above the expected tip when approaching a cone.
    pub cone_z_offset: f64,
    /// Height the head is raised to between automated probes.
    pub probe_safe_height: f64,
    /// Height the head is parked at before the B-axis Z reference is taken.
    pub b_reference_height: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            cone_z_offset: 5.0,
            probe_safe_height: 10.0,
            b_reference_height: 45.0,
        }
    }
}

/// Steps completed so far out of the steps in the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy)]
struct StepTarget {
    expected: Position,
    flagged: bool,
}

pub struct Session<T> {
    channel: CommandChannel<T>,
    mode: CalibrationMode,
    params: KinematicParams,
    settings: SessionSettings,
    dataset: CalibrationDataset,
    state: SessionState,
    target: Option<StepTarget>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancelHandle,
}

impl<T: Transport> Session<T> {
    pub fn new(
        channel: CommandChannel<T>,
        mode: CalibrationMode,
        params: KinematicParams,
        settings: SessionSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            channel,
            mode,
            params,
            settings,
            dataset: CalibrationDataset::new(params),
            state: SessionState::Idle,
            target: None,
            state_tx,
            cancel: CancelHandle::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    pub fn params(&self) -> KinematicParams {
        self.params
    }

    pub fn dataset(&self) -> &CalibrationDataset {
        &self.dataset
    }

    pub fn channel(&self) -> &CommandChannel<T> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut CommandChannel<T> {
        &mut self.channel
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_position(&self) -> watch::Receiver<Position> {
        self.channel.subscribe()
    }

    /// Expected position of the step the head is parked at.
    pub fn current_target(&self) -> Option<Position> {
        self.target.map(|t| t.expected)
    }

    /// The current step fell back to the safe position and needs the
    /// operator to position the head by hand.
    pub fn needs_attention(&self) -> bool {
        self.target.is_some_and(|t| t.flagged)
    }

    /// Replace the link lengths used by the next run.
    pub fn set_params(&mut self, params: KinematicParams) -> Result<(), SessionError> {
        if self.state.is_active() {
            return Err(SessionError::AlreadyRunning);
        }
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state.is_active() {
            return Err(SessionError::AlreadyRunning);
        }
        self.params.validate()?;
        if self.params.is_unusually_large() {
            warn!(la = self.params.la, lb = self.params.lb, "link lengths are unusually large");
        }

        self.cancel.reset();
        self.dataset = CalibrationDataset::new(self.params);
        self.target = None;

        let timeout = self.settings.timeouts.command;
        if self.mode == CalibrationMode::ZProbe {
            self.channel.send("G28 Z", timeout).await?;
        }
        self.channel.send("G0 A0 B0", timeout).await?;

        info!(mode = %self.mode, la = self.params.la, lb = self.params.lb, "calibration started");
        self.set_state(SessionState::ReferenceCapture);
        Ok(())
    }

    /// Accept the current step: capture the reference, take the measurement
    /// for the current angle, or confirm the B-axis Z reference.
    pub async fn confirm(&mut self) -> Result<(), SessionError> {
        self.checkpoint()?;
        match self.state {
            SessionState::ReferenceCapture => self.capture_reference().await,
            SessionState::AxisReference { axis } => {
                let position = self
                    .channel
                    .request_position(self.settings.timeouts.position)
                    .await?;
                self.checkpoint()?;
                self.dataset.b_axis_z_reference = Some(position.z);
                info!(%axis, z = position.z, "axis Z reference set");
                self.set_state(SessionState::AxisSweep { axis, step: 0 });
                self.settle().await
            }
            SessionState::AxisSweep { .. } => {
                if self.current_angle().is_none() || self.target.is_none() {
                    // The move for this step never went out.
                    return self.settle().await;
                }
                let (expected, actual) = self.measure().await?;
                self.record_measurement(expected, actual, false)?;
                self.advance().await
            }
            state => Err(inactive(state, "confirm")),
        }
    }

    /// Skip the current angle. At the B-axis Z reference this ends the run.
    pub async fn skip(&mut self) -> Result<(), SessionError> {
        self.checkpoint()?;
        match self.state {
            SessionState::AxisSweep { .. } => {
                let expected = match self.target {
                    Some(target) => self.subset(&target.expected),
                    None => PartialPosition::default(),
                };
                self.record_measurement(expected, expected, true)?;
                self.advance().await
            }
            SessionState::AxisReference { axis } => {
                info!(%axis, "axis Z reference skipped, finishing run");
                self.complete().await;
                Ok(())
            }
            state @ SessionState::ReferenceCapture => Err(SessionError::InvalidState {
                action: "skip",
                state,
            }),
            state => Err(inactive(state, "skip")),
        }
    }

    /// Abandon the run. Recorded points are kept.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        if !self.state.is_active() {
            return Err(SessionError::NotRunning);
        }
        self.cancel.cancel();
        info!(points = self.dataset.len(), "calibration cancelled");
        self.set_state(SessionState::Cancelled);
        Ok(())
    }

    /// Re-issue the moves for the current step, e.g. after a timeout.
    pub async fn reposition(&mut self) -> Result<(), SessionError> {
        self.checkpoint()?;
        match self.state {
            SessionState::AxisSweep { .. } => self.settle().await,
            state => Err(SessionError::InvalidState {
                action: "reposition",
                state,
            }),
        }
    }

    /// Whether the current step is measured without the operator.
    pub fn is_automated_step(&self) -> bool {
        self.mode == CalibrationMode::ZProbe
            && matches!(self.state, SessionState::AxisSweep { axis: Axis::A, .. })
    }

    /// Run automated probe steps until the run needs the operator again.
    pub async fn run_automated(&mut self) -> Result<(), SessionError> {
        while self.is_automated_step() {
            self.confirm().await?;
        }
        Ok(())
    }

    /// Append a point for the current step. Error is taken per axis present
    /// in both positions.
    pub fn record_measurement(
        &mut self,
        expected: PartialPosition,
        actual: PartialPosition,
        skipped: bool,
    ) -> Result<(), SessionError> {
        let Some((axis, angle)) = self.current_angle() else {
            return Err(SessionError::InvalidState {
                action: "record a measurement",
                state: self.state,
            });
        };

        let mut point = if skipped {
            CalibrationPoint::skipped(angle, axis, expected)
        } else {
            CalibrationPoint::measured(angle, axis, expected, actual)
        };
        if self.needs_attention() {
            point = point.flagged();
        }

        if skipped {
            info!(%axis, angle, "step skipped");
        } else {
            info!(
                %axis,
                angle,
                x = ?point.error.x,
                y = ?point.error.y,
                z = ?point.error.z,
                "measurement recorded"
            );
        }
        self.dataset.push(point)?;
        Ok(())
    }

    /// Move relative to the current position on one axis.
    pub async fn jog(&mut self, axis: AxisLetter, delta: f64) -> Result<(), SessionError> {
        let command = format!("G91\nG0 {}{}\nG90", axis.letter(), delta);
        self.channel
            .send(&command, self.settings.timeouts.command)
            .await?;
        Ok(())
    }

    /// Home the given axes, or all of them.
    pub async fn home(&mut self, axes: &[AxisLetter]) -> Result<(), SessionError> {
        let mut command = String::from("G28");
        for axis in axes {
            command.push(' ');
            command.push(axis.letter());
        }
        self.channel
            .send(&command, self.settings.timeouts.command)
            .await?;
        Ok(())
    }

    pub async fn send_raw(&mut self, command: &str) -> Result<CommandResult, SessionError> {
        Ok(self
            .channel
            .send(command, self.settings.timeouts.command)
            .await?)
    }

    /// Best-effort position refresh; failures are logged and dropped.
    pub async fn refresh_position(&mut self) -> Option<Position> {
        match self
            .channel
            .request_position(self.settings.timeouts.position)
            .await
        {
            Ok(position) => Some(position),
            Err(err) => {
                warn!(%err, "position refresh failed");
                None
            }
        }
    }

    pub fn progress(&self) -> Progress {
        let a_len = self.mode.angles(Axis::A).len();
        let total = self.mode.total_steps();
        let completed = match self.state {
            SessionState::Idle | SessionState::ReferenceCapture => 0,
            SessionState::AxisSweep { axis: Axis::A, step } => step,
            SessionState::AxisReference { axis: Axis::A } => 0,
            SessionState::AxisReference { axis: Axis::B } => a_len,
            SessionState::AxisSweep { axis: Axis::B, step } => a_len + step,
            SessionState::Complete => total,
            SessionState::Cancelled => self.dataset.len(),
        };
        Progress {
            completed: completed.min(total),
            total,
        }
    }

    pub fn export(&self) -> Result<SessionReport, SessionError> {
        if self.state != SessionState::Complete {
            return Err(SessionError::ExportUnavailable);
        }
        Ok(SessionReport::from_dataset(
            self.mode,
            &self.dataset,
            chrono::Utc::now(),
        ))
    }

    async fn capture_reference(&mut self) -> Result<(), SessionError> {
        let timeouts = self.settings.timeouts;
        let reference = if self.mode == CalibrationMode::ZProbe {
            let contact = self.channel.probe(timeouts.settle).await?;
            self.checkpoint()?;
            self.dataset.probe_reference_z = Some(contact.z);
            contact
        } else {
            let position = self.channel.request_position(timeouts.position).await?;
            self.checkpoint()?;
            position
        };

        self.dataset.set_reference(reference)?;
        info!(reference = %reference, "reference captured");
        self.set_state(SessionState::AxisSweep {
            axis: Axis::A,
            step: 0,
        });
        self.settle().await
    }

    /// Read back the actual position for the current step.
    async fn measure(&mut self) -> Result<(PartialPosition, PartialPosition), SessionError> {
        let timeouts = self.settings.timeouts;
        let expected = self.target.map_or(SAFE_POSITION, |t| t.expected);

        if self.is_automated_step() {
            let contact = self.channel.probe(timeouts.settle).await?;
            self.checkpoint()?;
            let baseline = self.dataset.probe_reference_z.unwrap_or(0.0);
            let actual = PartialPosition {
                z: Some(contact.z - baseline),
                ..PartialPosition::default()
            };
            return Ok((expected.z_only(), actual));
        }

        let actual = self.channel.request_position(timeouts.position).await?;
        self.checkpoint()?;
        Ok((self.subset(&expected), self.subset(&actual)))
    }

    /// The components a step of the current mode is measured on.
    fn subset(&self, position: &Position) -> PartialPosition {
        match self.mode {
            CalibrationMode::Xy => position.xy(),
            CalibrationMode::Cone | CalibrationMode::ConeFull => position.xyz(),
            CalibrationMode::ZProbe => position.z_only(),
        }
    }

    fn kinematics_mode(&self, axis: Axis) -> KinematicsMode {
        match (self.mode, axis) {
            (CalibrationMode::Xy, _) => KinematicsMode::Camera,
            (CalibrationMode::Cone | CalibrationMode::ConeFull, _) => KinematicsMode::Cone,
            (CalibrationMode::ZProbe, Axis::A) => KinematicsMode::BedProbe,
            (CalibrationMode::ZProbe, Axis::B) => KinematicsMode::ManualProbe {
                reference_z: self.dataset.b_axis_z_reference.unwrap_or(0.0),
            },
        }
    }

    /// Axis and angle of the step the sweep is at.
    fn current_angle(&self) -> Option<(Axis, f64)> {
        let SessionState::AxisSweep { axis, step } = self.state else {
            return None;
        };
        self.mode.angles(axis).get(step).map(|&angle| (axis, angle))
    }

    async fn advance(&mut self) -> Result<(), SessionError> {
        if let SessionState::AxisSweep { axis, step } = self.state {
            self.target = None;
            self.set_state(SessionState::AxisSweep {
                axis,
                step: step + 1,
            });
            self.settle().await?;
        }
        Ok(())
    }

    /// Bring the head to the current step, passing over reference angles and
    /// axis boundaries until a step needs a measurement or the run ends.
    async fn settle(&mut self) -> Result<(), SessionError> {
        loop {
            let SessionState::AxisSweep { axis, step } = self.state else {
                return Ok(());
            };
            let angles = self.mode.angles(axis);

            if step >= angles.len() {
                self.finish_axis(axis).await?;
                continue;
            }

            let angle = angles[step];
            if is_reference_angle(angle) {
                info!(%axis, angle, "reference angle, skipping");
                self.set_state(SessionState::AxisSweep {
                    axis,
                    step: step + 1,
                });
                continue;
            }

            return self.move_to_step(axis, angle).await;
        }
    }

    async fn finish_axis(&mut self, axis: Axis) -> Result<(), SessionError> {
        let timeout = self.settings.timeouts.command;
        match axis {
            Axis::A => {
                self.channel.send("G0 A0", timeout).await?;
                self.checkpoint()?;
                if self.mode == CalibrationMode::ZProbe {
                    let park = format!("G0 A0 B0\nG0 Z{}", self.settings.b_reference_height);
                    self.channel.send(&park, timeout).await?;
                    self.checkpoint()?;
                    self.target = None;
                    self.set_state(SessionState::AxisReference { axis: Axis::B });
                } else {
                    self.set_state(SessionState::AxisSweep {
                        axis: Axis::B,
                        step: 0,
                    });
                }
            }
            Axis::B => self.complete().await,
        }
        Ok(())
    }

    async fn move_to_step(&mut self, axis: Axis, angle: f64) -> Result<(), SessionError> {
        let reference = self.dataset.reference.unwrap_or(SAFE_POSITION);
        let target = match expected_position(
            angle,
            axis,
            &reference,
            &self.params,
            self.kinematics_mode(axis),
        ) {
            Ok(expected) => StepTarget {
                expected,
                flagged: false,
            },
            Err(err) => {
                warn!(%err, %axis, angle, "cannot compute target, using safe position");
                StepTarget {
                    expected: SAFE_POSITION,
                    flagged: true,
                }
            }
        };

        let e = target.expected;
        let rotate = format!("G0 {axis}{angle}");
        let commands = match (self.mode, axis) {
            (CalibrationMode::Xy, _) => {
                vec![rotate, format!("G0 X{:.3} Y{:.3}", e.x, e.y)]
            }
            (CalibrationMode::Cone | CalibrationMode::ConeFull, _) => vec![
                "G90".to_string(),
                rotate,
                format!(
                    "G0 X{:.3} Y{:.3} Z{:.3}",
                    e.x,
                    e.y,
                    e.z + self.settings.cone_z_offset
                ),
            ],
            (CalibrationMode::ZProbe, Axis::A) => vec![
                format!("G0 Z{}", self.settings.probe_safe_height),
                rotate,
                format!("G0 X{:.3} Y{:.3}", e.x, e.y),
            ],
            (CalibrationMode::ZProbe, Axis::B) => vec![
                "G0 A0".to_string(),
                rotate,
                format!("G0 X{:.3} Y{:.3} Z{:.3}", e.x, e.y, e.z),
            ],
        };

        // Only a step whose move went out may be measured.
        self.channel
            .send(&commands.join("\n"), self.settings.timeouts.command)
            .await?;
        self.target = Some(target);
        self.checkpoint()
    }

    async fn complete(&mut self) {
        self.target = None;
        self.set_state(SessionState::Complete);
        let stats = tiltcal_core::SessionStatistics::from_dataset(&self.dataset);
        info!(
            points = self.dataset.len(),
            a_rms = stats.a_axis.rms,
            b_rms = stats.b_axis.rms,
            "calibration complete"
        );
        if let Err(err) = self
            .channel
            .send("G0 A0 B0", self.settings.timeouts.command)
            .await
        {
            warn!(%err, "failed to return head to neutral");
        }
    }

    /// Notice a cancellation requested through a [`CancelHandle`].
    fn checkpoint(&mut self) -> Result<(), SessionError> {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }
        if self.state.is_active() {
            info!(points = self.dataset.len(), "calibration cancelled");
            self.set_state(SessionState::Cancelled);
        }
        if self.state == SessionState::Cancelled {
            return Err(SessionError::Cancelled);
        }
        Ok(())
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

fn inactive(state: SessionState, action: &'static str) -> SessionError {
    match state {
        SessionState::Idle | SessionState::Complete | SessionState::Cancelled => {
            SessionError::NotRunning
        }
        state => SessionError::InvalidState { action, state },
    }
}
