use tiltcal::channel::simulator::{ProbeErrorProfile, SimulatedTransport};
use tiltcal::session::Progress;
use tiltcal::{CommandChannel, Session, SessionError, SessionSettings, SessionState, TransportError};
use tiltcal_core::{Axis, CalibrationMode, KinematicParams, Position};

const START: Position = Position::new(100.0, 100.0, 50.0, 0.0, 0.0);
const PARAMS: KinematicParams = KinematicParams { la: 10.0, lb: 40.0 };

fn session(mode: CalibrationMode) -> Session<SimulatedTransport> {
    session_with(mode, SimulatedTransport::new(START))
}

fn session_with(mode: CalibrationMode, transport: SimulatedTransport) -> Session<SimulatedTransport> {
    let channel = CommandChannel::new(transport, START);
    Session::new(channel, mode, PARAMS, SessionSettings::default())
}

fn written(session: &Session<SimulatedTransport>) -> &[String] {
    session.channel().transport().written()
}

/// Confirm every remaining step as the operator would.
async fn confirm_until_done(session: &mut Session<SimulatedTransport>) {
    while session.state().is_active() {
        session.confirm().await.unwrap();
        session.run_automated().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn full_xy_run() {
    let mut session = session(CalibrationMode::Xy);
    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::ReferenceCapture);

    confirm_until_done(&mut session).await;
    assert_eq!(session.state(), SessionState::Complete);

    let dataset = session.dataset();
    assert_eq!(dataset.reference, Some(START));
    assert_eq!(dataset.a_axis_points.len(), 12);
    assert_eq!(dataset.b_axis_points.len(), 12);
    assert!(dataset.point_at(Axis::A, 0.0).is_none());
    assert!(dataset.point_at(Axis::B, 0.0).is_none());

    let report = session.export().unwrap();
    assert_eq!(report.totals.skipped, 0);
    for stats in [report.statistics.a_axis, report.statistics.b_axis] {
        assert_eq!(stats.measured, 12);
        assert!(stats.max_x < 0.02, "{stats:?}");
        assert!(stats.max_y < 0.02, "{stats:?}");
    }

    let written = written(&session);
    assert!(written.iter().any(|l| l == "G0 A30"));
    assert!(written.iter().any(|l| l == "G0 B-90"));
    assert!(written.iter().any(|l| l == "G0 X105.000 Y98.660"));
    assert_eq!(written.last().map(String::as_str), Some("G0 A0 B0"));
}

#[tokio::test(start_paused = true)]
async fn timeout_keeps_the_step() {
    let mut session = session(CalibrationMode::Xy);
    session.start().await.unwrap();
    session.confirm().await.unwrap();
    assert_eq!(
        session.state(),
        SessionState::AxisSweep {
            axis: Axis::A,
            step: 1
        }
    );

    session
        .channel_mut()
        .transport_mut()
        .set_unresponsive(true);
    let err = session.confirm().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::Timeout { .. })
    ));
    assert_eq!(
        session.state(),
        SessionState::AxisSweep {
            axis: Axis::A,
            step: 1
        }
    );
    assert!(session.dataset().is_empty());

    session
        .channel_mut()
        .transport_mut()
        .set_unresponsive(false);
    session.confirm().await.unwrap();
    assert!(session.dataset().point_at(Axis::A, 30.0).is_some());
}

#[tokio::test(start_paused = true)]
async fn failed_move_is_reissued_not_measured() {
    let mut session = session(CalibrationMode::Xy);
    session.start().await.unwrap();
    session.confirm().await.unwrap();

    // Skipping A30 moves on to A60, but the device stalls on that move.
    session
        .channel_mut()
        .transport_mut()
        .set_unresponsive(true);
    let err = session.skip().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::Timeout { .. })
    ));
    assert_eq!(session.current_target(), None);

    session
        .channel_mut()
        .transport_mut()
        .set_unresponsive(false);
    session.confirm().await.unwrap();
    assert_eq!(
        session.state(),
        SessionState::AxisSweep {
            axis: Axis::A,
            step: 2
        }
    );
    assert!(session.dataset().point_at(Axis::A, 60.0).is_none());
    let moves = written(&session).iter().filter(|l| *l == "G0 A60").count();
    assert_eq!(moves, 2);

    session.confirm().await.unwrap();
    let point = session.dataset().point_at(Axis::A, 60.0).unwrap();
    assert!(!point.skipped);
    assert!(point.error.x.unwrap().abs() < 0.02, "{point:?}");
    assert!(point.error.y.unwrap().abs() < 0.02, "{point:?}");
}

#[tokio::test(start_paused = true)]
async fn cancel_keeps_points_and_restart_is_fresh() {
    let mut session = session(CalibrationMode::Xy);
    session.start().await.unwrap();
    session.confirm().await.unwrap();
    session.confirm().await.unwrap();
    assert_eq!(session.dataset().len(), 1);

    session.cancel().unwrap();
    assert_eq!(session.state(), SessionState::Cancelled);
    assert_eq!(session.dataset().len(), 1);
    assert!(session.confirm().await.is_err());
    assert!(matches!(session.cancel(), Err(SessionError::NotRunning)));
    assert!(matches!(session.export(), Err(SessionError::ExportUnavailable)));

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::ReferenceCapture);
    assert!(session.dataset().is_empty());
    assert_eq!(session.dataset().reference, None);
}

#[tokio::test(start_paused = true)]
async fn cancel_handle_stops_at_next_exchange() {
    let mut session = session(CalibrationMode::Xy);
    let mut states = session.subscribe_state();
    session.start().await.unwrap();
    session.confirm().await.unwrap();

    session.cancel_handle().cancel();
    assert!(matches!(
        session.confirm().await,
        Err(SessionError::Cancelled)
    ));
    assert_eq!(session.state(), SessionState::Cancelled);
    assert_eq!(*states.borrow_and_update(), SessionState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn skipped_steps_are_reported() {
    let mut session = session(CalibrationMode::Xy);
    session.start().await.unwrap();
    assert!(matches!(
        session.skip().await,
        Err(SessionError::InvalidState { .. })
    ));

    session.confirm().await.unwrap();
    session.skip().await.unwrap();
    session.skip().await.unwrap();
    confirm_until_done(&mut session).await;

    let point = session.dataset().point_at(Axis::A, 30.0).unwrap();
    assert!(point.skipped);
    assert_eq!(point.error.x, Some(0.0));

    let report = session.export().unwrap();
    assert_eq!(report.totals.skipped, 2);
    assert_eq!(report.statistics.a_axis.skipped, 2);
    assert_eq!(report.statistics.a_axis.measured, 10);
    assert_eq!(report.statistics.b_axis.measured, 12);
}

#[tokio::test(start_paused = true)]
async fn z_probe_run_measures_probe_error() {
    let transport = SimulatedTransport::new(START).with_probe_errors(ProbeErrorProfile::Mechanical);
    let mut session = session_with(CalibrationMode::ZProbe, transport);

    session.start().await.unwrap();
    assert_eq!(written(&session)[0], "G28 Z");

    // Reference probe, then the A sweep runs unattended.
    session.confirm().await.unwrap();
    assert!(session.is_automated_step());
    session.run_automated().await.unwrap();
    assert_eq!(
        session.state(),
        SessionState::AxisReference { axis: Axis::B }
    );
    assert_eq!(session.dataset().probe_reference_z, Some(0.0));
    assert_eq!(session.dataset().a_axis_points.len(), 12);

    let at_30 = session.dataset().point_at(Axis::A, 30.0).unwrap();
    let z = at_30.error.z.unwrap();
    assert!((z - 0.1).abs() < 1e-9, "z error {z}");
    assert_eq!(at_30.error.x, None);

    // The head was parked for the manual Z reference.
    assert_eq!(session.channel().position().z, 45.0);
    session.confirm().await.unwrap();
    assert_eq!(session.dataset().b_axis_z_reference, Some(45.0));
    let target = session.current_target().unwrap();
    assert!((target.x - 60.0).abs() < 1e-9 && (target.z - 5.0).abs() < 1e-9, "{target}");
    assert!(!session.is_automated_step());

    confirm_until_done(&mut session).await;
    assert_eq!(session.state(), SessionState::Complete);
    assert_eq!(session.dataset().b_axis_points.len(), 12);
    let report = session.export().unwrap();
    assert!(report.statistics.b_axis.max_z < 0.02);
}

#[tokio::test(start_paused = true)]
async fn skipping_b_reference_finishes_the_run() {
    let mut session = session(CalibrationMode::ZProbe);
    session.start().await.unwrap();
    session.confirm().await.unwrap();
    session.run_automated().await.unwrap();

    session.skip().await.unwrap();
    assert_eq!(session.state(), SessionState::Complete);
    assert!(session.dataset().b_axis_points.is_empty());
    assert_eq!(session.export().unwrap().totals.a_axis, 12);
}

#[tokio::test(start_paused = true)]
async fn cone_run_approaches_above_the_tip() {
    let mut session = session(CalibrationMode::Cone);
    session.start().await.unwrap();
    session.confirm().await.unwrap();

    assert!(written(&session).iter().any(|l| l == "G0 X110.000 Y100.000 Z65.000"));

    confirm_until_done(&mut session).await;
    let dataset = session.dataset();
    assert_eq!(dataset.a_axis_points.len(), 3);
    assert_eq!(dataset.b_axis_points.len(), 2);
    // Nobody lowered the tip onto the cone.
    let z = dataset.point_at(Axis::A, 90.0).and_then(|p| p.error.z);
    assert_eq!(z, Some(5.0));
}

#[tokio::test(start_paused = true)]
async fn progress_and_export_gate() {
    let mut session = session(CalibrationMode::Xy);
    assert_eq!(
        session.progress(),
        Progress {
            completed: 0,
            total: 26
        }
    );
    assert!(matches!(session.export(), Err(SessionError::ExportUnavailable)));

    session.start().await.unwrap();
    assert!(matches!(session.start().await, Err(SessionError::AlreadyRunning)));
    session.confirm().await.unwrap();
    assert_eq!(session.progress().completed, 1);
    assert!(matches!(session.export(), Err(SessionError::ExportUnavailable)));
    assert!(matches!(
        session.set_params(KinematicParams { la: 5.0, lb: 30.0 }),
        Err(SessionError::AlreadyRunning)
    ));

    confirm_until_done(&mut session).await;
    assert_eq!(
        session.progress(),
        Progress {
            completed: 26,
            total: 26
        }
    );
    session.set_params(KinematicParams { la: 5.0, lb: 30.0 }).unwrap();
    assert_eq!(session.params().la, 5.0);
}

#[tokio::test(start_paused = true)]
async fn invalid_params_refuse_to_start() {
    let channel = CommandChannel::new(SimulatedTransport::new(START), START);
    let mut session = Session::new(
        channel,
        CalibrationMode::Xy,
        KinematicParams { la: 10.0, lb: 0.0 },
        SessionSettings::default(),
    );
    assert!(matches!(
        session.start().await,
        Err(SessionError::Configuration(_))
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(written(&session).is_empty());
}

#[tokio::test(start_paused = true)]
async fn jog_and_home_move_the_tracker() {
    let mut session = session(CalibrationMode::Xy);
    session
        .jog(tiltcal_core::position::AxisLetter::X, 0.5)
        .await
        .unwrap();
    assert_eq!(session.channel().position().x, 100.5);
    assert_eq!(
        &written(&session)[..3],
        ["G91".to_string(), "G0 X0.5".to_string(), "G90".to_string()]
    );

    session.home(&[]).await.unwrap();
    let position = session.refresh_position().await.unwrap();
    assert_eq!(position, Position::default());
}
