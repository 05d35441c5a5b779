use super::load_config;
use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use std::time::Duration;
use tiltcal::channel::serial::SerialTransport;
use tiltcal::channel::simulator::SimulatedTransport;
use tiltcal::params::{FileStore, load_params, save_params};
use tiltcal::{CommandChannel, Config, Session, SessionState, Transport};
use tiltcal_core::link_length::estimate_link_lengths;
use tiltcal_core::position::AxisLetter;
use tiltcal_core::{Axis, CalibrationMode, KinematicParams, Position, SessionStatistics};
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Camera-observed X/Y deviation
    Xy,
    /// Automated bed probing for Z deviation
    ZProbe,
    /// Cone tip alignment at the link-length angles
    Cone,
    /// Cone tip alignment over the full sweeps
    ConeFull,
}

impl From<ModeArg> for CalibrationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Xy => CalibrationMode::Xy,
            ModeArg::ZProbe => CalibrationMode::ZProbe,
            ModeArg::Cone => CalibrationMode::Cone,
            ModeArg::ConeFull => CalibrationMode::ConeFull,
        }
    }
}

#[derive(Args)]
pub struct CalibrateArgs {
    /// Path to the configuration file (TOML or JSON).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value = "xy")]
    pub mode: ModeArg,

    /// Talk to the built-in simulator instead of a serial device.
    #[arg(long)]
    pub simulate: bool,

    /// Override the stored A link length (mm).
    #[arg(long)]
    pub la: Option<f64>,

    /// Override the stored B link length (mm).
    #[arg(long)]
    pub lb: Option<f64>,

    /// Override the configured serial port.
    #[arg(long)]
    pub port: Option<String>,
}

impl CalibrateArgs {
    pub fn run(&self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let store = FileStore::open(&config.params_file)?;
        let params = self.resolve_params(&store)?;
        let mode = CalibrationMode::from(self.mode);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to create tokio runtime")?;

        info!(%mode, la = params.la, lb = params.lb, "starting calibration console");

        if self.simulate {
            let transport = SimulatedTransport::new(config.simulator.start)
                .with_response_delay(Duration::from_millis(config.simulator.response_delay_ms))
                .with_probe_errors(config.probe_error_profile());
            let channel = CommandChannel::new(transport, config.simulator.start);
            Console::new(channel, mode, params, &config, store).run(&runtime)
        } else {
            let port = self.port.as_deref().unwrap_or(&config.device.port);
            let transport = SerialTransport::open(port, config.device.baud_rate)
                .with_context(|| format!("failed to open serial port {port}"))?;
            info!("Connected to {port} at {} baud", config.device.baud_rate);
            let channel = CommandChannel::new(transport, Position::default());
            Console::new(channel, mode, params, &config, store).run(&runtime)
        }
    }

    /// Stored link lengths, with command-line overrides applied.
    fn resolve_params(&self, store: &FileStore) -> Result<KinematicParams> {
        if let (Some(la), Some(lb)) = (self.la, self.lb) {
            return Ok(KinematicParams::new(la, lb)?);
        }
        let stored = load_params(store).with_context(|| {
            format!(
                "no usable link lengths in {}; pass --la and --lb",
                store.path().display()
            )
        })?;
        Ok(KinematicParams::new(
            self.la.unwrap_or(stored.la),
            self.lb.unwrap_or(stored.lb),
        )?)
    }
}

fn history_path() -> Option<PathBuf> {
    let dir = dirs::config_dir()?.join("tiltcal");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir.join("history.txt"))
}

const HELP: &str = "\
Commands:
  start                 begin a calibration run
  confirm | c           accept the current step
  skip | s              skip the current step
  cancel                abandon the run (recorded points are kept)
  reposition | r        re-send the moves for the current step
  status                show state, progress and position
  pos                   query the device position
  jog <axis> <mm|deg>   relative move, e.g. `jog x 0.1`
  home [axes...]        home the given axes, or all
  send <gcode>          send a raw G-code line
  export [path]         write the report of a completed run
  estimate              estimate la/lb from a cone run
  apply                 use the last estimate for the next run
  save-params           store the current la/lb
  help                  show this text
  quit                  leave the console";

struct Console<T> {
    session: Session<T>,
    store: FileStore,
    estimate: Option<KinematicParams>,
}

impl<T: Transport> Console<T> {
    fn new(
        channel: CommandChannel<T>,
        mode: CalibrationMode,
        params: KinematicParams,
        config: &Config,
        store: FileStore,
    ) -> Self {
        Self {
            session: Session::new(channel, mode, params, config.session_settings()),
            store,
            estimate: None,
        }
    }

    fn run(mut self, runtime: &Runtime) -> Result<()> {
        println!("tiltcal {} calibration console, type `help` for commands", self.session.mode());
        if let Some(position) = runtime.block_on(self.session.refresh_position()) {
            println!("Device at {position}");
        }

        let mut rl = DefaultEditor::new()?;
        let history = history_path();
        if let Some(path) = &history {
            let _ = rl.load_history(path);
        }

        loop {
            let prompt = format!("[{}] > ", self.session.state());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(line);
                    if let Some(path) = &history {
                        let _ = rl.save_history(path);
                    }

                    match runtime.block_on(self.execute(line)) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(err) => error!("{err:#}"),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    break;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    println!("Error: {err}");
                    break;
                }
            }
        }

        if self.session.state().is_active() {
            warn!("leaving with a run in progress, cancelling");
            self.session.cancel()?;
        }
        Ok(())
    }

    /// Run one console command. Returns whether the console should exit.
    async fn execute(&mut self, line: &str) -> Result<bool> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(false);
        };
        let args: Vec<&str> = words.collect();

        match command.to_lowercase().as_str() {
            "start" => {
                self.session.start().await?;
                self.session.run_automated().await?;
                self.describe_step();
            }
            "confirm" | "c" => {
                self.session.confirm().await?;
                self.session.run_automated().await?;
                self.describe_step();
            }
            "skip" | "s" => {
                self.session.skip().await?;
                self.session.run_automated().await?;
                self.describe_step();
            }
            "cancel" => {
                self.session.cancel()?;
                println!("Run cancelled, {} points kept", self.session.dataset().len());
            }
            "reposition" | "r" => {
                self.session.reposition().await?;
                self.describe_step();
            }
            "status" => self.print_status(),
            "pos" | "position" => {
                if let Some(position) = self.session.refresh_position().await {
                    println!("{position}");
                }
            }
            "jog" => {
                let [axis, delta] = args.as_slice() else {
                    bail!("usage: jog <axis> <delta>");
                };
                let axis = AxisLetter::parse(axis).with_context(|| format!("unknown axis {axis}"))?;
                let delta: f64 = delta
                    .parse()
                    .with_context(|| format!("invalid distance {delta}"))?;
                self.session.jog(axis, delta).await?;
                if let Some(position) = self.session.refresh_position().await {
                    println!("{position}");
                }
            }
            "home" => {
                let axes = args
                    .iter()
                    .map(|a| AxisLetter::parse(a).with_context(|| format!("unknown axis {a}")))
                    .collect::<Result<Vec<_>>>()?;
                self.session.home(&axes).await?;
                if let Some(position) = self.session.refresh_position().await {
                    println!("{position}");
                }
            }
            "send" => {
                if args.is_empty() {
                    bail!("usage: send <gcode>");
                }
                let result = self.session.send_raw(&args.join(" ")).await?;
                for line in result.response_lines {
                    println!("{line}");
                }
            }
            "export" => {
                let report = self.session.export()?;
                let path = args
                    .first()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(report.suggested_file_name()));
                report.write_to(&path)?;
                println!("Report written to {}", path.display());
            }
            "estimate" => self.estimate()?,
            "apply" => {
                let Some(params) = self.estimate else {
                    bail!("no estimate available, run `estimate` first");
                };
                self.session.set_params(params)?;
                println!("Using la = {:.2} mm, lb = {:.2} mm", params.la, params.lb);
            }
            "save-params" => {
                save_params(&mut self.store, &self.session.params())?;
                println!("Saved to {}", self.store.path().display());
            }
            "help" | "?" => println!("{HELP}"),
            "quit" | "exit" | "q" => return Ok(true),
            other => bail!("unknown command `{other}`, type `help`"),
        }
        Ok(false)
    }

    fn estimate(&mut self) -> Result<()> {
        let estimates = estimate_link_lengths(self.session.dataset())?;
        for (name, estimate) in [("la", estimates.la), ("lb", estimates.lb)] {
            println!(
                "{name} = {:.2} mm (spread {:.2} mm){}",
                estimate.value,
                estimate.deviation,
                if estimate.is_consistent() { "" } else { ", inconsistent" }
            );
            if estimate.is_unusually_large() {
                warn!(name, value = estimate.value, "estimated link length is unusually large");
            }
        }
        self.estimate = Some(estimates.to_params()?);
        println!("Run `apply` to use these values, then `save-params` to store them");
        Ok(())
    }

    /// Tell the operator what the current state expects of them.
    fn describe_step(&self) {
        let mode = self.session.mode();
        match self.session.state() {
            SessionState::Idle => {}
            SessionState::ReferenceCapture => match mode {
                CalibrationMode::ZProbe => {
                    println!("Place the head over the probe point, then `confirm` to probe")
                }
                _ if mode.is_cone() => {
                    println!("Jog the tip onto the cone point at A0 B0, then `confirm`")
                }
                _ => println!("Center the nozzle in the camera at A0 B0, then `confirm`"),
            },
            SessionState::AxisReference { axis } => println!(
                "Lower the nozzle onto the bed for the {axis} axis Z reference, then `confirm` (`skip` finishes the run)"
            ),
            SessionState::AxisSweep { axis, step } => {
                let angle = mode.angles(axis).get(step).copied().unwrap_or_default();
                if self.session.needs_attention() {
                    println!(
                        "{axis}{angle}: target unavailable, head parked at the safe position; position it by hand"
                    );
                } else if let Some(target) = self.session.current_target() {
                    println!("{axis}{angle}: head moved to {target}");
                }
                match mode {
                    CalibrationMode::Xy => println!("Jog until the nozzle is centered, then `confirm`"),
                    CalibrationMode::ZProbe => println!("Lower the nozzle onto the bed, then `confirm`"),
                    _ => println!("Jog the tip onto the cone point, then `confirm`"),
                }
            }
            SessionState::Complete => {
                self.print_statistics();
                println!("Run complete, `export` to save the report");
            }
            SessionState::Cancelled => println!("Run cancelled"),
        }
    }

    fn print_status(&self) {
        let progress = self.session.progress();
        println!("mode:     {}", self.session.mode());
        println!("state:    {}", self.session.state());
        println!("progress: {}/{}", progress.completed, progress.total);
        println!("position: {}", self.session.channel().position());
        let params = self.session.params();
        println!("params:   la = {:.2} mm, lb = {:.2} mm", params.la, params.lb);
        if let Some(target) = self.session.current_target() {
            println!("target:   {target}");
        }
        if !self.session.dataset().is_empty() {
            self.print_statistics();
        }
    }

    fn print_statistics(&self) {
        let stats = SessionStatistics::from_dataset(self.session.dataset());
        for (axis, s) in [(Axis::A, stats.a_axis), (Axis::B, stats.b_axis)] {
            println!(
                "{axis}: {} measured, {} skipped, max |x| {:.3} |y| {:.3} |z| {:.3}, rms {:.3}",
                s.measured, s.skipped, s.max_x, s.max_y, s.max_z, s.rms
            );
        }
    }
}
