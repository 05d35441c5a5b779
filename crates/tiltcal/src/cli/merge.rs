use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tiltcal::SessionReport;

#[derive(Args)]
pub struct MergeArgs {
    /// Report whose mode and reference are kept, usually the XY run.
    pub primary: PathBuf,

    /// Report merged into the primary one, usually the Z-probe run.
    pub secondary: PathBuf,

    /// Write the merged report here instead of printing it.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl MergeArgs {
    pub fn run(&self) -> Result<()> {
        let primary = SessionReport::from_file(&self.primary)?;
        let secondary = SessionReport::from_file(&self.secondary)?;
        if primary.mode == secondary.mode {
            tracing::warn!(mode = %primary.mode, "merging two reports of the same mode");
        }

        let merged = primary.merge(&secondary, chrono::Utc::now());
        tracing::info!(
            a_points = merged.totals.a_axis,
            b_points = merged.totals.b_axis,
            "reports merged"
        );

        match &self.output {
            Some(path) => {
                merged.write_to(path)?;
                println!("merged report written to {}", path.display());
            }
            None => println!("{}", merged.to_json_pretty()?),
        }
        Ok(())
    }
}
