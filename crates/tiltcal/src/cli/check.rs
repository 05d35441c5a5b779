use super::load_config;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tiltcal::params::{FileStore, load_params};

#[derive(Args)]
pub struct CheckArgs {
    /// Path to the configuration file (TOML or JSON).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Parameter file to check instead of the configured one.
    #[arg(long)]
    pub params: Option<PathBuf>,
}

impl CheckArgs {
    pub fn run(&self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        println!("config ok: port {} at {} baud", config.device.port, config.device.baud_rate);

        let path = self
            .params
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.params_file));
        let store = FileStore::open(&path)?;
        let params = load_params(&store)
            .with_context(|| format!("invalid link lengths in {}", path.display()))?;
        println!("params ok: la = {:.2} mm, lb = {:.2} mm", params.la, params.lb);
        if params.is_unusually_large() {
            println!("warning: link lengths above 500 mm are unusual for a print head");
        }
        Ok(())
    }
}
