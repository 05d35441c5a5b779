use anyhow::Result;
use std::path::Path;
use tiltcal::Config;

pub mod calibrate;
pub mod check;
pub mod merge;

/// Load and validate the configuration, or fall back to the defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let config = Config::from_file(path)?;
            tracing::info!("Loaded config from {}", path.display());
            config
        }
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}
