//! The `practest config` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use practest_client::config::load_config_from;

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let rendered = toml::to_string_pretty(&config.masked()).context("failed to render config")?;
    print!("{rendered}");
    Ok(())
}
