use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use proclog_common::config_manager::Config;
use proclog_daemon::log_store::LogStore;

pub fn print_guidance() {
    println!();
    println!("Execution without parameters is not intended!");
    println!("Run with --help to see how to read the process record or start the daemon");
}

/// Builds the viewer invocation for `path` from a command line such as `vim -R`.
pub fn viewer_command(viewer: &str, path: &Path) -> Result<Command> {
    let mut parts = viewer.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| anyhow!("No viewer configured"))?;

    let mut command = Command::new(program);
    command.args(parts).arg(path);
    Ok(command)
}

/// Opens the process record in the configured viewer and waits for it.
pub fn read_log(config: &Config) -> Result<()> {
    let status = viewer_command(&config.viewer, &config.log_store_path)?
        .status()
        .with_context(|| format!("Failed to start viewer `{}`", config.viewer))?;

    if !status.success() {
        println!("Viewer `{}` exited with {}", config.viewer, status);
    }
    Ok(())
}

/// Truncates the process record. Usually needs root.
pub fn wipe_log(config: &Config) -> Result<()> {
    let store = LogStore::new(&config.log_store_path);
    store.wipe()?;
    println!("Process record {} wiped.", store.path().display());
    Ok(())
}
