use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use proclog_common::config_manager::{Config, ConfigLoader};
use proclog_common::constants::APP_NAME;
use proclog_common::event_log::EventLog;
use proclog_daemon::daemon::run;
use proclog_daemon::lifecycle::signals::hold_stop_signals;
use proclog_daemon::lifecycle::{detach, Detached, PidFileLock};
use tracing::info;

use crate::commands::{Action, Cli};
use crate::logging::setup_logging;
use crate::nondaemon_commands::{print_guidance, read_log, wipe_log};

pub fn process_cli() -> Result<()> {
    // has to be sync due to daemonizing
    let cli = Cli::parse();
    let config = ConfigLoader::load_config(cli.config.as_deref())?;

    match cli.action() {
        Action::Guidance => {
            print_guidance();
            Ok(())
        }
        Action::Read => read_log(&config),
        Action::Wipe => wipe_log(&config),
        Action::Run => start(cli, config),
    }
}

fn start(mut cli: Cli, mut config: Config) -> Result<()> {
    // the working directory becomes / once detached
    cli.pid_file = cli.pid_file.as_deref().map(absolute).transpose()?;
    cli.log_file = cli.log_file.as_deref().map(absolute).transpose()?;
    config.log_store_path = absolute(&config.log_store_path)?;

    if cli.daemon && detach()? == Detached::Parent {
        return Ok(());
    }

    let program = program_name();
    let event_log = EventLog::open(&program);
    let result = run_daemon(&cli, config, &event_log, &program);
    if let Err(e) = &result {
        event_log.error(&format!("{} failed: {:#}", program, e));
    }
    result
}

fn run_daemon(cli: &Cli, config: Config, event_log: &EventLog, program: &str) -> Result<()> {
    // released once the daemon's signal listener is in place
    hold_stop_signals()?;
    let pid_lock = cli
        .pid_file
        .as_deref()
        .map(PidFileLock::acquire)
        .transpose()?;

    event_log.info(&format!("Started {}", program));
    let log_guard = setup_logging(cli.log_file.as_deref(), &config.log_level, event_log)?;
    info!(
        "Started {} (pid {}, config sources: {:?})",
        program,
        std::process::id(),
        config.config_sources
    );

    run(config, pid_lock)?;

    info!("Stopped {}", program);
    drop(log_guard);
    event_log.info(&format!("Stopped {}", program));
    Ok(())
}

fn program_name() -> String {
    std::env::args()
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| APP_NAME.to_string())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("Failed to resolve the current directory")?
        .join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_keeps_absolute_paths() {
        assert_eq!(
            absolute(Path::new("/run/proclog.pid")).unwrap(),
            PathBuf::from("/run/proclog.pid")
        );
    }

    #[test]
    fn test_absolute_resolves_relative_paths() {
        let resolved = absolute(Path::new("proclog.pid")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("proclog.pid"));
    }
}
