use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Clone, Debug)]
#[clap(
    name = "proclog",
    about = "Keeps a record of every process that ran on this host, and as whom",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "--log_file is the daemon's own diagnostic log, while --read opens the \
                  record of processes it keeps.\n--daemon, --pid_file and --log_file are meant \
                  for the service manager, see the service file."
)]
pub struct Cli {
    /// Configuration file (TOML)
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Open the process record for reading
    #[clap(short, long, conflicts_with_all = ["wipe", "daemon"])]
    pub read: bool,

    /// Wipe the process record
    #[clap(short, long, conflicts_with = "daemon")]
    pub wipe: bool,

    /// Diagnostic log of the daemon [default: standard output]
    #[clap(short = 'l', long = "log_file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Pid file that keeps a single instance running
    #[clap(short = 'p', long = "pid_file", value_name = "FILE")]
    pub pid_file: Option<PathBuf>,

    /// Detach from the terminal and run in the background
    #[clap(short, long, requires = "pid_file")]
    pub daemon: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Guidance,
    Read,
    Wipe,
    Run,
}

impl Cli {
    pub fn action(&self) -> Action {
        if self.read {
            Action::Read
        } else if self.wipe {
            Action::Wipe
        } else if self.daemon || self.pid_file.is_some() || self.log_file.is_some() {
            Action::Run
        } else {
            Action::Guidance
        }
    }
}
