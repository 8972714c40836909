pub mod commands;
pub mod logging;
pub mod nondaemon_commands;
pub mod process_command;
