pub mod config_manager;
pub mod constants;
pub mod event_log;
pub mod types;
