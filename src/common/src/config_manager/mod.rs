mod config;

pub use config::{Config, ConfigLoader, FaultSignal};
