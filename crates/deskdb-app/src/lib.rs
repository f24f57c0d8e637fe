//! deskdb service wiring: configuration file loading and logging setup

pub mod config;
pub mod logging;

pub use config::AppConfig;
pub use logging::LoggingConfig;
