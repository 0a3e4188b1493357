//! Application configuration module.
//!
//! Loads the TOML config file holding the sink connection, the
//! providers and the stations each provider serves.

#[allow(clippy::module_inception)]
mod config;
mod paths;

#[allow(clippy::module_name_repetitions)]
pub use config::{AppConfig, SinkConfig};
pub use paths::resolve_config_path;
