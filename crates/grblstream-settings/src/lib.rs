//! grblstream Settings Crate
//!
//! Loads, validates and saves link configuration, and converts it into
//! the runtime types the communication crate consumes.

pub mod config;
pub mod error;

pub use config::{Config, ConnectionSettings, StreamingSettings, AUTO_PORT};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
