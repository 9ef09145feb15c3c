//! # grblstream
//!
//! Flow-controlled command streaming for GRBL CNC controllers:
//! - Line parser and typed message taxonomy for GRBL 1.1 replies
//! - Acknowledge-gated and byte-budgeted admission strategies
//! - Single-worker channel pump with realtime command bypass
//! - Device state tracking and ordered observer dispatch
//!
//! ## Architecture
//!
//! grblstream is organized as a workspace with multiple crates:
//!
//! 1. **grblstream-core** - Error taxonomy and thread-safe type aliases
//! 2. **grblstream-communication** - Byte channels, command queue, GRBL protocol
//! 3. **grblstream-settings** - Persisted configuration
//! 4. **grblstream** - This facade, plus logging setup
//!
//! ## Example
//!
//! ```no_run
//! use grblstream::{Config, GrblLink, SerialChannel};
//!
//! # async fn run() -> anyhow::Result<()> {
//! grblstream::init_logging()?;
//!
//! let config = Config::load_or_default(&Config::default_path()?)?;
//! let channel = SerialChannel::open(&config.to_connection_params()?)?;
//! let link = GrblLink::new(Box::new(channel), config.to_link_config());
//!
//! link.register_observer(|msg, _link| {
//!     println!("{}", msg);
//!     Ok(())
//! });
//! link.start()?;
//! link.enqueue("G21 G90")?;
//! link.enqueue("G0 X10 Y10")?;
//! # link.stop().await?;
//! # Ok(())
//! # }
//! ```

pub use grblstream_core::{ConnectionError, Error, ProtocolError, Result};

pub use grblstream_communication::{
    decode_line, describe_alarm, describe_error, list_ports, parse_line, AcknowledgeGated,
    ByteBudgeted, ByteChannel, Command, CommandQueue, ConnectionParams, DeviceState, FlowControl,
    FlowStrategy, GrblLink, LinkConfig, Message, MessageDispatcher, MockChannel, ObserverHandle,
    PlannerUsage, RealtimeCommand, Response, SerialChannel, SerialParity, SerialPortInfo,
    StateTracker, StatusFields, StatusScalar, StatusValue, DEFAULT_PLANNER_CAPACITY, MODE_KEY,
};

pub use grblstream_settings::{
    Config, ConfigError, ConnectionSettings, SettingsError, StreamingSettings,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
}

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
/// - Thread ids, names and line numbers
///
/// Fails if a global subscriber is already installed.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Initialize logging with one JSON object per event
pub fn init_logging_json() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .json();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
