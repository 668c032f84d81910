//! Logging initialisation for Funnel
//!
//! Installs a `tracing` subscriber configured from [`LoggingConfig`].

pub mod init;

pub use funnel_config::{LogFormat, LogLevel, LoggingConfig};
pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
