//! Structured logging for CAS-FS components, tagged per-component so log
//! filtering can target one subsystem at a time.

use tracing_subscriber::EnvFilter;

/// Component identifiers for log filtering.
pub struct Component;

impl Component {
    pub const CAS: &'static str = "CAS";
    pub const CODEC: &'static str = "CODEC";
    pub const VFS: &'static str = "VFS";
    pub const CLI: &'static str = "CLI";
}

/// Log levels for runtime configuration, one per `-v`/`-q` CLI step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[macro_export]
macro_rules! log_store_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "CAS", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_vfs_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "VFS", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "CLI", $($key = $value,)* $msg)
    };
}

/// Initialize logging at the given level. Call once at process startup;
/// `RUST_LOG` overrides this if set.
pub fn init_logging(level: LogLevel) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter_str()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_constants() {
        assert_eq!(Component::CAS, "CAS");
        assert_eq!(Component::VFS, "VFS");
    }

    #[test]
    fn level_filter_strings() {
        assert_eq!(LogLevel::Error.as_filter_str(), "error");
        assert_eq!(LogLevel::Trace.as_filter_str(), "trace");
    }
}
