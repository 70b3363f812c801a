//! Progress logging.
//!
//! Pipeline steps report progress through four levels (info, success,
//! warning, error). Each call becomes a `tracing` event, so the output is
//! controlled by the subscriber installed with [`init`] and `RUST_LOG`.

use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,tokio_postgres=warn";

/// Log level for pipeline progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    fn marker(self) -> &'static str {
        match self {
            LogLevel::Info => "",
            LogLevel::Success => "✓ ",
            LogLevel::Warning => "⚠️ ",
            LogLevel::Error => "❌ ",
        }
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Emit one progress line at `level`, indented by `indent` steps.
pub fn log(level: LogLevel, message: impl AsRef<str>, indent: u8) {
    let pad = "   ".repeat(indent as usize);
    let line = format!("{}{}{}", pad, level.marker(), message.as_ref());
    match level {
        LogLevel::Info | LogLevel::Success => tracing::info!("{}", line),
        LogLevel::Warning => tracing::warn!("{}", line),
        LogLevel::Error => tracing::error!("{}", line),
    }
}

/// Convenient logging functions
pub fn log_info(msg: impl AsRef<str>) {
    log(LogLevel::Info, msg, 0);
}

pub fn log_success(msg: impl AsRef<str>) {
    log(LogLevel::Success, msg, 0);
}

pub fn log_warning(msg: impl AsRef<str>) {
    log(LogLevel::Warning, msg, 0);
}

pub fn log_error(msg: impl AsRef<str>) {
    log(LogLevel::Error, msg, 0);
}

pub fn log_info_indent(msg: impl AsRef<str>, indent: u8) {
    log(LogLevel::Info, msg, indent);
}

pub fn log_success_indent(msg: impl AsRef<str>, indent: u8) {
    log(LogLevel::Success, msg, indent);
}
