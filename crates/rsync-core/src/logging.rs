//! Stderr-only structured logging, tagged the way the original wrapper tags
//! its lines (`[copy-Info]`, `[Retry]`, `[Stack-Debug]`, ...).
//!
//! Built on `log` + `env_logger`; the component tag is baked into the message
//! text rather than `log`'s target mechanism, so the on-wire format stays
//! stable for operators grepping historical logs regardless of how the crate
//! is later refactored.

use env_logger::Builder;
use std::io::Write;

/// Initializes the global logger. Safe to call once per process; the binary
/// entry points are the only callers.
pub fn init() {
    let mut builder = Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    );
    builder.target(env_logger::Target::Stderr);
    builder.format(|buf, record| writeln!(buf, "{}", record.args()));
    let _ = builder.try_init();
}

/// Emits one tagged log line, e.g. `log_tag!(Info, "copy", "staged {} bytes", n)`.
#[macro_export]
macro_rules! log_tag {
    (Error, $component:expr, $($arg:tt)*) => {
        log::error!("[{}-Error] {}", $component, format!($($arg)*))
    };
    (Warning, $component:expr, $($arg:tt)*) => {
        log::warn!("[{}-Warning] {}", $component, format!($($arg)*))
    };
    (Info, $component:expr, $($arg:tt)*) => {
        log::info!("[{}-Info] {}", $component, format!($($arg)*))
    };
    (Debug, $component:expr, $($arg:tt)*) => {
        log::debug!("[{}-Debug] {}", $component, format!($($arg)*))
    };
}
