// Tracing initialization with a reloadable log level.
use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

/// Installs a global `fmt` subscriber filtered at `level`.
///
/// `RUST_LOG` wins over `level` when set. Calling this again is harmless:
/// the first subscriber stays installed.
pub fn init_tracing(level: &str) {
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    if LOG_RELOAD_HANDLE.set(handle).is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init();
}

/// Changes the log level at runtime. No-op before [`init_tracing`].
pub fn apply_logging_level(level: &str) {
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        let _ = handle.modify(|f| {
            *f = EnvFilter::new(level);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_tracing("debug");
        init_tracing("info");
        apply_logging_level("warn");
        tracing::warn!("still logging");
    }
}
