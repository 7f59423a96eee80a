//! Logging infrastructure.
//!
//! Structured logging controlled by the `SIDELOAD_DEBUG` environment
//! variable. The library itself only emits `tracing` events; installing a
//! subscriber is opt-in via the `tracing-subscriber` feature.
//!
//! # Environment Variables
//!
//! - `SIDELOAD_DEBUG=true` - Enable debug logging
//! - `SIDELOAD_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific level
//! - `SIDELOAD_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! # Usage
//!
//! ```rust,no_run
//! use sideload::logging;
//!
//! // Initialize logging (call once at startup)
//! logging::init();
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `SIDELOAD_DEBUG`.
///
/// Returns `true` for "true", "1" or "yes" (case-insensitive).
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("SIDELOAD_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Get the configured log level from `SIDELOAD_LOG_LEVEL`.
///
/// Defaults to "debug" when `SIDELOAD_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("SIDELOAD_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Get the configured log format from `SIDELOAD_LOG_FORMAT`.
///
/// Defaults to "json" for structured logging.
pub fn get_log_format() -> &'static str {
    env::var("SIDELOAD_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize the logging system.
///
/// Call once at application startup; subsequent calls are no-ops. Without
/// the `tracing-subscriber` feature this only checks the environment — the
/// host application is expected to install its own subscriber.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("SIDELOAD_LOG_LEVEL").is_err() {
            // No logging requested, skip initialization
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!("sideload={}", level))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            match get_log_format() {
                "pretty" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().pretty())
                        .init();
                }
                "compact" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().compact())
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
            }

            tracing::info!(level = level, format = get_log_format(), "logging initialized");
        }

        #[cfg(not(feature = "tracing-subscriber"))]
        {
            // No subscriber bundled; events are silent unless the host
            // installs one.
        }
    });
}

/// Initialize logging with a specific level.
///
/// # Safety note
///
/// Sets a process environment variable, which is unsafe in multi-threaded
/// programs. Call early, before spawning threads.
pub fn init_with_level(level: &str) {
    // SAFETY: intended for program startup, before threads are spawned.
    unsafe {
        env::set_var("SIDELOAD_LOG_LEVEL", level);
    }
    init();
}

/// Initialize debug logging, equivalent to `SIDELOAD_DEBUG=true`.
///
/// # Safety note
///
/// Sets a process environment variable, which is unsafe in multi-threaded
/// programs. Call early, before spawning threads.
pub fn init_debug() {
    // SAFETY: intended for program startup, before threads are spawned.
    unsafe {
        env::set_var("SIDELOAD_DEBUG", "true");
    }
    init();
}
