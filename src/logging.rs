//! Logging macros
//!
//! Thin wrappers that forward to the `log` crate when the `logging` feature
//! is enabled and compile to nothing otherwise. The arguments are still
//! type-checked in the disabled case so call sites do not rot.

/// Debug-level diagnostics (GC removals, conflict resolutions, cache hits)
#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!(target: "lark", $($arg)*) };
}

/// Debug-level diagnostics - no-op when logging feature is disabled
#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        if false {
            let _ = format_args!($($arg)*);
        }
    }};
}

/// Warnings (unresolved ties, failed cache writes)
#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!(target: "lark", $($arg)*) };
}

/// Warnings - no-op when logging feature is disabled
#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        if false {
            let _ = format_args!($($arg)*);
        }
    }};
}
