//! A thin logging seam for callers who want a sink other than `tracing`.
//!
//! Each pattern crate logs its own state transitions, rejections, and
//! storage failures directly via `tracing` when the `tracing` feature is
//! enabled. This trait exists for embedders (tests, non-`tracing` hosts)
//! that want to inject their own sink instead.

use std::fmt::Debug;

/// A structured logger with a handful of bound fields per call.
pub trait ResilienceLogger: Send + Sync {
    /// Logs a debug-level message with structured fields.
    fn debug(&self, msg: &str, fields: &[(&str, &dyn Debug)]);
    /// Logs an info-level message with structured fields.
    fn info(&self, msg: &str, fields: &[(&str, &dyn Debug)]);
    /// Logs a warn-level message with structured fields.
    fn warn(&self, msg: &str, fields: &[(&str, &dyn Debug)]);
    /// Logs an error-level message with structured fields.
    fn error(&self, msg: &str, fields: &[(&str, &dyn Debug)]);

    /// Returns a logger with `bindings` merged into every subsequent call.
    ///
    /// Keys `__proto__`, `constructor`, and `prototype` are dropped from
    /// `bindings`: Rust has no prototype pollution, but this trait is also
    /// used to adapt loggers embedded behind an FFI boundary into hosts
    /// that do, and dropping those keys here keeps the contract uniform.
    fn child(&self, bindings: &[(&str, &dyn Debug)]) -> Box<dyn ResilienceLogger>;
}

fn sanitized_bindings<'a>(bindings: &[(&'a str, &'a dyn Debug)]) -> Vec<(String, String)> {
    const DROPPED: [&str; 3] = ["__proto__", "constructor", "prototype"];
    bindings
        .iter()
        .filter(|(key, _)| !DROPPED.contains(key))
        .map(|(key, value)| (key.to_string(), format!("{value:?}")))
        .collect()
}

/// A [`ResilienceLogger`] that forwards to the `tracing` crate.
#[derive(Clone, Default)]
pub struct TracingLogger {
    bindings: Vec<(String, String)>,
}

impl TracingLogger {
    /// Creates a new tracing-backed logger with no bound fields.
    pub fn new() -> Self {
        Self::default()
    }

    fn format_fields(&self, fields: &[(&str, &dyn Debug)]) -> String {
        let mut parts: Vec<String> = self
            .bindings
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        parts.extend(
            sanitized_bindings(fields)
                .into_iter()
                .map(|(k, v)| format!("{k}={v}")),
        );
        parts.join(" ")
    }
}

impl ResilienceLogger for TracingLogger {
    fn debug(&self, msg: &str, fields: &[(&str, &dyn Debug)]) {
        tracing_shim::debug(msg, &self.format_fields(fields));
    }

    fn info(&self, msg: &str, fields: &[(&str, &dyn Debug)]) {
        tracing_shim::info(msg, &self.format_fields(fields));
    }

    fn warn(&self, msg: &str, fields: &[(&str, &dyn Debug)]) {
        tracing_shim::warn(msg, &self.format_fields(fields));
    }

    fn error(&self, msg: &str, fields: &[(&str, &dyn Debug)]) {
        tracing_shim::error(msg, &self.format_fields(fields));
    }

    fn child(&self, bindings: &[(&str, &dyn Debug)]) -> Box<dyn ResilienceLogger> {
        let mut merged = self.bindings.clone();
        merged.extend(sanitized_bindings(bindings));
        Box::new(TracingLogger { bindings: merged })
    }
}

#[cfg(feature = "tracing")]
mod tracing_shim {
    pub fn debug(msg: &str, fields: &str) {
        tracing::debug!(fields = %fields, "{msg}");
    }
    pub fn info(msg: &str, fields: &str) {
        tracing::info!(fields = %fields, "{msg}");
    }
    pub fn warn(msg: &str, fields: &str) {
        tracing::warn!(fields = %fields, "{msg}");
    }
    pub fn error(msg: &str, fields: &str) {
        tracing::error!(fields = %fields, "{msg}");
    }
}

#[cfg(not(feature = "tracing"))]
mod tracing_shim {
    pub fn debug(_msg: &str, _fields: &str) {}
    pub fn info(_msg: &str, _fields: &str) {}
    pub fn warn(_msg: &str, _fields: &str) {}
    pub fn error(_msg: &str, _fields: &str) {}
}

/// A [`ResilienceLogger`] that discards everything. Used as the default
/// when the `tracing` feature is disabled and no logger is supplied.
#[derive(Clone, Copy, Default)]
pub struct NoopLogger;

impl ResilienceLogger for NoopLogger {
    fn debug(&self, _msg: &str, _fields: &[(&str, &dyn Debug)]) {}
    fn info(&self, _msg: &str, _fields: &[(&str, &dyn Debug)]) {}
    fn warn(&self, _msg: &str, _fields: &[(&str, &dyn Debug)]) {}
    fn error(&self, _msg: &str, _fields: &[(&str, &dyn Debug)]) {}

    fn child(&self, _bindings: &[(&str, &dyn Debug)]) -> Box<dyn ResilienceLogger> {
        Box::new(NoopLogger)
    }
}
