// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! kond-telemetry
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The runtime emits exactly two capabilities: a [`Logger`] and a
//! [`MetricsCollector`], paired into [`Hooks`]. Both default to no-ops.
//! Hooks must be synchronous and non-blocking; hosts bridging to async
//! sinks buffer internally. A panicking hook is caught at the dispatch
//! site and logged — it never affects evaluation.

use kond_core::{DecisionKind, EvaluationMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log severity, host-mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Diagnostic detail (per-evaluation reporting).
    Debug,
    /// Lifecycle events.
    Info,
    /// Recoverable problems (rejected snapshots, shadow mismatches).
    Warn,
    /// Hook failures and programming-error adjacent conditions.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Host-facing logging capability.
///
/// Messages are built lazily: [`log`](Logger::log) receives a closure so
/// disabled levels cost nothing but the `enabled` check.
pub trait Logger: Send + Sync {
    /// Whether the level is worth formatting a message for.
    fn enabled(&self, level: LogLevel) -> bool;

    /// Emit a message, with an optional causing error.
    fn log(
        &self,
        level: LogLevel,
        message: &dyn Fn() -> String,
        error: Option<&(dyn std::error::Error + 'static)>,
    );
}

/// Discards everything; reports every level disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn enabled(&self, _level: LogLevel) -> bool {
        false
    }

    fn log(
        &self,
        _level: LogLevel,
        _message: &dyn Fn() -> String,
        _error: Option<&(dyn std::error::Error + 'static)>,
    ) {
    }
}

/// Bridges the hook into the host's `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn enabled(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Debug => tracing::enabled!(tracing::Level::DEBUG),
            LogLevel::Info => tracing::enabled!(tracing::Level::INFO),
            LogLevel::Warn => tracing::enabled!(tracing::Level::WARN),
            LogLevel::Error => tracing::enabled!(tracing::Level::ERROR),
        }
    }

    fn log(
        &self,
        level: LogLevel,
        message: &dyn Fn() -> String,
        error: Option<&(dyn std::error::Error + 'static)>,
    ) {
        if !self.enabled(level) {
            return;
        }
        let rendered = message();
        let cause = error.map(|e| e.to_string());
        let cause = cause.as_deref();
        match level {
            LogLevel::Debug => tracing::debug!(cause, "{rendered}"),
            LogLevel::Info => tracing::info!(cause, "{rendered}"),
            LogLevel::Warn => tracing::warn!(cause, "{rendered}"),
            LogLevel::Error => tracing::error!(cause, "{rendered}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Metric records
// ---------------------------------------------------------------------------

/// One evaluation, as reported to metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Namespace evaluated against.
    pub namespace_id: String,
    /// Canonical feature id.
    pub feature_key: String,
    /// Live or shadow.
    pub mode: EvaluationMode,
    /// How the value was decided.
    pub decision: DecisionKind,
    /// Snapshot version label, if any.
    pub config_version: Option<String>,
    /// Wall-clock duration.
    pub duration_ns: u64,
}

/// One configuration load (or rejected load attempt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigLoadRecord {
    /// Namespace loaded into.
    pub namespace_id: String,
    /// Definitions in the incoming snapshot (0 for rejected input).
    pub feature_count: usize,
    /// Incoming snapshot version label, if any.
    pub version: Option<String>,
    /// Whether the snapshot was installed.
    pub success: bool,
}

/// One rollback attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRollbackRecord {
    /// Namespace rolled back.
    pub namespace_id: String,
    /// Steps requested.
    pub steps: usize,
    /// Whether history was deep enough.
    pub success: bool,
    /// Version label of the installed snapshot on success.
    pub version: Option<String>,
}

/// Host-facing metrics capability.
pub trait MetricsCollector: Send + Sync {
    /// Called after every evaluation, in both modes.
    fn record_evaluation(&self, record: &EvaluationRecord);

    /// Called after every load attempt, successful or rejected.
    fn record_config_load(&self, record: &ConfigLoadRecord);

    /// Called after every rollback attempt.
    fn record_config_rollback(&self, record: &ConfigRollbackRecord);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsCollector for NoopMetrics {
    fn record_evaluation(&self, _record: &EvaluationRecord) {}
    fn record_config_load(&self, _record: &ConfigLoadRecord) {}
    fn record_config_rollback(&self, _record: &ConfigRollbackRecord) {}
}

/// Thread-safe collector that retains every record.
///
/// Clone freely; clones share storage. Meant for tests and small hosts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetrics {
    evaluations: Arc<Mutex<Vec<EvaluationRecord>>>,
    loads: Arc<Mutex<Vec<ConfigLoadRecord>>>,
    rollbacks: Arc<Mutex<Vec<ConfigRollbackRecord>>>,
}

impl InMemoryMetrics {
    /// A new, empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every evaluation recorded so far.
    pub fn evaluations(&self) -> Vec<EvaluationRecord> {
        self.evaluations.lock().expect("metrics lock poisoned").clone()
    }

    /// Every load recorded so far.
    pub fn loads(&self) -> Vec<ConfigLoadRecord> {
        self.loads.lock().expect("metrics lock poisoned").clone()
    }

    /// Every rollback recorded so far.
    pub fn rollbacks(&self) -> Vec<ConfigRollbackRecord> {
        self.rollbacks.lock().expect("metrics lock poisoned").clone()
    }

    /// Drop everything recorded.
    pub fn clear(&self) {
        self.evaluations.lock().expect("metrics lock poisoned").clear();
        self.loads.lock().expect("metrics lock poisoned").clear();
        self.rollbacks.lock().expect("metrics lock poisoned").clear();
    }
}

impl MetricsCollector for InMemoryMetrics {
    fn record_evaluation(&self, record: &EvaluationRecord) {
        self.evaluations
            .lock()
            .expect("metrics lock poisoned")
            .push(record.clone());
    }

    fn record_config_load(&self, record: &ConfigLoadRecord) {
        self.loads
            .lock()
            .expect("metrics lock poisoned")
            .push(record.clone());
    }

    fn record_config_rollback(&self, record: &ConfigRollbackRecord) {
        self.rollbacks
            .lock()
            .expect("metrics lock poisoned")
            .push(record.clone());
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// The logger/metrics pair a namespace dispatches into.
///
/// Every dispatch runs under `catch_unwind`: a panicking hook is reported
/// via `tracing::error!` and swallowed.
#[derive(Clone)]
pub struct Hooks {
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn MetricsCollector>,
}

impl Hooks {
    /// Pair a logger with a metrics collector.
    pub fn new(logger: Arc<dyn Logger>, metrics: Arc<dyn MetricsCollector>) -> Self {
        Self { logger, metrics }
    }

    /// No-op logger and metrics.
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopLogger), Arc::new(NoopMetrics))
    }

    /// The logger half.
    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    /// The metrics half.
    pub fn metrics(&self) -> &dyn MetricsCollector {
        self.metrics.as_ref()
    }

    /// Dispatch an evaluation record, isolating panics.
    pub fn emit_evaluation(&self, record: &EvaluationRecord) {
        guard("record_evaluation", || self.metrics.record_evaluation(record));
    }

    /// Dispatch a load record, isolating panics.
    pub fn emit_config_load(&self, record: &ConfigLoadRecord) {
        guard("record_config_load", || self.metrics.record_config_load(record));
    }

    /// Dispatch a rollback record, isolating panics.
    pub fn emit_config_rollback(&self, record: &ConfigRollbackRecord) {
        guard("record_config_rollback", || {
            self.metrics.record_config_rollback(record)
        });
    }

    /// Log at debug if the host enabled it, isolating panics.
    pub fn debug(&self, message: impl Fn() -> String) {
        self.dispatch_log(LogLevel::Debug, &message, None);
    }

    /// Log at info, isolating panics.
    pub fn info(&self, message: impl Fn() -> String) {
        self.dispatch_log(LogLevel::Info, &message, None);
    }

    /// Log at warn with an optional cause, isolating panics.
    pub fn warn(
        &self,
        message: impl Fn() -> String,
        error: Option<&(dyn std::error::Error + 'static)>,
    ) {
        self.dispatch_log(LogLevel::Warn, &message, error);
    }

    fn dispatch_log(
        &self,
        level: LogLevel,
        message: &dyn Fn() -> String,
        error: Option<&(dyn std::error::Error + 'static)>,
    ) {
        if !self.logger.enabled(level) {
            return;
        }
        guard("log", || self.logger.log(level, message, error));
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

/// Run a hook, converting a panic into an error log.
fn guard(what: &'static str, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        tracing::error!(hook = what, "hook panicked; evaluation unaffected");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
