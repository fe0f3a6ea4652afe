//! Metrics facade for gridkernel.
//!
//! Provides a [`MetricsRecorder`] trait with domain-specific methods and default
//! no-op implementations. A global singleton recorder is accessed via
//! `recorder()`, and convenience free functions delegate to it.
//!
//! # Usage
//!
//! Callers record metrics via free functions:
//! ```ignore
//! gridkernel_metrics::record_nodes_created("iaf", 100);
//! gridkernel_metrics::record_sweep("prepare", 4_000, 0.012);
//! ```
//!
//! At startup, an embedding application may install a backend with
//! [`set_global_recorder`]. Until then every call is a no-op.

use std::sync::OnceLock;

// ═══════════════════════════════════════════════════════════════════════
// Trait
// ═══════════════════════════════════════════════════════════════════════

/// Domain-specific metrics recording trait.
///
/// All methods have default no-op implementations so backends only need
/// to override the metrics they care about.
#[allow(unused_variables)]
pub trait MetricsRecorder: Send + Sync + 'static {
    // ── Registry ─────────────────────────────────────────────────────

    /// Record a creation batch.
    fn record_nodes_created(&self, model: &str, count: u64) {}

    /// Set the number of element instances hosted by this process.
    fn set_local_nodes(&self, count: usize) {}

    /// Record a completed lifecycle sweep.
    fn record_sweep(&self, phase: &str, elements: usize, latency_secs: f64) {}

    /// Record faults raised by element hooks during a sweep.
    fn record_sweep_faults(&self, phase: &str, count: usize) {}

    /// Record a waveform-relaxation repartition.
    fn record_wfr_repartition(&self, nodes: usize) {}

    // ── Consistent views ─────────────────────────────────────────────

    /// Record an all-gather exchange.
    fn record_gather(&self, bytes_sent: usize, bytes_received: usize, latency_secs: f64) {}

    /// Record duplicate records dropped during canonicalization.
    fn record_duplicates_dropped(&self, count: usize) {}

    /// Record a same-GID, different-payload conflict.
    fn record_view_conflict(&self) {}
}

// ═══════════════════════════════════════════════════════════════════════
// Global singleton
// ═══════════════════════════════════════════════════════════════════════

struct NoopRecorder;
impl MetricsRecorder for NoopRecorder {}

static RECORDER: OnceLock<Box<dyn MetricsRecorder>> = OnceLock::new();

/// Install a global metrics recorder.
///
/// Can only be called once. Subsequent calls are silently ignored.
pub fn set_global_recorder(recorder: Box<dyn MetricsRecorder>) {
    let _ = RECORDER.set(recorder);
}

/// Get the global metrics recorder.
///
/// Returns a no-op recorder if none has been installed.
#[inline]
fn recorder() -> &'static dyn MetricsRecorder {
    RECORDER.get().map(|r| r.as_ref()).unwrap_or(&NoopRecorder)
}

// ═══════════════════════════════════════════════════════════════════════
// Convenience free functions
// ═══════════════════════════════════════════════════════════════════════

// ── Registry ─────────────────────────────────────────────────────────

/// Record a creation batch.
#[inline]
pub fn record_nodes_created(model: &str, count: u64) {
    recorder().record_nodes_created(model, count);
}

/// Set the number of element instances hosted by this process.
#[inline]
pub fn set_local_nodes(count: usize) {
    recorder().set_local_nodes(count);
}

/// Record a completed lifecycle sweep.
#[inline]
pub fn record_sweep(phase: &str, elements: usize, latency_secs: f64) {
    recorder().record_sweep(phase, elements, latency_secs);
}

/// Record faults raised by element hooks during a sweep.
#[inline]
pub fn record_sweep_faults(phase: &str, count: usize) {
    recorder().record_sweep_faults(phase, count);
}

/// Record a waveform-relaxation repartition.
#[inline]
pub fn record_wfr_repartition(nodes: usize) {
    recorder().record_wfr_repartition(nodes);
}

// ── Consistent views ─────────────────────────────────────────────────

/// Record an all-gather exchange.
#[inline]
pub fn record_gather(bytes_sent: usize, bytes_received: usize, latency_secs: f64) {
    recorder().record_gather(bytes_sent, bytes_received, latency_secs);
}

/// Record duplicate records dropped during canonicalization.
#[inline]
pub fn record_duplicates_dropped(count: usize) {
    recorder().record_duplicates_dropped(count);
}

/// Record a same-GID, different-payload conflict.
#[inline]
pub fn record_view_conflict() {
    recorder().record_view_conflict();
}
