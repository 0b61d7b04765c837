// SPDX-License-Identifier: MPL-2.0
//! Named timing traces and directly recorded metrics.
//!
//! A trace is opened with [`PerformanceMonitor::start_trace`] and closed with
//! [`PerformanceMonitor::stop_trace`], which turns it into a completed
//! [`PerformanceMetric`]. Durations come from a monotonic clock; the wall-clock
//! end time is derived from the start time plus that duration, so
//! `end_time - start_time == duration_ms` holds for every closed trace.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::buffer::{BufferCapacity, PersistentRingBuffer};
use crate::application::port::{FlushBatch, KeyValueStore, RemoteSink};
use crate::domain::diagnostics::{TagValue, Tags};
use crate::infrastructure::PersisterHandle;

/// Store key holding the serialized metric buffer.
pub const PERFORMANCE_METRICS_KEY: &str = "app_vitals.performance.metrics";
/// Store key holding `{ enabled }`.
pub const PERFORMANCE_SETTINGS_KEY: &str = "app_vitals.performance.settings";

/// A completed measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Tags,
}

/// A trace that has been started but not yet stopped.
#[derive(Debug, Clone)]
pub struct ActiveTrace {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub attributes: Tags,
    started_at: Instant,
}

impl ActiveTrace {
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// What `start_trace` does when a trace with the same name is already open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateTracePolicy {
    /// The new trace replaces the open one, which is discarded.
    #[default]
    Replace,
    /// The open trace keeps running and the new start is ignored.
    KeepExisting,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct MonitorSettings {
    enabled: bool,
}

/// Tuning knobs taken from [`crate::config::Config`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceOptions {
    pub duplicate_policy: DuplicateTracePolicy,
    /// Open traces older than this are dropped on the next `start_trace`.
    pub stale_after: Option<Duration>,
}

/// Records timings into a bounded, persisted metric buffer.
pub struct PerformanceMonitor {
    metrics: PersistentRingBuffer<PerformanceMetric>,
    active: Mutex<HashMap<String, ActiveTrace>>,
    enabled: RwLock<bool>,
    options: TraceOptions,
    persister: PersisterHandle,
    sink: Arc<dyn RemoteSink>,
}

impl PerformanceMonitor {
    pub async fn load(
        capacity: BufferCapacity,
        options: TraceOptions,
        store: &dyn KeyValueStore,
        persister: PersisterHandle,
        sink: Arc<dyn RemoteSink>,
    ) -> Self {
        let enabled = match store.get(PERFORMANCE_SETTINGS_KEY).await {
            Ok(Some(json)) => serde_json::from_str::<MonitorSettings>(&json)
                .map(|settings| settings.enabled)
                .unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "ignoring unreadable performance settings");
                    true
                }),
            Ok(None) => true,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load performance settings");
                true
            }
        };
        let metrics =
            PersistentRingBuffer::load(PERFORMANCE_METRICS_KEY, capacity, store, persister.clone())
                .await;

        Self {
            metrics,
            active: Mutex::new(HashMap::new()),
            enabled: RwLock::new(enabled),
            options,
            persister,
            sink,
        }
    }

    /// Opens a trace named `name` and returns the name as its handle.
    ///
    /// Ignored while disabled.
    pub fn start_trace(&self, name: impl Into<String>, attributes: Tags) -> String {
        let name = name.into();
        if !self.is_enabled() {
            return name;
        }
        if let Some(max_age) = self.options.stale_after {
            self.evict_stale_traces(max_age);
        }

        let trace = ActiveTrace {
            name: name.clone(),
            start_time: Utc::now(),
            attributes,
            started_at: Instant::now(),
        };

        let mut active = self.active.lock();
        match (active.contains_key(&name), self.options.duplicate_policy) {
            (true, DuplicateTracePolicy::KeepExisting) => {
                tracing::debug!(trace = %name, "trace already running, keeping it");
            }
            (true, DuplicateTracePolicy::Replace) => {
                tracing::warn!(trace = %name, "trace restarted before it was stopped");
                active.insert(name.clone(), trace);
            }
            (false, _) => {
                active.insert(name.clone(), trace);
            }
        }
        name
    }

    /// Closes the trace named `name` and records it.
    ///
    /// Returns the duration in milliseconds, or `None` if no such trace is
    /// open. While disabled, an open trace is discarded without recording.
    pub fn stop_trace(&self, name: &str, additional: Tags) -> Option<f64> {
        let trace = self.active.lock().remove(name)?;
        if !self.is_enabled() {
            return None;
        }

        let elapsed = trace.started_at.elapsed();
        let delta = TimeDelta::from_std(elapsed).unwrap_or_default();
        let duration_ms = elapsed.as_secs_f64() * 1000.0;

        let mut attributes = trace.attributes;
        attributes.extend(additional);

        tracing::debug!(trace = %trace.name, duration_ms, "trace stopped");
        self.metrics.push(PerformanceMetric {
            name: trace.name,
            start_time: trace.start_time,
            end_time: Some(trace.start_time + delta),
            duration_ms: Some(duration_ms),
            attributes,
        });
        Some(duration_ms)
    }

    /// Appends a metric with a known duration ending now.
    ///
    /// Negative or non-finite values are recorded as zero.
    pub fn record_metric(&self, name: impl Into<String>, value_ms: f64, attributes: Tags) {
        if !self.is_enabled() {
            return;
        }
        let name = name.into();
        let value_ms = if value_ms.is_finite() && value_ms >= 0.0 {
            value_ms
        } else {
            tracing::warn!(metric = %name, value_ms, "clamping invalid metric value to zero");
            0.0
        };

        let end_time = Utc::now();
        let (start_time, duration_ms) = span_ending_at(end_time, value_ms);
        if duration_ms < value_ms {
            tracing::warn!(metric = %name, value_ms, duration_ms, "metric duration out of range, clamped");
        }

        self.metrics.push(PerformanceMetric {
            name,
            start_time,
            end_time: Some(end_time),
            duration_ms: Some(duration_ms),
            attributes,
        });
    }

    /// Times `future`, closing the trace however it ends.
    ///
    /// The output is returned unchanged, so an `Err` from the future reaches
    /// the caller as-is. If the future panics or is dropped before
    /// completion, the trace is still closed and tagged `aborted = true`.
    pub async fn measure<F>(&self, name: &str, attributes: Tags, future: F) -> F::Output
    where
        F: Future,
    {
        let guard = self.trace_guard(name, attributes);
        let output = future.await;
        guard.finish(Tags::new());
        output
    }

    /// Synchronous counterpart of [`measure`](Self::measure).
    pub fn measure_sync<T>(&self, name: &str, attributes: Tags, operation: impl FnOnce() -> T) -> T {
        let guard = self.trace_guard(name, attributes);
        let output = operation();
        guard.finish(Tags::new());
        output
    }

    /// Starts a trace that is stopped when the guard is finished or dropped.
    pub fn trace_guard(&self, name: &str, attributes: Tags) -> TraceGuard<'_> {
        let name = self.start_trace(name, attributes);
        TraceGuard {
            monitor: self,
            name,
            finished: false,
        }
    }

    /// Drops open traces older than `max_age`. Returns how many were dropped.
    pub fn evict_stale_traces(&self, max_age: Duration) -> usize {
        let mut active = self.active.lock();
        let before = active.len();
        active.retain(|name, trace| {
            let stale = trace.elapsed() > max_age;
            if stale {
                tracing::warn!(trace = %name, "dropping trace that was never stopped");
            }
            !stale
        });
        before - active.len()
    }

    /// Copies of the currently open traces.
    #[must_use]
    pub fn active_traces(&self) -> Vec<ActiveTrace> {
        self.active.lock().values().cloned().collect()
    }

    #[must_use]
    pub fn active_trace_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Copy of the recorded metrics, oldest first.
    #[must_use]
    pub fn get_metrics(&self) -> Vec<PerformanceMetric> {
        self.metrics.snapshot()
    }

    /// Empties the metric buffer and its durable copy. Open traces are kept.
    pub fn clear_metrics(&self) {
        self.metrics.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Persists the flag while holding the lock, so the stored value always
    /// matches the last toggle.
    pub fn set_enabled(&self, enabled: bool) {
        let mut current = self.enabled.write();
        *current = enabled;
        match serde_json::to_string(&MonitorSettings { enabled }) {
            Ok(json) => self.persister.save(PERFORMANCE_SETTINGS_KEY, json),
            Err(err) => tracing::warn!(error = %err, "failed to serialize performance settings"),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.enabled.read()
    }

    /// Ships recorded metrics to the remote sink. Failed batches are kept.
    pub async fn flush(&self) {
        if !self.is_enabled() || self.metrics.is_empty() {
            return;
        }

        let batch = self.metrics.drain();
        let count = batch.len();
        match self.sink.ship(FlushBatch::Metrics(batch.clone())).await {
            Ok(()) => tracing::debug!(count, "flushed metrics"),
            Err(err) => {
                tracing::warn!(count, error = %err, "metric flush failed, keeping metrics");
                self.metrics.restore_front(batch);
            }
        }
    }
}

/// Closes its trace exactly once: on [`finish`](Self::finish) or on drop.
#[must_use = "dropping the guard stops the trace immediately"]
pub struct TraceGuard<'a> {
    monitor: &'a PerformanceMonitor,
    name: String,
    finished: bool,
}

impl TraceGuard<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the trace, merging `additional` into its attributes.
    pub fn finish(mut self, additional: Tags) -> Option<f64> {
        self.finished = true;
        self.monitor.stop_trace(&self.name, additional)
    }
}

impl Drop for TraceGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let aborted = Tags::from([("aborted".to_string(), TagValue::Bool(true))]);
            self.monitor.stop_trace(&self.name, aborted);
        }
    }
}

/// Start of a `value_ms` long span ending at `end_time`, with the duration
/// actually covered. Spans reaching past the earliest representable time
/// start there instead.
fn span_ending_at(end_time: DateTime<Utc>, value_ms: f64) -> (DateTime<Utc>, f64) {
    let start_time = Duration::try_from_secs_f64(value_ms / 1000.0)
        .ok()
        .and_then(|duration| TimeDelta::from_std(duration).ok())
        .and_then(|delta| end_time.checked_sub_signed(delta));
    match start_time {
        Some(start_time) => (start_time, value_ms),
        None => {
            let start_time = DateTime::<Utc>::MIN_UTC;
            (start_time, delta_ms(end_time - start_time))
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn delta_ms(delta: TimeDelta) -> f64 {
    delta.num_seconds() as f64 * 1000.0 + f64::from(delta.subsec_nanos()) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{MemoryStore, Persister, TracingSink};
    use approx::assert_relative_eq;
    use futures_util::FutureExt;
    use std::panic::AssertUnwindSafe;

    async fn monitor_with(
        store: &MemoryStore,
        persister: &Persister,
        options: TraceOptions,
    ) -> PerformanceMonitor {
        PerformanceMonitor::load(
            BufferCapacity::new(100),
            options,
            store,
            persister.handle(),
            Arc::new(TracingSink),
        )
        .await
    }

    async fn monitor() -> (PerformanceMonitor, Persister) {
        let store = MemoryStore::new();
        let persister = Persister::spawn(Arc::new(store.clone()));
        let monitor = monitor_with(&store, &persister, TraceOptions::default()).await;
        (monitor, persister)
    }

    #[tokio::test]
    async fn stop_trace_measures_elapsed_time() {
        let (monitor, _persister) = monitor().await;

        let handle = monitor.start_trace("load", Tags::new());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let duration = monitor
            .stop_trace(&handle, Tags::new())
            .expect("trace was open");

        assert!((30.0..300.0).contains(&duration), "duration {duration}");
        let metric = &monitor.get_metrics()[0];
        assert_eq!(metric.name, "load");
        assert_eq!(metric.duration_ms, Some(duration));
        let end = metric.end_time.expect("end time");
        let span_ms = (end - metric.start_time).num_microseconds().expect("fits") as f64 / 1000.0;
        assert_relative_eq!(span_ms, duration, epsilon = 0.01);
        assert_eq!(monitor.active_trace_count(), 0);
    }

    #[tokio::test]
    async fn stopping_unknown_trace_returns_none() {
        let (monitor, _persister) = monitor().await;
        assert_eq!(monitor.stop_trace("missing", Tags::new()), None);
        assert!(monitor.is_empty());
    }

    #[tokio::test]
    async fn attributes_are_merged_on_stop() {
        let (monitor, _persister) = monitor().await;

        monitor.start_trace("query", Tags::from([("table".to_string(), TagValue::from("users"))]));
        monitor.stop_trace("query", Tags::from([("rows".to_string(), TagValue::from(3))]));

        let attributes = &monitor.get_metrics()[0].attributes;
        assert_eq!(attributes.get("table"), Some(&TagValue::from("users")));
        assert_eq!(attributes.get("rows"), Some(&TagValue::from(3)));
    }

    #[tokio::test]
    async fn duplicate_start_follows_policy() {
        let store = MemoryStore::new();
        let persister = Persister::spawn(Arc::new(store.clone()));
        let keep = monitor_with(
            &store,
            &persister,
            TraceOptions {
                duplicate_policy: DuplicateTracePolicy::KeepExisting,
                stale_after: None,
            },
        )
        .await;

        keep.start_trace("t", Tags::from([("first".to_string(), TagValue::Bool(true))]));
        keep.start_trace("t", Tags::new());
        keep.stop_trace("t", Tags::new());
        assert!(keep.get_metrics()[0].attributes.contains_key("first"));

        let (replace, _persister) = monitor().await;
        replace.start_trace("t", Tags::from([("first".to_string(), TagValue::Bool(true))]));
        replace.start_trace("t", Tags::new());
        replace.stop_trace("t", Tags::new());
        assert!(!replace.get_metrics()[0].attributes.contains_key("first"));
        assert_eq!(replace.len(), 1);
    }

    #[tokio::test]
    async fn record_metric_clamps_durations_beyond_the_calendar() {
        let (monitor, _persister) = monitor().await;

        monitor.record_metric("huge", 1e16, Tags::new());
        monitor.record_metric("huger", 1e300, Tags::new());

        for metric in monitor.get_metrics() {
            let end = metric.end_time.expect("end time");
            let duration = metric.duration_ms.expect("duration");
            assert_eq!(metric.start_time, DateTime::<Utc>::MIN_UTC);
            assert!(duration < 1e16, "{} kept {duration}", metric.name);
            assert_relative_eq!(duration, delta_ms(end - metric.start_time), max_relative = 1e-12);
        }
    }

    #[tokio::test]
    async fn record_metric_clamps_invalid_values() {
        let (monitor, _persister) = monitor().await;

        monitor.record_metric("fps", 16.6, Tags::new());
        monitor.record_metric("bogus", -5.0, Tags::new());
        monitor.record_metric("nan", f64::NAN, Tags::new());

        let durations: Vec<_> = monitor
            .get_metrics()
            .iter()
            .map(|metric| metric.duration_ms)
            .collect();
        assert_eq!(durations, vec![Some(16.6), Some(0.0), Some(0.0)]);
    }

    #[tokio::test]
    async fn measure_returns_errors_unchanged_and_records() {
        let (monitor, _persister) = monitor().await;

        let result: Result<(), String> = monitor
            .measure("upload", Tags::new(), async { Err("network down".to_string()) })
            .await;

        assert_eq!(result, Err("network down".to_string()));
        assert_eq!(monitor.get_metrics().len(), 1);
        assert_eq!(monitor.active_trace_count(), 0);
    }

    #[tokio::test]
    async fn measure_closes_trace_on_panic() {
        let (monitor, _persister) = monitor().await;

        let outcome = AssertUnwindSafe(monitor.measure("explode", Tags::new(), async {
            panic!("measured panic");
        }))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert_eq!(monitor.active_trace_count(), 0);
        let metrics = monitor.get_metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].attributes.get("aborted"), Some(&TagValue::Bool(true)));
    }

    #[tokio::test]
    async fn measure_sync_times_closures() {
        let (monitor, _persister) = monitor().await;
        let value = monitor.measure_sync("sum", Tags::new(), || (1..=10).sum::<i32>());
        assert_eq!(value, 55);
        assert_eq!(monitor.get_metrics()[0].name, "sum");
    }

    #[tokio::test]
    async fn stale_traces_are_evicted() {
        let (monitor, _persister) = monitor().await;

        monitor.start_trace("forgotten", Tags::new());
        tokio::time::sleep(Duration::from_millis(20)).await;
        monitor.start_trace("fresh", Tags::new());

        assert_eq!(monitor.evict_stale_traces(Duration::from_millis(10)), 1);
        let names: Vec<_> = monitor.active_traces().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["fresh".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_toggles_persist_the_final_state() {
        let store = MemoryStore::new();
        let persister = Persister::spawn(Arc::new(store.clone()));
        let monitor = monitor_with(&store, &persister, TraceOptions::default()).await;

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let monitor = &monitor;
                scope.spawn(move || {
                    for step in 0..200 {
                        monitor.set_enabled((worker + step) % 2 == 0);
                    }
                });
            }
        });
        persister.handle().sync().await;

        let stored = store
            .snapshot()
            .get(PERFORMANCE_SETTINGS_KEY)
            .cloned()
            .expect("settings stored");
        let settings: MonitorSettings = serde_json::from_str(&stored).expect("settings json");
        assert_eq!(settings.enabled, monitor.is_enabled());
    }

    #[tokio::test]
    async fn disabled_monitor_records_nothing() {
        let (monitor, _persister) = monitor().await;

        monitor.set_enabled(false);
        monitor.start_trace("ignored", Tags::new());
        monitor.record_metric("ignored", 1.0, Tags::new());

        assert_eq!(monitor.active_trace_count(), 0);
        assert!(monitor.is_empty());
    }
}
