use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// Metadata samples kept per operation; older samples are dropped first.
pub const MAX_SAMPLES: usize = 100;

#[derive(Debug, Clone)]
struct OperationMetric {
    count: u64,
    total: f64,
    min: f64,
    max: f64,
    last: f64,
    last_timestamp: DateTime<Utc>,
    samples: VecDeque<JsonValue>,
}

/// Aggregated timings for one operation, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: u64,
    pub total_duration: f64,
    pub avg_duration: f64,
    pub min_duration: f64,
    pub max_duration: f64,
    pub last_duration: f64,
    pub last_timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<JsonValue>,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Per-operation timing accumulator.
///
/// Created once per process and shared by `Arc` with whatever needs to
/// record timings.
#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    operations: Mutex<BTreeMap<String, OperationMetric>>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // Timings are advisory; a poisoned lock still holds usable data.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, OperationMetric>> {
        self.operations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, operation: &str, duration: Duration, metadata: Option<Map<String, JsonValue>>) {
        let seconds = duration.as_secs_f64();
        let now = Utc::now();
        let mut operations = self.lock();
        let metric = operations
            .entry(operation.to_string())
            .or_insert_with(|| OperationMetric {
                count: 0,
                total: 0.0,
                min: f64::INFINITY,
                max: 0.0,
                last: 0.0,
                last_timestamp: now,
                samples: VecDeque::new(),
            });
        metric.count += 1;
        metric.total += seconds;
        metric.min = metric.min.min(seconds);
        metric.max = metric.max.max(seconds);
        metric.last = seconds;
        metric.last_timestamp = now;
        if let Some(mut sample) = metadata {
            sample.insert("timestamp".to_string(), JsonValue::String(now.to_rfc3339()));
            sample.insert("duration".to_string(), JsonValue::from(seconds));
            if metric.samples.len() == MAX_SAMPLES {
                metric.samples.pop_front();
            }
            metric.samples.push_back(JsonValue::Object(sample));
        }
        tracing::debug!(operation, duration = seconds, "metric recorded");
    }

    pub fn get(&self, operation: &str) -> Option<MetricSummary> {
        self.lock().get(operation).map(summarize)
    }

    pub fn snapshot(&self) -> BTreeMap<String, MetricSummary> {
        self.lock()
            .iter()
            .map(|(name, metric)| (name.clone(), summarize(metric)))
            .collect()
    }

    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            tracing::info!("no performance metrics recorded");
            return;
        }
        for (operation, summary) in &snapshot {
            tracing::info!(
                operation = %operation,
                count = summary.count,
                avg = summary.avg_duration,
                min = summary.min_duration,
                max = summary.max_duration,
                "performance summary"
            );
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Start timing `operation`; the elapsed time is recorded when the
    /// returned guard is stopped or dropped.
    pub fn start(self: &Arc<Self>, operation: impl Into<String>) -> Stopwatch {
        Stopwatch {
            metrics: Arc::clone(self),
            operation: operation.into(),
            started: Instant::now(),
            metadata: None,
            recorded: false,
        }
    }
}

fn summarize(metric: &OperationMetric) -> MetricSummary {
    let count = metric.count.max(1) as f64;
    MetricSummary {
        count: metric.count,
        total_duration: round3(metric.total),
        avg_duration: round3(metric.total / count),
        min_duration: round3(metric.min),
        max_duration: round3(metric.max),
        last_duration: round3(metric.last),
        last_timestamp: metric.last_timestamp,
        samples: metric.samples.iter().cloned().collect(),
    }
}

/// Guard that records its lifetime into a metrics context.
#[derive(Debug)]
pub struct Stopwatch {
    metrics: Arc<PerformanceMetrics>,
    operation: String,
    started: Instant,
    metadata: Option<Map<String, JsonValue>>,
    recorded: bool,
}

impl Stopwatch {
    pub fn with_metadata(mut self, metadata: Map<String, JsonValue>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record now and return the elapsed time.
    pub fn stop(mut self) -> Duration {
        self.finish()
    }

    fn finish(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.recorded {
            self.recorded = true;
            self.metrics
                .record(&self.operation, elapsed, self.metadata.take());
            tracing::info!(
                operation = %self.operation,
                duration = elapsed.as_secs_f64(),
                "operation completed"
            );
        }
        elapsed
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_durations_per_operation() {
        let metrics = PerformanceMetrics::new();
        metrics.record("extract", Duration::from_millis(500), None);
        metrics.record("extract", Duration::from_millis(1500), None);
        metrics.record("load", Duration::from_millis(250), None);

        let extract = metrics.get("extract").expect("extract metric");
        assert_eq!(extract.count, 2);
        assert_eq!(extract.total_duration, 2.0);
        assert_eq!(extract.avg_duration, 1.0);
        assert_eq!(extract.min_duration, 0.5);
        assert_eq!(extract.max_duration, 1.5);
        assert_eq!(extract.last_duration, 1.5);

        assert_eq!(metrics.snapshot().len(), 2);
        metrics.clear();
        assert!(metrics.snapshot().is_empty());
        assert!(metrics.get("extract").is_none());
    }

    #[test]
    fn metadata_samples_carry_timing() {
        let metrics = PerformanceMetrics::new();
        let mut metadata = Map::new();
        metadata.insert("table".to_string(), JsonValue::from("permits"));
        metrics.record("query", Duration::from_millis(100), Some(metadata));

        let summary = metrics.get("query").expect("query metric");
        assert_eq!(summary.samples.len(), 1);
        assert_eq!(summary.samples[0]["table"], JsonValue::from("permits"));
        assert!(summary.samples[0].get("duration").is_some());
    }

    #[test]
    fn samples_keep_only_the_most_recent() {
        let metrics = PerformanceMetrics::new();
        for run in 0..MAX_SAMPLES + 5 {
            let mut metadata = Map::new();
            metadata.insert("run".to_string(), JsonValue::from(run));
            metrics.record("load", Duration::from_millis(1), Some(metadata));
        }

        let summary = metrics.get("load").expect("load metric");
        assert_eq!(summary.count, (MAX_SAMPLES + 5) as u64);
        assert_eq!(summary.samples.len(), MAX_SAMPLES);
        assert_eq!(summary.samples[0]["run"], JsonValue::from(5));
        assert_eq!(summary.samples[MAX_SAMPLES - 1]["run"], JsonValue::from(MAX_SAMPLES + 4));
    }

    #[test]
    fn stopwatch_records_once_on_stop_or_drop() {
        let metrics = PerformanceMetrics::shared();
        let watch = metrics.start("phase");
        watch.stop();
        {
            let _watch = metrics.start("phase");
        }
        assert_eq!(metrics.get("phase").expect("phase").count, 2);
    }
}
