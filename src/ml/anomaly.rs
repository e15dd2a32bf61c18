//! Anomaly detection over search traffic metrics.
//!
//! [`MetricAnomalyDetector`] applies a z-score test to the latest
//! [`SearchMetric`] for four signals: query volume, latency, error rate and
//! click-through rate. The reference distribution is the baseline learned
//! from `timeSeriesMetrics` when one exists, otherwise the preceding points of
//! the window once it holds `min_samples` of them.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{SearchMetric, TrainingData};
use crate::error::Result;
use crate::ml::{ConfusionCounts, Evaluation, ModelKind, TrainableModel};

/// Detects anomalies in a window of recent metrics.
pub trait AnomalyCollaborator: Send + Sync + Debug {
    /// Inspect the newest metric of `window` (oldest first).
    fn detect(&self, window: &[SearchMetric]) -> Result<Vec<AnomalyEvent>>;

    fn name(&self) -> &str;
}

/// Configuration for anomaly detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyDetectionConfig {
    /// Number of standard deviations for anomaly threshold.
    pub anomaly_threshold_std: f64,
    /// Minimum samples required for anomaly detection.
    pub min_samples: usize,
    /// Number of recent metrics the window statistics cover.
    pub window_size: usize,
    pub detect_volume: bool,
    pub detect_latency: bool,
    pub detect_error_rate: bool,
    pub detect_click_through: bool,
}

impl Default for AnomalyDetectionConfig {
    fn default() -> Self {
        AnomalyDetectionConfig {
            anomaly_threshold_std: 2.0,
            min_samples: 10,
            window_size: 100,
            detect_volume: true,
            detect_latency: true,
            detect_error_rate: true,
            detect_click_through: true,
        }
    }
}

impl AnomalyDetectionConfig {
    /// Candidate configurations for hyperparameter tuning.
    pub fn tuning_grid(&self) -> Vec<Self> {
        [2.0, 2.5, 3.0]
            .into_iter()
            .map(|anomaly_threshold_std| AnomalyDetectionConfig {
                anomaly_threshold_std,
                ..self.clone()
            })
            .collect()
    }
}

/// Which signal an anomaly was raised on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    /// Unusual number of queries.
    QueryVolume,
    /// Response time spike.
    Latency,
    /// Error rate spike.
    ErrorRate,
    /// Click-through drop.
    ClickThrough,
}

impl AnomalyType {
    const ALL: [AnomalyType; 4] = [
        AnomalyType::QueryVolume,
        AnomalyType::Latency,
        AnomalyType::ErrorRate,
        AnomalyType::ClickThrough,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::QueryVolume => "query_volume",
            AnomalyType::Latency => "latency",
            AnomalyType::ErrorRate => "error_rate",
            AnomalyType::ClickThrough => "click_through",
        }
    }

    fn value(&self, metric: &SearchMetric) -> f64 {
        match self {
            AnomalyType::QueryVolume => metric.query_count as f64,
            AnomalyType::Latency => metric.average_response_time,
            AnomalyType::ErrorRate => metric.error_rate,
            AnomalyType::ClickThrough => metric.click_through_rate,
        }
    }

    /// Whether deviation `z` is anomalous for this signal.
    fn is_anomalous(&self, z: f64, threshold: f64) -> bool {
        match self {
            AnomalyType::QueryVolume => z.abs() > threshold,
            AnomalyType::Latency | AnomalyType::ErrorRate => z > threshold,
            AnomalyType::ClickThrough => z < -threshold,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AnomalyType::QueryVolume => "Unusual query volume detected",
            AnomalyType::Latency => "Unusual response time detected",
            AnomalyType::ErrorRate => "Error rate spike detected",
            AnomalyType::ClickThrough => "Click-through rate drop detected",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anomaly event data structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyEvent {
    /// Type of anomaly detected.
    pub anomaly_type: AnomalyType,
    /// Severity score (0.0 - 1.0).
    pub severity: f64,
    /// Human-readable message.
    pub message: String,
    /// Additional details about the anomaly.
    pub details: HashMap<String, String>,
    /// Timestamp of the offending metric.
    pub timestamp: DateTime<Utc>,
}

/// Count-bounded moving mean and standard deviation.
#[derive(Debug, Clone)]
pub(crate) struct MovingStatistics {
    values: VecDeque<f64>,
    capacity: usize,
    sum: f64,
    sum_squared: f64,
}

impl MovingStatistics {
    pub(crate) fn new(capacity: usize) -> Self {
        MovingStatistics {
            values: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            sum: 0.0,
            sum_squared: 0.0,
        }
    }

    pub(crate) fn add_value(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
                self.sum_squared -= old * old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
        self.sum_squared += value * value;
    }

    pub(crate) fn sample_count(&self) -> usize {
        self.values.len()
    }

    pub(crate) fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f64
        }
    }

    pub(crate) fn std_deviation(&self) -> f64 {
        let n = self.values.len();
        if n <= 1 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = (self.sum_squared / n as f64) - (mean * mean);
        variance.max(0.0).sqrt()
    }

    fn baseline(&self) -> Baseline {
        Baseline {
            mean: self.mean(),
            std_dev: self.std_deviation(),
            samples: self.sample_count(),
        }
    }
}

/// Reference distribution of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    pub std_dev: f64,
    pub samples: usize,
}

#[derive(Serialize, Deserialize)]
struct DetectorSnapshot {
    config: AnomalyDetectionConfig,
    baselines: HashMap<AnomalyType, Baseline>,
    trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
}

/// Z-score detector over search metrics.
#[derive(Debug, Clone)]
pub struct MetricAnomalyDetector {
    config: AnomalyDetectionConfig,
    baselines: HashMap<AnomalyType, Baseline>,
    trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
}

impl MetricAnomalyDetector {
    pub fn new(config: AnomalyDetectionConfig) -> Self {
        MetricAnomalyDetector {
            config,
            baselines: HashMap::new(),
            trained_at: None,
            training_samples: 0,
        }
    }

    pub fn config(&self) -> &AnomalyDetectionConfig {
        &self.config
    }

    pub fn baseline(&self, anomaly_type: AnomalyType) -> Option<&Baseline> {
        self.baselines.get(&anomaly_type)
    }

    fn enabled(&self, anomaly_type: AnomalyType) -> bool {
        match anomaly_type {
            AnomalyType::QueryVolume => self.config.detect_volume,
            AnomalyType::Latency => self.config.detect_latency,
            AnomalyType::ErrorRate => self.config.detect_error_rate,
            AnomalyType::ClickThrough => self.config.detect_click_through,
        }
    }

    /// Check `latest` against learned baselines, or against `history`
    /// statistics for signals without one.
    fn check(&self, latest: &SearchMetric, history: &[SearchMetric]) -> Vec<AnomalyEvent> {
        let threshold = self.config.anomaly_threshold_std;
        let start = history.len().saturating_sub(self.config.window_size);
        let recent = &history[start..];

        let mut events = Vec::new();
        for anomaly_type in AnomalyType::ALL {
            if !self.enabled(anomaly_type) {
                continue;
            }
            let baseline = match self.baselines.get(&anomaly_type) {
                Some(baseline) => *baseline,
                None => {
                    let mut stats = MovingStatistics::new(self.config.window_size);
                    for metric in recent.iter().filter(|m| !m.is_anomaly) {
                        stats.add_value(anomaly_type.value(metric));
                    }
                    stats.baseline()
                }
            };
            if baseline.samples < self.config.min_samples || baseline.std_dev <= 0.0 {
                continue;
            }

            let value = anomaly_type.value(latest);
            let z_score = (value - baseline.mean) / baseline.std_dev;
            if anomaly_type.is_anomalous(z_score, threshold) {
                events.push(AnomalyEvent {
                    anomaly_type,
                    severity: (z_score.abs() / (2.0 * threshold)).min(1.0),
                    message: anomaly_type.message().to_string(),
                    details: HashMap::from([
                        ("value".to_string(), format!("{value:.4}")),
                        ("expected_mean".to_string(), format!("{:.4}", baseline.mean)),
                        ("z_score".to_string(), format!("{z_score:.2}")),
                    ]),
                    timestamp: latest.timestamp,
                });
            }
        }
        events
    }
}

impl Default for MetricAnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyDetectionConfig::default())
    }
}

impl AnomalyCollaborator for MetricAnomalyDetector {
    fn detect(&self, window: &[SearchMetric]) -> Result<Vec<AnomalyEvent>> {
        match window.split_last() {
            Some((latest, history)) => Ok(self.check(latest, history)),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &str {
        "z_score"
    }
}

impl TrainableModel for MetricAnomalyDetector {
    fn kind(&self) -> ModelKind {
        ModelKind::AnomalyDetection
    }

    fn train(&mut self, data: &TrainingData) -> Result<Evaluation> {
        let metrics = &data.metadata.time_series_metrics;
        let mut baselines = HashMap::new();
        for anomaly_type in AnomalyType::ALL {
            let mut stats = MovingStatistics::new(metrics.len().max(1));
            for metric in metrics.iter().filter(|m| !m.is_anomaly) {
                stats.add_value(anomaly_type.value(metric));
            }
            if stats.sample_count() >= self.config.min_samples {
                baselines.insert(anomaly_type, stats.baseline());
            }
        }
        self.baselines = baselines;
        self.training_samples = metrics.len();
        self.trained_at = Some(Utc::now());
        log::debug!(
            "Anomaly detector trained on {} metrics, {} baselines",
            metrics.len(),
            self.baselines.len()
        );
        Ok(self.evaluate(data))
    }

    fn evaluate(&self, data: &TrainingData) -> Evaluation {
        let metrics = &data.metadata.time_series_metrics;
        let mut counts = ConfusionCounts::default();
        let mut raised: HashMap<AnomalyType, f64> = HashMap::new();
        for (i, metric) in metrics.iter().enumerate() {
            let events = self.check(metric, &metrics[..i]);
            for event in &events {
                *raised.entry(event.anomaly_type).or_insert(0.0) += 1.0;
            }
            counts.record(!events.is_empty(), metric.is_anomaly);
        }
        let total: f64 = raised.values().sum();
        let importance: Vec<(&str, f64)> = if total > 0.0 {
            AnomalyType::ALL
                .iter()
                .map(|t| (t.as_str(), raised.get(t).copied().unwrap_or(0.0) / total))
                .collect()
        } else {
            Vec::new()
        };
        Evaluation::from_confusion(counts).with_feature_importance(&importance)
    }

    fn is_trained(&self) -> bool {
        self.trained_at.is_some()
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = DetectorSnapshot {
            config: self.config.clone(),
            baselines: self.baselines.clone(),
            trained_at: self.trained_at,
            training_samples: self.training_samples,
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        let snapshot: DetectorSnapshot = bincode::deserialize(bytes)?;
        self.config = snapshot.config;
        self.baselines = snapshot.baselines;
        self.trained_at = snapshot.trained_at;
        self.training_samples = snapshot.training_samples;
        Ok(())
    }

    fn size_hint(&self) -> usize {
        std::mem::size_of::<Self>() + self.baselines.len() * std::mem::size_of::<Baseline>()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::data::TrainingMetadata;

    fn metric(i: i64, latency: f64, anomaly: bool) -> SearchMetric {
        SearchMetric {
            timestamp: Utc::now() - Duration::minutes(100 - i),
            query_count: 100 + (i % 3) as u64,
            average_response_time: latency,
            error_rate: 0.01,
            click_through_rate: 0.3 + (i % 2) as f64 * 0.02,
            is_anomaly: anomaly,
        }
    }

    fn steady_window(n: i64) -> Vec<SearchMetric> {
        (0..n)
            .map(|i| metric(i, 50.0 + (i % 5) as f64, false))
            .collect()
    }

    #[test]
    fn test_moving_statistics() {
        let mut stats = MovingStatistics::new(3);
        stats.add_value(10.0);
        stats.add_value(20.0);
        stats.add_value(30.0);
        assert_eq!(stats.sample_count(), 3);
        assert_eq!(stats.mean(), 20.0);
        assert!(stats.std_deviation() > 0.0);

        stats.add_value(40.0);
        assert_eq!(stats.sample_count(), 3);
        assert_eq!(stats.mean(), 30.0);
    }

    #[test]
    fn test_needs_min_samples() {
        let detector = MetricAnomalyDetector::default();
        let mut window = steady_window(5);
        window.push(metric(5, 5000.0, false));
        assert!(detector.detect(&window).unwrap().is_empty());
        assert!(detector.detect(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_latency_spike_from_window() {
        let detector = MetricAnomalyDetector::default();
        let mut window = steady_window(20);
        window.push(metric(20, 500.0, false));

        let events = detector.detect(&window).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].anomaly_type, AnomalyType::Latency);
        assert!(events[0].severity > 0.0 && events[0].severity <= 1.0);
        assert!(events[0].details.contains_key("z_score"));
    }

    #[test]
    fn test_click_through_drop() {
        let detector = MetricAnomalyDetector::default();
        let mut window = steady_window(20);
        let mut last = metric(20, 52.0, false);
        last.click_through_rate = 0.0;
        window.push(last);

        let events = detector.detect(&window).unwrap();
        assert!(events.iter().any(|e| e.anomaly_type == AnomalyType::ClickThrough));
    }

    #[test]
    fn test_trained_baseline_and_evaluation() {
        let mut metrics = steady_window(30);
        metrics.push(metric(30, 900.0, true));
        metrics.extend((31..40).map(|i| metric(i, 50.0 + (i % 5) as f64, false)));
        let data = TrainingData::default().with_metadata(TrainingMetadata {
            time_series_metrics: metrics,
            ..Default::default()
        });

        let mut detector = MetricAnomalyDetector::default();
        let evaluation = detector.train(&data).unwrap();
        assert!(detector.is_trained());
        assert!(detector.baseline(AnomalyType::Latency).is_some());
        assert_eq!(evaluation.recall, 1.0);
        assert!(evaluation.accuracy > 0.9);

        let window = vec![metric(0, 400.0, false)];
        let events = detector.detect(&window).unwrap();
        assert_eq!(events[0].anomaly_type, AnomalyType::Latency);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let data = TrainingData::default().with_metadata(TrainingMetadata {
            time_series_metrics: steady_window(15),
            ..Default::default()
        });
        let mut detector = MetricAnomalyDetector::default();
        detector.train(&data).unwrap();

        let mut restored = MetricAnomalyDetector::default();
        restored.restore(&detector.snapshot().unwrap()).unwrap();
        assert_eq!(
            restored.baseline(AnomalyType::Latency),
            detector.baseline(AnomalyType::Latency)
        );
    }
}
