//! Timing accuracy measurement.
//!
//! Drives a dedicated `PrecisionTimer` purely for measurement (no clicks are
//! injected), aggregates the observed error into a report, and keeps a
//! history of reports so accuracy regressions between runs can be flagged.
//! Regressions are reported, never auto-corrected.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

use crate::error::Result;
use crate::timer::{PrecisionTimer, TimingSample};

/// Default tolerance a sample must land within to count as accurate.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_millis(10);

/// Bound on retained samples per benchmark run.
const DEFAULT_MAX_SAMPLES: usize = 10_000;

/// Relative mean-error increase (percent) that flags a regression.
const MEAN_ERROR_REGRESSION_PCT: f64 = 20.0;

/// Accuracy drop in percentage points that flags a regression.
const ACCURACY_REGRESSION_POINTS: f64 = 10.0;

/// Aggregate accuracy of one benchmark run. Derived from the sample window
/// on demand; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingAccuracyReport {
    pub mean_error: Duration,
    pub max_error: Duration,
    pub std_dev: Duration,
    /// Percentage of samples whose error was within tolerance.
    pub accuracy_percentage: f64,
    pub sample_count: usize,
    pub target_interval: Duration,
}

impl TimingAccuracyReport {
    /// Whether this run met the sub-10ms mean-error target.
    pub fn meets_target(&self) -> bool {
        self.mean_error <= DEFAULT_TOLERANCE
    }
}

/// Outcome of comparing recent benchmark runs against earlier ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionFindings {
    /// Relative change in mean error, positive when error grew.
    pub mean_error_change_pct: f64,
    /// Change in accuracy percentage points, negative when accuracy fell.
    pub accuracy_change_pct: f64,
    pub mean_error_regressed: bool,
    pub accuracy_regressed: bool,
}

impl RegressionFindings {
    pub fn any(&self) -> bool {
        self.mean_error_regressed || self.accuracy_regressed
    }
}

/// Bounded window of the most recent samples (ring buffer; oldest samples are
/// overwritten once full).
struct SampleWindow {
    samples: Vec<TimingSample>,
    max_samples: usize,
    next_index: usize,
}

impl SampleWindow {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples.min(4096)),
            max_samples,
            next_index: 0,
        }
    }

    fn push(&mut self, sample: TimingSample) {
        if self.samples.len() < self.max_samples {
            self.samples.push(sample);
        } else {
            self.samples[self.next_index] = sample;
            self.next_index = (self.next_index + 1) % self.max_samples;
        }
    }

    fn report(&self, target_interval: Duration, tolerance: Duration) -> TimingAccuracyReport {
        let count = self.samples.len();
        if count == 0 {
            return TimingAccuracyReport {
                mean_error: Duration::ZERO,
                max_error: Duration::ZERO,
                std_dev: Duration::ZERO,
                accuracy_percentage: 0.0,
                sample_count: 0,
                target_interval,
            };
        }

        let errors_us: Vec<f64> = self
            .samples
            .iter()
            .map(|s| s.error().as_secs_f64() * 1e6)
            .collect();
        let mean_us = errors_us.iter().sum::<f64>() / count as f64;
        let max_us = errors_us.iter().cloned().fold(0.0, f64::max);
        let variance = errors_us
            .iter()
            .map(|e| (e - mean_us).powi(2))
            .sum::<f64>()
            / count as f64;
        let within = self
            .samples
            .iter()
            .filter(|s| s.error() <= tolerance)
            .count();

        TimingAccuracyReport {
            mean_error: Duration::from_secs_f64(mean_us / 1e6),
            max_error: Duration::from_secs_f64(max_us / 1e6),
            std_dev: Duration::from_secs_f64(variance.sqrt() / 1e6),
            accuracy_percentage: within as f64 / count as f64 * 100.0,
            sample_count: count,
            target_interval,
        }
    }
}

/// Benchmarks the timer and tracks report history for regression detection.
pub struct TimingAccuracyValidator {
    tolerance: Duration,
    max_samples: usize,
    history: Vec<TimingAccuracyReport>,
}

impl Default for TimingAccuracyValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingAccuracyValidator {
    pub fn new() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_samples: DEFAULT_MAX_SAMPLES,
            history: Vec::new(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples.max(1);
        self
    }

    /// Run the timer for `duration` at `interval`, collecting one sample per
    /// tick, and compute the aggregate report. The report is appended to the
    /// validator's history.
    pub async fn run_benchmark(
        &mut self,
        interval: Duration,
        duration: Duration,
    ) -> Result<TimingAccuracyReport> {
        let (handle, mut ticks) = PrecisionTimer::start(interval, true);
        let deadline = Instant::now() + duration;
        let mut window = SampleWindow::new(self.max_samples);

        loop {
            tokio::select! {
                next = ticks.recv() => match next {
                    Some(sample) => window.push(sample),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }
        handle.stop();

        let report = window.report(interval, self.tolerance);
        info!(
            samples = report.sample_count,
            mean_error_us = report.mean_error.as_micros() as u64,
            accuracy = report.accuracy_percentage,
            "benchmark complete"
        );
        self.history.push(report.clone());
        Ok(report)
    }

    pub fn history(&self) -> &[TimingAccuracyReport] {
        &self.history
    }

    /// Compare the validator's own history; see [`detect_regression`].
    pub fn check_history(&self, window_size: usize) -> Option<RegressionFindings> {
        detect_regression(&self.history, window_size)
    }
}

/// Compare the most recent `window_size` reports by splitting them in half:
/// earlier half vs. later half averages. Returns `None` when fewer than
/// `window_size` reports exist or the window cannot be split.
pub fn detect_regression(
    history: &[TimingAccuracyReport],
    window_size: usize,
) -> Option<RegressionFindings> {
    if window_size < 2 || history.len() < window_size {
        return None;
    }
    let window = &history[history.len() - window_size..];
    let half = window_size / 2;
    let (earlier, later) = window.split_at(window_size - half);

    let mean_us = |reports: &[TimingAccuracyReport]| {
        reports
            .iter()
            .map(|r| r.mean_error.as_secs_f64() * 1e6)
            .sum::<f64>()
            / reports.len() as f64
    };
    let mean_accuracy = |reports: &[TimingAccuracyReport]| {
        reports.iter().map(|r| r.accuracy_percentage).sum::<f64>() / reports.len() as f64
    };

    let error_before = mean_us(earlier);
    let error_after = mean_us(later);
    let mean_error_change_pct = if error_before > 0.0 {
        (error_after - error_before) / error_before * 100.0
    } else if error_after > 0.0 {
        100.0
    } else {
        0.0
    };

    // Accuracy is already a percentage, so the comparison is in absolute
    // percentage points.
    let accuracy_change_pct = mean_accuracy(later) - mean_accuracy(earlier);

    Some(RegressionFindings {
        mean_error_change_pct,
        accuracy_change_pct,
        mean_error_regressed: mean_error_change_pct > MEAN_ERROR_REGRESSION_PCT,
        accuracy_regressed: accuracy_change_pct < -ACCURACY_REGRESSION_POINTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_sample(error: Duration) -> TimingSample {
        let base = Instant::now();
        TimingSample {
            scheduled_for: base,
            fired_at: base + error,
            anomaly: false,
        }
    }

    fn synthetic_report(mean_error: Duration, accuracy: f64) -> TimingAccuracyReport {
        TimingAccuracyReport {
            mean_error,
            max_error: mean_error * 2,
            std_dev: Duration::ZERO,
            accuracy_percentage: accuracy,
            sample_count: 100,
            target_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_report_math_on_known_errors() {
        let mut window = SampleWindow::new(100);
        for ms in [1u64, 2, 3] {
            window.push(synthetic_sample(Duration::from_millis(ms)));
        }
        let report = window.report(Duration::from_millis(10), DEFAULT_TOLERANCE);

        assert_eq!(report.sample_count, 3);
        assert_eq!(report.mean_error, Duration::from_millis(2));
        assert_eq!(report.max_error, Duration::from_millis(3));
        // population std dev of {1, 2, 3} ms
        let expected_std = Duration::from_secs_f64((2.0f64 / 3.0).sqrt() / 1_000.0);
        let diff = report.std_dev.abs_diff(expected_std);
        assert!(diff < Duration::from_micros(5), "std dev {:?}", report.std_dev);
        assert_eq!(report.accuracy_percentage, 100.0);
        assert!(report.meets_target());
    }

    #[test]
    fn test_tolerance_splits_accuracy() {
        let mut window = SampleWindow::new(100);
        window.push(synthetic_sample(Duration::from_millis(1)));
        window.push(synthetic_sample(Duration::from_millis(50)));
        let report = window.report(Duration::from_millis(10), DEFAULT_TOLERANCE);
        assert_eq!(report.accuracy_percentage, 50.0);
        assert!(!report.meets_target());
    }

    #[test]
    fn test_window_is_bounded() {
        let mut window = SampleWindow::new(5);
        for _ in 0..20 {
            window.push(synthetic_sample(Duration::from_millis(1)));
        }
        let report = window.report(Duration::from_millis(10), DEFAULT_TOLERANCE);
        assert_eq!(report.sample_count, 5);
    }

    #[test]
    fn test_empty_window_reports_zero() {
        let window = SampleWindow::new(5);
        let report = window.report(Duration::from_millis(10), DEFAULT_TOLERANCE);
        assert_eq!(report.sample_count, 0);
        assert_eq!(report.accuracy_percentage, 0.0);
    }

    #[tokio::test]
    async fn test_benchmark_collects_samples() {
        let mut validator = TimingAccuracyValidator::new();
        let report = validator
            .run_benchmark(Duration::from_millis(20), Duration::from_millis(500))
            .await
            .unwrap();

        assert!(report.sample_count >= 10, "got {}", report.sample_count);
        assert!(report.mean_error < Duration::from_millis(15));
        assert!(report.accuracy_percentage >= 80.0);
        assert_eq!(validator.history().len(), 1);
    }

    #[test]
    fn test_regression_flags_mean_error_growth() {
        let mut history = vec![synthetic_report(Duration::from_millis(2), 99.0); 3];
        history.extend(vec![synthetic_report(Duration::from_millis(4), 99.0); 3]);

        let findings = detect_regression(&history, 6).unwrap();
        assert!(findings.mean_error_regressed);
        assert!(!findings.accuracy_regressed);
        assert!(findings.any());
        assert!((findings.mean_error_change_pct - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_regression_flags_accuracy_drop() {
        let mut history = vec![synthetic_report(Duration::from_millis(2), 99.0); 2];
        history.extend(vec![synthetic_report(Duration::from_millis(2), 80.0); 2]);

        let findings = detect_regression(&history, 4).unwrap();
        assert!(findings.accuracy_regressed);
        assert!(!findings.mean_error_regressed);
    }

    #[test]
    fn test_accuracy_drop_is_measured_in_percentage_points() {
        // 50% -> 44% is a 12% relative drop but only 6 points; not flagged.
        let mut history = vec![synthetic_report(Duration::from_millis(2), 50.0); 2];
        history.extend(vec![synthetic_report(Duration::from_millis(2), 44.0); 2]);
        let findings = detect_regression(&history, 4).unwrap();
        assert!(!findings.accuracy_regressed);
        assert!((findings.accuracy_change_pct + 6.0).abs() < 1e-9);

        // 95% -> 84% is an 11-point drop; flagged.
        let mut history = vec![synthetic_report(Duration::from_millis(2), 95.0); 2];
        history.extend(vec![synthetic_report(Duration::from_millis(2), 84.0); 2]);
        assert!(detect_regression(&history, 4).unwrap().accuracy_regressed);
    }

    #[test]
    fn test_stable_history_has_no_findings() {
        let history = vec![synthetic_report(Duration::from_millis(2), 99.0); 6];
        let findings = detect_regression(&history, 6).unwrap();
        assert!(!findings.any());
    }

    #[test]
    fn test_short_history_yields_none() {
        let history = vec![synthetic_report(Duration::from_millis(2), 99.0); 2];
        assert!(detect_regression(&history, 6).is_none());
        assert!(detect_regression(&history, 1).is_none());
    }
}
