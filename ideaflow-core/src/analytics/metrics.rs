//! Rate, trend and benchmark math.
//!
//! All functions are total: zero denominators and empty samples produce
//! well-defined zero/neutral values instead of NaN.

use serde::{Deserialize, Serialize};

use crate::config::BenchmarkTarget;
use crate::format::format_days;

/// Trend significance for percentage-point rates.
pub const RATE_TREND_THRESHOLD: f64 = 2.0;
/// Trend significance for durations, in days.
pub const TIME_TREND_THRESHOLD: f64 = 0.5;
/// Raw counts move on any change.
pub const COUNT_TREND_THRESHOLD: f64 = 0.0;

/// Fraction of the target below which a duration is comfortably on track.
const ON_TRACK_FACTOR: f64 = 0.9;

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Percentage of `numerator` over `denominator`, one decimal place.
///
/// Zero denominators yield 0.
pub fn rate(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round1(numerator as f64 / denominator as f64 * 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    #[default]
    Neutral,
}

/// Which direction counts as better for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    HigherIsBetter,
    /// Durations: going down is an improvement
    LowerIsBetter,
}

/// Comparison of a metric against the previous period.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrendData {
    pub direction: TrendDirection,
    /// Absolute delta, one decimal place
    pub change: f64,
    pub change_percentage: f64,
}

impl TrendData {
    /// `Some(true)` if the move is an improvement, `None` when neutral.
    pub fn is_improvement(&self, polarity: Polarity) -> Option<bool> {
        match (self.direction, polarity) {
            (TrendDirection::Neutral, _) => None,
            (TrendDirection::Up, Polarity::HigherIsBetter)
            | (TrendDirection::Down, Polarity::LowerIsBetter) => Some(true),
            _ => Some(false),
        }
    }

    /// Display form, e.g. "+12.5%" or "-3.0%".
    pub fn format_change(&self) -> String {
        if self.change_percentage >= 0.0 {
            format!("+{:.1}%", self.change_percentage)
        } else {
            format!("{:.1}%", self.change_percentage)
        }
    }
}

/// Compare `current` against `previous`, ignoring moves within `threshold`.
pub fn trend(current: f64, previous: f64, threshold: f64) -> TrendData {
    let change = round1(current - previous);

    let direction = if change > threshold {
        TrendDirection::Up
    } else if change < -threshold {
        TrendDirection::Down
    } else {
        TrendDirection::Neutral
    };

    let change_percentage = if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        round1(change / previous * 100.0)
    };

    TrendData {
        direction,
        change,
        change_percentage,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BenchmarkStatus {
    #[default]
    OnTrack,
    AtRisk,
    Behind,
}

impl BenchmarkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkStatus::OnTrack => "on-track",
            BenchmarkStatus::AtRisk => "at-risk",
            BenchmarkStatus::Behind => "behind",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BenchmarkData {
    pub target_days: f64,
    pub status: BenchmarkStatus,
}

/// Classify an observed duration against its target.
pub fn benchmark(observed: f64, target: f64, at_risk_ceiling: f64) -> BenchmarkData {
    let status = if observed < target * ON_TRACK_FACTOR {
        BenchmarkStatus::OnTrack
    } else if observed <= at_risk_ceiling {
        BenchmarkStatus::AtRisk
    } else {
        BenchmarkStatus::Behind
    };

    BenchmarkData {
        target_days: target,
        status,
    }
}

/// Conversion between two pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversionRate {
    pub rate: f64,
    pub trend: TrendData,
    pub count: i64,
    pub total_count: i64,
}

impl ConversionRate {
    /// Rate for `count / total_count`, trended against the previous rate.
    pub fn compute(count: i64, total_count: i64, previous_rate: f64) -> Self {
        let current = rate(count, total_count);
        Self {
            rate: current,
            trend: trend(current, previous_rate, RATE_TREND_THRESHOLD),
            count,
            total_count,
        }
    }
}

/// Average duration of one pipeline transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeMetric {
    pub average_days: f64,
    pub average_hours: f64,
    pub formatted_time: String,
    pub trend: TrendData,
    pub count: i64,
    pub benchmark: BenchmarkData,
}

impl TimeMetric {
    /// No samples: "N/A", neutral trend, on track.
    pub fn empty(target: &BenchmarkTarget) -> Self {
        Self {
            average_days: 0.0,
            average_hours: 0.0,
            formatted_time: "N/A".to_string(),
            trend: TrendData::default(),
            count: 0,
            benchmark: BenchmarkData {
                target_days: target.target_days,
                status: BenchmarkStatus::OnTrack,
            },
        }
    }

    /// Build from current and previous samples (durations in days).
    pub fn from_samples(current: &[f64], previous: &[f64], target: &BenchmarkTarget) -> Self {
        if current.is_empty() {
            return Self::empty(target);
        }

        let average_days = mean(current);
        let previous_days = if previous.is_empty() {
            0.0
        } else {
            mean(previous)
        };

        Self {
            average_days: round1(average_days),
            average_hours: round1(average_days * 24.0),
            formatted_time: format_days(average_days),
            trend: trend(average_days, previous_days, TIME_TREND_THRESHOLD),
            count: current.len() as i64,
            benchmark: benchmark(average_days, target.target_days, target.ceiling()),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_zero_denominator() {
        assert_eq!(rate(0, 0), 0.0);
        assert_eq!(rate(5, 0), 0.0);
    }

    #[test]
    fn test_rate_bounds_and_rounding() {
        assert_eq!(rate(1, 3), 33.3);
        assert_eq!(rate(2, 3), 66.7);
        for denominator in 1..=25 {
            for numerator in 0..=denominator {
                let r = rate(numerator, denominator);
                assert!((0.0..=100.0).contains(&r), "{numerator}/{denominator} -> {r}");
            }
        }
    }

    #[test]
    fn test_trend_directions() {
        let up = trend(50.0, 40.0, RATE_TREND_THRESHOLD);
        assert_eq!(up.direction, TrendDirection::Up);
        assert_eq!(up.change, 10.0);
        assert_eq!(up.change_percentage, 25.0);

        let down = trend(40.0, 50.0, RATE_TREND_THRESHOLD);
        assert_eq!(down.direction, TrendDirection::Down);
        assert_eq!(down.change_percentage, -20.0);

        // within threshold
        let flat = trend(41.5, 40.0, RATE_TREND_THRESHOLD);
        assert_eq!(flat.direction, TrendDirection::Neutral);
        assert_eq!(flat.change, 1.5);

        // exactly at threshold is still neutral
        let edge = trend(42.0, 40.0, RATE_TREND_THRESHOLD);
        assert_eq!(edge.direction, TrendDirection::Neutral);
    }

    #[test]
    fn test_trend_zero_previous() {
        let t = trend(12.0, 0.0, RATE_TREND_THRESHOLD);
        assert_eq!(t.change_percentage, 100.0);
        assert_eq!(t.direction, TrendDirection::Up);

        let t = trend(0.0, 0.0, RATE_TREND_THRESHOLD);
        assert_eq!(t.change_percentage, 0.0);
        assert_eq!(t.direction, TrendDirection::Neutral);
    }

    #[test]
    fn test_time_trend_polarity() {
        let faster = trend(2.0, 4.0, TIME_TREND_THRESHOLD);
        assert_eq!(faster.direction, TrendDirection::Down);
        assert_eq!(faster.is_improvement(Polarity::LowerIsBetter), Some(true));
        assert_eq!(faster.is_improvement(Polarity::HigherIsBetter), Some(false));

        let same = trend(2.3, 2.0, TIME_TREND_THRESHOLD);
        assert_eq!(same.is_improvement(Polarity::LowerIsBetter), None);
    }

    #[test]
    fn test_benchmark_classification() {
        let target = 10.0;
        let ceiling = target * 1.1;
        assert_eq!(
            benchmark(target * 0.5, target, ceiling).status,
            BenchmarkStatus::OnTrack
        );
        assert_eq!(
            benchmark(target * 0.9, target, ceiling).status,
            BenchmarkStatus::AtRisk
        );
        assert_eq!(benchmark(ceiling, target, ceiling).status, BenchmarkStatus::AtRisk);
        assert_eq!(
            benchmark(target * 1.5, target, ceiling).status,
            BenchmarkStatus::Behind
        );
        assert_eq!(benchmark(4.0, target, ceiling).target_days, 10.0);
    }

    #[test]
    fn test_conversion_rate() {
        let conversion = ConversionRate::compute(3, 4, 50.0);
        assert_eq!(conversion.rate, 75.0);
        assert_eq!(conversion.trend.direction, TrendDirection::Up);
        assert_eq!(conversion.count, 3);
        assert_eq!(conversion.total_count, 4);

        let empty = ConversionRate::compute(0, 0, 0.0);
        assert_eq!(empty.rate, 0.0);
        assert_eq!(empty.trend.direction, TrendDirection::Neutral);
    }

    #[test]
    fn test_time_metric_from_samples() {
        let target = BenchmarkTarget::days(3.0);
        let metric = TimeMetric::from_samples(&[1.0, 2.0], &[4.0], &target);
        assert_eq!(metric.count, 2);
        assert_eq!(metric.average_days, 1.5);
        assert_eq!(metric.average_hours, 36.0);
        assert_eq!(metric.formatted_time, "36 hours");
        assert_eq!(metric.trend.direction, TrendDirection::Down);
        assert_eq!(metric.benchmark.status, BenchmarkStatus::OnTrack);
    }

    #[test]
    fn test_time_metric_empty() {
        let target = BenchmarkTarget::days(3.0);
        let metric = TimeMetric::from_samples(&[], &[2.0, 2.0], &target);
        assert_eq!(metric.formatted_time, "N/A");
        assert_eq!(metric.average_days, 0.0);
        assert_eq!(metric.count, 0);
        assert_eq!(metric.benchmark.status, BenchmarkStatus::OnTrack);
        assert_eq!(metric.trend.direction, TrendDirection::Neutral);
    }

    #[test]
    fn test_format_change() {
        assert_eq!(trend(30.0, 20.0, 0.0).format_change(), "+50.0%");
        assert_eq!(trend(15.0, 20.0, 0.0).format_change(), "-25.0%");
    }
}
