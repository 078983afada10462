//! Analytics module for ideaflow
//!
//! Pipeline statistics for the admin dashboard:
//! - Date range presets and previous-period comparison windows
//! - Conversion rates, trends and benchmark classification
//! - Aggregation of raw pipeline rows into a single report
//! - Snapshot caching for the named presets

pub mod aggregate;
pub mod date_range;
pub mod metrics;
pub mod snapshot;

pub use aggregate::{
    compute_analytics, AnalyticsData, AnalyticsReport, AnalyticsSection, AnalyticsSource,
    CompletionRates, CountMetric, LeaderboardEntry, PipelineStage, RecentSubmission,
    SectionError, TimeMetrics, UserActivity,
};
pub use date_range::{DateRange, DateRangePreset, PREVIOUS_PERIOD_LABEL};
pub use metrics::{
    benchmark, rate, trend, BenchmarkData, BenchmarkStatus, ConversionRate, Polarity,
    TimeMetric, TrendData, TrendDirection,
};
pub use snapshot::{cached_analytics, ReportOrigin};
