//! Text and JSON rendering of analytics reports.

use chrono::{DateTime, Utc};
use ideaflow_core::analytics::{
    AnalyticsData, AnalyticsReport, BenchmarkStatus, ConversionRate, Polarity, ReportOrigin,
    TimeMetric, TrendData, TrendDirection,
};
use ideaflow_core::format::{format_relative_time, format_short_date};
use serde::Serialize;
use std::fmt::Write;

/// JSON document printed by `--format json`.
#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_computed_at: Option<DateTime<Utc>>,
    pub data: &'a AnalyticsData,
    pub errors: Vec<JsonSectionError>,
}

#[derive(Serialize)]
pub struct JsonSectionError {
    pub section: &'static str,
    pub message: String,
}

pub fn json_report<'a>(report: &'a AnalyticsReport, origin: ReportOrigin) -> JsonReport<'a> {
    let (source, snapshot_computed_at) = match origin {
        ReportOrigin::Computed => ("computed", None),
        ReportOrigin::Snapshot { computed_at } => ("snapshot", Some(computed_at)),
    };
    JsonReport {
        source,
        snapshot_computed_at,
        data: &report.data,
        errors: report
            .errors
            .iter()
            .map(|e| JsonSectionError {
                section: e.section.as_str(),
                message: e.error.to_string(),
            })
            .collect(),
    }
}

fn trend_marker(trend: &TrendData, polarity: Polarity) -> String {
    let arrow = match trend.direction {
        TrendDirection::Up => "↑",
        TrendDirection::Down => "↓",
        TrendDirection::Neutral => "→",
    };
    let verdict = match trend.is_improvement(polarity) {
        Some(true) => " better",
        Some(false) => " worse",
        None => "",
    };
    format!("{} {}{}", arrow, trend.format_change(), verdict)
}

fn benchmark_label(status: BenchmarkStatus) -> &'static str {
    match status {
        BenchmarkStatus::OnTrack => "on track",
        BenchmarkStatus::AtRisk => "at risk",
        BenchmarkStatus::Behind => "behind",
    }
}

fn conversion_line(out: &mut String, label: &str, conversion: &ConversionRate) {
    let _ = writeln!(
        out,
        "  {:<26} {:>6.1}%  ({}/{})  {}",
        label,
        conversion.rate,
        conversion.count,
        conversion.total_count,
        trend_marker(&conversion.trend, Polarity::HigherIsBetter)
    );
}

fn time_line(out: &mut String, label: &str, metric: &TimeMetric) {
    let _ = writeln!(
        out,
        "  {:<26} {:>12}  target {} days, {}  ({} ideas)  {}",
        label,
        metric.formatted_time,
        metric.benchmark.target_days,
        benchmark_label(metric.benchmark.status),
        metric.count,
        trend_marker(&metric.trend, Polarity::LowerIsBetter)
    );
}

/// Human-readable report.
pub fn text_report(report: &AnalyticsReport, origin: ReportOrigin, now: DateTime<Utc>) -> String {
    let data = &report.data;
    let mut out = String::new();

    let _ = writeln!(out, "Analytics: {}", data.range);
    let _ = writeln!(out, "Compared with: {}", data.previous_range.format());
    if let ReportOrigin::Snapshot { computed_at } = origin {
        let _ = writeln!(
            out,
            "Cached snapshot from {} (use --refresh to recompute)",
            format_relative_time(computed_at, now)
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Total ideas: {}  {}",
        data.total_ideas.count,
        trend_marker(&data.total_ideas.trend, Polarity::HigherIsBetter)
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Pipeline");
    for stage in &data.pipeline {
        let _ = writeln!(
            out,
            "  {:<26} {:>6}  {:>5.1}%",
            stage.label, stage.count, stage.percentage
        );
    }
    let _ = writeln!(out);

    let rates = &data.completion_rates;
    let _ = writeln!(out, "Completion rates");
    conversion_line(&mut out, "Submitted → Approved", &rates.submitted_to_approved);
    conversion_line(&mut out, "Approved → PRD", &rates.approved_to_prd);
    conversion_line(&mut out, "PRD → Prototype", &rates.prd_to_prototype);
    conversion_line(&mut out, "Overall", &rates.overall);
    let _ = writeln!(out);

    let times = &data.time_metrics;
    let _ = writeln!(out, "Time metrics");
    time_line(&mut out, "Submission → decision", &times.submission_to_decision);
    time_line(&mut out, "Approval → PRD", &times.approval_to_prd);
    time_line(&mut out, "PRD → prototype", &times.prd_to_prototype);
    time_line(&mut out, "End to end", &times.end_to_end);
    let _ = writeln!(out);

    let activity = &data.user_activity;
    let _ = writeln!(out, "User activity");
    let _ = writeln!(
        out,
        "  Active users: {} of {} ({:.1}%)",
        activity.active_users, activity.total_users, activity.active_ratio
    );
    if !activity.leaderboard.is_empty() {
        let _ = writeln!(out, "  Top submitters:");
        for (rank, entry) in activity.leaderboard.iter().enumerate() {
            let _ = writeln!(
                out,
                "    {:>2}. {:<24} {} submitted, {} approved",
                rank + 1,
                entry.name,
                entry.submissions,
                entry.approved
            );
        }
    }
    if !activity.recent_submissions.is_empty() {
        let _ = writeln!(out, "  Recent submissions:");
        for submission in &activity.recent_submissions {
            let _ = writeln!(
                out,
                "    {}  {}  ({}, {})",
                format_short_date(submission.created_at),
                submission.title,
                submission.submitter,
                submission.status.display_name()
            );
        }
    }

    if !report.errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Some sections could not be loaded and show defaults:");
        for error in &report.errors {
            let _ = writeln!(out, "  {}: {}", error.section.as_str(), error.error);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ideaflow_core::analytics::{AnalyticsSection, DateRange, SectionError};
    use ideaflow_core::config::AnalyticsConfig;
    use ideaflow_core::Error;

    fn empty_report() -> (AnalyticsReport, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
        let range = DateRange::custom(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(), now);
        let previous = range.previous_period_at(now);
        let data = AnalyticsData::empty(range, previous, now, &AnalyticsConfig::default());
        (
            AnalyticsReport {
                data,
                errors: Vec::new(),
            },
            now,
        )
    }

    #[test]
    fn test_text_report_sections() {
        let (report, now) = empty_report();
        let text = text_report(&report, ReportOrigin::Computed, now);

        assert!(text.contains("Analytics: Custom range (Jan 1, 2026 - Jan 31, 2026)"));
        assert!(text.contains("Compared with: Dec 2, 2025 - Jan 1, 2026"));
        assert!(text.contains("Total ideas: 0"));
        assert!(text.contains("Prototype Complete"));
        assert!(text.contains("N/A"));
        assert!(!text.contains("Cached snapshot"));
        assert!(!text.contains("could not be loaded"));
    }

    #[test]
    fn test_text_report_lists_degraded_sections() {
        let (mut report, now) = empty_report();
        report.errors.push(SectionError {
            section: AnalyticsSection::UserActivity,
            error: Error::Http("connection refused".to_string()),
        });
        let text = text_report(&report, ReportOrigin::Computed, now);
        assert!(text.contains("user_activity: HTTP error: connection refused"));
    }

    #[test]
    fn test_json_report_shape() {
        let (report, now) = empty_report();
        let json = serde_json::to_value(json_report(
            &report,
            ReportOrigin::Snapshot { computed_at: now },
        ))
        .unwrap();

        assert_eq!(json["source"], "snapshot");
        assert_eq!(json["data"]["total_ideas"]["count"], 0);
        assert_eq!(json["data"]["pipeline"].as_array().unwrap().len(), 5);
        assert_eq!(
            json["data"]["time_metrics"]["end_to_end"]["formatted_time"],
            "N/A"
        );
        assert!(json["errors"].as_array().unwrap().is_empty());
    }
}
