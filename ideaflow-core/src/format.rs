//! Formatting helpers shared by the analytics layer and the CLIs.

use chrono::{DateTime, Utc};

/// Render an average duration in days using the coarsest readable unit.
///
/// Below two days the value is shown in whole hours, below thirty days in
/// days, otherwise in weeks. Zero (no samples) renders as `"N/A"`.
pub fn format_days(days: f64) -> String {
    if days <= 0.0 || !days.is_finite() {
        return "N/A".to_string();
    }

    if days < 2.0 {
        let hours = (days * 24.0).round();
        format!("{} {}", hours, plural(hours, "hour"))
    } else if days < 30.0 {
        let rendered = format!("{:.1}", days);
        format!("{} {}", rendered, plural_str(&rendered, "day"))
    } else {
        let rendered = format!("{:.1}", days / 7.0);
        format!("{} {}", rendered, plural_str(&rendered, "week"))
    }
}

fn plural(magnitude: f64, unit: &str) -> String {
    if magnitude == 1.0 {
        unit.to_string()
    } else {
        format!("{}s", unit)
    }
}

fn plural_str(rendered: &str, unit: &str) -> String {
    plural(rendered.parse().unwrap_or(0.0), unit)
}

/// Short calendar date, e.g. "Jan 31, 2026".
pub fn format_short_date(ts: DateTime<Utc>) -> String {
    ts.format("%b %-d, %Y").to_string()
}

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_days_tiers() {
        assert_eq!(format_days(0.0), "N/A");
        assert_eq!(format_days(1.0 / 24.0), "1 hour");
        assert_eq!(format_days(0.5), "12 hours");
        assert_eq!(format_days(10.0), "10.0 days");
        assert_eq!(format_days(45.0), "6.4 weeks");
    }

    #[test]
    fn test_format_days_boundaries() {
        // exactly two days leaves the hour tier
        assert_eq!(format_days(2.0), "2.0 days");
        assert_eq!(format_days(1.99), "48 hours");
        assert_eq!(format_days(30.0), "4.3 weeks");
    }

    #[test]
    fn test_format_short_date() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 31, 18, 0, 0).unwrap();
        assert_eq!(format_short_date(ts), "Jan 31, 2026");
        let ts = Utc.with_ymd_and_hms(2025, 12, 2, 0, 0, 0).unwrap();
        assert_eq!(format_short_date(ts), "Dec 2, 2025");
    }

    #[test]
    fn test_format_relative_time() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time(now - Duration::seconds(5), now), "5s ago");
        assert_eq!(format_relative_time(now - Duration::minutes(3), now), "3m ago");
        assert_eq!(format_relative_time(now - Duration::hours(5), now), "5h ago");
        assert_eq!(format_relative_time(now - Duration::days(2), now), "2d ago");
        assert_eq!(format_relative_time(now + Duration::seconds(5), now), "just now");
        assert_eq!(format_relative_time(now - Duration::days(30), now), "Feb 08");
    }
}
