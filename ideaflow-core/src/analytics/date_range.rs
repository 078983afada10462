//! Date ranges for analytics queries.
//!
//! A [`DateRange`] is resolved from a [`DateRangePreset`] relative to "now".
//! Every function here is pure: callers pass `now` explicitly, with wall-clock
//! convenience wrappers on top.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::format::format_short_date;

/// Label attached to every computed comparison window.
pub const PREVIOUS_PERIOD_LABEL: &str = "Previous period";

/// Named range choices offered to admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRangePreset {
    Last7Days,
    Last30Days,
    Last90Days,
    AllTime,
    /// Bounds supplied by the caller; resolution passes them through.
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl DateRangePreset {
    /// Length of the look-back window, if the preset has one.
    pub fn days(&self) -> Option<i64> {
        match self {
            DateRangePreset::Last7Days => Some(7),
            DateRangePreset::Last30Days => Some(30),
            DateRangePreset::Last90Days => Some(90),
            DateRangePreset::AllTime | DateRangePreset::Custom { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DateRangePreset::Last7Days => "Last 7 days",
            DateRangePreset::Last30Days => "Last 30 days",
            DateRangePreset::Last90Days => "Last 90 days",
            DateRangePreset::AllTime => "All time",
            DateRangePreset::Custom { .. } => "Custom range",
        }
    }

    /// Stable key used for snapshots; custom ranges have none.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            DateRangePreset::Last7Days => Some("last7days"),
            DateRangePreset::Last30Days => Some("last30days"),
            DateRangePreset::Last90Days => Some("last90days"),
            DateRangePreset::AllTime => Some("alltime"),
            DateRangePreset::Custom { .. } => None,
        }
    }

    /// Resolve against the wall clock.
    pub fn resolve(&self) -> DateRange {
        DateRange::from_preset(*self, Utc::now())
    }
}

impl FromStr for DateRangePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last7days" => Ok(DateRangePreset::Last7Days),
            "last30days" => Ok(DateRangePreset::Last30Days),
            "last90days" => Ok(DateRangePreset::Last90Days),
            "alltime" => Ok(DateRangePreset::AllTime),
            "custom" => Err("custom ranges need explicit start and end dates".to_string()),
            other => Err(format!(
                "unknown range {:?} (expected last7days, last30days, last90days or alltime)",
                other
            )),
        }
    }
}

/// A concrete analytics window. `start == None` means "all time".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
    pub label: String,
}

impl DateRange {
    /// Resolve a preset relative to `now`. `end` is always `now` except for
    /// custom ranges, whose bounds are taken as given.
    pub fn from_preset(preset: DateRangePreset, now: DateTime<Utc>) -> Self {
        let label = preset.label().to_string();
        match preset {
            DateRangePreset::Custom { start, end } => Self {
                start: Some(start),
                end,
                label,
            },
            DateRangePreset::AllTime => Self {
                start: None,
                end: now,
                label,
            },
            bounded => {
                let days = bounded.days().unwrap_or_default();
                Self {
                    start: Some(now - Duration::days(days)),
                    end: now,
                    label,
                }
            }
        }
    }

    pub fn custom(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::from_preset(DateRangePreset::Custom { start, end }, end)
    }

    pub fn is_all_time(&self) -> bool {
        self.start.is_none()
    }

    /// `"{start} - {end}"`, or `"All time - {end}"` when unbounded.
    pub fn format(&self) -> String {
        match self.start {
            Some(start) => format!(
                "{} - {}",
                format_short_date(start),
                format_short_date(self.end)
            ),
            None => format!("All time - {}", format_short_date(self.end)),
        }
    }

    /// Unbounded ranges are always valid. Bounded ranges must be ordered and
    /// must not reach past `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.start {
            None => true,
            Some(start) => start <= self.end && start <= now && self.end <= now,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Inclusive membership test.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| ts >= start) && ts <= self.end
    }

    /// Length of a bounded range.
    pub fn duration(&self) -> Option<Duration> {
        self.start.map(|start| self.end - start)
    }

    /// The comparison window used for trends.
    ///
    /// Bounded ranges get the same-length window ending where this one starts.
    /// All-time ranges anchor one year before `end` and use the time elapsed
    /// between that anchor and `now` as the window length.
    pub fn previous_period_at(&self, now: DateTime<Utc>) -> DateRange {
        let (start, end) = match self.start {
            Some(start) => {
                let length = self.end - start;
                (start - length, start)
            }
            None => {
                let anchor = self
                    .end
                    .checked_sub_months(Months::new(12))
                    .unwrap_or(self.end - Duration::days(365));
                let length = now - anchor;
                (anchor - length, anchor)
            }
        };

        DateRange {
            start: Some(start),
            end,
            label: PREVIOUS_PERIOD_LABEL.to_string(),
        }
    }

    pub fn previous_period(&self) -> DateRange {
        self.previous_period_at(Utc::now())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_presets_end_now_and_look_back() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 9, 30, 0).unwrap();
        for (preset, days) in [
            (DateRangePreset::Last7Days, 7),
            (DateRangePreset::Last30Days, 30),
            (DateRangePreset::Last90Days, 90),
        ] {
            let range = DateRange::from_preset(preset, now);
            assert_eq!(range.end, now);
            assert_eq!(range.start, Some(now - Duration::days(days)));
            assert_eq!(range.label, preset.label());
        }
    }

    #[test]
    fn test_all_time_has_no_start() {
        let now = at(2026, 3, 15);
        let range = DateRange::from_preset(DateRangePreset::AllTime, now);
        assert!(range.start.is_none());
        assert_eq!(range.end, now);
    }

    #[test]
    fn test_custom_passes_bounds_through() {
        let range = DateRange::from_preset(
            DateRangePreset::Custom {
                start: at(2026, 1, 1),
                end: at(2026, 1, 31),
            },
            at(2026, 6, 1),
        );
        assert_eq!(range.start, Some(at(2026, 1, 1)));
        assert_eq!(range.end, at(2026, 1, 31));
        assert_eq!(range.label, "Custom range");
    }

    #[test]
    fn test_format() {
        let range = DateRange {
            start: None,
            end: at(2026, 1, 31),
            label: "All time".to_string(),
        };
        assert_eq!(range.format(), "All time - Jan 31, 2026");
        assert!(range.is_all_time());

        let range = DateRange::custom(at(2026, 1, 1), at(2026, 1, 31));
        assert_eq!(range.format(), "Jan 1, 2026 - Jan 31, 2026");
    }

    #[test]
    fn test_validity() {
        let now = at(2026, 2, 1);

        let unbounded = DateRange {
            start: None,
            end: at(2030, 1, 1),
            label: "All time".to_string(),
        };
        assert!(unbounded.is_valid_at(now));

        assert!(DateRange::custom(at(2026, 1, 1), at(2026, 1, 31)).is_valid_at(now));
        // inverted
        assert!(!DateRange::custom(at(2026, 1, 31), at(2026, 1, 1)).is_valid_at(now));
        // end in the future
        assert!(!DateRange::custom(at(2026, 1, 1), at(2026, 2, 2)).is_valid_at(now));
        // start in the future
        assert!(!DateRange::custom(at(2026, 3, 1), at(2026, 3, 2)).is_valid_at(now));
        // single instant is fine
        assert!(DateRange::custom(now, now).is_valid_at(now));

        // wall-clock variant
        assert!(DateRange::from_preset(DateRangePreset::Last7Days, Utc::now()).is_valid());
        assert!(!DateRange::custom(at(2026, 1, 31), at(2026, 1, 1)).is_valid());
    }

    #[test]
    fn test_previous_period_bounded() {
        let range = DateRange::custom(at(2026, 1, 1), at(2026, 1, 31));
        let previous = range.previous_period_at(at(2026, 2, 1));
        assert_eq!(previous.start, Some(at(2025, 12, 2)));
        assert_eq!(previous.end, at(2026, 1, 1));
        assert_eq!(previous.label, PREVIOUS_PERIOD_LABEL);
    }

    #[test]
    fn test_previous_period_all_time() {
        let now = at(2026, 3, 1);
        let range = DateRange::from_preset(DateRangePreset::AllTime, now);
        let previous = range.previous_period_at(now);
        // anchor one year back, window as long as anchor..now
        assert_eq!(previous.end, at(2025, 3, 1));
        assert_eq!(previous.start, Some(at(2024, 3, 1)));
    }

    #[test]
    fn test_previous_period_single_instant_is_zero_length() {
        let instant = at(2026, 1, 15);
        let range = DateRange::custom(instant, instant);
        let previous = range.previous_period_at(at(2026, 2, 1));
        assert_eq!(previous.start, Some(instant));
        assert_eq!(previous.end, instant);
    }

    #[test]
    fn test_contains() {
        let range = DateRange::custom(at(2026, 1, 1), at(2026, 1, 31));
        assert!(range.contains(at(2026, 1, 1)));
        assert!(range.contains(at(2026, 1, 31)));
        assert!(!range.contains(at(2026, 2, 1)));
    }

    #[test]
    fn test_parse_presets() {
        assert_eq!(
            "last30days".parse::<DateRangePreset>().unwrap(),
            DateRangePreset::Last30Days
        );
        assert!("custom".parse::<DateRangePreset>().is_err());
        assert!("yesterday".parse::<DateRangePreset>().is_err());
    }
}
