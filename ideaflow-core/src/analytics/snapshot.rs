//! Cached analytics reports for named ranges.
//!
//! Complete reports for the fixed presets are stored in the local database
//! and reused until `snapshot_ttl_secs` elapses. Degraded reports and custom
//! ranges are never cached. The cache is cleared whenever a prototype
//! becomes ready or the mirror is re-synced.

use chrono::{DateTime, Duration, Utc};

use super::aggregate::{compute_analytics, AnalyticsData, AnalyticsReport};
use super::date_range::{DateRange, DateRangePreset};
use crate::config::AnalyticsConfig;
use crate::db::Database;
use crate::error::Result;

/// Where a returned report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOrigin {
    Computed,
    Snapshot { computed_at: DateTime<Utc> },
}

/// Analytics for `preset`, served from the snapshot table when fresh.
///
/// `refresh` skips the lookup but still stores the recomputed report.
pub fn cached_analytics(
    db: &Database,
    preset: DateRangePreset,
    config: &AnalyticsConfig,
    now: DateTime<Utc>,
    refresh: bool,
) -> Result<(AnalyticsReport, ReportOrigin)> {
    let range = DateRange::from_preset(preset, now);
    let Some(key) = preset.key() else {
        let report = compute_analytics(db, &range, config, now)?;
        return Ok((report, ReportOrigin::Computed));
    };

    let ttl = Duration::seconds(config.snapshot_ttl_secs as i64);

    if !refresh && config.snapshot_ttl_secs > 0 {
        if let Some(snapshot) = db.get_analytics_snapshot(key)? {
            let age = now - snapshot.computed_at;
            if age >= Duration::zero() && age < ttl {
                match serde_json::from_str::<AnalyticsData>(&snapshot.payload) {
                    Ok(data) => {
                        tracing::debug!(range = key, age_secs = age.num_seconds(), "Snapshot hit");
                        return Ok((
                            AnalyticsReport {
                                data,
                                errors: Vec::new(),
                            },
                            ReportOrigin::Snapshot {
                                computed_at: snapshot.computed_at,
                            },
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(range = key, error = %e, "Discarding unreadable snapshot");
                    }
                }
            }
        }
    }

    let report = compute_analytics(db, &range, config, now)?;

    if report.is_complete() && config.snapshot_ttl_secs > 0 {
        let payload = serde_json::to_string(&report.data)?;
        if let Err(e) = db.put_analytics_snapshot(key, now, &payload) {
            tracing::warn!(range = key, error = %e, "Failed to store analytics snapshot");
        }
    }

    Ok((report, ReportOrigin::Computed))
}
