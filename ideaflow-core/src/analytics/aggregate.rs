//! Analytics aggregation over raw pipeline rows.
//!
//! [`compute_analytics`] fetches the current and previous windows from an
//! [`AnalyticsSource`] and reduces them into [`AnalyticsData`]. A failing
//! fetch never aborts the report: the affected sections fall back to zeroed
//! values and the failure is recorded in [`AnalyticsReport::errors`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::date_range::DateRange;
use super::metrics::{
    rate, trend, ConversionRate, TimeMetric, TrendData, COUNT_TREND_THRESHOLD,
    RATE_TREND_THRESHOLD,
};
use crate::config::{AnalyticsConfig, BenchmarkTarget, BenchmarkTargets};
use crate::error::{Error, Result};
use crate::types::{IdeaStatus, PipelineRow, UserProfile};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Provider of raw rows for a window.
pub trait AnalyticsSource {
    /// Ideas created inside `range` (inclusive), joined with their milestones.
    fn pipeline_rows(&self, range: &DateRange) -> Result<Vec<PipelineRow>>;

    /// Every known user account.
    fn users(&self) -> Result<Vec<UserProfile>>;
}

// ============================================
// Output shape
// ============================================

/// Full analytics payload for one date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsData {
    pub range: DateRange,
    pub previous_range: DateRange,
    pub generated_at: DateTime<Utc>,
    pub total_ideas: CountMetric,
    /// One entry per status, in pipeline order
    pub pipeline: Vec<PipelineStage>,
    pub completion_rates: CompletionRates,
    pub time_metrics: TimeMetrics,
    pub user_activity: UserActivity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CountMetric {
    pub count: i64,
    pub trend: TrendData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub status: IdeaStatus,
    pub label: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRates {
    pub submitted_to_approved: ConversionRate,
    pub approved_to_prd: ConversionRate,
    pub prd_to_prototype: ConversionRate,
    pub overall: ConversionRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeMetrics {
    pub submission_to_decision: TimeMetric,
    pub approval_to_prd: TimeMetric,
    pub prd_to_prototype: TimeMetric,
    pub end_to_end: TimeMetric,
}

impl TimeMetrics {
    pub fn empty(targets: &BenchmarkTargets) -> Self {
        Self {
            submission_to_decision: TimeMetric::empty(&targets.submission_to_decision),
            approval_to_prd: TimeMetric::empty(&targets.approval_to_prd),
            prd_to_prototype: TimeMetric::empty(&targets.prd_to_prototype),
            end_to_end: TimeMetric::empty(&targets.end_to_end),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserActivity {
    pub total_users: i64,
    /// Users with at least one submission in the range
    pub active_users: i64,
    pub active_ratio: f64,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub recent_submissions: Vec<RecentSubmission>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub name: String,
    pub submissions: i64,
    /// Submissions that reached approval or beyond
    pub approved: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentSubmission {
    pub idea_id: String,
    pub title: String,
    pub submitter: String,
    pub status: IdeaStatus,
    pub created_at: DateTime<Utc>,
}

impl AnalyticsData {
    /// Well-shaped zeroed payload used whenever data is unavailable.
    pub fn empty(
        range: DateRange,
        previous_range: DateRange,
        generated_at: DateTime<Utc>,
        config: &AnalyticsConfig,
    ) -> Self {
        Self {
            range,
            previous_range,
            generated_at,
            total_ideas: CountMetric::default(),
            pipeline: pipeline_breakdown(&[]),
            completion_rates: CompletionRates::default(),
            time_metrics: TimeMetrics::empty(&config.benchmarks),
            user_activity: UserActivity::default(),
        }
    }
}

// ============================================
// Error channel
// ============================================

/// Part of the report that a failed fetch degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsSection {
    /// Current-window rows: totals, pipeline, rates, time metrics
    Pipeline,
    /// Previous-window rows: trends only
    PreviousPeriod,
    UserActivity,
}

impl AnalyticsSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsSection::Pipeline => "pipeline",
            AnalyticsSection::PreviousPeriod => "previous_period",
            AnalyticsSection::UserActivity => "user_activity",
        }
    }
}

#[derive(Debug)]
pub struct SectionError {
    pub section: AnalyticsSection,
    pub error: Error,
}

/// Analytics result: `data` is always populated, `errors` says which parts
/// are defaults standing in for failed fetches.
#[derive(Debug)]
pub struct AnalyticsReport {
    pub data: AnalyticsData,
    pub errors: Vec<SectionError>,
}

impl AnalyticsReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&self) -> Option<&Error> {
        self.errors.first().map(|e| &e.error)
    }

    pub fn degraded(&self, section: AnalyticsSection) -> bool {
        self.errors.iter().any(|e| e.section == section)
    }
}

// ============================================
// Aggregation
// ============================================

/// Compute analytics for `range`, comparing against its previous period.
///
/// Invalid ranges are rejected with [`Error::Validation`] before the source
/// is queried. Fetch failures are absorbed into the report.
pub fn compute_analytics<S: AnalyticsSource + ?Sized>(
    source: &S,
    range: &DateRange,
    config: &AnalyticsConfig,
    now: DateTime<Utc>,
) -> Result<AnalyticsReport> {
    if !range.is_valid_at(now) {
        return Err(Error::Validation(format!(
            "invalid date range: {}",
            range.format()
        )));
    }

    let previous_range = range.previous_period_at(now);
    let mut errors = Vec::new();

    let current = record(
        source.pipeline_rows(range),
        AnalyticsSection::Pipeline,
        &mut errors,
    );
    let previous = if current.is_some() {
        record(
            source.pipeline_rows(&previous_range),
            AnalyticsSection::PreviousPeriod,
            &mut errors,
        )
        .map(|rows| before_start(rows, range))
    } else {
        None
    };
    let users = record(source.users(), AnalyticsSection::UserActivity, &mut errors);

    let mut data = AnalyticsData::empty(range.clone(), previous_range, now, config);

    if let Some(rows) = current.as_deref() {
        let stages = StageCounts::from_rows(rows);
        let previous_stages = previous.as_deref().map(StageCounts::from_rows);

        data.total_ideas = CountMetric {
            count: stages.total,
            trend: compare(
                stages.total as f64,
                previous_stages.map(|p| p.total as f64),
                COUNT_TREND_THRESHOLD,
            ),
        };
        data.pipeline = pipeline_breakdown(rows);
        data.completion_rates = completion_rates(&stages, previous_stages.as_ref());
        data.time_metrics = time_metrics(rows, previous.as_deref(), &config.benchmarks);

        tracing::debug!(
            range = %range,
            ideas = stages.total,
            approved = stages.approved,
            prototypes = stages.prototype,
            "Aggregated pipeline rows"
        );
    }

    if let Some(users) = users.as_deref() {
        data.user_activity = user_activity(current.as_deref().unwrap_or(&[]), users, config);
    }

    Ok(AnalyticsReport { data, errors })
}

fn record<T>(
    result: Result<T>,
    section: AnalyticsSection,
    errors: &mut Vec<SectionError>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(
                section = section.as_str(),
                error = %error,
                "Analytics fetch failed, using defaults"
            );
            errors.push(SectionError { section, error });
            None
        }
    }
}

/// Trend against an optional previous value; missing previous data is neutral.
fn compare(current: f64, previous: Option<f64>, threshold: f64) -> TrendData {
    match previous {
        Some(previous) => trend(current, previous, threshold),
        None => TrendData::default(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StageCounts {
    total: i64,
    approved: i64,
    prd: i64,
    prototype: i64,
}

impl StageCounts {
    fn from_rows(rows: &[PipelineRow]) -> Self {
        rows.iter().fold(Self::default(), |mut acc, row| {
            acc.total += 1;
            if row.status.reached_approval() {
                acc.approved += 1;
            }
            if row.status.reached_prd() {
                acc.prd += 1;
            }
            if row.status.reached_prototype() {
                acc.prototype += 1;
            }
            acc
        })
    }
}

fn pipeline_breakdown(rows: &[PipelineRow]) -> Vec<PipelineStage> {
    let total = rows.len() as i64;
    let mut counts: HashMap<IdeaStatus, i64> = HashMap::new();
    for row in rows {
        *counts.entry(row.status).or_default() += 1;
    }

    IdeaStatus::PIPELINE
        .iter()
        .map(|status| {
            let count = counts.get(status).copied().unwrap_or(0);
            PipelineStage {
                status: *status,
                label: status.display_name().to_string(),
                count,
                percentage: rate(count, total),
            }
        })
        .collect()
}

fn completion_rates(current: &StageCounts, previous: Option<&StageCounts>) -> CompletionRates {
    let conversion = |count: i64, total: i64, previous: Option<(i64, i64)>| {
        let mut conversion = ConversionRate::compute(count, total, 0.0);
        conversion.trend = compare(
            conversion.rate,
            previous.map(|(c, t)| rate(c, t)),
            RATE_TREND_THRESHOLD,
        );
        conversion
    };

    CompletionRates {
        submitted_to_approved: conversion(
            current.approved,
            current.total,
            previous.map(|p| (p.approved, p.total)),
        ),
        approved_to_prd: conversion(
            current.prd,
            current.approved,
            previous.map(|p| (p.prd, p.approved)),
        ),
        prd_to_prototype: conversion(
            current.prototype,
            current.prd,
            previous.map(|p| (p.prototype, p.prd)),
        ),
        overall: conversion(
            current.prototype,
            current.total,
            previous.map(|p| (p.prototype, p.total)),
        ),
    }
}

fn days_between(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Option<f64> {
    let seconds = (to? - from?).num_seconds();
    // clock skew between services can put milestones out of order
    (seconds >= 0).then(|| seconds as f64 / SECONDS_PER_DAY)
}

/// Duration samples per tracked transition.
#[derive(Debug, Default)]
struct TransitionSamples {
    decision: Vec<f64>,
    prd: Vec<f64>,
    prototype: Vec<f64>,
    end_to_end: Vec<f64>,
}

impl TransitionSamples {
    fn from_rows(rows: &[PipelineRow]) -> Self {
        let mut samples = Self::default();
        for row in rows {
            let decided = row.decision_time();
            samples
                .decision
                .extend(days_between(Some(row.created_at), decided));
            samples
                .prd
                .extend(days_between(decided, row.prd_created_at));
            samples
                .prototype
                .extend(days_between(row.prd_created_at, row.prototype_ready_at));
            samples
                .end_to_end
                .extend(days_between(Some(row.created_at), row.prototype_ready_at));
        }
        samples
    }
}

fn time_metrics(
    rows: &[PipelineRow],
    previous: Option<&[PipelineRow]>,
    targets: &BenchmarkTargets,
) -> TimeMetrics {
    let current = TransitionSamples::from_rows(rows);
    let prior = TransitionSamples::from_rows(previous.unwrap_or(&[]));

    let metric = |current: &[f64], prior: &[f64], target: &BenchmarkTarget| {
        let mut metric = TimeMetric::from_samples(current, prior, target);
        if previous.is_none() {
            metric.trend = TrendData::default();
        }
        metric
    };

    TimeMetrics {
        submission_to_decision: metric(
            &current.decision,
            &prior.decision,
            &targets.submission_to_decision,
        ),
        approval_to_prd: metric(&current.prd, &prior.prd, &targets.approval_to_prd),
        prd_to_prototype: metric(
            &current.prototype,
            &prior.prototype,
            &targets.prd_to_prototype,
        ),
        end_to_end: metric(&current.end_to_end, &prior.end_to_end, &targets.end_to_end),
    }
}

/// The previous window ends where `range` starts; the shared instant belongs
/// to the current window only.
fn before_start(mut rows: Vec<PipelineRow>, range: &DateRange) -> Vec<PipelineRow> {
    if let Some(start) = range.start {
        rows.retain(|row| row.created_at < start);
    }
    rows
}

fn user_activity(
    rows: &[PipelineRow],
    users: &[UserProfile],
    config: &AnalyticsConfig,
) -> UserActivity {
    let names: HashMap<&str, String> = users.iter().map(|u| (u.id.as_str(), u.label())).collect();
    let name_of = |user_id: Option<&str>| {
        user_id
            .and_then(|id| names.get(id).cloned())
            .unwrap_or_else(|| "Unknown".to_string())
    };

    let mut per_user: HashMap<&str, (i64, i64)> = HashMap::new();
    for row in rows {
        if let Some(user_id) = row.user_id.as_deref() {
            let entry = per_user.entry(user_id).or_default();
            entry.0 += 1;
            if row.status.reached_approval() {
                entry.1 += 1;
            }
        }
    }

    let total_users = users.len() as i64;
    // submitters without a profile show on the leaderboard but are not users
    let active_users = per_user.keys().filter(|id| names.contains_key(*id)).count() as i64;

    let mut leaderboard: Vec<LeaderboardEntry> = per_user
        .into_iter()
        .map(|(user_id, (submissions, approved))| LeaderboardEntry {
            user_id: user_id.to_string(),
            name: name_of(Some(user_id)),
            submissions,
            approved,
        })
        .collect();
    leaderboard.sort_by(|a, b| {
        b.submissions
            .cmp(&a.submissions)
            .then(b.approved.cmp(&a.approved))
            .then_with(|| a.name.cmp(&b.name))
    });
    leaderboard.truncate(config.leaderboard_size);

    let mut recent: Vec<&PipelineRow> = rows.iter().collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let recent_submissions = recent
        .into_iter()
        .take(config.recent_submissions)
        .map(|row| RecentSubmission {
            idea_id: row.idea_id.clone(),
            title: row.title.clone(),
            submitter: name_of(row.user_id.as_deref()),
            status: row.status,
            created_at: row.created_at,
        })
        .collect();

    UserActivity {
        total_users,
        active_users,
        active_ratio: rate(active_users, total_users),
        leaderboard,
        recent_submissions,
    }
}
