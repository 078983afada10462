//! Core domain types for ideaflow
//!
//! These mirror the hosted tables the admin dashboard works against.
//!
//! | Term | Definition |
//! |------|------------|
//! | **Idea** | A submission from an employee, moving through the pipeline |
//! | **PRD** | Product requirements document written for an approved idea |
//! | **Prototype** | An AI-generated artifact built from a PRD |
//! | **Pipeline stage** | One of the ordered [`IdeaStatus`] values |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================
// Ideas
// ============================================

/// Pipeline stage of an idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    Submitted,
    Approved,
    PrdDevelopment,
    PrototypeComplete,
    Rejected,
}

impl IdeaStatus {
    /// All statuses in pipeline order.
    pub const PIPELINE: [IdeaStatus; 5] = [
        IdeaStatus::Submitted,
        IdeaStatus::Approved,
        IdeaStatus::PrdDevelopment,
        IdeaStatus::PrototypeComplete,
        IdeaStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdeaStatus::Submitted => "submitted",
            IdeaStatus::Approved => "approved",
            IdeaStatus::PrdDevelopment => "prd_development",
            IdeaStatus::PrototypeComplete => "prototype_complete",
            IdeaStatus::Rejected => "rejected",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            IdeaStatus::Submitted => "Submitted",
            IdeaStatus::Approved => "Approved",
            IdeaStatus::PrdDevelopment => "PRD Development",
            IdeaStatus::PrototypeComplete => "Prototype Complete",
            IdeaStatus::Rejected => "Rejected",
        }
    }

    /// Position in the fixed pipeline order.
    pub fn pipeline_index(&self) -> usize {
        match self {
            IdeaStatus::Submitted => 0,
            IdeaStatus::Approved => 1,
            IdeaStatus::PrdDevelopment => 2,
            IdeaStatus::PrototypeComplete => 3,
            IdeaStatus::Rejected => 4,
        }
    }

    /// Approved, or any stage past approval.
    pub fn reached_approval(&self) -> bool {
        matches!(
            self,
            IdeaStatus::Approved | IdeaStatus::PrdDevelopment | IdeaStatus::PrototypeComplete
        )
    }

    /// PRD work started or finished.
    pub fn reached_prd(&self) -> bool {
        matches!(
            self,
            IdeaStatus::PrdDevelopment | IdeaStatus::PrototypeComplete
        )
    }

    pub fn reached_prototype(&self) -> bool {
        matches!(self, IdeaStatus::PrototypeComplete)
    }

    /// An admin has approved or rejected the idea.
    pub fn is_decided(&self) -> bool {
        !matches!(self, IdeaStatus::Submitted)
    }
}

impl fmt::Display for IdeaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdeaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(IdeaStatus::Submitted),
            "approved" => Ok(IdeaStatus::Approved),
            "prd_development" => Ok(IdeaStatus::PrdDevelopment),
            "prototype_complete" => Ok(IdeaStatus::PrototypeComplete),
            "rejected" => Ok(IdeaStatus::Rejected),
            other => Err(format!("unknown idea status: {}", other)),
        }
    }
}

/// An idea submitted by an employee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    pub id: String,
    /// Submitting user
    pub user_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: IdeaStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last time `status` changed
    #[serde(default)]
    pub status_updated_at: Option<DateTime<Utc>>,
    /// When an admin approved or rejected the idea
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

// ============================================
// PRDs and prototypes
// ============================================

/// Product requirements document for an approved idea.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prd {
    pub id: String,
    pub idea_id: String,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a generated prototype as reported by the status store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrototypeStatus {
    Generating,
    Ready,
    Failed,
}

impl PrototypeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrototypeStatus::Generating => "generating",
            PrototypeStatus::Ready => "ready",
            PrototypeStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PrototypeStatus::Generating)
    }
}

impl fmt::Display for PrototypeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrototypeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generating" => Ok(PrototypeStatus::Generating),
            "ready" => Ok(PrototypeStatus::Ready),
            "failed" => Ok(PrototypeStatus::Failed),
            other => Err(format!("unknown prototype status: {}", other)),
        }
    }
}

/// A prototype generated from a PRD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prototype {
    pub id: String,
    pub prd_id: String,
    pub idea_id: String,
    pub status: PrototypeStatus,
    #[serde(default)]
    pub url: Option<String>,
    /// Service error code when `status` is failed
    #[serde(default)]
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================
// Users
// ============================================

/// Employee or admin account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Best human-readable name for leaderboards.
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| self.id.clone())
    }
}

// ============================================
// Analytics input rows
// ============================================

/// An idea joined with the timestamps of its later pipeline milestones.
///
/// This is the raw row shape the analytics layer reduces; sources are free
/// to build it however they like (SQL join, REST, fixtures).
#[derive(Debug, Clone)]
pub struct PipelineRow {
    pub idea_id: String,
    pub title: String,
    pub user_id: Option<String>,
    pub status: IdeaStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    /// Earliest PRD written for the idea
    pub prd_created_at: Option<DateTime<Utc>>,
    /// When the first prototype for the idea became ready
    pub prototype_ready_at: Option<DateTime<Utc>>,
}

impl PipelineRow {
    /// Decision time, falling back to the last status change for decided ideas
    /// mirrored before `decided_at` was tracked.
    pub fn decision_time(&self) -> Option<DateTime<Utc>> {
        self.decided_at.or_else(|| {
            matches!(self.status, IdeaStatus::Approved | IdeaStatus::Rejected)
                .then_some(self.status_updated_at)
                .flatten()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_idea_status_round_trip_strings() {
        for status in IdeaStatus::PIPELINE {
            assert_eq!(status.as_str().parse::<IdeaStatus>().unwrap(), status);
        }
        assert!("archived".parse::<IdeaStatus>().is_err());
    }

    #[test]
    fn test_pipeline_order() {
        let indices: Vec<usize> = IdeaStatus::PIPELINE
            .iter()
            .map(|s| s.pipeline_index())
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_stage_progression() {
        assert!(!IdeaStatus::Submitted.reached_approval());
        assert!(!IdeaStatus::Rejected.reached_approval());
        assert!(IdeaStatus::PrototypeComplete.reached_approval());
        assert!(IdeaStatus::PrdDevelopment.reached_prd());
        assert!(!IdeaStatus::Approved.reached_prd());
        assert!(IdeaStatus::Rejected.is_decided());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&IdeaStatus::PrdDevelopment).unwrap();
        assert_eq!(json, "\"prd_development\"");
        let status: PrototypeStatus = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(status, PrototypeStatus::Ready);
        assert!(status.is_terminal());
        assert!(!PrototypeStatus::Generating.is_terminal());
    }

    #[test]
    fn test_decision_time_fallback() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let changed = Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap();
        let mut row = PipelineRow {
            idea_id: "i1".to_string(),
            title: "Idea".to_string(),
            user_id: None,
            status: IdeaStatus::Rejected,
            created_at: created,
            updated_at: changed,
            status_updated_at: Some(changed),
            decided_at: None,
            prd_created_at: None,
            prototype_ready_at: None,
        };
        assert_eq!(row.decision_time(), Some(changed));

        // a later status change does not describe the decision
        row.status = IdeaStatus::PrdDevelopment;
        assert_eq!(row.decision_time(), None);
    }
}
