//! Pull the hosted tables into the local database.

use crate::db::Database;
use crate::error::Result;

use super::client::BackendClient;

/// What a sync pass wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub users: usize,
    pub ideas: usize,
    pub prds: usize,
    pub prototypes: usize,
    /// Analytics snapshots dropped because the data changed
    pub snapshots_cleared: usize,
}

impl SyncSummary {
    pub fn total_rows(&self) -> usize {
        self.users + self.ideas + self.prds + self.prototypes
    }
}

/// Upsert every hosted row into `db` and drop cached analytics.
///
/// All tables are fetched before anything is written, so a failed fetch
/// leaves the mirror untouched.
pub async fn sync_mirror(client: &BackendClient, db: &Database) -> Result<SyncSummary> {
    let users = client.fetch_users().await?;
    let ideas = client.fetch_ideas().await?;
    let prds = client.fetch_prds().await?;
    let prototypes = client.fetch_prototypes().await?;

    for user in &users {
        db.upsert_user(user)?;
    }
    for idea in &ideas {
        db.upsert_idea(idea)?;
    }
    for prd in &prds {
        db.upsert_prd(prd)?;
    }
    for prototype in &prototypes {
        db.upsert_prototype(prototype)?;
    }

    let summary = SyncSummary {
        users: users.len(),
        ideas: ideas.len(),
        prds: prds.len(),
        prototypes: prototypes.len(),
        snapshots_cleared: db.clear_analytics_snapshots()?,
    };

    tracing::info!(
        users = summary.users,
        ideas = summary.ideas,
        prds = summary.prds,
        prototypes = summary.prototypes,
        snapshots_cleared = summary.snapshots_cleared,
        "Mirror sync complete"
    );

    Ok(summary)
}
