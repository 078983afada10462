//! Database repository layer
//!
//! Provides query and insert operations for the mirrored pipeline tables.

use crate::analytics::{AnalyticsSource, DateRange};
use crate::error::{Error, Result};
use crate::generation::{GenerationHooks, ReadyPrototype};
use crate::types::*;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

/// Row counts per mirrored table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorCounts {
    pub users: i64,
    pub ideas: i64,
    pub prds: i64,
    pub prototypes: i64,
}

/// A cached analytics payload.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub range_key: String,
    pub computed_at: DateTime<Utc>,
    pub payload: String,
}

/// Database handle with connection management
pub struct Database {
    conn: Mutex<Connection>,
}

/// Timestamps are stored fixed-width in UTC so that text comparison in SQL
/// orders them correctly.
fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Unparsable values fail the row rather than landing in the current window.
fn required_ts(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            tracing::warn!(column, value = %raw, "Unparsable timestamp in mirror");
            let index = row.as_ref().column_index(column).unwrap_or_default();
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
        })
}

fn optional_ts(row: &Row, column: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    Ok(raw.as_deref().and_then(parse_ts))
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;

        tracing::debug!(path = %path.display(), "Opened database");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Users
    // ============================================

    pub fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO users (id, email, display_name, role, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                display_name = excluded.display_name,
                role = excluded.role
            "#,
            params![
                user.id,
                user.email,
                user.display_name,
                user.role,
                ts(user.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_users(&self) -> Result<Vec<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM users ORDER BY created_at")?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn row_to_user(row: &Row) -> rusqlite::Result<UserProfile> {
        Ok(UserProfile {
            id: row.get("id")?,
            email: row.get("email")?,
            display_name: row.get("display_name")?,
            role: row.get("role")?,
            created_at: required_ts(row, "created_at")?,
        })
    }

    // ============================================
    // Ideas
    // ============================================

    /// Insert or update an idea
    pub fn upsert_idea(&self, idea: &Idea) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO ideas (id, user_id, title, description, status, created_at,
                               updated_at, status_updated_at, decided_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                title = excluded.title,
                description = excluded.description,
                status = excluded.status,
                updated_at = excluded.updated_at,
                status_updated_at = COALESCE(excluded.status_updated_at, ideas.status_updated_at),
                decided_at = COALESCE(excluded.decided_at, ideas.decided_at)
            "#,
            params![
                idea.id,
                idea.user_id,
                idea.title,
                idea.description,
                idea.status.as_str(),
                ts(idea.created_at),
                ts(idea.updated_at),
                idea.status_updated_at.map(ts),
                idea.decided_at.map(ts),
            ],
        )?;
        Ok(())
    }

    pub fn get_idea(&self, id: &str) -> Result<Option<Idea>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM ideas WHERE id = ?", [id], Self::row_to_idea)
            .optional()
            .map_err(Error::from)
    }

    /// Move an idea to `status`, stamping the change time. Returns false when
    /// the idea is not mirrored.
    pub fn set_idea_status(&self, id: &str, status: IdeaStatus, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE ideas SET status = ?2, updated_at = ?3, status_updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), ts(at)],
        )?;
        Ok(changed > 0)
    }

    fn row_to_idea(row: &Row) -> rusqlite::Result<Idea> {
        let status_str: String = row.get("status")?;
        Ok(Idea {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            status: status_str.parse().unwrap_or(IdeaStatus::Submitted),
            created_at: required_ts(row, "created_at")?,
            updated_at: required_ts(row, "updated_at")?,
            status_updated_at: optional_ts(row, "status_updated_at")?,
            decided_at: optional_ts(row, "decided_at")?,
        })
    }

    // ============================================
    // PRDs and prototypes
    // ============================================

    pub fn upsert_prd(&self, prd: &Prd) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO prds (id, idea_id, content, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                updated_at = excluded.updated_at
            "#,
            params![
                prd.id,
                prd.idea_id,
                prd.content,
                ts(prd.created_at),
                ts(prd.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_prd(&self, id: &str) -> Result<Option<Prd>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM prds WHERE id = ?", [id], |row| {
            Ok(Prd {
                id: row.get("id")?,
                idea_id: row.get("idea_id")?,
                content: row.get("content")?,
                created_at: required_ts(row, "created_at")?,
                updated_at: required_ts(row, "updated_at")?,
            })
        })
        .optional()
        .map_err(Error::from)
    }

    pub fn upsert_prototype(&self, prototype: &Prototype) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO prototypes (id, prd_id, idea_id, status, url, error_code,
                                    created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                url = COALESCE(excluded.url, prototypes.url),
                error_code = excluded.error_code,
                updated_at = excluded.updated_at
            "#,
            params![
                prototype.id,
                prototype.prd_id,
                prototype.idea_id,
                prototype.status.as_str(),
                prototype.url,
                prototype.error_code,
                ts(prototype.created_at),
                ts(prototype.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_prototype(&self, id: &str) -> Result<Option<Prototype>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM prototypes WHERE id = ?", [id], |row| {
            let status_str: String = row.get("status")?;
            Ok(Prototype {
                id: row.get("id")?,
                prd_id: row.get("prd_id")?,
                idea_id: row.get("idea_id")?,
                status: status_str.parse().unwrap_or(PrototypeStatus::Failed),
                url: row.get("url")?,
                error_code: row.get("error_code")?,
                created_at: required_ts(row, "created_at")?,
                updated_at: required_ts(row, "updated_at")?,
            })
        })
        .optional()
        .map_err(Error::from)
    }

    pub fn counts(&self) -> Result<MirrorCounts> {
        let conn = self.conn.lock().unwrap();
        let count = |table: &str| -> Result<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
                r.get(0)
            })?)
        };
        Ok(MirrorCounts {
            users: count("users")?,
            ideas: count("ideas")?,
            prds: count("prds")?,
            prototypes: count("prototypes")?,
        })
    }

    // ============================================
    // Analytics queries
    // ============================================

    /// Ideas created inside `range`, each joined with its first PRD and the
    /// time its first prototype became ready.
    pub fn list_pipeline_rows(&self, range: &DateRange) -> Result<Vec<PipelineRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT
                i.id, i.title, i.user_id, i.status, i.created_at, i.updated_at,
                i.status_updated_at, i.decided_at,
                (SELECT MIN(p.created_at) FROM prds p WHERE p.idea_id = i.id)
                    AS prd_created_at,
                (SELECT MIN(COALESCE(t.updated_at, t.created_at)) FROM prototypes t
                    WHERE t.idea_id = i.id AND t.status = 'ready')
                    AS prototype_ready_at
            FROM ideas i
            WHERE (?1 IS NULL OR i.created_at >= ?1) AND i.created_at <= ?2
            ORDER BY i.created_at DESC
            "#,
        )?;

        let rows = stmt
            .query_map(params![range.start.map(ts), ts(range.end)], |row| {
                let status_str: String = row.get("status")?;
                Ok(PipelineRow {
                    idea_id: row.get("id")?,
                    title: row.get("title")?,
                    user_id: row.get("user_id")?,
                    status: status_str.parse().unwrap_or(IdeaStatus::Submitted),
                    created_at: required_ts(row, "created_at")?,
                    updated_at: required_ts(row, "updated_at")?,
                    status_updated_at: optional_ts(row, "status_updated_at")?,
                    decided_at: optional_ts(row, "decided_at")?,
                    prd_created_at: optional_ts(row, "prd_created_at")?,
                    prototype_ready_at: optional_ts(row, "prototype_ready_at")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    // ============================================
    // Analytics snapshots
    // ============================================

    pub fn get_analytics_snapshot(&self, range_key: &str) -> Result<Option<StoredSnapshot>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT range_key, computed_at, payload FROM analytics_snapshots WHERE range_key = ?",
            [range_key],
            |row| {
                Ok(StoredSnapshot {
                    range_key: row.get("range_key")?,
                    computed_at: required_ts(row, "computed_at")?,
                    payload: row.get("payload")?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    pub fn put_analytics_snapshot(
        &self,
        range_key: &str,
        computed_at: DateTime<Utc>,
        payload: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO analytics_snapshots (range_key, computed_at, payload)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(range_key) DO UPDATE SET
                computed_at = excluded.computed_at,
                payload = excluded.payload
            "#,
            params![range_key, ts(computed_at), payload],
        )?;
        Ok(())
    }

    /// Drop every cached report; returns how many were removed.
    pub fn clear_analytics_snapshots(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM analytics_snapshots", [])?;
        Ok(removed)
    }
}

impl AnalyticsSource for Database {
    fn pipeline_rows(&self, range: &DateRange) -> Result<Vec<PipelineRow>> {
        self.list_pipeline_rows(range)
    }

    fn users(&self) -> Result<Vec<UserProfile>> {
        self.list_users()
    }
}

impl GenerationHooks for Database {
    fn invalidate(&self) -> Result<()> {
        let removed = self.clear_analytics_snapshots()?;
        tracing::debug!(removed, "Invalidated analytics snapshots");
        Ok(())
    }

    fn on_ready(&self, prototype: &ReadyPrototype) -> Result<()> {
        let now = Utc::now();
        let created_at = self
            .get_prototype(&prototype.prototype_id)?
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        self.upsert_prototype(&Prototype {
            id: prototype.prototype_id.clone(),
            prd_id: prototype.prd_id.clone(),
            idea_id: prototype.idea_id.clone(),
            status: PrototypeStatus::Ready,
            url: prototype.url.clone(),
            error_code: None,
            created_at,
            updated_at: now,
        })?;

        if !self.set_idea_status(&prototype.idea_id, IdeaStatus::PrototypeComplete, now)? {
            tracing::debug!(
                idea_id = %prototype.idea_id,
                "Idea not mirrored locally, skipping status update"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, d, h, 0, 0).unwrap()
    }

    fn create_test_idea(id: &str, status: IdeaStatus, created_at: DateTime<Utc>) -> Idea {
        Idea {
            id: id.to_string(),
            user_id: Some("u1".to_string()),
            title: format!("Idea {}", id),
            description: None,
            status,
            created_at,
            updated_at: created_at,
            status_updated_at: None,
            decided_at: None,
        }
    }

    #[test]
    fn test_idea_upsert_and_get() {
        let db = test_db();
        let mut idea = create_test_idea("i1", IdeaStatus::Submitted, at(2, 9));
        db.upsert_idea(&idea).unwrap();

        idea.status = IdeaStatus::Approved;
        idea.decided_at = Some(at(3, 9));
        db.upsert_idea(&idea).unwrap();

        let stored = db.get_idea("i1").unwrap().unwrap();
        assert_eq!(stored.status, IdeaStatus::Approved);
        assert_eq!(stored.decided_at, Some(at(3, 9)));
        assert_eq!(stored.created_at, at(2, 9));
        assert!(db.get_idea("missing").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_timestamp_is_an_error() {
        let db = test_db();
        db.upsert_idea(&create_test_idea("i1", IdeaStatus::Submitted, at(2, 9)))
            .unwrap();
        db.conn
            .lock()
            .unwrap()
            .execute("UPDATE ideas SET updated_at = 'yesterday' WHERE id = 'i1'", [])
            .unwrap();

        let err = db.get_idea("i1").unwrap_err();
        assert!(matches!(
            err,
            Error::Database(rusqlite::Error::FromSqlConversionFailure(_, Type::Text, _))
        ));
        // the row is still inside January, so the range query reaches it too
        let january = DateRange::custom(at(1, 0), at(31, 0));
        assert!(db.list_pipeline_rows(&january).is_err());
    }

    #[test]
    fn test_pipeline_rows_filter_and_join() {
        let db = test_db();
        db.upsert_idea(&create_test_idea("old", IdeaStatus::Submitted, at(1, 0)))
            .unwrap();
        db.upsert_idea(&create_test_idea("i1", IdeaStatus::PrototypeComplete, at(10, 0)))
            .unwrap();

        for (id, created) in [("p2", at(13, 0)), ("p1", at(12, 0))] {
            db.upsert_prd(&Prd {
                id: id.to_string(),
                idea_id: "i1".to_string(),
                content: String::new(),
                created_at: created,
                updated_at: created,
            })
            .unwrap();
        }
        for (id, status, updated) in [
            ("t1", PrototypeStatus::Failed, at(13, 0)),
            ("t2", PrototypeStatus::Ready, at(14, 0)),
        ] {
            db.upsert_prototype(&Prototype {
                id: id.to_string(),
                prd_id: "p1".to_string(),
                idea_id: "i1".to_string(),
                status,
                url: None,
                error_code: None,
                created_at: at(12, 12),
                updated_at: updated,
            })
            .unwrap();
        }

        let range = DateRange::custom(at(5, 0), at(20, 0));
        let rows = db.list_pipeline_rows(&range).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].idea_id, "i1");
        assert_eq!(rows[0].prd_created_at, Some(at(12, 0)));
        assert_eq!(rows[0].prototype_ready_at, Some(at(14, 0)));

        let all_time = DateRange {
            start: None,
            end: at(20, 0),
            label: "All time".to_string(),
        };
        assert_eq!(db.list_pipeline_rows(&all_time).unwrap().len(), 2);
    }

    #[test]
    fn test_pipeline_rows_inclusive_bounds() {
        let db = test_db();
        db.upsert_idea(&create_test_idea("edge", IdeaStatus::Submitted, at(5, 0)))
            .unwrap();
        let range = DateRange::custom(at(5, 0), at(5, 0));
        assert_eq!(db.list_pipeline_rows(&range).unwrap().len(), 1);

        let range = DateRange::custom(at(5, 0) + Duration::milliseconds(1), at(6, 0));
        assert!(db.list_pipeline_rows(&range).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_round_trip_and_clear() {
        let db = test_db();
        db.put_analytics_snapshot("last7days", at(3, 0), "{}").unwrap();
        db.put_analytics_snapshot("last7days", at(4, 0), "{\"a\":1}")
            .unwrap();

        let snapshot = db.get_analytics_snapshot("last7days").unwrap().unwrap();
        assert_eq!(snapshot.computed_at, at(4, 0));
        assert_eq!(snapshot.payload, "{\"a\":1}");

        assert_eq!(db.clear_analytics_snapshots().unwrap(), 1);
        assert!(db.get_analytics_snapshot("last7days").unwrap().is_none());
    }

    #[test]
    fn test_on_ready_marks_idea_complete() {
        let db = test_db();
        db.upsert_idea(&create_test_idea("i1", IdeaStatus::PrdDevelopment, at(1, 0)))
            .unwrap();
        db.put_analytics_snapshot("alltime", at(1, 0), "{}").unwrap();

        let ready = ReadyPrototype {
            prototype_id: "t1".to_string(),
            prd_id: "p1".to_string(),
            idea_id: "i1".to_string(),
            url: Some("https://proto.example/t1".to_string()),
        };
        db.invalidate().unwrap();
        db.on_ready(&ready).unwrap();

        let idea = db.get_idea("i1").unwrap().unwrap();
        assert_eq!(idea.status, IdeaStatus::PrototypeComplete);
        assert!(idea.status_updated_at.is_some());

        let prototype = db.get_prototype("t1").unwrap().unwrap();
        assert_eq!(prototype.status, PrototypeStatus::Ready);
        assert_eq!(prototype.url.as_deref(), Some("https://proto.example/t1"));
        assert!(db.get_analytics_snapshot("alltime").unwrap().is_none());
    }

    #[test]
    fn test_counts() {
        let db = test_db();
        db.upsert_idea(&create_test_idea("i1", IdeaStatus::Submitted, at(1, 0)))
            .unwrap();
        db.upsert_user(&UserProfile {
            id: "u1".to_string(),
            email: Some("a@example.com".to_string()),
            display_name: None,
            role: None,
            created_at: at(1, 0),
        })
        .unwrap();

        let counts = db.counts().unwrap();
        assert_eq!(counts.ideas, 1);
        assert_eq!(counts.users, 1);
        assert_eq!(counts.prds, 0);
        assert!(db.get_prd("missing").unwrap().is_none());
    }
}
