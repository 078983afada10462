//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: mirror of the hosted pipeline tables
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id               TEXT PRIMARY KEY,
        email            TEXT,
        display_name     TEXT,
        role             TEXT,
        created_at       DATETIME NOT NULL
    );

    CREATE TABLE IF NOT EXISTS ideas (
        id                TEXT PRIMARY KEY,
        user_id           TEXT,
        title             TEXT NOT NULL,
        description       TEXT,
        status            TEXT NOT NULL,
        created_at        DATETIME NOT NULL,
        updated_at        DATETIME NOT NULL,
        status_updated_at DATETIME,
        decided_at        DATETIME
    );

    CREATE INDEX IF NOT EXISTS idx_ideas_created_at ON ideas(created_at);
    CREATE INDEX IF NOT EXISTS idx_ideas_user ON ideas(user_id);

    CREATE TABLE IF NOT EXISTS prds (
        id               TEXT PRIMARY KEY,
        idea_id          TEXT NOT NULL,
        content          TEXT NOT NULL DEFAULT '',
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_prds_idea ON prds(idea_id);

    CREATE TABLE IF NOT EXISTS prototypes (
        id               TEXT PRIMARY KEY,
        prd_id           TEXT NOT NULL,
        idea_id          TEXT NOT NULL,
        status           TEXT NOT NULL,
        url              TEXT,
        error_code       TEXT,
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_prototypes_idea ON prototypes(idea_id, status);
    "#,
    // Version 2: cached analytics reports per named range
    r#"
    CREATE TABLE IF NOT EXISTS analytics_snapshots (
        range_key        TEXT PRIMARY KEY,
        computed_at      DATETIME NOT NULL,
        payload          JSON NOT NULL
    );
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_reach_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        assert_eq!(MIGRATIONS.len() as i32, SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('users', 'ideas', 'prds', 'prototypes', 'analytics_snapshots')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }
}
