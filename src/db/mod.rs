//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for bots, developer profiles and interactions.

mod catalog;
mod ledger;

pub use catalog::*;
pub use ledger::*;

use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Fixed-width UTC timestamp, so stored values sort lexicographically.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        INSERT OR IGNORE INTO meta (id, schema_version, revision_id, generated_at)
        VALUES (1, 1, 0, datetime('now'));
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bots (
            bot_id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0),
            developer_name TEXT,
            version TEXT,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'offline'
                CHECK (status IN ('online', 'offline', 'maintenance')),
            deployment_hosts TEXT NOT NULL DEFAULT '[]',
            image_url TEXT,
            archive_url TEXT,
            github_url TEXT,
            developer_site TEXT,
            posted_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            revision INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Profiles outlive their bot on purpose: no foreign key to bots.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS developers (
            bot_id TEXT PRIMARY KEY,
            bot_name TEXT NOT NULL,
            developer_name TEXT,
            description TEXT,
            github_link TEXT,
            website TEXT,
            channel_link TEXT,
            group_link TEXT,
            contact TEXT,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bot_interactions (
            bot_id TEXT NOT NULL REFERENCES bots(bot_id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            liked INTEGER NOT NULL DEFAULT 0,
            disliked INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (bot_id, user_id),
            CHECK (NOT (liked = 1 AND disliked = 1))
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bot_comments (
            comment_id TEXT PRIMARY KEY,
            bot_id TEXT NOT NULL REFERENCES bots(bot_id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (bot_id, user_id, seq)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_bots_created_at ON bots(created_at);
        CREATE INDEX IF NOT EXISTS idx_bots_posted_by ON bots(posted_by);
        CREATE INDEX IF NOT EXISTS idx_developers_bot_name ON developers(bot_name);
        CREATE INDEX IF NOT EXISTS idx_comments_bot ON bot_comments(bot_id, created_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
