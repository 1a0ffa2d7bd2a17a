//! Database migrations
//!
//! Versioned SQLite schema for scopes, the concept graph and the community
//! hierarchy. Migrations are applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: scopes and the concept graph
const MIGRATION_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS scopes (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS concepts (
        id TEXT PRIMARY KEY NOT NULL,
        scope_id TEXT NOT NULL,
        value TEXT NOT NULL,
        canonical_value TEXT NOT NULL,
        description TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (scope_id, canonical_value)
    );

    CREATE INDEX IF NOT EXISTS idx_concepts_scope ON concepts(scope_id);

    -- Undirected co-occurrence edges, stored with source_id < target_id
    CREATE TABLE IF NOT EXISTS concept_relationships (
        id TEXT PRIMARY KEY NOT NULL,
        scope_id TEXT NOT NULL,
        source_id TEXT NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
        target_id TEXT NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
        weight REAL NOT NULL DEFAULT 1.0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (source_id, target_id)
    );

    CREATE INDEX IF NOT EXISTS idx_concept_rel_scope ON concept_relationships(scope_id);
    CREATE INDEX IF NOT EXISTS idx_concept_rel_source ON concept_relationships(source_id);
    CREATE INDEX IF NOT EXISTS idx_concept_rel_target ON concept_relationships(target_id);

    CREATE TABLE IF NOT EXISTS content_concepts (
        content_id TEXT NOT NULL,
        content_type TEXT NOT NULL,
        concept_id TEXT NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
        scope_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (content_id, content_type, concept_id)
    );

    CREATE INDEX IF NOT EXISTS idx_content_concepts_concept ON content_concepts(concept_id);
"#;

/// Migration 2: community hierarchy
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS communities (
        id TEXT PRIMARY KEY NOT NULL,
        scope_id TEXT NOT NULL,
        level INTEGER NOT NULL,
        name TEXT NOT NULL,
        summary TEXT,
        embedding BLOB,
        rating REAL NOT NULL DEFAULT 0.0,
        member_count INTEGER NOT NULL DEFAULT 0,
        is_stale INTEGER NOT NULL DEFAULT 1,
        stale_since TEXT,
        last_processed_at TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_communities_scope_level ON communities(scope_id, level);
    CREATE INDEX IF NOT EXISTS idx_communities_stale ON communities(is_stale);

    CREATE TABLE IF NOT EXISTS community_members (
        community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
        concept_id TEXT NOT NULL REFERENCES concepts(id) ON DELETE CASCADE,
        PRIMARY KEY (community_id, concept_id)
    );

    CREATE INDEX IF NOT EXISTS idx_community_members_concept ON community_members(concept_id);

    -- At most one parent per community
    CREATE TABLE IF NOT EXISTS community_parents (
        child_id TEXT PRIMARY KEY NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
        parent_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_community_parents_parent ON community_parents(parent_id);
"#;

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Scopes and concept graph");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Community hierarchy");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    Ok(())
}

async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}
