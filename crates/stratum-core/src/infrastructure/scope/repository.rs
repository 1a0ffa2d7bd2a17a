//! SQLite scope repository and enumerator

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::scope::{Scope, ScopeEnumerator};
use crate::error::Result;
use crate::infrastructure::parse_timestamp;

/// SQLite-backed scope registry
#[derive(Clone)]
pub struct SqliteScopeRepository {
    pool: SqlitePool,
}

impl SqliteScopeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or rename a scope
    pub async fn save_scope(&self, scope: &Scope) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scopes (id, name, created_at) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(&scope.id)
        .bind(&scope.name)
        .bind(scope.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(scope_id = %scope.id, name = %scope.name, "Scope saved");
        Ok(())
    }

    pub async fn get_scope(&self, id: &str) -> Result<Option<Scope>> {
        let row: Option<ScopeRow> = sqlx::query_as("SELECT * FROM scopes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(ScopeRow::into_scope))
    }
}

#[async_trait]
impl ScopeEnumerator for SqliteScopeRepository {
    async fn fetch_all(&self) -> Result<Vec<Scope>> {
        let rows: Vec<ScopeRow> = sqlx::query_as("SELECT * FROM scopes ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(ScopeRow::into_scope).collect())
    }
}

#[derive(Debug, FromRow)]
struct ScopeRow {
    id: String,
    name: String,
    created_at: String,
}

impl ScopeRow {
    fn into_scope(self) -> Scope {
        Scope {
            id: self.id,
            name: self.name,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}
