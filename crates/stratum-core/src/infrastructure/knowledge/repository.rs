//! SQLite implementation of the ConceptRepository

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::domain::knowledge::{Concept, ConceptRelationship, ConceptRepository, canonical_pair};
use crate::error::{Error, Result};
use crate::infrastructure::parse_timestamp;

/// SQLite implementation of the concept repository
#[derive(Clone)]
pub struct SqliteConceptRepository {
    pool: SqlitePool,
}

impl SqliteConceptRepository {
    /// Create a new SQLite concept repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn get_relationship_between(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Result<Option<ConceptRelationship>> {
        let row: Option<RelationshipRow> = sqlx::query_as(
            "SELECT * FROM concept_relationships WHERE source_id = ? AND target_id = ?",
        )
        .bind(source_id)
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RelationshipRow::into_relationship))
    }
}

#[async_trait]
impl ConceptRepository for SqliteConceptRepository {
    async fn save_concept(&self, concept: &Concept) -> Result<Concept> {
        if concept.canonical_value.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Concept value '{}' is empty after normalization",
                concept.value
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO concepts (
                id, scope_id, value, canonical_value, description, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(scope_id, canonical_value) DO UPDATE SET
                description = COALESCE(excluded.description, concepts.description),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&concept.id)
        .bind(&concept.scope_id)
        .bind(&concept.value)
        .bind(&concept.canonical_value)
        .bind(&concept.description)
        .bind(concept.created_at.to_rfc3339())
        .bind(concept.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row: ConceptRow = sqlx::query_as(
            "SELECT * FROM concepts WHERE scope_id = ? AND canonical_value = ?",
        )
        .bind(&concept.scope_id)
        .bind(&concept.canonical_value)
        .fetch_one(&self.pool)
        .await?;

        debug!(concept_id = %row.id, value = %row.value, "Concept saved");
        Ok(row.into_concept())
    }

    async fn get_concept(&self, id: &str) -> Result<Option<Concept>> {
        let row: Option<ConceptRow> = sqlx::query_as("SELECT * FROM concepts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(ConceptRow::into_concept))
    }

    async fn find_concept_by_value(&self, scope_id: &str, value: &str) -> Result<Option<Concept>> {
        let row: Option<ConceptRow> = sqlx::query_as(
            "SELECT * FROM concepts WHERE scope_id = ? AND canonical_value = ?",
        )
        .bind(scope_id)
        .bind(Concept::canonicalize(value))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ConceptRow::into_concept))
    }

    async fn list_concepts(&self, scope_id: &str) -> Result<Vec<Concept>> {
        let rows: Vec<ConceptRow> = sqlx::query_as(
            "SELECT * FROM concepts WHERE scope_id = ? ORDER BY canonical_value",
        )
        .bind(scope_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ConceptRow::into_concept).collect())
    }

    async fn count_concepts(&self, scope_id: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM concepts WHERE scope_id = ?")
            .bind(scope_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn record_cooccurrence(
        &self,
        scope_id: &str,
        a: &str,
        b: &str,
        weight: f64,
    ) -> Result<ConceptRelationship> {
        if a == b {
            return Err(Error::InvalidInput(format!(
                "Concept '{}' cannot co-occur with itself",
                a
            )));
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "Co-occurrence weight must be positive, got {}",
                weight
            )));
        }

        let (source_id, target_id) = canonical_pair(a.to_string(), b.to_string());
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO concept_relationships (
                id, scope_id, source_id, target_id, weight, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id, target_id) DO UPDATE SET
                weight = concept_relationships.weight + excluded.weight,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(scope_id)
        .bind(&source_id)
        .bind(&target_id)
        .bind(weight)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(source = %source_id, target = %target_id, weight, "Co-occurrence recorded");

        self.get_relationship_between(&source_id, &target_id)
            .await?
            .ok_or_else(|| Error::Other(format!("Edge {}-{} vanished after upsert", source_id, target_id)))
    }

    async fn list_relationships_for_concept(&self, concept_id: &str) -> Result<Vec<ConceptRelationship>> {
        let rows: Vec<RelationshipRow> = sqlx::query_as(
            r#"
            SELECT * FROM concept_relationships
            WHERE source_id = ? OR target_id = ?
            ORDER BY weight DESC
            "#,
        )
        .bind(concept_id)
        .bind(concept_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RelationshipRow::into_relationship).collect())
    }

    async fn count_relationships(&self, scope_id: &str) -> Result<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM concept_relationships WHERE scope_id = ?")
                .bind(scope_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn link_concept_to_content(
        &self,
        scope_id: &str,
        content_id: &str,
        content_type: &str,
        concept_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO content_concepts (
                content_id, content_type, concept_id, scope_id, created_at
            ) VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(content_id)
        .bind(content_type)
        .bind(concept_id)
        .bind(scope_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(content_id = %content_id, concept_id = %concept_id, "Concept linked to content");
        Ok(())
    }

    async fn concepts_for_content(&self, content_id: &str, content_type: &str) -> Result<Vec<Concept>> {
        let rows: Vec<ConceptRow> = sqlx::query_as(
            r#"
            SELECT c.* FROM concepts c
            JOIN content_concepts cc ON cc.concept_id = c.id
            WHERE cc.content_id = ? AND cc.content_type = ?
            ORDER BY c.canonical_value
            "#,
        )
        .bind(content_id)
        .bind(content_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ConceptRow::into_concept).collect())
    }
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct ConceptRow {
    id: String,
    scope_id: String,
    value: String,
    canonical_value: String,
    description: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ConceptRow {
    fn into_concept(self) -> Concept {
        Concept {
            id: self.id,
            scope_id: self.scope_id,
            value: self.value,
            canonical_value: self.canonical_value,
            description: self.description,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }
}

#[derive(Debug, FromRow)]
struct RelationshipRow {
    id: String,
    scope_id: String,
    source_id: String,
    target_id: String,
    weight: f64,
    created_at: String,
    updated_at: String,
}

impl RelationshipRow {
    fn into_relationship(self) -> ConceptRelationship {
        ConceptRelationship {
            id: self.id,
            scope_id: self.scope_id,
            source_id: self.source_id,
            target_id: self.target_id,
            weight: self.weight,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }
}
