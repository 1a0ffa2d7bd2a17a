//! SQLite implementation of the CommunityRepository
//!
//! Communities, memberships and parent edges live in `communities`,
//! `community_members` and `community_parents`. Summary embeddings are
//! little-endian f32 BLOBs and vector search ranks them in process.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::domain::community::{
    Community, CommunityAffinity, CommunityRepository, LevelCount, MemberConcept,
    MemberRelationship, NewCommunity, StaleCommunity, SummaryUpdate,
};
use crate::error::{Error, Result};
use crate::infrastructure::vector::{cosine_similarity, decode_embedding, encode_embedding};
use crate::infrastructure::{parse_optional_timestamp, parse_timestamp};

/// SQLite community repository bound to one scope
#[derive(Clone)]
pub struct SqliteCommunityRepository {
    pool: SqlitePool,
    scope_id: String,
}

impl SqliteCommunityRepository {
    pub fn new(pool: SqlitePool, scope_id: impl Into<String>) -> Self {
        Self {
            pool,
            scope_id: scope_id.into(),
        }
    }

    async fn ensure_in_scope(&self, community_id: &str) -> Result<()> {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM communities WHERE id = ? AND scope_id = ?")
                .bind(community_id)
                .bind(&self.scope_id)
                .fetch_optional(&self.pool)
                .await?;

        exists
            .map(|_| ())
            .ok_or_else(|| Error::CommunityNotFound(community_id.to_string()))
    }
}

#[async_trait]
impl CommunityRepository for SqliteCommunityRepository {
    fn scope_id(&self) -> &str {
        &self.scope_id
    }

    // ========== Detection ==========

    async fn delete_all_communities(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM community_parents
            WHERE child_id IN (SELECT id FROM communities WHERE scope_id = ?)
               OR parent_id IN (SELECT id FROM communities WHERE scope_id = ?)
            "#,
        )
        .bind(&self.scope_id)
        .bind(&self.scope_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM community_members WHERE community_id IN (SELECT id FROM communities WHERE scope_id = ?)",
        )
        .bind(&self.scope_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM communities WHERE scope_id = ?")
            .bind(&self.scope_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = result.rows_affected();
        info!(scope_id = %self.scope_id, deleted, "Communities deleted");
        Ok(deleted)
    }

    async fn create_community(&self, new: NewCommunity) -> Result<Community> {
        let community = Community::new(&self.scope_id, new);

        sqlx::query(
            r#"
            INSERT INTO communities (
                id, scope_id, level, name, summary, embedding, rating, member_count,
                is_stale, stale_since, last_processed_at, created_at
            ) VALUES (?, ?, ?, ?, NULL, NULL, ?, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(&community.id)
        .bind(&community.scope_id)
        .bind(community.level as i64)
        .bind(&community.name)
        .bind(community.rating as f64)
        .bind(community.member_count as i64)
        .bind(community.is_stale)
        .bind(community.stale_since.map(|t| t.to_rfc3339()))
        .bind(community.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(community_id = %community.id, level = community.level, "Community created");
        Ok(community)
    }

    async fn update_community_members(&self, community_id: &str, concept_ids: &[String]) -> Result<()> {
        self.ensure_in_scope(community_id).await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM community_members WHERE community_id = ?")
            .bind(community_id)
            .execute(&mut *tx)
            .await?;

        let mut inserted: i64 = 0;
        for concept_id in concept_ids {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO community_members (community_id, concept_id) VALUES (?, ?)",
            )
            .bind(community_id)
            .bind(concept_id)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as i64;
        }

        sqlx::query("UPDATE communities SET member_count = ? WHERE id = ?")
            .bind(inserted)
            .bind(community_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(community_id = %community_id, members = inserted, "Community members replaced");
        Ok(())
    }

    async fn set_parent_community(&self, child_id: &str, parent_id: &str) -> Result<()> {
        if child_id == parent_id {
            return Err(Error::InvalidInput(format!(
                "Community '{}' cannot be its own parent",
                child_id
            )));
        }
        self.ensure_in_scope(child_id).await?;
        self.ensure_in_scope(parent_id).await?;

        sqlx::query(
            r#"
            INSERT INTO community_parents (child_id, parent_id) VALUES (?, ?)
            ON CONFLICT(child_id) DO UPDATE SET parent_id = excluded.parent_id
            "#,
        )
        .bind(child_id)
        .bind(parent_id)
        .execute(&self.pool)
        .await?;

        debug!(child_id = %child_id, parent_id = %parent_id, "Parent community set");
        Ok(())
    }

    async fn find_parent(&self, community_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT p.parent_id FROM community_parents p
            JOIN communities c ON c.id = p.child_id
            WHERE p.child_id = ? AND c.scope_id = ?
            "#,
        )
        .bind(community_id)
        .bind(&self.scope_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(parent_id,)| parent_id))
    }

    // ========== Staleness ==========

    async fn mark_as_stale(&self, community_ids: &[String]) -> Result<()> {
        if community_ids.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; community_ids.len()].join(", ");
        let sql = format!(
            r#"
            UPDATE communities SET
                stale_since = CASE
                    WHEN is_stale = 1 AND stale_since IS NOT NULL THEN stale_since
                    ELSE ?
                END,
                is_stale = 1
            WHERE scope_id = ? AND id IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(Utc::now().to_rfc3339())
            .bind(&self.scope_id);
        for id in community_ids {
            query = query.bind(id);
        }
        let result = query.execute(&self.pool).await?;

        debug!(
            scope_id = %self.scope_id,
            requested = community_ids.len(),
            updated = result.rows_affected(),
            "Communities marked stale"
        );
        Ok(())
    }

    async fn find_communities_by_key_concept(&self, concept_id: &str) -> Result<Vec<Community>> {
        let rows: Vec<CommunityRow> = sqlx::query_as(
            r#"
            SELECT c.* FROM communities c
            JOIN community_members m ON m.community_id = c.id
            WHERE c.scope_id = ? AND m.concept_id = ?
            ORDER BY c.level, c.id
            "#,
        )
        .bind(&self.scope_id)
        .bind(concept_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CommunityRow::into_community).collect())
    }

    async fn find_orphan_key_concepts_for_content(
        &self,
        content_id: &str,
        content_type: &str,
    ) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT cc.concept_id FROM content_concepts cc
            WHERE cc.content_id = ? AND cc.content_type = ? AND cc.scope_id = ?
              AND NOT EXISTS (
                  SELECT 1 FROM community_members m
                  JOIN communities c ON c.id = m.community_id
                  WHERE m.concept_id = cc.concept_id AND c.scope_id = ?
              )
            ORDER BY cc.concept_id
            "#,
        )
        .bind(content_id)
        .bind(content_type)
        .bind(&self.scope_id)
        .bind(&self.scope_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn find_communities_by_related_key_concepts(
        &self,
        concept_id: &str,
    ) -> Result<Vec<CommunityAffinity>> {
        let rows: Vec<AffinityRow> = sqlx::query_as(
            r#"
            WITH neighbours AS (
                SELECT target_id AS neighbour_id, weight FROM concept_relationships
                WHERE source_id = ? AND scope_id = ?
                UNION ALL
                SELECT source_id AS neighbour_id, weight FROM concept_relationships
                WHERE target_id = ? AND scope_id = ?
            )
            SELECT
                c.id AS community_id,
                SUM(n.weight) AS total_weight,
                c.member_count AS member_count,
                COUNT(*) AS relationship_count
            FROM neighbours n
            JOIN community_members m ON m.concept_id = n.neighbour_id
            JOIN communities c ON c.id = m.community_id
            WHERE c.scope_id = ? AND c.level = 0
            GROUP BY c.id, c.member_count
            ORDER BY total_weight DESC, c.id
            "#,
        )
        .bind(concept_id)
        .bind(&self.scope_id)
        .bind(concept_id)
        .bind(&self.scope_id)
        .bind(&self.scope_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| CommunityAffinity {
                community_id: r.community_id,
                total_weight: r.total_weight,
                member_count: r.member_count.max(0) as usize,
                relationship_count: r.relationship_count.max(0) as usize,
            })
            .collect())
    }

    async fn add_member_to_community(&self, community_id: &str, concept_id: &str) -> Result<()> {
        self.ensure_in_scope(community_id).await?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO community_members (community_id, concept_id) VALUES (?, ?)",
        )
        .bind(community_id)
        .bind(concept_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            sqlx::query("UPDATE communities SET member_count = member_count + 1 WHERE id = ?")
                .bind(community_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(community_id = %community_id, concept_id = %concept_id, "Member added to community");
        Ok(())
    }

    // ========== Reads ==========

    async fn find_by_id(&self, community_id: &str) -> Result<Option<Community>> {
        let row: Option<CommunityRow> =
            sqlx::query_as("SELECT * FROM communities WHERE id = ? AND scope_id = ?")
                .bind(community_id)
                .bind(&self.scope_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(CommunityRow::into_community))
    }

    async fn count_by_level(&self) -> Result<Vec<LevelCount>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT level, COUNT(*) FROM communities
            WHERE scope_id = ?
            GROUP BY level
            ORDER BY level
            "#,
        )
        .bind(&self.scope_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(level, count)| LevelCount {
                level: level.max(0) as u32,
                count: count.max(0) as u64,
            })
            .collect())
    }

    async fn find_by_vector(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Community>> {
        if top_k == 0 || embedding.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<EmbeddingRow> = sqlx::query_as(
            r#"
            SELECT id, embedding FROM communities
            WHERE scope_id = ? AND summary IS NOT NULL AND embedding IS NOT NULL
            "#,
        )
        .bind(&self.scope_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(String, f32)> = rows
            .into_iter()
            .map(|row| {
                let similarity = cosine_similarity(embedding, &decode_embedding(&row.embedding));
                (row.id, similarity)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        let mut results = Vec::with_capacity(scored.len());
        for (id, _) in scored {
            if let Some(community) = self.find_by_id(&id).await? {
                results.push(community);
            }
        }

        Ok(results)
    }

    async fn find_by_level(&self, level: u32) -> Result<Vec<Community>> {
        let rows: Vec<CommunityRow> = sqlx::query_as(
            "SELECT * FROM communities WHERE scope_id = ? AND level = ? ORDER BY rating DESC, id",
        )
        .bind(&self.scope_id)
        .bind(level as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CommunityRow::into_community).collect())
    }

    async fn find_member_key_concepts(&self, community_id: &str) -> Result<Vec<MemberConcept>> {
        let rows: Vec<MemberConceptRow> = sqlx::query_as(
            r#"
            SELECT k.id, k.value, k.description FROM community_members m
            JOIN communities c ON c.id = m.community_id
            JOIN concepts k ON k.id = m.concept_id
            WHERE m.community_id = ? AND c.scope_id = ?
            ORDER BY k.value, k.id
            "#,
        )
        .bind(community_id)
        .bind(&self.scope_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| MemberConcept {
                id: r.id,
                value: r.value,
                description: r.description,
            })
            .collect())
    }

    async fn find_member_relationships(&self, community_id: &str) -> Result<Vec<MemberRelationship>> {
        let rows: Vec<MemberRelationshipRow> = sqlx::query_as(
            r#"
            SELECT s.value AS source, t.value AS target, r.weight AS weight
            FROM concept_relationships r
            JOIN community_members ms ON ms.concept_id = r.source_id AND ms.community_id = ?
            JOIN community_members mt ON mt.concept_id = r.target_id AND mt.community_id = ?
            JOIN concepts s ON s.id = r.source_id
            JOIN concepts t ON t.id = r.target_id
            WHERE r.scope_id = ?
            ORDER BY r.weight DESC, s.value, t.value
            "#,
        )
        .bind(community_id)
        .bind(community_id)
        .bind(&self.scope_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| MemberRelationship {
                source: r.source,
                target: r.target,
                weight: r.weight,
            })
            .collect())
    }

    // ========== Summarization ==========

    async fn update_summary(&self, update: SummaryUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE communities SET
                name = ?,
                summary = ?,
                embedding = ?,
                rating = ?,
                is_stale = 0,
                stale_since = NULL,
                last_processed_at = ?
            WHERE id = ? AND scope_id = ?
            "#,
        )
        .bind(&update.name)
        .bind(&update.summary)
        .bind(encode_embedding(&update.embedding))
        .bind(update.rating as f64)
        .bind(Utc::now().to_rfc3339())
        .bind(&update.community_id)
        .bind(&self.scope_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::CommunityNotFound(update.community_id));
        }

        debug!(community_id = %update.community_id, "Community summary updated");
        Ok(())
    }

    async fn find_stale_communities(&self, limit: usize) -> Result<Vec<StaleCommunity>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT id, scope_id FROM communities
            WHERE scope_id = ? AND is_stale = 1
            ORDER BY level, stale_since, id
            LIMIT ?
            "#,
        )
        .bind(&self.scope_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(community_id, scope_id)| StaleCommunity {
                community_id,
                scope_id,
            })
            .collect())
    }
}

// ========== Database Row Types ==========

#[derive(Debug, FromRow)]
struct CommunityRow {
    id: String,
    scope_id: String,
    level: i64,
    name: String,
    summary: Option<String>,
    embedding: Option<Vec<u8>>,
    rating: f64,
    member_count: i64,
    is_stale: bool,
    stale_since: Option<String>,
    last_processed_at: Option<String>,
    created_at: String,
}

impl CommunityRow {
    fn into_community(self) -> Community {
        Community {
            id: self.id,
            scope_id: self.scope_id,
            level: self.level.max(0) as u32,
            name: self.name,
            summary: self.summary,
            embedding: self.embedding.as_deref().map(decode_embedding),
            rating: self.rating as f32,
            member_count: self.member_count.max(0) as usize,
            is_stale: self.is_stale,
            stale_since: parse_optional_timestamp(self.stale_since.as_deref()),
            last_processed_at: parse_optional_timestamp(self.last_processed_at.as_deref()),
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

#[derive(Debug, FromRow)]
struct AffinityRow {
    community_id: String,
    total_weight: f64,
    member_count: i64,
    relationship_count: i64,
}

#[derive(Debug, FromRow)]
struct EmbeddingRow {
    id: String,
    embedding: Vec<u8>,
}

#[derive(Debug, FromRow)]
struct MemberConceptRow {
    id: String,
    value: String,
    description: Option<String>,
}

#[derive(Debug, FromRow)]
struct MemberRelationshipRow {
    source: String,
    target: String,
    weight: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{Concept, ConceptRepository};
    use crate::infrastructure::knowledge::SqliteConceptRepository;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    const SCOPE: &str = "scope-1";

    async fn setup_test_db() -> (SqlitePool, SqliteCommunityRepository, SqliteConceptRepository) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        (
            pool.clone(),
            SqliteCommunityRepository::new(pool.clone(), SCOPE),
            SqliteConceptRepository::new(pool),
        )
    }

    async fn seed_concepts(concepts: &SqliteConceptRepository, scope: &str, ids: &[&str]) {
        for id in ids {
            concepts
                .save_concept(&Concept::new(scope, format!("value {}", id)).with_id(*id))
                .await
                .unwrap();
        }
    }

    async fn create(repo: &SqliteCommunityRepository, level: u32, members: &[&str]) -> Community {
        let community = repo
            .create_community(NewCommunity {
                name: format!("level {}", level),
                level,
                member_count: members.len(),
                rating: 0.0,
            })
            .await
            .unwrap();
        let ids: Vec<String> = members.iter().map(|m| m.to_string()).collect();
        repo.update_community_members(&community.id, &ids).await.unwrap();
        community
    }

    fn summary(community_id: &str, embedding: Vec<f32>) -> SummaryUpdate {
        SummaryUpdate {
            community_id: community_id.to_string(),
            name: "Named".into(),
            summary: "A summary".into(),
            embedding,
            rating: 4.0,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_by_id() {
        let (_, repo, concepts) = setup_test_db().await;
        seed_concepts(&concepts, SCOPE, &["k1", "k2", "k3"]).await;

        let created = create(&repo, 0, &["k1", "k2", "k3"]).await;
        let found = repo.find_by_id(&created.id).await.unwrap().unwrap();

        assert_eq!(found.level, 0);
        assert_eq!(found.member_count, 3);
        assert!(found.is_stale);
        assert!(found.stale_since.is_some());
        assert!(found.summary.is_none());
        assert!(found.embedding.is_none());

        let other_scope = SqliteCommunityRepository::new(repo.pool.clone(), "scope-2");
        assert!(other_scope.find_by_id(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_members_replaces_set() {
        let (_, repo, concepts) = setup_test_db().await;
        seed_concepts(&concepts, SCOPE, &["k1", "k2", "k3", "k4"]).await;

        let community = create(&repo, 0, &["k1", "k2", "k3"]).await;
        repo.update_community_members(&community.id, &["k3".into(), "k4".into(), "k4".into()])
            .await
            .unwrap();

        let members = repo.find_member_key_concepts(&community.id).await.unwrap();
        let ids: Vec<_> = members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["k3", "k4"]);
        assert_eq!(members[0].value, "value k3");
        assert_eq!(repo.find_by_id(&community.id).await.unwrap().unwrap().member_count, 2);
    }

    #[tokio::test]
    async fn test_update_members_of_unknown_community_fails() {
        let (_, repo, _) = setup_test_db().await;
        let err = repo.update_community_members("missing", &[]).await.unwrap_err();
        assert_eq!(err.code(), "E001");
    }

    #[tokio::test]
    async fn test_delete_all_is_scoped() {
        let (pool, repo, concepts) = setup_test_db().await;
        seed_concepts(&concepts, SCOPE, &["k1", "k2", "k3"]).await;
        seed_concepts(&concepts, "scope-2", &["o1", "o2", "o3"]).await;
        let other = SqliteCommunityRepository::new(pool.clone(), "scope-2");

        let child = create(&repo, 0, &["k1", "k2", "k3"]).await;
        let parent = create(&repo, 1, &["k1", "k2", "k3"]).await;
        repo.set_parent_community(&child.id, &parent.id).await.unwrap();
        create(&other, 0, &["o1", "o2", "o3"]).await;

        assert_eq!(repo.delete_all_communities().await.unwrap(), 2);
        assert!(repo.count_by_level().await.unwrap().is_empty());
        assert_eq!(other.count_by_level().await.unwrap().len(), 1);

        let (members,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM community_members")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(members, 3);
        let (parents,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM community_parents")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(parents, 0);
    }

    #[tokio::test]
    async fn test_parent_edges() {
        let (_, repo, concepts) = setup_test_db().await;
        seed_concepts(&concepts, SCOPE, &["k1", "k2", "k3"]).await;

        let child = create(&repo, 0, &["k1", "k2", "k3"]).await;
        let first = create(&repo, 1, &["k1", "k2"]).await;
        let second = create(&repo, 1, &["k1", "k2", "k3"]).await;

        repo.set_parent_community(&child.id, &first.id).await.unwrap();
        repo.set_parent_community(&child.id, &second.id).await.unwrap();

        assert_eq!(repo.find_parent(&child.id).await.unwrap(), Some(second.id.clone()));
        assert_eq!(repo.find_parent(&second.id).await.unwrap(), None);
        assert!(repo.set_parent_community(&child.id, &child.id).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_as_stale_and_update_summary() {
        let (_, repo, concepts) = setup_test_db().await;
        seed_concepts(&concepts, SCOPE, &["k1", "k2", "k3"]).await;
        let community = create(&repo, 0, &["k1", "k2", "k3"]).await;
        let original_stale_since = repo
            .find_by_id(&community.id)
            .await
            .unwrap()
            .unwrap()
            .stale_since;

        // Already stale: the original timestamp is kept
        repo.mark_as_stale(&[community.id.clone()]).await.unwrap();
        let still = repo.find_by_id(&community.id).await.unwrap().unwrap();
        assert_eq!(still.stale_since, original_stale_since);

        repo.update_summary(summary(&community.id, vec![0.5, 0.5])).await.unwrap();
        let fresh = repo.find_by_id(&community.id).await.unwrap().unwrap();
        assert!(!fresh.is_stale);
        assert!(fresh.stale_since.is_none());
        assert!(fresh.last_processed_at.is_some());
        assert_eq!(fresh.name, "Named");
        assert_eq!(fresh.rating, 4.0);
        assert_eq!(fresh.embedding, Some(vec![0.5, 0.5]));

        repo.mark_as_stale(&[community.id.clone(), "unknown".into()]).await.unwrap();
        let stale = repo.find_by_id(&community.id).await.unwrap().unwrap();
        assert!(stale.is_stale);
        assert!(stale.stale_since.is_some());

        repo.mark_as_stale(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_summary_of_unknown_community_fails() {
        let (_, repo, _) = setup_test_db().await;
        let err = repo.update_summary(summary("missing", vec![1.0])).await.unwrap_err();
        assert_eq!(err.code(), "E001");
    }

    #[tokio::test]
    async fn test_find_communities_by_key_concept() {
        let (_, repo, concepts) = setup_test_db().await;
        seed_concepts(&concepts, SCOPE, &["k1", "k2", "k3", "k4"]).await;

        let a = create(&repo, 0, &["k1", "k2", "k3"]).await;
        let p = create(&repo, 1, &["k1", "k2", "k3", "k4"]).await;

        let found: Vec<String> = repo
            .find_communities_by_key_concept("k1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(found, vec![a.id, p.id.clone()]);

        let only_parent = repo.find_communities_by_key_concept("k4").await.unwrap();
        assert_eq!(only_parent.len(), 1);
        assert_eq!(only_parent[0].id, p.id);
    }

    #[tokio::test]
    async fn test_orphans_and_affinity() {
        let (_, repo, concepts) = setup_test_db().await;
        seed_concepts(&concepts, SCOPE, &["k1", "k2", "k3", "k4", "k5", "k6", "new1", "new2"]).await;

        let a = create(&repo, 0, &["k1", "k2", "k3"]).await;
        let b = create(&repo, 0, &["k4", "k5", "k6"]).await;
        create(&repo, 1, &["k1", "k2", "k3", "k4", "k5", "k6"]).await;

        for concept in ["k1", "new1", "new2"] {
            concepts
                .link_concept_to_content(SCOPE, "doc-1", "document", concept)
                .await
                .unwrap();
        }

        let orphans = repo
            .find_orphan_key_concepts_for_content("doc-1", "document")
            .await
            .unwrap();
        assert_eq!(orphans, vec!["new1".to_string(), "new2".to_string()]);

        concepts.record_cooccurrence(SCOPE, "new1", "k1", 2.0).await.unwrap();
        concepts.record_cooccurrence(SCOPE, "k2", "new1", 1.0).await.unwrap();
        concepts.record_cooccurrence(SCOPE, "new1", "k4", 0.5).await.unwrap();

        let candidates = repo
            .find_communities_by_related_key_concepts("new1")
            .await
            .unwrap();

        // Level 1 is never a candidate
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].community_id, a.id);
        assert_eq!(candidates[0].total_weight, 3.0);
        assert_eq!(candidates[0].relationship_count, 2);
        assert_eq!(candidates[0].member_count, 3);
        assert_eq!(candidates[1].community_id, b.id);
        assert_eq!(candidates[1].total_weight, 0.5);

        assert!(
            repo.find_communities_by_related_key_concepts("new2")
                .await
                .unwrap()
                .is_empty()
        );

        repo.add_member_to_community(&a.id, "new1").await.unwrap();
        repo.add_member_to_community(&a.id, "new1").await.unwrap();
        assert_eq!(repo.find_by_id(&a.id).await.unwrap().unwrap().member_count, 4);

        let orphans = repo
            .find_orphan_key_concepts_for_content("doc-1", "document")
            .await
            .unwrap();
        assert_eq!(orphans, vec!["new2".to_string()]);
    }

    #[tokio::test]
    async fn test_count_and_find_by_level() {
        let (_, repo, concepts) = setup_test_db().await;
        seed_concepts(&concepts, SCOPE, &["k1", "k2", "k3"]).await;
        assert!(repo.count_by_level().await.unwrap().is_empty());

        create(&repo, 0, &["k1"]).await;
        create(&repo, 0, &["k2"]).await;
        create(&repo, 2, &["k3"]).await;

        assert_eq!(
            repo.count_by_level().await.unwrap(),
            vec![
                LevelCount { level: 0, count: 2 },
                LevelCount { level: 2, count: 1 }
            ]
        );
        assert_eq!(repo.find_by_level(0).await.unwrap().len(), 2);
        assert!(repo.find_by_level(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_by_vector_ranks_summarized_communities() {
        let (_, repo, concepts) = setup_test_db().await;
        seed_concepts(&concepts, SCOPE, &["k1"]).await;

        let near = create(&repo, 0, &["k1"]).await;
        let far = create(&repo, 0, &["k1"]).await;
        let mid = create(&repo, 0, &["k1"]).await;
        let unsummarized = create(&repo, 0, &["k1"]).await;

        repo.update_summary(summary(&near.id, vec![1.0, 0.0])).await.unwrap();
        repo.update_summary(summary(&far.id, vec![-1.0, 0.0])).await.unwrap();
        repo.update_summary(summary(&mid.id, vec![1.0, 1.0])).await.unwrap();

        let results = repo.find_by_vector(&[1.0, 0.1], 2).await.unwrap();
        let ids: Vec<_> = results.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![near.id.clone(), mid.id.clone()]);

        let all = repo.find_by_vector(&[1.0, 0.1], 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|c| c.id != unsummarized.id));

        assert!(repo.find_by_vector(&[1.0, 0.1], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_member_relationships_are_internal_only() {
        let (_, repo, concepts) = setup_test_db().await;
        seed_concepts(&concepts, SCOPE, &["k1", "k2", "k3", "x"]).await;
        concepts.record_cooccurrence(SCOPE, "k1", "k2", 3.0).await.unwrap();
        concepts.record_cooccurrence(SCOPE, "k2", "k3", 1.0).await.unwrap();
        concepts.record_cooccurrence(SCOPE, "k1", "x", 9.0).await.unwrap();

        let community = create(&repo, 0, &["k1", "k2", "k3"]).await;
        let relationships = repo.find_member_relationships(&community.id).await.unwrap();

        assert_eq!(relationships.len(), 2);
        assert_eq!(relationships[0].source, "value k1");
        assert_eq!(relationships[0].target, "value k2");
        assert_eq!(relationships[0].weight, 3.0);
    }

    #[tokio::test]
    async fn test_find_stale_communities_respects_limit_and_scope() {
        let (pool, repo, concepts) = setup_test_db().await;
        seed_concepts(&concepts, SCOPE, &["k1"]).await;
        seed_concepts(&concepts, "scope-2", &["o1"]).await;
        let other = SqliteCommunityRepository::new(pool, "scope-2");

        let a = create(&repo, 0, &["k1"]).await;
        create(&repo, 1, &["k1"]).await;
        create(&other, 0, &["o1"]).await;

        let stale = repo.find_stale_communities(10).await.unwrap();
        assert_eq!(stale.len(), 2);
        assert!(stale.iter().all(|s| s.scope_id == SCOPE));
        assert_eq!(stale[0].community_id, a.id);

        assert_eq!(repo.find_stale_communities(1).await.unwrap().len(), 1);

        repo.update_summary(summary(&a.id, vec![1.0])).await.unwrap();
        assert_eq!(repo.find_stale_communities(10).await.unwrap().len(), 1);
    }
}
