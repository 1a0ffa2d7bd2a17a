//! Multi-resolution community detection
//!
//! A detection run replaces every community of a scope:
//!
//! 1. delete the scope's existing communities
//! 2. stop (successfully) if the clustering engine is unavailable
//! 3. for each resolution, finest first: project the concept graph, cluster
//!    it, persist clusters of at least `min_community_size` members, and
//!    drop the projection whatever happened
//! 4. link each level to the next coarser one
//!
//! A failure at any level aborts the run and leaves earlier levels in
//! place; the next run starts by deleting them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CommunityConfig;
use crate::error::Result;

use super::engine::{ClusteringEngine, TokenSource, UuidTokenSource, projection_name};
use super::entity::{DetectedCommunity, NewCommunity};
use super::hierarchy::build_hierarchy;
use super::lock::ScopeLocks;
use super::repository::CommunityRepository;

/// Outcome of one detection level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelReport {
    pub level: u32,
    pub resolution: f64,
    /// Distinct clusters returned by the engine
    pub clusters_seen: usize,
    pub communities_created: usize,
    /// Clusters below the minimum size
    pub discarded: usize,
}

/// Outcome of a detection run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub scope_id: String,
    /// The clustering engine was unavailable; nothing was detected
    pub skipped: bool,
    /// Communities deleted at the start of the run
    pub deleted: u64,
    pub levels: Vec<LevelReport>,
    pub parent_links: usize,
}

impl DetectionReport {
    fn new(scope_id: &str, deleted: u64) -> Self {
        Self {
            scope_id: scope_id.to_string(),
            skipped: false,
            deleted,
            levels: Vec::new(),
            parent_links: 0,
        }
    }

    pub fn communities_created(&self) -> usize {
        self.levels.iter().map(|l| l.communities_created).sum()
    }
}

/// Orchestrates clustering, persistence and hierarchy for one scope
pub struct CommunityDetector {
    repository: Arc<dyn CommunityRepository>,
    engine: Arc<dyn ClusteringEngine>,
    tokens: Arc<dyn TokenSource>,
    locks: ScopeLocks,
    config: CommunityConfig,
}

impl CommunityDetector {
    pub fn new(
        repository: Arc<dyn CommunityRepository>,
        engine: Arc<dyn ClusteringEngine>,
        config: CommunityConfig,
    ) -> Self {
        Self {
            repository,
            engine,
            tokens: Arc::new(UuidTokenSource),
            locks: ScopeLocks::new(),
            config,
        }
    }

    /// Use a different source of projection name tokens
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Share a lock registry with other components working on the same scopes
    pub fn with_locks(mut self, locks: ScopeLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn scope_id(&self) -> &str {
        self.repository.scope_id()
    }

    pub fn repository(&self) -> Arc<dyn CommunityRepository> {
        Arc::clone(&self.repository)
    }

    pub fn locks(&self) -> &ScopeLocks {
        &self.locks
    }

    pub fn config(&self) -> &CommunityConfig {
        &self.config
    }

    /// Replace the scope's communities with a fresh detection
    pub async fn detect_communities(&self) -> Result<DetectionReport> {
        let _guard = self.locks.acquire(self.scope_id()).await;
        self.detect_locked().await
    }

    /// Detection body; the caller holds the scope lock
    pub(crate) async fn detect_locked(&self) -> Result<DetectionReport> {
        let scope_id = self.scope_id().to_string();

        let deleted = self.repository.delete_all_communities().await?;
        let mut report = DetectionReport::new(&scope_id, deleted);

        if !self.engine.is_available().await? {
            info!(
                scope_id = %scope_id,
                "Clustering engine unavailable, skipping community detection"
            );
            report.skipped = true;
            return Ok(report);
        }

        let resolutions = self.config.ordered_resolutions();
        info!(
            scope_id = %scope_id,
            deleted,
            levels = resolutions.len(),
            "Starting community detection"
        );

        let mut detected = Vec::new();
        for (level, resolution) in resolutions.into_iter().enumerate() {
            let level_report = self
                .detect_level(&scope_id, level as u32, resolution, &mut detected)
                .await?;
            report.levels.push(level_report);
        }

        let links = build_hierarchy(&mut detected);
        for link in &links {
            self.repository
                .set_parent_community(&link.child_id, &link.parent_id)
                .await?;
        }
        report.parent_links = links.len();

        info!(
            scope_id = %scope_id,
            communities = report.communities_created(),
            parent_links = report.parent_links,
            "Community detection complete"
        );

        Ok(report)
    }

    /// One resolution: project, cluster, persist, and always drop the projection
    async fn detect_level(
        &self,
        scope_id: &str,
        level: u32,
        resolution: f64,
        detected: &mut Vec<DetectedCommunity>,
    ) -> Result<LevelReport> {
        let projection = projection_name(&self.tokens.next_token());

        let outcome = self
            .cluster_and_persist(&projection, scope_id, level, resolution, detected)
            .await;
        let dropped = self.engine.drop_projection(&projection).await;

        match (outcome, dropped) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(drop_err)) => Err(drop_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(drop_err)) => {
                warn!(
                    projection = %projection,
                    error = %drop_err,
                    "Failed to drop projection after detection failure"
                );
                Err(err)
            }
        }
    }

    async fn cluster_and_persist(
        &self,
        projection: &str,
        scope_id: &str,
        level: u32,
        resolution: f64,
        detected: &mut Vec<DetectedCommunity>,
    ) -> Result<LevelReport> {
        self.engine.project_concept_graph(projection, scope_id).await?;
        let assignments = self.engine.stream_clusters(projection, resolution).await?;

        let mut clusters: BTreeMap<i64, BTreeSet<String>> = BTreeMap::new();
        for assignment in assignments {
            clusters
                .entry(assignment.cluster_id)
                .or_default()
                .insert(assignment.concept_id);
        }

        let mut report = LevelReport {
            level,
            resolution,
            clusters_seen: clusters.len(),
            communities_created: 0,
            discarded: 0,
        };

        for (cluster_id, members) in clusters {
            if members.len() < self.config.min_community_size {
                report.discarded += 1;
                continue;
            }

            let community = self
                .repository
                .create_community(NewCommunity {
                    name: format!("Level {} community {}", level, cluster_id),
                    level,
                    member_count: members.len(),
                    rating: 0.0,
                })
                .await?;

            let member_ids: Vec<String> = members.iter().cloned().collect();
            self.repository
                .update_community_members(&community.id, &member_ids)
                .await?;

            debug!(
                community_id = %community.id,
                level,
                members = member_ids.len(),
                "Community persisted"
            );

            detected.push(DetectedCommunity::new(community.id, level, members));
            report.communities_created += 1;
        }

        info!(
            scope_id = %scope_id,
            level,
            resolution,
            clusters = report.clusters_seen,
            created = report.communities_created,
            discarded = report.discarded,
            "Detection level complete"
        );

        Ok(report)
    }
}
