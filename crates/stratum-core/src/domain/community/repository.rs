//! Repository trait for community persistence
//!
//! A repository instance is bound to one scope: every query and mutation is
//! confined to that scope's communities.

use async_trait::async_trait;

use crate::error::Result;

use super::entity::{
    Community, CommunityAffinity, LevelCount, MemberConcept, MemberRelationship, NewCommunity,
    StaleCommunity, SummaryUpdate,
};

/// Scope-bound community storage
#[async_trait]
pub trait CommunityRepository: Send + Sync {
    /// The scope this repository operates on
    fn scope_id(&self) -> &str;

    // ========== Detection ==========

    /// Delete every community of the scope, with memberships and parent edges.
    /// Returns the number of communities removed.
    async fn delete_all_communities(&self) -> Result<u64>;

    /// Persist a detected cluster as a new (stale) community
    async fn create_community(&self, new: NewCommunity) -> Result<Community>;

    /// Replace a community's member set
    async fn update_community_members(&self, community_id: &str, concept_ids: &[String]) -> Result<()>;

    /// Point a community at its coarser parent, replacing any previous parent
    async fn set_parent_community(&self, child_id: &str, parent_id: &str) -> Result<()>;

    /// Parent of a community, if any
    async fn find_parent(&self, community_id: &str) -> Result<Option<String>>;

    // ========== Staleness ==========

    /// Flag communities stale. Already-stale communities keep their `stale_since`.
    async fn mark_as_stale(&self, community_ids: &[String]) -> Result<()>;

    /// Every community, at any level, that has the concept as a member
    async fn find_communities_by_key_concept(&self, concept_id: &str) -> Result<Vec<Community>>;

    /// Concepts linked to the content that belong to no community yet
    async fn find_orphan_key_concepts_for_content(
        &self,
        content_id: &str,
        content_type: &str,
    ) -> Result<Vec<String>>;

    /// Candidate communities for a concept, by its edges into their members
    async fn find_communities_by_related_key_concepts(
        &self,
        concept_id: &str,
    ) -> Result<Vec<CommunityAffinity>>;

    /// Add one concept to a community and bump its member count
    async fn add_member_to_community(&self, community_id: &str, concept_id: &str) -> Result<()>;

    // ========== Reads ==========

    async fn find_by_id(&self, community_id: &str) -> Result<Option<Community>>;

    /// Community counts per level, ascending by level. Empty when the scope
    /// has no communities.
    async fn count_by_level(&self) -> Result<Vec<LevelCount>>;

    /// Communities whose summary embedding is closest to `embedding`
    async fn find_by_vector(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Community>>;

    async fn find_by_level(&self, level: u32) -> Result<Vec<Community>>;

    async fn find_member_key_concepts(&self, community_id: &str) -> Result<Vec<MemberConcept>>;

    /// Edges whose endpoints are both members of the community
    async fn find_member_relationships(&self, community_id: &str) -> Result<Vec<MemberRelationship>>;

    // ========== Summarization ==========

    /// Store regenerated summary fields and clear staleness
    async fn update_summary(&self, update: SummaryUpdate) -> Result<()>;

    async fn find_stale_communities(&self, limit: usize) -> Result<Vec<StaleCommunity>>;
}
