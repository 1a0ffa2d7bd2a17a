//! In-memory doubles for unit tests
//!
//! `MockCommunityRepository` keeps a whole scope in memory and logs every
//! mutation, `MockClusteringEngine` serves canned clusters per resolution,
//! and `ScriptedLlm` answers structured calls from per-operation scripts.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::community::{
    ClusterAssignment, ClusteringEngine, Community, CommunityAffinity, CommunityRepository,
    LevelCount, MemberConcept, MemberRelationship, NewCommunity, StaleCommunity, SummaryUpdate,
};
use crate::error::{Error, Result};
use crate::infrastructure::vector::cosine_similarity;
use crate::llm::{EmbeddingOracle, LlmOracle, StructuredCall, StructuredOutput, TokenUsage};

// ============================================================================
// Community repository
// ============================================================================

/// A mutation observed by the mock repository
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RepoCall {
    DeleteAll,
    Create { level: u32, member_count: usize },
    UpdateMembers { community_id: String, concept_ids: Vec<String> },
    SetParent { child_id: String, parent_id: String },
    MarkAsStale(Vec<String>),
    AddMember { community_id: String, concept_id: String },
    UpdateSummary { community_id: String },
}

#[derive(Default)]
struct RepoState {
    communities: BTreeMap<String, Community>,
    members: HashMap<String, BTreeSet<String>>,
    parents: HashMap<String, String>,
    concepts: BTreeMap<String, MemberConcept>,
    relationships: Vec<(String, String, f64)>,
    orphans: HashMap<(String, String), Vec<String>>,
    affinities: HashMap<String, Vec<CommunityAffinity>>,
    next_id: u64,
}

impl RepoState {
    fn is_member_anywhere(&self, concept_id: &str) -> bool {
        self.members.values().any(|m| m.contains(concept_id))
    }

    fn value_of(&self, concept_id: &str) -> String {
        self.concepts
            .get(concept_id)
            .map(|c| c.value.clone())
            .unwrap_or_else(|| concept_id.to_string())
    }
}

pub(crate) struct MockCommunityRepository {
    scope_id: String,
    state: RwLock<RepoState>,
    calls: Mutex<Vec<RepoCall>>,
    reads: Mutex<HashMap<&'static str, usize>>,
    fail_create_at_level: Option<u32>,
    fail_find_by_level: bool,
}

impl MockCommunityRepository {
    pub(crate) fn new(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            state: RwLock::new(RepoState::default()),
            calls: Mutex::new(Vec::new()),
            reads: Mutex::new(HashMap::new()),
            fail_create_at_level: None,
            fail_find_by_level: false,
        }
    }

    pub(crate) fn failing_create_at_level(mut self, level: u32) -> Self {
        self.fail_create_at_level = Some(level);
        self
    }

    pub(crate) fn failing_find_by_level(mut self) -> Self {
        self.fail_find_by_level = true;
        self
    }

    /// Insert a stale community with the given id and members
    pub(crate) async fn seed_community(&self, id: &str, level: u32, members: &[&str]) {
        let mut community = Community::new(
            self.scope_id.clone(),
            NewCommunity {
                name: format!("Community {}", id),
                level,
                member_count: members.len(),
                rating: 0.0,
            },
        );
        community.id = id.to_string();

        let mut state = self.state.write().await;
        state.communities.insert(id.to_string(), community);
        state.members.insert(
            id.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
    }

    /// Give a seeded community a summary and embedding, as a summarization pass would
    pub(crate) async fn seed_summary(&self, id: &str, summary: &str, embedding: Vec<f32>) {
        let mut state = self.state.write().await;
        if let Some(community) = state.communities.get_mut(id) {
            community.summary = Some(summary.to_string());
            community.embedding = Some(embedding);
            community.is_stale = false;
            community.stale_since = None;
            community.last_processed_at = Some(Utc::now());
        }
    }

    pub(crate) async fn seed_concept(&self, id: &str, value: &str, description: Option<&str>) {
        self.state.write().await.concepts.insert(
            id.to_string(),
            MemberConcept {
                id: id.to_string(),
                value: value.to_string(),
                description: description.map(str::to_string),
            },
        );
    }

    pub(crate) async fn seed_relationship(&self, a: &str, b: &str, weight: f64) {
        self.state
            .write()
            .await
            .relationships
            .push((a.to_string(), b.to_string(), weight));
    }

    /// Key concepts linked to a content item
    pub(crate) async fn set_orphans(&self, content_id: &str, content_type: &str, concepts: &[&str]) {
        self.state.write().await.orphans.insert(
            (content_id.to_string(), content_type.to_string()),
            concepts.iter().map(|c| c.to_string()).collect(),
        );
    }

    pub(crate) async fn set_affinities(&self, concept_id: &str, affinities: Vec<CommunityAffinity>) {
        self.state
            .write()
            .await
            .affinities
            .insert(concept_id.to_string(), affinities);
    }

    pub(crate) async fn clear_stale(&self) {
        for community in self.state.write().await.communities.values_mut() {
            community.is_stale = false;
            community.stale_since = None;
        }
    }

    pub(crate) fn calls(&self) -> Vec<RepoCall> {
        self.calls.lock().unwrap().clone()
    }

    /// How often a read method was invoked
    pub(crate) fn read_count(&self, method: &str) -> usize {
        self.reads.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub(crate) async fn communities(&self) -> Vec<Community> {
        self.state.read().await.communities.values().cloned().collect()
    }

    pub(crate) async fn communities_at_level(&self, level: u32) -> Vec<Community> {
        self.state
            .read()
            .await
            .communities
            .values()
            .filter(|c| c.level == level)
            .cloned()
            .collect()
    }

    pub(crate) async fn parent_of(&self, id: &str) -> Option<String> {
        self.state.read().await.parents.get(id).cloned()
    }

    fn log(&self, call: RepoCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn read(&self, method: &'static str) {
        *self.reads.lock().unwrap().entry(method).or_default() += 1;
    }
}

#[async_trait]
impl CommunityRepository for MockCommunityRepository {
    fn scope_id(&self) -> &str {
        &self.scope_id
    }

    async fn delete_all_communities(&self) -> Result<u64> {
        self.log(RepoCall::DeleteAll);
        let mut state = self.state.write().await;
        let deleted = state.communities.len() as u64;
        state.communities.clear();
        state.members.clear();
        state.parents.clear();
        Ok(deleted)
    }

    async fn create_community(&self, new: NewCommunity) -> Result<Community> {
        self.log(RepoCall::Create {
            level: new.level,
            member_count: new.member_count,
        });
        if self.fail_create_at_level == Some(new.level) {
            return Err(Error::Other(format!("injected create failure at level {}", new.level)));
        }

        let mut state = self.state.write().await;
        state.next_id += 1;
        let mut community = Community::new(self.scope_id.clone(), new);
        community.id = format!("community-{}", state.next_id);
        state.communities.insert(community.id.clone(), community.clone());
        Ok(community)
    }

    async fn update_community_members(&self, community_id: &str, concept_ids: &[String]) -> Result<()> {
        self.log(RepoCall::UpdateMembers {
            community_id: community_id.to_string(),
            concept_ids: concept_ids.to_vec(),
        });
        let mut state = self.state.write().await;
        if !state.communities.contains_key(community_id) {
            return Err(Error::CommunityNotFound(community_id.to_string()));
        }
        state
            .members
            .insert(community_id.to_string(), concept_ids.iter().cloned().collect());
        Ok(())
    }

    async fn set_parent_community(&self, child_id: &str, parent_id: &str) -> Result<()> {
        self.log(RepoCall::SetParent {
            child_id: child_id.to_string(),
            parent_id: parent_id.to_string(),
        });
        self.state
            .write()
            .await
            .parents
            .insert(child_id.to_string(), parent_id.to_string());
        Ok(())
    }

    async fn find_parent(&self, community_id: &str) -> Result<Option<String>> {
        Ok(self.state.read().await.parents.get(community_id).cloned())
    }

    async fn mark_as_stale(&self, community_ids: &[String]) -> Result<()> {
        self.log(RepoCall::MarkAsStale(community_ids.to_vec()));
        let now = Utc::now();
        let mut state = self.state.write().await;
        for id in community_ids {
            if let Some(community) = state.communities.get_mut(id) {
                if !community.is_stale {
                    community.is_stale = true;
                    community.stale_since = Some(now);
                }
            }
        }
        Ok(())
    }

    async fn find_communities_by_key_concept(&self, concept_id: &str) -> Result<Vec<Community>> {
        let state = self.state.read().await;
        Ok(state
            .communities
            .values()
            .filter(|c| {
                state
                    .members
                    .get(&c.id)
                    .is_some_and(|m| m.contains(concept_id))
            })
            .cloned()
            .collect())
    }

    async fn find_orphan_key_concepts_for_content(
        &self,
        content_id: &str,
        content_type: &str,
    ) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let linked = state
            .orphans
            .get(&(content_id.to_string(), content_type.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(linked
            .into_iter()
            .filter(|c| !state.is_member_anywhere(c))
            .collect())
    }

    async fn find_communities_by_related_key_concepts(
        &self,
        concept_id: &str,
    ) -> Result<Vec<CommunityAffinity>> {
        Ok(self
            .state
            .read()
            .await
            .affinities
            .get(concept_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_member_to_community(&self, community_id: &str, concept_id: &str) -> Result<()> {
        self.log(RepoCall::AddMember {
            community_id: community_id.to_string(),
            concept_id: concept_id.to_string(),
        });
        let mut state = self.state.write().await;
        if !state.communities.contains_key(community_id) {
            return Err(Error::CommunityNotFound(community_id.to_string()));
        }
        let inserted = state
            .members
            .entry(community_id.to_string())
            .or_default()
            .insert(concept_id.to_string());
        if inserted {
            if let Some(community) = state.communities.get_mut(community_id) {
                community.member_count += 1;
            }
        }
        Ok(())
    }

    async fn find_by_id(&self, community_id: &str) -> Result<Option<Community>> {
        Ok(self.state.read().await.communities.get(community_id).cloned())
    }

    async fn count_by_level(&self) -> Result<Vec<LevelCount>> {
        let mut counts: BTreeMap<u32, u64> = BTreeMap::new();
        for community in self.state.read().await.communities.values() {
            *counts.entry(community.level).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(level, count)| LevelCount { level, count })
            .collect())
    }

    async fn find_by_vector(&self, embedding: &[f32], top_k: usize) -> Result<Vec<Community>> {
        self.read("find_by_vector");
        let state = self.state.read().await;
        let mut scored: Vec<(f32, Community)> = state
            .communities
            .values()
            .filter(|c| c.is_searchable())
            .map(|c| {
                let score = c
                    .embedding
                    .as_deref()
                    .map(|e| cosine_similarity(embedding, e))
                    .unwrap_or(0.0);
                (score, c.clone())
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(scored.into_iter().take(top_k).map(|(_, c)| c).collect())
    }

    async fn find_by_level(&self, level: u32) -> Result<Vec<Community>> {
        self.read("find_by_level");
        if self.fail_find_by_level {
            return Err(Error::Other("injected find_by_level failure".to_string()));
        }
        Ok(self.communities_at_level(level).await)
    }

    async fn find_member_key_concepts(&self, community_id: &str) -> Result<Vec<MemberConcept>> {
        self.read("find_member_key_concepts");
        let state = self.state.read().await;
        let Some(members) = state.members.get(community_id) else {
            return Ok(Vec::new());
        };
        Ok(members
            .iter()
            .filter_map(|id| state.concepts.get(id).cloned())
            .collect())
    }

    async fn find_member_relationships(&self, community_id: &str) -> Result<Vec<MemberRelationship>> {
        self.read("find_member_relationships");
        let state = self.state.read().await;
        let Some(members) = state.members.get(community_id) else {
            return Ok(Vec::new());
        };
        Ok(state
            .relationships
            .iter()
            .filter(|(a, b, _)| members.contains(a) && members.contains(b))
            .map(|(a, b, weight)| MemberRelationship {
                source: state.value_of(a),
                target: state.value_of(b),
                weight: *weight,
            })
            .collect())
    }

    async fn update_summary(&self, update: SummaryUpdate) -> Result<()> {
        self.log(RepoCall::UpdateSummary {
            community_id: update.community_id.clone(),
        });
        let mut state = self.state.write().await;
        let community = state
            .communities
            .get_mut(&update.community_id)
            .ok_or_else(|| Error::CommunityNotFound(update.community_id.clone()))?;
        community.name = update.name;
        community.summary = Some(update.summary);
        community.embedding = Some(update.embedding);
        community.rating = update.rating;
        community.is_stale = false;
        community.stale_since = None;
        community.last_processed_at = Some(Utc::now());
        Ok(())
    }

    async fn find_stale_communities(&self, limit: usize) -> Result<Vec<StaleCommunity>> {
        Ok(self
            .state
            .read()
            .await
            .communities
            .values()
            .filter(|c| c.is_stale)
            .take(limit)
            .map(|c| StaleCommunity {
                community_id: c.id.clone(),
                scope_id: c.scope_id.clone(),
            })
            .collect())
    }
}

// ============================================================================
// Clustering engine
// ============================================================================

#[derive(Default)]
struct EngineLog {
    projected: Vec<String>,
    dropped: Vec<String>,
    live: BTreeSet<String>,
    clustered: Vec<f64>,
}

pub(crate) struct MockClusteringEngine {
    available: bool,
    clusters: Vec<(f64, Vec<ClusterAssignment>)>,
    fail_at: Option<f64>,
    fail_projection: bool,
    fail_drop: bool,
    log: Mutex<EngineLog>,
}

impl MockClusteringEngine {
    /// An available engine that finds no clusters
    pub(crate) fn new() -> Self {
        Self {
            available: true,
            clusters: Vec::new(),
            fail_at: None,
            fail_projection: false,
            fail_drop: false,
            log: Mutex::new(EngineLog::default()),
        }
    }

    pub(crate) fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Clusters returned at `resolution`, as `(cluster_id, members)` pairs
    pub(crate) fn with_clusters(mut self, resolution: f64, clusters: &[(i64, &[&str])]) -> Self {
        let assignments = clusters
            .iter()
            .flat_map(|(cluster_id, members)| {
                members
                    .iter()
                    .map(move |m| ClusterAssignment::new(*m, *cluster_id))
            })
            .collect();
        self.clusters.push((resolution, assignments));
        self
    }

    pub(crate) fn failing_at(mut self, resolution: f64) -> Self {
        self.fail_at = Some(resolution);
        self
    }

    pub(crate) fn failing_projection(mut self) -> Self {
        self.fail_projection = true;
        self
    }

    pub(crate) fn failing_drop(mut self) -> Self {
        self.fail_drop = true;
        self
    }

    pub(crate) fn projected(&self) -> Vec<String> {
        self.log.lock().unwrap().projected.clone()
    }

    /// Every drop attempt, including failed ones
    pub(crate) fn dropped(&self) -> Vec<String> {
        self.log.lock().unwrap().dropped.clone()
    }

    pub(crate) fn live_projections(&self) -> Vec<String> {
        self.log.lock().unwrap().live.iter().cloned().collect()
    }

    pub(crate) fn clustered_resolutions(&self) -> Vec<f64> {
        self.log.lock().unwrap().clustered.clone()
    }
}

#[async_trait]
impl ClusteringEngine for MockClusteringEngine {
    async fn is_available(&self) -> Result<bool> {
        Ok(self.available)
    }

    async fn project_concept_graph(&self, projection: &str, _scope_id: &str) -> Result<()> {
        if self.fail_projection {
            return Err(Error::ClusteringFailed(format!(
                "injected projection failure for {}",
                projection
            )));
        }
        let mut log = self.log.lock().unwrap();
        log.projected.push(projection.to_string());
        log.live.insert(projection.to_string());
        Ok(())
    }

    async fn stream_clusters(&self, projection: &str, resolution: f64) -> Result<Vec<ClusterAssignment>> {
        {
            let mut log = self.log.lock().unwrap();
            if !log.live.contains(projection) {
                return Err(Error::ClusteringFailed(format!("unknown projection {}", projection)));
            }
            log.clustered.push(resolution);
        }

        if self.fail_at == Some(resolution) {
            return Err(Error::ClusteringFailed(format!(
                "injected failure at resolution {}",
                resolution
            )));
        }

        Ok(self
            .clusters
            .iter()
            .find(|(r, _)| *r == resolution)
            .map(|(_, assignments)| assignments.clone())
            .unwrap_or_default())
    }

    async fn drop_projection(&self, projection: &str) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.dropped.push(projection.to_string());
        if self.fail_drop {
            return Err(Error::ClusteringFailed(format!(
                "injected drop failure for {}",
                projection
            )));
        }
        log.live.remove(projection);
        Ok(())
    }
}

// ============================================================================
// Oracles
// ============================================================================

type Responder = Box<dyn Fn(&StructuredCall) -> Result<StructuredOutput> + Send + Sync>;

/// LLM double answering from per-operation scripts
///
/// Queued one-shot responses are used first, in order; after that the
/// operation's repeating responder, if any. Unscripted calls fail.
pub(crate) struct ScriptedLlm {
    queued: Mutex<HashMap<&'static str, VecDeque<StructuredOutput>>>,
    responders: HashMap<&'static str, Responder>,
    calls: Mutex<Vec<StructuredCall>>,
}

impl ScriptedLlm {
    pub(crate) fn new() -> Self {
        Self {
            queued: Mutex::new(HashMap::new()),
            responders: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer the next `operation` call once
    pub(crate) fn on(self, operation: &'static str, value: serde_json::Value, usage: Option<TokenUsage>) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(StructuredOutput {
                value,
                token_usage: usage,
            });
        self
    }

    /// Answer every further `operation` call the same way
    pub(crate) fn on_repeat(
        self,
        operation: &'static str,
        value: serde_json::Value,
        usage: Option<TokenUsage>,
    ) -> Self {
        self.on_fn(operation, move |_| {
            Ok(StructuredOutput {
                value: value.clone(),
                token_usage: usage,
            })
        })
    }

    pub(crate) fn on_fn<F>(mut self, operation: &'static str, responder: F) -> Self
    where
        F: Fn(&StructuredCall) -> Result<StructuredOutput> + Send + Sync + 'static,
    {
        self.responders.insert(operation, Box::new(responder));
        self
    }

    /// Fail every `operation` call with an LLM error
    pub(crate) fn failing(self, operation: &'static str, message: &str) -> Self {
        let message = message.to_string();
        self.on_fn(operation, move |_| Err(Error::LLMError(message.clone())))
    }

    pub(crate) fn calls_for(&self, operation: &str) -> Vec<StructuredCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    pub(crate) fn call_count(&self, operation: &str) -> usize {
        self.calls_for(operation).len()
    }

    /// Operation names in call order
    pub(crate) fn operations(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|c| c.operation).collect()
    }
}

#[async_trait]
impl LlmOracle for ScriptedLlm {
    async fn call(&self, call: StructuredCall) -> Result<StructuredOutput> {
        self.calls.lock().unwrap().push(call.clone());

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(call.operation)
            .and_then(VecDeque::pop_front);
        if let Some(output) = queued {
            return Ok(output);
        }

        match self.responders.get(call.operation) {
            Some(responder) => responder(&call),
            None => Err(Error::LLMError(format!(
                "no scripted response for {}",
                call.operation
            ))),
        }
    }
}

/// Embeds every text as the same vector
pub(crate) struct FixedEmbedder {
    vector: Vec<f32>,
}

impl FixedEmbedder {
    pub(crate) fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl EmbeddingOracle for FixedEmbedder {
    async fn vectorise_text(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.vector.clone())
    }
}
