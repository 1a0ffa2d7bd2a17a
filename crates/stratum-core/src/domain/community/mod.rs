//! Hierarchical community detection
//!
//! Clusters a scope's concept graph at several resolutions, persists the
//! clusters as communities, links each level to the next coarser one, and
//! keeps them current between runs.
//!
//! # Components
//!
//! - [`CommunityDetector`]: full multi-resolution detection for one scope
//! - [`build_hierarchy`]: parent assignment by majority member overlap
//! - [`StalenessTracker`]: incremental assignment and stale flagging
//! - [`CommunitySummarizer`]: regenerates summaries of stale communities
//! - [`BatchDetectionRunner`]: detection over every scope with failure isolation
//!
//! ```ignore
//! let detector = CommunityDetector::new(repo, engine, config.communities.clone());
//! let report = detector.detect_communities().await?;
//! ```

mod batch;
mod detector;
mod engine;
mod entity;
mod hierarchy;
mod lock;
mod repository;
mod staleness;
mod summarizer;

pub use batch::{BatchDetectionResult, BatchDetectionRunner, ScopeFailure};
pub use detector::{CommunityDetector, DetectionReport, LevelReport};
pub use engine::{
    ClusterAssignment, ClusteringEngine, SequentialTokenSource, TokenSource, UuidTokenSource,
    projection_name,
};
pub use entity::{
    Community, CommunityAffinity, DetectedCommunity, LevelCount, MemberConcept,
    MemberRelationship, NewCommunity, StaleCommunity, SummaryUpdate,
};
pub use hierarchy::{ParentLink, build_hierarchy};
pub use lock::{ScopeGuard, ScopeLocks};
pub use repository::CommunityRepository;
pub use staleness::{Assignment, AssignmentReport, IndexingOutcome, StalenessTracker};
pub use summarizer::{CommunitySummarizer, MAX_RATING, SummaryFailure, SummaryReport};
