//! Batch detection across every scope

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::scope::{Scope, ScopeEnumerator};
use crate::error::Result;

use super::detector::{CommunityDetector, DetectionReport};
use super::lock::ScopeLocks;

/// A scope whose detection failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeFailure {
    pub scope_id: String,
    pub error: String,
}

/// Aggregate outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchDetectionResult {
    /// Ids of scopes detected successfully, in enumeration order
    pub succeeded: Vec<String>,
    pub failed: Vec<ScopeFailure>,
    pub reports: Vec<DetectionReport>,
}

impl BatchDetectionResult {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

type DetectorFactory = dyn Fn(&Scope) -> CommunityDetector + Send + Sync;

/// Runs full detection once per scope, isolating failures
///
/// Every detector the factory builds is bound to the runner's
/// [`ScopeLocks`], so a batch run waits for trackers holding a scope.
pub struct BatchDetectionRunner {
    scopes: Arc<dyn ScopeEnumerator>,
    factory: Box<DetectorFactory>,
    locks: ScopeLocks,
}

impl BatchDetectionRunner {
    pub fn new<F>(scopes: Arc<dyn ScopeEnumerator>, factory: F) -> Self
    where
        F: Fn(&Scope) -> CommunityDetector + Send + Sync + 'static,
    {
        Self {
            scopes,
            factory: Box::new(factory),
            locks: ScopeLocks::new(),
        }
    }

    /// Share a lock registry with the staleness trackers of the same scopes
    pub fn with_locks(mut self, locks: ScopeLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &ScopeLocks {
        &self.locks
    }

    /// Detect every scope. Only a failure to enumerate scopes is an error;
    /// per-scope failures are recorded and the run continues.
    pub async fn run(&self) -> Result<BatchDetectionResult> {
        let scopes = self.scopes.fetch_all().await?;
        info!(scopes = scopes.len(), "Starting batch community detection");

        let mut result = BatchDetectionResult::default();

        for scope in &scopes {
            let detector = (self.factory)(scope).with_locks(self.locks.clone());
            match detector.detect_communities().await {
                Ok(report) => {
                    result.succeeded.push(scope.id.clone());
                    result.reports.push(report);
                }
                Err(e) => {
                    warn!(
                        scope_id = %scope.id,
                        scope_name = %scope.name,
                        error = %e,
                        "Community detection failed for scope"
                    );
                    result.failed.push(ScopeFailure {
                        scope_id: scope.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "Batch community detection complete"
        );

        Ok(result)
    }
}
