//! Tenant scopes
//!
//! Every concept and community belongs to exactly one scope. Batch jobs
//! enumerate scopes through [`ScopeEnumerator`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// A tenant boundary for concepts and communities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Lists every scope known to the system
#[async_trait]
pub trait ScopeEnumerator: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Scope>>;
}
