//! Infrastructure layer
//!
//! SQLite implementations of the domain traits: concept graph, communities,
//! scopes, and the projection-based clustering engine.

pub mod community;
pub mod graph;
pub mod knowledge;
pub mod scope;
pub mod vector;

use chrono::{DateTime, Utc};

/// Parse an RFC 3339 column, falling back to now for unparseable values
pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_optional_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value.and_then(|v| DateTime::parse_from_rfc3339(v).ok().map(|dt| dt.with_timezone(&Utc)))
}
