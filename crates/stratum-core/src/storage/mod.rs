//! Storage layer - SQLite
//!
//! - `database`: connection pool management and initialization
//! - `migrations`: schema versioning and automatic migration
//!
//! ```ignore
//! use stratum_core::storage::Database;
//!
//! let db = Database::in_memory().await?;
//! let repo = SqliteCommunityRepository::new(db.pool().clone(), "tenant-1");
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::{CURRENT_VERSION, run_migrations};
