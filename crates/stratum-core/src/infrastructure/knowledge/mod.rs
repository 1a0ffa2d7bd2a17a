//! Concept graph infrastructure
//!
//! SQLite implementation of the concept repository trait.

mod repository;

pub use repository::SqliteConceptRepository;
