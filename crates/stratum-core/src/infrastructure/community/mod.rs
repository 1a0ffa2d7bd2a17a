//! Community infrastructure
//!
//! SQLite implementation of the community repository trait.

mod repository;

pub use repository::SqliteCommunityRepository;
