//! Scope infrastructure

mod repository;

pub use repository::SqliteScopeRepository;
