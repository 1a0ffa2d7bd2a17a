//! Domain layer
//!
//! Core models and pipelines, independent of storage and transport.

pub mod community;
pub mod drift;
pub mod knowledge;
pub mod scope;
