//! Hub Migrate - Dependency-aware content migration between content hubs
//!
//! Content items embed links and references to other items, so they cannot
//! be copied one by one. Hub Migrate scans those links, orders items so every
//! dependency exists before anything points at it, handles circular links in
//! two passes and translates IDs through a persistent mapping file, which
//! makes imports repeatable.

pub mod domain;
pub mod storage;
pub mod hub;
pub mod migrate;
pub mod cli;

pub use domain::{BatchItem, ContentItem, ContentStatus, DependencyGraph};
pub use storage::ContentMapping;
