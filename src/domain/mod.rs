//! # Domain Layer
//!
//! Content items and the dependency engine. Nothing in here performs I/O.
//!
//! ## Key Types
//!
//! - [`ContentItem`] - A content item as stored on a hub or in an export file
//! - [`DependencyMarker`] - A link, reference or hierarchy parent found in a body
//! - [`DependencyGraph`] - Batch-wide graph with import levels and circular links
//! - [`Pattern`] - Exact-or-`/regex/` filter used by name and schema options
//!
//! ## Import Order
//!
//! ```text
//! level 0: items with no unresolved dependencies
//! level 1: items depending only on level 0 (or already-mapped items)
//! ...
//! circular: everything left when a pass places nothing
//! ```

pub mod content;
pub mod filter;
pub mod graph;
pub mod marker;

pub use content::{BatchItem, ContentItem, ContentStatus};
pub use filter::{equals_or_regex, FilterError, Pattern, PatternSet};
pub use graph::{Dependency, DependencyGraph, DependencyRecord, RecordId};
pub use marker::{DependencyMarker, MarkerKind};
