//! Dependency graph for content items
//!
//! Connects every item in a batch to the items its body points at, computes a
//! level-by-level import order and isolates items that take part in (or hang
//! off) a dependency cycle. Uses petgraph for storage and traversal.
//!
//! Edge direction is `dependency -> dependant`: "the dependency must exist
//! before the dependant can point at it".

use std::collections::{HashMap, HashSet};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, EdgeFiltered, EdgeRef};
use petgraph::Direction;

use super::content::BatchItem;
use super::marker::{self, DependencyMarker, MarkerKind};
use crate::storage::ContentMapping;

/// Handle to a record in a [`DependencyGraph`]
pub type RecordId = NodeIndex;

/// A marker found in an item's body and what it resolved to in the batch
#[derive(Debug, Clone)]
pub struct Dependency {
    pub marker: DependencyMarker,
    /// Record in the same batch the marker points at, if any
    pub resolved: Option<RecordId>,
}

/// An item in the batch and the dependencies found in its body
#[derive(Debug, Clone)]
pub struct DependencyRecord {
    pub owner: BatchItem,
    pub dependencies: Vec<Dependency>,
}

impl DependencyRecord {
    fn scan(owner: BatchItem) -> Self {
        let dependencies = marker::scan(&owner.content.body)
            .into_iter()
            .map(|marker| Dependency {
                marker,
                resolved: None,
            })
            .collect();

        Self {
            owner,
            dependencies,
        }
    }

    /// ID of the item on the source hub
    pub fn source_id(&self) -> Option<&str> {
        self.owner.content.id.as_deref()
    }

    pub fn label(&self) -> &str {
        &self.owner.content.label
    }

    pub fn schema(&self) -> Option<&str> {
        self.owner.content.schema()
    }

    pub fn markers(&self) -> impl Iterator<Item = &DependencyMarker> {
        self.dependencies.iter().map(|d| &d.marker)
    }
}

/// Dependency graph over one batch of content items
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<DependencyRecord, MarkerKind>,
    all: Vec<RecordId>,
    by_id: HashMap<String, RecordId>,
    levels: Vec<Vec<RecordId>>,
    circular_links: Vec<RecordId>,
    required_schema: Vec<String>,
}

impl DependencyGraph {
    /// Builds the graph for a batch
    ///
    /// Targets already present in `mapping` count as satisfied when leveling,
    /// since they were created by an earlier run.
    pub fn new(items: impl IntoIterator<Item = BatchItem>, mapping: &ContentMapping) -> Self {
        let mut graph = Self::default();

        // First pass: one record per item
        for item in items {
            if let Some(schema) = item.content.schema() {
                if !graph.required_schema.iter().any(|s| s == schema) {
                    graph.required_schema.push(schema.to_string());
                }
            }

            let id = item.content.id.clone();
            let idx = graph.graph.add_node(DependencyRecord::scan(item));
            graph.all.push(idx);
            if let Some(id) = id {
                graph.by_id.insert(id, idx);
            }
        }

        // Second pass: resolve edges within the batch
        for idx in graph.all.clone() {
            graph.resolve_edges(idx);
        }

        graph.compute_levels(mapping);
        graph
    }

    fn resolve_edges(&mut self, idx: RecordId) {
        let Some(record) = self.graph.node_weight_mut(idx) else {
            return;
        };

        let mut edges = Vec::new();
        for dependency in &mut record.dependencies {
            dependency.resolved = self.by_id.get(&dependency.marker.id).copied();
            if let Some(target) = dependency.resolved {
                edges.push((target, dependency.marker.kind));
            }
        }

        for (target, kind) in edges {
            self.graph.add_edge(target, idx, kind);
        }
    }

    /// Recomputes `levels` and `circular_links` from the current records
    ///
    /// Each pass places every pending item whose dependencies are all
    /// satisfied, either by an earlier level or by the mapping. A pass that
    /// places nothing ends the leveling; the remainder is circular.
    pub fn compute_levels(&mut self, mapping: &ContentMapping) {
        let mut satisfied: HashSet<&str> = mapping.source_ids().collect();
        let mut pending = self.all.clone();
        let mut levels = Vec::new();

        while !pending.is_empty() {
            let (ready, waiting): (Vec<RecordId>, Vec<RecordId>) =
                pending.iter().copied().partition(|idx| {
                    self.graph[*idx]
                        .dependencies
                        .iter()
                        .all(|d| satisfied.contains(d.marker.id.as_str()))
                });

            if ready.is_empty() {
                break;
            }

            for idx in &ready {
                if let Some(id) = self.graph[*idx].source_id() {
                    satisfied.insert(id);
                }
            }

            levels.push(ready);
            pending = waiting;
        }

        self.levels = levels;
        self.circular_links = pending;
    }

    /// All records, in input order
    pub fn all(&self) -> &[RecordId] {
        &self.all
    }

    /// Topological levels; level `k` depends only on levels `< k`
    pub fn levels(&self) -> &[Vec<RecordId>] {
        &self.levels
    }

    /// Records that could not be placed in any level
    pub fn circular_links(&self) -> &[RecordId] {
        &self.circular_links
    }

    /// Every schema URI used by an item in the batch
    pub fn required_schema(&self) -> &[String] {
        &self.required_schema
    }

    /// Looks up a record by its source content item ID
    pub fn by_id(&self, id: &str) -> Option<RecordId> {
        self.by_id.get(id).copied()
    }

    /// Returns true if the batch still holds an item with this source ID
    pub fn contains_id(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn record(&self, idx: RecordId) -> Option<&DependencyRecord> {
        self.graph.node_weight(idx)
    }

    /// Iterates the records still in the batch, in input order
    pub fn records(&self) -> impl Iterator<Item = (RecordId, &DependencyRecord)> {
        self.all
            .iter()
            .filter_map(|idx| self.graph.node_weight(*idx).map(|r| (*idx, r)))
    }

    /// Returns the number of items in the batch
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Returns true if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Direct dependants of a record (records whose body points at it)
    pub fn dependants(&self, idx: RecordId) -> Vec<RecordId> {
        if !self.graph.contains_node(idx) {
            return vec![];
        }

        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect()
    }

    /// The record itself followed by everything that transitively depends on it
    ///
    /// With `ignore_hierarchy`, hierarchy parent edges are not followed.
    pub fn traverse_dependants(&self, start: RecordId, ignore_hierarchy: bool) -> Vec<RecordId> {
        if !self.graph.contains_node(start) {
            return vec![];
        }

        let filtered = EdgeFiltered::from_fn(&self.graph, |edge| {
            !(ignore_hierarchy && *edge.weight() == MarkerKind::Hierarchy)
        });

        let mut visited = Vec::new();
        let mut dfs = Dfs::new(&filtered, start);
        while let Some(idx) = dfs.next(&filtered) {
            visited.push(idx);
        }
        visited
    }

    /// Returns every record for which `predicate` holds on the record itself or
    /// on any record reachable from it through dependant edges
    pub fn filter_any<F>(&self, ignore_hierarchy: bool, mut predicate: F) -> Vec<RecordId>
    where
        F: FnMut(&DependencyRecord) -> bool,
    {
        self.all
            .iter()
            .copied()
            .filter(|idx| {
                self.traverse_dependants(*idx, ignore_hierarchy)
                    .into_iter()
                    .any(|reached| predicate(&self.graph[reached]))
            })
            .collect()
    }

    /// Dependencies of a record that resolve neither in the batch nor in the mapping
    pub fn missing_dependencies(
        &self,
        idx: RecordId,
        mapping: &ContentMapping,
    ) -> Vec<&DependencyMarker> {
        self.graph
            .node_weight(idx)
            .map(|record| {
                record
                    .markers()
                    .filter(|m| !self.contains_id(&m.id) && mapping.get(&m.id).is_none())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Removes records from the batch
    ///
    /// Removes them from `all`, every level, `circular_links` and the ID
    /// index. Records that pointed at a removed record keep their dependency
    /// entry; it simply no longer resolves. Removing twice is a no-op.
    pub fn remove_content(&mut self, remove: &[RecordId]) {
        let remove: HashSet<RecordId> = remove.iter().copied().collect();
        if remove.is_empty() {
            return;
        }

        for level in &mut self.levels {
            level.retain(|idx| !remove.contains(idx));
        }
        self.levels.retain(|level| !level.is_empty());
        self.all.retain(|idx| !remove.contains(idx));
        self.circular_links.retain(|idx| !remove.contains(idx));
        self.by_id.retain(|_, idx| !remove.contains(idx));

        for idx in remove {
            self.graph.remove_node(idx);
        }
    }

    /// Strips the given embedded markers from a record's body
    ///
    /// The record's dependencies are re-scanned afterwards so the remaining
    /// marker locations stay valid. Returns the number of values removed.
    pub fn strip_dependencies(&mut self, idx: RecordId, markers: &[DependencyMarker]) -> usize {
        let Some(record) = self.graph.node_weight_mut(idx) else {
            return 0;
        };

        let removed = marker::strip_markers(&mut record.owner.content.body, markers);
        if removed == 0 {
            return 0;
        }

        let rescanned = DependencyRecord::scan(record.owner.clone());
        record.dependencies = rescanned.dependencies;

        let incoming: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|edge| edge.id())
            .collect();
        for edge in incoming {
            self.graph.remove_edge(edge);
        }

        self.resolve_edges(idx);
        removed
    }
}
