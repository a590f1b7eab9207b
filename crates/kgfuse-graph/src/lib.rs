//! KGFuse Graph: in-memory property graph store
//!
//! The fusion passes work against a plain property graph:
//!
//! - **Nodes** carry a set of labels and a string-keyed property map.
//! - **Relations** are structural `(start, type, end)` triples; inserting the
//!   same triple twice is a no-op.
//! - **Label index**: `label -> RoaringBitmap` of node ids.
//! - **Property index**: for every indexed property name,
//!   `value -> RoaringBitmap`. Collection values index each member, so alias
//!   lookups hit the index too.
//!
//! Every node kind declares a *primary property* (e.g. `term_name`,
//! `qualified_name`, `wd_item_id`). The store treats it as the merge key:
//! adding a node whose primary value already exists returns the existing id.
//!
//! Snapshots are written with a small header (`KGFG` + version) followed by a
//! bincode payload; see [`snapshot`].

pub mod property;
pub mod snapshot;

use ahash::AHashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

pub use property::{absorb_properties, Properties, PropertyValue};

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque node handle. Stable until the node is removed; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Sentinel used in exported dumps for "no node was assigned".
///
/// In-process APIs report the same condition as [`GraphError::Unassigned`].
pub const UNASSIGNED_NODE_ID: NodeId = NodeId(u32::MAX);

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("node was not assigned an id: {0}")]
    Unassigned(String),
    #[error("unknown node id {0}")]
    UnknownNode(NodeId),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("invalid graph snapshot: {0}")]
    InvalidSnapshot(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;

// ============================================================================
// Nodes & Relations
// ============================================================================

/// A node in the property graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub labels: BTreeSet<String>,
    pub properties: Properties,
}

impl GraphNode {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// String value of a property, `""` when missing or not a string.
    pub fn str_property(&self, name: &str) -> &str {
        self.properties
            .get(name)
            .and_then(PropertyValue::as_str)
            .unwrap_or("")
    }

    /// Members of a collection property (or the single scalar), empty when missing.
    pub fn strings_property(&self, name: &str) -> Vec<String> {
        self.properties
            .get(name)
            .map(PropertyValue::strings)
            .unwrap_or_default()
    }
}

/// A typed directed relation. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub start: NodeId,
    pub rel_type: String,
    pub end: NodeId,
}

impl Relation {
    pub fn new(start: NodeId, rel_type: impl Into<String>, end: NodeId) -> Self {
        Self {
            start,
            rel_type: rel_type.into(),
            end,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) -[{}]-> ({})", self.start, self.rel_type, self.end)
    }
}

/// Summary counts for logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphInfo {
    pub nodes: usize,
    pub relations: usize,
    pub labels: BTreeMap<String, u64>,
}

impl fmt::Display for GraphInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} nodes, {} relations", self.nodes, self.relations)?;
        for (label, count) in &self.labels {
            write!(f, "\n  {label}: {count}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Property Graph
// ============================================================================

/// The property graph store.
#[derive(Debug, Clone, Default)]
pub struct PropertyGraph {
    nodes: BTreeMap<NodeId, GraphNode>,
    relations: BTreeSet<Relation>,
    next_id: u32,
    /// Property names maintained in `property_index`.
    indexed_properties: BTreeSet<String>,
    label_index: AHashMap<String, RoaringBitmap>,
    /// property name -> value -> node ids
    property_index: AHashMap<String, AHashMap<String, RoaringBitmap>>,
    out_index: AHashMap<NodeId, BTreeSet<Relation>>,
    in_index: AHashMap<NodeId, BTreeSet<Relation>>,
}

impl PropertyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }

    pub fn has_relation(&self, start: NodeId, rel_type: &str, end: NodeId) -> bool {
        self.out_index
            .get(&start)
            .map(|rels| rels.iter().any(|r| r.end == end && r.rel_type == rel_type))
            .unwrap_or(false)
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Start maintaining an index over `name`. Existing nodes are indexed immediately.
    pub fn create_index_on_property(&mut self, name: &str) {
        if self.indexed_properties.insert(name.to_string()) {
            let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
            for id in ids {
                self.index_node_property(id, name);
            }
        }
    }

    pub fn indexed_properties(&self) -> impl Iterator<Item = &str> {
        self.indexed_properties.iter().map(String::as_str)
    }

    /// Rebuild every derived index from the node and relation tables.
    pub fn refresh_indexer(&mut self) {
        self.label_index.clear();
        self.property_index.clear();
        self.out_index.clear();
        self.in_index.clear();

        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            self.index_node(id);
        }
        for rel in &self.relations {
            self.out_index
                .entry(rel.start)
                .or_default()
                .insert(rel.clone());
            self.in_index.entry(rel.end).or_default().insert(rel.clone());
        }
    }

    fn index_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        for label in &node.labels {
            self.label_index
                .entry(label.clone())
                .or_insert_with(RoaringBitmap::new)
                .insert(id.0);
        }
        let names: Vec<String> = self.indexed_properties.iter().cloned().collect();
        for name in names {
            self.index_node_property(id, &name);
        }
    }

    fn index_node_property(&mut self, id: NodeId, name: &str) {
        let Some(value) = self.nodes.get(&id).and_then(|n| n.properties.get(name)) else {
            return;
        };
        let column = self.property_index.entry(name.to_string()).or_default();
        for key in value.strings() {
            column
                .entry(key)
                .or_insert_with(RoaringBitmap::new)
                .insert(id.0);
        }
    }

    fn unindex_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        for label in &node.labels {
            if let Some(ids) = self.label_index.get_mut(label) {
                ids.remove(id.0);
            }
        }
        for name in &self.indexed_properties {
            let Some(value) = node.properties.get(name) else {
                continue;
            };
            let Some(column) = self.property_index.get_mut(name) else {
                continue;
            };
            for key in value.strings() {
                if let Some(ids) = column.get_mut(&key) {
                    ids.remove(id.0);
                    if ids.is_empty() {
                        column.remove(&key);
                    }
                }
            }
        }
    }

    // ========================================================================
    // Node Operations
    // ========================================================================

    fn insert_node(&mut self, labels: BTreeSet<String>, properties: Properties) -> Result<NodeId> {
        let id = NodeId(self.next_id);
        // the sentinel is never handed out
        self.next_id = match self.next_id.checked_add(1) {
            Some(next) if id != UNASSIGNED_NODE_ID => next,
            _ => {
                return Err(GraphError::Unassigned(format!(
                    "node id space exhausted at {}",
                    self.next_id
                )))
            }
        };
        self.nodes.insert(
            id,
            GraphNode {
                id,
                labels,
                properties,
            },
        );
        self.index_node(id);
        Ok(id)
    }

    /// Add a node keyed by `primary_property`.
    ///
    /// Fails when the primary property is missing. When a node with the same
    /// primary value already exists its id is returned and nothing is written.
    pub fn add_node<I, S>(
        &mut self,
        labels: I,
        properties: Properties,
        primary_property: &str,
    ) -> Result<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(primary_value) = properties.get(primary_property).cloned() else {
            return Err(GraphError::Unassigned(format!(
                "node properties lack primary property {primary_property:?}"
            )));
        };
        self.create_index_on_property(primary_property);
        if let Some(existing) = self.find_exact(&[(primary_property, &primary_value)]) {
            return Ok(existing);
        }
        let labels: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        self.insert_node(labels, properties)
    }

    /// Add or merge a node keyed by `primary_property`.
    ///
    /// On a match, labels are unioned and properties absorbed
    /// (see [`PropertyValue::absorb`]); existing scalars are kept.
    pub fn merge_node<I, S>(
        &mut self,
        labels: I,
        properties: Properties,
        primary_property: &str,
    ) -> Result<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.merge_node_with_multi_primary_property(labels, properties, &[primary_property])
    }

    /// Like [`merge_node`](Self::merge_node), matching on the conjunction of
    /// every property in `primary_properties`.
    pub fn merge_node_with_multi_primary_property<I, S>(
        &mut self,
        labels: I,
        properties: Properties,
        primary_properties: &[&str],
    ) -> Result<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if primary_properties.is_empty() {
            return Err(GraphError::Unassigned(
                "no primary property given".to_string(),
            ));
        }
        let mut keys: Vec<(&str, PropertyValue)> = Vec::with_capacity(primary_properties.len());
        for name in primary_properties {
            let Some(value) = properties.get(*name) else {
                return Err(GraphError::Unassigned(format!(
                    "node properties lack primary property {name:?}"
                )));
            };
            keys.push((*name, value.clone()));
        }
        for (name, _) in &keys {
            self.create_index_on_property(name);
        }

        let labels: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        let key_refs: Vec<(&str, &PropertyValue)> = keys.iter().map(|(n, v)| (*n, v)).collect();
        match self.find_exact(&key_refs) {
            Some(id) => {
                self.update_node(id, |node| {
                    node.labels.extend(labels);
                    absorb_properties(&mut node.properties, properties);
                })?;
                Ok(id)
            }
            None => self.insert_node(labels, properties),
        }
    }

    /// Lowest-id node whose properties equal every `(name, value)` pair exactly.
    fn find_exact(&self, keys: &[(&str, &PropertyValue)]) -> Option<NodeId> {
        let mut candidates: Option<RoaringBitmap> = None;
        for (name, value) in keys {
            let mut hits = RoaringBitmap::new();
            if let Some(column) = self.property_index.get(*name) {
                for key in value.strings() {
                    if let Some(ids) = column.get(&key) {
                        hits |= ids;
                    }
                }
            } else {
                for node in self.nodes.values() {
                    if node.properties.get(*name) == Some(*value) {
                        hits.insert(node.id.0);
                    }
                }
            }
            candidates = Some(match candidates {
                None => hits,
                Some(acc) => acc & hits,
            });
        }

        candidates?.iter().map(NodeId).find(|id| {
            self.nodes.get(id).is_some_and(|node| {
                keys.iter()
                    .all(|(name, value)| node.properties.get(*name) == Some(*value))
            })
        })
    }

    /// Mutate a node in place, keeping every index consistent.
    pub fn update_node<F>(&mut self, id: NodeId, f: F) -> Result<()>
    where
        F: FnOnce(&mut GraphNode),
    {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::UnknownNode(id));
        }
        self.unindex_node(id);
        if let Some(node) = self.nodes.get_mut(&id) {
            f(node);
            node.id = id;
        }
        self.index_node(id);
        Ok(())
    }

    pub fn add_label(&mut self, id: NodeId, label: &str) -> Result<()> {
        self.update_node(id, |node| {
            node.labels.insert(label.to_string());
        })
    }

    /// Remove a node together with every relation touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<GraphNode> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::UnknownNode(id));
        }
        let incident: Vec<Relation> = self
            .get_all_out_relations(id)
            .into_iter()
            .chain(self.get_all_in_relations(id))
            .collect();
        for rel in incident {
            self.remove_relation(rel.start, &rel.rel_type, rel.end);
        }
        self.unindex_node(id);
        self.out_index.remove(&id);
        self.in_index.remove(&id);
        self.nodes.remove(&id).ok_or(GraphError::UnknownNode(id))
    }

    // ========================================================================
    // Relation Operations
    // ========================================================================

    /// Add `start -[rel_type]-> end`. Returns `false` when the triple already existed.
    pub fn add_relation(&mut self, start: NodeId, rel_type: &str, end: NodeId) -> Result<bool> {
        for id in [start, end] {
            if !self.nodes.contains_key(&id) {
                return Err(GraphError::UnknownNode(id));
            }
        }
        let rel = Relation::new(start, rel_type, end);
        if !self.relations.insert(rel.clone()) {
            return Ok(false);
        }
        self.out_index.entry(start).or_default().insert(rel.clone());
        self.in_index.entry(end).or_default().insert(rel);
        Ok(true)
    }

    /// Remove a relation. Returns whether it existed.
    pub fn remove_relation(&mut self, start: NodeId, rel_type: &str, end: NodeId) -> bool {
        let rel = Relation::new(start, rel_type, end);
        if !self.relations.remove(&rel) {
            return false;
        }
        if let Some(out) = self.out_index.get_mut(&start) {
            out.remove(&rel);
        }
        if let Some(incoming) = self.in_index.get_mut(&end) {
            incoming.remove(&rel);
        }
        true
    }

    pub fn get_all_out_relations(&self, id: NodeId) -> Vec<Relation> {
        self.out_index
            .get(&id)
            .map(|rels| rels.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_all_in_relations(&self, id: NodeId) -> Vec<Relation> {
        self.in_index
            .get(&id)
            .map(|rels| rels.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Outgoing relations of a fixed type.
    pub fn get_relations(&self, start: NodeId, rel_type: &str) -> Vec<Relation> {
        self.out_index
            .get(&start)
            .map(|rels| {
                rels.iter()
                    .filter(|r| r.rel_type == rel_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every relation of a given type.
    pub fn get_relations_by_type(&self, rel_type: &str) -> Vec<Relation> {
        self.relations
            .iter()
            .filter(|r| r.rel_type == rel_type)
            .cloned()
            .collect()
    }

    pub fn is_isolated(&self, id: NodeId) -> bool {
        self.out_index.get(&id).map_or(true, BTreeSet::is_empty)
            && self.in_index.get(&id).map_or(true, BTreeSet::is_empty)
    }

    // ========================================================================
    // Query Operations
    // ========================================================================

    /// Ids of nodes carrying `label` (bitmap result for cheap set algebra).
    pub fn get_node_ids_by_label(&self, label: &str) -> RoaringBitmap {
        self.label_index.get(label).cloned().unwrap_or_default()
    }

    /// Ids of nodes carrying `label`, ascending.
    pub fn node_ids_with_label(&self, label: &str) -> Vec<NodeId> {
        self.label_index
            .get(label)
            .map(|ids| ids.iter().map(NodeId).collect())
            .unwrap_or_default()
    }

    /// Lowest-id node whose `name` property is or contains `value`.
    pub fn find_one_node_by_property(&self, name: &str, value: &str) -> Option<&GraphNode> {
        self.find_nodes_by_property(name, value)
            .first()
            .and_then(|id| self.nodes.get(id))
    }

    /// Every node whose `name` property is or contains `value`, ascending.
    pub fn find_nodes_by_property(&self, name: &str, value: &str) -> Vec<NodeId> {
        if let Some(column) = self.property_index.get(name) {
            return column
                .get(value)
                .map(|ids| ids.iter().map(NodeId).collect())
                .unwrap_or_default();
        }
        if self.indexed_properties.contains(name) {
            return Vec::new();
        }
        self.nodes
            .values()
            .filter(|node| {
                node.properties
                    .get(name)
                    .is_some_and(|v| v.contains(value))
            })
            .map(|node| node.id)
            .collect()
    }

    pub fn info(&self) -> GraphInfo {
        let labels = self
            .label_index
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(label, ids)| (label.clone(), ids.len()))
            .collect();
        GraphInfo {
            nodes: self.nodes.len(),
            relations: self.relations.len(),
            labels,
        }
    }

    pub(crate) fn from_parts(
        next_id: u32,
        indexed_properties: BTreeSet<String>,
        nodes: Vec<GraphNode>,
        relations: Vec<Relation>,
    ) -> Result<Self> {
        let mut graph = PropertyGraph {
            next_id,
            indexed_properties,
            ..Default::default()
        };
        for node in nodes {
            if node.id.0 >= next_id {
                return Err(GraphError::InvalidSnapshot(format!(
                    "node id {} is not below the id watermark {next_id}",
                    node.id
                )));
            }
            graph.nodes.insert(node.id, node);
        }
        for rel in relations {
            if !graph.nodes.contains_key(&rel.start) || !graph.nodes.contains_key(&rel.end) {
                return Err(GraphError::InvalidSnapshot(format!(
                    "relation {rel} references a missing node"
                )));
            }
            graph.relations.insert(rel);
        }
        graph.refresh_indexer();
        Ok(graph)
    }

    pub(crate) fn parts(&self) -> (u32, &BTreeSet<String>, Vec<&GraphNode>, Vec<&Relation>) {
        (
            self.next_id,
            &self.indexed_properties,
            self.nodes.values().collect(),
            self.relations.iter().collect(),
        )
    }
}

/// Build a [`Properties`] map from `(key, value)` pairs.
pub fn props<I, K, V>(pairs: I) -> Properties
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<PropertyValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
