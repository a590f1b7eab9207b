//! Applying accepted links to the graph.
//!
//! Accepting an item copies its fact properties onto the domain node and
//! tags it [`LABEL_WIKIDATA`]. Once a batch is applied, the cross-reference
//! pass turns item-to-item claims into graph relations between the nodes
//! that carry those items.

use crate::cache::FactCache;
use crate::config::MergeConfig;
use crate::error::{FusionError, Result};
use crate::item::{Item, PropertyTable};
use crate::schema::{LABEL_WIKIDATA, WD_ITEM_ID};
use kgfuse_graph::{NodeId, Properties, PropertyGraph};
use std::collections::{BTreeMap, BTreeSet};

/// Merge `incoming` into `target`:
///
/// - new key: set
/// - equal value: no-op
/// - collection that accepts the incoming value: union / extend
/// - anything else that differs (two scalars, or a scalar against a
///   collection): the incoming value goes under `key + suffix`
///
/// Returns whether `target` changed.
pub fn merge_properties(target: &mut Properties, incoming: Properties, suffix: &str) -> bool {
    let mut changed = false;
    for (key, value) in incoming {
        match target.get_mut(&key) {
            None => {
                target.insert(key, value);
                changed = true;
            }
            Some(current) if *current == value => {}
            Some(current) if current.accepts(&value) => {
                changed |= current.absorb(value);
            }
            Some(_) => {
                let conflict_key = format!("{key}{suffix}");
                if target.get(&conflict_key) != Some(&value) {
                    tracing::debug!(%key, %conflict_key, "value conflict");
                    target.insert(conflict_key, value);
                    changed = true;
                }
            }
        }
    }
    changed
}

pub struct MergeApplier<'a> {
    config: MergeConfig,
    table: &'a PropertyTable,
}

impl<'a> MergeApplier<'a> {
    pub fn new(config: MergeConfig, table: &'a PropertyTable) -> Self {
        Self { config, table }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merge an accepted item into node `id`. Returns whether the node changed.
    pub fn accept(&self, graph: &mut PropertyGraph, id: NodeId, item: &Item) -> Result<bool> {
        if !graph.contains_node(id) {
            return Err(FusionError::Graph(kgfuse_graph::GraphError::UnknownNode(id)));
        }
        let incoming = item.fact_properties(self.table);
        let suffix = self.config.conflict_suffix.as_str();
        let mut changed = false;
        graph.update_node(id, |node| {
            changed |= merge_properties(&mut node.properties, incoming, suffix);
            changed |= node.labels.insert(LABEL_WIKIDATA.to_string());
        })?;
        tracing::debug!(node = %id, item = %item.id, changed, "merged external facts");
        Ok(changed)
    }

    /// Insert every cached neighbour of `accepted` as an external-fact node.
    ///
    /// Nodes are keyed by [`WD_ITEM_ID`], so an item that is already present
    /// (linked or inserted earlier) is not duplicated. Returns the number of
    /// nodes created.
    pub fn add_neighbour_nodes(
        &self,
        graph: &mut PropertyGraph,
        cache: &FactCache,
        accepted: &[Item],
    ) -> Result<usize> {
        let neighbour_ids: BTreeSet<String> = accepted.iter().flat_map(Item::neighbour_ids).collect();
        let before = graph.node_count();
        for id in neighbour_ids {
            let Some(item) = cache.item(&id) else {
                continue;
            };
            if !item.is_valid() || !graph.find_nodes_by_property(WD_ITEM_ID, &id).is_empty() {
                continue;
            }
            graph
                .add_node([LABEL_WIKIDATA], item.fact_properties(self.table), WD_ITEM_ID)
                .map_err(|e| FusionError::unassigned(id.clone(), e))?;
        }
        Ok(graph.node_count() - before)
    }

    /// Add `(source, relation name, target)` for every item-valued claim of
    /// every linked node whose target item is also in the graph.
    ///
    /// Claims whose property has no name and self loops are skipped. Returns
    /// the number of relations added.
    pub fn cross_reference_pass(&self, graph: &mut PropertyGraph, cache: &FactCache) -> usize {
        let mut by_item: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
        for id in graph.node_ids_with_label(LABEL_WIKIDATA) {
            if let Some(node) = graph.node(id) {
                let item_id = node.str_property(WD_ITEM_ID);
                if !item_id.is_empty() {
                    by_item.entry(item_id.to_string()).or_default().push(id);
                }
            }
        }

        let mut pending = Vec::new();
        for (item_id, sources) in &by_item {
            let Some(item) = cache.item(item_id) else {
                continue;
            };
            for (pid, target) in item.references() {
                let Some(relation) = self.table.name(pid) else {
                    continue;
                };
                let Some(targets) = by_item.get(target) else {
                    continue;
                };
                for &s in sources {
                    for &t in targets {
                        if s != t {
                            pending.push((s, relation.to_string(), t));
                        }
                    }
                }
            }
        }

        let mut added = 0;
        for (s, relation, t) in pending {
            match graph.add_relation(s, &relation, t) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "cross reference skipped"),
            }
        }
        tracing::info!(relations = added, "cross-reference pass finished");
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgfuse_graph::{props, PropertyValue};

    #[test]
    fn scalar_conflicts_go_to_suffixed_key() {
        let mut target = props([("description_en", "a thread")]);
        target.insert("alias_en".into(), PropertyValue::set(["x"]));
        let incoming = {
            let mut p = props([("description_en", "unit of execution"), ("wd_item_id", "Q1")]);
            p.insert("alias_en".into(), PropertyValue::set(["y"]));
            p
        };

        assert!(merge_properties(&mut target, incoming.clone(), "_wiki"));
        assert_eq!(target["description_en"], PropertyValue::str("a thread"));
        assert_eq!(target["description_en_wiki"], PropertyValue::str("unit of execution"));
        assert_eq!(target["alias_en"], PropertyValue::set(["x", "y"]));
        assert_eq!(target["wd_item_id"], PropertyValue::str("Q1"));

        assert!(!merge_properties(&mut target, incoming, "_wiki"));
    }

    #[test]
    fn accept_tags_node() {
        let table = PropertyTable::default();
        let applier = MergeApplier::new(MergeConfig::default(), &table);
        let mut graph = PropertyGraph::new();
        let id = graph
            .add_node(["domain term"], props([("term_name", "thread")]), "term_name")
            .unwrap();
        let item = Item::new("Q1", "thread", "unit of execution");

        assert!(applier.accept(&mut graph, id, &item).unwrap());
        let node = graph.node(id).unwrap();
        assert!(node.has_label(LABEL_WIKIDATA));
        assert_eq!(node.str_property(WD_ITEM_ID), "Q1");
        assert!(!applier.accept(&mut graph, id, &item).unwrap());
        assert!(applier.accept(&mut graph, NodeId::new(99), &item).is_err());
    }
}
