//! Post-fusion cleanup passes.

use crate::canonicalizer::union_aliases;
use crate::error::Result;
use crate::schema::{Namespace, ALIAS, LABEL_DOMAIN_TERM, WD_ITEM_ID};
use kgfuse_graph::{absorb_properties, NodeId, PropertyGraph};
use std::collections::{BTreeMap, BTreeSet};

/// Remove every node with `label` that has no relations. Returns the count.
pub fn prune_isolated(graph: &mut PropertyGraph, label: &str) -> usize {
    prune_where(graph, label, |_| true)
}

/// Like [`prune_isolated`], sparing nodes that also carry `except_label`.
pub fn prune_isolated_except(graph: &mut PropertyGraph, label: &str, except_label: &str) -> usize {
    prune_where(graph, label, |node| !node.has_label(except_label))
}

fn prune_where<F>(graph: &mut PropertyGraph, label: &str, keep_out: F) -> usize
where
    F: Fn(&kgfuse_graph::GraphNode) -> bool,
{
    let doomed: Vec<NodeId> = graph
        .node_ids_with_label(label)
        .into_iter()
        .filter(|id| graph.is_isolated(*id))
        .filter(|id| graph.node(*id).is_some_and(&keep_out))
        .collect();
    let removed = doomed
        .into_iter()
        .filter(|id| graph.remove_node(*id).is_ok())
        .count();
    tracing::info!(label, removed, "pruned isolated nodes");
    removed
}

/// Remove domain terms whose display name or alias matches one of `names`,
/// together with their relations.
///
/// Returns `(removed, names not found)`.
pub fn remove_terms_by_name<I, S>(graph: &mut PropertyGraph, names: I) -> (usize, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut removed = 0;
    let mut missing = Vec::new();
    for name in names {
        let name = name.as_ref();
        let ids: BTreeSet<NodeId> = graph
            .find_nodes_by_property(Namespace::Term.primary_property(), name)
            .into_iter()
            .chain(graph.find_nodes_by_property(ALIAS, name))
            .filter(|id| graph.node(*id).is_some_and(|n| n.has_label(LABEL_DOMAIN_TERM)))
            .collect();
        if ids.is_empty() {
            tracing::info!(name, "term to remove not found");
            missing.push(name.to_string());
            continue;
        }
        for id in ids {
            if graph.remove_node(id).is_ok() {
                removed += 1;
            }
        }
    }
    (removed, missing)
}

/// Collapse domain terms linked to the same external item into the
/// lowest-id node: properties are absorbed, aliases unioned, relations
/// re-pointed (self loops dropped), then the duplicates removed.
///
/// Returns the number of nodes removed.
pub fn merge_same_linked_item(graph: &mut PropertyGraph) -> Result<usize> {
    let mut groups: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    for id in graph.node_ids_with_label(LABEL_DOMAIN_TERM) {
        if let Some(node) = graph.node(id) {
            let item = node.str_property(WD_ITEM_ID);
            if !item.is_empty() {
                groups.entry(item.to_string()).or_default().push(id);
            }
        }
    }

    let mut removed = 0;
    for (item, ids) in groups {
        let Some((&keep, duplicates)) = ids.split_first() else {
            continue;
        };
        if duplicates.is_empty() {
            continue;
        }
        tracing::debug!(%item, %keep, duplicates = duplicates.len(), "merging same-linked terms");

        for &dup in duplicates {
            let Some(node) = graph.node(dup).cloned() else {
                continue;
            };
            let relations: Vec<_> = graph
                .get_all_out_relations(dup)
                .into_iter()
                .chain(graph.get_all_in_relations(dup))
                .collect();

            let aliases = node.strings_property(ALIAS);
            let name = node.str_property(Namespace::Term.primary_property()).to_string();
            let mut properties = node.properties;
            // the survivor keeps its own display name
            properties.remove(Namespace::Term.primary_property());
            graph.update_node(keep, |survivor| {
                survivor.labels.extend(node.labels);
                absorb_properties(&mut survivor.properties, properties);
            })?;
            union_aliases(graph, Namespace::Term, keep, aliases.into_iter().chain([name]))?;

            for rel in relations {
                let start = if rel.start == dup { keep } else { rel.start };
                let end = if rel.end == dup { keep } else { rel.end };
                if start != end {
                    graph.add_relation(start, &rel.rel_type, end)?;
                }
            }
            graph.remove_node(dup)?;
            removed += 1;
        }
    }
    tracing::info!(removed, "merged same-linked terms");
    Ok(removed)
}
