//! Term canonicalization: raw term string -> the node that represents it.
//!
//! Two raw strings with the same lemma always resolve to the same node. The
//! node's alias set grows monotonically and its display name is re-derived
//! as the shortest alias on every union.

use crate::error::{FusionError, Result};
use crate::lemma::{normalize, select_name};
use crate::schema::{Namespace, ALIAS, LEMMA};
use kgfuse_graph::{NodeId, Properties, PropertyGraph, PropertyValue};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
struct NamespaceTable {
    by_lemma: HashMap<String, NodeId>,
    by_name: HashMap<String, NodeId>,
}

/// Per-run lemma tables for the term and operation namespaces.
#[derive(Debug, Default)]
pub struct TermCanonicalizer {
    terms: NamespaceTable,
    operations: NamespaceTable,
}

impl TermCanonicalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the lemma tables from the term and operation nodes already in `graph`.
    pub fn from_graph(graph: &PropertyGraph) -> Self {
        let mut canonicalizer = Self::new();
        for ns in [Namespace::Term, Namespace::Operation] {
            for id in graph.node_ids_with_label(ns.label()) {
                let Some(node) = graph.node(id) else {
                    continue;
                };
                let name = node.str_property(ns.primary_property());
                let lemma = match node.str_property(LEMMA) {
                    "" => normalize(name),
                    lemma => lemma.to_string(),
                };
                let table = canonicalizer.table_mut(ns);
                table.by_lemma.entry(lemma).or_insert(id);
                if !name.is_empty() {
                    table.by_name.entry(name.to_string()).or_insert(id);
                }
            }
        }
        canonicalizer
    }

    fn table(&self, ns: Namespace) -> &NamespaceTable {
        match ns {
            Namespace::Term => &self.terms,
            Namespace::Operation => &self.operations,
        }
    }

    fn table_mut(&mut self, ns: Namespace) -> &mut NamespaceTable {
        match ns {
            Namespace::Term => &mut self.terms,
            Namespace::Operation => &mut self.operations,
        }
    }

    pub fn lookup_lemma(&self, ns: Namespace, lemma: &str) -> Option<NodeId> {
        self.table(ns).by_lemma.get(lemma).copied()
    }

    pub fn register(&mut self, ns: Namespace, lemma: String, id: NodeId) {
        self.table_mut(ns).by_lemma.insert(lemma, id);
    }

    /// Resolve a raw string: exact names seen this run first, then the lemma table,
    /// creating a node when neither knows it.
    pub fn resolve(
        &mut self,
        graph: &mut PropertyGraph,
        ns: Namespace,
        raw: &str,
    ) -> Result<NodeId> {
        if let Some(id) = self.table(ns).by_name.get(raw).copied() {
            if graph.contains_node(id) {
                return Ok(id);
            }
        }
        self.canonicalize(graph, ns, raw, &[])
    }

    /// Return the node for `term`, creating it or folding `term` (and
    /// `aliases`) into the node that already owns its lemma.
    pub fn canonicalize(
        &mut self,
        graph: &mut PropertyGraph,
        ns: Namespace,
        term: &str,
        aliases: &[String],
    ) -> Result<NodeId> {
        if term.trim().is_empty() {
            return Err(FusionError::InvalidTerm(term.to_string()));
        }
        let lemma = normalize(term);

        if let Some(id) = self.lookup_lemma(ns, &lemma) {
            if graph.contains_node(id) {
                let mut incoming: Vec<String> = aliases.to_vec();
                incoming.push(term.to_string());
                union_aliases(graph, ns, id, incoming)?;
                self.table_mut(ns).by_name.insert(term.to_string(), id);
                return Ok(id);
            }
        }

        let mut alias: BTreeSet<String> = aliases.iter().cloned().collect();
        alias.insert(term.to_string());
        alias.insert(lemma.clone());

        let mut properties = Properties::new();
        properties.insert(ns.primary_property().to_string(), PropertyValue::str(term));
        properties.insert(ALIAS.to_string(), PropertyValue::Set(alias));
        properties.insert(LEMMA.to_string(), PropertyValue::str(lemma.clone()));

        let id = graph
            .add_node([ns.label()], properties, ns.primary_property())
            .map_err(|e| FusionError::unassigned(term, e))?;
        tracing::debug!(term, %lemma, %id, namespace = ns.label(), "created node");

        let table = self.table_mut(ns);
        table.by_lemma.insert(lemma, id);
        table.by_name.insert(term.to_string(), id);
        Ok(id)
    }
}

/// Union `incoming` into the node's alias set and re-derive its display name.
///
/// Returns whether the node changed.
pub fn union_aliases(
    graph: &mut PropertyGraph,
    ns: Namespace,
    id: NodeId,
    incoming: impl IntoIterator<Item = String>,
) -> Result<bool> {
    let node = graph
        .node(id)
        .ok_or(FusionError::Graph(kgfuse_graph::GraphError::UnknownNode(id)))?;
    let primary = ns.primary_property();
    let current_name = node.str_property(primary).to_string();

    let mut alias: BTreeSet<String> = node.strings_property(ALIAS).into_iter().collect();
    let before = alias.len();
    alias.extend(incoming);
    let name = select_name(&current_name, &alias);
    if alias.len() == before && name == current_name {
        return Ok(false);
    }

    graph.update_node(id, |node| {
        node.properties
            .insert(ALIAS.to_string(), PropertyValue::Set(alias));
        node.properties
            .insert(primary.to_string(), PropertyValue::str(name));
    })?;
    Ok(true)
}
