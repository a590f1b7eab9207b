//! Domain fusion: import one extraction batch (terms, operations, relations)
//! into the graph.
//!
//! ```text
//! terms ──valid_term──► synonym clusters ──► alias map
//!                                              │
//! relations / linkages ──► re-targeter ◄───────┘
//!                              │
//!            canonicalizer (shortest terms first, then operations)
//!                              │
//!            relations, is-a derivation, operation/concept links
//! ```

use crate::artifact::read_json;
use crate::canonicalizer::TermCanonicalizer;
use crate::error::{FusionError, Result};
use crate::lemma::valid_term;
use crate::report::FusionReport;
use crate::retarget::{Endpoint, RawTriple, RelationRetargeter};
use crate::schema::{
    Namespace, ALIAS, LABEL_DOMAIN_TERM, LABEL_OPERATION, OPERATION_NAME, REL_CORRESPONDING_CONCEPT,
    REL_CORRESPONDING_OPERATION, REL_EXTENDS, REL_IS_A, REL_REPRESENT, TERM_NAME,
};
use crate::synonym::{cluster_terms, creation_order, AliasMap, SynonymOracle};
use kgfuse_graph::{NodeId, PropertyGraph};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Output of the extraction stage for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionBatch {
    pub terms: Vec<String>,
    pub operations: Vec<String>,
    /// Term-to-term relations.
    pub relations: Vec<RawTriple>,
    /// Code-element-to-term links.
    pub linkages: Vec<RawTriple>,
    /// Class -> operation links synthesized from method names; not re-targeted.
    pub operation_links: Vec<RawTriple>,
}

impl ExtractionBatch {
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

fn endpoint_valid(endpoint: &Endpoint) -> bool {
    match endpoint {
        Endpoint::Node(_) => true,
        Endpoint::Term(s) => valid_term(s),
    }
}

#[derive(Debug, Clone)]
pub struct DomainFusionOutcome {
    pub alias_map: AliasMap,
    pub report: FusionReport,
}

/// Imports extraction batches into a graph.
pub struct DomainFusion<O: SynonymOracle> {
    oracle: O,
}

impl<O: SynonymOracle> DomainFusion<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle }
    }

    pub fn fuse(&self, graph: &mut PropertyGraph, batch: ExtractionBatch) -> DomainFusionOutcome {
        let mut report = FusionReport::new("domain");
        let nodes_before = graph.node_count();

        let terms: BTreeSet<String> = batch.terms.into_iter().filter(|t| valid_term(t)).collect();
        let alias_map = cluster_terms(&self.oracle, &terms);
        tracing::info!(terms = terms.len(), synsets = alias_map.len(), "clustered terms");

        let retargeter = RelationRetargeter::new(&alias_map);
        let relations: Vec<RawTriple> = retargeter
            .retarget(batch.relations)
            .into_iter()
            .filter(|r| endpoint_valid(r.start()) && endpoint_valid(r.end()))
            .collect();
        let linkages: Vec<RawTriple> = retargeter
            .retarget(batch.linkages)
            .into_iter()
            .filter(|r| endpoint_valid(r.start()) || endpoint_valid(r.end()))
            .collect();

        for name in [TERM_NAME, OPERATION_NAME, ALIAS] {
            graph.create_index_on_property(name);
        }

        let mut canonicalizer = TermCanonicalizer::from_graph(graph);

        for key in creation_order(&alias_map) {
            let aliases = alias_map.get(&key).cloned().unwrap_or_default();
            if let Err(e) = canonicalizer.canonicalize(graph, Namespace::Term, &key, &aliases) {
                report.fail(key, e);
            }
        }
        let operations: BTreeSet<String> = batch.operations.into_iter().collect();
        for op in operations {
            if let Err(e) = canonicalizer.canonicalize(graph, Namespace::Operation, &op, &[]) {
                report.fail(op, e);
            }
        }

        for triple in relations
            .iter()
            .chain(linkages.iter())
            .chain(batch.operation_links.iter())
        {
            match add_triple(graph, &mut canonicalizer, triple) {
                Ok(added) => report.relation_added(added),
                Err(e) => report.fail(triple.to_string(), e),
            }
        }

        for (s, e) in derive_is_a(graph) {
            match graph.add_relation(s, REL_IS_A, e) {
                Ok(added) => report.relation_added(added),
                Err(err) => report.fail(format!("({s} -[{REL_IS_A}]-> {e})"), err),
            }
        }

        let linked = link_operations_to_concepts(graph);
        report.relations_added += linked;

        graph.refresh_indexer();
        report.nodes_created = graph.node_count().saturating_sub(nodes_before);
        report.finish();
        DomainFusionOutcome { alias_map, report }
    }
}

fn resolve_endpoint(
    graph: &mut PropertyGraph,
    canonicalizer: &mut TermCanonicalizer,
    ns: Namespace,
    endpoint: &Endpoint,
) -> Result<NodeId> {
    match endpoint {
        Endpoint::Node(id) => {
            if graph.contains_node(*id) {
                Ok(*id)
            } else {
                Err(FusionError::Graph(kgfuse_graph::GraphError::UnknownNode(*id)))
            }
        }
        Endpoint::Term(raw) => canonicalizer.resolve(graph, ns, raw),
    }
}

/// Add one triple, resolving term endpoints through the namespace its
/// relation type dictates. Nothing is written if either side fails.
fn add_triple(
    graph: &mut PropertyGraph,
    canonicalizer: &mut TermCanonicalizer,
    triple: &RawTriple,
) -> Result<bool> {
    let start = resolve_endpoint(graph, canonicalizer, Namespace::Term, triple.start())?;
    let end_ns = Namespace::end_of(triple.rel_type());
    let end = resolve_endpoint(graph, canonicalizer, end_ns, triple.end())?;
    Ok(graph.add_relation(start, triple.rel_type(), end)?)
}

/// `a -extends-> b` lifts to `t -is a-> u` for every term `t` that `a`
/// represents and every term `u` that `b` represents.
pub fn derive_is_a(graph: &PropertyGraph) -> BTreeSet<(NodeId, NodeId)> {
    let represented = |code: NodeId| -> Vec<NodeId> {
        graph
            .get_relations(code, REL_REPRESENT)
            .into_iter()
            .map(|r| r.end)
            .collect()
    };
    let mut out = BTreeSet::new();
    for ext in graph.get_relations_by_type(REL_EXTENDS) {
        let ends = represented(ext.end);
        for s in represented(ext.start) {
            for &e in &ends {
                if s != e {
                    out.insert((s, e));
                }
            }
        }
    }
    out
}

/// Connect every operation to the domain term with the same display name.
/// Returns the number of relations added.
pub fn link_operations_to_concepts(graph: &mut PropertyGraph) -> usize {
    let pairs: Vec<(NodeId, NodeId)> = graph
        .node_ids_with_label(LABEL_OPERATION)
        .into_iter()
        .filter_map(|op| {
            let name = graph.node(op)?.str_property(OPERATION_NAME).to_string();
            if name.is_empty() {
                return None;
            }
            let term = graph
                .find_nodes_by_property(TERM_NAME, &name)
                .into_iter()
                .find(|id| graph.node(*id).is_some_and(|n| n.has_label(LABEL_DOMAIN_TERM)))?;
            Some((op, term))
        })
        .collect();

    let mut added = 0;
    for (op, term) in pairs {
        for (start, rel_type, end) in [
            (op, REL_CORRESPONDING_CONCEPT, term),
            (term, REL_CORRESPONDING_OPERATION, op),
        ] {
            match graph.add_relation(start, rel_type, end) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(%start, rel_type, %end, error = %e, "cross-link skipped"),
            }
        }
    }
    added
}

/// `term_name -> aliases` for every domain term currently in the graph.
pub fn alias_map_from_graph(graph: &PropertyGraph) -> AliasMap {
    graph
        .node_ids_with_label(LABEL_DOMAIN_TERM)
        .into_iter()
        .filter_map(|id| {
            let node = graph.node(id)?;
            let name = node.str_property(TERM_NAME);
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), node.strings_property(ALIAS)))
        })
        .collect()
}
