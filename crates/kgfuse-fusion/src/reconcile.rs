//! Cross-graph reconciliation: fold an independently built graph into a
//! base graph.
//!
//! Every extra-graph node is classified into a [`NodeKind`] and resolved by
//! that kind's rule to an id in the merged graph. Relations are then copied
//! over through the resulting [`IdMap`]; a relation with an unmapped
//! endpoint is dropped, never half-added.

use crate::canonicalizer::{union_aliases, TermCanonicalizer};
use crate::error::{FusionError, Result};
use crate::lemma::normalize;
use crate::report::FusionReport;
use crate::schema::{
    Namespace, ALIAS, DESCRIPTION_QUALIFIED_LABELS, LABEL_DOMAIN_TERM, LABEL_OPERATION,
    LABEL_WIKIDATA, LEMMA, QUALIFIED_NAME, QUALIFIED_NAME_LABELS, SHORT_DESCRIPTION, WD_ITEM_ID,
};
use kgfuse_graph::{absorb_properties, GraphNode, NodeId, PropertyGraph, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which reconciliation rule handles a node. Variants are in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    DomainTerm,
    Operation,
    ExternalFact,
    QualifiedNameEntity,
    DescriptionQualifiedEntity,
}

impl NodeKind {
    /// First matching kind by label, or `None`.
    pub fn classify(node: &GraphNode) -> Option<NodeKind> {
        let any = |labels: &[&str]| labels.iter().any(|l| node.has_label(l));
        if node.has_label(LABEL_DOMAIN_TERM) {
            Some(NodeKind::DomainTerm)
        } else if node.has_label(LABEL_OPERATION) {
            Some(NodeKind::Operation)
        } else if node.has_label(LABEL_WIKIDATA) {
            Some(NodeKind::ExternalFact)
        } else if any(QUALIFIED_NAME_LABELS) {
            Some(NodeKind::QualifiedNameEntity)
        } else if any(DESCRIPTION_QUALIFIED_LABELS) {
            Some(NodeKind::DescriptionQualifiedEntity)
        } else {
            None
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::DomainTerm => "domain term",
            NodeKind::Operation => "operation",
            NodeKind::ExternalFact => "external fact",
            NodeKind::QualifiedNameEntity => "qualified-name entity",
            NodeKind::DescriptionQualifiedEntity => "description-qualified entity",
        };
        f.write_str(name)
    }
}

/// extra-graph id -> merged-graph id
pub type IdMap = BTreeMap<NodeId, NodeId>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub summary: FusionReport,
    /// Nodes per kind that were mapped.
    pub mapped: BTreeMap<NodeKind, usize>,
    /// Nodes mapped onto a node that already existed.
    pub deduplicated: usize,
    pub relations_skipped: usize,
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary)?;
        for (kind, n) in &self.mapped {
            writeln!(f, "  {kind}: {n} mapped")?;
        }
        write!(
            f,
            "  {} deduplicated, {} relations skipped",
            self.deduplicated, self.relations_skipped
        )
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub graph: PropertyGraph,
    pub id_map: IdMap,
    pub report: ReconcileReport,
}

/// Folds extra graphs into a base graph.
pub struct CrossGraphReconciler {
    graph: PropertyGraph,
    canonicalizer: TermCanonicalizer,
}

impl CrossGraphReconciler {
    pub fn new(base: PropertyGraph) -> Self {
        let canonicalizer = TermCanonicalizer::from_graph(&base);
        Self {
            graph: base,
            canonicalizer,
        }
    }

    /// Merge `extra` into the base graph.
    pub fn reconcile(mut self, extra: &PropertyGraph) -> ReconcileOutcome {
        let mut report = ReconcileReport {
            summary: FusionReport::new("reconcile"),
            mapped: BTreeMap::new(),
            deduplicated: 0,
            relations_skipped: 0,
        };
        let nodes_before = self.graph.node_count();
        let mut id_map = IdMap::new();

        for node in extra.nodes() {
            let Some(kind) = NodeKind::classify(node) else {
                let payload = serde_json::to_string(node).unwrap_or_else(|_| format!("{node:?}"));
                report
                    .summary
                    .fail(node.id.to_string(), FusionError::NoMatchingRule(payload));
                continue;
            };
            let existed_before = self.graph.node_count();
            match self.resolve(kind, node) {
                Ok(mapped) => {
                    if self.graph.node_count() == existed_before {
                        report.deduplicated += 1;
                    }
                    tracing::debug!(extra = %node.id, merged = %mapped, %kind, "node mapped");
                    *report.mapped.entry(kind).or_default() += 1;
                    id_map.insert(node.id, mapped);
                }
                Err(e) => report.summary.fail(format!("{kind} {}", node.id), e),
            }
        }

        for rel in extra.relations() {
            let (Some(&start), Some(&end)) = (id_map.get(&rel.start), id_map.get(&rel.end)) else {
                tracing::warn!(relation = %rel, "relation endpoint not mapped, skipped");
                report.relations_skipped += 1;
                continue;
            };
            match self.graph.add_relation(start, &rel.rel_type, end) {
                Ok(added) => report.summary.relation_added(added),
                Err(e) => report.summary.fail(rel.to_string(), e),
            }
        }

        self.graph.refresh_indexer();
        report.summary.nodes_created = self.graph.node_count().saturating_sub(nodes_before);
        report.summary.nodes_updated = report.deduplicated;
        report.summary.finish();
        ReconcileOutcome {
            graph: self.graph,
            id_map,
            report,
        }
    }

    fn resolve(&mut self, kind: NodeKind, node: &GraphNode) -> Result<NodeId> {
        let entity = || node.id.to_string();
        match kind {
            NodeKind::DomainTerm => self.resolve_term(Namespace::Term, node),
            NodeKind::Operation => self.resolve_term(Namespace::Operation, node),
            NodeKind::ExternalFact => self
                .graph
                .add_node(node.labels.iter().cloned(), node.properties.clone(), WD_ITEM_ID)
                .map_err(|e| FusionError::unassigned(entity(), e)),
            NodeKind::QualifiedNameEntity => self
                .graph
                .merge_node(node.labels.iter().cloned(), node.properties.clone(), QUALIFIED_NAME)
                .map_err(|e| FusionError::unassigned(entity(), e)),
            NodeKind::DescriptionQualifiedEntity => self
                .graph
                .merge_node_with_multi_primary_property(
                    node.labels.iter().cloned(),
                    node.properties.clone(),
                    &[QUALIFIED_NAME, SHORT_DESCRIPTION],
                )
                .map_err(|e| FusionError::unassigned(entity(), e)),
        }
    }

    /// Lemma hit: fold aliases and missing properties into the base node.
    /// Miss: insert, and remember the lemma for later extra nodes.
    fn resolve_term(&mut self, ns: Namespace, node: &GraphNode) -> Result<NodeId> {
        let primary = ns.primary_property();
        let name = node.str_property(primary);
        let lemma = match node.str_property(LEMMA) {
            "" => normalize(name),
            lemma => lemma.to_string(),
        };
        if lemma.is_empty() {
            return Err(FusionError::InvalidTerm(name.to_string()));
        }

        if let Some(id) = self.canonicalizer.lookup_lemma(ns, &lemma) {
            if self.graph.contains_node(id) {
                let mut properties = node.properties.clone();
                properties.remove(primary);
                properties.remove(ALIAS);
                let labels: BTreeSet<String> = node.labels.clone();
                self.graph.update_node(id, |base| {
                    base.labels.extend(labels);
                    absorb_properties(&mut base.properties, properties);
                })?;
                let mut aliases = node.strings_property(ALIAS);
                if !name.is_empty() {
                    aliases.push(name.to_string());
                }
                union_aliases(&mut self.graph, ns, id, aliases)?;
                return Ok(id);
            }
        }

        let mut properties = node.properties.clone();
        properties
            .entry(LEMMA.to_string())
            .or_insert_with(|| PropertyValue::str(lemma.clone()));
        let id = self
            .graph
            .add_node(node.labels.iter().cloned(), properties, primary)
            .map_err(|e| FusionError::unassigned(node.id.to_string(), e))?;
        self.canonicalizer.register(ns, lemma, id);
        Ok(id)
    }
}

/// Convenience wrapper around [`CrossGraphReconciler`].
pub fn reconcile(base: PropertyGraph, extra: &PropertyGraph) -> ReconcileOutcome {
    CrossGraphReconciler::new(base).reconcile(extra)
}
