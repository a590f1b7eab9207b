//! The link pass: score every unlinked domain term against its cached
//! candidates, apply accepted links, then connect and prune external-fact
//! nodes.
//!
//! ```text
//! domain terms ──cache.candidates(lemma)──► targets
//!                                              │ (rayon, read-only)
//!                                         evaluations
//!                                              │ (serial)
//!            merge accepted ─► neighbour nodes ─► cross references ─► prune
//! ```

use crate::cache::FactCache;
use crate::cleanup::prune_isolated_except;
use crate::config::FusionConfig;
use crate::embedding::Embedder;
use crate::item::{Item, PropertyTable};
use crate::lemma::normalize;
use crate::linker::{EntityLinker, Evaluation, LinkDecision, LinkingRecord};
use crate::merge::MergeApplier;
use crate::report::FusionReport;
use crate::schema::{LABEL_DOMAIN_TERM, LABEL_WIKIDATA, LEMMA, TERM_NAME};
use kgfuse_graph::{NodeId, PropertyGraph};

#[derive(Debug, Clone)]
pub struct LinkOutcome {
    pub records: Vec<LinkingRecord>,
    pub report: FusionReport,
}

impl LinkOutcome {
    pub fn linked(&self) -> usize {
        self.records.iter().filter(|r| r.linked).count()
    }
}

pub struct LinkPass<'a, E: Embedder> {
    embedder: &'a E,
    cache: &'a FactCache,
    table: &'a PropertyTable,
    config: FusionConfig,
}

impl<'a, E: Embedder> LinkPass<'a, E> {
    pub fn new(
        embedder: &'a E,
        cache: &'a FactCache,
        table: &'a PropertyTable,
        config: FusionConfig,
    ) -> Self {
        Self {
            embedder,
            cache,
            table,
            config,
        }
    }

    /// Unlinked domain terms that have at least one candidate.
    fn targets(&self, graph: &PropertyGraph) -> Vec<(NodeId, Vec<Item>)> {
        graph
            .node_ids_with_label(LABEL_DOMAIN_TERM)
            .into_iter()
            .filter_map(|id| {
                let node = graph.node(id)?;
                if node.has_label(LABEL_WIKIDATA) {
                    return None;
                }
                let lemma = match node.str_property(LEMMA) {
                    "" => normalize(node.str_property(TERM_NAME)),
                    lemma => lemma.to_string(),
                };
                let candidates = self.cache.candidates(&lemma);
                (!candidates.is_empty()).then_some((id, candidates))
            })
            .collect()
    }

    pub fn run(&self, graph: &mut PropertyGraph) -> LinkOutcome {
        let mut report = FusionReport::new("link");

        let targets = self.targets(graph);
        tracing::info!(targets = targets.len(), "linking domain terms");

        let evaluations: Vec<Evaluation> = {
            let linker = EntityLinker::new(
                self.embedder,
                self.cache,
                self.table,
                self.config.linker.clone(),
                graph,
            );
            linker.evaluate_all(graph, &targets)
        };

        let applier = MergeApplier::new(self.config.merge.clone(), self.table);
        let mut records = Vec::with_capacity(evaluations.len());
        let mut accepted: Vec<Item> = Vec::new();

        for eval in evaluations {
            let Some(chosen) = eval.chosen().cloned() else {
                continue;
            };
            let item = self.cache.item(&chosen.item_id);
            let term_name = graph
                .node(eval.node)
                .map(|n| n.str_property(TERM_NAME).to_string())
                .unwrap_or_default();

            let (linked, rule) = match (&eval.decision, &item) {
                (LinkDecision::Accept { rule, .. }, Some(item)) => {
                    match applier.accept(graph, eval.node, item) {
                        Ok(changed) => {
                            if changed {
                                report.nodes_updated += 1;
                            }
                            accepted.push(item.clone());
                            (true, Some(*rule))
                        }
                        Err(e) => {
                            report.fail(format!("{term_name} -> {}", chosen.item_id), e);
                            (false, Some(*rule))
                        }
                    }
                }
                (LinkDecision::Accept { rule, .. }, None) => {
                    report.fail(
                        format!("{term_name} -> {}", chosen.item_id),
                        "accepted item is no longer cached",
                    );
                    (false, Some(*rule))
                }
                (LinkDecision::Reject { .. }, _) => (false, None),
            };

            records.push(LinkingRecord {
                domain_id: eval.node,
                term_name,
                item_id: chosen.item_id.clone(),
                item_name: item.map(|i| i.name).unwrap_or_default(),
                context_score: chosen.context_score,
                topic_score: chosen.topic_score,
                linked,
                rule,
            });
        }

        if self.config.merge.neighbour_nodes {
            match applier.add_neighbour_nodes(graph, self.cache, &accepted) {
                Ok(created) => {
                    tracing::info!(created, "neighbour nodes inserted");
                    report.nodes_created += created;
                }
                Err(e) => report.fail("neighbour nodes", e),
            }
        }
        report.relations_added += applier.cross_reference_pass(graph, self.cache);

        let pruned = prune_isolated_except(graph, LABEL_WIKIDATA, LABEL_DOMAIN_TERM);
        report.nodes_removed += pruned;
        graph.refresh_indexer();

        report.finish();
        tracing::info!(
            evaluated = records.len(),
            linked = records.iter().filter(|r| r.linked).count(),
            "link pass finished"
        );
        LinkOutcome { records, report }
    }
}
