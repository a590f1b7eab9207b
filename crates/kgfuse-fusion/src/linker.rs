//! Entity linking: decide which external-fact candidate (if any) a domain
//! term refers to.
//!
//! Each candidate gets two scores in `[0, 1]`:
//!
//! - **context**: candidate text vs. the term's own words and its
//!   neighbouring terms
//! - **topic**: candidate text vs. one vector built from every domain term
//!   in the graph
//!
//! [`decide`] applies the tiered acceptance policy to those scores. Scoring
//! is read-only and runs in parallel; applying decisions is left to
//! [`crate::merge`].

use crate::cache::FactCache;
use crate::config::LinkerConfig;
use crate::embedding::{cosine_score, tokenize, Embedder};
use crate::item::{ClaimValue, Item, PropertyTable};
use crate::lemma::normalize;
use crate::schema::{ALIAS, ALIAS_EN, DESCRIPTION_EN, LABEL_DOMAIN_TERM, LEMMA, TERM_NAME};
use kgfuse_graph::{NodeId, PropertyGraph};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

// ============================================================================
// Decisions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub item_id: String,
    pub context_score: f32,
    pub topic_score: f32,
}

impl CandidateScore {
    pub fn new(item_id: impl Into<String>, context_score: f32, topic_score: f32) -> Self {
        Self {
            item_id: item_id.into(),
            context_score,
            topic_score,
        }
    }
}

/// Which tier of the policy accepted a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptRule {
    Context,
    Topic,
    Filtered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum LinkDecision {
    Accept { item_id: String, rule: AcceptRule },
    /// Nothing passed; `best_item_id` is the top context candidate, kept for audit.
    Reject { best_item_id: String },
}

impl LinkDecision {
    pub fn item_id(&self) -> &str {
        match self {
            LinkDecision::Accept { item_id, .. } => item_id,
            LinkDecision::Reject { best_item_id } => best_item_id,
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, LinkDecision::Accept { .. })
    }
}

fn by_context(a: &CandidateScore, b: &CandidateScore) -> Ordering {
    a.context_score
        .total_cmp(&b.context_score)
        .then(a.topic_score.total_cmp(&b.topic_score))
}

fn by_topic(a: &CandidateScore, b: &CandidateScore) -> Ordering {
    a.topic_score
        .total_cmp(&b.topic_score)
        .then(a.context_score.total_cmp(&b.context_score))
}

/// Maximum under `cmp`; the earliest candidate wins ties.
fn first_max<'a>(
    scores: &'a [CandidateScore],
    cmp: fn(&CandidateScore, &CandidateScore) -> Ordering,
) -> Option<&'a CandidateScore> {
    scores.iter().fold(None, |best, s| match best {
        Some(b) if cmp(s, b) != Ordering::Greater => Some(b),
        _ => Some(s),
    })
}

/// Apply the tiered policy. `None` only for an empty candidate list.
///
/// 1. best-by-context above `acceptable_context_score`
/// 2. best-by-topic above `acceptable_topic_score`
/// 3. first candidate, in descending context order, above both filter scores
/// 4. reject, reporting the best-by-context candidate
pub fn decide(config: &LinkerConfig, scores: &[CandidateScore]) -> Option<LinkDecision> {
    let best_context = first_max(scores, by_context)?;
    if best_context.context_score > config.acceptable_context_score {
        return Some(LinkDecision::Accept {
            item_id: best_context.item_id.clone(),
            rule: AcceptRule::Context,
        });
    }

    if let Some(best_topic) = first_max(scores, by_topic) {
        if best_topic.topic_score > config.acceptable_topic_score {
            return Some(LinkDecision::Accept {
                item_id: best_topic.item_id.clone(),
                rule: AcceptRule::Topic,
            });
        }
    }

    let mut ranked: Vec<&CandidateScore> = scores.iter().collect();
    // stable: equal scores keep input order
    ranked.sort_by(|a, b| by_context(b, a));
    if let Some(hit) = ranked.into_iter().find(|s| {
        s.context_score > config.filter_context_score && s.topic_score > config.filter_topic_score
    }) {
        return Some(LinkDecision::Accept {
            item_id: hit.item_id.clone(),
            rule: AcceptRule::Filtered,
        });
    }

    Some(LinkDecision::Reject {
        best_item_id: best_context.item_id.clone(),
    })
}

// ============================================================================
// Audit records
// ============================================================================

/// One row of the linking audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkingRecord {
    pub domain_id: NodeId,
    pub term_name: String,
    pub item_id: String,
    pub item_name: String,
    pub context_score: f32,
    pub topic_score: f32,
    /// True only once the accepted item was merged into the node.
    pub linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<AcceptRule>,
}

/// Scores and decision for one domain term.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub node: NodeId,
    pub scores: Vec<CandidateScore>,
    pub decision: LinkDecision,
}

impl Evaluation {
    pub fn chosen(&self) -> Option<&CandidateScore> {
        let id = self.decision.item_id();
        self.scores.iter().find(|s| s.item_id == id)
    }
}

// ============================================================================
// Linker
// ============================================================================

pub struct EntityLinker<'a, E: Embedder> {
    embedder: &'a E,
    cache: &'a FactCache,
    table: &'a PropertyTable,
    config: LinkerConfig,
    topic: Option<Vec<f32>>,
}

impl<'a, E: Embedder> EntityLinker<'a, E> {
    /// Build a linker; the topic vector is computed once from `graph`.
    pub fn new(
        embedder: &'a E,
        cache: &'a FactCache,
        table: &'a PropertyTable,
        config: LinkerConfig,
        graph: &PropertyGraph,
    ) -> Self {
        let topic = topic_vector(embedder, graph);
        if topic.is_none() {
            tracing::warn!("no domain-term word has a vector; topic scores will be 0");
        }
        Self {
            embedder,
            cache,
            table,
            config,
            topic,
        }
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    /// Words describing a domain term: its lemma, aliases, linked English
    /// aliases, and the lemmas of neighbouring domain terms.
    pub fn domain_words(&self, graph: &PropertyGraph, id: NodeId) -> Vec<String> {
        let Some(node) = graph.node(id) else {
            return Vec::new();
        };
        let mut text = vec![lemma_of(node)];
        text.extend(node.strings_property(ALIAS));
        text.extend(node.strings_property(ALIAS_EN));

        let neighbours: BTreeSet<NodeId> = graph
            .get_all_out_relations(id)
            .into_iter()
            .map(|r| r.end)
            .chain(graph.get_all_in_relations(id).into_iter().map(|r| r.start))
            .filter(|n| *n != id)
            .collect();
        for n in neighbours {
            if let Some(neighbour) = graph.node(n).filter(|n| n.has_label(LABEL_DOMAIN_TERM)) {
                text.push(lemma_of(neighbour));
            }
        }
        text.iter().flat_map(|t| tokenize(t)).collect()
    }

    /// Words describing a candidate: name, aliases, description and its
    /// outbound relation text, minus every word in `strip`.
    pub fn candidate_words(&self, item: &Item, strip: &BTreeSet<String>) -> Vec<String> {
        let mut text = vec![item.name.clone(), item.description.clone()];
        text.extend(item.aliases.iter().cloned());

        for (pid, values) in &item.claims {
            let relation = self.table.name(pid);
            for value in values {
                match value {
                    ClaimValue::Item(target) => {
                        let Some(relation) = relation else {
                            continue;
                        };
                        text.push(relation.to_string());
                        if let Some(neighbour) = self.cache.item(target) {
                            text.push(neighbour.name);
                            text.push(neighbour.description);
                        }
                    }
                    ClaimValue::Literal(literal) => {
                        if let Some(relation) = relation {
                            text.push(relation.to_string());
                        }
                        text.push(literal.clone());
                    }
                }
            }
        }

        text.iter()
            .flat_map(|t| tokenize(t))
            .filter(|w| !strip.contains(w))
            .collect()
    }

    /// Score every candidate for one domain term.
    pub fn score(&self, graph: &PropertyGraph, id: NodeId, candidates: &[Item]) -> Vec<CandidateScore> {
        let domain = self.domain_words(graph, id);
        let context = self.embedder.average(&domain);
        let own: BTreeSet<String> = graph
            .node(id)
            .map(|n| tokenize(&lemma_of(n)).into_iter().collect())
            .unwrap_or_default();

        candidates
            .iter()
            .map(|item| {
                let words = self.candidate_words(item, &own);
                let vector = self.embedder.average(&words);
                CandidateScore::new(
                    item.id.clone(),
                    cosine_score(vector.as_deref(), context.as_deref()),
                    cosine_score(vector.as_deref(), self.topic.as_deref()),
                )
            })
            .collect()
    }

    /// Score and decide. `None` when there is nothing to decide on.
    pub fn evaluate(&self, graph: &PropertyGraph, id: NodeId, candidates: &[Item]) -> Option<Evaluation> {
        if candidates.is_empty() {
            return None;
        }
        let scores = self.score(graph, id, candidates);
        let decision = decide(&self.config, &scores)?;
        tracing::debug!(node = %id, ?decision, "linking decision");
        Some(Evaluation {
            node: id,
            scores,
            decision,
        })
    }

    /// Evaluate many terms in parallel. Output order follows `targets`.
    pub fn evaluate_all(&self, graph: &PropertyGraph, targets: &[(NodeId, Vec<Item>)]) -> Vec<Evaluation> {
        targets
            .par_iter()
            .filter_map(|(id, candidates)| self.evaluate(graph, *id, candidates))
            .collect()
    }
}

fn lemma_of(node: &kgfuse_graph::GraphNode) -> String {
    match node.str_property(LEMMA) {
        "" => normalize(node.str_property(TERM_NAME)),
        lemma => lemma.to_string(),
    }
}

/// Mean vector over every domain term's lemma, aliases, names and
/// descriptions. Independent of node order.
fn topic_vector<E: Embedder>(embedder: &E, graph: &PropertyGraph) -> Option<Vec<f32>> {
    let mut words = Vec::new();
    for id in graph.node_ids_with_label(LABEL_DOMAIN_TERM) {
        let Some(node) = graph.node(id) else {
            continue;
        };
        let mut text = vec![lemma_of(node), node.str_property(TERM_NAME).to_string()];
        text.extend(node.strings_property(ALIAS));
        text.extend(node.strings_property(ALIAS_EN));
        text.extend(node.strings_property(DESCRIPTION_EN));
        words.extend(text.iter().flat_map(|t| tokenize(t)));
    }
    embedder.average(&words)
}
