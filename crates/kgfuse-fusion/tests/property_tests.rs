//! Property-based tests for the fusion engine
//!
//! 1. Same lemma -> same node, every surface form kept as an alias
//! 2. A dominated candidate is never accepted over its dominator
//! 3. Reconciliation only collides ids through a merge rule
//! 4. No relation crosses an unmapped endpoint

use kgfuse_fusion::canonicalizer::TermCanonicalizer;
use kgfuse_fusion::lemma::normalize;
use kgfuse_fusion::linker::{decide, CandidateScore, LinkDecision};
use kgfuse_fusion::reconcile::{reconcile, NodeKind};
use kgfuse_fusion::schema::{
    Namespace, ALIAS, QUALIFIED_NAME, SHORT_DESCRIPTION, TERM_NAME, WD_ITEM_ID,
};
use kgfuse_fusion::LinkerConfig;
use kgfuse_graph::{props, GraphNode, NodeId, PropertyGraph, Relation};
use proptest::prelude::*;
use std::collections::BTreeSet;

// ============================================================================
// Strategies
// ============================================================================

fn words_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{3,8}", 1..=3)
}

/// Surface forms that all normalize to the same lemma.
fn surface_forms(words: &[String]) -> Vec<String> {
    let capitalize = |w: &String| {
        let mut c = w.chars();
        match c.next() {
            Some(first) => first.to_uppercase().chain(c).collect::<String>(),
            None => String::new(),
        }
    };
    let camel: String = words
        .iter()
        .enumerate()
        .map(|(i, w)| if i == 0 { w.clone() } else { capitalize(w) })
        .collect();
    vec![
        words.join(" "),
        words.join("-"),
        words.iter().map(capitalize).collect::<Vec<_>>().join(" "),
        words.iter().map(capitalize).collect::<String>(),
        camel,
        format!("  {}  ", words.join("   ")),
    ]
}

fn score_strategy() -> impl Strategy<Value = (f32, f32)> {
    (0.0f32..=1.0, 0.0f32..=1.0)
}

#[derive(Debug, Clone)]
enum ExtraNode {
    Term(usize),
    Class(usize),
    Param(usize, usize),
    Fact(usize),
    Unknown(usize),
}

fn extra_node_strategy() -> impl Strategy<Value = ExtraNode> {
    prop_oneof![
        (0usize..6).prop_map(ExtraNode::Term),
        (0usize..4).prop_map(ExtraNode::Class),
        (0usize..3, 0usize..2).prop_map(|(q, d)| ExtraNode::Param(q, d)),
        (0usize..4).prop_map(ExtraNode::Fact),
        (0usize..3).prop_map(ExtraNode::Unknown),
    ]
}

const TERMS: &[&str] = &["thread pool", "ThreadPool", "thread-pool", "mutex", "Mutex Lock", "array list"];

fn build_node(graph: &mut PropertyGraph, node: &ExtraNode) -> NodeId {
    let result = match node {
        ExtraNode::Term(i) => graph.add_node(
            ["domain term"],
            props([(TERM_NAME, TERMS[*i])]),
            TERM_NAME,
        ),
        ExtraNode::Class(i) => graph.add_node(
            ["class"],
            props([(QUALIFIED_NAME, format!("java.util.C{i}"))]),
            QUALIFIED_NAME,
        ),
        ExtraNode::Param(q, d) => graph.merge_node_with_multi_primary_property(
            ["parameter"],
            props([
                (QUALIFIED_NAME, format!("java.util.C0.m(int p{q})")),
                (SHORT_DESCRIPTION, format!("description {d}")),
            ]),
            &[QUALIFIED_NAME, SHORT_DESCRIPTION],
        ),
        ExtraNode::Fact(i) => graph.add_node(
            ["wikidata"],
            props([(WD_ITEM_ID, format!("Q{i}"))]),
            WD_ITEM_ID,
        ),
        ExtraNode::Unknown(i) => graph.add_node(["sentence"], props([("text", format!("s{i}"))]), "text"),
    };
    result.expect("fixture node")
}

/// The key a merge rule may collapse nodes on.
fn merge_key(node: &GraphNode) -> Option<(NodeKind, String)> {
    let kind = NodeKind::classify(node)?;
    let key = match kind {
        NodeKind::DomainTerm => normalize(node.str_property(TERM_NAME)),
        NodeKind::Operation => normalize(node.str_property("operation_name")),
        NodeKind::ExternalFact => node.str_property(WD_ITEM_ID).to_string(),
        NodeKind::QualifiedNameEntity => node.str_property(QUALIFIED_NAME).to_string(),
        NodeKind::DescriptionQualifiedEntity => format!(
            "{}|{}",
            node.str_property(QUALIFIED_NAME),
            node.str_property(SHORT_DESCRIPTION)
        ),
    };
    Some((kind, key))
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn same_lemma_same_node(words in words_strategy()) {
        let forms = surface_forms(&words);
        let mut graph = PropertyGraph::new();
        let mut canonicalizer = TermCanonicalizer::new();

        let ids: BTreeSet<NodeId> = forms
            .iter()
            .map(|f| canonicalizer.canonicalize(&mut graph, Namespace::Term, f, &[]).unwrap())
            .collect();
        prop_assert_eq!(ids.len(), 1);

        let id = *ids.iter().next().unwrap();
        let aliases = graph.node(id).unwrap().strings_property(ALIAS);
        for form in &forms {
            prop_assert!(aliases.contains(form), "{:?} missing from {:?}", form, aliases);
        }
        let name = graph.node(id).unwrap().str_property(TERM_NAME).to_string();
        let shortest = aliases.iter().map(|a| a.chars().count()).min().unwrap();
        prop_assert_eq!(name.chars().count(), shortest);
    }

    #[test]
    fn dominated_candidate_never_wins(
        others in prop::collection::vec(score_strategy(), 0..5),
        a in score_strategy(),
        drop in 0.01f32..0.5,
        which in 0u8..3,
        position in 0usize..6,
    ) {
        let (dc, dt) = match which {
            0 => (drop, 0.0),
            1 => (0.0, drop),
            _ => (drop, drop),
        };
        let b = (a.0 - dc, a.1 - dt);

        let mut scores: Vec<CandidateScore> = others
            .iter()
            .enumerate()
            .map(|(i, (c, t))| CandidateScore::new(format!("C{i}"), *c, *t))
            .collect();
        let at = position.min(scores.len());
        scores.insert(at, CandidateScore::new("B", b.0, b.1));
        let at = (position / 2).min(scores.len());
        scores.insert(at, CandidateScore::new("A", a.0, a.1));

        let decision = decide(&LinkerConfig::default(), &scores).unwrap();
        if let LinkDecision::Accept { item_id, .. } = &decision {
            prop_assert_ne!(item_id.as_str(), "B");
        }
    }

    #[test]
    fn reconcile_collides_only_through_merge_rules(
        base_nodes in prop::collection::vec(extra_node_strategy(), 0..8),
        extra_nodes in prop::collection::vec(extra_node_strategy(), 1..12),
        edges in prop::collection::vec((0usize..12, 0usize..12), 0..16),
    ) {
        let mut base = PropertyGraph::new();
        for n in &base_nodes {
            build_node(&mut base, n);
        }
        let base_relations: BTreeSet<Relation> = base.relations().cloned().collect();

        let mut extra = PropertyGraph::new();
        let ids: Vec<NodeId> = extra_nodes.iter().map(|n| build_node(&mut extra, n)).collect();
        for (s, e) in &edges {
            if let (Some(&s), Some(&e)) = (ids.get(*s), ids.get(*e)) {
                extra.add_relation(s, "related to", e).unwrap();
            }
        }

        let out = reconcile(base, &extra);

        // injectivity up to documented merge keys
        let mapped: Vec<(&NodeId, &NodeId)> = out.id_map.iter().collect();
        for (i, (a, ma)) in mapped.iter().enumerate() {
            for (b, mb) in &mapped[i + 1..] {
                if ma == mb {
                    let ka = merge_key(extra.node(**a).unwrap());
                    let kb = merge_key(extra.node(**b).unwrap());
                    prop_assert!(ka.is_some() && ka == kb, "{} and {} collided: {:?} vs {:?}", a, b, ka, kb);
                }
            }
        }

        // unknown nodes never map
        for node in extra.nodes() {
            if node.has_label("sentence") {
                prop_assert!(!out.id_map.contains_key(&node.id));
            }
        }

        // every merged relation comes from the base or from a fully mapped extra relation
        let transferred: BTreeSet<Relation> = extra
            .relations()
            .filter_map(|r| {
                let s = out.id_map.get(&r.start)?;
                let e = out.id_map.get(&r.end)?;
                Some(Relation::new(*s, r.rel_type.clone(), *e))
            })
            .collect();
        for rel in out.graph.relations() {
            prop_assert!(
                base_relations.contains(rel) || transferred.contains(rel),
                "unexpected relation {}", rel
            );
        }
        let skipped = extra
            .relations()
            .filter(|r| !out.id_map.contains_key(&r.start) || !out.id_map.contains_key(&r.end))
            .count();
        prop_assert_eq!(out.report.relations_skipped, skipped);
    }
}
