use approx::assert_relative_eq;
use kgfuse_fusion::linker::decide;
use kgfuse_fusion::schema::{LABEL_WIKIDATA, TERM_NAME, WD_ITEM_ID};
use kgfuse_fusion::{
    AcceptRule, CandidateScore, ClaimValue, DomainFusion, EntityLinker, ExtractionBatch,
    FactCache, FusionConfig, Item, LemmaSynonymOracle, LinkDecision, LinkPass, LinkerConfig,
    PropertyTable, RawTriple, TitleHit, WordVectors,
};
use kgfuse_fusion::retarget::Endpoint;
use kgfuse_graph::{props, NodeId, PropertyGraph};

fn vectors() -> WordVectors {
    let mut v = WordVectors::new(3);
    for (word, vec) in [
        ("thread", [1.0, 0.0, 0.0]),
        ("process", [0.9, 0.0, 0.1]),
        ("execution", [0.9, 0.0, 0.1]),
        ("unit", [1.0, 0.1, 0.0]),
        ("program", [0.9, 0.1, 0.0]),
        ("component", [0.8, 0.1, 0.1]),
        ("computer", [0.9, 0.0, 0.0]),
        ("film", [0.0, 1.0, 0.0]),
        ("movie", [0.0, 0.9, 0.1]),
    ] {
        v.insert(word, vec.to_vec()).unwrap();
    }
    v
}

fn hit(id: &str, snippet: &str) -> TitleHit {
    TitleHit {
        id: id.into(),
        title: id.into(),
        snippet: snippet.into(),
    }
}

/// `thread -part of-> process`, both valid domain terms.
fn domain_graph() -> PropertyGraph {
    let mut graph = PropertyGraph::new();
    let batch = ExtractionBatch {
        terms: vec!["thread".into(), "process".into()],
        relations: vec![RawTriple::new(
            Endpoint::term("thread"),
            "part of",
            Endpoint::term("process"),
        )],
        ..Default::default()
    };
    let outcome = DomainFusion::new(LemmaSynonymOracle::new()).fuse(&mut graph, batch);
    assert!(outcome.report.failures.is_empty());
    graph
}

fn fact_cache() -> FactCache {
    let cache = FactCache::new();
    cache.insert_titles(
        "thread",
        vec![
            hit("Q1", "unit of execution"),
            hit("Q2", "2016 film"),
            hit("Q3", "Wikimedia disambiguation page"),
        ],
    );
    cache.insert_titles("process", vec![hit("Q4", "program in execution")]);

    cache.insert_item(
        Item::new("Q1", "thread", "unit of execution")
            .with_alias("thread of execution")
            .with_claim("P361", ClaimValue::Item("Q4".into()))
            .with_claim("P279", ClaimValue::Item("Q5".into()))
            .with_claim("P9999", ClaimValue::Item("Q6".into())),
    );
    cache.insert_item(
        Item::new("Q2", "Thread", "2016 film").with_claim("P31", ClaimValue::Item("Q11424".into())),
    );
    cache.insert_item(Item::new("Q3", "Thread", "Wikimedia disambiguation page"));
    cache.insert_item(Item::new("Q4", "process", "program in execution"));
    cache.insert_item(Item::new("Q5", "computer program component", "part of a program"));
    cache.insert_item(Item::new("Q6", "unnamed relation target", ""));
    cache
}

fn node_by_name(graph: &PropertyGraph, name: &str) -> NodeId {
    graph.find_one_node_by_property(TERM_NAME, name).unwrap().id
}

// ============================================================================
// Decision policy
// ============================================================================

#[test]
fn high_context_candidate_wins_before_topic_is_considered() {
    let scores = [
        CandidateScore::new("Q_context", 0.90, 0.10),
        CandidateScore::new("Q_topic", 0.70, 0.97),
    ];
    assert_eq!(
        decide(&LinkerConfig::default(), &scores),
        Some(LinkDecision::Accept {
            item_id: "Q_context".into(),
            rule: AcceptRule::Context
        })
    );
}

#[test]
fn uniform_low_scores_reject_with_deterministic_best() {
    let scores = [
        CandidateScore::new("Q10", 0.5, 0.5),
        CandidateScore::new("Q11", 0.5, 0.5),
        CandidateScore::new("Q12", 0.5, 0.5),
    ];
    let first = decide(&LinkerConfig::default(), &scores).unwrap();
    assert_eq!(
        first,
        LinkDecision::Reject {
            best_item_id: "Q10".into()
        }
    );
    assert_eq!(decide(&LinkerConfig::default(), &scores).unwrap(), first);
}

#[test]
fn thresholds_follow_config() {
    let strict = LinkerConfig {
        acceptable_context_score: 0.99,
        acceptable_topic_score: 0.99,
        filter_context_score: 0.99,
        filter_topic_score: 0.99,
    };
    let scores = [CandidateScore::new("Q1", 0.9, 0.96)];
    assert!(decide(&LinkerConfig::default(), &scores).unwrap().is_accept());
    assert!(!decide(&strict, &scores).unwrap().is_accept());
}

// ============================================================================
// Scoring
// ============================================================================

#[test]
fn on_topic_candidate_outscores_film() {
    let graph = domain_graph();
    let cache = fact_cache();
    let table = PropertyTable::default();
    let vectors = vectors();
    let linker = EntityLinker::new(&vectors, &cache, &table, LinkerConfig::default(), &graph);

    let thread = node_by_name(&graph, "thread");
    let candidates = vec![
        cache.item("Q1").unwrap(),
        // scored directly, bypassing validity filtering
        cache.item("Q2").unwrap(),
    ];
    let scores = linker.score(&graph, thread, &candidates);
    assert_eq!(scores.len(), 2);
    assert!(scores[0].context_score > 0.9, "{scores:?}");
    assert!(scores[0].context_score > scores[1].context_score);
    assert!(scores[0].topic_score > scores[1].topic_score);
    for s in &scores {
        assert!((0.0..=1.0).contains(&s.context_score));
        assert!((0.0..=1.0).contains(&s.topic_score));
    }

    let eval = linker.evaluate(&graph, thread, &candidates).unwrap();
    assert_eq!(eval.decision.item_id(), "Q1");
    assert!(linker.evaluate(&graph, thread, &[]).is_none());
}

#[test]
fn own_words_are_stripped_from_candidate_side() {
    let graph = domain_graph();
    let cache = FactCache::new();
    let table = PropertyTable::default();
    let vectors = vectors();
    let linker = EntityLinker::new(&vectors, &cache, &table, LinkerConfig::default(), &graph);

    // only the term's own word: nothing left to embed
    let bare = Item::new("Q9", "Thread", "");
    let scores = linker.score(&graph, node_by_name(&graph, "thread"), &[bare]);
    assert_relative_eq!(scores[0].context_score, 0.0);
    assert_relative_eq!(scores[0].topic_score, 0.0);
}

// ============================================================================
// Link pass
// ============================================================================

#[test]
fn link_pass_links_connects_and_prunes() {
    let mut graph = domain_graph();
    let cache = fact_cache();
    let table = PropertyTable::default();
    let vectors = vectors();
    let pass = LinkPass::new(&vectors, &cache, &table, FusionConfig::default());

    let outcome = pass.run(&mut graph);
    assert!(outcome.report.failures.is_empty(), "{:?}", outcome.report.failures);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.linked(), 2);

    let thread = node_by_name(&graph, "thread");
    let process = node_by_name(&graph, "process");
    let thread_node = graph.node(thread).unwrap();
    assert!(thread_node.has_label(LABEL_WIKIDATA));
    assert_eq!(thread_node.str_property(WD_ITEM_ID), "Q1");
    assert_eq!(graph.node(process).unwrap().str_property(WD_ITEM_ID), "Q4");

    // Q1 -part of-> Q4 becomes a relation between the linked terms
    assert!(graph.has_relation(thread, "part of", process));

    // Q5 is a connected neighbour; Q6 only hangs off an unnamed property
    let q5 = graph.find_one_node_by_property(WD_ITEM_ID, "Q5").unwrap().id;
    assert!(graph.has_relation(thread, "subclass of", q5));
    assert!(graph.find_one_node_by_property(WD_ITEM_ID, "Q6").is_none());

    let record = outcome.records.iter().find(|r| r.domain_id == thread).unwrap();
    assert_eq!(record.item_id, "Q1");
    assert_eq!(record.item_name, "thread");
}

#[test]
fn link_pass_reports_created_and_pruned_nodes_separately() {
    let mut graph = domain_graph();
    // a stale, isolated external-fact node from an earlier run
    graph
        .add_node([LABEL_WIKIDATA], props([(WD_ITEM_ID, "Q99")]), WD_ITEM_ID)
        .unwrap();
    let cache = fact_cache();
    let table = PropertyTable::default();
    let vectors = vectors();

    let outcome = LinkPass::new(&vectors, &cache, &table, FusionConfig::default()).run(&mut graph);
    // Q5 and Q6 are inserted; Q6 and the stale Q99 are pruned
    assert_eq!(outcome.report.nodes_created, 2);
    assert_eq!(outcome.report.nodes_removed, 2);
    assert_eq!(graph.node_count(), 3);
    assert!(graph.find_one_node_by_property(WD_ITEM_ID, "Q99").is_none());
}

#[test]
fn link_pass_is_idempotent() {
    let mut graph = domain_graph();
    let cache = fact_cache();
    let table = PropertyTable::default();
    let vectors = vectors();
    let pass = LinkPass::new(&vectors, &cache, &table, FusionConfig::default());

    pass.run(&mut graph);
    let counts = (graph.node_count(), graph.relation_count());
    let again = pass.run(&mut graph);
    assert_eq!((graph.node_count(), graph.relation_count()), counts);
    // already-linked terms are not re-entered
    assert!(again.records.is_empty());
}

#[test]
fn rejected_terms_are_recorded_but_untouched() {
    let mut graph = domain_graph();
    let cache = fact_cache();
    let table = PropertyTable::default();
    let vectors = vectors();
    let config = FusionConfig {
        linker: LinkerConfig {
            acceptable_context_score: 1.0,
            acceptable_topic_score: 1.0,
            filter_context_score: 1.0,
            filter_topic_score: 1.0,
        },
        ..Default::default()
    };
    let before = (graph.node_count(), graph.relation_count());
    let outcome = LinkPass::new(&vectors, &cache, &table, config).run(&mut graph);

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.linked(), 0);
    assert!(outcome.records.iter().all(|r| r.rule.is_none()));
    assert_eq!((graph.node_count(), graph.relation_count()), before);
    assert!(graph.get_node_ids_by_label(LABEL_WIKIDATA).is_empty());
}
