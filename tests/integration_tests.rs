//! Integration tests for the complete KGFuse pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Extraction batch → Domain fusion → Graph snapshot
//! - Fact source → Retriever → Fact cache → Linker → Merge
//! - Independent graphs → Reconciler
//!
//! Run with: cargo test --test integration_tests

use async_trait::async_trait;
use kgfuse_fusion::lemma::normalize;
use kgfuse_fusion::schema::{ALIAS, LABEL_WIKIDATA, LEMMA, WD_ITEM_ID};
use kgfuse_fusion::{
    reconcile, CandidateRetriever, ClaimValue, DomainFusion, Endpoint, ExtractionBatch,
    FactCache, FactSource, FusionConfig, Item, LemmaSynonymOracle, LinkPass, PropertyTable,
    RawTriple, RetrieverConfig, TitleHit, WordVectors,
};
use kgfuse_graph::{NodeId, PropertyGraph};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::tempdir;

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct InMemorySource {
    titles: HashMap<String, Vec<TitleHit>>,
    items: HashMap<String, Item>,
}

#[async_trait]
impl FactSource for InMemorySource {
    async fn search_titles(&self, query: &str, limit: usize) -> kgfuse_fusion::Result<Vec<TitleHit>> {
        let mut hits = self.titles.get(query).cloned().unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }

    async fn fetch_items(&self, ids: &[String]) -> kgfuse_fusion::Result<Vec<Item>> {
        Ok(ids.iter().filter_map(|id| self.items.get(id).cloned()).collect())
    }
}

fn hit(id: &str, snippet: &str) -> TitleHit {
    TitleHit {
        id: id.to_string(),
        title: id.to_string(),
        snippet: snippet.to_string(),
    }
}

fn world() -> InMemorySource {
    let mut source = InMemorySource::default();
    source.titles.insert(
        "thread".into(),
        vec![
            hit("Q1", "unit of execution"),
            hit("Q2", "2016 film"),
            hit("Q3", "Wikimedia disambiguation page"),
        ],
    );
    source
        .titles
        .insert("process".into(), vec![hit("Q4", "program in execution")]);
    for item in [
        Item::new("Q1", "thread", "unit of execution")
            .with_alias("thread of execution")
            .with_claim("P361", ClaimValue::Item("Q4".into())),
        Item::new("Q2", "Thread", "2016 film").with_claim("P31", ClaimValue::Item("Q11424".into())),
        Item::new("Q4", "process", "program in execution"),
    ] {
        source.items.insert(item.id.clone(), item);
    }
    source
}

fn vectors() -> WordVectors {
    let mut v = WordVectors::new(3);
    for (word, vec) in [
        ("thread", [1.0, 0.0, 0.0]),
        ("process", [0.9, 0.0, 0.1]),
        ("execution", [0.9, 0.0, 0.1]),
        ("unit", [1.0, 0.1, 0.0]),
        ("program", [0.9, 0.1, 0.0]),
        ("lock", [0.8, 0.1, 0.1]),
        ("film", [0.0, 1.0, 0.0]),
    ] {
        v.insert(word, vec.to_vec()).unwrap();
    }
    v
}

fn project_batch() -> ExtractionBatch {
    ExtractionBatch {
        terms: vec![
            "thread".into(),
            "Thread".into(),
            "process".into(),
            "mutex".into(),
        ],
        relations: vec![
            RawTriple::new(Endpoint::term("Thread"), "part of", Endpoint::term("process")),
            RawTriple::new(Endpoint::term("mutex"), "used by", Endpoint::term("thread")),
        ],
        ..Default::default()
    }
}

/// Domain term by lemma, whichever surface form became its name.
fn term(graph: &PropertyGraph, name: &str) -> NodeId {
    graph
        .find_one_node_by_property(LEMMA, &normalize(name))
        .unwrap_or_else(|| panic!("no term {name}"))
        .id
}

// ============================================================================
// Full Pipeline Test
// ============================================================================

#[tokio::test]
async fn test_complete_pipeline() {
    let dir = tempdir().unwrap();

    // Step 1: domain fusion
    let mut graph = PropertyGraph::new();
    let outcome = DomainFusion::new(LemmaSynonymOracle::new()).fuse(&mut graph, project_batch());
    assert!(outcome.report.failures.is_empty(), "{:?}", outcome.report.failures);
    assert_eq!(graph.node_count(), 3);
    let thread = term(&graph, "thread");
    let process = term(&graph, "process");
    assert!(graph.has_relation(thread, "part of", process));

    // Step 2: retrieval into a shared cache
    let cache = Arc::new(FactCache::new());
    let config = RetrieverConfig {
        pool_size: 4,
        ..Default::default()
    };
    let retriever = CandidateRetriever::new(world(), Arc::clone(&cache), config);
    let titles = retriever
        .search_all(["thread".to_string(), "process".to_string(), "mutex".to_string()])
        .await;
    assert!(titles.failed.is_empty());
    retriever.fetch_candidates(true).await;
    assert!(cache.has_item("Q1") && cache.has_item("Q4"));

    // Step 3: caches survive a persist/reload cycle
    let title_path = dir.path().join("titles.json");
    let item_path = dir.path().join("items.json");
    cache.export(&title_path, &item_path).unwrap();
    let reloaded = FactCache::init_from_persisted(&title_path, &item_path).unwrap();
    assert_eq!(reloaded.title_count(), cache.title_count());
    assert_eq!(reloaded.item_ids(), cache.item_ids());

    // Step 4: link
    let table = PropertyTable::default();
    let vectors = vectors();
    let link = LinkPass::new(&vectors, &reloaded, &table, FusionConfig::default()).run(&mut graph);
    assert_eq!(link.linked(), 2, "{:?}", link.records);
    assert_eq!(graph.node(thread).unwrap().str_property(WD_ITEM_ID), "Q1");
    assert!(!graph.node(term(&graph, "mutex")).unwrap().has_label(LABEL_WIKIDATA));

    // Step 5: snapshot round trip
    let snapshot = dir.path().join("project.kgfg");
    graph.save(&snapshot).unwrap();
    let loaded = PropertyGraph::load(&snapshot).unwrap();
    assert_eq!(loaded.info(), graph.info());
    assert_eq!(
        loaded.find_nodes_by_property(WD_ITEM_ID, "Q4"),
        vec![process]
    );

    // Step 6: reconcile a second project into the loaded graph
    let mut other = PropertyGraph::new();
    let batch = ExtractionBatch {
        terms: vec!["Thread".into(), "read write lock".into()],
        relations: vec![RawTriple::new(
            Endpoint::term("read write lock"),
            "used by",
            Endpoint::term("Thread"),
        )],
        ..Default::default()
    };
    DomainFusion::new(LemmaSynonymOracle::new()).fuse(&mut other, batch);
    let other_thread = term(&other, "Thread");
    let other_lock = term(&other, "read write lock");

    let merged = reconcile(loaded, &other);
    assert_eq!(merged.id_map[&other_thread], thread);
    let lock = merged.id_map[&other_lock];
    assert_eq!(merged.graph.node_count(), graph.node_count() + 1);
    assert!(merged.graph.has_relation(lock, "used by", thread));
    assert_eq!(merged.report.relations_skipped, 0);
}

// ============================================================================
// Re-running passes
// ============================================================================

#[test]
fn test_domain_fusion_is_incremental() {
    let mut graph = PropertyGraph::new();
    let fusion = DomainFusion::new(LemmaSynonymOracle::new());
    fusion.fuse(&mut graph, project_batch());
    let before = graph.info();

    // same batch again: nothing new
    let again = fusion.fuse(&mut graph, project_batch());
    assert_eq!(graph.info(), before);
    assert_eq!(again.report.nodes_created, 0);

    // a new surface form lands on the existing node
    let more = ExtractionBatch {
        terms: vec!["MUTEX".into()],
        ..Default::default()
    };
    fusion.fuse(&mut graph, more);
    assert_eq!(graph.node_count(), before.nodes);
    let mutex = graph.node(term(&graph, "mutex")).unwrap();
    assert!(mutex
        .strings_property(ALIAS)
        .contains(&"MUTEX".to_string()));
}
