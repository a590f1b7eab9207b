//! KGFuse Fusion: multi-source fusion engine for API knowledge graphs
//!
//! Two knowledge sources are fused into one property graph: domain terms
//! mined from identifiers and comments, and general-world facts from
//! Wikidata. A third pass reconciles graphs that were built independently.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          FUSION PIPELINE                             │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  ExtractionBatch ──► Synonym ──► Re-targeter ──► Canonicalizer ──┐   │
//! │   (terms, rels)      Clusterer                                   │   │
//! │                                                                  ▼   │
//! │  ┌──────────────┐   ┌───────────┐   ┌─────────┐   ┌──────────────┐  │
//! │  │ FactSource   │──►│ FactCache │──►│ Linker  │──►│ MergeApplier │  │
//! │  │ (Wikidata)   │   │ (DashMap) │   │ (rayon) │   │ + x-refs     │  │
//! │  └──────────────┘   └───────────┘   └─────────┘   └──────┬───────┘  │
//! │      ▲ Semaphore-bounded fan-out                         │          │
//! │                                                          ▼          │
//! │                     base graph ──► CrossGraphReconciler ◄── extra   │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookup and scoring run concurrently and only produce data; every graph
//! mutation happens serially afterwards. Per-entity failures are collected
//! into a [`FusionReport`] and never abort a pass.

pub mod artifact;
pub mod cache;
pub mod canonicalizer;
pub mod cleanup;
pub mod config;
pub mod domain;
pub mod embedding;
pub mod error;
pub mod item;
pub mod lemma;
pub mod linker;
pub mod merge;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod retarget;
pub mod retriever;
pub mod schema;
pub mod synonym;
#[cfg(feature = "wikidata")]
pub mod wikidata;

pub use cache::FactCache;
pub use canonicalizer::TermCanonicalizer;
pub use config::{FusionConfig, LinkerConfig, MergeConfig, RetrieverConfig};
pub use domain::{DomainFusion, DomainFusionOutcome, ExtractionBatch};
pub use embedding::{Embedder, WordVectors};
pub use error::{FusionError, Result};
pub use item::{ClaimValue, Item, PropertyTable, TitleHit};
pub use linker::{AcceptRule, CandidateScore, EntityLinker, LinkDecision, LinkingRecord};
pub use merge::MergeApplier;
pub use pipeline::{LinkOutcome, LinkPass};
pub use reconcile::{reconcile, CrossGraphReconciler, IdMap, NodeKind, ReconcileOutcome, ReconcileReport};
pub use report::{FailureRecord, FusionReport};
pub use retarget::{Endpoint, RawTriple, RelationRetargeter};
pub use retriever::{CandidateRetriever, FactSource, RetrievalReport};
pub use synonym::{AliasMap, LemmaSynonymOracle, SynonymOracle};
#[cfg(feature = "wikidata")]
pub use wikidata::WikidataClient;
