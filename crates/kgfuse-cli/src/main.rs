//! KGFuse CLI
//!
//! Drives the fusion passes over graph snapshots:
//! - `domain`: import an extraction batch as canonical domain terms
//! - `fetch`: fill the external-fact caches for the graph's terms
//! - `link`: link domain terms to cached external facts
//! - `reconcile`: fold an independently built graph into a base graph
//! - `prune` / `info`: maintenance and inspection

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use kgfuse_fusion::artifact::{read_json, write_json};
use kgfuse_fusion::cleanup::{merge_same_linked_item, prune_isolated, remove_terms_by_name};
use kgfuse_fusion::lemma::normalize;
use kgfuse_fusion::schema::{LABEL_DOMAIN_TERM, LABEL_WIKIDATA, LEMMA, TERM_NAME};
use kgfuse_fusion::{
    AliasMap, CandidateRetriever, DomainFusion, ExtractionBatch, FactCache, FusionConfig,
    FusionReport, LemmaSynonymOracle, LinkPass, PropertyTable, RetrievalReport, WikidataClient,
    WordVectors,
};
use kgfuse_graph::PropertyGraph;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kgfuse")]
#[command(
    author,
    version,
    about = "KGFuse: fuse domain terms, world facts and code graphs into one knowledge graph"
)]
struct Cli {
    /// Fusion configuration (JSON); defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an extraction batch into a graph
    Domain {
        /// Existing graph snapshot to extend (a new graph when omitted)
        #[arg(long)]
        graph: Option<PathBuf>,
        /// Extraction batch (JSON)
        #[arg(long)]
        batch: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Write the synonym alias map here
        #[arg(long)]
        aliases_out: Option<PathBuf>,
        /// Curated synonym table (`canonical -> [synonyms]`)
        #[arg(long)]
        synonyms: Option<PathBuf>,
    },

    /// Look up external-fact candidates for every unlinked domain term
    Fetch {
        #[arg(long)]
        graph: PathBuf,
        #[command(flatten)]
        caches: CacheArgs,
        /// Skip the one-hop neighbour fetch
        #[arg(long)]
        no_neighbours: bool,
    },

    /// Link domain terms to cached external facts
    Link {
        #[arg(long)]
        graph: PathBuf,
        /// Word vectors in word2vec text format
        #[arg(long)]
        vectors: PathBuf,
        #[command(flatten)]
        caches: CacheArgs,
        #[arg(long)]
        out: PathBuf,
        /// Write the linking records here
        #[arg(long)]
        records: Option<PathBuf>,
        /// Extra property-id -> name table (JSON)
        #[arg(long)]
        properties: Option<PathBuf>,
        /// Collapse domain terms linked to the same item
        #[arg(long)]
        merge_duplicates: bool,
    },

    /// Fold an extra graph into a base graph
    Reconcile {
        #[arg(long)]
        base: PathBuf,
        #[arg(long)]
        extra: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Remove isolated nodes carrying a label
    Prune {
        #[arg(long)]
        graph: PathBuf,
        #[arg(long)]
        label: String,
        #[arg(long)]
        out: PathBuf,
        /// JSON list of term names to delete before pruning
        #[arg(long)]
        remove_terms: Option<PathBuf>,
    },

    /// Print node/relation counts per label
    Info {
        #[arg(long)]
        graph: PathBuf,
    },
}

#[derive(Args)]
struct CacheArgs {
    /// Title-search cache (JSON, created when missing)
    #[arg(long)]
    title_cache: PathBuf,
    /// Item cache (JSON, created when missing)
    #[arg(long)]
    item_cache: PathBuf,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = FusionConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Domain {
            graph,
            batch,
            out,
            aliases_out,
            synonyms,
        } => cmd_domain(
            graph.as_deref(),
            &batch,
            &out,
            aliases_out.as_deref(),
            synonyms.as_deref(),
        ),
        Commands::Fetch {
            graph,
            caches,
            no_neighbours,
        } => cmd_fetch(&config, &graph, &caches, !no_neighbours),
        Commands::Link {
            graph,
            vectors,
            caches,
            out,
            records,
            properties,
            merge_duplicates,
        } => cmd_link(
            config,
            &graph,
            &vectors,
            &caches,
            &out,
            records.as_deref(),
            properties.as_deref(),
            merge_duplicates,
        ),
        Commands::Reconcile { base, extra, out } => cmd_reconcile(&base, &extra, &out),
        Commands::Prune {
            graph,
            label,
            out,
            remove_terms,
        } => cmd_prune(&graph, &label, &out, remove_terms.as_deref()),
        Commands::Info { graph } => cmd_info(&graph),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn load_graph(path: &Path) -> Result<PropertyGraph> {
    PropertyGraph::load(path).with_context(|| format!("loading graph {}", path.display()))
}

fn save_graph(graph: &PropertyGraph, path: &Path) -> Result<()> {
    graph
        .save(path)
        .with_context(|| format!("saving graph {}", path.display()))?;
    wrote(path);
    Ok(())
}

fn wrote(path: &Path) {
    eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
}

fn print_report(report: &FusionReport) {
    println!("{} {}", "Finished".green().bold(), report);
    for failure in report.failures.iter().take(20) {
        println!("  {} {}: {}", "failed".yellow(), failure.entity, failure.reason);
    }
    if report.failures.len() > 20 {
        println!("  ... and {} more", report.failures.len() - 20);
    }
}

fn print_retrieval(what: &str, report: &RetrievalReport) {
    println!(
        "{} {}: {} requested, {} cached, {} fetched, {} failed",
        "Fetched".green().bold(),
        what,
        report.requested,
        report.cached,
        report.fetched,
        report.failed.len()
    );
}

/// Lemmas of domain terms that are not linked yet.
fn unlinked_lemmas(graph: &PropertyGraph) -> BTreeSet<String> {
    graph
        .node_ids_with_label(LABEL_DOMAIN_TERM)
        .into_iter()
        .filter_map(|id| graph.node(id))
        .filter(|node| !node.has_label(LABEL_WIKIDATA))
        .map(|node| match node.str_property(LEMMA) {
            "" => normalize(node.str_property(TERM_NAME)),
            lemma => lemma.to_string(),
        })
        .filter(|lemma| !lemma.is_empty())
        .collect()
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_domain(
    graph_path: Option<&Path>,
    batch_path: &Path,
    out: &Path,
    aliases_out: Option<&Path>,
    synonyms: Option<&Path>,
) -> Result<()> {
    println!("{} batch {}", "Fusing".green().bold(), batch_path.display());

    let mut graph = match graph_path {
        Some(path) => load_graph(path)?,
        None => PropertyGraph::new(),
    };
    let batch = ExtractionBatch::load(batch_path)
        .with_context(|| format!("loading batch {}", batch_path.display()))?;
    let oracle = match synonyms {
        Some(path) => {
            let table: AliasMap = read_json(path)
                .with_context(|| format!("loading synonyms {}", path.display()))?;
            LemmaSynonymOracle::with_table(&table)
        }
        None => LemmaSynonymOracle::new(),
    };

    let outcome = DomainFusion::new(oracle).fuse(&mut graph, batch);
    print_report(&outcome.report);

    save_graph(&graph, out)?;
    if let Some(path) = aliases_out {
        write_json(path, &outcome.alias_map)?;
        wrote(path);
    }
    Ok(())
}

fn cmd_fetch(config: &FusionConfig, graph_path: &Path, caches: &CacheArgs, neighbours: bool) -> Result<()> {
    let graph = load_graph(graph_path)?;
    let cache = Arc::new(
        FactCache::init_from_persisted(&caches.title_cache, &caches.item_cache)
            .context("loading fact caches")?,
    );
    let lemmas = unlinked_lemmas(&graph);
    println!("{} {} lemmas", "Searching".green().bold(), lemmas.len());

    let client = WikidataClient::new(&config.retriever).context("building Wikidata client")?;
    let retriever = CandidateRetriever::new(client, Arc::clone(&cache), config.retriever.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let (titles, items) = runtime.block_on(async {
        let titles = retriever.search_all(lemmas).await;
        let items = retriever.fetch_candidates(neighbours).await;
        (titles, items)
    });
    print_retrieval("titles", &titles);
    print_retrieval("items", &items);

    // failed keys stay uncached and are retried on the next run
    cache
        .export(&caches.title_cache, &caches.item_cache)
        .context("exporting fact caches")?;
    wrote(&caches.title_cache);
    wrote(&caches.item_cache);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_link(
    config: FusionConfig,
    graph_path: &Path,
    vectors_path: &Path,
    caches: &CacheArgs,
    out: &Path,
    records_out: Option<&Path>,
    properties: Option<&Path>,
    merge_duplicates: bool,
) -> Result<()> {
    let mut graph = load_graph(graph_path)?;
    let vectors = WordVectors::load(vectors_path)
        .with_context(|| format!("loading word vectors {}", vectors_path.display()))?;
    let cache = FactCache::init_from_persisted(&caches.title_cache, &caches.item_cache)
        .context("loading fact caches")?;
    let table = match properties {
        Some(path) => PropertyTable::load(path)
            .with_context(|| format!("loading property table {}", path.display()))?,
        None => PropertyTable::default(),
    };
    println!(
        "{} with {} word vectors, {} cached items",
        "Linking".green().bold(),
        vectors.len(),
        cache.item_count()
    );

    let outcome = LinkPass::new(&vectors, &cache, &table, config).run(&mut graph);
    print_report(&outcome.report);
    println!(
        "  {} of {} evaluated terms linked",
        outcome.linked().to_string().bold(),
        outcome.records.len()
    );

    if merge_duplicates {
        let merged = merge_same_linked_item(&mut graph).context("merging duplicate links")?;
        println!("  {} duplicate terms merged", merged);
    }

    save_graph(&graph, out)?;
    if let Some(path) = records_out {
        write_json(path, &outcome.records)?;
        wrote(path);
    }
    Ok(())
}

fn cmd_reconcile(base_path: &Path, extra_path: &Path, out: &Path) -> Result<()> {
    let base = load_graph(base_path)?;
    let extra = load_graph(extra_path)?;
    println!(
        "{} {} into {}",
        "Reconciling".green().bold(),
        extra_path.display(),
        base_path.display()
    );

    let outcome = kgfuse_fusion::reconcile(base, &extra);
    println!("{}", outcome.report);
    for failure in outcome.report.summary.failures.iter().take(20) {
        println!("  {} {}: {}", "failed".yellow(), failure.entity, failure.reason);
    }
    save_graph(&outcome.graph, out)
}

fn cmd_prune(graph_path: &Path, label: &str, out: &Path, remove_terms: Option<&Path>) -> Result<()> {
    let mut graph = load_graph(graph_path)?;

    if let Some(path) = remove_terms {
        let names: Vec<String> =
            read_json(path).with_context(|| format!("loading term names {}", path.display()))?;
        let (removed, missing) = remove_terms_by_name(&mut graph, &names);
        println!("{} {} terms", "Removed".green().bold(), removed);
        if !missing.is_empty() {
            println!("  {} {}", "not found:".yellow(), missing.join(", "));
        }
    }

    let pruned = prune_isolated(&mut graph, label);
    println!("{} {} isolated {:?} nodes", "Pruned".green().bold(), pruned, label);
    save_graph(&graph, out)
}

fn cmd_info(graph_path: &Path) -> Result<()> {
    let graph = load_graph(graph_path)?;
    println!("{} {}", graph_path.display().to_string().bold(), graph.info());
    Ok(())
}
