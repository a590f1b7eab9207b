//! External-fact candidate retrieval.
//!
//! Lookups fan out on a `JoinSet` under a counting semaphore; every request
//! gets its own timeout. A failed or timed-out key yields zero candidates,
//! is logged, and is left uncached so the next run retries it.

use crate::cache::FactCache;
use crate::config::RetrieverConfig;
use crate::error::{FusionError, Result};
use crate::item::{Item, TitleHit};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A source of external facts (title search + item fetch).
#[async_trait]
pub trait FactSource: Send + Sync {
    async fn search_titles(&self, query: &str, limit: usize) -> Result<Vec<TitleHit>>;

    /// Fetch full records. Unknown ids are simply absent from the result.
    async fn fetch_items(&self, ids: &[String]) -> Result<Vec<Item>>;
}

/// Counts for one retrieval batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalReport {
    pub requested: usize,
    pub cached: usize,
    pub fetched: usize,
    pub failed: Vec<String>,
}

pub struct CandidateRetriever<S: FactSource + 'static> {
    source: Arc<S>,
    cache: Arc<FactCache>,
    config: RetrieverConfig,
    semaphore: Arc<Semaphore>,
    failed: Arc<Mutex<BTreeSet<String>>>,
}

impl<S: FactSource + 'static> CandidateRetriever<S> {
    pub fn new(source: S, cache: Arc<FactCache>, config: RetrieverConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.pool_size.max(1)));
        Self {
            source: Arc::new(source),
            cache,
            config,
            semaphore,
            failed: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    pub fn cache(&self) -> &Arc<FactCache> {
        &self.cache
    }

    /// Keys whose lookup failed during this retriever's lifetime.
    pub fn failed_keys(&self) -> BTreeSet<String> {
        self.failed.lock().clone()
    }

    /// Linkable candidates for one lemma, searching only when uncached.
    pub async fn search(&self, lemma: &str) -> Vec<Item> {
        if lemma.trim().is_empty() {
            return Vec::new();
        }
        self.search_all([lemma.to_string()]).await;
        let ids: Vec<String> = self
            .cache
            .titles(lemma)
            .unwrap_or_default()
            .into_iter()
            .filter(|h| !h.is_denied())
            .map(|h| h.id)
            .collect();
        self.fetch_items(ids).await;
        self.cache.candidates(lemma)
    }

    /// Title-search every uncached lemma.
    pub async fn search_all<I>(&self, lemmas: I) -> RetrievalReport
    where
        I: IntoIterator<Item = String>,
    {
        let mut report = RetrievalReport::default();
        let mut tasks = JoinSet::new();
        let unique: BTreeSet<String> = lemmas
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect();

        for lemma in unique {
            report.requested += 1;
            if self.cache.has_titles(&lemma) {
                report.cached += 1;
                continue;
            }
            let source = Arc::clone(&self.source);
            let cache = Arc::clone(&self.cache);
            let semaphore = Arc::clone(&self.semaphore);
            let limit = self.config.search_limit;
            let timeout = self.config.timeout();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = match tokio::time::timeout(timeout, source.search_titles(&lemma, limit)).await {
                    Ok(Ok(hits)) => {
                        cache.insert_titles(lemma.clone(), hits);
                        Ok(())
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(FusionError::Timeout(lemma.clone())),
                };
                (lemma, outcome)
            });
        }

        self.drain(tasks, &mut report).await;
        tracing::info!(
            requested = report.requested,
            cached = report.cached,
            fetched = report.fetched,
            failed = report.failed.len(),
            "title search finished"
        );
        report
    }

    /// Fetch every uncached item id, `fetch_batch` ids per request.
    pub async fn fetch_items<I>(&self, ids: I) -> RetrievalReport
    where
        I: IntoIterator<Item = String>,
    {
        let mut report = RetrievalReport::default();
        let mut missing: Vec<String> = Vec::new();
        for id in ids.into_iter().collect::<BTreeSet<_>>() {
            report.requested += 1;
            if self.cache.has_item(&id) {
                report.cached += 1;
            } else {
                missing.push(id);
            }
        }

        let mut tasks = JoinSet::new();
        for chunk in missing.chunks(self.config.fetch_batch.max(1)) {
            let chunk = chunk.to_vec();
            let source = Arc::clone(&self.source);
            let cache = Arc::clone(&self.cache);
            let semaphore = Arc::clone(&self.semaphore);
            let timeout = self.config.timeout();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let key = chunk.join("|");
                let outcome = match tokio::time::timeout(timeout, source.fetch_items(&chunk)).await {
                    Ok(Ok(items)) => {
                        for item in items {
                            cache.insert_item(item);
                        }
                        Ok(())
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(FusionError::Timeout(key.clone())),
                };
                (key, outcome)
            });
        }

        self.drain(tasks, &mut report).await;
        tracing::info!(
            requested = report.requested,
            cached = report.cached,
            fetched = report.fetched,
            failed = report.failed.len(),
            "item fetch finished"
        );
        report
    }

    /// Fetch the items of every accepted title hit, then (optionally) one hop
    /// of neighbours for those that are valid candidates.
    pub async fn fetch_candidates(&self, neighbours: bool) -> RetrievalReport {
        let mut report = self.fetch_items(self.cache.accepted_hit_ids()).await;
        if neighbours {
            let more = self.fetch_neighbours().await;
            report.requested += more.requested;
            report.cached += more.cached;
            report.fetched += more.fetched;
            report.failed.extend(more.failed);
        }
        report
    }

    /// Fetch every item referenced by a valid candidate item.
    pub async fn fetch_neighbours(&self) -> RetrievalReport {
        let neighbours: BTreeSet<String> = self
            .cache
            .accepted_hit_ids()
            .into_iter()
            .filter_map(|id| self.cache.item(&id))
            .filter(Item::is_valid)
            .flat_map(|item| item.neighbour_ids())
            .collect();
        self.fetch_items(neighbours).await
    }

    async fn drain(&self, mut tasks: JoinSet<(String, Result<()>)>, report: &mut RetrievalReport) {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.fetched += 1,
                Ok((key, Err(e))) => {
                    tracing::warn!(%key, error = %e, "lookup failed, no candidates");
                    self.failed.lock().insert(key.clone());
                    report.failed.push(key);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "lookup task aborted");
                    report.failed.push(format!("task: {e}"));
                }
            }
        }
        report.failed.sort();
    }
}
