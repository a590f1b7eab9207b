//! Shared lookup cache for title searches and item fetches.
//!
//! Both maps are `DashMap`s so concurrent lookups can write through directly;
//! writes for the same key are last-writer-wins, which is safe because a
//! repeated lookup of the same key returns the same record.

use crate::artifact::{read_json_or_default, write_json};
use crate::error::Result;
use crate::item::{Item, TitleHit};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default)]
pub struct FactCache {
    titles: DashMap<String, Vec<TitleHit>>,
    items: DashMap<String, Item>,
}

impl FactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load persisted caches. Missing files start empty.
    pub fn init_from_persisted(title_path: &Path, item_path: &Path) -> Result<Self> {
        let titles: BTreeMap<String, Vec<TitleHit>> = read_json_or_default(title_path)?;
        let items: BTreeMap<String, Item> = read_json_or_default(item_path)?;
        tracing::info!(titles = titles.len(), items = items.len(), "fact cache loaded");
        Ok(Self {
            titles: titles.into_iter().collect(),
            items: items.into_iter().collect(),
        })
    }

    /// Persist both maps (sorted, so exports diff cleanly).
    pub fn export(&self, title_path: &Path, item_path: &Path) -> Result<()> {
        let titles: BTreeMap<String, Vec<TitleHit>> = self
            .titles
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let items: BTreeMap<String, Item> = self
            .items
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        write_json(title_path, &titles)?;
        write_json(item_path, &items)?;
        tracing::info!(titles = titles.len(), items = items.len(), "fact cache exported");
        Ok(())
    }

    // ========================================================================
    // Titles
    // ========================================================================

    pub fn has_titles(&self, query: &str) -> bool {
        self.titles.contains_key(query)
    }

    /// Raw (unfiltered) hits for a query.
    pub fn titles(&self, query: &str) -> Option<Vec<TitleHit>> {
        self.titles.get(query).map(|hits| hits.value().clone())
    }

    pub fn insert_titles(&self, query: impl Into<String>, hits: Vec<TitleHit>) {
        self.titles.insert(query.into(), hits);
    }

    pub fn title_count(&self) -> usize {
        self.titles.len()
    }

    /// Ids of every non-denied hit across all cached queries.
    pub fn accepted_hit_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .titles
            .iter()
            .flat_map(|e| {
                e.value()
                    .iter()
                    .filter(|h| !h.is_denied())
                    .map(|h| h.id.clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    // ========================================================================
    // Items
    // ========================================================================

    pub fn has_item(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn item(&self, id: &str) -> Option<Item> {
        self.items.get(id).map(|item| item.value().clone())
    }

    pub fn insert_item(&self, item: Item) {
        self.items.insert(item.id.clone(), item);
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn item_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.items.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Linkable candidates for a query: non-denied hits whose item is cached
    /// and valid, in search-rank order.
    pub fn candidates(&self, query: &str) -> Vec<Item> {
        let Some(hits) = self.titles(query) else {
            return Vec::new();
        };
        hits.iter()
            .filter(|h| !h.is_denied())
            .filter_map(|h| self.item(&h.id))
            .filter(Item::is_valid)
            .collect()
    }
}
